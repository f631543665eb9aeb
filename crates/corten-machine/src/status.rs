use corten_cpu_core::CoreError;

/// Coarse outcome classification reported to embedding hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Success,
    Error,
    OutOfRange,
    IteratorExhausted,
    BufferTooSmall,
    OpenFileFailed,
    MemInaccessible,
    MemWriteNotAllowed,
    DecoderUnknownOpcode,
    DecoderUnpredictable,
    DecoderUndefined,
    ExecutorUnpredictable,
    ExecutorUndefined,
    ExecutorExitWithError,
    ElfNotValid,
    ElfWrongHeader,
    UsageFault,
    MaxInstructionsReached,
    Unsupported,
    NotImplemented,
    Unexpected,
}

impl StatusCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Success => "Success",
            StatusCode::Error => "Error",
            StatusCode::OutOfRange => "OutOfRange",
            StatusCode::IteratorExhausted => "IteratorExhausted",
            StatusCode::BufferTooSmall => "BufferTooSmall",
            StatusCode::OpenFileFailed => "OpenFileFailed",
            StatusCode::MemInaccessible => "MemInaccessible",
            StatusCode::MemWriteNotAllowed => "MemWriteNotAllowed",
            StatusCode::DecoderUnknownOpcode => "DecoderUnknownOpcode",
            StatusCode::DecoderUnpredictable => "DecoderUnpredictable",
            StatusCode::DecoderUndefined => "DecoderUndefined",
            StatusCode::ExecutorUnpredictable => "ExecutorUnpredictable",
            StatusCode::ExecutorUndefined => "ExecutorUndefined",
            StatusCode::ExecutorExitWithError => "ExecutorExitWithError",
            StatusCode::ElfNotValid => "ElfNotValid",
            StatusCode::ElfWrongHeader => "ElfWrongHeader",
            StatusCode::UsageFault => "UsageFault",
            StatusCode::MaxInstructionsReached => "MaxInstructionsReached",
            StatusCode::Unsupported => "Unsupported",
            StatusCode::NotImplemented => "NotImplemented",
            StatusCode::Unexpected => "Unexpected",
        }
    }
}

impl From<CoreError> for StatusCode {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::UnknownOpcode { .. } => StatusCode::DecoderUnknownOpcode,
            CoreError::DecoderUnpredictable => StatusCode::DecoderUnpredictable,
            CoreError::DecoderUndefined => StatusCode::DecoderUndefined,
            CoreError::ExecutorUnpredictable => StatusCode::ExecutorUnpredictable,
            CoreError::ExecutorUndefined => StatusCode::ExecutorUndefined,
            CoreError::ExecutorExitWithError => StatusCode::ExecutorExitWithError,
            CoreError::UsageFault => StatusCode::UsageFault,
            CoreError::MemInaccessible(_) => StatusCode::MemInaccessible,
            CoreError::MemWriteNotAllowed(_) => StatusCode::MemWriteNotAllowed,
            CoreError::NotImplemented => StatusCode::NotImplemented,
            CoreError::Unexpected => StatusCode::Unexpected,
        }
    }
}

impl From<crate::MachineError> for StatusCode {
    fn from(e: crate::MachineError) -> Self {
        match e {
            crate::MachineError::OpenFileFailed => StatusCode::OpenFileFailed,
            crate::MachineError::ElfNotValid => StatusCode::ElfNotValid,
            crate::MachineError::ElfWrongHeader => StatusCode::ElfWrongHeader,
            crate::MachineError::BufferTooSmall => StatusCode::BufferTooSmall,
        }
    }
}

/// Returned by [`crate::Machine::exec`]: the emulator status plus the exit
/// code the guest signalled through semihosting.
#[derive(Debug, Clone, Copy)]
pub struct ExecResult {
    pub status: StatusCode,
    pub program_exit_code: i32,
}

impl ExecResult {
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::Success
    }

    pub fn is_max_instructions_reached(&self) -> bool {
        self.status == StatusCode::MaxInstructionsReached
    }
}
