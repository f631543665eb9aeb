use thiserror::Error;

use crate::mem::BusError;

/// Fatal conditions the step loop cannot recover from.
///
/// Recoverable faults (bus errors on data accesses, usage faults) never show
/// up here; they are expressed by pending the matching exception and letting
/// the next check point deliver it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("decoder: unknown opcode {low:#06x}:{high:#06x}")]
    UnknownOpcode { low: u16, high: u16 },
    #[error("decoder: unpredictable encoding")]
    DecoderUnpredictable,
    #[error("decoder: undefined encoding")]
    DecoderUndefined,
    #[error("executor: unpredictable operation")]
    ExecutorUnpredictable,
    #[error("executor: undefined operation")]
    ExecutorUndefined,
    #[error("executor: guest requested error exit")]
    ExecutorExitWithError,
    #[error("usage fault escalated to emulator error")]
    UsageFault,
    #[error("memory inaccessible at {0:#010x}")]
    MemInaccessible(u32),
    #[error("memory write not allowed at {0:#010x}")]
    MemWriteNotAllowed(u32),
    #[error("operation not implemented")]
    NotImplemented,
    #[error("unexpected internal state")]
    Unexpected,
}

impl From<BusError> for CoreError {
    fn from(e: BusError) -> Self {
        match e {
            BusError::OutOfRange(adr) => CoreError::MemInaccessible(adr),
            BusError::WriteNotAllowed(adr) => CoreError::MemWriteNotAllowed(adr),
        }
    }
}
