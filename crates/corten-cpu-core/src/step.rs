//! The per-instruction step driver and the take-reset sequence.
//!
//! A step walks the architected order: pre-fetch exception check, fetch
//! (with the invalid-state usage fault raised when EPSR.T is clear),
//! post-fetch check, decode, optional pre-execute hook, execute, optional
//! post-execute hook, post-execute check. Preemption at a check point turns
//! the rest of the cycle into a NOP.

use std::io::Write;

use tracing::{debug, trace};

use crate::decode::{self, DecodeError, Instr};
use crate::error::CoreError;
use crate::exceptions::{self, Instant};
use crate::exec::{self, ExecFlags};
use crate::fetch::{self, RawInstr};
use crate::it;
use crate::mem::{BusFaultKind, SystemBus};
use crate::semihost::Semihost;
use crate::state::{
    reg, CpuState, Mode, SpecialReg, CCR_STKALIGN, CFSR_INVSTATE, EPSR_IT_MASK, EPSR_T,
    IPSR_EXC_MASK, SYSCTRL_MODE_HANDLER, SYSCTRL_NPRIV, SYSCTRL_SPSEL,
};

bitflags::bitflags! {
    /// Outcome of a single step.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StepFlags: u8 {
        const OK = 1 << 0;
        const TERMINATION_REQUEST = 1 << 1;
    }
}

/// Read-only view handed to the pre/post-execute hooks.
pub struct StepContext<'a> {
    /// Address of the instruction being executed.
    pub pc: u32,
    pub opcode: RawInstr,
    pub instr: &'a Instr,
    pub state: &'a CpuState,
}

/// Optional observer callbacks. They run synchronously inside the step and
/// must not retain the context.
#[derive(Default)]
pub struct Hooks<'h> {
    pub pre_exec: Option<&'h mut dyn FnMut(&StepContext<'_>)>,
    pub post_exec: Option<&'h mut dyn FnMut(&StepContext<'_>)>,
}

impl<'h> Hooks<'h> {
    pub fn none() -> Self {
        Self::default()
    }
}

fn decode_error(raw: RawInstr, e: DecodeError) -> CoreError {
    match e {
        DecodeError::UnknownOpcode => CoreError::UnknownOpcode {
            low: raw.low,
            high: raw.high,
        },
        DecodeError::Unpredictable => CoreError::DecoderUnpredictable,
        DecodeError::Undefined => CoreError::DecoderUndefined,
    }
}

/// Executes one instruction, including exception delivery at the three
/// check points. `Ok` carries termination flags; `Err` is fatal.
pub fn step<W: Write>(
    state: &mut CpuState,
    bus: &mut SystemBus<'_>,
    semihost: &mut Semihost<W>,
    hooks: &mut Hooks<'_>,
) -> Result<StepFlags, CoreError> {
    let mut pc_this = state.instr_addr();

    if exceptions::check_exceptions(state, bus, Instant::PreFetch, pc_this, pc_this)? {
        // Asynchronous preemption; this cycle is a NOP.
        return Ok(StepFlags::OK);
    }
    pc_this = state.instr_addr();

    // An EPSR.T of zero cannot fetch; the invalid-state UsageFault is taken
    // at the post-fetch check point.
    let raw = if thumb_mode_or_raise(state) {
        fetch::fetch(state, bus, pc_this)
    } else {
        RawInstr::default()
    };

    if exceptions::check_exceptions(state, bus, Instant::PostFetch, pc_this, pc_this)? {
        return Ok(StepFlags::OK);
    }

    let instr = decode::decode(state, raw).map_err(|e| {
        debug!(
            pc = format_args!("{pc_this:#010x}"),
            low = format_args!("{:#06x}", raw.low),
            high = format_args!("{:#06x}", raw.high),
            "decode failed"
        );
        decode_error(raw, e)
    })?;
    debug_assert_eq!(raw.wide, instr.is_wide());

    if let Some(pre) = hooks.pre_exec.as_mut() {
        pre(&StepContext {
            pc: pc_this,
            opcode: raw,
            instr: &instr,
            state,
        });
    }

    let exec_flags = exec::execute(state, bus, &instr, semihost)?;

    if let Some(post) = hooks.post_exec.as_mut() {
        post(&StepContext {
            pc: pc_this,
            opcode: raw,
            instr: &instr,
            state,
        });
    }

    // The exit flags are mutually exclusive.
    if exec_flags.contains(ExecFlags::BKPT_REQ_EXIT) || exec_flags.contains(ExecFlags::SVC_REQ_EXIT)
    {
        return Ok(StepFlags::OK | StepFlags::TERMINATION_REQUEST);
    }
    if exec_flags.contains(ExecFlags::BKPT_REQ_ERROR_EXIT)
        || exec_flags.contains(ExecFlags::SVC_REQ_ERROR_EXIT)
    {
        return Err(CoreError::ExecutorExitWithError);
    }

    let next_instr = state.instr_addr();
    exceptions::check_exceptions(state, bus, Instant::PostExecute, pc_this, next_instr)?;

    Ok(StepFlags::OK)
}

fn thumb_mode_or_raise(state: &mut CpuState) -> bool {
    if state.thumb_bit() {
        return true;
    }
    state.or_cfsr(CFSR_INVSTATE);
    state.exceptions.set_pending(exceptions::Exception::UsageFault);
    false
}

/// The architectural reset sequence: Thread mode, privileged, main stack,
/// SP and entry point from the vector table, STKALIGN set.
///
/// The vector-table reads report failures through the fault registers, so
/// reset itself cannot fail.
pub fn take_reset(state: &mut CpuState, bus: &mut SystemBus<'_>) {
    debug!("taking reset");

    let mut sys_ctrl = state.read_special(SpecialReg::SysCtrl);
    sys_ctrl &= !(SYSCTRL_MODE_HANDLER | SYSCTRL_SPSEL | SYSCTRL_NPRIV);
    state.write_special(SpecialReg::SysCtrl, sys_ctrl);
    debug_assert_eq!(state.mode(), Mode::Thread);

    state.exceptions.reset();
    state.write_special(SpecialReg::PriMask, 0);

    let vector_table = state.read_special(SpecialReg::Vtor) & !0x7F;

    let sp_main = bus.read_u32_or_raise(state, vector_table, BusFaultKind::Precise);
    state.write_special(SpecialReg::SpMain, sp_main & !3);
    let sp_process = state.read_special(SpecialReg::SpProcess);
    state.write_special(SpecialReg::SpProcess, sp_process & !3);

    // LR resets to an illegal exception-return value.
    state.write_reg(reg::LR, 0xFFFF_FFFF);

    let entry = bus.read_u32_or_raise(state, vector_table + 4, BusFaultKind::Precise);

    let ipsr = state.read_special(SpecialReg::Ipsr) & !IPSR_EXC_MASK;
    state.write_special(SpecialReg::Ipsr, ipsr);

    let mut epsr = state.read_special(SpecialReg::Epsr);
    epsr &= !(EPSR_IT_MASK | EPSR_T);
    epsr |= (entry & 1) << 24;
    state.write_special(SpecialReg::Epsr, epsr);
    debug_assert!(!it::in_it_block(state));

    state.branch_to(entry & !1);

    // 8-byte stack alignment on exception entry is the reset default.
    let ccr = state.read_special(SpecialReg::Ccr) | CCR_STKALIGN;
    state.write_special(SpecialReg::Ccr, ccr);

    trace!(
        sp = format_args!("{sp_main:#010x}"),
        entry = format_args!("{:#010x}", entry & !1),
        "reset complete"
    );
}
