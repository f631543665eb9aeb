//! The SysTick timer: the one periodic source of asynchronous interrupts.

use tracing::trace;

use crate::exceptions::Exception;
use crate::peripherals::RegisterSpec;
use crate::state::{
    CpuState, SpecialReg, SYSTICK_CSR_COUNTFLAG, SYSTICK_CSR_ENABLE, SYSTICK_CSR_TICKINT,
};

pub const OFF_CSR: u32 = 0xE010;
pub const OFF_RVR: u32 = 0xE014;
pub const OFF_CVR: u32 = 0xE018;
pub const OFF_CALIB: u32 = 0xE01C;

fn csr_read(state: &mut CpuState) -> u32 {
    let csr = state.read_special(SpecialReg::SysTickCsr);
    // COUNTFLAG clears on every read.
    state.write_special(SpecialReg::SysTickCsr, csr & !SYSTICK_CSR_COUNTFLAG);
    csr
}

fn csr_write(state: &mut CpuState, value: u32) {
    let old = state.read_special(SpecialReg::SysTickCsr);
    if old & SYSTICK_CSR_ENABLE == 0 && value & SYSTICK_CSR_ENABLE != 0 {
        // Enable edge reloads the counter.
        let rvr = state.read_special(SpecialReg::SysTickRvr);
        state.write_special(SpecialReg::SysTickCvr, rvr);
        trace!(reload = rvr, "systick enabled");
    }
    // Writes cannot set COUNTFLAG.
    state.write_special(SpecialReg::SysTickCsr, value & !SYSTICK_CSR_COUNTFLAG);
}

fn rvr_read(state: &mut CpuState) -> u32 {
    state.read_special(SpecialReg::SysTickRvr)
}

fn rvr_write(state: &mut CpuState, value: u32) {
    state.write_special(SpecialReg::SysTickRvr, value & 0x00FF_FFFF);
}

fn cvr_read(state: &mut CpuState) -> u32 {
    state.read_special(SpecialReg::SysTickCvr)
}

fn cvr_write(state: &mut CpuState, _value: u32) {
    // Any write clears the counter.
    state.write_special(SpecialReg::SysTickCvr, 0);
}

fn calib_read(state: &mut CpuState) -> u32 {
    state.read_special(SpecialReg::SysTickCalib)
}

fn reserved_write(_state: &mut CpuState, _value: u32) {}

pub static REGISTERS: &[RegisterSpec] = &[
    RegisterSpec {
        offset: OFF_CSR,
        read_only: false,
        read_modify_write: false,
        read: csr_read,
        write: csr_write,
    },
    RegisterSpec {
        offset: OFF_RVR,
        read_only: false,
        read_modify_write: true,
        read: rvr_read,
        write: rvr_write,
    },
    RegisterSpec {
        offset: OFF_CVR,
        read_only: false,
        read_modify_write: false,
        read: cvr_read,
        write: cvr_write,
    },
    RegisterSpec {
        offset: OFF_CALIB,
        read_only: true,
        read_modify_write: false,
        read: calib_read,
        write: reserved_write,
    },
];

/// One timer tick, called once per retired instruction.
///
/// A zero reload value parks the counter at zero: it reloads zero and never
/// counts down to one again, so no further SysTick pends.
pub fn tick(state: &mut CpuState) {
    let csr = state.read_special(SpecialReg::SysTickCsr);
    if csr & SYSTICK_CSR_ENABLE == 0 {
        return;
    }
    let cvr = state.read_special(SpecialReg::SysTickCvr);
    if cvr <= 1 {
        let rvr = state.read_special(SpecialReg::SysTickRvr);
        if cvr == 0 && rvr == 0 {
            // Parked: a zero reload keeps the counter at zero without
            // setting COUNTFLAG or pending again.
            return;
        }
        state.write_special(SpecialReg::SysTickCvr, rvr);
        state.write_special(SpecialReg::SysTickCsr, csr | SYSTICK_CSR_COUNTFLAG);
        if csr & SYSTICK_CSR_TICKINT != 0 {
            state.exceptions.set_pending(Exception::SysTick);
        }
    } else {
        state.write_special(SpecialReg::SysTickCvr, cvr - 1);
    }
}
