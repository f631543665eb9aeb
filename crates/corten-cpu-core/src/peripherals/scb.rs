//! The System Control Block register bank.

use crate::exceptions::Exception;
use crate::peripherals::RegisterSpec;
use crate::state::{CpuState, SpecialReg, IPSR_EXC_MASK};

pub const OFF_CPUID: u32 = 0xED00;
pub const OFF_ICSR: u32 = 0xED04;
pub const OFF_VTOR: u32 = 0xED08;
pub const OFF_AIRCR: u32 = 0xED0C;
pub const OFF_CCR: u32 = 0xED14;
pub const OFF_SHPR1: u32 = 0xED18;
pub const OFF_SHPR2: u32 = 0xED1C;
pub const OFF_SHPR3: u32 = 0xED20;
pub const OFF_SHCSR: u32 = 0xED24;
pub const OFF_CFSR: u32 = 0xED28;
pub const OFF_HFSR: u32 = 0xED2C;
pub const OFF_BFAR: u32 = 0xED38;

/// Cortex-M4 r0p1 identification value.
const CPUID_VALUE: u32 = 0x410F_C241;

const AIRCR_VECTKEY: u32 = 0x05FA_0000;

// ICSR bit positions.
const ICSR_PENDSTCLR: u32 = 1 << 25;
const ICSR_PENDSTSET: u32 = 1 << 26;
const ICSR_PENDSVCLR: u32 = 1 << 27;
const ICSR_PENDSVSET: u32 = 1 << 28;
const ICSR_NMIPENDSET: u32 = 1 << 31;

fn cpuid_read(_state: &mut CpuState) -> u32 {
    CPUID_VALUE
}

fn icsr_read(state: &mut CpuState) -> u32 {
    let mut icsr = state.read_special(SpecialReg::Ipsr) & IPSR_EXC_MASK;
    // VECTPENDING: lowest-numbered pending exception.
    for number in 1..=crate::exceptions::NUM_EXCEPTIONS as u16 {
        if let Some(exception) = Exception::from_number(number) {
            if state.exceptions.is_pending(exception) {
                icsr |= u32::from(number) << 12;
                icsr |= 1 << 22; // ISRPENDING
                break;
            }
        }
    }
    if state.exceptions.is_pending(Exception::SysTick) {
        icsr |= ICSR_PENDSTSET;
    }
    if state.exceptions.is_pending(Exception::PendSv) {
        icsr |= ICSR_PENDSVSET;
    }
    icsr
}

fn icsr_write(state: &mut CpuState, value: u32) {
    if value & ICSR_NMIPENDSET != 0 {
        state.exceptions.set_pending(Exception::Nmi);
    }
    if value & ICSR_PENDSVSET != 0 {
        state.exceptions.set_pending(Exception::PendSv);
    }
    if value & ICSR_PENDSVCLR != 0 && state.exceptions.is_pending(Exception::PendSv) {
        state.exceptions.clear_pending(Exception::PendSv);
    }
    if value & ICSR_PENDSTSET != 0 {
        state.exceptions.set_pending(Exception::SysTick);
    }
    if value & ICSR_PENDSTCLR != 0 && state.exceptions.is_pending(Exception::SysTick) {
        state.exceptions.clear_pending(Exception::SysTick);
    }
}

fn vtor_read(state: &mut CpuState) -> u32 {
    state.read_special(SpecialReg::Vtor)
}

fn vtor_write(state: &mut CpuState, value: u32) {
    // TBLOFF occupies [31:7].
    state.write_special(SpecialReg::Vtor, value & !0x7F);
}

fn aircr_read(state: &mut CpuState) -> u32 {
    AIRCR_VECTKEY | (state.read_special(SpecialReg::Aircr) & 0xFFFF)
}

fn aircr_write(state: &mut CpuState, value: u32) {
    // Writes without the key are ignored. SYSRESETREQ is not modeled.
    if value & 0xFFFF_0000 == AIRCR_VECTKEY {
        state.write_special(SpecialReg::Aircr, value & 0xFFFF);
    }
}

fn ccr_read(state: &mut CpuState) -> u32 {
    state.read_special(SpecialReg::Ccr)
}

fn ccr_write(state: &mut CpuState, value: u32) {
    state.write_special(SpecialReg::Ccr, value);
}

fn prio_byte(state: &CpuState, exception: Exception) -> u32 {
    (state.exceptions.priority(exception).clamp(0, 255) as u32) & 0xFF
}

fn shpr1_read(state: &mut CpuState) -> u32 {
    prio_byte(state, Exception::MemManage)
        | prio_byte(state, Exception::BusFault) << 8
        | prio_byte(state, Exception::UsageFault) << 16
}

fn shpr1_write(state: &mut CpuState, value: u32) {
    state
        .exceptions
        .set_priority(Exception::MemManage, (value & 0xFF) as i16);
    state
        .exceptions
        .set_priority(Exception::BusFault, ((value >> 8) & 0xFF) as i16);
    state
        .exceptions
        .set_priority(Exception::UsageFault, ((value >> 16) & 0xFF) as i16);
}

fn shpr2_read(state: &mut CpuState) -> u32 {
    prio_byte(state, Exception::SvCall) << 24
}

fn shpr2_write(state: &mut CpuState, value: u32) {
    state
        .exceptions
        .set_priority(Exception::SvCall, ((value >> 24) & 0xFF) as i16);
}

fn shpr3_read(state: &mut CpuState) -> u32 {
    prio_byte(state, Exception::PendSv) << 16 | prio_byte(state, Exception::SysTick) << 24
}

fn shpr3_write(state: &mut CpuState, value: u32) {
    state
        .exceptions
        .set_priority(Exception::PendSv, ((value >> 16) & 0xFF) as i16);
    state
        .exceptions
        .set_priority(Exception::SysTick, ((value >> 24) & 0xFF) as i16);
}

fn shcsr_read(state: &mut CpuState) -> u32 {
    state.read_special(SpecialReg::Shcsr)
}

fn shcsr_write(state: &mut CpuState, value: u32) {
    state.write_special(SpecialReg::Shcsr, value);
}

fn cfsr_read(state: &mut CpuState) -> u32 {
    state.read_special(SpecialReg::Cfsr)
}

fn cfsr_write(state: &mut CpuState, value: u32) {
    // Write-one-to-clear.
    let cfsr = state.read_special(SpecialReg::Cfsr);
    state.write_special(SpecialReg::Cfsr, cfsr & !value);
}

fn hfsr_read(state: &mut CpuState) -> u32 {
    state.read_special(SpecialReg::Hfsr)
}

fn hfsr_write(state: &mut CpuState, value: u32) {
    let hfsr = state.read_special(SpecialReg::Hfsr);
    state.write_special(SpecialReg::Hfsr, hfsr & !value);
}

fn bfar_read(state: &mut CpuState) -> u32 {
    state.read_special(SpecialReg::Bfar)
}

fn bfar_write(state: &mut CpuState, value: u32) {
    state.write_special(SpecialReg::Bfar, value);
}

fn reserved_write(_state: &mut CpuState, _value: u32) {}

pub static REGISTERS: &[RegisterSpec] = &[
    RegisterSpec {
        offset: OFF_CPUID,
        read_only: true,
        read_modify_write: false,
        read: cpuid_read,
        write: reserved_write,
    },
    RegisterSpec {
        offset: OFF_ICSR,
        read_only: false,
        read_modify_write: false,
        read: icsr_read,
        write: icsr_write,
    },
    RegisterSpec {
        offset: OFF_VTOR,
        read_only: false,
        read_modify_write: true,
        read: vtor_read,
        write: vtor_write,
    },
    RegisterSpec {
        offset: OFF_AIRCR,
        read_only: false,
        read_modify_write: false,
        read: aircr_read,
        write: aircr_write,
    },
    RegisterSpec {
        offset: OFF_CCR,
        read_only: false,
        read_modify_write: true,
        read: ccr_read,
        write: ccr_write,
    },
    RegisterSpec {
        offset: OFF_SHPR1,
        read_only: false,
        read_modify_write: true,
        read: shpr1_read,
        write: shpr1_write,
    },
    RegisterSpec {
        offset: OFF_SHPR2,
        read_only: false,
        read_modify_write: true,
        read: shpr2_read,
        write: shpr2_write,
    },
    RegisterSpec {
        offset: OFF_SHPR3,
        read_only: false,
        read_modify_write: true,
        read: shpr3_read,
        write: shpr3_write,
    },
    RegisterSpec {
        offset: OFF_SHCSR,
        read_only: false,
        read_modify_write: true,
        read: shcsr_read,
        write: shcsr_write,
    },
    RegisterSpec {
        offset: OFF_CFSR,
        read_only: false,
        read_modify_write: false,
        read: cfsr_read,
        write: cfsr_write,
    },
    RegisterSpec {
        offset: OFF_HFSR,
        read_only: false,
        read_modify_write: false,
        read: hfsr_read,
        write: hfsr_write,
    },
    RegisterSpec {
        offset: OFF_BFAR,
        read_only: false,
        read_modify_write: true,
        read: bfar_read,
        write: bfar_write,
    },
];
