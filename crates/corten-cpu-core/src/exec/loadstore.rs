//! Load/store execution: single accesses with the four addressing modes,
//! dual and exclusive accesses, and the multiple-register transfers.
//!
//! Data accesses use the precise bus-fault kind: a failed access records
//! CFSR/BFAR, pends a BusFault and completes with a zero value so the step
//! loop can deliver the fault at its next check point.

use super::{load_write_pc, Control};
use crate::alu::{self, shift};
use crate::decode::{Instr, InstrFlags};
use crate::error::CoreError;
use crate::exceptions::Exception;
use crate::mem::{BusFaultKind, SystemBus};
use crate::state::{reg, CpuState, SpecialReg, CCR_UNALIGN_TRP, CFSR_UNALIGNED};

/// Access width of a single load/store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    Byte,
    Half,
    Word,
}

/// Offset-addressing result: the address to access and the value the base
/// register takes on write-back.
fn address_mode(base: u32, imm32: u32, flags: InstrFlags) -> (u32, u32) {
    let offset_addr = if flags.contains(InstrFlags::ADD) {
        base.wrapping_add(imm32)
    } else {
        base.wrapping_sub(imm32)
    };
    let address = if flags.contains(InstrFlags::INDEX) {
        offset_addr
    } else {
        base
    };
    (address, offset_addr)
}

/// The unaligned-access trap check: pend a UsageFault when the address is
/// unaligned, the encoding does not tolerate it, and `CCR.UNALIGN_TRP` asks
/// for the trap. Returns `true` when the access must be abandoned.
fn unaligned_trap(state: &mut CpuState, address: u32, width: Width, flags: InstrFlags) -> bool {
    let align = match width {
        Width::Byte => return false,
        Width::Half => 2,
        Width::Word => 4,
    };
    if address % align == 0 || flags.contains(InstrFlags::UNALIGNED_ALLOW) {
        return false;
    }
    if state.read_special(SpecialReg::Ccr) & CCR_UNALIGN_TRP == 0 {
        return false;
    }
    state.or_cfsr(CFSR_UNALIGNED);
    state.exceptions.set_pending(Exception::UsageFault);
    true
}

fn load(
    state: &mut CpuState,
    bus: &mut SystemBus<'_>,
    address: u32,
    width: Width,
    signed: bool,
) -> u32 {
    match (width, signed) {
        (Width::Byte, false) => u32::from(bus.read_u8_or_raise(state, address, BusFaultKind::Precise)),
        (Width::Byte, true) => {
            alu::sign_extend(u32::from(bus.read_u8_or_raise(state, address, BusFaultKind::Precise)), 7)
        }
        (Width::Half, false) => u32::from(bus.read_u16_or_raise(state, address, BusFaultKind::Precise)),
        (Width::Half, true) => {
            alu::sign_extend(u32::from(bus.read_u16_or_raise(state, address, BusFaultKind::Precise)), 15)
        }
        (Width::Word, _) => bus.read_u32_or_raise(state, address, BusFaultKind::Precise),
    }
}

fn store(state: &mut CpuState, bus: &mut SystemBus<'_>, address: u32, width: Width, value: u32) {
    match width {
        Width::Byte => bus.write_u8_or_raise(state, address, value as u8, BusFaultKind::Precise),
        Width::Half => bus.write_u16_or_raise(state, address, value as u16, BusFaultKind::Precise),
        Width::Word => bus.write_u32_or_raise(state, address, value, BusFaultKind::Precise),
    }
}

/// Immediate-offset load with optional write-back; `t` may be the PC for
/// word loads.
fn load_immediate(
    state: &mut CpuState,
    bus: &mut SystemBus<'_>,
    t: u8,
    n: u8,
    imm32: u32,
    flags: InstrFlags,
    width: Width,
    signed: bool,
) -> Result<Control, CoreError> {
    let base = state.read_reg(n);
    let (address, offset_addr) = address_mode(base, imm32, flags);
    if unaligned_trap(state, address, width, flags) {
        return Ok(Control::Advance);
    }
    let data = load(state, bus, address, width, signed);
    if flags.contains(InstrFlags::WBACK) {
        state.write_reg(n, offset_addr);
    }
    if t == 15 {
        debug_assert_eq!(width, Width::Word);
        if load_write_pc(state, bus, data)? {
            return Ok(Control::ExceptionReturn);
        }
        return Ok(Control::Branch);
    }
    state.write_reg(t, data);
    Ok(Control::Advance)
}

fn store_immediate(
    state: &mut CpuState,
    bus: &mut SystemBus<'_>,
    t: u8,
    n: u8,
    imm32: u32,
    flags: InstrFlags,
    width: Width,
) -> Control {
    let base = state.read_reg(n);
    let (address, offset_addr) = address_mode(base, imm32, flags);
    if unaligned_trap(state, address, width, flags) {
        return Control::Advance;
    }
    let value = state.read_reg(t);
    store(state, bus, address, width, value);
    if flags.contains(InstrFlags::WBACK) {
        state.write_reg(n, offset_addr);
    }
    Control::Advance
}

fn register_offset(state: &CpuState, n: u8, m: u8, shift_res: alu::ImmShift) -> u32 {
    let offset = shift(
        state.read_reg(m),
        shift_res.srtype,
        u32::from(shift_res.amount),
        state.apsr_c(),
    );
    state.read_reg(n).wrapping_add(offset)
}

pub(super) fn execute(
    state: &mut CpuState,
    bus: &mut SystemBus<'_>,
    instr: &Instr,
) -> Result<Control, CoreError> {
    match *instr {
        Instr::LdrImmediate { flags, t, n, imm32 } => {
            load_immediate(state, bus, t, n, imm32, flags, Width::Word, false)
        }
        Instr::LdrbImmediate { flags, t, n, imm32 } => {
            load_immediate(state, bus, t, n, imm32, flags, Width::Byte, false)
        }
        Instr::LdrhImmediate { flags, t, n, imm32 } => {
            load_immediate(state, bus, t, n, imm32, flags, Width::Half, false)
        }
        Instr::LdrsbImmediate { flags, t, n, imm32 } => {
            load_immediate(state, bus, t, n, imm32, flags, Width::Byte, true)
        }
        Instr::LdrshImmediate { flags, t, n, imm32 } => {
            load_immediate(state, bus, t, n, imm32, flags, Width::Half, true)
        }
        Instr::LdrLiteral { flags, t, imm32 } => {
            let base = state.read_reg(reg::PC) & !3;
            let address = if flags.contains(InstrFlags::ADD) {
                base.wrapping_add(imm32)
            } else {
                base.wrapping_sub(imm32)
            };
            let data = load(state, bus, address, Width::Word, false);
            if t == 15 {
                if load_write_pc(state, bus, data)? {
                    return Ok(Control::ExceptionReturn);
                }
                return Ok(Control::Branch);
            }
            state.write_reg(t, data);
            Ok(Control::Advance)
        }
        Instr::LdrRegister { flags, t, n, m, shift } => {
            let address = register_offset(state, n, m, shift);
            if unaligned_trap(state, address, Width::Word, flags) {
                return Ok(Control::Advance);
            }
            let data = load(state, bus, address, Width::Word, false);
            if t == 15 {
                if load_write_pc(state, bus, data)? {
                    return Ok(Control::ExceptionReturn);
                }
                return Ok(Control::Branch);
            }
            state.write_reg(t, data);
            Ok(Control::Advance)
        }
        Instr::LdrbRegister { t, n, m, shift, .. } => {
            let address = register_offset(state, n, m, shift);
            let data = load(state, bus, address, Width::Byte, false);
            state.write_reg(t, data);
            Ok(Control::Advance)
        }
        Instr::LdrsbRegister { t, n, m, shift, .. } => {
            let address = register_offset(state, n, m, shift);
            let data = load(state, bus, address, Width::Byte, true);
            state.write_reg(t, data);
            Ok(Control::Advance)
        }
        Instr::LdrhRegister { flags, t, n, m, shift } => {
            let address = register_offset(state, n, m, shift);
            if unaligned_trap(state, address, Width::Half, flags) {
                return Ok(Control::Advance);
            }
            let data = load(state, bus, address, Width::Half, false);
            state.write_reg(t, data);
            Ok(Control::Advance)
        }
        Instr::LdrshRegister { flags, t, n, m, shift } => {
            let address = register_offset(state, n, m, shift);
            if unaligned_trap(state, address, Width::Half, flags) {
                return Ok(Control::Advance);
            }
            let data = load(state, bus, address, Width::Half, true);
            state.write_reg(t, data);
            Ok(Control::Advance)
        }
        Instr::StrImmediate { flags, t, n, imm32 } => {
            Ok(store_immediate(state, bus, t, n, imm32, flags, Width::Word))
        }
        Instr::StrbImmediate { flags, t, n, imm32 } => {
            Ok(store_immediate(state, bus, t, n, imm32, flags, Width::Byte))
        }
        Instr::StrhImmediate { flags, t, n, imm32 } => {
            Ok(store_immediate(state, bus, t, n, imm32, flags, Width::Half))
        }
        Instr::StrRegister { flags, t, n, m, shift } => {
            let address = register_offset(state, n, m, shift);
            if unaligned_trap(state, address, Width::Word, flags) {
                return Ok(Control::Advance);
            }
            let value = state.read_reg(t);
            store(state, bus, address, Width::Word, value);
            Ok(Control::Advance)
        }
        Instr::StrbRegister { t, n, m, shift, .. } => {
            let address = register_offset(state, n, m, shift);
            let value = state.read_reg(t);
            store(state, bus, address, Width::Byte, value);
            Ok(Control::Advance)
        }
        Instr::StrhRegister { flags, t, n, m, shift } => {
            let address = register_offset(state, n, m, shift);
            if unaligned_trap(state, address, Width::Half, flags) {
                return Ok(Control::Advance);
            }
            let value = state.read_reg(t);
            store(state, bus, address, Width::Half, value);
            Ok(Control::Advance)
        }
        Instr::LdrdImmediate { flags, t, t2, n, imm32 } => {
            let base = state.read_reg(n);
            let (address, offset_addr) = address_mode(base, imm32, flags);
            if unaligned_trap(state, address, Width::Word, flags) {
                return Ok(Control::Advance);
            }
            let lo = load(state, bus, address, Width::Word, false);
            let hi = load(state, bus, address.wrapping_add(4), Width::Word, false);
            state.write_reg(t, lo);
            state.write_reg(t2, hi);
            if flags.contains(InstrFlags::WBACK) {
                state.write_reg(n, offset_addr);
            }
            Ok(Control::Advance)
        }
        Instr::StrdImmediate { flags, t, t2, n, imm32 } => {
            let base = state.read_reg(n);
            let (address, offset_addr) = address_mode(base, imm32, flags);
            if unaligned_trap(state, address, Width::Word, flags) {
                return Ok(Control::Advance);
            }
            let lo = state.read_reg(t);
            let hi = state.read_reg(t2);
            store(state, bus, address, Width::Word, lo);
            store(state, bus, address.wrapping_add(4), Width::Word, hi);
            if flags.contains(InstrFlags::WBACK) {
                state.write_reg(n, offset_addr);
            }
            Ok(Control::Advance)
        }
        Instr::Ldrex { flags, t, n, imm32 } => {
            // Single-core model: the exclusive monitor always grants.
            let address = state.read_reg(n).wrapping_add(imm32);
            if unaligned_trap(state, address, Width::Word, flags) {
                return Ok(Control::Advance);
            }
            let data = load(state, bus, address, Width::Word, false);
            state.write_reg(t, data);
            Ok(Control::Advance)
        }
        Instr::Strex { flags, d, t, n, imm32 } => {
            let address = state.read_reg(n).wrapping_add(imm32);
            if unaligned_trap(state, address, Width::Word, flags) {
                return Ok(Control::Advance);
            }
            let value = state.read_reg(t);
            store(state, bus, address, Width::Word, value);
            // Always succeeds on the single-core model.
            state.write_reg(d, 0);
            Ok(Control::Advance)
        }
        Instr::Push { registers, .. } => {
            let count = registers.count_ones();
            let bottom = state.read_sp().wrapping_sub(4 * count);
            let mut address = bottom;
            for i in 0..=14u8 {
                if registers >> i & 1 != 0 {
                    let value = state.read_reg(i);
                    store(state, bus, address, Width::Word, value);
                    address = address.wrapping_add(4);
                }
            }
            state.write_sp(bottom);
            Ok(Control::Advance)
        }
        Instr::Pop { registers, .. } => {
            let count = registers.count_ones();
            let mut address = state.read_sp();
            let new_sp = address.wrapping_add(4 * count);
            let mut pc_value = None;
            for i in 0..=15u8 {
                if registers >> i & 1 != 0 {
                    let data = load(state, bus, address, Width::Word, false);
                    if i == 15 {
                        pc_value = Some(data);
                    } else {
                        state.write_reg(i, data);
                    }
                    address = address.wrapping_add(4);
                }
            }
            state.write_sp(new_sp);
            if let Some(target) = pc_value {
                if load_write_pc(state, bus, target)? {
                    return Ok(Control::ExceptionReturn);
                }
                return Ok(Control::Branch);
            }
            Ok(Control::Advance)
        }
        Instr::Stm { flags, n, registers } => {
            let mut address = state.read_reg(n);
            for i in 0..=14u8 {
                if registers >> i & 1 != 0 {
                    let value = state.read_reg(i);
                    store(state, bus, address, Width::Word, value);
                    address = address.wrapping_add(4);
                }
            }
            if flags.contains(InstrFlags::WBACK) {
                state.write_reg(n, address);
            }
            Ok(Control::Advance)
        }
        Instr::Stmdb { flags, n, registers } => {
            let count = registers.count_ones();
            let bottom = state.read_reg(n).wrapping_sub(4 * count);
            let mut address = bottom;
            for i in 0..=14u8 {
                if registers >> i & 1 != 0 {
                    let value = state.read_reg(i);
                    store(state, bus, address, Width::Word, value);
                    address = address.wrapping_add(4);
                }
            }
            if flags.contains(InstrFlags::WBACK) {
                state.write_reg(n, bottom);
            }
            Ok(Control::Advance)
        }
        Instr::Ldm { flags, n, registers } => {
            let mut address = state.read_reg(n);
            let mut pc_value = None;
            for i in 0..=15u8 {
                if registers >> i & 1 != 0 {
                    let data = load(state, bus, address, Width::Word, false);
                    if i == 15 {
                        pc_value = Some(data);
                    } else {
                        state.write_reg(i, data);
                    }
                    address = address.wrapping_add(4);
                }
            }
            if flags.contains(InstrFlags::WBACK) {
                state.write_reg(n, address);
            }
            if let Some(target) = pc_value {
                if load_write_pc(state, bus, target)? {
                    return Ok(Control::ExceptionReturn);
                }
                return Ok(Control::Branch);
            }
            Ok(Control::Advance)
        }
        Instr::Ldmdb { flags, n, registers } => {
            let count = registers.count_ones();
            let bottom = state.read_reg(n).wrapping_sub(4 * count);
            let mut address = bottom;
            let mut pc_value = None;
            for i in 0..=15u8 {
                if registers >> i & 1 != 0 {
                    let data = load(state, bus, address, Width::Word, false);
                    if i == 15 {
                        pc_value = Some(data);
                    } else {
                        state.write_reg(i, data);
                    }
                    address = address.wrapping_add(4);
                }
            }
            if flags.contains(InstrFlags::WBACK) {
                state.write_reg(n, bottom);
            }
            if let Some(target) = pc_value {
                if load_write_pc(state, bus, target)? {
                    return Ok(Control::ExceptionReturn);
                }
                return Ok(Control::Branch);
            }
            Ok(Control::Advance)
        }
        _ => Err(CoreError::Unexpected),
    }
}
