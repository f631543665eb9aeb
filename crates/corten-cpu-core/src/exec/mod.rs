//! The executor: applies one decoded instruction to the CPU state.
//!
//! Each instruction runs through the same frame: condition gate, operand
//! gather (PC reads carry the +4 bias), compute, optional flag update,
//! destination write (PC writes go through the architectural write
//! variants), IT advance, PC step. Recoverable faults (bus errors on data
//! accesses, usage faults) pend an exception and let the step loop deliver
//! it; only unpredictable/undefined situations surface as errors.

mod loadstore;

use std::io::Write;

use crate::alu::{self, shift_c, SrType};
use crate::decode::{Instr, InstrFlags};
use crate::error::CoreError;
use crate::exceptions::{self, Exception};
use crate::it::{self, condition_passed, current_cond, in_it_block};
use crate::mem::SystemBus;
use crate::semihost::Semihost;
use crate::state::{
    reg, CpuState, Mode, SpecialReg, APSR_MASK, CCR_DIV_0_TRP, CFSR_DIVBYZERO, CONTROL_SPSEL,
    IPSR_EXC_MASK,
};

bitflags::bitflags! {
    /// Outcomes the step loop inspects after execution.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ExecFlags: u8 {
        const BKPT_REQ_EXIT = 1 << 0;
        const SVC_REQ_EXIT = 1 << 1;
        const BKPT_REQ_ERROR_EXIT = 1 << 2;
        const SVC_REQ_ERROR_EXIT = 1 << 3;
    }
}

/// How the instruction left the program counter and IT state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    /// Ordinary instruction: advance IT state and step the PC.
    Advance,
    /// The IT instruction itself: step the PC but keep the fresh IT state.
    AdvanceNoIt,
    /// An ordinary branch wrote the PC; IT state still advances.
    Branch,
    /// An exception return restored the PSR; touch nothing.
    ExceptionReturn,
}

pub(crate) fn branch_write_pc(state: &mut CpuState, address: u32) {
    state.branch_to(address & !1);
}

pub(crate) fn alu_write_pc(state: &mut CpuState, address: u32) {
    branch_write_pc(state, address);
}

pub(crate) fn blx_write_pc(state: &mut CpuState, address: u32) {
    state.set_thumb_bit(address & 1 != 0);
    state.branch_to(address & !1);
}

/// Interworking branch: in Handler mode an `0xFxxxxxxx` target is an
/// exception return. Returns whether one happened.
pub(crate) fn bx_write_pc(
    state: &mut CpuState,
    bus: &mut SystemBus<'_>,
    address: u32,
) -> Result<bool, CoreError> {
    if state.mode() == Mode::Handler && address >> 28 == 0xF {
        exceptions::exception_return(state, bus, address & 0x0FFF_FFFF)?;
        Ok(true)
    } else {
        blx_write_pc(state, address);
        Ok(false)
    }
}

fn load_write_pc(
    state: &mut CpuState,
    bus: &mut SystemBus<'_>,
    address: u32,
) -> Result<bool, CoreError> {
    bx_write_pc(state, bus, address)
}

fn advance_pc(state: &mut CpuState, wide: bool) {
    let next = state.instr_addr().wrapping_add(if wide { 4 } else { 2 });
    state.branch_to(next);
}

fn set_flags_nz(state: &mut CpuState, flags: InstrFlags, result: u32) {
    if flags.contains(InstrFlags::SETFLAGS) {
        state.set_flags(result, None, None);
    }
}

fn set_flags_nzc(state: &mut CpuState, flags: InstrFlags, result: u32, carry: bool) {
    if flags.contains(InstrFlags::SETFLAGS) {
        state.set_flags(result, Some(carry), None);
    }
}

fn set_flags_nzcv(state: &mut CpuState, flags: InstrFlags, r: alu::AddWithCarry) {
    if flags.contains(InstrFlags::SETFLAGS) {
        state.set_flags(r.result, Some(r.carry_out), Some(r.overflow));
    }
}

/// Shifted register operand with the carry it produces.
fn shifted_operand(state: &CpuState, m: u8, shift: alu::ImmShift) -> (u32, bool) {
    shift_c(
        state.read_reg(m),
        shift.srtype,
        u32::from(shift.amount),
        state.apsr_c(),
    )
}

pub fn execute<W: Write>(
    state: &mut CpuState,
    bus: &mut SystemBus<'_>,
    instr: &Instr,
    semihost: &mut Semihost<W>,
) -> Result<ExecFlags, CoreError> {
    // Inside an IT block the block condition governs; a conditional branch
    // outside one carries its own condition.
    let cond = if in_it_block(state) {
        current_cond(state).ok_or(CoreError::ExecutorUnpredictable)?
    } else if let Instr::BCond { cond, .. } = instr {
        *cond
    } else {
        it::cond::AL
    };

    if !matches!(instr, Instr::It { .. }) && !condition_passed(state, cond) {
        it::it_advance(state);
        advance_pc(state, instr.is_wide());
        return Ok(ExecFlags::empty());
    }

    let mut exec_flags = ExecFlags::empty();
    let control = match *instr {
        Instr::Nop { .. } | Instr::Dmb { .. } | Instr::Dsb { .. } | Instr::Isb { .. } => {
            Control::Advance
        }

        Instr::It { firstcond, mask, .. } => {
            it::it_init(state, firstcond, mask);
            Control::AdvanceNoIt
        }

        // Moves and shifts.
        Instr::MovImmediate { flags, d, imm } => {
            state.write_reg(d, imm.imm32);
            set_flags_nzc(state, flags, imm.imm32, imm.carry);
            Control::Advance
        }
        Instr::MvnImmediate { flags, d, imm } => {
            let result = !imm.imm32;
            state.write_reg(d, result);
            set_flags_nzc(state, flags, result, imm.carry);
            Control::Advance
        }
        Instr::Movt { d, imm16, .. } => {
            let result = (state.read_reg(d) & 0xFFFF) | (u32::from(imm16) << 16);
            state.write_reg(d, result);
            Control::Advance
        }
        Instr::MovRegister { flags, d, m } => {
            let result = state.read_reg(m);
            if d == 15 {
                alu_write_pc(state, result);
                Control::Branch
            } else {
                state.write_reg(d, result);
                set_flags_nz(state, flags, result);
                Control::Advance
            }
        }
        Instr::MvnRegister { flags, d, m, shift } => {
            let (shifted, carry) = shifted_operand(state, m, shift);
            let result = !shifted;
            state.write_reg(d, result);
            set_flags_nzc(state, flags, result, carry);
            Control::Advance
        }
        Instr::LslImmediate { flags, d, m, shift }
        | Instr::LsrImmediate { flags, d, m, shift }
        | Instr::AsrImmediate { flags, d, m, shift }
        | Instr::RorImmediate { flags, d, m, shift } => {
            let (result, carry) = shifted_operand(state, m, shift);
            state.write_reg(d, result);
            set_flags_nzc(state, flags, result, carry);
            Control::Advance
        }
        Instr::Rrx { flags, d, m } => {
            let (result, carry) = alu::rrx_c(state.read_reg(m), state.apsr_c());
            state.write_reg(d, result);
            set_flags_nzc(state, flags, result, carry);
            Control::Advance
        }
        Instr::LslRegister { flags, d, n, m }
        | Instr::LsrRegister { flags, d, n, m }
        | Instr::AsrRegister { flags, d, n, m }
        | Instr::RorRegister { flags, d, n, m } => {
            let srtype = match instr {
                Instr::LslRegister { .. } => SrType::Lsl,
                Instr::LsrRegister { .. } => SrType::Lsr,
                Instr::AsrRegister { .. } => SrType::Asr,
                _ => SrType::Ror,
            };
            let amount = state.read_reg(m) & 0xFF;
            let (result, carry) = shift_c(state.read_reg(n), srtype, amount, state.apsr_c());
            state.write_reg(d, result);
            set_flags_nzc(state, flags, result, carry);
            Control::Advance
        }

        // Add/subtract.
        Instr::AddImmediate { flags, d, n, imm32 } => {
            let r = alu::add_with_carry(state.read_reg(n), imm32, false);
            state.write_reg(d, r.result);
            set_flags_nzcv(state, flags, r);
            Control::Advance
        }
        Instr::AdcImmediate { flags, d, n, imm32 } => {
            let r = alu::add_with_carry(state.read_reg(n), imm32, state.apsr_c());
            state.write_reg(d, r.result);
            set_flags_nzcv(state, flags, r);
            Control::Advance
        }
        Instr::SubImmediate { flags, d, n, imm32 } => {
            let r = alu::add_with_carry(state.read_reg(n), !imm32, true);
            state.write_reg(d, r.result);
            set_flags_nzcv(state, flags, r);
            Control::Advance
        }
        Instr::SbcImmediate { flags, d, n, imm32 } => {
            let r = alu::add_with_carry(state.read_reg(n), !imm32, state.apsr_c());
            state.write_reg(d, r.result);
            set_flags_nzcv(state, flags, r);
            Control::Advance
        }
        Instr::RsbImmediate { flags, d, n, imm32 } => {
            let r = alu::add_with_carry(!state.read_reg(n), imm32, true);
            state.write_reg(d, r.result);
            set_flags_nzcv(state, flags, r);
            Control::Advance
        }
        Instr::AddRegister { flags, d, n, m, shift } => {
            let (shifted, _) = shifted_operand(state, m, shift);
            let r = alu::add_with_carry(state.read_reg(n), shifted, false);
            if d == 15 {
                alu_write_pc(state, r.result);
                Control::Branch
            } else {
                state.write_reg(d, r.result);
                set_flags_nzcv(state, flags, r);
                Control::Advance
            }
        }
        Instr::AdcRegister { flags, d, n, m, shift } => {
            let (shifted, _) = shifted_operand(state, m, shift);
            let r = alu::add_with_carry(state.read_reg(n), shifted, state.apsr_c());
            state.write_reg(d, r.result);
            set_flags_nzcv(state, flags, r);
            Control::Advance
        }
        Instr::SubRegister { flags, d, n, m, shift } => {
            let (shifted, _) = shifted_operand(state, m, shift);
            let r = alu::add_with_carry(state.read_reg(n), !shifted, true);
            state.write_reg(d, r.result);
            set_flags_nzcv(state, flags, r);
            Control::Advance
        }
        Instr::SbcRegister { flags, d, n, m, shift } => {
            let (shifted, _) = shifted_operand(state, m, shift);
            let r = alu::add_with_carry(state.read_reg(n), !shifted, state.apsr_c());
            state.write_reg(d, r.result);
            set_flags_nzcv(state, flags, r);
            Control::Advance
        }
        Instr::RsbRegister { flags, d, n, m, shift } => {
            let (shifted, _) = shifted_operand(state, m, shift);
            let r = alu::add_with_carry(!state.read_reg(n), shifted, true);
            state.write_reg(d, r.result);
            set_flags_nzcv(state, flags, r);
            Control::Advance
        }
        Instr::AddSpPlusImmediate { d, imm32, .. } => {
            let result = state.read_sp().wrapping_add(imm32);
            state.write_reg(d, result);
            Control::Advance
        }
        Instr::SubSpMinusImmediate { d, imm32, .. } => {
            let result = state.read_sp().wrapping_sub(imm32);
            state.write_reg(d, result);
            Control::Advance
        }
        Instr::Adr { flags, d, imm32 } => {
            let base = state.read_reg(reg::PC) & !3;
            let result = if flags.contains(InstrFlags::ADD) {
                base.wrapping_add(imm32)
            } else {
                base.wrapping_sub(imm32)
            };
            state.write_reg(d, result);
            Control::Advance
        }

        // Logical operations.
        Instr::AndImmediate { flags, d, n, imm } => {
            let result = state.read_reg(n) & imm.imm32;
            state.write_reg(d, result);
            set_flags_nzc(state, flags, result, imm.carry);
            Control::Advance
        }
        Instr::OrrImmediate { flags, d, n, imm } => {
            let result = state.read_reg(n) | imm.imm32;
            state.write_reg(d, result);
            set_flags_nzc(state, flags, result, imm.carry);
            Control::Advance
        }
        Instr::EorImmediate { flags, d, n, imm } => {
            let result = state.read_reg(n) ^ imm.imm32;
            state.write_reg(d, result);
            set_flags_nzc(state, flags, result, imm.carry);
            Control::Advance
        }
        Instr::BicImmediate { flags, d, n, imm } => {
            let result = state.read_reg(n) & !imm.imm32;
            state.write_reg(d, result);
            set_flags_nzc(state, flags, result, imm.carry);
            Control::Advance
        }
        Instr::AndRegister { flags, d, n, m, shift }
        | Instr::OrrRegister { flags, d, n, m, shift }
        | Instr::EorRegister { flags, d, n, m, shift }
        | Instr::BicRegister { flags, d, n, m, shift } => {
            let (shifted, carry) = shifted_operand(state, m, shift);
            let rn = state.read_reg(n);
            let result = match instr {
                Instr::AndRegister { .. } => rn & shifted,
                Instr::OrrRegister { .. } => rn | shifted,
                Instr::EorRegister { .. } => rn ^ shifted,
                _ => rn & !shifted,
            };
            state.write_reg(d, result);
            set_flags_nzc(state, flags, result, carry);
            Control::Advance
        }

        // Compares and tests always write flags.
        Instr::CmpImmediate { n, imm32, .. } => {
            let r = alu::add_with_carry(state.read_reg(n), !imm32, true);
            state.set_flags(r.result, Some(r.carry_out), Some(r.overflow));
            Control::Advance
        }
        Instr::CmnImmediate { n, imm32, .. } => {
            let r = alu::add_with_carry(state.read_reg(n), imm32, false);
            state.set_flags(r.result, Some(r.carry_out), Some(r.overflow));
            Control::Advance
        }
        Instr::CmpRegister { n, m, shift, .. } => {
            let (shifted, _) = shifted_operand(state, m, shift);
            let r = alu::add_with_carry(state.read_reg(n), !shifted, true);
            state.set_flags(r.result, Some(r.carry_out), Some(r.overflow));
            Control::Advance
        }
        Instr::CmnRegister { n, m, shift, .. } => {
            let (shifted, _) = shifted_operand(state, m, shift);
            let r = alu::add_with_carry(state.read_reg(n), shifted, false);
            state.set_flags(r.result, Some(r.carry_out), Some(r.overflow));
            Control::Advance
        }
        Instr::TstImmediate { n, imm, .. } => {
            let result = state.read_reg(n) & imm.imm32;
            state.set_flags(result, Some(imm.carry), None);
            Control::Advance
        }
        Instr::TeqImmediate { n, imm, .. } => {
            let result = state.read_reg(n) ^ imm.imm32;
            state.set_flags(result, Some(imm.carry), None);
            Control::Advance
        }
        Instr::TstRegister { n, m, shift, .. } => {
            let (shifted, carry) = shifted_operand(state, m, shift);
            let result = state.read_reg(n) & shifted;
            state.set_flags(result, Some(carry), None);
            Control::Advance
        }
        Instr::TeqRegister { n, m, shift, .. } => {
            let (shifted, carry) = shifted_operand(state, m, shift);
            let result = state.read_reg(n) ^ shifted;
            state.set_flags(result, Some(carry), None);
            Control::Advance
        }

        // Extends, CLZ, bitfields.
        Instr::Sxtb { d, m, rotation, .. } => {
            let rotated = alu::ror(state.read_reg(m), u32::from(rotation));
            state.write_reg(d, alu::sign_extend(rotated & 0xFF, 7));
            Control::Advance
        }
        Instr::Sxth { d, m, rotation, .. } => {
            let rotated = alu::ror(state.read_reg(m), u32::from(rotation));
            state.write_reg(d, alu::sign_extend(rotated & 0xFFFF, 15));
            Control::Advance
        }
        Instr::Uxtb { d, m, rotation, .. } => {
            let rotated = alu::ror(state.read_reg(m), u32::from(rotation));
            state.write_reg(d, rotated & 0xFF);
            Control::Advance
        }
        Instr::Uxth { d, m, rotation, .. } => {
            let rotated = alu::ror(state.read_reg(m), u32::from(rotation));
            state.write_reg(d, rotated & 0xFFFF);
            Control::Advance
        }
        Instr::Clz { d, m, .. } => {
            state.write_reg(d, state.read_reg(m).leading_zeros());
            Control::Advance
        }
        Instr::Bfi { d, n, lsbit, msbit, .. } => {
            let width = u32::from(msbit) - u32::from(lsbit) + 1;
            let mask = (if width == 32 { u32::MAX } else { (1 << width) - 1 }) << lsbit;
            let inserted = state.read_reg(n) << lsbit;
            let result = (state.read_reg(d) & !mask) | (inserted & mask);
            state.write_reg(d, result);
            Control::Advance
        }
        Instr::Ubfx { d, n, lsbit, widthminus1, .. } => {
            let msbit = u32::from(lsbit) + u32::from(widthminus1);
            if msbit > 31 {
                return Err(CoreError::ExecutorUnpredictable);
            }
            let result = (state.read_reg(n) >> lsbit)
                & (u32::MAX >> (31 - u32::from(widthminus1)));
            state.write_reg(d, result);
            Control::Advance
        }
        Instr::Sbfx { d, n, lsbit, widthminus1, .. } => {
            let msbit = u32::from(lsbit) + u32::from(widthminus1);
            if msbit > 31 {
                return Err(CoreError::ExecutorUnpredictable);
            }
            let field = (state.read_reg(n) >> lsbit)
                & (u32::MAX >> (31 - u32::from(widthminus1)));
            state.write_reg(d, alu::sign_extend(field, u32::from(widthminus1)));
            Control::Advance
        }

        // Multiplies and divides.
        Instr::Mul { flags, d, n, m } => {
            let result = state.read_reg(n).wrapping_mul(state.read_reg(m));
            state.write_reg(d, result);
            set_flags_nz(state, flags, result);
            Control::Advance
        }
        Instr::Mla { d, n, m, a, .. } => {
            let result = state
                .read_reg(n)
                .wrapping_mul(state.read_reg(m))
                .wrapping_add(state.read_reg(a));
            state.write_reg(d, result);
            Control::Advance
        }
        Instr::Mls { d, n, m, a, .. } => {
            let result = state
                .read_reg(a)
                .wrapping_sub(state.read_reg(n).wrapping_mul(state.read_reg(m)));
            state.write_reg(d, result);
            Control::Advance
        }
        Instr::Umull { dlo, dhi, n, m, .. } => {
            let product = u64::from(state.read_reg(n)) * u64::from(state.read_reg(m));
            state.write_reg(dlo, product as u32);
            state.write_reg(dhi, (product >> 32) as u32);
            Control::Advance
        }
        Instr::Smull { dlo, dhi, n, m, .. } => {
            let product =
                i64::from(state.read_reg(n) as i32) * i64::from(state.read_reg(m) as i32);
            state.write_reg(dlo, product as u32);
            state.write_reg(dhi, (product >> 32) as u32);
            Control::Advance
        }
        Instr::Umlal { dlo, dhi, n, m, .. } => {
            let acc = (u64::from(state.read_reg(dhi)) << 32) | u64::from(state.read_reg(dlo));
            let product = u64::from(state.read_reg(n)) * u64::from(state.read_reg(m));
            let result = product.wrapping_add(acc);
            state.write_reg(dlo, result as u32);
            state.write_reg(dhi, (result >> 32) as u32);
            Control::Advance
        }
        Instr::Smlal { dlo, dhi, n, m, .. } => {
            let acc = ((u64::from(state.read_reg(dhi)) << 32) | u64::from(state.read_reg(dlo)))
                as i64;
            let product =
                i64::from(state.read_reg(n) as i32) * i64::from(state.read_reg(m) as i32);
            let result = product.wrapping_add(acc);
            state.write_reg(dlo, result as u32);
            state.write_reg(dhi, (result >> 32) as u32);
            Control::Advance
        }
        Instr::Udiv { d, n, m, .. } => {
            let divisor = state.read_reg(m);
            if divisor == 0 {
                if let Some(control) = divide_by_zero(state) {
                    control
                } else {
                    state.write_reg(d, 0);
                    Control::Advance
                }
            } else {
                state.write_reg(d, state.read_reg(n) / divisor);
                Control::Advance
            }
        }
        Instr::Sdiv { d, n, m, .. } => {
            let divisor = state.read_reg(m) as i32;
            if divisor == 0 {
                if let Some(control) = divide_by_zero(state) {
                    control
                } else {
                    state.write_reg(d, 0);
                    Control::Advance
                }
            } else {
                let result = (state.read_reg(n) as i32).wrapping_div(divisor);
                state.write_reg(d, result as u32);
                Control::Advance
            }
        }

        // Branches.
        Instr::B { imm32, .. } | Instr::BCond { imm32, .. } => {
            let target = state.read_reg(reg::PC).wrapping_add(imm32 as u32);
            branch_write_pc(state, target);
            Control::Branch
        }
        Instr::Bl { imm32, .. } => {
            let pc = state.read_reg(reg::PC);
            state.write_reg(reg::LR, pc | 1);
            branch_write_pc(state, pc.wrapping_add(imm32 as u32));
            Control::Branch
        }
        Instr::Bx { m, .. } => {
            let target = state.read_reg(m);
            if bx_write_pc(state, bus, target)? {
                Control::ExceptionReturn
            } else {
                Control::Branch
            }
        }
        Instr::Blx { m, .. } => {
            let target = state.read_reg(m);
            let next = state.read_reg(reg::PC).wrapping_sub(2);
            state.write_reg(reg::LR, next | 1);
            blx_write_pc(state, target);
            Control::Branch
        }
        Instr::CbNZ { flags, n, imm32 } => {
            let nonzero = flags.contains(InstrFlags::NONZERO);
            if (state.read_reg(n) != 0) == nonzero {
                let target = state.read_reg(reg::PC).wrapping_add(imm32);
                branch_write_pc(state, target);
                Control::Branch
            } else {
                Control::Advance
            }
        }
        Instr::TbbH { flags, n, m } => {
            let base = state.read_reg(n);
            let index = state.read_reg(m);
            let halfwords = if flags.contains(InstrFlags::TBH) {
                u32::from(bus.read_u16_or_raise(
                    state,
                    base.wrapping_add(index << 1),
                    crate::mem::BusFaultKind::Precise,
                ))
            } else {
                u32::from(bus.read_u8_or_raise(
                    state,
                    base.wrapping_add(index),
                    crate::mem::BusFaultKind::Precise,
                ))
            };
            let target = state.read_reg(reg::PC).wrapping_add(halfwords << 1);
            branch_write_pc(state, target);
            Control::Branch
        }

        // Loads and stores.
        Instr::LdrImmediate { .. }
        | Instr::LdrbImmediate { .. }
        | Instr::LdrhImmediate { .. }
        | Instr::LdrsbImmediate { .. }
        | Instr::LdrshImmediate { .. }
        | Instr::LdrLiteral { .. }
        | Instr::LdrRegister { .. }
        | Instr::LdrbRegister { .. }
        | Instr::LdrhRegister { .. }
        | Instr::LdrsbRegister { .. }
        | Instr::LdrshRegister { .. }
        | Instr::StrImmediate { .. }
        | Instr::StrbImmediate { .. }
        | Instr::StrhImmediate { .. }
        | Instr::StrRegister { .. }
        | Instr::StrbRegister { .. }
        | Instr::StrhRegister { .. }
        | Instr::LdrdImmediate { .. }
        | Instr::StrdImmediate { .. }
        | Instr::Ldrex { .. }
        | Instr::Strex { .. }
        | Instr::Push { .. }
        | Instr::Pop { .. }
        | Instr::Stm { .. }
        | Instr::Stmdb { .. }
        | Instr::Ldm { .. }
        | Instr::Ldmdb { .. } => loadstore::execute(state, bus, instr)?,

        // System.
        Instr::Svc { imm32, .. } => {
            if imm32 == 0x1 {
                // Conventional emulator-exit call; exit code travels in R0.
                semihost.set_exit_code(state.read_reg(0) as i32);
                exec_flags |= ExecFlags::SVC_REQ_EXIT;
            } else {
                state.exceptions.set_pending(Exception::SvCall);
            }
            Control::Advance
        }
        Instr::Bkpt { imm32, .. } => {
            exec_flags |= semihost.bkpt(state, bus, imm32)?;
            Control::Advance
        }
        Instr::Mrs { d, sysm, .. } => {
            state.write_reg(d, mrs_value(state, sysm));
            Control::Advance
        }
        Instr::Msr { n, mask, sysm, .. } => {
            msr_write(state, n, mask, sysm)?;
            Control::Advance
        }
    };

    match control {
        Control::Advance => {
            it::it_advance(state);
            advance_pc(state, instr.is_wide());
        }
        Control::AdvanceNoIt => advance_pc(state, instr.is_wide()),
        Control::Branch => it::it_advance(state),
        Control::ExceptionReturn => {}
    }
    Ok(exec_flags)
}

/// Divide by zero: pend a UsageFault when trapping is enabled, otherwise the
/// caller writes a zero quotient.
fn divide_by_zero(state: &mut CpuState) -> Option<Control> {
    if state.read_special(SpecialReg::Ccr) & CCR_DIV_0_TRP != 0 {
        state.or_cfsr(CFSR_DIVBYZERO);
        state.exceptions.set_pending(Exception::UsageFault);
        Some(Control::Advance)
    } else {
        None
    }
}

fn mrs_value(state: &CpuState, sysm: u8) -> u32 {
    match sysm {
        // APSR group; EPSR reads as zero through MRS.
        0 | 2 => state.read_special(SpecialReg::Apsr) & APSR_MASK,
        1 | 3 => {
            (state.read_special(SpecialReg::Apsr) & APSR_MASK)
                | (state.read_special(SpecialReg::Ipsr) & IPSR_EXC_MASK)
        }
        5 | 7 => state.read_special(SpecialReg::Ipsr) & IPSR_EXC_MASK,
        6 => 0,
        8 => state.read_special(SpecialReg::SpMain),
        9 => state.read_special(SpecialReg::SpProcess),
        16 => state.read_special(SpecialReg::PriMask) & 1,
        // BASEPRI/FAULTMASK are not modeled and read as zero.
        17 | 18 | 19 => 0,
        20 => state.read_special(SpecialReg::Control),
        _ => 0,
    }
}

fn msr_write(state: &mut CpuState, n: u8, mask: u8, sysm: u8) -> Result<(), CoreError> {
    let value = state.read_reg(n);
    match sysm {
        0..=3 => {
            // Only the flag bits are writable, and only with mask<1> set.
            if mask & 0b10 != 0 {
                state.write_special(SpecialReg::Apsr, value & APSR_MASK);
            }
        }
        5..=7 => {} // IPSR/EPSR writes are ignored.
        8 => {
            if state.is_privileged() {
                state.write_special(SpecialReg::SpMain, value & !3);
            }
        }
        9 => {
            if state.is_privileged() {
                state.write_special(SpecialReg::SpProcess, value & !3);
            }
        }
        16 => {
            if state.is_privileged() {
                state.write_special(SpecialReg::PriMask, value & 1);
            }
        }
        17 | 18 | 19 => {} // BASEPRI/FAULTMASK are not modeled.
        20 => {
            if state.is_privileged() {
                // SPSEL is only writable in Thread mode.
                let mut new = value;
                if state.mode() == Mode::Handler {
                    new = (new & !CONTROL_SPSEL)
                        | (state.read_special(SpecialReg::Control) & CONTROL_SPSEL);
                }
                state.write_special(SpecialReg::Control, new);
            }
        }
        _ => return Err(CoreError::ExecutorUnpredictable),
    }
    Ok(())
}
