//! Leaf decoders and splitters for the 16-bit Thumb encodings.

use super::{bit16, bits16, DecodeError, Instr, InstrFlags};
use crate::alu::{decode_imm_shift, sign_extend, ImmCarry, ImmShift, SrType};
use crate::fetch::RawInstr;
use crate::it::{in_it_block, last_in_it_block};
use crate::state::CpuState;

const NO_SHIFT: ImmShift = ImmShift {
    srtype: SrType::Lsl,
    amount: 0,
};

/// Most 16-bit data-processing encodings set flags only outside an IT block.
fn setflags_outside_it(state: &CpuState) -> InstrFlags {
    if in_it_block(state) {
        InstrFlags::empty()
    } else {
        InstrFlags::SETFLAGS
    }
}

// Shift (immediate), add, subtract, move, and compare

pub(super) fn split_shift_or_mov(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    if bits16(raw.low, 10, 6) == 0 {
        mov_register_t2(raw, state)
    } else {
        lsl_immediate_t1(raw, state)
    }
}

fn mov_register_t2(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 6), 0);
    if in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::MovRegister {
        flags: InstrFlags::SETFLAGS,
        d: bits16(raw.low, 2, 0) as u8,
        m: bits16(raw.low, 5, 3) as u8,
    })
}

fn lsl_immediate_t1(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b00000);
    let imm5 = bits16(raw.low, 10, 6) as u8;
    Ok(Instr::LslImmediate {
        flags: setflags_outside_it(state),
        d: bits16(raw.low, 2, 0) as u8,
        m: bits16(raw.low, 5, 3) as u8,
        shift: decode_imm_shift(0b00, imm5),
    })
}

pub(super) fn lsr_immediate_t1(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b00001);
    Ok(Instr::LsrImmediate {
        flags: setflags_outside_it(state),
        d: bits16(raw.low, 2, 0) as u8,
        m: bits16(raw.low, 5, 3) as u8,
        shift: decode_imm_shift(0b01, bits16(raw.low, 10, 6) as u8),
    })
}

pub(super) fn asr_immediate_t1(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b00010);
    Ok(Instr::AsrImmediate {
        flags: setflags_outside_it(state),
        d: bits16(raw.low, 2, 0) as u8,
        m: bits16(raw.low, 5, 3) as u8,
        shift: decode_imm_shift(0b10, bits16(raw.low, 10, 6) as u8),
    })
}

pub(super) fn split_add_sub(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let flags = setflags_outside_it(state);
    let d = bits16(raw.low, 2, 0) as u8;
    let n = bits16(raw.low, 5, 3) as u8;
    match bits16(raw.low, 10, 9) {
        0b00 => Ok(Instr::AddRegister {
            flags,
            d,
            n,
            m: bits16(raw.low, 8, 6) as u8,
            shift: NO_SHIFT,
        }),
        0b01 => Ok(Instr::SubRegister {
            flags,
            d,
            n,
            m: bits16(raw.low, 8, 6) as u8,
            shift: NO_SHIFT,
        }),
        0b10 => Ok(Instr::AddImmediate {
            flags,
            d,
            n,
            imm32: u32::from(bits16(raw.low, 8, 6)),
        }),
        _ => Ok(Instr::SubImmediate {
            flags,
            d,
            n,
            imm32: u32::from(bits16(raw.low, 8, 6)),
        }),
    }
}

pub(super) fn mov_immediate_t1(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b00100);
    Ok(Instr::MovImmediate {
        flags: setflags_outside_it(state),
        d: bits16(raw.low, 10, 8) as u8,
        imm: ImmCarry {
            imm32: u32::from(bits16(raw.low, 7, 0)),
            carry: state.apsr_c(),
        },
    })
}

pub(super) fn cmp_immediate_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b00101);
    Ok(Instr::CmpImmediate {
        flags: InstrFlags::empty(),
        n: bits16(raw.low, 10, 8) as u8,
        imm32: u32::from(bits16(raw.low, 7, 0)),
    })
}

pub(super) fn add_immediate_t2(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b00110);
    let dn = bits16(raw.low, 10, 8) as u8;
    Ok(Instr::AddImmediate {
        flags: setflags_outside_it(state),
        d: dn,
        n: dn,
        imm32: u32::from(bits16(raw.low, 7, 0)),
    })
}

pub(super) fn sub_immediate_t2(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b00111);
    let dn = bits16(raw.low, 10, 8) as u8;
    Ok(Instr::SubImmediate {
        flags: setflags_outside_it(state),
        d: dn,
        n: dn,
        imm32: u32::from(bits16(raw.low, 7, 0)),
    })
}

// Data processing (register-to-register) and special data / branch-exchange

pub(super) fn split_data_processing(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    if bit16(raw.low, 10) {
        return split_special_data(raw, state);
    }

    let flags = setflags_outside_it(state);
    let dn = bits16(raw.low, 2, 0) as u8;
    let m = bits16(raw.low, 5, 3) as u8;
    match bits16(raw.low, 9, 6) {
        0b0000 => Ok(Instr::AndRegister { flags, d: dn, n: dn, m, shift: NO_SHIFT }),
        0b0001 => Ok(Instr::EorRegister { flags, d: dn, n: dn, m, shift: NO_SHIFT }),
        0b0010 => Ok(Instr::LslRegister { flags, d: dn, n: dn, m }),
        0b0011 => Ok(Instr::LsrRegister { flags, d: dn, n: dn, m }),
        0b0100 => Ok(Instr::AsrRegister { flags, d: dn, n: dn, m }),
        0b0101 => Ok(Instr::AdcRegister { flags, d: dn, n: dn, m, shift: NO_SHIFT }),
        0b0110 => Ok(Instr::SbcRegister { flags, d: dn, n: dn, m, shift: NO_SHIFT }),
        0b0111 => Ok(Instr::RorRegister { flags, d: dn, n: dn, m }),
        0b1000 => Ok(Instr::TstRegister {
            flags: InstrFlags::empty(),
            n: dn,
            m,
            shift: NO_SHIFT,
        }),
        0b1001 => Ok(Instr::RsbImmediate { flags, d: dn, n: m, imm32: 0 }),
        0b1010 => Ok(Instr::CmpRegister {
            flags: InstrFlags::empty(),
            n: dn,
            m,
            shift: NO_SHIFT,
        }),
        0b1011 => Ok(Instr::CmnRegister {
            flags: InstrFlags::empty(),
            n: dn,
            m,
            shift: NO_SHIFT,
        }),
        0b1100 => Ok(Instr::OrrRegister { flags, d: dn, n: dn, m, shift: NO_SHIFT }),
        0b1101 => Ok(Instr::Mul { flags, d: dn, n: m, m: dn }),
        0b1110 => Ok(Instr::BicRegister { flags, d: dn, n: dn, m, shift: NO_SHIFT }),
        _ => Ok(Instr::MvnRegister { flags, d: dn, m, shift: NO_SHIFT }),
    }
}

fn split_special_data(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    match bits16(raw.low, 9, 8) {
        0b00 => add_register_t2(raw, state),
        0b01 => cmp_register_t2(raw, state),
        0b10 => mov_register_t1(raw, state),
        _ => {
            if bit16(raw.low, 7) {
                blx_t1(raw, state)
            } else {
                bx_t1(raw, state)
            }
        }
    }
}

fn add_register_t2(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let dn = (u8::from(bit16(raw.low, 7)) << 3) | bits16(raw.low, 2, 0) as u8;
    let m = bits16(raw.low, 6, 3) as u8;
    if dn == 15 && m == 15 {
        return Err(DecodeError::Unpredictable);
    }
    if dn == 15 && in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::AddRegister {
        flags: InstrFlags::empty(),
        d: dn,
        n: dn,
        m,
        shift: NO_SHIFT,
    })
}

fn cmp_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let n = (u8::from(bit16(raw.low, 7)) << 3) | bits16(raw.low, 2, 0) as u8;
    let m = bits16(raw.low, 6, 3) as u8;
    if n < 8 && m < 8 {
        return Err(DecodeError::Unpredictable);
    }
    if n == 15 || m == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::CmpRegister {
        flags: InstrFlags::empty(),
        n,
        m,
        shift: NO_SHIFT,
    })
}

fn mov_register_t1(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let d = (u8::from(bit16(raw.low, 7)) << 3) | bits16(raw.low, 2, 0) as u8;
    let m = bits16(raw.low, 6, 3) as u8;
    if d == 15 && in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::MovRegister {
        flags: InstrFlags::empty(),
        d,
        m,
    })
}

fn bx_t1(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 7), 0b010001110);
    if bits16(raw.low, 2, 0) != 0 {
        return Err(DecodeError::Unpredictable);
    }
    if in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::Bx {
        flags: InstrFlags::empty(),
        m: bits16(raw.low, 6, 3) as u8,
    })
}

fn blx_t1(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 7), 0b010001111);
    let m = bits16(raw.low, 6, 3) as u8;
    if bits16(raw.low, 2, 0) != 0 || m == 15 {
        return Err(DecodeError::Unpredictable);
    }
    if in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::Blx {
        flags: InstrFlags::empty(),
        m,
    })
}

// Load/store

pub(super) fn ldr_literal_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b01001);
    Ok(Instr::LdrLiteral {
        flags: InstrFlags::ADD | InstrFlags::UNALIGNED_ALLOW,
        t: bits16(raw.low, 10, 8) as u8,
        imm32: u32::from(bits16(raw.low, 7, 0)) << 2,
    })
}

pub(super) fn split_load_store_register(
    raw: RawInstr,
    _state: &CpuState,
) -> Result<Instr, DecodeError> {
    let flags = InstrFlags::INDEX | InstrFlags::ADD | InstrFlags::UNALIGNED_ALLOW;
    let t = bits16(raw.low, 2, 0) as u8;
    let n = bits16(raw.low, 5, 3) as u8;
    let m = bits16(raw.low, 8, 6) as u8;
    match bits16(raw.low, 11, 9) {
        0b000 => Ok(Instr::StrRegister { flags, t, n, m, shift: NO_SHIFT }),
        0b001 => Ok(Instr::StrhRegister { flags, t, n, m, shift: NO_SHIFT }),
        0b010 => Ok(Instr::StrbRegister { flags, t, n, m, shift: NO_SHIFT }),
        0b011 => Ok(Instr::LdrsbRegister { flags, t, n, m, shift: NO_SHIFT }),
        0b100 => Ok(Instr::LdrRegister { flags, t, n, m, shift: NO_SHIFT }),
        0b101 => Ok(Instr::LdrhRegister { flags, t, n, m, shift: NO_SHIFT }),
        0b110 => Ok(Instr::LdrbRegister { flags, t, n, m, shift: NO_SHIFT }),
        _ => Ok(Instr::LdrshRegister { flags, t, n, m, shift: NO_SHIFT }),
    }
}

pub(super) fn str_immediate_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b01100);
    Ok(Instr::StrImmediate {
        flags: InstrFlags::INDEX | InstrFlags::ADD | InstrFlags::UNALIGNED_ALLOW,
        t: bits16(raw.low, 2, 0) as u8,
        n: bits16(raw.low, 5, 3) as u8,
        imm32: u32::from(bits16(raw.low, 10, 6)) << 2,
    })
}

pub(super) fn ldr_immediate_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b01101);
    Ok(Instr::LdrImmediate {
        flags: InstrFlags::INDEX | InstrFlags::ADD | InstrFlags::UNALIGNED_ALLOW,
        t: bits16(raw.low, 2, 0) as u8,
        n: bits16(raw.low, 5, 3) as u8,
        imm32: u32::from(bits16(raw.low, 10, 6)) << 2,
    })
}

pub(super) fn strb_immediate_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b01110);
    Ok(Instr::StrbImmediate {
        flags: InstrFlags::INDEX | InstrFlags::ADD | InstrFlags::UNALIGNED_ALLOW,
        t: bits16(raw.low, 2, 0) as u8,
        n: bits16(raw.low, 5, 3) as u8,
        imm32: u32::from(bits16(raw.low, 10, 6)),
    })
}

pub(super) fn ldrb_immediate_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b01111);
    Ok(Instr::LdrbImmediate {
        flags: InstrFlags::INDEX | InstrFlags::ADD | InstrFlags::UNALIGNED_ALLOW,
        t: bits16(raw.low, 2, 0) as u8,
        n: bits16(raw.low, 5, 3) as u8,
        imm32: u32::from(bits16(raw.low, 10, 6)),
    })
}

pub(super) fn strh_immediate_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b10000);
    Ok(Instr::StrhImmediate {
        flags: InstrFlags::INDEX | InstrFlags::ADD | InstrFlags::UNALIGNED_ALLOW,
        t: bits16(raw.low, 2, 0) as u8,
        n: bits16(raw.low, 5, 3) as u8,
        imm32: u32::from(bits16(raw.low, 10, 6)) << 1,
    })
}

pub(super) fn ldrh_immediate_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b10001);
    Ok(Instr::LdrhImmediate {
        flags: InstrFlags::INDEX | InstrFlags::ADD | InstrFlags::UNALIGNED_ALLOW,
        t: bits16(raw.low, 2, 0) as u8,
        n: bits16(raw.low, 5, 3) as u8,
        imm32: u32::from(bits16(raw.low, 10, 6)) << 1,
    })
}

pub(super) fn str_immediate_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b10010);
    Ok(Instr::StrImmediate {
        flags: InstrFlags::INDEX | InstrFlags::ADD | InstrFlags::UNALIGNED_ALLOW,
        t: bits16(raw.low, 10, 8) as u8,
        n: 13,
        imm32: u32::from(bits16(raw.low, 7, 0)) << 2,
    })
}

pub(super) fn ldr_immediate_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b10011);
    Ok(Instr::LdrImmediate {
        flags: InstrFlags::INDEX | InstrFlags::ADD | InstrFlags::UNALIGNED_ALLOW,
        t: bits16(raw.low, 10, 8) as u8,
        n: 13,
        imm32: u32::from(bits16(raw.low, 7, 0)) << 2,
    })
}

pub(super) fn adr_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b10100);
    Ok(Instr::Adr {
        flags: InstrFlags::ADD,
        d: bits16(raw.low, 10, 8) as u8,
        imm32: u32::from(bits16(raw.low, 7, 0)) << 2,
    })
}

pub(super) fn add_sp_plus_immediate_t1(
    raw: RawInstr,
    _state: &CpuState,
) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b10101);
    Ok(Instr::AddSpPlusImmediate {
        flags: InstrFlags::empty(),
        d: bits16(raw.low, 10, 8) as u8,
        imm32: u32::from(bits16(raw.low, 7, 0)) << 2,
    })
}

// Miscellaneous 16-bit instructions

pub(super) fn split_misc_a(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let opcode = bits16(raw.low, 11, 5);
    if bits16(opcode, 6, 2) == 0b00000 {
        return add_sp_plus_immediate_t2(raw, state);
    }
    if bits16(opcode, 6, 2) == 0b00001 {
        return sub_sp_minus_immediate_t1(raw, state);
    }
    if bits16(opcode, 6, 3) == 0b0001 || bits16(opcode, 6, 3) == 0b0011 {
        return cb_n_z_t1(raw, state);
    }
    if bits16(opcode, 6, 1) == 0b001000 {
        return extend_t1(raw, state, ExtendKind::Sxth);
    }
    if bits16(opcode, 6, 1) == 0b001001 {
        return extend_t1(raw, state, ExtendKind::Sxtb);
    }
    if bits16(opcode, 6, 1) == 0b001010 {
        return extend_t1(raw, state, ExtendKind::Uxth);
    }
    if bits16(opcode, 6, 1) == 0b001011 {
        return extend_t1(raw, state, ExtendKind::Uxtb);
    }
    if bits16(opcode, 6, 4) == 0b010 {
        return push_t1(raw, state);
    }
    Err(DecodeError::UnknownOpcode)
}

pub(super) fn split_misc_b(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let opcode = bits16(raw.low, 11, 5);
    if bits16(opcode, 6, 3) == 0b1001 || bits16(opcode, 6, 3) == 0b1011 {
        return cb_n_z_t1(raw, state);
    }
    if bits16(opcode, 6, 4) == 0b110 {
        return pop_t1(raw, state);
    }
    if bits16(opcode, 6, 3) == 0b1110 {
        return bkpt_t1(raw, state);
    }
    if bits16(opcode, 6, 3) == 0b1111 {
        // If-Then, and hints.
        if bits16(raw.low, 3, 0) != 0 {
            return it_t1(raw, state);
        }
        if bits16(raw.low, 7, 4) == 0 {
            return Ok(Instr::Nop {
                flags: InstrFlags::empty(),
            });
        }
    }
    Err(DecodeError::UnknownOpcode)
}

fn add_sp_plus_immediate_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 7), 0b101100000);
    Ok(Instr::AddSpPlusImmediate {
        flags: InstrFlags::empty(),
        d: 13,
        imm32: u32::from(bits16(raw.low, 6, 0)) << 2,
    })
}

fn sub_sp_minus_immediate_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 7), 0b101100001);
    Ok(Instr::SubSpMinusImmediate {
        flags: InstrFlags::empty(),
        d: 13,
        imm32: u32::from(bits16(raw.low, 6, 0)) << 2,
    })
}

pub(super) fn cb_n_z_t1(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 12), 0b1011);
    debug_assert!(!bit16(raw.low, 10));
    debug_assert!(bit16(raw.low, 8));
    if in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    let mut flags = InstrFlags::empty();
    if bit16(raw.low, 11) {
        flags |= InstrFlags::NONZERO;
    }
    let i = u32::from(bit16(raw.low, 9));
    let imm5 = u32::from(bits16(raw.low, 7, 3));
    Ok(Instr::CbNZ {
        flags,
        n: bits16(raw.low, 2, 0) as u8,
        imm32: (i << 6) | (imm5 << 1),
    })
}

enum ExtendKind {
    Sxth,
    Sxtb,
    Uxth,
    Uxtb,
}

fn extend_t1(raw: RawInstr, _state: &CpuState, kind: ExtendKind) -> Result<Instr, DecodeError> {
    let flags = InstrFlags::empty();
    let d = bits16(raw.low, 2, 0) as u8;
    let m = bits16(raw.low, 5, 3) as u8;
    Ok(match kind {
        ExtendKind::Sxth => Instr::Sxth { flags, d, m, rotation: 0 },
        ExtendKind::Sxtb => Instr::Sxtb { flags, d, m, rotation: 0 },
        ExtendKind::Uxth => Instr::Uxth { flags, d, m, rotation: 0 },
        ExtendKind::Uxtb => Instr::Uxtb { flags, d, m, rotation: 0 },
    })
}

fn push_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 9), 0b1011010);
    let m = u32::from(bit16(raw.low, 8));
    let registers = (m << 14) | u32::from(bits16(raw.low, 7, 0));
    if registers.count_ones() < 1 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::Push {
        flags: InstrFlags::empty(),
        registers,
    })
}

fn pop_t1(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 9), 0b1011110);
    let p = u32::from(bit16(raw.low, 8));
    let registers = (p << 15) | u32::from(bits16(raw.low, 7, 0));
    if registers.count_ones() < 1 {
        return Err(DecodeError::Unpredictable);
    }
    if registers >> 15 & 1 != 0 && in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::Pop {
        flags: InstrFlags::empty(),
        registers,
    })
}

fn bkpt_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 8), 0b10111110);
    Ok(Instr::Bkpt {
        flags: InstrFlags::empty(),
        imm32: u32::from(bits16(raw.low, 7, 0)),
    })
}

fn it_t1(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 11, 8), 0xF);
    let firstcond = bits16(raw.low, 7, 4) as u8;
    let mask = bits16(raw.low, 3, 0) as u8;
    debug_assert_ne!(mask, 0);
    if firstcond == 0xF || (firstcond == 0b1110 && mask.count_ones() != 1) {
        return Err(DecodeError::Unpredictable);
    }
    if in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::It {
        flags: InstrFlags::empty(),
        firstcond,
        mask,
    })
}

// Load/store multiple, branches, SVC

pub(super) fn stm_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b11000);
    let registers = u32::from(bits16(raw.low, 7, 0));
    if registers.count_ones() < 1 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::Stm {
        flags: InstrFlags::WBACK,
        n: bits16(raw.low, 10, 8) as u8,
        registers,
    })
}

pub(super) fn ldm_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b11001);
    let n = bits16(raw.low, 10, 8) as u8;
    let registers = u32::from(bits16(raw.low, 7, 0));
    if registers.count_ones() < 1 {
        return Err(DecodeError::Unpredictable);
    }
    // Write-back only when the base register is not reloaded.
    let mut flags = InstrFlags::empty();
    if registers >> n & 1 == 0 {
        flags |= InstrFlags::WBACK;
    }
    Ok(Instr::Ldm { flags, n, registers })
}

pub(super) fn split_cond_branch_svc(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let opcode = bits16(raw.low, 11, 8);
    if bits16(opcode, 3, 1) != 0b111 {
        return b_t1(raw, state);
    }
    if opcode == 0b1111 {
        return svc_t1(raw, state);
    }
    Err(DecodeError::UnknownOpcode)
}

fn b_t1(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    if in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    let cond = bits16(raw.low, 11, 8) as u8;
    debug_assert_ne!(cond, 0b1110);
    debug_assert_ne!(cond, 0b1111);
    let imm32 = sign_extend(u32::from(bits16(raw.low, 7, 0)) << 1, 8) as i32;
    Ok(Instr::BCond {
        flags: InstrFlags::empty(),
        cond,
        imm32,
    })
}

fn svc_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 8), 0b11011111);
    Ok(Instr::Svc {
        flags: InstrFlags::empty(),
        imm32: u32::from(bits16(raw.low, 7, 0)),
    })
}

pub(super) fn b_t2(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 11), 0b11100);
    if in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    let imm32 = sign_extend(u32::from(bits16(raw.low, 10, 0)) << 1, 11) as i32;
    Ok(Instr::B {
        flags: InstrFlags::empty(),
        imm32,
    })
}
