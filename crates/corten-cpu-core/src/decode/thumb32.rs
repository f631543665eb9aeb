//! Leaf decoders and splitters for the 32-bit Thumb encodings.

use super::{bit16, bits16, expand_imm, DecodeError, Instr, InstrFlags};
use crate::alu::{decode_imm_shift, sign_extend, ImmCarry, ImmShift, SrType};
use crate::fetch::RawInstr;
use crate::it::{in_it_block, last_in_it_block};
use crate::state::CpuState;

fn wide(extra: InstrFlags) -> InstrFlags {
    InstrFlags::WIDE | extra
}

/// Shifted-register operand fields shared by the data-processing group.
struct DpShifted {
    s: bool,
    n: u8,
    d: u8,
    m: u8,
    shift: ImmShift,
}

fn dp_shifted(raw: RawInstr) -> DpShifted {
    let imm3 = bits16(raw.high, 14, 12) as u8;
    let imm2 = bits16(raw.high, 7, 6) as u8;
    let type_code = bits16(raw.high, 5, 4) as u8;
    DpShifted {
        s: bit16(raw.low, 4),
        n: bits16(raw.low, 3, 0) as u8,
        d: bits16(raw.high, 11, 8) as u8,
        m: bits16(raw.high, 3, 0) as u8,
        shift: decode_imm_shift(type_code, (imm3 << 2) | imm2),
    }
}

fn setflags(s: bool) -> InstrFlags {
    if s {
        InstrFlags::SETFLAGS
    } else {
        InstrFlags::empty()
    }
}

/// Rejects the register numbers the data-processing encodings exclude.
fn check_not_13_15(regs: &[u8]) -> Result<(), DecodeError> {
    if regs.iter().any(|&r| r == 13 || r == 15) {
        Err(DecodeError::Unpredictable)
    } else {
        Ok(())
    }
}

// op1 = 0b11101: data processing (shifted register), load/store multiple,
// load/store dual or exclusive, table branch.

pub(super) fn split_op11101(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    if bits16(raw.low, 10, 9) == 0b01 {
        return split_dp_shifted_register(raw, state);
    }
    if bits16(raw.low, 10, 9) == 0b00 {
        if !bit16(raw.low, 6) {
            return split_load_store_multiple(raw, state);
        }
        return split_dual_exclusive_table(raw, state);
    }
    Err(DecodeError::UnknownOpcode)
}

fn split_dp_shifted_register(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let op = bits16(raw.low, 8, 5);
    let rd = bits16(raw.high, 11, 8);
    let rn = bits16(raw.low, 3, 0);
    let s = bit16(raw.low, 4);
    match op {
        0b0000 if rd != 0b1111 => and_register_t2(raw, state),
        0b0000 if s => tst_register_t2(raw, state),
        0b0000 => Err(DecodeError::Unpredictable),
        0b0001 => bic_register_t2(raw, state),
        0b0010 if rn == 0b1111 => split_mov_register_and_imm_shifts(raw, state),
        0b0010 => orr_register_t2(raw, state),
        0b0011 if rn == 0b1111 => mvn_register_t2(raw, state),
        0b0100 if rd != 0b1111 => eor_register_t2(raw, state),
        0b0100 if s => teq_register_t1(raw, state),
        0b0100 => Err(DecodeError::Unpredictable),
        0b1000 if rd != 0b1111 => add_register_t3(raw, state),
        0b1000 if s => cmn_register_t2(raw, state),
        0b1000 => Err(DecodeError::Unpredictable),
        0b1010 => adc_register_t2(raw, state),
        0b1011 => sbc_register_t2(raw, state),
        0b1101 if rd != 0b1111 => sub_register_t2(raw, state),
        0b1101 if s => cmp_register_t3(raw, state),
        0b1101 => Err(DecodeError::Unpredictable),
        0b1110 => rsb_register_t1(raw, state),
        _ => Err(DecodeError::UnknownOpcode),
    }
}

fn and_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.d, f.n, f.m])?;
    Ok(Instr::AndRegister {
        flags: wide(setflags(f.s)),
        d: f.d,
        n: f.n,
        m: f.m,
        shift: f.shift,
    })
}

fn tst_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.n, f.m])?;
    Ok(Instr::TstRegister {
        flags: wide(InstrFlags::empty()),
        n: f.n,
        m: f.m,
        shift: f.shift,
    })
}

fn bic_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.d, f.n, f.m])?;
    Ok(Instr::BicRegister {
        flags: wide(setflags(f.s)),
        d: f.d,
        n: f.n,
        m: f.m,
        shift: f.shift,
    })
}

fn orr_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.d, f.m])?;
    if f.n == 13 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::OrrRegister {
        flags: wide(setflags(f.s)),
        d: f.d,
        n: f.n,
        m: f.m,
        shift: f.shift,
    })
}

fn split_mov_register_and_imm_shifts(
    raw: RawInstr,
    state: &CpuState,
) -> Result<Instr, DecodeError> {
    let type_code = bits16(raw.high, 5, 4);
    let imm3_2 = (bits16(raw.high, 14, 12) << 2) | bits16(raw.high, 7, 6);
    match (type_code, imm3_2) {
        (0b00, 0) => mov_register_t3(raw, state),
        (0b00, _) => shift_immediate_t2(raw, state, ShiftKind::Lsl),
        (0b01, _) => shift_immediate_t2(raw, state, ShiftKind::Lsr),
        (0b10, _) => shift_immediate_t2(raw, state, ShiftKind::Asr),
        (_, 0) => rrx_t1(raw, state),
        _ => shift_immediate_t2(raw, state, ShiftKind::Ror),
    }
}

fn mov_register_t3(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 5), 0b11101010010);
    debug_assert_eq!(bits16(raw.low, 3, 0), 0b1111);
    let s = bit16(raw.low, 4);
    let d = bits16(raw.high, 11, 8) as u8;
    let m = bits16(raw.high, 3, 0) as u8;
    if s && (d == 13 || d == 15 || m == 13 || m == 15) {
        return Err(DecodeError::Unpredictable);
    }
    if !s && (d == 15 || m == 15 || (d == 13 && m == 13)) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::MovRegister {
        flags: wide(setflags(s)),
        d,
        m,
    })
}

enum ShiftKind {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

fn shift_immediate_t2(raw: RawInstr, _state: &CpuState, kind: ShiftKind) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.d, f.m])?;
    let flags = wide(setflags(f.s));
    Ok(match kind {
        ShiftKind::Lsl => Instr::LslImmediate { flags, d: f.d, m: f.m, shift: f.shift },
        ShiftKind::Lsr => Instr::LsrImmediate { flags, d: f.d, m: f.m, shift: f.shift },
        ShiftKind::Asr => Instr::AsrImmediate { flags, d: f.d, m: f.m, shift: f.shift },
        ShiftKind::Ror => Instr::RorImmediate { flags, d: f.d, m: f.m, shift: f.shift },
    })
}

fn rrx_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.d, f.m])?;
    Ok(Instr::Rrx {
        flags: wide(setflags(f.s)),
        d: f.d,
        m: f.m,
    })
}

fn mvn_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.d, f.m])?;
    Ok(Instr::MvnRegister {
        flags: wide(setflags(f.s)),
        d: f.d,
        m: f.m,
        shift: f.shift,
    })
}

fn eor_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.d, f.n, f.m])?;
    Ok(Instr::EorRegister {
        flags: wide(setflags(f.s)),
        d: f.d,
        n: f.n,
        m: f.m,
        shift: f.shift,
    })
}

fn teq_register_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.n, f.m])?;
    Ok(Instr::TeqRegister {
        flags: wide(InstrFlags::empty()),
        n: f.n,
        m: f.m,
        shift: f.shift,
    })
}

fn add_register_t3(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    // n = 13 is the ADD (SP plus register) form and stays legal.
    check_not_13_15(&[f.d, f.m])?;
    if f.n == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::AddRegister {
        flags: wide(setflags(f.s)),
        d: f.d,
        n: f.n,
        m: f.m,
        shift: f.shift,
    })
}

fn cmn_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.m])?;
    if f.n == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::CmnRegister {
        flags: wide(InstrFlags::empty()),
        n: f.n,
        m: f.m,
        shift: f.shift,
    })
}

fn adc_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.d, f.n, f.m])?;
    Ok(Instr::AdcRegister {
        flags: wide(setflags(f.s)),
        d: f.d,
        n: f.n,
        m: f.m,
        shift: f.shift,
    })
}

fn sbc_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.d, f.n, f.m])?;
    Ok(Instr::SbcRegister {
        flags: wide(setflags(f.s)),
        d: f.d,
        n: f.n,
        m: f.m,
        shift: f.shift,
    })
}

fn sub_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.d, f.m])?;
    if f.n == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::SubRegister {
        flags: wide(setflags(f.s)),
        d: f.d,
        n: f.n,
        m: f.m,
        shift: f.shift,
    })
}

fn cmp_register_t3(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.m])?;
    if f.n == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::CmpRegister {
        flags: wide(InstrFlags::empty()),
        n: f.n,
        m: f.m,
        shift: f.shift,
    })
}

fn rsb_register_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_shifted(raw);
    check_not_13_15(&[f.d, f.n, f.m])?;
    Ok(Instr::RsbRegister {
        flags: wide(setflags(f.s)),
        d: f.d,
        n: f.n,
        m: f.m,
        shift: f.shift,
    })
}

// Load/store multiple

fn split_load_store_multiple(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let op = bits16(raw.low, 8, 7);
    let w = bit16(raw.low, 5);
    let l = bit16(raw.low, 4);
    let rn = bits16(raw.low, 3, 0);
    let w_and_sp = w && rn == 0b1101;
    match (op, l) {
        (0b01, false) => stm_t2(raw, state),
        (0b01, true) if w_and_sp => pop_t2(raw, state),
        (0b01, true) => ldm_t2(raw, state),
        (0b10, false) if w_and_sp => push_t2(raw, state),
        (0b10, false) => stmdb_t1(raw, state),
        (0b10, true) => ldmdb_t1(raw, state),
        _ => Err(DecodeError::UnknownOpcode),
    }
}

fn multiple_registers(raw: RawInstr) -> u32 {
    let m = u32::from(bit16(raw.high, 14));
    let p = u32::from(bit16(raw.high, 15));
    (p << 15) | (m << 14) | u32::from(bits16(raw.high, 12, 0))
}

fn stm_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert!(!bit16(raw.high, 15));
    debug_assert!(!bit16(raw.high, 13));
    let n = bits16(raw.low, 3, 0) as u8;
    let registers = multiple_registers(raw);
    if registers.count_ones() < 2 || n == 15 {
        return Err(DecodeError::Unpredictable);
    }
    let mut flags = wide(InstrFlags::empty());
    if bit16(raw.low, 5) {
        flags |= InstrFlags::WBACK;
        if registers >> n & 1 != 0 {
            return Err(DecodeError::Unpredictable);
        }
    }
    Ok(Instr::Stm { flags, n, registers })
}

fn ldm_t2(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let n = bits16(raw.low, 3, 0) as u8;
    let registers = multiple_registers(raw);
    if registers.count_ones() < 2 || (bit16(raw.high, 15) && bit16(raw.high, 14)) || n == 15 {
        return Err(DecodeError::Unpredictable);
    }
    if registers >> 15 & 1 != 0 && in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    let mut flags = wide(InstrFlags::empty());
    if bit16(raw.low, 5) {
        flags |= InstrFlags::WBACK;
        if registers >> n & 1 != 0 {
            return Err(DecodeError::Unpredictable);
        }
    }
    Ok(Instr::Ldm { flags, n, registers })
}

fn stmdb_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let n = bits16(raw.low, 3, 0) as u8;
    let registers = multiple_registers(raw);
    if registers.count_ones() < 2 || n == 15 {
        return Err(DecodeError::Unpredictable);
    }
    let mut flags = wide(InstrFlags::empty());
    if bit16(raw.low, 5) {
        flags |= InstrFlags::WBACK;
        if registers >> n & 1 != 0 {
            return Err(DecodeError::Unpredictable);
        }
    }
    Ok(Instr::Stmdb { flags, n, registers })
}

fn ldmdb_t1(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let n = bits16(raw.low, 3, 0) as u8;
    let registers = multiple_registers(raw);
    if registers.count_ones() < 2 || (bit16(raw.high, 15) && bit16(raw.high, 14)) || n == 15 {
        return Err(DecodeError::Unpredictable);
    }
    if registers >> 15 & 1 != 0 && in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    let mut flags = wide(InstrFlags::empty());
    if bit16(raw.low, 5) {
        flags |= InstrFlags::WBACK;
        if registers >> n & 1 != 0 {
            return Err(DecodeError::Unpredictable);
        }
    }
    Ok(Instr::Ldmdb { flags, n, registers })
}

fn push_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(raw.low, 0b1110100100101101);
    let m = u32::from(bit16(raw.high, 14));
    let registers = (m << 14) | u32::from(bits16(raw.high, 12, 0));
    if registers.count_ones() < 2 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::Push {
        flags: wide(InstrFlags::empty()),
        registers,
    })
}

fn pop_t2(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(raw.low, 0b1110100010111101);
    debug_assert!(!bit16(raw.high, 13));
    let registers = multiple_registers(raw);
    if registers.count_ones() < 2 || (bit16(raw.high, 15) && bit16(raw.high, 14)) {
        return Err(DecodeError::Unpredictable);
    }
    if registers >> 15 & 1 != 0 && in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::Pop {
        flags: wide(InstrFlags::empty()),
        registers,
    })
}

pub(super) fn pop_t3(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(raw.low, 0b1111100001011101);
    debug_assert_eq!(bits16(raw.high, 11, 0), 0b101100000100);
    let t = bits16(raw.high, 15, 12) as u8;
    if t == 13 || (t == 15 && in_it_block(state) && !last_in_it_block(state)) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::Pop {
        flags: wide(InstrFlags::UNALIGNED_ALLOW),
        registers: 1 << t,
    })
}

// Load/store dual or exclusive, table branch

fn split_dual_exclusive_table(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let op1 = bits16(raw.low, 8, 7);
    let op2 = bits16(raw.low, 5, 4);
    let op3 = bits16(raw.high, 7, 4);
    if op1 == 0b00 && op2 == 0b00 {
        return strex_t1(raw, state);
    }
    if op1 == 0b00 && op2 == 0b01 {
        return ldrex_t1(raw, state);
    }
    if op1 == 0b01 && op2 == 0b01 && (op3 == 0b0000 || op3 == 0b0001) {
        return tbb_h_t1(raw, state);
    }
    // The remaining op1/op2 combinations with L=0/1 are STRD/LDRD immediate.
    let l = bit16(raw.low, 4);
    if (op1 >> 1 == 0 && op2 >> 1 == 1) || (op1 >> 1 == 1) {
        if l {
            return ldrd_immediate_t1(raw, state);
        }
        return strd_immediate_t1(raw, state);
    }
    Err(DecodeError::UnknownOpcode)
}

fn strex_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 4), 0b111010000100);
    let n = bits16(raw.low, 3, 0) as u8;
    let t = bits16(raw.high, 15, 12) as u8;
    let d = bits16(raw.high, 11, 8) as u8;
    if d == 13 || d == 15 || t == 13 || t == 15 || n == 15 {
        return Err(DecodeError::Unpredictable);
    }
    if d == n || d == t {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::Strex {
        flags: wide(InstrFlags::empty()),
        d,
        t,
        n,
        imm32: u32::from(bits16(raw.high, 7, 0)) << 2,
    })
}

fn ldrex_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 4), 0b111010000101);
    debug_assert_eq!(bits16(raw.high, 11, 8), 0b1111);
    let n = bits16(raw.low, 3, 0) as u8;
    let t = bits16(raw.high, 15, 12) as u8;
    if t == 13 || t == 15 || n == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::Ldrex {
        flags: wide(InstrFlags::empty()),
        t,
        n,
        imm32: u32::from(bits16(raw.high, 7, 0)) << 2,
    })
}

fn tbb_h_t1(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 4), 0b111010001101);
    debug_assert_eq!(bits16(raw.high, 15, 5), 0b11110000000);
    let mut flags = wide(InstrFlags::empty());
    if bit16(raw.high, 4) {
        flags |= InstrFlags::TBH;
    }
    let n = bits16(raw.low, 3, 0) as u8;
    let m = bits16(raw.high, 3, 0) as u8;
    if n == 13 || m == 13 || m == 15 {
        return Err(DecodeError::Unpredictable);
    }
    if in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::TbbH { flags, n, m })
}

fn dual_flags(raw: RawInstr) -> InstrFlags {
    let mut flags = wide(InstrFlags::empty());
    if bit16(raw.low, 8) {
        flags |= InstrFlags::INDEX;
    }
    if bit16(raw.low, 7) {
        flags |= InstrFlags::ADD;
    }
    if bit16(raw.low, 5) {
        flags |= InstrFlags::WBACK;
    }
    flags
}

fn strd_immediate_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let flags = dual_flags(raw);
    let n = bits16(raw.low, 3, 0) as u8;
    let t = bits16(raw.high, 15, 12) as u8;
    let t2 = bits16(raw.high, 11, 8) as u8;
    if flags.contains(InstrFlags::WBACK) && (n == t || n == t2) {
        return Err(DecodeError::Unpredictable);
    }
    if n == 15 || t == 13 || t == 15 || t2 == 13 || t2 == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::StrdImmediate {
        flags,
        t,
        t2,
        n,
        imm32: u32::from(bits16(raw.high, 7, 0)) << 2,
    })
}

fn ldrd_immediate_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let flags = dual_flags(raw);
    let n = bits16(raw.low, 3, 0) as u8;
    let t = bits16(raw.high, 15, 12) as u8;
    let t2 = bits16(raw.high, 11, 8) as u8;
    if flags.contains(InstrFlags::WBACK) && (n == t || n == t2) {
        return Err(DecodeError::Unpredictable);
    }
    if t == 13 || t == 15 || t2 == 13 || t2 == 15 || t == t2 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrdImmediate {
        flags,
        t,
        t2,
        n,
        imm32: u32::from(bits16(raw.high, 7, 0)) << 2,
    })
}

// op1 = 0b11110: branches and miscellaneous control, data processing with
// modified or plain immediates.

pub(super) fn split_op11110(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    if bit16(raw.high, 15) {
        return split_branch_misc(raw, state);
    }
    if !bit16(raw.low, 9) {
        return split_dp_modified_immediate(raw, state);
    }
    split_dp_plain_immediate(raw, state)
}

fn split_branch_misc(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let op1 = bits16(raw.high, 14, 12);
    let op = bits16(raw.low, 10, 4);
    match op1 {
        0b000 | 0b010 => {
            if bits16(op, 5, 3) != 0b111 {
                return b_t3(raw, state);
            }
            if bits16(op, 6, 1) == 0b011100 {
                return msr_t1(raw, state);
            }
            if bits16(op, 6, 1) == 0b011111 {
                return mrs_t1(raw, state);
            }
            if op == 0b0111011 {
                return split_misc_control(raw, state);
            }
            Err(DecodeError::UnknownOpcode)
        }
        0b001 | 0b011 => b_t4(raw, state),
        0b101 | 0b111 => bl_t1(raw, state),
        _ => Err(DecodeError::UnknownOpcode),
    }
}

fn split_misc_control(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    match bits16(raw.high, 7, 4) {
        0b0100 => Ok(Instr::Dsb { flags: wide(InstrFlags::empty()) }),
        0b0101 => Ok(Instr::Dmb { flags: wide(InstrFlags::empty()) }),
        0b0110 => Ok(Instr::Isb { flags: wide(InstrFlags::empty()) }),
        _ => Err(DecodeError::UnknownOpcode),
    }
}

fn b_t3(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    if in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    let s = u32::from(bit16(raw.low, 10));
    let cond = bits16(raw.low, 9, 6) as u8;
    let imm6 = u32::from(bits16(raw.low, 5, 0));
    let j1 = u32::from(bit16(raw.high, 13));
    let j2 = u32::from(bit16(raw.high, 11));
    let imm11 = u32::from(bits16(raw.high, 10, 0));
    let imm = (s << 20) | (j2 << 19) | (j1 << 18) | (imm6 << 12) | (imm11 << 1);
    Ok(Instr::BCond {
        flags: wide(InstrFlags::empty()),
        cond,
        imm32: sign_extend(imm, 20) as i32,
    })
}

fn b_t4(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    if in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    let s = u32::from(bit16(raw.low, 10));
    let imm10 = u32::from(bits16(raw.low, 9, 0));
    let j1 = u32::from(bit16(raw.high, 13));
    let j2 = u32::from(bit16(raw.high, 11));
    let imm11 = u32::from(bits16(raw.high, 10, 0));
    let i1 = !(j1 ^ s) & 1;
    let i2 = !(j2 ^ s) & 1;
    let imm = (s << 24) | (i1 << 23) | (i2 << 22) | (imm10 << 12) | (imm11 << 1);
    Ok(Instr::B {
        flags: wide(InstrFlags::empty()),
        imm32: sign_extend(imm, 24) as i32,
    })
}

fn bl_t1(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.high, 15, 14), 0b11);
    debug_assert!(bit16(raw.high, 12));
    if in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    let s = u32::from(bit16(raw.low, 10));
    let imm10 = u32::from(bits16(raw.low, 9, 0));
    let j1 = u32::from(bit16(raw.high, 13));
    let j2 = u32::from(bit16(raw.high, 11));
    let imm11 = u32::from(bits16(raw.high, 10, 0));
    let i1 = !(j1 ^ s) & 1;
    let i2 = !(j2 ^ s) & 1;
    let imm = (s << 24) | (i1 << 23) | (i2 << 22) | (imm10 << 12) | (imm11 << 1);
    Ok(Instr::Bl {
        flags: wide(InstrFlags::empty()),
        imm32: sign_extend(imm, 24) as i32,
    })
}

/// SYSm values MRS/MSR may name.
fn sysm_valid(sysm: u8) -> bool {
    matches!(sysm, 0..=3 | 5..=9 | 16..=20)
}

fn msr_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 4), 0b111100111000);
    debug_assert_eq!(bits16(raw.high, 15, 12), 0b1000);
    let n = bits16(raw.low, 3, 0) as u8;
    let mask = bits16(raw.high, 11, 10) as u8;
    let sysm = bits16(raw.high, 7, 0) as u8;
    if mask == 0b00 || (mask != 0b10 && sysm > 3) {
        return Err(DecodeError::Unpredictable);
    }
    if n == 13 || n == 15 || !sysm_valid(sysm) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::Msr {
        flags: wide(InstrFlags::empty()),
        n,
        mask,
        sysm,
    })
}

fn mrs_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(raw.low, 0b1111001111101111);
    debug_assert_eq!(bits16(raw.high, 15, 12), 0b1000);
    let d = bits16(raw.high, 11, 8) as u8;
    let sysm = bits16(raw.high, 7, 0) as u8;
    if d == 13 || d == 15 || !sysm_valid(sysm) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::Mrs {
        flags: wide(InstrFlags::empty()),
        d,
        sysm,
    })
}

// Data processing (modified immediate)

struct DpModImm {
    s: bool,
    n: u8,
    d: u8,
    imm12: u32,
}

fn dp_mod_imm(raw: RawInstr) -> DpModImm {
    let i = u32::from(bit16(raw.low, 10));
    let imm3 = u32::from(bits16(raw.high, 14, 12));
    let imm8 = u32::from(bits16(raw.high, 7, 0));
    DpModImm {
        s: bit16(raw.low, 4),
        n: bits16(raw.low, 3, 0) as u8,
        d: bits16(raw.high, 11, 8) as u8,
        imm12: (i << 11) | (imm3 << 8) | imm8,
    }
}

fn split_dp_modified_immediate(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let f = dp_mod_imm(raw);
    let op = bits16(raw.low, 8, 5);
    match op {
        0b0000 if f.d == 0b1111 && f.s => {
            check_not_13_15(&[f.n])?;
            Ok(Instr::TstImmediate {
                flags: wide(InstrFlags::empty()),
                n: f.n,
                imm: expand_imm(state, f.imm12)?,
            })
        }
        0b0000 if f.d != 0b1111 => {
            check_not_13_15(&[f.d, f.n])?;
            Ok(Instr::AndImmediate {
                flags: wide(setflags(f.s)),
                d: f.d,
                n: f.n,
                imm: expand_imm(state, f.imm12)?,
            })
        }
        0b0001 => {
            check_not_13_15(&[f.d, f.n])?;
            Ok(Instr::BicImmediate {
                flags: wide(setflags(f.s)),
                d: f.d,
                n: f.n,
                imm: expand_imm(state, f.imm12)?,
            })
        }
        0b0010 if f.n == 0b1111 => {
            check_not_13_15(&[f.d])?;
            Ok(Instr::MovImmediate {
                flags: wide(setflags(f.s)),
                d: f.d,
                imm: expand_imm(state, f.imm12)?,
            })
        }
        0b0010 => {
            check_not_13_15(&[f.d])?;
            if f.n == 13 {
                return Err(DecodeError::Unpredictable);
            }
            Ok(Instr::OrrImmediate {
                flags: wide(setflags(f.s)),
                d: f.d,
                n: f.n,
                imm: expand_imm(state, f.imm12)?,
            })
        }
        0b0011 if f.n == 0b1111 => {
            check_not_13_15(&[f.d])?;
            Ok(Instr::MvnImmediate {
                flags: wide(setflags(f.s)),
                d: f.d,
                imm: expand_imm(state, f.imm12)?,
            })
        }
        0b0100 if f.d == 0b1111 && f.s => {
            check_not_13_15(&[f.n])?;
            Ok(Instr::TeqImmediate {
                flags: wide(InstrFlags::empty()),
                n: f.n,
                imm: expand_imm(state, f.imm12)?,
            })
        }
        0b0100 if f.d != 0b1111 => {
            check_not_13_15(&[f.d, f.n])?;
            Ok(Instr::EorImmediate {
                flags: wide(setflags(f.s)),
                d: f.d,
                n: f.n,
                imm: expand_imm(state, f.imm12)?,
            })
        }
        0b1000 if f.d == 0b1111 && f.s => {
            if f.n == 15 {
                return Err(DecodeError::Unpredictable);
            }
            Ok(Instr::CmnImmediate {
                flags: wide(InstrFlags::empty()),
                n: f.n,
                imm32: expand_imm(state, f.imm12)?.imm32,
            })
        }
        0b1000 if f.d != 0b1111 => {
            // n = 13 is ADD (SP plus immediate) T3.
            check_not_13_15(&[f.d])?;
            if f.n == 15 {
                return Err(DecodeError::Unpredictable);
            }
            Ok(Instr::AddImmediate {
                flags: wide(setflags(f.s)),
                d: f.d,
                n: f.n,
                imm32: expand_imm(state, f.imm12)?.imm32,
            })
        }
        0b1010 => {
            check_not_13_15(&[f.d, f.n])?;
            Ok(Instr::AdcImmediate {
                flags: wide(setflags(f.s)),
                d: f.d,
                n: f.n,
                imm32: expand_imm(state, f.imm12)?.imm32,
            })
        }
        0b1011 => {
            check_not_13_15(&[f.d, f.n])?;
            Ok(Instr::SbcImmediate {
                flags: wide(setflags(f.s)),
                d: f.d,
                n: f.n,
                imm32: expand_imm(state, f.imm12)?.imm32,
            })
        }
        0b1101 if f.d == 0b1111 && f.s => {
            if f.n == 15 {
                return Err(DecodeError::Unpredictable);
            }
            Ok(Instr::CmpImmediate {
                flags: wide(InstrFlags::empty()),
                n: f.n,
                imm32: expand_imm(state, f.imm12)?.imm32,
            })
        }
        0b1101 if f.d != 0b1111 => {
            check_not_13_15(&[f.d])?;
            if f.n == 15 {
                return Err(DecodeError::Unpredictable);
            }
            Ok(Instr::SubImmediate {
                flags: wide(setflags(f.s)),
                d: f.d,
                n: f.n,
                imm32: expand_imm(state, f.imm12)?.imm32,
            })
        }
        0b1110 => {
            check_not_13_15(&[f.d, f.n])?;
            Ok(Instr::RsbImmediate {
                flags: wide(setflags(f.s)),
                d: f.d,
                n: f.n,
                imm32: expand_imm(state, f.imm12)?.imm32,
            })
        }
        _ => Err(DecodeError::UnknownOpcode),
    }
}

// Data processing (plain binary immediate)

fn split_dp_plain_immediate(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let op = bits16(raw.low, 8, 4);
    let rn = bits16(raw.low, 3, 0);
    match op {
        0b00100 => movw_t3(raw, state),
        0b01100 => movt_t1(raw, state),
        0b00000 if rn == 0b1111 => adr_t3(raw, state),
        0b00000 => add_immediate_t4(raw, state),
        0b01010 if rn == 0b1111 => adr_t2(raw, state),
        0b01010 => sub_immediate_t4(raw, state),
        0b10100 => sbfx_t1(raw, state),
        0b10110 if rn != 0b1111 => bfi_t1(raw, state),
        0b11100 => ubfx_t1(raw, state),
        _ => Err(DecodeError::UnknownOpcode),
    }
}

fn plain_imm12(raw: RawInstr) -> u32 {
    let i = u32::from(bit16(raw.low, 10));
    let imm3 = u32::from(bits16(raw.high, 14, 12));
    let imm8 = u32::from(bits16(raw.high, 7, 0));
    (i << 11) | (imm3 << 8) | imm8
}

fn movw_t3(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let d = bits16(raw.high, 11, 8) as u8;
    check_not_13_15(&[d])?;
    let imm4 = u32::from(bits16(raw.low, 3, 0));
    let imm32 = (imm4 << 12) | plain_imm12(raw);
    Ok(Instr::MovImmediate {
        flags: wide(InstrFlags::empty()),
        d,
        imm: ImmCarry {
            imm32,
            carry: state.apsr_c(),
        },
    })
}

fn movt_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let d = bits16(raw.high, 11, 8) as u8;
    check_not_13_15(&[d])?;
    let imm4 = u32::from(bits16(raw.low, 3, 0));
    let imm16 = ((imm4 << 12) | plain_imm12(raw)) as u16;
    Ok(Instr::Movt {
        flags: wide(InstrFlags::empty()),
        d,
        imm16,
    })
}

fn adr_t3(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let d = bits16(raw.high, 11, 8) as u8;
    check_not_13_15(&[d])?;
    Ok(Instr::Adr {
        flags: wide(InstrFlags::ADD),
        d,
        imm32: plain_imm12(raw),
    })
}

fn adr_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let d = bits16(raw.high, 11, 8) as u8;
    check_not_13_15(&[d])?;
    Ok(Instr::Adr {
        flags: wide(InstrFlags::empty()),
        d,
        imm32: plain_imm12(raw),
    })
}

fn add_immediate_t4(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let d = bits16(raw.high, 11, 8) as u8;
    let n = bits16(raw.low, 3, 0) as u8;
    check_not_13_15(&[d])?;
    Ok(Instr::AddImmediate {
        flags: wide(InstrFlags::empty()),
        d,
        n,
        imm32: plain_imm12(raw),
    })
}

fn sub_immediate_t4(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let d = bits16(raw.high, 11, 8) as u8;
    let n = bits16(raw.low, 3, 0) as u8;
    check_not_13_15(&[d])?;
    Ok(Instr::SubImmediate {
        flags: wide(InstrFlags::empty()),
        d,
        n,
        imm32: plain_imm12(raw),
    })
}

fn bitfield_lsbit(raw: RawInstr) -> u8 {
    ((bits16(raw.high, 14, 12) << 2) | bits16(raw.high, 7, 6)) as u8
}

fn sbfx_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let d = bits16(raw.high, 11, 8) as u8;
    let n = bits16(raw.low, 3, 0) as u8;
    check_not_13_15(&[d, n])?;
    Ok(Instr::Sbfx {
        flags: wide(InstrFlags::empty()),
        d,
        n,
        lsbit: bitfield_lsbit(raw),
        widthminus1: bits16(raw.high, 4, 0) as u8,
    })
}

fn bfi_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let d = bits16(raw.high, 11, 8) as u8;
    let n = bits16(raw.low, 3, 0) as u8;
    check_not_13_15(&[d, n])?;
    let lsbit = bitfield_lsbit(raw);
    let msbit = bits16(raw.high, 4, 0) as u8;
    if msbit < lsbit {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::Bfi {
        flags: wide(InstrFlags::empty()),
        d,
        n,
        lsbit,
        msbit,
    })
}

fn ubfx_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let d = bits16(raw.high, 11, 8) as u8;
    let n = bits16(raw.low, 3, 0) as u8;
    check_not_13_15(&[d, n])?;
    Ok(Instr::Ubfx {
        flags: wide(InstrFlags::empty()),
        d,
        n,
        lsbit: bitfield_lsbit(raw),
        widthminus1: bits16(raw.high, 4, 0) as u8,
    })
}

// op1 = 0b11111: store single, load byte/halfword/word, data processing
// (register), multiplies and divides.

pub(super) fn split_op11111(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let op2 = bits16(raw.low, 10, 4);
    if bits16(op2, 6, 4) == 0b000 && !bit16(op2, 0) {
        return split_store_single(raw, state);
    }
    if bits16(op2, 6, 5) == 0b00 && bits16(op2, 2, 0) == 0b001 {
        return split_load_byte(raw, state);
    }
    if bits16(op2, 6, 5) == 0b00 && bits16(op2, 2, 0) == 0b011 {
        return split_load_halfword(raw, state);
    }
    if bits16(op2, 6, 5) == 0b00 && bits16(op2, 2, 0) == 0b101 {
        return split_load_word(raw, state);
    }
    if bits16(op2, 6, 4) == 0b010 {
        return split_dp_register(raw, state);
    }
    if bits16(op2, 6, 3) == 0b0110 {
        return split_multiply(raw, state);
    }
    if bits16(op2, 6, 3) == 0b0111 {
        return split_long_multiply_divide(raw, state);
    }
    Err(DecodeError::UnknownOpcode)
}

/// P/U/W flag byte of the imm8 load/store forms.
fn puw_flags(raw: RawInstr) -> InstrFlags {
    let mut flags = wide(InstrFlags::UNALIGNED_ALLOW);
    if bit16(raw.high, 10) {
        flags |= InstrFlags::INDEX;
    }
    if bit16(raw.high, 9) {
        flags |= InstrFlags::ADD;
    }
    if bit16(raw.high, 8) {
        flags |= InstrFlags::WBACK;
    }
    flags
}

fn imm12_flags() -> InstrFlags {
    wide(InstrFlags::INDEX | InstrFlags::ADD | InstrFlags::UNALIGNED_ALLOW)
}

fn split_store_single(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let op1 = bits16(raw.low, 7, 5);
    let t3_form = bit16(raw.high, 11);
    match op1 {
        0b100 => strb_immediate_t2(raw, state),
        0b101 => strh_immediate_t2(raw, state),
        0b110 => str_immediate_t3(raw, state),
        0b000 if t3_form => strb_immediate_t3(raw, state),
        0b000 => strb_register_t2(raw, state),
        0b001 if t3_form => strh_immediate_t3(raw, state),
        0b001 => strh_register_t2(raw, state),
        0b010 if t3_form => str_immediate_t4(raw, state),
        0b010 => str_register_t2(raw, state),
        _ => Err(DecodeError::UnknownOpcode),
    }
}

fn store_imm12_fields(raw: RawInstr) -> (u8, u8, u32) {
    (
        bits16(raw.high, 15, 12) as u8,
        bits16(raw.low, 3, 0) as u8,
        u32::from(bits16(raw.high, 11, 0)),
    )
}

fn strb_immediate_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm12_fields(raw);
    if n == 15 {
        return Err(DecodeError::Undefined);
    }
    if t == 13 || t == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::StrbImmediate { flags: imm12_flags(), t, n, imm32 })
}

fn strh_immediate_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm12_fields(raw);
    if n == 15 {
        return Err(DecodeError::Undefined);
    }
    if t == 13 || t == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::StrhImmediate { flags: imm12_flags(), t, n, imm32 })
}

fn str_immediate_t3(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm12_fields(raw);
    if n == 15 {
        return Err(DecodeError::Undefined);
    }
    if t == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::StrImmediate { flags: imm12_flags(), t, n, imm32 })
}

fn store_imm8_fields(raw: RawInstr) -> (u8, u8, u32) {
    (
        bits16(raw.high, 15, 12) as u8,
        bits16(raw.low, 3, 0) as u8,
        u32::from(bits16(raw.high, 7, 0)),
    )
}

fn check_store_t3_addressing(raw: RawInstr, t: u8, n: u8) -> Result<(), DecodeError> {
    let p = bit16(raw.high, 10);
    let w = bit16(raw.high, 8);
    if n == 15 || (!p && !w) {
        return Err(DecodeError::Undefined);
    }
    if t == 13 || t == 15 || (w && n == t) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(())
}

fn strb_immediate_t3(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm8_fields(raw);
    check_store_t3_addressing(raw, t, n)?;
    Ok(Instr::StrbImmediate { flags: puw_flags(raw), t, n, imm32 })
}

fn strh_immediate_t3(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm8_fields(raw);
    check_store_t3_addressing(raw, t, n)?;
    Ok(Instr::StrhImmediate { flags: puw_flags(raw), t, n, imm32 })
}

fn str_immediate_t4(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm8_fields(raw);
    let p = bit16(raw.high, 10);
    let w = bit16(raw.high, 8);
    if n == 15 || (!p && !w) {
        return Err(DecodeError::Undefined);
    }
    if t == 15 || (w && n == t) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::StrImmediate { flags: puw_flags(raw), t, n, imm32 })
}

fn register_offset_fields(raw: RawInstr) -> (u8, u8, u8, ImmShift) {
    (
        bits16(raw.high, 15, 12) as u8,
        bits16(raw.low, 3, 0) as u8,
        bits16(raw.high, 3, 0) as u8,
        ImmShift {
            srtype: SrType::Lsl,
            amount: bits16(raw.high, 5, 4) as u8,
        },
    )
}

fn str_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.high, 11, 6), 0);
    let (t, n, m, shift) = register_offset_fields(raw);
    if n == 15 {
        return Err(DecodeError::Undefined);
    }
    if t == 15 || m == 13 || m == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::StrRegister { flags: imm12_flags(), t, n, m, shift })
}

fn strb_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.high, 11, 6), 0);
    let (t, n, m, shift) = register_offset_fields(raw);
    if n == 15 {
        return Err(DecodeError::Undefined);
    }
    if t == 13 || t == 15 || m == 13 || m == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::StrbRegister { flags: imm12_flags(), t, n, m, shift })
}

fn strh_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.high, 11, 6), 0);
    let (t, n, m, shift) = register_offset_fields(raw);
    if n == 15 {
        return Err(DecodeError::Undefined);
    }
    if t == 13 || t == 15 || m == 13 || m == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::StrhRegister { flags: imm12_flags(), t, n, m, shift })
}

fn split_load_byte(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let op1 = bits16(raw.low, 8, 7);
    let op2 = bits16(raw.high, 11, 6);
    let rn = bits16(raw.low, 3, 0);
    let rt = bits16(raw.high, 15, 12);
    if rn == 0b1111 || rt == 0b1111 {
        // Literal loads and preload hints are not modeled.
        return Err(DecodeError::UnknownOpcode);
    }
    match op1 {
        0b01 => ldrb_immediate_t2(raw, state),
        0b00 if op2 == 0 => ldrb_register_t2(raw, state),
        0b00 if (bit16(raw.high, 11) && bit16(raw.high, 8)) || bits16(op2, 5, 2) == 0b1100 => {
            ldrb_immediate_t3(raw, state)
        }
        0b11 => ldrsb_immediate_t1(raw, state),
        0b10 if op2 == 0 => ldrsb_register_t2(raw, state),
        _ => Err(DecodeError::UnknownOpcode),
    }
}

fn ldrb_immediate_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm12_fields(raw);
    if t == 13 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrbImmediate { flags: imm12_flags(), t, n, imm32 })
}

fn ldrb_immediate_t3(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm8_fields(raw);
    let p = bit16(raw.high, 10);
    let w = bit16(raw.high, 8);
    if !p && !w {
        return Err(DecodeError::Undefined);
    }
    if t == 13 || (w && n == t) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrbImmediate { flags: puw_flags(raw), t, n, imm32 })
}

fn ldrb_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, m, shift) = register_offset_fields(raw);
    if t == 13 || m == 13 || m == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrbRegister { flags: imm12_flags(), t, n, m, shift })
}

fn ldrsb_immediate_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm12_fields(raw);
    if t == 13 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrsbImmediate { flags: imm12_flags(), t, n, imm32 })
}

fn ldrsb_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, m, shift) = register_offset_fields(raw);
    if t == 13 || m == 13 || m == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrsbRegister { flags: imm12_flags(), t, n, m, shift })
}

fn split_load_halfword(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let op1 = bits16(raw.low, 8, 7);
    let op2 = bits16(raw.high, 11, 6);
    let rn = bits16(raw.low, 3, 0);
    let rt = bits16(raw.high, 15, 12);
    if rn == 0b1111 || rt == 0b1111 {
        return Err(DecodeError::UnknownOpcode);
    }
    match op1 {
        0b01 => ldrh_immediate_t2(raw, state),
        0b00 if op2 == 0 => ldrh_register_t2(raw, state),
        0b00 if (bit16(raw.high, 11) && bit16(raw.high, 8)) || bits16(op2, 5, 2) == 0b1100 => {
            ldrh_immediate_t3(raw, state)
        }
        0b11 => ldrsh_immediate_t1(raw, state),
        0b10 if op2 == 0 => ldrsh_register_t2(raw, state),
        0b10 if (bit16(raw.high, 11) && bit16(raw.high, 8)) || bits16(op2, 5, 2) == 0b1100 => {
            ldrsh_immediate_t2(raw, state)
        }
        _ => Err(DecodeError::UnknownOpcode),
    }
}

fn ldrh_immediate_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm12_fields(raw);
    if t == 13 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrhImmediate { flags: imm12_flags(), t, n, imm32 })
}

fn ldrh_immediate_t3(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm8_fields(raw);
    let p = bit16(raw.high, 10);
    let w = bit16(raw.high, 8);
    if !p && !w {
        return Err(DecodeError::Undefined);
    }
    if t == 13 || (w && n == t) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrhImmediate { flags: puw_flags(raw), t, n, imm32 })
}

fn ldrh_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, m, shift) = register_offset_fields(raw);
    if t == 13 || m == 13 || m == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrhRegister { flags: imm12_flags(), t, n, m, shift })
}

fn ldrsh_immediate_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm12_fields(raw);
    if t == 13 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrshImmediate { flags: imm12_flags(), t, n, imm32 })
}

fn ldrsh_immediate_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm8_fields(raw);
    let p = bit16(raw.high, 10);
    let w = bit16(raw.high, 8);
    if !p && !w {
        return Err(DecodeError::Undefined);
    }
    if t == 13 || (w && n == t) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrshImmediate { flags: puw_flags(raw), t, n, imm32 })
}

fn ldrsh_register_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, m, shift) = register_offset_fields(raw);
    if t == 13 || m == 13 || m == 15 {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrshRegister { flags: imm12_flags(), t, n, m, shift })
}

fn split_load_word(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let op1 = bits16(raw.low, 8, 7);
    let op2 = bits16(raw.high, 11, 6);
    let rn = bits16(raw.low, 3, 0);
    if op1 >> 1 == 0 && rn == 0b1111 {
        return ldr_literal_t2(raw, state);
    }
    match op1 {
        0b01 => ldr_immediate_t3(raw, state),
        0b00 if (bit16(raw.high, 11) && bit16(raw.high, 8)) || bits16(op2, 5, 2) == 0b1100 => {
            ldr_immediate_t4(raw, state)
        }
        0b00 if op2 == 0 => ldr_register_t2(raw, state),
        _ => Err(DecodeError::UnknownOpcode),
    }
}

fn ldr_literal_t2(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let t = bits16(raw.high, 15, 12) as u8;
    if t == 15 && in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    let mut flags = wide(InstrFlags::UNALIGNED_ALLOW);
    if bit16(raw.low, 7) {
        flags |= InstrFlags::ADD;
    }
    Ok(Instr::LdrLiteral {
        flags,
        t,
        imm32: u32::from(bits16(raw.high, 11, 0)),
    })
}

fn ldr_immediate_t3(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm12_fields(raw);
    if t == 15 && in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrImmediate { flags: imm12_flags(), t, n, imm32 })
}

fn ldr_immediate_t4(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, imm32) = store_imm8_fields(raw);
    let p = bit16(raw.high, 10);
    let u = bit16(raw.high, 9);
    let w = bit16(raw.high, 8);
    debug_assert_ne!(bits16(raw.low, 3, 0), 0b1111);
    if n == 13 && !p && u && w && imm32 == 4 {
        // SEE POP (single register).
        return pop_t3(raw, state);
    }
    if !p && !w {
        return Err(DecodeError::Undefined);
    }
    if w && n == t {
        return Err(DecodeError::Unpredictable);
    }
    if t == 15 && in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrImmediate { flags: puw_flags(raw), t, n, imm32 })
}

fn ldr_register_t2(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let (t, n, m, shift) = register_offset_fields(raw);
    if m == 13 || m == 15 {
        return Err(DecodeError::Unpredictable);
    }
    if t == 15 && in_it_block(state) && !last_in_it_block(state) {
        return Err(DecodeError::Unpredictable);
    }
    Ok(Instr::LdrRegister { flags: imm12_flags(), t, n, m, shift })
}

// Data processing (register): register shifts, extends, CLZ

fn split_dp_register(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let op1 = bits16(raw.low, 7, 4);
    let op2 = bits16(raw.high, 7, 4);
    let rn = bits16(raw.low, 3, 0);
    if op2 == 0 {
        return match bits16(op1, 3, 1) {
            0b000 => shift_register_t2(raw, state, RegShiftKind::Lsl),
            0b001 => shift_register_t2(raw, state, RegShiftKind::Lsr),
            0b010 => shift_register_t2(raw, state, RegShiftKind::Asr),
            0b011 => shift_register_t2(raw, state, RegShiftKind::Ror),
            _ => Err(DecodeError::UnknownOpcode),
        };
    }
    if bit16(op2, 3) && rn == 0b1111 {
        return match op1 {
            0b0000 => extend_t2(raw, state, Extend32Kind::Sxth),
            0b0001 => extend_t2(raw, state, Extend32Kind::Uxth),
            0b0100 => extend_t2(raw, state, Extend32Kind::Sxtb),
            0b0101 => extend_t2(raw, state, Extend32Kind::Uxtb),
            _ => Err(DecodeError::UnknownOpcode),
        };
    }
    if bits16(op1, 3, 2) == 0b10 && bits16(op2, 3, 2) == 0b10 {
        // Miscellaneous operations.
        if bits16(raw.low, 5, 4) == 0b11 && bits16(raw.high, 5, 4) == 0b00 {
            return clz_t1(raw, state);
        }
    }
    Err(DecodeError::UnknownOpcode)
}

enum RegShiftKind {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

fn shift_register_t2(
    raw: RawInstr,
    _state: &CpuState,
    kind: RegShiftKind,
) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.high, 15, 12), 0b1111);
    let n = bits16(raw.low, 3, 0) as u8;
    let d = bits16(raw.high, 11, 8) as u8;
    let m = bits16(raw.high, 3, 0) as u8;
    check_not_13_15(&[d, n, m])?;
    let flags = wide(setflags(bit16(raw.low, 4)));
    Ok(match kind {
        RegShiftKind::Lsl => Instr::LslRegister { flags, d, n, m },
        RegShiftKind::Lsr => Instr::LsrRegister { flags, d, n, m },
        RegShiftKind::Asr => Instr::AsrRegister { flags, d, n, m },
        RegShiftKind::Ror => Instr::RorRegister { flags, d, n, m },
    })
}

enum Extend32Kind {
    Sxth,
    Uxth,
    Sxtb,
    Uxtb,
}

fn extend_t2(raw: RawInstr, _state: &CpuState, kind: Extend32Kind) -> Result<Instr, DecodeError> {
    let d = bits16(raw.high, 11, 8) as u8;
    let m = bits16(raw.high, 3, 0) as u8;
    check_not_13_15(&[d, m])?;
    let rotation = (bits16(raw.high, 5, 4) << 3) as u8;
    let flags = wide(InstrFlags::empty());
    Ok(match kind {
        Extend32Kind::Sxth => Instr::Sxth { flags, d, m, rotation },
        Extend32Kind::Uxth => Instr::Uxth { flags, d, m, rotation },
        Extend32Kind::Sxtb => Instr::Sxtb { flags, d, m, rotation },
        Extend32Kind::Uxtb => Instr::Uxtb { flags, d, m, rotation },
    })
}

fn clz_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.low, 15, 4), 0b111110101011);
    let m = bits16(raw.high, 3, 0) as u8;
    let d = bits16(raw.high, 11, 8) as u8;
    if bits16(raw.low, 3, 0) as u8 != m {
        return Err(DecodeError::Unpredictable);
    }
    check_not_13_15(&[d, m])?;
    Ok(Instr::Clz {
        flags: wide(InstrFlags::empty()),
        d,
        m,
    })
}

// Multiplies and divides

fn split_multiply(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let op1 = bits16(raw.low, 6, 4);
    let op2 = bits16(raw.high, 5, 4);
    let ra = bits16(raw.high, 15, 12);
    match (op1, op2) {
        (0b000, 0b00) if ra == 0b1111 => mul_t2(raw, state),
        (0b000, 0b00) => mla_t1(raw, state),
        (0b000, 0b01) => mls_t1(raw, state),
        _ => Err(DecodeError::UnknownOpcode),
    }
}

fn mul_fields(raw: RawInstr) -> (u8, u8, u8, u8) {
    (
        bits16(raw.high, 11, 8) as u8,
        bits16(raw.low, 3, 0) as u8,
        bits16(raw.high, 3, 0) as u8,
        bits16(raw.high, 15, 12) as u8,
    )
}

fn mul_t2(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (d, n, m, _) = mul_fields(raw);
    check_not_13_15(&[d, n, m])?;
    Ok(Instr::Mul {
        flags: wide(InstrFlags::empty()),
        d,
        n,
        m,
    })
}

fn mla_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (d, n, m, a) = mul_fields(raw);
    check_not_13_15(&[d, n, m, a])?;
    Ok(Instr::Mla {
        flags: wide(InstrFlags::empty()),
        d,
        n,
        m,
        a,
    })
}

fn mls_t1(raw: RawInstr, _state: &CpuState) -> Result<Instr, DecodeError> {
    let (d, n, m, a) = mul_fields(raw);
    check_not_13_15(&[d, n, m, a])?;
    Ok(Instr::Mls {
        flags: wide(InstrFlags::empty()),
        d,
        n,
        m,
        a,
    })
}

fn split_long_multiply_divide(raw: RawInstr, state: &CpuState) -> Result<Instr, DecodeError> {
    let op1 = bits16(raw.low, 6, 4);
    let op2 = bits16(raw.high, 7, 4);
    match (op1, op2) {
        (0b000, 0b0000) => long_multiply(raw, state, LongMulKind::Smull),
        (0b010, 0b0000) => long_multiply(raw, state, LongMulKind::Umull),
        (0b100, 0b0000) => long_multiply(raw, state, LongMulKind::Smlal),
        (0b110, 0b0000) => long_multiply(raw, state, LongMulKind::Umlal),
        (0b001, 0b1111) => divide(raw, state, true),
        (0b011, 0b1111) => divide(raw, state, false),
        _ => Err(DecodeError::UnknownOpcode),
    }
}

enum LongMulKind {
    Smull,
    Umull,
    Smlal,
    Umlal,
}

fn long_multiply(raw: RawInstr, _state: &CpuState, kind: LongMulKind) -> Result<Instr, DecodeError> {
    let n = bits16(raw.low, 3, 0) as u8;
    let dlo = bits16(raw.high, 15, 12) as u8;
    let dhi = bits16(raw.high, 11, 8) as u8;
    let m = bits16(raw.high, 3, 0) as u8;
    check_not_13_15(&[dlo, dhi, n, m])?;
    if dlo == dhi {
        return Err(DecodeError::Unpredictable);
    }
    let flags = wide(InstrFlags::empty());
    Ok(match kind {
        LongMulKind::Smull => Instr::Smull { flags, dlo, dhi, n, m },
        LongMulKind::Umull => Instr::Umull { flags, dlo, dhi, n, m },
        LongMulKind::Smlal => Instr::Smlal { flags, dlo, dhi, n, m },
        LongMulKind::Umlal => Instr::Umlal { flags, dlo, dhi, n, m },
    })
}

fn divide(raw: RawInstr, _state: &CpuState, signed: bool) -> Result<Instr, DecodeError> {
    debug_assert_eq!(bits16(raw.high, 15, 12), 0b1111);
    let n = bits16(raw.low, 3, 0) as u8;
    let d = bits16(raw.high, 11, 8) as u8;
    let m = bits16(raw.high, 3, 0) as u8;
    check_not_13_15(&[d, n, m])?;
    let flags = wide(InstrFlags::empty());
    Ok(if signed {
        Instr::Sdiv { flags, d, n, m }
    } else {
        Instr::Udiv { flags, d, n, m }
    })
}
