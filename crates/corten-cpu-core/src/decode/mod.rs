//! The instruction decoder: raw halfword pair in, typed [`Instr`] out.
//!
//! Dispatch is two-staged, following the encoding chapters of the ARMv7-M
//! reference: a 32-arm match on bits [15:11] of the first halfword routes
//! either straight to a leaf decoder or into a per-group splitter, and each
//! leaf extracts fields, applies the encoding's constraint checks and emits
//! one [`Instr`] variant. The decoder reads CPU state only for the IT-block
//! constraint checks and for APSR.C, which feeds the carry-out of the
//! modified-immediate expansion at decode time.

mod thumb16;
mod thumb32;

use crate::alu::{ImmCarry, ImmShift};
use crate::fetch::RawInstr;
use crate::state::CpuState;

bitflags::bitflags! {
    /// The uniform per-instruction flag byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InstrFlags: u8 {
        /// 32-bit encoding; PC advances by 4 instead of 2.
        const WIDE = 1 << 0;
        /// Offset is added (U bit).
        const ADD = 1 << 1;
        /// Pre-indexed addressing (P bit).
        const INDEX = 1 << 2;
        /// Base-register write-back (W bit).
        const WBACK = 1 << 3;
        /// Halfword table branch (TBH rather than TBB).
        const TBH = 1 << 4;
        /// Update APSR condition flags.
        const SETFLAGS = 1 << 5;
        /// Unaligned addresses are architecturally tolerated.
        const UNALIGNED_ALLOW = 1 << 6;
        /// Branch when the register is nonzero (CBNZ rather than CBZ).
        const NONZERO = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    UnknownOpcode,
    Unpredictable,
    Undefined,
}

/// A decoded instruction. Register numbers follow the encoding field names
/// (`d`, `n`, `m`, `t`, `a`); every variant carries the uniform flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    Nop { flags: InstrFlags },
    Dmb { flags: InstrFlags },
    Dsb { flags: InstrFlags },
    Isb { flags: InstrFlags },
    It { flags: InstrFlags, firstcond: u8, mask: u8 },

    // Moves and shifts.
    MovImmediate { flags: InstrFlags, d: u8, imm: ImmCarry },
    MvnImmediate { flags: InstrFlags, d: u8, imm: ImmCarry },
    Movt { flags: InstrFlags, d: u8, imm16: u16 },
    MovRegister { flags: InstrFlags, d: u8, m: u8 },
    MvnRegister { flags: InstrFlags, d: u8, m: u8, shift: ImmShift },
    LslImmediate { flags: InstrFlags, d: u8, m: u8, shift: ImmShift },
    LsrImmediate { flags: InstrFlags, d: u8, m: u8, shift: ImmShift },
    AsrImmediate { flags: InstrFlags, d: u8, m: u8, shift: ImmShift },
    RorImmediate { flags: InstrFlags, d: u8, m: u8, shift: ImmShift },
    Rrx { flags: InstrFlags, d: u8, m: u8 },
    LslRegister { flags: InstrFlags, d: u8, n: u8, m: u8 },
    LsrRegister { flags: InstrFlags, d: u8, n: u8, m: u8 },
    AsrRegister { flags: InstrFlags, d: u8, n: u8, m: u8 },
    RorRegister { flags: InstrFlags, d: u8, n: u8, m: u8 },

    // Add/subtract family.
    AddImmediate { flags: InstrFlags, d: u8, n: u8, imm32: u32 },
    AdcImmediate { flags: InstrFlags, d: u8, n: u8, imm32: u32 },
    SubImmediate { flags: InstrFlags, d: u8, n: u8, imm32: u32 },
    SbcImmediate { flags: InstrFlags, d: u8, n: u8, imm32: u32 },
    RsbImmediate { flags: InstrFlags, d: u8, n: u8, imm32: u32 },
    AddRegister { flags: InstrFlags, d: u8, n: u8, m: u8, shift: ImmShift },
    AdcRegister { flags: InstrFlags, d: u8, n: u8, m: u8, shift: ImmShift },
    SubRegister { flags: InstrFlags, d: u8, n: u8, m: u8, shift: ImmShift },
    SbcRegister { flags: InstrFlags, d: u8, n: u8, m: u8, shift: ImmShift },
    RsbRegister { flags: InstrFlags, d: u8, n: u8, m: u8, shift: ImmShift },
    AddSpPlusImmediate { flags: InstrFlags, d: u8, imm32: u32 },
    SubSpMinusImmediate { flags: InstrFlags, d: u8, imm32: u32 },
    Adr { flags: InstrFlags, d: u8, imm32: u32 },

    // Logical operations.
    AndImmediate { flags: InstrFlags, d: u8, n: u8, imm: ImmCarry },
    OrrImmediate { flags: InstrFlags, d: u8, n: u8, imm: ImmCarry },
    EorImmediate { flags: InstrFlags, d: u8, n: u8, imm: ImmCarry },
    BicImmediate { flags: InstrFlags, d: u8, n: u8, imm: ImmCarry },
    AndRegister { flags: InstrFlags, d: u8, n: u8, m: u8, shift: ImmShift },
    OrrRegister { flags: InstrFlags, d: u8, n: u8, m: u8, shift: ImmShift },
    EorRegister { flags: InstrFlags, d: u8, n: u8, m: u8, shift: ImmShift },
    BicRegister { flags: InstrFlags, d: u8, n: u8, m: u8, shift: ImmShift },

    // Compares and tests.
    CmpImmediate { flags: InstrFlags, n: u8, imm32: u32 },
    CmnImmediate { flags: InstrFlags, n: u8, imm32: u32 },
    CmpRegister { flags: InstrFlags, n: u8, m: u8, shift: ImmShift },
    CmnRegister { flags: InstrFlags, n: u8, m: u8, shift: ImmShift },
    TstImmediate { flags: InstrFlags, n: u8, imm: ImmCarry },
    TeqImmediate { flags: InstrFlags, n: u8, imm: ImmCarry },
    TstRegister { flags: InstrFlags, n: u8, m: u8, shift: ImmShift },
    TeqRegister { flags: InstrFlags, n: u8, m: u8, shift: ImmShift },

    // Extends, count leading zeros, bitfields.
    Sxtb { flags: InstrFlags, d: u8, m: u8, rotation: u8 },
    Sxth { flags: InstrFlags, d: u8, m: u8, rotation: u8 },
    Uxtb { flags: InstrFlags, d: u8, m: u8, rotation: u8 },
    Uxth { flags: InstrFlags, d: u8, m: u8, rotation: u8 },
    Clz { flags: InstrFlags, d: u8, m: u8 },
    Bfi { flags: InstrFlags, d: u8, n: u8, lsbit: u8, msbit: u8 },
    Ubfx { flags: InstrFlags, d: u8, n: u8, lsbit: u8, widthminus1: u8 },
    Sbfx { flags: InstrFlags, d: u8, n: u8, lsbit: u8, widthminus1: u8 },

    // Multiply and divide.
    Mul { flags: InstrFlags, d: u8, n: u8, m: u8 },
    Mla { flags: InstrFlags, d: u8, n: u8, m: u8, a: u8 },
    Mls { flags: InstrFlags, d: u8, n: u8, m: u8, a: u8 },
    Umull { flags: InstrFlags, dlo: u8, dhi: u8, n: u8, m: u8 },
    Smull { flags: InstrFlags, dlo: u8, dhi: u8, n: u8, m: u8 },
    Umlal { flags: InstrFlags, dlo: u8, dhi: u8, n: u8, m: u8 },
    Smlal { flags: InstrFlags, dlo: u8, dhi: u8, n: u8, m: u8 },
    Udiv { flags: InstrFlags, d: u8, n: u8, m: u8 },
    Sdiv { flags: InstrFlags, d: u8, n: u8, m: u8 },

    // Loads and stores.
    LdrImmediate { flags: InstrFlags, t: u8, n: u8, imm32: u32 },
    LdrbImmediate { flags: InstrFlags, t: u8, n: u8, imm32: u32 },
    LdrhImmediate { flags: InstrFlags, t: u8, n: u8, imm32: u32 },
    LdrsbImmediate { flags: InstrFlags, t: u8, n: u8, imm32: u32 },
    LdrshImmediate { flags: InstrFlags, t: u8, n: u8, imm32: u32 },
    LdrLiteral { flags: InstrFlags, t: u8, imm32: u32 },
    LdrRegister { flags: InstrFlags, t: u8, n: u8, m: u8, shift: ImmShift },
    LdrbRegister { flags: InstrFlags, t: u8, n: u8, m: u8, shift: ImmShift },
    LdrhRegister { flags: InstrFlags, t: u8, n: u8, m: u8, shift: ImmShift },
    LdrsbRegister { flags: InstrFlags, t: u8, n: u8, m: u8, shift: ImmShift },
    LdrshRegister { flags: InstrFlags, t: u8, n: u8, m: u8, shift: ImmShift },
    StrImmediate { flags: InstrFlags, t: u8, n: u8, imm32: u32 },
    StrbImmediate { flags: InstrFlags, t: u8, n: u8, imm32: u32 },
    StrhImmediate { flags: InstrFlags, t: u8, n: u8, imm32: u32 },
    StrRegister { flags: InstrFlags, t: u8, n: u8, m: u8, shift: ImmShift },
    StrbRegister { flags: InstrFlags, t: u8, n: u8, m: u8, shift: ImmShift },
    StrhRegister { flags: InstrFlags, t: u8, n: u8, m: u8, shift: ImmShift },
    LdrdImmediate { flags: InstrFlags, t: u8, t2: u8, n: u8, imm32: u32 },
    StrdImmediate { flags: InstrFlags, t: u8, t2: u8, n: u8, imm32: u32 },
    Ldrex { flags: InstrFlags, t: u8, n: u8, imm32: u32 },
    Strex { flags: InstrFlags, d: u8, t: u8, n: u8, imm32: u32 },

    // Load/store multiple.
    Push { flags: InstrFlags, registers: u32 },
    Pop { flags: InstrFlags, registers: u32 },
    Stm { flags: InstrFlags, n: u8, registers: u32 },
    Stmdb { flags: InstrFlags, n: u8, registers: u32 },
    Ldm { flags: InstrFlags, n: u8, registers: u32 },
    Ldmdb { flags: InstrFlags, n: u8, registers: u32 },

    // Branches.
    B { flags: InstrFlags, imm32: i32 },
    BCond { flags: InstrFlags, cond: u8, imm32: i32 },
    Bl { flags: InstrFlags, imm32: i32 },
    Bx { flags: InstrFlags, m: u8 },
    Blx { flags: InstrFlags, m: u8 },
    CbNZ { flags: InstrFlags, n: u8, imm32: u32 },
    TbbH { flags: InstrFlags, n: u8, m: u8 },

    // System.
    Svc { flags: InstrFlags, imm32: u32 },
    Bkpt { flags: InstrFlags, imm32: u32 },
    Msr { flags: InstrFlags, n: u8, mask: u8, sysm: u8 },
    Mrs { flags: InstrFlags, d: u8, sysm: u8 },
}

impl Instr {
    /// The uniform flag byte shared by every variant.
    pub fn flags(&self) -> InstrFlags {
        match *self {
            Instr::Nop { flags }
            | Instr::Dmb { flags }
            | Instr::Dsb { flags }
            | Instr::Isb { flags }
            | Instr::It { flags, .. }
            | Instr::MovImmediate { flags, .. }
            | Instr::MvnImmediate { flags, .. }
            | Instr::Movt { flags, .. }
            | Instr::MovRegister { flags, .. }
            | Instr::MvnRegister { flags, .. }
            | Instr::LslImmediate { flags, .. }
            | Instr::LsrImmediate { flags, .. }
            | Instr::AsrImmediate { flags, .. }
            | Instr::RorImmediate { flags, .. }
            | Instr::Rrx { flags, .. }
            | Instr::LslRegister { flags, .. }
            | Instr::LsrRegister { flags, .. }
            | Instr::AsrRegister { flags, .. }
            | Instr::RorRegister { flags, .. }
            | Instr::AddImmediate { flags, .. }
            | Instr::AdcImmediate { flags, .. }
            | Instr::SubImmediate { flags, .. }
            | Instr::SbcImmediate { flags, .. }
            | Instr::RsbImmediate { flags, .. }
            | Instr::AddRegister { flags, .. }
            | Instr::AdcRegister { flags, .. }
            | Instr::SubRegister { flags, .. }
            | Instr::SbcRegister { flags, .. }
            | Instr::RsbRegister { flags, .. }
            | Instr::AddSpPlusImmediate { flags, .. }
            | Instr::SubSpMinusImmediate { flags, .. }
            | Instr::Adr { flags, .. }
            | Instr::AndImmediate { flags, .. }
            | Instr::OrrImmediate { flags, .. }
            | Instr::EorImmediate { flags, .. }
            | Instr::BicImmediate { flags, .. }
            | Instr::AndRegister { flags, .. }
            | Instr::OrrRegister { flags, .. }
            | Instr::EorRegister { flags, .. }
            | Instr::BicRegister { flags, .. }
            | Instr::CmpImmediate { flags, .. }
            | Instr::CmnImmediate { flags, .. }
            | Instr::CmpRegister { flags, .. }
            | Instr::CmnRegister { flags, .. }
            | Instr::TstImmediate { flags, .. }
            | Instr::TeqImmediate { flags, .. }
            | Instr::TstRegister { flags, .. }
            | Instr::TeqRegister { flags, .. }
            | Instr::Sxtb { flags, .. }
            | Instr::Sxth { flags, .. }
            | Instr::Uxtb { flags, .. }
            | Instr::Uxth { flags, .. }
            | Instr::Clz { flags, .. }
            | Instr::Bfi { flags, .. }
            | Instr::Ubfx { flags, .. }
            | Instr::Sbfx { flags, .. }
            | Instr::Mul { flags, .. }
            | Instr::Mla { flags, .. }
            | Instr::Mls { flags, .. }
            | Instr::Umull { flags, .. }
            | Instr::Smull { flags, .. }
            | Instr::Umlal { flags, .. }
            | Instr::Smlal { flags, .. }
            | Instr::Udiv { flags, .. }
            | Instr::Sdiv { flags, .. }
            | Instr::LdrImmediate { flags, .. }
            | Instr::LdrbImmediate { flags, .. }
            | Instr::LdrhImmediate { flags, .. }
            | Instr::LdrsbImmediate { flags, .. }
            | Instr::LdrshImmediate { flags, .. }
            | Instr::LdrLiteral { flags, .. }
            | Instr::LdrRegister { flags, .. }
            | Instr::LdrbRegister { flags, .. }
            | Instr::LdrhRegister { flags, .. }
            | Instr::LdrsbRegister { flags, .. }
            | Instr::LdrshRegister { flags, .. }
            | Instr::StrImmediate { flags, .. }
            | Instr::StrbImmediate { flags, .. }
            | Instr::StrhImmediate { flags, .. }
            | Instr::StrRegister { flags, .. }
            | Instr::StrbRegister { flags, .. }
            | Instr::StrhRegister { flags, .. }
            | Instr::LdrdImmediate { flags, .. }
            | Instr::StrdImmediate { flags, .. }
            | Instr::Ldrex { flags, .. }
            | Instr::Strex { flags, .. }
            | Instr::Push { flags, .. }
            | Instr::Pop { flags, .. }
            | Instr::Stm { flags, .. }
            | Instr::Stmdb { flags, .. }
            | Instr::Ldm { flags, .. }
            | Instr::Ldmdb { flags, .. }
            | Instr::B { flags, .. }
            | Instr::BCond { flags, .. }
            | Instr::Bl { flags, .. }
            | Instr::Bx { flags, .. }
            | Instr::Blx { flags, .. }
            | Instr::CbNZ { flags, .. }
            | Instr::TbbH { flags, .. }
            | Instr::Svc { flags, .. }
            | Instr::Bkpt { flags, .. }
            | Instr::Msr { flags, .. }
            | Instr::Mrs { flags, .. } => flags,
        }
    }

    pub fn is_wide(&self) -> bool {
        self.flags().contains(InstrFlags::WIDE)
    }
}

#[inline]
pub(crate) fn bits16(x: u16, hi: u32, lo: u32) -> u16 {
    debug_assert!(hi >= lo && hi < 16);
    (x >> lo) & ((1 << (hi - lo + 1)) - 1) as u16
}

#[inline]
pub(crate) fn bit16(x: u16, n: u32) -> bool {
    x >> n & 1 != 0
}

/// Expands a 12-bit modified immediate using the live APSR carry.
pub(crate) fn expand_imm(state: &CpuState, imm12: u32) -> Result<ImmCarry, DecodeError> {
    crate::alu::thumb_expand_imm_c(imm12, state.apsr_c()).ok_or(DecodeError::Unpredictable)
}

/// Top-level dispatch on bits [15:11] of the first halfword.
pub fn decode(state: &CpuState, raw: RawInstr) -> Result<Instr, DecodeError> {
    use self::thumb16 as t16;
    use self::thumb32 as t32;

    match bits16(raw.low, 15, 11) {
        0b00000 => t16::split_shift_or_mov(raw, state),
        0b00001 => t16::lsr_immediate_t1(raw, state),
        0b00010 => t16::asr_immediate_t1(raw, state),
        0b00011 => t16::split_add_sub(raw, state),
        0b00100 => t16::mov_immediate_t1(raw, state),
        0b00101 => t16::cmp_immediate_t1(raw, state),
        0b00110 => t16::add_immediate_t2(raw, state),
        0b00111 => t16::sub_immediate_t2(raw, state),
        0b01000 => t16::split_data_processing(raw, state),
        0b01001 => t16::ldr_literal_t1(raw, state),
        0b01010 | 0b01011 => t16::split_load_store_register(raw, state),
        0b01100 => t16::str_immediate_t1(raw, state),
        0b01101 => t16::ldr_immediate_t1(raw, state),
        0b01110 => t16::strb_immediate_t1(raw, state),
        0b01111 => t16::ldrb_immediate_t1(raw, state),
        0b10000 => t16::strh_immediate_t1(raw, state),
        0b10001 => t16::ldrh_immediate_t1(raw, state),
        0b10010 => t16::str_immediate_t2(raw, state),
        0b10011 => t16::ldr_immediate_t2(raw, state),
        0b10100 => t16::adr_t1(raw, state),
        0b10101 => t16::add_sp_plus_immediate_t1(raw, state),
        0b10110 => t16::split_misc_a(raw, state),
        0b10111 => t16::split_misc_b(raw, state),
        0b11000 => t16::stm_t1(raw, state),
        0b11001 => t16::ldm_t1(raw, state),
        0b11010 | 0b11011 => t16::split_cond_branch_svc(raw, state),
        0b11100 => t16::b_t2(raw, state),
        0b11101 => t32::split_op11101(raw, state),
        0b11110 => t32::split_op11110(raw, state),
        0b11111 => t32::split_op11111(raw, state),
        _ => unreachable!("5-bit opcode"),
    }
}
