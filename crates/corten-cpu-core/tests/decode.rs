//! Decoder dispatch and constraint checks against raw encodings.

mod common;

use common::{Rig, NOP};
use corten_cpu_core::decode::{self, DecodeError, Instr, InstrFlags};
use corten_cpu_core::fetch::{is_wide, RawInstr};
use corten_cpu_core::it;
use corten_cpu_core::state::SpecialReg;

fn narrow(low: u16) -> RawInstr {
    assert!(!is_wide(low));
    RawInstr {
        low,
        high: 0,
        wide: false,
    }
}

fn wide(low: u16, high: u16) -> RawInstr {
    assert!(is_wide(low));
    RawInstr { low, high, wide: true }
}

#[test]
fn decodes_basic_16_bit_forms() {
    let rig = Rig::new(&[NOP]);

    match decode::decode(&rig.state, narrow(0x202A)).unwrap() {
        Instr::MovImmediate { flags, d, imm } => {
            assert_eq!(d, 0);
            assert_eq!(imm.imm32, 42);
            assert!(flags.contains(InstrFlags::SETFLAGS));
        }
        other => panic!("expected mov, got {other:?}"),
    }

    match decode::decode(&rig.state, narrow(0xB403)).unwrap() {
        Instr::Push { registers, .. } => assert_eq!(registers, 0b11),
        other => panic!("expected push, got {other:?}"),
    }

    match decode::decode(&rig.state, narrow(0x4770)).unwrap() {
        Instr::Bx { m, .. } => assert_eq!(m, 14),
        other => panic!("expected bx, got {other:?}"),
    }

    // muls r0, r1, r0 (16-bit data processing, opcode 1101)
    match decode::decode(&rig.state, narrow(0x4348)).unwrap() {
        Instr::Mul { d, n, m, .. } => {
            assert_eq!((d, n, m), (0, 1, 0));
        }
        other => panic!("expected mul, got {other:?}"),
    }
}

#[test]
fn mov_immediate_t1_inside_it_block_does_not_set_flags() {
    let mut rig = Rig::new(&[NOP]);
    it::it_init(&mut rig.state, it::cond::EQ, 0b1000);
    match decode::decode(&rig.state, narrow(0x2107)).unwrap() {
        Instr::MovImmediate { flags, .. } => {
            assert!(!flags.contains(InstrFlags::SETFLAGS));
        }
        other => panic!("expected mov, got {other:?}"),
    }
}

#[test]
fn pop_with_pc_inside_it_block_must_be_last() {
    let mut rig = Rig::new(&[NOP]);
    // pop {r0, pc} = 0xBD01.
    assert!(decode::decode(&rig.state, narrow(0xBD01)).is_ok());

    // Mid-block: unpredictable.
    it::it_init(&mut rig.state, it::cond::EQ, 0b0100);
    assert_eq!(
        decode::decode(&rig.state, narrow(0xBD01)),
        Err(DecodeError::Unpredictable)
    );

    // Last slot of the block: allowed.
    it::it_init(&mut rig.state, it::cond::EQ, 0b1000);
    assert!(decode::decode(&rig.state, narrow(0xBD01)).is_ok());
}

#[test]
fn mov_register_t3_rejects_sp_pc_combinations() {
    let rig = Rig::new(&[NOP]);
    // movs.w r13, r0: S=1, d=13 -> unpredictable.
    let raw = wide(0xEA5F, 0x0D00);
    assert_eq!(
        decode::decode(&rig.state, raw),
        Err(DecodeError::Unpredictable)
    );

    // mov.w r1, r2 decodes fine.
    let raw = wide(0xEA4F, 0x0102);
    match decode::decode(&rig.state, raw).unwrap() {
        Instr::MovRegister { d, m, flags } => {
            assert_eq!((d, m), (1, 2));
            assert!(flags.contains(InstrFlags::WIDE));
        }
        other => panic!("expected mov.w, got {other:?}"),
    }
}

#[test]
fn ldr_immediate_t4_redirects_to_pop() {
    let rig = Rig::new(&[NOP]);
    // ldr r3, [sp], #4 == pop {r3}
    let raw = wide(0xF85D, 0x3B04);
    match decode::decode(&rig.state, raw).unwrap() {
        Instr::Pop { registers, flags } => {
            assert_eq!(registers, 1 << 3);
            assert!(flags.contains(InstrFlags::UNALIGNED_ALLOW));
        }
        other => panic!("expected pop, got {other:?}"),
    }
}

#[test]
fn it_constraints() {
    let mut rig = Rig::new(&[NOP]);
    // firstcond = 1111 is unpredictable.
    assert_eq!(
        decode::decode(&rig.state, narrow(0xBFF8)),
        Err(DecodeError::Unpredictable)
    );
    // firstcond = 1110 with more than one mask bit is unpredictable.
    assert_eq!(
        decode::decode(&rig.state, narrow(0xBFEC)),
        Err(DecodeError::Unpredictable)
    );
    // IT inside an IT block is unpredictable.
    it::it_init(&mut rig.state, it::cond::EQ, 0b1000);
    assert_eq!(
        decode::decode(&rig.state, narrow(0xBF08)),
        Err(DecodeError::Unpredictable)
    );
}

#[test]
fn modified_immediate_with_zero_byte_replication_is_unpredictable() {
    let rig = Rig::new(&[NOP]);
    // ands r2, r1 with imm12 = 0x100 (replicate-zero encoding).
    let raw = wide(0xF011, 0x1200);
    assert_eq!(
        decode::decode(&rig.state, raw),
        Err(DecodeError::Unpredictable)
    );
}

#[test]
fn mov_immediate_expansion_reads_live_carry() {
    let mut rig = Rig::new(&[NOP]);
    // mov.w r0, #0x80000000: imm12 = 0x400 rotates 0x80 right by 8.
    let raw = wide(0xF04F, 0x4000);
    // The rotated encoding produces its own carry-out (bit 31 of result).
    match decode::decode(&rig.state, raw).unwrap() {
        Instr::MovImmediate { imm, .. } => {
            assert_eq!(imm.imm32, 0x8000_0000);
            assert!(imm.carry);
        }
        other => panic!("expected mov.w, got {other:?}"),
    }

    // Plain byte encoding passes APSR.C through unchanged.
    rig.state
        .write_special(SpecialReg::Apsr, corten_cpu_core::state::APSR_C);
    match decode::decode(&rig.state, wide(0xF04F, 0x0055)).unwrap() {
        Instr::MovImmediate { imm, .. } => {
            assert_eq!(imm.imm32, 0x55);
            assert!(imm.carry);
        }
        other => panic!("expected mov.w, got {other:?}"),
    }
}

#[test]
fn unknown_and_undefined_encodings_fail_cleanly() {
    let rig = Rig::new(&[NOP]);
    // UDF #0 (permanently undefined 16-bit encoding).
    assert_eq!(
        decode::decode(&rig.state, narrow(0xDE00)),
        Err(DecodeError::UnknownOpcode)
    );
    // A floating-point coprocessor encoding decodes to unknown.
    assert_eq!(
        decode::decode(&rig.state, wide(0xEE00, 0x0A10)),
        Err(DecodeError::UnknownOpcode)
    );
}

#[test]
fn width_flag_matches_the_fetch_table() {
    let rig = Rig::new(&[NOP]);
    let instr = decode::decode(&rig.state, narrow(NOP)).unwrap();
    assert!(!instr.is_wide());

    // dmb ish = F3BF 8F5B
    let instr = decode::decode(&rig.state, wide(0xF3BF, 0x8F5B)).unwrap();
    assert!(matches!(instr, Instr::Dmb { .. }));
    assert!(instr.is_wide());
}
