//! Take-reset postconditions.

mod common;

use common::{Rig, CODE_BASE, NOP, SP_INIT};
use corten_cpu_core::state::{reg, Mode, SpecialReg, CCR_STKALIGN, IPSR_EXC_MASK};
use pretty_assertions::assert_eq;

#[test]
fn reset_loads_sp_and_entry_from_the_vector_table() {
    let rig = Rig::new(&[NOP]);
    assert_eq!(rig.state.instr_addr(), CODE_BASE, "thumb bit masked off");
    assert!(rig.state.thumb_bit());
    assert_eq!(rig.state.read_special(SpecialReg::SpMain), SP_INIT);
    assert_eq!(rig.state.read_reg(reg::SP), SP_INIT);
    assert_eq!(rig.state.read_reg(reg::LR), 0xFFFF_FFFF);
}

#[test]
fn reset_clears_mode_control_and_ipsr() {
    let mut rig = Rig::new(&[NOP]);
    // Dirty the state, then reset again.
    rig.state.set_mode(Mode::Handler);
    rig.state.write_special(SpecialReg::Ipsr, 11);
    rig.state.write_special(SpecialReg::Control, 0b11);
    rig.state.write_special(SpecialReg::Istate, 0xA4);
    rig.reset();

    assert_eq!(rig.state.mode(), Mode::Thread);
    assert!(rig.state.is_privileged());
    assert!(rig.state.is_main_stack());
    assert_eq!(rig.state.read_special(SpecialReg::Control), 0);
    assert_eq!(rig.state.read_special(SpecialReg::Ipsr) & IPSR_EXC_MASK, 0);
    assert_eq!(rig.state.read_special(SpecialReg::Istate), 0);
}

#[test]
fn reset_sets_stkalign() {
    let rig = Rig::new(&[NOP]);
    assert_ne!(rig.state.read_special(SpecialReg::Ccr) & CCR_STKALIGN, 0);
}

#[test]
fn reset_with_arm_entry_clears_the_thumb_bit() {
    // An even reset vector leaves T clear; the first step then pends the
    // invalid-state usage fault.
    let mut rig = Rig::without_reset(&[NOP]);
    rig.flash[4..8].copy_from_slice(&CODE_BASE.to_le_bytes());
    rig.reset();
    assert!(!rig.state.thumb_bit());
}
