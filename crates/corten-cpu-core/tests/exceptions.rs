//! Exception bank, arbitration and entry/return behavior.

mod common;

use common::{Rig, NOP, SP_INIT};
use corten_cpu_core::exceptions::{self, Exception, Instant};
use corten_cpu_core::state::{
    reg, Mode, SpecialReg, APSR_C, APSR_N, CFSR_BFARVALID, CFSR_STKERR, HFSR_FORCED,
    IPSR_EXC_MASK,
};
use pretty_assertions::assert_eq;

#[test]
fn pending_count_mirrors_pending_bits() {
    let mut rig = Rig::new(&[NOP]);
    let bank = &mut rig.state.exceptions;

    assert_eq!(bank.pending_count(), 0);
    bank.set_pending(Exception::BusFault);
    bank.set_pending(Exception::SysTick);
    assert_eq!(bank.pending_count(), 2);

    // Pending twice does not double-count.
    bank.set_pending(Exception::BusFault);
    assert_eq!(bank.pending_count(), 2);

    bank.clear_pending(Exception::BusFault);
    assert_eq!(bank.pending_count(), 1);
    bank.clear_pending(Exception::SysTick);
    assert_eq!(bank.pending_count(), 0);
}

#[test]
fn default_priorities_after_reset() {
    let rig = Rig::new(&[NOP]);
    let bank = &rig.state.exceptions;
    assert_eq!(bank.priority(Exception::Reset), -3);
    assert_eq!(bank.priority(Exception::Nmi), -2);
    assert_eq!(bank.priority(Exception::HardFault), -1);
    assert_eq!(bank.priority(Exception::SysTick), 0);
    assert_eq!(bank.priority(Exception::Irq(31)), 0);
}

#[test]
fn entry_then_return_restores_caller_registers_and_it_state() {
    let mut rig = Rig::new(&[NOP]);
    rig.write_code(0x200, &[NOP]);
    rig.set_vector(15, 0x200);
    rig.reset();

    for r in 0..=3u8 {
        rig.state.write_reg(r, 0x1111_0000 + u32::from(r));
    }
    rig.state.write_reg(12, 0xC12C_12C1);
    rig.state.write_reg(reg::LR, 0x0000_0137);
    rig.state.write_special(SpecialReg::Apsr, APSR_N | APSR_C);
    // A live IT block: firstcond EQ, two slots left.
    rig.state.write_special(SpecialReg::Istate, 0x04);
    rig.state.branch_to(0x104);
    let sp_before = rig.state.read_reg(reg::SP);

    rig.with_bus(|state, bus| {
        exceptions::exception_entry(state, bus, Exception::SysTick, 0x104).unwrap();
    });

    assert_eq!(rig.state.mode(), Mode::Handler);
    assert_eq!(rig.state.read_special(SpecialReg::Ipsr) & IPSR_EXC_MASK, 15);
    assert_eq!(rig.state.instr_addr(), 0x200);
    assert_eq!(rig.state.read_reg(reg::LR), 0xFFFF_FFF9);
    assert_eq!(rig.state.read_reg(reg::SP), sp_before - 0x20);
    assert!(rig.state.exceptions.is_active(Exception::SysTick));
    // Entry clears the IT state for the handler.
    assert_eq!(rig.state.read_special(SpecialReg::Istate), 0);

    rig.with_bus(|state, bus| {
        exceptions::exception_return(state, bus, 0x0FFF_FFF9).unwrap();
    });

    assert_eq!(rig.state.mode(), Mode::Thread);
    assert_eq!(rig.state.read_special(SpecialReg::Ipsr) & IPSR_EXC_MASK, 0);
    assert_eq!(rig.state.instr_addr(), 0x104);
    assert_eq!(rig.state.read_reg(reg::SP), sp_before);
    for r in 0..=3u8 {
        assert_eq!(rig.state.read_reg(r), 0x1111_0000 + u32::from(r));
    }
    assert_eq!(rig.state.read_reg(12), 0xC12C_12C1);
    assert_eq!(rig.state.read_reg(reg::LR), 0x0000_0137);
    assert_eq!(
        rig.state.read_special(SpecialReg::Apsr),
        APSR_N | APSR_C
    );
    assert_eq!(rig.state.read_special(SpecialReg::Istate), 0x04);
    assert!(!rig.state.exceptions.is_active(Exception::SysTick));
    assert_eq!(rig.state.exceptions.pending_count(), 0);
}

#[test]
fn frame_layout_matches_architected_slots() {
    let mut rig = Rig::new(&[NOP]);
    rig.write_code(0x200, &[NOP]);
    rig.set_vector(11, 0x200);
    rig.reset();

    for r in 0..=3u8 {
        rig.state.write_reg(r, 0xA0 + u32::from(r));
    }
    rig.state.write_reg(12, 0xAC);
    rig.state.write_reg(reg::LR, 0xAE);

    rig.with_bus(|state, bus| {
        exceptions::exception_entry(state, bus, Exception::SvCall, 0x0123_4566).unwrap();
    });

    let frame = rig.state.read_reg(reg::SP);
    assert_eq!(frame, SP_INIT - 0x20);
    let words: Vec<u32> = (0..8)
        .map(|i| {
            rig.with_bus(|state, bus| bus.read_u32(state, frame + 4 * i).unwrap())
        })
        .collect();
    assert_eq!(words[0], 0xA0); // R0
    assert_eq!(words[1], 0xA1); // R1
    assert_eq!(words[2], 0xA2); // R2
    assert_eq!(words[3], 0xA3); // R3
    assert_eq!(words[4], 0xAC); // R12
    assert_eq!(words[5], 0xAE); // LR
    assert_eq!(words[6], 0x0123_4566); // return address
    assert_ne!(words[7] & (1 << 24), 0, "stacked xPSR carries the T bit");
}

#[test]
fn arbitration_prefers_smaller_priority_then_smaller_number() {
    let mut rig = Rig::new(&[NOP, NOP]);
    rig.write_code(0x200, &[NOP]);
    for v in [16, 17] {
        rig.set_vector(v, 0x200);
    }
    rig.reset();

    rig.state.exceptions.set_priority(Exception::Irq(0), 1);
    rig.state.exceptions.set_priority(Exception::Irq(1), 0);
    rig.state.exceptions.set_pending(Exception::Irq(0));
    rig.state.exceptions.set_pending(Exception::Irq(1));

    let taken = rig.with_bus(|state, bus| {
        exceptions::check_exceptions(state, bus, Instant::PreFetch, 0x100, 0x100).unwrap()
    });
    assert!(taken);
    assert_eq!(
        rig.state.read_special(SpecialReg::Ipsr) & IPSR_EXC_MASK,
        17,
        "lower priority value wins over lower number"
    );

    // Equal priorities: the smaller exception number goes first.
    let mut rig = Rig::new(&[NOP, NOP]);
    rig.write_code(0x200, &[NOP]);
    for v in [16, 17] {
        rig.set_vector(v, 0x200);
    }
    rig.reset();
    rig.state.exceptions.set_pending(Exception::Irq(1));
    rig.state.exceptions.set_pending(Exception::Irq(0));
    let taken = rig.with_bus(|state, bus| {
        exceptions::check_exceptions(state, bus, Instant::PreFetch, 0x100, 0x100).unwrap()
    });
    assert!(taken);
    assert_eq!(rig.state.read_special(SpecialReg::Ipsr) & IPSR_EXC_MASK, 16);
}

#[test]
fn synchronous_faults_are_not_taken_at_the_pre_fetch_instant() {
    let mut rig = Rig::new(&[NOP]);
    rig.write_code(0x200, &[NOP]);
    rig.set_vector(5, 0x200);
    rig.reset();

    rig.state.exceptions.set_pending(Exception::BusFault);
    let taken = rig.with_bus(|state, bus| {
        exceptions::check_exceptions(state, bus, Instant::PreFetch, 0x100, 0x100).unwrap()
    });
    assert!(!taken, "BusFault waits for a synchronous check point");

    let taken = rig.with_bus(|state, bus| {
        exceptions::check_exceptions(state, bus, Instant::PostExecute, 0x100, 0x102).unwrap()
    });
    assert!(taken);
    assert_eq!(rig.state.read_special(SpecialReg::Ipsr) & IPSR_EXC_MASK, 5);
}

#[test]
fn active_exception_does_not_preempt_equal_priority() {
    let mut rig = Rig::new(&[NOP]);
    rig.write_code(0x200, &[NOP]);
    rig.set_vector(15, 0x200);
    rig.set_vector(16, 0x200);
    rig.reset();

    rig.with_bus(|state, bus| {
        state.exceptions.set_pending(Exception::SysTick);
        let taken =
            exceptions::check_exceptions(state, bus, Instant::PreFetch, 0x100, 0x100).unwrap();
        assert!(taken);
    });
    assert!(rig.state.exceptions.is_active(Exception::SysTick));

    // An equal-priority IRQ stays pending while the handler executes.
    rig.state.exceptions.set_pending(Exception::Irq(0));
    let taken = rig.with_bus(|state, bus| {
        exceptions::check_exceptions(state, bus, Instant::PreFetch, 0x200, 0x200).unwrap()
    });
    assert!(!taken);
    assert!(rig.state.exceptions.is_pending(Exception::Irq(0)));
}

#[test]
fn stacking_failure_pends_a_bus_fault_and_still_enters() {
    let mut rig = Rig::new(&[NOP]);
    rig.write_code(0x200, &[NOP]);
    rig.set_vector(16, 0x200);
    rig.reset();

    // Point the stack at unmapped memory so every push fails.
    rig.state.write_sp(0x1000_0000);
    rig.with_bus(|state, bus| {
        exceptions::exception_entry(state, bus, Exception::Irq(0), 0x100).unwrap();
    });

    assert_eq!(rig.state.instr_addr(), 0x200, "handler entered regardless");
    let cfsr = rig.state.read_special(SpecialReg::Cfsr);
    assert_ne!(cfsr & CFSR_STKERR, 0);
    assert_ne!(cfsr & CFSR_BFARVALID, 0);
    assert!(rig.state.exceptions.is_pending(Exception::BusFault));
}

#[test]
fn bus_fault_that_cannot_stack_escalates_to_hard_fault() {
    let mut rig = Rig::new(&[NOP]);
    rig.write_code(0x200, &[NOP]);
    rig.set_vector(3, 0x200);
    rig.set_vector(5, 0x200);
    rig.reset();

    // No stack at all: the BusFault entry fails to push, escalates to
    // HardFault, and the HardFault push fails too -> lockup.
    rig.state.write_sp(0x1000_0000);
    rig.state.exceptions.set_pending(Exception::BusFault);
    let result = rig.with_bus(|state, bus| {
        exceptions::check_exceptions(state, bus, Instant::PostExecute, 0x100, 0x102)
    });

    assert!(result.is_err(), "unstackable hard fault is a lockup");
    assert_ne!(
        rig.state.read_special(SpecialReg::Hfsr) & HFSR_FORCED,
        0
    );
}

#[test]
fn exception_return_rejects_malformed_exc_return() {
    let mut rig = Rig::new(&[NOP]);
    rig.write_code(0x200, &[NOP]);
    rig.set_vector(15, 0x200);
    rig.reset();

    rig.with_bus(|state, bus| {
        exceptions::exception_entry(state, bus, Exception::SysTick, 0x100).unwrap();
        // Upper bits must be ones.
        assert!(exceptions::exception_return(state, bus, 0x0000_0009).is_err());
        // Low nibble 0b0101 is not a defined return state.
        assert!(exceptions::exception_return(state, bus, 0x0FFF_FFF5).is_err());
    });
}
