//! End-to-end execution scenarios with hand-assembled Thumb programs.

mod common;

use common::{Rig, BX_LR, NOP, SVC_EXIT};
use corten_cpu_core::exceptions::Exception;
use corten_cpu_core::state::{
    reg, SpecialReg, APSR_Z, CCR_DIV_0_TRP, CCR_UNALIGN_TRP, CFSR_BFARVALID, CFSR_DIVBYZERO,
    CFSR_PRECISERR, CFSR_UNALIGNED, SYSTICK_CSR_COUNTFLAG,
};
use pretty_assertions::assert_eq;

#[test]
fn simple_program_exits_through_svc_with_r0() {
    // movs r0, #42 ; svc #1
    let mut rig = Rig::new(&[0x202A, SVC_EXIT]);
    let outcome = rig.run(16).unwrap();

    assert!(outcome.terminated);
    assert_eq!(outcome.exit_code, 42);
    assert_eq!(rig.state.read_reg(0), 42);
}

#[test]
fn it_block_executes_both_then_arms_when_condition_holds() {
    // movs r0, #1 ; cmp r0, #1 ; itt eq ; moveq r1, #7 ; moveq r2, #8 ;
    // mov.w r3, #9 ; svc #1
    let mut rig = Rig::new(&[0x2001, 0x2801, 0xBF04, 0x2107, 0x2208, 0xF04F, 0x0309, SVC_EXIT]);
    let outcome = rig.run(16).unwrap();

    assert!(outcome.terminated);
    assert_eq!(rig.state.read_reg(1), 7);
    assert_eq!(rig.state.read_reg(2), 8);
    assert_eq!(rig.state.read_reg(3), 9);
    assert_ne!(rig.state.read_special(SpecialReg::Apsr) & APSR_Z, 0);
}

#[test]
fn it_block_skips_both_then_arms_when_condition_fails() {
    // Same block with cmp r0, #2: the predicated moves are skipped.
    let mut rig = Rig::new(&[0x2001, 0x2802, 0xBF04, 0x2107, 0x2208, 0xF04F, 0x0309, SVC_EXIT]);
    let outcome = rig.run(16).unwrap();

    assert!(outcome.terminated);
    assert_eq!(rig.state.read_reg(1), 0);
    assert_eq!(rig.state.read_reg(2), 0);
    assert_eq!(rig.state.read_reg(3), 9);
}

#[test]
fn push_pop_round_trip_restores_registers_and_sp() {
    // movs r0, #0x11 ; movs r1, #0x22 ; push {r0, r1} ; movs r0, #0 ;
    // movs r1, #0 ; pop {r0, r1} ; svc #1
    let mut rig = Rig::new(&[0x2011, 0x2122, 0xB403, 0x2000, 0x2100, 0xBC03, SVC_EXIT]);
    let sp_before = rig.state.read_reg(reg::SP);
    let outcome = rig.run(16).unwrap();

    assert!(outcome.terminated);
    assert_eq!(rig.state.read_reg(0), 0x11);
    assert_eq!(rig.state.read_reg(1), 0x22);
    assert_eq!(rig.state.read_reg(reg::SP), sp_before);
}

#[test]
fn systick_pends_after_reload_and_enters_handler_once() {
    let mut rig = Rig::new(&[NOP, NOP, NOP, NOP, NOP, NOP, NOP, NOP]);
    // Handler: adds r7, #1 ; bx lr
    rig.write_code(0x200, &[0x3701, BX_LR]);
    rig.set_vector(15, 0x200);
    rig.reset();

    // RVR = 3, then CSR = enable | tickint | clksource. The enable edge
    // loads CVR from RVR.
    rig.with_bus(|state, bus| {
        bus.write_u32(state, 0xE000_E014, 3).unwrap();
        bus.write_u32(state, 0xE000_E010, 0x7).unwrap();
    });
    assert_eq!(rig.state.read_special(SpecialReg::SysTickCvr), 3);

    // Three instructions count 3 -> 2 -> 1 -> reload; the fourth cycle is
    // consumed by the exception entry.
    for _ in 0..4 {
        rig.step_one().unwrap();
    }
    assert_ne!(
        rig.state.read_special(SpecialReg::SysTickCsr) & SYSTICK_CSR_COUNTFLAG,
        0
    );
    assert!(rig.state.exceptions.is_active(Exception::SysTick));
    assert_eq!(rig.state.read_reg(7), 0, "handler body not yet executed");

    // Handler body runs and returns.
    rig.step_one().unwrap();
    rig.step_one().unwrap();
    assert_eq!(rig.state.read_reg(7), 1);
    assert!(!rig.state.exceptions.is_active(Exception::SysTick));
}

#[test]
fn precise_bus_fault_records_bfar_and_resumes_after_handler() {
    // movs r0, #0xF0 ; lsls r0, r0, #24 ; movs r1, #0x55 ; str r1, [r0] ;
    // movs r2, #1 ; movs r0, #0 ; svc #1
    let mut rig = Rig::new(&[0x20F0, 0x0600, 0x2155, 0x6001, 0x2201, 0x2000, SVC_EXIT]);
    rig.write_code(0x200, &[0x3701, BX_LR]);
    rig.set_vector(5, 0x200);
    rig.reset();

    let outcome = rig.run(32).unwrap();

    assert!(outcome.terminated);
    let cfsr = rig.state.read_special(SpecialReg::Cfsr);
    assert_ne!(cfsr & CFSR_PRECISERR, 0);
    assert_ne!(cfsr & CFSR_BFARVALID, 0);
    assert_eq!(rig.state.read_special(SpecialReg::Bfar), 0xF000_0000);
    assert_eq!(rig.state.read_reg(7), 1, "bus-fault handler ran once");
    assert_eq!(rig.state.read_reg(2), 1, "offending instruction advanced");
}

#[test]
fn divide_by_zero_traps_when_enabled() {
    // movs r1, #10 ; movs r2, #0 ; udiv r0, r1, r2 ; movs r3, #1 ; svc #1
    let mut rig = Rig::new(&[0x210A, 0x2200, 0xFBB1, 0xF0F2, 0x2301, SVC_EXIT]);
    rig.write_code(0x200, &[0x3701, BX_LR]);
    rig.set_vector(6, 0x200);
    rig.reset();
    let ccr = rig.state.read_special(SpecialReg::Ccr);
    rig.state.write_special(SpecialReg::Ccr, ccr | CCR_DIV_0_TRP);

    let outcome = rig.run(32).unwrap();

    assert!(outcome.terminated);
    assert_ne!(
        rig.state.read_special(SpecialReg::Cfsr) & CFSR_DIVBYZERO,
        0
    );
    assert_eq!(rig.state.read_reg(7), 1, "usage-fault handler ran once");
    assert_eq!(rig.state.read_reg(3), 1);
}

#[test]
fn divide_by_zero_yields_zero_without_the_trap() {
    // movs r1, #10 ; movs r2, #0 ; movs r0, #7 ; udiv r0, r1, r2 ; svc #1
    let mut rig = Rig::new(&[0x210A, 0x2200, 0x2007, 0xFBB1, 0xF0F2, SVC_EXIT]);
    let outcome = rig.run(16).unwrap();

    assert!(outcome.terminated);
    assert_eq!(outcome.exit_code, 0, "quotient forced to zero");
    assert_eq!(rig.state.read_special(SpecialReg::Cfsr) & CFSR_DIVBYZERO, 0);
}

fn unaligned_load_program() -> Rig {
    // ldr r1, [pc, #12] ; adds r1, #1 ; ldr r2, [r1] ; svc #1
    // literal at 0x110: RAM_BASE
    let mut rig = Rig::new(&[0x4903, 0x3101, 0x680A, SVC_EXIT]);
    rig.write_flash_word(0x110, common::RAM_BASE);
    rig.write_code(0x200, &[0x3701, BX_LR]);
    rig.set_vector(6, 0x200);
    rig.reset();
    rig
}

#[test]
fn unaligned_word_access_succeeds_without_trap_enable() {
    let mut rig = unaligned_load_program();
    let outcome = rig.run(16).unwrap();

    assert!(outcome.terminated);
    assert_eq!(rig.state.read_reg(7), 0);
    assert_eq!(rig.state.read_special(SpecialReg::Cfsr) & CFSR_UNALIGNED, 0);
}

#[test]
fn unaligned_word_access_raises_usage_fault_with_unalign_trp() {
    let mut rig = unaligned_load_program();
    let ccr = rig.state.read_special(SpecialReg::Ccr);
    rig.state.write_special(SpecialReg::Ccr, ccr | CCR_UNALIGN_TRP);

    let outcome = rig.run(32).unwrap();

    assert!(outcome.terminated);
    assert_ne!(
        rig.state.read_special(SpecialReg::Cfsr) & CFSR_UNALIGNED,
        0
    );
    assert_eq!(rig.state.read_reg(7), 1, "usage-fault handler ran once");
    assert_eq!(rig.state.read_reg(2), 0, "load was abandoned");
}

#[test]
fn conditional_branch_outside_it_uses_its_encoded_condition() {
    // movs r0, #1 ; cmp r0, #1 ; beq +0 (skip one) ; movs r3, #1 ;
    // movs r4, #1 ; svc #1
    let mut rig = Rig::new(&[0x2001, 0x2801, 0xD000, 0x2301, 0x2401, SVC_EXIT]);
    let outcome = rig.run(16).unwrap();

    assert!(outcome.terminated);
    assert_eq!(rig.state.read_reg(3), 0, "beq skipped the next instruction");
    assert_eq!(rig.state.read_reg(4), 1);
}

#[test]
fn bl_and_bx_lr_round_trip() {
    // bl +4 ; svc #1 ; (callee) movs r0, #9 ; bx lr
    // bl at 0x100: target = 0x104 + 2 = 0x106? Layout:
    //   0x100: bl 0x108
    //   0x104: svc
    //   0x106: nop (padding)
    //   0x108: movs r0, #9 ; bx lr
    // BL imm32 = 0x108 - 0x104 = 4.
    let mut rig = Rig::new(&[0xF000, 0xF802, SVC_EXIT, NOP, 0x2009, BX_LR]);
    let outcome = rig.run(16).unwrap();

    assert!(outcome.terminated);
    assert_eq!(outcome.exit_code, 9);
    assert_eq!(rig.state.read_reg(reg::LR), 0x105, "return address | thumb");
}
