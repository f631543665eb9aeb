//! Semihosting calls issued from guest code.

mod common;

use common::{Rig, NOP};
use corten_cpu_core::CoreError;
use pretty_assertions::assert_eq;

#[test]
fn sys_write0_streams_a_nul_terminated_string() {
    // movs r0, #4 ; ldr r1, [pc, #12] ; bkpt #0xAB ;
    // movs r0, #0x18 ; ldr r1, [pc, #8] ; bkpt #0xAB
    // literals: 0x110 = string address, 0x114 = ADP_Stopped_ApplicationExit
    let mut rig = Rig::new(&[0x2004, 0x4903, 0xBEAB, 0x2018, 0x4902, 0xBEAB]);
    rig.write_flash_word(0x110, 0x120);
    rig.write_flash_word(0x114, 0x20026);
    for (i, byte) in b"hi\0".iter().enumerate() {
        rig.flash[0x120 + i] = *byte;
    }
    rig.reset();

    let outcome = rig.run(16).unwrap();
    assert!(outcome.terminated);
    assert_eq!(outcome.exit_code, 0, "clean application exit");
    assert_eq!(rig.console, b"hi");
}

#[test]
fn sys_writec_emits_single_characters() {
    // movs r0, #3 ; ldr r1, [pc, #8] ; bkpt #0xAB ; movs r0, #0 ; svc #1
    let mut rig = Rig::new(&[0x2003, 0x4902, 0xBEAB, 0x2000, 0xDF01]);
    rig.write_flash_word(0x10C, 0x120);
    rig.flash[0x120] = b'x';
    rig.reset();

    let outcome = rig.run(16).unwrap();
    assert!(outcome.terminated);
    assert_eq!(rig.console, b"x");
}

#[test]
fn non_semihosting_bkpt_is_an_error_exit() {
    // bkpt #0 is not a host call.
    let mut rig = Rig::new(&[0xBE00, NOP]);
    assert_eq!(rig.run(4), Err(CoreError::ExecutorExitWithError));
}

#[test]
fn unknown_semihosting_operation_is_an_error_exit() {
    // movs r0, #0x77 ; bkpt #0xAB
    let mut rig = Rig::new(&[0x2077, 0xBEAB]);
    assert_eq!(rig.run(4), Err(CoreError::ExecutorExitWithError));
}
