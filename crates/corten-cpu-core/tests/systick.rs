//! SysTick counter behavior.

mod common;

use common::{Rig, NOP};
use corten_cpu_core::exceptions::Exception;
use corten_cpu_core::peripherals::systick;
use corten_cpu_core::state::{
    SpecialReg, SYSTICK_CSR_COUNTFLAG, SYSTICK_CSR_ENABLE, SYSTICK_CSR_TICKINT,
};
use pretty_assertions::assert_eq;

#[test]
fn disabled_timer_does_not_count() {
    let mut rig = Rig::new(&[NOP]);
    rig.state.write_special(SpecialReg::SysTickCvr, 5);
    systick::tick(&mut rig.state);
    assert_eq!(rig.state.read_special(SpecialReg::SysTickCvr), 5);
}

#[test]
fn counts_down_and_reloads_with_countflag() {
    let mut rig = Rig::new(&[NOP]);
    rig.state.write_special(SpecialReg::SysTickRvr, 2);
    rig.state
        .write_special(SpecialReg::SysTickCsr, SYSTICK_CSR_ENABLE);
    rig.state.write_special(SpecialReg::SysTickCvr, 2);

    systick::tick(&mut rig.state);
    assert_eq!(rig.state.read_special(SpecialReg::SysTickCvr), 1);

    systick::tick(&mut rig.state);
    assert_eq!(rig.state.read_special(SpecialReg::SysTickCvr), 2, "reloaded");
    assert_ne!(
        rig.state.read_special(SpecialReg::SysTickCsr) & SYSTICK_CSR_COUNTFLAG,
        0
    );
    // TICKINT clear: no exception pended.
    assert!(!rig.state.exceptions.is_pending(Exception::SysTick));
}

#[test]
fn tickint_pends_the_systick_exception() {
    let mut rig = Rig::new(&[NOP]);
    rig.state.write_special(SpecialReg::SysTickRvr, 1);
    rig.state.write_special(
        SpecialReg::SysTickCsr,
        SYSTICK_CSR_ENABLE | SYSTICK_CSR_TICKINT,
    );
    rig.state.write_special(SpecialReg::SysTickCvr, 1);

    systick::tick(&mut rig.state);
    assert!(rig.state.exceptions.is_pending(Exception::SysTick));
}

#[test]
fn zero_reload_parks_the_counter() {
    let mut rig = Rig::new(&[NOP]);
    rig.state.write_special(SpecialReg::SysTickRvr, 0);
    rig.state.write_special(
        SpecialReg::SysTickCsr,
        SYSTICK_CSR_ENABLE | SYSTICK_CSR_TICKINT,
    );
    rig.state.write_special(SpecialReg::SysTickCvr, 0);

    for _ in 0..8 {
        systick::tick(&mut rig.state);
    }
    assert_eq!(rig.state.read_special(SpecialReg::SysTickCvr), 0);
    assert_eq!(
        rig.state.read_special(SpecialReg::SysTickCsr) & SYSTICK_CSR_COUNTFLAG,
        0
    );
    assert!(!rig.state.exceptions.is_pending(Exception::SysTick));
}

#[test]
fn enable_edge_reloads_from_rvr_and_cvr_write_clears() {
    let mut rig = Rig::new(&[NOP]);
    rig.with_bus(|state, bus| {
        bus.write_u32(state, 0xE000_E014, 100).unwrap();
        bus.write_u32(state, 0xE000_E010, SYSTICK_CSR_ENABLE).unwrap();
        assert_eq!(bus.read_u32(state, 0xE000_E018).unwrap(), 100);

        // Any CVR write clears the counter, regardless of the value.
        bus.write_u32(state, 0xE000_E018, 55).unwrap();
        assert_eq!(bus.read_u32(state, 0xE000_E018).unwrap(), 0);
    });
}

#[test]
fn csr_writes_cannot_set_countflag() {
    let mut rig = Rig::new(&[NOP]);
    rig.with_bus(|state, bus| {
        bus.write_u32(state, 0xE000_E010, SYSTICK_CSR_ENABLE | SYSTICK_CSR_COUNTFLAG)
            .unwrap();
    });
    assert_eq!(
        rig.state.read_special(SpecialReg::SysTickCsr) & SYSTICK_CSR_COUNTFLAG,
        0
    );
}
