//! Bus routing, fault bookkeeping and peripheral register access rules.

mod common;

use common::{Rig, NOP, RAM_BASE};
use corten_cpu_core::exceptions::Exception;
use corten_cpu_core::mem::{BusError, BusFaultKind};
use corten_cpu_core::state::{
    SpecialReg, CCR_STKALIGN, CFSR_BFARVALID, CFSR_PRECISERR, CFSR_UNSTKERR,
    SYSTICK_CSR_COUNTFLAG,
};
use pretty_assertions::assert_eq;

#[test]
fn ram_round_trips_all_widths() {
    let mut rig = Rig::new(&[NOP]);
    rig.with_bus(|state, bus| {
        bus.write_u32(state, RAM_BASE, 0xDEAD_BEEF).unwrap();
        assert_eq!(bus.read_u32(state, RAM_BASE).unwrap(), 0xDEAD_BEEF);
        assert_eq!(bus.read_u16(state, RAM_BASE).unwrap(), 0xBEEF);
        assert_eq!(bus.read_u8(state, RAM_BASE + 3).unwrap(), 0xDE);

        bus.write_u8(state, RAM_BASE + 1, 0x42).unwrap();
        assert_eq!(bus.read_u32(state, RAM_BASE).unwrap(), 0xDEAD_42EF);
    });
}

#[test]
fn flash_reads_but_refuses_writes() {
    let mut rig = Rig::new(&[NOP]);
    rig.with_bus(|state, bus| {
        let before = bus.read_u32(state, 0).unwrap();
        assert_eq!(
            bus.write_u32(state, 0, 0x1234_5678),
            Err(BusError::WriteNotAllowed(0))
        );
        assert_eq!(bus.read_u32(state, 0).unwrap(), before);
    });
    assert_eq!(rig.state.exceptions.pending_count(), 0);
}

#[test]
fn unmapped_access_reports_out_of_range() {
    let mut rig = Rig::new(&[NOP]);
    rig.with_bus(|state, bus| {
        assert_eq!(
            bus.read_u32(state, 0x4000_0000),
            Err(BusError::OutOfRange(0x4000_0000))
        );
    });
}

#[test]
fn precise_fault_updates_cfsr_bfar_and_pends_bus_fault() {
    let mut rig = Rig::new(&[NOP]);
    rig.with_bus(|state, bus| {
        let value = bus.read_u32_or_raise(state, 0xF000_0000, BusFaultKind::Precise);
        assert_eq!(value, 0, "faulted reads return zero");
    });
    let cfsr = rig.state.read_special(SpecialReg::Cfsr);
    assert_ne!(cfsr & CFSR_PRECISERR, 0);
    assert_ne!(cfsr & CFSR_BFARVALID, 0);
    assert_eq!(rig.state.read_special(SpecialReg::Bfar), 0xF000_0000);
    assert!(rig.state.exceptions.is_pending(Exception::BusFault));
}

#[test]
fn raising_store_to_flash_pends_and_preserves_the_old_value() {
    let mut rig = Rig::new(&[NOP]);
    rig.with_bus(|state, bus| {
        let before = bus.read_u32(state, 0x100).unwrap();
        bus.write_u32_or_raise(state, 0x100, 0x1234_5678, BusFaultKind::Precise);
        assert_eq!(bus.read_u32(state, 0x100).unwrap(), before);
    });
    assert!(rig.state.exceptions.is_pending(Exception::BusFault));
    assert_ne!(
        rig.state.read_special(SpecialReg::Cfsr) & CFSR_PRECISERR,
        0
    );
    assert_eq!(rig.state.read_special(SpecialReg::Bfar), 0x100);
}

#[test]
fn unstacking_read_fault_leaves_bfar_unwritten() {
    let mut rig = Rig::new(&[NOP]);
    rig.state.write_special(SpecialReg::Bfar, 0x5555_5555);
    rig.with_bus(|state, bus| {
        bus.read_u32_or_raise(state, 0xF000_0000, BusFaultKind::Unstack);
    });
    let cfsr = rig.state.read_special(SpecialReg::Cfsr);
    assert_ne!(cfsr & CFSR_UNSTKERR, 0);
    assert_eq!(cfsr & CFSR_BFARVALID, 0);
    assert_eq!(rig.state.read_special(SpecialReg::Bfar), 0x5555_5555);
}

#[test]
fn imprecise_fault_never_records_an_address() {
    let mut rig = Rig::new(&[NOP]);
    rig.state.write_special(SpecialReg::Bfar, 0x5555_5555);
    rig.with_bus(|state, bus| {
        bus.write_u32_or_raise(state, 0xF000_0000, 1, BusFaultKind::Imprecise);
    });
    assert_eq!(
        rig.state.read_special(SpecialReg::Cfsr) & CFSR_BFARVALID,
        0
    );
    assert_eq!(rig.state.read_special(SpecialReg::Bfar), 0x5555_5555);
}

#[test]
fn scb_cpuid_is_read_only() {
    let mut rig = Rig::new(&[NOP]);
    rig.with_bus(|state, bus| {
        let cpuid = bus.read_u32(state, 0xE000_ED00).unwrap();
        assert_eq!(cpuid >> 24, 0x41, "ARM implementer code");
        assert!(matches!(
            bus.write_u32(state, 0xE000_ED00, 0),
            Err(BusError::WriteNotAllowed(_))
        ));
    });
}

#[test]
fn scb_cfsr_is_write_one_to_clear() {
    let mut rig = Rig::new(&[NOP]);
    rig.state
        .write_special(SpecialReg::Cfsr, CFSR_PRECISERR | CFSR_BFARVALID);
    rig.with_bus(|state, bus| {
        bus.write_u32(state, 0xE000_ED28, CFSR_PRECISERR).unwrap();
        assert_eq!(bus.read_u32(state, 0xE000_ED28).unwrap(), CFSR_BFARVALID);
    });
}

#[test]
fn scb_ccr_sub_word_write_preserves_other_bytes() {
    let mut rig = Rig::new(&[NOP]);
    // STKALIGN (bit 9) is set after reset; writing the low byte must keep it.
    rig.with_bus(|state, bus| {
        bus.write_u8(state, 0xE000_ED14, 0x18).unwrap();
        let ccr = bus.read_u32(state, 0xE000_ED14).unwrap();
        assert_eq!(ccr & 0xFF, 0x18);
        assert_ne!(ccr & CCR_STKALIGN, 0);
    });
}

#[test]
fn scb_vtor_masks_the_low_bits() {
    let mut rig = Rig::new(&[NOP]);
    rig.with_bus(|state, bus| {
        bus.write_u32(state, 0xE000_ED08, 0x0001_2345).unwrap();
        assert_eq!(bus.read_u32(state, 0xE000_ED08).unwrap(), 0x0001_2300);
    });
}

#[test]
fn scb_shpr_writes_feed_exception_priorities() {
    let mut rig = Rig::new(&[NOP]);
    rig.with_bus(|state, bus| {
        // SHPR3: PendSV priority in byte 2, SysTick priority in byte 3.
        bus.write_u32(state, 0xE000_ED20, (0xC0 << 16) | (0x20 << 24)).unwrap();
    });
    assert_eq!(rig.state.exceptions.priority(Exception::PendSv), 0xC0);
    assert_eq!(rig.state.exceptions.priority(Exception::SysTick), 0x20);
}

#[test]
fn systick_csr_read_through_the_bus_clears_countflag() {
    let mut rig = Rig::new(&[NOP]);
    rig.state.write_special(
        SpecialReg::SysTickCsr,
        SYSTICK_CSR_COUNTFLAG | 0x1,
    );
    rig.with_bus(|state, bus| {
        let csr = bus.read_u32(state, 0xE000_E010).unwrap();
        assert_ne!(csr & SYSTICK_CSR_COUNTFLAG, 0);
        let csr = bus.read_u32(state, 0xE000_E010).unwrap();
        assert_eq!(csr & SYSTICK_CSR_COUNTFLAG, 0);
    });
}

#[test]
fn systick_calib_refuses_writes() {
    let mut rig = Rig::new(&[NOP]);
    rig.with_bus(|state, bus| {
        assert!(matches!(
            bus.write_u32(state, 0xE000_E01C, 1),
            Err(BusError::WriteNotAllowed(_))
        ));
    });
}
