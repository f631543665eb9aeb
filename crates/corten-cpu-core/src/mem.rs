//! The system bus: routes typed 8/16/32-bit loads and stores to the flash
//! span (read-only), the two RAM spans, and the memory-mapped peripheral
//! window, and implements the fault-raising access variants used by the
//! executor and the exception stacking paths.

use thiserror::Error;
use tracing::trace;

use crate::exceptions::Exception;
use crate::peripherals;
use crate::state::{
    CpuState, SpecialReg, CFSR_BFARVALID, CFSR_IBUSERR, CFSR_IMPRECISERR, CFSR_PRECISERR,
    CFSR_STKERR, CFSR_UNSTKERR,
};

/// Base and size of the fixed peripheral window.
pub const PERIPH_BASE: u32 = 0xE000_0000;
pub const PERIPH_SIZE: u32 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no memory mapped at {0:#010x}")]
    OutOfRange(u32),
    #[error("write rejected at {0:#010x}")]
    WriteNotAllowed(u32),
}

/// Classifies a failed access for CFSR/BFAR bookkeeping.
///
/// `Stack` tags exception-entry pushes, `Unstack` exception-return pops;
/// the BFAR update rules differ per kind and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFaultKind {
    Stack,
    Unstack,
    Imprecise,
    Precise,
    InstrFetch,
}

impl BusFaultKind {
    fn cfsr_bit(self) -> u32 {
        match self {
            BusFaultKind::Stack => CFSR_STKERR,
            BusFaultKind::Unstack => CFSR_UNSTKERR,
            BusFaultKind::Imprecise => CFSR_IMPRECISERR,
            BusFaultKind::Precise => CFSR_PRECISERR,
            BusFaultKind::InstrFetch => CFSR_IBUSERR,
        }
    }

    fn bfar_valid(self, is_write: bool) -> bool {
        match self {
            BusFaultKind::Stack => true,
            BusFaultKind::Unstack => is_write,
            BusFaultKind::Imprecise => false,
            BusFaultKind::Precise => true,
            BusFaultKind::InstrFetch => true,
        }
    }
}

/// A guest memory span: externally owned bytes mapped at a virtual base.
pub struct MemorySegment<'a> {
    data: &'a mut [u8],
    base: u32,
}

impl<'a> MemorySegment<'a> {
    pub fn new(data: &'a mut [u8], base: u32) -> Self {
        Self { data, base }
    }

    fn offset_of(&self, adr: u32, len: u32) -> Option<usize> {
        let end = self.base.wrapping_add(self.data.len() as u32);
        if adr >= self.base && adr.wrapping_add(len) <= end {
            Some((adr - self.base) as usize)
        } else {
            None
        }
    }
}

/// The bus borrows the memory spans for the duration of an execution call.
/// Every access takes the CPU state so peripheral registers and fault
/// status can be updated in place.
pub struct SystemBus<'m> {
    flash: MemorySegment<'m>,
    ram1: MemorySegment<'m>,
    ram2: Option<MemorySegment<'m>>,
}

enum Route {
    Flash(usize),
    Ram1(usize),
    Ram2(usize),
    Peripheral(u32),
}

impl<'m> SystemBus<'m> {
    pub fn new(
        flash: MemorySegment<'m>,
        ram1: MemorySegment<'m>,
        ram2: Option<MemorySegment<'m>>,
    ) -> Self {
        Self { flash, ram1, ram2 }
    }

    fn route(&self, adr: u32, len: u32) -> Option<Route> {
        if let Some(off) = self.flash.offset_of(adr, len) {
            return Some(Route::Flash(off));
        }
        if let Some(off) = self.ram1.offset_of(adr, len) {
            return Some(Route::Ram1(off));
        }
        if let Some(off) = self.ram2.as_ref().and_then(|seg| seg.offset_of(adr, len)) {
            return Some(Route::Ram2(off));
        }
        if adr >= PERIPH_BASE && adr.wrapping_add(len) <= PERIPH_BASE + PERIPH_SIZE {
            return Some(Route::Peripheral(adr - PERIPH_BASE));
        }
        None
    }

    fn read_bytes(&mut self, state: &mut CpuState, adr: u32, buf: &mut [u8]) -> Result<(), BusError> {
        let len = buf.len() as u32;
        match self.route(adr, len).ok_or(BusError::OutOfRange(adr))? {
            Route::Flash(off) => buf.copy_from_slice(&self.flash.data[off..off + buf.len()]),
            Route::Ram1(off) => buf.copy_from_slice(&self.ram1.data[off..off + buf.len()]),
            Route::Ram2(off) => {
                let seg = self.ram2.as_ref().expect("route checked ram2");
                buf.copy_from_slice(&seg.data[off..off + buf.len()]);
            }
            Route::Peripheral(off) => peripherals::read(state, off, buf)?,
        }
        Ok(())
    }

    fn write_bytes(&mut self, state: &mut CpuState, adr: u32, bytes: &[u8]) -> Result<(), BusError> {
        let len = bytes.len() as u32;
        match self.route(adr, len).ok_or(BusError::OutOfRange(adr))? {
            Route::Flash(_) => return Err(BusError::WriteNotAllowed(adr)),
            Route::Ram1(off) => self.ram1.data[off..off + bytes.len()].copy_from_slice(bytes),
            Route::Ram2(off) => {
                let seg = self.ram2.as_mut().expect("route checked ram2");
                seg.data[off..off + bytes.len()].copy_from_slice(bytes);
            }
            Route::Peripheral(off) => peripherals::write(state, off, bytes)?,
        }
        Ok(())
    }

    pub fn read_u8(&mut self, state: &mut CpuState, adr: u32) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        self.read_bytes(state, adr, &mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self, state: &mut CpuState, adr: u32) -> Result<u16, BusError> {
        let mut buf = [0u8; 2];
        self.read_bytes(state, adr, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self, state: &mut CpuState, adr: u32) -> Result<u32, BusError> {
        let mut buf = [0u8; 4];
        self.read_bytes(state, adr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn write_u8(&mut self, state: &mut CpuState, adr: u32, value: u8) -> Result<(), BusError> {
        self.write_bytes(state, adr, &[value])
    }

    pub fn write_u16(&mut self, state: &mut CpuState, adr: u32, value: u16) -> Result<(), BusError> {
        self.write_bytes(state, adr, &value.to_le_bytes())
    }

    pub fn write_u32(&mut self, state: &mut CpuState, adr: u32, value: u32) -> Result<(), BusError> {
        self.write_bytes(state, adr, &value.to_le_bytes())
    }

    fn raise(&mut self, state: &mut CpuState, adr: u32, kind: BusFaultKind, is_write: bool) {
        trace!(
            adr = format_args!("{adr:#010x}"),
            ?kind,
            is_write,
            "bus fault"
        );
        let mut cfsr_bits = kind.cfsr_bit();
        if kind.bfar_valid(is_write) {
            state.write_special(SpecialReg::Bfar, adr);
            cfsr_bits |= CFSR_BFARVALID;
        }
        state.or_cfsr(cfsr_bits);
        state.exceptions.set_pending(Exception::BusFault);
    }

    /// Fault-raising read: on routing failure the CFSR/BFAR are updated per
    /// `kind`, a BusFault is pended, and zero is returned so the caller can
    /// continue to the next exception check point.
    pub fn read_u32_or_raise(&mut self, state: &mut CpuState, adr: u32, kind: BusFaultKind) -> u32 {
        match self.read_u32(state, adr) {
            Ok(v) => v,
            Err(_) => {
                self.raise(state, adr, kind, false);
                0
            }
        }
    }

    pub fn read_u16_or_raise(&mut self, state: &mut CpuState, adr: u32, kind: BusFaultKind) -> u16 {
        match self.read_u16(state, adr) {
            Ok(v) => v,
            Err(_) => {
                self.raise(state, adr, kind, false);
                0
            }
        }
    }

    pub fn read_u8_or_raise(&mut self, state: &mut CpuState, adr: u32, kind: BusFaultKind) -> u8 {
        match self.read_u8(state, adr) {
            Ok(v) => v,
            Err(_) => {
                self.raise(state, adr, kind, false);
                0
            }
        }
    }

    /// Fault-raising write; failures update fault state and report success
    /// to the caller.
    pub fn write_u32_or_raise(
        &mut self,
        state: &mut CpuState,
        adr: u32,
        value: u32,
        kind: BusFaultKind,
    ) {
        if self.write_u32(state, adr, value).is_err() {
            self.raise(state, adr, kind, true);
        }
    }

    pub fn write_u16_or_raise(
        &mut self,
        state: &mut CpuState,
        adr: u32,
        value: u16,
        kind: BusFaultKind,
    ) {
        if self.write_u16(state, adr, value).is_err() {
            self.raise(state, adr, kind, true);
        }
    }

    pub fn write_u8_or_raise(
        &mut self,
        state: &mut CpuState,
        adr: u32,
        value: u8,
        kind: BusFaultKind,
    ) {
        if self.write_u8(state, adr, value).is_err() {
            self.raise(state, adr, kind, true);
        }
    }
}
