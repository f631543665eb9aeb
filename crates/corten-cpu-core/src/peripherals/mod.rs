//! Memory-mapped peripherals inside the `0xE0000000` window.
//!
//! Each peripheral exports a table of [`RegisterSpec`] entries keyed by
//! physical offset. A register declares whether it is read-only and whether
//! sub-word writes merge with the current value (read-modify-write) before
//! the register's write handler runs.

pub mod scb;
pub mod systick;

use crate::mem::{BusError, PERIPH_BASE};
use crate::state::CpuState;

/// One 32-bit peripheral register.
pub struct RegisterSpec {
    /// Physical offset of the register within the peripheral window.
    pub offset: u32,
    pub read_only: bool,
    /// Sub-word writes read the register and merge before writing.
    pub read_modify_write: bool,
    pub read: fn(&mut CpuState) -> u32,
    pub write: fn(&mut CpuState, u32),
}

fn lookup(off_word: u32) -> Option<&'static RegisterSpec> {
    systick::REGISTERS
        .iter()
        .chain(scb::REGISTERS.iter())
        .find(|spec| spec.offset == off_word)
}

/// Reads `buf.len()` bytes at physical offset `off`. Accesses must stay
/// within one 32-bit register.
pub fn read(state: &mut CpuState, off: u32, buf: &mut [u8]) -> Result<(), BusError> {
    let lane = (off & 0x3) as usize;
    if lane + buf.len() > 4 {
        return Err(BusError::OutOfRange(PERIPH_BASE + off));
    }
    let spec = lookup(off & !0x3).ok_or(BusError::OutOfRange(PERIPH_BASE + off))?;
    let value = (spec.read)(state);
    buf.copy_from_slice(&value.to_le_bytes()[lane..lane + buf.len()]);
    Ok(())
}

/// Writes `bytes` at physical offset `off`, honoring the register's
/// read-only and read-modify-write declarations.
pub fn write(state: &mut CpuState, off: u32, bytes: &[u8]) -> Result<(), BusError> {
    let lane = (off & 0x3) as usize;
    if lane + bytes.len() > 4 {
        return Err(BusError::OutOfRange(PERIPH_BASE + off));
    }
    let spec = lookup(off & !0x3).ok_or(BusError::OutOfRange(PERIPH_BASE + off))?;
    if spec.read_only {
        return Err(BusError::WriteNotAllowed(PERIPH_BASE + off));
    }

    let value = if bytes.len() == 4 {
        u32::from_le_bytes(bytes.try_into().expect("4-byte write"))
    } else {
        let mut word = if spec.read_modify_write {
            (spec.read)(state).to_le_bytes()
        } else {
            [0u8; 4]
        };
        word[lane..lane + bytes.len()].copy_from_slice(bytes);
        u32::from_le_bytes(word)
    };
    (spec.write)(state, value);
    Ok(())
}
