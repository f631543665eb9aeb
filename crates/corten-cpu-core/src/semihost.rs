//! Semihosting: BKPT-encoded host calls.
//!
//! A `BKPT 0xAB` transfers to the host with the operation number in R0 and
//! the parameter in R1. Guest console output goes to the caller-supplied
//! sink; `SYS_EXIT` and the `SVC 0x01` convenience call record the program
//! exit code for the machine layer.

use std::io::Write;

use tracing::debug;

use crate::error::CoreError;
use crate::exec::ExecFlags;
use crate::mem::SystemBus;
use crate::state::CpuState;

/// The BKPT immediate that marks a semihosting request.
pub const BKPT_SEMIHOST_IMM: u32 = 0xAB;

pub const SYS_WRITEC: u32 = 0x03;
pub const SYS_WRITE0: u32 = 0x04;
pub const SYS_EXIT: u32 = 0x18;

/// `SYS_EXIT` reason reported by a cleanly terminating application.
pub const ADP_STOPPED_APPLICATION_EXIT: u32 = 0x20026;

pub struct Semihost<W: Write> {
    out: W,
    exit_code: i32,
}

impl<W: Write> Semihost<W> {
    pub fn new(out: W) -> Self {
        Self { out, exit_code: 0 }
    }

    /// The exit code signalled by the guest, valid after a termination
    /// request.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub(crate) fn set_exit_code(&mut self, code: i32) {
        self.exit_code = code;
    }

    /// Handles a BKPT with the given immediate. Non-semihosting immediates
    /// and unknown operations request an error exit.
    pub fn bkpt(
        &mut self,
        state: &mut CpuState,
        bus: &mut SystemBus<'_>,
        imm32: u32,
    ) -> Result<ExecFlags, CoreError> {
        if imm32 != BKPT_SEMIHOST_IMM {
            debug!(imm32, "breakpoint outside semihosting range");
            return Ok(ExecFlags::BKPT_REQ_ERROR_EXIT);
        }
        let op = state.read_reg(0);
        let param = state.read_reg(1);
        match op {
            SYS_WRITEC => {
                // R1 points at the character.
                let ch = bus.read_u8(state, param).unwrap_or(0);
                let _ = self.out.write_all(&[ch]);
                Ok(ExecFlags::empty())
            }
            SYS_WRITE0 => {
                let mut adr = param;
                loop {
                    let byte = match bus.read_u8(state, adr) {
                        Ok(0) | Err(_) => break,
                        Ok(b) => b,
                    };
                    let _ = self.out.write_all(&[byte]);
                    adr = adr.wrapping_add(1);
                }
                let _ = self.out.flush();
                Ok(ExecFlags::empty())
            }
            SYS_EXIT => {
                let _ = self.out.flush();
                self.exit_code = if param == ADP_STOPPED_APPLICATION_EXIT { 0 } else { 1 };
                debug!(reason = param, "semihosting exit");
                Ok(ExecFlags::BKPT_REQ_EXIT)
            }
            _ => {
                debug!(op, "unsupported semihosting operation");
                Ok(ExecFlags::BKPT_REQ_ERROR_EXIT)
            }
        }
    }
}
