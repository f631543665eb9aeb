//! Functional ARMv7-M (Thumb-2) processor core.
//!
//! The core is a plain state machine: [`CpuState`] holds every register and
//! the exception bank, [`SystemBus`] routes typed loads/stores to the guest
//! memory segments and the memory-mapped peripheral window, and
//! [`step::step`] advances execution by exactly one instruction, evaluating
//! pending exceptions at the architected check points. Nothing in this crate
//! performs I/O except the semihosting handler, which writes guest console
//! output to a caller-supplied sink.

pub mod alu;
pub mod decode;
pub mod exceptions;
pub mod exec;
pub mod fetch;
pub mod it;
pub mod mem;
pub mod mnemonic;
pub mod peripherals;
pub mod semihost;
pub mod state;
pub mod step;

mod error;

pub use error::CoreError;
pub use mem::{BusError, BusFaultKind, MemorySegment, SystemBus};
pub use state::CpuState;
