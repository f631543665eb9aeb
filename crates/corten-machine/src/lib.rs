//! The host-facing machine: owns the guest memory segments, loads ELF
//! images into them, and drives the processor core step by step with the
//! SysTick tick and the optional instruction budget.

mod elf;
mod status;

use std::io::Write;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use corten_cpu_core::peripherals::systick;
use corten_cpu_core::semihost::Semihost;
use corten_cpu_core::step::{self, Hooks, StepContext, StepFlags};
use corten_cpu_core::{CpuState, MemorySegment, SystemBus};

pub use corten_cpu_core as cpu;
pub use status::{ExecResult, StatusCode};

/// Errors surfaced by image loading and configuration; execution failures
/// travel through [`ExecResult`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("failed to open guest image")]
    OpenFileFailed,
    #[error("not a loadable 32-bit ARM ELF image")]
    ElfNotValid,
    #[error("malformed ELF header")]
    ElfWrongHeader,
    #[error("segment does not fit the configured memory map")]
    BufferTooSmall,
}

/// Observer callback over a read-only step context.
pub type StepHook<'h> = &'h mut dyn FnMut(&StepContext<'_>);

struct Segment {
    data: Vec<u8>,
    base: u32,
}

impl Segment {
    fn contains(&self, vaddr: u32, len: u32) -> bool {
        vaddr >= self.base && vaddr.wrapping_add(len) <= self.base + self.data.len() as u32
    }

    fn copy_in(&mut self, vaddr: u32, bytes: &[u8], zero_fill: u32) -> Result<(), MachineError> {
        if !self.contains(vaddr, bytes.len() as u32 + zero_fill) {
            return Err(MachineError::BufferTooSmall);
        }
        let off = (vaddr - self.base) as usize;
        self.data[off..off + bytes.len()].copy_from_slice(bytes);
        let zero_start = off + bytes.len();
        self.data[zero_start..zero_start + zero_fill as usize].fill(0);
        Ok(())
    }
}

/// The emulation machine: memory map, CPU state and the exec driver.
pub struct Machine {
    flash: Segment,
    ram1: Segment,
    ram2: Option<Segment>,
    state: CpuState,
    console: Box<dyn Write>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    /// A machine with the default map: 128 KiB of flash at zero and 128 KiB
    /// of RAM at `0x20000000`.
    pub fn new() -> Self {
        Self {
            flash: Segment {
                data: vec![0; 0x2_0000],
                base: 0,
            },
            ram1: Segment {
                data: vec![0; 0x2_0000],
                base: 0x2000_0000,
            },
            ram2: None,
            state: CpuState::new(),
            console: Box::new(std::io::stdout()),
        }
    }

    /// Replaces the read-only flash span.
    pub fn set_flash_segment(&mut self, size: usize, base: u32) {
        self.flash = Segment {
            data: vec![0; size],
            base,
        };
    }

    /// Replaces the mandatory RW span.
    pub fn set_ram1_segment(&mut self, size: usize, base: u32) {
        self.ram1 = Segment {
            data: vec![0; size],
            base,
        };
    }

    /// Configures the optional second RW span.
    pub fn set_ram2_segment(&mut self, size: usize, base: u32) {
        self.ram2 = Some(Segment {
            data: vec![0; size],
            base,
        });
    }

    /// Redirects guest console output (semihosting writes).
    pub fn set_console(&mut self, console: Box<dyn Write>) {
        self.console = console;
    }

    /// Raw flash bytes, for harnesses that place code directly.
    pub fn flash_mut(&mut self) -> &mut [u8] {
        &mut self.flash.data
    }

    pub fn cpu(&self) -> &CpuState {
        &self.state
    }

    pub fn cpu_mut(&mut self) -> &mut CpuState {
        &mut self.state
    }

    /// Loads an ELF file from disk. See [`Machine::load_image`].
    pub fn load(&mut self, path: impl AsRef<Path>, set_entry_point: bool) -> Result<(), MachineError> {
        let bytes = std::fs::read(path).map_err(|_| MachineError::OpenFileFailed)?;
        self.load_image(&bytes, set_entry_point)
    }

    /// Loads an in-memory ELF image: executable read-only segments land in
    /// flash, writable non-executable segments in ram1. Afterwards the
    /// machine is reset; with `set_entry_point` the PC is overwritten from
    /// the ELF entry.
    pub fn load_image(&mut self, bytes: &[u8], set_entry_point: bool) -> Result<(), MachineError> {
        let image = elf::parse(bytes)?;
        for segment in &image.segments {
            if segment.data.is_empty() && segment.zero_fill == 0 {
                continue;
            }
            if segment.executable && segment.readable && !segment.writable {
                self.flash.copy_in(segment.vaddr, segment.data, 0)?;
            } else if !segment.executable && segment.readable && segment.writable {
                self.ram1
                    .copy_in(segment.vaddr, segment.data, segment.zero_fill)?;
            } else {
                debug!(
                    vaddr = format_args!("{:#010x}", segment.vaddr),
                    "skipping segment with unsupported permissions"
                );
            }
        }

        self.reset();
        if set_entry_point {
            info!(entry = format_args!("{:#010x}", image.entry & !1), "entry from ELF header");
            self.state.branch_to(image.entry & !1);
        }
        Ok(())
    }

    /// Performs the architectural take-reset sequence.
    pub fn reset(&mut self) {
        let mut bus = build_bus(&mut self.flash, &mut self.ram1, self.ram2.as_mut());
        step::take_reset(&mut self.state, &mut bus);
    }

    /// Runs until the guest requests termination, the optional instruction
    /// budget is exhausted, or a fatal error occurs. The CPU state stays
    /// intact and resumable in the budget case.
    pub fn exec<'a>(
        &mut self,
        max_instructions: Option<u64>,
        pre_exec: Option<StepHook<'a>>,
        post_exec: Option<StepHook<'a>>,
    ) -> ExecResult {
        let mut bus = build_bus(&mut self.flash, &mut self.ram1, self.ram2.as_mut());
        let mut semihost = Semihost::new(&mut self.console);
        let mut hooks = Hooks {
            pre_exec,
            post_exec,
        };

        let mut instr_count: u64 = 0;
        loop {
            let flags = match step::step(&mut self.state, &mut bus, &mut semihost, &mut hooks) {
                Ok(flags) => flags,
                Err(e) => {
                    return ExecResult {
                        status: e.into(),
                        program_exit_code: 1,
                    }
                }
            };
            if flags.contains(StepFlags::TERMINATION_REQUEST) {
                return ExecResult {
                    status: StatusCode::Success,
                    program_exit_code: semihost.exit_code(),
                };
            }

            systick::tick(&mut self.state);

            instr_count += 1;
            if let Some(limit) = max_instructions {
                if instr_count >= limit {
                    return ExecResult {
                        status: StatusCode::MaxInstructionsReached,
                        program_exit_code: 0,
                    };
                }
            }
        }
    }
}

fn build_bus<'m>(
    flash: &'m mut Segment,
    ram1: &'m mut Segment,
    ram2: Option<&'m mut Segment>,
) -> SystemBus<'m> {
    SystemBus::new(
        MemorySegment::new(&mut flash.data, flash.base),
        MemorySegment::new(&mut ram1.data, ram1.base),
        ram2.map(|seg| MemorySegment::new(&mut seg.data, seg.base)),
    )
}
