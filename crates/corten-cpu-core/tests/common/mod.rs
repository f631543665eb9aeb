//! Shared fixture: a small flash + RAM machine with a vector table at the
//! base of flash and the test program at `CODE_BASE`.
#![allow(dead_code)]

use corten_cpu_core::peripherals::systick;
use corten_cpu_core::semihost::Semihost;
use corten_cpu_core::step::{self, Hooks, StepFlags};
use corten_cpu_core::{CoreError, CpuState, MemorySegment, SystemBus};

pub const FLASH_BASE: u32 = 0;
pub const FLASH_SIZE: usize = 0x1000;
pub const RAM_BASE: u32 = 0x2000_0000;
pub const RAM_SIZE: usize = 0x1_0000;
pub const SP_INIT: u32 = RAM_BASE + RAM_SIZE as u32;
pub const CODE_BASE: u32 = 0x100;

pub struct Rig {
    pub state: CpuState,
    pub flash: Vec<u8>,
    pub ram: Vec<u8>,
    pub console: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub terminated: bool,
    pub steps: u64,
}

impl Rig {
    /// Flash with `SP_INIT`/`CODE_BASE|1` in the vector table and `code`
    /// placed at `CODE_BASE`. The rig is reset and ready to step.
    pub fn new(code: &[u16]) -> Self {
        let mut rig = Self::without_reset(code);
        rig.reset();
        rig
    }

    pub fn without_reset(code: &[u16]) -> Self {
        let mut flash = vec![0u8; FLASH_SIZE];
        flash[0..4].copy_from_slice(&SP_INIT.to_le_bytes());
        flash[4..8].copy_from_slice(&(CODE_BASE | 1).to_le_bytes());
        let mut rig = Self {
            state: CpuState::new(),
            flash,
            ram: vec![0u8; RAM_SIZE],
            console: Vec::new(),
        };
        rig.write_code(CODE_BASE, code);
        rig
    }

    pub fn write_code(&mut self, addr: u32, halfwords: &[u16]) {
        let mut off = (addr - FLASH_BASE) as usize;
        for hw in halfwords {
            self.flash[off..off + 2].copy_from_slice(&hw.to_le_bytes());
            off += 2;
        }
    }

    pub fn write_flash_word(&mut self, addr: u32, word: u32) {
        let off = (addr - FLASH_BASE) as usize;
        self.flash[off..off + 4].copy_from_slice(&word.to_le_bytes());
    }

    /// Installs an exception handler address (thumb bit set) in the vector
    /// table.
    pub fn set_vector(&mut self, number: u16, handler: u32) {
        let off = usize::from(number) * 4;
        self.flash[off..off + 4].copy_from_slice(&(handler | 1).to_le_bytes());
    }

    pub fn reset(&mut self) {
        let mut bus = SystemBus::new(
            MemorySegment::new(&mut self.flash, FLASH_BASE),
            MemorySegment::new(&mut self.ram, RAM_BASE),
            None,
        );
        step::take_reset(&mut self.state, &mut bus);
    }

    /// Runs with access to the live bus, for setup and direct assertions.
    pub fn with_bus<R>(&mut self, f: impl FnOnce(&mut CpuState, &mut SystemBus<'_>) -> R) -> R {
        let mut bus = SystemBus::new(
            MemorySegment::new(&mut self.flash, FLASH_BASE),
            MemorySegment::new(&mut self.ram, RAM_BASE),
            None,
        );
        f(&mut self.state, &mut bus)
    }

    /// Steps until the guest requests termination or `max_steps` runs out;
    /// SysTick ticks once per retired instruction.
    pub fn run(&mut self, max_steps: u64) -> Result<RunOutcome, CoreError> {
        let mut bus = SystemBus::new(
            MemorySegment::new(&mut self.flash, FLASH_BASE),
            MemorySegment::new(&mut self.ram, RAM_BASE),
            None,
        );
        let mut semihost = Semihost::new(&mut self.console);
        let mut hooks = Hooks::none();
        for n in 0..max_steps {
            let flags = step::step(&mut self.state, &mut bus, &mut semihost, &mut hooks)?;
            systick::tick(&mut self.state);
            if flags.contains(StepFlags::TERMINATION_REQUEST) {
                return Ok(RunOutcome {
                    exit_code: semihost.exit_code(),
                    terminated: true,
                    steps: n + 1,
                });
            }
        }
        Ok(RunOutcome {
            exit_code: 0,
            terminated: false,
            steps: max_steps,
        })
    }

    /// Exactly one step (plus the SysTick tick).
    pub fn step_one(&mut self) -> Result<StepFlags, CoreError> {
        let mut bus = SystemBus::new(
            MemorySegment::new(&mut self.flash, FLASH_BASE),
            MemorySegment::new(&mut self.ram, RAM_BASE),
            None,
        );
        let mut semihost = Semihost::new(&mut self.console);
        let mut hooks = Hooks::none();
        let flags = step::step(&mut self.state, &mut bus, &mut semihost, &mut hooks)?;
        systick::tick(&mut self.state);
        Ok(flags)
    }
}

/// `svc #1`: the convenience exit call, exit code in r0.
pub const SVC_EXIT: u16 = 0xDF01;
/// `nop`
pub const NOP: u16 = 0xBF00;
/// `bx lr`
pub const BX_LR: u16 = 0x4770;
