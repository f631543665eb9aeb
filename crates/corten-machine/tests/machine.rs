//! Machine-level flows: ELF loading, segment routing, exec driving.

use std::io::Write;
use std::sync::{Arc, Mutex};

use corten_machine::{Machine, MachineError, StatusCode};
use pretty_assertions::assert_eq;

const PF_X: u32 = 1;
const PF_W: u32 = 2;
const PF_R: u32 = 4;

struct Seg {
    vaddr: u32,
    flags: u32,
    data: Vec<u8>,
    extra_memsz: u32,
}

/// Hand-rolls a 32-bit little-endian ARM ELF executable.
fn build_elf(entry: u32, machine: u16, segments: &[Seg]) -> Vec<u8> {
    let ehsize = 52u32;
    let phentsize = 32u32;
    let phoff = ehsize;
    let data_off = phoff + phentsize * segments.len() as u32;

    let mut out = Vec::new();
    out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0]);
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
    out.extend_from_slice(&machine.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes()); // EV_CURRENT
    out.extend_from_slice(&entry.to_le_bytes());
    out.extend_from_slice(&phoff.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&(ehsize as u16).to_le_bytes());
    out.extend_from_slice(&(phentsize as u16).to_le_bytes());
    out.extend_from_slice(&(segments.len() as u16).to_le_bytes());
    out.extend_from_slice(&[0u8; 6]); // shentsize/shnum/shstrndx

    let mut offset = data_off;
    for seg in segments {
        out.extend_from_slice(&1u32.to_le_bytes()); // PT_LOAD
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&seg.vaddr.to_le_bytes());
        out.extend_from_slice(&seg.vaddr.to_le_bytes());
        out.extend_from_slice(&(seg.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(seg.data.len() as u32 + seg.extra_memsz).to_le_bytes());
        out.extend_from_slice(&seg.flags.to_le_bytes());
        out.extend_from_slice(&4u32.to_le_bytes());
        offset += seg.data.len() as u32;
    }
    for seg in segments {
        out.extend_from_slice(&seg.data);
    }
    out
}

/// Vector table (SP top of default ram1) plus code halfwords at 0x40.
fn text_segment(code: &[u16]) -> Vec<u8> {
    let mut data = vec![0u8; 0x40];
    data[0..4].copy_from_slice(&0x2002_0000u32.to_le_bytes());
    data[4..8].copy_from_slice(&0x41u32.to_le_bytes());
    for hw in code {
        data.extend_from_slice(&hw.to_le_bytes());
    }
    data
}

#[derive(Clone, Default)]
struct SharedConsole(Arc<Mutex<Vec<u8>>>);

impl Write for SharedConsole {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn loads_and_runs_a_minimal_image() {
    // movs r0, #7 ; svc #1
    let elf = build_elf(
        0x41,
        40,
        &[Seg {
            vaddr: 0,
            flags: PF_R | PF_X,
            data: text_segment(&[0x2007, 0xDF01]),
            extra_memsz: 0,
        }],
    );

    let mut machine = Machine::new();
    machine.load_image(&elf, false).unwrap();
    let result = machine.exec(Some(100), None, None);

    assert!(result.is_ok());
    assert_eq!(result.program_exit_code, 7);
}

#[test]
fn routes_writable_segments_into_ram() {
    // ldr r0, [pc, #4] ; ldr r0, [r0] ; svc #1 ; pad ; literal 0x20000000
    let mut text = text_segment(&[0x4801, 0x6800, 0xDF01, 0xBF00]);
    text.extend_from_slice(&0x2000_0000u32.to_le_bytes());
    let elf = build_elf(
        0x41,
        40,
        &[
            Seg {
                vaddr: 0,
                flags: PF_R | PF_X,
                data: text,
                extra_memsz: 0,
            },
            Seg {
                vaddr: 0x2000_0000,
                flags: PF_R | PF_W,
                data: 42u32.to_le_bytes().to_vec(),
                extra_memsz: 16,
            },
        ],
    );

    let mut machine = Machine::new();
    machine.load_image(&elf, false).unwrap();
    let result = machine.exec(Some(100), None, None);

    assert!(result.is_ok());
    assert_eq!(result.program_exit_code, 42);
}

#[test]
fn segment_outside_the_map_is_buffer_too_small() {
    let elf = build_elf(
        0x41,
        40,
        &[Seg {
            vaddr: 0x1000_0000,
            flags: PF_R | PF_X,
            data: vec![0u8; 16],
            extra_memsz: 0,
        }],
    );
    let mut machine = Machine::new();
    assert_eq!(
        machine.load_image(&elf, false),
        Err(MachineError::BufferTooSmall)
    );
}

#[test]
fn rejects_non_arm_and_non_elf_images() {
    let mut machine = Machine::new();
    assert_eq!(
        machine.load_image(b"definitely not an elf", false),
        Err(MachineError::ElfWrongHeader)
    );

    let x86 = build_elf(0x41, 3, &[]);
    assert_eq!(machine.load_image(&x86, false), Err(MachineError::ElfNotValid));
}

#[test]
fn entry_point_override_uses_the_elf_header() {
    // Reset vector points at code exiting with 7; the ELF entry points at
    // code exiting with 9.
    let mut text = text_segment(&[0x2007, 0xDF01, 0xBF00, 0xBF00]);
    // Second routine at 0x48.
    text.extend_from_slice(&0x2009u16.to_le_bytes());
    text.extend_from_slice(&0xDF01u16.to_le_bytes());
    let elf = build_elf(
        0x49,
        40,
        &[Seg {
            vaddr: 0,
            flags: PF_R | PF_X,
            data: text,
            extra_memsz: 0,
        }],
    );

    let mut machine = Machine::new();
    machine.load_image(&elf, false).unwrap();
    let result = machine.exec(Some(100), None, None);
    assert_eq!(result.program_exit_code, 7);

    machine.load_image(&elf, true).unwrap();
    let result = machine.exec(Some(100), None, None);
    assert_eq!(result.program_exit_code, 9);
}

#[test]
fn instruction_budget_is_resumable() {
    // b . (busy loop forever)
    let elf = build_elf(
        0x41,
        40,
        &[Seg {
            vaddr: 0,
            flags: PF_R | PF_X,
            data: text_segment(&[0xE7FE]),
            extra_memsz: 0,
        }],
    );
    let mut machine = Machine::new();
    machine.load_image(&elf, false).unwrap();

    let result = machine.exec(Some(10), None, None);
    assert_eq!(result.status, StatusCode::MaxInstructionsReached);
    assert!(result.is_max_instructions_reached());

    // State is intact; running again hits the budget again.
    let result = machine.exec(Some(10), None, None);
    assert_eq!(result.status, StatusCode::MaxInstructionsReached);
    assert_eq!(machine.cpu().instr_addr(), 0x40);
}

#[test]
fn guest_console_output_reaches_the_configured_sink() {
    // movs r0, #4 ; ldr r1, [pc, #8] ; bkpt #0xAB ; movs r0, #0 ; svc #1 ;
    // pad ; literal (string address) ; "ok\0"
    let mut text = text_segment(&[0x2004, 0x4902, 0xBEAB, 0x2000, 0xDF01, 0xBF00]);
    // Code occupies 0x40..0x4C; the literal word at 0x4C points at 0x50.
    text.extend_from_slice(&0x50u32.to_le_bytes());
    text.extend_from_slice(b"ok\0\0");
    let elf = build_elf(
        0x41,
        40,
        &[Seg {
            vaddr: 0,
            flags: PF_R | PF_X,
            data: text,
            extra_memsz: 0,
        }],
    );

    let console = SharedConsole::default();
    let mut machine = Machine::new();
    machine.set_console(Box::new(console.clone()));
    machine.load_image(&elf, false).unwrap();

    let result = machine.exec(Some(100), None, None);
    assert!(result.is_ok());
    assert_eq!(result.program_exit_code, 0);
    assert_eq!(console.0.lock().unwrap().as_slice(), b"ok");
}

#[test]
fn pre_exec_hook_observes_every_instruction() {
    let elf = build_elf(
        0x41,
        40,
        &[Seg {
            vaddr: 0,
            flags: PF_R | PF_X,
            data: text_segment(&[0xBF00, 0xBF00, 0x2001, 0xDF01]),
            extra_memsz: 0,
        }],
    );
    let mut machine = Machine::new();
    machine.load_image(&elf, false).unwrap();

    let mut trace = Vec::new();
    let mut pre = |ctx: &corten_machine::cpu::step::StepContext<'_>| {
        trace.push((ctx.pc, ctx.instr.to_string()));
    };
    let result = machine.exec(Some(100), Some(&mut pre), None);

    assert!(result.is_ok());
    assert_eq!(
        trace,
        vec![
            (0x40, "nop".to_string()),
            (0x42, "nop".to_string()),
            (0x44, "movs r0, #1".to_string()),
            (0x46, "svc #1".to_string()),
        ]
    );
}
