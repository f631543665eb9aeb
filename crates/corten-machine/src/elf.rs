//! Guest image loading: 32-bit little-endian ELF program headers routed
//! into the configured memory segments.

use object::elf;
use object::read::elf::{FileHeader, ProgramHeader};
use object::Endianness;
use tracing::debug;

use crate::MachineError;

/// One loadable piece of the guest image.
pub struct LoadSegment<'d> {
    pub vaddr: u32,
    pub data: &'d [u8],
    /// Bytes to zero beyond the file data (memsz > filesz).
    pub zero_fill: u32,
    pub executable: bool,
    pub writable: bool,
    pub readable: bool,
}

pub struct ElfImage<'d> {
    pub entry: u32,
    pub segments: Vec<LoadSegment<'d>>,
}

/// Parses the image and collects its PT_LOAD segments.
pub fn parse(data: &[u8]) -> Result<ElfImage<'_>, MachineError> {
    let header = elf::FileHeader32::<Endianness>::parse(data)
        .map_err(|_| MachineError::ElfWrongHeader)?;
    let endian = header.endian().map_err(|_| MachineError::ElfNotValid)?;
    if header.e_machine.get(endian) != elf::EM_ARM {
        return Err(MachineError::ElfNotValid);
    }

    let mut segments = Vec::new();
    let phdrs = header
        .program_headers(endian, data)
        .map_err(|_| MachineError::ElfNotValid)?;
    for phdr in phdrs {
        if phdr.p_type(endian) != elf::PT_LOAD {
            continue;
        }
        let file_data = phdr
            .data(endian, data)
            .map_err(|_| MachineError::ElfNotValid)?;
        let flags = phdr.p_flags(endian);
        let memsz = phdr.p_memsz(endian);
        let filesz = file_data.len() as u32;
        segments.push(LoadSegment {
            vaddr: phdr.p_vaddr(endian),
            data: file_data,
            zero_fill: memsz.saturating_sub(filesz),
            executable: flags & elf::PF_X != 0,
            writable: flags & elf::PF_W != 0,
            readable: flags & elf::PF_R != 0,
        });
    }
    let entry = header.e_entry.get(endian);
    debug!(
        entry = format_args!("{entry:#010x}"),
        segments = segments.len(),
        "parsed guest image"
    );
    Ok(ElfImage { entry, segments })
}
