//! ELF section sizes and build id.
//!
//! The binary is memory-mapped and read with the `object` crate. Only
//! allocated sections are reported, since those are the ones the linker map
//! lays out.

use anyhow::{Context, Result};
use memmap2::Mmap;
use object::{Object, ObjectSection, SectionFlags};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// What the size tool needs from the binary itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfInfo {
    pub section_sizes: BTreeMap<String, i64>,
    pub build_id: String,
}

/// Reads section sizes and the GNU build id from an ELF file on disk.
pub fn read_elf_info(path: &Path) -> Result<ElfInfo> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mmap = unsafe { Mmap::map(&file)? };
    parse_elf_info(&mmap).with_context(|| format!("failed to read {}", path.display()))
}

pub fn parse_elf_info(data: &[u8]) -> Result<ElfInfo> {
    let obj = object::File::parse(data).context("failed to parse ELF file")?;
    let mut section_sizes = BTreeMap::new();
    for section in obj.sections() {
        if !is_allocated(section.flags()) {
            continue;
        }
        let name = section.name()?;
        if name.is_empty() {
            continue;
        }
        let size = i64::try_from(section.size())
            .with_context(|| format!("section {name} is too large"))?;
        section_sizes.insert(name.to_string(), size);
    }
    let build_id = obj
        .build_id()?
        .context("build ID not found in ELF file")?;
    Ok(ElfInfo {
        section_sizes,
        build_id: hex(build_id),
    })
}

fn is_allocated(flags: SectionFlags) -> bool {
    match flags {
        SectionFlags::Elf { sh_flags } => sh_flags & u64::from(object::elf::SHF_ALLOC) != 0,
        _ => false,
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
