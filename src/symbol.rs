//! Symbol table model.
//!
//! Holds the symbols parsed out of a linker map together with the per-section
//! totals and the provenance record of the run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Names starting with this character are placeholders (merged pools, common
/// blocks) and are never renamed.
pub const PLACEHOLDER_PREFIX: char = '*';

/// Section letter for code.
pub const SECTION_TEXT: char = 't';
/// Section letter for read-only data.
pub const SECTION_RODATA: char = 'r';
/// Section letter for writable data.
pub const SECTION_DATA: char = 'd';
/// Section letter for zero-initialized data.
pub const SECTION_BSS: char = 'b';

/// A single entry of the binary's symbol table.
///
/// `size` includes any padding absorbed from the gap before the symbol;
/// `padding` records how much of it that was.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Symbol {
    /// Display name (parameters and return type stripped for functions).
    pub name: String,
    /// Fully qualified name, empty when identical to `name`.
    pub full_name: String,
    /// Load address; zero or negative means the symbol has no address.
    pub address: i64,
    pub size: i64,
    pub padding: i64,
    /// Single-letter section category (`t`, `r`, `d`, `b`).
    pub section: char,
    /// Output section name, e.g. `.text`.
    pub section_name: String,
    pub object_path: String,
    /// Empty until resolved.
    pub source_path: String,
    pub is_anonymous: bool,
}

impl Symbol {
    pub fn new(
        name: impl Into<String>,
        address: i64,
        size: i64,
        section: char,
        section_name: impl Into<String>,
        object_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            size,
            section,
            section_name: section_name.into(),
            object_path: object_path.into(),
            ..Self::default()
        }
    }

    /// Size before any padding was attributed to the symbol.
    pub fn size_without_padding(&self) -> i64 {
        self.size - self.padding
    }

    /// End of the symbol's own bytes; padding lies before `address`.
    pub fn end_address(&self) -> i64 {
        self.address + self.size_without_padding()
    }

    pub fn is_placeholder(&self) -> bool {
        self.name.starts_with(PLACEHOLDER_PREFIX)
    }

    pub fn is_code(&self) -> bool {
        self.section == SECTION_TEXT
    }
}

/// An ordered collection of symbols, exclusively owned by a `SizeInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolGroup {
    symbols: Vec<Symbol>,
}

impl SymbolGroup {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Symbol> {
        self.symbols.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Symbol> {
        self.symbols.iter_mut()
    }

    pub fn as_slice(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn as_mut_slice(&mut self) -> &mut [Symbol] {
        &mut self.symbols
    }

    /// Removes the symbols at the given positions in one pass.
    pub fn remove_indices(&mut self, indices: &HashSet<usize>) {
        if indices.is_empty() {
            return;
        }
        let mut position = 0;
        self.symbols.retain(|_| {
            let keep = !indices.contains(&position);
            position += 1;
            keep
        });
    }

    pub fn into_vec(self) -> Vec<Symbol> {
        self.symbols
    }
}

/// Provenance of a snapshot built from a fresh binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub git_revision: Option<String>,
    /// Map file path, relative to the build output directory.
    pub map_file_name: String,
    /// ELF file path, relative to the build output directory.
    pub elf_file_name: String,
    /// ELF modification time in seconds since the Unix epoch (UTC).
    pub elf_mtime: u64,
    pub elf_build_id: String,
    /// Sorted `key=value` build configuration strings.
    pub gn_args: Vec<String>,
}

/// The unit of analysis: section totals, symbols and optional provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeInfo {
    pub section_sizes: BTreeMap<String, i64>,
    pub symbols: SymbolGroup,
    /// Assembled for fresh runs; a loaded snapshot keeps whatever it stored.
    pub metadata: Option<Metadata>,
}

impl SizeInfo {
    pub fn new(section_sizes: BTreeMap<String, i64>, symbols: SymbolGroup) -> Self {
        Self {
            section_sizes,
            symbols,
            metadata: None,
        }
    }
}
