//! Persisted `.size` snapshots.
//!
//! A snapshot stores the raw facts about each symbol. Padding is stored
//! folded out of the size and is recomputed on load, along with the display
//! names, so a loaded snapshot always matches a fresh run on the same data.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::config::{has_snapshot_extension, PaddingThresholds, SNAPSHOT_EXTENSION};
use crate::names::normalize_names;
use crate::reconcile::remove_duplicates_and_calculate_padding;
use crate::symbol::{Metadata, SizeInfo, Symbol, SymbolGroup};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    section_sizes: BTreeMap<String, i64>,
    metadata: Option<Metadata>,
    symbols: Vec<StoredSymbol>,
}

#[derive(Serialize, Deserialize)]
struct StoredSymbol {
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    full_name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_anonymous: bool,
    address: i64,
    /// Excludes padding.
    size: i64,
    section: char,
    section_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    object_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    source_path: String,
}

impl From<&Symbol> for StoredSymbol {
    fn from(symbol: &Symbol) -> Self {
        Self {
            name: symbol.name.clone(),
            full_name: symbol.full_name.clone(),
            is_anonymous: symbol.is_anonymous,
            address: symbol.address,
            size: symbol.size_without_padding(),
            section: symbol.section,
            section_name: symbol.section_name.clone(),
            object_path: symbol.object_path.clone(),
            source_path: symbol.source_path.clone(),
        }
    }
}

impl From<StoredSymbol> for Symbol {
    fn from(stored: StoredSymbol) -> Self {
        Self {
            name: stored.name,
            full_name: stored.full_name,
            address: stored.address,
            size: stored.size,
            padding: 0,
            section: stored.section,
            section_name: stored.section_name,
            object_path: stored.object_path,
            source_path: stored.source_path,
            is_anonymous: stored.is_anonymous,
        }
    }
}

pub fn save_size_info(size_info: &SizeInfo, path: &Path) -> Result<()> {
    if !has_snapshot_extension(path) {
        bail!("{} must end with {}", path.display(), SNAPSHOT_EXTENSION);
    }
    let snapshot = SnapshotFile {
        version: FORMAT_VERSION,
        section_sizes: size_info.section_sizes.clone(),
        metadata: size_info.metadata.clone(),
        symbols: size_info.symbols.iter().map(StoredSymbol::from).collect(),
    };
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &snapshot)
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// Loads a snapshot and recomputes padding and names.
pub fn load_size_info(path: &Path, thresholds: PaddingThresholds) -> Result<SizeInfo> {
    tracing::debug!("Loading results from: {}", path.display());
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let snapshot: SnapshotFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))?;
    if snapshot.version != FORMAT_VERSION {
        bail!(
            "{} has snapshot version {}, expected {}",
            path.display(),
            snapshot.version,
            FORMAT_VERSION
        );
    }

    let symbols = snapshot.symbols.into_iter().map(Symbol::from).collect();
    let mut size_info = SizeInfo::new(snapshot.section_sizes, SymbolGroup::new(symbols));
    size_info.metadata = snapshot.metadata;

    tracing::info!("Calculating padding");
    remove_duplicates_and_calculate_padding(&mut size_info.symbols, thresholds)?;
    tracing::info!("Deriving signatures");
    normalize_names(&mut size_info.symbols);
    Ok(size_info)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SizeInfo {
        let mut symbols = SymbolGroup::new(vec![
            Symbol::new("void Foo::Bar(int)", 0x1000, 0x10, 't', ".text", "base/foo.o"),
            Symbol::new("(anonymous namespace)::kData", 0x2000, 0x8, 'r', ".rodata", "base/foo.o"),
            Symbol::new("kOther", 0x2010, 0x8, 'r', ".rodata", ""),
        ]);
        remove_duplicates_and_calculate_padding(&mut symbols, PaddingThresholds::default()).unwrap();
        normalize_names(&mut symbols);
        let mut info = SizeInfo::new(BTreeMap::from([(".text".to_string(), 0x10), (".rodata".to_string(), 0x18)]), symbols);
        info.metadata = Some(Metadata {
            elf_build_id: "deadbeef".to_string(),
            ..Metadata::default()
        });
        info
    }

    #[test]
    fn round_trip_recomputes_derived_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.size");
        let info = sample();
        assert_eq!(info.symbols.as_slice()[2].padding, 8);

        save_size_info(&info, &path).unwrap();
        let loaded = load_size_info(&path, PaddingThresholds::default()).unwrap();
        assert_eq!(loaded, info);
    }

    #[test]
    fn rejects_wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let err = save_size_info(&sample(), &dir.path().join("lib.json")).unwrap_err();
        assert!(err.to_string().contains(".size"));
    }

    #[test]
    fn rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.size");
        std::fs::write(&path, r#"{"version":0,"section_sizes":{},"metadata":null,"symbols":[]}"#).unwrap();
        let err = load_size_info(&path, PaddingThresholds::default()).unwrap_err();
        assert!(err.to_string().contains("version 0"));
    }
}
