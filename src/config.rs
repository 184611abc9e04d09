//! Configuration module.
//!
//! This module defines the command-line interface (CLI) using `clap`, plus the
//! padding policy handed to the library.

use clap::Parser;
use std::path::{Path, PathBuf};

use crate::symbol::{SECTION_DATA, SECTION_RODATA, SECTION_TEXT};

/// Extension every snapshot file must carry.
pub const SNAPSHOT_EXTENSION: &str = ".size";

/// Builds a size snapshot from an ELF binary and its linker map.
///
/// The input may also be an existing `.size` snapshot, in which case padding
/// and names are recomputed and the result re-saved.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Input ELF file, or a `.size` snapshot
    pub input: PathBuf,

    /// Output snapshot (must end with .size)
    pub output: PathBuf,

    /// Linker map file. Defaults to <input>.map, then <input>.map.gz
    #[arg(long)]
    pub map_file: Option<PathBuf>,

    /// Build output directory. Defaults to the directory containing the input
    #[arg(long)]
    pub output_directory: Option<PathBuf>,

    /// Prefix for toolchain binaries, e.g. "arm-linux-androideabi-"
    #[arg(long, default_value = "")]
    pub tool_prefix: String,

    /// Largest gap in read-only and data sections still treated as padding
    #[arg(long, default_value_t = PaddingThresholds::DEFAULT_DATA)]
    pub data_padding_threshold: i64,

    /// Largest gap in code sections still treated as padding
    #[arg(long, default_value_t = PaddingThresholds::DEFAULT_CODE)]
    pub code_padding_threshold: i64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub log_level: String,
}

impl Config {
    pub fn thresholds(&self) -> PaddingThresholds {
        PaddingThresholds {
            data: self.data_padding_threshold,
            code: self.code_padding_threshold,
        }
    }

    pub fn input_is_snapshot(&self) -> bool {
        has_snapshot_extension(&self.input)
    }

    pub fn output_directory(&self) -> PathBuf {
        match &self.output_directory {
            Some(dir) => dir.clone(),
            None => self
                .input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// The map file to read for a fresh run, if one can be found.
    pub fn map_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.map_file {
            return Some(path.clone());
        }
        let mut map = self.input.clone().into_os_string();
        map.push(".map");
        let map = PathBuf::from(map);
        if map.exists() {
            return Some(map);
        }
        let mut gz = map.into_os_string();
        gz.push(".gz");
        let gz = PathBuf::from(gz);
        gz.exists().then_some(gz)
    }
}

pub fn has_snapshot_extension(path: &Path) -> bool {
    path.to_string_lossy().ends_with(SNAPSHOT_EXTENSION)
}

/// Gaps at or above these sizes are unattributed data, not padding.
///
/// Tuned on arm32 builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingThresholds {
    /// Read-only and writable data sections.
    pub data: i64,
    /// Code sections.
    pub code: i64,
}

impl PaddingThresholds {
    pub const DEFAULT_DATA: i64 = 256;
    pub const DEFAULT_CODE: i64 = 64;

    /// Threshold for a section letter, `None` when any gap is padding.
    pub fn for_section(&self, section: char) -> Option<i64> {
        match section {
            SECTION_RODATA | SECTION_DATA => Some(self.data),
            SECTION_TEXT => Some(self.code),
            _ => None,
        }
    }
}

impl Default for PaddingThresholds {
    fn default() -> Self {
        Self {
            data: Self::DEFAULT_DATA,
            code: Self::DEFAULT_CODE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_by_section() {
        let t = PaddingThresholds::default();
        assert_eq!(t.for_section('r'), Some(256));
        assert_eq!(t.for_section('d'), Some(256));
        assert_eq!(t.for_section('t'), Some(64));
        assert_eq!(t.for_section('b'), None);
    }

    #[test]
    fn parses_cli() {
        let config = Config::parse_from([
            "symsize",
            "out/libchrome.so",
            "chrome.size",
            "--code-padding-threshold",
            "32",
        ]);
        assert_eq!(config.thresholds(), PaddingThresholds { data: 256, code: 32 });
        assert_eq!(config.output_directory(), PathBuf::from("out"));
        assert!(!config.input_is_snapshot());
        assert!(has_snapshot_extension(&config.output));
    }
}
