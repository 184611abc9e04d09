//! Typed failures.
//!
//! Everything here is fatal for a run. The errors travel through `anyhow` and
//! can be recovered with `downcast_ref` where a caller needs to tell them apart.

use thiserror::Error;

/// The inputs of a run are internally inconsistent.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("input symbols must be sorted by section, then address: section {section} appears twice")]
    UnsortedSections { section: String },

    #[error("symbols in {section} are not sorted by address: {address:#x} follows {previous:#x}")]
    UnsortedAddresses {
        section: String,
        previous: i64,
        address: i64,
    },

    #[error("symbol {name} at {address:#x} has negative size {size} after adding padding {padding}")]
    NegativeSize {
        name: String,
        address: i64,
        size: i64,
        padding: i64,
    },

    #[error("ELF file and map file do not match: {section} is {elf} bytes in the ELF but {map:?} in the map")]
    SectionSizeMismatch {
        section: String,
        elf: i64,
        map: Option<i64>,
    },

    #[error(
        "{unresolved} of {eligible} object files have no source path; \
         the .ninja files were likely generated at a different time than the map file"
    )]
    UnresolvedSources { eligible: usize, unresolved: usize },

    #[error("malformed build configuration at line {line_number}: {line:?}")]
    MalformedBuildArg { line_number: usize, line: String },
}

/// The external demangler misbehaved.
#[derive(Error, Debug)]
pub enum DemangleError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    ExitStatus {
        program: String,
        status: std::process::ExitStatus,
    },

    #[error("demangler returned {actual} lines for {expected} names")]
    LineCountMismatch { expected: usize, actual: usize },
}
