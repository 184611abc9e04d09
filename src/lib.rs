//! Binary Size Symbol Library.
//!
//! This library turns the raw symbol table of a linked binary into a
//! deduplicated, annotated snapshot for size analysis.
//! It is organized into several modules:
//! - `config`: CLI configuration and padding policy.
//! - `symbol`: Symbol table model.
//! - `map_parser`: GNU ld map parsing.
//! - `reconcile`: Alias folding and padding.
//! - `demangle`: Batch demangling through `c++filt`.
//! - `names` / `signature`: Name normalization.
//! - `paths` / `ninja`: Object and source path resolution.
//! - `elf` / `metadata`: Provenance and the ELF cross-check.
//! - `snapshot`: `.size` files.
//! - `analyzer`: The main orchestration.

pub mod analyzer;
pub mod config;
pub mod demangle;
pub mod elf;
pub mod error;
pub mod map_parser;
pub mod metadata;
pub mod names;
pub mod ninja;
pub mod paths;
pub mod reconcile;
pub mod signature;
pub mod snapshot;
pub mod symbol;
