//! Core analysis logic.
//!
//! `Analyzer` owns the `SizeInfo` of a run and applies the stages in order:
//! 1. Input Loading: parses a linker map (or loads a `.size` snapshot).
//! 2. Reconciliation: folds aliases and computes padding.
//! 3. Unmangling: demangles names the map left mangled.
//! 4. Names: derives display and full names.
//! 5. Paths: normalizes object paths and resolves source paths.
//! 6. Validation: attaches provenance and checks section sizes against the ELF.
//! 7. Output: writes the snapshot.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use crate::config::PaddingThresholds;
use crate::demangle::{unmangle_remaining_symbols, Demangle};
use crate::error::IntegrityError;
use crate::map_parser;
use crate::metadata::{describe, validate_section_sizes};
use crate::names::normalize_names;
use crate::paths::{extract_source_paths, normalize_object_paths, SourceLookup, SourceResolution};
use crate::reconcile::remove_duplicates_and_calculate_padding;
use crate::snapshot;
use crate::symbol::{Metadata, SizeInfo, SymbolGroup};

pub struct Analyzer {
    thresholds: PaddingThresholds,
    size_info: SizeInfo,
    /// Set for runs over a fresh binary, which get the strictest checks.
    fresh: bool,
}

impl Analyzer {
    pub fn new(thresholds: PaddingThresholds) -> Self {
        Self {
            thresholds,
            size_info: SizeInfo::default(),
            fresh: false,
        }
    }

    /// Reads raw symbols and section sizes from a linker map.
    pub fn load_map<R: BufRead>(&mut self, reader: R) -> Result<()> {
        let extraction = map_parser::parse(reader)?;
        self.size_info = SizeInfo::new(extraction.section_sizes, SymbolGroup::new(extraction.symbols));
        self.fresh = true;
        Ok(())
    }

    /// Loads a snapshot; padding and names are recomputed, not trusted.
    pub fn load_snapshot(&mut self, path: &Path) -> Result<()> {
        self.size_info = snapshot::load_size_info(path, self.thresholds)?;
        self.fresh = false;
        Ok(())
    }

    pub fn reconcile(&mut self) -> Result<()> {
        tracing::info!("Calculating padding");
        remove_duplicates_and_calculate_padding(&mut self.size_info.symbols, self.thresholds)?;
        Ok(())
    }

    pub fn unmangle(&mut self, demangler: &dyn Demangle) -> Result<()> {
        unmangle_remaining_symbols(&mut self.size_info.symbols, demangler)?;
        Ok(())
    }

    pub fn normalize_object_paths(&mut self) {
        tracing::info!("Normalizing paths");
        normalize_object_paths(&mut self.size_info.symbols);
    }

    /// Resolves source paths. A fresh run must resolve every eligible object.
    pub fn resolve_sources(&mut self, lookup: &dyn SourceLookup) -> Result<SourceResolution> {
        tracing::info!("Extracting source paths from .ninja files");
        let resolution = extract_source_paths(&mut self.size_info.symbols, lookup);
        if self.fresh && !resolution.is_complete() {
            return Err(IntegrityError::UnresolvedSources {
                eligible: resolution.eligible,
                unresolved: resolution.unresolved(),
            }
            .into());
        }
        Ok(resolution)
    }

    pub fn normalize_names(&mut self) {
        tracing::info!("Normalizing names");
        normalize_names(&mut self.size_info.symbols);
    }

    /// Attaches provenance after checking the map against the ELF's sections.
    pub fn validate_sections(
        &mut self,
        elf_section_sizes: &BTreeMap<String, i64>,
        metadata: Metadata,
    ) -> Result<()> {
        if !self.fresh {
            bail!("section sizes can only be validated for a map file run");
        }
        tracing::debug!("Validating section sizes");
        validate_section_sizes(elf_section_sizes, &self.size_info.section_sizes)?;
        self.size_info.metadata = Some(metadata);
        Ok(())
    }

    pub fn finish(&self) {
        for line in describe(self.size_info.metadata.as_ref()) {
            tracing::info!("Recording metadata: {}", line);
        }
        tracing::info!("Finished analyzing {} symbols", self.size_info.symbols.len());
    }

    pub fn write(&self, output_path: &Path) -> Result<()> {
        tracing::info!("Saving result to {}", output_path.display());
        snapshot::save_size_info(&self.size_info, output_path)
    }

    pub fn size_info(&self) -> &SizeInfo {
        &self.size_info
    }
}
