//! Entry point for the symsize tool.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap`.
//! 2. Either load an existing `.size` snapshot, or analyze a fresh ELF + map pair.
//! 3. For fresh runs, collect provenance and cross-check section sizes with the ELF.
//! 4. Write the resulting snapshot.
//!
//! Error handling is done via `anyhow`.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use symsize::analyzer::Analyzer;
use symsize::config::{has_snapshot_extension, Config, SNAPSHOT_EXTENSION};
use symsize::demangle::ProcessDemangler;
use symsize::elf::read_elf_info;
use symsize::map_parser::open_map;
use symsize::metadata::{build_metadata, MetadataInputs};
use symsize::ninja::SourceFileMapper;

fn main() -> Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if !has_snapshot_extension(&config.output) {
        Config::command()
            .error(
                clap::error::ErrorKind::InvalidValue,
                format!("output file must end with {SNAPSHOT_EXTENSION}"),
            )
            .exit();
    }

    let mut analyzer = Analyzer::new(config.thresholds());

    if config.input_is_snapshot() {
        analyzer.load_snapshot(&config.input)?;
    } else {
        let Some(map_path) = config.map_file() else {
            Config::command()
                .error(
                    clap::error::ErrorKind::InvalidValue,
                    "could not find .map(.gz)? file; use --map-file",
                )
                .exit();
        };
        let output_directory = config.output_directory();

        tracing::debug!("Constructing metadata");
        let elf_info = read_elf_info(&config.input)?;
        let metadata = build_metadata(&MetadataInputs {
            elf_path: &config.input,
            map_path: &map_path,
            output_directory: &output_directory,
            build_id: elf_info.build_id.clone(),
        })?;

        // 1. Parse the map
        analyzer.load_map(open_map(&map_path)?)?;

        // 2. Fold aliases and compute padding
        analyzer.reconcile()?;

        // 3. The map file does not unmangle every name
        analyzer.unmangle(&ProcessDemangler::cxxfilt(&config.tool_prefix))?;

        // 4. Names
        analyzer.normalize_names();

        // 5. Paths
        analyzer.normalize_object_paths();
        let mapper = SourceFileMapper::load(&output_directory)?;
        analyzer.resolve_sources(&mapper)?;

        // 6. Provenance and ELF cross-check
        analyzer.validate_sections(&elf_info.section_sizes, metadata)?;
    }

    analyzer.finish();
    analyzer.write(&config.output)?;
    tracing::info!("Done");
    Ok(())
}
