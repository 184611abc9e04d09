//! Provenance of a size snapshot and the ELF/map cross-check.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::time::UNIX_EPOCH;

use crate::error::IntegrityError;
use crate::symbol::Metadata;

/// Build configuration file inside the output directory.
pub const GN_ARGS_FILE: &str = "args.gn";

/// Inputs of a fresh run, used to assemble its `Metadata`.
pub struct MetadataInputs<'a> {
    pub elf_path: &'a Path,
    pub map_path: &'a Path,
    pub output_directory: &'a Path,
    pub build_id: String,
}

pub fn build_metadata(inputs: &MetadataInputs<'_>) -> Result<Metadata> {
    let elf_dir = inputs.elf_path.parent().unwrap_or(Path::new("."));
    let git_revision = detect_git_revision(elf_dir);
    let elf_mtime = modification_time(inputs.elf_path)?;
    let gn_args = parse_gn_args_file(&inputs.output_directory.join(GN_ARGS_FILE))?;
    Ok(Metadata {
        git_revision,
        map_file_name: relative_to(inputs.map_path, inputs.output_directory)?,
        elf_file_name: relative_to(inputs.elf_path, inputs.output_directory)?,
        elf_mtime,
        elf_build_id: inputs.build_id.clone(),
        gn_args,
    })
}

/// `git rev-parse HEAD` in `directory`, or `None` if that fails.
pub fn detect_git_revision(directory: &Path) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(directory)
        .args(["rev-parse", "HEAD"])
        .output();
    match output {
        Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
        }
        _ => {
            tracing::warn!("Failed to detect git revision for file metadata.");
            None
        }
    }
}

/// Modification time in whole seconds since the Unix epoch.
pub fn modification_time(path: &Path) -> Result<u64> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("failed to stat {}", path.display()))?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .context("modification time is before the Unix epoch")?
        .as_secs())
}

pub fn parse_gn_args_file(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_gn_args(&contents)?)
}

/// Returns sorted `key=value` strings; later assignments win.
pub fn parse_gn_args(contents: &str) -> Result<Vec<String>, IntegrityError> {
    let mut args = BTreeMap::new();
    for (i, line) in contents.lines().enumerate() {
        // Strips #s even if within a string literal. Not a problem in practice.
        let line = line.split('#').next().unwrap_or("");
        if line.trim().is_empty() {
            continue;
        }
        // Quoted values may contain `=` themselves, e.g. `"-DFOO=1"`.
        let Some((key, value)) = line.split_once('=') else {
            return Err(IntegrityError::MalformedBuildArg {
                line_number: i + 1,
                line: line.to_string(),
            });
        };
        args.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(args.into_iter().map(|(k, v)| format!("{k}={v}")).collect())
}

/// `path` relative to `base`, walking up with `..` where needed.
pub fn relative_to(path: &Path, base: &Path) -> Result<String> {
    let path = absolute(path)?;
    let base = absolute(base)?;
    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();
    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part);
    }
    Ok(relative.to_string_lossy().into_owned())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    // Lexical cleanup only; the files need not exist.
    let mut clean = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other),
        }
    }
    Ok(clean)
}

/// Checks every section the ELF reports against the map-derived sizes.
pub fn validate_section_sizes(
    elf_sizes: &BTreeMap<String, i64>,
    map_sizes: &BTreeMap<String, i64>,
) -> Result<(), IntegrityError> {
    for (section, &elf) in elf_sizes {
        let map = map_sizes.get(section).copied();
        if map != Some(elf) {
            return Err(IntegrityError::SectionSizeMismatch {
                section: section.clone(),
                elf,
                map,
            });
        }
    }
    Ok(())
}

/// One `key=value` line per field, for logging.
pub fn describe(metadata: Option<&Metadata>) -> Vec<String> {
    let Some(m) = metadata else {
        return Vec::new();
    };
    vec![
        format!("git_revision={}", m.git_revision.as_deref().unwrap_or("")),
        format!("map_file_name={}", m.map_file_name),
        format!("elf_file_name={}", m.elf_file_name),
        format!("elf_mtime={}", m.elf_mtime),
        format!("elf_build_id={}", m.elf_build_id),
        format!("gn_args={}", m.gn_args.join(" ")),
    ]
}
