//! Batch demangling through an external process.
//!
//! Map files leave some names mangled. They are collected and sent to
//! `c++filt` in a single batch, one name per line, and the output lines are
//! written back in the same order.

use anyhow::{Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::DemangleError;
use crate::symbol::SymbolGroup;

/// Itanium mangled names start with this.
pub const MANGLED_PREFIX: &str = "_Z";

/// Something that turns a batch of mangled names into demangled ones.
pub trait Demangle {
    /// Returns exactly one output per input, in input order.
    fn demangle_batch(&self, names: &[&str]) -> Result<Vec<String>>;
}

/// Runs a demangler program that reads names on stdin and writes them on stdout.
pub struct ProcessDemangler {
    program: String,
    args: Vec<String>,
}

impl ProcessDemangler {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `c++filt` from the given toolchain prefix.
    pub fn cxxfilt(tool_prefix: &str) -> Self {
        Self::new(format!("{tool_prefix}c++filt"), Vec::new())
    }
}

impl Demangle for ProcessDemangler {
    fn demangle_batch(&self, names: &[&str]) -> Result<Vec<String>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| DemangleError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut input = names.join("\n");
        input.push('\n');
        let mut stdin = child.stdin.take().context("demangler stdin unavailable")?;
        // Feed stdin from another thread so a full stdout pipe cannot block us.
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for {}", self.program))?;
        let write_result = writer
            .join()
            .map_err(|_| anyhow::anyhow!("demangler input thread panicked"))?;

        if !output.status.success() {
            return Err(DemangleError::ExitStatus {
                program: self.program.clone(),
                status: output.status,
            }
            .into());
        }
        write_result.with_context(|| format!("failed to write names to {}", self.program))?;

        let stdout = String::from_utf8(output.stdout)
            .with_context(|| format!("{} produced invalid UTF-8", self.program))?;
        Ok(stdout.lines().map(str::to_string).collect())
    }
}

/// Demangles every symbol whose name is still mangled.
///
/// Returns the number of names rewritten.
pub fn unmangle_remaining_symbols(group: &mut SymbolGroup, demangler: &dyn Demangle) -> Result<usize> {
    let mut to_process: Vec<_> = group
        .iter_mut()
        .filter(|s| s.name.starts_with(MANGLED_PREFIX))
        .collect();
    if to_process.is_empty() {
        return Ok(0);
    }

    tracing::info!("Unmangling {} names", to_process.len());
    let names: Vec<&str> = to_process.iter().map(|s| s.name.as_str()).collect();
    let demangled = demangler.demangle_batch(&names)?;
    if demangled.len() != to_process.len() {
        return Err(DemangleError::LineCountMismatch {
            expected: to_process.len(),
            actual: demangled.len(),
        }
        .into());
    }

    for (symbol, name) in to_process.iter_mut().zip(demangled) {
        symbol.name = name;
    }
    Ok(to_process.len())
}
