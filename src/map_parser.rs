//! GNU ld linker map parser.
//!
//! Reads the "Linker script and memory map" part of a `-Map` file and produces
//! the output section sizes plus one raw symbol per named input section (or
//! per symbol line for input sections that carry no name of their own).
//! Symbols come out ordered by section, then address.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::symbol::{Symbol, SECTION_BSS, SECTION_DATA, SECTION_RODATA, SECTION_TEXT};

const MEMORY_MAP_HEADER: &str = "Linker script and memory map";

/// Input section qualifiers that precede the symbol name, longest first.
const QUALIFIERS: &[&str] = &[
    "rel.ro.local.",
    "rel.ro.",
    "rel.local.",
    "rel.",
    "local.",
    "unlikely.",
    "hot.",
    "startup.",
    "exit.",
];

/// Section letter for an output section whose contents are tracked.
pub fn section_letter(section_name: &str) -> Option<char> {
    match section_name {
        ".text" => Some(SECTION_TEXT),
        ".rodata" => Some(SECTION_RODATA),
        ".data" | ".data.rel.ro" | ".data.rel.ro.local" | ".tdata" => Some(SECTION_DATA),
        ".bss" | ".tbss" => Some(SECTION_BSS),
        _ => None,
    }
}

/// Everything read from a map file.
#[derive(Debug, Default)]
pub struct MapExtraction {
    pub section_sizes: BTreeMap<String, i64>,
    pub symbols: Vec<Symbol>,
}

/// Opens a map file, decompressing it if it ends in `.gz`.
pub fn open_map(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// An input section whose symbols are still being collected.
struct InputSection {
    name: String,
    address: i64,
    size: i64,
    object_path: String,
    /// Named after its input section already; trailing symbol lines are aliases.
    named: bool,
    symbols: Vec<(i64, String)>,
}

#[derive(Default)]
struct MapFileParser {
    extraction: MapExtraction,
    /// Current output section and its letter, if its contents are tracked.
    output: Option<(String, Option<char>)>,
    pending_output: Option<String>,
    pending_input: Option<String>,
    input: Option<InputSection>,
}

/// Parses a GNU ld map.
pub fn parse<R: BufRead>(reader: R) -> Result<MapExtraction> {
    let mut parser = MapFileParser::default();
    let mut in_memory_map = false;
    for (line_number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read map line {}", line_number + 1))?;
        if !in_memory_map {
            in_memory_map = line.starts_with(MEMORY_MAP_HEADER);
            continue;
        }
        parser.parse_line(&line);
    }
    parser.flush_input();
    tracing::debug!(
        "Parsed {} sections and {} symbols from map",
        parser.extraction.section_sizes.len(),
        parser.extraction.symbols.len()
    );
    Ok(parser.extraction)
}

impl MapFileParser {
    fn parse_line(&mut self, line: &str) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&first) = tokens.first() else {
            return;
        };
        let indent = line.len() - line.trim_start().len();

        if indent == 0 {
            self.flush_input();
            self.pending_input = None;
            if first.starts_with('.') {
                match address_and_size(&tokens[1..]) {
                    Some((_, size)) => self.start_output(first, size),
                    None if tokens.len() == 1 => self.pending_output = Some(first.to_string()),
                    None => {}
                }
            } else if first == "/DISCARD/" {
                self.output = None;
            }
            return;
        }

        if let Some(name) = self.pending_output.take() {
            if let Some((_, size)) = address_and_size(&tokens) {
                self.start_output(&name, size);
            }
            return;
        }

        if indent == 1 {
            self.flush_input();
            self.pending_input = None;
            // Patterns such as `*(.text .text.*)` or `KEEP(*(.init))`, and `*fill*`.
            if first.starts_with('*') || first.contains('(') {
                return;
            }
            match address_and_size(&tokens[1..]) {
                Some((address, size)) => self.start_input(first, address, size, &tokens[3..]),
                None if tokens.len() == 1 => self.pending_input = Some(first.to_string()),
                None => {}
            }
            return;
        }

        if let Some(name) = self.pending_input.take() {
            if let Some((address, size)) = address_and_size(&tokens) {
                self.start_input(&name, address, size, &tokens[2..]);
            }
            return;
        }

        // `0xADDR name`, but not `0xADDR PROVIDE (x = .)` or `0xADDR x = .`.
        if tokens.len() < 2 || tokens.contains(&"=") || tokens[1].starts_with("PROVIDE") {
            return;
        }
        let Some(address) = parse_hex(first) else {
            return;
        };
        if let Some(input) = self.input.as_mut() {
            let name = line.trim_start()[first.len()..].trim();
            input.symbols.push((address, name.to_string()));
        }
    }

    fn start_output(&mut self, name: &str, size: i64) {
        self.extraction.section_sizes.insert(name.to_string(), size);
        self.output = Some((name.to_string(), section_letter(name)));
    }

    fn start_input(&mut self, name: &str, address: i64, size: i64, path: &[&str]) {
        let Some((_, Some(_))) = &self.output else {
            return;
        };
        let object_path = path.join(" ");
        let placeholder = if name.starts_with(".rodata.str") {
            Some("** merge strings")
        } else if name.starts_with(".rodata.cst") {
            Some("** merge constants")
        } else {
            None
        };
        if let Some(placeholder) = placeholder {
            self.emit(placeholder.to_string(), address, size, &object_path);
            return;
        }

        let symbol_name = symbol_name_from_input_section(name);
        let named = symbol_name.is_some();
        if let Some(symbol_name) = symbol_name {
            self.emit(symbol_name, address, size, &object_path);
        }
        self.input = Some(InputSection {
            name: name.to_string(),
            address,
            size,
            object_path,
            named,
            symbols: Vec::new(),
        });
    }

    fn flush_input(&mut self) {
        let Some(mut input) = self.input.take() else {
            return;
        };
        if input.named {
            return;
        }
        if input.symbols.is_empty() {
            if input.name == "COMMON" && input.size > 0 {
                self.emit("** common".to_string(), input.address, input.size, &input.object_path);
            }
            return;
        }
        input.symbols.sort_by_key(|(address, _)| *address);
        let section_end = input.address + input.size;
        let ends: Vec<i64> = input
            .symbols
            .iter()
            .skip(1)
            .map(|(address, _)| *address)
            .chain(std::iter::once(section_end))
            .collect();
        for ((address, name), end) in input.symbols.into_iter().zip(ends) {
            self.emit(name, address, (end - address).max(0), &input.object_path);
        }
    }

    fn emit(&mut self, name: String, address: i64, size: i64, object_path: &str) {
        let Some((section_name, Some(letter))) = &self.output else {
            return;
        };
        self.extraction.symbols.push(Symbol::new(
            name,
            address,
            size,
            *letter,
            section_name.as_str(),
            object_path,
        ));
    }
}

/// `.text._Z3foov` -> `_Z3foov`, `.data.rel.ro._ZTV3Foo` -> `_ZTV3Foo`.
///
/// `None` for sections such as `.text` or `.text.unlikely`.
fn symbol_name_from_input_section(name: &str) -> Option<String> {
    let (_, rest) = name.strip_prefix('.')?.split_once('.')?;
    // `.data.rel.ro` and friends carry no name at all.
    if QUALIFIERS.iter().any(|q| q.strip_suffix('.') == Some(rest)) {
        return None;
    }
    let rest = QUALIFIERS
        .iter()
        .find_map(|q| rest.strip_prefix(q))
        .unwrap_or(rest);
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_string())
}

fn address_and_size(tokens: &[&str]) -> Option<(i64, i64)> {
    match tokens {
        [address, size, ..] => Some((parse_hex(address)?, parse_hex(size)?)),
        _ => None,
    }
}

fn parse_hex(token: &str) -> Option<i64> {
    let digits = token.strip_prefix("0x")?;
    let value = u64::from_str_radix(digits, 16).ok()?;
    i64::try_from(value).ok()
}
