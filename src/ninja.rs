//! Source lookup backed by `.ninja` build files.
//!
//! `build` statements are indexed by their (normalized) outputs. Loading
//! starts at `build.ninja` and follows every `subninja` and `include`; any
//! file that cannot be read fails the load.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths::{normalize_object_path, SourceLookup};

const ROOT_FILE: &str = "build.ninja";

/// Maps object files (and archive members) to the sources they are built from.
#[derive(Debug, Default)]
pub struct SourceFileMapper {
    /// Normalized output path -> explicit inputs, as written in the file.
    dependencies: HashMap<String, Vec<String>>,
    parsed_files: usize,
}

impl SourceFileMapper {
    /// Reads every `.ninja` file reachable from the output directory's `build.ninja`.
    pub fn load(output_directory: &Path) -> Result<Self> {
        let mut mapper = Self::default();
        let mut pending = vec![PathBuf::from(ROOT_FILE)];
        let mut seen = HashSet::new();
        while let Some(relative) = pending.pop() {
            if !seen.insert(relative.clone()) {
                continue;
            }
            let path = output_directory.join(&relative);
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            mapper.parsed_files += 1;
            pending.extend(mapper.parse_file(&contents));
        }
        tracing::debug!("Parsed {} .ninja files", mapper.parsed_files);
        Ok(mapper)
    }

    /// Indexes one file's build statements; returns the files it references.
    fn parse_file(&mut self, contents: &str) -> Vec<PathBuf> {
        let mut referenced = Vec::new();
        for line in logical_lines(contents) {
            if let Some(rest) = line.strip_prefix("subninja ").or_else(|| line.strip_prefix("include ")) {
                referenced.push(PathBuf::from(unescape(rest.trim())));
            } else if let Some(rest) = line.strip_prefix("build ") {
                self.parse_build(rest);
            }
        }
        referenced
    }

    /// `outputs [| implicit]: rule inputs [| implicit] [|| order-only]`
    fn parse_build(&mut self, statement: &str) {
        let Some(colon) = find_unescaped_colon(statement) else {
            return;
        };
        let (outputs, rest) = (&statement[..colon], &statement[colon + 1..]);
        let mut words = split_words(rest).into_iter();
        // Rule name.
        words.next();
        let inputs: Vec<String> = words.take_while(|w| w != "|" && w != "||").collect();
        if inputs.is_empty() {
            return;
        }
        for output in split_words(outputs).into_iter().take_while(|w| w != "|") {
            self.dependencies
                .insert(normalize_object_path(&output), inputs.clone());
        }
    }

    fn find_source(&self, object_path: &str) -> Option<String> {
        if let Some(inputs) = self.dependencies.get(object_path) {
            return inputs.first().cloned();
        }
        // Archive member: foo/libbar.a/baz.o
        let split = object_path.rfind(".a/")? + 2;
        let (archive, member) = (&object_path[..split], &object_path[split + 1..]);
        let inputs = self.dependencies.get(archive)?;
        let object = inputs
            .iter()
            .find(|input| Path::new(input).file_name() == Some(OsStr::new(member)))?;
        self.dependencies
            .get(&normalize_object_path(object))?
            .first()
            .cloned()
    }
}

impl SourceLookup for SourceFileMapper {
    fn find_source_for_path(&self, object_path: &str) -> Option<String> {
        self.find_source(object_path)
    }

    fn parsed_file_count(&self) -> usize {
        self.parsed_files
    }
}

/// Joins `$`-newline continuations and drops comments and blank lines.
fn logical_lines(contents: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for raw in contents.lines() {
        let piece = if current.is_empty() { raw } else { raw.trim_start() };
        if let Some(continued) = piece.strip_suffix('$').filter(|p| !p.ends_with('$')) {
            current.push_str(continued);
            continue;
        }
        current.push_str(piece);
        let line = std::mem::take(&mut current);
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        lines.push(line);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn find_unescaped_colon(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            '$' if !escaped => escaped = true,
            ':' if !escaped => return Some(i),
            _ => escaped = false,
        }
    }
    None
}

/// Splits on unescaped spaces and resolves `$ `, `$:` and `$$`.
fn split_words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '$' => {
                if let Some(next) = chars.next() {
                    word.push(next);
                }
            }
            ' ' | '\t' => {
                if !word.is_empty() {
                    words.push(std::mem::take(&mut word));
                }
            }
            _ => word.push(c),
        }
    }
    if !word.is_empty() {
        words.push(word);
    }
    words
}

fn unescape(s: &str) -> String {
    split_words(s).join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn build_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "build.ninja",
            "ninja_required_version = 1.7.2\n\
             rule cxx\n  command = clang++ -c $in -o $out\n\
             subninja obj/base/base.ninja\n\
             subninja obj/third_party/zlib/zlib.ninja\n",
        );
        write(
            dir.path(),
            "obj/base/base.ninja",
            "# base\n\
             build obj/base/time.o: cxx ../../base/time.cc || obj/base/gen.stamp\n\
             build obj/base/long_name.o: cxx $\n    ../../base/long$ name.cc | ../../base/h.h\n\
             build obj/base/libbase.a: alink obj/base/time.o obj/base/long_name.o\n\
             build obj/base/gen.o: cxx gen/base/gen.cc\n",
        );
        write(
            dir.path(),
            "obj/third_party/zlib/zlib.ninja",
            "build obj/third_party/zlib/deflate.o: cc ../../third_party/zlib/deflate.c\n",
        );
        dir
    }

    #[test]
    fn finds_objects() {
        let dir = build_tree();
        let mapper = SourceFileMapper::load(dir.path()).unwrap();
        assert_eq!(
            mapper.find_source_for_path("third_party/zlib/deflate.o").as_deref(),
            Some("../../third_party/zlib/deflate.c")
        );
        assert_eq!(mapper.find_source_for_path("base/time.o").as_deref(), Some("../../base/time.cc"));
        assert_eq!(mapper.find_source_for_path("base/gen.o").as_deref(), Some("gen/base/gen.cc"));
        assert_eq!(mapper.parsed_file_count(), 3);
    }

    #[test]
    fn handles_continuations_and_escapes() {
        let dir = build_tree();
        let mapper = SourceFileMapper::load(dir.path()).unwrap();
        assert_eq!(
            mapper.find_source_for_path("base/long_name.o").as_deref(),
            Some("../../base/long name.cc")
        );
    }

    #[test]
    fn finds_archive_members() {
        let dir = build_tree();
        let mapper = SourceFileMapper::load(dir.path()).unwrap();
        assert_eq!(
            mapper.find_source_for_path("base/libbase.a/time.o").as_deref(),
            Some("../../base/time.cc")
        );
        assert_eq!(mapper.find_source_for_path("base/libbase.a/missing.o"), None);
    }

    #[test]
    fn unknown_objects() {
        let dir = build_tree();
        let mapper = SourceFileMapper::load(dir.path()).unwrap();
        assert_eq!(mapper.find_source_for_path("nope.o"), None);
    }

    #[test]
    fn missing_files_fail_the_load() {
        let empty = tempfile::tempdir().unwrap();
        let err = SourceFileMapper::load(empty.path()).unwrap_err();
        assert!(format!("{err:#}").contains("build.ninja"));

        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "build.ninja",
            "build obj/a.o: cxx ../../a.cc\nsubninja obj/gone.ninja\n",
        );
        let err = SourceFileMapper::load(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("gone.ninja"));
    }
}
