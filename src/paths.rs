//! Object and source path normalization.
//!
//! Object paths are rewritten relative to the source root, archive members
//! become `archive.a/member.o`, and source paths are looked up through the
//! build's dependency records.

use std::path::Path;

use crate::symbol::SymbolGroup;

/// Prefix of object files in the build output directory.
const OBJECT_DIR_PREFIX: &str = "obj/";
/// Prefix of generated sources in the build output directory.
const GENERATED_DIR_PREFIX: &str = "gen/";
/// The source root as seen from a build output directory two levels deep.
const SOURCE_ROOT_PREFIX: &str = "../../";
/// Paths that still escape the build tree after normalization.
const OUTSIDE_TREE_PREFIX: &str = "..";

/// Maps compiled objects back to the sources that produced them.
pub trait SourceLookup {
    /// Source path for a normalized object path (see `normalize_object_path`).
    fn find_source_for_path(&self, object_path: &str) -> Option<String>;

    /// Number of dependency files read.
    fn parsed_file_count(&self) -> usize;
}

/// `obj/third_party/zlib/deflate.o` -> `third_party/zlib/deflate.o`,
/// `foo/bar.a(baz.o)` -> `foo/bar.a/baz.o`.
pub fn normalize_object_path(path: &str) -> String {
    let path = path
        .strip_prefix(OBJECT_DIR_PREFIX)
        .or_else(|| path.strip_prefix(SOURCE_ROOT_PREFIX))
        .unwrap_or(path);
    if let Some(archive_end) = path.strip_suffix(')').and_then(|p| p.find('(')) {
        let archive = &path[..archive_end];
        let member = &path[archive_end + 1..path.len() - 1];
        return join(archive, member);
    }
    path.to_string()
}

/// `gen/third_party/foo.cc` or `../../third_party/foo.cc` -> `third_party/foo.cc`.
pub fn normalize_source_path(path: &str) -> String {
    path.strip_prefix(GENERATED_DIR_PREFIX)
        .or_else(|| path.strip_prefix(SOURCE_ROOT_PREFIX))
        .unwrap_or(path)
        .to_string()
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() || dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

pub fn normalize_object_paths(group: &mut SymbolGroup) {
    for symbol in group.iter_mut() {
        symbol.object_path = normalize_object_path(&symbol.object_path);
    }
}

/// Outcome of source path resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceResolution {
    /// Symbols that needed a source path and have an in-tree object.
    pub eligible: usize,
    pub resolved: usize,
}

impl SourceResolution {
    pub fn is_complete(&self) -> bool {
        self.resolved == self.eligible
    }

    pub fn unresolved(&self) -> usize {
        self.eligible - self.resolved
    }
}

fn is_outside_tree(object_path: &str) -> bool {
    object_path.starts_with(OUTSIDE_TREE_PREFIX) || Path::new(object_path).is_absolute()
}

/// Fills in `source_path` for symbols with a normalized, in-tree object path.
pub fn extract_source_paths(group: &mut SymbolGroup, lookup: &dyn SourceLookup) -> SourceResolution {
    let mut resolution = SourceResolution::default();
    for symbol in group.iter_mut() {
        let object_path = &symbol.object_path;
        if !symbol.source_path.is_empty() || object_path.is_empty() {
            continue;
        }
        // No source info for prebuilt archives or toolchain objects.
        if is_outside_tree(object_path) {
            continue;
        }
        resolution.eligible += 1;
        match lookup.find_source_for_path(object_path) {
            Some(source_path) => {
                symbol.source_path = normalize_source_path(&source_path);
                resolution.resolved += 1;
            }
            None => tracing::warn!("Could not find source path for {}", object_path),
        }
    }
    tracing::debug!("Parsed {} .ninja files.", lookup.parsed_file_count());
    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;
    use std::collections::HashMap;

    struct FixedLookup(HashMap<&'static str, &'static str>);

    impl SourceLookup for FixedLookup {
        fn find_source_for_path(&self, object_path: &str) -> Option<String> {
            self.0.get(object_path).map(|s| s.to_string())
        }

        fn parsed_file_count(&self) -> usize {
            1
        }
    }

    #[test]
    fn object_paths() {
        assert_eq!(normalize_object_path("obj/third_party/zlib/deflate.o"), "third_party/zlib/deflate.o");
        assert_eq!(normalize_object_path("foo/bar.a(baz.o)"), "foo/bar.a/baz.o");
        assert_eq!(normalize_object_path("obj/base/libbase.a(time.o)"), "base/libbase.a/time.o");
        assert_eq!(normalize_object_path("../../third_party/x.o"), "third_party/x.o");
        assert_eq!(normalize_object_path("../../../prebuilt/libc.a(memcpy.o)"), "../prebuilt/libc.a/memcpy.o");
        assert_eq!(normalize_object_path("plain.o"), "plain.o");
        assert_eq!(normalize_object_path(""), "");
    }

    #[test]
    fn object_path_normalization_is_idempotent() {
        for path in ["obj/a/b.o", "a/b.a(c.o)", "../../x/y.o"] {
            let once = normalize_object_path(path);
            assert_eq!(normalize_object_path(&once), once);
        }
    }

    #[test]
    fn source_paths() {
        assert_eq!(normalize_source_path("gen/foo/bar.cc"), "foo/bar.cc");
        assert_eq!(normalize_source_path("../../foo/bar.cc"), "foo/bar.cc");
        assert_eq!(normalize_source_path("foo/bar.cc"), "foo/bar.cc");
    }

    #[test]
    fn resolves_sources() {
        let mut group = SymbolGroup::new(vec![
            Symbol::new("a", 1, 1, 't', ".text", "base/a.o"),
            Symbol::new("b", 2, 1, 't', ".text", "base/gen.o"),
            Symbol::new("c", 3, 1, 't', ".text", "../prebuilt/libc.a/memcpy.o"),
            Symbol::new("d", 4, 1, 't', ".text", ""),
            Symbol::new("e", 5, 1, 't', ".text", "/usr/lib/gcc/x86_64-linux-gnu/13/crtbeginS.o"),
        ]);
        let lookup = FixedLookup(HashMap::from([
            ("base/a.o", "../../base/a.cc"),
            ("base/gen.o", "gen/base/gen.cc"),
        ]));
        let resolution = extract_source_paths(&mut group, &lookup);
        assert!(resolution.is_complete());
        assert_eq!(resolution.eligible, 2);
        let sources: Vec<_> = group.iter().map(|s| s.source_path.as_str()).collect();
        assert_eq!(sources, ["base/a.cc", "base/gen.cc", "", "", ""]);
    }

    #[test]
    fn reports_partial_resolution() {
        let mut group = SymbolGroup::new(vec![
            Symbol::new("a", 1, 1, 't', ".text", "base/a.o"),
            Symbol::new("b", 2, 1, 't', ".text", "base/stale.o"),
        ]);
        let lookup = FixedLookup(HashMap::from([("base/a.o", "../../base/a.cc")]));
        let resolution = extract_source_paths(&mut group, &lookup);
        assert!(!resolution.is_complete());
        assert_eq!(resolution.unresolved(), 1);
    }
}
