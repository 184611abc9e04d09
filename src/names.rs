//! Symbol name normalization.
//!
//! Assigns `full_name`, strips return types and parameter lists from `name`,
//! moves descriptor prefixes such as `vtable for` to a `[vtable]` suffix and
//! folds anonymous namespaces. Running the pass on its own output is a no-op.

use std::collections::BTreeSet;

use crate::signature;
use crate::symbol::{Symbol, SymbolGroup};

/// Descriptor prefixes are only looked for this close to the start of a name.
const PREFIX_SEARCH_LIMIT: usize = 30;

const ANONYMOUS_NAMESPACE: &str = "(anonymous namespace)::";

/// Normalizes every symbol's names.
///
/// Returns the descriptor prefixes seen, e.g. `vtable` or `virtual thunk`.
pub fn normalize_names(group: &mut SymbolGroup) -> BTreeSet<String> {
    let mut found_prefixes = BTreeSet::new();
    for symbol in group.iter_mut() {
        normalize_symbol(symbol, &mut found_prefixes);
    }
    tracing::debug!("Found name prefixes of: {:?}", found_prefixes);
    found_prefixes
}

fn normalize_symbol(symbol: &mut Symbol, found_prefixes: &mut BTreeSet<String>) {
    if symbol.is_placeholder() {
        return;
    }

    // A previous pass leaves the complete form in `full_name`.
    let mut name = if symbol.full_name.is_empty() {
        std::mem::take(&mut symbol.name)
    } else {
        std::mem::take(&mut symbol.full_name)
    };

    // E.g.: vtable for FOO
    // E.g.: virtual thunk to FOO
    if let Some(moved) = move_prefix_to_suffix(&name, " for ", found_prefixes)
        .or_else(|| move_prefix_to_suffix(&name, " to ", found_prefixes))
    {
        name = moved;
    }

    let mut full_name = String::new();
    if symbol.is_code() {
        (full_name, name) = signature::parse(&name);
    }

    // Anonymous namespaces only harm clustering.
    if name.contains(ANONYMOUS_NAMESPACE) {
        symbol.is_anonymous = true;
        name = name.replace(ANONYMOUS_NAMESPACE, "");
        full_name = full_name.replace(ANONYMOUS_NAMESPACE, "");
    }

    // Rare. E.g. blink::CSSValueKeywordsHash::findValueImpl(char const*)::value_word_list
    if !symbol.is_code() && name.contains('(') {
        full_name = std::mem::take(&mut name);
        name = signature::strip_parenthesized(&full_name);
    }

    if full_name == name {
        full_name.clear();
    }
    symbol.name = name;
    symbol.full_name = full_name;
}

/// Rewrites `<X><separator><Y>` to `<Y> [<X>]` when the separator sits within
/// the first few characters.
fn move_prefix_to_suffix(
    name: &str,
    separator: &str,
    found_prefixes: &mut BTreeSet<String>,
) -> Option<String> {
    let window = &name[..floor_char_boundary(name, PREFIX_SEARCH_LIMIT)];
    let idx = window.find(separator)?;
    let prefix = &name[..idx];
    let rest = &name[idx + separator.len()..];
    found_prefixes.insert(prefix.to_string());
    Some(format!("{rest} [{prefix}]"))
}

fn floor_char_boundary(s: &str, limit: usize) -> usize {
    if limit >= s.len() {
        return s.len();
    }
    (0..=limit).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{SECTION_DATA, SECTION_RODATA, SECTION_TEXT};

    fn normalized(name: &str, section: char) -> Symbol {
        let mut group = SymbolGroup::new(vec![Symbol::new(name, 0x10, 4, section, ".x", "a.o")]);
        normalize_names(&mut group);
        group.into_vec().remove(0)
    }

    #[test]
    fn vtable_prefix_becomes_suffix() {
        let s = normalized("vtable for Foo", SECTION_DATA);
        assert_eq!(s.name, "Foo [vtable]");
        assert_eq!(s.full_name, "");
    }

    #[test]
    fn thunk_prefix_becomes_suffix() {
        let s = normalized("virtual thunk to Bar", SECTION_TEXT);
        assert_eq!(s.name, "Bar [virtual thunk]");
        assert_eq!(s.full_name, "");

        let s = normalized("virtual thunk to Bar::Baz(int)", SECTION_TEXT);
        assert_eq!(s.name, "Bar::Baz [virtual thunk]");
        assert_eq!(s.full_name, "Bar::Baz(int) [virtual thunk]");
    }

    #[test]
    fn prefix_must_be_near_start() {
        let long = "a_rather_long_identifier_name_here for Foo";
        assert_eq!(normalized(long, SECTION_DATA).name, long);
    }

    #[test]
    fn collects_prefixes() {
        let mut group = SymbolGroup::new(vec![
            Symbol::new("typeinfo for Foo", 0x10, 4, SECTION_RODATA, ".rodata", ""),
            Symbol::new("typeinfo name for Foo", 0x14, 4, SECTION_RODATA, ".rodata", ""),
            Symbol::new("non-virtual thunk to Foo::f()", 0x20, 4, SECTION_TEXT, ".text", ""),
        ]);
        let prefixes = normalize_names(&mut group);
        let prefixes: Vec<_> = prefixes.iter().map(String::as_str).collect();
        assert_eq!(prefixes, ["non-virtual thunk", "typeinfo", "typeinfo name"]);
    }

    #[test]
    fn functions_get_full_name() {
        let s = normalized("void ns::Foo::Run(int, char const*)", SECTION_TEXT);
        assert_eq!(s.name, "ns::Foo::Run");
        assert_eq!(s.full_name, "ns::Foo::Run(int, char const*)");
    }

    #[test]
    fn anonymous_namespace_is_folded() {
        let s = normalized("(anonymous namespace)::Helper::Go(int)", SECTION_TEXT);
        assert!(s.is_anonymous);
        assert_eq!(s.name, "Helper::Go");
        assert_eq!(s.full_name, "Helper::Go(int)");

        let s = normalized("(anonymous namespace)::kTable", SECTION_RODATA);
        assert!(s.is_anonymous);
        assert_eq!(s.name, "kTable");
        assert_eq!(s.full_name, "");
    }

    #[test]
    fn data_with_parentheses() {
        let s = normalized(
            "blink::CSSValueKeywordsHash::findValueImpl(char const*, unsigned int)::value_word_list",
            SECTION_RODATA,
        );
        assert_eq!(s.name, "blink::CSSValueKeywordsHash::findValueImpl::value_word_list");
        assert_eq!(
            s.full_name,
            "blink::CSSValueKeywordsHash::findValueImpl(char const*, unsigned int)::value_word_list"
        );
    }

    #[test]
    fn placeholders_are_untouched() {
        let s = normalized("** merge strings for (x)", SECTION_RODATA);
        assert_eq!(s.name, "** merge strings for (x)");
        assert_eq!(s.full_name, "");
    }

    #[test]
    fn running_twice_is_a_no_op() {
        let mut group = SymbolGroup::new(vec![
            Symbol::new("vtable for Foo", 0x10, 4, SECTION_DATA, ".data.rel.ro", ""),
            Symbol::new("virtual thunk to (anonymous namespace)::A::f(int) const", 0x20, 4, SECTION_TEXT, ".text", ""),
            Symbol::new("std::__1::basic_string<char> base::Join<int>(int (*)(int))", 0x30, 4, SECTION_TEXT, ".text", ""),
            Symbol::new("f(int)::kLocal", 0x40, 4, SECTION_RODATA, ".rodata", ""),
            Symbol::new("main", 0x50, 4, SECTION_TEXT, ".text", ""),
            Symbol::new("guard variable for (anonymous namespace)::g()::x", 0x60, 8, SECTION_DATA, ".bss", ""),
        ]);
        normalize_names(&mut group);
        let once = group.clone();
        normalize_names(&mut group);
        assert_eq!(group, once);
    }

    #[test]
    fn handles_multibyte_names() {
        let s = normalized("ünïcödé_ünïcödé_ünïcödé_ünïcödé for X", SECTION_DATA);
        assert!(s.name.starts_with("ünïcödé"));
    }
}
