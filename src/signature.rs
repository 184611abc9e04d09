//! Demangled function signature parsing.
//!
//! Splits `void ns::Foo<int>::bar(int (*)(char)) const` into the qualified
//! signature without its return type (`ns::Foo<int>::bar(int (*)(char)) const`)
//! and the bare name (`ns::Foo<int>::bar`). Bracket depth is tracked so that
//! template arguments, function pointer parameters and lambda markers do not
//! confuse the split.

const OPERATOR: &str = "operator";

/// Returns `(full_name, name)` for a demangled function signature.
pub fn parse(signature: &str) -> (String, String) {
    let (body, suffix) = split_trailing_tags(signature);
    let (head, params) = match find_parameter_list(body) {
        Some(open) => body.split_at(open),
        None => (body, ""),
    };
    let name = strip_return_type(head);
    let full_name = format!("{name}{params}{suffix}");
    (full_name, format!("{name}{suffix}"))
}

/// Splits off trailing ` [...]` tags such as `[clone .part.0]` or `[vtable]`.
fn split_trailing_tags(s: &str) -> (&str, &str) {
    let mut end = s.len();
    loop {
        let body = &s[..end];
        if !body.ends_with(']') {
            break;
        }
        let mut depth = 0usize;
        let mut open = None;
        for (i, c) in body.char_indices().rev() {
            match c {
                ']' => depth += 1,
                '[' => {
                    depth -= 1;
                    if depth == 0 {
                        open = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        match open {
            Some(i) if i > 0 && body[..i].ends_with(' ') => end = i - 1,
            _ => break,
        }
    }
    (&s[..end], &s[end..])
}

/// Finds the `(` opening the parameter list, if the signature ends in one.
///
/// Trailing cv/ref qualifiers after the `)` are allowed.
fn find_parameter_list(s: &str) -> Option<usize> {
    let close = s.rfind(')')?;
    let trailer = &s[close + 1..];
    let qualifiers_only = trailer
        .split_whitespace()
        .all(|word| matches!(word, "const" | "volatile" | "&" | "&&" | "noexcept"));
    if !qualifiers_only {
        return None;
    }
    let mut depth = 0usize;
    for (i, c) in s[..=close].char_indices().rev() {
        match c {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    return (i > 0).then_some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drops a leading return type, e.g. `std::vector<int> ns::f` -> `ns::f`.
fn strip_return_type(head: &str) -> &str {
    // Conversion operators and `operator new` contain a space of their own.
    let search_end = operator_start(head).unwrap_or(head.len());
    match last_top_level_space(&head[..search_end]) {
        Some(space) => &head[space + 1..],
        None => head,
    }
}

/// Byte offset of a top-level `operator` keyword that begins a name component.
fn operator_start(head: &str) -> Option<usize> {
    let mut depth = 0i32;
    let bytes = head.as_bytes();
    for (i, c) in head.char_indices() {
        match c {
            '<' | '(' | '{' | '[' => depth += 1,
            '>' | ')' | '}' | ']' => depth -= 1,
            'o' if depth == 0 && head[i..].starts_with(OPERATOR) => {
                let starts_component = i == 0 || matches!(bytes[i - 1], b':' | b' ');
                let next = bytes.get(i + OPERATOR.len()).copied();
                let ends_word = !matches!(next, Some(b) if b.is_ascii_alphanumeric() || b == b'_');
                if starts_component && ends_word {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn last_top_level_space(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut found = None;
    for (i, c) in s.char_indices() {
        match c {
            '<' | '(' | '{' | '[' => depth += 1,
            '>' | ')' | '}' | ']' => depth -= 1,
            ' ' if depth == 0 => found = Some(i),
            _ => {}
        }
    }
    found
}

/// Removes every parenthesized group, including nested ones.
pub fn strip_parenthesized(s: &str) -> String {
    let mut depth = 0usize;
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}
