//! Placeholder substitution for fixed phrasings.

use crate::text;
use crate::value::ExtractedValues;
use std::collections::BTreeSet;

/// A phrasing with every placeholder resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filled {
    pub text: String,
    /// Placeholders that named a field with no extracted value
    pub missing: Vec<String>,
}

/// Replace `{field}` placeholders with extracted values.
///
/// Critical fields are inserted exactly as extracted. Other values are
/// normalized as clauses (collapsed whitespace, no trailing punctuation)
/// so they read naturally mid-sentence. `{{` and `}}` produce literal
/// braces. Unknown placeholders become empty and are reported.
pub fn fill(template: &str, values: &ExtractedValues, critical: &BTreeSet<&str>) -> Filled {
    let mut out = String::with_capacity(template.len());
    let mut missing = Vec::new();
    let mut rest = template;

    while let Some(idx) = rest.find(|c: char| c == '{' || c == '}') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        match tail[1..].find('}') {
            Some(close) => {
                let name = tail[1..1 + close].trim();
                match values.get(name) {
                    Some(extracted) if critical.contains(name) => {
                        out.push_str(&extracted.value().render());
                    }
                    Some(extracted) => {
                        out.push_str(&text::normalize_clause(&extracted.value().render()));
                    }
                    None => missing.push(name.to_string()),
                }
                rest = &tail[close + 2..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    Filled {
        text: out.trim().to_string(),
        missing,
    }
}

/// Field names referenced as placeholders in a phrasing.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let tail = &rest[open..];
        if tail.starts_with("{{") {
            rest = &tail[2..];
            continue;
        }
        match tail[1..].find('}') {
            Some(close) => {
                names.push(tail[1..1 + close].trim().to_string());
                rest = &tail[close + 2..];
            }
            None => break,
        }
    }
    names
}
