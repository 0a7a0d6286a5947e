// Search planning: turn a pattern and flags into an ordered-store scan

use regex::{Regex, RegexBuilder};
use tracing::debug;

use super::record::IDENT_LEN;
use crate::index::db::{Scan, ScanKey};

/// Characters that make a pattern a regular expression
const REGEX_CHARS: &str = "^$()[]{}.*+?|\\";

/// Options for `TagStore::first`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchFlags {
    /// Literal patterns match keys by prefix instead of exactly
    pub prefix: bool,
    /// Return distinct keys only
    pub key_only: bool,
    /// Compact format: do not open source files, leave text empty
    pub no_source: bool,
    /// Treat the pattern literally
    pub no_regex: bool,
    pub ignore_case: bool,
    /// POSIX basic syntax instead of extended
    pub basic_regex: bool,
}

pub fn is_regex_char(c: char) -> bool {
    REGEX_CHARS.contains(c)
}

pub fn is_regex(pattern: &str) -> bool {
    pattern.chars().any(is_regex_char)
}

/// Build the scan for `pattern`.
pub fn plan(pattern: Option<&str>, flags: &SearchFlags) -> Scan {
    let literal = |key: &str| -> Scan {
        let scan = if flags.prefix {
            Scan::prefix(key)
        } else {
            Scan::exact(key)
        };
        scan.keys_only(flags.key_only)
    };

    let scan = match pattern {
        Some(p) if flags.no_regex => literal(p),
        None => Scan::all().keys_only(flags.key_only),
        Some("") | Some(".*") => Scan::all().keys_only(flags.key_only),
        Some(p) if is_regex(p) => {
            let source = if flags.basic_regex {
                basic_to_extended(p)
            } else {
                p.to_string()
            };
            match compile(&source, flags.ignore_case) {
                Some(re) => {
                    // prefix from the extended form, where quantifiers are bare
                    let scan = match literal_prefix(&source, flags.ignore_case) {
                        Some(prefix) => Scan::prefix(prefix),
                        None => Scan::all(),
                    };
                    scan.with_filter(re).keys_only(flags.key_only)
                }
                None => literal(p),
            }
        }
        Some(p) => literal(p),
    };

    debug!(
        "search plan: {} filter={}",
        match &scan.key {
            ScanKey::All => "full scan".to_string(),
            ScanKey::Exact(k) => format!("exact '{}'", k),
            ScanKey::Prefix(k) => format!("prefix '{}'", k),
        },
        scan.filter.is_some()
    );

    scan
}

fn compile(source: &str, ignore_case: bool) -> Option<Regex> {
    RegexBuilder::new(source)
        .case_insensitive(ignore_case)
        .build()
        .ok()
}

/// Literal key prefix implied by a pattern anchored at the start.
///
/// `^abc[0-9]` gives `abc`. A character followed by a quantifier is left
/// out (`^abc*` gives `ab`), and patterns with alternation give nothing, so
/// every key the regex can match starts with the returned prefix.
pub fn literal_prefix(pattern: &str, ignore_case: bool) -> Option<String> {
    if ignore_case || pattern.contains('|') {
        return None;
    }
    let body = pattern.strip_prefix('^')?;

    let mut prefix: Vec<char> = Vec::new();
    let mut chars = body.chars().peekable();
    while let Some(&c) = chars.peek() {
        if is_regex_char(c) || prefix.len() >= IDENT_LEN {
            break;
        }
        prefix.push(c);
        chars.next();
    }
    if matches!(chars.peek(), Some('*') | Some('?') | Some('{')) {
        prefix.pop();
    }

    if prefix.is_empty() {
        None
    } else {
        Some(prefix.into_iter().collect())
    }
}

/// Rewrite POSIX basic syntax into the extended syntax `regex` understands.
///
/// In basic syntax `\( \) \{ \} \| \+ \?` are operators and the bare
/// characters are literals; the roles swap in extended syntax.
pub fn basic_to_extended(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(op @ ('(' | ')' | '{' | '}' | '|' | '+' | '?')) => out.push(op),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push_str("\\\\"),
            },
            '(' | ')' | '{' | '}' | '|' | '+' | '?' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    out
}
