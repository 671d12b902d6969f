//! The diagnostic engine.
//!
//! Four passes over one [`CheckContext`]: structural (delimiters and block
//! shape), call sites, symbols, and statement style. Each pass appends to a
//! shared list; the engine sorts once at the end. Checks never fail — a bad
//! document yields diagnostics, not errors.

use crate::analysis::calls::CallSite;
use crate::analysis::diag::{sort_diagnostics, Diagnostic};
use crate::analysis::document::Document;
use crate::analysis::table::SymbolTable;
use crate::analysis::Dialect;
use crate::registry::RegistrySnapshot;

mod callsite;
mod structural;
mod style;
mod symbolic;

/// Everything a check can look at.
pub struct CheckContext<'a> {
    pub doc: &'a Document,
    pub registry: &'a RegistrySnapshot,
    pub calls: &'a [CallSite],
    pub table: &'a SymbolTable,
    pub dialect: Dialect,
    /// True when the document was analyzed with declared skill parameters.
    pub has_skill_params: bool,
}

/// Run every check and return the sorted diagnostic list.
pub fn run(ctx: &CheckContext<'_>) -> Vec<Diagnostic> {
    let mut diags = ctx.doc.pairing.clone();
    structural::check(ctx, &mut diags);
    callsite::check(ctx, &mut diags);
    symbolic::check(ctx, &mut diags);
    style::check(ctx, &mut diags);
    sort_diagnostics(&mut diags);
    diags
}

// ============================================================================
// Shared string-aware text primitives
// ============================================================================

/// True when `operator` occurs outside string literals. `--` immediately
/// before `%` is a whitespace-trim marker, not an operator.
pub(crate) fn has_operator_outside_strings(text: &str, operator: &str) -> bool {
    let bytes = text.as_bytes();
    let op = operator.as_bytes();
    let mut in_string = false;
    let mut string_char = 0u8;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if in_string {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == string_char {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if c == b'"' || c == b'\'' {
            in_string = true;
            string_char = c;
            i += 1;
            continue;
        }
        if bytes[i..].starts_with(op) {
            if op == b"--" && bytes.get(i + 2) == Some(&b'%') {
                i += 1;
                continue;
            }
            return true;
        }
        i += 1;
    }
    false
}

/// True when a bare `!` negation occurs outside strings. `!=` and the tails
/// of `<=`/`>=` do not count.
pub(crate) fn has_negation_outside_strings(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut in_string = false;
    let mut string_char = 0u8;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if in_string {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == string_char {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if c == b'"' || c == b'\'' {
            in_string = true;
            string_char = c;
            i += 1;
            continue;
        }
        if c == b'!'
            && bytes.get(i + 1) != Some(&b'=')
            && (i == 0 || (bytes[i - 1] != b'<' && bytes[i - 1] != b'>'))
            && bytes
                .get(i + 1)
                .map_or(false, |b| b.is_ascii_alphabetic() || *b == b'_')
        {
            return true;
        }
        i += 1;
    }
    false
}

/// True when the byte at `pos` sits inside a string literal opened at or
/// after `from`.
pub(crate) fn inside_string(bytes: &[u8], from: usize, pos: usize) -> bool {
    let mut in_string = false;
    let mut string_char = 0u8;
    let mut i = from;
    while i < pos && i < bytes.len() {
        let c = bytes[i];
        if in_string && c == b'\\' {
            i += 2;
            continue;
        }
        if c == b'"' || c == b'\'' {
            if !in_string {
                in_string = true;
                string_char = c;
            } else if c == string_char {
                in_string = false;
            }
        }
        i += 1;
    }
    in_string
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_detection_skips_strings_and_trim_markers() {
        assert!(has_operator_outside_strings("a || b", "||"));
        assert!(!has_operator_outside_strings("\"a || b\"", "||"));
        assert!(has_operator_outside_strings("x -- 1", "--"));
        assert!(!has_operator_outside_strings("set x = 1 --%", "--"));
    }

    #[test]
    fn negation_detection() {
        assert!(has_negation_outside_strings("!ready"));
        assert!(!has_negation_outside_strings("a != b"));
        assert!(!has_negation_outside_strings("\"!ready\""));
    }
}
