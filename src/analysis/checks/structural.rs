//! Structural checks: delimiter balance and block shape.
//!
//! The brace counters are the one place that reads raw text instead of the
//! arena: an unbalanced document has no reliable arena to read. They track
//! comment, statement, and expression context so that dict braces and
//! string contents never count, and top-level apostrophes in prose never
//! open a string.

use super::CheckContext;
use crate::analysis::diag::{Diagnostic, DiagnosticCode};
use crate::analysis::document::BlockKind;
use crate::registry::KEYWORDS;

pub(super) fn check(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    let text = &ctx.doc.text;

    let (open, close) = count_expression_braces(text);
    if open != close {
        let at = find_last_unmatched(text, "{{", "}}", open > close).unwrap_or(0);
        out.push(Diagnostic::new(
            DiagnosticCode::UnbalancedExpressionBraces,
            format!("Unbalanced expression braces: {open} {{{{ vs {close} }}}}"),
            ctx.doc.lines.range_at(at, 2),
        ));
    }

    let (open, close) = count_statement_braces(text);
    if open != close {
        let at = find_last_unmatched(text, "{%", "%}", open > close).unwrap_or(0);
        out.push(Diagnostic::new(
            DiagnosticCode::UnbalancedStatementBraces,
            format!("Unbalanced statement braces: {open} {{% vs {close} %}}"),
            ctx.doc.lines.range_at(at, 2),
        ));
    }

    triple_braces(ctx, out);
    reversed_braces(ctx, out);
    block_shape(ctx, out);
}

fn triple_braces(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    let bytes = ctx.doc.text.as_bytes();
    let mut i = 0;
    while i + 3 <= bytes.len() {
        let run = &bytes[i..i + 3];
        if run == b"{{{" || run == b"}}}" {
            let what = if run[0] == b'{' { "{{{" } else { "}}}" };
            let fix = if run[0] == b'{' { "{{" } else { "}}" };
            out.push(Diagnostic::new(
                DiagnosticCode::TripleBrace,
                format!("Stray brace: found {what} (triple braces). Use {fix} for expressions."),
                ctx.doc.lines.range_at(i, 3),
            ));
            i += 3;
        } else {
            i += 1;
        }
    }
}

/// `}}` occurring before any `{{`, ignoring strings, comments, and
/// statement blocks.
fn reversed_braces(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    let text = &ctx.doc.text;
    let first_open = first_outside_strings_and_blocks(text, "{{");
    let first_close = first_outside_strings_and_blocks(text, "}}");
    if let Some(close) = first_close {
        if first_open.map_or(true, |open| close < open) {
            out.push(Diagnostic::new(
                DiagnosticCode::ReversedBraces,
                "Reversed braces: }} appears before any matching {{",
                ctx.doc.lines.range_at(close, 2),
            ));
        }
    }
}

/// Per-block shape checks: empty interiors, missing delimiter spacing, and
/// unrecognized statement keywords.
fn block_shape(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    let doc = ctx.doc;
    let bytes = doc.text.as_bytes();
    for block in &doc.blocks {
        match block.kind {
            BlockKind::Expression => {
                let (_, content) = doc.trimmed_inner(block);
                if content.is_empty() {
                    out.push(Diagnostic::new(
                        DiagnosticCode::EmptyExpression,
                        "Empty expression braces {{ }}. Did you forget the content?",
                        doc.range_of(block),
                    ));
                }
            }
            BlockKind::Statement => {
                let (span, content) = doc.trimmed_inner(block);
                if content.is_empty() {
                    out.push(Diagnostic::new(
                        DiagnosticCode::EmptyStatement,
                        "Empty statement block {% %}. Did you forget the content?",
                        doc.range_of(block),
                    ));
                    continue;
                }

                // `{%set ...%}` parses but reads badly and trips other tools.
                let mut first = block.inner.start;
                if bytes.get(first) == Some(&b'-') {
                    first += 1;
                }
                if bytes
                    .get(first)
                    .map_or(false, |b| !b.is_ascii_whitespace())
                {
                    out.push(Diagnostic::new(
                        DiagnosticCode::MissingStatementSpace,
                        "Missing space after '{%'",
                        doc.lines.range_at(block.span.start, 2),
                    ));
                }

                let word_len = content
                    .bytes()
                    .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
                    .count();
                let word = &content[..word_len];
                let after = content[word_len..].trim_start();
                if !word.is_empty()
                    && word.as_bytes()[0].is_ascii_lowercase()
                    && !after.starts_with('(')
                    && !KEYWORDS.contains(word.to_ascii_lowercase().as_str())
                {
                    out.push(Diagnostic::new(
                        DiagnosticCode::UnknownBlockType,
                        format!("Unknown statement keyword '{word}'"),
                        doc.lines.range_at(span.start, word_len),
                    ));
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// Raw-text brace counters
// ============================================================================

/// Count `{{` / `}}` pairs. Strings only exist inside expression and
/// statement context; dict braces inside an expression track their own
/// depth; guidance comments count as one balanced pair.
pub(crate) fn count_expression_braces(text: &str) -> (u32, u32) {
    let bytes = text.as_bytes();
    let mut open = 0u32;
    let mut close = 0u32;
    let mut in_string = false;
    let mut string_char = 0u8;
    let mut in_comment = false;
    let mut in_statement = false;
    let mut in_expression = false;
    let mut brace_depth = 0u32;

    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();

        if (in_expression || in_statement) && !in_comment {
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
        }

        if !in_comment && !in_statement && !in_expression && c == b'{' && next == Some(b'#') {
            in_comment = true;
            i += 2;
            continue;
        }
        if in_comment {
            if c == b'#' && next == Some(b'}') {
                in_comment = false;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }

        if !in_statement && !in_expression && c == b'{' && next == Some(b'%') {
            in_statement = true;
            i += 2;
            continue;
        }
        if in_statement {
            if c == b'%' && next == Some(b'}') {
                in_statement = false;
                in_string = false;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }

        if !in_expression && c == b'{' && next == Some(b'{') {
            open += 1;
            in_expression = true;
            brace_depth = 0;
            in_string = false;
            i += 2;
            // Guidance comments hide their contents entirely.
            if bytes.get(i) == Some(&b'!') {
                if bytes[i..].starts_with(b"!--") {
                    if let Some(end) = find(bytes, i + 3, b"--}}") {
                        close += 1;
                        in_expression = false;
                        i = end + 4;
                    }
                } else if let Some(end) = find(bytes, i + 1, b"}}") {
                    close += 1;
                    in_expression = false;
                    i = end + 2;
                }
            }
            continue;
        }

        if in_expression {
            if c == b'{' {
                brace_depth += 1;
            } else if c == b'}' {
                if brace_depth > 0 {
                    brace_depth -= 1;
                } else if next == Some(b'}') {
                    close += 1;
                    in_expression = false;
                    in_string = false;
                    i += 2;
                    continue;
                }
            }
            i += 1;
            continue;
        }

        // Orphaned close at top level.
        if c == b'}' && next == Some(b'}') {
            close += 1;
            i += 2;
            continue;
        }
        i += 1;
    }
    (open, close)
}

/// Count `{%` / `%}` pairs, skipping strings, comments, and whole
/// expression blocks.
pub(crate) fn count_statement_braces(text: &str) -> (u32, u32) {
    let bytes = text.as_bytes();
    let mut open = 0u32;
    let mut close = 0u32;
    let mut in_string = false;
    let mut string_char = 0u8;
    let mut in_comment = false;
    let mut in_expression = false;
    let mut in_statement = false;
    let mut brace_depth = 0u32;

    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();

        if (in_expression || in_statement) && !in_comment {
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
        }

        if !in_comment && !in_expression && !in_statement && c == b'{' && next == Some(b'#') {
            in_comment = true;
            i += 2;
            continue;
        }
        if in_comment {
            if c == b'#' && next == Some(b'}') {
                in_comment = false;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }

        if !in_expression && !in_statement && c == b'{' && next == Some(b'{') {
            in_expression = true;
            brace_depth = 0;
            in_string = false;
            i += 2;
            if bytes.get(i) == Some(&b'!') {
                if bytes[i..].starts_with(b"!--") {
                    if let Some(end) = find(bytes, i + 3, b"--}}") {
                        in_expression = false;
                        i = end + 4;
                    }
                } else if let Some(end) = find(bytes, i + 1, b"}}") {
                    in_expression = false;
                    i = end + 2;
                }
            }
            continue;
        }
        if in_expression {
            if c == b'{' {
                brace_depth += 1;
            } else if c == b'}' {
                if brace_depth > 0 {
                    brace_depth -= 1;
                } else if next == Some(b'}') {
                    in_expression = false;
                    in_string = false;
                    i += 2;
                    continue;
                }
            }
            i += 1;
            continue;
        }

        if c == b'{' && next == Some(b'%') {
            open += 1;
            in_statement = true;
            i += 2;
            continue;
        }
        if in_statement && c == b'%' && next == Some(b'}') {
            close += 1;
            in_statement = false;
            in_string = false;
            i += 2;
            continue;
        }
        i += 1;
    }
    (open, close)
}

/// Offset of the last opener with no close (or the last orphaned close when
/// `more_opens` is false), by stack simulation over the raw text.
pub(crate) fn find_last_unmatched(
    text: &str,
    open_str: &str,
    close_str: &str,
    more_opens: bool,
) -> Option<usize> {
    let bytes = text.as_bytes();
    let open = open_str.as_bytes();
    let close = close_str.as_bytes();

    if more_opens {
        let mut stack: Vec<usize> = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i..].starts_with(open) {
                stack.push(i);
                i += open.len();
            } else if bytes[i..].starts_with(close) {
                stack.pop();
                i += close.len();
            } else {
                i += 1;
            }
        }
        stack.last().copied()
    } else {
        let mut stack: Vec<usize> = Vec::new();
        let mut i = bytes.len();
        while i > 0 {
            i -= 1;
            if bytes[i..].starts_with(close) {
                stack.push(i);
            } else if bytes[i..].starts_with(open) {
                stack.pop();
            }
        }
        stack.last().copied()
    }
}

/// First occurrence of `needle` outside strings, comments, and statement
/// blocks.
fn first_outside_strings_and_blocks(text: &str, needle: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let needle = needle.as_bytes();
    let mut in_string = false;
    let mut string_char = 0u8;

    let mut i = 0;
    while i + needle.len() <= bytes.len() {
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
        if c == b'{' && bytes.get(i + 1) == Some(&b'#') {
            if let Some(end) = find(bytes, i + 2, b"#}") {
                i = end + 2;
                continue;
            }
        }
        if c == b'{' && bytes.get(i + 1) == Some(&b'%') {
            if let Some(end) = find(bytes, i + 2, b"%}") {
                i = end + 2;
                continue;
            }
        }
        if bytes[i..].starts_with(needle) {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn find(bytes: &[u8], start: usize, needle: &[u8]) -> Option<usize> {
    if start >= bytes.len() || needle.len() > bytes.len() {
        return None;
    }
    (start..=bytes.len() - needle.len()).find(|&i| bytes[i..].starts_with(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_document_counts_match() {
        let text = "hi {{ x }} {% if y %}{{ z }}{% endif %}";
        assert_eq!(count_expression_braces(text), (2, 2));
        assert_eq!(count_statement_braces(text), (2, 2));
    }

    #[test]
    fn dict_braces_do_not_count() {
        let text = r#"{{ Set(name="d", value={"a": {"b": 1}}) }}"#;
        assert_eq!(count_expression_braces(text), (1, 1));
    }

    #[test]
    fn top_level_apostrophes_are_not_strings() {
        let text = "the user's name is {{ name }} and that's fine {% if x %}{% endif %}";
        assert_eq!(count_expression_braces(text), (1, 1));
        assert_eq!(count_statement_braces(text), (2, 2));
    }

    #[test]
    fn braces_inside_statement_strings_hidden() {
        let text = "{% set s = \"}}\" %}";
        assert_eq!(count_expression_braces(text), (0, 0));
    }

    #[test]
    fn guidance_comments_count_balanced() {
        assert_eq!(count_expression_braces("{{!-- note with {{ inside --}}"), (1, 1));
        assert_eq!(count_expression_braces("{{! short }}"), (1, 1));
    }

    #[test]
    fn unmatched_open_is_located() {
        let text = "{{ a }} {{ b";
        assert_eq!(count_expression_braces(text), (2, 1));
        assert_eq!(find_last_unmatched(text, "{{", "}}", true), Some(8));
    }

    #[test]
    fn orphaned_close_is_located() {
        let text = "a }} b";
        assert_eq!(find_last_unmatched(text, "{{", "}}", false), Some(2));
    }
}
