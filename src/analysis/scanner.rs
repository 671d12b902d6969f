//! Lexical scanner: one pass over the raw text producing the block arena
//! and the guidance pairing diagnostics.
//!
//! Delimiter matching is string-aware: quotes inside a block hide braces
//! from depth tracking, and a `\`-escaped quote does not toggle string
//! state. An unterminated opener is left as raw text; the structural brace
//! counters report the imbalance.

use crate::analysis::diag::{Diagnostic, DiagnosticCode};
use crate::analysis::document::{Block, BlockKind, Document, GuidanceTag};
use crate::analysis::position::{ByteSpan, LineIndex};
use crate::registry::GUIDANCE_BLOCKS;

/// Scan a template into its block arena.
pub fn scan(text: &str) -> Document {
    let lines = LineIndex::new(text);
    let bytes = text.as_bytes();
    let mut blocks: Vec<Block> = Vec::new();
    let mut guidance: Vec<GuidanceTag> = Vec::new();
    let mut pos = 0usize;
    let mut text_start = 0usize;

    macro_rules! flush_text {
        ($upto:expr) => {
            if $upto > text_start {
                blocks.push(Block {
                    kind: BlockKind::Text,
                    span: ByteSpan::new(text_start, $upto),
                    inner: ByteSpan::new(text_start, $upto),
                });
            }
        };
    }

    while pos < bytes.len() {
        if bytes[pos] == b'{' && pos + 1 < bytes.len() {
            match bytes[pos + 1] {
                b'{' => {
                    if let Some(block_end) = scan_expression_like(text, pos, &mut blocks, &mut guidance)
                    {
                        flush_text!(pos);
                        pos = block_end;
                        text_start = pos;
                        continue;
                    }
                }
                b'%' => {
                    if let Some(close) = find_closing_statement(bytes, pos + 2) {
                        flush_text!(pos);
                        blocks.push(Block {
                            kind: BlockKind::Statement,
                            span: ByteSpan::new(pos, close + 2),
                            inner: ByteSpan::new(pos + 2, close),
                        });
                        pos = close + 2;
                        text_start = pos;
                        continue;
                    }
                }
                b'#' => {
                    if let Some(close) = find_literal(bytes, pos + 2, b"#}") {
                        flush_text!(pos);
                        blocks.push(Block {
                            kind: BlockKind::Comment,
                            span: ByteSpan::new(pos, close + 2),
                            inner: ByteSpan::new(pos + 2, close),
                        });
                        pos = close + 2;
                        text_start = pos;
                        continue;
                    }
                }
                _ => {}
            }
        }
        pos += 1;
    }
    flush_text!(bytes.len());

    let pairing = pair_guidance(text, &lines, &blocks, &guidance);

    Document {
        text: text.to_string(),
        lines,
        blocks,
        guidance,
        pairing,
    }
}

/// Handle a `{{`-opened block: guidance open/close, guidance comment, or a
/// plain expression. Returns the offset just past the block, or `None` when
/// no closing delimiter exists.
fn scan_expression_like(
    text: &str,
    pos: usize,
    blocks: &mut Vec<Block>,
    guidance: &mut Vec<GuidanceTag>,
) -> Option<usize> {
    let bytes = text.as_bytes();
    let inner_start = pos + 2;

    // Skip a guidance trim marker and whitespace to find the tag sigil.
    let mut probe = inner_start;
    if probe < bytes.len() && bytes[probe] == b'~' {
        probe += 1;
    }
    while probe < bytes.len() && bytes[probe].is_ascii_whitespace() {
        probe += 1;
    }

    let sigil = bytes.get(probe).copied();

    // Guidance comments: `{{!-- ... --}}` and `{{! ... }}`.
    if sigil == Some(b'!') {
        if text[probe..].starts_with("!--") {
            let close = find_literal(bytes, probe + 3, b"--}}")?;
            blocks.push(Block {
                kind: BlockKind::Comment,
                span: ByteSpan::new(pos, close + 4),
                inner: ByteSpan::new(probe + 3, close),
            });
            return Some(close + 4);
        }
        let close = find_closing_brace(bytes, inner_start)?;
        blocks.push(Block {
            kind: BlockKind::Comment,
            span: ByteSpan::new(pos, close + 2),
            inner: ByteSpan::new(probe + 1, close),
        });
        return Some(close + 2);
    }

    if sigil == Some(b'#') || sigil == Some(b'/') {
        let name_start = probe + 1;
        let name_end = ident_end(bytes, name_start);
        let name = &text[name_start..name_end];
        if !name.is_empty() && GUIDANCE_BLOCKS.contains(name) {
            let close = find_closing_brace(bytes, inner_start)?;
            let is_close = sigil == Some(b'/');
            let kind = if is_close {
                BlockKind::GuidanceClose
            } else {
                BlockKind::GuidanceOpen
            };
            let args = if !is_close {
                let mut arg_start = name_end;
                while arg_start < close && bytes[arg_start].is_ascii_whitespace() {
                    arg_start += 1;
                }
                let mut arg_end = close;
                while arg_end > arg_start && bytes[arg_end - 1].is_ascii_whitespace() {
                    arg_end -= 1;
                }
                if arg_end > arg_start && bytes[arg_end - 1] == b'~' {
                    arg_end -= 1;
                    while arg_end > arg_start && bytes[arg_end - 1].is_ascii_whitespace() {
                        arg_end -= 1;
                    }
                }
                (arg_end > arg_start).then(|| ByteSpan::new(arg_start, arg_end))
            } else {
                None
            };
            blocks.push(Block {
                kind,
                span: ByteSpan::new(pos, close + 2),
                inner: ByteSpan::new(inner_start, close),
            });
            guidance.push(GuidanceTag {
                block: blocks.len() - 1,
                name: name.to_string(),
                is_close,
                args,
            });
            return Some(close + 2);
        }
    }

    let close = find_closing_brace(bytes, inner_start)?;
    blocks.push(Block {
        kind: BlockKind::Expression,
        span: ByteSpan::new(pos, close + 2),
        inner: ByteSpan::new(inner_start, close),
    });
    Some(close + 2)
}

fn ident_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    i
}

/// Find `}}` at bracket depth zero, skipping string literals. Nested
/// brackets of any flavor raise the depth, so a dict literal's `}` pairs
/// with its opener instead of ending the block.
fn find_closing_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0u32;
    let mut in_string = false;
    let mut string_char = 0u8;

    let mut i = start;
    while i < bytes.len() {
        let c = bytes[i];
        if (c == b'"' || c == b'\'') && (i == 0 || bytes[i - 1] != b'\\') {
            if !in_string {
                in_string = true;
                string_char = c;
            } else if c == string_char {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if in_string {
            i += 1;
            continue;
        }
        match c {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if depth == 0 && i + 1 < bytes.len() && bytes[i] == b'}' && bytes[i + 1] == b'}' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Find `%}`, skipping string literals. Statements do not nest brackets.
fn find_closing_statement(bytes: &[u8], start: usize) -> Option<usize> {
    let mut in_string = false;
    let mut string_char = 0u8;

    let mut i = start;
    while i + 1 < bytes.len() {
        let c = bytes[i];
        if (c == b'"' || c == b'\'') && (i == 0 || bytes[i - 1] != b'\\') {
            if !in_string {
                in_string = true;
                string_char = c;
            } else if c == string_char {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if in_string {
            i += 1;
            continue;
        }
        if bytes[i] == b'%' && bytes[i + 1] == b'}' {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn find_literal(bytes: &[u8], start: usize, needle: &[u8]) -> Option<usize> {
    if needle.len() > bytes.len() {
        return None;
    }
    (start..=bytes.len() - needle.len()).find(|&i| &bytes[i..i + needle.len()] == needle)
}

/// Pair guidance open/close tags with an explicit stack. A mismatched close
/// reports against the found tag and leaves the expected entry on the stack,
/// so the still-open block also surfaces as unclosed.
fn pair_guidance(
    text: &str,
    lines: &LineIndex,
    blocks: &[Block],
    guidance: &[GuidanceTag],
) -> Vec<Diagnostic> {
    let _ = text;
    let mut diags = Vec::new();
    let mut stack: Vec<&GuidanceTag> = Vec::new();

    for tag in guidance {
        let range = lines.range(blocks[tag.block].span);
        if !tag.is_close {
            stack.push(tag);
            continue;
        }
        match stack.last() {
            None => {
                diags.push(Diagnostic::new(
                    DiagnosticCode::UnexpectedBlockClose,
                    format!(
                        "Unexpected closing block '{{{{/{}}}}}' with no open block",
                        tag.name
                    ),
                    range,
                ));
            }
            Some(top) if top.name != tag.name => {
                diags.push(Diagnostic::new(
                    DiagnosticCode::MismatchedBlockClose,
                    format!(
                        "Mismatched close: expected '{{{{/{}}}}}' but found '{{{{/{}}}}}'",
                        top.name, tag.name
                    ),
                    range,
                ));
            }
            Some(_) => {
                stack.pop();
            }
        }
    }

    for unclosed in stack {
        let range = lines.range(blocks[unclosed.block].span);
        diags.push(Diagnostic::new(
            DiagnosticCode::UnclosedBlock,
            format!(
                "Unclosed guidance block '{{{{#{}}}}}', missing '{{{{/{}}}}}'",
                unclosed.name, unclosed.name
            ),
            range,
        ));
    }
    diags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::position::Position;

    fn kinds(doc: &Document) -> Vec<BlockKind> {
        doc.blocks.iter().map(|b| b.kind).collect()
    }

    #[test]
    fn scans_all_block_kinds() {
        let doc = scan("a {{ x }} b {% if y %} c {# note #} d");
        assert_eq!(
            kinds(&doc),
            vec![
                BlockKind::Text,
                BlockKind::Expression,
                BlockKind::Text,
                BlockKind::Statement,
                BlockKind::Text,
                BlockKind::Comment,
                BlockKind::Text,
            ]
        );
        let expr = &doc.blocks[1];
        assert_eq!(doc.trimmed_inner(expr).1, "x");
    }

    #[test]
    fn dict_literal_does_not_end_expression() {
        let doc = scan(r#"{{ Set(name="d", value={"a": 1}) }}"#);
        assert_eq!(doc.blocks.len(), 1);
        assert_eq!(doc.blocks[0].kind, BlockKind::Expression);
        assert!(doc.slice(doc.blocks[0].inner).contains("\"a\": 1"));
    }

    #[test]
    fn braces_inside_strings_are_hidden() {
        let doc = scan(r#"{{ SendMessage(message="look: }} done") }}"#);
        assert_eq!(doc.blocks.len(), 1);
        assert!(doc.slice(doc.blocks[0].inner).contains("done"));
    }

    #[test]
    fn guidance_tags_are_parsed() {
        let doc = scan("{{#system ~}}hello{{~/system}}");
        assert_eq!(doc.guidance.len(), 2);
        assert_eq!(doc.guidance[0].name, "system");
        assert!(!doc.guidance[0].is_close);
        assert!(doc.guidance[1].is_close);
        assert!(doc.pairing.is_empty());
    }

    #[test]
    fn guidance_open_args_are_captured() {
        let doc = scan("{{#if ready ~}}x{{/if}}");
        let open = &doc.guidance[0];
        let args = open.args.expect("args");
        assert_eq!(doc.slice(args), "ready");
    }

    #[test]
    fn unknown_hash_name_is_plain_expression() {
        let doc = scan("{{#widget}}");
        assert_eq!(doc.guidance.len(), 0);
        assert_eq!(doc.blocks[0].kind, BlockKind::Expression);
    }

    #[test]
    fn unclosed_guidance_block_reported_at_open_tag() {
        let doc = scan("{{#user}}\ntext");
        assert_eq!(doc.pairing.len(), 1);
        assert_eq!(doc.pairing[0].code, DiagnosticCode::UnclosedBlock);
        assert_eq!(doc.pairing[0].range.start, Position::new(1, 1));
    }

    #[test]
    fn mismatched_close_keeps_expected_entry() {
        let doc = scan("{{#system}}{{/user}}");
        let codes: Vec<_> = doc.pairing.iter().map(|d| d.code).collect();
        assert!(codes.contains(&DiagnosticCode::MismatchedBlockClose));
        // `system` stays open and is reported as unclosed too.
        assert!(codes.contains(&DiagnosticCode::UnclosedBlock));
    }

    #[test]
    fn close_without_open_is_unexpected() {
        let doc = scan("{{/system}}");
        assert_eq!(doc.pairing[0].code, DiagnosticCode::UnexpectedBlockClose);
    }

    #[test]
    fn guidance_comments_scan_as_comments() {
        let doc = scan("{{!-- hidden --}}{{! also hidden }}");
        assert_eq!(kinds(&doc), vec![BlockKind::Comment, BlockKind::Comment]);
    }

    #[test]
    fn unterminated_opener_is_text() {
        let doc = scan("before {{ x");
        assert_eq!(kinds(&doc), vec![BlockKind::Text]);
    }

    #[test]
    fn statement_trim_markers_stripped() {
        let doc = scan("{%- set a = 1 -%}");
        let stmt = &doc.blocks[0];
        assert_eq!(doc.trimmed_inner(stmt).1, "set a = 1");
        assert_eq!(doc.statement_keyword(stmt).as_deref(), Some("set"));
    }
}
