//! Semantic token classification for editor highlighting.
//!
//! Merges three candidate sources — the symbol table's definitions and
//! references, comment blocks, and a mini-lex of expression/statement
//! interiors — then deduplicates overlapping candidates by specificity and
//! delta-encodes the result for the protocol layer. Colors come from the
//! editor theme; this module only names what each span is.

use crate::analysis::document::{BlockKind, Document};
use crate::analysis::position::ByteSpan;
use crate::analysis::table::{SymbolTable, VarSource};
use crate::registry::{RegistrySnapshot, FILTERS, GUIDANCE_FLOW_TAGS, KEYWORDS};

// ============================================================================
// Legend
// ============================================================================

/// Token type names, in ordinal order. Registered with the client as the
/// semantic token legend.
pub const TOKEN_TYPES: [&str; 9] = [
    "function",
    "variable",
    "property",
    "parameter",
    "keyword",
    "comment",
    "string",
    "number",
    "operator",
];

/// Token modifier names, in bit order.
pub const TOKEN_MODIFIERS: [&str; 2] = ["declaration", "defaultLibrary"];

pub const MOD_DECLARATION: u32 = 1 << 0;
pub const MOD_DEFAULT_LIBRARY: u32 = 1 << 1;

/// The closed set of token kinds. Discriminants are the legend ordinals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Function = 0,
    Variable = 1,
    Property = 2,
    Parameter = 3,
    Keyword = 4,
    Comment = 5,
    String = 6,
    Number = 7,
    Operator = 8,
}

impl TokenKind {
    /// Rank used when two candidates share a start position; the higher
    /// one survives. Modifier-bearing candidates get a flat bonus on top.
    fn specificity(self) -> u32 {
        match self {
            TokenKind::Comment => 10,
            TokenKind::Property => 8,
            TokenKind::Parameter => 7,
            TokenKind::Function => 6,
            TokenKind::Variable => 5,
            TokenKind::Keyword => 4,
            TokenKind::String => 3,
            TokenKind::Number => 2,
            TokenKind::Operator => 1,
        }
    }
}

/// One classified span. `line` and `column` are 1-indexed, like every
/// other position in the analysis core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemanticToken {
    pub line: u32,
    pub column: u32,
    pub length: u32,
    pub kind: TokenKind,
    pub modifiers: u32,
}

// ============================================================================
// Classification
// ============================================================================

/// Guidance helper names treated as keywords by the mini-lexer.
const HELPER_KEYWORDS: [&str; 6] = ["gen", "geneach", "select", "each", "unless", "do"];

/// Classify every token in the document. Output is deduplicated and
/// sorted ascending by position.
pub fn classify(
    doc: &Document,
    table: &SymbolTable,
    registry: &RegistrySnapshot,
) -> Vec<SemanticToken> {
    let mut tokens = Vec::new();

    collect_definitions(table, &mut tokens);
    collect_references(table, &mut tokens);
    collect_comments(doc, &mut tokens);
    collect_block_interiors(doc, registry, &mut tokens);

    dedup_and_sort(tokens)
}

/// Definition sites, with the declaration modifier. Synthetic spans are
/// skipped: parameters have no source position, the loop context variable
/// points at the `for` keyword, and `Set(name="x")` definitions sit inside
/// a string literal the mini-lexer already covers as one string token.
fn collect_definitions(table: &SymbolTable, out: &mut Vec<SemanticToken>) {
    for defs in table.definitions.values() {
        for def in defs {
            if matches!(
                def.source,
                VarSource::Parameter | VarSource::ForLoopContext | VarSource::SetAction
            ) {
                continue;
            }
            out.push(SemanticToken {
                line: def.line,
                column: def.column,
                length: def.name.len() as u32,
                kind: TokenKind::Variable,
                modifiers: MOD_DECLARATION,
            });
        }
    }
}

/// Reference sites, plus one property token per dotted-chain segment.
fn collect_references(table: &SymbolTable, out: &mut Vec<SemanticToken>) {
    for reference in &table.references {
        out.push(SemanticToken {
            line: reference.line,
            column: reference.column,
            length: reference.name.len() as u32,
            kind: TokenKind::Variable,
            modifiers: 0,
        });
        let mut column = reference.column + reference.name.len() as u32 + 1;
        for property in &reference.property_chain {
            out.push(SemanticToken {
                line: reference.line,
                column,
                length: property.len() as u32,
                kind: TokenKind::Property,
                modifiers: 0,
            });
            column += property.len() as u32 + 1;
        }
    }
}

/// Comment blocks, one token per physical line so multi-line comments
/// render without gaps.
fn collect_comments(doc: &Document, out: &mut Vec<SemanticToken>) {
    for block in doc.blocks_of(BlockKind::Comment) {
        let start = doc.lines.position(block.span.start);
        for (i, line_text) in doc.slice(block.span).split('\n').enumerate() {
            let text = line_text.strip_suffix('\r').unwrap_or(line_text);
            let (column, length) = if i == 0 {
                (start.column, text.len())
            } else {
                (1, text.len())
            };
            if length == 0 {
                continue;
            }
            out.push(SemanticToken {
                line: start.line + i as u32,
                column,
                length: length as u32,
                kind: TokenKind::Comment,
                modifiers: 0,
            });
        }
    }
}

/// Expression and statement interiors, plus the trailing expression of
/// guidance control-flow tags. Structural guidance tags (role markers)
/// contribute nothing for the tag name.
fn collect_block_interiors(
    doc: &Document,
    registry: &RegistrySnapshot,
    out: &mut Vec<SemanticToken>,
) {
    for block in &doc.blocks {
        match block.kind {
            BlockKind::Expression | BlockKind::Statement => {
                let (span, _) = doc.trimmed_inner(block);
                lex_interior(doc, registry, span, out);
            }
            _ => {}
        }
    }
    for tag in &doc.guidance {
        if tag.is_close || !GUIDANCE_FLOW_TAGS.contains(tag.name.as_str()) {
            continue;
        }
        if let Some(args) = tag.args {
            lex_interior(doc, registry, args, out);
        }
    }
}

// ============================================================================
// Mini-lexer
// ============================================================================

fn lex_interior(
    doc: &Document,
    registry: &RegistrySnapshot,
    span: ByteSpan,
    out: &mut Vec<SemanticToken>,
) {
    let bytes = doc.text.as_bytes();
    let mut i = span.start;

    while i < span.end {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if c == b'"' || c == b'\'' {
            let len = string_len(bytes, i, span.end);
            push(doc, out, i, len, TokenKind::String, 0);
            i += len;
            continue;
        }
        if let Some(len) = number_len(bytes, i, span) {
            push(doc, out, i, len, TokenKind::Number, 0);
            i += len;
            continue;
        }
        if let Some(len) = operator_len(bytes, i, span.end) {
            push(doc, out, i, len, TokenKind::Operator, 0);
            i += len;
            continue;
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < span.end && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let name = &doc.text[start..i];
            let (kind, modifiers) = classify_ident(bytes, span, start, i, name, registry);
            push(doc, out, start, i - start, kind, modifiers);
            continue;
        }
        // Punctuation the legend has no kind for: parens, commas, brackets.
        i += 1;
    }
}

/// Refine an identifier by its local context, in priority order.
fn classify_ident(
    bytes: &[u8],
    span: ByteSpan,
    start: usize,
    end: usize,
    name: &str,
    registry: &RegistrySnapshot,
) -> (TokenKind, u32) {
    let mut after = end;
    while after < span.end && (bytes[after] == b' ' || bytes[after] == b'\t') {
        after += 1;
    }
    let followed_by_paren = after < span.end && bytes[after] == b'(';
    let followed_by_equals =
        after < span.end && bytes[after] == b'=' && bytes.get(after + 1) != Some(&b'=');

    if start > span.start && bytes[start - 1] == b'.' {
        return (TokenKind::Property, 0);
    }
    if followed_by_equals && !followed_by_paren {
        return (TokenKind::Parameter, 0);
    }
    let lower = name.to_ascii_lowercase();
    if KEYWORDS.contains(lower.as_str()) || HELPER_KEYWORDS.contains(&lower.as_str()) {
        return (TokenKind::Keyword, 0);
    }
    let is_builtin = registry.builtin(name).is_some();
    if followed_by_paren || preceded_by_pipe(bytes, span.start, start) {
        let modifiers = if is_builtin { MOD_DEFAULT_LIBRARY } else { 0 };
        return (TokenKind::Function, modifiers);
    }
    if is_builtin {
        return (TokenKind::Function, MOD_DEFAULT_LIBRARY);
    }
    if registry.skill(name).is_some() || FILTERS.contains(lower.as_str()) {
        return (TokenKind::Function, 0);
    }
    (TokenKind::Variable, 0)
}

/// Length of a string literal starting at `i`, including both quotes.
/// Unterminated strings run to the end of the span.
fn string_len(bytes: &[u8], i: usize, end: usize) -> usize {
    let quote = bytes[i];
    let mut j = i + 1;
    while j < end {
        if bytes[j] == b'\\' {
            j += 2;
            continue;
        }
        if bytes[j] == quote {
            return j + 1 - i;
        }
        j += 1;
    }
    end - i
}

/// Length of a numeric literal at `i`, or `None` when the position does
/// not start one. A leading `-` is part of the number unless the previous
/// character continues an identifier or dotted chain.
fn number_len(bytes: &[u8], i: usize, span: ByteSpan) -> Option<usize> {
    if i > span.start {
        let prev = bytes[i - 1];
        if prev.is_ascii_alphanumeric() || prev == b'_' || prev == b'.' {
            return None;
        }
    }
    let mut j = i;
    if bytes[j] == b'-' {
        j += 1;
    }
    let digits_start = j;
    while j < span.end && bytes[j].is_ascii_digit() {
        j += 1;
    }
    if j == digits_start {
        return None;
    }
    if j + 1 < span.end && bytes[j] == b'.' && bytes[j + 1].is_ascii_digit() {
        j += 1;
        while j < span.end && bytes[j].is_ascii_digit() {
            j += 1;
        }
    }
    Some(j - i)
}

/// Length of an operator at `i`, longest match first. A single `=` or `|`
/// counts; `==` style pairs are matched whole.
fn operator_len(bytes: &[u8], i: usize, end: usize) -> Option<usize> {
    let next = if i + 1 < end { bytes[i + 1] } else { 0 };
    match bytes[i] {
        b'=' | b'!' | b'<' | b'>' if next == b'=' => Some(2),
        b'*' if next == b'*' => Some(2),
        b'/' if next == b'/' => Some(2),
        b'=' | b'<' | b'>' | b'+' | b'-' | b'*' | b'/' | b'%' | b'~' | b'|' => Some(1),
        _ => None,
    }
}

fn preceded_by_pipe(bytes: &[u8], from: usize, pos: usize) -> bool {
    let mut i = pos;
    while i > from {
        match bytes[i - 1] {
            b' ' | b'\t' => i -= 1,
            b'|' => return true,
            _ => return false,
        }
    }
    false
}

fn push(
    doc: &Document,
    out: &mut Vec<SemanticToken>,
    offset: usize,
    len: usize,
    kind: TokenKind,
    modifiers: u32,
) {
    let pos = doc.lines.position(offset);
    out.push(SemanticToken {
        line: pos.line,
        column: pos.column,
        length: len as u32,
        kind,
        modifiers,
    });
}

// ============================================================================
// Deduplication and encoding
// ============================================================================

/// At each start position keep the highest-specificity candidate, then
/// sort ascending. Ties keep the earlier-collected candidate, so table
/// tokens beat mini-lexer tokens of the same rank.
fn dedup_and_sort(tokens: Vec<SemanticToken>) -> Vec<SemanticToken> {
    use std::collections::HashMap;

    let mut best: HashMap<(u32, u32), SemanticToken> = HashMap::new();
    for token in tokens {
        let key = (token.line, token.column);
        match best.get(&key) {
            None => {
                best.insert(key, token);
            }
            Some(existing) => {
                let held = existing.kind.specificity()
                    + if existing.modifiers != 0 { 20 } else { 0 };
                let candidate =
                    token.kind.specificity() + if token.modifiers != 0 { 20 } else { 0 };
                if candidate > held {
                    best.insert(key, token);
                }
            }
        }
    }

    let mut result: Vec<SemanticToken> = best.into_values().collect();
    result.sort_by_key(|t| (t.line, t.column));
    result
}

/// Delta-encode a sorted token list into the protocol's flat `u32` stream:
/// five values per token, positions 0-based, columns absolute after a line
/// change and relative within a line.
pub fn encode(tokens: &[SemanticToken]) -> Vec<u32> {
    let mut data = Vec::with_capacity(tokens.len() * 5);
    let mut prev_line = 1u32;
    let mut prev_column = 1u32;
    for token in tokens {
        let delta_line = token.line - prev_line;
        let delta_column = if delta_line == 0 {
            token.column - prev_column
        } else {
            token.column - 1
        };
        data.extend_from_slice(&[
            delta_line,
            delta_column,
            token.length,
            token.kind as u32,
            token.modifiers,
        ]);
        prev_line = token.line;
        prev_column = token.column;
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::calls::extract_calls;
    use crate::analysis::scanner::scan;
    use crate::analysis::table::build_table;

    fn classify_text(text: &str) -> Vec<SemanticToken> {
        let registry = RegistrySnapshot::with_defaults();
        let doc = scan(text);
        let calls = extract_calls(&doc, &registry);
        let table = build_table(&doc, &registry, &calls, &[]);
        classify(&doc, &table, &registry)
    }

    fn find(tokens: &[SemanticToken], line: u32, column: u32) -> SemanticToken {
        tokens
            .iter()
            .copied()
            .find(|t| t.line == line && t.column == column)
            .unwrap_or_else(|| panic!("no token at {line}:{column}: {tokens:?}"))
    }

    #[test]
    fn set_statement_tokens() {
        let tokens = classify_text("{% set x = \"hi\" %}");
        // set keyword, x declaration, = operator, "hi" string
        assert_eq!(find(&tokens, 1, 4).kind, TokenKind::Keyword);
        let x = find(&tokens, 1, 8);
        assert_eq!(x.kind, TokenKind::Variable);
        assert_eq!(x.modifiers, MOD_DECLARATION);
        assert_eq!(find(&tokens, 1, 10).kind, TokenKind::Operator);
        let lit = find(&tokens, 1, 12);
        assert_eq!(lit.kind, TokenKind::String);
        assert_eq!(lit.length, 4);
    }

    #[test]
    fn builtin_call_gets_default_library_modifier() {
        let tokens = classify_text("{{GetUser(field=\"name\")}}");
        let call = find(&tokens, 1, 3);
        assert_eq!(call.kind, TokenKind::Function);
        assert_eq!(call.modifiers, MOD_DEFAULT_LIBRARY);
        assert_eq!(find(&tokens, 1, 11).kind, TokenKind::Parameter);
    }

    #[test]
    fn filter_after_pipe_is_function() {
        let tokens = classify_text("{% set name = \"x\" %}\n{{ name | upper }}");
        assert_eq!(find(&tokens, 2, 4).kind, TokenKind::Variable);
        assert_eq!(find(&tokens, 2, 9).kind, TokenKind::Operator);
        assert_eq!(find(&tokens, 2, 11).kind, TokenKind::Function);
    }

    #[test]
    fn property_chain_tokens() {
        let tokens = classify_text("{% set act = GetTriggeredAct() %}\n{{ act.arguments.name }}");
        assert_eq!(find(&tokens, 2, 4).kind, TokenKind::Variable);
        assert_eq!(find(&tokens, 2, 8).kind, TokenKind::Property);
        assert_eq!(find(&tokens, 2, 18).kind, TokenKind::Property);
    }

    #[test]
    fn multiline_comment_one_token_per_line() {
        let tokens = classify_text("{# first\nsecond #}");
        let first = find(&tokens, 1, 1);
        assert_eq!(first.kind, TokenKind::Comment);
        assert_eq!(first.length, 8);
        let second = find(&tokens, 2, 1);
        assert_eq!(second.kind, TokenKind::Comment);
        assert_eq!(second.length, 9);
    }

    #[test]
    fn declaration_outranks_mini_lexer_parameter() {
        // `x` before `=` would be a parameter to the mini-lexer, but the
        // definition token at the same position carries a modifier and wins.
        let tokens = classify_text("{% set x = 1 %}");
        let x = find(&tokens, 1, 8);
        assert_eq!(x.kind, TokenKind::Variable);
        assert_eq!(x.modifiers, MOD_DECLARATION);
        // Exactly one token survives at the position.
        assert_eq!(
            tokens.iter().filter(|t| t.line == 1 && t.column == 8).count(),
            1
        );
    }

    #[test]
    fn guidance_flow_tag_expression_is_lexed() {
        let tokens = classify_text("{{#if is_ready}}yes{{/if}}");
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::Variable && t.line == 1 && t.column == 7));
        // The tag name itself contributes nothing.
        assert!(!tokens.iter().any(|t| t.line == 1 && t.column == 4));
    }

    #[test]
    fn role_tags_contribute_nothing() {
        let tokens = classify_text("{{#system}}prompt{{/system}}");
        assert!(tokens.is_empty(), "{tokens:?}");
    }

    #[test]
    fn numbers_and_negative_numbers() {
        let tokens = classify_text("{% set n = -1.5 %}");
        let num = find(&tokens, 1, 12);
        assert_eq!(num.kind, TokenKind::Number);
        assert_eq!(num.length, 4);
    }

    #[test]
    fn encode_deltas() {
        let tokens = vec![
            SemanticToken { line: 1, column: 4, length: 3, kind: TokenKind::Keyword, modifiers: 0 },
            SemanticToken {
                line: 1,
                column: 8,
                length: 1,
                kind: TokenKind::Variable,
                modifiers: MOD_DECLARATION,
            },
            SemanticToken { line: 3, column: 2, length: 5, kind: TokenKind::String, modifiers: 0 },
        ];
        assert_eq!(
            encode(&tokens),
            vec![0, 3, 3, 4, 0, 0, 4, 1, 1, 1, 2, 1, 5, 6, 0]
        );
    }

    #[test]
    fn output_is_sorted_and_deterministic() {
        let text = "{% set a = 1 %}\n{{ a }}\n{# note #}\n{{SendMessage(message=a)}}";
        let first = classify_text(text);
        let second = classify_text(text);
        assert_eq!(first, second);
        assert!(first.windows(2).all(|w| (w[0].line, w[0].column) < (w[1].line, w[1].column)));
    }
}
