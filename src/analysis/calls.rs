//! Call-site discovery and parameter parsing.
//!
//! One pass over the arena finds every `Name(...)` occurrence in expression
//! blocks, statement blocks, and guidance control-flow tag arguments.
//! Keywords and filters are not call targets unless the name is a known
//! builtin (`Set` the action vs `set` the keyword). Parameters keep their
//! absolute value offsets so later checks can point at the exact argument.

use crate::analysis::document::{Block, BlockKind, Document};
use crate::analysis::position::{ByteSpan, Range};
use crate::registry::{RegistrySnapshot, FILTERS, GUIDANCE_FLOW_TAGS, KEYWORDS, SKILL_SUFFIX};

/// How a call target was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Builtin,
    Skill,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Keyword,
    Positional,
}

/// One parsed argument.
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Keyword name, if `name=value` form.
    pub name: Option<String>,
    /// Trimmed value text.
    pub value: String,
    pub kind: ParamKind,
    /// Absolute byte offset of the value text.
    pub value_offset: usize,
}

impl Parameter {
    /// Value with one layer of surrounding quotes removed.
    pub fn unquoted_value(&self) -> &str {
        let v = self.value.as_str();
        if v.len() >= 2 {
            let first = v.as_bytes()[0];
            let last = v.as_bytes()[v.len() - 1];
            if (first == b'"' || first == b'\'') && first == last {
                return &v[1..v.len() - 1];
            }
        }
        v
    }

    /// True when the value is a plain string literal.
    pub fn is_string_literal(&self) -> bool {
        let v = self.value.as_bytes();
        v.len() >= 2
            && (v[0] == b'"' || v[0] == b'\'')
            && v[v.len() - 1] == v[0]
    }
}

/// A discovered call site.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub name: String,
    pub kind: CallKind,
    pub params: Vec<Parameter>,
    /// Absolute byte offset of the call name.
    pub offset: usize,
    /// Range of the call name.
    pub range: Range,
    /// Index of the containing block in the arena.
    pub block: usize,
}

impl CallSite {
    pub fn keyword_param(&self, name: &str) -> Option<&Parameter> {
        self.params
            .iter()
            .find(|p| p.name.as_deref() == Some(name))
    }

    pub fn has_positional_args(&self) -> bool {
        self.params.iter().any(|p| p.kind == ParamKind::Positional)
    }
}

/// Discover every call site in the document, in source order.
pub fn extract_calls(doc: &Document, registry: &RegistrySnapshot) -> Vec<CallSite> {
    let mut out = Vec::new();
    for (index, block) in doc.blocks.iter().enumerate() {
        match block.kind {
            BlockKind::Expression | BlockKind::Statement => {
                let (span, _) = doc.trimmed_inner(block);
                scan_span(doc, registry, index, span, &mut out);
            }
            _ => {}
        }
    }
    for tag in &doc.guidance {
        if !tag.is_close && GUIDANCE_FLOW_TAGS.contains(tag.name.as_str()) {
            if let Some(args) = tag.args {
                scan_span(doc, registry, tag.block, args, &mut out);
            }
        }
    }
    out.sort_by_key(|c| c.offset);
    out
}

fn scan_span(
    doc: &Document,
    registry: &RegistrySnapshot,
    block: usize,
    span: ByteSpan,
    out: &mut Vec<CallSite>,
) {
    let bytes = doc.text.as_bytes();
    let mut in_string = false;
    let mut string_char = 0u8;
    let mut i = span.start;
    while i < span.end {
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
        if in_string || !(c.is_ascii_alphabetic() || c == b'_') {
            i += 1;
            continue;
        }
        // Word boundary: an identifier cannot start mid-word.
        if i > span.start && (bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_') {
            i += 1;
            continue;
        }
        // Method calls on objects (`parts.append(...)`) are not call targets.
        if i > span.start && bytes[i - 1] == b'.' {
            i += 1;
            continue;
        }
        let name_start = i;
        while i < span.end && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
            i += 1;
        }
        let name_end = i;
        let mut after = name_end;
        while after < span.end && (bytes[after] == b' ' || bytes[after] == b'\t') {
            after += 1;
        }
        if after >= span.end || bytes[after] != b'(' {
            continue;
        }

        let name = &doc.text[name_start..name_end];
        let lower = name.to_ascii_lowercase();
        let is_builtin = registry.builtin(name).is_some();
        if !is_builtin && (KEYWORDS.contains(lower.as_str()) || FILTERS.contains(lower.as_str())) {
            continue;
        }

        let kind = if name.ends_with(SKILL_SUFFIX) {
            CallKind::Skill
        } else if is_builtin {
            CallKind::Builtin
        } else {
            CallKind::Unknown
        };

        let params = extract_parameters(&doc.text, after, span.end);
        out.push(CallSite {
            name: name.to_string(),
            kind,
            params,
            offset: name_start,
            range: doc.lines.range(ByteSpan::new(name_start, name_end)),
            block,
        });
    }
}

/// Parse the argument list starting at an opening parenthesis. Commas split
/// only at depth 1; strings hide everything.
fn extract_parameters(text: &str, open: usize, limit: usize) -> Vec<Parameter> {
    let bytes = text.as_bytes();
    let mut params = Vec::new();
    let mut depth = 0u32;
    let mut in_string = false;
    let mut string_char = 0u8;
    let mut cur_start = open;

    let mut i = open;
    while i < limit {
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
        if !in_string {
            match c {
                b'(' => {
                    depth += 1;
                    if depth == 1 {
                        cur_start = i + 1;
                    }
                }
                b')' => {
                    if depth == 1 {
                        push_param(text, cur_start, i, &mut params);
                        return params;
                    }
                    depth = depth.saturating_sub(1);
                }
                b',' if depth == 1 => {
                    push_param(text, cur_start, i, &mut params);
                    cur_start = i + 1;
                }
                _ => {}
            }
        }
        i += 1;
    }
    params
}

fn push_param(text: &str, start: usize, end: usize, params: &mut Vec<Parameter>) {
    let (start, end) = trim_span(text, start, end);
    if start >= end {
        return;
    }
    let raw = &text[start..end];

    // Keyword form: identifier, `=`, value. Only the `=` right after the
    // name matters; a doubled `==` there is a comparison, while `==` later
    // in the value (`val=a==b`) keeps the keyword reading.
    if let Some(eq) = raw.find('=') {
        if eq > 0 && raw.as_bytes().get(eq + 1) != Some(&b'=') {
            let name = raw[..eq].trim_end();
            if is_identifier(name) {
                let mut value_start = start + eq + 1;
                let bytes = text.as_bytes();
                while value_start < end && bytes[value_start].is_ascii_whitespace() {
                    value_start += 1;
                }
                params.push(Parameter {
                    name: Some(name.to_string()),
                    value: text[value_start..end].to_string(),
                    kind: ParamKind::Keyword,
                    value_offset: value_start,
                });
                return;
            }
        }
    }
    params.push(Parameter {
        name: None,
        value: raw.to_string(),
        kind: ParamKind::Positional,
        value_offset: start,
    });
}

fn trim_span(text: &str, mut start: usize, mut end: usize) -> (usize, usize) {
    let bytes = text.as_bytes();
    while start < end && bytes[start].is_ascii_whitespace() {
        start += 1;
    }
    while end > start && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    (start, end)
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
