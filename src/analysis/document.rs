//! The parsed-document arena.
//!
//! A [`Document`] is produced once per analysis by [`scanner::scan`]
//! (crate::analysis::scanner::scan) and consumed by every downstream pass.
//! Blocks are stored flat, in source order, with byte spans into the
//! original text; nothing downstream re-tokenizes except the raw brace
//! counters, which are raw-text primitives by definition.

use crate::analysis::diag::Diagnostic;
use crate::analysis::position::{ByteSpan, LineIndex, Range};

/// Kind of a scanned block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `{{ ... }}`
    Expression,
    /// `{% ... %}`
    Statement,
    /// `{# ... #}`, `{{! ... }}` or `{{!-- ... --}}`
    Comment,
    /// Raw text between template blocks.
    Text,
    /// `{{#name ...}}`
    GuidanceOpen,
    /// `{{/name}}`
    GuidanceClose,
}

/// One scanned block. `span` covers the delimiters; `inner` is the content
/// between them, untrimmed.
#[derive(Debug, Clone, Copy)]
pub struct Block {
    pub kind: BlockKind,
    pub span: ByteSpan,
    pub inner: ByteSpan,
}

/// A parsed guidance tag, tied to its block by index.
#[derive(Debug, Clone)]
pub struct GuidanceTag {
    pub block: usize,
    pub name: String,
    pub is_close: bool,
    /// Trailing argument expression of an open tag, if any.
    pub args: Option<ByteSpan>,
}

/// Immutable result of scanning one template.
#[derive(Debug)]
pub struct Document {
    pub text: String,
    pub lines: LineIndex,
    pub blocks: Vec<Block>,
    pub guidance: Vec<GuidanceTag>,
    /// Guidance pairing violations found during the scan.
    pub pairing: Vec<Diagnostic>,
}

impl Document {
    /// Raw text of a span.
    pub fn slice(&self, span: ByteSpan) -> &str {
        &self.text[span.start..span.end]
    }

    /// Block content with surrounding whitespace and trim markers
    /// (`-` and `~`) removed. The returned span stays absolute.
    pub fn trimmed_inner(&self, block: &Block) -> (ByteSpan, &str) {
        let mut start = block.inner.start;
        let mut end = block.inner.end;
        let bytes = self.text.as_bytes();

        while start < end && bytes[start].is_ascii_whitespace() {
            start += 1;
        }
        if start < end && (bytes[start] == b'-' || bytes[start] == b'~') {
            start += 1;
            while start < end && bytes[start].is_ascii_whitespace() {
                start += 1;
            }
        }
        while end > start && bytes[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
        if end > start && (bytes[end - 1] == b'-' || bytes[end - 1] == b'~') {
            // Only a marker when detached from the content: `{%- set x -%}`.
            if end - 1 == start || bytes[end - 2].is_ascii_whitespace() {
                end -= 1;
                while end > start && bytes[end - 1].is_ascii_whitespace() {
                    end -= 1;
                }
            }
        }
        let span = ByteSpan::new(start, end);
        (span, &self.text[start..end])
    }

    /// First word of a statement block, lowercased. `None` for empty blocks.
    pub fn statement_keyword(&self, block: &Block) -> Option<String> {
        let (_, content) = self.trimmed_inner(block);
        let word: String = content
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if word.is_empty() {
            None
        } else {
            Some(word.to_ascii_lowercase())
        }
    }

    pub fn range_of(&self, block: &Block) -> Range {
        self.lines.range(block.span)
    }

    /// Blocks of one kind, in source order.
    pub fn blocks_of(&self, kind: BlockKind) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }
}
