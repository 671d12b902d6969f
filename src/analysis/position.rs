//! Source positions and the line-start index.
//!
//! All analysis passes share one `LineIndex` per document so that
//! offset-to-position conversion is computed once and stays exact; every
//! downstream range depends on it.

/// A source position. Both `line` and `column` are 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A half-open span of source text, `[start, end)`, as byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSpan {
    pub start: usize,
    pub end: usize,
}

impl ByteSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// A start/end position pair, 1-indexed, end-exclusive on columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A degenerate range at the start of the document.
    pub fn document_start() -> Self {
        Self::new(Position::new(1, 1), Position::new(1, 1))
    }
}

/// Precomputed byte offsets of each line start, for exact and cheap
/// offset-to-position conversion via binary search.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    text_len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            line_starts,
            text_len: text.len(),
        }
    }

    /// Number of lines in the document (at least 1).
    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }

    /// Byte offset at which the given 1-indexed line starts.
    pub fn line_start(&self, line: u32) -> Option<usize> {
        self.line_starts.get(line.saturating_sub(1) as usize).copied()
    }

    /// Convert a byte offset to a 1-indexed position. Offsets past the end
    /// of the text clamp to the final position.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text_len);
        let line = self.line_starts.partition_point(|&s| s <= offset) - 1;
        Position {
            line: line as u32 + 1,
            column: (offset - self.line_starts[line]) as u32 + 1,
        }
    }

    /// Convert a byte span to a position range.
    pub fn range(&self, span: ByteSpan) -> Range {
        Range {
            start: self.position(span.start),
            end: self.position(span.end),
        }
    }

    /// Range covering `len` bytes starting at `offset` (single-line spans).
    pub fn range_at(&self, offset: usize, len: usize) -> Range {
        self.range(ByteSpan::new(offset, offset + len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_of_offsets() {
        let idx = LineIndex::new("ab\ncde\n\nf");
        assert_eq!(idx.position(0), Position::new(1, 1));
        assert_eq!(idx.position(1), Position::new(1, 2));
        assert_eq!(idx.position(3), Position::new(2, 1));
        assert_eq!(idx.position(6), Position::new(2, 4));
        assert_eq!(idx.position(7), Position::new(3, 1));
        assert_eq!(idx.position(8), Position::new(4, 1));
    }

    #[test]
    fn clamps_past_end() {
        let idx = LineIndex::new("ab");
        assert_eq!(idx.position(100), Position::new(1, 3));
    }

    #[test]
    fn line_starts() {
        let idx = LineIndex::new("one\ntwo\n");
        assert_eq!(idx.line_count(), 3);
        assert_eq!(idx.line_start(1), Some(0));
        assert_eq!(idx.line_start(2), Some(4));
        assert_eq!(idx.line_start(3), Some(8));
        assert_eq!(idx.line_start(4), None);
    }
}
