//! Convert analyzer output to LSP protocol types.
//!
//! The analysis core is 1-indexed; the protocol is 0-indexed. All
//! conversion happens here, at the boundary, in both directions.

use tower_lsp::lsp_types;

use crate::analysis::diag::{Diagnostic, Severity};
use crate::analysis::position::{Position, Range};

pub fn to_lsp_position(pos: Position) -> lsp_types::Position {
    lsp_types::Position::new(pos.line.saturating_sub(1), pos.column.saturating_sub(1))
}

pub fn to_lsp_range(range: Range) -> lsp_types::Range {
    lsp_types::Range::new(to_lsp_position(range.start), to_lsp_position(range.end))
}

pub fn from_lsp_position(pos: lsp_types::Position) -> Position {
    Position::new(pos.line + 1, pos.character + 1)
}

fn to_lsp_severity(severity: Severity) -> lsp_types::DiagnosticSeverity {
    match severity {
        Severity::Error => lsp_types::DiagnosticSeverity::ERROR,
        Severity::Warning => lsp_types::DiagnosticSeverity::WARNING,
        Severity::Hint => lsp_types::DiagnosticSeverity::HINT,
    }
}

pub fn to_lsp_diagnostic(diag: &Diagnostic) -> lsp_types::Diagnostic {
    lsp_types::Diagnostic {
        range: to_lsp_range(diag.range),
        severity: Some(to_lsp_severity(diag.severity)),
        code: Some(lsp_types::NumberOrString::String(diag.code.as_str().to_string())),
        code_description: None,
        source: Some("fable".to_string()),
        message: diag.message.clone(),
        related_information: None,
        tags: None,
        data: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::diag::DiagnosticCode;

    #[test]
    fn positions_convert_to_zero_based() {
        let lsp = to_lsp_position(Position::new(3, 7));
        assert_eq!((lsp.line, lsp.character), (2, 6));
        let back = from_lsp_position(lsp);
        assert_eq!(back, Position::new(3, 7));
    }

    #[test]
    fn diagnostic_carries_code_and_source() {
        let range = Range::new(Position::new(1, 1), Position::new(1, 4));
        let diag = Diagnostic::new(DiagnosticCode::UnknownFunction, "Unknown function 'Foo'", range);
        let lsp = to_lsp_diagnostic(&diag);
        assert_eq!(lsp.source.as_deref(), Some("fable"));
        assert_eq!(
            lsp.code,
            Some(lsp_types::NumberOrString::String("unknown-function".into()))
        );
        assert_eq!(lsp.severity, Some(lsp_types::DiagnosticSeverity::ERROR));
    }
}
