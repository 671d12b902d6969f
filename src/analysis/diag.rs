//! Diagnostic model: severities, the fixed rule catalog, and the
//! `Diagnostic` record every check emits.
//!
//! The catalog is closed: output formats (SARIF in particular) enumerate
//! `DiagnosticCode::ALL` up front, so adding a check means adding a code
//! here first.

use std::fmt;

use crate::analysis::position::Range;

// ============================================================================
// Severity
// ============================================================================

/// Diagnostic severity, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
    Hint,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Hint => "hint",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Rule catalog
// ============================================================================

macro_rules! diagnostic_codes {
    ($($variant:ident => ($code:literal, $severity:ident, $summary:literal),)*) => {
        /// Every rule the analyzer can report, with its stable string id.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum DiagnosticCode {
            $($variant,)*
        }

        impl DiagnosticCode {
            /// Stable kebab-case rule id, used in all output formats.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(DiagnosticCode::$variant => $code,)*
                }
            }

            /// Default severity for the rule. Individual checks may
            /// downgrade (never upgrade) at the emission site.
            pub fn severity(&self) -> Severity {
                match self {
                    $(DiagnosticCode::$variant => Severity::$severity,)*
                }
            }

            /// One-line rule summary for SARIF rule metadata.
            pub fn summary(&self) -> &'static str {
                match self {
                    $(DiagnosticCode::$variant => $summary,)*
                }
            }

            /// The complete, ordered rule catalog.
            pub const ALL: &'static [DiagnosticCode] = &[
                $(DiagnosticCode::$variant,)*
            ];
        }
    };
}

diagnostic_codes! {
    // Synthetic (CLI only)
    IoError => ("io-error", Error, "File could not be read"),

    // Structural
    UnbalancedExpressionBraces =>
        ("unbalanced-expression-braces", Error, "Unbalanced {{ }} delimiters"),
    UnbalancedStatementBraces =>
        ("unbalanced-statement-braces", Error, "Unbalanced {% %} delimiters"),
    TripleBrace => ("triple-brace", Error, "Triple brace sequence"),
    ReversedBraces => ("reversed-braces", Error, "Closing delimiter before opening"),
    EmptyExpression => ("empty-expression", Warning, "Empty expression block"),
    EmptyStatement => ("empty-statement", Warning, "Empty statement block"),
    UnclosedBlock => ("unclosed-block", Error, "Block is never closed"),
    MismatchedBlockClose =>
        ("mismatched-block-close", Error, "Close tag does not match open tag"),
    UnexpectedBlockClose =>
        ("unexpected-block-close", Error, "Close tag without a matching open tag"),
    MissingStatementSpace =>
        ("missing-statement-space", Warning, "No space after statement delimiter"),
    UnknownBlockType => ("unknown-block-type", Warning, "Unrecognized statement keyword"),

    // Call sites
    UnclosedString => ("unclosed-string", Error, "String literal is never closed"),
    BareActionStatement =>
        ("bare-action-statement", Warning, "Action call used as a bare statement"),
    ActionAsFilter => ("action-as-filter", Warning, "Action call used as a filter"),
    TrailingPipe => ("trailing-pipe", Warning, "Pipe with no filter after it"),
    DollarInterpolation =>
        ("dollar-interpolation", Warning, "${...} interpolation outside template blocks"),
    TabInArguments => ("tab-in-arguments", Warning, "Tab character inside an argument list"),
    DuplicateParameter => ("duplicate-parameter", Warning, "Parameter passed more than once"),
    SemicolonInArguments =>
        ("semicolon-in-arguments", Warning, "Semicolon inside an argument list"),
    RecursiveSkillCall => ("recursive-skill-call", Warning, "Skill invokes itself"),
    UnknownFunction => ("unknown-function", Error, "Call target is not a known action or skill"),
    MissingRequiredParameter =>
        ("missing-required-parameter", Error, "Required parameter not supplied"),
    UnknownParameter => ("unknown-parameter", Warning, "Parameter not accepted by the callee"),
    InvalidParameterValue =>
        ("invalid-parameter-value", Warning, "Parameter value outside its allowed set or range"),

    // Symbols
    UndefinedVariable => ("undefined-variable", Warning, "Reference has no visible definition"),
    UseBeforeDefinition =>
        ("use-before-definition", Warning, "Reference precedes every definition"),
    UnusedDefinition => ("unused-definition", Hint, "Definition is never referenced"),
    VariableShadowing => ("variable-shadowing", Warning, "Definition shadows an outer definition"),
    LoopVariableShadowing =>
        ("loop-variable-shadowing", Warning, "Loop variable shadows an enclosing loop variable"),
    DeadStore => ("dead-store", Warning, "State write overwritten before any read"),
    VoidAssignment => ("void-assignment", Warning, "Assignment from an action that returns nothing"),
    IterateOverString => ("iterate-over-string", Warning, "Loop iterates over a string value"),

    // Conditions and statements
    AndInCondition => ("and-in-condition", Warning, "'&&' used instead of 'and'"),
    OrInCondition => ("or-in-condition", Warning, "'||' used instead of 'or'"),
    NotInCondition => ("not-in-condition", Warning, "'!' used instead of 'not'"),
    TrailingColon => ("trailing-colon", Warning, "Trailing colon on a condition"),
    AssignmentInCondition =>
        ("assignment-in-condition", Warning, "'=' used where '==' was probably intended"),
    IncrementOperator => ("increment-operator", Warning, "'++' is not a template operator"),
    DecrementOperator => ("decrement-operator", Warning, "'--' is not a template operator"),
    OrInSet => ("or-in-set", Warning, "'||' used in a set statement instead of 'or'"),
    UnreachableCode => ("unreachable-code", Warning, "Statements after a terminating Return"),
    BreakOutsideLoop => ("break-outside-loop", Error, "'break' outside any loop"),
    ContinueOutsideLoop => ("continue-outside-loop", Error, "'continue' outside any loop"),
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Diagnostic
// ============================================================================

/// A single analyzer finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub range: Range,
    /// Fuzzy-match suggestions, best first. Empty for most rules.
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    /// A diagnostic at the rule's default severity.
    pub fn new(code: DiagnosticCode, message: impl Into<String>, range: Range) -> Self {
        Self {
            severity: code.severity(),
            code,
            message: message.into(),
            range,
            suggestions: Vec::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

/// Sort key used before publishing: by position, then severity, then code.
pub fn sort_diagnostics(diags: &mut [Diagnostic]) {
    diags.sort_by(|a, b| {
        a.range
            .start
            .cmp(&b.range.start)
            .then(a.severity.cmp(&b.severity))
            .then(a.code.as_str().cmp(b.code.as_str()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::position::Position;

    #[test]
    fn catalog_ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in DiagnosticCode::ALL {
            assert!(seen.insert(code.as_str()), "duplicate id {}", code);
        }
    }

    #[test]
    fn sorting_orders_by_position_then_severity() {
        let at = |line, col| Range::new(Position::new(line, col), Position::new(line, col + 1));
        let mut diags = vec![
            Diagnostic::new(DiagnosticCode::UnusedDefinition, "a", at(2, 1)),
            Diagnostic::new(DiagnosticCode::UnclosedBlock, "b", at(1, 5)),
            Diagnostic::new(DiagnosticCode::UnknownFunction, "c", at(2, 1)),
        ];
        sort_diagnostics(&mut diags);
        assert_eq!(diags[0].message, "b");
        assert_eq!(diags[1].message, "c");
        assert_eq!(diags[2].message, "a");
    }
}
