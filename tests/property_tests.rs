//! Property-based tests for the analysis pipeline.
//!
//! These use proptest to verify the core contract across many generated
//! inputs: analysis never panics, never loops, and is deterministic.

use fable::analysis::diag::DiagnosticCode;
use fable::{analyze, Dialect, RegistrySnapshot};
use proptest::prelude::*;

mod robustness {
    use super::*;

    proptest! {
        /// Analysis must degrade to diagnostics on any input, never panic,
        /// in either dialect.
        #[test]
        fn analysis_never_panics(text in "\\PC{0,200}") {
            let registry = RegistrySnapshot::with_defaults();
            let _ = analyze(&text, &registry, Dialect::Jinja, &[]);
            let _ = analyze(&text, &registry, Dialect::Guidance, &[]);
        }

        /// Template-ish fragments with unbalanced delimiters still finish.
        #[test]
        fn delimiter_soup_never_panics(
            pieces in prop::collection::vec(
                prop::sample::select(vec![
                    "{{", "}}", "{%", "%}", "{#", "#}", "{{#if x}}", "{{/if}}",
                    "set x = \"a\"", "for a in xs", "endfor", "\"", "'", "|", "\n",
                ]),
                0..30,
            )
        ) {
            let text = pieces.concat();
            let registry = RegistrySnapshot::with_defaults();
            let _ = analyze(&text, &registry, Dialect::Jinja, &[]);
            let _ = analyze(&text, &registry, Dialect::Guidance, &[]);
        }
    }
}

mod determinism {
    use super::*;

    proptest! {
        /// Two runs over the same text produce identical diagnostics.
        #[test]
        fn diagnostics_are_deterministic(text in "\\PC{0,200}") {
            let registry = RegistrySnapshot::with_defaults();
            let first = analyze(&text, &registry, Dialect::Jinja, &[]);
            let second = analyze(&text, &registry, Dialect::Jinja, &[]);
            prop_assert_eq!(first.diagnostics, second.diagnostics);
        }
    }
}

mod structure {
    use super::*;

    proptest! {
        /// A lone well-formed expression around an identifier is never
        /// structurally unbalanced.
        #[test]
        fn wrapped_identifier_is_balanced(name in "[a-z][a-z0-9_]{0,12}") {
            let text = format!("{{{{ {name} }}}}");
            let registry = RegistrySnapshot::with_defaults();
            let analysis = analyze(&text, &registry, Dialect::Jinja, &[]);
            prop_assert!(!analysis.diagnostics.iter().any(|d| matches!(
                d.code,
                DiagnosticCode::UnbalancedExpressionBraces
                    | DiagnosticCode::UnbalancedStatementBraces
                    | DiagnosticCode::ReversedBraces
            )));
        }
    }
}
