//! The analysis core: scanner, call analyzer, symbol table, diagnostic
//! engine, and semantic token classifier.
//!
//! The core owns no I/O. [`analyze`] takes text plus a registry snapshot
//! and always produces a result; malformed input yields diagnostics,
//! never errors.

pub mod calls;
pub mod checks;
pub mod diag;
pub mod document;
pub mod position;
pub mod scanner;
pub mod semantic;
pub mod similar;
pub mod table;

use std::path::Path;

use crate::registry::RegistrySnapshot;

/// Template dialect of a document, decided by its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `{% %}` control flow: `.jinja` / `.fbl`.
    Jinja,
    /// `{{#block}}` control flow: `.guidance` / `.fblg`.
    Guidance,
}

impl Dialect {
    pub fn from_path(path: &Path) -> Dialect {
        match path.extension().and_then(|e| e.to_str()) {
            Some("guidance") | Some("fblg") => Dialect::Guidance,
            _ => Dialect::Jinja,
        }
    }
}

/// Everything one analysis run produces. The editor features (hover,
/// completion, definition, semantic tokens) reuse the same arena and table
/// the diagnostics came from.
#[derive(Debug)]
pub struct Analysis {
    pub doc: document::Document,
    pub calls: Vec<calls::CallSite>,
    pub table: table::SymbolTable,
    pub diagnostics: Vec<diag::Diagnostic>,
}

/// Run the full pipeline: scan once, extract calls, build the symbol
/// table, run every check.
pub fn analyze(
    text: &str,
    registry: &RegistrySnapshot,
    dialect: Dialect,
    skill_params: &[String],
) -> Analysis {
    let doc = scanner::scan(text);
    let calls = calls::extract_calls(&doc, registry);
    let table = table::build_table(&doc, registry, &calls, skill_params);
    let diagnostics = checks::run(&checks::CheckContext {
        doc: &doc,
        registry,
        calls: &calls,
        table: &table,
        dialect,
        has_skill_params: !skill_params.is_empty(),
    });
    Analysis { doc, calls, table, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_from_extension() {
        assert_eq!(Dialect::from_path(Path::new("a/Greet.jinja")), Dialect::Jinja);
        assert_eq!(Dialect::from_path(Path::new("a/Greet.fbl")), Dialect::Jinja);
        assert_eq!(Dialect::from_path(Path::new("a/Greet.guidance")), Dialect::Guidance);
        assert_eq!(Dialect::from_path(Path::new("a/Greet.fblg")), Dialect::Guidance);
        // Anything else, including no extension, reads as Jinja.
        assert_eq!(Dialect::from_path(Path::new("a/Greet.txt")), Dialect::Jinja);
        assert_eq!(Dialect::from_path(Path::new("a/Greet")), Dialect::Jinja);
    }

    #[test]
    fn clean_document_has_no_diagnostics() {
        let registry = RegistrySnapshot::with_defaults();
        let text = "{% set name = \"Ada\" %}\n{{SendMessage(message=name)}}";
        let analysis = analyze(text, &registry, Dialect::Jinja, &[]);
        assert!(analysis.diagnostics.is_empty(), "{:?}", analysis.diagnostics);
    }
}
