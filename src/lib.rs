#![forbid(unsafe_code)]
//! Fable template analyzer.
//!
//! Fable templates mix Jinja-style control flow (`{% %}`, `{{ }}`, `{# #}`)
//! with Handlebars-like guidance blocks (`{{#role}}`, `{{#if}}`) to author
//! LLM agent skills. This crate provides the static analysis core — scanner,
//! call analyzer, symbol table, diagnostic engine, semantic tokens — plus a
//! language server (`fable-lsp`) and a lint CLI (`fable`) on top of it.
//!
//! ## Panic Policy
//!
//! The analysis core never fails on template input: malformed templates
//! produce diagnostics, not errors or panics. Production code uses `Result`
//! with `?`; `.unwrap()` and `.expect()` are acceptable in tests only. The
//! `cli` module enforces `#![deny(clippy::unwrap_used)]`.

pub mod analysis;
pub mod cli;
pub mod lsp;
pub mod registry;

pub use analysis::{analyze, Analysis, Dialect};
pub use analysis::diag::{Diagnostic, DiagnosticCode, Severity};
pub use registry::{RegistrySnapshot, SchemaSet};
