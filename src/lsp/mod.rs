//! Language Server Protocol surface for the template analyzer.
//!
//! Provides IDE features:
//! - Diagnostics on open/change
//! - Hover (variables, builtin actions)
//! - Go-to-definition for variables
//! - Completions (keywords, actions, skills, in-scope variables)
//! - Semantic tokens for syntax highlighting

pub mod backend;
pub mod diagnostics;

pub use backend::FableLanguageServer;
