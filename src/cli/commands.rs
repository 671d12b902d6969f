//! The `lint` command: expand patterns, analyze each file, render.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::diag::{Diagnostic, DiagnosticCode, Severity};
use crate::analysis::position::Range;
use crate::analysis::{analyze, Dialect};
use crate::cli::output::{self, FileReport};
use crate::cli::{CliError, CliResult, ExitCode, OutputFormat};
use crate::registry::{RegistrySnapshot, SchemaSet};

pub fn lint(
    patterns: &[String],
    schemas: Option<&Path>,
    project: Option<&Path>,
    format: OutputFormat,
    threshold: Severity,
) -> CliResult<ExitCode> {
    let schema_set = match schemas {
        Some(dir) => SchemaSet::load(dir),
        None => SchemaSet::empty(),
    };
    let registry = schema_set.snapshot(project);

    let files = expand_patterns(patterns)?;
    if files.is_empty() {
        return Err(CliError::failure(format!(
            "no files matched: {}",
            patterns.join(", ")
        )));
    }

    let reports = collect_reports(&files, &registry, threshold);
    let rendered = match format {
        OutputFormat::Text => output::render_text(&reports),
        OutputFormat::Json => output::render_json(&reports)?,
        OutputFormat::Sarif => output::render_sarif(&reports)?,
    };
    println!("{rendered}");

    let clean = reports.iter().all(|r| r.diagnostics.is_empty());
    Ok(if clean { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Expand glob patterns into a sorted, deduplicated file list. A pattern
/// with no metacharacters behaves as a literal path.
fn expand_patterns(patterns: &[String]) -> CliResult<Vec<PathBuf>> {
    let mut files = BTreeSet::new();
    for pattern in patterns {
        let paths = glob::glob(pattern)
            .map_err(|e| CliError::failure(format!("bad pattern '{pattern}': {e}")))?;
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => {
                    files.insert(path);
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("skipping unreadable match: {e}"),
            }
        }
        // A literal path that exists but did not glob (e.g. brackets in
        // the file name) is still accepted.
        let literal = PathBuf::from(pattern);
        if literal.is_file() {
            files.insert(literal);
        }
    }
    Ok(files.into_iter().collect())
}

/// Analyze each file, keeping diagnostics at or above the threshold. An
/// unreadable file yields one synthetic io-error diagnostic instead of
/// aborting the run.
pub(crate) fn collect_reports(
    files: &[PathBuf],
    registry: &RegistrySnapshot,
    threshold: Severity,
) -> Vec<FileReport> {
    let mut reports = Vec::with_capacity(files.len());
    for path in files {
        let diagnostics = match fs::read_to_string(path) {
            Ok(text) => {
                let dialect = Dialect::from_path(path);
                let params = skill_params_for(registry, path);
                let analysis = analyze(&text, registry, dialect, &params);
                analysis
                    .diagnostics
                    .into_iter()
                    .filter(|d| d.severity <= threshold)
                    .collect()
            }
            Err(err) => vec![Diagnostic::new(
                DiagnosticCode::IoError,
                format!("Failed to read {}: {err}", path.display()),
                Range::document_start(),
            )],
        };
        reports.push(FileReport { path: path.clone(), diagnostics });
    }
    reports
}

/// Declared parameters of the skill this file implements, when its stem
/// names a known skill.
fn skill_params_for(registry: &RegistrySnapshot, path: &Path) -> Vec<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|stem| registry.resolve_skill(stem))
        .map(|skill| skill.parameters.iter().map(|p| p.name.clone()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fable-lint-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn clean_file_yields_empty_report() {
        let dir = temp_dir("clean");
        let path = dir.join("Greet.jinja");
        fs::write(&path, "{% set name = \"Ada\" %}\n{{SendMessage(message=name)}}").unwrap();
        let registry = RegistrySnapshot::with_defaults();
        let reports = collect_reports(&[path], &registry, Severity::Hint);
        assert!(reports[0].diagnostics.is_empty(), "{:?}", reports[0].diagnostics);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unreadable_file_yields_io_error() {
        let registry = RegistrySnapshot::with_defaults();
        let reports = collect_reports(
            &[PathBuf::from("/nonexistent/Greet.jinja")],
            &registry,
            Severity::Warning,
        );
        assert_eq!(reports[0].diagnostics.len(), 1);
        assert_eq!(reports[0].diagnostics[0].code, DiagnosticCode::IoError);
    }

    #[test]
    fn threshold_filters_lower_severities() {
        let dir = temp_dir("threshold");
        let path = dir.join("Doc.jinja");
        // An unused definition is a hint.
        fs::write(&path, "{% set unused_value = 1 %}").unwrap();
        let registry = RegistrySnapshot::with_defaults();

        let lenient = collect_reports(&[path.clone()], &registry, Severity::Hint);
        assert!(lenient[0]
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::UnusedDefinition));

        let strict = collect_reports(&[path], &registry, Severity::Warning);
        assert!(strict[0].diagnostics.is_empty(), "{:?}", strict[0].diagnostics);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn expand_accepts_literal_paths() {
        let dir = temp_dir("literal");
        let path = dir.join("One.jinja");
        fs::write(&path, "hi").unwrap();
        let files = expand_patterns(&[path.display().to_string()]).unwrap();
        assert_eq!(files, vec![path]);
        let _ = fs::remove_dir_all(&dir);
    }
}
