//! Render lint reports as text, JSON, or SARIF.

use std::path::PathBuf;

use serde_json::json;

use crate::analysis::diag::{Diagnostic, DiagnosticCode, Severity};
use crate::cli::{CliError, CliResult};

/// Diagnostics for one analyzed file.
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

// ============================================================================
// Text
// ============================================================================

pub fn render_text(reports: &[FileReport]) -> String {
    let mut out = String::new();
    let mut counts = [0usize; 3];
    for report in reports {
        for diag in &report.diagnostics {
            counts[severity_index(diag.severity)] += 1;
            out.push_str(&format!(
                "{}:{}:{}: {}[{}] {}\n",
                report.path.display(),
                diag.range.start.line,
                diag.range.start.column,
                diag.severity,
                diag.code,
                diag.message
            ));
        }
    }
    let total: usize = counts.iter().sum();
    if total == 0 {
        out.push_str(&format!("no issues found in {} file(s)", reports.len()));
    } else {
        out.push_str(&format!(
            "{total} issue(s): {} error(s), {} warning(s), {} hint(s)",
            counts[0], counts[1], counts[2]
        ));
    }
    out
}

fn severity_index(severity: Severity) -> usize {
    match severity {
        Severity::Error => 0,
        Severity::Warning => 1,
        Severity::Hint => 2,
    }
}

// ============================================================================
// JSON
// ============================================================================

pub fn render_json(reports: &[FileReport]) -> CliResult<String> {
    let files: Vec<_> = reports
        .iter()
        .map(|report| {
            json!({
                "path": report.path.display().to_string(),
                "diagnostics": report
                    .diagnostics
                    .iter()
                    .map(|d| json!({
                        "severity": d.severity.as_str(),
                        "code": d.code.as_str(),
                        "message": d.message,
                        "range": d.range,
                        "suggestions": d.suggestions,
                    }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&json!({ "files": files }))
        .map_err(|e| CliError::failure(format!("failed to serialize report: {e}")))
}

// ============================================================================
// SARIF
// ============================================================================

fn sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Hint => "note",
    }
}

/// SARIF 2.1.0 with the complete rule catalog, so consumers can show
/// rules that produced no results in this run.
pub fn render_sarif(reports: &[FileReport]) -> CliResult<String> {
    let rules: Vec<_> = DiagnosticCode::ALL
        .iter()
        .map(|code| {
            json!({
                "id": code.as_str(),
                "shortDescription": { "text": code.summary() },
                "defaultConfiguration": { "level": sarif_level(code.severity()) },
            })
        })
        .collect();

    let mut results = Vec::new();
    for report in reports {
        for diag in &report.diagnostics {
            results.push(json!({
                "ruleId": diag.code.as_str(),
                "level": sarif_level(diag.severity),
                "message": { "text": diag.message },
                "locations": [{
                    "physicalLocation": {
                        "artifactLocation": { "uri": report.path.display().to_string() },
                        "region": {
                            "startLine": diag.range.start.line,
                            "startColumn": diag.range.start.column,
                            "endLine": diag.range.end.line,
                            "endColumn": diag.range.end.column,
                        },
                    },
                }],
            }));
        }
    }

    let sarif = json!({
        "$schema": "https://json.schemastore.org/sarif-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "fable",
                    "version": env!("CARGO_PKG_VERSION"),
                    "rules": rules,
                },
            },
            "results": results,
        }],
    });
    serde_json::to_string_pretty(&sarif)
        .map_err(|e| CliError::failure(format!("failed to serialize SARIF: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::position::{Position, Range};

    fn sample_report() -> FileReport {
        let range = Range::new(Position::new(2, 4), Position::new(2, 9));
        FileReport {
            path: PathBuf::from("skills/Greet.jinja"),
            diagnostics: vec![Diagnostic::new(
                DiagnosticCode::UndefinedVariable,
                "Undefined variable 'tne'",
                range,
            )
            .with_suggestions(vec!["tone".to_string()])],
        }
    }

    #[test]
    fn text_lines_carry_position_and_code() {
        let rendered = render_text(&[sample_report()]);
        assert!(rendered
            .contains("skills/Greet.jinja:2:4: warning[undefined-variable] Undefined variable 'tne'"));
        assert!(rendered.contains("1 issue(s): 0 error(s), 1 warning(s), 0 hint(s)"));
    }

    #[test]
    fn json_round_trips() {
        let rendered = render_json(&[sample_report()]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        let diag = &value["files"][0]["diagnostics"][0];
        assert_eq!(diag["code"], "undefined-variable");
        assert_eq!(diag["range"]["start"]["line"], 2);
        assert_eq!(diag["suggestions"][0], "tone");
    }

    #[test]
    fn sarif_enumerates_full_rule_catalog() {
        let rendered = render_sarif(&[sample_report()]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        let rules = value["runs"][0]["tool"]["driver"]["rules"].as_array().unwrap();
        assert_eq!(rules.len(), DiagnosticCode::ALL.len());
        let result = &value["runs"][0]["results"][0];
        assert_eq!(result["ruleId"], "undefined-variable");
        assert_eq!(
            result["locations"][0]["physicalLocation"]["region"]["startLine"],
            2
        );
    }
}
