//! Symbol checks: undefined references, unused definitions, shadowing,
//! dead state writes, string iteration, and void assignments.
//!
//! These consume the symbol table's queries; the policy decisions
//! (PascalCase skips, self-suggestion downgrades, guidance leniency) live
//! here at the reporting site, not in the table.

use super::CheckContext;
use crate::analysis::calls::is_identifier;
use crate::analysis::diag::{Diagnostic, DiagnosticCode, Severity};
use crate::analysis::document::BlockKind;
use crate::analysis::position::{Position, Range};
use crate::analysis::similar::{suggest, VARIABLE_DISTANCE};
use crate::analysis::table::{
    parse_for, undefined_references, unused_definitions, VarSource,
};
use crate::analysis::Dialect;
use crate::registry::{ValueType, IMPLICIT_NAMES};

pub(super) fn check(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    undefined(ctx, out);
    unused(ctx, out);
    builtin_shadowing(ctx, out);
    loop_shadowing(ctx, out);
    dead_state_writes(ctx, out);
    string_iteration(ctx, out);
    void_assignment(ctx, out);
}

fn name_range(line: u32, column: u32, len: usize) -> Range {
    Range::new(
        Position::new(line, column),
        Position::new(line, column + len as u32),
    )
}

fn undefined(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    let lenient_guidance = ctx.dialect == Dialect::Guidance && !ctx.has_skill_params;

    for reference in undefined_references(ctx.table) {
        // PascalCase names here are almost always call targets the call
        // pass already judged.
        if reference.name.starts_with(|c: char| c.is_ascii_uppercase()) {
            continue;
        }

        let pool = ctx
            .table
            .all_names
            .iter()
            .map(String::as_str)
            .filter(|n| !IMPLICIT_NAMES.contains(n));
        let suggestions = suggest(&reference.name, pool, VARIABLE_DISTANCE);
        let range = name_range(reference.line, reference.column, reference.name.len());

        // The best match being the name itself means it IS defined, just
        // not visibly here: out of scope or later in the file.
        if suggestions.first().map(String::as_str) == Some(reference.name.as_str()) {
            out.push(
                Diagnostic::new(
                    DiagnosticCode::UseBeforeDefinition,
                    format!(
                        "Variable '{}' is used before its definition or may be a skill parameter",
                        reference.name
                    ),
                    range,
                )
                .with_severity(Severity::Hint),
            );
            continue;
        }

        // Guidance documents analyzed without declared parameters use
        // parameter names freely; only close typo matches stay warnings.
        if lenient_guidance && suggestions.is_empty() {
            out.push(
                Diagnostic::new(
                    DiagnosticCode::UndefinedVariable,
                    format!(
                        "Possibly undefined variable '{}' (skill parameters not available)",
                        reference.name
                    ),
                    range,
                )
                .with_severity(Severity::Hint),
            );
            continue;
        }

        let did_you_mean = suggestions
            .first()
            .map(|s| format!(". Did you mean '{s}'?"))
            .unwrap_or_default();
        out.push(
            Diagnostic::new(
                DiagnosticCode::UndefinedVariable,
                format!("Undefined variable '{}'{did_you_mean}", reference.name),
                range,
            )
            .with_suggestions(suggestions),
        );
    }
}

fn unused(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    for def in unused_definitions(ctx.table) {
        // `Set(...)` writes shared state for later skills; unreferenced is
        // the normal case, not a smell.
        if def.source == VarSource::SetAction {
            continue;
        }
        out.push(Diagnostic::new(
            DiagnosticCode::UnusedDefinition,
            format!("Variable '{}' is defined but never referenced", def.name),
            name_range(def.line, def.column, def.name.len()),
        ));
    }
}

fn builtin_shadowing(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    for (name, defs) in &ctx.table.definitions {
        if ctx.registry.builtin(name).is_none() {
            continue;
        }
        for def in defs {
            if matches!(def.source, VarSource::Set | VarSource::SetAction) {
                out.push(Diagnostic::new(
                    DiagnosticCode::VariableShadowing,
                    format!(
                        "Variable '{name}' shadows the built-in action '{name}'. This may \
                         cause confusion."
                    ),
                    name_range(def.line, def.column, name.len()),
                ));
            }
        }
    }
}

/// An inner `for` reusing an enclosing loop's variable name.
fn loop_shadowing(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    let doc = ctx.doc;
    let mut stack: Vec<(String, u32)> = Vec::new();
    for block in doc.blocks_of(BlockKind::Statement) {
        match doc.statement_keyword(block).as_deref() {
            Some("for") => {
                let Some(parsed) = parse_for(doc, block) else { continue };
                let name = doc.slice(parsed.var_span).to_string();
                let line = doc.lines.position(parsed.var_span.start).line;
                if let Some((_, outer_line)) = stack.iter().find(|(n, _)| *n == name) {
                    out.push(Diagnostic::new(
                        DiagnosticCode::LoopVariableShadowing,
                        format!(
                            "Loop variable '{name}' shadows the outer loop variable defined \
                             on line {outer_line}. Use a different name to avoid confusion."
                        ),
                        doc.lines.range(parsed.var_span),
                    ));
                }
                stack.push((name, line));
            }
            Some("endfor") => {
                stack.pop();
            }
            _ => {}
        }
    }
}

/// Two consecutive `SetState` writes to the same key with no read or
/// conditional boundary between them: the first value is never observed.
fn dead_state_writes(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    struct Write<'c> {
        key: &'c str,
        line: u32,
        range: Range,
    }

    let mut writes: Vec<Write<'_>> = Vec::new();
    for call in ctx.calls {
        if call.name != "SetState" {
            continue;
        }
        let Some(param) = call.keyword_param("name") else { continue };
        if !param.is_string_literal() {
            continue;
        }
        writes.push(Write {
            key: param.unquoted_value(),
            line: call.range.start.line,
            range: call.range,
        });
    }

    for pair in writes.windows(2) {
        let (first, second) = (&pair[0], &pair[1]);
        if first.key != second.key {
            continue;
        }
        // Writes in different branches are mutually exclusive.
        let boundary = ctx.doc.blocks_of(BlockKind::Statement).any(|block| {
            let line = ctx.doc.lines.position(block.span.start).line;
            line > first.line
                && line < second.line
                && matches!(
                    ctx.doc.statement_keyword(block).as_deref(),
                    Some("endif") | Some("else") | Some("elif")
                )
        });
        if boundary {
            continue;
        }
        out.push(Diagnostic::new(
            DiagnosticCode::DeadStore,
            format!(
                "SetState: key '{}' is immediately overwritten on line {}. First value is \
                 never used (dead store).",
                first.key, second.line
            ),
            first.range,
        ));
    }
}

/// `{% for c in s %}` where `s` is known to hold a string iterates over
/// characters.
fn string_iteration(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    let doc = ctx.doc;
    for block in doc.blocks_of(BlockKind::Statement) {
        if doc.statement_keyword(block).as_deref() != Some("for") {
            continue;
        }
        let Some(parsed) = parse_for(doc, block) else { continue };
        let iter_text = doc.slice(parsed.iter_span).trim();
        let iter_name = iter_text
            .split('|')
            .next()
            .unwrap_or(iter_text)
            .trim();
        if !is_identifier(iter_name) {
            continue;
        }
        let Some(defs) = ctx.table.definitions.get(iter_name) else { continue };
        if defs.iter().any(|d| d.inferred_type == ValueType::String) {
            out.push(Diagnostic::new(
                DiagnosticCode::IterateOverString,
                format!(
                    "Iterating over '{iter_name}' which has type 'string'. This will iterate \
                     over individual characters. Did you mean to use a list?"
                ),
                doc.range_of(block),
            ));
        }
    }
}

/// `{% set x = SendMessage(...) %}`: the action returns nothing useful.
fn void_assignment(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    for defs in ctx.table.definitions.values() {
        for def in defs {
            if def.source != VarSource::Set {
                continue;
            }
            let Some(expr) = def.value_expr.as_deref() else { continue };
            let Some(action) = leading_call_name(expr) else { continue };
            if ctx.registry.is_void(action) {
                out.push(Diagnostic::new(
                    DiagnosticCode::VoidAssignment,
                    format!(
                        "Action '{action}' does not return a meaningful value. Assigning its \
                         result to '{}' is likely a mistake.",
                        def.name
                    ),
                    name_range(def.line, def.column, def.name.len()),
                ));
            }
        }
    }
}

fn leading_call_name(expr: &str) -> Option<&str> {
    let expr = expr.trim_start();
    let len = expr
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    if len == 0 || !expr.as_bytes()[0].is_ascii_alphabetic() {
        return None;
    }
    expr[len..]
        .trim_start()
        .starts_with('(')
        .then(|| &expr[..len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::checks::{run, CheckContext};
    use crate::analysis::calls::extract_calls;
    use crate::analysis::scanner::scan;
    use crate::analysis::table::build_table;
    use crate::registry::RegistrySnapshot;

    fn diags(text: &str) -> Vec<Diagnostic> {
        diags_dialect(text, Dialect::Jinja, &[])
    }

    fn diags_dialect(text: &str, dialect: Dialect, params: &[&str]) -> Vec<Diagnostic> {
        let registry = RegistrySnapshot::with_defaults();
        let doc = scan(text);
        let calls = extract_calls(&doc, &registry);
        let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        let table = build_table(&doc, &registry, &calls, &params);
        run(&CheckContext {
            doc: &doc,
            registry: &registry,
            calls: &calls,
            table: &table,
            dialect,
            has_skill_params: !params.is_empty(),
        })
    }

    fn find(diags: &[Diagnostic], code: DiagnosticCode) -> Option<&Diagnostic> {
        diags.iter().find(|d| d.code == code)
    }

    #[test]
    fn undefined_variable_with_suggestion() {
        let out = diags("{% set greeting = \"hi\" %}\n{{ greting }}");
        let diag = find(&out, DiagnosticCode::UndefinedVariable).unwrap();
        assert!(diag.message.contains("Did you mean 'greeting'?"));
        assert_eq!(diag.severity, Severity::Warning);
    }

    #[test]
    fn use_before_definition_is_a_hint() {
        let out = diags("{{ flag }}\n{% set flag = 1 %}");
        let diag = find(&out, DiagnosticCode::UseBeforeDefinition).unwrap();
        assert_eq!(diag.severity, Severity::Hint);
    }

    #[test]
    fn guidance_without_params_is_lenient() {
        let out = diags_dialect("{{ customer_request }}", Dialect::Guidance, &[]);
        let diag = find(&out, DiagnosticCode::UndefinedVariable).unwrap();
        assert_eq!(diag.severity, Severity::Hint);
        assert!(diag.message.contains("skill parameters not available"));
    }

    #[test]
    fn guidance_with_params_stays_strict() {
        let out = diags_dialect("{{ customer_request }}", Dialect::Guidance, &["other"]);
        let diag = find(&out, DiagnosticCode::UndefinedVariable).unwrap();
        assert_eq!(diag.severity, Severity::Warning);
    }

    #[test]
    fn pascal_case_references_are_skipped() {
        let out = diags("{{ SomeThing }}");
        assert!(find(&out, DiagnosticCode::UndefinedVariable).is_none());
    }

    #[test]
    fn unused_definition_hint_skips_set_action() {
        let out = diags("{% set a = 1 %}\n{{Set(name=\"b\", value=\"2\")}}");
        let unused: Vec<_> = out
            .iter()
            .filter(|d| d.code == DiagnosticCode::UnusedDefinition)
            .collect();
        assert_eq!(unused.len(), 1);
        assert!(unused[0].message.contains("'a'"));
    }

    #[test]
    fn builtin_name_shadowing() {
        let out = diags("{% set Gen = 1 %}\n{{ Gen }}");
        let diag = find(&out, DiagnosticCode::VariableShadowing).unwrap();
        assert!(diag.message.contains("'Gen'"));
    }

    #[test]
    fn nested_loop_variable_shadowing() {
        let text = "{% for item in a %}\n{% for item in b %}\n{{ item }}\n{% endfor %}\n{% endfor %}";
        let out = diags(text);
        let diag = find(&out, DiagnosticCode::LoopVariableShadowing).unwrap();
        assert_eq!(diag.range.start.line, 2);
    }

    #[test]
    fn sibling_loops_do_not_shadow() {
        let text = "{% for x in a %}{% endfor %}\n{% for x in b %}{% endfor %}";
        let out = diags(text);
        assert!(find(&out, DiagnosticCode::LoopVariableShadowing).is_none());
    }

    #[test]
    fn consecutive_set_state_is_dead_store() {
        let text = "{{SetState(name=\"k\", value=\"1\")}}\n{{SetState(name=\"k\", value=\"2\")}}";
        let out = diags(text);
        let diag = find(&out, DiagnosticCode::DeadStore).unwrap();
        assert!(diag.message.contains("line 2"));
    }

    #[test]
    fn branch_boundary_clears_dead_store() {
        let text = "{% if a %}\n{{SetState(name=\"k\", value=\"1\")}}\n{% else %}\n{{SetState(name=\"k\", value=\"2\")}}\n{% endif %}";
        let out = diags(text);
        assert!(find(&out, DiagnosticCode::DeadStore).is_none());
    }

    #[test]
    fn iterating_a_string_variable() {
        let text = "{% set s = \"abc\" %}\n{% for c in s %}{{ c }}{% endfor %}";
        let out = diags(text);
        assert!(find(&out, DiagnosticCode::IterateOverString).is_some());
    }

    #[test]
    fn void_action_assignment() {
        let out = diags("{% set r = SendMessage(message=\"hi\") %}\n{{ r }}");
        let diag = find(&out, DiagnosticCode::VoidAssignment).unwrap();
        assert!(diag.message.contains("'SendMessage'"));
    }
}
