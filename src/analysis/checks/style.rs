//! Statement style checks: host-language operators in conditions and set
//! statements, loop-control placement, and unreachable code after a
//! terminating `Return`.

use super::{has_negation_outside_strings, has_operator_outside_strings, CheckContext};
use crate::analysis::diag::{Diagnostic, DiagnosticCode};
use crate::analysis::document::{Block, BlockKind};
use crate::analysis::table::{condition_span, parse_set};

pub(super) fn check(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    conditions(ctx, out);
    set_statements(ctx, out);
    loop_control(ctx, out);
    unreachable_after_return(ctx, out);
}

fn conditions(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    let doc = ctx.doc;
    for block in doc.blocks_of(BlockKind::Statement) {
        let Some(cond) = condition_span(doc, block) else { continue };
        let text = doc.slice(cond);
        let range = doc.range_of(block);

        if has_operator_outside_strings(text, "&&") {
            out.push(Diagnostic::new(
                DiagnosticCode::AndInCondition,
                "Use 'and' instead of '&&' in conditionals. '&&' is not a valid operator.",
                range,
            ));
        }
        if has_operator_outside_strings(text, "||") {
            out.push(Diagnostic::new(
                DiagnosticCode::OrInCondition,
                "Use 'or' instead of '||' in conditionals. '||' is not a valid operator.",
                range,
            ));
        }
        if has_negation_outside_strings(text) {
            out.push(Diagnostic::new(
                DiagnosticCode::NotInCondition,
                "Use 'not' instead of '!' in conditionals. '!' is not a valid operator.",
                range,
            ));
        }
        if text.trim_end().ends_with(':') {
            out.push(Diagnostic::new(
                DiagnosticCode::TrailingColon,
                "Python-style colon in conditional. Remove the trailing ':' - the block is \
                 closed by {% endif %} instead.",
                range,
            ));
        }
        if has_bare_assignment(text) {
            out.push(Diagnostic::new(
                DiagnosticCode::AssignmentInCondition,
                "Possible assignment '=' in conditional. Did you mean '==' for comparison?",
                range,
            ));
        }
    }
}

/// `ident =` (single equals) at paren depth zero, outside strings. Keyword
/// arguments inside call parentheses are legitimate.
fn has_bare_assignment(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut in_string = false;
    let mut string_char = 0u8;
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if in_string {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == string_char {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            b'"' | b'\'' => {
                in_string = true;
                string_char = c;
            }
            b'(' => depth += 1,
            b')' => depth -= 1,
            b'=' => {
                let prev = if i > 0 { bytes[i - 1] } else { 0 };
                let next = bytes.get(i + 1).copied();
                let is_comparison = next == Some(b'=')
                    || matches!(prev, b'=' | b'!' | b'<' | b'>');
                let after_ident =
                    prev.is_ascii_alphanumeric() || prev == b'_' || prev == b' ' || prev == b'\t';
                if !is_comparison && depth == 0 && after_ident && ident_before(bytes, i) {
                    return true;
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

fn ident_before(bytes: &[u8], eq: usize) -> bool {
    let mut i = eq;
    while i > 0 && (bytes[i - 1] == b' ' || bytes[i - 1] == b'\t') {
        i -= 1;
    }
    i > 0 && (bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_')
}

fn set_statements(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    let doc = ctx.doc;
    for block in doc.blocks_of(BlockKind::Statement) {
        if doc.statement_keyword(block).as_deref() != Some("set") {
            continue;
        }
        let (_, content) = doc.trimmed_inner(block);
        let range = doc.range_of(block);

        if has_operator_outside_strings(content, "++") {
            out.push(Diagnostic::new(
                DiagnosticCode::IncrementOperator,
                "'++' is not a valid operator. Use '{% set x = x + 1 %}' instead.",
                range,
            ));
        }
        if has_operator_outside_strings(content, "--") {
            out.push(Diagnostic::new(
                DiagnosticCode::DecrementOperator,
                "'--' is not a valid operator. Use '{% set x = x - 1 %}' instead.",
                range,
            ));
        }

        let Some(set) = parse_set(doc, block) else { continue };
        let Some(value) = set.value_span else { continue };
        if has_operator_outside_strings(doc.slice(value), "||") {
            out.push(Diagnostic::new(
                DiagnosticCode::OrInSet,
                "'||' is not a valid operator. Use the 'default' filter or the 'or' keyword \
                 for fallbacks.",
                range,
            ));
        }
    }
}

/// `{% break %}` / `{% continue %}` outside any `for` loop.
fn loop_control(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    let doc = ctx.doc;
    let mut loop_depth = 0u32;
    for block in doc.blocks_of(BlockKind::Statement) {
        match doc.statement_keyword(block).as_deref() {
            Some("for") => loop_depth += 1,
            Some("endfor") => loop_depth = loop_depth.saturating_sub(1),
            Some(kw @ ("break" | "continue")) if loop_depth == 0 => {
                let code = if kw == "break" {
                    DiagnosticCode::BreakOutsideLoop
                } else {
                    DiagnosticCode::ContinueOutsideLoop
                };
                out.push(Diagnostic::new(
                    code,
                    format!("'{kw}' used outside of a loop"),
                    doc.range_of(block),
                ));
            }
            _ => {}
        }
    }
}

/// Action calls on lines after an unconditional `Return()`, up to the next
/// control-flow boundary, never execute.
fn unreachable_after_return(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    let doc = ctx.doc;
    for (index, ret) in ctx.calls.iter().enumerate() {
        if ret.name != "Return" {
            continue;
        }
        let ret_line = ret.range.start.line;
        if conditional_on_same_line(ctx, ret.block, ret_line) {
            continue;
        }

        for block in &doc.blocks[ret.block + 1..] {
            let line = doc.lines.position(block.span.start).line;
            if line == ret_line {
                continue;
            }
            if is_flow_boundary(ctx, block) {
                break;
            }
            let call_here = ctx.calls[index + 1..].iter().find(|c| {
                c.offset >= block.span.start
                    && c.offset < block.span.end
                    && c.name.starts_with(|ch: char| ch.is_ascii_uppercase())
            });
            if let Some(call) = call_here {
                out.push(Diagnostic::new(
                    DiagnosticCode::UnreachableCode,
                    format!(
                        "Unreachable code after Return() on line {ret_line}. This code will \
                         never execute."
                    ),
                    call.range,
                ));
                break;
            }
        }
    }
}

/// A `Return` wrapped in a single-line conditional executes conditionally.
fn conditional_on_same_line(ctx: &CheckContext<'_>, ret_block: usize, line: u32) -> bool {
    let doc = ctx.doc;
    let opens_before = doc.blocks[..ret_block].iter().any(|b| {
        doc.lines.position(b.span.start).line == line && is_conditional_open(ctx, b)
    });
    let closes_after = doc.blocks[ret_block + 1..].iter().any(|b| {
        doc.lines.position(b.span.start).line == line && is_conditional_close(ctx, b)
    });
    opens_before && closes_after
}

fn is_conditional_open(ctx: &CheckContext<'_>, block: &Block) -> bool {
    match block.kind {
        BlockKind::Statement => ctx.doc.statement_keyword(block).as_deref() == Some("if"),
        BlockKind::GuidanceOpen => guidance_name(ctx, block) == Some("if"),
        _ => false,
    }
}

fn is_conditional_close(ctx: &CheckContext<'_>, block: &Block) -> bool {
    match block.kind {
        BlockKind::Statement => ctx.doc.statement_keyword(block).as_deref() == Some("endif"),
        BlockKind::GuidanceClose => guidance_name(ctx, block) == Some("if"),
        _ => false,
    }
}

fn is_flow_boundary(ctx: &CheckContext<'_>, block: &Block) -> bool {
    match block.kind {
        BlockKind::Statement => matches!(
            ctx.doc.statement_keyword(block).as_deref(),
            Some("endif") | Some("endfor") | Some("else") | Some("elif")
        ),
        BlockKind::GuidanceClose => {
            matches!(guidance_name(ctx, block), Some("if") | Some("each") | Some("unless"))
        }
        // A bare `{{else}}` branches guidance control flow.
        BlockKind::Expression => ctx.doc.trimmed_inner(block).1 == "else",
        _ => false,
    }
}

fn guidance_name<'c>(ctx: &CheckContext<'c>, block: &Block) -> Option<&'c str> {
    ctx.doc
        .guidance
        .iter()
        .find(|t| {
            ctx.doc.blocks[t.block].span.start == block.span.start
        })
        .map(|t| t.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::checks::{run, CheckContext};
    use crate::analysis::calls::extract_calls;
    use crate::analysis::scanner::scan;
    use crate::analysis::table::build_table;
    use crate::analysis::Dialect;
    use crate::registry::RegistrySnapshot;

    fn diags(text: &str) -> Vec<Diagnostic> {
        let registry = RegistrySnapshot::with_defaults();
        let doc = scan(text);
        let calls = extract_calls(&doc, &registry);
        let table = build_table(&doc, &registry, &calls, &[]);
        run(&CheckContext {
            doc: &doc,
            registry: &registry,
            calls: &calls,
            table: &table,
            dialect: Dialect::Jinja,
            has_skill_params: false,
        })
    }

    fn has(text: &str, code: DiagnosticCode) -> bool {
        diags(text).iter().any(|d| d.code == code)
    }

    #[test]
    fn host_language_operators_in_conditions() {
        assert!(has("{% if a && b %}{% endif %}", DiagnosticCode::AndInCondition));
        assert!(has("{% if a || b %}{% endif %}", DiagnosticCode::OrInCondition));
        assert!(has("{% if !ready %}{% endif %}", DiagnosticCode::NotInCondition));
        assert!(!has("{% if a != b %}{% endif %}", DiagnosticCode::NotInCondition));
        assert!(!has(
            "{% if a == \"x && y\" %}{% endif %}",
            DiagnosticCode::AndInCondition
        ));
    }

    #[test]
    fn python_colon_and_assignment() {
        assert!(has("{% if done: %}{% endif %}", DiagnosticCode::TrailingColon));
        assert!(has("{% if mode = \"on\" %}{% endif %}", DiagnosticCode::AssignmentInCondition));
        assert!(!has("{% if mode == \"on\" %}{% endif %}", DiagnosticCode::AssignmentInCondition));
        assert!(!has("{% if a >= 1 %}{% endif %}", DiagnosticCode::AssignmentInCondition));
    }

    #[test]
    fn keyword_arguments_in_conditions_are_fine() {
        assert!(!has(
            "{% if IsEmpty(text=value) %}{% endif %}",
            DiagnosticCode::AssignmentInCondition
        ));
    }

    #[test]
    fn increment_and_decrement() {
        assert!(has("{% set counter++ %}", DiagnosticCode::IncrementOperator));
        assert!(has("{% set counter = counter-- %}", DiagnosticCode::DecrementOperator));
        assert!(!has("{%- set a = 1 -%}", DiagnosticCode::DecrementOperator));
    }

    #[test]
    fn js_default_pattern_in_set() {
        assert!(has("{% set v = a || \"fallback\" %}", DiagnosticCode::OrInSet));
        assert!(!has("{% set v = a or \"fallback\" %}", DiagnosticCode::OrInSet));
    }

    #[test]
    fn loop_control_outside_loop() {
        assert!(has("{% break %}", DiagnosticCode::BreakOutsideLoop));
        assert!(has("{% continue %}", DiagnosticCode::ContinueOutsideLoop));
        assert!(!has(
            "{% for x in items %}{% break %}{% endfor %}",
            DiagnosticCode::BreakOutsideLoop
        ));
    }

    #[test]
    fn code_after_return_is_unreachable() {
        let text = "{{Return(val=\"done\")}}\n{{SendMessage(message=\"never\")}}";
        assert!(has(text, DiagnosticCode::UnreachableCode));
    }

    #[test]
    fn conditional_return_is_reachable() {
        let text =
            "{% if a %}{{Return(val=\"x\")}}{% endif %}\n{{SendMessage(message=\"hi\")}}";
        assert!(!has(text, DiagnosticCode::UnreachableCode));
    }

    #[test]
    fn branch_boundary_stops_the_scan() {
        let text = "{% if a %}\n{{Return(val=\"x\")}}\n{% endif %}\n{{SendMessage(message=\"hi\")}}";
        assert!(!has(text, DiagnosticCode::UnreachableCode));
    }
}
