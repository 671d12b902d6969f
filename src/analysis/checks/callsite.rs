//! Call-site checks: argument hygiene, unknown targets, required
//! parameters, value constraints, and a few expression-shape mistakes
//! (bare actions, actions as filters, `${}` interpolation).
//!
//! Nested calls are first-class call sites in the arena, so required
//! parameters of a call buried in another call's arguments are checked by
//! the same loop as everything else.

use std::collections::HashSet;

use super::{inside_string, CheckContext};
use crate::analysis::calls::{CallKind, CallSite, ParamKind};
use crate::analysis::diag::{Diagnostic, DiagnosticCode};
use crate::analysis::document::{BlockKind, Document};
use crate::analysis::similar::{suggest, FUNCTION_DISTANCE, VARIABLE_DISTANCE};
use crate::registry::{BuiltinAction, PLATFORM_FUNCTIONS};

pub(super) fn check(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    expression_shape(ctx, out);
    dollar_interpolation(ctx, out);

    let skill_aware = ctx.registry.skill_count() > 0;
    for call in ctx.calls {
        if PLATFORM_FUNCTIONS.contains(call.name.as_str()) {
            continue;
        }
        check_call(ctx, call, skill_aware, out);
    }
}

fn check_call(
    ctx: &CheckContext<'_>,
    call: &CallSite,
    skill_aware: bool,
    out: &mut Vec<Diagnostic>,
) {
    let doc = ctx.doc;
    let name = call.name.as_str();
    let statement_ctx = doc.blocks[call.block].kind == BlockKind::Statement;
    let is_builtin = call.kind == CallKind::Builtin;
    let pascal = name.starts_with(|c: char| c.is_ascii_uppercase());

    let Some(extent) = call_extent(doc, call) else { return };

    if extent.unclosed_string && (!statement_ctx || pascal || is_builtin) {
        out.push(Diagnostic::new(
            DiagnosticCode::UnclosedString,
            format!("{name}: unclosed string literal in arguments."),
            call.range,
        ));
    }

    let args = &doc.text[extent.open + 1..extent.end];
    if args.contains('\t') {
        out.push(Diagnostic::new(
            DiagnosticCode::TabInArguments,
            format!(
                "{name}: tab character found in arguments. This may break parameter parsing. \
                 Use spaces instead."
            ),
            call.range,
        ));
    }

    let mut seen = HashSet::new();
    for param in &call.params {
        if let Some(param_name) = &param.name {
            if !seen.insert(param_name.as_str()) {
                out.push(Diagnostic::new(
                    DiagnosticCode::DuplicateParameter,
                    format!(
                        "{name}: duplicate parameter '{param_name}'. Only the last value will \
                         be used."
                    ),
                    call.range,
                ));
            }
        }
    }

    if has_semicolon_separator(doc, extent.open, extent.end) {
        out.push(Diagnostic::new(
            DiagnosticCode::SemicolonInArguments,
            format!("{name}: semicolons found in arguments. Use commas to separate parameters."),
            call.range,
        ));
    }

    let passed: HashSet<&str> = call
        .params
        .iter()
        .filter_map(|p| p.name.as_deref())
        .collect();
    let positional_count = call
        .params
        .iter()
        .filter(|p| p.kind == ParamKind::Positional)
        .count();

    if let Some(action) = ctx.registry.builtin(name) {
        check_builtin(call, action, &passed, positional_count, out);
    } else if skill_aware {
        match ctx.registry.resolve_skill(name) {
            None => {
                let pool = ctx
                    .registry
                    .builtin_names()
                    .chain(ctx.registry.skill_names());
                let suggestions = suggest(name, pool, FUNCTION_DISTANCE);
                // Lowercase names with no close match are typically
                // platform-injected or cross-skill calls the catalog never
                // sees; statements additionally carry too much prose to
                // trust suggestions alone.
                let report = if statement_ctx {
                    pascal
                } else {
                    pascal || !suggestions.is_empty()
                };
                if report {
                    let did_you_mean = suggestions
                        .first()
                        .map(|s| format!(". Did you mean '{s}'?"))
                        .unwrap_or_default();
                    out.push(
                        Diagnostic::new(
                            DiagnosticCode::UnknownFunction,
                            format!("Unknown function '{name}'{did_you_mean}"),
                            call.range,
                        )
                        .with_suggestions(suggestions),
                    );
                }
            }
            Some(info) => {
                // Skills accept extra caller-defined context parameters, so
                // only missing required ones are reported. Positional
                // arguments satisfy missing parameters in declaration order.
                let mut positional_left = positional_count;
                for param in &info.parameters {
                    if !param.required || passed.contains(param.name.as_str()) {
                        continue;
                    }
                    if positional_left > 0 {
                        positional_left -= 1;
                        continue;
                    }
                    out.push(Diagnostic::new(
                        DiagnosticCode::MissingRequiredParameter,
                        format!("{name}: missing parameter '{}'", param.name),
                        call.range,
                    ));
                }
            }
        }

        // A non-builtin call whose own name reappears in its argument list
        // recurses into itself.
        if ctx.calls.iter().any(|d| {
            d.name == call.name && d.offset > extent.open && d.offset < extent.end
        }) {
            out.push(Diagnostic::new(
                DiagnosticCode::RecursiveSkillCall,
                format!(
                    "{name}: recursive call detected. '{name}' calls itself in its own \
                     arguments, which may cause infinite recursion."
                ),
                call.range,
            ));
        }
    }
}

fn check_builtin(
    call: &CallSite,
    action: &BuiltinAction,
    passed: &HashSet<&str>,
    positional_count: usize,
    out: &mut Vec<Diagnostic>,
) {
    let name = call.name.as_str();

    if positional_count == 0 {
        for param in &action.required_params {
            if !passed.contains(param.as_str()) {
                out.push(Diagnostic::new(
                    DiagnosticCode::MissingRequiredParameter,
                    format!("{name}: missing required parameter '{param}'"),
                    call.range,
                ));
            }
        }
    }

    if !action.variadic {
        for param in &call.params {
            let Some(param_name) = &param.name else { continue };
            if action.accepts_param(param_name) {
                continue;
            }
            let pool = action
                .required_params
                .iter()
                .chain(&action.optional_params)
                .map(String::as_str);
            let suggestions = suggest(param_name, pool, VARIABLE_DISTANCE);
            let did_you_mean = suggestions
                .first()
                .map(|s| format!(". Did you mean '{s}'?"))
                .unwrap_or_default();
            out.push(
                Diagnostic::new(
                    DiagnosticCode::UnknownParameter,
                    format!("{name}: unknown parameter '{param_name}'{did_you_mean}"),
                    call.range,
                )
                .with_suggestions(suggestions),
            );
        }
    }

    for constraint in &action.constraints {
        let Some(param) = call.keyword_param(&constraint.param) else { continue };
        let value = param.unquoted_value();
        if param.is_string_literal()
            && !constraint.allowed.is_empty()
            && !constraint.allowed.iter().any(|a| a == value)
        {
            out.push(Diagnostic::new(
                DiagnosticCode::InvalidParameterValue,
                format!(
                    "{name}: invalid value '{value}' for parameter '{}'. Allowed: {}",
                    constraint.param,
                    constraint.allowed.join(", ")
                ),
                call.range,
            ));
        }
        if constraint.min.is_some() || constraint.max.is_some() {
            if let Ok(num) = value.parse::<f64>() {
                if let Some(min) = constraint.min {
                    if num < min {
                        out.push(Diagnostic::new(
                            DiagnosticCode::InvalidParameterValue,
                            format!(
                                "{name}: value {num} for '{}' is below minimum {min}",
                                constraint.param
                            ),
                            call.range,
                        ));
                    }
                }
                if let Some(max) = constraint.max {
                    if num > max {
                        out.push(Diagnostic::new(
                            DiagnosticCode::InvalidParameterValue,
                            format!(
                                "{name}: value {num} for '{}' exceeds maximum {max}",
                                constraint.param
                            ),
                            call.range,
                        ));
                    }
                }
            }
        }
    }
}

// ============================================================================
// Expression-shape checks
// ============================================================================

/// Bare actions (`{{GetUser}}`), actions used as filters
/// (`{{ x | Stringify }}`), and trailing pipes (`{{ x | }}`).
fn expression_shape(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    let doc = ctx.doc;
    for block in doc.blocks_of(BlockKind::Expression) {
        let (span, content) = doc.trimmed_inner(block);
        if content.is_empty() {
            continue;
        }

        let word_len = content
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        let word = &content[..word_len];
        if !word.is_empty() && ctx.registry.builtin(word).is_some() {
            let after = content[word_len..].trim_start();
            if !after.starts_with('(') && (after.is_empty() || after.starts_with('|')) {
                out.push(Diagnostic::new(
                    DiagnosticCode::BareActionStatement,
                    format!("Action '{word}' used without parentheses. Did you mean '{word}(...)'?"),
                    doc.lines.range_at(span.start, word_len),
                ));
            }
        }

        let Some(pipe) = last_pipe_outside_strings(doc, span) else { continue };
        let tail = &doc.text[pipe + 1..span.end];
        if tail.trim().is_empty() {
            out.push(Diagnostic::new(
                DiagnosticCode::TrailingPipe,
                "Trailing pipe '|' with no filter name. Add a filter after '|' or remove it.",
                doc.range_of(block),
            ));
            continue;
        }
        let filter_start = pipe + 1 + (tail.len() - tail.trim_start().len());
        let filter_len = doc.text[filter_start..span.end]
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        let filter = &doc.text[filter_start..filter_start + filter_len];
        if ctx.registry.builtin(filter).is_some()
            && doc.text[filter_start + filter_len..span.end].trim().is_empty()
        {
            out.push(Diagnostic::new(
                DiagnosticCode::ActionAsFilter,
                format!(
                    "Action '{filter}' used as a filter. Actions must be called with \
                     parentheses: '{filter}(...)'."
                ),
                doc.lines.range_at(filter_start, filter_len),
            ));
        }
    }
}

/// `${var}` in raw text: a host-language interpolation habit that the
/// template engine renders literally.
fn dollar_interpolation(ctx: &CheckContext<'_>, out: &mut Vec<Diagnostic>) {
    let doc = ctx.doc;
    let bytes = doc.text.as_bytes();
    for block in doc.blocks_of(BlockKind::Text) {
        let mut i = block.span.start;
        while i + 1 < block.span.end {
            if bytes[i] != b'$' || bytes[i + 1] != b'{' {
                i += 1;
                continue;
            }
            let name_start = i + 2;
            let mut j = name_start;
            while j < block.span.end
                && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_' || bytes[j] == b'.')
            {
                j += 1;
            }
            if j > name_start
                && (bytes[name_start].is_ascii_alphabetic() || bytes[name_start] == b'_')
                && bytes.get(j) == Some(&b'}')
            {
                let var = &doc.text[name_start..j];
                out.push(Diagnostic::new(
                    DiagnosticCode::DollarInterpolation,
                    format!(
                        "Template literal '${{{var}}}' found. Use '{{{{ {var} }}}}' instead."
                    ),
                    doc.lines.range_at(i, j + 1 - i),
                ));
                i = j + 1;
            } else {
                i += 2;
            }
        }
    }
}

// ============================================================================
// Call text primitives
// ============================================================================

struct CallExtent {
    /// Offset of the opening parenthesis.
    open: usize,
    /// Offset just past the closing parenthesis, or the block end when the
    /// argument list never closes.
    end: usize,
    unclosed_string: bool,
}

fn call_extent(doc: &Document, call: &CallSite) -> Option<CallExtent> {
    let bytes = doc.text.as_bytes();
    let limit = doc.blocks[call.block].inner.end;

    let mut i = call.offset + call.name.len();
    while i < limit && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    if i >= limit || bytes[i] != b'(' {
        return None;
    }
    let open = i;

    let mut depth = 0u32;
    let mut in_string = false;
    let mut string_char = 0u8;
    while i < limit {
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
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(CallExtent { open, end: i + 1, unclosed_string: false });
                }
            }
            _ => {}
        }
        i += 1;
    }
    Some(CallExtent { open, end: limit, unclosed_string: in_string })
}

/// `;` at argument depth 1, outside strings.
fn has_semicolon_separator(doc: &Document, open: usize, end: usize) -> bool {
    let bytes = doc.text.as_bytes();
    let mut depth = 0u32;
    let mut in_string = false;
    let mut string_char = 0u8;
    let mut i = open;
    while i < end {
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
            b')' => depth = depth.saturating_sub(1),
            b';' if depth == 1 => return true,
            _ => {}
        }
        i += 1;
    }
    false
}

fn last_pipe_outside_strings(
    doc: &Document,
    span: crate::analysis::position::ByteSpan,
) -> Option<usize> {
    let bytes = doc.text.as_bytes();
    let mut last = None;
    for i in span.start..span.end {
        if bytes[i] == b'|' && !inside_string(bytes, span.start, i) {
            last = Some(i);
        }
    }
    last
}
