//! Scope and symbol table: variable definitions, references, inferred
//! types, literal unions, and the scope queries the diagnostics and the
//! editor features share.
//!
//! Scope is line-granular. A definition either covers the whole file
//! (`scope_end_line: None`) or a line range ending at a loop or
//! conditional close. Two narrowing passes shrink file-scope `set`
//! definitions that sit inside loops or else-less conditionals; the guard
//! pattern (`{% if not x %}{% set x = default %}{% endif %}`) keeps file
//! scope because the condition mentions the name being set.

use std::collections::{HashMap, HashSet};

use crate::analysis::calls::{CallSite, Parameter as CallParameter};
use crate::analysis::document::{Block, BlockKind, Document};
use crate::analysis::position::{ByteSpan, Position};
use crate::registry::{
    RegistrySnapshot, ShapeId, ValueType, FILTERS, IMPLICIT_NAMES, KEYWORDS,
};

// ============================================================================
// Types
// ============================================================================

/// How a variable came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarSource {
    /// Declared skill parameter.
    Parameter,
    /// `{% set x = expr %}`
    Set,
    /// `{% set x %}...{% endset %}`
    SetCapture,
    /// `Set(name="x", value=expr)`
    SetAction,
    /// `{% for x in expr %}`
    ForLoop,
    /// The `loop` context variable.
    ForLoopContext,
}

impl VarSource {
    pub fn describe(&self) -> &'static str {
        match self {
            VarSource::Parameter => "skill parameter",
            VarSource::Set => "set statement",
            VarSource::SetCapture => "set capture block",
            VarSource::SetAction => "Set action",
            VarSource::ForLoop => "loop variable",
            VarSource::ForLoopContext => "loop context",
        }
    }

    fn is_set_like(&self) -> bool {
        matches!(self, VarSource::Set | VarSource::SetCapture | VarSource::SetAction)
    }
}

#[derive(Debug, Clone)]
pub struct VariableDefinition {
    pub name: String,
    /// 1-based line of the defining name.
    pub line: u32,
    /// 1-based column of the defining name.
    pub column: u32,
    pub source: VarSource,
    /// Raw right-hand-side expression, when there is one.
    pub value_expr: Option<String>,
    pub inferred_type: ValueType,
    /// Known literal value(s). More than one = union from branches.
    pub literal_values: Vec<String>,
    /// Last line the definition is visible on. `None` = file scope.
    pub scope_end_line: Option<u32>,
    /// End of the defining statement, for set-like definitions. The
    /// definition only takes effect past this point, so a reference inside
    /// the statement itself is use-before-define while one later on the
    /// same line is fine.
    pub statement_end: Option<Position>,
}

impl VariableDefinition {
    pub fn in_scope_at(&self, line: u32) -> bool {
        match self.scope_end_line {
            None => true,
            Some(end) => line >= self.line && line <= end,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VariableReference {
    pub name: String,
    pub line: u32,
    pub column: u32,
    /// Property accesses after the name: `act.arguments.name` -> ["arguments", "name"].
    pub property_chain: Vec<String>,
    /// True for references inside an `{% if %}` / `{% elif %}` condition.
    pub in_condition: bool,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    pub definitions: HashMap<String, Vec<VariableDefinition>>,
    pub references: Vec<VariableReference>,
    /// Every defined name, plus the implicit ones.
    pub all_names: HashSet<String>,
}

impl SymbolTable {
    fn add_def(&mut self, def: VariableDefinition) {
        self.all_names.insert(def.name.clone());
        self.definitions.entry(def.name.clone()).or_default().push(def);
    }
}

// ============================================================================
// Construction
// ============================================================================

/// Guidance helper names that take space-separated arguments; never
/// variable references.
const GUIDANCE_HELPERS: [&str; 5] = ["gen", "geneach", "select", "each", "unless"];

/// Build the symbol table for one document.
pub fn build_table(
    doc: &Document,
    registry: &RegistrySnapshot,
    calls: &[CallSite],
    skill_params: &[String],
) -> SymbolTable {
    let mut table = SymbolTable::default();

    // Declared skill parameters are defined before line one.
    for param in skill_params {
        table.add_def(VariableDefinition {
            name: param.clone(),
            line: 1,
            column: 1,
            source: VarSource::Parameter,
            value_expr: None,
            inferred_type: ValueType::Any,
            literal_values: Vec::new(),
            scope_end_line: None,
            statement_end: None,
        });
    }

    collect_set_statements(doc, registry, &mut table);
    collect_set_actions(doc, registry, calls, &mut table);
    let loop_ranges = collect_for_loops(doc, registry, &mut table);
    narrow_loop_scopes(&loop_ranges, &mut table);
    narrow_conditional_scopes(doc, &mut table);
    collect_references(doc, registry, &mut table);
    merge_branch_literals(&mut table);

    for name in IMPLICIT_NAMES.iter() {
        table.all_names.insert((*name).to_string());
    }
    table
}

fn collect_set_statements(doc: &Document, registry: &RegistrySnapshot, table: &mut SymbolTable) {
    for block in doc.blocks_of(BlockKind::Statement) {
        let Some(set) = parse_set(doc, block) else { continue };
        let pos = doc.lines.position(set.name_span.start);
        let end = doc.lines.position(block.span.end);
        match set.value_span {
            Some(value) => {
                let value_expr = doc.slice(value).trim().to_string();
                let (inferred_type, literal_values) = infer_type(&value_expr, registry);
                table.add_def(VariableDefinition {
                    name: doc.slice(set.name_span).to_string(),
                    line: pos.line,
                    column: pos.column,
                    source: VarSource::Set,
                    value_expr: Some(value_expr),
                    inferred_type,
                    literal_values,
                    scope_end_line: None,
                    statement_end: Some(end),
                });
            }
            None => {
                table.add_def(VariableDefinition {
                    name: doc.slice(set.name_span).to_string(),
                    line: pos.line,
                    column: pos.column,
                    source: VarSource::SetCapture,
                    value_expr: None,
                    inferred_type: ValueType::String,
                    literal_values: Vec::new(),
                    scope_end_line: None,
                    statement_end: Some(end),
                });
            }
        }
    }
}

fn collect_set_actions(
    doc: &Document,
    registry: &RegistrySnapshot,
    calls: &[CallSite],
    table: &mut SymbolTable,
) {
    for call in calls {
        if call.name != "Set" {
            continue;
        }
        let Some(name_param) = call.keyword_param("name") else { continue };
        if !name_param.is_string_literal() {
            continue;
        }
        let var_name = name_param.unquoted_value();
        if !crate::analysis::calls::is_identifier(var_name) {
            continue;
        }
        // Point at the name inside the string literal, not at `Set`.
        let pos = doc.lines.position(name_param.value_offset + 1);
        let (value_expr, inferred_type, literal_values) = match call.keyword_param("value") {
            Some(value) => {
                let expr = value.value.clone();
                let (ty, lits) = infer_type(&expr, registry);
                (Some(expr), ty, lits)
            }
            None => (None, ValueType::Any, Vec::new()),
        };
        table.add_def(VariableDefinition {
            name: var_name.to_string(),
            line: pos.line,
            column: pos.column,
            source: VarSource::SetAction,
            value_expr,
            inferred_type,
            literal_values,
            scope_end_line: None,
            statement_end: doc
                .blocks
                .get(call.block)
                .map(|b| doc.lines.position(b.span.end)),
        });
    }
}

struct LoopRange {
    start_line: u32,
    end_line: u32,
}

/// Pair `for`/`endfor` with a stack; only paired loops introduce loop
/// variables. An unclosed `for` is a structural error instead.
fn collect_for_loops(
    doc: &Document,
    registry: &RegistrySnapshot,
    table: &mut SymbolTable,
) -> Vec<LoopRange> {
    struct OpenFor {
        var_span: ByteSpan,
        iter_span: ByteSpan,
        line: u32,
        column: u32,
    }

    let mut ranges = Vec::new();
    let mut stack: Vec<OpenFor> = Vec::new();

    for block in doc.blocks_of(BlockKind::Statement) {
        match doc.statement_keyword(block).as_deref() {
            Some("for") => {
                if let Some(parsed) = parse_for(doc, block) {
                    let pos = doc.lines.position(block.span.start);
                    stack.push(OpenFor {
                        var_span: parsed.var_span,
                        iter_span: parsed.iter_span,
                        line: pos.line,
                        column: pos.column,
                    });
                }
            }
            Some("endfor") => {
                if let Some(open) = stack.pop() {
                    let end_line = doc.lines.position(block.span.start).line;
                    let iter_expr = doc.slice(open.iter_span).trim().to_string();
                    table.add_def(VariableDefinition {
                        name: doc.slice(open.var_span).to_string(),
                        line: open.line,
                        column: open.column,
                        source: VarSource::ForLoop,
                        value_expr: Some(iter_expr.clone()),
                        inferred_type: infer_element_type(&iter_expr, registry),
                        literal_values: Vec::new(),
                        scope_end_line: Some(end_line),
                        statement_end: None,
                    });
                    table.add_def(VariableDefinition {
                        name: "loop".to_string(),
                        line: open.line,
                        column: open.column,
                        source: VarSource::ForLoopContext,
                        value_expr: None,
                        inferred_type: registry
                            .shape_id("LoopContext")
                            .map(ValueType::Object)
                            .unwrap_or(ValueType::Any),
                        literal_values: Vec::new(),
                        scope_end_line: Some(end_line),
                        statement_end: None,
                    });
                    ranges.push(LoopRange { start_line: open.line, end_line });
                }
            }
            _ => {}
        }
    }
    ranges
}

/// File-scope `set` definitions written inside a loop body only live until
/// the loop closes.
fn narrow_loop_scopes(ranges: &[LoopRange], table: &mut SymbolTable) {
    for defs in table.definitions.values_mut() {
        for def in defs {
            if !matches!(def.source, VarSource::Set | VarSource::SetCapture)
                || def.scope_end_line.is_some()
            {
                continue;
            }
            for range in ranges {
                if def.line > range.start_line && def.line < range.end_line {
                    def.scope_end_line = Some(range.end_line);
                    break;
                }
            }
        }
    }
}

/// `set` definitions inside an else-less conditional only conditionally
/// exist, so they are scoped to the `endif` line. The guard pattern keeps
/// file scope: when the `if` condition mentions the name being set, the
/// branch exists to default that very variable.
fn narrow_conditional_scopes(doc: &Document, table: &mut SymbolTable) {
    struct OpenIf {
        line: u32,
        order: usize,
    }
    struct CondRange {
        start_line: u32,
        end_line: u32,
        has_else: bool,
        condition: String,
    }

    let mut else_orders: Vec<usize> = Vec::new();
    let mut stack: Vec<(OpenIf, String)> = Vec::new();
    let mut ranges: Vec<CondRange> = Vec::new();

    for (order, block) in doc.blocks.iter().enumerate() {
        if block.kind != BlockKind::Statement {
            continue;
        }
        match doc.statement_keyword(block).as_deref() {
            Some("if") => {
                let line = doc.lines.position(block.span.start).line;
                let condition = condition_text(doc, block).unwrap_or_default();
                stack.push((OpenIf { line, order }, condition));
            }
            Some("else") => else_orders.push(order),
            Some("endif") => {
                if let Some((open, condition)) = stack.pop() {
                    let end_line = doc.lines.position(block.span.start).line;
                    let has_else = else_orders
                        .iter()
                        .any(|&e| e > open.order && e < order);
                    ranges.push(CondRange {
                        start_line: open.line,
                        end_line,
                        has_else,
                        condition,
                    });
                }
            }
            _ => {}
        }
    }

    for (name, defs) in table.definitions.iter_mut() {
        for def in defs {
            if !matches!(def.source, VarSource::Set | VarSource::SetCapture)
                || def.scope_end_line.is_some()
            {
                continue;
            }
            for range in &ranges {
                if !range.has_else && def.line > range.start_line && def.line < range.end_line {
                    if contains_word(&range.condition, name) {
                        break;
                    }
                    def.scope_end_line = Some(range.end_line);
                    break;
                }
            }
        }
    }
}

// ============================================================================
// Reference extraction
// ============================================================================

fn collect_references(doc: &Document, registry: &RegistrySnapshot, table: &mut SymbolTable) {
    for block in &doc.blocks {
        match block.kind {
            BlockKind::Expression => {
                let (span, _) = doc.trimmed_inner(block);
                extract_idents(doc, registry, span, false, &mut table.references);
            }
            BlockKind::Statement => {
                if let Some(set) = parse_set(doc, block) {
                    if let Some(value) = set.value_span {
                        extract_idents(doc, registry, value, false, &mut table.references);
                    }
                    continue;
                }
                if let Some(parsed) = parse_for(doc, block) {
                    extract_idents(doc, registry, parsed.iter_span, false, &mut table.references);
                    continue;
                }
                if let Some(cond) = condition_span(doc, block) {
                    extract_idents(doc, registry, cond, true, &mut table.references);
                }
            }
            _ => {}
        }
    }

    // Guidance control-flow tags carry a trailing expression.
    for tag in &doc.guidance {
        if tag.is_close || !crate::registry::GUIDANCE_FLOW_TAGS.contains(tag.name.as_str()) {
            continue;
        }
        if let Some(args) = tag.args {
            extract_idents(doc, registry, args, false, &mut table.references);
        }
    }

    table.references.sort_by_key(|r| (r.line, r.column));
}

fn extract_idents(
    doc: &Document,
    registry: &RegistrySnapshot,
    span: ByteSpan,
    in_condition: bool,
    out: &mut Vec<VariableReference>,
) {
    let bytes = doc.text.as_bytes();
    let mut i = span.start;
    while i < span.end {
        let c = bytes[i];
        if !(c.is_ascii_alphabetic() || c == b'_') {
            i += 1;
            continue;
        }
        if i > span.start && (bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_') {
            i += 1;
            continue;
        }
        let name_start = i;
        while i < span.end && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
            i += 1;
        }
        let name_end = i;
        let name = &doc.text[name_start..name_end];

        // Property chain after the root name.
        let mut property_chain = Vec::new();
        while i < span.end && bytes[i] == b'.' {
            let prop_start = i + 1;
            let mut j = prop_start;
            while j < span.end && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                j += 1;
            }
            if j == prop_start {
                break;
            }
            property_chain.push(doc.text[prop_start..j].to_string());
            i = j;
        }

        let lower = name.to_ascii_lowercase();
        if KEYWORDS.contains(lower.as_str())
            || FILTERS.contains(lower.as_str())
            || GUIDANCE_HELPERS.contains(&lower.as_str())
            || registry.builtin(name).is_some()
            || IMPLICIT_NAMES.contains(name)
        {
            continue;
        }

        // Followed by `(`: a call, not a reference.
        let mut after = name_end;
        while after < span.end && bytes[after].is_ascii_whitespace() {
            after += 1;
        }
        if after < span.end && bytes[after] == b'(' {
            continue;
        }

        // Preceded by `.`: a property of something else.
        if name_start > 0 && bytes[name_start - 1] == b'.' {
            continue;
        }

        if inside_string(bytes, span.start, name_start) {
            continue;
        }

        // Followed by a single `=`: a keyword argument name.
        let mut eq = i;
        while eq < span.end && bytes[eq].is_ascii_whitespace() {
            eq += 1;
        }
        if eq < span.end && bytes[eq] == b'=' && bytes.get(eq + 1) != Some(&b'=') {
            continue;
        }

        let pos = doc.lines.position(name_start);
        out.push(VariableReference {
            name: name.to_string(),
            line: pos.line,
            column: pos.column,
            property_chain,
            in_condition,
        });
    }
}

fn inside_string(bytes: &[u8], from: usize, pos: usize) -> bool {
    let mut in_string = false;
    let mut string_char = 0u8;
    for i in from..pos {
        let c = bytes[i];
        if (c == b'"' || c == b'\'') && (i == 0 || bytes[i - 1] != b'\\') {
            if !in_string {
                in_string = true;
                string_char = c;
            } else if c == string_char {
                in_string = false;
            }
        }
    }
    in_string
}

// ============================================================================
// Branch literal merging
// ============================================================================

/// When every set-like definition of a name carries a literal value, the
/// last one gets the deduplicated union so hover shows the full value set.
/// A single non-literal definition disables the merge.
fn merge_branch_literals(table: &mut SymbolTable) {
    for defs in table.definitions.values_mut() {
        if defs.len() <= 1 {
            continue;
        }
        let set_indexes: Vec<usize> = defs
            .iter()
            .enumerate()
            .filter(|(_, d)| d.source.is_set_like())
            .map(|(i, _)| i)
            .collect();
        if set_indexes.len() <= 1 {
            continue;
        }
        let mut union: Vec<String> = Vec::new();
        let mut all_literal = true;
        for &i in &set_indexes {
            if defs[i].literal_values.is_empty() {
                all_literal = false;
                break;
            }
            for value in &defs[i].literal_values {
                if !union.contains(value) {
                    union.push(value.clone());
                }
            }
        }
        if all_literal {
            let last = *set_indexes.last().unwrap_or(&0);
            defs[last].literal_values = union;
        }
    }
}

// ============================================================================
// Statement mini-parsers
// ============================================================================

pub(crate) struct SetStatement {
    pub(crate) name_span: ByteSpan,
    /// `None` for capture blocks (`{% set x %}`).
    pub(crate) value_span: Option<ByteSpan>,
}

pub(crate) fn parse_set(doc: &Document, block: &Block) -> Option<SetStatement> {
    let (span, content) = doc.trimmed_inner(block);
    let rest = strip_keyword(content, "set")?;
    let consumed = content.len() - rest.len();
    let name_rel = consumed + leading_ws(rest);
    let rest = rest.trim_start();
    let name_len = ident_len(rest);
    if name_len == 0 {
        return None;
    }
    let name_span = ByteSpan::new(span.start + name_rel, span.start + name_rel + name_len);
    let after = rest[name_len..].trim_start();
    if let Some(value) = after.strip_prefix('=') {
        if value.starts_with('=') {
            return None;
        }
        let value_rel = content.len() - value.len();
        return Some(SetStatement {
            name_span,
            value_span: Some(ByteSpan::new(span.start + value_rel, span.end)),
        });
    }
    if after.is_empty() {
        return Some(SetStatement { name_span, value_span: None });
    }
    None
}

pub(crate) struct ForStatement {
    pub(crate) var_span: ByteSpan,
    pub(crate) iter_span: ByteSpan,
}

pub(crate) fn parse_for(doc: &Document, block: &Block) -> Option<ForStatement> {
    let (span, content) = doc.trimmed_inner(block);
    let rest = strip_keyword(content, "for")?;
    let consumed = content.len() - rest.len();
    let var_rel = consumed + leading_ws(rest);
    let rest = rest.trim_start();
    let var_len = ident_len(rest);
    if var_len == 0 {
        return None;
    }
    let var_span = ByteSpan::new(span.start + var_rel, span.start + var_rel + var_len);
    let after = rest[var_len..].trim_start();
    let iter = strip_keyword(after, "in")?;
    let iter = iter.trim_start();
    if iter.is_empty() {
        return None;
    }
    let iter_rel = content.len() - iter.len();
    Some(ForStatement {
        var_span,
        iter_span: ByteSpan::new(span.start + iter_rel, span.end),
    })
}

/// Span of the condition in an `if` or `elif` statement.
pub(crate) fn condition_span(doc: &Document, block: &Block) -> Option<ByteSpan> {
    let (span, content) = doc.trimmed_inner(block);
    let rest = strip_keyword(content, "if").or_else(|| strip_keyword(content, "elif"))?;
    let rest = rest.trim_start();
    if rest.is_empty() {
        return None;
    }
    let rel = content.len() - rest.len();
    Some(ByteSpan::new(span.start + rel, span.end))
}

fn condition_text(doc: &Document, block: &Block) -> Option<String> {
    condition_span(doc, block).map(|s| doc.slice(s).to_string())
}

/// Strip a leading keyword followed by whitespace, case-insensitively.
fn strip_keyword<'a>(content: &'a str, keyword: &str) -> Option<&'a str> {
    if content.len() <= keyword.len()
        || !content[..keyword.len()].eq_ignore_ascii_case(keyword)
    {
        return None;
    }
    let rest = &content[keyword.len()..];
    rest.starts_with(|c: char| c.is_ascii_whitespace()).then_some(rest)
}

fn leading_ws(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

fn ident_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    if bytes.is_empty() || !(bytes[0].is_ascii_alphabetic() || bytes[0] == b'_') {
        return 0;
    }
    bytes
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count()
}

fn contains_word(text: &str, word: &str) -> bool {
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(found) = text[start..].find(word) {
        let at = start + found;
        let before_ok = at == 0
            || !(bytes[at - 1].is_ascii_alphanumeric() || bytes[at - 1] == b'_');
        let end = at + word.len();
        let after_ok = end >= bytes.len()
            || !(bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_');
        if before_ok && after_ok {
            return true;
        }
        start = at + 1;
    }
    false
}

// ============================================================================
// Type inference
// ============================================================================

fn infer_type(value_expr: &str, registry: &RegistrySnapshot) -> (ValueType, Vec<String>) {
    let expr = value_expr.trim();

    if let Some(name) = leading_call_name(expr) {
        return match registry.return_type(name) {
            Some(ty) => (ty, Vec::new()),
            None => (ValueType::Any, Vec::new()),
        };
    }
    if expr.len() >= 2 {
        let first = expr.as_bytes()[0];
        let last = expr.as_bytes()[expr.len() - 1];
        if (first == b'"' || first == b'\'') && first == last {
            return (ValueType::String, vec![expr[1..expr.len() - 1].to_string()]);
        }
    }
    if is_numeric_literal(expr) {
        return (ValueType::Number, vec![expr.to_string()]);
    }
    if expr.eq_ignore_ascii_case("true") || expr.eq_ignore_ascii_case("false") {
        return (ValueType::Boolean, vec![expr.to_ascii_lowercase()]);
    }
    if expr.starts_with('[') {
        return (ValueType::Array(ShapeId::UNKNOWN), Vec::new());
    }
    if expr.starts_with('{') {
        return (ValueType::Object(ShapeId::UNKNOWN), Vec::new());
    }
    if expr == "none" || expr == "None" || expr == "null" {
        return (ValueType::None, vec!["none".to_string()]);
    }
    if expr.contains('~') || expr.contains('|') {
        return (ValueType::String, Vec::new());
    }
    (ValueType::Any, Vec::new())
}

/// Element type of the iterable in a for-loop: shaped when the iterable is
/// an action returning an array of shaped objects.
fn infer_element_type(iter_expr: &str, registry: &RegistrySnapshot) -> ValueType {
    if let Some(name) = leading_call_name(iter_expr.trim()) {
        if let Some(ValueType::Array(shape)) = registry.return_type(name) {
            if shape != ShapeId::UNKNOWN {
                return ValueType::Object(shape);
            }
        }
    }
    ValueType::Any
}

fn leading_call_name(expr: &str) -> Option<&str> {
    let len = ident_len(expr);
    if len == 0 {
        return None;
    }
    let rest = expr[len..].trim_start();
    rest.starts_with('(').then(|| &expr[..len])
}

fn is_numeric_literal(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    if s.is_empty() {
        return false;
    }
    let mut parts = s.splitn(2, '.');
    let int = parts.next().unwrap_or("");
    let frac = parts.next();
    !int.is_empty()
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}

// ============================================================================
// Queries
// ============================================================================

/// Variables visible at a line, closest definition first, deduplicated by
/// name. Used by completion.
pub fn variables_at_line(table: &SymbolTable, line: u32) -> Vec<&VariableDefinition> {
    let mut result: Vec<&VariableDefinition> = table
        .definitions
        .values()
        .flatten()
        .filter(|def| def.in_scope_at(line))
        .collect();

    fn source_priority(source: VarSource) -> u8 {
        match source {
            VarSource::Set | VarSource::SetCapture | VarSource::SetAction => 0,
            VarSource::ForLoop => 1,
            VarSource::ForLoopContext => 2,
            VarSource::Parameter => 3,
        }
    }

    result.sort_by_key(|def| {
        (line.abs_diff(def.line), source_priority(def.source))
    });

    let mut seen = HashSet::new();
    result.retain(|def| seen.insert(def.name.as_str()));
    result
}

/// Best definition of `name` visible at `line`: the latest one at or before
/// the line, falling back to the first in-scope one.
pub fn find_definition<'t>(
    table: &'t SymbolTable,
    name: &str,
    line: u32,
) -> Option<&'t VariableDefinition> {
    let defs = table.definitions.get(name)?;
    defs.iter()
        .filter(|def| def.in_scope_at(line) && def.line <= line)
        .max_by_key(|def| def.line)
        .or_else(|| defs.iter().find(|def| def.in_scope_at(line)))
}

/// References with no valid definition: unknown names, out-of-scope uses,
/// and uses before definition. References inside conditions are exempt from
/// the ordering rule whenever the name is defined anywhere, which keeps the
/// guard pattern quiet.
pub fn undefined_references(table: &SymbolTable) -> Vec<&VariableReference> {
    let mut result = Vec::new();
    for reference in &table.references {
        if !table.all_names.contains(&reference.name) {
            result.push(reference);
            continue;
        }
        let Some(defs) = table.definitions.get(&reference.name) else {
            continue; // implicit
        };
        if defs.is_empty() || reference.in_condition {
            continue;
        }
        let valid = defs.iter().any(|def| match def.source {
            VarSource::Parameter | VarSource::ForLoopContext => true,
            VarSource::ForLoop => {
                reference.line >= def.line
                    && def.scope_end_line.map_or(true, |end| reference.line <= end)
            }
            // Set-like definitions take effect after their statement ends, so
            // a reference inside it (`{% set x = x + 1 %}`) is not yet valid,
            // while one later on the same line is.
            VarSource::Set | VarSource::SetCapture | VarSource::SetAction => {
                def.in_scope_at(reference.line)
                    && match def.statement_end {
                        Some(end) => {
                            (reference.line, reference.column) >= (end.line, end.column)
                        }
                        None => def.line < reference.line,
                    }
            }
        });
        if !valid {
            result.push(reference);
        }
    }
    result
}

/// Definitions whose name is never referenced. Parameters and loop-context
/// names are exempt; callers decide how to treat `Set` actions.
pub fn unused_definitions(table: &SymbolTable) -> Vec<&VariableDefinition> {
    let referenced: HashSet<&str> =
        table.references.iter().map(|r| r.name.as_str()).collect();
    let mut unused = Vec::new();
    for (name, defs) in &table.definitions {
        if defs
            .iter()
            .any(|d| matches!(d.source, VarSource::Parameter | VarSource::ForLoopContext))
        {
            continue;
        }
        if IMPLICIT_NAMES.contains(name.as_str()) || referenced.contains(name.as_str()) {
            continue;
        }
        if let Some(first) = defs.first() {
            unused.push(first);
        }
    }
    unused.sort_by_key(|d| (d.line, d.column));
    unused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::calls::extract_calls;
    use crate::analysis::scanner::scan;

    fn build(text: &str) -> SymbolTable {
        build_with_params(text, &[])
    }

    fn build_with_params(text: &str, params: &[&str]) -> SymbolTable {
        let registry = RegistrySnapshot::with_defaults();
        let doc = scan(text);
        let calls = extract_calls(&doc, &registry);
        let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        build_table(&doc, &registry, &calls, &params)
    }

    #[test]
    fn set_statement_defines_with_literal() {
        let table = build("{% set greeting = \"hello\" %}\n{{ greeting }}");
        let defs = &table.definitions["greeting"];
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].source, VarSource::Set);
        assert_eq!(defs[0].inferred_type, ValueType::String);
        assert_eq!(defs[0].literal_values, vec!["hello"]);
        assert_eq!(defs[0].scope_end_line, None);
    }

    #[test]
    fn set_action_definition_points_into_string() {
        let table = build("{{Set(name=\"user_name\", value=GetUser(field=\"name\"))}}");
        let def = &table.definitions["user_name"][0];
        assert_eq!(def.source, VarSource::SetAction);
        // Column of the `u` inside the quoted name.
        assert_eq!(def.column, 12);
        match def.inferred_type {
            ValueType::Object(_) => {}
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn for_loop_variable_scoped_to_endfor() {
        let text = "{% for actor in GetActors() %}\n{{ actor }}\n{% endfor %}\n{{ actor }}";
        let table = build(text);
        let def = &table.definitions["actor"][0];
        assert_eq!(def.source, VarSource::ForLoop);
        assert_eq!(def.scope_end_line, Some(3));
        // The loop context variable shares the scope.
        assert_eq!(table.definitions["loop"][0].scope_end_line, Some(3));
    }

    #[test]
    fn set_inside_loop_is_narrowed() {
        let text = "{% for a in items %}\n{% set inner = a %}\n{% endfor %}\n{{ inner }}";
        let table = build(text);
        assert_eq!(table.definitions["inner"][0].scope_end_line, Some(3));
        let undefined = undefined_references(&table);
        assert!(undefined.iter().any(|r| r.name == "inner" && r.line == 4));
    }

    #[test]
    fn set_inside_else_less_conditional_is_narrowed() {
        let text = "{% if ready %}\n{% set flag = \"y\" %}\n{% endif %}\n{{ flag }}";
        let table = build(text);
        assert_eq!(table.definitions["flag"][0].scope_end_line, Some(3));
    }

    #[test]
    fn conditional_with_else_keeps_file_scope() {
        let text = "{% if x %}\n{% set flag = \"y\" %}\n{% else %}\n{% set flag = \"n\" %}\n{% endif %}\n{{ flag }}";
        let table = build(text);
        for def in &table.definitions["flag"] {
            assert_eq!(def.scope_end_line, None);
        }
        assert!(undefined_references(&table).is_empty());
    }

    #[test]
    fn guard_pattern_keeps_file_scope() {
        let text = "{% if not mode %}\n{% set mode = \"default\" %}\n{% endif %}\n{{ mode }}";
        let table = build(text);
        assert_eq!(table.definitions["mode"][0].scope_end_line, None);
        // The in-condition reference to `mode` is exempt from ordering.
        assert!(undefined_references(&table).is_empty());
    }

    #[test]
    fn use_before_definition_is_flagged() {
        let text = "{{ greeting }}\n{% set greeting = \"hi\" %}";
        let table = build(text);
        let undefined = undefined_references(&table);
        assert_eq!(undefined.len(), 1);
        assert_eq!(undefined[0].line, 1);
    }

    #[test]
    fn same_line_self_reference_is_flagged() {
        let table = build("{% set x = x + 1 %}");
        let undefined = undefined_references(&table);
        assert_eq!(undefined.len(), 1);
        assert_eq!(undefined[0].name, "x");
    }

    #[test]
    fn single_line_guard_reads_past_statement_end() {
        let table = build("{% if not x %}{% set x = \"d\" %}{% endif %}{{ x }}");
        assert!(undefined_references(&table).is_empty());
    }

    #[test]
    fn skill_parameters_always_valid() {
        let table = build_with_params("{{ tone }}", &["tone"]);
        assert!(undefined_references(&table).is_empty());
    }

    #[test]
    fn branch_literals_merge_to_last_definition() {
        let text = "{% if a %}{% set x = \"one\" %}{% else %}{% set x = \"two\" %}{% endif %}\n{{ x }}";
        let table = build(text);
        let defs = &table.definitions["x"];
        assert_eq!(defs.last().unwrap().literal_values, vec!["one", "two"]);
    }

    #[test]
    fn non_literal_branch_disables_merge() {
        let text =
            "{% if a %}{% set x = \"one\" %}{% else %}{% set x = GetUser() %}{% endif %}\n{{ x }}";
        let table = build(text);
        let defs = &table.definitions["x"];
        assert_eq!(defs.last().unwrap().literal_values, Vec::<String>::new());
    }

    #[test]
    fn property_chain_is_captured() {
        let table = build("{% set act = GetTriggeredAct() %}\n{{ act.arguments.name }}");
        let reference = table
            .references
            .iter()
            .find(|r| r.name == "act" && r.line == 2)
            .unwrap();
        assert_eq!(reference.property_chain, vec!["arguments", "name"]);
    }

    #[test]
    fn implicit_names_never_undefined() {
        let table = build("{{ loop.index }}{{ datetime.now() }}{{ true }}");
        assert!(undefined_references(&table).is_empty());
    }

    #[test]
    fn unused_definitions_reported_once() {
        let table = build("{% set a = 1 %}{% set b = 2 %}\n{{ b }}");
        let unused = unused_definitions(&table);
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].name, "a");
    }

    #[test]
    fn completion_query_prefers_closest() {
        let text = "{% set x = 1 %}\n\n\n{% set x = 2 %}\n{{ x }}";
        let table = build(text);
        let vars = variables_at_line(&table, 5);
        let x = vars.iter().find(|d| d.name == "x").unwrap();
        assert_eq!(x.line, 4);
    }

    #[test]
    fn find_definition_falls_back_to_first_in_scope() {
        let table = build_with_params("{{ tone }}", &["tone"]);
        let def = find_definition(&table, "tone", 1).unwrap();
        assert_eq!(def.source, VarSource::Parameter);
    }

    #[test]
    fn keyword_argument_names_are_not_references() {
        let table = build("{{SendSystemEvent(eventIdn=\"go\", userId=uid)}}");
        assert!(table.references.iter().all(|r| r.name != "eventIdn"));
        assert!(table.references.iter().any(|r| r.name == "uid"));
    }
}
