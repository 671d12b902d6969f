//! Registries the analyzer consults: builtin actions, known skills, object
//! shapes, and the fixed template vocabularies.
//!
//! All registry data lives in an immutable [`RegistrySnapshot`]. Callers that
//! need fresher data build a new snapshot and swap it whole; analysis code
//! only ever borrows one. Every lookup tolerates absence — an empty snapshot
//! weakens some checks but never breaks analysis.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use once_cell::sync::Lazy;

mod builtins;
pub mod schema;

pub use schema::{SchemaError, SchemaSet};

// ============================================================================
// Value types and object shapes
// ============================================================================

/// Index into a snapshot's shape table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(pub u16);

impl ShapeId {
    /// Stand-in for object/array values with no known shape.
    pub const UNKNOWN: ShapeId = ShapeId(u16::MAX);
}

/// The closed set of value types the analyzer tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Object(ShapeId),
    Array(ShapeId),
    String,
    Boolean,
    Number,
    None,
    Any,
}

impl ValueType {
    /// Short name used in hovers and messages.
    pub fn describe(&self) -> &'static str {
        match self {
            ValueType::Object(_) => "object",
            ValueType::Array(_) => "array",
            ValueType::String => "string",
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::None => "none",
            ValueType::Any => "any",
        }
    }
}

/// A property of an object shape.
#[derive(Debug, Clone)]
pub struct ShapeProperty {
    pub name: &'static str,
    pub type_name: &'static str,
    pub doc: &'static str,
}

/// Named object shape: the properties available behind dot access on a
/// value returned by a builtin action.
#[derive(Debug, Clone)]
pub struct ObjectShape {
    pub name: &'static str,
    pub doc: &'static str,
    pub properties: Vec<ShapeProperty>,
}

// ============================================================================
// Builtin actions and skills
// ============================================================================

/// Value constraint on one named parameter.
#[derive(Debug, Clone)]
pub struct ParamConstraint {
    pub param: String,
    /// Allowed literal values, case-sensitive. Empty = no enumeration.
    pub allowed: Vec<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// One builtin action from the catalog.
#[derive(Debug, Clone)]
pub struct BuiltinAction {
    pub name: String,
    pub syntax: String,
    pub doc: String,
    pub required_params: Vec<String>,
    pub optional_params: Vec<String>,
    /// Variadic actions accept arbitrary keyword arguments, so the
    /// unknown-parameter check skips them.
    pub variadic: bool,
    pub constraints: Vec<ParamConstraint>,
}

impl BuiltinAction {
    pub fn accepts_param(&self, name: &str) -> bool {
        self.variadic
            || self.required_params.iter().any(|p| p == name)
            || self.optional_params.iter().any(|p| p == name)
    }

    pub fn constraint_for(&self, param: &str) -> Option<&ParamConstraint> {
        self.constraints.iter().find(|c| c.param == param)
    }
}

/// Declared parameter of a known skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillParam {
    pub name: String,
    pub required: bool,
}

/// Template dialect a skill is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillRunner {
    Jinja,
    Guidance,
}

/// A skill known from schemas or the project scan.
#[derive(Debug, Clone)]
pub struct SkillInfo {
    pub name: String,
    pub parameters: Vec<SkillParam>,
    pub path: Option<PathBuf>,
    pub runner: SkillRunner,
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable registry state consulted by every analysis pass.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    builtins: HashMap<String, BuiltinAction>,
    skills: HashMap<String, SkillInfo>,
    shapes: Vec<ObjectShape>,
    shape_ids: HashMap<&'static str, ShapeId>,
    return_types: HashMap<String, ValueType>,
    void_actions: HashSet<String>,
    attributes: HashSet<String>,
    events: HashSet<String>,
}

impl RegistrySnapshot {
    /// Snapshot with nothing in it. Lookups all miss; checks that depend
    /// on catalogs degrade rather than misfire.
    pub fn empty() -> Self {
        Self {
            builtins: HashMap::new(),
            skills: HashMap::new(),
            shapes: Vec::new(),
            shape_ids: HashMap::new(),
            return_types: HashMap::new(),
            void_actions: HashSet::new(),
            attributes: HashSet::new(),
            events: HashSet::new(),
        }
    }

    /// Snapshot populated from the embedded builtin catalog.
    pub fn with_defaults() -> Self {
        let mut snap = Self::empty();
        let shapes = builtins::default_shapes();
        for (i, shape) in shapes.iter().enumerate() {
            snap.shape_ids.insert(shape.name, ShapeId(i as u16));
        }
        snap.shapes = shapes;
        for action in builtins::default_actions() {
            snap.builtins.insert(action.name.clone(), action);
        }
        snap.return_types = builtins::default_return_types(&snap.shape_ids);
        snap.void_actions = builtins::default_void_actions();
        snap
    }

    pub fn builtin(&self, name: &str) -> Option<&BuiltinAction> {
        self.builtins.get(name)
    }

    pub fn skill(&self, name: &str) -> Option<&SkillInfo> {
        self.skills.get(name)
    }

    /// Skill lookup tolerant of a leading underscore on either side.
    pub fn resolve_skill(&self, name: &str) -> Option<&SkillInfo> {
        if let Some(info) = self.skills.get(name) {
            return Some(info);
        }
        if let Some(stripped) = name.strip_prefix('_') {
            if let Some(info) = self.skills.get(stripped) {
                return Some(info);
            }
        }
        self.skills.get(&format!("_{name}"))
    }

    pub fn is_void(&self, name: &str) -> bool {
        self.void_actions.contains(name)
    }

    pub fn return_type(&self, name: &str) -> Option<ValueType> {
        self.return_types.get(name).copied()
    }

    pub fn shape(&self, id: ShapeId) -> Option<&ObjectShape> {
        self.shapes.get(id.0 as usize)
    }

    pub fn shape_id(&self, name: &str) -> Option<ShapeId> {
        self.shape_ids.get(name).copied()
    }

    pub fn is_known_attribute(&self, name: &str) -> bool {
        self.attributes.is_empty() || self.attributes.contains(name)
    }

    pub fn is_known_event(&self, name: &str) -> bool {
        self.events.is_empty() || self.events.contains(name)
    }

    pub fn builtin_names(&self) -> impl Iterator<Item = &str> {
        self.builtins.keys().map(String::as_str)
    }

    pub fn skill_names(&self) -> impl Iterator<Item = &str> {
        self.skills.keys().map(String::as_str)
    }

    pub fn builtins(&self) -> impl Iterator<Item = &BuiltinAction> {
        self.builtins.values()
    }

    pub fn skill_count(&self) -> usize {
        self.skills.len()
    }

    pub fn builtin_count(&self) -> usize {
        self.builtins.len()
    }

    /// Register a skill. Existing entries win: schema-declared skills take
    /// priority over ones discovered from file names.
    pub fn add_skill(&mut self, skill: SkillInfo) {
        self.skills.entry(skill.name.clone()).or_insert(skill);
    }

    /// Register or replace a builtin action. Schema entries override the
    /// embedded catalog.
    pub fn add_builtin(&mut self, action: BuiltinAction) {
        self.builtins.insert(action.name.clone(), action);
    }

    pub fn set_return_type(&mut self, name: String, ty: ValueType) {
        self.return_types.insert(name, ty);
    }

    pub fn mark_void(&mut self, name: String) {
        self.void_actions.insert(name);
    }

    pub fn add_attribute(&mut self, name: String) {
        self.attributes.insert(name);
    }

    pub fn add_event(&mut self, name: String) {
        self.events.insert(name);
    }
}

// ============================================================================
// Fixed vocabularies
// ============================================================================

/// Names that open a guidance block: `{{#name ...}}` / `{{/name}}`.
pub static GUIDANCE_BLOCKS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "system", "user", "assistant", "each", "if", "unless", "select", "gen", "geneach",
        "block", "role",
    ]
    .into_iter()
    .collect()
});

/// Guidance tags whose trailing expression is analyzed for references.
pub static GUIDANCE_FLOW_TAGS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["if", "unless", "each", "elseif"].into_iter().collect());

/// Template statement keywords. Compared lowercased.
pub static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "if", "else", "elif", "endif", "for", "endfor", "in", "not", "and", "or", "set", "macro",
        "endmacro", "block", "endblock", "extends", "include", "import", "from", "as", "with",
        "without", "context", "true", "false", "none", "is", "defined", "undefined", "range",
        "dict", "list", "raw", "endraw", "call", "filter", "endfilter", "autoescape",
        "endautoescape", "break", "continue",
    ]
    .into_iter()
    .collect()
});

/// Pipeline filter names. Compared lowercased.
pub static FILTERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "abs", "attr", "batch", "capitalize", "center", "default", "d", "dictsort", "escape", "e",
        "filesizeformat", "first", "float", "forceescape", "format", "groupby", "indent", "int",
        "join", "last", "length", "list", "lower", "map", "max", "min", "pprint", "random",
        "reject", "rejectattr", "replace", "reverse", "round", "safe", "select", "selectattr",
        "slice", "sort", "string", "striptags", "sum", "title", "trim", "truncate", "unique",
        "upper", "urlencode", "urlize", "wordcount", "wordwrap", "xmlattr", "tojson", "strip",
        "loads", "dumps", "append", "startswith", "endswith", "split",
    ]
    .into_iter()
    .collect()
});

/// Names that are always defined: literals, environment modules, loop and
/// role markers. Never reported as undefined.
pub static IMPLICIT_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "true", "false", "none", "True", "False", "None", "json", "_", "loop", "caller",
        "varargs", "kwargs", "self", "super", "namespace", "re", "datetime", "zoneinfo", "uuid",
        "system", "assistant", "user", "end",
    ]
    .into_iter()
    .collect()
});

/// Runtime-injected helpers. Their signatures are not published, so call
/// checks skip them entirely.
pub static PLATFORM_FUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["get_memory", "get_prompt_memory", "structured_generation", "uuid4"]
        .into_iter()
        .collect()
});

/// Suffix that classifies an unknown capitalized call target as a skill.
pub const SKILL_SUFFIX: &str = "Skill";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_has_core_actions() {
        let snap = RegistrySnapshot::with_defaults();
        let set = snap.builtin("Set").unwrap();
        assert_eq!(set.required_params, vec!["name", "value"]);
        assert!(set.accepts_param("expose"));
        assert!(!set.accepts_param("bogus"));
        assert!(snap.is_void("SendMessage"));
        assert!(!snap.is_void("Gen"));
    }

    #[test]
    fn return_types_resolve_shapes() {
        let snap = RegistrySnapshot::with_defaults();
        match snap.return_type("GetUser") {
            Some(ValueType::Object(id)) => {
                let shape = snap.shape(id).unwrap();
                assert_eq!(shape.name, "User");
                assert!(shape.properties.iter().any(|p| p.name == "email"));
            }
            other => panic!("unexpected return type {other:?}"),
        }
        match snap.return_type("GetActors") {
            Some(ValueType::Array(id)) => {
                assert_eq!(snap.shape(id).unwrap().name, "Actor");
            }
            other => panic!("unexpected return type {other:?}"),
        }
    }

    #[test]
    fn constraints_present_for_is_similar() {
        let snap = RegistrySnapshot::with_defaults();
        let action = snap.builtin("IsSimilar").unwrap();
        let threshold = action.constraint_for("threshold").unwrap();
        assert_eq!(threshold.min, Some(0.0));
        assert_eq!(threshold.max, Some(1.0));
        let strategy = action.constraint_for("strategy").unwrap();
        assert!(strategy.allowed.iter().any(|v| v == "levenshtein"));
    }

    #[test]
    fn schema_skills_win_over_scanned() {
        let mut snap = RegistrySnapshot::with_defaults();
        snap.add_skill(SkillInfo {
            name: "GreetSkill".into(),
            parameters: vec![SkillParam { name: "tone".into(), required: true }],
            path: None,
            runner: SkillRunner::Jinja,
        });
        snap.add_skill(SkillInfo {
            name: "GreetSkill".into(),
            parameters: vec![],
            path: Some(PathBuf::from("flows/a/GreetSkill/GreetSkill.jinja")),
            runner: SkillRunner::Jinja,
        });
        assert_eq!(snap.skill("GreetSkill").unwrap().parameters.len(), 1);
    }
}
