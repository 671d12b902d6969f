//! YAML schema loading and the project skill scan.
//!
//! Schemas are pure data: four YAML files that overlay the embedded
//! catalogs in a [`RegistrySnapshot`]. Loading never fails the caller —
//! a missing file contributes nothing and a malformed one is logged and
//! skipped, so analysis always has a usable snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::registry::{
    BuiltinAction, ParamConstraint, RegistrySnapshot, SkillInfo, SkillParam, SkillRunner,
    ValueType,
};

/// File names looked up in the schema directory.
const SKILLS_FILE: &str = "skills.schema.yaml";
const BUILTINS_FILE: &str = "builtins.schema.yaml";
const ATTRIBUTES_FILE: &str = "attributes.schema.yaml";
const EVENTS_FILE: &str = "events.schema.yaml";

/// Glob patterns for the two project layouts: v1 nests each skill in its
/// own directory under a flow, v2 is a flat file per skill.
const SKILL_PATTERNS: [(&str, SkillRunner); 4] = [
    ("flows/*/*/*.jinja", SkillRunner::Jinja),
    ("flows/*/*/*.guidance", SkillRunner::Guidance),
    ("*.fbl", SkillRunner::Jinja),
    ("*.fblg", SkillRunner::Guidance),
];

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed schema {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

// ============================================================================
// YAML document shapes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct SkillsFile {
    #[serde(default)]
    skills: Vec<SkillEntry>,
}

#[derive(Debug, Deserialize)]
struct SkillEntry {
    name: String,
    #[serde(default)]
    runner: Option<String>,
    #[serde(default)]
    parameters: Vec<SkillParamEntry>,
}

#[derive(Debug, Deserialize)]
struct SkillParamEntry {
    name: String,
    #[serde(default)]
    required: Option<bool>,
    #[serde(default)]
    default_value: Option<serde_yaml::Value>,
}

impl SkillParamEntry {
    /// A parameter with no default is required unless the schema says
    /// otherwise.
    fn to_param(&self) -> SkillParam {
        let has_default = match &self.default_value {
            None | Some(serde_yaml::Value::Null) => false,
            Some(serde_yaml::Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        SkillParam {
            name: self.name.clone(),
            required: self.required.unwrap_or(!has_default),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct BuiltinsFile {
    #[serde(default)]
    actions: Vec<ActionEntry>,
}

#[derive(Debug, Deserialize)]
struct ActionEntry {
    name: String,
    #[serde(default)]
    syntax: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    variadic: bool,
    #[serde(default)]
    returns: Option<String>,
    #[serde(default)]
    parameters: Vec<ActionParamEntry>,
}

#[derive(Debug, Deserialize)]
struct ActionParamEntry {
    name: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    allowed: Vec<String>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

/// Attribute and event lists accept plain strings or `idn:` entries.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NameEntry {
    Plain(String),
    Keyed { idn: String },
}

impl NameEntry {
    fn into_name(self) -> String {
        match self {
            NameEntry::Plain(name) => name,
            NameEntry::Keyed { idn } => idn,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct NamesFile {
    #[serde(default)]
    attributes: Vec<NameEntry>,
    #[serde(default)]
    events: Vec<NameEntry>,
}

// ============================================================================
// Schema set
// ============================================================================

/// The parsed content of one schema directory.
#[derive(Debug, Default)]
pub struct SchemaSet {
    skills: Vec<SkillEntry>,
    actions: Vec<ActionEntry>,
    attributes: Vec<String>,
    events: Vec<String>,
}

impl SchemaSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every schema file found in `dir`. Missing files are fine;
    /// malformed ones are logged and skipped.
    pub fn load(dir: &Path) -> Self {
        let mut set = Self::empty();

        match load_optional::<SkillsFile>(&dir.join(SKILLS_FILE)) {
            Ok(Some(file)) => set.skills = file.skills,
            Ok(None) => {}
            Err(err) => tracing::warn!("{err}"),
        }
        match load_optional::<BuiltinsFile>(&dir.join(BUILTINS_FILE)) {
            Ok(Some(file)) => set.actions = file.actions,
            Ok(None) => {}
            Err(err) => tracing::warn!("{err}"),
        }
        match load_optional::<NamesFile>(&dir.join(ATTRIBUTES_FILE)) {
            Ok(Some(file)) => {
                set.attributes = file.attributes.into_iter().map(NameEntry::into_name).collect();
            }
            Ok(None) => {}
            Err(err) => tracing::warn!("{err}"),
        }
        match load_optional::<NamesFile>(&dir.join(EVENTS_FILE)) {
            Ok(Some(file)) => {
                set.events = file.events.into_iter().map(NameEntry::into_name).collect();
            }
            Ok(None) => {}
            Err(err) => tracing::warn!("{err}"),
        }

        tracing::debug!(
            skills = set.skills.len(),
            actions = set.actions.len(),
            attributes = set.attributes.len(),
            events = set.events.len(),
            "schemas loaded from {}",
            dir.display()
        );
        set
    }

    /// Build a registry snapshot: embedded defaults, overlaid with this
    /// schema set, plus skills scanned from `project_root` when given.
    pub fn snapshot(&self, project_root: Option<&Path>) -> RegistrySnapshot {
        let mut snap = RegistrySnapshot::with_defaults();

        for action in &self.actions {
            if let Some(returns) = action.returns.as_deref() {
                if returns.eq_ignore_ascii_case("void") {
                    snap.mark_void(action.name.clone());
                } else if let Some(ty) = value_type_from_str(returns) {
                    snap.set_return_type(action.name.clone(), ty);
                }
            }
            snap.add_builtin(action.to_action());
        }

        // Schema-declared parameter lists, keyed by skill name, merged
        // onto skills found by the project scan.
        let declared: HashMap<&str, &SkillEntry> =
            self.skills.iter().map(|s| (s.name.as_str(), s)).collect();

        if let Some(root) = project_root {
            for mut skill in scan_project_skills(root) {
                if let Some(entry) = declared.get(skill.name.as_str()) {
                    skill.parameters = entry.parameters.iter().map(SkillParamEntry::to_param).collect();
                }
                snap.add_skill(skill);
            }
        }

        for entry in &self.skills {
            snap.add_skill(SkillInfo {
                name: entry.name.clone(),
                parameters: entry.parameters.iter().map(SkillParamEntry::to_param).collect(),
                path: None,
                runner: runner_from_str(entry.runner.as_deref()),
            });
        }

        for name in &self.attributes {
            snap.add_attribute(name.clone());
        }
        for name in &self.events {
            snap.add_event(name.clone());
        }

        tracing::info!(
            builtins = snap.builtin_count(),
            skills = snap.skill_count(),
            "registry snapshot built"
        );
        snap
    }
}

impl ActionEntry {
    fn to_action(&self) -> BuiltinAction {
        let mut required = Vec::new();
        let mut optional = Vec::new();
        let mut constraints = Vec::new();
        for param in &self.parameters {
            if param.required {
                required.push(param.name.clone());
            } else {
                optional.push(param.name.clone());
            }
            if !param.allowed.is_empty() || param.min.is_some() || param.max.is_some() {
                constraints.push(ParamConstraint {
                    param: param.name.clone(),
                    allowed: param.allowed.clone(),
                    min: param.min,
                    max: param.max,
                });
            }
        }
        BuiltinAction {
            name: self.name.clone(),
            syntax: self.syntax.clone().unwrap_or_else(|| format!("{}(...)", self.name)),
            doc: self.description.clone(),
            required_params: required,
            optional_params: optional,
            variadic: self.variadic,
            constraints,
        }
    }
}

fn load_optional<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, SchemaError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = serde_yaml::from_str(&text).map_err(|source| SchemaError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(parsed))
}

fn value_type_from_str(name: &str) -> Option<ValueType> {
    match name.to_ascii_lowercase().as_str() {
        "string" => Some(ValueType::String),
        "number" => Some(ValueType::Number),
        "boolean" | "bool" => Some(ValueType::Boolean),
        "none" | "null" => Some(ValueType::None),
        "any" => Some(ValueType::Any),
        _ => None,
    }
}

fn runner_from_str(name: Option<&str>) -> SkillRunner {
    match name {
        Some(s) if s.eq_ignore_ascii_case("guidance") => SkillRunner::Guidance,
        _ => SkillRunner::Jinja,
    }
}

// ============================================================================
// Project skill scan
// ============================================================================

/// Scan a project tree for skill files under both supported layouts.
/// The file stem is the skill name; parameters come from the schema, not
/// the scan.
pub fn scan_project_skills(root: &Path) -> Vec<SkillInfo> {
    let mut skills = Vec::new();
    for (pattern, runner) in SKILL_PATTERNS {
        let full = root.join(pattern);
        let Some(full) = full.to_str() else { continue };
        let paths = match glob::glob(full) {
            Ok(paths) => paths,
            Err(err) => {
                tracing::warn!("bad skill glob {full}: {err}");
                continue;
            }
        };
        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    tracing::debug!("skipping unreadable path: {err}");
                    continue;
                }
            };
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            skills.push(SkillInfo {
                name: stem.to_string(),
                parameters: Vec::new(),
                path: Some(path.clone()),
                runner,
            });
        }
    }
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!(count = skills.len(), "project skills scanned from {}", root.display());
    skills
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fable-schema-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn skill_param_required_follows_default_value() {
        let file: SkillsFile = serde_yaml::from_str(
            r#"
skills:
  - name: GreetSkill
    parameters:
      - name: tone
      - name: emoji
        default_value: ":)"
      - name: forced
        default_value: "x"
        required: true
"#,
        )
        .unwrap();
        let params: Vec<SkillParam> =
            file.skills[0].parameters.iter().map(SkillParamEntry::to_param).collect();
        assert!(params[0].required);
        assert!(!params[1].required);
        assert!(params[2].required);
    }

    #[test]
    fn builtins_overlay_embedded_catalog() {
        let dir = temp_dir("builtins");
        fs::write(
            dir.join(BUILTINS_FILE),
            r#"
actions:
  - name: Frobnicate
    syntax: "Frobnicate(level)"
    returns: void
    parameters:
      - name: level
        required: true
        min: 0
        max: 10
"#,
        )
        .unwrap();
        let snap = SchemaSet::load(&dir).snapshot(None);
        let action = snap.builtin("Frobnicate").unwrap();
        assert_eq!(action.required_params, vec!["level"]);
        assert_eq!(action.constraint_for("level").unwrap().max, Some(10.0));
        assert!(snap.is_void("Frobnicate"));
        // Embedded defaults survive alongside the overlay.
        assert!(snap.builtin("SendMessage").is_some());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_schema_degrades_to_defaults() {
        let dir = temp_dir("malformed");
        fs::write(dir.join(SKILLS_FILE), "skills: [whoops: {").unwrap();
        let snap = SchemaSet::load(&dir).snapshot(None);
        assert_eq!(snap.skill_count(), 0);
        assert!(snap.builtin("Set").is_some());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn scan_finds_both_layouts() {
        let dir = temp_dir("scan");
        fs::create_dir_all(dir.join("flows/main/GreetSkill")).unwrap();
        fs::write(dir.join("flows/main/GreetSkill/GreetSkill.jinja"), "{{ tone }}").unwrap();
        fs::write(dir.join("FarewellSkill.fblg"), "bye").unwrap();
        let skills = scan_project_skills(&dir);
        let names: Vec<&str> = skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["FarewellSkill", "GreetSkill"]);
        assert_eq!(
            skills.iter().find(|s| s.name == "FarewellSkill").unwrap().runner,
            SkillRunner::Guidance
        );
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn schema_parameters_merge_onto_scanned_skills() {
        let dir = temp_dir("merge");
        fs::write(dir.join("GreetSkill.fbl"), "{{ tone }}").unwrap();
        fs::write(
            dir.join(SKILLS_FILE),
            "skills:\n  - name: GreetSkill\n    parameters:\n      - name: tone\n",
        )
        .unwrap();
        let snap = SchemaSet::load(&dir).snapshot(Some(&dir));
        let skill = snap.skill("GreetSkill").unwrap();
        assert!(skill.path.is_some());
        assert_eq!(skill.parameters, vec![SkillParam { name: "tone".into(), required: true }]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn attribute_entries_accept_both_spellings() {
        let file: NamesFile =
            serde_yaml::from_str("attributes:\n  - plain_name\n  - idn: keyed_name\n").unwrap();
        let names: Vec<String> = file.attributes.into_iter().map(NameEntry::into_name).collect();
        assert_eq!(names, vec!["plain_name", "keyed_name"]);
    }
}
