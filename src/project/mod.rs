//! Canonical data model — the tool-agnostic description of a project's
//! AI-agent tooling, persisted one JSON document per project.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Synthetic logical filename carrying the unified instruction block.
pub const UNIFIED_FILENAME: &str = "_unified";

/// How instruction files are materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstructionMode {
    /// Each agent gets its own instruction content under its expected filename.
    #[default]
    PerAgent,
    /// One logical content block fans out verbatim to every agent's file(s).
    Unified,
}

/// The canonical description of one project's agent tooling.
///
/// `name` is the unique key and doubles as the document key in the store.
/// A skill id lives in `skills` or `local_skills`, never both — promotion
/// moves it between the two. `agents` gates which per-agent artifacts the
/// sync engine and drift detector ever touch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Absolute path of the project directory. None until the user attaches
    /// one; sync and drift need it, editing does not.
    #[serde(default)]
    pub directory: Option<String>,
    /// Global skill ids, served by the skill registry.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Skill ids materialized only under `directory`, never shared.
    #[serde(default)]
    pub local_skills: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<String>,
    /// Provider bindings — declarative names only; secrets live in the vault.
    #[serde(default)]
    pub providers: Vec<String>,
    /// Targeted agent ids.
    #[serde(default)]
    pub agents: Vec<String>,
    /// Rule ids appended to each logical instruction file as a generated
    /// "Rules" section. Keyed by logical filename (`_unified` in unified mode).
    #[serde(default)]
    pub file_rules: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub instruction_mode: InstructionMode,
    /// Canonical content of the `_unified` logical file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unified_instruction: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Project {
            name: name.into(),
            description: String::new(),
            directory: None,
            skills: Vec::new(),
            local_skills: Vec::new(),
            mcp_servers: Vec::new(),
            providers: Vec::new(),
            agents: Vec::new(),
            file_rules: BTreeMap::new(),
            instruction_mode: InstructionMode::default(),
            unified_instruction: None,
            created_at: now,
            updated_at: now,
            created_by: None,
        }
    }

    /// Rule ids attached to one logical instruction file.
    pub fn rules_for(&self, filename: &str) -> &[String] {
        self.file_rules
            .get(filename)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// One file a template carries into a project directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateFile {
    pub filename: String,
    pub content: String,
}

/// A reusable template merged into N projects. Deleting a template never
/// mutates projects that previously applied it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<String>,
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default)]
    pub project_files: Vec<TemplateFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unified_instruction: Option<String>,
    #[serde(default)]
    pub unified_rules: Vec<String>,
}

/// One logical instruction file and where it lands physically.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectFileInfo {
    /// Logical identity — an agent filename, or `_unified`.
    pub filename: String,
    /// Agent ids consuming this logical file.
    pub agents: Vec<String>,
    /// Whether any physical target currently exists on disk.
    pub exists: bool,
    /// Physical paths this logical file fans out to.
    pub target_files: Vec<String>,
}

/// Global skill materialization mode, consulted by Sync on every pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillSyncMode {
    /// Reference the registry copy — canonical edits propagate immediately.
    #[default]
    Symlink,
    /// Duplicate bytes — decoupled until the next explicit sync.
    Copy,
}

/// Global settings, persisted as a single JSON document.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub skill_sync_mode: SkillSyncMode,
}
