//! External-collaborator seams.
//!
//! The reconciliation core consumes skill content, rule bodies, and MCP
//! server definitions from collaborators it does not own (marketplace
//! importer, vault, editors). Each is a trait here with a file-backed
//! default implementation rooted in the data dir, so the core and its tests
//! never depend on anything beyond the filesystem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Canonical filename of a skill's body inside its directory.
pub const SKILL_FILE: &str = "SKILL.md";

// ─── Skills ───────────────────────────────────────────────────────────────────

/// Serves global skill content by id.
pub trait SkillSource: Send + Sync {
    /// All known global skill ids.
    fn list(&self) -> Vec<String>;
    /// The skill's source directory, if it exists (symlink targets point here).
    fn source_dir(&self, id: &str) -> Option<PathBuf>;
    /// The skill's `SKILL.md` body.
    fn read(&self, id: &str) -> Result<String>;
    /// Install a skill from an existing directory (used by promotion).
    /// Fails if the id is already taken.
    fn import(&self, id: &str, src_dir: &Path) -> Result<()>;
}

/// Skills stored as `{root}/<id>/SKILL.md` (plus any companion files).
pub struct FsSkillSource {
    root: PathBuf,
}

impl FsSkillSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsSkillSource { root: root.into() }
    }
}

impl SkillSource for FsSkillSource {
    fn list(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().join(SKILL_FILE).is_file())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        ids.sort();
        ids
    }

    fn source_dir(&self, id: &str) -> Option<PathBuf> {
        let dir = self.root.join(id);
        dir.is_dir().then_some(dir)
    }

    fn read(&self, id: &str) -> Result<String> {
        std::fs::read_to_string(self.root.join(id).join(SKILL_FILE))
            .with_context(|| format!("read skill '{id}'"))
    }

    fn import(&self, id: &str, src_dir: &Path) -> Result<()> {
        let dest = self.root.join(id);
        if dest.exists() {
            anyhow::bail!("skill '{id}' already exists in the global registry");
        }
        copy_dir(src_dir, &dest).with_context(|| format!("import skill '{id}'"))
    }
}

/// Recursive directory copy. Symlinks inside a skill are not followed.
pub fn copy_dir(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

// ─── Rules ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RuleMeta {
    pub id: String,
    pub name: String,
}

/// Serves instruction rule bodies by id.
pub trait RuleCatalog: Send + Sync {
    fn list(&self) -> Vec<RuleMeta>;
    fn read(&self, id: &str) -> Result<String>;
}

/// Rules stored as `{root}/<id>.md`. The display name is the first `# `
/// heading in the body, falling back to the id.
pub struct FsRuleCatalog {
    root: PathBuf,
}

impl FsRuleCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsRuleCatalog { root: root.into() }
    }
}

impl RuleCatalog for FsRuleCatalog {
    fn list(&self) -> Vec<RuleMeta> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut rules: Vec<RuleMeta> = entries
            .flatten()
            .filter_map(|e| {
                let file = e.file_name().to_str()?.to_string();
                let id = file.strip_suffix(".md")?.to_string();
                let name = std::fs::read_to_string(e.path())
                    .ok()
                    .and_then(|body| heading_of(&body))
                    .unwrap_or_else(|| id.clone());
                Some(RuleMeta { id, name })
            })
            .collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    fn read(&self, id: &str) -> Result<String> {
        std::fs::read_to_string(self.root.join(format!("{id}.md")))
            .with_context(|| format!("read rule '{id}'"))
    }
}

fn heading_of(body: &str) -> Option<String> {
    body.lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(|h| h.trim().to_string())
}

// ─── MCP server definitions ───────────────────────────────────────────────────

/// One MCP server definition as materialized into agent configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerDef {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl McpServerDef {
    /// The JSON value written under an agent's MCP top-level key.
    pub fn to_entry(&self) -> serde_json::Value {
        serde_json::json!({
            "command": self.command,
            "args": self.args,
            "env": self.env,
        })
    }
}

/// Serves MCP server definitions by id.
pub trait McpCatalog: Send + Sync {
    fn list(&self) -> Vec<String>;
    fn get(&self, id: &str) -> Option<McpServerDef>;
}

#[derive(Debug, Clone, Deserialize, Default)]
struct McpServersFile {
    #[serde(default)]
    servers: Vec<McpServerDef>,
}

/// Definitions read from `{data_dir}/mcp-servers.json`:
///
/// ```json
/// { "servers": [ { "name": "fs", "command": "npx", "args": ["-y", "@modelcontextprotocol/server-filesystem"] } ] }
/// ```
///
/// A missing file means no servers — not an error.
pub struct FsMcpCatalog {
    path: PathBuf,
}

impl FsMcpCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FsMcpCatalog { path: path.into() }
    }

    fn load(&self) -> McpServersFile {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return McpServersFile::default();
        };
        match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %self.path.display(), err = %e, "invalid mcp-servers.json — treating as empty");
                McpServersFile::default()
            }
        }
    }
}

impl McpCatalog for FsMcpCatalog {
    fn list(&self) -> Vec<String> {
        self.load().servers.into_iter().map(|s| s.name).collect()
    }

    fn get(&self, id: &str) -> Option<McpServerDef> {
        self.load().servers.into_iter().find(|s| s.name == id)
    }
}

// ─── Bundle ───────────────────────────────────────────────────────────────────

/// Everything the core consumes from the outside, bundled for threading
/// through sync/drift as one value.
#[derive(Clone)]
pub struct Providers {
    pub skills: Arc<dyn SkillSource>,
    pub rules: Arc<dyn RuleCatalog>,
    pub mcp: Arc<dyn McpCatalog>,
}

impl Providers {
    /// File-backed defaults rooted in the data dir.
    pub fn fs_defaults(data_dir: &Path) -> Self {
        Providers {
            skills: Arc::new(FsSkillSource::new(data_dir.join("skills"))),
            rules: Arc::new(FsRuleCatalog::new(data_dir.join("rules"))),
            mcp: Arc::new(FsMcpCatalog::new(data_dir.join("mcp-servers.json"))),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
