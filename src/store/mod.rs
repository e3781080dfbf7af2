//! JSON document store — one pretty-printed document per project/template,
//! plus the global settings document and per-project sync manifests.
//!
//! Layout under the data dir:
//!
//! ```text
//! projects/<name>/project.json     canonical Project document
//! projects/<name>/files/<path>     canonical instruction content per logical file
//! projects/<name>/manifest.json    sync ownership + content-hash manifest
//! templates/<name>.json            ProjectTemplate document
//! settings.json                    global Settings
//! ```
//!
//! Writes go through a temp file in the same directory and an atomic rename,
//! so a crash mid-write never leaves a truncated document behind.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{CoreError, DocKind};
use crate::project::{Project, ProjectTemplate, Settings};
use crate::sync::manifest::SyncManifest;

pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DocumentStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─── Name validation ──────────────────────────────────────────────────────

    /// Reject names that would escape the store or collide with path syntax.
    /// Runs before any mutation.
    pub fn validate_name(name: &str) -> Result<(), CoreError> {
        if name.is_empty() {
            return Err(CoreError::validation("name must not be empty"));
        }
        if name.starts_with('.') {
            return Err(CoreError::validation("name must not start with '.'"));
        }
        if name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
        {
            return Err(CoreError::validation(format!(
                "name '{name}' contains a path separator or control character"
            )));
        }
        Ok(())
    }

    /// Validate a logical instruction filename. Nested paths are allowed
    /// (`.github/copilot-instructions.md`), traversal is not.
    pub fn validate_filename(filename: &str) -> Result<(), CoreError> {
        if filename.is_empty() {
            return Err(CoreError::validation("filename must not be empty"));
        }
        let p = Path::new(filename);
        if p.is_absolute()
            || p.components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(CoreError::validation(format!(
                "filename '{filename}' must be relative and must not contain '..'"
            )));
        }
        Ok(())
    }

    // ─── Projects ─────────────────────────────────────────────────────────────

    fn project_dir(&self, name: &str) -> PathBuf {
        self.root.join("projects").join(name)
    }

    pub fn read_project(&self, name: &str) -> Result<Project, CoreError> {
        Self::validate_name(name)?;
        let path = self.project_dir(name).join("project.json");
        read_doc(&path).ok_or_else(|| CoreError::not_found(DocKind::Project, name))
    }

    pub fn save_project(&self, project: &Project) -> Result<(), CoreError> {
        Self::validate_name(&project.name)?;
        let dir = self.project_dir(&project.name);
        write_doc(&dir.join("project.json"), project).map_err(CoreError::Other)
    }

    pub fn delete_project(&self, name: &str) -> Result<(), CoreError> {
        Self::validate_name(name)?;
        let dir = self.project_dir(name);
        if !dir.exists() {
            return Err(CoreError::not_found(DocKind::Project, name));
        }
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("delete project '{name}'"))
            .map_err(CoreError::Other)?;
        debug!(project = %name, "project deleted");
        Ok(())
    }

    pub fn rename_project(&self, old: &str, new: &str) -> Result<(), CoreError> {
        Self::validate_name(old)?;
        Self::validate_name(new)?;
        let from = self.project_dir(old);
        if !from.exists() {
            return Err(CoreError::not_found(DocKind::Project, old));
        }
        let to = self.project_dir(new);
        if to.exists() {
            return Err(CoreError::validation(format!(
                "project '{new}' already exists"
            )));
        }
        std::fs::rename(&from, &to)
            .with_context(|| format!("rename project '{old}' -> '{new}'"))
            .map_err(CoreError::Other)?;
        // The document carries its own name — keep it in agreement with the key.
        let mut project = self.read_project(new)?;
        project.name = new.to_string();
        self.save_project(&project)
    }

    pub fn list_projects(&self) -> Result<Vec<String>> {
        list_dir_names(&self.root.join("projects"))
    }

    // ─── Canonical project files ──────────────────────────────────────────────

    fn files_dir(&self, name: &str) -> PathBuf {
        self.project_dir(name).join("files")
    }

    pub fn read_project_file(&self, name: &str, filename: &str) -> Result<Option<String>> {
        let path = self.files_dir(name).join(filename);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read canonical file '{filename}'")),
        }
    }

    pub fn save_project_file(&self, name: &str, filename: &str, content: &str) -> Result<()> {
        let path = self.files_dir(name).join(filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)
            .with_context(|| format!("write canonical file '{filename}'"))
    }

    // ─── Templates ────────────────────────────────────────────────────────────

    fn template_path(&self, name: &str) -> PathBuf {
        self.root.join("templates").join(format!("{name}.json"))
    }

    pub fn read_template(&self, name: &str) -> Result<ProjectTemplate, CoreError> {
        Self::validate_name(name)?;
        read_doc(&self.template_path(name))
            .ok_or_else(|| CoreError::not_found(DocKind::Template, name))
    }

    pub fn save_template(&self, template: &ProjectTemplate) -> Result<(), CoreError> {
        Self::validate_name(&template.name)?;
        write_doc(&self.template_path(&template.name), template).map_err(CoreError::Other)
    }

    pub fn delete_template(&self, name: &str) -> Result<(), CoreError> {
        Self::validate_name(name)?;
        let path = self.template_path(name);
        if !path.exists() {
            return Err(CoreError::not_found(DocKind::Template, name));
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("delete template '{name}'"))
            .map_err(CoreError::Other)
    }

    pub fn rename_template(&self, old: &str, new: &str) -> Result<(), CoreError> {
        let mut template = self.read_template(old)?;
        Self::validate_name(new)?;
        if self.template_path(new).exists() {
            return Err(CoreError::validation(format!(
                "template '{new}' already exists"
            )));
        }
        template.name = new.to_string();
        self.save_template(&template)?;
        std::fs::remove_file(self.template_path(old))
            .with_context(|| format!("remove old template '{old}'"))
            .map_err(CoreError::Other)
    }

    pub fn list_templates(&self) -> Result<Vec<String>> {
        let dir = self.root.join("templates");
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Ok(Vec::new());
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|e| {
                let name = e.file_name().to_str()?.to_string();
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    // ─── Settings ─────────────────────────────────────────────────────────────

    pub fn load_settings(&self) -> Settings {
        read_doc(&self.root.join("settings.json")).unwrap_or_default()
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        write_doc(&self.root.join("settings.json"), settings)
    }

    // ─── Sync manifests ───────────────────────────────────────────────────────

    pub fn load_manifest(&self, name: &str) -> SyncManifest {
        read_doc(&self.project_dir(name).join("manifest.json")).unwrap_or_default()
    }

    pub fn save_manifest(&self, name: &str, manifest: &SyncManifest) -> Result<()> {
        write_doc(&self.project_dir(name).join("manifest.json"), manifest)
    }
}

// ─── Document I/O helpers ─────────────────────────────────────────────────────

fn read_doc<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(doc) => Some(doc),
        Err(e) => {
            tracing::warn!(path = %path.display(), err = %e, "unparseable document — ignoring");
            None
        }
    }
}

/// Serialize to pretty JSON and rename into place atomically.
fn write_doc<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("document path '{}' has no parent", path.display()))?;
    std::fs::create_dir_all(parent)?;
    let json = serde_json::to_string_pretty(doc)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(json.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.persist(path)
        .with_context(|| format!("persist document '{}'", path.display()))?;
    Ok(())
}

fn list_dir_names(dir: &Path) -> Result<Vec<String>> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(Vec::new());
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    Ok(names)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
