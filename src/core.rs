//! Core orchestrator — the single entry point every caller (CLI today) goes
//! through. Owns the document store root, the agent registry, and the
//! provider catalogues, and enforces the one-operation-per-project guard.
//!
//! Mutating operations follow one boundary rule: persist canonical state
//! first, then reconcile. A sync failure after a successful save leaves the
//! document saved; the caller is told which artifacts failed and the next
//! pass retries them.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::detect::{self, DetectedState};
use crate::drift::{self, DriftStatus};
use crate::error::CoreError;
use crate::local_skills;
use crate::project::{
    InstructionMode, Project, ProjectFileInfo, ProjectTemplate, Settings, UNIFIED_FILENAME,
};
use crate::providers::Providers;
use crate::registry::AgentRegistry;
use crate::store::DocumentStore;
use crate::sync;
use crate::template::{self, ApplyReport};

pub struct Core {
    store: DocumentStore,
    registry: AgentRegistry,
    providers: Providers,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Core {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let providers = Providers::fs_defaults(&data_dir);
        Core {
            store: DocumentStore::new(data_dir),
            registry: AgentRegistry::builtin(),
            providers,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// Claim the per-project mutation slot. Competing mutations fail fast
    /// with `OperationInProgress` instead of queueing.
    fn begin(&self, name: &str) -> Result<OpGuard, CoreError> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(name.to_string()) {
            return Err(CoreError::OperationInProgress(name.to_string()));
        }
        Ok(OpGuard {
            name: name.to_string(),
            set: Arc::clone(&self.in_flight),
        })
    }

    // ─── Projects ─────────────────────────────────────────────────────────────

    pub fn create_project(
        &self,
        name: &str,
        description: &str,
        directory: Option<String>,
    ) -> Result<Project, CoreError> {
        DocumentStore::validate_name(name)?;
        if self.store.read_project(name).is_ok() {
            return Err(CoreError::validation(format!(
                "project '{name}' already exists"
            )));
        }
        let mut project = Project::new(name);
        project.description = description.to_string();
        project.directory = directory;
        self.store.save_project(&project)?;
        info!(project = %name, "project created");
        Ok(project)
    }

    pub fn get_project(&self, name: &str) -> Result<Project, CoreError> {
        self.store.read_project(name)
    }

    pub fn list_projects(&self) -> Result<Vec<String>, CoreError> {
        self.store.list_projects().map_err(CoreError::Other)
    }

    pub fn delete_project(&self, name: &str) -> Result<(), CoreError> {
        let _guard = self.begin(name)?;
        self.store.delete_project(name)
    }

    pub fn rename_project(&self, old: &str, new: &str) -> Result<(), CoreError> {
        let _guard = self.begin(old)?;
        self.store.rename_project(old, new)
    }

    /// Persist a project document, then reconcile it onto disk. The save
    /// always happens; the sync result is reported separately via the
    /// returned paths or a `PartialSyncFailure`.
    pub async fn save_and_sync(&self, mut project: Project) -> Result<Vec<PathBuf>, CoreError> {
        let _guard = self.begin(&project.name)?;
        project.updated_at = Utc::now();
        self.store.save_project(&project)?;
        self.sync_saved(&project).await
    }

    /// Re-run reconciliation for an already-saved project.
    pub async fn sync_project(&self, name: &str) -> Result<Vec<PathBuf>, CoreError> {
        let project = self.store.read_project(name)?;
        let _guard = self.begin(name)?;
        self.sync_saved(&project).await
    }

    async fn sync_saved(&self, project: &Project) -> Result<Vec<PathBuf>, CoreError> {
        let Some(directory) = project.directory.as_deref() else {
            debug!(project = %project.name, "no directory attached; save only");
            return Ok(Vec::new());
        };
        let mode = self.store.load_settings().skill_sync_mode;
        let outcome = sync::sync(
            project,
            Path::new(directory),
            self.registry,
            mode,
            &self.providers,
            self.store.root(),
        )
        .await
        .map_err(CoreError::Other)?;
        outcome.into_result()
    }

    // ─── Autodetection ────────────────────────────────────────────────────────

    /// Inspect the project directory and fold anything new into the
    /// document. Detection never shrinks a category, and it only persists —
    /// a detected MCP key may have no catalogue definition yet, so the
    /// follow-up sync is the caller's explicit step.
    pub async fn autodetect(&self, name: &str) -> Result<DetectedState, CoreError> {
        let mut project = self.store.read_project(name)?;
        let Some(directory) = project.directory.clone() else {
            return Err(CoreError::validation(format!(
                "project '{name}' has no directory to inspect"
            )));
        };

        let registry = self.registry;
        let dir = PathBuf::from(directory);
        let detected =
            tokio::task::spawn_blocking(move || detect::detect_all(&dir, &registry))
                .await
                .map_err(|e| anyhow::anyhow!("autodetect task panicked: {e}"))?;

        if detect::merge_into(&mut project, &detected) {
            let _guard = self.begin(name)?;
            project.updated_at = Utc::now();
            self.store.save_project(&project)?;
        }
        Ok(detected)
    }

    // ─── Drift ────────────────────────────────────────────────────────────────

    pub async fn check_drift(&self, name: &str) -> Result<DriftStatus, CoreError> {
        let project = self.store.read_project(name)?;
        let mode = self.store.load_settings().skill_sync_mode;
        Ok(drift::check(
            &project,
            self.registry,
            mode,
            &self.providers,
            self.store.root(),
        )
        .await)
    }

    // ─── Local skills ─────────────────────────────────────────────────────────

    pub async fn replicate_local_skills(&self, name: &str) -> Result<Vec<PathBuf>, CoreError> {
        let project = self.store.read_project(name)?;
        let Some(directory) = project.directory.clone() else {
            return Err(CoreError::validation(format!(
                "project '{name}' has no directory"
            )));
        };
        let _guard = self.begin(name)?;
        let registry = self.registry;
        let outcome = tokio::task::spawn_blocking(move || {
            local_skills::replicate(&project, Path::new(&directory), &registry)
        })
        .await
        .map_err(|e| anyhow::anyhow!("replicate task panicked: {e}"))?;
        outcome.into_result()
    }

    /// Promote a local skill into the global registry, then re-sync so every
    /// project artifact reflects its new source.
    ///
    /// The mutation slot is claimed before anything touches disk, and the
    /// source directory is removed only after the updated document is saved.
    /// An interruption anywhere in between leaves both copies intact.
    pub async fn promote_local_skill(
        &self,
        name: &str,
        skill: &str,
    ) -> Result<Vec<PathBuf>, CoreError> {
        let mut project = self.store.read_project(name)?;
        let Some(directory) = project.directory.clone() else {
            return Err(CoreError::validation(format!(
                "project '{name}' has no directory"
            )));
        };
        let _guard = self.begin(name)?;
        let source = local_skills::promote(
            &mut project,
            Path::new(&directory),
            skill,
            self.providers.skills.as_ref(),
        )?;
        project.updated_at = Utc::now();
        self.store.save_project(&project)?;
        // The registry copy is canonical once the document says so; a failed
        // cleanup leaves a harmless leftover, not a lost skill.
        if let Err(e) = std::fs::remove_dir_all(&source) {
            warn!(path = %source.display(), err = %e, "promoted skill source cleanup failed");
        }
        self.sync_saved(&project).await
    }

    // ─── Templates ────────────────────────────────────────────────────────────

    pub fn save_template(&self, template: &ProjectTemplate) -> Result<(), CoreError> {
        self.store.save_template(template)
    }

    pub fn get_template(&self, name: &str) -> Result<ProjectTemplate, CoreError> {
        self.store.read_template(name)
    }

    pub fn list_templates(&self) -> Result<Vec<String>, CoreError> {
        self.store.list_templates().map_err(CoreError::Other)
    }

    pub fn delete_template(&self, name: &str) -> Result<(), CoreError> {
        self.store.delete_template(name)
    }

    pub fn rename_template(&self, old: &str, new: &str) -> Result<(), CoreError> {
        self.store.rename_template(old, new)
    }

    /// Apply a template to a project and reconcile the result.
    pub async fn apply_template(
        &self,
        project_name: &str,
        template_name: &str,
    ) -> Result<ApplyReport, CoreError> {
        let mut project = self.store.read_project(project_name)?;
        let template = self.store.read_template(template_name)?;
        let directory = project.directory.clone().map(PathBuf::from);

        let report = template::apply(&mut project, directory.as_deref(), &template)?;
        // Reconcile even when the merge changed nothing; re-applying a
        // template also repairs artifacts deleted since the last pass.
        self.save_and_sync(project).await?;
        Ok(report)
    }

    // ─── Instruction files ────────────────────────────────────────────────────

    /// Describe every logical instruction file the project currently fans
    /// out to, including the synthetic `_unified` file in unified mode.
    pub fn project_file_info(&self, name: &str) -> Result<Vec<ProjectFileInfo>, CoreError> {
        let project = self.store.read_project(name)?;
        let directory = project.directory.as_deref().map(Path::new);
        let agents = self.registry.resolve(&project.agents);

        let exists = |rel: &str| directory.map(|d| d.join(rel).exists()).unwrap_or(false);
        // Physical targets are absolute once a directory is attached;
        // without one only the logical name is known.
        let target = |rel: &str| {
            directory
                .map(|d| d.join(rel).to_string_lossy().to_string())
                .unwrap_or_else(|| rel.to_string())
        };

        if project.instruction_mode == InstructionMode::Unified {
            let mut consumers = Vec::new();
            let mut targets = Vec::new();
            let mut any_exists = false;
            for agent in &agents {
                if !agent.capabilities.instructions {
                    continue;
                }
                consumers.push(agent.id.to_string());
                for f in agent.instruction_files {
                    let t = target(f);
                    if !targets.contains(&t) {
                        any_exists |= exists(f);
                        targets.push(t);
                    }
                }
            }
            return Ok(vec![ProjectFileInfo {
                filename: UNIFIED_FILENAME.to_string(),
                agents: consumers,
                exists: any_exists,
                target_files: targets,
            }]);
        }

        // Per-agent mode: agents sharing a physical filename (AGENTS.md)
        // collapse into one logical file.
        let mut infos: Vec<ProjectFileInfo> = Vec::new();
        for agent in &agents {
            if !agent.capabilities.instructions {
                continue;
            }
            for f in agent.instruction_files {
                if let Some(info) = infos.iter_mut().find(|i| i.filename == *f) {
                    info.agents.push(agent.id.to_string());
                } else {
                    infos.push(ProjectFileInfo {
                        filename: f.to_string(),
                        agents: vec![agent.id.to_string()],
                        exists: exists(f),
                        target_files: vec![target(f)],
                    });
                }
            }
        }
        Ok(infos)
    }

    /// Canonical content of one logical file. `_unified` reads from the
    /// project document, everything else from the store.
    pub fn read_project_file(
        &self,
        name: &str,
        filename: &str,
    ) -> Result<Option<String>, CoreError> {
        let project = self.store.read_project(name)?;
        if filename == UNIFIED_FILENAME {
            return Ok(project.unified_instruction);
        }
        DocumentStore::validate_filename(filename)?;
        self.store
            .read_project_file(name, filename)
            .map_err(CoreError::Other)
    }

    /// Update one logical file's canonical content and reconcile.
    pub async fn save_project_file(
        &self,
        name: &str,
        filename: &str,
        content: &str,
    ) -> Result<Vec<PathBuf>, CoreError> {
        let mut project = self.store.read_project(name)?;
        if filename == UNIFIED_FILENAME {
            project.unified_instruction = Some(content.to_string());
        } else {
            DocumentStore::validate_filename(filename)?;
            self.store
                .save_project_file(name, filename, content)
                .map_err(CoreError::Other)?;
        }
        self.save_and_sync(project).await
    }

    // ─── Settings ─────────────────────────────────────────────────────────────

    pub fn settings(&self) -> Settings {
        self.store.load_settings()
    }

    pub fn save_settings(&self, settings: Settings) -> Result<(), CoreError> {
        self.store.save_settings(&settings).map_err(CoreError::Other)
    }
}

/// RAII release of the per-project mutation slot, including on error paths.
struct OpGuard {
    name: String,
    set: Arc<Mutex<HashSet<String>>>,
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        let mut set = self
            .set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.name);
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
