//! Drift detection — re-reads materialized artifacts and reports divergence
//! from canonical state.
//!
//! Strictly advisory: nothing here writes to disk, and nothing here returns
//! an error. Callers poll on a timer; a transient I/O problem degrades to
//! `DriftStatus::Unavailable` instead of breaking the loop or reporting
//! universal drift.
//!
//! Classification rule (hash-based, not timestamp-based):
//!   - planned artifact absent on disk            → `missing`
//!   - disk hash ≠ hash recorded at last sync     → `modified` (human edit)
//!   - disk hash = last-sync hash ≠ planned hash  → `stale` (canonical moved)
//!   - present but cannot be read or parsed       → `unreadable`

pub mod poller;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::project::{Project, SkillSyncMode};
use crate::providers::Providers;
use crate::registry::AgentRegistry;
use crate::store::DocumentStore;
use crate::sync::manifest::content_hash;
use crate::sync::plan::{self, PlannedPayload};

/// Why one artifact counts as drifted. Closed set so callers and tests can
/// match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftReason {
    Missing,
    Modified,
    Stale,
    Unreadable,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftedFile {
    pub path: String,
    pub reason: DriftReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentDrift {
    pub agent_id: String,
    pub agent_label: String,
    pub files: Vec<DriftedFile>,
}

/// Ephemeral — recomputed on demand, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    pub drifted: bool,
    pub agents: Vec<AgentDrift>,
}

/// Outcome of one check. `Unavailable` means "cannot determine" (missing or
/// unreadable project directory) — deliberately distinct from drift.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DriftStatus {
    Checked(DriftReport),
    Unavailable { reason: String },
}

impl DriftStatus {
    pub fn drifted(&self) -> bool {
        matches!(self, DriftStatus::Checked(r) if r.drifted)
    }
}

/// Check one project for drift. Never returns an error.
pub async fn check(
    project: &Project,
    registry: AgentRegistry,
    mode: SkillSyncMode,
    providers: &Providers,
    store_root: &Path,
) -> DriftStatus {
    let project = project.clone();
    let providers = providers.clone();
    let store_root = store_root.to_path_buf();

    let task = tokio::task::spawn_blocking(move || {
        check_sync(&project, registry, mode, &providers, &store_root)
    })
    .await;
    match task {
        Ok(status) => status,
        Err(e) => DriftStatus::Unavailable {
            reason: format!("drift check panicked: {e}"),
        },
    }
}

fn check_sync(
    project: &Project,
    registry: AgentRegistry,
    mode: SkillSyncMode,
    providers: &Providers,
    store_root: &Path,
) -> DriftStatus {
    let Some(directory) = project.directory.as_deref() else {
        return DriftStatus::Unavailable {
            reason: "project has no directory".into(),
        };
    };
    let directory = Path::new(directory);
    if !directory.is_dir() {
        return DriftStatus::Unavailable {
            reason: format!("project directory missing: {}", directory.display()),
        };
    }

    let store = DocumentStore::new(store_root);
    let manifest = store.load_manifest(&project.name);
    let plan = plan::build(project, directory, &registry, mode, providers, &store);

    let mut per_agent: BTreeMap<String, Vec<DriftedFile>> = BTreeMap::new();

    for artifact in &plan.artifacts {
        let recorded = manifest.files.get(&artifact.rel).map(|r| r.hash.as_str());
        let reason = match &artifact.payload {
            PlannedPayload::Content(content) => {
                classify_file(&artifact.path, content, recorded)
            }
            PlannedPayload::Link { target } => classify_link(&artifact.path, target, recorded),
        };
        if let Some(reason) = reason {
            per_agent
                .entry(artifact.agent_id.clone())
                .or_default()
                .push(DriftedFile {
                    path: artifact.path.to_string_lossy().to_string(),
                    reason,
                });
        }
    }

    for mcp in &plan.mcp {
        let record = manifest.mcp.get(&mcp.agent_id);
        if mcp.entries.is_empty() && record.is_none() {
            continue;
        }
        if let Some(reason) = classify_mcp(mcp, record) {
            per_agent
                .entry(mcp.agent_id.clone())
                .or_default()
                .push(DriftedFile {
                    path: mcp.path.to_string_lossy().to_string(),
                    reason,
                });
        }
    }

    let agents: Vec<AgentDrift> = per_agent
        .into_iter()
        .map(|(agent_id, files)| {
            let agent_label = registry
                .by_id(&agent_id)
                .map(|a| a.label.to_string())
                .unwrap_or_else(|| agent_id.clone());
            AgentDrift {
                agent_id,
                agent_label,
                files,
            }
        })
        .collect();

    debug!(project = %project.name, drifted_agents = agents.len(), "drift check complete");
    DriftStatus::Checked(DriftReport {
        drifted: !agents.is_empty(),
        agents,
    })
}

// ─── Classification ───────────────────────────────────────────────────────────

/// Three-hash comparison: disk vs last-synced vs planned.
fn classify_hashes(disk: &str, recorded: Option<&str>, planned: &str) -> Option<DriftReason> {
    if disk == planned {
        // Disk already reflects canonical state, however it got there.
        return None;
    }
    match recorded {
        Some(rec) if disk == rec => Some(DriftReason::Stale),
        _ => Some(DriftReason::Modified),
    }
}

fn classify_file(path: &Path, planned_content: &str, recorded: Option<&str>) -> Option<DriftReason> {
    match std::fs::read_to_string(path) {
        Ok(disk) => classify_hashes(
            &content_hash(&disk),
            recorded,
            &content_hash(planned_content),
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Some(DriftReason::Missing),
        Err(_) => Some(DriftReason::Unreadable),
    }
}

fn classify_link(path: &Path, planned_target: &Path, recorded: Option<&str>) -> Option<DriftReason> {
    match std::fs::symlink_metadata(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Some(DriftReason::Missing),
        Err(_) => Some(DriftReason::Unreadable),
        Ok(meta) if !meta.file_type().is_symlink() => Some(DriftReason::Modified),
        Ok(_) => match std::fs::read_link(path) {
            Ok(target) => classify_hashes(
                &content_hash(&target.to_string_lossy()),
                recorded,
                &content_hash(&planned_target.to_string_lossy()),
            ),
            Err(_) => Some(DriftReason::Unreadable),
        },
    }
}

/// One reason per MCP artifact, worst problem first
/// (unreadable > missing > modified > stale).
fn classify_mcp(
    mcp: &plan::McpPlan,
    record: Option<&crate::sync::manifest::McpRecord>,
) -> Option<DriftReason> {
    let raw = match std::fs::read_to_string(&mcp.path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (!mcp.entries.is_empty()).then_some(DriftReason::Missing);
        }
        Err(_) => return Some(DriftReason::Unreadable),
    };
    let servers = match serde_json::from_str::<Value>(&raw) {
        Ok(v) => match v.get(mcp.key) {
            Some(Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        },
        Err(_) => return Some(DriftReason::Unreadable),
    };

    let mut worst: Option<DriftReason> = None;
    let mut bump = |r: DriftReason| {
        let rank = |r: &DriftReason| match r {
            DriftReason::Unreadable => 3,
            DriftReason::Missing => 2,
            DriftReason::Modified => 1,
            DriftReason::Stale => 0,
        };
        if worst.as_ref().map(|w| rank(&r) > rank(w)).unwrap_or(true) {
            worst = Some(r);
        }
    };

    for (key, planned) in &mcp.entries {
        let recorded = record.and_then(|r| r.entry_hashes.get(key)).map(String::as_str);
        match servers.get(key) {
            None => bump(DriftReason::Missing),
            Some(disk) => {
                if let Some(reason) = classify_hashes(
                    &content_hash(&disk.to_string()),
                    recorded,
                    &content_hash(&planned.to_string()),
                ) {
                    bump(reason);
                }
            }
        }
    }
    // Owned keys that canonical state dropped but are still on disk.
    if let Some(record) = record {
        for key in record.entry_hashes.keys() {
            if !mcp.entries.contains_key(key) && servers.contains_key(key) {
                bump(DriftReason::Stale);
            }
        }
    }
    worst
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;
    use crate::sync;
    use tempfile::TempDir;

    struct Fx {
        _data: TempDir,
        _proj: TempDir,
        store_root: std::path::PathBuf,
        dir: std::path::PathBuf,
        providers: Providers,
    }

    fn fixture() -> Fx {
        let data = TempDir::new().unwrap();
        let proj = TempDir::new().unwrap();
        let providers = Providers::fs_defaults(data.path());

        let skill = data.path().join("skills").join("writing-tests");
        std::fs::create_dir_all(&skill).unwrap();
        std::fs::write(skill.join("SKILL.md"), "# Writing tests\nBody.").unwrap();

        Fx {
            store_root: data.path().to_path_buf(),
            dir: proj.path().to_path_buf(),
            providers,
            _data: data,
            _proj: proj,
        }
    }

    fn project(fx: &Fx) -> Project {
        let mut p = Project::new("p1");
        p.directory = Some(fx.dir.to_string_lossy().to_string());
        p.agents = vec!["claude".into()];
        p.skills = vec!["writing-tests".into()];
        DocumentStore::new(&fx.store_root).save_project(&p).unwrap();
        p
    }

    async fn synced_project(fx: &Fx, mode: SkillSyncMode) -> Project {
        let p = project(fx);
        sync::sync(
            &p,
            &fx.dir,
            AgentRegistry::builtin(),
            mode,
            &fx.providers,
            &fx.store_root,
        )
        .await
        .unwrap();
        p
    }

    #[tokio::test]
    async fn clean_after_sync() {
        let fx = fixture();
        let p = synced_project(&fx, SkillSyncMode::Copy).await;
        let status = check(
            &p,
            AgentRegistry::builtin(),
            SkillSyncMode::Copy,
            &fx.providers,
            &fx.store_root,
        )
        .await;
        let DriftStatus::Checked(report) = status else {
            panic!("expected a report")
        };
        assert!(!report.drifted);
        assert!(report.agents.is_empty());
    }

    #[tokio::test]
    async fn deleted_artifact_is_missing() {
        let fx = fixture();
        let p = synced_project(&fx, SkillSyncMode::Copy).await;
        std::fs::remove_file(fx.dir.join(".claude/skills/writing-tests/SKILL.md")).unwrap();

        let status = check(
            &p,
            AgentRegistry::builtin(),
            SkillSyncMode::Copy,
            &fx.providers,
            &fx.store_root,
        )
        .await;
        let DriftStatus::Checked(report) = status else {
            panic!()
        };
        assert!(report.drifted);
        assert_eq!(report.agents.len(), 1);
        assert_eq!(report.agents[0].agent_id, "claude");
        assert_eq!(report.agents[0].files[0].reason, DriftReason::Missing);
    }

    #[tokio::test]
    async fn human_edit_is_modified() {
        let fx = fixture();
        let p = synced_project(&fx, SkillSyncMode::Copy).await;
        std::fs::write(
            fx.dir.join(".claude/skills/writing-tests/SKILL.md"),
            "tampered",
        )
        .unwrap();

        let status = check(
            &p,
            AgentRegistry::builtin(),
            SkillSyncMode::Copy,
            &fx.providers,
            &fx.store_root,
        )
        .await;
        let DriftStatus::Checked(report) = status else {
            panic!()
        };
        assert_eq!(report.agents[0].files[0].reason, DriftReason::Modified);
    }

    #[tokio::test]
    async fn canonical_change_is_stale() {
        let fx = fixture();
        let p = synced_project(&fx, SkillSyncMode::Copy).await;
        // Canonical skill content changes after the sync; disk still holds
        // what sync wrote.
        std::fs::write(
            fx.store_root.join("skills/writing-tests/SKILL.md"),
            "# Writing tests\nNew canonical body.",
        )
        .unwrap();

        let status = check(
            &p,
            AgentRegistry::builtin(),
            SkillSyncMode::Copy,
            &fx.providers,
            &fx.store_root,
        )
        .await;
        let DriftStatus::Checked(report) = status else {
            panic!()
        };
        assert_eq!(report.agents[0].files[0].reason, DriftReason::Stale);
    }

    #[tokio::test]
    async fn missing_directory_is_unavailable_not_drift() {
        let fx = fixture();
        let mut p = project(&fx);
        p.directory = Some("/nonexistent/path/for/sure".into());
        let status = check(
            &p,
            AgentRegistry::builtin(),
            SkillSyncMode::Copy,
            &fx.providers,
            &fx.store_root,
        )
        .await;
        assert!(matches!(status, DriftStatus::Unavailable { .. }));
        assert!(!status.drifted());
    }

    #[tokio::test]
    async fn no_directory_is_unavailable() {
        let fx = fixture();
        let mut p = project(&fx);
        p.directory = None;
        let status = check(
            &p,
            AgentRegistry::builtin(),
            SkillSyncMode::Copy,
            &fx.providers,
            &fx.store_root,
        )
        .await;
        assert!(matches!(status, DriftStatus::Unavailable { .. }));
    }

    #[tokio::test]
    async fn retargeted_symlink_is_modified() {
        let fx = fixture();
        let p = synced_project(&fx, SkillSyncMode::Symlink).await;
        let link = fx.dir.join(".claude/skills/writing-tests");
        std::fs::remove_file(&link).unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink("/tmp", &link).unwrap();

        let status = check(
            &p,
            AgentRegistry::builtin(),
            SkillSyncMode::Symlink,
            &fx.providers,
            &fx.store_root,
        )
        .await;
        let DriftStatus::Checked(report) = status else {
            panic!()
        };
        assert_eq!(report.agents[0].files[0].reason, DriftReason::Modified);
    }

    #[test]
    fn reason_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DriftReason::Missing).unwrap(),
            "\"missing\""
        );
        assert_eq!(
            serde_json::to_string(&DriftReason::Stale).unwrap(),
            "\"stale\""
        );
    }
}
