//! Sync (reconciler) engine — materializes canonical state onto every
//! configured agent's on-disk layout.
//!
//! Best-effort per artifact, never all-or-nothing: one agent's failed write
//! is collected and the pass keeps going. After a pass the manifest records
//! exactly what was written (paths, hashes, owned MCP keys), which is what
//! the drift detector later checks against.

pub mod manifest;
pub mod plan;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{CoreError, SyncFailure};
use crate::project::{Project, SkillSyncMode};
use crate::providers::Providers;
use crate::registry::AgentRegistry;
use crate::store::DocumentStore;
use manifest::{content_hash, ArtifactKind, FileRecord, McpRecord, SyncManifest};
use plan::{PlannedPayload, SyncPlan};

/// What one sync pass did.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub written: Vec<PathBuf>,
    pub failures: Vec<SyncFailure>,
}

impl SyncOutcome {
    /// Collapse into the call-boundary result: written paths, or a
    /// `PartialSyncFailure` carrying every failed artifact.
    pub fn into_result(self) -> Result<Vec<PathBuf>, CoreError> {
        if self.failures.is_empty() {
            Ok(self.written)
        } else {
            Err(CoreError::PartialSyncFailure {
                failures: self.failures,
            })
        }
    }
}

/// Run one sync pass for a project.
///
/// The heavy filesystem work runs on the blocking pool; the project document
/// and providers are cheap to clone across.
pub async fn sync(
    project: &Project,
    directory: &Path,
    registry: AgentRegistry,
    mode: SkillSyncMode,
    providers: &Providers,
    store_root: &Path,
) -> Result<SyncOutcome> {
    let project = project.clone();
    let directory = directory.to_path_buf();
    let providers = providers.clone();
    let store_root = store_root.to_path_buf();

    tokio::task::spawn_blocking(move || {
        sync_pass(&project, &directory, registry, mode, &providers, &store_root)
    })
    .await
    .map_err(|e| anyhow::anyhow!("sync task panicked: {e}"))?
}

fn sync_pass(
    project: &Project,
    directory: &Path,
    registry: AgentRegistry,
    mode: SkillSyncMode,
    providers: &Providers,
    store_root: &Path,
) -> Result<SyncOutcome> {
    let store = DocumentStore::new(store_root);
    let old_manifest = store.load_manifest(&project.name);
    let plan = plan::build(project, directory, &registry, mode, providers, &store);

    let mut outcome = SyncOutcome {
        written: Vec::new(),
        failures: plan.failures.clone(),
    };
    let mut new_manifest = SyncManifest::default();

    // Orphans go first. On a skill-mode switch the new pass replaces a
    // directory with a symlink (or vice versa); removing stale entries while
    // the old shapes are still on disk keeps the joins from resolving
    // through a fresh symlink into the registry source.
    remove_orphans(&plan, &old_manifest, directory);
    write_artifacts(&plan, &old_manifest, &mut outcome, &mut new_manifest);
    merge_mcp_artifacts(&plan, &old_manifest, &mut outcome, &mut new_manifest);
    retract_unplanned_mcp(&plan, &old_manifest, directory);

    new_manifest.synced_at = Some(chrono::Utc::now());
    store.save_manifest(&project.name, &new_manifest)?;

    info!(
        project = %project.name,
        written = outcome.written.len(),
        failed = outcome.failures.len(),
        "sync pass complete"
    );
    Ok(outcome)
}

// ─── Files and links ──────────────────────────────────────────────────────────

fn write_artifacts(
    plan: &SyncPlan,
    old_manifest: &SyncManifest,
    outcome: &mut SyncOutcome,
    manifest: &mut SyncManifest,
) {
    for artifact in &plan.artifacts {
        let result = match &artifact.payload {
            PlannedPayload::Content(content) => write_file(&artifact.path, content)
                .map(|()| (ArtifactKind::File, content_hash(content))),
            PlannedPayload::Link { target } => write_link(&artifact.path, target)
                .map(|()| (ArtifactKind::Symlink, content_hash(&target.to_string_lossy()))),
        };
        match result {
            Ok((kind, hash)) => {
                manifest.files.insert(
                    artifact.rel.clone(),
                    FileRecord {
                        agent_id: artifact.agent_id.clone(),
                        kind,
                        hash,
                    },
                );
                outcome.written.push(artifact.path.clone());
            }
            Err(e) => {
                warn!(path = %artifact.path.display(), err = %e, "artifact write failed");
                // Ownership survives a failed pass: keep the prior record so
                // a later pass can still retract what an earlier one wrote.
                if let Some(old) = old_manifest.files.get(&artifact.rel) {
                    manifest.files.insert(artifact.rel.clone(), old.clone());
                }
                outcome.failures.push(SyncFailure {
                    agent_id: artifact.agent_id.clone(),
                    path: artifact.path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        // A symlink-mode pass may have left a link where this file's
        // directory belongs; writing through it would hit the link target.
        if is_symlink(parent) {
            std::fs::remove_file(parent)?;
        }
        std::fs::create_dir_all(parent)?;
    }
    if is_symlink(path) {
        std::fs::remove_file(path)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

fn write_link(path: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::symlink_metadata(path) {
        Ok(meta) => {
            if meta.file_type().is_symlink() {
                if std::fs::read_link(path)? == target {
                    return Ok(());
                }
                std::fs::remove_file(path)?;
            } else if meta.is_dir() {
                // A previous copy-mode sync left a real directory here.
                std::fs::remove_dir_all(path)?;
            } else {
                std::fs::remove_file(path)?;
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    make_symlink(target, path)
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::windows::fs::symlink_dir(target, link)?;
    Ok(())
}

// ─── MCP config merge ─────────────────────────────────────────────────────────

/// Merge owned entries into each agent's MCP artifact.
///
/// Foreign entries are preserved byte-for-byte in their original order.
/// A key is deleted only when the previous manifest owned it and canonical
/// state no longer lists it; anything a user added natively stays put.
fn merge_mcp_artifacts(
    plan: &SyncPlan,
    old_manifest: &SyncManifest,
    outcome: &mut SyncOutcome,
    manifest: &mut SyncManifest,
) {
    for mcp in &plan.mcp {
        // No entries to own and nothing previously owned — leave the
        // artifact (and its absence) alone.
        let previously_owned = old_manifest.mcp.contains_key(&mcp.agent_id);
        if mcp.entries.is_empty() && !previously_owned {
            continue;
        }

        match merge_one_mcp(mcp, old_manifest) {
            Ok(entry_hashes) => {
                manifest.mcp.insert(
                    mcp.agent_id.clone(),
                    McpRecord {
                        path: mcp.rel.clone(),
                        entry_hashes,
                    },
                );
                outcome.written.push(mcp.path.clone());
            }
            Err(e) => {
                warn!(agent = %mcp.agent_id, path = %mcp.path.display(), err = %e, "MCP merge failed");
                // Entries this project wrote in an earlier pass stay owned;
                // dropping the record here would orphan them forever.
                if let Some(old) = old_manifest.mcp.get(&mcp.agent_id) {
                    manifest.mcp.insert(mcp.agent_id.clone(), old.clone());
                }
                outcome.failures.push(SyncFailure {
                    agent_id: mcp.agent_id.clone(),
                    path: mcp.path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

fn merge_one_mcp(
    mcp: &plan::McpPlan,
    old_manifest: &SyncManifest,
) -> Result<BTreeMap<String, String>> {
    let mut root: Map<String, Value> = match std::fs::read_to_string(&mcp.path) {
        Ok(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            // Never clobber a file we cannot parse — a human owns it now.
            Ok(_) => anyhow::bail!("existing config is not a JSON object"),
            Err(e) => anyhow::bail!("existing config is unparseable: {e}"),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
        Err(e) => return Err(e.into()),
    };

    let mut servers = match root.remove(mcp.key) {
        Some(Value::Object(map)) => map,
        Some(_) | None => Map::new(),
    };

    // Delete keys this project owned that canonical state dropped.
    for key in old_manifest
        .mcp
        .get(&mcp.agent_id)
        .map(|rec| rec.entry_hashes.keys().cloned().collect::<Vec<_>>())
        .unwrap_or_default()
    {
        if !mcp.entries.contains_key(&key) && servers.remove(&key).is_some() {
            debug!(agent = %mcp.agent_id, key = %key, "removed de-listed MCP entry");
        }
    }

    // Upsert owned entries.
    let mut entry_hashes = BTreeMap::new();
    for (key, value) in &mcp.entries {
        if servers.contains_key(key) && !old_manifest.owns_mcp_entry(&mcp.agent_id, key) {
            warn!(
                agent = %mcp.agent_id,
                key = %key,
                "taking over an MCP entry that already existed in the native config"
            );
        }
        servers.insert(key.clone(), value.clone());
        entry_hashes.insert(key.clone(), content_hash(&value.to_string()));
    }

    root.insert(mcp.key.to_string(), Value::Object(servers));
    if let Some(parent) = mcp.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut rendered = serde_json::to_string_pretty(&Value::Object(root))?;
    rendered.push('\n');
    std::fs::write(&mcp.path, rendered)?;
    Ok(entry_hashes)
}

// ─── Orphan removal ───────────────────────────────────────────────────────────

/// Remove files the previous sync wrote that the current plan no longer
/// contains (a skill or instruction file dropped from canonical state).
/// Only manifest-owned paths are ever touched.
fn remove_orphans(plan: &SyncPlan, old_manifest: &SyncManifest, directory: &Path) {
    let planned: std::collections::BTreeSet<&str> =
        plan.artifacts.iter().map(|a| a.rel.as_str()).collect();
    for (rel, record) in &old_manifest.files {
        if planned.contains(rel.as_str()) {
            continue;
        }
        let path = directory.join(rel);
        let meta = match std::fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                warn!(path = %path.display(), err = %e, "orphan removal failed");
                continue;
            }
        };
        // Remove only what still is what we wrote; a mode switch may have
        // already replaced the path with a different artifact kind.
        let still_ours = match record.kind {
            ArtifactKind::Symlink => meta.file_type().is_symlink(),
            ArtifactKind::File => meta.is_file(),
        };
        if !still_ours {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed orphaned artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), err = %e, "orphan removal failed"),
        }
    }
}

/// An agent dropped from `project.agents` has no plan entry at all, so its
/// previously owned MCP keys would otherwise linger. Strip exactly those
/// keys; foreign entries in the same artifact stay.
fn retract_unplanned_mcp(plan: &SyncPlan, old_manifest: &SyncManifest, directory: &Path) {
    let planned_agents: std::collections::BTreeSet<&str> =
        plan.mcp.iter().map(|m| m.agent_id.as_str()).collect();

    for (agent_id, record) in &old_manifest.mcp {
        if planned_agents.contains(agent_id.as_str()) || record.entry_hashes.is_empty() {
            continue;
        }
        let path = directory.join(&record.path);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            continue;
        };
        let Ok(Value::Object(mut root)) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        let mut changed = false;
        for (_, section) in root.iter_mut() {
            if let Value::Object(servers) = section {
                for key in record.entry_hashes.keys() {
                    changed |= servers.remove(key).is_some();
                }
            }
        }
        if changed {
            match serde_json::to_string_pretty(&Value::Object(root)) {
                Ok(mut rendered) => {
                    rendered.push('\n');
                    if let Err(e) = std::fs::write(&path, rendered) {
                        warn!(path = %path.display(), err = %e, "MCP retraction write failed");
                    } else {
                        debug!(agent = %agent_id, path = %path.display(), "retracted owned MCP entries");
                    }
                }
                Err(e) => warn!(err = %e, "MCP retraction serialization failed"),
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;
    use tempfile::TempDir;

    struct Fx {
        _data: TempDir,
        _proj: TempDir,
        store_root: PathBuf,
        dir: PathBuf,
        providers: Providers,
    }

    fn fixture() -> Fx {
        let data = TempDir::new().unwrap();
        let proj = TempDir::new().unwrap();
        let providers = Providers::fs_defaults(data.path());

        let skill = data.path().join("skills").join("writing-tests");
        std::fs::create_dir_all(&skill).unwrap();
        std::fs::write(skill.join("SKILL.md"), "# Writing tests\nAlways test.").unwrap();
        std::fs::write(
            data.path().join("mcp-servers.json"),
            r#"{ "servers": [ { "name": "fs", "command": "npx", "args": ["-y"] } ] }"#,
        )
        .unwrap();

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

    #[tokio::test]
    async fn symlink_sync_creates_link() {
        let fx = fixture();
        let p = project(&fx);
        let outcome = sync(
            &p,
            &fx.dir,
            AgentRegistry::builtin(),
            SkillSyncMode::Symlink,
            &fx.providers,
            &fx.store_root,
        )
        .await
        .unwrap();
        assert!(outcome.failures.is_empty());

        let link = fx.dir.join(".claude/skills/writing-tests");
        let meta = std::fs::symlink_metadata(&link).unwrap();
        assert!(meta.file_type().is_symlink());
        // Reading through the link reaches the registry copy.
        assert!(std::fs::read_to_string(link.join("SKILL.md"))
            .unwrap()
            .contains("Always test."));
    }

    #[tokio::test]
    async fn copy_sync_duplicates_bytes() {
        let fx = fixture();
        let p = project(&fx);
        sync(
            &p,
            &fx.dir,
            AgentRegistry::builtin(),
            SkillSyncMode::Copy,
            &fx.providers,
            &fx.store_root,
        )
        .await
        .unwrap();

        let file = fx.dir.join(".claude/skills/writing-tests/SKILL.md");
        assert!(std::fs::symlink_metadata(&file).unwrap().is_file());
    }

    #[tokio::test]
    async fn switching_copy_to_symlink_replaces_directory() {
        let fx = fixture();
        let p = project(&fx);
        for mode in [SkillSyncMode::Copy, SkillSyncMode::Symlink] {
            sync(
                &p,
                &fx.dir,
                AgentRegistry::builtin(),
                mode,
                &fx.providers,
                &fx.store_root,
            )
            .await
            .unwrap();
        }
        let link = fx.dir.join(".claude/skills/writing-tests");
        assert!(std::fs::symlink_metadata(&link)
            .unwrap()
            .file_type()
            .is_symlink());
    }

    #[tokio::test]
    async fn switching_copy_to_symlink_spares_registry_source() {
        let fx = fixture();
        let p = project(&fx);
        for mode in [SkillSyncMode::Copy, SkillSyncMode::Symlink] {
            sync(
                &p,
                &fx.dir,
                AgentRegistry::builtin(),
                mode,
                &fx.providers,
                &fx.store_root,
            )
            .await
            .unwrap();
        }
        // Cleaning up the copy-mode SKILL.md must happen before the symlink
        // exists; otherwise the removal resolves through the fresh link and
        // deletes the registry's own copy.
        let source = fx.store_root.join("skills/writing-tests/SKILL.md");
        assert_eq!(
            std::fs::read_to_string(&source).unwrap(),
            "# Writing tests\nAlways test."
        );
    }

    #[tokio::test]
    async fn switching_symlink_to_copy_replaces_link_and_spares_registry() {
        let fx = fixture();
        let p = project(&fx);
        for mode in [SkillSyncMode::Symlink, SkillSyncMode::Copy] {
            sync(
                &p,
                &fx.dir,
                AgentRegistry::builtin(),
                mode,
                &fx.providers,
                &fx.store_root,
            )
            .await
            .unwrap();
        }
        let dir = fx.dir.join(".claude/skills/writing-tests");
        let meta = std::fs::symlink_metadata(&dir).unwrap();
        assert!(meta.is_dir() && !meta.file_type().is_symlink());
        assert!(dir.join("SKILL.md").is_file());
        // The registry source was read, never written through.
        assert_eq!(
            std::fs::read_to_string(fx.store_root.join("skills/writing-tests/SKILL.md")).unwrap(),
            "# Writing tests\nAlways test."
        );
    }

    #[tokio::test]
    async fn mcp_merge_preserves_foreign_entries() {
        let fx = fixture();
        let mut p = project(&fx);
        p.mcp_servers = vec!["fs".into()];

        // User already configured their own server natively.
        std::fs::write(
            fx.dir.join(".mcp.json"),
            r#"{ "mcpServers": { "user-server": { "command": "deno" } } }"#,
        )
        .unwrap();

        sync(
            &p,
            &fx.dir,
            AgentRegistry::builtin(),
            SkillSyncMode::Symlink,
            &fx.providers,
            &fx.store_root,
        )
        .await
        .unwrap();

        let raw = std::fs::read_to_string(fx.dir.join(".mcp.json")).unwrap();
        let v: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["mcpServers"]["user-server"]["command"], "deno");
        assert_eq!(v["mcpServers"]["fs"]["command"], "npx");
    }

    #[tokio::test]
    async fn delisted_owned_entry_is_removed_foreign_stays() {
        let fx = fixture();
        let mut p = project(&fx);
        p.mcp_servers = vec!["fs".into()];
        std::fs::write(
            fx.dir.join(".mcp.json"),
            r#"{ "mcpServers": { "user-server": { "command": "deno" } } }"#,
        )
        .unwrap();

        let run = |p: Project, fx_dir: PathBuf, providers: Providers, root: PathBuf| async move {
            sync(
                &p,
                &fx_dir,
                AgentRegistry::builtin(),
                SkillSyncMode::Symlink,
                &providers,
                &root,
            )
            .await
            .unwrap()
        };
        run(
            p.clone(),
            fx.dir.clone(),
            fx.providers.clone(),
            fx.store_root.clone(),
        )
        .await;

        // Drop the server from canonical state and re-sync.
        p.mcp_servers.clear();
        run(p, fx.dir.clone(), fx.providers.clone(), fx.store_root.clone()).await;

        let v: Value =
            serde_json::from_str(&std::fs::read_to_string(fx.dir.join(".mcp.json")).unwrap())
                .unwrap();
        assert!(v["mcpServers"].get("fs").is_none(), "owned entry removed");
        assert_eq!(v["mcpServers"]["user-server"]["command"], "deno");
    }

    #[tokio::test]
    async fn unparseable_mcp_config_is_a_failure_not_a_clobber() {
        let fx = fixture();
        let mut p = project(&fx);
        p.mcp_servers = vec!["fs".into()];
        std::fs::write(fx.dir.join(".mcp.json"), "{ not json").unwrap();

        let outcome = sync(
            &p,
            &fx.dir,
            AgentRegistry::builtin(),
            SkillSyncMode::Symlink,
            &fx.providers,
            &fx.store_root,
        )
        .await
        .unwrap();

        assert!(outcome
            .failures
            .iter()
            .any(|f| f.path.ends_with(".mcp.json")));
        // Original bytes untouched.
        assert_eq!(
            std::fs::read_to_string(fx.dir.join(".mcp.json")).unwrap(),
            "{ not json"
        );
    }

    #[tokio::test]
    async fn ownership_survives_a_failed_pass() {
        let fx = fixture();
        let mut p = project(&fx);
        p.mcp_servers = vec!["fs".into()];

        let run = |p: Project| {
            let dir = fx.dir.clone();
            let providers = fx.providers.clone();
            let root = fx.store_root.clone();
            async move {
                sync(
                    &p,
                    &dir,
                    AgentRegistry::builtin(),
                    SkillSyncMode::Symlink,
                    &providers,
                    &root,
                )
                .await
                .unwrap()
            }
        };

        run(p.clone()).await;
        let good = std::fs::read_to_string(fx.dir.join(".mcp.json")).unwrap();

        // A human mangles the config; the next pass fails on this artifact.
        std::fs::write(fx.dir.join(".mcp.json"), "{ not json").unwrap();
        let outcome = run(p.clone()).await;
        assert_eq!(outcome.failures.len(), 1);

        // Once the file is repaired and the server de-listed, the entry
        // written two passes ago must still be retractable.
        std::fs::write(fx.dir.join(".mcp.json"), &good).unwrap();
        p.mcp_servers.clear();
        run(p).await;

        let v: Value =
            serde_json::from_str(&std::fs::read_to_string(fx.dir.join(".mcp.json")).unwrap())
                .unwrap();
        assert!(v["mcpServers"].get("fs").is_none());
    }

    #[tokio::test]
    async fn one_failure_does_not_block_other_artifacts() {
        let fx = fixture();
        let mut p = project(&fx);
        p.mcp_servers = vec!["fs".into()];
        std::fs::write(fx.dir.join(".mcp.json"), "broken").unwrap();

        let outcome = sync(
            &p,
            &fx.dir,
            AgentRegistry::builtin(),
            SkillSyncMode::Symlink,
            &fx.providers,
            &fx.store_root,
        )
        .await
        .unwrap();

        // The skill still materialized even though MCP failed.
        assert!(fx.dir.join(".claude/skills/writing-tests").exists());
        assert_eq!(outcome.failures.len(), 1);
    }

    #[tokio::test]
    async fn removed_skill_artifact_is_cleaned_up() {
        let fx = fixture();
        let mut p = project(&fx);
        sync(
            &p,
            &fx.dir,
            AgentRegistry::builtin(),
            SkillSyncMode::Symlink,
            &fx.providers,
            &fx.store_root,
        )
        .await
        .unwrap();
        assert!(fx.dir.join(".claude/skills/writing-tests").exists());

        p.skills.clear();
        sync(
            &p,
            &fx.dir,
            AgentRegistry::builtin(),
            SkillSyncMode::Symlink,
            &fx.providers,
            &fx.store_root,
        )
        .await
        .unwrap();
        assert!(!fx.dir.join(".claude/skills/writing-tests").exists());
    }

    #[tokio::test]
    async fn sync_twice_is_byte_identical() {
        let fx = fixture();
        let mut p = project(&fx);
        p.mcp_servers = vec!["fs".into()];
        let store = DocumentStore::new(&fx.store_root);
        store
            .save_project_file("p1", "CLAUDE.md", "Instructions.")
            .unwrap();

        let run = || async {
            sync(
                &p,
                &fx.dir,
                AgentRegistry::builtin(),
                SkillSyncMode::Copy,
                &fx.providers,
                &fx.store_root,
            )
            .await
            .unwrap()
        };
        run().await;
        let first_mcp = std::fs::read(fx.dir.join(".mcp.json")).unwrap();
        let first_md = std::fs::read(fx.dir.join("CLAUDE.md")).unwrap();
        run().await;
        assert_eq!(std::fs::read(fx.dir.join(".mcp.json")).unwrap(), first_mcp);
        assert_eq!(std::fs::read(fx.dir.join("CLAUDE.md")).unwrap(), first_md);
    }
}
