//! Planner — derives the set of physical artifacts canonical state calls for.
//!
//! The planner only reads canonical state and the provider seams; it never
//! touches the project directory. Sync writes the plan, the drift detector
//! compares it against disk, so both always agree on what "in sync" means.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::SyncFailure;
use crate::project::{InstructionMode, Project, SkillSyncMode, UNIFIED_FILENAME};
use crate::providers::Providers;
use crate::registry::{AgentDescriptor, AgentRegistry};
use crate::store::DocumentStore;

/// What gets written at a planned path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedPayload {
    Content(String),
    Link { target: PathBuf },
}

/// One file or link Sync will materialize.
#[derive(Debug, Clone)]
pub struct PlannedArtifact {
    pub agent_id: String,
    /// Project-relative path; doubles as the manifest key.
    pub rel: String,
    /// Absolute path under the project directory.
    pub path: PathBuf,
    pub payload: PlannedPayload,
}

/// The owned MCP entries for one agent's config artifact.
#[derive(Debug, Clone)]
pub struct McpPlan {
    pub agent_id: String,
    pub rel: String,
    pub path: PathBuf,
    /// Top-level JSON key the entries live under.
    pub key: &'static str,
    /// Entry name → entry value.
    pub entries: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub artifacts: Vec<PlannedArtifact>,
    pub mcp: Vec<McpPlan>,
    /// Artifacts that cannot be planned (unknown skill/server ids). Sync
    /// reports these as per-artifact failures; drift ignores them.
    pub failures: Vec<SyncFailure>,
}

/// Build the full plan for one project.
///
/// `directory` is the project directory; callers have already checked it is
/// set. The skill sync mode is threaded in explicitly so both modes can be
/// exercised in isolated tests.
pub fn build(
    project: &Project,
    directory: &Path,
    registry: &AgentRegistry,
    mode: SkillSyncMode,
    providers: &Providers,
    store: &DocumentStore,
) -> SyncPlan {
    let mut plan = SyncPlan::default();
    let agents = registry.resolve(&project.agents);

    for agent in &agents {
        plan_skills(&mut plan, project, directory, agent, mode, providers);
        plan_mcp(&mut plan, project, directory, agent, providers);
    }
    plan_instructions(&mut plan, project, directory, &agents, providers, store);
    plan
}

// ─── Skills ───────────────────────────────────────────────────────────────────

fn plan_skills(
    plan: &mut SyncPlan,
    project: &Project,
    directory: &Path,
    agent: &AgentDescriptor,
    mode: SkillSyncMode,
    providers: &Providers,
) {
    let Some(skills_dir) = agent.skills_dir else {
        return;
    };
    if !agent.capabilities.skills {
        return;
    }

    // Global skills come from the registry; local skills from the project's
    // own source tree. Local skills never reference a shared location, so in
    // symlink mode their link target stays inside the project directory.
    let all = project
        .skills
        .iter()
        .map(|id| (id, providers.skills.source_dir(id)))
        .chain(project.local_skills.iter().map(|id| {
            let src = local_skill_dir(directory, id);
            (id, src.is_dir().then_some(src))
        }));

    for (id, source) in all {
        let rel_dir = format!("{skills_dir}/{id}");
        let Some(source) = source else {
            plan.failures.push(SyncFailure {
                agent_id: agent.id.to_string(),
                path: directory.join(&rel_dir),
                reason: format!("skill '{id}' has no source directory"),
            });
            continue;
        };
        match mode {
            SkillSyncMode::Symlink => plan.artifacts.push(PlannedArtifact {
                agent_id: agent.id.to_string(),
                path: directory.join(&rel_dir),
                rel: rel_dir,
                payload: PlannedPayload::Link { target: source },
            }),
            SkillSyncMode::Copy => {
                match std::fs::read_to_string(source.join(crate::providers::SKILL_FILE)) {
                    Ok(content) => {
                        let rel = format!("{rel_dir}/{}", crate::providers::SKILL_FILE);
                        plan.artifacts.push(PlannedArtifact {
                            agent_id: agent.id.to_string(),
                            path: directory.join(&rel),
                            rel,
                            payload: PlannedPayload::Content(content),
                        });
                    }
                    Err(e) => plan.failures.push(SyncFailure {
                        agent_id: agent.id.to_string(),
                        path: directory.join(&rel_dir),
                        reason: format!("skill '{id}' unreadable: {e}"),
                    }),
                }
            }
        }
    }
}

/// Where a project-local skill's source lives.
pub fn local_skill_dir(directory: &Path, id: &str) -> PathBuf {
    directory.join(".agentsync").join("skills").join(id)
}

// ─── MCP servers ──────────────────────────────────────────────────────────────

fn plan_mcp(
    plan: &mut SyncPlan,
    project: &Project,
    directory: &Path,
    agent: &AgentDescriptor,
    providers: &Providers,
) {
    if !agent.capabilities.mcp_servers {
        return;
    }
    if let Some(note) = agent.mcp_note {
        if !project.mcp_servers.is_empty() {
            warn!(agent = agent.id, note, "agent MCP config is not writable — skipping");
        }
        return;
    }
    let Some(rel) = agent.mcp_config_path else {
        return;
    };

    let mut entries = BTreeMap::new();
    for id in &project.mcp_servers {
        match providers.mcp.get(id) {
            Some(def) => {
                entries.insert(id.clone(), def.to_entry());
            }
            None => plan.failures.push(SyncFailure {
                agent_id: agent.id.to_string(),
                path: directory.join(rel),
                reason: format!("unknown MCP server '{id}'"),
            }),
        }
    }

    plan.mcp.push(McpPlan {
        agent_id: agent.id.to_string(),
        rel: rel.to_string(),
        path: directory.join(rel),
        key: agent.mcp_config_key,
        entries,
    });
}

// ─── Instructions ─────────────────────────────────────────────────────────────

fn plan_instructions(
    plan: &mut SyncPlan,
    project: &Project,
    directory: &Path,
    agents: &[&'static AgentDescriptor],
    providers: &Providers,
    store: &DocumentStore,
) {
    // One logical file can fan out to several physical files and be consumed
    // by several agents; plan each physical path once.
    let mut planned: BTreeMap<String, PlannedArtifact> = BTreeMap::new();

    for agent in agents {
        if !agent.capabilities.instructions {
            continue;
        }
        for filename in agent.instruction_files {
            let (base, rule_ids) = match project.instruction_mode {
                InstructionMode::Unified => (
                    project.unified_instruction.clone(),
                    project.rules_for(UNIFIED_FILENAME),
                ),
                InstructionMode::PerAgent => (
                    store
                        .read_project_file(&project.name, filename)
                        .unwrap_or_default(),
                    project.rules_for(filename),
                ),
            };
            // Nothing canonical for this file — materialize nothing.
            if base.is_none() && rule_ids.is_empty() {
                continue;
            }
            let content = render(base.as_deref().unwrap_or_default(), rule_ids, providers);
            planned
                .entry(filename.to_string())
                .or_insert_with(|| PlannedArtifact {
                    agent_id: agent.id.to_string(),
                    rel: filename.to_string(),
                    path: directory.join(filename),
                    payload: PlannedPayload::Content(content),
                });
        }
    }
    plan.artifacts.extend(planned.into_values());
}

/// Render one instruction file: canonical content followed by a generated
/// Rules section. Unknown rule ids are skipped with a warning rather than
/// failing the whole file.
pub fn render(base: &str, rule_ids: &[String], providers: &Providers) -> String {
    let mut out = String::with_capacity(base.len() + 64);
    out.push_str(base.trim_end());
    if !out.is_empty() {
        out.push('\n');
    }

    let names: BTreeMap<String, String> = providers
        .rules
        .list()
        .into_iter()
        .map(|m| (m.id, m.name))
        .collect();

    let mut rendered_any = false;
    for id in rule_ids {
        let body = match providers.rules.read(id) {
            Ok(b) => b,
            Err(e) => {
                warn!(rule = %id, err = %e, "rule not in catalogue — skipping");
                continue;
            }
        };
        if !rendered_any {
            out.push_str("\n## Rules\n");
            rendered_any = true;
        }
        let name = names.get(id).cloned().unwrap_or_else(|| id.clone());
        out.push_str(&format!("\n### {name}\n\n{}\n", body.trim_end()));
    }
    out
}

// ─── Tests ────────────────────────────────────────────────────────────────────
