//! Local Skill Replicator — a narrower reconciler scoped to skills that live
//! only inside one project directory.
//!
//! A local skill is authored once under `.agentsync/skills/<id>` and copied
//! into every configured agent's skill directory, so a skill written for one
//! agent becomes usable by all agents attached to that project without ever
//! touching the global registry. Promotion is the only way out of the
//! project: it moves the source into the global registry and flips the id
//! from `local_skills` to `skills`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};

use crate::error::{CoreError, SyncFailure};
use crate::project::Project;
use crate::providers::{copy_dir, SkillSource};
use crate::registry::AgentRegistry;
use crate::sync::plan::local_skill_dir;
use crate::sync::SyncOutcome;

/// Copy every local skill into every configured agent's skill directory
/// under `directory`. Strictly scoped: nothing outside `directory` is read
/// or written.
pub fn replicate(project: &Project, directory: &Path, registry: &AgentRegistry) -> SyncOutcome {
    let mut outcome = SyncOutcome::default();

    for id in &project.local_skills {
        let source = local_skill_dir(directory, id);
        if !source.is_dir() {
            outcome.failures.push(SyncFailure {
                agent_id: String::new(),
                path: source.clone(),
                reason: format!("local skill '{id}' has no source directory"),
            });
            continue;
        }
        for agent in registry.resolve(&project.agents) {
            let Some(skills_dir) = agent.skills_dir else {
                continue;
            };
            let dest = directory.join(skills_dir).join(id);
            match copy_dir(&source, &dest) {
                Ok(()) => {
                    debug!(skill = %id, agent = agent.id, "local skill replicated");
                    outcome.written.push(dest);
                }
                Err(e) => outcome.failures.push(SyncFailure {
                    agent_id: agent.id.to_string(),
                    path: dest,
                    reason: e.to_string(),
                }),
            }
        }
    }
    outcome
}

/// Copy one local skill into the global registry and flip its id from
/// `local_skills` to `skills`.
///
/// Deliberately non-destructive: the project-local source stays on disk and
/// its path is returned. The caller removes it only after the updated
/// document is persisted, so an interrupted promotion never loses the skill.
pub fn promote(
    project: &mut Project,
    directory: &Path,
    skill: &str,
    skills: &dyn SkillSource,
) -> Result<PathBuf, CoreError> {
    if !project.local_skills.iter().any(|s| s == skill) {
        return Err(CoreError::validation(format!(
            "'{skill}' is not a local skill of project '{}'",
            project.name
        )));
    }
    let source = local_skill_dir(directory, skill);
    if !source.is_dir() {
        return Err(CoreError::validation(format!(
            "local skill '{skill}' has no source directory at {}",
            source.display()
        )));
    }

    skills.import(skill, &source)?;

    project.local_skills.retain(|s| s != skill);
    if !project.skills.iter().any(|s| s == skill) {
        project.skills.push(skill.to_string());
    }
    info!(project = %project.name, skill = %skill, "local skill promoted to global registry");
    Ok(source)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
