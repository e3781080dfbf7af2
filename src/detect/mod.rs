//! Autodetection — inspect an agent's on-disk layout and report artifacts
//! canonical state doesn't yet know about.
//!
//! The detector only reads the project directory; it never reads or writes
//! canonical state, and it never raises — unreadable layouts degrade to
//! empty results so first-activation flows stay resilient. The caller
//! applies the merge policy: `stored ∪ detected`, a strict ratchet that can
//! only grow a category. Explicit user action is the only path to shrinking
//! one.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::project::Project;
use crate::registry::{AgentDescriptor, AgentRegistry};

/// What autodetection found in a project directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectedState {
    pub agents: Vec<String>,
    pub skills: Vec<String>,
    pub local_skills: Vec<String>,
    pub mcp_servers: Vec<String>,
}

/// Inspect `directory` for every candidate agent's recognizable layout.
pub fn detect(directory: &Path, candidates: &[AgentDescriptor]) -> DetectedState {
    let mut agents = Vec::new();
    let mut skills = BTreeSet::new();
    let mut mcp_servers = BTreeSet::new();

    for agent in candidates {
        let mut present = agent
            .detect_markers
            .iter()
            .any(|m| directory.join(m).exists());
        present |= agent
            .instruction_files
            .iter()
            .any(|f| directory.join(f).is_file());

        if let Some(skills_dir) = agent.skills_dir {
            let dir = directory.join(skills_dir);
            for id in subdir_names(&dir) {
                skills.insert(id);
                present = true;
            }
        }
        if let Some(mcp_path) = agent.mcp_config_path {
            let path = directory.join(mcp_path);
            if path.is_file() {
                present = true;
                for key in mcp_keys(&path, agent.mcp_config_key) {
                    mcp_servers.insert(key);
                }
            }
        }
        if present {
            agents.push(agent.id.to_string());
        }
    }

    let local_skills: Vec<String> =
        subdir_names(&directory.join(".agentsync").join("skills")).collect();

    // A skill found under an agent dir may be a replicated local skill;
    // report it in one category only.
    let local: BTreeSet<&String> = local_skills.iter().collect();
    let skills: Vec<String> = skills.into_iter().filter(|s| !local.contains(s)).collect();

    let detected = DetectedState {
        agents,
        skills,
        local_skills,
        mcp_servers: mcp_servers.into_iter().collect(),
    };
    debug!(
        dir = %directory.display(),
        agents = detected.agents.len(),
        skills = detected.skills.len(),
        mcp = detected.mcp_servers.len(),
        "autodetect complete"
    );
    detected
}

/// Convenience over the built-in catalogue.
pub fn detect_all(directory: &Path, registry: &AgentRegistry) -> DetectedState {
    detect(directory, registry.list())
}

fn subdir_names(dir: &Path) -> impl Iterator<Item = String> {
    let entries = std::fs::read_dir(dir).ok();
    entries
        .into_iter()
        .flatten()
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
}

fn mcp_keys(path: &Path, key: &str) -> Vec<String> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<Value>(&raw) else {
        return Vec::new();
    };
    match value.get(key) {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

// ─── Merge policy ─────────────────────────────────────────────────────────────

/// Order-preserving set union: everything in `stored` (original order), then
/// anything in `detected` not already present. This is the only merge rule —
/// applied identically to every category so no category can ever shrink.
pub fn union_preserving_order(stored: &[String], detected: &[String]) -> Vec<String> {
    let mut out = stored.to_vec();
    for item in detected {
        if !out.iter().any(|s| s == item) {
            out.push(item.clone());
        }
    }
    out
}

/// Fold detected state into a project document. Returns true if anything new
/// was learned.
pub fn merge_into(project: &mut Project, detected: &DetectedState) -> bool {
    let before = (
        project.agents.len(),
        project.skills.len(),
        project.local_skills.len(),
        project.mcp_servers.len(),
    );

    project.agents = union_preserving_order(&project.agents, &detected.agents);
    // A skill already tracked as local must not be double-tracked globally.
    let new_globals: Vec<String> = detected
        .skills
        .iter()
        .filter(|s| !project.local_skills.contains(s))
        .cloned()
        .collect();
    project.skills = union_preserving_order(&project.skills, &new_globals);
    let new_locals: Vec<String> = detected
        .local_skills
        .iter()
        .filter(|s| !project.skills.contains(s))
        .cloned()
        .collect();
    project.local_skills = union_preserving_order(&project.local_skills, &new_locals);
    project.mcp_servers = union_preserving_order(&project.mcp_servers, &detected.mcp_servers);

    before
        != (
            project.agents.len(),
            project.skills.len(),
            project.local_skills.len(),
            project.mcp_servers.len(),
        )
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_directory_detects_nothing() {
        let tmp = TempDir::new().unwrap();
        let d = detect_all(tmp.path(), &AgentRegistry::builtin());
        assert!(d.agents.is_empty());
        assert!(d.skills.is_empty());
        assert!(d.mcp_servers.is_empty());
    }

    #[test]
    fn claude_layout_is_recognized() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".claude/skills/writing-tests")).unwrap();
        std::fs::write(
            tmp.path().join(".mcp.json"),
            r#"{ "mcpServers": { "fs": { "command": "npx" } } }"#,
        )
        .unwrap();

        let d = detect_all(tmp.path(), &AgentRegistry::builtin());
        assert_eq!(d.agents, vec!["claude"]);
        assert_eq!(d.skills, vec!["writing-tests"]);
        assert_eq!(d.mcp_servers, vec!["fs"]);
    }

    #[test]
    fn instruction_file_alone_marks_agent_present() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("GEMINI.md"), "hello").unwrap();
        let d = detect_all(tmp.path(), &AgentRegistry::builtin());
        assert_eq!(d.agents, vec!["gemini"]);
    }

    #[test]
    fn local_skills_are_not_double_reported() {
        let tmp = TempDir::new().unwrap();
        // Authored locally, already replicated into claude's dir.
        std::fs::create_dir_all(tmp.path().join(".agentsync/skills/review-prs")).unwrap();
        std::fs::create_dir_all(tmp.path().join(".claude/skills/review-prs")).unwrap();

        let d = detect_all(tmp.path(), &AgentRegistry::builtin());
        assert_eq!(d.local_skills, vec!["review-prs"]);
        assert!(d.skills.is_empty());
    }

    #[test]
    fn corrupt_mcp_config_degrades_to_empty() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(".mcp.json"), "{ nope").unwrap();
        let d = detect_all(tmp.path(), &AgentRegistry::builtin());
        // File presence still marks the agent, keys are just unknown.
        assert_eq!(d.agents, vec!["claude"]);
        assert!(d.mcp_servers.is_empty());
    }

    #[test]
    fn union_adds_never_removes() {
        let stored = vec!["a".to_string(), "b".to_string()];
        let detected = vec!["b".to_string(), "c".to_string()];
        assert_eq!(union_preserving_order(&stored, &detected), vec!["a", "b", "c"]);
        // Detection missing an item never shrinks the stored list.
        assert_eq!(union_preserving_order(&stored, &[]), stored);
    }

    #[test]
    fn merge_respects_prior_removals_shape() {
        // The user removed "b" earlier; detection re-finding it re-adds it
        // (ratchet adds), but a detection NOT containing "b" must not.
        let mut p = Project::new("p");
        p.skills = vec!["a".into()];
        let d = DetectedState::default();
        let changed = merge_into(&mut p, &d);
        assert!(!changed);
        assert_eq!(p.skills, vec!["a"]);
    }

    #[test]
    fn merge_keeps_skill_in_one_category() {
        let mut p = Project::new("p");
        p.local_skills = vec!["review-prs".into()];
        let d = DetectedState {
            skills: vec!["review-prs".into()],
            ..Default::default()
        };
        merge_into(&mut p, &d);
        assert_eq!(p.local_skills, vec!["review-prs"]);
        assert!(p.skills.is_empty(), "promotion is the only path between lists");
    }
}
