//! Template Applier — merge a reusable template into a project document.
//!
//! Application is additive and idempotent: list categories are union-merged
//! with the project's existing entries winning their positions, carried
//! project files are only written where no file exists yet, and a template
//! that sets up unified instructions flips the project to unified mode —
//! a one-way switch; applying a plain template later never flips it back.
//! Applying the same template twice is a no-op the second time.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::detect::union_preserving_order;
use crate::error::CoreError;
use crate::project::{InstructionMode, Project, ProjectTemplate, UNIFIED_FILENAME};
use crate::store::DocumentStore;

/// What one application actually changed.
#[derive(Debug, Default, Serialize)]
pub struct ApplyReport {
    /// True when the project document needs persisting (and re-syncing).
    pub project_changed: bool,
    /// Files written into the project directory.
    pub files_written: Vec<String>,
    /// Files skipped because something already exists at their path.
    pub files_skipped: Vec<String>,
}

/// Merge `template` into `project`, writing carried files under `directory`
/// when one is attached.
pub fn apply(
    project: &mut Project,
    directory: Option<&Path>,
    template: &ProjectTemplate,
) -> Result<ApplyReport, CoreError> {
    let mut report = ApplyReport::default();

    merge_list(&mut project.skills, &template.skills, &mut report);
    merge_list(&mut project.mcp_servers, &template.mcp_servers, &mut report);
    merge_list(&mut project.providers, &template.providers, &mut report);
    merge_list(&mut project.agents, &template.agents, &mut report);

    if template.unified_instruction.is_some() || !template.unified_rules.is_empty() {
        if project.instruction_mode != InstructionMode::Unified {
            project.instruction_mode = InstructionMode::Unified;
            report.project_changed = true;
        }
        // The project's own authored content wins over the template's seed.
        if project.unified_instruction.is_none() {
            if let Some(content) = &template.unified_instruction {
                project.unified_instruction = Some(content.clone());
                report.project_changed = true;
            }
        }
        if !template.unified_rules.is_empty() {
            let rules = project.file_rules.entry(UNIFIED_FILENAME.into()).or_default();
            let merged = union_preserving_order(rules, &template.unified_rules);
            if merged.len() != rules.len() {
                *rules = merged;
                report.project_changed = true;
            }
        }
    }

    if let Some(dir) = directory {
        write_project_files(dir, template, &mut report)?;
    } else if !template.project_files.is_empty() {
        debug!(
            template = %template.name,
            "no project directory attached; carried files not written"
        );
        for f in &template.project_files {
            report.files_skipped.push(f.filename.clone());
        }
    }

    info!(
        project = %project.name,
        template = %template.name,
        changed = report.project_changed,
        written = report.files_written.len(),
        "template applied"
    );
    Ok(report)
}

fn merge_list(target: &mut Vec<String>, additions: &[String], report: &mut ApplyReport) {
    let merged = union_preserving_order(target, additions);
    if merged.len() != target.len() {
        *target = merged;
        report.project_changed = true;
    }
}

/// Write carried files, never over anything that already exists.
fn write_project_files(
    dir: &Path,
    template: &ProjectTemplate,
    report: &mut ApplyReport,
) -> Result<(), CoreError> {
    for file in &template.project_files {
        DocumentStore::validate_filename(&file.filename)?;
        let path = dir.join(&file.filename);
        if path.exists() {
            report.files_skipped.push(file.filename.clone());
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("create {}: {e}", parent.display()))?;
        }
        std::fs::write(&path, &file.content)
            .map_err(|e| anyhow::anyhow!("write {}: {e}", path.display()))?;
        report.files_written.push(file.filename.clone());
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
