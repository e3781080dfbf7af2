//! agentsync CLI — thin shell over the core: parse arguments, call one core
//! operation, render one status line (or JSON with `--json`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use agentsync::core::Core;
use agentsync::drift::poller::DriftPoller;
use agentsync::drift::DriftStatus;
use agentsync::error::CoreError;
use agentsync::project::{InstructionMode, ProjectTemplate, SkillSyncMode, UNIFIED_FILENAME};
use agentsync::{config, detect};

#[derive(Parser)]
#[command(name = "agentsync", version, about = "Sync one canonical AI-agent tooling config to every agent's on-disk format")]
struct Cli {
    /// Data directory (documents, skills, rules, MCP definitions).
    #[arg(long, global = true, env = config::DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Emit machine-readable JSON instead of status lines.
    #[arg(long, global = true)]
    json: bool,

    /// Also write logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage project documents.
    #[command(subcommand)]
    Project(ProjectCmd),
    /// Manage project templates.
    #[command(subcommand)]
    Template(TemplateCmd),
    /// Inspect a project directory and fold findings into the document.
    Detect { project: String },
    /// Re-run reconciliation for a project.
    Sync { project: String },
    /// Drift detection.
    #[command(subcommand)]
    Drift(DriftCmd),
    /// Project-local skills.
    #[command(subcommand)]
    Skills(SkillsCmd),
    /// Logical instruction files.
    #[command(subcommand)]
    Files(FilesCmd),
    /// Global settings.
    #[command(subcommand)]
    Settings(SettingsCmd),
    /// List supported agents.
    Agents,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListCategory {
    Agents,
    Skills,
    LocalSkills,
    McpServers,
    Providers,
}

#[derive(Subcommand)]
enum ProjectCmd {
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        directory: Option<String>,
    },
    List,
    Show { name: String },
    Delete { name: String },
    Rename { old: String, new: String },
    /// Attach (or change) the project directory.
    SetDirectory { name: String, directory: String },
    /// Add entries to a list category and re-sync.
    Add {
        name: String,
        #[arg(value_enum)]
        category: ListCategory,
        items: Vec<String>,
    },
    /// Remove entries from a list category and re-sync. This is the explicit
    /// removal path; autodetection never removes anything.
    Remove {
        name: String,
        #[arg(value_enum)]
        category: ListCategory,
        items: Vec<String>,
    },
    /// Switch instruction mode (per-agent or unified).
    SetMode {
        name: String,
        #[arg(value_parser = parse_instruction_mode)]
        mode: InstructionMode,
    },
    /// Attach a rule to a logical instruction file.
    AttachRule {
        name: String,
        filename: String,
        rule: String,
    },
    /// Detach a rule from a logical instruction file.
    DetachRule {
        name: String,
        filename: String,
        rule: String,
    },
}

#[derive(Subcommand)]
enum TemplateCmd {
    /// Import a template from a JSON file.
    Import { file: PathBuf },
    List,
    Show { name: String },
    Delete { name: String },
    Rename { old: String, new: String },
    /// Merge a template into a project and re-sync.
    Apply { project: String, template: String },
}

#[derive(Subcommand)]
enum DriftCmd {
    /// One-shot check.
    Check { project: String },
    /// Poll continuously until interrupted.
    Watch { project: String },
}

#[derive(Subcommand)]
enum SkillsCmd {
    /// Copy local skills into every configured agent's skill directory.
    Replicate { project: String },
    /// Move a local skill into the global registry.
    Promote { project: String, skill: String },
}

#[derive(Subcommand)]
enum FilesCmd {
    List { project: String },
    /// Print one logical file's canonical content.
    Read { project: String, filename: String },
    /// Set one logical file's canonical content from a file, then re-sync.
    /// Use `_unified` as the filename in unified mode.
    Write {
        project: String,
        filename: String,
        #[arg(long)]
        from: PathBuf,
    },
}

#[derive(Subcommand)]
enum SettingsCmd {
    Show,
    /// Set how global skills are materialized (symlink or copy).
    SetSkillMode {
        #[arg(value_parser = parse_skill_mode)]
        mode: SkillSyncMode,
    },
}

fn parse_instruction_mode(s: &str) -> Result<InstructionMode, String> {
    match s {
        "per-agent" => Ok(InstructionMode::PerAgent),
        "unified" => Ok(InstructionMode::Unified),
        other => Err(format!("unknown mode '{other}' (expected per-agent|unified)")),
    }
}

fn parse_skill_mode(s: &str) -> Result<SkillSyncMode, String> {
    match s {
        "symlink" => Ok(SkillSyncMode::Symlink),
        "copy" => Ok(SkillSyncMode::Copy),
        other => Err(format!("unknown mode '{other}' (expected symlink|copy)")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => config::data_dir()?,
    };
    let cfg = config::load(&data_dir)?;
    let _log_guard = init_tracing(&cfg, cli.log_file.as_deref())?;

    let core = Core::new(&data_dir);
    run(cli, cfg, core).await
}

fn init_tracing(
    cfg: &config::Config,
    log_file: Option<&std::path::Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(cfg.log_level.as_deref().unwrap_or("info")))?;

    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path
                .file_name()
                .context("log file path has no filename")?;
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

async fn run(cli: Cli, cfg: config::Config, core: Core) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Command::Project(cmd) => project_cmd(&core, cmd, json).await,
        Command::Template(cmd) => template_cmd(&core, cmd, json).await,
        Command::Detect { project } => {
            let detected = core.autodetect(&project).await?;
            if json {
                print_json(&detected)?;
            } else {
                println!(
                    "Detected {} agent(s), {} skill(s), {} local skill(s), {} MCP server(s)",
                    detected.agents.len(),
                    detected.skills.len(),
                    detected.local_skills.len(),
                    detected.mcp_servers.len()
                );
            }
            Ok(())
        }
        Command::Sync { project } => report_sync(core.sync_project(&project).await, json),
        Command::Drift(cmd) => drift_cmd(&core, cmd, &cfg, json).await,
        Command::Skills(cmd) => skills_cmd(&core, cmd, json).await,
        Command::Files(cmd) => files_cmd(&core, cmd, json).await,
        Command::Settings(cmd) => settings_cmd(&core, cmd, json),
        Command::Agents => {
            if json {
                print_json(&core.registry().list())?;
            } else {
                for agent in core.registry().list() {
                    let caps = [
                        agent.capabilities.skills.then_some("skills"),
                        agent.capabilities.instructions.then_some("instructions"),
                        agent.capabilities.mcp_servers.then_some("mcp"),
                    ]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(", ");
                    println!("{:<10} {} ({caps})", agent.id, agent.label);
                }
            }
            Ok(())
        }
    }
}

async fn project_cmd(core: &Core, cmd: ProjectCmd, json: bool) -> Result<()> {
    match cmd {
        ProjectCmd::Create {
            name,
            description,
            directory,
        } => {
            let project = core.create_project(&name, &description, directory)?;
            if json {
                print_json(&project)?;
            } else {
                println!("Created project '{name}'");
            }
            Ok(())
        }
        ProjectCmd::List => {
            let names = core.list_projects()?;
            if json {
                print_json(&names)?;
            } else {
                for name in names {
                    println!("{name}");
                }
            }
            Ok(())
        }
        ProjectCmd::Show { name } => {
            let project = core.get_project(&name)?;
            if json {
                print_json(&project)?;
            } else {
                println!("{name}");
                if let Some(dir) = &project.directory {
                    println!("  directory:   {dir}");
                }
                println!("  agents:      {}", project.agents.join(", "));
                println!("  skills:      {}", project.skills.join(", "));
                println!("  local:       {}", project.local_skills.join(", "));
                println!("  mcp servers: {}", project.mcp_servers.join(", "));
                println!("  mode:        {:?}", project.instruction_mode);
            }
            Ok(())
        }
        ProjectCmd::Delete { name } => {
            core.delete_project(&name)?;
            println!("Deleted project '{name}'");
            Ok(())
        }
        ProjectCmd::Rename { old, new } => {
            core.rename_project(&old, &new)?;
            println!("Renamed project '{old}' to '{new}'");
            Ok(())
        }
        ProjectCmd::SetDirectory { name, directory } => {
            let mut project = core.get_project(&name)?;
            project.directory = Some(directory);
            report_sync(core.save_and_sync(project).await, json)
        }
        ProjectCmd::Add {
            name,
            category,
            items,
        } => {
            let mut project = core.get_project(&name)?;
            let list = category_list(&mut project, category);
            let merged = detect::union_preserving_order(list, &items);
            *list = merged;
            report_sync(core.save_and_sync(project).await, json)
        }
        ProjectCmd::Remove {
            name,
            category,
            items,
        } => {
            let mut project = core.get_project(&name)?;
            let list = category_list(&mut project, category);
            list.retain(|entry| !items.contains(entry));
            report_sync(core.save_and_sync(project).await, json)
        }
        ProjectCmd::SetMode { name, mode } => {
            let mut project = core.get_project(&name)?;
            project.instruction_mode = mode;
            report_sync(core.save_and_sync(project).await, json)
        }
        ProjectCmd::AttachRule {
            name,
            filename,
            rule,
        } => {
            let mut project = core.get_project(&name)?;
            let rules = project.file_rules.entry(filename).or_default();
            if !rules.contains(&rule) {
                rules.push(rule);
            }
            report_sync(core.save_and_sync(project).await, json)
        }
        ProjectCmd::DetachRule {
            name,
            filename,
            rule,
        } => {
            let mut project = core.get_project(&name)?;
            if let Some(rules) = project.file_rules.get_mut(&filename) {
                rules.retain(|r| r != &rule);
                if rules.is_empty() {
                    project.file_rules.remove(&filename);
                }
            }
            report_sync(core.save_and_sync(project).await, json)
        }
    }
}

fn category_list(
    project: &mut agentsync::project::Project,
    category: ListCategory,
) -> &mut Vec<String> {
    match category {
        ListCategory::Agents => &mut project.agents,
        ListCategory::Skills => &mut project.skills,
        ListCategory::LocalSkills => &mut project.local_skills,
        ListCategory::McpServers => &mut project.mcp_servers,
        ListCategory::Providers => &mut project.providers,
    }
}

async fn template_cmd(core: &Core, cmd: TemplateCmd, json: bool) -> Result<()> {
    match cmd {
        TemplateCmd::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("read {}", file.display()))?;
            let template: ProjectTemplate =
                serde_json::from_str(&raw).with_context(|| format!("parse {}", file.display()))?;
            let name = template.name.clone();
            core.save_template(&template)?;
            println!("Imported template '{name}'");
            Ok(())
        }
        TemplateCmd::List => {
            for name in core.list_templates()? {
                println!("{name}");
            }
            Ok(())
        }
        TemplateCmd::Show { name } => {
            let template = core.get_template(&name)?;
            print_json(&template)
        }
        TemplateCmd::Delete { name } => {
            core.delete_template(&name)?;
            println!("Deleted template '{name}'");
            Ok(())
        }
        TemplateCmd::Rename { old, new } => {
            core.rename_template(&old, &new)?;
            println!("Renamed template '{old}' to '{new}'");
            Ok(())
        }
        TemplateCmd::Apply { project, template } => {
            let report = core.apply_template(&project, &template).await?;
            if json {
                print_json(&report)?;
            } else {
                println!(
                    "Applied '{template}' to '{project}': {} file(s) written, {} skipped",
                    report.files_written.len(),
                    report.files_skipped.len()
                );
            }
            Ok(())
        }
    }
}

async fn drift_cmd(core: &Core, cmd: DriftCmd, cfg: &config::Config, json: bool) -> Result<()> {
    match cmd {
        DriftCmd::Check { project } => {
            let status = core.check_drift(&project).await?;
            print_drift(&status, json)
        }
        DriftCmd::Watch { project } => {
            let interval = cfg.drift_poll_interval();
            let (tx, mut rx) = mpsc::channel(8);
            let poller = DriftPoller::spawn(
                core.store().root().to_path_buf(),
                core.providers().clone(),
                project.clone(),
                interval,
                tx,
            );
            info!(project = %project, interval_secs = interval.as_secs(), "watching for drift");

            loop {
                tokio::select! {
                    status = rx.recv() => {
                        match status {
                            Some(status) => print_drift(&status, json)?,
                            None => break,
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            poller.stop().await;
            Ok(())
        }
    }
}

async fn skills_cmd(core: &Core, cmd: SkillsCmd, json: bool) -> Result<()> {
    match cmd {
        SkillsCmd::Replicate { project } => {
            report_sync(core.replicate_local_skills(&project).await, json)
        }
        SkillsCmd::Promote { project, skill } => {
            core.promote_local_skill(&project, &skill).await?;
            println!("Promoted '{skill}' to the global skill registry");
            Ok(())
        }
    }
}

async fn files_cmd(core: &Core, cmd: FilesCmd, json: bool) -> Result<()> {
    match cmd {
        FilesCmd::List { project } => {
            let infos = core.project_file_info(&project)?;
            if json {
                print_json(&infos)?;
            } else {
                for info in infos {
                    let state = if info.exists { "present" } else { "absent" };
                    println!(
                        "{:<40} [{state}] agents: {}",
                        info.filename,
                        info.agents.join(", ")
                    );
                }
            }
            Ok(())
        }
        FilesCmd::Read { project, filename } => {
            match core.read_project_file(&project, &filename)? {
                Some(content) => print!("{content}"),
                None => {
                    if filename == UNIFIED_FILENAME {
                        eprintln!("no unified content set for '{project}'");
                    } else {
                        eprintln!("no canonical content for '{filename}' in '{project}'");
                    }
                }
            }
            Ok(())
        }
        FilesCmd::Write {
            project,
            filename,
            from,
        } => {
            let content = std::fs::read_to_string(&from)
                .with_context(|| format!("read {}", from.display()))?;
            report_sync(core.save_project_file(&project, &filename, &content).await, json)
        }
    }
}

fn settings_cmd(core: &Core, cmd: SettingsCmd, json: bool) -> Result<()> {
    match cmd {
        SettingsCmd::Show => {
            let settings = core.settings();
            if json {
                print_json(&settings)?;
            } else {
                println!("skill sync mode: {:?}", settings.skill_sync_mode);
            }
            Ok(())
        }
        SettingsCmd::SetSkillMode { mode } => {
            let mut settings = core.settings();
            settings.skill_sync_mode = mode;
            core.save_settings(settings)?;
            println!("Skill sync mode set to {mode:?}; run sync to re-materialize skills");
            Ok(())
        }
    }
}

/// Render one save-and-sync result as the standard status line.
fn report_sync(result: Result<Vec<PathBuf>, CoreError>, json: bool) -> Result<()> {
    match result {
        Ok(written) => {
            if json {
                print_json(&written)?;
            } else if written.is_empty() {
                println!("Saved (no artifacts to sync)");
            } else {
                println!("Saved & synced {} artifact(s)", written.len());
            }
            Ok(())
        }
        Err(CoreError::PartialSyncFailure { failures }) => {
            for failure in &failures {
                eprintln!("Sync failed: {failure}");
            }
            anyhow::bail!("{} artifact(s) failed to sync", failures.len())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_drift(status: &DriftStatus, json: bool) -> Result<()> {
    if json {
        return print_json(status);
    }
    match status {
        DriftStatus::Unavailable { reason } => println!("Drift unavailable: {reason}"),
        DriftStatus::Checked(report) if !report.drifted => println!("In sync"),
        DriftStatus::Checked(report) => {
            for agent in &report.agents {
                println!("{} ({}):", agent.agent_label, agent.agent_id);
                for file in &agent.files {
                    println!("  {:<10} {}", format!("{:?}", file.reason).to_lowercase(), file.path);
                }
            }
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
