//! Agent Registry — static catalogue of supported agent targets.
//!
//! Each entry describes one third-party agent tool: which capabilities it
//! supports (skills, instructions, MCP servers) and where inside a project
//! directory its artifacts live. Every other component gates its work on
//! these capability flags — nothing assumes an agent supports a capability.

use once_cell::sync::Lazy;
use serde::Serialize;

/// Capability flags for one agent target.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AgentCapabilities {
    pub skills: bool,
    pub instructions: bool,
    pub mcp_servers: bool,
}

/// One supported agent target and its on-disk layout.
///
/// All paths are relative to the project directory. `instruction_files` can
/// hold more than one filename for tools that read several locations; in
/// unified mode one logical content block fans out to every listed file.
#[derive(Debug, Clone, Serialize)]
pub struct AgentDescriptor {
    pub id: &'static str,
    pub label: &'static str,
    pub capabilities: AgentCapabilities,
    /// Directory skills are materialized into, e.g. `.claude/skills`.
    pub skills_dir: Option<&'static str>,
    /// Instruction file(s) this agent reads, e.g. `CLAUDE.md`.
    pub instruction_files: &'static [&'static str],
    /// MCP config artifact path, e.g. `.mcp.json`.
    pub mcp_config_path: Option<&'static str>,
    /// Top-level JSON key the MCP entries live under, e.g. `mcpServers`.
    pub mcp_config_key: &'static str,
    /// Non-None means Sync must not write this agent's MCP config; the note
    /// explains where the user configures servers manually.
    pub mcp_note: Option<&'static str>,
    /// Marker paths (beyond the artifact paths above) whose presence means
    /// the agent is already in use in a project directory.
    pub detect_markers: &'static [&'static str],
}

static AGENTS: Lazy<Vec<AgentDescriptor>> = Lazy::new(|| {
    vec![
        AgentDescriptor {
            id: "claude",
            label: "Claude Code",
            capabilities: AgentCapabilities {
                skills: true,
                instructions: true,
                mcp_servers: true,
            },
            skills_dir: Some(".claude/skills"),
            instruction_files: &["CLAUDE.md"],
            mcp_config_path: Some(".mcp.json"),
            mcp_config_key: "mcpServers",
            mcp_note: None,
            detect_markers: &[".claude"],
        },
        AgentDescriptor {
            id: "codex",
            label: "Codex CLI",
            capabilities: AgentCapabilities {
                skills: true,
                instructions: true,
                mcp_servers: false,
            },
            skills_dir: Some(".codex/skills"),
            instruction_files: &["AGENTS.md"],
            mcp_config_path: None,
            mcp_config_key: "mcp_servers",
            mcp_note: Some("Codex reads MCP servers from ~/.codex/config.toml; configure them there"),
            detect_markers: &[".codex"],
        },
        AgentDescriptor {
            id: "cursor",
            label: "Cursor",
            capabilities: AgentCapabilities {
                skills: false,
                instructions: true,
                mcp_servers: true,
            },
            skills_dir: None,
            instruction_files: &[".cursor/rules/project.mdc"],
            mcp_config_path: Some(".cursor/mcp.json"),
            mcp_config_key: "mcpServers",
            mcp_note: None,
            detect_markers: &[".cursor", ".cursorrules"],
        },
        AgentDescriptor {
            id: "gemini",
            label: "Gemini CLI",
            capabilities: AgentCapabilities {
                skills: false,
                instructions: true,
                mcp_servers: true,
            },
            skills_dir: None,
            instruction_files: &["GEMINI.md"],
            mcp_config_path: Some(".gemini/settings.json"),
            mcp_config_key: "mcpServers",
            mcp_note: None,
            detect_markers: &[".gemini"],
        },
        AgentDescriptor {
            id: "windsurf",
            label: "Windsurf",
            capabilities: AgentCapabilities {
                skills: false,
                instructions: true,
                mcp_servers: false,
            },
            skills_dir: None,
            instruction_files: &[".windsurfrules"],
            mcp_config_path: None,
            mcp_config_key: "mcpServers",
            mcp_note: Some("Windsurf MCP servers are configured globally in ~/.codeium/windsurf/mcp_config.json"),
            detect_markers: &[".windsurf"],
        },
        AgentDescriptor {
            id: "cline",
            label: "Cline",
            capabilities: AgentCapabilities {
                skills: false,
                instructions: true,
                mcp_servers: false,
            },
            skills_dir: None,
            instruction_files: &[".clinerules"],
            mcp_config_path: None,
            mcp_config_key: "mcpServers",
            mcp_note: Some("Cline MCP servers live in the VS Code extension's global settings"),
            detect_markers: &[],
        },
        AgentDescriptor {
            id: "copilot",
            label: "GitHub Copilot",
            capabilities: AgentCapabilities {
                skills: false,
                instructions: true,
                mcp_servers: false,
            },
            skills_dir: None,
            instruction_files: &[".github/copilot-instructions.md"],
            mcp_config_path: None,
            mcp_config_key: "mcpServers",
            mcp_note: Some("Copilot MCP configuration is managed through the IDE, not project files"),
            detect_markers: &[],
        },
        AgentDescriptor {
            id: "opencode",
            label: "OpenCode",
            capabilities: AgentCapabilities {
                skills: true,
                instructions: true,
                mcp_servers: true,
            },
            skills_dir: Some(".opencode/skills"),
            instruction_files: &["AGENTS.md"],
            mcp_config_path: Some("opencode.json"),
            mcp_config_key: "mcp",
            mcp_note: None,
            detect_markers: &[".opencode"],
        },
    ]
});

/// Read-only lookup over the built-in catalogue.
#[derive(Debug, Clone, Copy)]
pub struct AgentRegistry;

impl AgentRegistry {
    pub fn builtin() -> Self {
        AgentRegistry
    }

    /// All supported agents, in catalogue order.
    pub fn list(&self) -> &'static [AgentDescriptor] {
        &AGENTS
    }

    pub fn by_id(&self, id: &str) -> Option<&'static AgentDescriptor> {
        AGENTS.iter().find(|a| a.id == id)
    }

    /// Resolve a project's configured agent ids, silently skipping unknown
    /// ids (a project document may reference an agent this build no longer
    /// ships).
    pub fn resolve<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a String>,
    ) -> Vec<&'static AgentDescriptor> {
        ids.into_iter().filter_map(|id| self.by_id(id)).collect()
    }
}
