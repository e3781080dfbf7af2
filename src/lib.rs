//! agentsync — one canonical description of a project's AI-agent tooling,
//! reconciled onto every configured agent's on-disk layout.
//!
//! The flow is always the same: edit canonical state (project documents,
//! skills, rules, MCP definitions), then a sync pass materializes it as
//! per-agent artifacts. Drift detection reads those artifacts back and
//! reports where disk and canonical state disagree.

pub mod config;
pub mod core;
pub mod detect;
pub mod drift;
pub mod error;
pub mod local_skills;
pub mod project;
pub mod providers;
pub mod registry;
pub mod store;
pub mod sync;
pub mod template;

pub use crate::core::Core;
pub use error::CoreError;
pub use project::{InstructionMode, Project, ProjectTemplate, Settings, SkillSyncMode};
pub use registry::AgentRegistry;
