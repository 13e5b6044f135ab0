//! Error taxonomy for the installer
//!
//! Every fatal failure ends up here and maps to a process exit code in `main`.
//! Source acquisition failures are not part of this enum: they degrade instead
//! of aborting (see `source.rs`).

use crate::envfile::Violation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Required tool not found: {tool}")]
    MissingTool { tool: String },

    #[error("Configuration is incomplete ({} problem(s))", .0.len())]
    InvalidConfig(Vec<Violation>),

    #[error("{step} failed{}", .code.map(|c| format!(" with exit code {}", c)).unwrap_or_default())]
    ToolFailed { step: String, code: Option<i32> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type InstallResult<T> = Result<T, InstallError>;

impl InstallError {
    /// Exit code reported to the operator's shell.
    pub fn exit_code(&self) -> i32 {
        match self {
            InstallError::Io(_) => 1,
            InstallError::MissingTool { .. } => 2,
            InstallError::InvalidConfig(_) => 3,
            // Pass the tool's own status through; a signal-killed tool has none
            InstallError::ToolFailed { code, .. } => match code {
                Some(c) if *c != 0 => *c,
                _ => 4,
            },
        }
    }
}
