//! Prerequisite checks
//!
//! The installer needs a container engine, a compose tool and git. Each is
//! probed by running its version command; the first one missing aborts the run
//! before anything touches the filesystem or the network.

use crate::error::{InstallError, InstallResult};
use crate::stack::ToolCommand;
use serde::Serialize;
use std::process::{Command, Stdio};
use tracing::debug;

pub const ENGINE: &str = "docker";
pub const STANDALONE_COMPOSE: &str = "docker-compose";
pub const GIT: &str = "git";

/// External tools found on this machine.
#[derive(Debug, Clone, Serialize)]
pub struct Toolchain {
    pub engine_version: String,
    pub compose: ToolCommand,
    pub compose_version: String,
    pub git_version: String,
}

/// Probe every required tool, in order, stopping at the first one missing.
pub fn check_prerequisites() -> InstallResult<Toolchain> {
    let engine_version = probe(ENGINE, &["--version"]).ok_or_else(|| missing(ENGINE))?;

    // Prefer the compose plugin, fall back to the standalone binary
    let (compose, compose_version) = if let Some(v) = probe(ENGINE, &["compose", "version"]) {
        (ToolCommand::plugin(ENGINE), v)
    } else if let Some(v) = probe(STANDALONE_COMPOSE, &["--version"]) {
        (ToolCommand::new(STANDALONE_COMPOSE), v)
    } else {
        return Err(missing("docker compose"));
    };

    let git_version = probe(GIT, &["--version"]).ok_or_else(|| missing(GIT))?;

    Ok(Toolchain {
        engine_version,
        compose,
        compose_version,
        git_version,
    })
}

fn missing(tool: &str) -> InstallError {
    InstallError::MissingTool { tool: tool.to_string() }
}

/// Run `program args`, returning the first line of stdout when it exits 0.
pub fn probe(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output();

    match output {
        Ok(o) if o.status.success() => {
            let stdout = String::from_utf8_lossy(&o.stdout);
            let version = stdout.lines().next().unwrap_or("").trim().to_string();
            debug!(program, version = %version, "found tool");
            Some(version)
        }
        Ok(o) => {
            debug!(program, status = ?o.status.code(), "tool probe exited with failure");
            None
        }
        Err(e) => {
            debug!(program, error = %e, "tool probe could not start");
            None
        }
    }
}
