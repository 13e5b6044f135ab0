//! The install pipeline
//!
//! Check -> Acquire -> Configure -> Load -> Validate -> Drive. Each stage
//! either hands its result to the next or ends the run with an `InstallError`.

use crate::config::Settings;
use crate::envfile::{self, keys, ConfigRecord, Materialized, Strategy};
use crate::error::InstallResult;
use crate::prereq::{self, Toolchain};
use crate::source::{self, Acquisition};
use crate::stack::{Readiness, StackDriver, ToolCommand};
use crate::staging::{SignalGuard, StagingDir};
use serde::Serialize;
use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};

/// Summary of a completed run.
#[derive(Debug, Serialize)]
pub struct InstallReport {
    pub install_dir: PathBuf,
    pub toolchain: Toolchain,
    pub source: Acquisition,
    pub degraded: bool,
    pub config: Materialized,
    pub config_keys: usize,
    pub readiness: Readiness,
}

/// Progress lines and prompts go to `output`. With `--json` that is stderr and
/// compose output is sent there too, leaving stdout for the report.
pub fn run(
    settings: &Settings,
    guard: &SignalGuard,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> InstallResult<InstallReport> {
    // 1. Prerequisites, before anything touches disk or network
    writeln!(output, "→ Checking prerequisites...")?;
    let toolchain = prereq::check_prerequisites()?;
    writeln!(output, "✓ {}", toolchain.engine_version)?;
    writeln!(output, "✓ {}", toolchain.compose_version)?;
    writeln!(output, "✓ {}", toolchain.git_version)?;

    // 2. Sources
    fs::create_dir_all(&settings.install_dir)?;
    let source = if settings.skip_fetch {
        writeln!(output, "→ Skipping source fetch")?;
        Acquisition::Skipped
    } else {
        writeln!(output, "→ Fetching {}...", settings.repo_url)?;
        let staging = StagingDir::create(guard)?;
        source::acquire(&settings.repo_url, staging.path(), &settings.install_dir)
    };
    match &source {
        Acquisition::Fetched { files } => writeln!(output, "✓ Fetched {} file(s)", files)?,
        Acquisition::Degraded { .. } => writeln!(
            output,
            "⚠ Could not fetch sources, using the files already in {}",
            settings.install_dir.display()
        )?,
        Acquisition::Skipped => {}
    }

    // 3. Configuration file
    let env_file = settings.env_file();
    let config = envfile::materialize(&env_file, Strategy::for_build(), input, output)?;
    if config == Materialized::Existing {
        writeln!(output, "✓ Using existing {}", env_file.display())?;
    }

    // 4. Load
    let record = ConfigRecord::load(&env_file)?;
    if record.is_empty() {
        warn!(path = %env_file.display(), "configuration file has no values");
    }
    info!(keys = record.len(), skipped = record.skipped_lines().len(), "configuration loaded");

    // 5. Validate
    envfile::validate(&record, keys::required_keys())?;
    writeln!(output, "✓ Configuration valid")?;

    // 6. Drive the stack
    let driver = StackDriver::new(
        ToolCommand::new(prereq::ENGINE),
        toolchain.compose.clone(),
        &settings.install_dir,
        &record,
    )
    .redirect_stdout(settings.json);
    let readiness = driver.run(&settings.wait, output)?;

    writeln!(output)?;
    writeln!(output, "✓ Dasy is running")?;
    writeln!(
        output,
        "  Orchestrator:     http://localhost:{}",
        record.get("ORCHESTRATOR_PORT").unwrap_or("8000")
    )?;
    writeln!(
        output,
        "  RabbitMQ console: http://localhost:{}",
        record.get("RABBITMQ_MANAGEMENT_PORT").unwrap_or("15672")
    )?;

    Ok(InstallReport {
        install_dir: settings.install_dir.clone(),
        toolchain,
        degraded: source.is_degraded(),
        source,
        config,
        config_keys: record.len(),
        readiness,
    })
}
