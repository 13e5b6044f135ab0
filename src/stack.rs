//! Driving the compose stack
//!
//! Everything here shells out: volume creation through the container engine,
//! then build, up, a readiness wait and a final status listing through the
//! compose tool. Child processes run in the install directory with the loaded
//! configuration record in their environment.

use crate::envfile::ConfigRecord;
use crate::error::{InstallError, InstallResult};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Named volumes the compose file mounts as external.
pub const VOLUMES: &[&str] = &["dasy_pgdata", "dasy_rabbitmq_data"];

/// Blind delay used when readiness cannot be observed.
pub const FIXED_DELAY: Duration = Duration::from_secs(10);

/// A program plus the leading arguments that select its subcommand,
/// e.g. `docker compose` or plain `docker-compose`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub prefix: Vec<String>,
}

impl ToolCommand {
    /// Compose as an engine plugin (`docker compose ...`).
    pub fn plugin(engine: &str) -> Self {
        Self {
            program: engine.to_string(),
            prefix: vec!["compose".to_string()],
        }
    }

    /// A bare program, e.g. the engine itself or standalone `docker-compose`.
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            prefix: Vec::new(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix).args(args);
        cmd
    }

    pub fn display(&self, args: &[&str]) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.prefix.iter().map(String::as_str))
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How long and how to wait for services after `up`.
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
    pub fixed_delay: Duration,
    /// Skip polling and just sleep `fixed_delay`.
    pub fixed_only: bool,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(2),
            fixed_delay: FIXED_DELAY,
            fixed_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Readiness {
    Ready { services: usize, waited_secs: u64 },
    TimedOut { pending: Vec<String>, waited_secs: u64 },
    FixedDelay { secs: u64 },
}

/// One row of `compose ps --format json`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServiceState {
    #[serde(rename = "Service", default)]
    pub service: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Health", default)]
    pub health: String,
    #[serde(rename = "ExitCode", default)]
    pub exit_code: i32,
}

impl ServiceState {
    pub fn is_ready(&self) -> bool {
        match self.state.as_str() {
            "running" => !matches!(self.health.as_str(), "starting" | "unhealthy"),
            // One-shot jobs (migrations and the like) that finished cleanly
            "exited" => self.exit_code == 0,
            _ => false,
        }
    }
}

/// Parse `ps --format json` output. Newer compose prints one object per line,
/// older releases a single array. `None` means the output is not understood.
pub fn parse_ps_output(stdout: &str) -> Option<Vec<ServiceState>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Some(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).ok();
    }
    trimmed
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).ok())
        .collect()
}

pub struct StackDriver<'a> {
    engine: ToolCommand,
    compose: ToolCommand,
    project_dir: &'a Path,
    record: &'a ConfigRecord,
    stdout_to_stderr: bool,
}

impl<'a> StackDriver<'a> {
    /// `engine` runs `volume create`, `compose` runs everything else.
    pub fn new(engine: ToolCommand, compose: ToolCommand, project_dir: &'a Path, record: &'a ConfigRecord) -> Self {
        Self {
            engine,
            compose,
            project_dir,
            record,
            stdout_to_stderr: false,
        }
    }

    /// Send the stdout of build, up and ps to our stderr, keeping stdout free
    /// for a machine-readable report.
    pub fn redirect_stdout(mut self, enabled: bool) -> Self {
        self.stdout_to_stderr = enabled;
        self
    }

    /// Volumes, build, up, wait, status. Build and up failures abort.
    pub fn run(&self, wait: &WaitPolicy, out: &mut dyn Write) -> InstallResult<Readiness> {
        writeln!(out, "→ Creating volumes...")?;
        self.create_volumes();

        writeln!(out, "→ Building images (this can take a while)...")?;
        out.flush()?;
        self.run_step("compose build", &["build", "--parallel"])?;
        writeln!(out, "✓ Images built")?;

        writeln!(out, "→ Starting services...")?;
        out.flush()?;
        self.run_step("compose up", &["up", "-d"])?;
        writeln!(out, "✓ Services started")?;

        writeln!(out, "→ Waiting for services to come up...")?;
        out.flush()?;
        let readiness = self.wait_ready(wait);
        match &readiness {
            Readiness::Ready { services, waited_secs } => {
                writeln!(out, "✓ {} service(s) ready after {}s", services, waited_secs)?
            }
            Readiness::TimedOut { pending, waited_secs } if pending.is_empty() => {
                writeln!(out, "⚠ No services reported after {}s", waited_secs)?
            }
            Readiness::TimedOut { pending, waited_secs } => {
                writeln!(out, "⚠ Still waiting on {} after {}s", pending.join(", "), waited_secs)?
            }
            Readiness::FixedDelay { secs } => writeln!(out, "✓ Waited {}s", secs)?,
        }

        self.show_status(out)?;
        Ok(readiness)
    }

    /// `volume create` is idempotent; any failure is ignored.
    pub fn create_volumes(&self) {
        for &volume in VOLUMES {
            let args = ["volume", "create", volume];
            let result = self
                .prepare(&self.engine, &args)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            match result {
                Ok(status) if status.success() => debug!(volume, "volume ready"),
                Ok(status) => debug!(volume, code = ?status.code(), "volume create failed, ignoring"),
                Err(e) => debug!(volume, error = %e, "volume create could not start, ignoring"),
            }
        }
    }

    fn run_step(&self, step: &str, args: &[&str]) -> InstallResult<()> {
        info!(command = %self.compose.display(args), "running");
        let status = self.prepare(&self.compose, args).status()?;
        if !status.success() {
            return Err(InstallError::ToolFailed {
                step: step.to_string(),
                code: status.code(),
            });
        }
        Ok(())
    }

    /// Poll service state until everything is up or the timeout passes.
    pub fn wait_ready(&self, policy: &WaitPolicy) -> Readiness {
        if policy.fixed_only {
            return self.fixed_delay(policy);
        }

        let started = Instant::now();
        loop {
            let Some(states) = self.service_states() else {
                warn!("service status not readable, falling back to a fixed delay");
                return self.fixed_delay(policy);
            };

            let waited_secs = started.elapsed().as_secs();
            if !states.is_empty() && states.iter().all(ServiceState::is_ready) {
                return Readiness::Ready {
                    services: states.len(),
                    waited_secs,
                };
            }

            if started.elapsed() >= policy.timeout {
                let pending: Vec<String> = states
                    .iter()
                    .filter(|s| !s.is_ready())
                    .map(|s| s.service.clone())
                    .collect();
                warn!(?pending, timeout_secs = policy.timeout.as_secs(), "services not ready before timeout");
                return Readiness::TimedOut { pending, waited_secs };
            }

            thread::sleep(policy.interval);
        }
    }

    fn fixed_delay(&self, policy: &WaitPolicy) -> Readiness {
        thread::sleep(policy.fixed_delay);
        Readiness::FixedDelay {
            secs: policy.fixed_delay.as_secs(),
        }
    }

    fn service_states(&self) -> Option<Vec<ServiceState>> {
        let output = self
            .prepare(&self.compose, &["ps", "--format", "json"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_ps_output(&String::from_utf8_lossy(&output.stdout))
    }

    /// Print `compose ps` for the operator. Not inspected.
    pub fn show_status(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out)?;
        out.flush()?;
        match self.prepare(&self.compose, &["ps"]).status() {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(code = ?status.code(), "status listing failed"),
            Err(e) => warn!(error = %e, "status listing could not start"),
        }
        Ok(())
    }

    fn prepare(&self, tool: &ToolCommand, args: &[&str]) -> Command {
        let mut cmd = tool.command(args);
        cmd.current_dir(self.project_dir).envs(self.record.iter());
        if self.stdout_to_stderr {
            cmd.stdout(io::stderr());
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ndjson_ps_output() {
        let out = r#"{"Service":"db","State":"running","Health":"healthy"}
{"Service":"orchestrator","State":"running","Health":""}
"#;
        let states = parse_ps_output(out).unwrap();
        assert_eq!(states.len(), 2);
        assert!(states.iter().all(ServiceState::is_ready));
    }

    #[test]
    fn test_parse_array_ps_output() {
        let out = r#"[{"Service":"rabbitmq","State":"running","Health":"starting"}]"#;
        let states = parse_ps_output(out).unwrap();
        assert_eq!(states[0].service, "rabbitmq");
        assert!(!states[0].is_ready());
    }

    #[test]
    fn test_parse_unrecognized_output() {
        assert_eq!(parse_ps_output("NAME   IMAGE   STATUS"), None);
        assert_eq!(parse_ps_output("  \n"), Some(Vec::new()));
    }

    #[test]
    fn test_exited_job_readiness() {
        let ok = ServiceState {
            service: "migrate".to_string(),
            state: "exited".to_string(),
            health: String::new(),
            exit_code: 0,
        };
        let failed = ServiceState { exit_code: 1, ..ok.clone() };
        assert!(ok.is_ready());
        assert!(!failed.is_ready());
    }

    #[test]
    fn test_compose_display() {
        assert_eq!(ToolCommand::plugin("docker").display(&["up", "-d"]), "docker compose up -d");
        assert_eq!(ToolCommand::new("docker-compose").display(&["ps"]), "docker-compose ps");
    }

    #[cfg(unix)]
    mod driver {
        use super::super::*;
        use std::fs;
        use std::path::PathBuf;
        use tempfile::TempDir;

        /// A shell script standing in for docker; every call is appended to `calls.log`.
        fn fake_docker(dir: &Path, ps_json: &str, build_exit: i32) -> PathBuf {
            let log = dir.join("calls.log");
            let script = dir.join("fake-docker.sh");
            let body = format!(
                r#"echo "$@ OPENAI=$OPENAI_API_KEY" >> '{log}'
if [ "$1 $2" = "compose build" ]; then exit {build_exit}; fi
if [ "$1 $2 $3" = "compose ps --format" ]; then echo '{ps_json}'; fi
exit 0
"#,
                log = log.display(),
            );
            fs::write(&script, body).unwrap();
            script
        }

        fn tool(script: &Path, compose: bool) -> ToolCommand {
            let mut prefix = vec![script.display().to_string()];
            if compose {
                prefix.push("compose".to_string());
            }
            ToolCommand {
                program: "sh".to_string(),
                prefix,
            }
        }

        fn quick_wait() -> WaitPolicy {
            WaitPolicy {
                timeout: Duration::from_millis(300),
                interval: Duration::from_millis(50),
                fixed_delay: Duration::from_millis(10),
                fixed_only: false,
            }
        }

        #[test]
        fn test_full_sequence_with_record_env() {
            let temp = TempDir::new().unwrap();
            let script = fake_docker(temp.path(), r#"{"Service":"db","State":"running"}"#, 0);
            let record = ConfigRecord::parse("OPENAI_API_KEY=sk-from-record\n");
            let driver = StackDriver::new(tool(&script, false), tool(&script, true), temp.path(), &record);

            let mut progress: Vec<u8> = Vec::new();
            let readiness = driver.run(&quick_wait(), &mut progress).unwrap();
            assert!(matches!(readiness, Readiness::Ready { services: 1, .. }));
            assert!(String::from_utf8(progress).unwrap().contains("✓ 1 service(s) ready"));

            let calls = fs::read_to_string(temp.path().join("calls.log")).unwrap();
            let lines: Vec<&str> = calls.lines().collect();
            assert_eq!(lines[0], "volume create dasy_pgdata OPENAI=sk-from-record");
            assert_eq!(lines[1], "volume create dasy_rabbitmq_data OPENAI=sk-from-record");
            assert_eq!(lines[2], "compose build --parallel OPENAI=sk-from-record");
            assert_eq!(lines[3], "compose up -d OPENAI=sk-from-record");
            assert_eq!(lines[4], "compose ps --format json OPENAI=sk-from-record");
            assert_eq!(lines.last().copied(), Some("compose ps OPENAI=sk-from-record"));
        }

        #[test]
        fn test_build_failure_aborts_before_up() {
            let temp = TempDir::new().unwrap();
            let script = fake_docker(temp.path(), "", 7);
            let record = ConfigRecord::default();
            let driver = StackDriver::new(tool(&script, false), tool(&script, true), temp.path(), &record);

            let err = driver.run(&quick_wait(), &mut Vec::<u8>::new()).unwrap_err();
            assert_eq!(err.exit_code(), 7);

            let calls = fs::read_to_string(temp.path().join("calls.log")).unwrap();
            assert!(!calls.contains("compose up"));
        }

        #[test]
        fn test_wait_times_out_on_unhealthy_service() {
            let temp = TempDir::new().unwrap();
            let script = fake_docker(
                temp.path(),
                r#"{"Service":"rabbitmq","State":"running","Health":"unhealthy"}"#,
                0,
            );
            let record = ConfigRecord::default();
            let driver = StackDriver::new(tool(&script, false), tool(&script, true), temp.path(), &record);

            match driver.wait_ready(&quick_wait()) {
                Readiness::TimedOut { pending, .. } => assert_eq!(pending, vec!["rabbitmq".to_string()]),
                other => panic!("unexpected readiness: {other:?}"),
            }
        }

        #[test]
        fn test_timeout_with_no_services_says_so() {
            let temp = TempDir::new().unwrap();
            let script = fake_docker(temp.path(), "", 0);
            let record = ConfigRecord::default();
            let driver = StackDriver::new(tool(&script, false), tool(&script, true), temp.path(), &record);

            let mut progress: Vec<u8> = Vec::new();
            let readiness = driver.run(&quick_wait(), &mut progress).unwrap();
            assert!(matches!(readiness, Readiness::TimedOut { ref pending, .. } if pending.is_empty()));

            let progress = String::from_utf8(progress).unwrap();
            assert!(progress.contains("⚠ No services reported after"));
            assert!(!progress.contains("Still waiting on"));
        }

        #[test]
        fn test_redirected_stdout_still_reads_status() {
            let temp = TempDir::new().unwrap();
            let script = fake_docker(temp.path(), r#"{"Service":"db","State":"running"}"#, 0);
            let record = ConfigRecord::default();
            let driver = StackDriver::new(tool(&script, false), tool(&script, true), temp.path(), &record)
                .redirect_stdout(true);

            assert!(matches!(driver.wait_ready(&quick_wait()), Readiness::Ready { services: 1, .. }));
        }

        #[test]
        fn test_unreadable_status_falls_back_to_fixed_delay() {
            let temp = TempDir::new().unwrap();
            let script = fake_docker(temp.path(), "NAME STATUS", 0);
            let record = ConfigRecord::default();
            let driver = StackDriver::new(tool(&script, false), tool(&script, true), temp.path(), &record);

            assert_eq!(driver.wait_ready(&quick_wait()), Readiness::FixedDelay { secs: 0 });
        }

        #[test]
        fn test_fixed_only_skips_polling() {
            let temp = TempDir::new().unwrap();
            let script = fake_docker(temp.path(), "", 0);
            let record = ConfigRecord::default();
            let driver = StackDriver::new(tool(&script, false), tool(&script, true), temp.path(), &record);

            let policy = WaitPolicy { fixed_only: true, ..quick_wait() };
            assert_eq!(driver.wait_ready(&policy), Readiness::FixedDelay { secs: 0 });
            assert!(!temp.path().join("calls.log").exists());
        }
    }
}
