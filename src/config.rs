//! Installer settings
//!
//! Flags win over environment variables, which win over built-in defaults.
//!
//! # Environment Variables
//!
//! - `DASY_INSTALL_DIR`: install directory (default: `$HOME/dasy`, or `./dasy` without a home)
//! - `DASY_REPO_URL`: source to fetch (default: the upstream git repository)
//! - `RUST_LOG`: log filter for the installer's own diagnostics (default: `info`)

use crate::cli::Cli;
use crate::stack::WaitPolicy;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REPO_URL: &str = "https://github.com/dasy-ai/dasy.git";
pub const ENV_FILE: &str = ".env";

#[derive(Debug, Clone)]
pub struct Settings {
    pub install_dir: PathBuf,
    pub repo_url: String,
    pub skip_fetch: bool,
    pub wait: WaitPolicy,
    pub json: bool,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Self {
        Self::resolve(cli, |name| std::env::var(name).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Self {
        let install_dir = cli
            .dir
            .clone()
            .or_else(|| env("DASY_INSTALL_DIR").filter(|v| !v.is_empty()).map(PathBuf::from))
            .unwrap_or_else(|| match env("HOME").filter(|v| !v.is_empty()) {
                Some(home) => PathBuf::from(home).join("dasy"),
                None => PathBuf::from("dasy"),
            });

        let repo_url = cli
            .repo
            .clone()
            .or_else(|| env("DASY_REPO_URL").filter(|v| !v.is_empty()))
            .unwrap_or_else(|| DEFAULT_REPO_URL.to_string());

        let wait = WaitPolicy {
            timeout: Duration::from_secs(cli.wait_timeout),
            fixed_only: cli.fixed_wait,
            ..WaitPolicy::default()
        };

        Self {
            install_dir,
            repo_url,
            skip_fetch: cli.skip_fetch,
            wait,
            json: cli.json,
        }
    }

    pub fn env_file(&self) -> PathBuf {
        self.install_dir.join(ENV_FILE)
    }
}
