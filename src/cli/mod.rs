//! CLI module for dasy-install
//!
//! Defines command-line interface using clap. Every flag is optional; a bare
//! `dasy-install` performs the whole installation.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dasy-install")]
#[command(about = "Bootstrap the Dasy stack: check tools, fetch sources, configure, build and start")]
#[command(version)]
pub struct Cli {
    /// Install directory (default: $DASY_INSTALL_DIR, then ~/dasy)
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Source repository or .tar.gz URL (default: $DASY_REPO_URL, then the upstream repo)
    #[arg(long, value_name = "URL")]
    pub repo: Option<String>,

    /// Use the files already in the install directory without fetching
    #[arg(long)]
    pub skip_fetch: bool,

    /// Seconds to wait for services to report running after start
    #[arg(long, value_name = "SECS", default_value = "60")]
    pub wait_timeout: u64,

    /// Sleep a fixed delay after start instead of polling service status
    #[arg(long)]
    pub fixed_wait: bool,

    /// Print a JSON summary of the run on stdout when finished
    #[arg(long)]
    pub json: bool,
}
