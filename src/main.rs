//! dasy-install - bootstrap the Dasy multi-container stack

mod cli;
mod config;
mod envfile;
mod error;
mod pipeline;
mod prereq;
mod source;
mod stack;
mod staging;

use clap::Parser;
use cli::Cli;
use error::InstallError;
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // Diagnostics go to stderr so stdout stays readable; `RUST_LOG` overrides the level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let settings = config::Settings::from_cli(&cli);
    let guard = staging::SignalGuard::install();

    let stdin = io::stdin();
    let mut input = stdin.lock();
    // With --json, stdout carries the report and nothing else
    let mut output: Box<dyn Write> = if settings.json {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    };

    match pipeline::run(&settings, &guard, &mut input, &mut output) {
        Ok(report) => {
            if settings.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => eprintln!("Failed to render report: {}", e),
                }
            }
        }
        Err(e) => {
            report_error(&e);
            std::process::exit(e.exit_code());
        }
    }
}

fn report_error(err: &InstallError) {
    match err {
        InstallError::MissingTool { tool } => {
            eprintln!("✗ {} is required but was not found on PATH.", tool);
            eprintln!("  Install it and run the installer again.");
        }
        InstallError::InvalidConfig(violations) => {
            eprintln!("✗ The configuration file needs attention:");
            for v in violations {
                eprintln!("  - {}", v);
            }
            eprintln!("  Edit the .env file in the install directory and run the installer again.");
        }
        // The tool already printed its own output
        InstallError::ToolFailed { .. } => eprintln!("✗ {}", err),
        InstallError::Io(_) => eprintln!("✗ {}", err),
    }
}
