//! Fetching the stack's source files into the install directory
//!
//! One attempt only. A git URL is shallow-cloned, an HTTP(S) `.tar.gz`/`.tgz`
//! URL is downloaded and unpacked; either way the result is staged first and
//! then copied over the install directory. A failed fetch is not fatal: the
//! run continues on whatever is already in the install directory, and that
//! assumption is logged as a degraded-mode warning.

use flate2::read::GzDecoder;
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// File names compose picks up by default.
pub const COMPOSE_FILES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// Files in the install directory that a fetch must never replace.
const PROTECTED: &[&str] = &[".env"];

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("git clone failed: {0}")]
    Git(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive is empty")]
    EmptyArchive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Acquisition {
    Fetched { files: usize },
    /// Fetch failed; the install directory is assumed to be usable as-is.
    Degraded { reason: String },
    Skipped,
}

impl Acquisition {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Acquisition::Degraded { .. })
    }
}

/// Fetch `url` through `staging` into `dest`, degrading instead of failing.
pub fn acquire(url: &str, staging: &Path, dest: &Path) -> Acquisition {
    match fetch(url, staging).and_then(|root| copy_tree(&root, dest)) {
        Ok(files) => {
            info!(url, files, "source files updated");
            Acquisition::Fetched { files }
        }
        Err(e) => {
            warn!(
                degraded = true,
                url,
                dest = %dest.display(),
                error = %e,
                "source fetch failed, continuing with the files already in the install directory"
            );
            if !has_compose_file(dest) {
                warn!(
                    degraded = true,
                    dest = %dest.display(),
                    "no compose file in the install directory, later steps will likely fail"
                );
            }
            Acquisition::Degraded { reason: e.to_string() }
        }
    }
}

pub fn has_compose_file(dir: &Path) -> bool {
    COMPOSE_FILES.iter().any(|name| dir.join(name).is_file())
}

pub fn is_archive_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    (url.starts_with("http://") || url.starts_with("https://"))
        && (path.ends_with(".tar.gz") || path.ends_with(".tgz"))
}

/// Stage the source and return the directory holding its top level.
fn fetch(url: &str, staging: &Path) -> Result<PathBuf, SourceError> {
    if is_archive_url(url) {
        fetch_archive(url, staging)
    } else {
        shallow_clone(url, staging)
    }
}

fn shallow_clone(url: &str, staging: &Path) -> Result<PathBuf, SourceError> {
    let target = staging.join("source");

    // Run: git clone --depth 1 {url} {staging}/source
    let output = Command::new("git")
        .arg("clone")
        .arg("--depth")
        .arg("1")
        .arg("--quiet")
        .arg(url)
        .arg(&target)
        .stdin(Stdio::null())
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SourceError::Git(stderr.trim().to_string()));
    }

    Ok(target)
}

fn fetch_archive(url: &str, staging: &Path) -> Result<PathBuf, SourceError> {
    let response = ureq::get(url)
        .set("User-Agent", concat!("dasy-install/", env!("CARGO_PKG_VERSION")))
        .call()?;
    unpack_archive(response.into_reader(), staging)
}

/// Unpack a gzipped tarball under `staging`. A single top-level directory, as
/// produced by release tarballs, is treated as the root.
pub fn unpack_archive<R: Read>(reader: R, staging: &Path) -> Result<PathBuf, SourceError> {
    let target = staging.join("archive");
    fs::create_dir_all(&target)?;
    tar::Archive::new(GzDecoder::new(reader)).unpack(&target)?;

    let entries: Vec<PathBuf> = fs::read_dir(&target)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();

    match entries.as_slice() {
        [] => Err(SourceError::EmptyArchive),
        [only] if only.is_dir() => Ok(only.clone()),
        _ => Ok(target),
    }
}

/// Copy a staged tree over `dest`, skipping `.git` and protected files.
/// Returns the number of files copied.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<usize, SourceError> {
    fs::create_dir_all(dest)?;
    let mut copied = 0;

    let walker = WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if PROTECTED.iter().any(|p| rel == Path::new(p)) {
            debug!(file = %rel.display(), "keeping existing file");
            continue;
        }

        // Symlinks are followed for files; links to directories are skipped
        if entry.file_type().is_symlink() && !entry.path().is_file() {
            debug!(file = %rel.display(), "skipping directory symlink");
            continue;
        }

        fs::copy(entry.path(), &target)?;
        copied += 1;
    }

    Ok(copied)
}
