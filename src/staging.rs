//! Temporary staging directory with guaranteed cleanup
//!
//! `StagingDir` removes itself on drop, which covers normal completion and
//! every early return. For SIGINT/SIGTERM a background guard thread deletes
//! whatever directory is currently registered before exiting.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Exit code used when the run is interrupted by a signal.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

type Registered = Arc<Mutex<Option<PathBuf>>>;

/// Removes the registered staging directory if the process is signalled.
#[derive(Clone, Default)]
pub struct SignalGuard {
    registered: Registered,
}

impl SignalGuard {
    /// Start listening for SIGINT/SIGTERM on a background thread.
    pub fn install() -> Self {
        let guard = SignalGuard::default();
        let registered = Arc::clone(&guard.registered);

        let spawned = thread::Builder::new()
            .name("signal-guard".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        warn!(error = %e, "signal guard unavailable");
                        return;
                    }
                };
                if let Err(e) = runtime.block_on(wait_for_signal()) {
                    warn!(error = %e, "could not listen for signals");
                    return;
                }
                remove_registered(&registered);
                eprintln!("\n✗ Interrupted");
                std::process::exit(INTERRUPTED_EXIT_CODE);
            });

        if let Err(e) = spawned {
            warn!(error = %e, "could not start signal guard thread");
        }
        guard
    }

    fn register(&self, path: &Path) {
        if let Ok(mut slot) = self.registered.lock() {
            *slot = Some(path.to_path_buf());
        }
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.registered.lock() {
            *slot = None;
        }
    }

    /// Path the guard would delete on a signal right now.
    #[cfg(test)]
    pub fn registered(&self) -> Option<PathBuf> {
        self.registered.lock().ok().and_then(|slot| slot.clone())
    }
}

fn remove_registered(registered: &Registered) {
    let path = registered.lock().ok().and_then(|mut slot| slot.take());
    if let Some(path) = path {
        match std::fs::remove_dir_all(&path) {
            Ok(()) => debug!(path = %path.display(), "removed staging directory"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staging directory"),
        }
    }
}

async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// A temporary directory that is removed on drop and on signals.
pub struct StagingDir {
    dir: TempDir,
    guard: SignalGuard,
}

impl StagingDir {
    pub fn create(guard: &SignalGuard) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("dasy-install-").tempdir()?;
        guard.register(dir.path());
        debug!(path = %dir.path().display(), "created staging directory");
        Ok(Self {
            dir,
            guard: guard.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        self.guard.clear();
        debug!(path = %self.dir.path().display(), "releasing staging directory");
    }
}
