//! Crash guard for the single in-flight temp artifact.
//!
//! `CrashGuard::arm` registers a temp path and hands back a `TempArtifact`.
//! The artifact is released exactly once: explicitly (`disarm` after it was
//! moved or deleted, `discard` to delete it) or implicitly when dropped, which
//! covers error returns, panics and a run future dropped on interrupt.
//! `CrashGuard::sweep` is the last-chance cleanup the CLI calls before exit.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use log::{debug, info, warn};
use walkdir::WalkDir;
use crate::job::is_temp_artifact;
use crate::tools::FileOps;

#[derive(Debug, Clone)]
pub struct CrashGuard {
    slot: Arc<Mutex<Option<PathBuf>>>,
    dry_run: bool,
}

impl CrashGuard {
    pub fn new(dry_run: bool) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            dry_run,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<PathBuf>> {
        // A panic while holding the lock cannot leave the Option half-written
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `path` as the live temp artifact
    pub fn arm(&self, path: PathBuf) -> TempArtifact {
        let stale = self.lock().replace(path.clone());
        if let Some(stale) = stale {
            warn!("Temp artifact still registered when arming a new one: {}", stale.display());
            remove_artifact(&stale, self.dry_run);
        }
        debug!("Crash guard armed: {}", path.display());
        TempArtifact {
            guard: self.clone(),
            path,
            armed: true,
        }
    }

    /// Currently tracked temp artifact
    pub fn current(&self) -> Option<PathBuf> {
        self.lock().clone()
    }

    /// Remove whatever is still tracked and empty the slot.
    ///
    /// Returns the path that was handled. Calling it again is a no-op.
    pub fn sweep(&self) -> Option<PathBuf> {
        let path = self.lock().take()?;
        remove_artifact(&path, self.dry_run);
        Some(path)
    }

    fn release(&self, path: &Path) {
        let mut slot = self.lock();
        if slot.as_deref() == Some(path) {
            *slot = None;
        }
    }
}

/// Scoped registration of one temp artifact
#[derive(Debug)]
pub struct TempArtifact {
    guard: CrashGuard,
    path: PathBuf,
    armed: bool,
}

impl TempArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The artifact was resolved elsewhere (moved to its final path or
    /// deliberately deleted); stop tracking it without touching the disk.
    pub fn disarm(mut self) {
        self.armed = false;
        self.guard.release(&self.path);
        debug!("Crash guard cleared: {}", self.path.display());
    }

    /// Delete the artifact (if present) and stop tracking it
    pub fn discard(mut self) {
        self.armed = false;
        remove_artifact(&self.path, self.guard.dry_run);
        self.guard.release(&self.path);
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.armed {
            warn!("Temp artifact released without resolution, cleaning up: {}", self.path.display());
            remove_artifact(&self.path, self.guard.dry_run);
            self.guard.release(&self.path);
        }
    }
}

fn remove_artifact(path: &Path, dry_run: bool) {
    if dry_run {
        info!("[dry-run] Would remove temp artifact: {}", path.display());
        return;
    }
    if !path.exists() {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => info!("Removed temp artifact: {}", path.display()),
        Err(e) => warn!("Failed to remove temp artifact {}: {}", path.display(), e),
    }
}

/// Remove temp artifacts left behind by earlier runs that were killed hard.
///
/// Artifacts modified within `min_age` may belong to another live run and are
/// left alone. A file that cannot be removed is logged and the walk goes on.
/// Returns how many were removed (or would be, when `dry_run`).
pub fn cleanup_orphaned_artifacts<F: FileOps>(
    root: &Path,
    dry_run: bool,
    min_age: Duration,
    fs: &F,
) -> usize {
    info!("Checking for orphaned temp artifacts under {}", root.display());
    let mut cleaned = 0;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading directory entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || !is_temp_artifact(path) {
            continue;
        }

        // Unreadable mtime or one in the future counts as fresh
        let age = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
            .unwrap_or(Duration::ZERO);
        if age < min_age {
            info!(
                "Leaving recent temp artifact alone (modified {}s ago): {}",
                age.as_secs(),
                path.display()
            );
            continue;
        }

        if dry_run {
            info!("[dry-run] Would delete orphaned temp artifact: {}", path.display());
            cleaned += 1;
            continue;
        }
        match fs.remove_file(path) {
            Ok(()) => {
                info!("Deleted orphaned temp artifact: {}", path.display());
                cleaned += 1;
            }
            Err(e) => warn!("Failed to delete orphaned temp artifact {}: {}", path.display(), e),
        }
    }

    cleaned
}
