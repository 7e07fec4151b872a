//! Interrupt handling and temporary-artifact cleanup.
//!
//! The artifact snapshot is taken once, right after record construction. File
//! names never change afterwards; the only mutable part is one flag per record
//! telling whether its working file is the user's own local file (metadata
//! refresh), which cleanup must put back instead of deleting.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, warn};
use rustc_hash::FxHashMap;

use crate::track::{TrackArtifacts, TrackRecord};

/// Exit status after a user interrupt (128 + SIGINT).
pub const INTERRUPT_EXIT_CODE: i32 = 130;

// ============================================================================
// Interrupt Flag
// ============================================================================

/// Shared stop flag, checked by the orchestrator between tracks and after
/// each fetch.
#[derive(Clone, Debug, Default)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Artifact Snapshot
// ============================================================================

#[derive(Clone, Debug)]
pub struct ArtifactSnapshot {
    tracks: Arc<[TrackArtifacts]>,
    /// Set once a record's local file has been moved to its working name
    retained: Arc<[AtomicBool]>,
}

impl ArtifactSnapshot {
    pub fn from_records(records: &[TrackRecord]) -> Self {
        Self {
            tracks: records.iter().map(TrackRecord::artifacts).collect(),
            retained: records.iter().map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Mark record `index` as holding an existing local file under its
    /// working name. Must be set before the rename.
    pub fn mark_retained(&self, index: usize) {
        if let Some(flag) = self.retained.get(index) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn is_retained(&self, index: usize) -> bool {
        self.retained
            .get(index)
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Delete every temporary artifact of every record. Final files are never
    /// touched, and retained local files are renamed back to their final name
    /// first. Returns the number of files removed.
    pub fn remove_all(&self) -> usize {
        let mut listings: FxHashMap<PathBuf, Vec<String>> = FxHashMap::default();
        let mut removed = 0;
        for (index, artifacts) in self.tracks.iter().enumerate() {
            if self.is_retained(index) {
                restore_working(artifacts);
            }
            let listing = listings
                .entry(artifacts.library.clone())
                .or_insert_with(|| list_hidden(&artifacts.library));
            removed += remove_listed(artifacts, listing);
        }
        removed
    }
}

/// Names in `dir` that start with the temp marker.
fn list_hidden(dir: &Path) -> Vec<String> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(crate::models::TEMP_MARKER))
            .collect(),
        Err(e) => {
            warn!("Cannot list {}: {}", dir.display(), e);
            Vec::new()
        }
    }
}

/// Move a retained local file from `{temp}{ext}` back to `{base}{ext}`.
fn restore_working(artifacts: &TrackArtifacts) {
    if artifacts.final_path.exists() {
        return;
    }
    match fs::rename(&artifacts.working, &artifacts.final_path) {
        Ok(()) => debug!("Restored {}", artifacts.final_path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => error!(
            "Cannot restore {} to {}: {}",
            artifacts.working.display(),
            artifacts.final_path.display(),
            e
        ),
    }
}

fn remove_if_present(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Cannot remove {}: {}", path.display(), e);
            false
        }
    }
}

fn remove_listed(artifacts: &TrackArtifacts, listing: &[String]) -> usize {
    let exact = artifacts
        .exact
        .iter()
        .filter(|path| remove_if_present(path))
        .count();
    let scanned = listing
        .iter()
        .filter(|name| name.starts_with(&artifacts.scan_prefix))
        .filter(|name| remove_if_present(&artifacts.library.join(name.as_str())))
        .count();
    exact + scanned
}

/// Delete one record's temporary artifacts.
pub fn remove_artifacts(artifacts: &TrackArtifacts) -> usize {
    remove_listed(artifacts, &list_hidden(&artifacts.library))
}

// ============================================================================
// Signal Handler
// ============================================================================

/// Install the Ctrl-C handler: stop the session, remove every temporary
/// artifact, exit with status 130.
pub fn install_interrupt_handler(
    snapshot: ArtifactSnapshot,
    interrupt: InterruptHandle,
) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        interrupt.trigger();
        warn!("Interrupt captured: cleaning up temporary files");
        let removed = snapshot.remove_all();
        debug!("Removed {} temporary files", removed);
        error!("Explicit closure request by the user. Exiting.");
        std::process::exit(INTERRUPT_EXIT_CODE);
    })
}
