//! Core data models for library synchronization.
//!
//! Remote input records, song variants and candidate results. The canonical
//! per-track record lives in `track`.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Container every synchronized track ends up in.
pub const DEFAULT_EXTENSION: &str = ".mp3";

/// Marker that turns a file name into a hidden working name.
pub const TEMP_MARKER: char = '.';

// ============================================================================
// Remote Models
// ============================================================================

/// One track as exported by the remote catalog.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RemoteTrack {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    /// All credited artists in credited order (primary first)
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub duration_ms: u64,
    /// Artwork URLs, primary first
    #[serde(default)]
    pub artwork: Vec<String>,
}

// ============================================================================
// Song Variants
// ============================================================================

/// Performance type of a song. Exactly one per record, decided at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variant {
    #[default]
    Studio,
    Live,
    Cover,
    Remix,
    Acoustic,
    Karaoke,
}

impl Variant {
    /// Non-default variants in classification priority order.
    pub const PRIORITY: [Variant; 5] = [
        Variant::Live,
        Variant::Cover,
        Variant::Remix,
        Variant::Acoustic,
        Variant::Karaoke,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Studio => "studio",
            Variant::Live => "live",
            Variant::Cover => "cover",
            Variant::Remix => "remix",
            Variant::Acoustic => "acoustic",
            Variant::Karaoke => "karaoke",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Candidate Models
// ============================================================================

/// One alternate-source search result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Display text the matcher judges
    pub title: String,
    /// Source locator (e.g., a video URL); also written as the origin comment
    pub locator: String,
    /// False for results the source knows it cannot fetch (members-only, upcoming)
    pub retrievable: bool,
}

impl Candidate {
    pub fn new(title: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            locator: locator.into(),
            retrievable: true,
        }
    }
}

// ============================================================================
// Options
// ============================================================================

/// Run-wide switches, mirrored from the command line.
#[derive(Clone, Debug)]
pub struct SyncOptions {
    /// Look for better results even for tracks already on disk
    pub replace_local: bool,
    /// Rewrite tags of tracks already on disk
    pub flush_metadata: bool,
    pub disable_normalization: bool,
    /// Search only; never touch the filesystem
    pub simulate: bool,
    /// Finish each track's post-processing before starting the next
    pub serial: bool,
    /// Post-processing worker threads (and queue depth)
    pub workers: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            replace_local: false,
            flush_metadata: false,
            disable_normalization: false,
            simulate: false,
            serial: false,
            workers: 2,
        }
    }
}

impl SyncOptions {
    /// True when already-local tracks still need attention.
    pub fn overrides_local(&self) -> bool {
        self.replace_local || self.flush_metadata
    }
}
