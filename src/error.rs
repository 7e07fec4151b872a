//! Error types.
//!
//! Track-scoped failures are values recorded in the session ledger; they
//! never abort a batch. Only catalog/pre-flight errors are fatal.

use std::fmt;

/// A remote record that cannot become a `TrackRecord`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("remote track has no title")]
    MissingTitle,
    #[error("remote track \"{0}\" has no credited artist")]
    MissingArtist(String),
}

/// Catalog loading failures (fatal before any track is processed).
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Malformed playlist URI: {0}")]
    PlaylistUri(String),
    #[error("Playlist not found in catalog: {0}")]
    UnknownPlaylist(String),
}

/// Why a single track did not make it to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The candidate source returned nothing acceptable
    NoCandidate,
    /// The candidate source itself errored while searching
    Search(String),
    /// Download/transfer error
    Fetch(String),
    /// The final rename-back failed
    Commit(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::NoCandidate => write!(f, "no acceptable candidate"),
            FailureKind::Search(e) => write!(f, "search failed: {}", e),
            FailureKind::Fetch(e) => write!(f, "fetch failed: {}", e),
            FailureKind::Commit(e) => write!(f, "commit failed: {}", e),
        }
    }
}

/// A per-track failure, keyed by track index so reports keep list order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("track {index} \"{name}\": {kind}")]
pub struct TrackFailure {
    pub index: usize,
    pub name: String,
    pub kind: FailureKind,
}
