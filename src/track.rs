//! TrackRecord: the canonical, locally-sanitized form of one remote song.
//!
//! Construction normalizes remote metadata into matching attributes
//! (title, song, featurings, variant) and a filesystem identity
//! (base name, hidden temporary name, fixed extension).

use std::path::{Path, PathBuf};

use log::debug;
use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::error::RecordError;
use crate::matcher::classify;
use crate::models::{RemoteTrack, Variant, DEFAULT_EXTENSION, TEMP_MARKER};
use crate::normalize::{
    clean_album, clean_title, format_featurings, sanitize_file_stem, sanitize_name,
    strip_featuring,
};

// ============================================================================
// TrackRecord
// ============================================================================

#[derive(Clone, Debug)]
pub struct TrackRecord {
    // Identity
    pub title: String,
    /// Title without the featuring suffix; never empty
    pub song: String,
    pub artist: String,
    pub featurings: Vec<String>,
    pub album: String,
    pub duration_secs: u64,
    pub artwork_ref: Option<String>,

    // Classification (decided once)
    pub variant: Variant,

    // Filesystem identity
    pub library: PathBuf,
    pub base_name: String,
    pub temp_base_name: String,
    pub extension: &'static str,

    // State, mutated only by the orchestrator
    pub is_local: bool,
    pub source_locator: Option<String>,
}

impl TrackRecord {
    /// Build a record from a remote track. `library` is the sync folder the
    /// local-existence check runs against.
    pub fn build(remote: &RemoteTrack, library: &Path) -> Result<Self, RecordError> {
        let raw_title = remote.title.trim();
        if raw_title.is_empty() {
            return Err(RecordError::MissingTitle);
        }
        let mut credited = remote
            .artists
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        let artist = credited
            .next()
            .ok_or_else(|| RecordError::MissingArtist(raw_title.to_string()))?;
        let featurings: Vec<String> = credited.collect();

        // Variant is judged on the raw title, before cleanup drops " - Live" etc.
        let variant = classify(raw_title);

        let mut title = clean_title(raw_title);
        if title.is_empty() {
            title = raw_title.to_string();
        }
        let title = format_featurings(&title, &featurings);
        let song = if featurings.is_empty() {
            title.clone()
        } else {
            strip_featuring(&title)
        };

        let base_name = sanitize_file_stem(&format!("{} - {}", artist, title));
        let temp_base_name = format!("{}{}", TEMP_MARKER, sanitize_name(&base_name));

        let mut record = Self {
            title,
            song,
            artist,
            featurings,
            album: clean_album(&remote.album),
            duration_secs: remote.duration_ms / 1000,
            artwork_ref: remote.artwork.first().cloned(),
            variant,
            library: library.to_path_buf(),
            base_name,
            temp_base_name,
            extension: DEFAULT_EXTENSION,
            is_local: false,
            source_locator: None,
        };
        record.is_local = record.final_path().exists();
        Ok(record)
    }

    /// Query handed to the candidate source.
    pub fn search_pattern(&self) -> String {
        sanitize_name(&self.base_name).replace('-', " ")
    }

    pub fn final_file_name(&self) -> String {
        format!("{}{}", self.base_name, self.extension)
    }

    /// `{base}{ext}`
    pub fn final_path(&self) -> PathBuf {
        self.library.join(self.final_file_name())
    }

    /// `{temp}{ext}`: working name during fetch and post-processing
    pub fn temp_path(&self) -> PathBuf {
        self.library
            .join(format!("{}{}", self.temp_base_name, self.extension))
    }

    /// `{temp}.jpg`
    pub fn artwork_path(&self) -> PathBuf {
        self.library.join(format!("{}.jpg", self.temp_base_name))
    }

    /// `{temp}.norm{ext}`: normalizer output before it replaces the temp file
    pub fn normalized_path(&self) -> PathBuf {
        self.library
            .join(format!("{}.norm{}", self.temp_base_name, self.extension))
    }

    /// Every temporary artifact this record may leave behind.
    pub fn artifacts(&self) -> TrackArtifacts {
        let base = self.library.join(&self.temp_base_name);
        TrackArtifacts {
            exact: vec![
                base.clone(),
                self.temp_path(),
                self.library.join(format!("{}.part", self.temp_base_name)),
                self.library.join(format!("{}.ytdl", self.temp_base_name)),
                self.artwork_path(),
                self.normalized_path(),
            ],
            library: self.library.clone(),
            scan_prefix: format!("{}.", self.temp_base_name),
            working: self.temp_path(),
            final_path: self.final_path(),
        }
    }
}

// ============================================================================
// Temporary Artifacts
// ============================================================================

/// Temporary file names of one record, fixed at construction time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackArtifacts {
    pub exact: Vec<PathBuf>,
    pub library: PathBuf,
    /// Downloader intermediates carry varying suffixes (`{temp}.webm.part`,
    /// `{temp}.part-Frag3`, ...); anything named `{temp}.*` belongs to the record.
    pub scan_prefix: String,
    /// `{temp}{ext}`
    pub working: PathBuf,
    /// `{base}{ext}`: where a retained local file goes back to
    pub final_path: PathBuf,
}

// ============================================================================
// Batch Construction
// ============================================================================

/// Records built from a remote listing, in remote order.
#[derive(Debug, Default)]
pub struct BuiltRecords {
    pub records: Vec<TrackRecord>,
    /// (remote index, error) for records that could not be built
    pub rejected: Vec<(usize, RecordError)>,
    /// Remote entries collapsed into an earlier record with the same file name
    pub duplicates: usize,
}

/// Give `record` a temporary name no earlier record uses: `{temp}-2`,
/// `{temp}-3`, ... Distinct final names can sanitize to the same temp name.
fn claim_temp_name(record: &mut TrackRecord, taken: &mut FxHashSet<String>) {
    let natural = record.temp_base_name.clone();
    let mut n = 1;
    while !taken.insert(record.temp_base_name.clone()) {
        n += 1;
        record.temp_base_name = format!("{}-{}", natural, n);
    }
    if n > 1 {
        debug!(
            "Working name {} already taken, using {} for \"{}\"",
            natural, record.temp_base_name, record.base_name
        );
    }
}

/// Build records in parallel, preserving remote order. Entries mapping to an
/// already-seen file name (case-insensitive) are dropped; the survivors get
/// pairwise distinct temporary names.
pub fn build_records(remote: &[RemoteTrack], library: &Path) -> BuiltRecords {
    let results: Vec<Result<TrackRecord, RecordError>> = remote
        .par_iter()
        .map(|track| TrackRecord::build(track, library))
        .collect();

    let mut built = BuiltRecords::default();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut temp_names: FxHashSet<String> = FxHashSet::default();
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(mut record) => {
                if seen.insert(record.base_name.to_lowercase()) {
                    claim_temp_name(&mut record, &mut temp_names);
                    built.records.push(record);
                } else {
                    debug!("Skipping duplicate remote entry \"{}\"", record.base_name);
                    built.duplicates += 1;
                }
            }
            Err(e) => built.rejected.push((index, e)),
        }
    }
    built
}

/// Records with no local file yet.
pub fn count_missing(records: &[TrackRecord]) -> usize {
    records.iter().filter(|r| !r.is_local).count()
}

pub fn count_local(records: &[TrackRecord]) -> usize {
    records.len() - count_missing(records)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn remote(title: &str, artists: &[&str]) -> RemoteTrack {
        RemoteTrack {
            id: None,
            title: title.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            album: "Discovery [Deluxe]".to_string(),
            duration_ms: 320_999,
            artwork: vec![
                "https://img.example.org/large.jpg".to_string(),
                "https://img.example.org/small.jpg".to_string(),
            ],
        }
    }

    fn build(title: &str, artists: &[&str]) -> TrackRecord {
        TrackRecord::build(&remote(title, artists), Path::new("/nonexistent-library")).unwrap()
    }

    #[test]
    fn test_single_artist_song_equals_title() {
        let record = build("One More Time", &["Daft Punk"]);
        assert_eq!(record.title, "One More Time");
        assert_eq!(record.song, record.title);
        assert!(record.featurings.is_empty());
        assert!(!record.title.contains("(ft."));
    }

    #[test]
    fn test_featuring_suffix_synthesized() {
        let record = build("Get Lucky", &["Daft Punk", "Pharrell Williams", "Nile Rodgers", "Chic"]);
        assert_eq!(record.artist, "Daft Punk");
        assert_eq!(record.featurings, vec!["Pharrell Williams", "Nile Rodgers", "Chic"]);
        assert_eq!(record.title, "Get Lucky (ft. Pharrell Williams, Nile Rodgers and Chic)");
        assert_eq!(record.song, "Get Lucky");
    }

    #[test]
    fn test_existing_feat_marker_normalized() {
        let record = build("Stay (feat. Justin Bieber)", &["The Kid LAROI", "Justin Bieber"]);
        assert_eq!(record.title, "Stay (ft. Justin Bieber)");
        assert_eq!(record.song, "Stay");
    }

    #[test]
    fn test_title_cleanup_and_variant() {
        let record = build("One More Time - Radio Edit", &["Daft Punk"]);
        assert_eq!(record.title, "One More Time");
        assert_eq!(record.variant, Variant::Remix);

        let live = build("Song live at the Apollo", &["Artist"]);
        assert_eq!(live.title, "Song");
        assert_eq!(live.variant, Variant::Live);
    }

    #[test]
    fn test_identity_fields() {
        let record = build("Hoppípolla: Part 1?", &["Sigur Rós"]);
        assert_eq!(record.base_name, "Sigur Ros - Hoppipolla Part 1");
        assert_eq!(record.temp_base_name, ".sigur-ros-hoppipolla-part-1");
        assert_eq!(record.search_pattern(), "sigur ros hoppipolla part 1");
        assert_eq!(record.album, "Discovery (Deluxe)");
        assert_eq!(record.duration_secs, 320);
        assert_eq!(record.artwork_ref.as_deref(), Some("https://img.example.org/large.jpg"));
        assert_eq!(record.extension, ".mp3");
        assert!(record.source_locator.is_none());
    }

    #[test]
    fn test_paths() {
        let record = build("One More Time", &["Daft Punk"]);
        let lib = Path::new("/nonexistent-library");
        assert_eq!(record.final_path(), lib.join("Daft Punk - One More Time.mp3"));
        assert_eq!(record.temp_path(), lib.join(".daft-punk-one-more-time.mp3"));
        assert_eq!(record.artwork_path(), lib.join(".daft-punk-one-more-time.jpg"));
        assert_eq!(record.normalized_path(), lib.join(".daft-punk-one-more-time.norm.mp3"));
        let artifacts = record.artifacts();
        assert!(artifacts.exact.contains(&record.temp_path()));
        assert!(artifacts.exact.contains(&lib.join(".daft-punk-one-more-time.ytdl")));
        assert_eq!(artifacts.scan_prefix, ".daft-punk-one-more-time.");
    }

    #[test]
    fn test_missing_fields_rejected() {
        let lib = Path::new("/nonexistent-library");
        assert_eq!(
            TrackRecord::build(&remote("  ", &["Daft Punk"]), lib).unwrap_err(),
            RecordError::MissingTitle
        );
        assert_eq!(
            TrackRecord::build(&remote("Song", &[""]), lib).unwrap_err(),
            RecordError::MissingArtist("Song".to_string())
        );
    }

    #[test]
    fn test_is_local_detects_existing_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Daft Punk - One More Time.mp3"), b"id3").unwrap();
        let local = TrackRecord::build(&remote("One More Time", &["Daft Punk"]), dir.path()).unwrap();
        let missing = TrackRecord::build(&remote("Aerodynamic", &["Daft Punk"]), dir.path()).unwrap();
        assert!(local.is_local);
        assert!(!missing.is_local);
    }

    #[test]
    fn test_build_records_keeps_order_and_dedupes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Daft Punk - Aerodynamic.mp3"), b"id3").unwrap();
        let listing = vec![
            remote("One More Time", &["Daft Punk"]),
            remote("", &["Daft Punk"]),
            remote("Aerodynamic", &["Daft Punk"]),
            remote("one more time", &["daft punk"]),
            remote("Digital Love", &["Daft Punk"]),
        ];
        let built = build_records(&listing, dir.path());
        let names: Vec<&str> = built.records.iter().map(|r| r.base_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Daft Punk - One More Time", "Daft Punk - Aerodynamic", "Daft Punk - Digital Love"]
        );
        assert_eq!(built.rejected, vec![(1, RecordError::MissingTitle)]);
        assert_eq!(built.duplicates, 1);
        assert_eq!(count_missing(&built.records), 2);
        assert_eq!(count_local(&built.records), 1);
    }

    #[test]
    fn test_build_records_separates_colliding_temp_names() {
        let listing = vec![
            remote("One More Time", &["Daft Punk"]),
            remote("One-More Time", &["Daft Punk"]),
            remote("One More Time!", &["Daft Punk"]),
        ];
        let built = build_records(&listing, Path::new("/nonexistent-library"));
        assert_eq!(built.duplicates, 0);
        let temps: Vec<&str> = built.records.iter().map(|r| r.temp_base_name.as_str()).collect();
        assert_eq!(
            temps,
            vec![
                ".daft-punk-one-more-time",
                ".daft-punk-one-more-time-2",
                ".daft-punk-one-more-time-3"
            ]
        );
        // Renamed records keep their search query
        assert_eq!(built.records[1].search_pattern(), "daft punk one more time");
        let prefixes: FxHashSet<String> =
            built.records.iter().map(|r| r.artifacts().scan_prefix).collect();
        assert_eq!(prefixes.len(), 3);
    }
}
