//! Post-processing of a fetched (or flushed) working file.
//!
//! A job owns everything it needs, so it can run on a worker thread while the
//! orchestrator moves on to the next track. Every step is best-effort: a
//! failure here is logged and never prevents the commit.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::artwork::ArtworkFetcher;
use crate::loudness::{normalized_sibling, LoudnessNormalizer};
use crate::tags::{MetadataWriter, TagUpdate};
use crate::track::TrackRecord;

// ============================================================================
// Jobs
// ============================================================================

#[derive(Clone, Debug)]
pub struct PostProcessJob {
    pub index: usize,
    pub name: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork_ref: Option<String>,
    pub origin: Option<String>,
    pub temp_path: PathBuf,
    pub final_path: PathBuf,
    pub artwork_path: PathBuf,
    /// Only freshly fetched audio is normalized
    pub normalize: bool,
}

impl PostProcessJob {
    pub fn from_record(index: usize, record: &TrackRecord, normalize: bool) -> Self {
        Self {
            index,
            name: record.base_name.clone(),
            title: record.title.clone(),
            artist: record.artist.clone(),
            album: record.album.clone(),
            artwork_ref: record.artwork_ref.clone(),
            origin: record.source_locator.clone(),
            temp_path: record.temp_path(),
            final_path: record.final_path(),
            artwork_path: record.artwork_path(),
            normalize,
        }
    }
}

/// Scratch file removed on every exit path.
struct ScratchFile<'a>(&'a Path);

impl Drop for ScratchFile<'_> {
    fn drop(&mut self) {
        match fs::remove_file(self.0) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Cannot remove {}: {}", self.0.display(), e),
        }
    }
}

// ============================================================================
// Post-Processor
// ============================================================================

pub struct PostProcessor<'a> {
    pub metadata: &'a dyn MetadataWriter,
    pub normalizer: &'a dyn LoudnessNormalizer,
    pub artwork: &'a dyn ArtworkFetcher,
}

impl<'a> PostProcessor<'a> {
    pub fn new(
        metadata: &'a dyn MetadataWriter,
        normalizer: &'a dyn LoudnessNormalizer,
        artwork: &'a dyn ArtworkFetcher,
    ) -> Self {
        Self {
            metadata,
            normalizer,
            artwork,
        }
    }

    /// Normalize (if requested), then tag the working file. Tags go last so
    /// the re-encoded file carries them.
    pub fn run(&self, job: &PostProcessJob) {
        if job.normalize {
            self.normalize(job);
        }
        self.write_metadata(job);
    }

    fn load_artwork(&self, job: &PostProcessJob) -> Option<Vec<u8>> {
        let url = job.artwork_ref.as_deref()?;
        if let Err(e) = self.artwork.fetch(url, &job.artwork_path) {
            warn!("Artwork download failed for \"{}\": {:#}", job.name, e);
            return None;
        }
        match fs::read(&job.artwork_path) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                warn!("Cannot read artwork for \"{}\": {}", job.name, e);
                None
            }
        }
    }

    fn write_metadata(&self, job: &PostProcessJob) {
        let _scratch = ScratchFile(&job.artwork_path);
        let artwork = self.load_artwork(job);
        info!("Fixing metadata for: \"{}\"", job.name);
        let update = TagUpdate {
            title: &job.title,
            artist: &job.artist,
            album: &job.album,
            artwork: artwork.as_deref(),
            origin: job.origin.as_deref(),
        };
        if let Err(e) = self.metadata.write(&job.temp_path, &update) {
            warn!("Metadata write failed for \"{}\": {:#}", job.name, e);
        }
    }

    fn normalize(&self, job: &PostProcessJob) {
        let delta = match self.normalizer.measure(&job.temp_path) {
            Ok(delta) => delta.abs(),
            Err(e) => {
                warn!("Loudness measurement failed for \"{}\": {:#}", job.name, e);
                0.0
            }
        };
        info!("Normalizing volume by {:.1}dB for: \"{}\"", delta, job.name);
        match self.normalizer.apply(&job.temp_path, delta) {
            Ok(output) => {
                if let Err(e) = fs::rename(&output, &job.temp_path) {
                    warn!("Cannot replace \"{}\" with normalized copy: {}", job.name, e);
                    let _ = fs::remove_file(&output);
                }
            }
            Err(e) => {
                warn!("Normalization failed for \"{}\": {:#}", job.name, e);
                let _ = fs::remove_file(normalized_sibling(&job.temp_path));
            }
        }
    }

    /// Rename the working file to its final name.
    pub fn commit(&self, job: &PostProcessJob) -> io::Result<()> {
        fs::rename(&job.temp_path, &job.final_path)?;
        debug!("Committed {}", job.final_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteTrack;
    use anyhow::{bail, Result};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingTags {
        writes: Mutex<Vec<(PathBuf, bool, Option<String>, Vec<u8>)>>,
    }

    impl MetadataWriter for RecordingTags {
        fn write(&self, path: &Path, update: &TagUpdate<'_>) -> Result<()> {
            let content = fs::read(path)?;
            self.writes.lock().unwrap().push((
                path.to_path_buf(),
                update.artwork.is_some(),
                update.origin.map(str::to_string),
                content,
            ));
            Ok(())
        }

        fn read_origin(&self, _path: &Path) -> Result<Option<String>> {
            Ok(None)
        }
    }

    struct FixedGain {
        measure_fails: bool,
        apply_fails: bool,
    }

    impl LoudnessNormalizer for FixedGain {
        fn measure(&self, _path: &Path) -> Result<f64> {
            if self.measure_fails {
                bail!("no volumedetect");
            }
            Ok(-3.0)
        }

        fn apply(&self, path: &Path, delta_db: f64) -> Result<PathBuf> {
            let out = normalized_sibling(path);
            fs::write(&out, format!("gain {:.1}", delta_db))?;
            if self.apply_fails {
                bail!("encoder crashed");
            }
            Ok(out)
        }
    }

    struct LocalArtwork;

    impl ArtworkFetcher for LocalArtwork {
        fn fetch(&self, url: &str, target: &Path) -> Result<()> {
            if url.contains("broken") {
                bail!("404");
            }
            fs::write(target, b"\xFF\xD8\xFF")?;
            Ok(())
        }
    }

    fn job(dir: &Path, artwork: &str, normalize: bool) -> PostProcessJob {
        let remote = RemoteTrack {
            title: "One More Time".to_string(),
            artists: vec!["Daft Punk".to_string()],
            artwork: vec![artwork.to_string()],
            ..Default::default()
        };
        let mut record = TrackRecord::build(&remote, dir).unwrap();
        record.source_locator = Some("https://example.org/watch?v=1".to_string());
        fs::write(record.temp_path(), b"audio").unwrap();
        PostProcessJob::from_record(0, &record, normalize)
    }

    #[test]
    fn test_normalize_then_tag_then_commit() {
        let dir = TempDir::new().unwrap();
        let job = job(dir.path(), "https://img.example.org/cover.jpg", true);
        let tags = RecordingTags::default();
        let gain = FixedGain {
            measure_fails: false,
            apply_fails: false,
        };
        let post = PostProcessor::new(&tags, &gain, &LocalArtwork);

        post.run(&job);
        let writes = tags.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        let (path, had_artwork, origin, content) = &writes[0];
        assert_eq!(path, &job.temp_path);
        assert!(*had_artwork);
        assert_eq!(origin.as_deref(), Some("https://example.org/watch?v=1"));
        assert_eq!(content, b"gain 3.0");
        drop(writes);

        assert!(!job.artwork_path.exists());
        assert!(!normalized_sibling(&job.temp_path).exists());
        post.commit(&job).unwrap();
        assert!(job.final_path.exists());
        assert!(!job.temp_path.exists());
    }

    #[test]
    fn test_failures_are_best_effort() {
        let dir = TempDir::new().unwrap();
        let job = job(dir.path(), "https://img.example.org/broken.jpg", true);
        let tags = RecordingTags::default();
        let gain = FixedGain {
            measure_fails: true,
            apply_fails: true,
        };
        let post = PostProcessor::new(&tags, &gain, &LocalArtwork);

        post.run(&job);
        let writes = tags.writes.lock().unwrap();
        let (_, had_artwork, _, content) = &writes[0];
        assert!(!*had_artwork);
        assert_eq!(content, b"audio");
        assert!(!normalized_sibling(&job.temp_path).exists());
        assert!(job.temp_path.exists());
    }

    #[test]
    fn test_failed_measurement_still_applies_zero_gain() {
        let dir = TempDir::new().unwrap();
        let job = job(dir.path(), "https://img.example.org/cover.jpg", true);
        let tags = RecordingTags::default();
        let gain = FixedGain {
            measure_fails: true,
            apply_fails: false,
        };
        PostProcessor::new(&tags, &gain, &LocalArtwork).run(&job);

        assert_eq!(tags.writes.lock().unwrap()[0].3, b"gain 0.0");
        assert!(!normalized_sibling(&job.temp_path).exists());
    }

    #[test]
    fn test_skip_normalization() {
        let dir = TempDir::new().unwrap();
        let job = job(dir.path(), "https://img.example.org/cover.jpg", false);
        let tags = RecordingTags::default();
        let gain = FixedGain {
            measure_fails: false,
            apply_fails: false,
        };
        PostProcessor::new(&tags, &gain, &LocalArtwork).run(&job);
        assert_eq!(tags.writes.lock().unwrap()[0].3, b"audio");
    }
}
