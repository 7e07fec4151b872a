//! Alternate-source search and fetch.
//!
//! The orchestrator only sees the `CandidateSource` trait. `YtDlpSource`
//! drives the `yt-dlp` binary for both search (flat JSON listing) and fetch
//! (audio extraction straight into the working file).

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use log::debug;
use serde::Deserialize;

use crate::models::Candidate;
use crate::track::TrackRecord;

// ============================================================================
// Source Trait
// ============================================================================

pub trait CandidateSource: Send + Sync {
    /// Ranked candidates for a query. Ranking order is authoritative.
    fn search(&self, query: &str) -> Result<Vec<Candidate>>;

    /// Fetch a candidate's audio into `target`.
    fn fetch(&self, candidate: &Candidate, target: &Path) -> Result<()>;

    /// Side channel for interactive disambiguation; non-interactive sources
    /// accept whatever the matcher accepted.
    fn confirm(&self, _record: &TrackRecord, _candidate: &Candidate) -> bool {
        true
    }
}

// ============================================================================
// yt-dlp
// ============================================================================

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Availability values yt-dlp reports for results it cannot download.
const UNAVAILABLE: [&str; 4] = ["premium_only", "subscriber_only", "needs_auth", "private"];

#[derive(Debug, Deserialize)]
struct SearchEntry {
    title: Option<String>,
    url: Option<String>,
    id: Option<String>,
    availability: Option<String>,
    live_status: Option<String>,
}

impl SearchEntry {
    fn into_candidate(self) -> Option<Candidate> {
        let title = self.title?;
        let locator = match (self.url, self.id) {
            (Some(url), _) if url.starts_with("http") => url,
            (_, Some(id)) => format!("{}{}", WATCH_URL, id),
            _ => return None,
        };
        let unavailable = self
            .availability
            .as_deref()
            .is_some_and(|a| UNAVAILABLE.contains(&a));
        let not_yet = matches!(self.live_status.as_deref(), Some("is_upcoming" | "is_live"));
        Some(Candidate {
            title,
            locator,
            retrievable: !unavailable && !not_yet,
        })
    }
}

/// Parse `--dump-json` output: one JSON object per line.
pub fn parse_search_output(stdout: &str) -> Vec<Candidate> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<SearchEntry>(line) {
            Ok(entry) => entry.into_candidate(),
            Err(e) => {
                debug!("Ignoring unparsable search line: {}", e);
                None
            }
        })
        .collect()
}

/// Output template that makes yt-dlp land exactly on `target`.
/// ".x.mp3" → ".x.%(ext)s"
pub fn output_template(target: &Path) -> PathBuf {
    target.with_extension("%(ext)s")
}

#[derive(Debug, Clone)]
pub struct YtDlpSource {
    pub binary: PathBuf,
    pub results: usize,
    pub interactive: bool,
}

impl YtDlpSource {
    pub fn new(binary: PathBuf, results: usize, interactive: bool) -> Self {
        Self {
            binary,
            results: results.max(1),
            interactive,
        }
    }
}

impl CandidateSource for YtDlpSource {
    fn search(&self, query: &str) -> Result<Vec<Candidate>> {
        let search = format!("ytsearch{}:{}", self.results, query);
        debug!("Searching: {} {}", self.binary.display(), search);
        let output = Command::new(&self.binary)
            .args(["--flat-playlist", "--dump-json", "--no-warnings"])
            .arg(&search)
            .output()
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;
        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(parse_search_output(&String::from_utf8_lossy(&output.stdout)))
    }

    fn fetch(&self, candidate: &Candidate, target: &Path) -> Result<()> {
        let format = target
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp3");
        let template = output_template(target);
        debug!("Fetching {} into {}", candidate.locator, target.display());
        let output = Command::new(&self.binary)
            .args(["--no-playlist", "--no-warnings", "--extract-audio"])
            .args(["--audio-format", format, "--audio-quality", "0"])
            .arg("--output")
            .arg(&template)
            .arg(&candidate.locator)
            .output()
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;
        if !output.status.success() {
            bail!(
                "download of {} failed: {}",
                candidate.locator,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        if !target.exists() {
            bail!("download of {} produced no {}", candidate.locator, target.display());
        }
        Ok(())
    }

    fn confirm(&self, record: &TrackRecord, candidate: &Candidate) -> bool {
        if !self.interactive {
            return true;
        }
        let mut stderr = io::stderr().lock();
        let _ = write!(
            stderr,
            "\"{}\" for \"{}\" ({})? [Y/n] ",
            candidate.title, record.base_name, candidate.locator
        );
        let _ = stderr.flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        !matches!(answer.trim().to_lowercase().as_str(), "n" | "no")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_output() {
        let stdout = concat!(
            r#"{"title": "Daft Punk - One More Time (Official Video)", "url": "https://www.youtube.com/watch?v=FGBhQbmPwH8", "id": "FGBhQbmPwH8"}"#,
            "\n",
            r#"{"title": "One More Time (Members)", "id": "abc", "availability": "subscriber_only"}"#,
            "\n",
            "not json\n",
            r#"{"id": "untitled"}"#,
            "\n",
            r#"{"title": "Premiere", "id": "xyz", "live_status": "is_upcoming"}"#,
            "\n",
        );
        let candidates = parse_search_output(stdout);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].locator, "https://www.youtube.com/watch?v=FGBhQbmPwH8");
        assert!(candidates[0].retrievable);
        assert_eq!(candidates[1].locator, "https://www.youtube.com/watch?v=abc");
        assert!(!candidates[1].retrievable);
        assert!(!candidates[2].retrievable);
    }

    #[test]
    fn test_output_template() {
        assert_eq!(
            output_template(Path::new("/music/.daft-punk-one-more-time.mp3")),
            PathBuf::from("/music/.daft-punk-one-more-time.%(ext)s")
        );
    }

    #[test]
    fn test_non_interactive_confirms() {
        let source = YtDlpSource::new(PathBuf::from("yt-dlp"), 0, false);
        assert_eq!(source.results, 1);
        let remote = crate::models::RemoteTrack {
            title: "One More Time".to_string(),
            artists: vec!["Daft Punk".to_string()],
            ..Default::default()
        };
        let record = TrackRecord::build(&remote, Path::new("/nonexistent-library")).unwrap();
        assert!(source.confirm(&record, &Candidate::new("x", "y")));
    }
}
