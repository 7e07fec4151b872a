//! Loudness normalization via ffmpeg.
//!
//! `measure` runs the `volumedetect` filter and reports how far the peak sits
//! below 0 dBFS; `apply` renders a gain-adjusted copy next to the input.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

static MAX_VOLUME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"max_volume:\s*(-?\d+(?:\.\d+)?)\s*dB").unwrap());

pub trait LoudnessNormalizer: Send + Sync {
    /// Headroom in dB between the loudest sample and full scale (>= 0).
    fn measure(&self, path: &Path) -> Result<f64>;

    /// Render `path` amplified by `delta_db`; returns the new file's path.
    fn apply(&self, path: &Path, delta_db: f64) -> Result<PathBuf>;
}

/// Extract the headroom from ffmpeg's volumedetect report.
/// "max_volume: -3.2 dB" → 3.2
pub fn parse_max_volume(stderr: &str) -> Option<f64> {
    MAX_VOLUME
        .captures_iter(stderr)
        .last()
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map(f64::abs)
}

/// `.x.mp3` → `.x.norm.mp3`
pub fn normalized_sibling(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.norm.{}", stem, ext.to_string_lossy()),
        None => format!("{}.norm", stem),
    };
    path.with_file_name(name)
}

#[derive(Debug, Clone)]
pub struct FfmpegNormalizer {
    pub binary: PathBuf,
}

impl FfmpegNormalizer {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }
}

impl LoudnessNormalizer for FfmpegNormalizer {
    fn measure(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-nostats", "-i"])
            .arg(path)
            .args(["-af", "volumedetect", "-f", "null", "-"])
            .output()
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            bail!("volumedetect failed for {}: {}", path.display(), stderr.trim());
        }
        parse_max_volume(&stderr)
            .ok_or_else(|| anyhow!("no max_volume reported for {}", path.display()))
    }

    fn apply(&self, path: &Path, delta_db: f64) -> Result<PathBuf> {
        let target = normalized_sibling(path);
        let filter = format!("volume=+{:.1}dB", delta_db.abs());
        debug!("Applying {} to {}", filter, path.display());
        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-nostats", "-y", "-i"])
            .arg(path)
            .args(["-af", &filter, "-b:a", "320k"])
            .arg(&target)
            .output()
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;
        if !output.status.success() {
            bail!(
                "normalization failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_volume() {
        let stderr = "\
[Parsed_volumedetect_0 @ 0x5581] n_samples: 14135296
[Parsed_volumedetect_0 @ 0x5581] mean_volume: -14.6 dB
[Parsed_volumedetect_0 @ 0x5581] max_volume: -3.2 dB
[Parsed_volumedetect_0 @ 0x5581] histogram_3db: 12";
        assert_eq!(parse_max_volume(stderr), Some(3.2));
        assert_eq!(parse_max_volume("max_volume: 0.0 dB"), Some(0.0));
        assert_eq!(parse_max_volume("max_volume: -7 dB"), Some(7.0));
        assert_eq!(parse_max_volume("no report here"), None);
    }

    #[test]
    fn test_normalized_sibling() {
        assert_eq!(
            normalized_sibling(Path::new("/music/.daft-punk-one-more-time.mp3")),
            PathBuf::from("/music/.daft-punk-one-more-time.norm.mp3")
        );
    }
}
