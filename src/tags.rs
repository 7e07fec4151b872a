//! Embedded metadata.
//!
//! Writes title/artist/album, front cover and the origin locator (stored in
//! the comment frame) into the working file, and reads the origin back from
//! tracks already on disk.

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use lofty::config::WriteOptions;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::Tag;

/// Everything post-processing writes into one file.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagUpdate<'a> {
    pub title: &'a str,
    pub artist: &'a str,
    pub album: &'a str,
    /// Raw image bytes for the front cover
    pub artwork: Option<&'a [u8]>,
    /// Source locator the audio was fetched from
    pub origin: Option<&'a str>,
}

pub trait MetadataWriter: Send + Sync {
    fn write(&self, path: &Path, update: &TagUpdate<'_>) -> Result<()>;

    /// Origin locator recorded by a previous run, if any.
    fn read_origin(&self, path: &Path) -> Result<Option<String>>;
}

/// `MetadataWriter` over lofty, using each format's primary tag type.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagWriter;

fn front_cover(bytes: &[u8]) -> Picture {
    let mime = Picture::from_reader(&mut Cursor::new(bytes))
        .ok()
        .and_then(|detected| detected.mime_type().cloned())
        .unwrap_or(MimeType::Jpeg);
    Picture::new_unchecked(PictureType::CoverFront, Some(mime), None, bytes.to_vec())
}

impl MetadataWriter for LoftyTagWriter {
    fn write(&self, path: &Path, update: &TagUpdate<'_>) -> Result<()> {
        let mut tagged_file = Probe::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .read()
            .with_context(|| format!("Failed to read tags of {}", path.display()))?;

        let tag_type = tagged_file.primary_tag_type();
        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .tag_mut(tag_type)
            .with_context(|| format!("No writable {:?} tag for {}", tag_type, path.display()))?;

        tag.set_title(update.title.to_string());
        tag.set_artist(update.artist.to_string());
        if !update.album.is_empty() {
            tag.set_album(update.album.to_string());
        }
        if let Some(bytes) = update.artwork {
            tag.remove_picture_type(PictureType::CoverFront);
            tag.push_picture(front_cover(bytes));
        }
        if let Some(origin) = update.origin {
            tag.set_comment(origin.to_string());
        }

        tag.save_to_path(path, WriteOptions::default())
            .with_context(|| format!("Failed to write tags to {}", path.display()))?;
        Ok(())
    }

    fn read_origin(&self, path: &Path) -> Result<Option<String>> {
        let tagged_file = Probe::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .read()
            .with_context(|| format!("Failed to read tags of {}", path.display()))?;
        let origin = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
            .and_then(|tag| tag.comment().map(|c| c.trim().to_string()))
            .filter(|c| c.starts_with("http"));
        Ok(origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_write_rejects_non_audio() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".not-audio.mp3");
        fs::write(&path, b"definitely not an mpeg stream").unwrap();
        let update = TagUpdate {
            title: "One More Time",
            artist: "Daft Punk",
            ..Default::default()
        };
        assert!(LoftyTagWriter.write(&path, &update).is_err());
    }

    #[test]
    fn test_read_origin_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(LoftyTagWriter
            .read_origin(&dir.path().join("missing.mp3"))
            .is_err());
    }
}
