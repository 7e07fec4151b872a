//! Remote catalog access.
//!
//! The catalog provider only has to hand over an ordered list of remote
//! tracks. Session handling against the real service happens elsewhere; the
//! shipped provider reads an exported catalog file:
//!
//! ```json
//! {
//!   "library": [ { "title": "...", "artists": ["..."], "album": "...",
//!                  "duration_ms": 320000, "artwork": ["https://..."] } ],
//!   "playlists": { "37i9dQZF1DXcBWIGoYBM5M": [ ... ] }
//! }
//! ```

use std::fs;
use std::path::Path;

use log::info;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::error::CatalogError;
use crate::models::RemoteTrack;

// ============================================================================
// Provider Trait
// ============================================================================

pub trait CatalogProvider {
    /// The user's saved tracks, in library order.
    fn library(&self) -> Result<Vec<RemoteTrack>, CatalogError>;

    /// Tracks of one playlist, in playlist order.
    fn playlist(&self, uri: &str) -> Result<Vec<RemoteTrack>, CatalogError>;
}

// ============================================================================
// Playlist URIs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRef {
    pub owner: Option<String>,
    pub id: String,
}

fn is_playlist_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Accepts `spotify:user:{owner}:playlist:{id}`, `spotify:playlist:{id}`,
/// `https://open.spotify.com/playlist/{id}?si=...` and bare ids.
pub fn parse_playlist_uri(uri: &str) -> Result<PlaylistRef, CatalogError> {
    let uri = uri.trim();
    let malformed = || CatalogError::PlaylistUri(uri.to_string());

    let parsed = if let Some(rest) = uri.strip_prefix("spotify:") {
        let parts: Vec<&str> = rest.split(':').collect();
        match parts.as_slice() {
            ["user", owner, "playlist", id] => PlaylistRef {
                owner: Some(owner.to_string()),
                id: id.to_string(),
            },
            ["playlist", id] => PlaylistRef {
                owner: None,
                id: id.to_string(),
            },
            _ => return Err(malformed()),
        }
    } else if let Some(idx) = uri.find("/playlist/") {
        let tail = &uri[idx + "/playlist/".len()..];
        let id = tail.split(['?', '/', '#']).next().unwrap_or("");
        PlaylistRef {
            owner: None,
            id: id.to_string(),
        }
    } else {
        PlaylistRef {
            owner: None,
            id: uri.to_string(),
        }
    };

    if is_playlist_id(&parsed.id) && parsed.owner.as_deref().map_or(true, |o| !o.is_empty()) {
        Ok(parsed)
    } else {
        Err(malformed())
    }
}

// ============================================================================
// JSON Export Provider
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct CatalogExport {
    #[serde(default)]
    library: Vec<RemoteTrack>,
    /// Keyed by playlist id
    #[serde(default)]
    playlists: FxHashMap<String, Vec<RemoteTrack>>,
}

/// Catalog backed by an exported JSON file.
#[derive(Debug)]
pub struct JsonCatalog {
    export: CatalogExport,
}

impl JsonCatalog {
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        info!("Reading catalog export: {}", path.display());
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        Ok(Self {
            export: serde_json::from_str(raw)?,
        })
    }
}

impl CatalogProvider for JsonCatalog {
    fn library(&self) -> Result<Vec<RemoteTrack>, CatalogError> {
        Ok(self.export.library.clone())
    }

    fn playlist(&self, uri: &str) -> Result<Vec<RemoteTrack>, CatalogError> {
        let playlist = parse_playlist_uri(uri)?;
        self.export
            .playlists
            .get(&playlist.id)
            .cloned()
            .ok_or(CatalogError::UnknownPlaylist(playlist.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"{
        "library": [
            {"title": "One More Time", "artists": ["Daft Punk"], "album": "Discovery", "duration_ms": 320357},
            {"title": "Get Lucky", "artists": ["Daft Punk", "Pharrell Williams"]}
        ],
        "playlists": {
            "4uLU6hMCjMI75M1A2tKUQC": [
                {"title": "Harder, Better, Faster, Stronger", "artists": ["Daft Punk"]}
            ]
        }
    }"#;

    #[test]
    fn test_parse_playlist_uri_forms() {
        assert_eq!(
            parse_playlist_uri("spotify:user:alice:playlist:4uLU6hMCjMI75M1A2tKUQC").unwrap(),
            PlaylistRef {
                owner: Some("alice".to_string()),
                id: "4uLU6hMCjMI75M1A2tKUQC".to_string()
            }
        );
        assert_eq!(
            parse_playlist_uri("spotify:playlist:4uLU6hMCjMI75M1A2tKUQC").unwrap().id,
            "4uLU6hMCjMI75M1A2tKUQC"
        );
        assert_eq!(
            parse_playlist_uri("https://open.spotify.com/playlist/4uLU6hMCjMI75M1A2tKUQC?si=abc")
                .unwrap()
                .id,
            "4uLU6hMCjMI75M1A2tKUQC"
        );
        assert_eq!(parse_playlist_uri("4uLU6hMCjMI75M1A2tKUQC").unwrap().owner, None);
    }

    #[test]
    fn test_parse_playlist_uri_malformed() {
        assert!(parse_playlist_uri("spotify:track:abc").is_err());
        assert!(parse_playlist_uri("spotify:user::playlist:abc").is_err());
        assert!(parse_playlist_uri("").is_err());
        assert!(parse_playlist_uri("not a playlist").is_err());
    }

    #[test]
    fn test_json_catalog_library_and_playlist() {
        let catalog = JsonCatalog::from_json(EXPORT).unwrap();
        let library = catalog.library().unwrap();
        assert_eq!(library.len(), 2);
        assert_eq!(library[0].title, "One More Time");
        assert_eq!(library[1].artists, vec!["Daft Punk", "Pharrell Williams"]);

        let playlist = catalog
            .playlist("spotify:user:alice:playlist:4uLU6hMCjMI75M1A2tKUQC")
            .unwrap();
        assert_eq!(playlist.len(), 1);

        let missing = catalog.playlist("spotify:playlist:0000000000000000000000");
        assert!(matches!(missing, Err(CatalogError::UnknownPlaylist(_))));
    }

    #[test]
    fn test_json_catalog_malformed() {
        assert!(matches!(
            JsonCatalog::from_json("{\"library\": 3}"),
            Err(CatalogError::Parse(_))
        ));
    }
}
