//! Variant classification and candidate acceptance.
//!
//! This module contains:
//! - The variant alias table (data-driven, fixed priority order)
//! - `classify` for remote titles
//! - `accepts` for candidate display text against a `TrackRecord`
//!
//! All functions are pure and deterministic.

use crate::models::{Candidate, Variant};
use crate::normalize::sanitize_name;
use crate::track::TrackRecord;

// ============================================================================
// Variant Alias Table
// ============================================================================

/// One alias predicate of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alias {
    /// Single symbol, tested against the raw lowercase text ("@")
    Symbol(char),
    /// Word or phrase, tested against the sanitized text
    Word(&'static str),
    /// Any four-digit year within the inclusive range
    Year(u16, u16),
}

/// Variant → alias predicates, evaluated in this order. First match wins.
pub static VARIANT_ALIASES: [(Variant, &[Alias]); 5] = [
    (
        Variant::Live,
        &[
            Alias::Symbol('@'),
            Alias::Word("live"),
            Alias::Word("perform"),
            Alias::Word("tour"),
            Alias::Year(1950, 2050),
        ],
    ),
    (Variant::Cover, &[Alias::Word("cover"), Alias::Word("vs")]),
    (Variant::Remix, &[Alias::Word("remix"), Alias::Word("radio edit")]),
    (Variant::Acoustic, &[Alias::Word("acoustic")]),
    (Variant::Karaoke, &[Alias::Word("karaoke")]),
];

/// Text prepared once for alias testing.
struct Probe {
    lower: String,
    sanitized: String,
}

impl Probe {
    fn new(text: &str) -> Self {
        Self {
            lower: text.to_lowercase(),
            sanitized: sanitize_name(text),
        }
    }

    fn matches(&self, alias: Alias) -> bool {
        match alias {
            Alias::Symbol(c) => self.lower.contains(c),
            Alias::Word(word) => self.sanitized.contains(&sanitize_name(word)),
            Alias::Year(from, to) => contains_year(&self.sanitized, from, to),
        }
    }

    fn seems(&self, variant: Variant) -> bool {
        aliases_of(variant).iter().any(|alias| self.matches(*alias))
    }
}

fn aliases_of(variant: Variant) -> &'static [Alias] {
    VARIANT_ALIASES
        .iter()
        .find(|(v, _)| *v == variant)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}

/// True if any run of four ASCII digits in `text` is a year in `from..=to`.
fn contains_year(text: &str, from: u16, to: u16) -> bool {
    text.as_bytes().windows(4).any(|w| {
        w.iter().all(u8::is_ascii_digit)
            && std::str::from_utf8(w)
                .ok()
                .and_then(|s| s.parse::<u16>().ok())
                .is_some_and(|year| (from..=to).contains(&year))
    })
}

/// Does `text` carry any alias of `variant`? Studio has no aliases.
pub fn seems_variant(text: &str, variant: Variant) -> bool {
    Probe::new(text).seems(variant)
}

/// Classify a raw remote title. Total: unmatched titles are Studio.
pub fn classify(title: &str) -> Variant {
    let probe = Probe::new(title);
    Variant::PRIORITY
        .into_iter()
        .find(|variant| probe.seems(*variant))
        .unwrap_or_default()
}

// ============================================================================
// Candidate Acceptance
// ============================================================================

/// Reduce a track attribute to the token that must appear in candidate text.
/// Handles soundtrack credits ("Cast of X", "X Cast") and flattened artist
/// lists ("A & B", "A and B" keep only "A").
pub fn comparable_token(item: &str) -> String {
    let mut token = item.trim().to_lowercase();
    if token.len() > 7 && token.starts_with("cast of") {
        token = token["cast of".len()..].to_string();
    } else if token.len() > 5 && token.ends_with(" cast") {
        token.truncate(token.len() - "cast".len());
    }
    token = token.replace(" & ", " and ");
    if let Some(idx) = token.find(" and ") {
        token.truncate(idx);
    }
    sanitize_name(token.trim())
}

/// Every required token (song, artist, featurings) appears in the text.
pub fn matches_words(record: &TrackRecord, text: &str) -> bool {
    let sequence = sanitize_name(text);
    std::iter::once(&record.song)
        .chain(std::iter::once(&record.artist))
        .chain(record.featurings.iter())
        .all(|item| sequence.contains(&comparable_token(item)))
}

/// Decide whether `text` plausibly is `record`.
pub fn accepts(record: &TrackRecord, text: &str) -> bool {
    if text.to_lowercase().contains("full album") {
        return false;
    }
    if !matches_words(record, text) {
        return false;
    }
    let probe = Probe::new(text);
    !Variant::PRIORITY
        .into_iter()
        .any(|variant| variant != record.variant && probe.seems(variant))
}

/// Acceptable candidates in source order. Filters only, never re-ranks.
pub fn acceptable<'a>(
    record: &'a TrackRecord,
    candidates: &'a [Candidate],
) -> impl Iterator<Item = &'a Candidate> + 'a {
    candidates
        .iter()
        .filter(move |c| c.retrievable && accepts(record, &c.title))
}

/// First acceptable candidate.
pub fn select_candidate<'a>(
    record: &'a TrackRecord,
    candidates: &'a [Candidate],
) -> Option<&'a Candidate> {
    acceptable(record, candidates).next()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteTrack;
    use std::path::Path;

    fn record(title: &str, artists: &[&str]) -> TrackRecord {
        let remote = RemoteTrack {
            title: title.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            album: "Discovery".to_string(),
            ..Default::default()
        };
        TrackRecord::build(&remote, Path::new("/nonexistent-library")).unwrap()
    }

    #[test]
    fn test_classify_priority_and_default() {
        assert_eq!(classify("One More Time"), Variant::Studio);
        assert_eq!(classify("One More Time (Remix)"), Variant::Remix);
        assert_eq!(classify("Levels - Radio Edit"), Variant::Remix);
        assert_eq!(classify("Song - Acoustic"), Variant::Acoustic);
        assert_eq!(classify("Song (Karaoke Version)"), Variant::Karaoke);
        assert_eq!(classify("Song (Cover)"), Variant::Cover);
        // Live outranks everything else
        assert_eq!(classify("Live Acoustic Cover"), Variant::Live);
    }

    #[test]
    fn test_classify_live_years_and_symbol() {
        assert_eq!(classify("Song @ Wembley"), Variant::Live);
        assert_eq!(classify("Song 1999"), Variant::Live);
        assert_eq!(classify("Song 2050"), Variant::Live);
        assert_eq!(classify("Song 1949"), Variant::Studio);
        assert_eq!(classify("Song 2077"), Variant::Studio);
    }

    #[test]
    fn test_remix_classification_is_order_independent() {
        let first = classify("Around the World (Remix)");
        let _ = accepts(&record("Around the World", &["Daft Punk"]), "Daft Punk Remix");
        assert_eq!(classify("Around the World (Remix)"), first);
        assert_eq!(first, Variant::Remix);
    }

    #[test]
    fn test_full_album_always_rejected() {
        let track = record("One More Time", &["Daft Punk"]);
        assert!(!accepts(&track, "Daft Punk - Discovery Full Album"));
        assert!(!accepts(&track, "Daft Punk - One More Time [FULL ALBUM]"));
    }

    #[test]
    fn test_missing_token_rejected() {
        let track = record("One More Time", &["Daft Punk"]);
        assert!(!accepts(&track, "Daft Punk - Around the World"));
        assert!(accepts(&track, "Daft Punk - One More Time (Official Video)"));
    }

    #[test]
    fn test_variant_mismatch_rejected() {
        let studio = record("One More Time", &["Daft Punk"]);
        assert_eq!(studio.variant, Variant::Studio);
        assert!(!accepts(&studio, "Daft Punk - One More Time (Live at Coachella 2006)"));

        let live = record("One More Time - Live", &["Daft Punk"]);
        assert_eq!(live.variant, Variant::Live);
        assert!(accepts(&live, "Daft Punk - One More Time (Live at Coachella 2006)"));
        assert!(!accepts(&live, "Daft Punk - One More Time (Remix)"));
    }

    #[test]
    fn test_featurings_required() {
        let track = record("Get Lucky", &["Daft Punk", "Pharrell Williams", "Nile Rodgers"]);
        assert!(accepts(&track, "Daft Punk - Get Lucky ft. Pharrell Williams, Nile Rodgers"));
        assert!(!accepts(&track, "Daft Punk - Get Lucky ft. Pharrell Williams"));
    }

    #[test]
    fn test_comparable_token_cast_and_joins() {
        assert_eq!(comparable_token("Cast of Hamilton"), "hamilton");
        assert_eq!(comparable_token("Glee Cast"), "glee");
        assert_eq!(comparable_token("Simon & Garfunkel"), "simon");
        assert_eq!(comparable_token("Hall and Oates"), "hall");
        assert_eq!(comparable_token("Beyoncé"), "beyonce");
    }

    #[test]
    fn test_accepts_is_pure() {
        let track = record("One More Time", &["Daft Punk"]);
        let text = "Daft Punk - One More Time";
        let first = accepts(&track, text);
        for _ in 0..10 {
            assert_eq!(accepts(&track, text), first);
        }
    }

    #[test]
    fn test_select_candidate_keeps_source_order() {
        let track = record("One More Time", &["Daft Punk"]);
        let mut locked = Candidate::new("Daft Punk - One More Time", "https://example.org/locked");
        locked.retrievable = false;
        let candidates = vec![
            Candidate::new("Daft Punk - Discovery Full Album", "https://example.org/album"),
            locked,
            Candidate::new("Daft Punk - One More Time", "https://example.org/first"),
            Candidate::new("Daft Punk - One More Time (HQ)", "https://example.org/second"),
        ];
        let chosen = select_candidate(&track, &candidates).unwrap();
        assert_eq!(chosen.locator, "https://example.org/first");
        assert!(select_candidate(&track, &candidates[..2]).is_none());
    }
}
