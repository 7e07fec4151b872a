//! Shared text normalization for track identity and candidate matching.
//!
//! Everything here is pure string work: title cleanup, featuring markers,
//! diacritic folding and the two sanitized forms (file stems and the
//! comparable token form used by the matcher).

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Existing featuring markers in a remote title: "feat. X", "Feat. X", "ft. X"
pub static FEAT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:feat|ft)\.\s+").unwrap());

/// Featuring suffix after normalization: " (ft. A and B)", " [ft. A]", " ft. A"
pub static FEAT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[\(\[]?\bft\.\s.*$").unwrap());

/// Regex to collapse multiple whitespace into single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Characters that break paths or shell globs when used in a file name.
pub const PATH_BREAKING: [char; 8] = ['/', '\\', '.', '?', '<', '>', ':', '*'];

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold diacritics to ASCII while preserving case.
/// e.g., "Beyoncé" → "Beyonce", "Motörhead" → "Motorhead"
pub fn fold_diacritics(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    // Remaining non-ASCII (Cyrillic, Hebrew, CJK, etc.)
    any_ascii(&stripped)
}

/// Fold Unicode text to lowercase ASCII.
pub fn fold_to_ascii(s: &str) -> String {
    fold_diacritics(s).to_lowercase()
}

// ============================================================================
// SANITIZED FORMS
// ============================================================================

/// Build a file stem that is safe on every filesystem we care about.
/// Diacritics are folded first so transliteration cannot reintroduce
/// path-breaking characters.
pub fn sanitize_file_stem(s: &str) -> String {
    let folded = fold_diacritics(s);
    let stripped: String = folded.chars().filter(|c| !PATH_BREAKING.contains(c)).collect();
    MULTI_SPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Lowercase, hyphen-joined, ASCII-only form used both for hidden temporary
/// names and for comparing candidate text against track attributes.
/// e.g., "Daft Punk - One More Time" → "daft-punk-one-more-time"
pub fn sanitize_name(s: &str) -> String {
    let folded = fold_to_ascii(s);
    let mut out = String::with_capacity(folded.len());
    for c in folded.chars() {
        let mapped = if c.is_whitespace() || c == '_' {
            '-'
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            c
        } else {
            continue;
        };
        if mapped == '-' && out.ends_with('-') {
            continue;
        }
        out.push(mapped);
    }
    out
}

// ============================================================================
// TITLE / ALBUM CLEANUP
// ============================================================================

/// Cut a remote title down to the song name proper.
/// "One More Time - Radio Edit" → "One More Time",
/// "Song live at Wembley" → "Song"
pub fn clean_title(raw: &str) -> String {
    let mut title = raw.split(" - ").next().unwrap_or(raw);
    if let Some(idx) = title.find(" live ") {
        title = &title[..idx];
    }
    title.trim().to_string()
}

/// Render the synthesized featuring suffix: "(ft. A)", "(ft. A, B and C)".
/// Returns None for an empty list.
pub fn featuring_suffix(featurings: &[String]) -> Option<String> {
    match featurings {
        [] => None,
        [only] => Some(format!("(ft. {})", only)),
        [init @ .., last] => Some(format!("(ft. {} and {})", init.join(", "), last)),
    }
}

/// Apply featuring formatting to a cleaned title.
/// An existing marker is normalized to "ft."; otherwise the suffix is appended.
pub fn format_featurings(title: &str, featurings: &[String]) -> String {
    let Some(suffix) = featuring_suffix(featurings) else {
        return title.to_string();
    };
    if FEAT_MARKER.is_match(title) {
        FEAT_MARKER.replace_all(title, "ft. ").to_string()
    } else if title.is_empty() {
        suffix
    } else {
        format!("{} {}", title, suffix)
    }
}

/// Strip a normalized featuring suffix. Never returns an empty string for a
/// non-empty title.
pub fn strip_featuring(title: &str) -> String {
    let song = FEAT_SUFFIX.replace(title, "");
    let song = song.trim();
    if song.is_empty() {
        title.to_string()
    } else {
        song.to_string()
    }
}

/// Replace square and curly brackets with parentheses.
pub fn clean_album(album: &str) -> String {
    album
        .replace(['[', '{'], "(")
        .replace([']', '}'], ")")
}

// ============================================================================
// TESTS
// ============================================================================
