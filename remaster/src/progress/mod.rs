//! Progress marker parsing for streamed tool output.
//!
//! All functions are pure. Malformed input yields no update, never an error
//! the caller has to handle.

use crate::errors::ParseWarning;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// `12 of 40` style counters printed while extracting.
static EXTRACTION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\S+)\s+of\s+(\S+)").expect("static regex"));

/// `xorriso : UPDATE : ... : 57%` lines printed while writing an image.
static CREATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"UPDATE\s*:.*?(\S*)%\s*$").expect("static regex"));

/// Which tool produced the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// The image extraction tool.
    Extraction,
    /// The image creation tool.
    Creation,
}

/// Derives a 0..=100 percentage from a chunk, if it carries a marker.
#[must_use]
pub fn parse_progress(kind: ToolKind, chunk: &str) -> Option<u8> {
    try_parse_progress(kind, chunk).ok()
}

/// Like [`parse_progress`] but says why there was no update.
///
/// A chunk may hold several lines; the last line with a marker wins.
pub fn try_parse_progress(kind: ToolKind, chunk: &str) -> Result<u8, ParseWarning> {
    let mut last = Err(ParseWarning::MarkerAbsent);
    for line in chunk.lines() {
        let parsed = match kind {
            ToolKind::Extraction => parse_extraction_line(line),
            ToolKind::Creation => parse_creation_line(line),
        };
        if parsed != Err(ParseWarning::MarkerAbsent) {
            last = parsed;
        }
    }
    last
}

fn parse_extraction_line(line: &str) -> Result<u8, ParseWarning> {
    let caps = EXTRACTION_MARKER
        .captures_iter(line)
        .last()
        .ok_or(ParseWarning::MarkerAbsent)?;
    let done = parse_number(&caps[1])?;
    let total = parse_number(&caps[2])?;
    if total == 0 {
        return Err(ParseWarning::ZeroTotal);
    }
    Ok(clamp_percent(done.saturating_mul(100) / total))
}

fn parse_creation_line(line: &str) -> Result<u8, ParseWarning> {
    let caps = CREATION_MARKER
        .captures(line)
        .ok_or(ParseWarning::MarkerAbsent)?;
    let percent = parse_number(&caps[1])?;
    Ok(clamp_percent(percent))
}

fn parse_number(text: &str) -> Result<u64, ParseWarning> {
    text.parse::<u64>()
        .map_err(|_| ParseWarning::NotNumeric(text.to_string()))
}

fn clamp_percent(value: u64) -> u8 {
    u8::try_from(value.min(100)).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_marker() {
        assert_eq!(parse_progress(ToolKind::Extraction, "12 of 40 files"), Some(30));
        assert_eq!(parse_progress(ToolKind::Extraction, "1 of 3 files"), Some(33));
        assert_eq!(parse_progress(ToolKind::Extraction, "40 of 40 files"), Some(100));
    }

    #[test]
    fn test_extraction_zero_total() {
        assert_eq!(parse_progress(ToolKind::Extraction, "0 of 0 files"), None);
        assert_eq!(
            try_parse_progress(ToolKind::Extraction, "0 of 0 files"),
            Err(ParseWarning::ZeroTotal)
        );
    }

    #[test]
    fn test_extraction_non_numeric() {
        assert_eq!(
            try_parse_progress(ToolKind::Extraction, "one of many files"),
            Err(ParseWarning::NotNumeric("one".to_string()))
        );
    }

    #[test]
    fn test_extraction_overshoot_is_clamped() {
        assert_eq!(parse_progress(ToolKind::Extraction, "50 of 40 files"), Some(100));
    }

    #[test]
    fn test_creation_marker() {
        assert_eq!(
            parse_progress(ToolKind::Creation, "xorriso : UPDATE : ... : 57%"),
            Some(57)
        );
        assert_eq!(
            parse_progress(ToolKind::Creation, "xorriso : UPDATE : 1234 of 5678 MB written : 9%\n"),
            Some(9)
        );
    }

    #[test]
    fn test_creation_malformed() {
        assert_eq!(parse_progress(ToolKind::Creation, "xorriso : UPDATE : ... : abc%"), None);
        assert_eq!(parse_progress(ToolKind::Creation, "xorriso : NOTE : done"), None);
        assert_eq!(parse_progress(ToolKind::Creation, "57%"), None);
        assert_eq!(parse_progress(ToolKind::Creation, ""), None);
    }

    #[test]
    fn test_multi_line_chunk_uses_last_marker() {
        let chunk = "xorriso : UPDATE : a : 10%\nnoise\nxorriso : UPDATE : b : 20%\n";
        assert_eq!(parse_progress(ToolKind::Creation, chunk), Some(20));
    }

    #[test]
    fn test_never_panics_on_garbage() {
        for chunk in ["of", " of ", "99999999999999999999999 of 1", "\u{0}\u{1} of \u{2}", "%%%"] {
            let _ = parse_progress(ToolKind::Extraction, chunk);
            let _ = parse_progress(ToolKind::Creation, chunk);
        }
    }
}
