//! Text and value normalization shared by every source cleaner.
//!
//! Source tables disagree on how they spell dashes, percentages, currency,
//! apostrophes and "no data". Every cleaner goes through these helpers so the
//! rules live in one place.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{PipelineError, Result, ValueKind};

/// Dash spellings seen in scraped tables. Multi-character mojibake comes
/// first so its trailing bytes are not left behind by a shorter match.
const DASH_VARIANTS: &[&str] = &[
    // en/em dash bytes decoded as Windows-1252
    "\u{e2}\u{20ac}\u{201c}",
    "\u{e2}\u{20ac}\u{201d}",
    // en/em dash bytes decoded as Latin-1
    "\u{e2}\u{80}\u{93}",
    "\u{e2}\u{80}\u{94}",
    "\u{2013}",
    "\u{2014}",
    "\u{2012}",
    "\u{2212}",
];

/// Apostrophe spellings: right single quote, its Windows-1252 mojibake, and
/// the `?` substituted by lossy exports.
const APOSTROPHE_VARIANTS: &[&str] = &["\u{e2}\u{20ac}\u{2122}", "\u{2019}", "?"];

/// Phrases used in place of a value when the source has no data
const MISSING_SENTINELS: &[&str] = &[
    "data not available",
    "not available",
    "unavailable",
    "n/a",
    "nsd",
    "nr",
];

static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([+-]?(?:\d+\.?\d*|\.\d+))").expect("leading number pattern is valid")
});

/// Canonical join key: lower-cased and trimmed.
pub fn normalize_state_name(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Replace every known dash variant with an ASCII hyphen.
pub fn normalize_dash(s: &str) -> String {
    let mut out = s.to_string();
    for variant in DASH_VARIANTS {
        if out.contains(variant) {
            out = out.replace(variant, "-");
        }
    }
    out
}

/// Lower-cased, trimmed, dash-normalized label.
pub fn normalize_label(s: &str) -> String {
    normalize_dash(s.trim()).to_lowercase()
}

pub fn is_missing_sentinel(s: &str) -> bool {
    let s = s.trim().to_lowercase();
    MISSING_SENTINELS.iter().any(|sentinel| *sentinel == s)
}

/// Parse `"12.5%"` into `0.125`. Empty cells and sentinels are `None`.
pub fn parse_percentage(s: &str) -> Result<Option<f64>> {
    let trimmed = s.trim();
    if trimmed.is_empty() || is_missing_sentinel(trimmed) {
        return Ok(None);
    }
    let number = trimmed.trim_end_matches('%').trim();
    parse_finite(number)
        .map(|v| Some(v / 100.0))
        .ok_or_else(|| PipelineError::format(ValueKind::Percentage, s))
}

/// Parse `"$1,024.50"` into `1024.5`. Empty cells and sentinels are `None`.
pub fn parse_currency(s: &str) -> Result<Option<f64>> {
    let trimmed = s.trim();
    if trimmed.is_empty() || is_missing_sentinel(trimmed) {
        return Ok(None);
    }
    let number: String = trimmed.chars().filter(|c| *c != '$' && *c != ',').collect();
    parse_finite(number.trim())
        .map(Some)
        .ok_or_else(|| PipelineError::format(ValueKind::Currency, s))
}

/// Parse a plain number. Empty cells and sentinels are `None`.
pub fn parse_number(s: &str) -> Result<Option<f64>> {
    let trimmed = s.trim();
    if trimmed.is_empty() || is_missing_sentinel(trimmed) {
        return Ok(None);
    }
    parse_finite(&trimmed.replace(',', ""))
        .map(Some)
        .ok_or_else(|| PipelineError::format(ValueKind::Number, s))
}

/// Numeric prefix of a noisy cell, e.g. `"0.5 (Unreliable)"` gives `0.5`.
pub fn leading_number(s: &str) -> Option<f64> {
    LEADING_NUMBER
        .captures(s)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_finite(m.as_str()))
}

/// Split a dash-normalized `"low-high"` range into its bounds.
pub fn split_range(s: &str) -> Result<(f64, f64)> {
    let normalized = normalize_dash(s);
    let (low, high) = normalized
        .split_once('-')
        .ok_or_else(|| PipelineError::format(ValueKind::Range, s))?;
    match (parse_finite(low.trim()), parse_finite(high.trim())) {
        (Some(low), Some(high)) if low <= high => Ok((low, high)),
        _ => Err(PipelineError::format(ValueKind::Range, s)),
    }
}

/// Canonical education label: repaired apostrophes, no trailing periods,
/// and `unknown` for the export's "Not Available".
pub fn clean_education(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.eq_ignore_ascii_case("not available") {
        return "unknown".to_string();
    }
    let mut out = trimmed.to_string();
    for variant in APOSTROPHE_VARIANTS {
        if out.contains(variant) {
            out = out.replace(variant, "'");
        }
    }
    out.trim_end_matches('.').trim_end().to_string()
}

fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}
