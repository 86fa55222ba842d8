//! OCR text cleanup.
//!
//! Raw tesseract output is full of scanner noise: CR line endings,
//! blank-line runs, decorative separator rules, ligature glyphs, and
//! headers OCR'd as spaced-out single letters. Everything here is a pure
//! function over strings.

use once_cell::sync::Lazy;
use regex::Regex;

/// Default cap applied to normalized OCR text before it enters a prompt.
pub const DEFAULT_TEXT_LIMIT: usize = 2000;

static RE_SEPARATOR_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_=]{3,}").unwrap());
static RE_SPACED_LETTERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:[A-Za-z] ){4,}[A-Za-z]\b").unwrap());
static RE_NEWLINE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());

/// Clean raw OCR output and hard-cap it at `limit` characters.
///
/// Total over all inputs and idempotent for a fixed limit. The cut is by
/// character count with no word-boundary awareness, but never splits a
/// UTF-8 code point.
pub fn normalize(raw: &str, limit: usize) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let text = raw.replace('\r', "\n").replace('ﬁ', "fi").replace('ﬂ', "fl");
    let text = RE_SEPARATOR_RUN.replace_all(&text, "");
    let text = RE_SPACED_LETTERS.replace_all(&text, |caps: &regex::Captures| {
        caps[0].replace(' ', "")
    });
    let text = RE_NEWLINE_RUN.replace_all(&text, "\n");
    let cut = truncate_chars(text.trim(), limit);

    // The cut can expose trailing whitespace or turn the tail into a
    // collapsible letter run; redo those two steps so a second pass is
    // a no-op.
    let cut = RE_SPACED_LETTERS.replace_all(cut, |caps: &regex::Captures| {
        caps[0].replace(' ', "")
    });
    cut.trim_end().to_string()
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
