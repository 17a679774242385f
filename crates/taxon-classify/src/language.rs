//! Stop-word language detection.
//!
//! Counts common function words per language over the first few thousand
//! characters. Good enough to tag Dutch, English, German, and French business
//! documents; returns `None` when the evidence is thin.

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Characters scanned.
const SAMPLE_CHARS: usize = 4_000;

/// Minimum stop-word hits before a language is reported.
const MIN_HITS: usize = 3;

static STOP_WORDS: Lazy<Vec<(&'static str, HashSet<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            "nl",
            [
                "de", "het", "een", "en", "van", "dat", "voor", "met", "niet", "op", "te",
                "zijn", "naar", "uw", "bij", "wordt", "ook", "aan", "deze", "wij",
            ]
            .into_iter()
            .collect(),
        ),
        (
            "en",
            [
                "the", "and", "of", "to", "is", "in", "for", "that", "with", "this", "you",
                "are", "your", "be", "on", "not", "from", "we", "our", "by",
            ]
            .into_iter()
            .collect(),
        ),
        (
            "de",
            [
                "der", "die", "und", "das", "ist", "nicht", "mit", "für", "den", "von", "zu",
                "ein", "eine", "sie", "wir", "auf", "ihre", "dem", "bitte", "sind",
            ]
            .into_iter()
            .collect(),
        ),
        (
            "fr",
            [
                "le", "la", "les", "et", "des", "est", "une", "du", "pour", "que", "dans",
                "vous", "pas", "sur", "avec", "au", "votre", "nous", "ce", "il",
            ]
            .into_iter()
            .collect(),
        ),
    ]
});

/// Detect the dominant language of `text` as an ISO 639-1 code.
pub fn detect_language(text: &str) -> Option<&'static str> {
    let sample: String = text.chars().take(SAMPLE_CHARS).collect::<String>().to_lowercase();
    let words: Vec<&str> = sample
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return None;
    }

    let mut best: Option<(&'static str, usize)> = None;
    for (code, stop_words) in STOP_WORDS.iter() {
        let hits = words.iter().filter(|w| stop_words.contains(*w)).count();
        if hits >= MIN_HITS && best.map_or(true, |(_, top)| hits > top) {
            best = Some((*code, hits));
        }
    }
    best.map(|(code, _)| code)
}
