//! Type-driven normalization of extracted field values.
//!
//! Dates become ISO `YYYY-MM-DD`, amounts become `f64` (Dutch and English
//! digit grouping), everything else is stored as a trimmed string. The raw
//! text is kept alongside every normalized value.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use taxon_core::defaults::NULL_SENTINELS;
use taxon_core::{FieldValue, MetadataEntry};

/// Tried in order; the first successful parse wins.
const DATE_FORMATS: &[&str] = &[
    // ISO
    "%Y-%m-%d",
    // European
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    // US
    "%m/%d/%Y",
    "%m-%d-%Y",
    // Verbose
    "%d %B %Y",
    "%B %d, %Y",
    "%B %d %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Dutch, German, and French month names mapped to English for `%B`.
const MONTH_ALIASES: &[(&str, &str)] = &[
    ("januari", "January"),
    ("januar", "January"),
    ("janvier", "January"),
    ("februari", "February"),
    ("februar", "February"),
    ("février", "February"),
    ("maart", "March"),
    ("märz", "March"),
    ("mars", "March"),
    ("avril", "April"),
    ("mei", "May"),
    ("mai", "May"),
    ("juni", "June"),
    ("juin", "June"),
    ("juli", "July"),
    ("juillet", "July"),
    ("augustus", "August"),
    ("août", "August"),
    ("septembre", "September"),
    ("oktober", "October"),
    ("octobre", "October"),
    ("dezember", "December"),
    ("décembre", "December"),
];

static DUTCH_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?\d{1,3}(?:\.\d{3})+(?:,\d+)?$").expect("dutch number regex"));
static ENGLISH_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?\d{1,3}(?:,\d{3})+(?:\.\d+)?$").expect("english number regex"));
static COMMA_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?\d+,\d+$").expect("comma decimal regex"));
static PLAIN_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?\d+(?:\.\d+)?$").expect("plain number regex"));
static DATE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:factuurdatum|invoice date|datum|dated|date|le|am)\s*:\s*")
        .expect("date prefix regex")
});
static NUMBER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+]?\d(?:[\d.,]*\d)?").expect("number token regex"));

/// How a declared property type is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Date,
    Number,
    Boolean,
    Text,
}

impl ValueKind {
    pub fn for_type(property_type: &str) -> Self {
        match property_type.trim().to_ascii_lowercase().as_str() {
            "date" | "datetime" => ValueKind::Date,
            "number" | "decimal" | "amount" | "currency" | "integer" | "float" | "money" => {
                ValueKind::Number
            }
            "boolean" | "bool" => ValueKind::Boolean,
            _ => ValueKind::Text,
        }
    }
}

/// Whether a raw value means "nothing was found".
pub fn is_null_sentinel(raw: &str) -> bool {
    let lowered = raw.trim().to_lowercase();
    NULL_SENTINELS.contains(&lowered.as_str())
}

/// Strip a leading "date:"-style label.
pub fn clean_date_text(raw: &str) -> String {
    DATE_PREFIX.replace(raw.trim(), "").trim().to_string()
}

fn translate_months(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let lowered = word.to_lowercase();
            let bare = lowered.trim_end_matches([',', '.']);
            match MONTH_ALIASES.iter().find(|(alias, _)| *alias == bare) {
                Some((_, english)) => format!("{}{}", english, &lowered[bare.len()..]),
                None => word.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a date in any of the supported notations.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = clean_date_text(raw);
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&cleaned) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Some(dt.date());
        }
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
    {
        return Some(date);
    }

    let translated = translate_months(&cleaned);
    if translated != cleaned {
        return DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(&translated, fmt).ok());
    }
    None
}

/// Parse an amount written with Dutch (`1.250,50`) or English (`1,250.50`)
/// digit grouping. Currency symbols, codes, and whitespace are ignored.
pub fn parse_number(raw: &str) -> Option<f64> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\'')
        .collect();
    let token = NUMBER_TOKEN.find(&compact)?.as_str();

    let canonical = if ENGLISH_NUMBER.is_match(token) {
        token.replace(',', "")
    } else if DUTCH_NUMBER.is_match(token) {
        token.replace('.', "").replace(',', ".")
    } else if COMMA_DECIMAL.is_match(token) {
        token.replace(',', ".")
    } else if PLAIN_NUMBER.is_match(token) {
        token.to_string()
    } else {
        return None;
    };
    canonical.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_boolean(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "ja" | "oui" | "1" => Some(true),
        "false" | "no" | "n" | "nee" | "nein" | "non" | "0" => Some(false),
        _ => None,
    }
}

/// Normalize one scalar value by its declared property type.
///
/// Returns `None` for null sentinels and for objects/arrays, which the caller
/// keeps as extra fields instead.
pub fn normalize_field(property_type: &str, value: &JsonValue, confidence: f32) -> Option<MetadataEntry> {
    let raw = match value {
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => return None,
        JsonValue::String(s) => s.trim().to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
    };
    if raw.is_empty() || is_null_sentinel(&raw) {
        return None;
    }

    let entry = match ValueKind::for_type(property_type) {
        ValueKind::Date => match normalize_date(&raw) {
            Some(date) => MetadataEntry {
                value: FieldValue::Date(date),
                confidence,
                raw_text: Some(raw),
            },
            None => MetadataEntry {
                value: FieldValue::Text(clean_date_text(&raw)),
                confidence,
                raw_text: Some(raw),
            },
        },
        ValueKind::Number => match value.as_f64().or_else(|| parse_number(&raw)) {
            Some(n) => MetadataEntry {
                value: FieldValue::Number(n),
                confidence,
                raw_text: Some(raw),
            },
            None => MetadataEntry {
                value: FieldValue::Text(raw.clone()),
                confidence: 0.0,
                raw_text: Some(raw),
            },
        },
        ValueKind::Boolean => match value.as_bool().or_else(|| parse_boolean(&raw)) {
            Some(b) => MetadataEntry {
                value: FieldValue::Boolean(b),
                confidence,
                raw_text: Some(raw),
            },
            None => MetadataEntry {
                value: FieldValue::Text(raw),
                confidence,
                raw_text: None,
            },
        },
        ValueKind::Text => MetadataEntry {
            value: FieldValue::Text(raw),
            confidence,
            raw_text: None,
        },
    };
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_european_and_iso_dates_agree() {
        for raw in ["15-03-2025", "15/03/2025", "2025-03-15", "15.03.2025"] {
            assert_eq!(normalize_date(raw), Some(ymd(2025, 3, 15)), "{}", raw);
        }
    }

    #[test]
    fn test_us_date_when_day_exceeds_twelve() {
        assert_eq!(normalize_date("03/15/2025"), Some(ymd(2025, 3, 15)));
    }

    #[test]
    fn test_verbose_and_prefixed_dates() {
        assert_eq!(normalize_date("15 March 2025"), Some(ymd(2025, 3, 15)));
        assert_eq!(normalize_date("March 15, 2025"), Some(ymd(2025, 3, 15)));
        assert_eq!(normalize_date("Datum: 15-03-2025"), Some(ymd(2025, 3, 15)));
        assert_eq!(normalize_date("date: 2025-03-15"), Some(ymd(2025, 3, 15)));
        assert_eq!(normalize_date("15 maart 2025"), Some(ymd(2025, 3, 15)));
    }

    #[test]
    fn test_datetime_is_truncated_to_date() {
        assert_eq!(normalize_date("2025-03-15T10:30:00Z"), Some(ymd(2025, 3, 15)));
        assert_eq!(normalize_date("2025-03-15T10:30:00"), Some(ymd(2025, 3, 15)));
    }

    #[test]
    fn test_unparseable_date_is_none() {
        assert_eq!(normalize_date("next tuesday"), None);
        assert_eq!(normalize_date(""), None);
    }

    #[test]
    fn test_dutch_and_english_grouping_agree() {
        assert_eq!(parse_number("1.250,50"), Some(1250.50));
        assert_eq!(parse_number("1,250.50"), Some(1250.50));
    }

    #[test]
    fn test_number_fallbacks_and_symbols() {
        assert_eq!(parse_number("€ 12,99"), Some(12.99));
        assert_eq!(parse_number("EUR 1.000.000,00"), Some(1_000_000.0));
        assert_eq!(parse_number("$1,234"), Some(1234.0));
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number("-7.5"), Some(-7.5));
        assert_eq!(parse_number("1 250,50"), Some(1250.50));
        assert_eq!(parse_number("none given"), None);
    }

    #[test]
    fn test_null_sentinels_are_dropped() {
        for raw in ["null", "None", "N/A", "-", "  "] {
            assert!(normalize_field("string", &json!(raw), 0.9).is_none(), "{}", raw);
        }
        assert!(normalize_field("date", &JsonValue::Null, 0.9).is_none());
    }

    #[test]
    fn test_normalize_field_date_keeps_raw_text() {
        let entry = normalize_field("date", &json!("15-03-2025"), 0.8).unwrap();
        assert_eq!(entry.value, FieldValue::Date(ymd(2025, 3, 15)));
        assert_eq!(entry.raw_text.as_deref(), Some("15-03-2025"));
        assert_eq!(entry.confidence, 0.8);
    }

    #[test]
    fn test_normalize_field_unparsed_date_stores_cleaned_text() {
        let entry = normalize_field("date", &json!("Datum: binnenkort"), 0.8).unwrap();
        assert_eq!(entry.value, FieldValue::Text("binnenkort".into()));
        assert_eq!(entry.confidence, 0.8);
    }

    #[test]
    fn test_normalize_field_bad_amount_has_zero_confidence() {
        let entry = normalize_field("amount", &json!("about a tenner"), 0.8).unwrap();
        assert_eq!(entry.value, FieldValue::Text("about a tenner".into()));
        assert_eq!(entry.confidence, 0.0);

        let entry = normalize_field("amount", &json!(19.5), 0.8).unwrap();
        assert_eq!(entry.value, FieldValue::Number(19.5));
    }

    #[test]
    fn test_normalize_field_text_and_nested() {
        let entry = normalize_field("string", &json!("  ACME B.V. "), 0.7).unwrap();
        assert_eq!(entry.value, FieldValue::Text("ACME B.V.".into()));
        assert!(normalize_field("string", &json!([1, 2]), 0.7).is_none());
    }
}
