//! Escaping of untrusted cell text before it is stored, displayed or
//! re-exported.
//!
//! Two threats are handled:
//!
//! * markup injection, by HTML-escaping `& < > " '` in every value;
//! * spreadsheet formula injection, by neutralising values that begin with
//!   `=`, `+`, `-`, `@`, a tab or a carriage return.
//!
//! Escaping is applied unconditionally, so sanitising the same value twice
//! escapes its ampersands twice. Sanitise exactly once per write.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::models::RawRecord;

/// Prepended to a neutralised value. It is HTML-escaped along with the rest.
const NEUTRALISING_PREFIX: char = '\'';

// ── Public types ──────────────────────────────────────────────────────────────

/// A sanitised string plus the warnings raised while producing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizedValue {
    pub value: String,
    pub warnings: Vec<String>,
}

/// A sanitised record. Warnings are prefixed with the column name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizedRecord {
    pub record: RawRecord,
    pub warnings: Vec<String>,
}

/// A sanitised batch. Warnings are prefixed with `Row N: <column>: `.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizedBatch {
    pub records: Vec<RawRecord>,
    pub warnings: Vec<String>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Neutralise formula triggers and HTML-escape `raw`.
///
/// A leading `+` or `-` that starts a plain signed number (`-100`,
/// `+1,250.50`, `-.5`, `-1e5`) is left alone so numeric cells survive
/// unchanged.
pub fn sanitize_string(raw: &str) -> SanitizedValue {
    let mut warnings = Vec::new();

    let neutralised = match formula_trigger(raw) {
        Some(trigger) => {
            warnings.push(format!(
                "value starting with {} was neutralised to prevent formula injection",
                describe_trigger(trigger)
            ));
            format!("{NEUTRALISING_PREFIX}{raw}")
        }
        None => raw.to_string(),
    };

    SanitizedValue {
        value: escape_html(&neutralised),
        warnings,
    }
}

/// Sanitise every field of `record`, keeping the column order.
pub fn sanitize_record(record: &RawRecord) -> SanitizedRecord {
    let mut warnings = Vec::new();
    let mut cleaned = RawRecord::new();

    for (column, raw) in record.iter() {
        let SanitizedValue {
            value,
            warnings: field_warnings,
        } = sanitize_string(raw);
        warnings.extend(field_warnings.into_iter().map(|w| format!("{column}: {w}")));
        cleaned.insert(column, value);
    }

    SanitizedRecord {
        record: cleaned,
        warnings,
    }
}

/// Sanitise `records`, numbering rows from 1.
pub fn sanitize_batch(records: &[RawRecord]) -> SanitizedBatch {
    sanitize_batch_from(records, 1)
}

/// Sanitise `records`, numbering the first row `first_row`.
///
/// Importers pass `2` so warnings line up with import row numbers
/// (line 1 being the header).
pub fn sanitize_batch_from(records: &[RawRecord], first_row: usize) -> SanitizedBatch {
    let mut warnings = Vec::new();
    let mut cleaned = Vec::with_capacity(records.len());

    for (offset, record) in records.iter().enumerate() {
        let row = first_row + offset;
        let sanitized = sanitize_record(record);
        for w in sanitized.warnings {
            warn!(row, "{}", w);
            warnings.push(format!("Row {row}: {w}"));
        }
        cleaned.push(sanitized.record);
    }

    SanitizedBatch {
        records: cleaned,
        warnings,
    }
}

/// Escape the five HTML-significant characters.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`escape_html`].
///
/// Works in one pass, so `&amp;lt;` becomes `&lt;` and not `<`. Any other
/// `&` is kept as-is.
pub fn unescape_html(s: &str) -> String {
    const ENTITIES: [(&str, char); 5] = [
        ("&amp;", '&'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&#x27;", '\''),
    ];

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match ENTITIES.iter().find(|(entity, _)| tail.starts_with(entity)) {
            Some((entity, c)) => {
                out.push(*c);
                rest = &tail[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// The formula trigger `raw` starts with, if any.
///
/// Tab and carriage return only count at position 0; the printable triggers
/// also count after leading spaces, which spreadsheet software skips.
fn formula_trigger(raw: &str) -> Option<char> {
    let first = raw.chars().next()?;
    if matches!(first, '\t' | '\r') {
        return Some(first);
    }

    let candidate = raw.trim_start_matches(' ');
    let lead = candidate.chars().next()?;
    match lead {
        '+' | '-' if signed_number().is_match(candidate.trim_end()) => None,
        '=' | '+' | '-' | '@' => Some(lead),
        _ => None,
    }
}

fn describe_trigger(c: char) -> String {
    match c {
        '\t' => "a tab".to_string(),
        '\r' => "a carriage return".to_string(),
        other => format!("'{other}'"),
    }
}

fn signed_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-](?:(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?|\.\d+)(?:[eE][+-]?\d+)?$")
            .expect("regex is valid")
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
