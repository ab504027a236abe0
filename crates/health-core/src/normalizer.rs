//! Conversion of raw roster cells into typed values.
//!
//! Nothing here decides whether a field is required; that is the importer's
//! job. The normalizer only answers "what does this cell mean", failing on
//! cells that are present but unreadable.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::models::RawRecord;

/// Column headers of the roster export, in export order.
pub mod columns {
    pub const ID: &str = "Sirvoy Customer ID";
    pub const ACCOUNT_OWNER: &str = "Account Owner";
    pub const ACCOUNT_NAME: &str = "Account Name";
    pub const LATEST_LOGIN: &str = "Latest Login";
    pub const CREATED_DATE: &str = "Created Date";
    pub const LAST_CS_CONTACT_DATE: &str = "Last Customer Success Contact Date";
    pub const BILLING_COUNTRY: &str = "Billing Country";
    pub const ACCOUNT_TYPE: &str = "Account Type";
    pub const LANGUAGES: &str = "Language(s)";
    pub const STATUS: &str = "Status";
    pub const SIRVOY_ACCOUNT_STATUS: &str = "Sirvoy Account Status";
    pub const PROPERTY_TYPE: &str = "Property Type";
    pub const MRR_CURRENCY: &str = "MRR (converted) Currency";
    pub const MRR: &str = "MRR (converted)";
    pub const CHANNELS: &str = "Channels";

    pub const ALL: [&str; 15] = [
        ID,
        ACCOUNT_OWNER,
        ACCOUNT_NAME,
        LATEST_LOGIN,
        CREATED_DATE,
        LAST_CS_CONTACT_DATE,
        BILLING_COUNTRY,
        ACCOUNT_TYPE,
        LANGUAGES,
        STATUS,
        SIRVOY_ACCOUNT_STATUS,
        PROPERTY_TYPE,
        MRR_CURRENCY,
        MRR,
        CHANNELS,
    ];
}

/// Currency assumed when the currency column is blank.
pub const DEFAULT_CURRENCY: &str = "EUR";

/// Separator between entries of a list cell.
pub const LIST_SEPARATOR: char = ';';

const DATE_FORMAT: &str = "%d/%m/%Y";
const DATE_TIME_FORMAT: &str = "%d/%m/%Y, %H:%M";

// ── Cell parsers ──────────────────────────────────────────────────────────────

/// Parse `DD/MM/YYYY` or `DD/MM/YYYY, HH:mm`.
///
/// Blank input is `Ok(None)`; anything else that does not match is a
/// [`CoreError::DateParse`].
pub fn parse_date(raw: &str) -> Result<Option<NaiveDateTime>> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(None);
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT) {
        return Ok(Some(dt));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(Some(dt));
        }
    }

    Err(CoreError::DateParse(s.to_string()))
}

/// Split a `;`-separated cell, trimming entries and dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a money cell such as `€1,250.50`, `1 250 SEK` or `-100`.
///
/// Currency symbols, letters, whitespace and `,` thousands separators are
/// stripped. A blank cell is `0`. A cell with no digits left, or whose
/// remainder is not a decimal number, is a [`CoreError::MoneyParse`].
/// Negative amounts parse here and are rejected later by the MRR invariant.
///
/// A cell holding an HTML entity is rejected outright: the sanitizer only
/// escapes cells that were never plain amounts, and the entity's digits
/// (`&#x27;`) must not leak into the number.
pub fn parse_money(raw: &str) -> Result<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(0.0);
    }
    if s.contains('&') {
        return Err(CoreError::MoneyParse(s.to_string()));
    }

    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return Err(CoreError::MoneyParse(s.to_string()));
    }

    cleaned
        .parse::<f64>()
        .map_err(|_| CoreError::MoneyParse(s.to_string()))
}

/// Describe a `,` in a money cell that is not a thousands separator.
///
/// [`parse_money`] drops every comma, so `1,5` reads as `15` and
/// `1.250,50` as `1.2505`. Those cells still parse; this reports them so
/// the import can warn. A comma counts as grouping only when exactly three
/// digits follow it and it comes before any decimal point.
pub fn money_grouping_warning(raw: &str) -> Option<String> {
    let s = raw.trim();
    let amount = parse_money(s).ok()?;
    let decimal_point = s.find('.');

    let malformed = s.match_indices(',').any(|(pos, _)| {
        let digits = s[pos + 1..].chars().take_while(char::is_ascii_digit).count();
        digits != 3 || decimal_point.is_some_and(|dot| dot < pos)
    });

    malformed.then(|| {
        format!("',' is not a thousands separator here; the value was read as {amount}")
    })
}

// ── NormalizedRecord ──────────────────────────────────────────────────────────

/// A roster row with every cell converted to its typed form.
///
/// Text fields are trimmed. Enumerated fields (`status`, `account_type`) stay
/// as text because rejecting unknown values is a validation decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub id: String,
    pub account_owner: String,
    pub account_name: String,
    pub latest_login: Option<NaiveDateTime>,
    pub created_date: Option<NaiveDateTime>,
    pub last_cs_contact_date: Option<NaiveDateTime>,
    pub billing_country: String,
    pub account_type: String,
    pub languages: Vec<String>,
    pub status: String,
    pub sirvoy_account_status: String,
    pub property_type: String,
    pub mrr_currency: String,
    pub mrr: f64,
    pub channels: Vec<String>,
}

/// The first cell of a row that could not be normalized.
#[derive(Debug)]
pub struct FieldError {
    /// Column header of the offending cell.
    pub field: &'static str,
    pub error: CoreError,
}

impl FieldError {
    fn new(field: &'static str, error: CoreError) -> Self {
        Self { field, error }
    }
}

/// Normalize every known column of `record`. Missing columns read as blank.
///
/// Stops at the first unreadable cell, checking columns in export order.
pub fn normalize_record(record: &RawRecord) -> std::result::Result<NormalizedRecord, FieldError> {
    let text = |column: &str| record.get(column).unwrap_or("").trim().to_string();
    let date = |column: &'static str| {
        parse_date(record.get(column).unwrap_or("")).map_err(|e| FieldError::new(column, e))
    };

    let latest_login = date(columns::LATEST_LOGIN)?;
    let created_date = date(columns::CREATED_DATE)?;
    let last_cs_contact_date = date(columns::LAST_CS_CONTACT_DATE)?;

    let mrr_currency = match text(columns::MRR_CURRENCY) {
        c if c.is_empty() => DEFAULT_CURRENCY.to_string(),
        c => c.to_uppercase(),
    };
    let mrr = parse_money(record.get(columns::MRR).unwrap_or(""))
        .map_err(|e| FieldError::new(columns::MRR, e))?;

    Ok(NormalizedRecord {
        id: text(columns::ID),
        account_owner: text(columns::ACCOUNT_OWNER),
        account_name: text(columns::ACCOUNT_NAME),
        latest_login,
        created_date,
        last_cs_contact_date,
        billing_country: text(columns::BILLING_COUNTRY),
        account_type: text(columns::ACCOUNT_TYPE),
        languages: parse_list(record.get(columns::LANGUAGES).unwrap_or("")),
        status: text(columns::STATUS),
        sirvoy_account_status: text(columns::SIRVOY_ACCOUNT_STATUS),
        property_type: text(columns::PROPERTY_TYPE),
        mrr_currency,
        mrr,
        channels: parse_list(record.get(columns::CHANNELS).unwrap_or("")),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    // ── parse_date ────────────────────────────────────────────────────────

    #[test]
    fn test_parse_date_only() {
        let dt = parse_date("15/03/2024").unwrap().unwrap();
        assert_eq!((dt.day(), dt.month(), dt.year()), (15, 3, 2024));
        assert_eq!((dt.hour(), dt.minute()), (0, 0));
    }

    #[test]
    fn test_parse_date_with_time() {
        let dt = parse_date("01/12/2023, 14:05").unwrap().unwrap();
        assert_eq!((dt.day(), dt.month(), dt.year()), (1, 12, 2023));
        assert_eq!((dt.hour(), dt.minute()), (14, 5));
    }

    #[test]
    fn test_parse_date_blank_is_none() {
        assert_eq!(parse_date("").unwrap(), None);
        assert_eq!(parse_date("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        for raw in ["2024-03-15", "31/02/2024", "32/01/2024", "yesterday", "15/03/2024 14:05"] {
            let err = parse_date(raw).unwrap_err();
            assert!(matches!(err, CoreError::DateParse(_)), "{raw:?}");
        }
    }

    // ── parse_list ────────────────────────────────────────────────────────

    #[test]
    fn test_parse_list_trims_and_drops_empty() {
        assert_eq!(
            parse_list(" English ; Swedish;;  ;Norwegian "),
            vec!["English", "Swedish", "Norwegian"]
        );
    }

    #[test]
    fn test_parse_list_keeps_order_and_duplicates() {
        assert_eq!(
            parse_list("Booking.com; Airbnb; Booking.com"),
            vec!["Booking.com", "Airbnb", "Booking.com"]
        );
    }

    #[test]
    fn test_parse_list_empty() {
        assert!(parse_list("").is_empty());
    }

    // ── parse_money ───────────────────────────────────────────────────────

    #[test]
    fn test_parse_money_plain() {
        assert_eq!(parse_money("2500").unwrap(), 2500.0);
        assert_eq!(parse_money("1250.50").unwrap(), 1250.5);
    }

    #[test]
    fn test_parse_money_strips_symbols_and_separators() {
        assert_eq!(parse_money("€1,250.50").unwrap(), 1250.5);
        assert_eq!(parse_money("1 250 SEK").unwrap(), 1250.0);
        assert_eq!(parse_money("$ 3,000").unwrap(), 3000.0);
    }

    #[test]
    fn test_parse_money_blank_is_zero() {
        assert_eq!(parse_money("").unwrap(), 0.0);
        assert_eq!(parse_money("  ").unwrap(), 0.0);
    }

    #[test]
    fn test_parse_money_negative_parses() {
        assert_eq!(parse_money("-100").unwrap(), -100.0);
    }

    #[test]
    fn test_parse_money_rejects_non_numeric() {
        for raw in ["EUR", "n/a", "--", "1.2.3", "&#x27;+1 555"] {
            assert!(matches!(parse_money(raw), Err(CoreError::MoneyParse(_))), "{raw:?}");
        }
    }

    #[test]
    fn test_money_grouping_warning_on_decimal_comma() {
        for raw in ["1,5", "1.250,50", "1 250,00 SEK", "1,2500", ",5"] {
            assert!(money_grouping_warning(raw).is_some(), "{raw:?}");
        }
        let warning = money_grouping_warning("1,5").unwrap();
        assert!(warning.contains("read as 15"), "{warning}");
    }

    #[test]
    fn test_money_grouping_warning_silent_on_valid_cells() {
        for raw in ["", "2500", "1,250", "€1,250.50", "1,250,000", "-100", "1 250 SEK"] {
            assert_eq!(money_grouping_warning(raw), None, "{raw:?}");
        }
        // Unparseable cells are reported as errors, not warnings.
        assert_eq!(money_grouping_warning("n/a"), None);
    }

    // ── normalize_record ──────────────────────────────────────────────────

    fn full_record() -> RawRecord {
        [
            (columns::ID, " CUST-001 "),
            (columns::ACCOUNT_OWNER, "Anna Berg"),
            (columns::ACCOUNT_NAME, "Hotel Nordlys"),
            (columns::LATEST_LOGIN, "10/06/2024, 09:30"),
            (columns::CREATED_DATE, "01/01/2023"),
            (columns::LAST_CS_CONTACT_DATE, ""),
            (columns::BILLING_COUNTRY, "Sweden"),
            (columns::ACCOUNT_TYPE, "Pro"),
            (columns::LANGUAGES, "English; Swedish"),
            (columns::STATUS, "Active Customer"),
            (columns::SIRVOY_ACCOUNT_STATUS, "Active"),
            (columns::PROPERTY_TYPE, "Hotel"),
            (columns::MRR_CURRENCY, "sek"),
            (columns::MRR, "2,500"),
            (columns::CHANNELS, "Booking.com;Expedia"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_normalize_full_record() {
        let n = normalize_record(&full_record()).unwrap();
        assert_eq!(n.id, "CUST-001");
        assert_eq!(n.status, "Active Customer");
        assert_eq!(n.languages, vec!["English", "Swedish"]);
        assert_eq!(n.channels, vec!["Booking.com", "Expedia"]);
        assert_eq!(n.mrr, 2500.0);
        assert_eq!(n.mrr_currency, "SEK");
        assert!(n.latest_login.is_some());
        assert!(n.created_date.is_some());
        assert!(n.last_cs_contact_date.is_none());
    }

    #[test]
    fn test_normalize_missing_columns_read_blank() {
        let record: RawRecord = [(columns::ID, "CUST-009")].into_iter().collect();
        let n = normalize_record(&record).unwrap();
        assert_eq!(n.id, "CUST-009");
        assert_eq!(n.account_owner, "");
        assert_eq!(n.mrr, 0.0);
        assert_eq!(n.mrr_currency, DEFAULT_CURRENCY);
        assert!(n.created_date.is_none());
        assert!(n.channels.is_empty());
    }

    #[test]
    fn test_normalize_reports_offending_column() {
        let mut record = full_record();
        record.insert(columns::CREATED_DATE, "not a date");
        let err = normalize_record(&record).unwrap_err();
        assert_eq!(err.field, columns::CREATED_DATE);
        assert!(matches!(err.error, CoreError::DateParse(_)));

        let mut record = full_record();
        record.insert(columns::MRR, "unknown");
        let err = normalize_record(&record).unwrap_err();
        assert_eq!(err.field, columns::MRR);
    }

    #[test]
    fn test_columns_all_in_export_order() {
        assert_eq!(columns::ALL.len(), 15);
        assert_eq!(columns::ALL[0], columns::ID);
        assert_eq!(columns::ALL[14], columns::CHANNELS);
    }
}
