use chrono::{NaiveDateTime, Timelike};

use crate::health::HealthScore;
use crate::models::MonthlyRecurringRevenue;

/// Format a floating-point number with thousands separators and a fixed number
/// of decimal places.
///
/// # Examples
///
/// ```
/// use health_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5,  1), "1,234.5");
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(0.0, 2), "0.00");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let negative = value < 0.0;
    let abs_value = value.abs();

    // Nudge by one ULP at the target precision so exact midpoints round up.
    let factor = 10_f64.powi(decimals as i32);
    let epsilon = f64::EPSILON * abs_value * factor;
    let rounded = ((abs_value * factor) + epsilon).round() / factor;

    let integer_part = rounded.trunc() as u64;
    let frac_part = rounded - rounded.trunc();

    let grouped = group_thousands(&integer_part.to_string());

    let result = if decimals == 0 {
        grouped
    } else {
        // "0.50" → ".50"
        let frac_str = format!("{:.prec$}", frac_part, prec = decimals as usize);
        format!("{}{}", grouped, &frac_str[1..])
    };

    if negative {
        format!("-{}", result)
    } else {
        result
    }
}

/// Format an amount with two decimals, thousands separators and a trailing
/// currency code.
///
/// # Examples
///
/// ```
/// use health_core::formatting::format_money;
///
/// assert_eq!(format_money(7800.0, "EUR"), "7,800.00 EUR");
/// assert_eq!(format_money(0.0, "SEK"), "0.00 SEK");
/// ```
pub fn format_money(amount: f64, currency: &str) -> String {
    let number = format_number(amount, 2);
    if currency.is_empty() {
        number
    } else {
        format!("{} {}", number, currency)
    }
}

/// [`format_money`] for an MRR value.
pub fn format_mrr(mrr: &MonthlyRecurringRevenue) -> String {
    format_money(mrr.amount(), mrr.currency())
}

/// Calculate `(part / whole) * 100`, rounded to `decimal_places`.
///
/// Returns `0.0` if `whole` is zero to avoid division by zero.
///
/// # Examples
///
/// ```
/// use health_core::formatting::percentage;
///
/// assert!((percentage(50.0, 200.0, 1) - 25.0).abs() < 1e-9);
/// assert_eq!(percentage(0.0, 0.0, 2), 0.0);
/// ```
pub fn percentage(part: f64, whole: f64, decimal_places: u32) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    let raw = (part / whole) * 100.0;
    let factor = 10_f64.powi(decimal_places as i32);
    (raw * factor).round() / factor
}

/// Render a timestamp the way the roster export writes it.
///
/// Midnight renders as `DD/MM/YYYY`; any other time as `DD/MM/YYYY, HH:mm`.
/// Both forms are accepted by the normalizer's date parser.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use health_core::formatting::format_date;
///
/// let d = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
/// assert_eq!(format_date(d.and_hms_opt(0, 0, 0).unwrap()), "05/03/2024");
/// assert_eq!(format_date(d.and_hms_opt(9, 7, 0).unwrap()), "05/03/2024, 09:07");
/// ```
pub fn format_date(dt: NaiveDateTime) -> String {
    if dt.hour() == 0 && dt.minute() == 0 {
        dt.format("%d/%m/%Y").to_string()
    } else {
        dt.format("%d/%m/%Y, %H:%M").to_string()
    }
}

/// [`format_date`], or an empty string for `None`.
pub fn format_optional_date(dt: Option<NaiveDateTime>) -> String {
    dt.map(format_date).unwrap_or_default()
}

/// `72 (Healthy)`
pub fn format_score(score: HealthScore) -> String {
    format!("{} ({})", score.value(), score.classification().label())
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────
