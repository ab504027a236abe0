//! Writes customers back out in the roster export layout.
//!
//! Every field is quote-wrapped (embedded quotes doubled), list fields are
//! joined with `"; "` and dates use the same `DD/MM/YYYY[, HH:mm]` form the
//! importer reads, so an export can be imported again unchanged. Stored
//! text is HTML-escaped, so it is un-escaped on the way out; the re-import
//! escapes it again and lands on the same stored value. A neutralised cell
//! keeps its leading `'`, which stops the re-import flagging it a second
//! time.

use std::io::Write;
use std::path::Path;

use health_core::error::{CoreError, Result};
use health_core::formatting::{format_date, format_optional_date};
use health_core::health::HealthScoreCalculator;
use health_core::models::Customer;
use health_core::normalizer::columns;
use health_core::sanitizer::unescape_html;
use tracing::info;

use crate::reader::delimiter_byte;

pub const HEALTH_SCORE_COLUMN: &str = "Health Score";
pub const HEALTH_STATUS_COLUMN: &str = "Health Status";

const LIST_JOIN: &str = "; ";

/// How to render an export.
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    pub delimiter: char,
    /// Append `Health Score` and `Health Status`, computed with this
    /// calculator.
    pub health: Option<HealthScoreCalculator>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            health: None,
        }
    }
}

/// Write `customers` (header first) to `writer`.
pub fn write_customers<W: Write>(
    writer: W,
    customers: &[Customer],
    options: &ExportOptions,
) -> Result<()> {
    let mut csv = csv::WriterBuilder::new()
        .delimiter(delimiter_byte(options.delimiter)?)
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(writer);

    let mut header: Vec<&str> = columns::ALL.to_vec();
    if options.health.is_some() {
        header.extend([HEALTH_SCORE_COLUMN, HEALTH_STATUS_COLUMN]);
    }
    csv.write_record(&header).map_err(storage_error)?;

    for customer in customers {
        let mut fields = customer_fields(customer);
        if let Some(calculator) = options.health {
            let score = calculator.score(customer);
            fields.push(score.value().to_string());
            fields.push(score.classification().label().to_string());
        }
        csv.write_record(&fields).map_err(storage_error)?;
    }

    csv.flush()?;
    Ok(())
}

/// Render `customers` to a string.
pub fn export_to_string(customers: &[Customer], options: &ExportOptions) -> Result<String> {
    let mut buf = Vec::new();
    write_customers(&mut buf, customers, options)?;
    String::from_utf8(buf).map_err(|e| CoreError::Storage(e.to_string()))
}

/// Write `customers` to the file at `path`, replacing it.
pub fn export_to_path(path: &Path, customers: &[Customer], options: &ExportOptions) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_customers(std::io::BufWriter::new(file), customers, options)?;
    info!("Exported {} customers to {}", customers.len(), path.display());
    Ok(())
}

/// One row's cells in [`columns::ALL`] order.
fn customer_fields(c: &Customer) -> Vec<String> {
    let list = |items: &[String]| {
        items
            .iter()
            .map(|s| unescape_html(s))
            .collect::<Vec<_>>()
            .join(LIST_JOIN)
    };
    vec![
        unescape_html(c.id()),
        unescape_html(c.account_owner()),
        unescape_html(c.account_name()),
        format_optional_date(c.latest_login()),
        format_date(c.created_date()),
        format_optional_date(c.last_cs_contact_date()),
        unescape_html(c.billing_country()),
        c.account_type().label().to_string(),
        list(c.languages()),
        c.status().label().to_string(),
        unescape_html(c.sirvoy_account_status()),
        unescape_html(c.property_type()),
        unescape_html(c.mrr().currency()),
        c.mrr().amount().to_string(),
        list(c.channels()),
    ]
}

fn storage_error(e: csv::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::CustomerImporter;
    use crate::memory_store::InMemoryRepository;
    use crate::reader::read_records_from_str;
    use crate::repository::CustomerRepository;
    use crate::test_support::{customer, reference_calculator, row};
    use health_core::normalizer::columns::{ACCOUNT_NAME, PROPERTY_TYPE};
    use tempfile::TempDir;

    fn sample() -> Customer {
        customer("CUST-001", |d| {
            d.account_name = "Hotel \"Nordlys\"".into();
            d.languages = vec!["English".into(), "Swedish".into()];
            d.channels = vec!["Booking.com".into(), "Expedia".into()];
            d.mrr = 1_250.5;
        })
    }

    #[test]
    fn test_header_and_quoting() {
        let out = export_to_string(&[sample()], &ExportOptions::default()).unwrap();
        let mut lines = out.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("\"Sirvoy Customer ID\",\"Account Owner\""));
        assert!(header.ends_with("\"Channels\""));

        let row = lines.next().unwrap();
        assert!(row.starts_with("\"CUST-001\",\"Anna Berg\",\"Hotel \"\"Nordlys\"\"\""));
        assert!(row.contains("\"English; Swedish\""));
        assert!(row.contains("\"01/01/2023\""));
        assert!(row.contains("\"1250.5\""));
        assert!(row.ends_with("\"Booking.com; Expedia\""));
    }

    #[test]
    fn test_every_field_quoted_even_empty() {
        let out = export_to_string(&[customer("C1", |_| {})], &ExportOptions::default()).unwrap();
        let row = out.lines().nth(1).unwrap();
        // 15 quoted fields → 30 quote characters when no field contains quotes.
        assert_eq!(row.matches('"').count(), 30);
        assert!(row.contains(",\"\","));
    }

    #[test]
    fn test_custom_delimiter() {
        let options = ExportOptions {
            delimiter: ';',
            health: None,
        };
        let out = export_to_string(&[sample()], &options).unwrap();
        assert!(out.starts_with("\"Sirvoy Customer ID\";\"Account Owner\""));
    }

    #[test]
    fn test_with_health_columns() {
        let calc = reference_calculator();
        let c = sample();
        let options = ExportOptions {
            delimiter: ',',
            health: Some(calc),
        };
        let out = export_to_string(std::slice::from_ref(&c), &options).unwrap();
        let mut lines = out.lines();
        assert!(lines
            .next()
            .unwrap()
            .ends_with("\"Health Score\",\"Health Status\""));
        let score = calc.score(&c);
        let expected = format!(
            "\"{}\",\"{}\"",
            score.value(),
            score.classification().label()
        );
        assert!(lines.next().unwrap().ends_with(&expected));
    }

    #[test]
    fn test_export_reimports_to_equal_customers() {
        let original = vec![
            sample(),
            customer("CUST-002", |d| {
                d.latest_login = chrono::NaiveDate::from_ymd_opt(2024, 6, 1)
                    .unwrap()
                    .and_hms_opt(9, 30, 0);
            }),
        ];
        let text = export_to_string(&original, &ExportOptions::default()).unwrap();
        let records = read_records_from_str(&text, ',').unwrap();

        let mut repo = InMemoryRepository::new();
        let summary = CustomerImporter::new(&mut repo, reference_calculator()).execute(&records);
        assert_eq!(summary.error_count, 0, "{:?}", summary.errors);
        assert_eq!(repo.get_by_id("CUST-002").unwrap(), original[1]);
        assert_eq!(
            repo.get_by_id("CUST-001").unwrap().languages(),
            original[0].languages()
        );
    }

    #[test]
    fn test_export_reimport_keeps_special_characters() {
        let source = vec![row(&[
            (ACCOUNT_NAME, "B&B \"Fjord\" <Bergen>"),
            (PROPERTY_TYPE, "=SUM(A1)"),
        ])];
        let mut first = InMemoryRepository::new();
        CustomerImporter::new(&mut first, reference_calculator()).execute(&source);
        let stored = first.get_all().unwrap();
        assert_eq!(stored[0].account_name(), "B&amp;B &quot;Fjord&quot; &lt;Bergen&gt;");
        assert_eq!(stored[0].property_type(), "&#x27;=SUM(A1)");

        let text = export_to_string(&stored, &ExportOptions::default()).unwrap();
        assert!(text.contains("\"B&B \"\"Fjord\"\" <Bergen>\""), "{text}");
        assert!(text.contains("\"'=SUM(A1)\""), "{text}");

        let mut second = InMemoryRepository::new();
        let records = read_records_from_str(&text, ',').unwrap();
        let summary = CustomerImporter::new(&mut second, reference_calculator()).execute(&records);
        assert_eq!(summary.error_count, 0, "{:?}", summary.errors);
        assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
        assert_eq!(second.get_all().unwrap(), stored);
    }

    #[test]
    fn test_export_to_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("exports").join("roster.csv");
        export_to_path(&path, &[sample()], &ExportOptions::default()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
