//! Row-by-row validation of a roster export and the single bulk write that
//! follows it.
//!
//! A bad row never aborts the import. It becomes a [`ValidationError`] that
//! carries its row number, and the remaining rows carry on.
//!
//! Row numbers count records, not file lines: the header is row 1 and data
//! record `k` is row `k + 1`. Blank lines are dropped by the reader and do
//! not advance the count, and a quoted cell spanning several lines still
//! counts as one row. For a plain export this is the spreadsheet line.

use health_core::error::{CoreError, ErrorCode};
use health_core::health::{HealthClassification, HealthScore, HealthScoreCalculator};
use health_core::models::{AccountType, Customer, CustomerDraft, CustomerStatus, RawRecord};
use health_core::normalizer::{columns, money_grouping_warning, normalize_record, NormalizedRecord};
use health_core::sanitizer::sanitize_batch_from;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::repository::CustomerRepository;

/// Row number of the first data record; row 1 is the header.
pub const FIRST_DATA_ROW: usize = 2;

// ── Summary types ─────────────────────────────────────────────────────────────

/// Why one row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// 1-based record number, counting the header as row 1.
    pub row: usize,
    /// Column header of the offending cell.
    pub field: String,
    pub message: String,
}

/// Score of an accepted customer, in row order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerHealth {
    pub row: usize,
    pub customer_id: String,
    pub score: HealthScore,
    pub classification: HealthClassification,
}

/// Outcome of one import batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub total_rows: usize,
    /// Customers whose id was not stored before this import.
    pub imported_count: usize,
    /// Valid rows that replaced an already stored customer.
    pub skipped_count: usize,
    pub error_count: usize,
    pub errors: Vec<ValidationError>,
    /// Sanitizer and money-format warnings, prefixed with the row number.
    pub warnings: Vec<String>,
    pub health_scores: Vec<CustomerHealth>,
    /// Set when the bulk write failed. Counts are then zero; details are in
    /// the log only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_error: Option<ErrorCode>,
}

impl ImportSummary {
    /// Valid rows, whether or not they were written.
    pub fn valid_count(&self) -> usize {
        self.health_scores.len()
    }

    pub fn is_storage_failure(&self) -> bool {
        self.storage_error.is_some()
    }
}

// ── CustomerImporter ──────────────────────────────────────────────────────────

/// Validates export rows and writes the valid ones in one `add_many` call.
pub struct CustomerImporter<'a> {
    repository: &'a mut dyn CustomerRepository,
    calculator: HealthScoreCalculator,
}

impl<'a> CustomerImporter<'a> {
    pub fn new(repository: &'a mut dyn CustomerRepository, calculator: HealthScoreCalculator) -> Self {
        Self {
            repository,
            calculator,
        }
    }

    /// Import `records`. Never fails as a whole: row problems are collected
    /// and a storage failure is reported through
    /// [`ImportSummary::storage_error`].
    pub fn execute(&mut self, records: &[RawRecord]) -> ImportSummary {
        let sanitized = sanitize_batch_from(records, FIRST_DATA_ROW);

        let mut summary = ImportSummary {
            total_rows: records.len(),
            warnings: sanitized.warnings,
            ..Default::default()
        };
        let mut valid = Vec::new();

        for (index, record) in sanitized.records.iter().enumerate() {
            let row = index + FIRST_DATA_ROW;
            match validate_row(row, record) {
                Ok(customer) => {
                    if let Some(w) = record.get(columns::MRR).and_then(money_grouping_warning) {
                        warn!(row, "{}: {}", columns::MRR, w);
                        summary.warnings.push(format!("Row {row}: {}: {w}", columns::MRR));
                    }
                    let score = self.calculator.score(&customer);
                    debug!(row, id = customer.id(), score = score.value(), "row accepted");
                    summary.health_scores.push(CustomerHealth {
                        row,
                        customer_id: customer.id().to_string(),
                        score,
                        classification: score.classification(),
                    });
                    valid.push(customer);
                }
                Err(e) => {
                    debug!(row, field = %e.field, "row rejected: {}", e.message);
                    summary.errors.push(e);
                }
            }
        }
        summary.error_count = summary.errors.len();

        if !valid.is_empty() {
            match self.repository.add_many(valid) {
                Ok(outcome) => {
                    summary.imported_count = outcome.inserted;
                    summary.skipped_count = outcome.skipped;
                }
                Err(e) => {
                    error!(error = %e, "bulk write failed; nothing imported");
                    summary.storage_error = Some(e.code());
                }
            }
        }

        info!(
            total = summary.total_rows,
            imported = summary.imported_count,
            skipped = summary.skipped_count,
            errors = summary.error_count,
            warnings = summary.warnings.len(),
            "import finished"
        );
        summary
    }
}

// ── Row validation ────────────────────────────────────────────────────────────

/// Validate one sanitized record and build its customer.
///
/// Checks run in a fixed order and the first failure is reported:
/// cell parsing, required fields, enumerated values, created date, then the
/// customer's own invariants.
pub fn validate_row(row: usize, record: &RawRecord) -> Result<Customer, ValidationError> {
    let reject = |field: &str, message: String| ValidationError {
        row,
        field: field.to_string(),
        message,
    };

    let normalized = normalize_record(record)
        .map_err(|e| reject(e.field, parse_failure_message(&e.error)))?;

    for (field, value) in [
        (columns::ID, &normalized.id),
        (columns::ACCOUNT_OWNER, &normalized.account_owner),
        (columns::STATUS, &normalized.status),
        (columns::ACCOUNT_TYPE, &normalized.account_type),
    ] {
        if value.is_empty() {
            return Err(reject(field, "is required".to_string()));
        }
    }

    let status: CustomerStatus = normalized
        .status
        .parse()
        .map_err(|_| reject(columns::STATUS, "must be Active or Inactive".to_string()))?;
    let account_type: AccountType = normalized
        .account_type
        .parse()
        .map_err(|_| reject(columns::ACCOUNT_TYPE, "must be Pro or Starter".to_string()))?;
    let created_date = normalized
        .created_date
        .ok_or_else(|| reject(columns::CREATED_DATE, "is required".to_string()))?;

    Customer::new(into_draft(normalized, status, account_type, created_date)).map_err(|e| match e {
        CoreError::Validation { field, message } => reject(column_for(&field), message),
        other => reject(columns::ID, other.user_message().to_string()),
    })
}

fn into_draft(
    n: NormalizedRecord,
    status: CustomerStatus,
    account_type: AccountType,
    created_date: chrono::NaiveDateTime,
) -> CustomerDraft {
    CustomerDraft {
        id: n.id,
        account_owner: n.account_owner,
        account_name: n.account_name,
        latest_login: n.latest_login,
        created_date,
        last_cs_contact_date: n.last_cs_contact_date,
        billing_country: n.billing_country,
        account_type,
        languages: n.languages,
        status,
        sirvoy_account_status: n.sirvoy_account_status,
        property_type: n.property_type,
        mrr: n.mrr,
        mrr_currency: n.mrr_currency,
        channels: n.channels,
    }
}

fn parse_failure_message(error: &CoreError) -> String {
    match error {
        CoreError::DateParse(_) => "must be a date in DD/MM/YYYY or DD/MM/YYYY, HH:mm format".to_string(),
        CoreError::MoneyParse(_) => "must be a number".to_string(),
        other => other.user_message().to_string(),
    }
}

/// Export column for a [`Customer::new`] field name.
fn column_for(field: &str) -> &'static str {
    match field {
        "id" => columns::ID,
        "account owner" => columns::ACCOUNT_OWNER,
        "mrr" => columns::MRR,
        _ => columns::ID,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_store::JsonFileRepository;
    use crate::memory_store::InMemoryRepository;
    use crate::reader::read_records_from_str;
    use crate::test_support::{reference_calculator, row};
    use tempfile::TempDir;

    fn four_rows() -> Vec<RawRecord> {
        [("CUST-001", "2500"), ("CUST-002", "800"), ("CUST-003", "1500"), ("CUST-004", "3000")]
            .into_iter()
            .map(|(id, mrr)| row(&[(columns::ID, id), (columns::MRR, mrr)]))
            .collect()
    }

    fn import(repo: &mut dyn CustomerRepository, records: &[RawRecord]) -> ImportSummary {
        CustomerImporter::new(repo, reference_calculator()).execute(records)
    }

    // ── happy path ────────────────────────────────────────────────────────

    #[test]
    fn test_import_four_then_reimport() {
        let mut repo = InMemoryRepository::new();
        let first = import(&mut repo, &four_rows());
        assert_eq!(first.total_rows, 4);
        assert_eq!(first.imported_count, 4);
        assert_eq!(first.skipped_count, 0);
        assert_eq!(first.error_count, 0);

        let stats = repo.get_statistics(reference_calculator()).unwrap();
        assert_eq!(stats.total_customers, 4);
        assert!((stats.total_mrr - 7_800.0).abs() < 1e-9);

        let second = import(&mut repo, &four_rows());
        assert_eq!(second.imported_count, 0);
        assert_eq!(second.skipped_count, 4);
        assert_eq!(second.health_scores, first.health_scores);
        assert_eq!(repo.count().unwrap(), 4);
    }

    #[test]
    fn test_imported_fields_match_normalized_input() {
        let mut repo = InMemoryRepository::new();
        let record = row(&[
            (columns::ID, " CUST-042 "),
            (columns::LANGUAGES, "English; ;Swedish"),
            (columns::CHANNELS, "Booking.com;Airbnb"),
            (columns::MRR, "€1,250.50"),
            (columns::MRR_CURRENCY, "eur"),
            (columns::LATEST_LOGIN, "10/06/2024, 09:30"),
        ]);
        import(&mut repo, &[record]);

        let c = repo.get_by_id("CUST-042").unwrap();
        assert_eq!(c.languages(), ["English", "Swedish"]);
        assert_eq!(c.channels(), ["Booking.com", "Airbnb"]);
        assert_eq!(c.mrr().amount(), 1_250.5);
        assert_eq!(c.mrr().currency(), "EUR");
        assert_eq!(c.status(), CustomerStatus::Active);
        assert!(c.latest_login().is_some());
    }

    #[test]
    fn test_health_scores_in_row_order() {
        let mut repo = InMemoryRepository::new();
        let summary = import(&mut repo, &four_rows());
        let rows: Vec<usize> = summary.health_scores.iter().map(|h| h.row).collect();
        assert_eq!(rows, vec![2, 3, 4, 5]);
        let calc = reference_calculator();
        for h in &summary.health_scores {
            let c = repo.get_by_id(&h.customer_id).unwrap();
            assert_eq!(calc.score(&c), h.score);
            assert_eq!(h.classification, h.score.classification());
        }
    }

    // ── row errors ────────────────────────────────────────────────────────

    #[test]
    fn test_row_numbers_include_header() {
        let mut records = four_rows();
        records[2].insert(columns::CREATED_DATE, "yesterday");
        let mut repo = InMemoryRepository::new();
        let summary = import(&mut repo, &records);

        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.errors[0].row, 4);
        assert_eq!(summary.errors[0].field, columns::CREATED_DATE);
        assert_eq!(summary.imported_count, 3);
    }

    #[test]
    fn test_row_number_independent_of_other_rows() {
        let mut bad = four_rows()[0].clone();
        bad.insert(columns::STATUS, "");
        for position in 0..4 {
            let mut records = four_rows();
            records[position] = bad.clone();
            let summary = import(&mut InMemoryRepository::new(), &records);
            assert_eq!(summary.errors.len(), 1);
            assert_eq!(summary.errors[0].row, position + 2);
        }
    }

    #[test]
    fn test_required_fields() {
        for column in [columns::ID, columns::ACCOUNT_OWNER, columns::STATUS, columns::ACCOUNT_TYPE] {
            let mut record = four_rows().remove(0);
            record.insert(column, "  ");
            let err = validate_row(2, &record).unwrap_err();
            assert_eq!(err.field, column);
            assert_eq!(err.message, "is required");
        }
    }

    #[test]
    fn test_missing_created_date_is_required() {
        let mut record = four_rows().remove(0);
        record.insert(columns::CREATED_DATE, "");
        let err = validate_row(2, &record).unwrap_err();
        assert_eq!(err.field, columns::CREATED_DATE);
    }

    #[test]
    fn test_enumerated_values() {
        let mut record = four_rows().remove(0);
        record.insert(columns::STATUS, "Paused");
        assert_eq!(validate_row(2, &record).unwrap_err().field, columns::STATUS);

        let mut record = four_rows().remove(0);
        record.insert(columns::ACCOUNT_TYPE, "Enterprise");
        assert_eq!(validate_row(2, &record).unwrap_err().field, columns::ACCOUNT_TYPE);
    }

    #[test]
    fn test_negative_and_unparseable_mrr() {
        let mut record = four_rows().remove(0);
        record.insert(columns::MRR, "-100");
        let err = validate_row(2, &record).unwrap_err();
        assert_eq!(err.field, columns::MRR);

        let mut record = four_rows().remove(0);
        record.insert(columns::MRR, "lots");
        let err = validate_row(2, &record).unwrap_err();
        assert_eq!(err.field, columns::MRR);
        assert_eq!(err.message, "must be a number");
    }

    #[test]
    fn test_empty_batch() {
        let summary = import(&mut InMemoryRepository::new(), &[]);
        assert_eq!(summary, ImportSummary::default());
    }

    // ── sanitizing ────────────────────────────────────────────────────────

    #[test]
    fn test_sanitizer_warnings_use_file_rows() {
        let mut records = four_rows();
        records[1].insert(columns::ACCOUNT_NAME, "=HYPERLINK(\"x\")");
        let mut repo = InMemoryRepository::new();
        let summary = import(&mut repo, &records);

        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].starts_with("Row 3: Account Name: "));
        let stored = repo.get_by_id("CUST-002").unwrap();
        assert!(stored.account_name().starts_with("&#x27;="));
    }

    #[test]
    fn test_decimal_comma_in_mrr_warns() {
        let mut records = four_rows();
        records[2].insert(columns::MRR, "1.250,50");
        let mut repo = InMemoryRepository::new();
        let summary = import(&mut repo, &records);

        assert_eq!(summary.error_count, 0);
        assert_eq!(summary.warnings.len(), 1, "{:?}", summary.warnings);
        assert!(summary.warnings[0].starts_with("Row 4: MRR (converted): "));
        assert_eq!(repo.get_by_id("CUST-003").unwrap().mrr().amount(), 1.2505);
    }

    #[test]
    fn test_thousands_separator_does_not_warn() {
        let records = vec![row(&[(columns::MRR, "€1,250.50")])];
        let summary = import(&mut InMemoryRepository::new(), &records);
        assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
    }

    #[test]
    fn test_blank_lines_do_not_advance_row_numbers() {
        let mut text = columns::ALL.join(",");
        text.push_str("\nC1,Anna Berg,Hotel Nordlys,,01/01/2023,,Sweden,Pro,English,Active,Active,Hotel,EUR,1000,");
        text.push_str("\n\n");
        text.push_str("\nC2,Anna Berg,Hotel Nordlys,,01/01/2023,,Sweden,Pro,English,Unknown,Active,Hotel,EUR,1000,");
        let records = read_records_from_str(&text, ',').unwrap();
        assert_eq!(records.len(), 2);

        let summary = import(&mut InMemoryRepository::new(), &records);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].row, 3);
        assert_eq!(summary.errors[0].field, columns::STATUS);
    }

    // ── duplicates and storage ────────────────────────────────────────────

    #[test]
    fn test_duplicate_ids_in_batch_later_wins() {
        let records = vec![
            row(&[(columns::ID, "C1"), (columns::MRR, "100")]),
            row(&[(columns::ID, "C1"), (columns::MRR, "200")]),
        ];
        let mut repo = InMemoryRepository::new();
        let summary = import(&mut repo, &records);
        assert_eq!(summary.imported_count, 1);
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(repo.get_by_id("C1").unwrap().mrr().amount(), 200.0);
    }

    #[test]
    fn test_storage_failure_reports_zero_imported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("customers.json");
        let mut repo = JsonFileRepository::open(&path).unwrap();
        // Block the rename by putting a directory where the file goes.
        std::fs::create_dir_all(&path).unwrap();

        let summary = import(&mut repo, &four_rows());
        assert_eq!(summary.imported_count, 0);
        assert_eq!(summary.skipped_count, 0);
        assert_eq!(summary.storage_error, Some(ErrorCode::StorageUnavailable));
        assert_eq!(summary.valid_count(), 4);
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_summary_json_is_deterministic() {
        let a = import(&mut InMemoryRepository::new(), &four_rows());
        let b = import(&mut InMemoryRepository::new(), &four_rows());
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
