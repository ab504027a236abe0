//! Storage-backed import: validate and store, then record scores and raise
//! alerts.
//!
//! The pipeline runs the importer, appends one score snapshot per accepted
//! customer and compares each new score with the one recorded before it. A
//! failed bulk write stops the batch before any history is touched.

use std::collections::HashSet;

use health_core::alerts::{Alert, AlertEvent, AlertGenerator, ScoreSnapshot};
use health_core::error::{ErrorCode, Result};
use health_core::health::HealthScoreCalculator;
use health_core::models::RawRecord;
use health_data::history::ScoreHistoryStore;
use health_data::importer::{CustomerHealth, CustomerImporter, ImportSummary};
use health_data::repository::CustomerRepository;
use serde::Serialize;
use tracing::{error, info, warn};

// ── Public types ──────────────────────────────────────────────────────────────

/// Result of one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportOutcome {
    pub summary: ImportSummary,
    /// Alerts raised by this batch, already stored with their ids.
    pub alerts: Vec<Alert>,
    /// Set when the snapshots or alerts could not be persisted. The customers
    /// themselves were stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_error: Option<ErrorCode>,
}

// ── ImportPipeline ────────────────────────────────────────────────────────────

/// Import use case wired to a repository and a score history.
///
/// Both stores are borrowed for the duration of the run; the calculator's
/// reference time stamps every snapshot and alert of the batch.
pub struct ImportPipeline<'a> {
    repository: &'a mut dyn CustomerRepository,
    history: &'a mut ScoreHistoryStore,
    calculator: HealthScoreCalculator,
}

impl<'a> ImportPipeline<'a> {
    pub fn new(
        repository: &'a mut dyn CustomerRepository,
        history: &'a mut ScoreHistoryStore,
        calculator: HealthScoreCalculator,
    ) -> Self {
        Self {
            repository,
            history,
            calculator,
        }
    }

    /// Run the full import for `records`.
    ///
    /// 1. Validate and bulk-store through [`CustomerImporter`].
    /// 2. Stop here if the bulk write failed.
    /// 3. Append one snapshot per accepted customer id.
    /// 4. Evaluate alert rules against each customer's previous snapshot.
    /// 5. Append the resulting alerts.
    pub fn execute(&mut self, records: &[RawRecord]) -> ImportOutcome {
        let summary = CustomerImporter::new(&mut *self.repository, self.calculator).execute(records);
        let mut outcome = ImportOutcome {
            summary,
            ..Default::default()
        };

        if outcome.summary.is_storage_failure() {
            warn!("skipping score history and alerts after failed bulk write");
            return outcome;
        }

        let latest = latest_per_customer(&outcome.summary.health_scores);
        match self.record_and_alert(&latest) {
            Ok(alerts) => outcome.alerts = alerts,
            Err(e) => {
                error!(error = %e, "failed to persist score history");
                outcome.history_error = Some(e.code());
            }
        }

        info!(
            customers = latest.len(),
            alerts = outcome.alerts.len(),
            "score history updated"
        );
        outcome
    }

    fn record_and_alert(&mut self, latest: &[&CustomerHealth]) -> Result<Vec<Alert>> {
        let recorded_at = self.calculator.reference();
        let snapshots = latest
            .iter()
            .map(|h| ScoreSnapshot {
                customer_id: h.customer_id.clone(),
                score: h.score,
                recorded_at,
            })
            .collect();
        self.history.record_snapshots(snapshots)?;

        let generator = AlertGenerator::new(recorded_at);
        let mut events: Vec<AlertEvent> = Vec::new();
        for health in latest {
            let customer = match self.repository.get_by_id(&health.customer_id) {
                Ok(c) => c,
                Err(e) => {
                    warn!(id = %health.customer_id, error = %e, "stored customer missing; no alerts");
                    continue;
                }
            };
            let previous = self.history.previous_score(&health.customer_id);
            let days = self.calculator.days_since_login(customer.latest_login());
            events.extend(generator.evaluate(&health.customer_id, previous, health.score, days));
        }

        self.history.append_alerts(events)
    }
}

/// One entry per customer id, keeping the last row for repeated ids, in the
/// order those last rows appear.
fn latest_per_customer(scores: &[CustomerHealth]) -> Vec<&CustomerHealth> {
    let mut seen = HashSet::new();
    let mut latest: Vec<&CustomerHealth> = scores
        .iter()
        .rev()
        .filter(|h| seen.insert(h.customer_id.as_str()))
        .collect();
    latest.reverse();
    latest
}

// ── Tests ─────────────────────────────────────────────────────────────────────
