//! Async watch loop.
//!
//! Polls a [`RosterSource`] in a tokio task, re-imports through the
//! [`ImportPipeline`] whenever the export changes, and sends an
//! [`ImportSnapshot`] per import through an `mpsc` channel. The task owns its
//! repository and history, so imports never overlap.

use std::time::Duration;

use health_core::alerts::Alert;
use health_core::error::ErrorCode;
use health_core::health::HealthScoreCalculator;
use health_data::aggregator::CustomerStatistics;
use health_data::history::ScoreHistoryStore;
use health_data::importer::ImportSummary;
use health_data::repository::CustomerRepository;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time;

use crate::pipeline::ImportPipeline;
use crate::roster_source::RosterSource;

// ── Public types ──────────────────────────────────────────────────────────────

/// What one watched import produced, plus the roster totals after it.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSnapshot {
    pub summary: ImportSummary,
    pub alerts: Vec<Alert>,
    pub statistics: CustomerStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_error: Option<ErrorCode>,
}

// ── WatchOrchestrator ─────────────────────────────────────────────────────────

/// Background re-import coordinator.
///
/// Call [`WatchOrchestrator::start`] to run the loop in its own tokio task
/// and receive [`ImportSnapshot`] updates.
pub struct WatchOrchestrator {
    /// How often the export is checked for changes.
    update_interval: Duration,
    source: RosterSource,
    repository: Box<dyn CustomerRepository>,
    history: ScoreHistoryStore,
}

impl WatchOrchestrator {
    pub fn new(
        update_interval: Duration,
        source: RosterSource,
        repository: Box<dyn CustomerRepository>,
        history: ScoreHistoryStore,
    ) -> Self {
        Self {
            update_interval,
            source,
            repository,
            history,
        }
    }

    /// Spawn the watch loop. The loop ends when the receiver is dropped or
    /// the returned handle is aborted.
    pub fn start(self) -> (mpsc::Receiver<ImportSnapshot>, WatchHandle) {
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(async move {
            self.watch_loop(tx).await;
        });

        (rx, WatchHandle { handle })
    }

    // ── Private implementation ────────────────────────────────────────────

    /// Imports immediately on startup, then checks on every interval tick.
    async fn watch_loop(mut self, tx: mpsc::Sender<ImportSnapshot>) {
        tracing::info!(
            path = %self.source.path().display(),
            interval_ms = self.update_interval.as_millis() as u64,
            "watching roster export"
        );
        self.import_if_changed(&tx).await;

        let mut interval = time::interval(self.update_interval);
        // The first tick fires immediately; the startup import covered it.
        interval.tick().await;

        loop {
            interval.tick().await;

            if tx.is_closed() {
                tracing::debug!("watch channel closed; exiting loop");
                break;
            }

            self.import_if_changed(&tx).await;
        }
    }

    async fn import_if_changed(&mut self, tx: &mpsc::Sender<ImportSnapshot>) {
        let Some(records) = self.source.poll_changed().map(<[_]>::to_vec) else {
            tracing::debug!("roster unchanged or unreadable; nothing to import");
            return;
        };

        let calculator = HealthScoreCalculator::now();
        let outcome =
            ImportPipeline::new(self.repository.as_mut(), &mut self.history, calculator)
                .execute(&records);

        let statistics = match self.repository.get_statistics(calculator) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to compute statistics; skipping send");
                return;
            }
        };

        let snapshot = ImportSnapshot {
            summary: outcome.summary,
            alerts: outcome.alerts,
            statistics,
            history_error: outcome.history_error,
        };

        if let Err(e) = tx.send(snapshot).await {
            tracing::warn!(error = %e, "failed to send import snapshot; receiver dropped");
        }
    }
}

// ── WatchHandle ───────────────────────────────────────────────────────────────

/// Handle to the background watch task.
pub struct WatchHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Stop the watch loop immediately.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
