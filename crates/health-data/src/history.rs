//! Score snapshots and the alert log.
//!
//! Snapshots are append-only. Alerts are append-only too; the only change an
//! alert ever sees is being acknowledged. Ids are issued sequentially from 1
//! and never reused.
//!
//! The store lives in memory and, when opened on a path, is rewritten to a
//! JSON file after every change (temp file + rename).

use std::path::{Path, PathBuf};

use health_core::alerts::{Alert, AlertEvent, ScoreSnapshot};
use health_core::error::{CoreError, Result};
use health_core::health::HealthScore;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HistoryData {
    #[serde(default)]
    snapshots: Vec<ScoreSnapshot>,
    #[serde(default)]
    alerts: Vec<Alert>,
    #[serde(default)]
    last_alert_id: u64,
}

pub struct ScoreHistoryStore {
    path: Option<PathBuf>,
    data: HistoryData,
}

impl ScoreHistoryStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: HistoryData::default(),
        }
    }

    /// Open the store at `path`; a missing file is an empty history.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| CoreError::FileRead {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&content)?
        } else {
            HistoryData::default()
        };
        debug!(
            snapshots = data.snapshots.len(),
            alerts = data.alerts.len(),
            "opened score history"
        );
        Ok(Self {
            path: Some(path),
            data,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ── Snapshots ─────────────────────────────────────────────────────────────

    /// Append `snapshots` in one write.
    pub fn record_snapshots(&mut self, snapshots: Vec<ScoreSnapshot>) -> Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }
        self.write_through(|data| {
            data.snapshots.extend(snapshots);
        })
    }

    /// Up to `limit` snapshots for `customer_id`, most recent first.
    ///
    /// Snapshots with equal timestamps keep the order they were recorded in,
    /// later first.
    pub fn recent(&self, customer_id: &str, limit: usize) -> Vec<ScoreSnapshot> {
        let mut matching: Vec<(usize, &ScoreSnapshot)> = self
            .data
            .snapshots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.customer_id == customer_id)
            .collect();
        matching.sort_by(|(ia, a), (ib, b)| b.recorded_at.cmp(&a.recorded_at).then(ib.cmp(ia)));
        matching
            .into_iter()
            .take(limit)
            .map(|(_, s)| s.clone())
            .collect()
    }

    /// The score recorded before the most recent one, if any.
    pub fn previous_score(&self, customer_id: &str) -> Option<HealthScore> {
        self.recent(customer_id, 2).get(1).map(|s| s.score)
    }

    // ── Alerts ────────────────────────────────────────────────────────────────

    /// Store `events` as unacknowledged alerts with fresh ids.
    pub fn append_alerts(&mut self, events: Vec<AlertEvent>) -> Result<Vec<Alert>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        self.write_through(|data| {
            let mut added = Vec::with_capacity(events.len());
            for event in events {
                data.last_alert_id += 1;
                let alert = Alert::from_event(data.last_alert_id, event);
                data.alerts.push(alert.clone());
                added.push(alert);
            }
            added
        })
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.data.alerts
    }

    pub fn unacknowledged(&self) -> Vec<&Alert> {
        self.data.alerts.iter().filter(|a| !a.acknowledged).collect()
    }

    /// Mark alert `id` as acknowledged. Acknowledging twice is a no-op.
    pub fn acknowledge(&mut self, id: u64) -> Result<()> {
        let Some(index) = self.data.alerts.iter().position(|a| a.id == id) else {
            return Err(CoreError::AlertNotFound(id));
        };
        if self.data.alerts[index].acknowledged {
            return Ok(());
        }
        self.write_through(|data| data.alerts[index].acknowledged = true)
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    fn write_through<T>(&mut self, change: impl FnOnce(&mut HistoryData) -> T) -> Result<T> {
        let mut next = self.data.clone();
        let value = change(&mut next);
        if let Some(path) = &self.path {
            if let Err(e) = save(path, &next) {
                error!(path = %path.display(), error = %e, "failed to persist score history");
                return Err(CoreError::Storage(format!("{}: {}", path.display(), e)));
            }
        }
        self.data = next;
        Ok(value)
    }
}

fn save(path: &Path, data: &HistoryData) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(data).map_err(std::io::Error::other)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
