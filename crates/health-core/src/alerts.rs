//! Rules that turn a change in a customer's health score into alerts.
//!
//! The rules are pure. Persisting snapshots, numbering alerts and tracking
//! acknowledgement belong to the score-history store in `health-data`.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::health::{HealthScore, AT_RISK_THRESHOLD};

// ── Thresholds ────────────────────────────────────────────────────────────────

/// A fall of at least this many points raises [`AlertKind::CriticalDrop`].
pub const CRITICAL_DROP_POINTS: u8 = 15;

/// More than this many days without a login raises [`AlertKind::Inactive30d`].
pub const INACTIVITY_DAYS: i64 = 30;

// ── AlertKind ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    #[serde(rename = "critical_drop")]
    CriticalDrop,
    #[serde(rename = "recovered")]
    Recovered,
    #[serde(rename = "inactive_30d")]
    Inactive30d,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::CriticalDrop => "critical_drop",
            AlertKind::Recovered => "recovered",
            AlertKind::Inactive30d => "inactive_30d",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "critical_drop" => Ok(AlertKind::CriticalDrop),
            "recovered" => Ok(AlertKind::Recovered),
            "inactive_30d" => Ok(AlertKind::Inactive30d),
            other => Err(CoreError::validation(
                "alert kind",
                format!("unknown alert kind '{other}'"),
            )),
        }
    }
}

// ── ScoreSnapshot ─────────────────────────────────────────────────────────────

/// A customer's score at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub customer_id: String,
    pub score: HealthScore,
    pub recorded_at: NaiveDateTime,
}

// ── AlertEvent / Alert ────────────────────────────────────────────────────────

/// An alert produced by [`AlertGenerator::evaluate`] before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertEvent {
    pub customer_id: String,
    pub kind: AlertKind,
    pub previous_score: Option<HealthScore>,
    pub current_score: HealthScore,
    pub message: String,
    pub created_at: NaiveDateTime,
}

/// A stored alert. Alerts are append-only; only `acknowledged` ever changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub customer_id: String,
    pub kind: AlertKind,
    pub previous_score: Option<HealthScore>,
    pub current_score: HealthScore,
    pub message: String,
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub acknowledged: bool,
}

impl Alert {
    /// Store `event` under `id`, unacknowledged.
    pub fn from_event(id: u64, event: AlertEvent) -> Self {
        Self {
            id,
            customer_id: event.customer_id,
            kind: event.kind,
            previous_score: event.previous_score,
            current_score: event.current_score,
            message: event.message,
            created_at: event.created_at,
            acknowledged: false,
        }
    }
}

// ── AlertGenerator ────────────────────────────────────────────────────────────

/// Compares a new score with the previous one.
///
/// `created_at` of every event is the generator's reference time, so a batch
/// evaluated with one generator is stamped consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertGenerator {
    now: NaiveDateTime,
}

impl AlertGenerator {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now }
    }

    /// Alerts for one customer.
    ///
    /// * `previous` is the snapshot before the current one, `None` on the
    ///   first import.
    /// * `days_since_login` is `None` when the customer never logged in,
    ///   which counts as inactive.
    ///
    /// A drop and a recovery cannot both fire; inactivity is independent of
    /// either.
    pub fn evaluate(
        &self,
        customer_id: &str,
        previous: Option<HealthScore>,
        current: HealthScore,
        days_since_login: Option<i64>,
    ) -> Vec<AlertEvent> {
        let mut events = Vec::new();

        if let Some(prev) = previous {
            let drop = i16::from(prev.value()) - i16::from(current.value());
            if drop >= i16::from(CRITICAL_DROP_POINTS) {
                events.push(self.event(
                    customer_id,
                    AlertKind::CriticalDrop,
                    previous,
                    current,
                    format!(
                        "Health score dropped by {drop} points ({} → {})",
                        prev.value(),
                        current.value()
                    ),
                ));
            } else if prev.value() < AT_RISK_THRESHOLD && current.value() >= AT_RISK_THRESHOLD {
                events.push(self.event(
                    customer_id,
                    AlertKind::Recovered,
                    previous,
                    current,
                    format!(
                        "Health score recovered from critical ({} → {})",
                        prev.value(),
                        current.value()
                    ),
                ));
            }
        }

        let inactive_message = match days_since_login {
            None => Some("Customer has never logged in".to_string()),
            Some(days) if days > INACTIVITY_DAYS => {
                Some(format!("No login for {days} days"))
            }
            Some(_) => None,
        };
        if let Some(message) = inactive_message {
            events.push(self.event(
                customer_id,
                AlertKind::Inactive30d,
                previous,
                current,
                message,
            ));
        }

        events
    }

    fn event(
        &self,
        customer_id: &str,
        kind: AlertKind,
        previous_score: Option<HealthScore>,
        current_score: HealthScore,
        message: String,
    ) -> AlertEvent {
        AlertEvent {
            customer_id: customer_id.to_string(),
            kind,
            previous_score,
            current_score,
            message,
            created_at: self.now,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
