use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::models::{AccountType, Customer, CustomerStatus};

// ── Factor weights ────────────────────────────────────────────────────────────

pub const ACTIVITY_MAX_POINTS: u8 = 30;
pub const LOGIN_RECENCY_MAX_POINTS: u8 = 25;
pub const CHANNEL_ADOPTION_MAX_POINTS: u8 = 20;
pub const ACCOUNT_TYPE_MAX_POINTS: u8 = 15;
pub const MRR_VALUE_MAX_POINTS: u8 = 10;

/// Points per distinct channel before the cap applies.
const POINTS_PER_CHANNEL: usize = 5;
const STARTER_POINTS: u8 = 8;

/// `(max days since last login, points)`, checked in order.
const LOGIN_RECENCY_STEPS: &[(i64, u8)] = &[(7, 25), (14, 20), (30, 15), (60, 10), (90, 5)];

/// `(min MRR amount, points)`, checked in order.
const MRR_STEPS: &[(f64, u8)] = &[(3_000.0, 10), (2_000.0, 8), (1_000.0, 6), (500.0, 4)];

pub const HEALTHY_THRESHOLD: u8 = 70;
pub const AT_RISK_THRESHOLD: u8 = 30;

// ── HealthScore ───────────────────────────────────────────────────────────────

/// An integer health score in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "u8")]
pub struct HealthScore(u8);

impl HealthScore {
    /// Round `value` to the nearest integer score.
    ///
    /// NaN and anything outside `0..=100` is rejected.
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || !(0.0..=100.0).contains(&value) {
            return Err(CoreError::InvalidScore(format!("{value}")));
        }
        Ok(Self(value.round() as u8))
    }

    /// Clamp an arbitrary point total into range.
    fn clamped(points: i64) -> Self {
        Self(points.clamp(0, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn classification(self) -> HealthClassification {
        HealthClassification::from_score(self.0)
    }
}

impl TryFrom<f64> for HealthScore {
    type Error = CoreError;

    fn try_from(value: f64) -> Result<Self> {
        HealthScore::new(value)
    }
}

impl From<HealthScore> for u8 {
    fn from(score: HealthScore) -> u8 {
        score.0
    }
}

impl fmt::Display for HealthScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── HealthClassification ──────────────────────────────────────────────────────

/// Banding of a health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthClassification {
    /// 70 and above.
    Healthy,
    /// 30 to 69.
    AtRisk,
    /// Below 30.
    Critical,
}

impl HealthClassification {
    pub fn from_score(score: u8) -> Self {
        if score >= HEALTHY_THRESHOLD {
            HealthClassification::Healthy
        } else if score >= AT_RISK_THRESHOLD {
            HealthClassification::AtRisk
        } else {
            HealthClassification::Critical
        }
    }

    /// Export label: `Healthy`, `At Risk` or `Critical`.
    pub fn label(self) -> &'static str {
        match self {
            HealthClassification::Healthy => "Healthy",
            HealthClassification::AtRisk => "At Risk",
            HealthClassification::Critical => "Critical",
        }
    }
}

impl FromStr for HealthClassification {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "healthy" => Ok(HealthClassification::Healthy),
            "at risk" => Ok(HealthClassification::AtRisk),
            "critical" => Ok(HealthClassification::Critical),
            other => Err(CoreError::validation(
                "health",
                format!("unknown classification '{other}'"),
            )),
        }
    }
}

// ── HealthInputs ──────────────────────────────────────────────────────────────

/// The facts the calculator needs from an account.
pub trait HealthInputs {
    fn status(&self) -> CustomerStatus;
    /// `None` when the account never logged in.
    fn latest_login(&self) -> Option<NaiveDateTime>;
    fn distinct_channel_count(&self) -> usize;
    fn account_type(&self) -> AccountType;
    fn mrr_amount(&self) -> f64;
}

impl HealthInputs for Customer {
    fn status(&self) -> CustomerStatus {
        self.status()
    }

    fn latest_login(&self) -> Option<NaiveDateTime> {
        self.latest_login()
    }

    fn distinct_channel_count(&self) -> usize {
        self.distinct_channel_count()
    }

    fn account_type(&self) -> AccountType {
        self.account_type()
    }

    fn mrr_amount(&self) -> f64 {
        self.mrr().amount()
    }
}

// ── HealthBreakdown ───────────────────────────────────────────────────────────

/// Per-factor points of one score. The five factors always sum to `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthBreakdown {
    pub activity: u8,
    pub login_recency: u8,
    pub channel_adoption: u8,
    pub account_type: u8,
    pub mrr_value: u8,
    pub total: HealthScore,
}

impl HealthBreakdown {
    pub fn classification(&self) -> HealthClassification {
        self.total.classification()
    }

    /// Sum of the five factor contributions.
    pub fn factor_sum(&self) -> u32 {
        [
            self.activity,
            self.login_recency,
            self.channel_adoption,
            self.account_type,
            self.mrr_value,
        ]
        .iter()
        .map(|&p| u32::from(p))
        .sum()
    }
}

// ── HealthScoreCalculator ─────────────────────────────────────────────────────

/// Stateless five-factor scorer.
///
/// Login recency is measured against `reference`, which makes every result
/// reproducible for a fixed reference time. Construct once and pass by value
/// to whatever needs scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthScoreCalculator {
    reference: NaiveDateTime,
}

impl Default for HealthScoreCalculator {
    fn default() -> Self {
        Self::now()
    }
}

impl HealthScoreCalculator {
    pub fn new(reference: NaiveDateTime) -> Self {
        Self { reference }
    }

    /// Calculator anchored at the current UTC time.
    pub fn now() -> Self {
        Self::new(Utc::now().naive_utc())
    }

    pub fn reference(&self) -> NaiveDateTime {
        self.reference
    }

    /// Full per-factor breakdown for `inputs`.
    pub fn calculate<C: HealthInputs + ?Sized>(&self, inputs: &C) -> HealthBreakdown {
        let activity = Self::activity_points(inputs.status());
        let login_recency = self.login_recency_points(inputs.latest_login());
        let channel_adoption = Self::channel_points(inputs.distinct_channel_count());
        let account_type = Self::account_type_points(inputs.account_type());
        let mrr_value = Self::mrr_points(inputs.mrr_amount());

        let sum = i64::from(activity)
            + i64::from(login_recency)
            + i64::from(channel_adoption)
            + i64::from(account_type)
            + i64::from(mrr_value);

        HealthBreakdown {
            activity,
            login_recency,
            channel_adoption,
            account_type,
            mrr_value,
            total: HealthScore::clamped(sum),
        }
    }

    /// Shorthand for `calculate(inputs).total`.
    pub fn score<C: HealthInputs + ?Sized>(&self, inputs: &C) -> HealthScore {
        self.calculate(inputs).total
    }

    /// Whole days between `latest_login` and the reference time, never
    /// negative. `None` when there is no login.
    pub fn days_since_login(&self, latest_login: Option<NaiveDateTime>) -> Option<i64> {
        latest_login.map(|login| (self.reference - login).num_days().max(0))
    }

    fn activity_points(status: CustomerStatus) -> u8 {
        match status {
            CustomerStatus::Active => ACTIVITY_MAX_POINTS,
            CustomerStatus::Inactive => 0,
        }
    }

    fn login_recency_points(&self, latest_login: Option<NaiveDateTime>) -> u8 {
        let Some(days) = self.days_since_login(latest_login) else {
            return 0;
        };
        LOGIN_RECENCY_STEPS
            .iter()
            .find(|(max_days, _)| days <= *max_days)
            .map(|(_, points)| *points)
            .unwrap_or(0)
    }

    fn channel_points(distinct_channels: usize) -> u8 {
        let points = distinct_channels.saturating_mul(POINTS_PER_CHANNEL);
        points.min(usize::from(CHANNEL_ADOPTION_MAX_POINTS)) as u8
    }

    fn account_type_points(account_type: AccountType) -> u8 {
        match account_type {
            AccountType::Pro => ACCOUNT_TYPE_MAX_POINTS,
            AccountType::Starter => STARTER_POINTS,
        }
    }

    fn mrr_points(amount: f64) -> u8 {
        if amount <= 0.0 || amount.is_nan() {
            return 0;
        }
        MRR_STEPS
            .iter()
            .find(|(min, _)| amount >= *min)
            .map(|(_, points)| *points)
            .unwrap_or(2)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
