//! Roster-wide statistics, recomputed from the full customer list on every
//! call. Nothing here is cached or persisted.

use std::collections::{BTreeMap, HashMap};

use health_core::formatting::percentage;
use health_core::health::{HealthClassification, HealthScoreCalculator};
use health_core::models::{AccountType, Customer};
use serde::{Deserialize, Serialize};

/// Country bucket for customers with a blank billing country.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

// ── CustomerStatistics ────────────────────────────────────────────────────────

/// Headline numbers for the whole roster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerStatistics {
    pub total_customers: usize,
    pub active_customers: usize,
    pub inactive_customers: usize,
    pub pro_customers: usize,
    pub starter_customers: usize,
    /// Sum of every customer's MRR amount. The export's MRR column is
    /// already converted to one reporting currency, so amounts are summed
    /// as-is; see `mrr_by_currency` for the split by declared currency.
    pub total_mrr: f64,
    /// `total_mrr / total_customers`, `0` for an empty roster.
    pub average_mrr: f64,
    /// Mean health score, rounded to one decimal. `0` for an empty roster.
    pub average_health_score: f64,
    pub mrr_by_currency: BTreeMap<String, f64>,
}

// ── HealthDistribution ────────────────────────────────────────────────────────

/// How many customers fall into each health classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthDistribution {
    pub healthy: usize,
    pub at_risk: usize,
    pub critical: usize,
}

impl HealthDistribution {
    pub fn total(&self) -> usize {
        self.healthy + self.at_risk + self.critical
    }

    pub fn count(&self, classification: HealthClassification) -> usize {
        match classification {
            HealthClassification::Healthy => self.healthy,
            HealthClassification::AtRisk => self.at_risk,
            HealthClassification::Critical => self.critical,
        }
    }

    /// Share of the roster in `classification`, in percent with one decimal.
    pub fn percentage(&self, classification: HealthClassification) -> f64 {
        percentage(self.count(classification) as f64, self.total() as f64, 1)
    }

    fn add(&mut self, classification: HealthClassification) {
        match classification {
            HealthClassification::Healthy => self.healthy += 1,
            HealthClassification::AtRisk => self.at_risk += 1,
            HealthClassification::Critical => self.critical += 1,
        }
    }
}

// ── MrrByCountry ──────────────────────────────────────────────────────────────

/// MRR total for one billing country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MrrByCountry {
    pub country: String,
    pub total_mrr: f64,
    pub customer_count: usize,
}

// ── CustomerAggregator ────────────────────────────────────────────────────────

/// Stateless helper that folds a customer list into the aggregates above.
pub struct CustomerAggregator;

impl CustomerAggregator {
    pub fn statistics(
        customers: &[Customer],
        calculator: HealthScoreCalculator,
    ) -> CustomerStatistics {
        let mut stats = CustomerStatistics {
            total_customers: customers.len(),
            ..Default::default()
        };
        let mut score_sum: u64 = 0;

        for customer in customers {
            if customer.is_active() {
                stats.active_customers += 1;
            } else {
                stats.inactive_customers += 1;
            }
            match customer.account_type() {
                AccountType::Pro => stats.pro_customers += 1,
                AccountType::Starter => stats.starter_customers += 1,
            }

            let mrr = customer.mrr();
            stats.total_mrr += mrr.amount();
            *stats
                .mrr_by_currency
                .entry(mrr.currency().to_string())
                .or_default() += mrr.amount();

            score_sum += u64::from(calculator.score(customer).value());
        }

        if !customers.is_empty() {
            let n = customers.len() as f64;
            stats.average_mrr = stats.total_mrr / n;
            stats.average_health_score = (score_sum as f64 / n * 10.0).round() / 10.0;
        }

        stats
    }

    pub fn health_distribution(
        customers: &[Customer],
        calculator: HealthScoreCalculator,
    ) -> HealthDistribution {
        let mut distribution = HealthDistribution::default();
        for customer in customers {
            distribution.add(calculator.score(customer).classification());
        }
        distribution
    }

    /// MRR per billing country, largest total first, ties by country name.
    ///
    /// Country names are grouped exactly as stored; blank countries are
    /// reported as [`UNKNOWN_COUNTRY`].
    pub fn mrr_by_country(customers: &[Customer]) -> Vec<MrrByCountry> {
        let mut map: HashMap<&str, MrrByCountry> = HashMap::new();

        for customer in customers {
            let country = match customer.billing_country() {
                "" => UNKNOWN_COUNTRY,
                c => c,
            };
            let bucket = map.entry(country).or_insert_with(|| MrrByCountry {
                country: country.to_string(),
                total_mrr: 0.0,
                customer_count: 0,
            });
            bucket.total_mrr += customer.mrr().amount();
            bucket.customer_count += 1;
        }

        let mut rows: Vec<MrrByCountry> = map.into_values().collect();
        rows.sort_by(|a, b| {
            b.total_mrr
                .total_cmp(&a.total_mrr)
                .then_with(|| a.country.cmp(&b.country))
        });
        rows
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
