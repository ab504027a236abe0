//! The customer repository contract and the search shared by every
//! implementation.
//!
//! Reads and aggregates are full scans of the live collection. Writes are
//! whole-batch: an implementation either applies every customer of an
//! `add_many` call or none of them.

use health_core::error::Result;
use health_core::health::{HealthClassification, HealthScoreCalculator};
use health_core::models::{AccountType, Customer, CustomerStatus};
use health_core::sanitizer::escape_html;
use serde::Serialize;

use crate::aggregator::{CustomerAggregator, CustomerStatistics, HealthDistribution, MrrByCountry};

// ── UpsertOutcome ─────────────────────────────────────────────────────────────

/// Result of a bulk upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    /// Ids that were not stored before the call.
    pub inserted: usize,
    /// Customers that replaced an existing record, including an earlier
    /// customer with the same id in the same batch.
    pub skipped: usize,
}

// ── SearchCriteria ────────────────────────────────────────────────────────────

/// Conjunctive customer filters plus pagination.
///
/// Text filters are compared case-insensitively against the stored
/// (HTML-escaped) values, so they are escaped the same way before matching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    /// Substring of id or account owner. Account names are not searched.
    pub query: Option<String>,
    pub status: Option<CustomerStatus>,
    /// Exact billing country.
    pub country: Option<String>,
    pub account_type: Option<AccountType>,
    /// Matches customers speaking at least one of these.
    pub languages: Vec<String>,
    /// Matches customers on at least one of these.
    pub channels: Vec<String>,
    pub health: Option<HealthClassification>,
    pub offset: usize,
    pub limit: Option<usize>,
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub customers: Vec<Customer>,
    /// Number of matches before pagination.
    pub total_count: usize,
}

// ── CustomerRepository ────────────────────────────────────────────────────────

/// Upsert-keyed customer collection, keyed by id.
///
/// Callers hold the repository as `&dyn CustomerRepository` / `&mut dyn …`
/// and never need to know which implementation is behind it.
pub trait CustomerRepository: Send {
    /// Every customer, ordered by id.
    fn get_all(&self) -> Result<Vec<Customer>>;

    /// Fails with `CustomerNotFound` for an unknown id.
    fn get_by_id(&self, id: &str) -> Result<Customer>;

    fn count(&self) -> Result<usize>;

    /// Store one new customer. Fails with `DuplicateCustomer`, leaving the
    /// collection unchanged, when the id already exists.
    fn add(&mut self, customer: Customer) -> Result<()>;

    /// Insert or replace every customer. Later entries win on duplicate ids.
    fn add_many(&mut self, customers: Vec<Customer>) -> Result<UpsertOutcome>;

    fn clear(&mut self) -> Result<()>;

    fn search(
        &self,
        criteria: &SearchCriteria,
        calculator: HealthScoreCalculator,
    ) -> Result<SearchResult> {
        Ok(search_customers(self.get_all()?, criteria, calculator))
    }

    fn get_statistics(&self, calculator: HealthScoreCalculator) -> Result<CustomerStatistics> {
        Ok(CustomerAggregator::statistics(&self.get_all()?, calculator))
    }

    fn get_health_distribution(
        &self,
        calculator: HealthScoreCalculator,
    ) -> Result<HealthDistribution> {
        Ok(CustomerAggregator::health_distribution(
            &self.get_all()?,
            calculator,
        ))
    }

    fn get_mrr_by_country(&self) -> Result<Vec<MrrByCountry>> {
        Ok(CustomerAggregator::mrr_by_country(&self.get_all()?))
    }
}

// ── Search ────────────────────────────────────────────────────────────────────

/// Apply `criteria` to `customers`.
///
/// Filters run in a fixed order (text, status, country, account type,
/// language, channel, health) and pagination is applied last, so
/// `total_count` is the number of matches before `offset`/`limit`.
pub fn search_customers(
    customers: Vec<Customer>,
    criteria: &SearchCriteria,
    calculator: HealthScoreCalculator,
) -> SearchResult {
    let query = criteria.query.as_deref().map(normalise_needle);
    let country = criteria.country.as_deref().map(normalise_needle);
    let languages: Vec<String> = criteria.languages.iter().map(|l| normalise_needle(l)).collect();
    let channels: Vec<String> = criteria.channels.iter().map(|c| normalise_needle(c)).collect();

    let matches: Vec<Customer> = customers
        .into_iter()
        .filter(|c| match &query {
            Some(q) if !q.is_empty() => [c.id(), c.account_owner()]
                .iter()
                .any(|field| field.to_lowercase().contains(q.as_str())),
            _ => true,
        })
        .filter(|c| criteria.status.map_or(true, |s| c.status() == s))
        .filter(|c| {
            country
                .as_deref()
                .map_or(true, |want| c.billing_country().to_lowercase() == want)
        })
        .filter(|c| criteria.account_type.map_or(true, |t| c.account_type() == t))
        .filter(|c| any_of(c.languages(), &languages))
        .filter(|c| any_of(c.channels(), &channels))
        .filter(|c| {
            criteria
                .health
                .map_or(true, |h| calculator.score(c).classification() == h)
        })
        .collect();

    let total_count = matches.len();
    let page = matches
        .into_iter()
        .skip(criteria.offset)
        .take(criteria.limit.unwrap_or(usize::MAX))
        .collect();

    SearchResult {
        customers: page,
        total_count,
    }
}

fn normalise_needle(s: &str) -> String {
    escape_html(s.trim()).to_lowercase()
}

/// `true` when `wanted` is empty or shares at least one entry with `have`.
fn any_of(have: &[String], wanted: &[String]) -> bool {
    wanted.is_empty()
        || have
            .iter()
            .any(|h| wanted.iter().any(|w| h.to_lowercase() == *w))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
