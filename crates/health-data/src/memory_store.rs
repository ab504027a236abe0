use std::collections::BTreeMap;

use health_core::error::{CoreError, Result};
use health_core::models::Customer;
use tracing::debug;

use crate::repository::{CustomerRepository, UpsertOutcome};

/// Customers held in a map ordered by id. Nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    customers: BTreeMap<String, Customer>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `customers`, later duplicates replacing earlier ones.
    pub fn with_customers(customers: impl IntoIterator<Item = Customer>) -> Self {
        let mut repo = Self::new();
        repo.upsert_all(customers);
        repo
    }

    pub(crate) fn upsert_all(&mut self, customers: impl IntoIterator<Item = Customer>) -> UpsertOutcome {
        let mut outcome = UpsertOutcome::default();
        for customer in customers {
            match self.customers.insert(customer.id().to_string(), customer) {
                Some(_) => outcome.skipped += 1,
                None => outcome.inserted += 1,
            }
        }
        outcome
    }

    pub(crate) fn customers(&self) -> impl Iterator<Item = &Customer> {
        self.customers.values()
    }
}

impl CustomerRepository for InMemoryRepository {
    fn get_all(&self) -> Result<Vec<Customer>> {
        Ok(self.customers.values().cloned().collect())
    }

    fn get_by_id(&self, id: &str) -> Result<Customer> {
        self.customers
            .get(id.trim())
            .cloned()
            .ok_or_else(|| CoreError::CustomerNotFound(id.to_string()))
    }

    fn count(&self) -> Result<usize> {
        Ok(self.customers.len())
    }

    fn add(&mut self, customer: Customer) -> Result<()> {
        if self.customers.contains_key(customer.id()) {
            return Err(CoreError::DuplicateCustomer(customer.id().to_string()));
        }
        self.customers.insert(customer.id().to_string(), customer);
        Ok(())
    }

    fn add_many(&mut self, customers: Vec<Customer>) -> Result<UpsertOutcome> {
        let outcome = self.upsert_all(customers);
        debug!(
            inserted = outcome.inserted,
            skipped = outcome.skipped,
            "in-memory upsert"
        );
        Ok(outcome)
    }

    fn clear(&mut self) -> Result<()> {
        self.customers.clear();
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{customer, reference_calculator};

    fn four() -> Vec<Customer> {
        [("CUST-001", 2_500.0), ("CUST-002", 800.0), ("CUST-003", 1_500.0), ("CUST-004", 3_000.0)]
            .into_iter()
            .map(|(id, mrr)| customer(id, |d| d.mrr = mrr))
            .collect()
    }

    #[test]
    fn test_add_many_then_statistics() {
        let mut repo = InMemoryRepository::new();
        let outcome = repo.add_many(four()).unwrap();
        assert_eq!(outcome, UpsertOutcome { inserted: 4, skipped: 0 });

        let stats = repo.get_statistics(reference_calculator()).unwrap();
        assert_eq!(stats.total_customers, 4);
        assert!((stats.total_mrr - 7_800.0).abs() < 1e-9);
    }

    #[test]
    fn test_reimport_counts_as_skipped() {
        let mut repo = InMemoryRepository::new();
        repo.add_many(four()).unwrap();
        let outcome = repo.add_many(four()).unwrap();
        assert_eq!(outcome, UpsertOutcome { inserted: 0, skipped: 4 });
        assert_eq!(repo.count().unwrap(), 4);
    }

    #[test]
    fn test_duplicate_in_batch_later_wins() {
        let mut repo = InMemoryRepository::new();
        let outcome = repo
            .add_many(vec![
                customer("C1", |d| d.mrr = 1.0),
                customer("C1", |d| d.mrr = 2.0),
            ])
            .unwrap();
        assert_eq!(outcome, UpsertOutcome { inserted: 1, skipped: 1 });
        assert_eq!(repo.get_by_id("C1").unwrap().mrr().amount(), 2.0);
    }

    #[test]
    fn test_add_rejects_duplicate_without_change() {
        let mut repo = InMemoryRepository::with_customers([customer("C1", |d| d.mrr = 1.0)]);
        let err = repo.add(customer("C1", |d| d.mrr = 99.0)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateCustomer(ref id) if id == "C1"));
        assert_eq!(repo.get_by_id("C1").unwrap().mrr().amount(), 1.0);
    }

    #[test]
    fn test_get_by_id_not_found() {
        let repo = InMemoryRepository::new();
        assert!(matches!(
            repo.get_by_id("missing"),
            Err(CoreError::CustomerNotFound(_))
        ));
    }

    #[test]
    fn test_get_all_ordered_by_id_and_clear() {
        let mut repo = InMemoryRepository::with_customers(
            ["C3", "C1", "C2"].map(|id| customer(id, |_| {})),
        );
        let ids: Vec<String> = repo.get_all().unwrap().iter().map(|c| c.id().to_string()).collect();
        assert_eq!(ids, vec!["C1", "C2", "C3"]);

        repo.clear().unwrap();
        assert_eq!(repo.count().unwrap(), 0);
        assert!(repo.get_mrr_by_country().unwrap().is_empty());
    }
}
