//! JSON-file-backed customer repository.
//!
//! The whole collection is kept in memory and rewritten to disk after every
//! successful write, via a temp file and rename so a crash never leaves a
//! half-written store. A write that cannot be persisted is rolled back in
//! memory as well.

use std::path::{Path, PathBuf};

use health_core::error::{CoreError, Result};
use health_core::models::Customer;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::memory_store::InMemoryRepository;
use crate::repository::{CustomerRepository, UpsertOutcome};

const STORE_VERSION: u32 = 1;

#[derive(Serialize)]
struct StoreFileRef<'a> {
    version: u32,
    customers: Vec<&'a Customer>,
}

#[derive(Deserialize)]
struct StoreFile {
    customers: Vec<Customer>,
}

pub struct JsonFileRepository {
    path: PathBuf,
    inner: InMemoryRepository,
}

impl JsonFileRepository {
    /// Open the store at `path`. A missing file is an empty store; it is
    /// created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| CoreError::FileRead {
                path: path.clone(),
                source,
            })?;
            let file: StoreFile = serde_json::from_str(&content)?;
            info!(
                "Loaded {} customers from {}",
                file.customers.len(),
                path.display()
            );
            InMemoryRepository::with_customers(file.customers)
        } else {
            debug!("Customer store {} does not exist yet", path.display());
            InMemoryRepository::new()
        };

        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the collection and persist it. The live
    /// collection is only replaced once the file is written.
    fn write_through<T>(
        &mut self,
        change: impl FnOnce(&mut InMemoryRepository) -> Result<T>,
    ) -> Result<T> {
        let mut next = self.inner.clone();
        let value = change(&mut next)?;
        if let Err(e) = persist(&self.path, &next) {
            error!(path = %self.path.display(), error = %e, "failed to persist customer store");
            return Err(CoreError::Storage(format!(
                "{}: {}",
                self.path.display(),
                e
            )));
        }
        self.inner = next;
        Ok(value)
    }
}

fn persist(path: &Path, repo: &InMemoryRepository) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let doc = StoreFileRef {
        version: STORE_VERSION,
        customers: repo.customers().collect(),
    };
    let json = serde_json::to_string_pretty(&doc).map_err(std::io::Error::other)?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl CustomerRepository for JsonFileRepository {
    fn get_all(&self) -> Result<Vec<Customer>> {
        self.inner.get_all()
    }

    fn get_by_id(&self, id: &str) -> Result<Customer> {
        self.inner.get_by_id(id)
    }

    fn count(&self) -> Result<usize> {
        self.inner.count()
    }

    fn add(&mut self, customer: Customer) -> Result<()> {
        self.write_through(|repo| repo.add(customer))
    }

    fn add_many(&mut self, customers: Vec<Customer>) -> Result<UpsertOutcome> {
        self.write_through(|repo| repo.add_many(customers))
    }

    fn clear(&mut self) -> Result<()> {
        self.write_through(|repo| repo.clear())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::customer;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_store() {
        let tmp = TempDir::new().unwrap();
        let repo = JsonFileRepository::open(tmp.path().join("customers.json")).unwrap();
        assert_eq!(repo.count().unwrap(), 0);
        assert!(!repo.path().exists());
    }

    #[test]
    fn test_writes_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data").join("customers.json");

        let mut repo = JsonFileRepository::open(&path).unwrap();
        let outcome = repo
            .add_many(vec![
                customer("CUST-001", |d| {
                    d.channels = vec!["Booking.com".into()];
                    d.mrr = 2_500.0;
                }),
                customer("CUST-002", |_| {}),
            ])
            .unwrap();
        assert_eq!(outcome.inserted, 2);
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = JsonFileRepository::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 2);
        assert_eq!(
            reopened.get_by_id("CUST-001").unwrap(),
            repo.get_by_id("CUST-001").unwrap()
        );
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let tmp = TempDir::new().unwrap();
        // A directory where the store file should be makes the rename fail.
        let path = tmp.path().join("customers.json");
        std::fs::create_dir_all(&path).unwrap();

        let mut repo = JsonFileRepository {
            path: path.clone(),
            inner: InMemoryRepository::new(),
        };
        let err = repo.add_many(vec![customer("C1", |_| {})]).unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(err.code(), health_core::error::ErrorCode::StorageUnavailable);
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_duplicate_add_does_not_touch_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("customers.json");
        let mut repo = JsonFileRepository::open(&path).unwrap();
        repo.add(customer("C1", |_| {})).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        assert!(repo.add(customer("C1", |d| d.mrr = 5.0)).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_clear_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("customers.json");
        let mut repo = JsonFileRepository::open(&path).unwrap();
        repo.add(customer("C1", |_| {})).unwrap();
        repo.clear().unwrap();
        assert_eq!(JsonFileRepository::open(&path).unwrap().count().unwrap(), 0);
    }

    #[test]
    fn test_invalid_stored_customer_fails_open() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("customers.json");
        std::fs::write(
            &path,
            r#"{"version":1,"customers":[{"id":"","account_owner":"x","created_date":"2023-01-01T00:00:00","account_type":"pro","status":"active","mrr":1.0,"mrr_currency":"EUR"}]}"#,
        )
        .unwrap();
        assert!(JsonFileRepository::open(&path).is_err());
    }
}
