pub mod alerts;
pub mod error;
pub mod formatting;
pub mod health;
pub mod models;
pub mod normalizer;
pub mod sanitizer;
pub mod settings;

pub use error::{CoreError, ErrorCode, Result};
pub use health::{HealthBreakdown, HealthClassification, HealthScore, HealthScoreCalculator};
pub use models::{AccountType, Customer, CustomerDraft, CustomerStatus, MonthlyRecurringRevenue, RawRecord};
