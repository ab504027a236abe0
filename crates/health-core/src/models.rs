use std::cmp::Ordering;
use std::collections::HashSet;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

// ── Enumerations ──────────────────────────────────────────────────────────────

/// Whether the account is currently a paying customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerStatus {
    Active,
    Inactive,
}

impl CustomerStatus {
    /// Label used by the CRM export, e.g. `"Active Customer"`.
    pub fn label(self) -> &'static str {
        match self {
            CustomerStatus::Active => "Active Customer",
            CustomerStatus::Inactive => "Inactive Customer",
        }
    }
}

impl FromStr for CustomerStatus {
    type Err = CoreError;

    /// Accepts both the export labels and the bare words, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" | "active customer" => Ok(CustomerStatus::Active),
            "inactive" | "inactive customer" => Ok(CustomerStatus::Inactive),
            _ => Err(CoreError::validation(
                "status",
                format!("unknown status '{}'", s.trim()),
            )),
        }
    }
}

/// Subscription tier of the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Pro,
    Starter,
}

impl AccountType {
    pub fn label(self) -> &'static str {
        match self {
            AccountType::Pro => "Pro",
            AccountType::Starter => "Starter",
        }
    }
}

impl FromStr for AccountType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pro" => Ok(AccountType::Pro),
            "starter" => Ok(AccountType::Starter),
            _ => Err(CoreError::validation(
                "account type",
                format!("unknown account type '{}'", s.trim()),
            )),
        }
    }
}

// ── MonthlyRecurringRevenue ───────────────────────────────────────────────────

/// Non-negative monthly amount in a single currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRecurringRevenue {
    amount: f64,
    currency: String,
}

impl MonthlyRecurringRevenue {
    /// Build an MRR value. The currency code is trimmed and upper-cased.
    ///
    /// Fails when `amount` is negative, NaN or infinite.
    pub fn new(amount: f64, currency: impl AsRef<str>) -> Result<Self> {
        if !amount.is_finite() {
            return Err(CoreError::validation("mrr", "amount must be a finite number"));
        }
        if amount < 0.0 {
            return Err(CoreError::validation(
                "mrr",
                format!("amount must not be negative (got {amount})"),
            ));
        }
        Ok(Self {
            amount,
            currency: currency.as_ref().trim().to_uppercase(),
        })
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Order two amounts of the same currency.
    ///
    /// Returns [`CoreError::CurrencyMismatch`] when the currencies differ
    /// rather than producing a meaningless ordering.
    pub fn compare(&self, other: &Self) -> Result<Ordering> {
        if self.currency != other.currency {
            return Err(CoreError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            });
        }
        Ok(self.amount.total_cmp(&other.amount))
    }
}

// ── Customer ──────────────────────────────────────────────────────────────────

/// Unvalidated customer fields, the input to [`Customer::new`].
///
/// Also the serialised shape of a [`Customer`], so stored records pass
/// through the same validation when they are loaded back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDraft {
    pub id: String,
    pub account_owner: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub latest_login: Option<NaiveDateTime>,
    pub created_date: NaiveDateTime,
    #[serde(default)]
    pub last_cs_contact_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub billing_country: String,
    pub account_type: AccountType,
    #[serde(default)]
    pub languages: Vec<String>,
    pub status: CustomerStatus,
    #[serde(default)]
    pub sirvoy_account_status: String,
    #[serde(default)]
    pub property_type: String,
    #[serde(default)]
    pub mrr: f64,
    #[serde(default)]
    pub mrr_currency: String,
    #[serde(default)]
    pub channels: Vec<String>,
}

/// A hospitality account from the customer roster.
///
/// Only constructible through [`Customer::new`], so every instance satisfies
/// the roster invariants. Never mutated; repositories replace whole values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CustomerDraft", into = "CustomerDraft")]
pub struct Customer {
    id: String,
    account_owner: String,
    account_name: String,
    latest_login: Option<NaiveDateTime>,
    created_date: NaiveDateTime,
    last_cs_contact_date: Option<NaiveDateTime>,
    billing_country: String,
    account_type: AccountType,
    languages: Vec<String>,
    status: CustomerStatus,
    sirvoy_account_status: String,
    property_type: String,
    mrr: MonthlyRecurringRevenue,
    channels: Vec<String>,
}

impl Customer {
    /// Validate `draft` and build a customer.
    ///
    /// * `id` and `account_owner` must be non-blank (they are trimmed).
    /// * `mrr` must be a finite, non-negative amount.
    /// * List entries are trimmed and blank entries dropped; order and
    ///   duplicates are kept.
    pub fn new(draft: CustomerDraft) -> Result<Self> {
        let id = draft.id.trim().to_string();
        if id.is_empty() {
            return Err(CoreError::validation("id", "must not be empty"));
        }
        let account_owner = draft.account_owner.trim().to_string();
        if account_owner.is_empty() {
            return Err(CoreError::validation("account owner", "must not be empty"));
        }
        let mrr = MonthlyRecurringRevenue::new(draft.mrr, &draft.mrr_currency)?;

        Ok(Self {
            id,
            account_owner,
            account_name: draft.account_name.trim().to_string(),
            latest_login: draft.latest_login,
            created_date: draft.created_date,
            last_cs_contact_date: draft.last_cs_contact_date,
            billing_country: draft.billing_country.trim().to_string(),
            account_type: draft.account_type,
            languages: clean_list(draft.languages),
            status: draft.status,
            sirvoy_account_status: draft.sirvoy_account_status.trim().to_string(),
            property_type: draft.property_type.trim().to_string(),
            mrr,
            channels: clean_list(draft.channels),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn account_owner(&self) -> &str {
        &self.account_owner
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// `None` means the account never logged in.
    pub fn latest_login(&self) -> Option<NaiveDateTime> {
        self.latest_login
    }

    pub fn created_date(&self) -> NaiveDateTime {
        self.created_date
    }

    pub fn last_cs_contact_date(&self) -> Option<NaiveDateTime> {
        self.last_cs_contact_date
    }

    pub fn billing_country(&self) -> &str {
        &self.billing_country
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn status(&self) -> CustomerStatus {
        self.status
    }

    pub fn sirvoy_account_status(&self) -> &str {
        &self.sirvoy_account_status
    }

    pub fn property_type(&self) -> &str {
        &self.property_type
    }

    pub fn mrr(&self) -> &MonthlyRecurringRevenue {
        &self.mrr
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn is_active(&self) -> bool {
        self.status == CustomerStatus::Active
    }

    /// Number of channels ignoring case and repeats.
    pub fn distinct_channel_count(&self) -> usize {
        self.channels
            .iter()
            .map(|c| c.to_lowercase())
            .collect::<HashSet<_>>()
            .len()
    }
}

impl TryFrom<CustomerDraft> for Customer {
    type Error = CoreError;

    fn try_from(draft: CustomerDraft) -> Result<Self> {
        Customer::new(draft)
    }
}

impl From<Customer> for CustomerDraft {
    fn from(c: Customer) -> Self {
        CustomerDraft {
            id: c.id,
            account_owner: c.account_owner,
            account_name: c.account_name,
            latest_login: c.latest_login,
            created_date: c.created_date,
            last_cs_contact_date: c.last_cs_contact_date,
            billing_country: c.billing_country,
            account_type: c.account_type,
            languages: c.languages,
            status: c.status,
            sirvoy_account_status: c.sirvoy_account_status,
            property_type: c.property_type,
            mrr: c.mrr.amount,
            mrr_currency: c.mrr.currency,
            channels: c.channels,
        }
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ── RawRecord ─────────────────────────────────────────────────────────────────

/// One untyped row of the roster export: column header → cell text, in
/// column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `column` to `value`, replacing an earlier value for the same column.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    /// Cell text for `column`, or `None` when the column is absent.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(c, v)| (c.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = RawRecord::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::NaiveDate;

    /// A valid active Pro customer created on 2023-01-01.
    pub fn draft(id: &str) -> CustomerDraft {
        CustomerDraft {
            id: id.to_string(),
            account_owner: "Anna Berg".to_string(),
            account_name: "Hotel Nordlys".to_string(),
            latest_login: None,
            created_date: NaiveDate::from_ymd_opt(2023, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            last_cs_contact_date: None,
            billing_country: "Sweden".to_string(),
            account_type: AccountType::Pro,
            languages: vec!["English".to_string()],
            status: CustomerStatus::Active,
            sirvoy_account_status: "Active".to_string(),
            property_type: "Hotel".to_string(),
            mrr: 1_000.0,
            mrr_currency: "EUR".to_string(),
            channels: vec![],
        }
    }
}
