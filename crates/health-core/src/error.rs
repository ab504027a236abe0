use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the roster-health crates.
///
/// The `Display` text of a variant carries technical detail and is meant for
/// logs only. Anything shown to a user goes through [`CoreError::user_message`].
#[derive(Error, Debug)]
pub enum CoreError {
    /// A customer value failed one of its construction invariants.
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// `add` was called with an id that already exists.
    #[error("Customer already exists: {0}")]
    DuplicateCustomer(String),

    /// A lookup by id found nothing.
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// An alert id that was never issued.
    #[error("Alert not found: {0}")]
    AlertNotFound(u64),

    /// A date string did not match `DD/MM/YYYY` or `DD/MM/YYYY, HH:mm`.
    #[error("Invalid date format: {0}")]
    DateParse(String),

    /// A money string had no parseable decimal amount.
    #[error("Invalid amount: {0}")]
    MoneyParse(String),

    /// A health score was NaN or outside 0–100.
    #[error("Invalid health score: {0}")]
    InvalidScore(String),

    /// Two MRR values in different currencies were compared.
    #[error("Cannot compare {left} with {right}")]
    CurrencyMismatch { left: String, right: String },

    /// The backing store rejected a read or write.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// A delimited export could not be decoded.
    #[error("Failed to read CSV: {0}")]
    CsvRead(String),

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the roster-health crates.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Stable, user-facing classification of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationFailed,
    DuplicateCustomer,
    CustomerNotFound,
    AlertNotFound,
    ParseFailed,
    CurrencyMismatch,
    StorageUnavailable,
    FileUnreadable,
    ConfigInvalid,
}

impl ErrorCode {
    /// Machine-readable code string.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::DuplicateCustomer => "DUPLICATE_CUSTOMER",
            ErrorCode::CustomerNotFound => "CUSTOMER_NOT_FOUND",
            ErrorCode::AlertNotFound => "ALERT_NOT_FOUND",
            ErrorCode::ParseFailed => "PARSE_FAILED",
            ErrorCode::CurrencyMismatch => "CURRENCY_MISMATCH",
            ErrorCode::StorageUnavailable => "STORAGE_UNAVAILABLE",
            ErrorCode::FileUnreadable => "FILE_UNREADABLE",
            ErrorCode::ConfigInvalid => "CONFIG_INVALID",
        }
    }

    /// Fixed message safe to show to a user. Never contains paths or
    /// underlying error text.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "The customer data is invalid.",
            ErrorCode::DuplicateCustomer => "A customer with this ID already exists.",
            ErrorCode::CustomerNotFound => "The requested customer could not be found.",
            ErrorCode::AlertNotFound => "The requested alert could not be found.",
            ErrorCode::ParseFailed => "A value could not be read. Check dates and amounts.",
            ErrorCode::CurrencyMismatch => "Amounts in different currencies cannot be compared.",
            ErrorCode::StorageUnavailable => "Customer data could not be saved. Please try again.",
            ErrorCode::FileUnreadable => "The file could not be read.",
            ErrorCode::ConfigInvalid => "The configuration is invalid.",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CoreError {
    /// Map this error onto the fixed code table.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Validation { .. } | CoreError::InvalidScore(_) => ErrorCode::ValidationFailed,
            CoreError::DuplicateCustomer(_) => ErrorCode::DuplicateCustomer,
            CoreError::CustomerNotFound(_) => ErrorCode::CustomerNotFound,
            CoreError::AlertNotFound(_) => ErrorCode::AlertNotFound,
            CoreError::DateParse(_) | CoreError::MoneyParse(_) | CoreError::CsvRead(_) => {
                ErrorCode::ParseFailed
            }
            CoreError::CurrencyMismatch { .. } => ErrorCode::CurrencyMismatch,
            CoreError::Storage(_) | CoreError::JsonParse(_) | CoreError::Io(_) => {
                ErrorCode::StorageUnavailable
            }
            CoreError::FileRead { .. } => ErrorCode::FileUnreadable,
            CoreError::Config(_) => ErrorCode::ConfigInvalid,
        }
    }

    /// User-facing message for this error, see [`ErrorCode::user_message`].
    pub fn user_message(&self) -> &'static str {
        self.code().user_message()
    }

    /// Shorthand for a [`CoreError::Validation`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}
