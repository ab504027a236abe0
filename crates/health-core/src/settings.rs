use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-user application directory under `$HOME`.
pub const APP_DIR_NAME: &str = ".roster-health";

/// File name of the default JSON customer store inside `data/`.
pub const DEFAULT_STORE_FILE: &str = "customers.json";

/// Score history file, kept in the same directory as the customer store.
pub const HISTORY_FILE: &str = "history.json";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Import customer rosters, score account health and report on the result
#[derive(Parser, Debug, Clone)]
#[command(
    name = "roster-health",
    about = "Import customer rosters, score account health and report on the result",
    version
)]
pub struct Settings {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Customer store file (defaults to ~/.roster-health/data/customers.json)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Field delimiter of imported and exported files
    #[arg(long, global = true, default_value = ",")]
    pub delimiter: char,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Logging level
    #[arg(long, global = true, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long, global = true)]
    pub clear: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Import a roster export into the store
    Import {
        /// Delimited roster export
        file: PathBuf,
    },
    /// Search stored customers
    Search(SearchArgs),
    /// Show aggregate statistics
    Stats,
    /// Export stored customers to a delimited file
    Export {
        /// Destination file
        file: PathBuf,
        /// Append Health Score and Health Status columns
        #[arg(long)]
        with_health: bool,
    },
    /// List unacknowledged alerts, or acknowledge one
    Alerts {
        /// Acknowledge the alert with this id
        #[arg(long)]
        ack: Option<u64>,
    },
    /// Re-import a roster export whenever it changes
    Watch {
        /// Delimited roster export
        file: PathBuf,
        /// Polling interval in seconds (1-3600)
        #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..=3600))]
        interval: u64,
    },
    /// Remove every stored customer
    Clear,
}

/// Filters of the `search` subcommand. All given filters must match.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct SearchArgs {
    /// Case-insensitive text matched against customer id and account owner
    pub query: Option<String>,

    #[arg(long, value_parser = ["active", "inactive"])]
    pub status: Option<String>,

    #[arg(long)]
    pub country: Option<String>,

    #[arg(long, value_parser = ["pro", "starter"])]
    pub account_type: Option<String>,

    /// Match customers speaking any of these languages (repeatable)
    #[arg(long = "language")]
    pub languages: Vec<String>,

    /// Match customers on any of these channels (repeatable)
    #[arg(long = "channel")]
    pub channels: Vec<String>,

    #[arg(long, value_parser = ["healthy", "at-risk", "critical"])]
    pub health: Option<String>,

    #[arg(long, default_value = "0")]
    pub offset: usize,

    #[arg(long)]
    pub limit: Option<usize>,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.roster-health/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    /// Uses `~/.roster-health/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(APP_DIR_NAME).join("last_used.json")
    }

    /// Load persisted params from the default path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load persisted params from an explicit path.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %path.display(),
                    "ignoring unreadable last-used parameters"
                );
                Self::default()
            }
        }
    }

    /// Atomically write params to the default path, creating parent directories
    /// if needed.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&Self::config_path())
    }

    /// Atomically write params to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the default config file if it exists.
    pub fn clear() -> Result<(), std::io::Error> {
        Self::clear_at(&Self::config_path())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, resolve the store path, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation. Accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    ///
    /// The default store lives in `data/` next to `config_path`.
    pub fn load_with_last_used_impl(args: Vec<std::ffi::OsString>, config_path: &Path) -> Self {
        let matches = Settings::command().get_matches_from(args);
        let mut settings = match Settings::from_arg_matches(&matches) {
            Ok(settings) => settings,
            Err(e) => e.exit(),
        };

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!(error = %e, "failed to clear last-used parameters");
            }
            return Self::resolve(settings, config_path);
        }

        let last = LastUsedParams::load_from(config_path);

        if !is_arg_explicitly_set(&matches, "store") && settings.store.is_none() {
            settings.store = last.store;
        }
        if !is_arg_explicitly_set(&matches, "delimiter") {
            if let Some(d) = last.delimiter {
                settings.delimiter = d;
            }
        }

        settings = Self::resolve(settings, config_path);

        let params = LastUsedParams::from(&settings);
        if let Err(e) = params.save_to(config_path) {
            tracing::warn!(error = %e, "failed to persist last-used parameters");
        }

        settings
    }

    /// Store path, falling back to the default under the application dir.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .clone()
            .unwrap_or_else(|| default_store_path(&app_dir()))
    }

    /// Score history file next to the store, so each store keeps its own.
    pub fn history_path(&self) -> PathBuf {
        self.store_path().with_file_name(HISTORY_FILE)
    }

    /// Fill in the default store and apply the `--debug` flag.
    fn resolve(mut settings: Settings, config_path: &Path) -> Settings {
        if settings.store.is_none() {
            let base = config_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(app_dir);
            settings.store = Some(default_store_path(&base));
        }

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        settings
    }
}

/// `~/.roster-health`, or `./.roster-health` when there is no home directory.
pub fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// `<app_dir>/data/customers.json`
pub fn default_store_path(app_dir: &Path) -> PathBuf {
    app_dir.join("data").join(DEFAULT_STORE_FILE)
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            store: s.store.clone(),
            delimiter: Some(s.delimiter),
        }
    }
}

// ── Helper: check if an arg was explicitly set on the command line ─────────────

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
