use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use health_core::settings::app_dir;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Subdirectories created under the application directory.
const APP_SUBDIRS: [&str; 3] = ["data", "logs", "exports"];

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure the standard `~/.roster-health/` directory hierarchy exists.
///
/// Creates the following directories if absent (including any missing parents):
/// - `~/.roster-health/`
/// - `~/.roster-health/data/`
/// - `~/.roster-health/logs/`
/// - `~/.roster-health/exports/`
pub fn ensure_directories() -> anyhow::Result<PathBuf> {
    let dir = app_dir();
    ensure_directories_in(&dir)?;
    Ok(dir)
}

fn ensure_directories_in(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    for sub in APP_SUBDIRS {
        std::fs::create_dir_all(dir.join(sub))?;
    }
    Ok(())
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` name to an [`EnvFilter`] directive.
fn level_directive(log_level: &str) -> &'static str {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" => "error",
        _ => "info",
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Log lines go to stderr so command output on stdout stays parseable. When
/// `log_file` is given the same events are appended to it without ANSI
/// colours.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(level_directive(log_level))?;

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ── directories ───────────────────────────────────────────────────────────

    #[test]
    fn test_ensure_directories_in() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = tmp.path().join(".roster-health");

        ensure_directories_in(&dir).expect("ensure_directories_in should succeed");

        assert!(dir.is_dir(), ".roster-health dir must exist");
        for sub in APP_SUBDIRS {
            assert!(dir.join(sub).is_dir(), "{sub} subdir must exist");
        }
    }

    #[test]
    fn test_ensure_directories_in_is_idempotent() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = tmp.path().join(".roster-health");
        std::fs::create_dir_all(dir.join("data")).unwrap();
        std::fs::write(dir.join("data").join("customers.json"), "{}").unwrap();

        ensure_directories_in(&dir).expect("second run");
        assert!(dir.join("data").join("customers.json").exists());
    }

    // ── log levels ────────────────────────────────────────────────────────────

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("DEBUG"), "debug");
        assert_eq!(level_directive("INFO"), "info");
        assert_eq!(level_directive("WARNING"), "warn");
        assert_eq!(level_directive("error"), "error");
        assert_eq!(level_directive("verbose"), "info");
    }
}
