mod bootstrap;
mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::CommandFactory;
use health_core::error::CoreError;
use health_core::settings::Settings;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("Roster Health v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::debug!(store = %settings.store_path().display(), delimiter = ?settings.delimiter);

    let Some(command) = settings.command.clone() else {
        Settings::command().print_help()?;
        println!();
        return Ok(ExitCode::SUCCESS);
    };

    match commands::run(&settings, command).await {
        Ok(code) => Ok(code),
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            // Only the fixed user message is shown; the detail is in the log.
            match e.downcast_ref::<CoreError>() {
                Some(core) => eprintln!("Error: {}", core.user_message()),
                None => eprintln!("Error: the command could not be completed."),
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
