//! dvr-control - reconcile the Plex DVR guide with the local library
//!
//! Settings are read from the settings document (see `--settings`), with
//! environment variables and a `.env` file taking precedence.

use std::process::ExitCode;

use clap::Parser;

use dvr_control::cli::Cli;
use dvr_control::config;
use dvr_control::services::logging;
use dvr_control::store::{SettingsDocument, SettingsStore};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // The log file location may itself come from the settings document
    let settings = SettingsStore::new(&cli.settings);
    let document = settings.load().unwrap_or_else(|_| SettingsDocument::default());
    let log_file = config::log_file(&document, settings.path());
    if let Err(e) = logging::init(cli.verbose, &log_file) {
        eprintln!("{:#}", e);
    }

    match dvr_control::app::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
