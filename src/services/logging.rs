//! Tracing subscriber setup
//!
//! Two outputs share one `EnvFilter`:
//! - human-readable lines on stderr
//! - JSON lines appended to the log file, one event per line
//!
//! `RUST_LOG` wins over the verbosity flag when set.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter directive for the given verbosity
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "dvr_control=debug"
    } else {
        "dvr_control=info"
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber.
///
/// A log file that cannot be opened is reported and skipped; console output
/// still works.
pub fn init(verbose: bool, log_file: &Path) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive(verbose).into());

    let (file, file_error) = match open_log_file(log_file) {
        Ok(file) => (Some(file), None),
        Err(e) => (None, Some(e)),
    };

    let file_layer = file.map(|file| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(e) = file_error {
        warn!(path = %log_file.display(), error = %e, "Could not open log file, logging to console only");
    }
    Ok(())
}
