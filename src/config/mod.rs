//! Application configuration management
//!
//! Connection settings live in the `server_settings` category of the settings
//! document. Environment variables take precedence over the document.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::matching::{DEFAULT_POSITIONAL_THRESHOLD, DEFAULT_TITLE_THRESHOLD, MatchingConfig};
use crate::store::{SERVER_SETTINGS, SettingsDocument};

pub const DEFAULT_PORT: u16 = 32400;
pub const DEFAULT_LIBRARY_SECTION: u32 = 3;
pub const DEFAULT_MEDIA_PROVIDER: u32 = 3;
pub const DEFAULT_EPG_PROVIDER: &str = "tv.plex.providers.epg.onconnect:2";
pub const DEFAULT_LOG_FILE: &str = "dvr_control.log";

/// Document key and environment variable for one setting
struct Key {
    name: &'static str,
    env: &'static str,
}

const HOST: Key = Key { name: "host", env: "PLEX_HOST" };
const PORT: Key = Key { name: "port", env: "PLEX_PORT" };
const TOKEN: Key = Key { name: "plex_token", env: "PLEX_TOKEN" };
const CLIENT_ID: Key = Key { name: "client_identifier", env: "PLEX_CLIENT_ID" };
const LIBRARY_SECTION: Key = Key { name: "library_section_id", env: "PLEX_LIBRARY_SECTION" };
const MEDIA_PROVIDER: Key = Key { name: "media_provider_id", env: "PLEX_MEDIA_PROVIDER" };
const EPG_PROVIDER: Key = Key { name: "epg_provider", env: "PLEX_EPG_PROVIDER" };
const TITLE_THRESHOLD: Key = Key { name: "title_threshold", env: "MATCH_TITLE_THRESHOLD" };
const POSITIONAL_THRESHOLD: Key = Key {
    name: "positional_threshold",
    env: "MATCH_POSITIONAL_THRESHOLD",
};
const LOG_FILE: Key = Key { name: "log_file", env: "DVR_CONTROL_LOG" };

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Plex server host
    pub host: String,

    /// Plex server port
    pub port: u16,

    /// Plex authentication token
    pub token: String,

    /// Client identifier sent with recording requests
    pub client_identifier: String,

    /// Library section recordings are filed into
    pub library_section_id: u32,

    /// DVR media provider id
    pub media_provider_id: u32,

    /// EPG provider path segment
    pub epg_provider: String,

    pub matching: MatchingConfig,

    /// Append-only JSON log file
    pub log_file: PathBuf,
}

impl Config {
    /// Load configuration from the settings document and the process environment
    pub fn load(document: &SettingsDocument, settings_path: &Path) -> Result<Self> {
        Self::from_sources(document, settings_path, |name| env::var(name).ok())
    }

    /// Load configuration with an explicit environment lookup
    pub fn from_sources<F>(document: &SettingsDocument, settings_path: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &Key| {
            env(key.env)
                .or_else(|| document.get(SERVER_SETTINGS, key.name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &Key| {
            lookup(key).with_context(|| {
                format!(
                    "{} is required (set it with `dvr-control settings` or {})",
                    key.name, key.env
                )
            })
        };

        let port = match lookup(&PORT) {
            Some(v) => v.parse().context("Invalid port")?,
            None => DEFAULT_PORT,
        };
        let library_section_id = match lookup(&LIBRARY_SECTION) {
            Some(v) => v.parse().context("Invalid library_section_id")?,
            None => DEFAULT_LIBRARY_SECTION,
        };
        let media_provider_id = match lookup(&MEDIA_PROVIDER) {
            Some(v) => v.parse().context("Invalid media_provider_id")?,
            None => DEFAULT_MEDIA_PROVIDER,
        };

        let matching = MatchingConfig {
            title_threshold: threshold(lookup(&TITLE_THRESHOLD), DEFAULT_TITLE_THRESHOLD)
                .context("Invalid title_threshold")?,
            positional_threshold: threshold(
                lookup(&POSITIONAL_THRESHOLD),
                DEFAULT_POSITIONAL_THRESHOLD,
            )
            .context("Invalid positional_threshold")?,
        };

        Ok(Self {
            host: required(&HOST)?,
            port,
            token: required(&TOKEN)?,
            client_identifier: required(&CLIENT_ID)?,
            library_section_id,
            media_provider_id,
            epg_provider: lookup(&EPG_PROVIDER)
                .map(|p| p.trim_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_EPG_PROVIDER.to_string()),
            matching,
            log_file: log_file_from(lookup(&LOG_FILE), settings_path),
        })
    }

    /// Base URL of the Plex server
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Log file location, resolvable before the rest of the configuration
pub fn log_file(document: &SettingsDocument, settings_path: &Path) -> PathBuf {
    let configured = env::var(LOG_FILE.env)
        .ok()
        .or_else(|| document.get(SERVER_SETTINGS, LOG_FILE.name))
        .filter(|v| !v.trim().is_empty());
    log_file_from(configured, settings_path)
}

fn log_file_from(configured: Option<String>, settings_path: &Path) -> PathBuf {
    match configured {
        Some(path) => PathBuf::from(path.trim()),
        None => settings_path
            .parent()
            .map(|dir| dir.join(DEFAULT_LOG_FILE))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
    }
}

fn threshold(raw: Option<String>, default: f64) -> Result<f64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: f64 = raw.parse().with_context(|| format!("{} is not a number", raw))?;
    if !(0.0..=1.0).contains(&value) {
        bail!("{} is outside [0, 1]", value);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn document() -> SettingsDocument {
        let mut doc = SettingsDocument::default();
        doc.set(SERVER_SETTINGS, "host", "10.0.0.5");
        doc.set(SERVER_SETTINGS, "plex_token", "secret");
        doc.set(SERVER_SETTINGS, "client_identifier", "client-1");
        doc
    }

    fn load(doc: &SettingsDocument, env: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_sources(doc, Path::new("/etc/dvr/settings.json"), |name| {
            env.get(name).cloned()
        })
    }

    #[test]
    fn test_defaults() {
        let config = load(&document(), &[]).unwrap();
        assert_eq!(config.base_url(), "http://10.0.0.5:32400");
        assert_eq!(config.library_section_id, 3);
        assert_eq!(config.media_provider_id, 3);
        assert_eq!(config.epg_provider, DEFAULT_EPG_PROVIDER);
        assert_eq!(config.matching, MatchingConfig::default());
        assert_eq!(config.log_file, PathBuf::from("/etc/dvr/dvr_control.log"));
    }

    #[test]
    fn test_env_overrides_document() {
        let config = load(
            &document(),
            &[("PLEX_HOST", "plex.local"), ("PLEX_PORT", "32401"), ("MATCH_TITLE_THRESHOLD", "0.95")],
        )
        .unwrap();
        assert_eq!(config.base_url(), "http://plex.local:32401");
        assert_eq!(config.matching.title_threshold, 0.95);
    }

    #[test]
    fn test_numeric_port_in_document() {
        let mut doc = document();
        doc.set(SERVER_SETTINGS, "port", "32499");
        assert_eq!(load(&doc, &[]).unwrap().port, 32499);
    }

    #[test]
    fn test_missing_host_is_an_error() {
        let mut doc = document();
        doc.remove(SERVER_SETTINGS, "host");
        let err = load(&doc, &[]).unwrap_err();
        assert!(err.to_string().contains("host is required"));
    }

    #[test]
    fn test_threshold_out_of_range_is_rejected() {
        assert!(load(&document(), &[("MATCH_POSITIONAL_THRESHOLD", "1.5")]).is_err());
        assert!(load(&document(), &[("MATCH_TITLE_THRESHOLD", "high")]).is_err());
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(load(&document(), &[("PLEX_PORT", "not-a-port")]).is_err());
    }
}
