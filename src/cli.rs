//! Command line parsing for the `dvr-control` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::store::OverrideKind;

/// Top-level CLI parser.
#[derive(Debug, Parser)]
#[command(
    name = "dvr-control",
    version,
    about = "Find guide episodes missing from the Plex library and schedule DVR recordings"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings document holding server settings and overrides
    #[arg(
        long,
        global = true,
        env = "DVR_CONTROL_SETTINGS",
        default_value = "settings.json"
    )]
    pub settings: PathBuf,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Match a show's guide episodes against the library and record the missing ones.
    Reconcile {
        /// Library show key (Plex ratingKey)
        library_key: String,
        /// Guide show id (e.g. SH012345670000)
        guide_id: String,
    },
    /// Look up a show's library key and guide id by title.
    Search {
        title: String,
    },
    /// Show one guide episode by season and episode number.
    Episode {
        guide_id: String,
        season: u32,
        episode: u32,
    },
    /// Manage force-match and force-unmatch overrides.
    #[command(subcommand)]
    Override(OverrideCommands),
    /// Manage server connection settings.
    #[command(subcommand)]
    Settings(SettingsCommands),
}

/// Override kind as typed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OverrideArg {
    /// Always treat the pair as the same episode
    Match,
    /// Never treat the pair as the same episode
    Unmatch,
}

impl From<OverrideArg> for OverrideKind {
    fn from(value: OverrideArg) -> Self {
        match value {
            OverrideArg::Match => OverrideKind::ForceMatch,
            OverrideArg::Unmatch => OverrideKind::ForceUnmatch,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum OverrideCommands {
    /// Pin or forbid a library/guide episode pairing.
    Set {
        kind: OverrideArg,
        library_id: String,
        guide_id: String,
    },
    /// Remove the override registered for a library/guide episode pairing.
    Remove {
        kind: OverrideArg,
        library_id: String,
        guide_id: String,
    },
    /// List all overrides.
    List,
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommands {
    /// Set host, port, token and client identifier at once.
    SetAll {
        host: String,
        port: u16,
        token: String,
        client_id: String,
    },
    /// Set individual server settings.
    Set(SettingsValues),
    /// Remove one server setting.
    Unset { key: SettingKey },
    /// Print the server settings with the token redacted.
    Show,
}

/// Server setting as named on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SettingKey {
    Host,
    Port,
    Token,
    ClientId,
}

impl SettingKey {
    /// Key in the settings document
    pub fn document_key(&self) -> &'static str {
        match self {
            SettingKey::Host => "host",
            SettingKey::Port => "port",
            SettingKey::Token => "plex_token",
            SettingKey::ClientId => "client_identifier",
        }
    }
}

#[derive(Debug, Default, Args)]
pub struct SettingsValues {
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub token: Option<String>,
    #[arg(long)]
    pub client_id: Option<String>,
}

impl SettingsValues {
    /// Document keys and values that were given
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        [
            ("host", self.host.clone()),
            ("port", self.port.map(|p| p.to_string())),
            ("plex_token", self.token.clone()),
            ("client_identifier", self.client_id.clone()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::*;

    #[test]
    fn test_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_reconcile_parses_with_global_flags() {
        let cli = Cli::try_parse_from([
            "dvr-control",
            "reconcile",
            "48000",
            "SH0123",
            "--settings",
            "/tmp/s.json",
            "--verbose",
        ])
        .expect("cli should parse");

        assert!(cli.verbose);
        assert_eq!(cli.settings, PathBuf::from("/tmp/s.json"));
        assert!(matches!(
            cli.command,
            Commands::Reconcile { ref library_key, ref guide_id } if library_key == "48000" && guide_id == "SH0123"
        ));
    }

    #[test]
    fn test_override_set_maps_kind() {
        let cli = Cli::try_parse_from(["dvr-control", "override", "set", "unmatch", "L9", "G1"])
            .expect("cli should parse");
        let Commands::Override(OverrideCommands::Set { kind, .. }) = cli.command else {
            panic!("expected override set");
        };
        assert_eq!(OverrideKind::from(kind), OverrideKind::ForceUnmatch);
    }

    #[test]
    fn test_override_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["dvr-control", "override", "set", "maybe", "L9", "G1"]).is_err());
    }

    #[test]
    fn test_episode_requires_numeric_indices() {
        assert!(Cli::try_parse_from(["dvr-control", "episode", "SH0123", "two", "5"]).is_err());
        assert!(Cli::try_parse_from(["dvr-control", "episode", "SH0123", "2", "5"]).is_ok());
    }

    #[test]
    fn test_settings_set_collects_given_values() {
        let cli = Cli::try_parse_from([
            "dvr-control",
            "settings",
            "set",
            "--port",
            "32401",
            "--client-id",
            "abc",
        ])
        .expect("cli should parse");
        let Commands::Settings(SettingsCommands::Set(values)) = cli.command else {
            panic!("expected settings set");
        };
        assert_eq!(
            values.entries(),
            vec![("port", "32401".to_string()), ("client_identifier", "abc".to_string())]
        );
    }

    #[test]
    fn test_override_remove_takes_the_pair() {
        let cli = Cli::try_parse_from(["dvr-control", "override", "remove", "match", "L9", "G1"])
            .expect("cli should parse");
        assert!(matches!(
            cli.command,
            Commands::Override(OverrideCommands::Remove { ref library_id, ref guide_id, .. })
                if library_id == "L9" && guide_id == "G1"
        ));
        assert!(Cli::try_parse_from(["dvr-control", "override", "remove", "match", "L9"]).is_err());
    }

    #[test]
    fn test_settings_unset_maps_document_key() {
        let cli = Cli::try_parse_from(["dvr-control", "settings", "unset", "client-id"])
            .expect("cli should parse");
        let Commands::Settings(SettingsCommands::Unset { key }) = cli.command else {
            panic!("expected settings unset");
        };
        assert_eq!(key.document_key(), "client_identifier");
        assert!(Cli::try_parse_from(["dvr-control", "settings", "unset", "colour"]).is_err());
    }

    #[test]
    fn test_settings_set_all_validates_port() {
        assert!(
            Cli::try_parse_from(["dvr-control", "settings", "set-all", "h", "port", "t", "c"]).is_err()
        );
    }
}
