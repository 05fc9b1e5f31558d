//! Command dispatch.
//!
//! Used by the binary once logging is up. Each command builds only the
//! collaborators it needs: settings and override commands never touch Plex.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::catalog::{GuideEpisode, GuideId, LibraryId};
use crate::cli::{Cli, Commands, OverrideCommands, SettingsCommands};
use crate::config::Config;
use crate::services::{PlexClient, ReconciliationReport, Reconciler, ShowPair, TitleSearch};
use crate::store::{OverrideKind, OverrideStore, SERVER_SETTINGS, SettingsStore};

/// Keys written by `settings set-all`, in argument order
const SERVER_KEYS: [&str; 4] = ["host", "port", "plex_token", "client_identifier"];

pub async fn run(cli: Cli) -> Result<()> {
    let settings = SettingsStore::new(&cli.settings);

    match cli.command {
        Commands::Reconcile {
            library_key,
            guide_id,
        } => {
            let reconciler = connect(&settings)?;
            let overrides = OverrideStore::open(settings.clone())?;
            let show = ShowPair::new(library_key, guide_id);
            let report = reconciler.reconcile(&show, overrides.overrides()).await?;
            print_report(&report, cli.json)
        }
        Commands::Search { title } => {
            let reconciler = connect(&settings)?;
            let hits = reconciler.search_by_title(&title).await?;
            print_search(&hits, cli.json)
        }
        Commands::Episode {
            guide_id,
            season,
            episode,
        } => {
            let reconciler = connect(&settings)?;
            let found = reconciler
                .find_guide_episode(&GuideId::new(&guide_id), season, episode)
                .await?;
            print_episode(found.as_ref(), cli.json)
        }
        Commands::Override(command) => run_override(command, settings, cli.json),
        Commands::Settings(command) => run_settings(command, &settings, cli.json),
    }
}

fn connect(settings: &SettingsStore) -> Result<Reconciler> {
    let document = settings.load()?;
    let config = Config::load(&document, settings.path()).context("Invalid configuration")?;
    info!(server = %config.base_url(), "Connecting to Plex");

    let plex = Arc::new(PlexClient::new(&config)?);
    Ok(Reconciler::new(
        plex.clone(),
        plex.clone(),
        plex.clone(),
        plex,
        config.matching,
    ))
}

fn run_override(command: OverrideCommands, settings: SettingsStore, json: bool) -> Result<()> {
    let mut store = OverrideStore::open(settings)?;

    match command {
        OverrideCommands::Set {
            kind,
            library_id,
            guide_id,
        } => {
            let kind = OverrideKind::from(kind);
            store.set_override(LibraryId::new(library_id), GuideId::new(guide_id), kind)?;
        }
        OverrideCommands::Remove {
            kind,
            library_id,
            guide_id,
        } => {
            let kind = OverrideKind::from(kind);
            let library_id = LibraryId::new(library_id);
            let guide_id = GuideId::new(guide_id);
            if !store.remove_override(&library_id, &guide_id, kind)? {
                println!("No {} override for {} -> {}", kind, library_id, guide_id);
            }
        }
        OverrideCommands::List => {
            let entries = store.overrides().entries();
            if json {
                return print_json(&entries);
            }
            if entries.is_empty() {
                println!("No overrides");
            }
            for entry in entries {
                println!("{}\t{} -> {}", entry.kind, entry.library_id, entry.guide_id);
            }
        }
    }
    Ok(())
}

fn run_settings(command: SettingsCommands, settings: &SettingsStore, json: bool) -> Result<()> {
    match command {
        SettingsCommands::SetAll {
            host,
            port,
            token,
            client_id,
        } => {
            let values = [host, port.to_string(), token, client_id];
            settings.edit(|doc| {
                for (name, value) in SERVER_KEYS.iter().zip(values) {
                    doc.set(SERVER_SETTINGS, name, value);
                }
                Ok::<_, crate::store::SettingsError>(())
            })?;
            info!(path = %settings.path().display(), "Server settings saved");
        }
        SettingsCommands::Set(values) => {
            let entries = values.entries();
            anyhow::ensure!(!entries.is_empty(), "Nothing to set; pass at least one option");
            settings.edit(|doc| {
                for (name, value) in entries {
                    doc.set(SERVER_SETTINGS, name, value);
                }
                Ok::<_, crate::store::SettingsError>(())
            })?;
            info!(path = %settings.path().display(), "Server settings saved");
        }
        SettingsCommands::Unset { key } => {
            let name = key.document_key();
            if settings.remove(SERVER_SETTINGS, name)?.is_none() {
                println!("{} is not set", name);
            } else {
                info!(path = %settings.path().display(), setting = name, "Server setting removed");
            }
        }
        SettingsCommands::Show => {
            let shown: Vec<(String, String)> = settings
                .load()?
                .category(SERVER_SETTINGS)
                .into_iter()
                .map(|(name, value)| {
                    let value = if name == "plex_token" { redact(&value) } else { value };
                    (name, value)
                })
                .collect();
            if json {
                return print_json(&shown.into_iter().collect::<std::collections::BTreeMap<_, _>>());
            }
            for (name, value) in shown {
                println!("{}: {}", name, value);
            }
        }
    }
    Ok(())
}

fn redact(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    if token.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_report(report: &ReconciliationReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    for entry in &report.entries {
        let season = entry.season_index.map_or("?".to_string(), |s| s.to_string());
        let episode = entry.episode_index.map_or("?".to_string(), |e| e.to_string());
        println!(
            "S{}E{}\t{}\t{}\t{}",
            season, episode, entry.guide_id, entry.title, entry.outcome
        );
    }
    let counts = report.counts();
    println!(
        "{} matched, {} already scheduled, {} requested, {} failed",
        counts.matched,
        counts.already_scheduled,
        counts.recording_requested,
        counts.recording_failed
    );
    Ok(())
}

fn print_search(hits: &TitleSearch, json: bool) -> Result<()> {
    if json {
        return print_json(hits);
    }
    println!("Library Listings");
    for hit in &hits.library {
        println!("\t{} - {}", hit.title, hit.key);
    }
    println!("DVR Guide Listings");
    for hit in &hits.guide {
        println!("\t{} - {}", hit.title, hit.key);
    }
    Ok(())
}

fn print_episode(found: Option<&GuideEpisode>, json: bool) -> Result<()> {
    if json {
        return print_json(&found);
    }
    match found {
        Some(ep) => {
            println!("{}", ep.label());
            if let Some(aired_at) = ep.aired_at {
                println!("\taired: {}", aired_at);
            }
            if let Some(channel) = &ep.channel {
                println!("\tchannel: {} ({})", channel.title, channel.identifier);
            }
        }
        None => println!("No such episode in the guide"),
    }
    Ok(())
}
