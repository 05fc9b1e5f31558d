//! Plex Media Server client
//!
//! One client serves as library catalog, guide catalog, schedule source and
//! recording sink. Listings are XML `MediaContainer` documents parsed in
//! [`xml`].

mod client;
pub mod xml;

pub use client::{PlexClient, recording_query};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlexError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Plex request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Plex returned status {status} for {path}")]
    Status { path: String, status: u16 },

    #[error("Failed to parse Plex response: {0}")]
    Xml(String),
}
