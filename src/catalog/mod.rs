//! Catalog collaborators
//!
//! The reconciliation engine only sees the library, the guide, the pending
//! schedule and the recording sink through these traits. The Plex client in
//! [`crate::services::plex`] implements all of them; tests substitute fakes.

pub mod types;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

pub use types::{
    AiringChannel, GuideEpisode, GuideId, LibraryEpisode, LibraryId, SeasonRef, ShowHit,
    ShowIdentity, airing_minutes,
};

use crate::services::scheduler::{RecordingRequest, SubmitError};

/// The locally held media library
#[async_trait]
pub trait LibraryCatalog: Send + Sync {
    /// List the seasons of a library show
    async fn list_seasons(&self, show_key: &str) -> Result<Vec<SeasonRef>>;

    /// List the episodes of one season, in catalog order
    async fn list_episodes(&self, season: &SeasonRef) -> Result<Vec<LibraryEpisode>>;

    /// Find library shows by title
    async fn search_shows(&self, title: &str) -> Result<Vec<ShowHit>>;
}

/// The broadcast guide / DVR listings
#[async_trait]
pub trait GuideCatalog: Send + Sync {
    /// List the seasons of a guide show
    async fn list_seasons(&self, show_id: &GuideId) -> Result<Vec<SeasonRef>>;

    /// List the episodes of one season, in guide order
    async fn list_episodes(&self, season: &SeasonRef) -> Result<Vec<GuideEpisode>>;

    /// Find guide shows by title
    async fn search_shows(&self, title: &str) -> Result<Vec<ShowHit>>;
}

/// Source of guide ids already queued for recording
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn current_schedule(&self) -> Result<HashSet<GuideId>>;
}

/// Destination for recording requests
#[async_trait]
pub trait RecordingSink: Send + Sync {
    async fn submit(&self, request: &RecordingRequest) -> Result<(), SubmitError>;
}
