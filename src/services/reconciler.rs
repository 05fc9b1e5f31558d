//! Reconciliation driver
//!
//! For one show known to both catalogs:
//! 1. Pull the pending schedule once
//! 2. Pull every library season and episode
//! 3. Walk the guide seasons and episodes in guide order, resolving each
//!    episode and scheduling a recording for the ones still missing
//!
//! Any catalog retrieval failure aborts the show. Recording failures are
//! reported per episode and the walk continues.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use super::scheduler::RecordingScheduler;
use crate::catalog::{
    GuideCatalog, GuideEpisode, GuideId, LibraryCatalog, LibraryEpisode, RecordingSink,
    ScheduleSource, ShowHit,
};
use crate::matching::{MatchOutcome, MatchReason, MatchResolver, MatchingConfig, Resolution};
use crate::store::Overrides;

/// A show as identified in both catalogs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShowPair {
    /// Library show key (Plex `ratingKey`)
    pub library_key: String,
    /// Guide show id
    pub guide_id: GuideId,
}

impl ShowPair {
    pub fn new(library_key: impl Into<String>, guide_id: impl AsRef<str>) -> Self {
        Self {
            library_key: library_key.into(),
            guide_id: GuideId::new(guide_id),
        }
    }
}

/// Outcome for one guide episode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub guide_id: GuideId,
    pub title: String,
    pub season_index: Option<u32>,
    pub episode_index: Option<u32>,
    #[serde(flatten)]
    pub outcome: MatchOutcome,
    /// Why the episode matched, for matched outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_reason: Option<MatchReason>,
}

/// Per-outcome totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub matched: usize,
    pub already_scheduled: usize,
    pub recording_requested: usize,
    pub recording_failed: usize,
}

/// Result of reconciling one show
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub show: ShowPair,
    pub entries: Vec<ReportEntry>,
}

impl ReconciliationReport {
    /// Outcomes in guide traversal order
    pub fn outcomes(&self) -> Vec<&MatchOutcome> {
        self.entries.iter().map(|e| &e.outcome).collect()
    }

    pub fn counts(&self) -> ReportCounts {
        let mut counts = ReportCounts::default();
        for entry in &self.entries {
            match entry.outcome {
                MatchOutcome::Matched { .. } => counts.matched += 1,
                MatchOutcome::AlreadyScheduled => counts.already_scheduled += 1,
                MatchOutcome::RecordingRequested => counts.recording_requested += 1,
                MatchOutcome::RecordingFailed { .. } => counts.recording_failed += 1,
            }
        }
        counts
    }
}

/// Shows found by a title search in each catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TitleSearch {
    pub library: Vec<ShowHit>,
    pub guide: Vec<ShowHit>,
}

/// Drives matching and recording over whole shows
pub struct Reconciler {
    library: Arc<dyn LibraryCatalog>,
    guide: Arc<dyn GuideCatalog>,
    schedule: Arc<dyn ScheduleSource>,
    sink: Arc<dyn RecordingSink>,
    resolver: MatchResolver,
}

impl Reconciler {
    pub fn new(
        library: Arc<dyn LibraryCatalog>,
        guide: Arc<dyn GuideCatalog>,
        schedule: Arc<dyn ScheduleSource>,
        sink: Arc<dyn RecordingSink>,
        matching: MatchingConfig,
    ) -> Self {
        Self {
            library,
            guide,
            schedule,
            sink,
            resolver: MatchResolver::new(matching),
        }
    }

    /// Reconcile every guide episode of a show against the library
    pub async fn reconcile(&self, show: &ShowPair, overrides: &Overrides) -> Result<ReconciliationReport> {
        info!(
            library_key = %show.library_key,
            guide_id = %show.guide_id,
            "Reconciling show"
        );

        let pending = self
            .schedule
            .current_schedule()
            .await
            .context("Failed to fetch the pending recording schedule")?;
        let library_eps = self.library_episodes(&show.library_key).await?;

        let guide_seasons = self
            .guide
            .list_seasons(&show.guide_id)
            .await
            .with_context(|| format!("Failed to list guide seasons for {}", show.guide_id))?;
        let show_year = guide_seasons.iter().find_map(|s| s.show_year);

        let mut scheduler = RecordingScheduler::new(self.sink.clone());
        let mut entries = Vec::new();

        for season in &guide_seasons {
            let guide_eps = self.guide.list_episodes(season).await.with_context(|| {
                format!("Failed to list guide episodes for {}", season.direct_reference)
            })?;

            for guide_ep in &guide_eps {
                let entry = self
                    .reconcile_episode(guide_ep, &library_eps, overrides, &pending, show_year, &mut scheduler)
                    .await;
                entries.push(entry);
            }
        }

        let report = ReconciliationReport {
            show: show.clone(),
            entries,
        };
        let counts = report.counts();
        info!(
            matched = counts.matched,
            already_scheduled = counts.already_scheduled,
            recording_requested = counts.recording_requested,
            recording_failed = counts.recording_failed,
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn reconcile_episode(
        &self,
        guide_ep: &GuideEpisode,
        library_eps: &[LibraryEpisode],
        overrides: &Overrides,
        pending: &HashSet<GuideId>,
        show_year: Option<i32>,
        scheduler: &mut RecordingScheduler,
    ) -> ReportEntry {
        let (outcome, match_reason) =
            match self.resolver.resolve(guide_ep, library_eps, overrides, pending) {
                Resolution::Matched { library_id, reason } => {
                    (MatchOutcome::Matched { library_id }, Some(reason))
                }
                Resolution::AlreadyScheduled => (MatchOutcome::AlreadyScheduled, None),
                Resolution::NeedsRecording => {
                    (scheduler.schedule(guide_ep, show_year, pending).await, None)
                }
            };

        log_outcome(guide_ep, &outcome);

        ReportEntry {
            guide_id: guide_ep.guide_id.clone(),
            title: guide_ep.title.clone(),
            season_index: guide_ep.season_index,
            episode_index: guide_ep.episode_index,
            outcome,
            match_reason,
        }
    }

    async fn library_episodes(&self, show_key: &str) -> Result<Vec<LibraryEpisode>> {
        let seasons = self
            .library
            .list_seasons(show_key)
            .await
            .with_context(|| format!("Failed to list library seasons for {}", show_key))?;

        let mut episodes = Vec::new();
        for season in &seasons {
            let season_eps = self.library.list_episodes(season).await.with_context(|| {
                format!("Failed to list library episodes for {}", season.direct_reference)
            })?;
            episodes.extend(season_eps);
        }

        debug!(seasons = seasons.len(), episodes = episodes.len(), "Loaded library episodes");
        Ok(episodes)
    }

    /// List shows matching a title in both catalogs. No matching is done.
    pub async fn search_by_title(&self, text: &str) -> Result<TitleSearch> {
        let library = self
            .library
            .search_shows(text)
            .await
            .context("Library title search failed")?;
        let guide = self
            .guide
            .search_shows(text)
            .await
            .context("Guide title search failed")?;
        Ok(TitleSearch { library, guide })
    }

    /// Look up one guide episode by season and episode number.
    ///
    /// Unknown seasons or episodes yield `None`.
    pub async fn find_guide_episode(
        &self,
        show_id: &GuideId,
        season_index: u32,
        episode_index: u32,
    ) -> Result<Option<GuideEpisode>> {
        let seasons = self
            .guide
            .list_seasons(show_id)
            .await
            .with_context(|| format!("Failed to list guide seasons for {}", show_id))?;

        let Some(season) = seasons.iter().find(|s| s.index == Some(season_index)) else {
            return Ok(None);
        };

        let episodes = self.guide.list_episodes(season).await.with_context(|| {
            format!("Failed to list guide episodes for {}", season.direct_reference)
        })?;
        Ok(episodes
            .into_iter()
            .find(|ep| ep.episode_index == Some(episode_index)))
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("matching", self.resolver.config())
            .finish()
    }
}

fn log_outcome(guide_ep: &GuideEpisode, outcome: &MatchOutcome) {
    let season = guide_ep.season_index;
    let episode = guide_ep.episode_index;
    match outcome {
        MatchOutcome::Matched { library_id } => info!(
            guide_id = %guide_ep.guide_id,
            ?season,
            ?episode,
            title = %guide_ep.title,
            outcome = outcome.kind(),
            library_id = %library_id,
            "Guide episode {} matched library episode {}. Use `override set unmatch` to correct matching errors.",
            guide_ep.label(),
            library_id
        ),
        MatchOutcome::AlreadyScheduled => info!(
            guide_id = %guide_ep.guide_id,
            ?season,
            ?episode,
            title = %guide_ep.title,
            outcome = outcome.kind(),
            "Guide episode {} already in recording schedule. Skipping.",
            guide_ep.label()
        ),
        MatchOutcome::RecordingRequested => info!(
            guide_id = %guide_ep.guide_id,
            ?season,
            ?episode,
            title = %guide_ep.title,
            outcome = outcome.kind(),
            "Guide episode {} not found in library, added recording. Use `override set match` to correct missing matches.",
            guide_ep.label()
        ),
        MatchOutcome::RecordingFailed { reason } => info!(
            guide_id = %guide_ep.guide_id,
            ?season,
            ?episode,
            title = %guide_ep.title,
            outcome = outcome.kind(),
            reason = %reason,
            "Guide episode {} not found in library, but the recording could not be added",
            guide_ep.label()
        ),
    }
}
