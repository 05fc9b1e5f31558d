//! Recording scheduler
//!
//! Turns an unmatched guide episode into exactly one recording request:
//! - skips guide ids already pending in the DVR schedule
//! - skips guide ids this scheduler already submitted
//! - reports submission failures instead of retrying them

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::{
    AiringChannel, GuideEpisode, GuideId, RecordingSink, ShowIdentity, airing_minutes,
};
use crate::matching::MatchOutcome;

/// Why a recording submission failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("DVR rejected recording request with status {status}")]
    Rejected { status: u16 },

    #[error("Failed to reach DVR: {0}")]
    Transport(String),
}

/// Everything the DVR needs to record one episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingRequest {
    /// Show identity ("grandparent" fields)
    pub show: ShowIdentity,
    /// Year the show began
    pub show_year: Option<i32>,
    pub guid: String,
    pub title: String,
    pub season_index: Option<u32>,
    pub episode_index: Option<u32>,
    pub year: Option<i32>,
    /// Original air date (date portion only)
    pub originally_available_at: NaiveDate,
    /// Preferred airing time, minutes since midnight in `[0, 1440)`
    pub airing_minutes: u32,
    pub channel: Option<AiringChannel>,
}

impl RecordingRequest {
    /// Build the request for a guide episode.
    ///
    /// Returns `None` when the episode has no air timestamp to derive the
    /// airing time from.
    pub fn for_episode(guide_ep: &GuideEpisode, show_year: Option<i32>) -> Option<Self> {
        let aired_at = guide_ep.aired_at?;
        Some(Self {
            show: guide_ep.show.clone(),
            show_year,
            guid: guide_ep.guid.clone(),
            title: guide_ep.title.clone(),
            season_index: guide_ep.season_index,
            episode_index: guide_ep.episode_index,
            year: guide_ep.year,
            originally_available_at: aired_at.date(),
            airing_minutes: airing_minutes(aired_at),
            channel: guide_ep.channel.clone(),
        })
    }
}

/// Submits recordings for one reconciliation run
pub struct RecordingScheduler {
    sink: Arc<dyn RecordingSink>,
    submitted: HashSet<GuideId>,
}

impl RecordingScheduler {
    pub fn new(sink: Arc<dyn RecordingSink>) -> Self {
        Self {
            sink,
            submitted: HashSet::new(),
        }
    }

    /// Request a recording unless the episode is already queued
    pub async fn schedule(
        &mut self,
        guide_ep: &GuideEpisode,
        show_year: Option<i32>,
        pending: &HashSet<GuideId>,
    ) -> MatchOutcome {
        let guide_id = &guide_ep.guide_id;
        if pending.contains(guide_id) || self.submitted.contains(guide_id) {
            return MatchOutcome::AlreadyScheduled;
        }

        let Some(request) = RecordingRequest::for_episode(guide_ep, show_year) else {
            warn!(episode = %guide_ep.label(), "Guide episode has no air timestamp, not recording");
            return MatchOutcome::RecordingFailed {
                reason: "missing original air timestamp".to_string(),
            };
        };

        match self.sink.submit(&request).await {
            Ok(()) => {
                info!(
                    show = %request.show.title,
                    season = ?request.season_index,
                    episode = ?request.episode_index,
                    title = %request.title,
                    airing_minutes = request.airing_minutes,
                    "Added recording"
                );
                self.submitted.insert(guide_id.clone());
                MatchOutcome::RecordingRequested
            }
            Err(e) => {
                warn!(episode = %guide_ep.label(), error = %e, "Recording request failed");
                MatchOutcome::RecordingFailed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

impl std::fmt::Debug for RecordingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingScheduler")
            .field("submitted", &self.submitted.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    struct RecordingLog {
        requests: Mutex<Vec<RecordingRequest>>,
        fail_with: Option<SubmitError>,
    }

    #[async_trait]
    impl RecordingSink for RecordingLog {
        async fn submit(&self, request: &RecordingRequest) -> Result<(), SubmitError> {
            self.requests.lock().unwrap().push(request.clone());
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    fn episode() -> GuideEpisode {
        let mut ep = GuideEpisode::new(
            "com.gracenote.onconnect://episode/G3",
            "Unrelated Title",
            Some(3),
            Some(1),
        );
        ep.aired_at = NaiveDateTime::parse_from_str("2018-06-12 20:30:00", "%Y-%m-%d %H:%M:%S").ok();
        ep.year = Some(2018);
        ep.show = ShowIdentity {
            guid: "com.gracenote.onconnect://show/SH1".to_string(),
            title: "Some Show".to_string(),
            thumb: None,
        };
        ep
    }

    #[tokio::test]
    async fn test_schedule_submits_one_request() {
        let sink = Arc::new(RecordingLog::default());
        let mut scheduler = RecordingScheduler::new(sink.clone());

        let outcome = scheduler.schedule(&episode(), Some(2015), &HashSet::new()).await;

        assert_eq!(outcome, MatchOutcome::RecordingRequested);
        let requests = sink.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].airing_minutes, 270);
        assert_eq!(requests[0].originally_available_at, NaiveDate::from_ymd_opt(2018, 6, 12).unwrap());
        assert_eq!(requests[0].show_year, Some(2015));
        assert_eq!(requests[0].guid, "com.gracenote.onconnect://episode/G3");
    }

    #[tokio::test]
    async fn test_pending_episode_is_never_submitted() {
        let sink = Arc::new(RecordingLog::default());
        let mut scheduler = RecordingScheduler::new(sink.clone());
        let pending: HashSet<GuideId> = [GuideId::new("G3")].into_iter().collect();

        for _ in 0..2 {
            let outcome = scheduler.schedule(&episode(), Some(2015), &pending).await;
            assert_eq!(outcome, MatchOutcome::AlreadyScheduled);
        }
        assert!(sink.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_schedule_in_same_run_is_skipped() {
        let sink = Arc::new(RecordingLog::default());
        let mut scheduler = RecordingScheduler::new(sink.clone());

        let first = scheduler.schedule(&episode(), None, &HashSet::new()).await;
        let second = scheduler.schedule(&episode(), None, &HashSet::new()).await;

        assert_eq!(first, MatchOutcome::RecordingRequested);
        assert_eq!(second, MatchOutcome::AlreadyScheduled);
        assert_eq!(sink.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_submission_is_reported() {
        let sink = Arc::new(RecordingLog {
            fail_with: Some(SubmitError::Rejected { status: 400 }),
            ..Default::default()
        });
        let mut scheduler = RecordingScheduler::new(sink.clone());

        let outcome = scheduler.schedule(&episode(), None, &HashSet::new()).await;
        assert_eq!(
            outcome,
            MatchOutcome::RecordingFailed {
                reason: "DVR rejected recording request with status 400".to_string()
            }
        );

        // A failed submission does not count as submitted
        let retry = scheduler.schedule(&episode(), None, &HashSet::new()).await;
        assert!(matches!(retry, MatchOutcome::RecordingFailed { .. }));
        assert_eq!(sink.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_air_timestamp_is_not_submitted() {
        let sink = Arc::new(RecordingLog::default());
        let mut scheduler = RecordingScheduler::new(sink.clone());
        let mut ep = episode();
        ep.aired_at = None;

        let outcome = scheduler.schedule(&ep, None, &HashSet::new()).await;
        assert!(matches!(outcome, MatchOutcome::RecordingFailed { .. }));
        assert!(sink.requests.lock().unwrap().is_empty());
    }
}
