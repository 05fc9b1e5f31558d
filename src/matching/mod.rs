//! Episode matching
//!
//! Decides whether a guide episode is already held in the library.
//! - [`similarity`]: title ratio and positional signal
//! - [`resolver`]: override-aware, first-match-wins resolution

pub mod resolver;
pub mod similarity;

use serde::{Deserialize, Serialize};

use crate::catalog::LibraryId;

pub use resolver::{MatchReason, MatchResolver, Resolution};

/// Default threshold for the title-only test
pub const DEFAULT_TITLE_THRESHOLD: f64 = 0.90;

/// Default threshold for the title test when season/episode already agree
pub const DEFAULT_POSITIONAL_THRESHOLD: f64 = 0.70;

/// Similarity thresholds, both compared with a strict `>`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub title_threshold: f64,
    pub positional_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            title_threshold: DEFAULT_TITLE_THRESHOLD,
            positional_threshold: DEFAULT_POSITIONAL_THRESHOLD,
        }
    }
}

/// Final result for one guide episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched { library_id: LibraryId },
    AlreadyScheduled,
    RecordingRequested,
    RecordingFailed { reason: String },
}

impl MatchOutcome {
    /// Stable lowercase name used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            MatchOutcome::Matched { .. } => "matched",
            MatchOutcome::AlreadyScheduled => "already_scheduled",
            MatchOutcome::RecordingRequested => "recording_requested",
            MatchOutcome::RecordingFailed { .. } => "recording_failed",
        }
    }
}

impl std::fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchOutcome::Matched { library_id } => write!(f, "matched library {}", library_id),
            MatchOutcome::AlreadyScheduled => write!(f, "already scheduled"),
            MatchOutcome::RecordingRequested => write!(f, "recording requested"),
            MatchOutcome::RecordingFailed { reason } => write!(f, "recording failed: {}", reason),
        }
    }
}
