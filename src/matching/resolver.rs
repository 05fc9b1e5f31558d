//! Match resolution for a single guide episode
//!
//! Precedence:
//! 1. Library candidates force-unmatched against the guide episode are ignored.
//! 2. A force-match against a candidate present in the library wins outright.
//! 3. Candidates are scanned in catalog order; the first one passing either the
//!    title test or the positional test is the match. There is no search for a
//!    best-scoring candidate, so a weaker candidate listed earlier wins over a
//!    stronger one listed later.
//! 4. Unmatched episodes already in the pending schedule are left alone.

use std::collections::HashSet;

use serde::Serialize;
use tracing::trace;

use super::MatchingConfig;
use super::similarity::{same_position, score};
use crate::catalog::{GuideEpisode, GuideId, LibraryEpisode, LibraryId};
use crate::store::Overrides;

/// Why a guide episode matched a library episode
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MatchReason {
    ForceMatch,
    Title { score: f64 },
    Position { score: f64 },
}

/// Resolver verdict before any recording is attempted
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Matched {
        library_id: LibraryId,
        reason: MatchReason,
    },
    AlreadyScheduled,
    NeedsRecording,
}

/// Resolves guide episodes against a library snapshot
#[derive(Debug, Clone, Default)]
pub struct MatchResolver {
    config: MatchingConfig,
}

impl MatchResolver {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Resolve one guide episode
    pub fn resolve(
        &self,
        guide_ep: &GuideEpisode,
        library_eps: &[LibraryEpisode],
        overrides: &Overrides,
        pending: &HashSet<GuideId>,
    ) -> Resolution {
        let guide_id = &guide_ep.guide_id;
        let candidates = move || {
            library_eps
                .iter()
                .filter(move |lib_ep| !overrides.is_force_unmatched(&lib_ep.library_id, guide_id))
        };

        if let Some(lib_ep) =
            candidates().find(|lib_ep| overrides.is_force_matched(&lib_ep.library_id, guide_id))
        {
            return Resolution::Matched {
                library_id: lib_ep.library_id.clone(),
                reason: MatchReason::ForceMatch,
            };
        }

        for lib_ep in candidates() {
            if let Some(reason) = self.compare(guide_ep, lib_ep) {
                return Resolution::Matched {
                    library_id: lib_ep.library_id.clone(),
                    reason,
                };
            }
        }

        if pending.contains(guide_id) {
            Resolution::AlreadyScheduled
        } else {
            Resolution::NeedsRecording
        }
    }

    /// Apply the title test, then the positional test, to one candidate
    fn compare(&self, guide_ep: &GuideEpisode, lib_ep: &LibraryEpisode) -> Option<MatchReason> {
        let similarity = score(&guide_ep.title, &lib_ep.title);
        trace!(
            guide_id = %guide_ep.guide_id,
            library_id = %lib_ep.library_id,
            similarity,
            "Compared titles"
        );

        if similarity > self.config.title_threshold {
            return Some(MatchReason::Title { score: similarity });
        }

        // Candidates without numeric indices only get the title test
        if same_position(guide_ep, lib_ep) && similarity > self.config.positional_threshold {
            return Some(MatchReason::Position { score: similarity });
        }

        None
    }
}
