//! Core types shared by the library and guide catalogs
//!
//! The two catalogs use disjoint identifier spaces. [`LibraryId`] and [`GuideId`]
//! are distinct newtypes so one can never be compared against the other.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Identifier of an item in the local media library (Plex `ratingKey`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryId(String);

impl LibraryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LibraryId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of an episode or show in the broadcast guide
///
/// The guide reports identifiers in several shapes:
/// - full guids: `com.gracenote.onconnect://episode/EP000000000001`
/// - URL-encoded rating keys: `...%2FEP000000000001`
/// - bare ids typed by an operator: `EP000000000001`
///
/// All of them normalize to the trailing segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuideId(String);

impl GuideId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref().trim();
        let after_encoded = raw.rsplit("%2F").next().unwrap_or(raw);
        let after_encoded = after_encoded.rsplit("%2f").next().unwrap_or(after_encoded);
        let segment = after_encoded.rsplit('/').next().unwrap_or(after_encoded);
        Self(segment.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GuideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GuideId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A season as listed by either catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeasonRef {
    /// Season number, when the catalog reports a numeric one
    pub index: Option<u32>,
    /// Catalog path that lists this season's episodes
    pub direct_reference: String,
    /// Year the show began (guide only, taken from the season container)
    pub show_year: Option<i32>,
}

/// One episode as held in the local library
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryEpisode {
    pub library_id: LibraryId,
    pub title: String,
    pub season_index: Option<u32>,
    pub episode_index: Option<u32>,
    pub aired_date: Option<NaiveDate>,
}

impl LibraryEpisode {
    pub fn new(
        library_id: impl Into<LibraryId>,
        title: impl Into<String>,
        season_index: Option<u32>,
        episode_index: Option<u32>,
    ) -> Self {
        Self {
            library_id: library_id.into(),
            title: title.into(),
            season_index,
            episode_index,
            aired_date: None,
        }
    }
}

/// Show identity carried by every guide episode ("grandparent" in Plex terms)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShowIdentity {
    pub guid: String,
    pub title: String,
    pub thumb: Option<String>,
}

/// Channel an episode airs on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AiringChannel {
    pub identifier: String,
    pub title: String,
}

/// One episode as listed by the broadcast guide
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuideEpisode {
    pub guide_id: GuideId,
    /// Provider guid exactly as listed (sent back when requesting a recording)
    pub guid: String,
    pub title: String,
    pub season_index: Option<u32>,
    pub episode_index: Option<u32>,
    /// Original air timestamp, in the provider's local wall-clock time
    pub aired_at: Option<NaiveDateTime>,
    /// Episode year as listed
    pub year: Option<i32>,
    pub show: ShowIdentity,
    pub channel: Option<AiringChannel>,
}

impl GuideEpisode {
    pub fn new(
        guid: impl Into<String>,
        title: impl Into<String>,
        season_index: Option<u32>,
        episode_index: Option<u32>,
    ) -> Self {
        let guid = guid.into();
        Self {
            guide_id: GuideId::new(&guid),
            guid,
            title: title.into(),
            season_index,
            episode_index,
            aired_at: None,
            year: None,
            show: ShowIdentity::default(),
            channel: None,
        }
    }

    pub fn aired_date(&self) -> Option<NaiveDate> {
        self.aired_at.map(|at| at.date())
    }

    /// Short label used in logs: `Title (S1E3, guide EP000000000001)`
    pub fn label(&self) -> String {
        format!(
            "{} (S{}E{}, guide {})",
            self.title,
            display_index(self.season_index),
            display_index(self.episode_index),
            self.guide_id
        )
    }
}

/// Preferred airing time for a recording, in minutes since midnight.
///
/// The DVR expects the air timestamp's hour shifted by eight hours and
/// normalized into `[0, 1440)`. The arithmetic runs in floating point and
/// truncates, matching what the DVR web client sends.
pub fn airing_minutes(aired_at: NaiveDateTime) -> u32 {
    let hour = aired_at.hour() as f64;
    let minute = aired_at.minute() as f64;
    let minutes = (((hour + 8.0) + minute / 60.0) * 60.0) as i64;
    minutes.rem_euclid(1440) as u32
}

fn display_index(index: Option<u32>) -> String {
    index.map_or_else(|| "?".to_string(), |i| i.to_string())
}

/// One show returned by a title search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShowHit {
    pub title: String,
    /// Key to pass back to `reconcile` (library key or guide show id)
    pub key: String,
}
