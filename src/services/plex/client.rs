use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::{PlexError, xml};
use crate::catalog::{
    GuideCatalog, GuideEpisode, GuideId, LibraryCatalog, LibraryEpisode, RecordingSink,
    ScheduleSource, SeasonRef, ShowHit,
};
use crate::config::Config;
use crate::services::scheduler::{RecordingRequest, SubmitError};

/// Guid prefix the guide uses for shows
const GUIDE_SHOW_GUID_PREFIX: &str = "com.gracenote.onconnect://show/";

/// Plex client identity sent with recording requests, as the web client does
const CLIENT_IDENTITY: &[(&str, &str)] = &[
    ("X-Plex-Product", "Plex Web"),
    ("X-Plex-Version", "3.77.4"),
    ("X-Plex-Platform", "Chrome"),
    ("X-Plex-Platform-Version", "67.0"),
    ("X-Plex-Sync-Version", "2"),
    ("X-Plex-Device", "Windows"),
    ("X-Plex-Device-Name", "Chrome"),
    ("X-Plex-Device-Screen-Resolution", "1920x1080"),
    ("X-Plex-Language", "en"),
];

/// Plex Media Server client
pub struct PlexClient {
    client: Client,
    base_url: String,
    token: String,
    client_identifier: String,
    library_section_id: u32,
    media_provider_id: u32,
    epg_provider: String,
}

impl PlexClient {
    pub fn new(config: &Config) -> Result<Self, PlexError> {
        let client = Client::builder()
            .user_agent("dvr-control/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(PlexError::Client)?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            token: config.token.clone(),
            client_identifier: config.client_identifier.clone(),
            library_section_id: config.library_section_id,
            media_provider_id: config.media_provider_id,
            epg_provider: config.epg_provider.clone(),
        })
    }

    /// GET a Plex path and return the response body
    async fn get_xml(&self, path: &str, query: &[(&str, &str)]) -> Result<String, PlexError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(path = %path, "Plex GET");

        let transport = |source| PlexError::Transport {
            path: path.to_string(),
            source,
        };

        let response = self
            .client
            .get(&url)
            .header("X-Plex-Token", &self.token)
            .header("Accept", "application/xml")
            .query(query)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(PlexError::Status {
                path: path.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(transport)
    }

    fn guide_show_path(&self, show_id: &GuideId) -> String {
        let guid = format!("{}{}", GUIDE_SHOW_GUID_PREFIX, show_id);
        format!(
            "/{}/metadata/{}/children",
            self.epg_provider,
            urlencoding::encode(&guid)
        )
    }
}

impl std::fmt::Debug for PlexClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlexClient")
            .field("base_url", &self.base_url)
            .field("client_identifier", &self.client_identifier)
            .field("library_section_id", &self.library_section_id)
            .field("epg_provider", &self.epg_provider)
            .finish()
    }
}

#[async_trait]
impl LibraryCatalog for PlexClient {
    async fn list_seasons(&self, show_key: &str) -> Result<Vec<SeasonRef>> {
        let path = format!("/library/metadata/{}/children", show_key.trim());
        let body = self.get_xml(&path, &[]).await?;
        Ok(xml::library_seasons(&body)?)
    }

    async fn list_episodes(&self, season: &SeasonRef) -> Result<Vec<LibraryEpisode>> {
        let body = self.get_xml(&season.direct_reference, &[]).await?;
        Ok(xml::library_episodes(&body)?)
    }

    async fn search_shows(&self, title: &str) -> Result<Vec<ShowHit>> {
        info!(query = %title, "Searching Plex library for shows");
        let path = format!("/library/sections/{}/all", self.library_section_id);
        let body = self
            .get_xml(&path, &[("type", "2"), ("title", title)])
            .await?;
        Ok(xml::library_show_hits(&body)?)
    }
}

#[async_trait]
impl GuideCatalog for PlexClient {
    async fn list_seasons(&self, show_id: &GuideId) -> Result<Vec<SeasonRef>> {
        let body = self.get_xml(&self.guide_show_path(show_id), &[]).await?;
        Ok(xml::guide_seasons(&body)?)
    }

    async fn list_episodes(&self, season: &SeasonRef) -> Result<Vec<GuideEpisode>> {
        let body = self.get_xml(&season.direct_reference, &[]).await?;
        Ok(xml::guide_episodes(&body)?)
    }

    async fn search_shows(&self, title: &str) -> Result<Vec<ShowHit>> {
        info!(query = %title, "Searching Plex guide for shows");
        let path = format!("/{}/search", self.epg_provider);
        let body = self.get_xml(&path, &[("query", title)]).await?;
        Ok(xml::guide_show_hits(&body)?)
    }
}

#[async_trait]
impl ScheduleSource for PlexClient {
    async fn current_schedule(&self) -> Result<HashSet<GuideId>> {
        let body = self.get_xml("/media/subscriptions", &[]).await?;
        let pending: HashSet<GuideId> = xml::subscription_guids(&body)?.into_iter().collect();
        debug!(count = pending.len(), "Loaded recording schedule");
        Ok(pending)
    }
}

#[async_trait]
impl RecordingSink for PlexClient {
    async fn submit(&self, request: &RecordingRequest) -> Result<(), SubmitError> {
        let query = recording_query(
            request,
            &self.client_identifier,
            &self.token,
            self.library_section_id,
            self.media_provider_id,
        );
        let url = format!("{}/media/subscriptions?{}", self.base_url, query);

        let response = self
            .client
            .post(&url)
            .header("X-Plex-Token", &self.token)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Percent-encode everything outside the unreserved set, except `safe`
fn quote(raw: &str, safe: &[char]) -> String {
    let mut encoded = urlencoding::encode(raw).into_owned();
    for c in safe {
        encoded = encoded.replace(&format!("%{:02X}", *c as u32), &c.to_string());
    }
    encoded
}

fn join(params: &[(&str, String)], safe: &[char]) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{}={}", quote(name, safe), quote(value, safe)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Query string for a `POST /media/subscriptions` recording request.
///
/// Recording preferences are fully encoded. The hint and param groups keep
/// their square brackets literal, and the airing channel is encoded twice.
pub fn recording_query(
    request: &RecordingRequest,
    client_identifier: &str,
    token: &str,
    library_section_id: u32,
    media_provider_id: u32,
) -> String {
    let prefs: Vec<(&str, String)> = vec![
        ("prefs[minVideoQuality]", "0".into()),
        ("prefs[replaceLowerQuality]", "false".into()),
        ("prefs[recordPartials]", "false".into()),
        ("prefs[startOffsetMinutes]", "0".into()),
        ("prefs[endOffsetMinutes]", "0".into()),
        ("prefs[lineupChannel]", String::new()),
        ("prefs[startTimeslot]", "-1".into()),
        ("prefs[comskipEnabled]", "1".into()),
        ("prefs[oneShot]", "true".into()),
        ("targetLibrarySectionID", library_section_id.to_string()),
        ("targetSectionLocationID", String::new()),
        ("includeGrabs", "1".into()),
    ];

    let optional = |value: Option<u32>| value.map(|v| v.to_string()).unwrap_or_default();
    let channel = request
        .channel
        .as_ref()
        .map(|c| quote(&format!("{}={}", c.identifier, c.title), &['/']))
        .unwrap_or_default();

    let mut hints: Vec<(&str, String)> = vec![
        ("hints[grandparentGuid]", request.show.guid.clone()),
        ("hints[grandparentThumb]", request.show.thumb.clone().unwrap_or_default()),
        ("hints[grandparentTitle]", request.show.title.clone()),
        ("hints[grandparentYear]", request.show_year.map(|y| y.to_string()).unwrap_or_default()),
        ("hints[guid]", request.guid.clone()),
        ("hints[index]", optional(request.episode_index)),
        (
            "hints[originallyAvailableAt]",
            request.originally_available_at.format("%Y-%m-%d").to_string(),
        ),
        ("hints[parentIndex]", optional(request.season_index)),
        ("hints[title]", request.title.clone()),
        ("hints[type]", "4".into()),
        ("hints[year]", request.year.map(|y| y.to_string()).unwrap_or_default()),
        ("params[airingChannels]", channel),
        ("params[airingTimes]", request.airing_minutes.to_string()),
        ("params[libraryType]", "2".into()),
        ("params[mediaProviderID]", media_provider_id.to_string()),
        ("type", "4".into()),
    ];
    hints.push(("X-Plex-Client-Identifier", client_identifier.to_string()));
    hints.push(("X-Plex-Token", token.to_string()));
    hints.extend(CLIENT_IDENTITY.iter().map(|(name, value)| (*name, value.to_string())));

    format!("{}&{}", join(&prefs, &[]), join(&hints, &['[', ']']))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::catalog::{AiringChannel, ShowIdentity};

    fn request() -> RecordingRequest {
        RecordingRequest {
            show: ShowIdentity {
                guid: "com.gracenote.onconnect://show/SH0123".to_string(),
                title: "Some Show".to_string(),
                thumb: Some("/thumb/1".to_string()),
            },
            show_year: Some(2015),
            guid: "com.gracenote.onconnect://episode/EP012345670003".to_string(),
            title: "Unrelated Title".to_string(),
            season_index: Some(3),
            episode_index: Some(1),
            year: Some(2018),
            originally_available_at: NaiveDate::from_ymd_opt(2018, 6, 12).unwrap(),
            airing_minutes: 270,
            channel: Some(AiringChannel {
                identifier: "5.1".to_string(),
                title: "KTLA HD".to_string(),
            }),
        }
    }

    fn param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix(&format!("{}=", name)))
    }

    #[test]
    fn test_quote_keeps_safe_characters() {
        assert_eq!(quote("hints[guid]", &['[', ']']), "hints[guid]");
        assert_eq!(quote("prefs[oneShot]", &[]), "prefs%5BoneShot%5D");
        assert_eq!(quote("a b/c", &['/']), "a%20b/c");
    }

    #[test]
    fn test_recording_query_encodes_groups() {
        let query = recording_query(&request(), "client-1", "secret", 3, 3);

        assert!(query.starts_with("prefs%5BminVideoQuality%5D=0&"));
        assert_eq!(param(&query, "prefs%5BlineupChannel%5D"), Some(""));
        assert_eq!(param(&query, "targetLibrarySectionID"), Some("3"));
        assert_eq!(
            param(&query, "hints[guid]"),
            Some("com.gracenote.onconnect%3A%2F%2Fepisode%2FEP012345670003")
        );
        assert_eq!(param(&query, "hints[grandparentYear]"), Some("2015"));
        assert_eq!(param(&query, "hints[originallyAvailableAt]"), Some("2018-06-12"));
        assert_eq!(param(&query, "hints[parentIndex]"), Some("3"));
        assert_eq!(param(&query, "hints[index]"), Some("1"));
        assert_eq!(param(&query, "hints[title]"), Some("Unrelated%20Title"));
        assert_eq!(param(&query, "params[airingTimes]"), Some("270"));
        assert_eq!(param(&query, "params[mediaProviderID]"), Some("3"));
        assert_eq!(param(&query, "X-Plex-Client-Identifier"), Some("client-1"));
        assert_eq!(param(&query, "X-Plex-Product"), Some("Plex%20Web"));
    }

    #[test]
    fn test_airing_channel_is_encoded_twice() {
        let query = recording_query(&request(), "client-1", "secret", 3, 3);
        // "5.1=KTLA HD" -> "5.1%3DKTLA%20HD" -> "5.1%253DKTLA%2520HD"
        assert_eq!(
            param(&query, "params[airingChannels]"),
            Some("5.1%253DKTLA%2520HD")
        );
    }

    #[test]
    fn test_missing_optional_fields_are_sent_empty() {
        let mut req = request();
        req.show_year = None;
        req.channel = None;
        req.show.thumb = None;

        let query = recording_query(&req, "client-1", "secret", 7, 5);
        assert_eq!(param(&query, "hints[grandparentYear]"), Some(""));
        assert_eq!(param(&query, "hints[grandparentThumb]"), Some(""));
        assert_eq!(param(&query, "params[airingChannels]"), Some(""));
        assert_eq!(param(&query, "targetLibrarySectionID"), Some("7"));
        assert_eq!(param(&query, "params[mediaProviderID]"), Some("5"));
    }
}
