//! Plex `MediaContainer` XML parsing
//!
//! Plex answers every listing with a flat container:
//!
//! ```xml
//! <MediaContainer parentYear="2015">
//!   <Directory type="season" index="1" key="/library/metadata/101/children"/>
//!   <Video ratingKey="9" title="Pilot" parentIndex="1" index="1">
//!     <Media channelIdentifier="5.1" channelTitle="KTLA"/>
//!   </Video>
//! </MediaContainer>
//! ```
//!
//! Only the container attributes, its direct children and the first `Media`
//! element under each `Video` are of interest here.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use super::PlexError;
use crate::catalog::{
    AiringChannel, GuideEpisode, GuideId, LibraryEpisode, LibraryId, SeasonRef, ShowHit,
    ShowIdentity,
};

type Attributes = HashMap<String, String>;

/// Direct child of the `MediaContainer`
#[derive(Debug, Clone, Default)]
struct Item {
    tag: String,
    attrs: Attributes,
    /// Attributes of the first nested `Media` element
    media: Option<Attributes>,
}

impl Item {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    fn index(&self, name: &str) -> Option<u32> {
        self.attr(name).and_then(|v| v.trim().parse().ok())
    }
}

#[derive(Debug, Default)]
struct Container {
    attrs: Attributes,
    items: Vec<Item>,
}

fn read_attributes(e: &BytesStart<'_>) -> Attributes {
    let mut attrs = HashMap::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = match attr.unescape_value() {
            Ok(v) => v.to_string(),
            Err(_) => String::from_utf8_lossy(&attr.value).to_string(),
        };
        attrs.insert(key, value);
    }
    attrs
}

fn parse_container(xml: &str) -> Result<Container, PlexError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut container = Container::default();
    let mut current: Option<Item> = None;
    let mut depth = 0usize;

    loop {
        let (e, is_empty) = match reader.read_event() {
            Ok(Event::Start(e)) => (e, false),
            Ok(Event::Empty(e)) => (e, true),
            Ok(Event::End(_)) => {
                if depth == 2
                    && let Some(item) = current.take()
                {
                    container.items.push(item);
                }
                depth = depth.saturating_sub(1);
                continue;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(PlexError::Xml(e.to_string())),
            _ => continue,
        };

        let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
        match depth {
            0 => container.attrs = read_attributes(&e),
            1 => {
                let item = Item {
                    tag,
                    attrs: read_attributes(&e),
                    media: None,
                };
                if is_empty {
                    container.items.push(item);
                } else {
                    current = Some(item);
                }
            }
            2 if tag == "Media" => {
                if let Some(item) = current.as_mut()
                    && item.media.is_none()
                {
                    item.media = Some(read_attributes(&e));
                }
            }
            _ => {}
        }

        if !is_empty {
            depth += 1;
        }
    }

    debug!(items = container.items.len(), "Parsed Plex container");
    Ok(container)
}

fn seasons(container: &Container) -> Vec<SeasonRef> {
    container
        .items
        .iter()
        .filter(|item| item.tag == "Directory" && item.attr("type") == Some("season"))
        .filter_map(|item| {
            Some(SeasonRef {
                index: item.index("index"),
                direct_reference: item.attr("key")?.to_string(),
                show_year: None,
            })
        })
        .collect()
}

/// Seasons of a library show
pub fn library_seasons(xml: &str) -> Result<Vec<SeasonRef>, PlexError> {
    Ok(seasons(&parse_container(xml)?))
}

/// Seasons of a guide show. The show year only appears on the container.
pub fn guide_seasons(xml: &str) -> Result<Vec<SeasonRef>, PlexError> {
    let container = parse_container(xml)?;
    let show_year = container
        .attrs
        .get("parentYear")
        .and_then(|y| y.trim().parse().ok());

    Ok(seasons(&container)
        .into_iter()
        .map(|season| SeasonRef { show_year, ..season })
        .collect())
}

/// Episodes of one library season
pub fn library_episodes(xml: &str) -> Result<Vec<LibraryEpisode>, PlexError> {
    let container = parse_container(xml)?;
    Ok(container
        .items
        .iter()
        .filter(|item| item.tag == "Video")
        .filter_map(|item| {
            let mut episode = LibraryEpisode::new(
                LibraryId::new(item.attr("ratingKey")?),
                item.attr("title").unwrap_or_default(),
                item.index("parentIndex"),
                item.index("index"),
            );
            episode.aired_date = item.attr("originallyAvailableAt").and_then(parse_date);
            Some(episode)
        })
        .collect())
}

/// Episodes of one guide season
pub fn guide_episodes(xml: &str) -> Result<Vec<GuideEpisode>, PlexError> {
    let container = parse_container(xml)?;
    Ok(container
        .items
        .iter()
        .filter(|item| item.tag == "Video")
        .filter_map(|item| {
            let guid = item.attr("guid").or_else(|| item.attr("ratingKey"))?;
            let mut episode = GuideEpisode::new(
                guid,
                item.attr("title").unwrap_or_default(),
                item.index("parentIndex"),
                item.index("index"),
            );
            episode.aired_at = item.attr("originallyAvailableAt").and_then(parse_timestamp);
            episode.year = item.attr("year").and_then(|y| y.trim().parse().ok());
            episode.show = ShowIdentity {
                guid: item.attr("grandparentGuid").unwrap_or_default().to_string(),
                title: item.attr("grandparentTitle").unwrap_or_default().to_string(),
                thumb: item.attr("grandparentThumb").map(str::to_string),
            };
            episode.channel = item.media.as_ref().and_then(|media| {
                Some(AiringChannel {
                    identifier: media.get("channelIdentifier")?.clone(),
                    title: media.get("channelTitle")?.clone(),
                })
            });
            Some(episode)
        })
        .collect())
}

/// Guide ids of every item in the recording schedule.
///
/// Subscriptions nest their `Video` elements at varying depths, so every
/// `Video` in the document counts.
pub fn subscription_guids(xml: &str) -> Result<Vec<GuideId>, PlexError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut guids = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == b"Video"
                    && let Some(guid) = read_attributes(e).remove("guid")
                {
                    guids.push(GuideId::new(guid));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(PlexError::Xml(e.to_string())),
            _ => {}
        }
    }
    Ok(guids)
}

/// Shows returned by a library section title filter
pub fn library_show_hits(xml: &str) -> Result<Vec<ShowHit>, PlexError> {
    let container = parse_container(xml)?;
    Ok(container
        .items
        .iter()
        .filter(|item| item.tag == "Directory")
        .filter_map(|item| {
            Some(ShowHit {
                title: item.attr("title")?.to_string(),
                key: item.attr("ratingKey")?.to_string(),
            })
        })
        .collect())
}

/// Shows returned by a guide search. Keys are reduced to the guide show id.
pub fn guide_show_hits(xml: &str) -> Result<Vec<ShowHit>, PlexError> {
    let container = parse_container(xml)?;
    Ok(container
        .items
        .iter()
        .filter(|item| item.tag == "Directory")
        .filter(|item| item.attr("type").is_none_or(|t| t == "show"))
        .filter_map(|item| {
            Some(ShowHit {
                title: item.attr("title")?.to_string(),
                key: GuideId::new(item.attr("guid")?).to_string(),
            })
        })
        .collect())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

/// Guide timestamps come as `2018-06-12 20:30:00`, `2018-06-12T20:30:00Z` or a
/// bare date. Only the wall-clock fields are kept.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if let Some(head) = trimmed.get(..19) {
        for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(at) = NaiveDateTime::parse_from_str(head, fmt) {
                return Some(at);
            }
        }
    }
    if let Some(head) = trimmed.get(..16) {
        for fmt in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
            if let Ok(at) = NaiveDateTime::parse_from_str(head, fmt) {
                return Some(at);
            }
        }
    }
    debug!("Failed to parse guide timestamp: {}", raw);
    None
}
