//! Operator overrides for episode matching
//!
//! Overrides live in the settings document under two categories, each mapping
//! a library id to the guide ids it is paired with:
//! - `force_matches`: the pair is a match whatever the titles say
//! - `force_unmatches`: the pair is never a match
//!
//! A library id paired with a single guide id is stored as a plain string,
//! one paired with several as an array. Each (library id, guide id) pair holds
//! at most one override; writing a pairing that contradicts the other category
//! is rejected.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use super::settings::{SettingsDocument, SettingsError, SettingsStore};
use crate::catalog::{GuideId, LibraryId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKind {
    ForceMatch,
    ForceUnmatch,
}

impl OverrideKind {
    /// Settings document category holding this kind
    pub fn category(&self) -> &'static str {
        match self {
            OverrideKind::ForceMatch => "force_matches",
            OverrideKind::ForceUnmatch => "force_unmatches",
        }
    }

    fn opposite(&self) -> Self {
        match self {
            OverrideKind::ForceMatch => OverrideKind::ForceUnmatch,
            OverrideKind::ForceUnmatch => OverrideKind::ForceMatch,
        }
    }
}

impl fmt::Display for OverrideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideKind::ForceMatch => write!(f, "force-match"),
            OverrideKind::ForceUnmatch => write!(f, "force-unmatch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverrideEntry {
    pub library_id: LibraryId,
    pub guide_id: GuideId,
    pub kind: OverrideKind,
}

#[derive(Debug, Error)]
pub enum OverrideError {
    #[error("Library {library_id} and guide {guide_id} already have a {existing} override; remove it first")]
    Contradicts {
        library_id: LibraryId,
        guide_id: GuideId,
        existing: OverrideKind,
    },

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

type Pairings = BTreeMap<LibraryId, BTreeSet<GuideId>>;

/// In-memory override state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    force_matches: Pairings,
    force_unmatches: Pairings,
}

impl Overrides {
    pub fn from_document(document: &SettingsDocument) -> Self {
        let read = |kind: OverrideKind| -> Pairings {
            let mut pairings = Pairings::new();
            for (library_id, guide_ids) in document.category_lists(kind.category()) {
                if guide_ids.is_empty() {
                    continue;
                }
                pairings
                    .entry(LibraryId::new(library_id))
                    .or_default()
                    .extend(guide_ids.iter().map(GuideId::new));
            }
            pairings
        };
        Self {
            force_matches: read(OverrideKind::ForceMatch),
            force_unmatches: read(OverrideKind::ForceUnmatch),
        }
    }

    pub fn is_force_matched(&self, library_id: &LibraryId, guide_id: &GuideId) -> bool {
        self.contains(OverrideKind::ForceMatch, library_id, guide_id)
    }

    pub fn is_force_unmatched(&self, library_id: &LibraryId, guide_id: &GuideId) -> bool {
        self.contains(OverrideKind::ForceUnmatch, library_id, guide_id)
    }

    /// Record an override for a pair. Returns false when the pair already had
    /// an override of this kind.
    pub fn insert(
        &mut self,
        library_id: LibraryId,
        guide_id: GuideId,
        kind: OverrideKind,
    ) -> Result<bool, OverrideError> {
        if self.contains(kind.opposite(), &library_id, &guide_id) {
            return Err(OverrideError::Contradicts {
                library_id,
                guide_id,
                existing: kind.opposite(),
            });
        }
        Ok(self.map_mut(kind).entry(library_id).or_default().insert(guide_id))
    }

    /// Drop the override of `kind` for a pair, returning whether one existed
    pub fn remove(&mut self, library_id: &LibraryId, guide_id: &GuideId, kind: OverrideKind) -> bool {
        let pairings = self.map_mut(kind);
        let Some(guide_ids) = pairings.get_mut(library_id) else {
            return false;
        };
        let removed = guide_ids.remove(guide_id);
        if guide_ids.is_empty() {
            pairings.remove(library_id);
        }
        removed
    }

    pub fn entries(&self) -> Vec<OverrideEntry> {
        [OverrideKind::ForceMatch, OverrideKind::ForceUnmatch]
            .into_iter()
            .flat_map(|kind| {
                self.map(kind).iter().flat_map(move |(library_id, guide_ids)| {
                    guide_ids.iter().map(move |guide_id| OverrideEntry {
                        library_id: library_id.clone(),
                        guide_id: guide_id.clone(),
                        kind,
                    })
                })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.force_matches.is_empty() && self.force_unmatches.is_empty()
    }

    fn contains(&self, kind: OverrideKind, library_id: &LibraryId, guide_id: &GuideId) -> bool {
        self.map(kind)
            .get(library_id)
            .is_some_and(|guide_ids| guide_ids.contains(guide_id))
    }

    fn write_to(&self, document: &mut SettingsDocument) {
        for kind in [OverrideKind::ForceMatch, OverrideKind::ForceUnmatch] {
            document.replace_category(
                kind.category(),
                self.map(kind).iter().map(|(library_id, guide_ids)| {
                    (
                        library_id.as_str().to_string(),
                        guide_ids.iter().map(|g| g.as_str().to_string()).collect(),
                    )
                }),
            );
        }
    }

    fn map(&self, kind: OverrideKind) -> &Pairings {
        match kind {
            OverrideKind::ForceMatch => &self.force_matches,
            OverrideKind::ForceUnmatch => &self.force_unmatches,
        }
    }

    fn map_mut(&mut self, kind: OverrideKind) -> &mut Pairings {
        match kind {
            OverrideKind::ForceMatch => &mut self.force_matches,
            OverrideKind::ForceUnmatch => &mut self.force_unmatches,
        }
    }
}

/// Overrides backed by the settings document.
///
/// Loaded once when opened; every mutation is written through immediately and
/// the in-memory state is rebuilt from the re-read document.
#[derive(Debug)]
pub struct OverrideStore {
    settings: SettingsStore,
    current: Overrides,
}

impl OverrideStore {
    pub fn open(settings: SettingsStore) -> Result<Self, SettingsError> {
        let current = Overrides::from_document(&settings.load()?);
        Ok(Self { settings, current })
    }

    pub fn overrides(&self) -> &Overrides {
        &self.current
    }

    pub fn is_force_matched(&self, library_id: &LibraryId, guide_id: &GuideId) -> bool {
        self.current.is_force_matched(library_id, guide_id)
    }

    pub fn is_force_unmatched(&self, library_id: &LibraryId, guide_id: &GuideId) -> bool {
        self.current.is_force_unmatched(library_id, guide_id)
    }

    pub fn set_override(
        &mut self,
        library_id: LibraryId,
        guide_id: GuideId,
        kind: OverrideKind,
    ) -> Result<(), OverrideError> {
        let (added, document) = self.settings.edit(|doc| {
            let mut overrides = Overrides::from_document(doc);
            let added = overrides.insert(library_id.clone(), guide_id.clone(), kind)?;
            overrides.write_to(doc);
            Ok::<_, OverrideError>(added)
        })?;
        self.current = Overrides::from_document(&document);

        info!(library_id = %library_id, guide_id = %guide_id, kind = %kind, added, "Override stored");
        Ok(())
    }

    /// Remove the override of `kind` for a pair, returning whether one existed
    pub fn remove_override(
        &mut self,
        library_id: &LibraryId,
        guide_id: &GuideId,
        kind: OverrideKind,
    ) -> Result<bool, OverrideError> {
        let (removed, document) = self.settings.edit(|doc| {
            let mut overrides = Overrides::from_document(doc);
            let removed = overrides.remove(library_id, guide_id, kind);
            overrides.write_to(doc);
            Ok::<_, OverrideError>(removed)
        })?;
        self.current = Overrides::from_document(&document);

        info!(library_id = %library_id, guide_id = %guide_id, kind = %kind, removed, "Override removed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    fn open() -> (tempfile::TempDir, OverrideStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = OverrideStore::open(SettingsStore::new(dir.path().join("settings.json"))).unwrap();
        (dir, store)
    }

    fn ids(l: &str, g: &str) -> (LibraryId, GuideId) {
        (LibraryId::new(l), GuideId::new(g))
    }

    #[test]
    fn test_set_and_query() {
        let (_dir, mut store) = open();
        let (l, g) = ids("L5", "EP7");
        store.set_override(l.clone(), g.clone(), OverrideKind::ForceMatch).unwrap();

        assert!(store.is_force_matched(&l, &g));
        assert!(!store.is_force_unmatched(&l, &g));
        assert!(!store.is_force_matched(&l, &GuideId::new("EP8")));
    }

    #[test]
    fn test_write_is_durable() {
        let (dir, mut store) = open();
        let (l, g) = ids("L5", "com.gracenote.onconnect://episode/EP7");
        store.set_override(l.clone(), g, OverrideKind::ForceUnmatch).unwrap();

        let reopened = OverrideStore::open(SettingsStore::new(dir.path().join("settings.json"))).unwrap();
        assert!(reopened.is_force_unmatched(&l, &GuideId::new("EP7")));
    }

    #[test]
    fn test_rewriting_same_pair_keeps_one_entry() {
        let (_dir, mut store) = open();
        let (l, g) = ids("L5", "EP1");
        store.set_override(l.clone(), g.clone(), OverrideKind::ForceMatch).unwrap();
        store.set_override(l.clone(), g.clone(), OverrideKind::ForceMatch).unwrap();

        assert!(store.is_force_matched(&l, &g));
        assert_eq!(store.overrides().entries().len(), 1);
    }

    #[test]
    fn test_one_library_id_holds_several_pairings_per_kind() {
        let (dir, mut store) = open();
        let l = LibraryId::new("L1");
        store.set_override(l.clone(), GuideId::new("EP1"), OverrideKind::ForceMatch).unwrap();
        store.set_override(l.clone(), GuideId::new("EP2"), OverrideKind::ForceMatch).unwrap();
        store.set_override(l.clone(), GuideId::new("EP5"), OverrideKind::ForceUnmatch).unwrap();
        store.set_override(l.clone(), GuideId::new("EP9"), OverrideKind::ForceUnmatch).unwrap();

        let reopened = OverrideStore::open(SettingsStore::new(dir.path().join("settings.json"))).unwrap();
        for current in [&store, &reopened] {
            assert!(current.is_force_matched(&l, &GuideId::new("EP1")));
            assert!(current.is_force_matched(&l, &GuideId::new("EP2")));
            assert!(current.is_force_unmatched(&l, &GuideId::new("EP5")));
            assert!(current.is_force_unmatched(&l, &GuideId::new("EP9")));
            assert_eq!(current.overrides().entries().len(), 4);
        }

        let doc = SettingsStore::new(dir.path().join("settings.json")).load().unwrap();
        assert_eq!(
            doc.category_lists("force_matches"),
            vec![("L1".to_string(), vec!["EP1".to_string(), "EP2".to_string()])]
        );
    }

    #[test]
    fn test_contradiction_is_checked_per_pair() {
        let mut overrides = Overrides::default();
        let l = LibraryId::new("L1");
        overrides.insert(l.clone(), GuideId::new("EP1"), OverrideKind::ForceMatch).unwrap();

        overrides.insert(l.clone(), GuideId::new("EP2"), OverrideKind::ForceUnmatch).unwrap();
        assert_matches!(
            overrides.insert(l.clone(), GuideId::new("EP1"), OverrideKind::ForceUnmatch),
            Err(OverrideError::Contradicts { existing: OverrideKind::ForceMatch, .. })
        );
    }

    #[test]
    fn test_contradiction_is_rejected_and_file_unchanged() {
        let (dir, mut store) = open();
        let (l, g) = ids("L5", "EP7");
        store.set_override(l.clone(), g.clone(), OverrideKind::ForceMatch).unwrap();
        let before = fs::read_to_string(dir.path().join("settings.json")).unwrap();

        let err = store
            .set_override(l.clone(), g.clone(), OverrideKind::ForceUnmatch)
            .unwrap_err();
        assert_matches!(err, OverrideError::Contradicts { existing: OverrideKind::ForceMatch, .. });

        assert_eq!(fs::read_to_string(dir.path().join("settings.json")).unwrap(), before);
        assert!(store.is_force_matched(&l, &g));
        assert!(!store.is_force_unmatched(&l, &g));
    }

    #[test]
    fn test_remove_override() {
        let (_dir, mut store) = open();
        let (l, g) = ids("L5", "EP7");
        store.set_override(l.clone(), g.clone(), OverrideKind::ForceUnmatch).unwrap();

        assert!(store.remove_override(&l, &g, OverrideKind::ForceUnmatch).unwrap());
        assert!(!store.is_force_unmatched(&l, &g));
        assert!(!store.remove_override(&l, &g, OverrideKind::ForceUnmatch).unwrap());

        store.set_override(l.clone(), g.clone(), OverrideKind::ForceMatch).unwrap();
        assert!(store.is_force_matched(&l, &g));
    }

    #[test]
    fn test_remove_leaves_other_pairings_of_library_id() {
        let (_dir, mut store) = open();
        let l = LibraryId::new("L1");
        store.set_override(l.clone(), GuideId::new("EP1"), OverrideKind::ForceUnmatch).unwrap();
        store.set_override(l.clone(), GuideId::new("EP2"), OverrideKind::ForceUnmatch).unwrap();

        assert!(store.remove_override(&l, &GuideId::new("EP1"), OverrideKind::ForceUnmatch).unwrap());
        assert!(!store.is_force_unmatched(&l, &GuideId::new("EP1")));
        assert!(store.is_force_unmatched(&l, &GuideId::new("EP2")));

        assert!(store.remove_override(&l, &GuideId::new("EP2"), OverrideKind::ForceUnmatch).unwrap());
        assert!(store.overrides().is_empty());
    }

    #[test]
    fn test_overrides_preserve_server_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"server_settings": {"host": "10.0.0.5"}, "force_matches": {}}"#).unwrap();

        let mut store = OverrideStore::open(SettingsStore::new(&path)).unwrap();
        store
            .set_override(LibraryId::new("L1"), GuideId::new("EP1"), OverrideKind::ForceMatch)
            .unwrap();

        let doc = SettingsStore::new(&path).load().unwrap();
        assert_eq!(doc.get("server_settings", "host").as_deref(), Some("10.0.0.5"));
        assert_eq!(doc.get("force_matches", "L1").as_deref(), Some("EP1"));
        assert!(store.is_force_matched(&LibraryId::new("L1"), &GuideId::new("EP1")));
    }

    #[test]
    fn test_entries_listing() {
        let mut overrides = Overrides::default();
        overrides
            .insert(LibraryId::new("L2"), GuideId::new("EP2"), OverrideKind::ForceUnmatch)
            .unwrap();
        overrides
            .insert(LibraryId::new("L1"), GuideId::new("EP1"), OverrideKind::ForceMatch)
            .unwrap();

        assert_eq!(
            overrides.entries(),
            vec![
                OverrideEntry {
                    library_id: LibraryId::new("L1"),
                    guide_id: GuideId::new("EP1"),
                    kind: OverrideKind::ForceMatch,
                },
                OverrideEntry {
                    library_id: LibraryId::new("L2"),
                    guide_id: GuideId::new("EP2"),
                    kind: OverrideKind::ForceUnmatch,
                },
            ]
        );
    }
}
