//! Persistent operator state
//!
//! The settings document is the only state that survives between runs. It
//! holds the server connection settings and the matching overrides.

pub mod overrides;
pub mod settings;

pub use overrides::{OverrideEntry, OverrideError, OverrideKind, OverrideStore, Overrides};
pub use settings::{SERVER_SETTINGS, SettingsDocument, SettingsError, SettingsStore};
