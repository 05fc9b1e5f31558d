//! Services: the reconciliation driver, the recording scheduler and the Plex
//! integration behind them

pub mod logging;
pub mod plex;
pub mod reconciler;
pub mod scheduler;

pub use plex::{PlexClient, PlexError};
pub use reconciler::{
    ReconciliationReport, Reconciler, ReportCounts, ReportEntry, ShowPair, TitleSearch,
};
pub use scheduler::{RecordingRequest, RecordingScheduler, SubmitError};
