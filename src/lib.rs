//! dvr-control: keep a Plex DVR recording the guide episodes the library lacks
//!
//! - [`catalog`]: episode records and the collaborator traits
//! - [`matching`]: title similarity and override-aware match resolution
//! - [`store`]: the JSON settings document and the override store on top of it
//! - [`services`]: reconciliation driver, recording scheduler, Plex client
//! - [`config`], [`cli`], [`app`]: the command line tool

pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod matching;
pub mod services;
pub mod store;
