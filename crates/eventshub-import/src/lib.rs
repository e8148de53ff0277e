//! Batch importer for eventshub.
//!
//! Reads XML event exports listed in a JSON configuration file and submits
//! every event to a running server through `insertEvent`.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod importer;
pub mod xml;

#[cfg(test)]
mod testing;

pub use cli::Cli;
pub use client::{EventsHubClient, MAX_ATTEMPTS};
pub use config::{ImportConfig, ImportCredentials};
pub use error::{ImportError, ImportResult};
pub use importer::{ImportSummary, Importer};
