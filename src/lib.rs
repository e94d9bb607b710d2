//! # teamsearch
//!
//! Downloads football team data from an HTTP endpoint with a bounded worker
//! pool, decides heuristically when the team id space is exhausted, and loads
//! the results into a queryable repository, usable both as a standalone
//! binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! teamsearch = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use teamsearch::config::DownloadConfig;
//! use teamsearch::store::{MemoryStore, TeamRepository};
//!
//! let data = teamsearch::download::teams(&DownloadConfig::default())?;
//! let repo = MemoryStore::new(data);
//!
//! // Queries suspend until the download has been fully loaded.
//! let team = repo.get_team_by_name("Arsenal").await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the `team-players` binary. Disable with
//!   `default-features = false`.

pub mod config;
pub mod download;
pub mod error;
pub mod store;
pub mod types;
