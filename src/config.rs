use std::path::PathBuf;
use std::time::Duration;

/// Default endpoint template. `{id}` is replaced with the team id.
pub const DEFAULT_ENDPOINT: &str =
    "https://vintagemonster.onefootball.com/api/teams/en/{id}.json";

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Endpoint template containing an `{id}` placeholder.
    pub endpoint: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Number of simultaneous download workers.
    pub workers: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(10),
            workers: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Location of the SQLite database file.
    pub path: PathBuf,
    /// Re-download team data even if the cached copy is still fresh.
    pub refresh: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/teams.db"),
            refresh: false,
        }
    }
}
