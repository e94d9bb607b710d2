//! Repositories that consume the download stream and answer team and player
//! queries. Both backends share one contract: construction returns
//! immediately, loading happens in a background task, and every query waits
//! for the load to finish before answering.

mod latch;
mod memory;
mod payload;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Player, PlayerId, Team, TeamId};

/// Query interface over the loaded team/player graph.
///
/// If the load failed, every method returns `Error::Initialization` wrapping
/// the original cause, permanently. A missing key on a successfully loaded
/// repository returns `Error::NotFound`.
#[async_trait]
pub trait TeamRepository: Send + Sync {
    /// Looks for a team given an id.
    async fn get_team(&self, id: TeamId) -> Result<Team>;

    /// Looks for a team given a name.
    async fn get_team_by_name(&self, name: &str) -> Result<Team>;

    /// Looks for a player given a player id.
    async fn get_player(&self, id: &PlayerId) -> Result<Player>;
}
