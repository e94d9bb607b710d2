use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::TeamRepository;
use super::latch::{Latch, latch};
use super::payload::{self, TeamPayload};
use crate::download::RawTeam;
use crate::error::{Error, Result};
use crate::types::{Player, PlayerId, Team, TeamId};

/// In-memory team repository. Drains the download stream once, at
/// construction; nothing survives the process.
pub struct MemoryStore {
    state: Arc<OnceLock<std::result::Result<Dataset, Arc<Error>>>>,
    ready: Latch,
}

#[derive(Default)]
struct Dataset {
    teams: HashMap<TeamId, Team>,
    players: HashMap<PlayerId, Player>,
    team_names: HashMap<String, TeamId>,
}

impl MemoryStore {
    /// Creates the repository and starts loading from `data` in the
    /// background. Queries suspend until the load completes; if it fails,
    /// they return an initialization error from then on.
    pub fn new(data: mpsc::Receiver<RawTeam>) -> Self {
        let state = Arc::new(OnceLock::new());
        let (opener, ready) = latch();

        let task_state = state.clone();
        tokio::spawn(async move {
            let outcome = load(data).await.map_err(Arc::new);
            let _ = task_state.set(outcome);
            opener.open();
        });

        Self { state, ready }
    }

    async fn dataset(&self) -> Result<&Dataset> {
        self.ready.wait().await;

        match self.state.get() {
            Some(Ok(dataset)) => Ok(dataset),
            Some(Err(cause)) => Err(Error::Initialization(cause.clone())),
            None => Err(Error::Initialization(Arc::new(Error::LoadAborted))),
        }
    }
}

#[async_trait]
impl TeamRepository for MemoryStore {
    async fn get_team(&self, id: TeamId) -> Result<Team> {
        self.dataset()
            .await?
            .teams
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("team {id}")))
    }

    async fn get_team_by_name(&self, name: &str) -> Result<Team> {
        let dataset = self.dataset().await?;

        dataset
            .team_names
            .get(name)
            .and_then(|id| dataset.teams.get(id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("team {name}")))
    }

    async fn get_player(&self, id: &PlayerId) -> Result<Player> {
        self.dataset()
            .await?
            .players
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("player {id}")))
    }
}

async fn load(mut data: mpsc::Receiver<RawTeam>) -> Result<Dataset> {
    let mut dataset = Dataset::default();

    while let Some(raw) = data.recv().await {
        dataset.apply(payload::parse_team(&raw)?);
    }

    tracing::debug!(
        teams = dataset.teams.len(),
        players = dataset.players.len(),
        "in-memory load complete"
    );
    Ok(dataset)
}

impl Dataset {
    fn apply(&mut self, team: TeamPayload) {
        let mut player_ids: Vec<PlayerId> = Vec::with_capacity(team.players.len());

        for p in &team.players {
            if !player_ids.contains(&p.id) {
                player_ids.push(p.id.clone());
            }

            match self.players.get_mut(&p.id) {
                Some(player) => {
                    if !player.teams.contains(&team.id) {
                        player.teams.push(team.id);
                    }
                }
                None => {
                    self.players.insert(
                        p.id.clone(),
                        Player {
                            id: p.id.clone(),
                            name: p.name.clone(),
                            age: p.age(),
                            teams: vec![team.id],
                        },
                    );
                }
            }
        }

        self.team_names.insert(team.name.clone(), team.id);
        self.teams.insert(
            team.id,
            Team {
                id: team.id,
                name: team.name,
                is_national: team.is_national,
                players: player_ids,
            },
        );
    }
}
