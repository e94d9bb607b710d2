use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use teamsearch::config::{CacheConfig, DownloadConfig};
use teamsearch::download;
use teamsearch::store::{MemoryStore, SqliteStore, TeamRepository};
use teamsearch::types::{Player, PlayerId, Team, TeamId};

const DEFAULT_TEAMS: [&str; 10] = [
    "Germany",
    "England",
    "France",
    "Spain",
    "Manchester Utd",
    "Arsenal",
    "Chelsea",
    "Barcelona",
    "Real Madrid",
    "FC Bayern Munich",
];

/// Extracts all players from the given teams and prints them out in
/// alphabetical order, including their age and affiliated teams.
#[derive(Parser)]
#[command(name = "team-players", about, long_about = None)]
struct Cli {
    /// Number of concurrent download workers
    #[arg(long, default_value_t = 20)]
    workers: usize,

    /// Network request timeout, in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Endpoint template; `{id}` is replaced with the team id
    #[arg(long)]
    endpoint: Option<String>,

    /// If specified, a SQLite database at this path caches the download
    #[arg(long)]
    cache_path: Option<PathBuf>,

    /// Re-download team data even if the cache is still fresh
    #[arg(long)]
    refresh: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Team names to look up; a default selection is used when omitted
    names: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "teamsearch=debug"
    } else {
        "teamsearch=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let mut config = DownloadConfig {
        timeout: Duration::from_secs(cli.timeout),
        workers: cli.workers,
        ..Default::default()
    };
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }

    let data = download::teams(&config)?;

    let repo: Box<dyn TeamRepository> = match cli.cache_path {
        Some(path) => Box::new(SqliteStore::new(
            data,
            CacheConfig {
                path,
                refresh: cli.refresh,
            },
        )),
        None => Box::new(MemoryStore::new(data)),
    };

    let names = if cli.names.is_empty() {
        DEFAULT_TEAMS.map(String::from).to_vec()
    } else {
        cli.names
    };

    for entry in player_entries(repo.as_ref(), &names).await? {
        println!("{entry}");
    }

    Ok(())
}

/// Resolves the named teams, collects their distinct players, and formats
/// one line per player, sorted by player name.
async fn player_entries(
    repo: &dyn TeamRepository,
    names: &[String],
) -> anyhow::Result<Vec<String>> {
    let mut team_cache: HashMap<TeamId, Team> = HashMap::new();
    let mut player_ids: Vec<PlayerId> = Vec::new();

    tracing::debug!("looking up {} teams", names.len());

    for name in names {
        let team = repo.get_team_by_name(name).await?;
        tracing::debug!(id = %team.id, "found team {name}");

        for id in &team.players {
            if !player_ids.contains(id) {
                player_ids.push(id.clone());
            }
        }
        team_cache.insert(team.id, team);
    }

    let mut players: Vec<Player> = Vec::with_capacity(player_ids.len());
    for id in &player_ids {
        players.push(repo.get_player(id).await?);
    }

    players.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

    let mut entries = Vec::with_capacity(players.len());
    for (i, player) in players.iter().enumerate() {
        let mut team_names = Vec::with_capacity(player.teams.len());
        for team_id in &player.teams {
            match team_cache.get(team_id) {
                Some(team) => team_names.push(team.name.clone()),
                None => {
                    let team = repo.get_team(*team_id).await?;
                    team_names.push(team.name.clone());
                    team_cache.insert(team.id, team);
                }
            }
        }
        team_names.sort();

        entries.push(format!(
            "{}. {}; {}; {}",
            i + 1,
            player.name,
            player.age,
            team_names.join(", ")
        ));
    }

    Ok(entries)
}
