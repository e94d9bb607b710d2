use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::mpsc;
use tracing::info;

use super::TeamRepository;
use super::latch::{Latch, latch};
use super::payload::{self, TeamPayload};
use crate::config::CacheConfig;
use crate::download::RawTeam;
use crate::error::{Error, Result};
use crate::types::{Player, PlayerId, Team, TeamId};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS teams (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    is_national INTEGER NOT NULL,
    players TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS players (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    age INTEGER NOT NULL,
    teams TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS team_names (
    name TEXT PRIMARY KEY,
    team_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

const UPDATE_TIMESTAMP_KEY: &str = "update_timestamp";

/// Cached data older than this triggers a full refresh.
const FRESHNESS_WINDOW_SECS: i64 = 196 * 3600;

/// SQLite-backed team repository. On construction it checks the freshness of
/// the cached data: stale or absent data triggers a full drain of the
/// download stream into the database; fresh data is served as-is and the
/// stream is dropped unread.
pub struct SqliteStore {
    state: Arc<OnceLock<std::result::Result<Mutex<Connection>, Arc<Error>>>>,
    ready: Latch,
}

impl SqliteStore {
    /// Creates the repository and starts loading in the background. Queries
    /// suspend until the load completes; if it fails, they return an
    /// initialization error from then on.
    pub fn new(data: mpsc::Receiver<RawTeam>, config: CacheConfig) -> Self {
        let state = Arc::new(OnceLock::new());
        let (opener, ready) = latch();

        let task_state = state.clone();
        tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || load(config, data))
                .await
                .unwrap_or_else(|_| Err(Error::LoadAborted))
                .map_err(Arc::new);
            let _ = task_state.set(outcome);
            opener.open();
        });

        Self { state, ready }
    }

    async fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.ready.wait().await;

        match self.state.get() {
            Some(Ok(conn)) => Ok(conn.lock().unwrap_or_else(|e| e.into_inner())),
            Some(Err(cause)) => Err(Error::Initialization(cause.clone())),
            None => Err(Error::Initialization(Arc::new(Error::LoadAborted))),
        }
    }
}

#[async_trait]
impl TeamRepository for SqliteStore {
    async fn get_team(&self, id: TeamId) -> Result<Team> {
        let conn = self.conn().await?;
        get_team(&conn, id)?.ok_or_else(|| Error::NotFound(format!("team {id}")))
    }

    async fn get_team_by_name(&self, name: &str) -> Result<Team> {
        let conn = self.conn().await?;

        let id: Option<u64> = conn
            .query_row(
                "SELECT team_id FROM team_names WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        id.and_then(|id| get_team(&conn, TeamId(id)).transpose())
            .transpose()?
            .ok_or_else(|| Error::NotFound(format!("team {name}")))
    }

    async fn get_player(&self, id: &PlayerId) -> Result<Player> {
        let conn = self.conn().await?;
        get_player(&conn, id)?.ok_or_else(|| Error::NotFound(format!("player {id}")))
    }
}

fn load(config: CacheConfig, mut data: mpsc::Receiver<RawTeam>) -> Result<Mutex<Connection>> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut conn = Connection::open(&config.path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.execute_batch(SCHEMA)?;

    if config.refresh || is_stale(&conn)? {
        info!("refreshing team cache at {}", config.path.display());
        refresh(&mut conn, &mut data)?;
    } else {
        info!("team cache is fresh, skipping download");
    }

    Ok(Mutex::new(conn))
}

fn is_stale(conn: &Connection) -> Result<bool> {
    let stamp: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![UPDATE_TIMESTAMP_KEY],
            |row| row.get(0),
        )
        .optional()?;

    let Some(stamp) = stamp else { return Ok(true) };
    let Ok(stamp) = stamp.parse::<i64>() else {
        return Ok(true);
    };

    Ok(Utc::now().timestamp() - stamp > FRESHNESS_WINDOW_SECS)
}

/// Drains the download stream into the database inside one transaction.
/// Nothing is committed unless the whole stream loads cleanly, so an aborted
/// refresh leaves no partial state behind.
fn refresh(conn: &mut Connection, data: &mut mpsc::Receiver<RawTeam>) -> Result<()> {
    let tx = conn.transaction()?;

    while let Some(raw) = data.blocking_recv() {
        store_team(&tx, &payload::parse_team(&raw)?)?;
    }

    tx.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![UPDATE_TIMESTAMP_KEY, Utc::now().timestamp().to_string()],
    )?;

    tx.commit()?;
    Ok(())
}

fn store_team(conn: &Connection, team: &TeamPayload) -> Result<()> {
    let mut player_ids: Vec<PlayerId> = Vec::with_capacity(team.players.len());

    for p in &team.players {
        if !player_ids.contains(&p.id) {
            player_ids.push(p.id.clone());
        }

        match get_player(conn, &p.id)? {
            Some(mut player) => {
                if !player.teams.contains(&team.id) {
                    player.teams.push(team.id);
                    put_player(conn, &player)?;
                }
            }
            None => {
                put_player(
                    conn,
                    &Player {
                        id: p.id.clone(),
                        name: p.name.clone(),
                        age: p.age(),
                        teams: vec![team.id],
                    },
                )?;
            }
        }
    }

    // Team row and its name index row land in the same transaction.
    conn.execute(
        "INSERT OR REPLACE INTO teams (id, name, is_national, players) VALUES (?1, ?2, ?3, ?4)",
        params![
            team.id.0,
            team.name,
            team.is_national,
            serde_json::to_string(&player_ids)?
        ],
    )?;
    conn.execute(
        "INSERT OR REPLACE INTO team_names (name, team_id) VALUES (?1, ?2)",
        params![team.name, team.id.0],
    )?;

    Ok(())
}

fn get_team(conn: &Connection, id: TeamId) -> Result<Option<Team>> {
    conn.query_row(
        "SELECT id, name, is_national, players FROM teams WHERE id = ?1",
        params![id.0],
        |row| {
            Ok((
                row.get::<_, u64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, String>(3)?,
            ))
        },
    )
    .optional()?
    .map(|(id, name, is_national, players)| {
        Ok(Team {
            id: TeamId(id),
            name,
            is_national,
            players: serde_json::from_str(&players)?,
        })
    })
    .transpose()
}

fn get_player(conn: &Connection, id: &PlayerId) -> Result<Option<Player>> {
    conn.query_row(
        "SELECT id, name, age, teams FROM players WHERE id = ?1",
        params![id.0],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i32>(2)?,
                row.get::<_, String>(3)?,
            ))
        },
    )
    .optional()?
    .map(|(id, name, age, teams)| {
        Ok(Player {
            id: PlayerId(id),
            name,
            age,
            teams: serde_json::from_str(&teams)?,
        })
    })
    .transpose()
}

fn put_player(conn: &Connection, player: &Player) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO players (id, name, age, teams) VALUES (?1, ?2, ?3, ?4)",
        params![
            player.id.0,
            player.name,
            player.age,
            serde_json::to_string(&player.teams)?
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::*;

    fn raw(id: u64, body: &str) -> RawTeam {
        RawTeam {
            id,
            bytes: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    fn team_body(id: u64, name: &str, players: &[(&str, &str, i32)]) -> String {
        let players = players
            .iter()
            .map(|(pid, pname, age)| {
                format!(r#"{{"id": "{pid}", "name": "{pname}", "age": {age}}}"#)
            })
            .collect::<Vec<_>>()
            .join(",");
        format!(
            r#"{{"data":{{"team":{{"id": {id}, "name": "{name}", "IsNational": false, "players": [{players}]}}}}}}"#
        )
    }

    async fn store_with(config: CacheConfig, payloads: Vec<RawTeam>) -> SqliteStore {
        let (tx, rx) = mpsc::channel(payloads.len().max(1));
        for p in payloads {
            tx.send(p).await.unwrap();
        }
        drop(tx);
        SqliteStore::new(rx, config)
    }

    fn config(dir: &TempDir) -> CacheConfig {
        CacheConfig {
            path: dir.path().join("teams.db"),
            refresh: false,
        }
    }

    #[tokio::test]
    async fn test_refresh_and_query_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = store_with(
            config(&temp),
            vec![
                raw(1, &team_body(1, "Apoel FC", &[("6", "Nuno Morais", 32)])),
                raw(
                    200,
                    &team_body(
                        200,
                        "Test 1",
                        &[("6", "Nuno Morais", 32), ("235", "Jaroslav Plasil", 34)],
                    ),
                ),
            ],
        )
        .await;

        let player = store.get_player(&"6".into()).await.unwrap();
        assert_eq!(player.teams, vec![TeamId(1), TeamId(200)]);

        let team = store.get_team(TeamId(1)).await.unwrap();
        assert_eq!(team.players, vec![PlayerId::from("6")]);

        let by_name = store.get_team_by_name("Test 1").await.unwrap();
        assert_eq!(by_name.id, TeamId(200));

        let missing = store.get_team(TeamId(9999)).await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_the_download() {
        let temp = TempDir::new().unwrap();

        let first = store_with(
            config(&temp),
            vec![raw(1, &team_body(1, "Apoel FC", &[("6", "Nuno Morais", 32)]))],
        )
        .await;
        first.get_team(TeamId(1)).await.unwrap();
        drop(first);

        let (tx, rx) = mpsc::channel(1);
        let second = SqliteStore::new(rx, config(&temp));

        // Answered from disk, stream untouched.
        let team = second.get_team_by_name("Apoel FC").await.unwrap();
        assert_eq!(team.id, TeamId(1));

        // The load task dropped the receiver without draining it.
        assert!(
            tx.send(raw(2, &team_body(2, "Ignored", &[])))
                .await
                .is_err()
        );
        assert!(second.get_team(TeamId(2)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_stale_cache_forces_refresh() {
        let temp = TempDir::new().unwrap();

        let first = store_with(
            config(&temp),
            vec![raw(1, &team_body(1, "Old Team", &[]))],
        )
        .await;
        first.get_team(TeamId(1)).await.unwrap();
        drop(first);

        // Age the cache past the freshness window.
        let conn = Connection::open(temp.path().join("teams.db")).unwrap();
        let aged = (Utc::now().timestamp() - FRESHNESS_WINDOW_SECS - 60).to_string();
        conn.execute(
            "UPDATE meta SET value = ?1 WHERE key = ?2",
            params![aged, UPDATE_TIMESTAMP_KEY],
        )
        .unwrap();
        drop(conn);

        let second = store_with(
            config(&temp),
            vec![raw(2, &team_body(2, "New Team", &[]))],
        )
        .await;
        second.get_team(TeamId(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_forced_refresh_drains_despite_fresh_cache() {
        let temp = TempDir::new().unwrap();

        let first = store_with(config(&temp), vec![raw(1, &team_body(1, "Old Team", &[]))]).await;
        first.get_team(TeamId(1)).await.unwrap();
        drop(first);

        let forced = CacheConfig {
            refresh: true,
            ..config(&temp)
        };
        let second = store_with(forced, vec![raw(2, &team_body(2, "New Team", &[]))]).await;
        second.get_team(TeamId(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_parse_failure_rolls_back_and_poisons_queries() {
        let temp = TempDir::new().unwrap();
        let store = store_with(
            config(&temp),
            vec![
                raw(1, &team_body(1, "Apoel FC", &[("6", "Nuno Morais", 32)])),
                raw(2, "garbage"),
            ],
        )
        .await;

        let first = store.get_team(TeamId(1)).await.unwrap_err();
        let second = store.get_player(&"6".into()).await.unwrap_err();
        assert!(first.is_initialization());
        assert!(second.is_initialization());

        // The aborted refresh committed nothing.
        let conn = Connection::open(temp.path().join("teams.db")).unwrap();
        let teams: i64 = conn
            .query_row("SELECT COUNT(*) FROM teams", [], |row| row.get(0))
            .unwrap();
        let players: i64 = conn
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))
            .unwrap();
        let stamped: i64 = conn
            .query_row("SELECT COUNT(*) FROM meta", [], |row| row.get(0))
            .unwrap();
        assert_eq!((teams, players, stamped), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_player_team_lists_dedupe_within_a_pass() {
        let temp = TempDir::new().unwrap();
        let dup = r#"{"data":{"team":{"id": 3, "name": "Dupes", "IsNational": false, "players": [
            {"id": "6", "name": "Nuno Morais", "age": 32},
            {"id": "6", "name": "Nuno Morais", "age": 32}
        ]}}}"#;
        let store = store_with(
            config(&temp),
            vec![
                raw(1, &team_body(1, "Apoel FC", &[("6", "Nuno Morais", 32)])),
                raw(3, dup),
            ],
        )
        .await;

        let team = store.get_team(TeamId(3)).await.unwrap();
        assert_eq!(team.players, vec![PlayerId::from("6")]);

        let player = store.get_player(&"6".into()).await.unwrap();
        assert_eq!(player.teams, vec![TeamId(1), TeamId(3)]);
    }
}
