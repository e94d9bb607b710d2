use serde::Deserialize;

use crate::download::RawTeam;
use crate::error::{Error, Result};
use crate::types::{PlayerId, TeamId};

/// The upstream payload wraps the team under `data.team`. Field casing and
/// the loosely typed `age` follow the wire format as served.
#[derive(Debug, Deserialize)]
struct Envelope {
    data: EnvelopeData,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    team: TeamPayload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TeamPayload {
    pub id: TeamId,
    pub name: String,
    #[serde(rename = "IsNational", default)]
    pub is_national: bool,
    #[serde(default)]
    pub players: Vec<PlayerPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlayerPayload {
    pub id: PlayerId,
    pub name: String,
    #[serde(default)]
    age: Option<Age>,
}

/// The endpoint serves `age` either as a number or as a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Age {
    Number(i32),
    Text(String),
}

impl PlayerPayload {
    /// Non-numeric or missing ages collapse to 0; there is nothing better to
    /// do with them.
    pub(crate) fn age(&self) -> i32 {
        match &self.age {
            Some(Age::Number(n)) => *n,
            Some(Age::Text(s)) => s.parse().unwrap_or(0),
            None => 0,
        }
    }
}

/// Parses one downloaded record. A failure here is fatal to the load pass
/// that encountered it.
pub(crate) fn parse_team(raw: &RawTeam) -> Result<TeamPayload> {
    serde_json::from_slice::<Envelope>(&raw.bytes)
        .map(|envelope| envelope.data.team)
        .map_err(|source| Error::Parse { id: raw.id, source })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn raw(id: u64, body: &str) -> RawTeam {
        RawTeam {
            id,
            bytes: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    #[test]
    fn test_parses_full_payload() {
        let body = r#"{"data":{"team":{
            "id": 1,
            "name": "Apoel FC",
            "IsNational": false,
            "players": [
                {"id": "6", "name": "Nuno Morais", "age": 32},
                {"id": "235", "name": "Jaroslav Plasil", "age": "34"}
            ]
        }}}"#;

        let team = parse_team(&raw(1, body)).unwrap();
        assert_eq!(team.id, TeamId(1));
        assert_eq!(team.name, "Apoel FC");
        assert!(!team.is_national);
        assert_eq!(team.players.len(), 2);
        assert_eq!(team.players[0].age(), 32);
        assert_eq!(team.players[1].age(), 34);
    }

    #[test]
    fn test_tolerates_missing_and_junk_ages() {
        let body = r#"{"data":{"team":{
            "id": 2,
            "name": "Test",
            "players": [
                {"id": "a", "name": "A"},
                {"id": "b", "name": "B", "age": "unknown"}
            ]
        }}}"#;

        let team = parse_team(&raw(2, body)).unwrap();
        assert_eq!(team.players[0].age(), 0);
        assert_eq!(team.players[1].age(), 0);
    }

    #[test]
    fn test_malformed_payload_reports_record_id() {
        let err = parse_team(&raw(9, "not json")).unwrap_err();
        assert!(matches!(err, Error::Parse { id: 9, .. }));
    }
}
