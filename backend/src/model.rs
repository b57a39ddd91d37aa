use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::error::StoreError;
use crate::schema::{AccessSecret, ConnectionId, Match, MatchId, Outcome, Presence, Role, Side, UserId};

// For sqlx
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct MatchModel {
    pub id: MatchId,
    pub name: String,
    pub secret_hash: Option<String>,
    pub secret_salt: Option<String>,
    pub side_a_player: UserId,
    pub side_a_connection: Option<ConnectionId>,
    pub side_a_presence: Presence,
    pub side_a_moves: i16,
    pub side_b_player: Option<UserId>,
    pub side_b_connection: Option<ConnectionId>,
    pub side_b_presence: Presence,
    pub side_b_moves: i16,
    pub next_turn: Role,
    pub outcome: Outcome,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn moves(id: MatchId, raw: i16) -> Result<Board, StoreError> {
    u16::try_from(raw)
        .ok()
        .and_then(Board::from_bits)
        .ok_or_else(|| StoreError::Corrupt {
            id,
            reason: format!("moves {raw:#x} do not fit the board"),
        })
}

impl TryFrom<MatchModel> for Match {
    type Error = StoreError;

    fn try_from(m: MatchModel) -> Result<Self, Self::Error> {
        let access_secret = match (m.secret_hash, m.secret_salt) {
            (Some(hash), Some(salt)) => Some(AccessSecret { hash, salt }),
            (None, None) => None,
            _ => {
                return Err(StoreError::Corrupt {
                    id: m.id,
                    reason: "secret hash and salt must be stored together".into(),
                })
            }
        };
        Ok(Self {
            id: m.id,
            name: m.name,
            access_secret,
            side_a: Side {
                player_id: Some(m.side_a_player),
                connection_id: m.side_a_connection,
                presence: m.side_a_presence,
                moves: moves(m.id, m.side_a_moves)?,
            },
            side_b: Side {
                player_id: m.side_b_player,
                connection_id: m.side_b_connection,
                presence: m.side_b_presence,
                moves: moves(m.id, m.side_b_moves)?,
            },
            next_turn: m.next_turn,
            outcome: m.outcome,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}

impl TryFrom<&Match> for MatchModel {
    type Error = StoreError;

    fn try_from(m: &Match) -> Result<Self, Self::Error> {
        let side_a_player = m.side_a.player_id.ok_or_else(|| StoreError::Corrupt {
            id: m.id,
            reason: "side A has no player".into(),
        })?;
        let (secret_hash, secret_salt) = match &m.access_secret {
            Some(secret) => (Some(secret.hash.clone()), Some(secret.salt.clone())),
            None => (None, None),
        };
        Ok(Self {
            id: m.id,
            name: m.name.clone(),
            secret_hash,
            secret_salt,
            side_a_player,
            side_a_connection: m.side_a.connection_id,
            side_a_presence: m.side_a.presence,
            side_a_moves: m.side_a.moves.bits() as i16,
            side_b_player: m.side_b.player_id,
            side_b_connection: m.side_b.connection_id,
            side_b_presence: m.side_b.presence,
            side_b_moves: m.side_b.moves.bits() as i16,
            next_turn: m.next_turn,
            outcome: m.outcome,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}
