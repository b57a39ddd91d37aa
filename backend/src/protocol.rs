use serde::{Deserialize, Serialize};

use crate::error::{AppError, MatchError};
use crate::schema::{AccessSecret, Match, MatchId};

/// One request frame from a client. `id` is echoed back on the reply.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub id: u64,
    #[serde(flatten)]
    pub request: ClientRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ClientRequest {
    /// `secret` arrives already hashed and salted.
    CreateMatch {
        #[serde(default)]
        secret: Option<AccessSecret>,
    },
    EnterLobby,
    ExitLobby,
    #[serde(rename_all = "camelCase")]
    LatestMatches { after: Option<MatchId> },
    #[serde(rename_all = "camelCase")]
    OlderMatches { before: MatchId },
    #[serde(rename_all = "camelCase")]
    Join { match_id: MatchId },
    #[serde(rename_all = "camelCase")]
    Leave { match_id: MatchId },
    #[serde(rename_all = "camelCase")]
    Move { match_id: MatchId, cell: u16 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplyBody {
    Match(Match),
    Matches(Vec<Match>),
    Done,
    Error(AppError),
}

impl From<Result<Match, MatchError>> for ReplyBody {
    fn from(result: Result<Match, MatchError>) -> Self {
        match result {
            Ok(m) => ReplyBody::Match(m),
            Err(e) => ReplyBody::Error(AppError::from(&e)),
        }
    }
}

impl From<Result<Vec<Match>, MatchError>> for ReplyBody {
    fn from(result: Result<Vec<Match>, MatchError>) -> Self {
        match result {
            Ok(matches) => ReplyBody::Matches(matches),
            Err(e) => ReplyBody::Error(AppError::from(&e)),
        }
    }
}

impl From<Result<(), MatchError>> for ReplyBody {
    fn from(result: Result<(), MatchError>) -> Self {
        match result {
            Ok(()) => ReplyBody::Done,
            Err(e) => ReplyBody::Error(AppError::from(&e)),
        }
    }
}

/// Everything the server pushes down a socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Reply { id: u64, body: ReplyBody },
    MatchChanged {
        #[serde(rename = "match")]
        game: Match,
    },
    LobbyMatchesChanged { matches: Vec<Match>, count: usize },
}

impl ServerMessage {
    pub fn match_changed(m: &Match) -> Self {
        ServerMessage::MatchChanged { game: m.clone() }
    }

    pub fn lobby_matches_changed(matches: Vec<Match>) -> Self {
        let count = matches.len();
        ServerMessage::LobbyMatchesChanged { matches, count }
    }
}
