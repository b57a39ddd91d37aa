use std::fmt;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use uuid::Uuid;

use crate::board::Board;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type)]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub Uuid);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Time-ordered, so ids double as lobby pagination cursors.
    MatchId
);
id_type!(UserId);
id_type!(
    /// One live websocket. Fresh for every connection, never reused.
    ConnectionId
);

impl MatchId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Type)]
#[serde(rename_all = "camelCase")]
#[sqlx(type_name = "role", rename_all = "snake_case")]
pub enum Role {
    SideA,
    SideB,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::SideA, Role::SideB];

    pub fn other(self) -> Role {
        match self {
            Role::SideA => Role::SideB,
            Role::SideB => Role::SideA,
        }
    }

    /// Coin flip used to decide who opens a new match.
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> Role {
        if rng.random_bool(0.5) {
            Role::SideA
        } else {
            Role::SideB
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "presence", rename_all = "lowercase")]
pub enum Presence {
    Joined,
    Left,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Type)]
#[serde(rename_all = "camelCase")]
#[sqlx(type_name = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Going,
    Draw,
    SideAWin,
    SideBWin,
}

impl Outcome {
    pub fn win_for(role: Role) -> Outcome {
        match role {
            Role::SideA => Outcome::SideAWin,
            Role::SideB => Outcome::SideBWin,
        }
    }

    pub fn is_finished(self) -> bool {
        self != Outcome::Going
    }
}

/// What an observer can tell about a match from the outside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Open,
    Waiting,
    Live,
    Finished,
}

/// Salted hash guarding a password-protected match. Produced by the
/// credential service and handed in with `createMatch`; the engine only
/// stores it and never sends it back out.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessSecret {
    pub hash: String,
    pub salt: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Side {
    pub player_id: Option<UserId>,
    pub connection_id: Option<ConnectionId>,
    pub presence: Presence,
    pub moves: Board,
}

impl Side {
    fn vacant() -> Self {
        Self {
            player_id: None,
            connection_id: None,
            presence: Presence::Left,
            moves: Board::EMPTY,
        }
    }

    pub fn is_bound_to(&self, connection: ConnectionId) -> bool {
        self.connection_id == Some(connection)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub name: String,
    #[serde(skip)]
    pub access_secret: Option<AccessSecret>,
    pub side_a: Side,
    pub side_b: Side,
    pub next_turn: Role,
    pub outcome: Outcome,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// A fresh match owned by `creator`, who still has to join it.
    pub fn open(
        id: MatchId,
        name: String,
        access_secret: Option<AccessSecret>,
        creator: UserId,
        first_turn: Role,
        now: DateTime<Utc>,
    ) -> Self {
        let now = now.trunc_subsecs(6);
        Self {
            id,
            name,
            access_secret,
            side_a: Side {
                player_id: Some(creator),
                ..Side::vacant()
            },
            side_b: Side::vacant(),
            next_turn: first_turn,
            outcome: Outcome::Going,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn side(&self, role: Role) -> &Side {
        match role {
            Role::SideA => &self.side_a,
            Role::SideB => &self.side_b,
        }
    }

    pub fn side_mut(&mut self, role: Role) -> &mut Side {
        match role {
            Role::SideA => &mut self.side_a,
            Role::SideB => &mut self.side_b,
        }
    }

    /// The role `user` owns, side A taking precedence.
    pub fn role_of(&self, user: UserId) -> Option<Role> {
        Role::ALL
            .into_iter()
            .find(|role| self.side(*role).player_id == Some(user))
    }

    /// Nobody has ever taken side B.
    pub fn is_open_for_newcomer(&self) -> bool {
        let b = &self.side_b;
        b.player_id.is_none() && b.moves.is_empty() && b.presence == Presence::Left
    }

    pub fn occupied(&self) -> Board {
        self.side_a.moves | self.side_b.moves
    }

    pub fn is_protected(&self) -> bool {
        self.access_secret.is_some()
    }

    pub fn phase(&self) -> Phase {
        if self.outcome.is_finished() {
            Phase::Finished
        } else if self.side_b.player_id.is_none() {
            Phase::Open
        } else if self.side_a.presence == Presence::Joined
            && self.side_b.presence == Presence::Joined
        {
            Phase::Live
        } else {
            Phase::Waiting
        }
    }

    /// Advances the write clock. Always moves forward by at least one
    /// microsecond so that successive writes stay strictly ordered even when
    /// the wall clock stalls or steps back.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let floor = self.updated_at + Duration::microseconds(1);
        self.updated_at = now.trunc_subsecs(6).max(floor);
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn user() -> UserId {
        UserId(Uuid::new_v4())
    }

    #[test]
    fn new_match_is_open_with_creator_on_side_a() {
        let creator = user();
        let m = Match::open(MatchId::new(), "abc".into(), None, creator, Role::SideB, Utc::now());
        assert_eq!(m.side_a.player_id, Some(creator));
        assert_eq!(m.side_a.presence, Presence::Left);
        assert!(m.is_open_for_newcomer());
        assert_eq!(m.phase(), Phase::Open);
        assert_eq!(m.next_turn, Role::SideB);
        assert_eq!(m.role_of(creator), Some(Role::SideA));
        assert_eq!(m.role_of(user()), None);
    }

    #[test]
    fn phase_follows_presence_and_outcome() {
        let mut m = Match::open(MatchId::new(), "abc".into(), None, user(), Role::SideA, Utc::now());
        m.side_b.player_id = Some(user());
        assert_eq!(m.phase(), Phase::Waiting);
        m.side_a.presence = Presence::Joined;
        m.side_b.presence = Presence::Joined;
        assert_eq!(m.phase(), Phase::Live);
        m.outcome = Outcome::Draw;
        assert_eq!(m.phase(), Phase::Finished);
    }

    #[test]
    fn touch_is_strictly_monotonic() {
        let now = Utc::now();
        let mut m = Match::open(MatchId::new(), "abc".into(), None, user(), Role::SideA, now);
        let before = m.updated_at;
        m.touch(now);
        assert!(m.updated_at > before);
        let later = m.updated_at;
        m.touch(now - Duration::seconds(5));
        assert!(m.updated_at > later);
    }

    #[test]
    fn seeded_draw_is_reproducible() {
        let a: Vec<Role> = (0..8).map({
            let mut rng = StdRng::seed_from_u64(42);
            move |_| Role::draw(&mut rng)
        }).collect();
        let b: Vec<Role> = (0..8).map({
            let mut rng = StdRng::seed_from_u64(42);
            move |_| Role::draw(&mut rng)
        }).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn secret_never_reaches_the_wire() {
        let secret = AccessSecret {
            hash: "h".into(),
            salt: "s".into(),
        };
        let m = Match::open(MatchId::new(), "abc".into(), Some(secret), user(), Role::SideA, Utc::now());
        assert!(m.is_protected());
        let json = serde_json::to_value(&m).unwrap();
        assert!(json.get("accessSecret").is_none());
        assert_eq!(json["sideA"]["presence"], "left");
        assert_eq!(json["nextTurn"], "sideA");
        assert_eq!(json["outcome"], "going");
    }
}
