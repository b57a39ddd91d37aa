//! Join, Leave and Move as predicate/transform pairs over [`MatchStore`].
//!
//! Every transition is one conditional transform: the predicate decides
//! against the snapshot being written, so of several callers racing on the
//! same match exactly those whose precondition still holds at write time
//! succeed. A failed predicate is reported as
//! [`MatchError::InvalidOperation`] and is never retried.

use std::sync::Arc;

use crate::board::{Board, OutcomeEvaluator};
use crate::error::MatchError;
use crate::schema::{ConnectionId, Match, MatchId, Outcome, Presence, Role, UserId};
use crate::store::MatchStore;

pub fn join_admits(m: &Match, caller: UserId) -> bool {
    let role = m.role_of(caller);
    let eligible = role.is_some() || m.is_open_for_newcomer();
    let returning = role.is_some_and(|r| m.side(r).presence == Presence::Left)
        || m.side_b.player_id.is_none();
    eligible && m.outcome == Outcome::Going && returning
}

pub fn apply_join(m: &mut Match, caller: UserId, connection: ConnectionId) {
    let role = m.role_of(caller).unwrap_or(Role::SideB);
    let side = m.side_mut(role);
    side.player_id.get_or_insert(caller);
    side.connection_id = Some(connection);
    side.presence = Presence::Joined;
}

pub fn leave_admits(m: &Match, caller: UserId, connection: ConnectionId) -> bool {
    m.role_of(caller)
        .is_some_and(|role| m.side(role).is_bound_to(connection))
}

pub fn apply_leave(m: &mut Match, caller: UserId) {
    if let Some(role) = m.role_of(caller) {
        m.side_mut(role).presence = Presence::Left;
    }
}

pub fn move_admits(m: &Match, caller: UserId, connection: ConnectionId, cell: Board) -> bool {
    m.outcome == Outcome::Going
        && m.side_a.player_id.is_some()
        && m.side_b.player_id.is_some()
        && m.role_of(caller) == Some(m.next_turn)
        && m.side(m.next_turn).is_bound_to(connection)
        && !m.occupied().intersects(cell)
}

pub fn apply_move(m: &mut Match, caller: UserId, cell: Board, evaluator: &dyn OutcomeEvaluator) {
    let Some(mover) = m.role_of(caller) else {
        return;
    };
    let side = m.side_mut(mover);
    side.moves = side.moves | cell;
    m.next_turn = mover.other();
    let verdict = evaluator.evaluate(m.side(mover).moves, m.side(mover.other()).moves);
    m.outcome = verdict.for_mover(mover);
}

pub struct MatchStateMachine {
    store: Arc<dyn MatchStore>,
    evaluator: Arc<dyn OutcomeEvaluator>,
}

impl MatchStateMachine {
    pub fn new(store: Arc<dyn MatchStore>, evaluator: Arc<dyn OutcomeEvaluator>) -> Self {
        Self { store, evaluator }
    }

    pub async fn join(
        &self,
        id: MatchId,
        caller: UserId,
        connection: ConnectionId,
    ) -> Result<Match, MatchError> {
        self.store
            .conditional_transform(
                id,
                &|m: &Match| join_admits(m, caller),
                &|m: &mut Match| apply_join(m, caller, connection),
            )
            .await?
            .ok_or_else(|| {
                MatchError::invalid("Please check if you are part of the match and it is still going.")
            })
    }

    pub async fn leave(
        &self,
        id: MatchId,
        caller: UserId,
        connection: ConnectionId,
    ) -> Result<Match, MatchError> {
        self.store
            .conditional_transform(
                id,
                &|m: &Match| leave_admits(m, caller, connection),
                &|m: &mut Match| apply_leave(m, caller),
            )
            .await?
            .ok_or_else(|| MatchError::invalid("This connection does not hold a seat in the match."))
    }

    /// `cell` is the raw single-cell mask sent by the client.
    pub async fn make_move(
        &self,
        id: MatchId,
        caller: UserId,
        connection: ConnectionId,
        cell: u16,
    ) -> Result<Match, MatchError> {
        let cell = Board::cell(cell)
            .ok_or_else(|| MatchError::invalid(format!("{cell:#x} is not a single board cell.")))?;
        let evaluator = self.evaluator.as_ref();
        self.store
            .conditional_transform(
                id,
                &|m: &Match| move_admits(m, caller, connection, cell),
                &|m: &mut Match| apply_move(m, caller, cell, evaluator),
            )
            .await?
            .ok_or_else(|| {
                MatchError::invalid("It is not your turn, the cell is taken, or the match is over.")
            })
    }
}
