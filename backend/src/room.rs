use std::sync::Arc;

use crate::error::MatchError;
use crate::fanout::{GroupKey, NotificationFanout};
use crate::gate::{self, CallContext};
use crate::machine::MatchStateMachine;
use crate::schema::{Match, MatchId};
use crate::store::MatchStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomActivity {
    Join,
    Leave,
    Move { cell: u16 },
}

/// Role-scoped operations, each run through the same fixed pipeline:
/// authenticate, authorize against the match, transition, subscribe or
/// unsubscribe the connection, then fan the result out.
pub struct RoomService {
    store: Arc<dyn MatchStore>,
    machine: MatchStateMachine,
    fanout: NotificationFanout,
}

impl RoomService {
    pub fn new(store: Arc<dyn MatchStore>, machine: MatchStateMachine, fanout: NotificationFanout) -> Self {
        Self {
            store,
            machine,
            fanout,
        }
    }

    pub async fn handle(
        &self,
        ctx: &CallContext,
        id: MatchId,
        activity: RoomActivity,
    ) -> Result<Match, MatchError> {
        let caller = gate::authenticate(ctx)?;
        gate::authorize(self.store.as_ref(), caller, id).await?;

        let updated = match activity {
            RoomActivity::Join => self.machine.join(id, caller, ctx.connection).await,
            RoomActivity::Leave => self.machine.leave(id, caller, ctx.connection).await,
            RoomActivity::Move { cell } => self.machine.make_move(id, caller, ctx.connection, cell).await,
        }
        .inspect_err(|e| {
            tracing::debug!(match_id = %id, caller = %caller, ?activity, error = %e, "room activity rejected")
        })?;

        let room = GroupKey::for_match(id);
        match activity {
            RoomActivity::Join => self.fanout.groups().join(room, ctx.connection),
            RoomActivity::Leave => self.fanout.groups().leave(&room, ctx.connection),
            RoomActivity::Move { .. } => {}
        }
        self.fanout.match_changed(&updated);

        tracing::info!(
            match_id = %id,
            caller = %caller,
            ?activity,
            outcome = ?updated.outcome,
            "room activity applied"
        );
        Ok(updated)
    }

    pub async fn join(&self, ctx: &CallContext, id: MatchId) -> Result<Match, MatchError> {
        self.handle(ctx, id, RoomActivity::Join).await
    }

    pub async fn leave(&self, ctx: &CallContext, id: MatchId) -> Result<Match, MatchError> {
        self.handle(ctx, id, RoomActivity::Leave).await
    }

    pub async fn make_move(&self, ctx: &CallContext, id: MatchId, cell: u16) -> Result<Match, MatchError> {
        self.handle(ctx, id, RoomActivity::Move { cell }).await
    }

    /// Plain read for the HTTP endpoint.
    pub async fn get(&self, id: MatchId) -> Result<Match, MatchError> {
        self.store.read(id).await?.ok_or(MatchError::NotFound(id))
    }
}
