use std::sync::{Arc, Mutex};

use chrono::Utc;
use rand::rngs::StdRng;

use crate::error::MatchError;
use crate::fanout::{GroupKey, NotificationFanout};
use crate::gate::{self, CallContext};
use crate::naming;
use crate::schema::{AccessSecret, Match, MatchId, Role};
use crate::store::{ListQuery, MatchStore};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Match creation and the paged match listing.
pub struct Lobby {
    store: Arc<dyn MatchStore>,
    fanout: NotificationFanout,
    turns: Mutex<StdRng>,
    page_size: usize,
}

impl Lobby {
    /// `rng` decides who moves first in each new match.
    pub fn with_rng(
        store: Arc<dyn MatchStore>,
        fanout: NotificationFanout,
        page_size: usize,
        rng: StdRng,
    ) -> Self {
        Self {
            store,
            fanout,
            turns: Mutex::new(rng),
            page_size: page_size.max(1),
        }
    }

    fn first_turn(&self) -> Role {
        // A poisoned lock only means another creator panicked mid-draw.
        let mut rng = self.turns.lock().unwrap_or_else(|e| e.into_inner());
        Role::draw(&mut *rng)
    }

    /// `access_secret` is stored exactly as given; it is already hashed.
    pub async fn create(
        &self,
        ctx: &CallContext,
        access_secret: Option<AccessSecret>,
    ) -> Result<Match, MatchError> {
        let caller = gate::authenticate(ctx)?;
        let now = Utc::now();
        let m = Match::open(
            MatchId::new(),
            naming::generate(now),
            access_secret,
            caller,
            self.first_turn(),
            now,
        );
        let m = self.store.insert(m).await?;
        tracing::info!(match_id = %m.id, name = %m.name, creator = %caller, "match created");
        self.fanout.lobby_changed(vec![m.clone()]);
        Ok(m)
    }

    /// Subscribes the connection to lobby events and returns the newest page.
    pub async fn enter(&self, ctx: &CallContext) -> Result<Vec<Match>, MatchError> {
        gate::authenticate(ctx)?;
        self.fanout.groups().join(GroupKey::lobby(), ctx.connection);
        self.latest(ctx, None).await
    }

    pub fn exit(&self, ctx: &CallContext) -> Result<(), MatchError> {
        gate::authenticate(ctx)?;
        self.fanout.groups().leave(&GroupKey::lobby(), ctx.connection);
        Ok(())
    }

    pub async fn latest(&self, ctx: &CallContext, after: Option<MatchId>) -> Result<Vec<Match>, MatchError> {
        let viewer = gate::authenticate(ctx)?;
        let page = self
            .store
            .list(ListQuery {
                viewer: Some(viewer),
                after,
                before: None,
                limit: self.page_size,
            })
            .await?;
        Ok(page)
    }

    pub async fn older(&self, ctx: &CallContext, before: MatchId) -> Result<Vec<Match>, MatchError> {
        let viewer = gate::authenticate(ctx)?;
        let page = self
            .store
            .list(ListQuery {
                viewer: Some(viewer),
                after: None,
                before: Some(before),
                limit: self.page_size,
            })
            .await?;
        Ok(page)
    }
}
