//! Releases the seats a dropped connection was holding.

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::error::StoreError;
use crate::fanout::NotificationFanout;
use crate::schema::{ConnectionId, Match, Presence, Role};
use crate::store::MatchStore;

fn holds_seat(m: &Match, connection: ConnectionId) -> bool {
    Role::ALL.into_iter().any(|role| {
        let side = m.side(role);
        side.is_bound_to(connection) && side.presence == Presence::Joined
    })
}

fn release(m: &mut Match, connection: ConnectionId) {
    for role in Role::ALL {
        let side = m.side_mut(role);
        if side.is_bound_to(connection) {
            side.presence = Presence::Left;
        }
    }
}

pub struct PresenceReconciler {
    store: Arc<dyn MatchStore>,
    fanout: NotificationFanout,
}

impl PresenceReconciler {
    pub fn new(store: Arc<dyn MatchStore>, fanout: NotificationFanout) -> Self {
        Self { store, fanout }
    }

    /// Marks every role still bound to `connection` as Left and returns the
    /// matches that actually changed. A failure on one match is logged and
    /// does not stop the others.
    pub async fn reconcile(&self, connection: ConnectionId) -> Result<Vec<Match>, StoreError> {
        let candidates = self.store.read_by_connection(connection).await?;

        let writes = candidates.iter().map(|m| async move {
            let result = self
                .store
                .conditional_transform(
                    m.id,
                    &|m: &Match| holds_seat(m, connection),
                    &|m: &mut Match| release(m, connection),
                )
                .await;
            (m.id, result)
        });

        let changed = join_all(writes)
            .await
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(updated) => updated,
                Err(e) => {
                    tracing::warn!(match_id = %id, %connection, error = %e, "could not release seat");
                    None
                }
            })
            .collect();
        Ok(changed)
    }

    /// Reconciles and publishes the result. Never fails; problems are logged.
    pub async fn run(&self, connection: ConnectionId) {
        match self.reconcile(connection).await {
            Ok(changed) => {
                tracing::info!(%connection, released = changed.len(), "reconciled presence");
                for m in &changed {
                    self.fanout.room_changed(m);
                }
                self.fanout.lobby_changed(changed);
            }
            Err(e) => tracing::error!(%connection, error = %e, "presence reconciliation failed"),
        }
    }

    pub fn spawn(self: &Arc<Self>, connection: ConnectionId) -> JoinHandle<()> {
        let reconciler = Arc::clone(self);
        tokio::spawn(async move { reconciler.run(connection).await })
    }
}
