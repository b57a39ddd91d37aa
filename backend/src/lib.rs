pub mod board;
pub mod cache;
pub mod config;
pub mod crud;
pub mod error;
pub mod fanout;
pub mod gate;
pub mod handler;
pub mod lobby;
pub mod machine;
pub mod model;
pub mod naming;
pub mod protocol;
pub mod reconciler;
pub mod room;
pub mod schema;
pub mod store;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::board::Lines;
use crate::fanout::{Groups, NotificationFanout};
use crate::gate::Authenticator;
use crate::handler::{get_match_by_id_handler, handle_websocket, health_handler};
use crate::lobby::Lobby;
use crate::machine::MatchStateMachine;
use crate::reconciler::PresenceReconciler;
use crate::room::RoomService;
use crate::store::MatchStore;

pub struct AppState {
    pub fanout: NotificationFanout,
    pub room: RoomService,
    pub lobby: Lobby,
    pub reconciler: Arc<PresenceReconciler>,
    pub authenticator: Arc<dyn Authenticator>,
    pub connection_count: AtomicUsize,
}

impl AppState {
    pub fn new(store: Arc<dyn MatchStore>, authenticator: Arc<dyn Authenticator>, page_size: usize) -> Self {
        Self::with_rng(store, authenticator, page_size, StdRng::from_os_rng())
    }

    /// Wires every service around one store and one group registry.
    pub fn with_rng(
        store: Arc<dyn MatchStore>,
        authenticator: Arc<dyn Authenticator>,
        page_size: usize,
        rng: StdRng,
    ) -> Self {
        let fanout = NotificationFanout::new(Arc::new(Groups::new()));
        let machine = MatchStateMachine::new(store.clone(), Arc::new(Lines));
        Self {
            room: RoomService::new(store.clone(), machine, fanout.clone()),
            lobby: Lobby::with_rng(store.clone(), fanout.clone(), page_size, rng),
            reconciler: Arc::new(PresenceReconciler::new(store, fanout.clone())),
            fanout,
            authenticator,
            connection_count: AtomicUsize::new(0),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", any(handle_websocket))
        .route("/api/matches/:match_id", get(get_match_by_id_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
}
