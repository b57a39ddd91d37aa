use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::MatchError;
use crate::fanout::Outbox;
use crate::gate::CallContext;
use crate::protocol::{ClientMessage, ClientRequest, ReplyBody, ServerMessage};
use crate::schema::{ConnectionId, MatchId, UserId};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    access_token: Option<String>,
}

pub async fn get_match_by_id_handler(
    Path(match_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, MatchError> {
    Ok(Json(state.room.get(MatchId(match_id)).await?))
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.connection_count.load(Ordering::SeqCst),
    }))
}

/// Browsers cannot set headers on a websocket handshake, so the token may
/// also come as `?access_token=`.
pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let token = bearer
        .map(|TypedHeader(auth)| auth.token().to_owned())
        .or(params.access_token);
    let caller = token
        .as_deref()
        .and_then(|token| state.authenticator.identify(token));
    ws.on_upgrade(move |socket| handle_socket_connection(socket, state, caller))
}

/// Runs one request to completion and builds its reply.
pub async fn dispatch(state: &AppState, ctx: &CallContext, request: ClientRequest) -> ReplyBody {
    match request {
        ClientRequest::CreateMatch { secret } => state.lobby.create(ctx, secret).await.into(),
        ClientRequest::EnterLobby => state.lobby.enter(ctx).await.into(),
        ClientRequest::ExitLobby => state.lobby.exit(ctx).into(),
        ClientRequest::LatestMatches { after } => state.lobby.latest(ctx, after).await.into(),
        ClientRequest::OlderMatches { before } => state.lobby.older(ctx, before).await.into(),
        ClientRequest::Join { match_id } => state.room.join(ctx, match_id).await.into(),
        ClientRequest::Leave { match_id } => state.room.leave(ctx, match_id).await.into(),
        ClientRequest::Move { match_id, cell } => {
            state.room.make_move(ctx, match_id, cell).await.into()
        }
    }
}

async fn handle_socket_connection(socket: WebSocket, state: Arc<AppState>, caller: Option<UserId>) {
    let ctx = CallContext::new(ConnectionId::new(), caller);
    let (outbox, mut inbox) = mpsc::unbounded_channel::<ServerMessage>();
    state.fanout.groups().register(ctx.connection, outbox.clone());

    let current_connections = state.connection_count.fetch_add(1, Ordering::SeqCst);
    tracing::info!(
        connection = %ctx.connection,
        authenticated = caller.is_some(),
        "New connection. Total connections: {}",
        current_connections + 1
    );

    let (mut sender, mut receiver) = socket.split();

    // Drains the outbox: replies and pushed events share one ordered queue.
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = inbox.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "could not encode outgoing message");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Every request runs in its own task so a slow store call never blocks
    // the read loop, and a committed write still fans out after a disconnect.
    let mut requests = JoinSet::new();
    loop {
        tokio::select! {
            _ = &mut send_task => break,
            Some(done) = requests.join_next(), if !requests.is_empty() => {
                if let Err(e) = done {
                    tracing::warn!(connection = %ctx.connection, error = %e, "request task failed");
                }
            }
            frame = receiver.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                let ClientMessage { id, request } = match serde_json::from_str(&text) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::debug!(connection = %ctx.connection, error = %e, "ignoring malformed frame");
                        continue;
                    }
                };
                requests.spawn(serve_request(state.clone(), ctx, id, request, outbox.clone()));
            }
        }
    }

    close_connection(&state, ctx.connection, requests).await;
    send_task.abort();

    let remaining = state.connection_count.fetch_sub(1, Ordering::SeqCst) - 1;
    tracing::info!(connection = %ctx.connection, "Connection closed. Remaining connections: {}", remaining);
}

async fn serve_request(
    state: Arc<AppState>,
    ctx: CallContext,
    id: u64,
    request: ClientRequest,
    outbox: Outbox,
) {
    let body = dispatch(&state, &ctx, request).await;
    // The socket may be gone by now; the reply is simply dropped.
    let _ = outbox.send(ServerMessage::Reply { id, body });
}

/// Tears a connection down once its reader has stopped.
///
/// In-flight requests finish first: a Join still waiting on the store must
/// commit before the seats bound to this connection are released, otherwise
/// it would bind a seat to a connection nobody reconciles again.
pub async fn close_connection(state: &AppState, connection: ConnectionId, mut requests: JoinSet<()>) {
    while let Some(done) = requests.join_next().await {
        if let Err(e) = done {
            tracing::warn!(%connection, error = %e, "request task failed");
        }
    }
    state.fanout.groups().unregister(connection);
    state.reconciler.run(connection).await;
}
