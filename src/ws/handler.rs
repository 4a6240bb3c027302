//! WebSocket upgrade handler and per-connection session

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{IngressMsg, SOCCER_SCENE};
use crate::http::middleware::verify_jwt;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, PlayerStats, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    pub token: String,
}

/// WebSocket upgrade handler; authentication happens before the upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    match verify_jwt(&query.token, &state.config.jwt_secret) {
        Ok(claims) => {
            info!(user_id = %claims.sub, "WebSocket upgrade for authenticated user");
            ws.on_upgrade(move |socket| handle_socket(socket, claims.sub, state))
        }
        Err(e) => {
            error!(error = %e, "WebSocket auth failed");
            Response::builder()
                .status(401)
                .body("Unauthorized".into())
                .unwrap()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    info!(user_id = %user_id, "new WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Read-through the stats repository; a null payload tells the client to
    // prompt for stat assignment
    let stats: Option<PlayerStats> = match state.stats.find_stats_by_user_id(user_id) {
        Ok(record) => record.and_then(|r| r.stats),
        Err(e) => {
            error!(user_id = %user_id, error = %e, "failed to fetch soccer stats");
            None
        }
    };

    let welcome = ServerMsg::Welcome {
        user_id,
        server_time: unix_millis(),
        stats,
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(user_id = %user_id, error = %e, "failed to send welcome");
        return;
    }

    // Direct channel for request/reply messages addressed to this player
    let (direct_tx, direct_rx) = mpsc::unbounded_channel();
    state.room.register(user_id, direct_tx);
    let room_rx = state.room.subscribe();

    run_session(user_id, stats, ws_sink, ws_stream, room_rx, direct_rx, &state).await;

    state.room.unregister(user_id);
    state.game.send(IngressMsg::Leave { player: user_id }).await;

    info!(user_id = %user_id, "WebSocket connection closed");
}

/// Pump messages both ways until the socket closes
async fn run_session(
    user_id: Uuid,
    stats: Option<PlayerStats>,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut room_rx: broadcast::Receiver<ServerMsg>,
    mut direct_rx: mpsc::UnboundedReceiver<ServerMsg>,
    state: &AppState,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    // Writer task: room broadcasts and direct replies -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                room = room_rx.recv() => match room {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(user_id = %user_id, lagged_count = n, "client lagged, skipping {} messages", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                direct = direct_rx.recv() => match direct {
                    Some(msg) => msg,
                    None => break,
                },
            };
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(user_id = %user_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> simulation ingress
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_message() {
                    warn!(user_id = %user_id, "rate limited inbound message");
                    continue;
                }
                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => route_client_msg(user_id, stats, msg, state).await,
                    Err(e) => {
                        // Malformed messages are dropped, never disconnected
                        warn!(user_id = %user_id, error = %e, "failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "client initiated close");
                break;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Translate scene routing into join/leave; everything else is a command
async fn route_client_msg(user_id: Uuid, stats: Option<PlayerStats>, msg: ClientMsg, state: &AppState) {
    match msg {
        ClientMsg::PlayerJoin { x, y, scene } if scene == SOCCER_SCENE => {
            state
                .game
                .send(IngressMsg::Join {
                    player: user_id,
                    display_name: display_name(user_id),
                    x,
                    y,
                    stats,
                })
                .await;
        }
        ClientMsg::PlayerJoin { scene, .. } => {
            debug!(user_id = %user_id, %scene, "join for non-soccer scene ignored");
        }
        ClientMsg::SceneChange { new_scene, x, y } => {
            if new_scene == SOCCER_SCENE {
                state
                    .game
                    .send(IngressMsg::Join {
                        player: user_id,
                        display_name: display_name(user_id),
                        x,
                        y,
                        stats,
                    })
                    .await;
            } else {
                state.game.send(IngressMsg::Leave { player: user_id }).await;
            }
        }
        other => {
            state
                .game
                .send(IngressMsg::Command { player: user_id, msg: other })
                .await;
        }
    }
}

fn display_name(user_id: Uuid) -> String {
    format!("Player_{}", &user_id.to_string()[..8])
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
