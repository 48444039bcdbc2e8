//! WebSocket gateway: upgrade handling, session loop, room routing

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{JoinOutcome, RoomCmd, RoomHandle};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::protocol::{ClientMsg, GameMode, ServerMsg};

/// Liveness probe cadence; a connection silent for a full interval is dropped
const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Room joined when the client names none
const DEFAULT_ROOM: &str = "default";

const OUTBOUND_BUFFER: usize = 64;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Binding of a connection to a room after a successful join
struct Session {
    room: RoomHandle,
    client_id: String,
}

enum BindResult {
    Bound(Session),
    /// Room full or unreachable; the connection is closed
    Rejected,
}

/// Run one connection's session: demultiplex inbound control messages into
/// room commands, forward outbound messages from the room, probe liveness.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(OUTBOUND_BUFFER);
    let rate_limiter = PlayerRateLimiter::new();

    let mut session: Option<Session> = None;
    let mut alive = true;
    let mut probe = tokio::time::interval_at(
        tokio::time::Instant::now() + PROBE_INTERVAL,
        PROBE_INTERVAL,
    );

    loop {
        tokio::select! {
            inbound = ws_stream.next() => {
                let Some(result) = inbound else { break };
                match result {
                    Ok(Message::Text(text)) => {
                        alive = true;
                        if !rate_limiter.check_input() {
                            warn!("Rate limited inbound message");
                            continue;
                        }
                        // Malformed and unrecognized payloads are dropped
                        // silently; the connection stays open.
                        let Ok(client_msg) = serde_json::from_str::<ClientMsg>(&text) else {
                            debug!("Dropping unparseable message");
                            continue;
                        };
                        match client_msg {
                            ClientMsg::Join { room, client_id, mode } => {
                                if session.is_some() {
                                    debug!("Ignoring join on an already-bound connection");
                                    continue;
                                }
                                match bind_to_room(&state, &out_tx, room, client_id, mode).await {
                                    BindResult::Bound(bound) => session = Some(bound),
                                    BindResult::Rejected => break,
                                }
                            }
                            ClientMsg::Input { input } => {
                                if let Some(session) = &session {
                                    let _ = session.room.cmd_tx.try_send(RoomCmd::Input {
                                        client_id: session.client_id.clone(),
                                        input,
                                    });
                                }
                            }
                            ClientMsg::Rematch => {
                                if let Some(session) = &session {
                                    let _ = session.room.cmd_tx.try_send(RoomCmd::Rematch {
                                        client_id: session.client_id.clone(),
                                    });
                                }
                            }
                        }
                    }
                    Ok(Message::Pong(_)) | Ok(Message::Ping(_)) => {
                        alive = true;
                    }
                    Ok(Message::Binary(_)) => {
                        warn!("Ignoring binary message");
                    }
                    Ok(Message::Close(_)) => break,
                    Err(err) => {
                        debug!(error = %err, "WebSocket error");
                        break;
                    }
                }
            }
            outbound = out_rx.recv() => {
                // Never `None` while this task holds `out_tx`.
                if let Some(msg) = outbound {
                    if send_msg(&mut ws_sink, &msg).await.is_err() {
                        break;
                    }
                }
            }
            _ = probe.tick() => {
                if !alive {
                    debug!("Liveness probe failed, terminating connection");
                    break;
                }
                alive = false;
                if ws_sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Flush anything already queued (the `full` reply in particular).
    while let Ok(msg) = out_rx.try_recv() {
        if send_msg(&mut ws_sink, &msg).await.is_err() {
            break;
        }
    }
    let _ = ws_sink.send(Message::Close(None)).await;

    if let Some(session) = session {
        let _ = session
            .room
            .cmd_tx
            .send(RoomCmd::Disconnect {
                client_id: session.client_id,
                transport: out_tx,
            })
            .await;
    }
}

/// Resolve defaults, find or create the room, and ask it to bind us
async fn bind_to_room(
    state: &AppState,
    out_tx: &mpsc::Sender<ServerMsg>,
    room: Option<String>,
    client_id: Option<String>,
    mode: Option<GameMode>,
) -> BindResult {
    let room_id = room.unwrap_or_else(|| DEFAULT_ROOM.to_string());
    let client_id = client_id.unwrap_or_else(generate_client_id);
    let mode = mode.unwrap_or_default();

    // One retry covers the window where a room retires between lookup and use.
    for _ in 0..2 {
        let handle = state.rooms.get_or_create(&room_id, mode);
        let (ack_tx, ack_rx) = oneshot::channel();
        let cmd = RoomCmd::Join {
            client_id: client_id.clone(),
            transport: out_tx.clone(),
            ack: ack_tx,
        };
        if handle.cmd_tx.send(cmd).await.is_err() {
            continue;
        }
        match ack_rx.await {
            Ok(JoinOutcome::Joined) => {
                info!(room_id = %room_id, client_id = %client_id, "Connection bound to room");
                return BindResult::Bound(Session {
                    room: handle,
                    client_id,
                });
            }
            Ok(JoinOutcome::Full) => return BindResult::Rejected,
            Err(_) => continue,
        }
    }

    warn!(room_id = %room_id, client_id = %client_id, "Could not bind to room");
    BindResult::Rejected
}

fn generate_client_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
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
