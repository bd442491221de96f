use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use spinroom_core::processor::{self, ApplyOutcome};
use spinroom_core::store::RoomHandle;
use spinroom_core::{clock, error::CoreError, AppState};
use spinroom_models::protocol::{
    ClientEnvelope, ClientEvent, ServerMessage, ServerSignal,
};
use spinroom_models::member::CursorPos;
use spinroom_util::clock::now_ms;
use std::num::NonZeroU32;
use std::sync::{Arc, OnceLock};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::session::GatewaySession;

const PING_INTERVAL: Duration = Duration::from_secs(20);
/// Socket-level flood ceiling, well above the busiest legitimate
/// client (cursor plus a mixer control, both around 30 Hz).
const MAX_FRAMES_PER_MINUTE: u32 = 4800;

const CLOSE_UNKNOWN_ROOM: u16 = 4004;
const CLOSE_LAGGED: u16 = 4008;

static FLOOD_LIMITER: OnceLock<DefaultKeyedRateLimiter<String>> = OnceLock::new();

fn flood_limiter() -> &'static DefaultKeyedRateLimiter<String> {
    FLOOD_LIMITER.get_or_init(|| {
        RateLimiter::keyed(Quota::per_minute(
            NonZeroU32::new(MAX_FRAMES_PER_MINUTE).unwrap(),
        ))
    })
}

#[derive(Debug, Deserialize)]
pub struct JoinParams {
    /// Room id to join.
    pub room: String,
    /// Stable client id; generated when absent (fresh identity).
    pub client: Option<String>,
    /// Display name.
    pub name: Option<String>,
}

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<JoinParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, params))
}

async fn handle_connection(socket: WebSocket, state: AppState, params: JoinParams) {
    let (mut sender, mut receiver) = socket.split();

    let Some(handle) = state.room_or_restore(&params.room).await else {
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_UNKNOWN_ROOM,
                reason: "unknown room".into(),
            })))
            .await;
        return;
    };

    let session = GatewaySession {
        room_id: params.room.clone(),
        client_id: params
            .client
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    };
    let name = params.name.as_deref().unwrap_or("guest");

    // Subscribe before the snapshot so nothing between snapshot and
    // first receive is lost.
    let mut bus_rx = handle.bus.subscribe();
    let (member, snapshot) = {
        let mut room = handle.room.lock().await;
        let member = room.add_member(&session.client_id, name, now_ms());
        let snapshot = ServerSignal::RoomSnapshot {
            room_id: room.state.room_id.clone(),
            server_ts: now_ms(),
            state: room.state.clone(),
        };
        (member, snapshot)
    };
    if send_signal(&mut sender, &snapshot).await.is_err() {
        finish_connection(&state, &handle, &session).await;
        return;
    }
    handle
        .bus
        .publish(ServerMessage::Signal(ServerSignal::MemberJoined {
            room_id: session.room_id.clone(),
            member,
        }));
    info!(room_id = %session.room_id, client_id = %session.client_id, "client joined");

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ping.tick().await; // immediate first tick
    let mut ping_sent: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            broadcast = bus_rx.recv() => {
                match broadcast {
                    Ok(message) => {
                        if send_message(&mut sender, &message).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        // A lagging socket has a stale view; make it
                        // reconnect and resnapshot.
                        warn!(client_id = %session.client_id, skipped, "event stream lagged, closing");
                        let _ = sender
                            .send(Message::Close(Some(CloseFrame {
                                code: CLOSE_LAGGED,
                                reason: "event stream lagged".into(),
                            })))
                            .await;
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if flood_limiter().check_key(&session.client_id).is_err() {
                            debug!(client_id = %session.client_id, "socket flood, frame dropped");
                            continue;
                        }
                        if handle_frame(&handle, &session, &mut sender, &text).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        if let Some(sent) = ping_sent.take() {
                            let rtt_ms = sent.elapsed().as_millis().min(u32::MAX as u128) as u32;
                            let mut room = handle.room.lock().await;
                            room.note_latency(&session.client_id, rtt_ms);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(client_id = %session.client_id, error = %e, "socket error");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                ping_sent = Some(tokio::time::Instant::now());
            }
        }
    }

    finish_connection(&state, &handle, &session).await;
}

type WsSender = SplitSink<WebSocket, Message>;

/// Decode and dispatch one inbound frame. `Err` means the socket is
/// dead; protocol violations are swallowed here.
async fn handle_frame(
    handle: &Arc<RoomHandle>,
    session: &GatewaySession,
    sender: &mut WsSender,
    text: &str,
) -> Result<(), ()> {
    let envelope: ClientEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(client_id = %session.client_id, error = %e, "malformed frame dropped");
            return Ok(());
        }
    };
    // An envelope claiming someone else's identity is dropped without
    // an ack, same as an unknown room: no probe feedback.
    if !session.covers(&envelope) {
        debug!(client_id = %session.client_id, "envelope identity mismatch, dropped");
        return Ok(());
    }

    match envelope.event {
        ClientEvent::TimePing { t0 } => {
            // Answered inline; going through the room lock would add
            // queueing jitter to the one message that measures time.
            send_signal(sender, &clock::time_pong(t0, now_ms())).await
        }
        ClientEvent::CursorMove { x, y } => {
            let mut room = handle.room.lock().await;
            if let Some(member) = room.state.member_mut(&session.client_id) {
                member.cursor = Some(CursorPos { x, y });
            }
            let room_id = room.state.room_id.clone();
            drop(room);
            handle
                .bus
                .publish(ServerMessage::Signal(ServerSignal::CursorMove {
                    room_id,
                    client_id: session.client_id.clone(),
                    x,
                    y,
                }));
            Ok(())
        }
        _ => {
            let client_seq = envelope.client_seq;
            let event_id = envelope.event_id.clone();
            let mut room = handle.room.lock().await;
            let outcome = processor::apply(&mut room, &handle.bus, envelope, now_ms());
            drop(room);
            let ack = match outcome {
                Ok(outcome) => {
                    let event_id = match &outcome {
                        ApplyOutcome::Applied { event_id, .. } => Some(event_id.clone()),
                        ApplyOutcome::Duplicate { .. } => event_id,
                    };
                    ServerSignal::EventAck {
                        client_seq,
                        event_id,
                        accepted: true,
                        error: None,
                        retry_after_ms: None,
                        version: Some(outcome.version()),
                    }
                }
                Err(CoreError::Unauthorized) => {
                    debug!(client_id = %session.client_id, "unauthorized event dropped");
                    return Ok(());
                }
                Err(e) => ServerSignal::EventAck {
                    client_seq,
                    event_id,
                    accepted: false,
                    error: Some(e.to_string()),
                    retry_after_ms: e.retry_after_ms(),
                    version: None,
                },
            };
            send_signal(sender, &ack).await
        }
    }
}

async fn send_signal(sender: &mut WsSender, signal: &ServerSignal) -> Result<(), ()> {
    let payload = serde_json::to_string(signal).map_err(|_| ())?;
    sender
        .send(Message::Text(payload.into()))
        .await
        .map_err(|_| ())
}

async fn send_message(sender: &mut WsSender, message: &ServerMessage) -> Result<(), ()> {
    let payload = serde_json::to_string(message).map_err(|_| ())?;
    sender
        .send(Message::Text(payload.into()))
        .await
        .map_err(|_| ())
}

/// Disconnect bookkeeping: free the member's soft locks, announce the
/// departure and any host change, and tear the room down once empty.
async fn finish_connection(state: &AppState, handle: &Arc<RoomHandle>, session: &GatewaySession) {
    let exit = {
        let mut room = handle.room.lock().await;
        room.remove_member(&session.client_id)
    };
    let Some(exit) = exit else {
        return;
    };

    for control_id in exit.released_controls {
        handle
            .bus
            .publish(ServerMessage::Signal(ServerSignal::ControlOwnership {
                room_id: session.room_id.clone(),
                control_id,
                ownership: None,
            }));
    }
    handle
        .bus
        .publish(ServerMessage::Signal(ServerSignal::MemberLeft {
            room_id: session.room_id.clone(),
            client_id: session.client_id.clone(),
            new_host_id: exit.new_host_id,
        }));
    info!(room_id = %session.room_id, client_id = %session.client_id, "client left");

    if exit.room_empty {
        state.teardown_room(&session.room_id).await;
    }
}
