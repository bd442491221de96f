use crate::control::ControlId;
use crate::deck::{DeckBeacon, DeckId};
use crate::member::Member;
use crate::room::{ControlOwnership, RoomState};
use serde::{Deserialize, Serialize};

/// Everything a client can send. Decoded as a tagged union at the
/// protocol boundary so a malformed or unknown message is a parse
/// failure, not a half-validated payload reaching the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    TimePing {
        t0: i64,
    },
    CursorMove {
        x: f32,
        y: f32,
    },
    ControlGrab {
        control_id: ControlId,
    },
    ControlRelease {
        control_id: ControlId,
    },
    MixerSet {
        control_id: ControlId,
        value: f64,
    },
    DeckLoad {
        deck_id: DeckId,
        track_id: String,
        queue_item_id: String,
    },
    DeckPlay {
        deck_id: DeckId,
    },
    DeckPause {
        deck_id: DeckId,
    },
    DeckCue {
        deck_id: DeckId,
        cue_point_sec: Option<f64>,
    },
    DeckSeek {
        deck_id: DeckId,
        position_sec: f64,
    },
    DeckTempoSet {
        deck_id: DeckId,
        playback_rate: f64,
    },
    QueueAdd {
        track_id: String,
        title: String,
        duration_sec: f64,
    },
    QueueRemove {
        queue_item_id: String,
    },
    QueueReorder {
        queue_item_id: String,
        to_index: usize,
    },
    QueueEdit {
        queue_item_id: String,
        title: String,
    },
    FxSet {
        param: String,
        value: f64,
    },
    FxToggle {
        enabled: bool,
    },
}

/// Client-to-server envelope: event plus addressing and the per-client
/// sequence number used for exactly-once application. `event_id` is an
/// optional client retry token; the server assigns one when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEnvelope {
    pub room_id: String,
    pub client_id: String,
    #[serde(default)]
    pub client_seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(flatten)]
    pub event: ClientEvent,
}

/// An accepted mutation as rebroadcast to every member of the room:
/// the original envelope plus the server-assigned metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMutationEvent {
    pub room_id: String,
    pub client_id: String,
    pub client_seq: u64,
    #[serde(flatten)]
    pub event: ClientEvent,
    pub event_id: String,
    pub server_ts: i64,
    pub version: u64,
}

/// Server-originated messages (everything that is not a rebroadcast
/// mutation envelope).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerSignal {
    /// Per-sender acknowledgment; never broadcast.
    EventAck {
        client_seq: u64,
        event_id: Option<String>,
        accepted: bool,
        error: Option<String>,
        retry_after_ms: Option<u64>,
        version: Option<u64>,
    },
    /// Full state, sent once to a joining socket.
    RoomSnapshot {
        room_id: String,
        server_ts: i64,
        state: RoomState,
    },
    /// 250 ms playback beacon driving client drift correction.
    BeaconTick {
        room_id: String,
        server_ts: i64,
        version: u64,
        deck_a: DeckBeacon,
        deck_b: DeckBeacon,
    },
    /// Legacy 2 s tick, display-only; clients must not correct on it.
    SyncTick {
        room_id: String,
        server_ts: i64,
        version: u64,
        deck_a: DeckBeacon,
        deck_b: DeckBeacon,
    },
    TimePong {
        t0: i64,
        server_ts: i64,
    },
    /// Ownership granted (`Some`) or cleared (`None`) for one control.
    ControlOwnership {
        room_id: String,
        control_id: ControlId,
        ownership: Option<ControlOwnership>,
    },
    MemberJoined {
        room_id: String,
        member: Member,
    },
    MemberLeft {
        room_id: String,
        client_id: String,
        new_host_id: Option<String>,
    },
    /// Fire-and-forget cursor fan-out; untracked and unversioned.
    CursorMove {
        room_id: String,
        client_id: String,
        x: f32,
        y: f32,
    },
}

/// Any frame the server writes to a socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Mutation(ServerMutationEvent),
    Signal(ServerSignal),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_envelope_decodes_the_tagged_union() {
        let raw = r#"{
            "type": "MIXER_SET",
            "roomId": "42",
            "clientId": "alice",
            "clientSeq": 7,
            "payload": { "controlId": "channelA.gain", "value": -0.25 }
        }"#;
        let env: ClientEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.client_seq, 7);
        match env.event {
            ClientEvent::MixerSet { value, .. } => assert_eq!(value, -0.25),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_types_fail_to_decode() {
        let raw = r#"{"type":"DECK_EXPLODE","roomId":"42","clientId":"a","payload":{}}"#;
        assert!(serde_json::from_str::<ClientEnvelope>(raw).is_err());
    }

    #[test]
    fn mutation_broadcast_keeps_the_original_type_tag() {
        let event = ServerMutationEvent {
            room_id: "42".into(),
            client_id: "alice".into(),
            client_seq: 3,
            event: ClientEvent::DeckPlay {
                deck_id: DeckId::A,
            },
            event_id: "e-1".into(),
            server_ts: 1000,
            version: 9,
        };
        let json = serde_json::to_value(ServerMessage::Mutation(event)).unwrap();
        assert_eq!(json["type"], "DECK_PLAY");
        assert_eq!(json["version"], 9);
        assert_eq!(json["payload"]["deckId"], "a");
    }

    #[test]
    fn server_message_round_trips_both_shapes() {
        let signal = ServerMessage::Signal(ServerSignal::TimePong {
            t0: 5,
            server_ts: 11,
        });
        let json = serde_json::to_string(&signal).unwrap();
        match serde_json::from_str::<ServerMessage>(&json).unwrap() {
            ServerMessage::Signal(ServerSignal::TimePong { t0, server_ts }) => {
                assert_eq!((t0, server_ts), (5, 11));
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }
}
