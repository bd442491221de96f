//! End-to-end engine flow without sockets: two members share a room,
//! mutate it concurrently-ish, and the state converges the way a
//! client would observe it.

use spinroom_core::persist::{self, SnapshotBackend};
use spinroom_core::processor::{self, ApplyOutcome};
use spinroom_core::{AppState, CoreConfig};
use spinroom_models::control::ControlId;
use spinroom_models::deck::{DeckId, PlayState};
use spinroom_models::protocol::{ClientEnvelope, ClientEvent, ServerMessage};
use spinroom_util::clock::now_ms;

fn envelope(room_id: &str, client: &str, seq: u64, event: ClientEvent) -> ClientEnvelope {
    ClientEnvelope {
        room_id: room_id.into(),
        client_id: client.into(),
        client_seq: seq,
        event_id: Some(format!("{client}-{seq}")),
        event,
    }
}

#[tokio::test]
async fn a_session_converges_for_both_members() {
    let app = AppState::new(
        SnapshotBackend::memory(persist::SNAPSHOT_TTL),
        CoreConfig::default(),
    );
    let handle = app.create_room();
    let room_id = handle.room.lock().await.state.room_id.clone();
    let mut rx = handle.bus.subscribe();

    {
        let mut room = handle.room.lock().await;
        room.add_member("alice", "Alice", now_ms());
        room.add_member("bob", "Bob", now_ms());
    }

    // Alice queues a track; her retry of the same envelope is absorbed.
    let add = ClientEvent::QueueAdd {
        track_id: "trk-1".into(),
        title: "First".into(),
        duration_sec: 200.0,
    };
    {
        let mut room = handle.room.lock().await;
        let first = processor::apply(
            &mut room,
            &handle.bus,
            envelope(&room_id, "alice", 1, add.clone()),
            now_ms(),
        )
        .unwrap();
        assert!(matches!(first, ApplyOutcome::Applied { version: 1, .. }));
        let retry = processor::apply(
            &mut room,
            &handle.bus,
            envelope(&room_id, "alice", 1, add),
            now_ms(),
        )
        .unwrap();
        assert_eq!(retry, ApplyOutcome::Duplicate { version: 1 });
        assert_eq!(room.state.queue.len(), 1);
    }

    // Bob loads and plays it; Alice takes the crossfader Bob grabbed.
    let item = handle.room.lock().await.state.queue[0].clone();
    let events = [
        (
            "bob",
            1,
            ClientEvent::DeckLoad {
                deck_id: DeckId::A,
                track_id: item.track_id.clone(),
                queue_item_id: item.queue_item_id.clone(),
            },
        ),
        ("bob", 2, ClientEvent::DeckPlay { deck_id: DeckId::A }),
        (
            "bob",
            3,
            ClientEvent::ControlGrab {
                control_id: ControlId::Crossfader,
            },
        ),
        (
            "alice",
            2,
            ClientEvent::MixerSet {
                control_id: ControlId::Crossfader,
                value: 0.25,
            },
        ),
    ];
    for (client, seq, event) in events {
        let mut room = handle.room.lock().await;
        processor::apply(
            &mut room,
            &handle.bus,
            envelope(&room_id, client, seq, event),
            now_ms(),
        )
        .unwrap();
    }

    let room = handle.room.lock().await;
    assert_eq!(room.state.version, 5);
    assert_eq!(room.state.deck_a.play_state, PlayState::Playing);
    assert_eq!(room.state.mixer.crossfader, 0.25);
    // Last grabber wins the soft lock.
    assert_eq!(
        room.state.control_owners[&ControlId::Crossfader].client_id,
        "alice"
    );
    drop(room);

    // Every accepted mutation reached the bus with a strictly
    // increasing version.
    let mut versions = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let ServerMessage::Mutation(m) = msg {
            versions.push(m.version);
        }
    }
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn leaving_hands_off_the_host_and_frees_controls() {
    let app = AppState::new(
        SnapshotBackend::memory(persist::SNAPSHOT_TTL),
        CoreConfig::default(),
    );
    let handle = app.create_room();
    let room_id = handle.room.lock().await.state.room_id.clone();

    {
        let mut room = handle.room.lock().await;
        room.add_member("alice", "Alice", 100);
        room.add_member("bob", "Bob", 200);
        processor::apply(
            &mut room,
            &handle.bus,
            envelope(
                &room_id,
                "alice",
                1,
                ClientEvent::ControlGrab {
                    control_id: ControlId::MasterVolume,
                },
            ),
            now_ms(),
        )
        .unwrap();
    }

    let mut room = handle.room.lock().await;
    let exit = room.remove_member("alice").unwrap();
    assert_eq!(exit.new_host_id.as_deref(), Some("bob"));
    assert_eq!(exit.released_controls, vec![ControlId::MasterVolume]);
    assert!(!exit.room_empty);
    // Her sequence entry survives so a late retry is still a duplicate.
    assert!(room.ledger.is_duplicate("alice", 1, None));
}
