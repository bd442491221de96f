use crate::arbiter;
use crate::store::RoomHandle;
use spinroom_models::deck::PlayState;
use spinroom_models::protocol::{ServerMessage, ServerSignal};
use spinroom_util::clock::now_ms;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Playback beacon cadence. Every 8th beacon also emits the legacy
/// SYNC_TICK, keeping the old 2 s cadence for display-only consumers.
pub const BEACON_INTERVAL: Duration = Duration::from_millis(250);
pub const SYNC_TICK_EVERY: u64 = 8;

/// Cadence of the housekeeping sweep: stale ownership expiry and rate
/// window pruning.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Attach the periodic tasks a live room needs. Each task holds only a
/// `Weak` on the handle and stops when the room is gone; the handles
/// are additionally owned by the room so teardown can abort them.
pub fn spawn_room_tasks(handle: &std::sync::Arc<RoomHandle>) {
    handle.own_task(spawn_beacon_task(std::sync::Arc::downgrade(handle)));
    handle.own_task(spawn_sweep_task(std::sync::Arc::downgrade(handle)));
}

/// Emit BEACON_TICK every 250 ms with the authoritative playhead of
/// both decks. `epoch_seq` advances on a playing deck's every beacon,
/// so a client can detect both missed beacons and epoch changes.
fn spawn_beacon_task(handle: Weak<RoomHandle>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(BEACON_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut tick: u64 = 0;
        loop {
            ticker.tick().await;
            let Some(handle) = handle.upgrade() else {
                break;
            };
            tick = tick.wrapping_add(1);
            let now = now_ms();

            let mut room = handle.room.lock().await;
            let state = &mut room.state;
            for deck in [&mut state.deck_a, &mut state.deck_b] {
                if deck.play_state == PlayState::Playing {
                    deck.epoch_seq += 1;
                }
            }
            let beacon = ServerSignal::BeaconTick {
                room_id: room.state.room_id.clone(),
                server_ts: now,
                version: room.state.version,
                deck_a: room.state.deck_a.beacon(now),
                deck_b: room.state.deck_b.beacon(now),
            };
            let sync = (tick % SYNC_TICK_EVERY == 0).then(|| ServerSignal::SyncTick {
                room_id: room.state.room_id.clone(),
                server_ts: now,
                version: room.state.version,
                deck_a: room.state.deck_a.beacon(now),
                deck_b: room.state.deck_b.beacon(now),
            });
            drop(room);

            handle.bus.publish(ServerMessage::Signal(beacon));
            if let Some(sync) = sync {
                handle.bus.publish(ServerMessage::Signal(sync));
            }
        }
    })
}

/// Expire idle soft locks and prune rate-limit windows once a second.
fn spawn_sweep_task(handle: Weak<RoomHandle>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(handle) = handle.upgrade() else {
                break;
            };
            let now = now_ms();

            let mut room = handle.room.lock().await;
            let expired = arbiter::sweep_expired(&mut room.state.control_owners, now);
            room.limiter.prune(now);
            let room_id = room.state.room_id.clone();
            drop(room);

            for control_id in expired {
                debug!(%room_id, control = %control_id, "soft lock expired");
                handle
                    .bus
                    .publish(ServerMessage::Signal(ServerSignal::ControlOwnership {
                        room_id: room_id.clone(),
                        control_id,
                        ownership: None,
                    }));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RoomStore;

    /// Step the paused clock one interval at a time, yielding so the
    /// timer tasks get polled between steps. A single large advance
    /// would coalesce the missed ticks under `MissedTickBehavior::Skip`.
    async fn run_ticks(interval: Duration, n: u32) {
        tokio::task::yield_now().await;
        for _ in 0..n {
            tokio::time::advance(interval).await;
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn beacons_advance_epoch_seq_on_playing_decks() {
        let store = RoomStore::new();
        let handle = store.create_room(0, 0);
        {
            let mut room = handle.room.lock().await;
            room.state.deck_a.loaded_track_id = Some("trk".into());
            room.state.deck_a.duration_sec = 300.0;
            room.state.deck_a.play_state = PlayState::Playing;
        }
        let mut rx = handle.bus.subscribe();
        spawn_room_tasks(&handle);

        run_ticks(BEACON_INTERVAL, 3).await;
        let mut last_seq_a = 0;
        let mut last_seq_b = 0;
        while let Ok(msg) = rx.try_recv() {
            if let ServerMessage::Signal(ServerSignal::BeaconTick { deck_a, deck_b, .. }) = msg {
                last_seq_a = deck_a.epoch_seq;
                last_seq_b = deck_b.epoch_seq;
            }
        }
        assert!(last_seq_a >= 2);
        // Deck B is stopped, so its epoch never advances.
        assert_eq!(last_seq_b, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_broadcasts_cleared_ownerships() {
        use spinroom_models::control::ControlId;
        let store = RoomStore::new();
        let handle = store.create_room(0, 0);
        {
            let mut room = handle.room.lock().await;
            room.add_member("alice", "Alice", 0);
            arbiter::grab(
                &mut room.state.control_owners,
                ControlId::Crossfader,
                "alice",
                now_ms() - arbiter::OWNERSHIP_TTL_MS - 10,
            );
        }
        let mut rx = handle.bus.subscribe();
        spawn_room_tasks(&handle);

        run_ticks(SWEEP_INTERVAL, 2).await;
        let mut cleared = false;
        while let Ok(msg) = rx.try_recv() {
            if let ServerMessage::Signal(ServerSignal::ControlOwnership {
                control_id,
                ownership: None,
                ..
            }) = msg
            {
                assert_eq!(control_id, ControlId::Crossfader);
                cleared = true;
            }
        }
        assert!(cleared);
        assert!(handle.room.lock().await.state.control_owners.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_stop_once_the_room_is_dropped() {
        let store = RoomStore::new();
        let handle = store.create_room(0, 0);
        spawn_room_tasks(&handle);
        let room_id = handle.room.lock().await.state.room_id.clone();
        let weak = std::sync::Arc::downgrade(&handle);
        drop(handle);
        store.remove(&room_id);

        run_ticks(BEACON_INTERVAL, 4).await;
        assert!(weak.upgrade().is_none());
    }
}
