pub mod arbiter;
pub mod beacon;
pub mod clock;
pub mod error;
pub mod events;
pub mod ledger;
pub mod persist;
pub mod processor;
pub mod rate_limit;
pub mod store;

use persist::{PersistenceManager, SnapshotBackend};
use spinroom_util::clock::now_ms;
use std::sync::Arc;
use std::time::Duration;
use store::{RoomHandle, RoomStore};
use tracing::info;

/// Engine-level knobs the embedding server decides.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub worker_id: u16,
    pub snapshot_interval: Duration,
    pub snapshot_ttl: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            worker_id: 0,
            snapshot_interval: persist::SNAPSHOT_INTERVAL,
            snapshot_ttl: persist::SNAPSHOT_TTL,
        }
    }
}

/// Process-wide shared state: every live room plus the snapshot store.
/// Cheap to clone; handed to every connection handler.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomStore>,
    pub persistence: Arc<PersistenceManager>,
    pub config: Arc<CoreConfig>,
}

impl AppState {
    pub fn new(backend: SnapshotBackend, config: CoreConfig) -> Self {
        Self {
            rooms: Arc::new(RoomStore::new()),
            persistence: Arc::new(PersistenceManager::new(backend, config.snapshot_ttl)),
            config: Arc::new(config),
        }
    }

    /// Mint a fresh room with its timers running.
    pub fn create_room(&self) -> Arc<RoomHandle> {
        let handle = self.rooms.create_room(self.config.worker_id, now_ms());
        self.attach_tasks(&handle);
        handle
    }

    /// Find a live room, or revive it from its snapshot if one is
    /// still within the TTL. Joining an expired or unknown room id
    /// fails the same way.
    pub async fn room_or_restore(&self, room_id: &str) -> Option<Arc<RoomHandle>> {
        if let Some(handle) = self.rooms.get(room_id) {
            return Some(handle);
        }
        let snapshot = self.persistence.load(room_id, now_ms()).await?;
        info!(room_id, version = snapshot.state.version, "restoring room from snapshot");
        let (mut state, ledger) = persist::restore(snapshot);
        // Socket registrations did not survive, so neither do members
        // or their soft locks; everyone rejoins.
        state.members.clear();
        state.control_owners.clear();
        state.host_id = String::new();
        let handle = self.rooms.insert_restored(state, ledger);
        self.attach_tasks(&handle);
        Some(handle)
    }

    /// Persist a final snapshot and drop the room. Called when the
    /// last member leaves; the snapshot's TTL gives the room an hour
    /// to be revived.
    pub async fn teardown_room(&self, room_id: &str) {
        if let Some(handle) = self.rooms.get(room_id) {
            let snapshot = persist::capture(&handle, now_ms()).await;
            self.persistence.save(snapshot).await;
        }
        if self.rooms.remove(room_id).is_some() {
            info!(room_id, "room torn down");
        }
    }

    fn attach_tasks(&self, handle: &Arc<RoomHandle>) {
        beacon::spawn_room_tasks(handle);
        handle.own_task(persist::spawn_snapshot_task(
            Arc::downgrade(handle),
            self.persistence.clone(),
            self.config.snapshot_interval,
        ));
    }
}
