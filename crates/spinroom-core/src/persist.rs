use crate::ledger::{IdempotencyLedger, LedgerExport};
use crate::store::RoomHandle;
use serde::{Deserialize, Serialize};
use spinroom_models::room::RoomState;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(10);
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(3600);

/// Point-in-time copy of a room, enough to restore both state and the
/// duplicate-detection window after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub state: RoomState,
    pub ledger: LedgerExport,
    pub saved_at: i64,
}

pub fn snapshot_key(room_id: &str) -> String {
    format!("room:{room_id}:snapshot")
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where snapshots live. In-process memory is the default; the file
/// backend writes one JSON document per room under a directory.
#[derive(Clone)]
pub enum SnapshotBackend {
    Memory(moka::future::Cache<String, Arc<RoomSnapshot>>),
    File { dir: PathBuf },
}

impl SnapshotBackend {
    pub fn memory(ttl: Duration) -> Self {
        SnapshotBackend::Memory(
            moka::future::Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        )
    }

    pub fn file(dir: PathBuf) -> Self {
        SnapshotBackend::File { dir }
    }

    fn file_path(dir: &std::path::Path, key: &str) -> PathBuf {
        dir.join(format!("{}.json", key.replace(':', "_")))
    }

    pub async fn save(&self, key: &str, snapshot: &RoomSnapshot) -> Result<(), SnapshotError> {
        match self {
            SnapshotBackend::Memory(cache) => {
                cache
                    .insert(key.to_string(), Arc::new(snapshot.clone()))
                    .await;
                Ok(())
            }
            SnapshotBackend::File { dir } => {
                tokio::fs::create_dir_all(dir).await?;
                let bytes = serde_json::to_vec(snapshot)?;
                // Write-then-rename so a crash mid-write never leaves a
                // truncated snapshot behind.
                let path = Self::file_path(dir, key);
                let tmp = path.with_extension("json.tmp");
                tokio::fs::write(&tmp, &bytes).await?;
                tokio::fs::rename(&tmp, &path).await?;
                Ok(())
            }
        }
    }

    pub async fn load(
        &self,
        key: &str,
        now_ms: i64,
        ttl: Duration,
    ) -> Result<Option<RoomSnapshot>, SnapshotError> {
        match self {
            SnapshotBackend::Memory(cache) => {
                Ok(cache.get(key).await.map(|snap| (*snap).clone()))
            }
            SnapshotBackend::File { dir } => {
                let path = Self::file_path(dir, key);
                let bytes = match tokio::fs::read(&path).await {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                let snapshot: RoomSnapshot = serde_json::from_slice(&bytes)?;
                // The file backend has no eviction, so expiry is
                // enforced on read.
                if now_ms - snapshot.saved_at > ttl.as_millis() as i64 {
                    return Ok(None);
                }
                Ok(Some(snapshot))
            }
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), SnapshotError> {
        match self {
            SnapshotBackend::Memory(cache) => {
                cache.invalidate(key).await;
                Ok(())
            }
            SnapshotBackend::File { dir } => {
                match tokio::fs::remove_file(Self::file_path(dir, key)).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}

/// Best-effort snapshot persistence. A failing backend never takes the
/// room down: writes fall back to an in-process cache so a restore is
/// still possible while the process lives.
pub struct PersistenceManager {
    backend: SnapshotBackend,
    fallback: moka::future::Cache<String, Arc<RoomSnapshot>>,
    ttl: Duration,
}

impl PersistenceManager {
    pub fn new(backend: SnapshotBackend, ttl: Duration) -> Self {
        Self {
            backend,
            fallback: moka::future::Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
            ttl,
        }
    }

    pub async fn save(&self, snapshot: RoomSnapshot) {
        let key = snapshot_key(&snapshot.state.room_id);
        if let Err(e) = self.backend.save(&key, &snapshot).await {
            warn!(room_id = %snapshot.state.room_id, error = %e, "snapshot write failed, keeping in memory");
            self.fallback.insert(key, Arc::new(snapshot)).await;
        } else {
            debug!(room_id = %snapshot.state.room_id, "room snapshot saved");
        }
    }

    pub async fn load(&self, room_id: &str, now_ms: i64) -> Option<RoomSnapshot> {
        let key = snapshot_key(room_id);
        match self.backend.load(&key, now_ms, self.ttl).await {
            Ok(Some(snapshot)) => return Some(snapshot),
            Ok(None) => {}
            Err(e) => warn!(room_id, error = %e, "snapshot read failed, trying memory fallback"),
        }
        self.fallback.get(&key).await.map(|snap| (*snap).clone())
    }

    pub async fn delete(&self, room_id: &str) {
        let key = snapshot_key(room_id);
        self.fallback.invalidate(&key).await;
        if let Err(e) = self.backend.delete(&key).await {
            warn!(room_id, error = %e, "snapshot delete failed");
        }
    }
}

/// Capture a snapshot of a live room under its lock.
pub async fn capture(handle: &RoomHandle, now_ms: i64) -> RoomSnapshot {
    let room = handle.room.lock().await;
    RoomSnapshot {
        state: room.state.clone(),
        ledger: room.ledger.export(),
        saved_at: now_ms,
    }
}

/// Rebuild the lock-guarded parts of a room from a snapshot.
pub fn restore(snapshot: RoomSnapshot) -> (RoomState, IdempotencyLedger) {
    let ledger = IdempotencyLedger::import(snapshot.ledger);
    (snapshot.state, ledger)
}

/// Periodic snapshot writer for one room. Holds only a `Weak`, so the
/// task winds down on its own once the room is torn down.
pub fn spawn_snapshot_task(
    handle: Weak<RoomHandle>,
    persistence: Arc<PersistenceManager>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(handle) = handle.upgrade() else {
                break;
            };
            let snapshot = capture(&handle, spinroom_util::clock::now_ms()).await;
            persistence.save(snapshot).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spinroom_models::room::RoomState;

    fn snapshot(room_id: &str, version: u64, saved_at: i64) -> RoomSnapshot {
        let mut state = RoomState::new(room_id.into(), "ABC234".into(), "host".into(), 0);
        state.version = version;
        let mut ledger = IdempotencyLedger::new();
        ledger.record("host", 4, "e-4");
        RoomSnapshot {
            state,
            ledger: ledger.export(),
            saved_at,
        }
    }

    #[tokio::test]
    async fn file_backend_round_trips_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SnapshotBackend::file(dir.path().to_path_buf());
        let key = snapshot_key("42");
        backend.save(&key, &snapshot("42", 7, 1_000)).await.unwrap();

        let loaded = backend
            .load(&key, 2_000, SNAPSHOT_TTL)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.state.version, 7);
        let (state, ledger) = restore(loaded);
        assert_eq!(state.room_id, "42");
        assert!(ledger.is_duplicate("host", 4, None));
    }

    #[tokio::test]
    async fn file_backend_treats_stale_snapshots_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SnapshotBackend::file(dir.path().to_path_buf());
        let key = snapshot_key("42");
        backend.save(&key, &snapshot("42", 1, 0)).await.unwrap();

        let ttl = Duration::from_secs(3600);
        let fresh = backend.load(&key, 1_000, ttl).await.unwrap();
        assert!(fresh.is_some());
        let stale = backend.load(&key, 3_600_001, ttl).await.unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn missing_and_deleted_snapshots_load_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SnapshotBackend::file(dir.path().to_path_buf());
        let key = snapshot_key("42");
        assert!(backend.load(&key, 0, SNAPSHOT_TTL).await.unwrap().is_none());

        backend.save(&key, &snapshot("42", 1, 0)).await.unwrap();
        backend.delete(&key).await.unwrap();
        assert!(backend.load(&key, 0, SNAPSHOT_TTL).await.unwrap().is_none());
        // Deleting twice is fine.
        backend.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn failed_backend_falls_back_to_memory() {
        // A directory path that cannot be created forces the write to
        // fail.
        let file = tempfile::NamedTempFile::new().unwrap();
        let backend = SnapshotBackend::file(file.path().join("sub"));
        let manager = PersistenceManager::new(backend, SNAPSHOT_TTL);

        manager.save(snapshot("42", 3, 500)).await;
        let restored = manager.load("42", 1_000).await.unwrap();
        assert_eq!(restored.state.version, 3);
    }

    #[tokio::test]
    async fn memory_backend_round_trips() {
        let manager =
            PersistenceManager::new(SnapshotBackend::memory(SNAPSHOT_TTL), SNAPSHOT_TTL);
        manager.save(snapshot("9", 2, 100)).await;
        assert_eq!(manager.load("9", 200).await.unwrap().state.version, 2);
        manager.delete("9").await;
        assert!(manager.load("9", 300).await.is_none());
    }
}
