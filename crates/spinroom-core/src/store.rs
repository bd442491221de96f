use crate::arbiter;
use crate::events::RoomBus;
use crate::ledger::IdempotencyLedger;
use crate::rate_limit::RateLimiter;
use dashmap::DashMap;
use spinroom_models::control::ControlId;
use spinroom_models::member::{Member, MEMBER_PALETTE};
use spinroom_models::room::RoomState;
use spinroom_util::{id, room_code};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Everything guarded by the per-room lock: the canonical state plus
/// the bookkeeping that must mutate atomically with it.
#[derive(Debug)]
pub struct Room {
    pub state: RoomState,
    pub ledger: IdempotencyLedger,
    pub limiter: RateLimiter,
}

impl Room {
    pub fn new(state: RoomState) -> Self {
        Self {
            state,
            ledger: IdempotencyLedger::new(),
            limiter: RateLimiter::new(),
        }
    }

    /// Register a member, assigning the first palette color no one in
    /// the room currently holds (round-robin only once the palette is
    /// exhausted). The first member of a fresh room becomes host.
    /// Rejoining under an existing client id just refreshes the
    /// member record.
    pub fn add_member(&mut self, client_id: &str, name: &str, now_ms: i64) -> Member {
        if let Some(existing) = self.state.member_mut(client_id) {
            existing.name = name.to_string();
            return existing.clone();
        }
        let color = MEMBER_PALETTE
            .iter()
            .find(|c| !self.state.members.iter().any(|m| m.color == **c))
            .copied()
            .unwrap_or(MEMBER_PALETTE[self.state.members.len() % MEMBER_PALETTE.len()]);
        let is_host = self.state.host_id.is_empty() || self.state.host_id == client_id;
        if is_host {
            self.state.host_id = client_id.to_string();
        }
        let member = Member {
            client_id: client_id.to_string(),
            name: name.to_string(),
            color: color.to_string(),
            joined_at: now_ms,
            is_host,
            cursor: None,
            latency_ms: None,
        };
        self.state.members.push(member.clone());
        member
    }

    /// Record a measured socket round trip against the member, for
    /// display next to their name.
    pub fn note_latency(&mut self, client_id: &str, rtt_ms: u32) {
        if let Some(member) = self.state.member_mut(client_id) {
            member.latency_ms = Some(rtt_ms);
        }
    }

    /// Remove a member, freeing their soft locks and transferring host
    /// to the longest-present remaining member when needed. The
    /// idempotency ledger deliberately keeps the client's sequence
    /// entry so a reconnect cannot replay its last event.
    pub fn remove_member(&mut self, client_id: &str) -> Option<MemberExit> {
        let idx = self
            .state
            .members
            .iter()
            .position(|m| m.client_id == client_id)?;
        let member = self.state.members.remove(idx);
        let released_controls = arbiter::release_all(&mut self.state.control_owners, client_id);
        self.limiter.forget_client(client_id);

        let mut new_host_id = None;
        if member.is_host {
            if let Some(next) = self
                .state
                .members
                .iter_mut()
                .min_by_key(|m| (m.joined_at, m.client_id.clone()))
            {
                next.is_host = true;
                self.state.host_id = next.client_id.clone();
                new_host_id = Some(next.client_id.clone());
            } else {
                self.state.host_id = String::new();
            }
        }
        Some(MemberExit {
            member,
            released_controls,
            new_host_id,
            room_empty: self.state.members.is_empty(),
        })
    }
}

/// Result of a member leaving, carrying everything the caller must
/// broadcast or act on.
#[derive(Debug)]
pub struct MemberExit {
    pub member: Member,
    pub released_controls: Vec<ControlId>,
    pub new_host_id: Option<String>,
    pub room_empty: bool,
}

/// One live room: the serialized state behind its lock, the broadcast
/// bus, and the background timers owned by the room.
pub struct RoomHandle {
    pub room: tokio::sync::Mutex<Room>,
    pub bus: RoomBus,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RoomHandle {
    pub fn new(state: RoomState) -> Self {
        Self::from_room(Room::new(state))
    }

    pub fn from_room(room: Room) -> Self {
        Self {
            room: tokio::sync::Mutex::new(room),
            bus: RoomBus::default(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn own_task(&self, task: JoinHandle<()>) {
        self.tasks.lock().unwrap().push(task);
    }

    /// Abort every timer the room owns. Called on teardown; the tasks
    /// also stop on their own once their `Weak` fails to upgrade.
    pub fn abort_tasks(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

impl Drop for RoomHandle {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// All live rooms, addressable by id and by join code.
#[derive(Default)]
pub struct RoomStore {
    rooms: DashMap<String, Arc<RoomHandle>>,
    codes: DashMap<String, String>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new empty room. The creator becomes host when their
    /// socket joins, not here; creation is a plain HTTP call.
    pub fn create_room(&self, worker_id: u16, now_ms: i64) -> Arc<RoomHandle> {
        let room_id = id::generate(worker_id).to_string();
        let code = loop {
            let candidate = room_code::generate();
            if !self.codes.contains_key(&candidate) {
                break candidate;
            }
        };
        let state = RoomState::new(room_id.clone(), code.clone(), String::new(), now_ms);
        let handle = Arc::new(RoomHandle::new(state));
        self.codes.insert(code, room_id.clone());
        self.rooms.insert(room_id, handle.clone());
        handle
    }

    /// Re-register a room restored from a snapshot.
    pub fn insert_restored(&self, state: RoomState, ledger: IdempotencyLedger) -> Arc<RoomHandle> {
        let room_id = state.room_id.clone();
        let code = state.room_code.clone();
        let mut room = Room::new(state);
        room.ledger = ledger;
        let handle = Arc::new(RoomHandle::from_room(room));
        self.codes.insert(code, room_id.clone());
        self.rooms.insert(room_id, handle.clone());
        handle
    }

    pub fn get(&self, room_id: &str) -> Option<Arc<RoomHandle>> {
        self.rooms.get(room_id).map(|entry| entry.clone())
    }

    pub fn resolve_code(&self, code: &str) -> Option<String> {
        self.codes
            .get(&room_code::normalize(code))
            .map(|entry| entry.clone())
    }

    /// Drop a room and its code mapping, aborting its timers.
    pub fn remove(&self, room_id: &str) -> Option<Arc<RoomHandle>> {
        let (_, handle) = self.rooms.remove(room_id)?;
        self.codes.retain(|_, id| id.as_str() != room_id);
        handle.abort_tasks();
        Some(handle)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn iter_handles(&self) -> Vec<Arc<RoomHandle>> {
        self.rooms.iter().map(|entry| entry.clone()).collect()
    }
}
