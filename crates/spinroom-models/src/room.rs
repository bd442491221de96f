use crate::control::ControlId;
use crate::deck::{DeckId, DeckState};
use crate::member::Member;
use crate::mixer::MixerState;
use crate::queue::QueueItem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Soft-lock record for one control. Exists only while the owner keeps
/// moving the control; any other client may overwrite it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlOwnership {
    pub client_id: String,
    pub acquired_at: i64,
    pub last_moved_at: i64,
}

/// Canonical state of one room. Mutated only inside the per-room
/// serialized path; `version` increments exactly once per accepted
/// mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub room_id: String,
    pub room_code: String,
    pub version: u64,
    pub host_id: String,
    pub members: Vec<Member>,
    pub queue: Vec<QueueItem>,
    pub deck_a: DeckState,
    pub deck_b: DeckState,
    pub mixer: MixerState,
    pub control_owners: HashMap<ControlId, ControlOwnership>,
}

impl RoomState {
    pub fn new(room_id: String, room_code: String, host_id: String, now_ms: i64) -> Self {
        Self {
            room_id,
            room_code,
            version: 0,
            host_id,
            members: Vec::new(),
            queue: Vec::new(),
            deck_a: DeckState::new(DeckId::A, now_ms),
            deck_b: DeckState::new(DeckId::B, now_ms),
            mixer: MixerState::default(),
            control_owners: HashMap::new(),
        }
    }

    pub fn deck(&self, id: DeckId) -> &DeckState {
        match id {
            DeckId::A => &self.deck_a,
            DeckId::B => &self.deck_b,
        }
    }

    pub fn deck_mut(&mut self, id: DeckId) -> &mut DeckState {
        match id {
            DeckId::A => &mut self.deck_a,
            DeckId::B => &mut self.deck_b,
        }
    }

    pub fn member(&self, client_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.client_id == client_id)
    }

    pub fn member_mut(&mut self, client_id: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.client_id == client_id)
    }

    pub fn queue_index(&self, queue_item_id: &str) -> Option<usize> {
        self.queue
            .iter()
            .position(|item| item.queue_item_id == queue_item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_with_string_control_keys() {
        let mut state = RoomState::new("1".into(), "ABC234".into(), "host".into(), 0);
        state.control_owners.insert(
            ControlId::Crossfader,
            ControlOwnership {
                client_id: "host".into(),
                acquired_at: 1,
                last_moved_at: 1,
            },
        );
        let json = serde_json::to_value(&state).unwrap();
        assert!(json["controlOwners"]["crossfader"].is_object());
        let back: RoomState = serde_json::from_value(json).unwrap();
        assert_eq!(back.control_owners.len(), 1);
    }
}
