use serde::{Deserialize, Serialize};

pub const PLAYBACK_RATE_MIN: f64 = 0.5;
pub const PLAYBACK_RATE_MAX: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeckId {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
    Cued,
}

/// One playback deck. The epoch triple (`epoch_id`, `epoch_seq`,
/// `epoch_start_*`) describes the current drift-free timeline segment:
/// while playing, the authoritative playhead is a pure linear function
/// of server time since `epoch_start_time_ms`; any discontinuity mints
/// a fresh epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckState {
    pub deck_id: DeckId,
    pub loaded_track_id: Option<String>,
    pub play_state: PlayState,
    pub playhead_sec: f64,
    pub cue_point_sec: f64,
    pub duration_sec: f64,
    pub playback_rate: f64,
    pub detected_bpm: Option<f64>,
    pub epoch_id: String,
    pub epoch_seq: u64,
    pub epoch_start_playhead_sec: f64,
    pub epoch_start_time_ms: i64,
}

impl DeckState {
    pub fn new(deck_id: DeckId, now_ms: i64) -> Self {
        Self {
            deck_id,
            loaded_track_id: None,
            play_state: PlayState::Stopped,
            playhead_sec: 0.0,
            cue_point_sec: 0.0,
            duration_sec: 0.0,
            playback_rate: 1.0,
            detected_bpm: None,
            epoch_id: uuid::Uuid::new_v4().to_string(),
            epoch_seq: 0,
            epoch_start_playhead_sec: 0.0,
            epoch_start_time_ms: now_ms,
        }
    }

    /// Authoritative playhead at `now_ms`: linear within the current
    /// epoch while playing, frozen otherwise, clamped to track length.
    pub fn playhead_at(&self, now_ms: i64) -> f64 {
        let pos = if self.play_state == PlayState::Playing {
            let elapsed_sec = (now_ms - self.epoch_start_time_ms) as f64 / 1000.0;
            self.epoch_start_playhead_sec + elapsed_sec * self.playback_rate
        } else {
            self.playhead_sec
        };
        if self.duration_sec > 0.0 {
            pos.clamp(0.0, self.duration_sec)
        } else {
            pos.max(0.0)
        }
    }

    /// Start a new epoch anchored at `playhead_sec`. Called on every
    /// discontinuity: load, play, pause, seek, cue, tempo change.
    pub fn begin_epoch(&mut self, playhead_sec: f64, now_ms: i64) {
        self.playhead_sec = playhead_sec;
        self.epoch_id = uuid::Uuid::new_v4().to_string();
        self.epoch_seq = 0;
        self.epoch_start_playhead_sec = playhead_sec;
        self.epoch_start_time_ms = now_ms;
    }

    pub fn beacon(&self, now_ms: i64) -> DeckBeacon {
        DeckBeacon {
            epoch_id: self.epoch_id.clone(),
            epoch_seq: self.epoch_seq,
            playhead_sec: self.playhead_at(now_ms),
            playback_rate: self.playback_rate,
            play_state: self.play_state,
        }
    }
}

/// Per-deck payload of BEACON_TICK and the legacy SYNC_TICK.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckBeacon {
    pub epoch_id: String,
    pub epoch_seq: u64,
    pub playhead_sec: f64,
    pub playback_rate: f64,
    pub play_state: PlayState,
}
