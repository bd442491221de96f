use spinroom_models::deck::{DeckBeacon, PlayState};
use std::collections::VecDeque;
use tracing::debug;

/// Drift below this is inaudible; leave playback alone.
const DEAD_ZONE_SEC: f64 = 0.010;
/// Drift above this cannot be trimmed away gracefully; jump instead.
const SNAP_THRESHOLD_SEC: f64 = 0.500;
/// Rate trim applied per second of measured drift.
const RATE_TRIM_PER_DRIFT_SEC: f64 = 0.005;
/// Hard cap on the trim so correction stays inaudible.
const MAX_RATE_TRIM: f64 = 0.02;
/// Beacons medianed before acting, so one late beacon cannot trigger
/// a correction.
const MEDIAN_WINDOW: usize = 5;
const MIN_OBSERVATIONS: usize = 3;

/// What the local player should do after a beacon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// In tolerance; keep playing at the nominal rate.
    None,
    /// Multiply the playback rate by this factor until the next
    /// correction.
    Rate(f64),
    /// Jump the local playhead to this position.
    Seek(f64),
}

/// Phase-locked loop nudging a local playhead onto the server's
/// timeline. Feed every BEACON_TICK for one deck; drive the audio
/// element with the returned correction. SYNC_TICK must not be fed
/// here.
#[derive(Debug, Default)]
pub struct DriftCorrector {
    epoch_id: Option<String>,
    drifts: VecDeque<f64>,
}

impl DriftCorrector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one beacon. `local_server_now_ms` is the local clock
    /// mapped through the clock estimator; `local_playhead_sec` is
    /// where the local player actually is.
    pub fn observe(
        &mut self,
        beacon: &DeckBeacon,
        beacon_server_ts: i64,
        local_server_now_ms: i64,
        local_playhead_sec: f64,
    ) -> Correction {
        let expected = Self::expected_playhead(beacon, beacon_server_ts, local_server_now_ms);

        if self.epoch_id.as_deref() != Some(&beacon.epoch_id) {
            // Timeline discontinuity: old drift measurements describe
            // a dead epoch.
            self.epoch_id = Some(beacon.epoch_id.clone());
            self.drifts.clear();
            return Correction::Seek(expected);
        }

        if beacon.play_state != PlayState::Playing {
            // Nothing moves, so rate trimming is meaningless; only a
            // gross mismatch warrants a jump.
            return if (local_playhead_sec - expected).abs() > SNAP_THRESHOLD_SEC {
                Correction::Seek(expected)
            } else {
                Correction::None
            };
        }

        self.drifts.push_back(local_playhead_sec - expected);
        if self.drifts.len() > MEDIAN_WINDOW {
            self.drifts.pop_front();
        }
        if self.drifts.len() < MIN_OBSERVATIONS {
            return Correction::None;
        }

        let drift = self.median_drift();
        if drift.abs() < DEAD_ZONE_SEC {
            Correction::None
        } else if drift.abs() > SNAP_THRESHOLD_SEC {
            debug!(drift_sec = drift, "drift beyond snap threshold");
            self.drifts.clear();
            Correction::Seek(expected)
        } else {
            // Positive drift means we are ahead; slow down slightly.
            let trim = (drift * RATE_TRIM_PER_DRIFT_SEC).clamp(-MAX_RATE_TRIM, MAX_RATE_TRIM);
            Correction::Rate(1.0 - trim)
        }
    }

    fn median_drift(&self) -> f64 {
        let mut sorted: Vec<f64> = self.drifts.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted[sorted.len() / 2]
    }

    /// Authoritative playhead extrapolated from the beacon to local
    /// now. The beacon ages in transit; this removes that age.
    fn expected_playhead(beacon: &DeckBeacon, beacon_server_ts: i64, now_server_ms: i64) -> f64 {
        if beacon.play_state == PlayState::Playing {
            let age_sec = (now_server_ms - beacon_server_ts) as f64 / 1000.0;
            (beacon.playhead_sec + age_sec * beacon.playback_rate).max(0.0)
        } else {
            beacon.playhead_sec
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beacon(epoch: &str, playhead: f64, state: PlayState) -> DeckBeacon {
        DeckBeacon {
            epoch_id: epoch.into(),
            epoch_seq: 0,
            playhead_sec: playhead,
            playback_rate: 1.0,
            play_state: state,
        }
    }

    /// Feed `n` beacons 250ms apart with the local player a constant
    /// `drift` seconds ahead of the timeline, return the last
    /// correction.
    fn settle(corrector: &mut DriftCorrector, drift: f64, n: usize) -> Correction {
        let mut last = Correction::None;
        for i in 0..n {
            let ts = i as i64 * 250;
            let playhead = 10.0 + i as f64 * 0.25;
            last = corrector.observe(
                &beacon("ep-1", playhead, PlayState::Playing),
                ts,
                ts,
                playhead + drift,
            );
        }
        last
    }

    #[test]
    fn first_beacon_of_an_epoch_snaps() {
        let mut corrector = DriftCorrector::new();
        let correction = corrector.observe(
            &beacon("ep-1", 10.0, PlayState::Playing),
            1_000,
            1_000,
            0.0,
        );
        assert_eq!(correction, Correction::Seek(10.0));
    }

    #[test]
    fn beacon_age_is_removed_from_the_expectation() {
        let mut corrector = DriftCorrector::new();
        // Beacon stamped 100ms ago reads 10.0; the timeline is at 10.1
        // by the time it is observed.
        let correction = corrector.observe(
            &beacon("ep-1", 10.0, PlayState::Playing),
            1_000,
            1_100,
            0.0,
        );
        match correction {
            Correction::Seek(target) => assert!((target - 10.1).abs() < 1e-9),
            other => panic!("expected snap, got {other:?}"),
        }
    }

    #[test]
    fn small_drift_sits_in_the_dead_zone() {
        let mut corrector = DriftCorrector::new();
        assert_eq!(settle(&mut corrector, 0.005, 6), Correction::None);
    }

    #[test]
    fn moderate_drift_trims_the_rate_gently() {
        let mut corrector = DriftCorrector::new();
        match settle(&mut corrector, 0.200, 6) {
            Correction::Rate(factor) => {
                // Ahead of the timeline, so we slow down, and only
                // inaudibly.
                assert!(factor < 1.0);
                assert!((0.998..=1.002).contains(&factor), "factor was {factor}");
            }
            other => panic!("expected rate trim, got {other:?}"),
        }
    }

    #[test]
    fn lagging_drift_speeds_up() {
        let mut corrector = DriftCorrector::new();
        match settle(&mut corrector, -0.200, 6) {
            Correction::Rate(factor) => assert!(factor > 1.0),
            other => panic!("expected rate trim, got {other:?}"),
        }
    }

    #[test]
    fn gross_drift_snaps_and_resets_the_window() {
        let mut corrector = DriftCorrector::new();
        match settle(&mut corrector, 0.600, 4) {
            Correction::Seek(_) => {}
            other => panic!("expected snap, got {other:?}"),
        }
        // The window was cleared, so the next beacons start measuring
        // afresh.
        assert_eq!(settle(&mut corrector, 0.0, 2), Correction::None);
    }

    #[test]
    fn one_outlier_beacon_does_not_trigger_a_correction() {
        let mut corrector = DriftCorrector::new();
        settle(&mut corrector, 0.0, 4);
        // A single late beacon shows 300ms of apparent drift.
        let correction = corrector.observe(
            &beacon("ep-1", 11.0, PlayState::Playing),
            1_000,
            1_000,
            11.3,
        );
        assert_eq!(correction, Correction::None);
    }

    #[test]
    fn epoch_change_snaps_to_the_new_timeline() {
        let mut corrector = DriftCorrector::new();
        settle(&mut corrector, 0.0, 5);
        let correction = corrector.observe(
            &beacon("ep-2", 42.0, PlayState::Playing),
            2_000,
            2_000,
            11.0,
        );
        assert_eq!(correction, Correction::Seek(42.0));
    }

    #[test]
    fn paused_decks_only_snap_on_gross_mismatch() {
        let mut corrector = DriftCorrector::new();
        corrector.observe(&beacon("ep-1", 30.0, PlayState::Paused), 0, 0, 30.0);
        let near = corrector.observe(&beacon("ep-1", 30.0, PlayState::Paused), 250, 250, 30.1);
        assert_eq!(near, Correction::None);
        let far = corrector.observe(&beacon("ep-1", 30.0, PlayState::Paused), 500, 500, 35.0);
        assert_eq!(far, Correction::Seek(30.0));
    }
}
