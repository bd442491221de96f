use spinroom_models::protocol::ClientEvent;
use std::collections::{HashMap, VecDeque};

const WINDOW_MS: i64 = 60_000;

/// Budget category an event counts against. Queue operations map
/// one-to-one; deck transport commands share a combined budget so a
/// client cannot saturate the decks by alternating verbs. Seeking is
/// broken out with a much larger budget because scrubbing a waveform
/// legitimately emits a burst of seeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateCategory {
    QueueAdd,
    QueueRemove,
    QueueEdit,
    DeckTransport,
    DeckSeek,
}

impl RateCategory {
    /// Maximum events per one-minute sliding window.
    pub fn limit(self) -> usize {
        match self {
            RateCategory::QueueAdd => 20,
            RateCategory::QueueRemove => 30,
            RateCategory::QueueEdit => 60,
            RateCategory::DeckTransport => 100,
            RateCategory::DeckSeek => 600,
        }
    }

    /// Category for an inbound event; `None` means uncounted
    /// (continuous controls, cursor, time sync).
    pub fn for_event(event: &ClientEvent) -> Option<RateCategory> {
        match event {
            ClientEvent::QueueAdd { .. } => Some(RateCategory::QueueAdd),
            ClientEvent::QueueRemove { .. } => Some(RateCategory::QueueRemove),
            ClientEvent::QueueReorder { .. } | ClientEvent::QueueEdit { .. } => {
                Some(RateCategory::QueueEdit)
            }
            ClientEvent::DeckLoad { .. }
            | ClientEvent::DeckPlay { .. }
            | ClientEvent::DeckPause { .. }
            | ClientEvent::DeckCue { .. }
            | ClientEvent::DeckTempoSet { .. } => Some(RateCategory::DeckTransport),
            ClientEvent::DeckSeek { .. } => Some(RateCategory::DeckSeek),
            _ => None,
        }
    }
}

/// Sliding-window counters keyed by (client, category). Purely a
/// resource-protection policy: consulted before costly discrete
/// mutations, never for continuous control movement.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: HashMap<(String, RateCategory), VecDeque<i64>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow and record, or deny with how long until the oldest stamp
    /// ages out of the window.
    pub fn check_and_record(
        &mut self,
        client_id: &str,
        category: RateCategory,
        now_ms: i64,
    ) -> Result<(), u64> {
        let stamps = self
            .windows
            .entry((client_id.to_string(), category))
            .or_default();
        while stamps.front().is_some_and(|&t| now_ms - t >= WINDOW_MS) {
            stamps.pop_front();
        }
        if stamps.len() >= category.limit() {
            let retry_after = stamps
                .front()
                .map(|&t| (t + WINDOW_MS - now_ms).max(1))
                .unwrap_or(1);
            return Err(retry_after as u64);
        }
        stamps.push_back(now_ms);
        Ok(())
    }

    /// Drop timestamps outside the window and empty entries; run from
    /// the periodic room sweep to bound memory.
    pub fn prune(&mut self, now_ms: i64) {
        self.windows.retain(|_, stamps| {
            while stamps.front().is_some_and(|&t| now_ms - t >= WINDOW_MS) {
                stamps.pop_front();
            }
            !stamps.is_empty()
        });
    }

    /// Full cleanup for a disconnecting client.
    pub fn forget_client(&mut self, client_id: &str) {
        self.windows.retain(|(cid, _), _| cid != client_id);
    }

    #[cfg(test)]
    fn tracked_entries(&self) -> usize {
        self.windows.len()
    }
}
