use std::collections::VecDeque;

/// Samples kept for the running estimate.
const MAX_SAMPLES: usize = 7;
/// Below this many samples the offset is usable but not trusted for
/// corrections.
const MIN_RELIABLE_SAMPLES: usize = 5;
/// A ping whose round trip exceeds this multiple of the running
/// average is congestion noise and is discarded.
const RTT_REJECT_FACTOR: f64 = 2.5;

#[derive(Debug, Clone, Copy)]
struct Sample {
    offset_ms: f64,
    rtt_ms: f64,
}

/// NTP-style estimate of `server_clock - local_clock` from ping/pong
/// pairs. Each exchange yields an offset sample assuming symmetric
/// network delay; the estimate weights recent low-RTT samples highest
/// because their symmetry assumption is most plausible.
#[derive(Debug, Default)]
pub struct ClockEstimator {
    samples: VecDeque<Sample>,
}

impl ClockEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one exchange: `t0` local send, `server_ts` server stamp,
    /// `t1` local receive. Returns false when the sample was rejected
    /// as a congestion outlier.
    pub fn add_sample(&mut self, t0: i64, server_ts: i64, t1: i64) -> bool {
        let rtt_ms = (t1 - t0).max(0) as f64;
        if let Some(avg) = self.average_rtt() {
            if rtt_ms > avg * RTT_REJECT_FACTOR {
                return false;
            }
        }
        let offset_ms = server_ts as f64 - (t0 as f64 + t1 as f64) / 2.0;
        self.samples.push_back(Sample { offset_ms, rtt_ms });
        if self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
        true
    }

    fn average_rtt(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().map(|s| s.rtt_ms).sum::<f64>() / self.samples.len() as f64)
    }

    /// Current offset estimate, weighted toward low-RTT samples.
    pub fn offset_ms(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut weighted = 0.0;
        let mut total = 0.0;
        for sample in &self.samples {
            let weight = 1.0 / (sample.rtt_ms + 1.0);
            weighted += sample.offset_ms * weight;
            total += weight;
        }
        Some(weighted / total)
    }

    /// Whether enough clean samples have accumulated for the estimate
    /// to drive drift correction.
    pub fn is_reliable(&self) -> bool {
        self.samples.len() >= MIN_RELIABLE_SAMPLES
    }

    /// Map a local timestamp onto the server's clock. Identity until
    /// the first sample lands.
    pub fn to_server_time(&self, local_ms: i64) -> i64 {
        local_ms + self.offset_ms().unwrap_or(0.0).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_exchange_recovers_the_offset() {
        let mut est = ClockEstimator::new();
        // Server runs 500ms ahead; 40ms symmetric RTT.
        est.add_sample(1_000, 1_520, 1_040);
        assert_eq!(est.offset_ms(), Some(500.0));
        assert_eq!(est.to_server_time(2_000), 2_500);
    }

    #[test]
    fn congested_pings_are_rejected() {
        let mut est = ClockEstimator::new();
        for i in 0..4 {
            let t0 = i * 1_000;
            assert!(est.add_sample(t0, t0 + 520, t0 + 40));
        }
        // 400ms RTT against a 40ms average: discarded, estimate intact.
        assert!(!est.add_sample(10_000, 10_900, 10_400));
        assert_eq!(est.offset_ms(), Some(500.0));
    }

    #[test]
    fn low_rtt_samples_dominate_the_estimate() {
        let mut est = ClockEstimator::new();
        // A sloppy sample claims +620; a tight one says +500.
        est.add_sample(0, 670, 100);
        est.add_sample(1_000, 1_505, 1_010);
        let offset = est.offset_ms().unwrap();
        assert!((offset - 500.0).abs() < 15.0, "offset was {offset}");
    }

    #[test]
    fn reliability_needs_five_samples_and_the_window_slides() {
        let mut est = ClockEstimator::new();
        for i in 0..4 {
            est.add_sample(i * 1_000, i * 1_000 + 520, i * 1_000 + 40);
        }
        assert!(!est.is_reliable());
        for i in 4..10 {
            est.add_sample(i * 1_000, i * 1_000 + 520, i * 1_000 + 40);
        }
        assert!(est.is_reliable());
        assert_eq!(est.samples.len(), MAX_SAMPLES);
    }

    #[test]
    fn empty_estimator_is_the_identity_mapping() {
        let est = ClockEstimator::new();
        assert_eq!(est.offset_ms(), None);
        assert_eq!(est.to_server_time(1_234), 1_234);
    }
}
