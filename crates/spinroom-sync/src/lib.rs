//! Client-side synchronization: server clock estimation from
//! TIME_PING/TIME_PONG exchanges, and playhead drift correction
//! against BEACON_TICK. No IO here; callers feed in wire messages and
//! local timestamps and act on the returned corrections.

pub mod clock;
pub mod drift;

pub use clock::ClockEstimator;
pub use drift::{Correction, DriftCorrector};
