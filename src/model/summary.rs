//! Run summaries rolled up across the runner hierarchy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Additive rollup of a subtree of the run: counts plus summed wall-clock
/// execution time. Every runner level produces one and parents combine them
/// field-wise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Summed across serially-run children, not a maximum
    #[serde(with = "duration_secs")]
    pub time: Duration,
}

impl RunSummary {
    /// Combine another summary into this one, field-wise
    pub fn aggregate(&mut self, other: &RunSummary) {
        self.total += other.total;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.time += other.time;
    }

    pub fn passed(&self) -> usize {
        self.total - self.failed - self.skipped
    }

    pub fn is_all_passed(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Time: {:.3}s",
            self.total,
            self.passed(),
            self.failed,
            self.skipped,
            self.time.as_secs_f64()
        )
    }
}

/// Serialize durations as decimal seconds on the wire
pub(crate) mod duration_secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(de::Error::custom("duration must be a non-negative number"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
