//! Precision timestamps carried alongside packets and bursts.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timecode mode for a sample timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeCode {
    /// Wall-clock time since the Unix epoch.
    #[default]
    Epoch,
    /// Relative or otherwise unspecified timecode.
    Relative,
}

/// Status of a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeStatus {
    /// The timestamp holds a valid time.
    #[default]
    Valid,
    /// No time was supplied by the producer.
    NotSet,
}

/// A split-seconds timestamp: whole seconds plus a fractional part in [0, 1).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PrecisionTime {
    /// Timecode mode.
    pub tcmode: TimeCode,
    /// Timecode status.
    pub tcstatus: TimeStatus,
    /// Sample offset for the timestamp within the data.
    pub toff: f64,
    /// Whole seconds.
    pub twsec: f64,
    /// Fractional seconds.
    pub tfsec: f64,
}

impl PrecisionTime {
    /// Returns the current wall-clock time.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self::from_secs_f64(since_epoch.as_secs() as f64, since_epoch.subsec_nanos() as f64 * 1e-9)
    }

    /// Returns a timestamp flagged as not set.
    pub fn not_set() -> Self {
        Self {
            tcmode: TimeCode::Epoch,
            tcstatus: TimeStatus::NotSet,
            toff: 0.0,
            twsec: 0.0,
            tfsec: 0.0,
        }
    }

    /// Builds a normalized timestamp from whole and fractional seconds.
    pub fn from_secs_f64(whole: f64, frac: f64) -> Self {
        let carry = frac.floor();
        Self {
            tcmode: TimeCode::Epoch,
            tcstatus: TimeStatus::Valid,
            toff: 0.0,
            twsec: whole + carry,
            tfsec: frac - carry,
        }
    }

    /// Returns true when the producer supplied a real time.
    pub fn is_valid(&self) -> bool {
        self.tcstatus == TimeStatus::Valid
    }

    /// Total seconds as a single float.
    pub fn as_secs_f64(&self) -> f64 {
        self.twsec + self.tfsec
    }
}

/// Converts a floating-point seconds timeout into a wait duration.
///
/// Returns `None` for negative (indefinite) timeouts and for values too
/// large to represent.
pub fn timeout_duration(timeout: f64) -> Option<Duration> {
    if timeout < 0.0 || timeout.is_nan() {
        None
    } else {
        Duration::try_from_secs_f64(timeout).ok()
    }
}
