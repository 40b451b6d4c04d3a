//! UTC timestamps for node and presence updates

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch, in UTC
///
/// [`Timestamp::now`] never returns the same value twice within a process,
/// so two updates made back to back are still ordered.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

/// Smallest step between two consecutive `now()` values
const TICK: f64 = 1e-6;

static LAST_ISSUED: AtomicU64 = AtomicU64::new(0);

impl Timestamp {
    /// The current time
    pub fn now() -> Self {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let mut last = LAST_ISSUED.load(Ordering::Relaxed);
        loop {
            let next = wall.max(f64::from_bits(last) + TICK);
            match LAST_ISSUED.compare_exchange_weak(
                last,
                next.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Self(next),
                Err(current) => last = current,
            }
        }
    }

    /// Create from seconds since the epoch
    pub const fn from_secs_f64(secs: f64) -> Self {
        Self(secs)
    }

    /// Seconds since the epoch
    pub const fn as_secs_f64(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}
