//! Time source for credential expiration
//!
//! The cache never reads the wall clock directly; it is handed a [`Clock`] at
//! construction so expiration can be driven deterministically.

use crate::utils::sync::lock_or_recover;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Mutex;
use std::time::Duration;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
///
/// # Example
///
/// ```
/// use tokenkeeper::core::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::default();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(90));
/// assert_eq!((clock.now() - start).num_seconds(), 90);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock_or_recover(&self.now, "manual_clock");
        if let Some(next) = now.checked_add_signed(to_chrono(by)) {
            *now = next;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *lock_or_recover(&self.now, "manual_clock") = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        ManualClock::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock_or_recover(&self.now, "manual_clock")
    }
}

/// Saturating std -> chrono conversion; out-of-range durations become "forever"
pub(crate) fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::max_value())
}
