//! Frame position to wall-clock conversion.
//!
//! A stream's timestamp is `anchor + frames / rate`, where `frames` counts
//! frames transferred across the backend boundary and `anchor` is the clock
//! reading at which frame zero would have been transferred. Anchors are
//! kept per time base and only move forward, except across `flush`.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Which clock a timestamp is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampBase {
    /// Monotonic, stops while the system is suspended
    Monotonic,
    /// Monotonic, keeps counting through suspend
    BootTime,
}

impl TimestampBase {
    const fn index(self) -> usize {
        match self {
            Self::Monotonic => 0,
            Self::BootTime => 1,
        }
    }
}

/// A point in time as whole seconds plus nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    /// Whole seconds since the clock's epoch
    pub seconds: i64,
    /// Nanoseconds past `seconds`, below one billion
    pub nanoseconds: i64,
}

impl Timestamp {
    /// Total nanoseconds
    pub fn as_nanos(&self) -> i128 {
        self.seconds as i128 * 1_000_000_000 + self.nanoseconds as i128
    }
}

impl From<Duration> for Timestamp {
    fn from(d: Duration) -> Self {
        Self {
            seconds: d.as_secs() as i64,
            nanoseconds: d.subsec_nanos() as i64,
        }
    }
}

/// Source of clock readings.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's epoch.
    fn now(&self, base: TimestampBase) -> Duration;
}

/// Reads the system clocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[cfg(any(target_os = "linux", target_os = "android"))]
impl Clock for SystemClock {
    fn now(&self, base: TimestampBase) -> Duration {
        let id = match base {
            TimestampBase::Monotonic => libc::CLOCK_MONOTONIC,
            TimestampBase::BootTime => libc::CLOCK_BOOTTIME,
        };
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
        let rc = unsafe { libc::clock_gettime(id, &mut ts) };
        if rc != 0 {
            return fallback_now();
        }
        Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
impl Clock for SystemClock {
    fn now(&self, _base: TimestampBase) -> Duration {
        fallback_now()
    }
}

fn fallback_now() -> Duration {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed()
}

/// Clock advanced by hand, for simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock reading `start` on both bases
    pub fn new(start: Duration) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self, _base: TimestampBase) -> Duration {
        *self.now.lock()
    }
}

/// Tracks the anchor for each time base.
pub struct TimestampTracker {
    clock: Arc<dyn Clock>,
    anchors: Mutex<[Option<Duration>; 2]>,
}

impl std::fmt::Debug for TimestampTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampTracker")
            .field("anchors", &*self.anchors.lock())
            .finish_non_exhaustive()
    }
}

fn frames_duration(frames: u64, rate: u32) -> Duration {
    let rate = u64::from(rate.max(1));
    Duration::new(frames / rate, ((frames % rate) * 1_000_000_000 / rate) as u32)
}

impl TimestampTracker {
    /// Create a tracker over `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            anchors: Mutex::new([None; 2]),
        }
    }

    /// Re-anchor on start so that the current position maps to "now",
    /// without letting the anchor move backwards.
    pub fn on_start(&self, frames: u64, rate: u32) {
        let played = frames_duration(frames, rate);
        let mut anchors = self.anchors.lock();
        for base in [TimestampBase::Monotonic, TimestampBase::BootTime] {
            let candidate = self.clock.now(base).saturating_sub(played);
            let slot = &mut anchors[base.index()];
            *slot = Some(match *slot {
                Some(prev) => prev.max(candidate),
                None => candidate,
            });
        }
    }

    /// Re-anchor frame zero at the current clock reading.
    pub fn on_flush(&self) {
        let mut anchors = self.anchors.lock();
        for base in [TimestampBase::Monotonic, TimestampBase::BootTime] {
            anchors[base.index()] = Some(self.clock.now(base));
        }
    }

    /// Timestamp of `frames` in `base`, or `None` before the first start.
    pub fn timestamp(&self, frames: u64, rate: u32, base: TimestampBase) -> Option<Timestamp> {
        let anchor = self.anchors.lock()[base.index()]?;
        Some(Timestamp::from(anchor + frames_duration(frames, rate)))
    }
}
