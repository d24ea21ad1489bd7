//! Stream tuning knobs.

use crate::error::{AudioStreamError, AudioStreamResult};
use std::time::Duration;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Shortest accepted slot duration in milliseconds.
pub const MIN_BUFFER_DURATION_MS: u64 = 5;
/// Longest accepted slot duration in milliseconds.
pub const MAX_BUFFER_DURATION_MS: u64 = 20;
/// Default number of pool slots.
pub const DEFAULT_BUFFER_COUNT: usize = 3;

/// Configuration applied when a stream is created.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct StreamConfig {
    /// Number of buffer slots in the pool
    pub buffer_count: usize,

    /// Audio duration held by one slot
    pub buffer_duration: Duration,

    /// Remaining byte count at or below which `write_all` stops looping
    pub min_write_bytes: usize,

    /// Timeout for worker waits on the queue
    pub worker_poll_interval: Duration,

    /// Capacity of the event channel
    pub event_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_count: DEFAULT_BUFFER_COUNT,
            buffer_duration: Duration::from_millis(MAX_BUFFER_DURATION_MS),
            min_write_bytes: 4,
            worker_poll_interval: Duration::from_millis(5),
            event_capacity: 64,
        }
    }
}

impl StreamConfig {
    /// Create configuration optimized for low-latency applications
    pub fn low_latency() -> Self {
        Self {
            buffer_count: 2,
            buffer_duration: Duration::from_millis(MIN_BUFFER_DURATION_MS),
            min_write_bytes: 4,
            worker_poll_interval: Duration::from_millis(1),
            event_capacity: 64,
        }
    }

    /// Create configuration that trades latency for fewer wakeups
    pub fn power_saving() -> Self {
        Self {
            buffer_count: 8,
            buffer_duration: Duration::from_millis(MAX_BUFFER_DURATION_MS),
            min_write_bytes: 4,
            worker_poll_interval: Duration::from_millis(20),
            event_capacity: 256,
        }
    }

    /// Set the pool size
    pub fn with_buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count;
        self
    }

    /// Set the per-slot duration
    pub fn with_buffer_duration(mut self, duration: Duration) -> Self {
        self.buffer_duration = duration;
        self
    }

    /// Set the minimum-write threshold
    pub fn with_min_write_bytes(mut self, bytes: usize) -> Self {
        self.min_write_bytes = bytes;
        self
    }

    /// Set the worker wait timeout
    pub fn with_worker_poll_interval(mut self, interval: Duration) -> Self {
        self.worker_poll_interval = interval;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Validate every field.
    pub fn validate(&self) -> AudioStreamResult<()> {
        if !(2..=16).contains(&self.buffer_count) {
            return Err(AudioStreamError::invalid_param(
                "buffer_count",
                format!("{} outside 2..=16", self.buffer_count),
            ));
        }
        validate_buffer_duration(self.buffer_duration.as_millis() as i64)?;
        if self.worker_poll_interval.is_zero() {
            return Err(AudioStreamError::invalid_param(
                "worker_poll_interval",
                "must be non-zero",
            ));
        }
        if self.event_capacity == 0 {
            return Err(AudioStreamError::invalid_param(
                "event_capacity",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Check a slot duration given in milliseconds.
pub fn validate_buffer_duration(ms: i64) -> AudioStreamResult<Duration> {
    let min = MIN_BUFFER_DURATION_MS as i64;
    let max = MAX_BUFFER_DURATION_MS as i64;
    if (min..=max).contains(&ms) {
        Ok(Duration::from_millis(ms as u64))
    } else {
        Err(AudioStreamError::invalid_param(
            "buffer_duration",
            format!("{ms} ms outside {min}..={max} ms"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(StreamConfig::default().validate().is_ok());
        assert!(StreamConfig::low_latency().validate().is_ok());
        assert!(StreamConfig::power_saving().validate().is_ok());
        assert_eq!(StreamConfig::default().buffer_count, 3);
    }

    #[test]
    fn test_builder_and_validation() {
        let config = StreamConfig::default().with_buffer_count(1);
        assert!(config.validate().is_err());

        let config = StreamConfig::default()
            .with_buffer_count(4)
            .with_buffer_duration(Duration::from_millis(10))
            .with_min_write_bytes(8);
        assert!(config.validate().is_ok());
        assert_eq!(config.min_write_bytes, 8);

        let config = StreamConfig::default().with_event_capacity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_buffer_duration_bounds() {
        for ms in [-1, 0, 4, 21, 100] {
            assert!(validate_buffer_duration(ms).is_err(), "{ms} accepted");
        }
        for ms in [5, 10, 20] {
            assert_eq!(
                validate_buffer_duration(ms).unwrap(),
                Duration::from_millis(ms as u64)
            );
        }
    }
}
