//! Fixed pool layout.

use super::desc::Slot;
use crate::error::{AudioStreamError, AudioStreamResult};
use crate::info::AudioStreamParams;
use std::collections::VecDeque;
use std::time::Duration;

/// Size of the pool and of each slot, derived from stream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPool {
    buffer_count: usize,
    frame_count: usize,
    buffer_size: usize,
}

impl BufferPool {
    /// Compute slot sizes for `params` holding `duration` of audio each.
    pub fn new(
        params: &AudioStreamParams,
        duration: Duration,
        buffer_count: usize,
    ) -> AudioStreamResult<Self> {
        if buffer_count == 0 {
            return Err(AudioStreamError::invalid_param(
                "buffer_count",
                "must be greater than zero",
            ));
        }
        let rate = params.sampling_rate.hz() as u128;
        let frame_count = (rate * duration.as_millis() / 1000) as usize;
        if frame_count == 0 {
            return Err(AudioStreamError::invalid_param(
                "buffer_duration",
                "slot would hold no frames",
            ));
        }
        Ok(Self {
            buffer_count,
            frame_count,
            buffer_size: frame_count * params.frame_size(),
        })
    }

    /// Number of slots
    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    /// Frames per slot
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Bytes per slot
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub(crate) fn allocate(&self) -> VecDeque<Slot> {
        (0..self.buffer_count)
            .map(|i| Slot::new(i, self.buffer_size))
            .collect()
    }
}
