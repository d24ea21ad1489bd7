//! Recording streams.

use crate::backend::{CaptureSource, PolicyClient, StaticPolicy};
use crate::buffer::{BufQueueState, BufferDesc, SlotAccounting};
use crate::config::StreamConfig;
use crate::error::{AudioStreamError, AudioStreamResult, ErrorMetrics};
use crate::event::StreamEvent;
use crate::info::{
    AudioCapturerOptions, AudioStreamParams, AudioStreamType, CapturerInfo, Direction,
    StreamMode,
};
use crate::position::{PeriodPositionCallback, PositionCallback};
use crate::state::{StreamState, StreamStateCallback};
use crate::stream::{AudioStream, BufferHandle, StreamBackends, Transport};
use crate::timestamp::{Clock, SystemClock, Timestamp, TimestampBase};
use crossbeam::channel::Receiver;
use parking_lot::RwLock;
use std::sync::Arc;

/// Tells the application captured data is ready in callback mode.
///
/// Called on the I/O worker after each slot is filled. Take the slot with
/// [`BufferHandle::get_buffer_desc`] and give it back with `enqueue`.
pub trait CapturerReadCallback: Send + Sync {
    /// `length` is the number of bytes just captured.
    fn on_read_data(&self, length: usize);
}

/// An audio stream flowing from a [`CaptureSource`] to the application.
#[derive(Debug)]
pub struct AudioCapturer {
    stream: AudioStream,
    info: RwLock<CapturerInfo>,
}

impl AudioCapturer {
    /// Create an unconfigured capturer with the default policy and clock
    pub fn new(
        source: impl CaptureSource + 'static,
        config: StreamConfig,
    ) -> AudioStreamResult<Self> {
        Self::with_backends(
            source,
            config,
            Arc::new(StaticPolicy::new()),
            Arc::new(SystemClock),
        )
    }

    /// Create an unconfigured capturer with explicit collaborators.
    pub fn with_backends(
        source: impl CaptureSource + 'static,
        config: StreamConfig,
        policy: Arc<dyn PolicyClient>,
        clock: Arc<dyn Clock>,
    ) -> AudioStreamResult<Self> {
        let backends = StreamBackends {
            transport: Transport::Capture(Box::new(source)),
            policy,
            clock,
        };
        Ok(Self {
            stream: AudioStream::new(Direction::Capture, backends, config)?,
            info: RwLock::new(CapturerInfo::default()),
        })
    }

    /// Create a capturer configured from `options`, ready to start.
    pub fn create(
        options: AudioCapturerOptions,
        source: impl CaptureSource + 'static,
        config: StreamConfig,
    ) -> AudioStreamResult<Self> {
        let capturer = Self::new(source, config)?;
        capturer.set_capturer_info(options.capturer_info)?;
        capturer.set_params(options.stream_info)?;
        Ok(capturer)
    }

    /// Set the capture source type. Only before `set_params`.
    pub fn set_capturer_info(&self, info: CapturerInfo) -> AudioStreamResult<()> {
        let state = self.stream.status();
        if state != StreamState::New {
            return Err(AudioStreamError::illegal_state("set_capturer_info", state));
        }
        *self.info.write() = info;
        Ok(())
    }

    /// Capturer metadata
    pub fn capturer_info(&self) -> AudioStreamResult<CapturerInfo> {
        self.stream.stream_type()?;
        Ok(*self.info.read())
    }

    /// Fix the PCM layout and open the source.
    pub fn set_params(&self, params: AudioStreamParams) -> AudioStreamResult<()> {
        self.stream.set_params(params)
    }

    /// Parameters set by `set_params`
    pub fn params(&self) -> AudioStreamResult<AudioStreamParams> {
        self.stream.params()
    }

    /// Current lifecycle state
    pub fn status(&self) -> StreamState {
        self.stream.status()
    }

    /// Start or resume capture
    pub fn start(&self) -> AudioStreamResult<()> {
        self.stream.start()
    }

    /// Pause capture, keeping unread audio
    pub fn pause(&self) -> AudioStreamResult<()> {
        self.stream.pause()
    }

    /// Stop capture, keeping unread audio
    pub fn stop(&self) -> AudioStreamResult<()> {
        self.stream.stop()
    }

    /// Discard unread audio
    pub fn flush(&self) -> AudioStreamResult<()> {
        self.stream.flush()
    }

    /// Release the source and buffers. Terminal.
    pub fn release(&self) -> AudioStreamResult<()> {
        self.stream.release()
    }

    /// Read up to `user_size` bytes into `buf`.
    ///
    /// A blocking read waits until `user_size` bytes arrive or the stream
    /// stops, returning a short count in the latter case. A non-blocking
    /// read returns what is queued, possibly nothing.
    pub fn read(&self, buf: &mut [u8], user_size: usize, blocking: bool) -> AudioStreamResult<usize> {
        self.stream.read(buf, user_size, blocking)
    }

    /// Slot size in bytes
    pub fn buffer_size(&self) -> AudioStreamResult<usize> {
        self.stream.buffer_size()
    }

    /// Frames per slot
    pub fn frame_count(&self) -> AudioStreamResult<usize> {
        self.stream.frame_count()
    }

    /// Source latency in microseconds
    pub fn latency(&self) -> AudioStreamResult<u64> {
        self.stream.latency()
    }

    /// Set input gain in `0.0..=1.0`
    pub fn set_volume(&self, volume: f32) -> AudioStreamResult<()> {
        self.stream.set_volume(volume)
    }

    /// Gain last set
    pub fn volume(&self) -> AudioStreamResult<f32> {
        self.stream.volume()
    }

    /// Select normal or callback mode. Not while running or paused.
    pub fn set_capture_mode(&self, mode: StreamMode) -> AudioStreamResult<()> {
        self.stream.set_mode(mode)
    }

    /// Current capture mode
    pub fn capture_mode(&self) -> AudioStreamResult<StreamMode> {
        self.stream.mode()
    }

    /// Register the data-ready callback. Callback mode only.
    pub fn set_capturer_read_callback(
        &self,
        callback: Option<Arc<dyn CapturerReadCallback>>,
    ) -> AudioStreamResult<()> {
        let callback =
            callback.ok_or_else(|| AudioStreamError::invalid_param("callback", "null callback"))?;
        let mode = self.stream.mode()?;
        if mode != StreamMode::Callback {
            return Err(AudioStreamError::incorrect_mode(
                "set_capturer_read_callback",
                mode,
            ));
        }
        *self.stream.shared().read_callback.write() = Some(callback);
        Ok(())
    }

    /// Slot size for future `set_params`, or resize before the first start.
    pub fn set_buffer_duration(&self, ms: i64) -> AudioStreamResult<()> {
        self.stream.set_buffer_duration(ms)
    }

    /// Take the oldest captured slot. Callback mode only.
    pub fn get_buffer_desc(&self) -> AudioStreamResult<BufferDesc> {
        self.stream.get_buffer_desc()
    }

    /// Hand a consumed slot back for refilling. Callback mode only.
    pub fn enqueue(&self, desc: BufferDesc) -> AudioStreamResult<()> {
        self.stream.enqueue(desc)
    }

    /// Drop unread slots. Callback mode only.
    pub fn clear(&self) -> AudioStreamResult<()> {
        self.stream.clear()
    }

    /// Pool size and unread count
    pub fn buf_queue_state(&self) -> AudioStreamResult<BufQueueState> {
        self.stream.buf_queue_state()
    }

    /// Where every slot is
    pub fn slot_accounting(&self) -> AudioStreamResult<SlotAccounting> {
        self.stream.slot_accounting()
    }

    /// Buffer exchange handle for use inside callbacks
    pub fn buffer_handle(&self) -> BufferHandle {
        self.stream.buffer_handle()
    }

    /// Frames captured from the source
    pub fn frames_read(&self) -> AudioStreamResult<u64> {
        self.stream.position()
    }

    /// Frames consumed by the application
    pub fn frames_consumed(&self) -> AudioStreamResult<u64> {
        self.stream.client_position()
    }

    /// Time at which the last captured frame was recorded
    pub fn audio_time(&self, base: TimestampBase) -> AudioStreamResult<Timestamp> {
        self.stream.audio_time(base)
    }

    /// Session id
    pub fn audio_session_id(&self) -> AudioStreamResult<u32> {
        self.stream.session_id()
    }

    /// Stream type used for policy lookups
    pub fn stream_type(&self) -> AudioStreamResult<AudioStreamType> {
        self.stream.stream_type()
    }

    /// One-shot notification at `mark_position` frames
    pub fn set_capturer_position_callback(
        &self,
        mark_position: i64,
        callback: Option<Arc<dyn PositionCallback>>,
    ) -> AudioStreamResult<()> {
        self.stream.set_position_callback(mark_position, callback)
    }

    /// Remove the mark callback
    pub fn unset_capturer_position_callback(&self) {
        self.stream.unset_position_callback();
    }

    /// Notification every `frame_number` frames
    pub fn set_capturer_period_position_callback(
        &self,
        frame_number: i64,
        callback: Option<Arc<dyn PeriodPositionCallback>>,
    ) -> AudioStreamResult<()> {
        self.stream
            .set_period_position_callback(frame_number, callback)
    }

    /// Remove the period callback
    pub fn unset_capturer_period_position_callback(&self) {
        self.stream.unset_period_position_callback();
    }

    /// Lifecycle notifications
    pub fn set_capturer_callback(
        &self,
        callback: Option<Arc<dyn StreamStateCallback>>,
    ) -> AudioStreamResult<()> {
        self.stream.set_state_callback(callback)
    }

    /// Stream events
    pub fn subscribe_events(&self) -> Receiver<StreamEvent> {
        self.stream.subscribe_events()
    }

    /// Error counters
    pub fn error_metrics(&self) -> ErrorMetrics {
        self.stream.error_metrics()
    }
}
