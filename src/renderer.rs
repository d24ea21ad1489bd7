//! Playback streams.

use crate::backend::{PolicyClient, RenderSink, StaticPolicy};
use crate::buffer::{BufQueueState, BufferDesc, SlotAccounting};
use crate::config::StreamConfig;
use crate::error::{AudioStreamError, AudioStreamResult, ErrorMetrics};
use crate::event::StreamEvent;
use crate::info::{
    AudioRendererOptions, AudioStreamParams, AudioStreamType, Direction, RenderRate,
    RendererInfo, StreamMode,
};
use crate::position::{PeriodPositionCallback, PositionCallback};
use crate::state::{StreamState, StreamStateCallback};
use crate::stream::{AudioStream, BufferHandle, StreamBackends, Transport};
use crate::timestamp::{Clock, SystemClock, Timestamp, TimestampBase};
use crossbeam::channel::Receiver;
use parking_lot::RwLock;
use std::sync::Arc;

/// Asks the application for render data in callback mode.
///
/// Called on the I/O worker whenever a slot is free and the application
/// holds none. The callback is expected to take a descriptor through a
/// [`BufferHandle`], fill it and enqueue it before returning.
pub trait RendererWriteCallback: Send + Sync {
    /// `length` is the slot size in bytes.
    fn on_write_data(&self, length: usize);
}

/// An audio stream flowing from the application to a [`RenderSink`].
#[derive(Debug)]
pub struct AudioRenderer {
    stream: AudioStream,
    info: RwLock<RendererInfo>,
}

impl AudioRenderer {
    /// Create an unconfigured renderer with the default policy and clock
    pub fn new(sink: impl RenderSink + 'static, config: StreamConfig) -> AudioStreamResult<Self> {
        Self::with_backends(sink, config, Arc::new(StaticPolicy::new()), Arc::new(SystemClock))
    }

    /// Create an unconfigured renderer with explicit collaborators.
    pub fn with_backends(
        sink: impl RenderSink + 'static,
        config: StreamConfig,
        policy: Arc<dyn PolicyClient>,
        clock: Arc<dyn Clock>,
    ) -> AudioStreamResult<Self> {
        let backends = StreamBackends {
            transport: Transport::Render(Box::new(sink)),
            policy,
            clock,
        };
        Ok(Self {
            stream: AudioStream::new(Direction::Render, backends, config)?,
            info: RwLock::new(RendererInfo::default()),
        })
    }

    /// Create a renderer configured from `options`, ready to start.
    pub fn create(
        options: AudioRendererOptions,
        sink: impl RenderSink + 'static,
        config: StreamConfig,
    ) -> AudioStreamResult<Self> {
        let renderer = Self::new(sink, config)?;
        renderer.set_renderer_info(options.renderer_info)?;
        renderer.set_params(options.stream_info)?;
        Ok(renderer)
    }

    /// Set content type and usage, which also selects the stream type.
    pub fn set_renderer_info(&self, info: RendererInfo) -> AudioStreamResult<()> {
        let state = self.stream.status();
        if state != StreamState::New {
            return Err(AudioStreamError::illegal_state("set_renderer_info", state));
        }
        *self.info.write() = info;
        self.stream
            .set_stream_type(AudioStreamType::from_content(info.content_type, info.stream_usage));
        Ok(())
    }

    /// Renderer metadata
    pub fn renderer_info(&self) -> AudioStreamResult<RendererInfo> {
        self.stream.stream_type()?;
        Ok(*self.info.read())
    }

    /// Fix the PCM layout and open the sink.
    pub fn set_params(&self, params: AudioStreamParams) -> AudioStreamResult<()> {
        self.stream.set_params(params)
    }

    /// Parameters set by `set_params`
    pub fn params(&self) -> AudioStreamResult<AudioStreamParams> {
        self.stream.params()
    }

    /// Same as [`AudioRenderer::params`]
    pub fn stream_info(&self) -> AudioStreamResult<AudioStreamParams> {
        self.stream.params()
    }

    /// Current lifecycle state
    pub fn status(&self) -> StreamState {
        self.stream.status()
    }

    /// Start or resume playback
    pub fn start(&self) -> AudioStreamResult<()> {
        self.stream.start()
    }

    /// Pause playback, keeping queued audio
    pub fn pause(&self) -> AudioStreamResult<()> {
        self.stream.pause()
    }

    /// Stop playback, keeping queued audio
    pub fn stop(&self) -> AudioStreamResult<()> {
        self.stream.stop()
    }

    /// Discard queued audio
    pub fn flush(&self) -> AudioStreamResult<()> {
        self.stream.flush()
    }

    /// Wait for queued audio to reach the sink
    pub fn drain(&self) -> AudioStreamResult<()> {
        self.stream.drain()
    }

    /// Release the sink and buffers. Terminal.
    pub fn release(&self) -> AudioStreamResult<()> {
        self.stream.release()
    }

    /// Queue up to one slot of PCM, blocking while every slot is full.
    ///
    /// Returns bytes accepted. Normal mode and RUNNING only.
    pub fn write(&self, data: &[u8]) -> AudioStreamResult<usize> {
        self.stream.write(data)
    }

    /// Keep writing until the remainder is at most `min_write_bytes`.
    ///
    /// Returns bytes accepted; the tail below the threshold is not written.
    pub fn write_all(&self, data: &[u8]) -> AudioStreamResult<usize> {
        self.stream.write_all(data)
    }

    /// Slot size in bytes
    pub fn buffer_size(&self) -> AudioStreamResult<usize> {
        self.stream.buffer_size()
    }

    /// Frames per slot
    pub fn frame_count(&self) -> AudioStreamResult<usize> {
        self.stream.frame_count()
    }

    /// Sink latency in microseconds
    pub fn latency(&self) -> AudioStreamResult<u64> {
        self.stream.latency()
    }

    /// Set volume in `0.0..=1.0`
    pub fn set_volume(&self, volume: f32) -> AudioStreamResult<()> {
        self.stream.set_volume(volume)
    }

    /// Volume last set
    pub fn volume(&self) -> AudioStreamResult<f32> {
        self.stream.volume()
    }

    /// Playback speed hint
    pub fn set_render_rate(&self, rate: RenderRate) -> AudioStreamResult<()> {
        self.stream.set_render_rate(rate)
    }

    /// Playback speed hint last set
    pub fn render_rate(&self) -> AudioStreamResult<RenderRate> {
        self.stream.render_rate()
    }

    /// Select normal or callback mode. Not while running or paused.
    pub fn set_render_mode(&self, mode: StreamMode) -> AudioStreamResult<()> {
        self.stream.set_mode(mode)
    }

    /// Current render mode
    pub fn render_mode(&self) -> AudioStreamResult<StreamMode> {
        self.stream.mode()
    }

    /// Register the data request callback. Callback mode only.
    pub fn set_renderer_write_callback(
        &self,
        callback: Option<Arc<dyn RendererWriteCallback>>,
    ) -> AudioStreamResult<()> {
        let callback =
            callback.ok_or_else(|| AudioStreamError::invalid_param("callback", "null callback"))?;
        let mode = self.stream.mode()?;
        if mode != StreamMode::Callback {
            return Err(AudioStreamError::incorrect_mode(
                "set_renderer_write_callback",
                mode,
            ));
        }
        *self.stream.shared().write_callback.write() = Some(callback);
        Ok(())
    }

    /// Slot size for future `set_params`, or resize before the first start.
    pub fn set_buffer_duration(&self, ms: i64) -> AudioStreamResult<()> {
        self.stream.set_buffer_duration(ms)
    }

    /// Take a free slot to fill. Callback mode only.
    pub fn get_buffer_desc(&self) -> AudioStreamResult<BufferDesc> {
        self.stream.get_buffer_desc()
    }

    /// Queue a filled slot for playback. Callback mode only.
    pub fn enqueue(&self, desc: BufferDesc) -> AudioStreamResult<()> {
        self.stream.enqueue(desc)
    }

    /// Drop queued slots. Callback mode only.
    pub fn clear(&self) -> AudioStreamResult<()> {
        self.stream.clear()
    }

    /// Pool size and queued count
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

    /// Frames delivered to the sink
    pub fn frames_written(&self) -> AudioStreamResult<u64> {
        self.stream.position()
    }

    /// Frames handed in by the application
    pub fn frames_submitted(&self) -> AudioStreamResult<u64> {
        self.stream.client_position()
    }

    /// Time at which the last delivered frame plays
    pub fn audio_time(&self, base: TimestampBase) -> AudioStreamResult<Timestamp> {
        self.stream.audio_time(base)
    }

    /// Session id
    pub fn audio_session_id(&self) -> AudioStreamResult<u32> {
        self.stream.session_id()
    }

    /// Stream type derived from the renderer info
    pub fn stream_type(&self) -> AudioStreamResult<AudioStreamType> {
        self.stream.stream_type()
    }

    /// One-shot notification at `mark_position` frames
    pub fn set_renderer_position_callback(
        &self,
        mark_position: i64,
        callback: Option<Arc<dyn PositionCallback>>,
    ) -> AudioStreamResult<()> {
        self.stream.set_position_callback(mark_position, callback)
    }

    /// Remove the mark callback
    pub fn unset_renderer_position_callback(&self) {
        self.stream.unset_position_callback();
    }

    /// Notification every `frame_number` frames
    pub fn set_renderer_period_position_callback(
        &self,
        frame_number: i64,
        callback: Option<Arc<dyn PeriodPositionCallback>>,
    ) -> AudioStreamResult<()> {
        self.stream
            .set_period_position_callback(frame_number, callback)
    }

    /// Remove the period callback
    pub fn unset_renderer_period_position_callback(&self) {
        self.stream.unset_period_position_callback();
    }

    /// Lifecycle notifications
    pub fn set_renderer_callback(
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
