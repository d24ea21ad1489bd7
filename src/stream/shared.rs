//! State shared between a stream's control surface and its I/O worker.

use crate::backend::{CaptureSource, PolicyClient, RenderSink};
use crate::buffer::{BufQueueState, BufferDesc, BufferQueue};
use crate::capturer::CapturerReadCallback;
use crate::config::StreamConfig;
use crate::error::{AudioStreamError, AudioStreamResult, ErrorMetrics};
use crate::event::{EventBus, StreamEvent};
use crate::info::{AudioStreamParams, AudioStreamType, Direction, RenderRate, StreamMode};
use crate::position::{PositionDispatcher, PositionEvent};
use crate::renderer::RendererWriteCallback;
use crate::state::{StreamState, StreamStateCallback};
use crate::timestamp::TimestampTracker;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

/// The backend a stream drives, by direction.
pub(crate) enum Transport {
    Render(Box<dyn RenderSink>),
    Capture(Box<dyn CaptureSource>),
}

impl Transport {
    pub(crate) fn name(&self) -> &str {
        match self {
            Self::Render(sink) => sink.name(),
            Self::Capture(source) => source.name(),
        }
    }

    pub(crate) fn open_port(
        &mut self,
        params: &AudioStreamParams,
        device: &str,
    ) -> AudioStreamResult<()> {
        match self {
            Self::Render(sink) => sink.open_port(params, device),
            Self::Capture(source) => source.open_port(params, device),
        }
    }

    pub(crate) fn start(&mut self) -> AudioStreamResult<()> {
        match self {
            Self::Render(sink) => sink.start(),
            Self::Capture(source) => source.start(),
        }
    }

    pub(crate) fn stop(&mut self) -> AudioStreamResult<()> {
        match self {
            Self::Render(sink) => sink.stop(),
            Self::Capture(source) => source.stop(),
        }
    }

    pub(crate) fn pause(&mut self) -> AudioStreamResult<()> {
        match self {
            Self::Render(sink) => sink.pause(),
            Self::Capture(source) => source.pause(),
        }
    }

    pub(crate) fn resume(&mut self) -> AudioStreamResult<()> {
        match self {
            Self::Render(sink) => sink.resume(),
            Self::Capture(source) => source.resume(),
        }
    }

    pub(crate) fn latency(&self) -> AudioStreamResult<u64> {
        match self {
            Self::Render(sink) => sink.latency(),
            Self::Capture(source) => source.latency(),
        }
    }

    pub(crate) fn set_volume(&mut self, volume: f32) -> AudioStreamResult<()> {
        match self {
            Self::Render(sink) => sink.set_volume(volume),
            Self::Capture(source) => source.set_volume(volume),
        }
    }

    pub(crate) fn set_render_rate(&mut self, rate: RenderRate) -> AudioStreamResult<()> {
        match self {
            Self::Render(sink) => sink.set_render_rate(rate),
            Self::Capture(_) => Ok(()),
        }
    }

    pub(crate) fn drain(&mut self) -> AudioStreamResult<()> {
        match self {
            Self::Render(sink) => sink.drain(),
            Self::Capture(_) => Ok(()),
        }
    }

    pub(crate) fn write_frame(&mut self, data: &[u8]) -> AudioStreamResult<usize> {
        match self {
            Self::Render(sink) => sink.write_frame(data),
            Self::Capture(_) => Err(AudioStreamError::not_supported(
                "write_frame on a capture source",
            )),
        }
    }

    pub(crate) fn read_frame(&mut self, buf: &mut [u8]) -> AudioStreamResult<usize> {
        match self {
            Self::Capture(source) => source.read_frame(buf),
            Self::Render(_) => Err(AudioStreamError::not_supported(
                "read_frame on a render sink",
            )),
        }
    }

    pub(crate) fn close(&mut self) {
        match self {
            Self::Render(sink) => sink.close(),
            Self::Capture(source) => source.close(),
        }
    }
}

pub(crate) struct StreamShared {
    pub(crate) session_id: u32,
    pub(crate) direction: Direction,
    pub(crate) config: StreamConfig,
    pub(crate) state: Mutex<StreamState>,
    pub(crate) mode: RwLock<StreamMode>,
    pub(crate) params: RwLock<Option<AudioStreamParams>>,
    pub(crate) buffer_duration: RwLock<Duration>,
    pub(crate) queue: RwLock<Option<Arc<BufferQueue>>>,
    pub(crate) transport: Mutex<Transport>,
    pub(crate) policy: Arc<dyn PolicyClient>,
    pub(crate) stream_type: RwLock<AudioStreamType>,
    pub(crate) dispatcher: PositionDispatcher,
    pub(crate) tracker: TimestampTracker,
    pub(crate) events: EventBus,
    pub(crate) metrics: Mutex<ErrorMetrics>,
    pub(crate) faulted: AtomicBool,
    pub(crate) volume: Mutex<f32>,
    pub(crate) render_rate: Mutex<RenderRate>,
    pub(crate) state_callback: RwLock<Option<Arc<dyn StreamStateCallback>>>,
    pub(crate) write_callback: RwLock<Option<Arc<dyn RendererWriteCallback>>>,
    pub(crate) read_callback: RwLock<Option<Arc<dyn CapturerReadCallback>>>,
}

impl StreamShared {
    pub(crate) fn state(&self) -> StreamState {
        *self.state.lock()
    }

    pub(crate) fn mode(&self) -> StreamMode {
        *self.mode.read()
    }

    pub(crate) fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    /// Store `next`, then notify outside every lock.
    pub(crate) fn set_state(&self, next: StreamState) {
        let prev = std::mem::replace(&mut *self.state.lock(), next);
        debug!(stream_id = self.session_id, from = %prev, to = %next, "state transition");
        self.notify_state(next);
    }

    fn notify_state(&self, state: StreamState) {
        self.events.emit(StreamEvent::StateChanged { state });
        let callback = self.state_callback.read().clone();
        if let Some(cb) = callback {
            cb.on_state_change(state);
        }
    }

    pub(crate) fn queue(&self) -> Option<Arc<BufferQueue>> {
        self.queue.read().clone()
    }

    /// Queue of a configured stream, or the error configuration getters report.
    pub(crate) fn configured_queue(&self, operation: &'static str) -> AudioStreamResult<Arc<BufferQueue>> {
        let state = self.state();
        if !state.is_configured() {
            return Err(AudioStreamError::operation_failed(format!(
                "{operation}: stream is {state}"
            )));
        }
        self.queue()
            .ok_or_else(|| AudioStreamError::operation_failed(format!("{operation}: no buffers")))
    }

    pub(crate) fn configured_params(&self, operation: &'static str) -> AudioStreamResult<AudioStreamParams> {
        let state = self.state();
        if !state.is_configured() {
            return Err(AudioStreamError::operation_failed(format!(
                "{operation}: stream is {state}"
            )));
        }
        let params = *self.params.read();
        params.ok_or_else(|| AudioStreamError::operation_failed(format!("{operation}: no params")))
    }

    pub(crate) fn check_faulted(&self) -> AudioStreamResult<()> {
        if self.is_faulted() {
            return Err(AudioStreamError::operation_failed(
                "backend failed; release and recreate the stream",
            ));
        }
        Ok(())
    }

    fn check_callback_mode(&self, operation: &'static str) -> AudioStreamResult<()> {
        let mode = self.mode();
        if mode != StreamMode::Callback {
            return Err(AudioStreamError::incorrect_mode(operation, mode));
        }
        Ok(())
    }

    /// Compute and push the effective volume to the backend.
    pub(crate) fn apply_volume(&self) -> AudioStreamResult<()> {
        let volume = *self.volume.lock();
        let stream_type = *self.stream_type.read();
        let effective = if self.policy.is_muted(stream_type)? {
            0.0
        } else {
            self.policy.volume_curve(stream_type, volume)?
        };
        self.transport.lock().set_volume(effective)
    }

    pub(crate) fn frame_size(&self) -> usize {
        let params = *self.params.read();
        params.map_or(1, |p| p.frame_size()).max(1)
    }

    pub(crate) fn get_buffer_desc(&self) -> AudioStreamResult<BufferDesc> {
        self.check_callback_mode("get_buffer_desc")?;
        self.check_faulted()?;
        let queue = self.configured_queue("get_buffer_desc")?;
        let from_filled = self.direction == Direction::Capture;
        queue
            .checkout(from_filled)
            .ok_or_else(|| AudioStreamError::operation_failed("no buffer available"))
    }

    pub(crate) fn enqueue(&self, desc: BufferDesc) -> AudioStreamResult<()> {
        self.check_callback_mode("enqueue")?;
        if desc.is_null() {
            return Err(AudioStreamError::invalid_param("desc", "null buffer"));
        }
        let state = self.state();
        let queue = self
            .queue()
            .filter(|_| state.is_configured())
            .ok_or_else(|| AudioStreamError::illegal_state("enqueue", state))?;

        // Render slots go to the worker, capture slots back to the free queue
        let to_filled = self.direction == Direction::Render;
        let frames = (desc.data_length() / self.frame_size()) as u64;
        queue.checkin(desc, to_filled)?;
        queue.advance_client(frames);
        Ok(())
    }

    pub(crate) fn clear(&self) -> AudioStreamResult<()> {
        self.check_callback_mode("clear")?;
        let queue = self.configured_queue("clear")?;
        let dropped = queue.flush();
        let reclaimed = queue.reclaim_client();
        if reclaimed > 0 {
            warn!(stream_id = self.session_id, slots = reclaimed, "reclaimed descriptors never enqueued");
        }
        debug!(stream_id = self.session_id, slots = dropped, "buffer queue cleared");
        Ok(())
    }

    pub(crate) fn buf_queue_state(&self) -> AudioStreamResult<BufQueueState> {
        Ok(self.configured_queue("get_buf_queue_state")?.state())
    }

    /// Emit events for fired position callbacks.
    pub(crate) fn publish_positions(&self, fired: Vec<PositionEvent>) {
        for event in fired {
            let event = match event {
                PositionEvent::Mark(frame) => StreamEvent::MarkReached { frame },
                PositionEvent::Period(frame) => StreamEvent::PeriodReached { frame },
            };
            self.events.emit(event);
        }
    }

    /// Backend failure: stop the stream for good.
    pub(crate) fn fault(&self, err: AudioStreamError) {
        let backend = self.transport.lock().name().to_string();
        error!(
            stream_id = self.session_id,
            backend = %backend,
            error = %err,
            "backend failure, stopping stream"
        );
        self.metrics.lock().record_error(&err);
        self.faulted.store(true, Ordering::Release);
        self.events.emit(StreamEvent::BackendFailed {
            error: err.to_string(),
        });
        if let Some(queue) = self.queue() {
            queue.close();
        }

        let moved = {
            let mut state = self.state.lock();
            if matches!(*state, StreamState::Running | StreamState::Paused) {
                *state = StreamState::Stopped;
                true
            } else {
                false
            }
        };
        if moved {
            debug!(stream_id = self.session_id, to = %StreamState::Stopped, "faulted stream stopped");
            self.notify_state(StreamState::Stopped);
        }
    }
}
