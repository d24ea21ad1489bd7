//! Direction-generic stream core.
//!
//! [`AudioStream`] owns the lifecycle state, the buffer queue and at most one
//! I/O worker. [`AudioRenderer`](crate::AudioRenderer) and
//! [`AudioCapturer`](crate::AudioCapturer) are thin facades over it.
//!
//! Control operations (`set_params`, `start`, `pause`, `stop`, `flush`,
//! `release`) are serialized against each other. Data operations (`write`,
//! `read`, descriptor exchange) only take the queue lock, and blocking ones
//! are woken by any operation that leaves RUNNING.
//!
//! `stop` and `release` join the I/O worker, so they must not be called
//! from a callback the worker is running.

mod shared;

#[cfg(test)]
mod tests;

pub(crate) use shared::{StreamShared, Transport};

use crate::backend::PolicyClient;
use crate::buffer::{BufQueueState, BufferDesc, BufferPool, BufferQueue, Holder, SlotAccounting, Wait};
use crate::config::{StreamConfig, validate_buffer_duration};
use crate::error::{AudioStreamError, AudioStreamResult, ErrorMetrics};
use crate::event::{EventBus, StreamEvent};
use crate::info::{AudioStreamParams, AudioStreamType, Direction, RenderRate, StreamMode};
use crate::position::{PeriodPositionCallback, PositionCallback, PositionDispatcher};
use crate::state::{StreamOperation, StreamState, StreamStateCallback};
use crate::timestamp::{Clock, Timestamp, TimestampBase, TimestampTracker};
use crate::worker::IoWorker;
use crossbeam::channel::Receiver;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// Everything a stream needs from outside at construction.
pub(crate) struct StreamBackends {
    pub(crate) transport: Transport,
    pub(crate) policy: Arc<dyn PolicyClient>,
    pub(crate) clock: Arc<dyn Clock>,
}

/// Lifecycle, buffering and worker management shared by both directions.
pub struct AudioStream {
    shared: Arc<StreamShared>,
    worker: Mutex<Option<IoWorker>>,
    control: Mutex<()>,
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("session_id", &self.shared.session_id)
            .field("direction", &self.shared.direction)
            .field("state", &self.shared.state())
            .field("mode", &self.shared.mode())
            .finish_non_exhaustive()
    }
}

impl AudioStream {
    pub(crate) fn new(
        direction: Direction,
        backends: StreamBackends,
        config: StreamConfig,
    ) -> AudioStreamResult<Self> {
        config.validate()?;
        let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let shared = StreamShared {
            session_id,
            direction,
            state: Mutex::new(StreamState::New),
            mode: RwLock::new(StreamMode::Normal),
            params: RwLock::new(None),
            buffer_duration: RwLock::new(config.buffer_duration),
            queue: RwLock::new(None),
            transport: Mutex::new(backends.transport),
            policy: backends.policy,
            stream_type: RwLock::new(AudioStreamType::Music),
            dispatcher: PositionDispatcher::new(),
            tracker: TimestampTracker::new(backends.clock),
            events: EventBus::new(config.event_capacity),
            metrics: Mutex::new(ErrorMetrics::default()),
            faulted: AtomicBool::new(false),
            volume: Mutex::new(1.0),
            render_rate: Mutex::new(RenderRate::Normal),
            state_callback: RwLock::new(None),
            write_callback: RwLock::new(None),
            read_callback: RwLock::new(None),
            config,
        };
        debug!(stream_id = session_id, %direction, "stream created");
        Ok(Self {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
            control: Mutex::new(()),
        })
    }

    pub(crate) fn shared(&self) -> &Arc<StreamShared> {
        &self.shared
    }

    /// Check `op` against the current state, returning the state it leads to.
    fn begin(&self, op: StreamOperation) -> AudioStreamResult<(StreamState, StreamState)> {
        let state = self.shared.state();
        if op != StreamOperation::Release {
            self.shared.check_faulted()?;
        }
        match state.transition(op) {
            Some(next) => Ok((state, next)),
            None => {
                warn!(
                    stream_id = self.shared.session_id,
                    operation = op.name(),
                    %state,
                    "rejected transition"
                );
                Err(AudioStreamError::illegal_state(op.name(), state))
            }
        }
    }

    fn stop_worker(&self) {
        if let Some(mut worker) = self.worker.lock().take() {
            worker.stop();
            info!(stream_id = self.shared.session_id, "I/O worker stopped");
        }
    }

    /// Fault into STOPPED if the backend refused to park after the worker
    /// was joined.
    fn settle_backend(&self, operation: &'static str, result: AudioStreamResult<()>) -> AudioStreamResult<()> {
        result.inspect_err(|e| {
            debug!(stream_id = self.shared.session_id, operation, "backend refused control call");
            self.shared.fault(e.clone());
        })
    }

    /// Current lifecycle state
    pub fn status(&self) -> StreamState {
        self.shared.state()
    }

    /// Process-unique session id.
    pub fn session_id(&self) -> AudioStreamResult<u32> {
        self.ensure_not_released("get_audio_session_id")?;
        Ok(self.shared.session_id)
    }

    fn ensure_not_released(&self, operation: &'static str) -> AudioStreamResult<()> {
        let state = self.shared.state();
        if state.is_terminal() {
            return Err(AudioStreamError::operation_failed(format!(
                "{operation}: stream is {state}"
            )));
        }
        Ok(())
    }

    fn ensure_mutable(&self, operation: &'static str) -> AudioStreamResult<StreamState> {
        let state = self.shared.state();
        if state.is_terminal() {
            return Err(AudioStreamError::illegal_state(operation, state));
        }
        Ok(state)
    }

    pub(crate) fn set_stream_type(&self, stream_type: AudioStreamType) {
        *self.shared.stream_type.write() = stream_type;
    }

    /// Stream type used for routing and volume policy
    pub fn stream_type(&self) -> AudioStreamResult<AudioStreamType> {
        self.ensure_not_released("get_stream_type")?;
        Ok(*self.shared.stream_type.read())
    }

    /// Fix the PCM layout, open the backend port and allocate buffers.
    pub fn set_params(&self, params: AudioStreamParams) -> AudioStreamResult<()> {
        let _control = self.control.lock();
        let (_, next) = self.begin(StreamOperation::SetParams)?;
        params.validate()?;

        let duration = *self.shared.buffer_duration.read();
        let pool = BufferPool::new(&params, duration, self.shared.config.buffer_count)?;
        let stream_type = *self.shared.stream_type.read();
        let device = self
            .shared
            .policy
            .resolve_device(self.shared.direction, stream_type)?;
        self.shared.transport.lock().open_port(&params, &device)?;

        *self.shared.params.write() = Some(params);
        *self.shared.queue.write() = Some(Arc::new(BufferQueue::new(pool)));
        self.shared.apply_volume()?;
        let rate = *self.shared.render_rate.lock();
        self.shared.transport.lock().set_render_rate(rate)?;

        info!(
            stream_id = self.shared.session_id,
            device = %device,
            rate = params.sampling_rate.hz(),
            channels = params.channels.count(),
            buffer_size = pool.buffer_size(),
            "stream configured"
        );
        self.shared.set_state(next);
        Ok(())
    }

    /// Parameters captured by `set_params`.
    pub fn params(&self) -> AudioStreamResult<AudioStreamParams> {
        self.shared.configured_params("get_params")
    }

    /// Start or resume the I/O worker.
    pub fn start(&self) -> AudioStreamResult<()> {
        let _control = self.control.lock();
        let (prev, next) = self.begin(StreamOperation::Start)?;
        let queue = self.shared.configured_queue("start")?;
        let params = self.shared.configured_params("start")?;

        queue.open();
        let started = {
            let mut transport = self.shared.transport.lock();
            if prev == StreamState::Paused {
                transport.resume()
            } else {
                transport.start()
            }
        };
        if let Err(e) = started {
            queue.close();
            return Err(e);
        }

        self.shared
            .tracker
            .on_start(queue.transferred_frames(), params.sampling_rate.hz());

        let worker = match IoWorker::spawn(Arc::clone(&self.shared), Arc::clone(&queue)) {
            Ok(worker) => worker,
            Err(e) => {
                queue.close();
                let _ = self.shared.transport.lock().stop();
                return Err(e);
            }
        };
        *self.worker.lock() = Some(worker);
        info!(stream_id = self.shared.session_id, from = %prev, "I/O worker started");
        self.shared.set_state(next);
        Ok(())
    }

    /// Park the worker, keeping queued data.
    pub fn pause(&self) -> AudioStreamResult<()> {
        let _control = self.control.lock();
        let (_, next) = self.begin(StreamOperation::Pause)?;
        if let Some(queue) = self.shared.queue() {
            queue.close();
        }
        self.stop_worker();
        let paused = self.shared.transport.lock().pause();
        self.settle_backend("pause", paused)?;
        self.shared.set_state(next);
        Ok(())
    }

    /// Join the worker and stop the backend, keeping queued data.
    pub fn stop(&self) -> AudioStreamResult<()> {
        let _control = self.control.lock();
        let (_, next) = self.begin(StreamOperation::Stop)?;
        if let Some(queue) = self.shared.queue() {
            queue.close();
        }
        self.stop_worker();
        let stopped = self.shared.transport.lock().stop();
        self.settle_backend("stop", stopped)?;
        self.shared.set_state(next);
        Ok(())
    }

    /// Discard queued data and restart the position counters.
    ///
    /// Legal in RUNNING, PAUSED and STOPPED. Timestamps taken after a flush
    /// may jump.
    pub fn flush(&self) -> AudioStreamResult<()> {
        let _control = self.control.lock();
        self.begin(StreamOperation::Flush)?;
        let queue = self.shared.configured_queue("flush")?;
        let dropped = queue.flush();
        queue.reset_counters();
        self.shared.dispatcher.rebase();
        self.shared.tracker.on_flush();
        debug!(stream_id = self.shared.session_id, slots = dropped, "stream flushed");
        Ok(())
    }

    /// Block until every queued buffer has reached the backend.
    ///
    /// Fails if the stream leaves RUNNING while waiting.
    pub fn drain(&self) -> AudioStreamResult<()> {
        let queue = {
            let _control = self.control.lock();
            self.begin(StreamOperation::Drain)?;
            self.shared.configured_queue("drain")?
        };
        if self.shared.direction == Direction::Render && !queue.wait_drained() {
            self.shared.check_faulted()?;
            return Err(AudioStreamError::illegal_state("drain", self.shared.state()));
        }
        self.shared.transport.lock().drain()?;
        debug!(stream_id = self.shared.session_id, "stream drained");
        Ok(())
    }

    /// Tear down the worker, backend port and buffers. Terminal.
    pub fn release(&self) -> AudioStreamResult<()> {
        let _control = self.control.lock();
        let (prev, next) = self.begin(StreamOperation::Release)?;
        if let Some(queue) = self.shared.queue() {
            queue.close();
        }
        self.stop_worker();
        {
            let mut transport = self.shared.transport.lock();
            if matches!(prev, StreamState::Running | StreamState::Paused) {
                if let Err(e) = transport.stop() {
                    warn!(stream_id = self.shared.session_id, error = %e, "backend stop failed during release");
                }
            }
            transport.close();
        }
        *self.shared.queue.write() = None;
        *self.shared.write_callback.write() = None;
        *self.shared.read_callback.write() = None;
        self.shared.set_state(next);
        Ok(())
    }

    fn check_normal_io(&self, operation: &'static str) -> AudioStreamResult<Arc<BufferQueue>> {
        let mode = self.shared.mode();
        if mode != StreamMode::Normal {
            return Err(AudioStreamError::incorrect_mode(operation, mode));
        }
        self.shared.check_faulted()?;
        let state = self.shared.state();
        if !state.is_running() {
            return Err(AudioStreamError::illegal_state(operation, state));
        }
        self.shared
            .queue()
            .ok_or_else(|| AudioStreamError::illegal_state(operation, state))
    }

    fn interrupted(&self, operation: &'static str) -> AudioStreamError {
        if self.shared.is_faulted() {
            return AudioStreamError::operation_failed(format!("{operation}: backend failed"));
        }
        AudioStreamError::illegal_state(operation, self.shared.state())
    }

    /// Copy `data` into one free slot, blocking until one is available.
    ///
    /// Returns the number of bytes accepted, at most one slot's worth.
    pub(crate) fn write(&self, data: &[u8]) -> AudioStreamResult<usize> {
        if data.is_empty() {
            return Err(AudioStreamError::invalid_param("buffer", "length must be greater than zero"));
        }
        let queue = self.check_normal_io("write")?;
        let mut slot = queue
            .pop_free(Holder::Client, Wait::Blocking)
            .ok_or_else(|| self.interrupted("write"))?;
        let n = slot.fill_from(data);
        queue.push_filled(slot, Holder::Client)?;
        queue.advance_client((n / self.shared.frame_size()) as u64);
        Ok(n)
    }

    /// Write until no more than `min_write_bytes` remain.
    pub(crate) fn write_all(&self, data: &[u8]) -> AudioStreamResult<usize> {
        let min_bytes = self.shared.config.min_write_bytes;
        let mut written = 0;
        while data.len() - written > min_bytes {
            written += self.write(&data[written..])?;
        }
        Ok(written)
    }

    /// Copy up to `user_size` captured bytes into `buf`.
    pub(crate) fn read(&self, buf: &mut [u8], user_size: usize, blocking: bool) -> AudioStreamResult<usize> {
        if user_size == 0 || buf.is_empty() {
            return Err(AudioStreamError::invalid_param("buffer", "length must be greater than zero"));
        }
        if user_size > buf.len() {
            return Err(AudioStreamError::invalid_param(
                "user_size",
                format!("{user_size} exceeds buffer length {}", buf.len()),
            ));
        }
        let queue = self.check_normal_io("read")?;
        let wait = if blocking { Wait::Blocking } else { Wait::NonBlocking };
        let n = queue.read_into(&mut buf[..user_size], wait);
        if n == 0 && blocking {
            return Err(self.interrupted("read"));
        }
        queue.advance_client((n / self.shared.frame_size()) as u64);
        Ok(n)
    }

    /// Slot size in bytes
    pub fn buffer_size(&self) -> AudioStreamResult<usize> {
        Ok(self.shared.configured_queue("get_buffer_size")?.pool().buffer_size())
    }

    /// Frames per slot
    pub fn frame_count(&self) -> AudioStreamResult<usize> {
        Ok(self.shared.configured_queue("get_frame_count")?.pool().frame_count())
    }

    /// Backend latency in microseconds
    pub fn latency(&self) -> AudioStreamResult<u64> {
        self.shared.configured_params("get_latency")?;
        self.shared.transport.lock().latency()
    }

    /// Set the application volume in `0.0..=1.0`.
    pub fn set_volume(&self, volume: f32) -> AudioStreamResult<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(AudioStreamError::invalid_param(
                "volume",
                format!("{volume} outside 0.0..=1.0"),
            ));
        }
        self.ensure_mutable("set_volume")?;
        *self.shared.volume.lock() = volume;
        if self.shared.params.read().is_some() {
            self.shared.apply_volume()?;
        }
        Ok(())
    }

    /// Application volume last set
    pub fn volume(&self) -> AudioStreamResult<f32> {
        self.ensure_not_released("get_volume")?;
        Ok(*self.shared.volume.lock())
    }

    pub(crate) fn set_render_rate(&self, rate: RenderRate) -> AudioStreamResult<()> {
        let state = self.shared.state();
        if !state.is_configured() {
            return Err(AudioStreamError::illegal_state("set_render_rate", state));
        }
        *self.shared.render_rate.lock() = rate;
        self.shared.transport.lock().set_render_rate(rate)
    }

    pub(crate) fn render_rate(&self) -> AudioStreamResult<RenderRate> {
        self.ensure_not_released("get_render_rate")?;
        Ok(*self.shared.render_rate.lock())
    }

    /// Select normal or callback data exchange. Only before the worker runs.
    pub(crate) fn set_mode(&self, mode: StreamMode) -> AudioStreamResult<()> {
        let _control = self.control.lock();
        let state = self.shared.state();
        if !matches!(state, StreamState::New | StreamState::Prepared | StreamState::Stopped) {
            return Err(AudioStreamError::illegal_state("set_mode", state));
        }
        *self.shared.mode.write() = mode;
        debug!(stream_id = self.shared.session_id, %mode, "mode set");
        Ok(())
    }

    pub(crate) fn mode(&self) -> AudioStreamResult<StreamMode> {
        self.ensure_not_released("get_mode")?;
        Ok(self.shared.mode())
    }

    /// Resize slots. Only before the first start.
    pub fn set_buffer_duration(&self, ms: i64) -> AudioStreamResult<()> {
        let duration = validate_buffer_duration(ms)?;
        let _control = self.control.lock();
        let state = self.shared.state();
        match state {
            StreamState::New => {}
            StreamState::Prepared => {
                let params = self.shared.configured_params("set_buffer_duration")?;
                let queue = self.shared.configured_queue("set_buffer_duration")?;
                let pool = BufferPool::new(&params, duration, self.shared.config.buffer_count)?;
                queue.reallocate(pool)?;
            }
            _ => return Err(AudioStreamError::illegal_state("set_buffer_duration", state)),
        }
        *self.shared.buffer_duration.write() = duration;
        Ok(())
    }

    /// Slot checkout for callback mode.
    pub fn get_buffer_desc(&self) -> AudioStreamResult<BufferDesc> {
        self.shared.get_buffer_desc()
    }

    /// Return a slot taken with `get_buffer_desc`.
    pub fn enqueue(&self, desc: BufferDesc) -> AudioStreamResult<()> {
        self.shared.enqueue(desc)
    }

    /// Return every queued slot to the free queue. Callback mode only.
    pub fn clear(&self) -> AudioStreamResult<()> {
        self.shared.clear()
    }

    /// Pool size and filled count
    pub fn buf_queue_state(&self) -> AudioStreamResult<BufQueueState> {
        self.shared.buf_queue_state()
    }

    /// Where every slot is right now
    pub fn slot_accounting(&self) -> AudioStreamResult<SlotAccounting> {
        Ok(self.shared.configured_queue("slot_accounting")?.accounting())
    }

    /// A handle for callback-mode buffer exchange that does not keep the
    /// stream alive.
    pub fn buffer_handle(&self) -> BufferHandle {
        BufferHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Frames transferred across the backend boundary since start or flush.
    pub fn position(&self) -> AudioStreamResult<u64> {
        Ok(self.shared.configured_queue("get_position")?.transferred_frames())
    }

    /// Frames written or read by the application since start or flush.
    pub fn client_position(&self) -> AudioStreamResult<u64> {
        Ok(self.shared.configured_queue("get_position")?.client_frames())
    }

    /// Wall-clock time of the current position.
    ///
    /// Valid in RUNNING, PAUSED and STOPPED; frozen while not running.
    pub fn audio_time(&self, base: TimestampBase) -> AudioStreamResult<Timestamp> {
        let state = self.shared.state();
        if !state.reports_time() {
            return Err(AudioStreamError::illegal_state("get_audio_time", state));
        }
        let params = self.shared.configured_params("get_audio_time")?;
        let queue = self.shared.configured_queue("get_audio_time")?;
        self.shared
            .tracker
            .timestamp(queue.transferred_frames(), params.sampling_rate.hz(), base)
            .ok_or_else(|| AudioStreamError::operation_failed("no timestamp anchor"))
    }

    /// Register the one-shot mark callback.
    pub fn set_position_callback(
        &self,
        mark_position: i64,
        callback: Option<Arc<dyn PositionCallback>>,
    ) -> AudioStreamResult<()> {
        self.ensure_mutable("set_position_callback")?;
        self.shared.dispatcher.set_mark(mark_position, callback)
    }

    /// Remove the mark callback
    pub fn unset_position_callback(&self) {
        self.shared.dispatcher.unset_mark();
    }

    /// Register the repeating period callback.
    pub fn set_period_position_callback(
        &self,
        frame_number: i64,
        callback: Option<Arc<dyn PeriodPositionCallback>>,
    ) -> AudioStreamResult<()> {
        self.ensure_mutable("set_period_position_callback")?;
        let position = self.shared.queue().map_or(0, |q| q.transferred_frames());
        self.shared
            .dispatcher
            .set_period(frame_number, callback, position)
    }

    /// Remove the period callback
    pub fn unset_period_position_callback(&self) {
        self.shared.dispatcher.unset_period();
    }

    /// Register the lifecycle callback.
    pub fn set_state_callback(
        &self,
        callback: Option<Arc<dyn StreamStateCallback>>,
    ) -> AudioStreamResult<()> {
        self.ensure_mutable("set_state_callback")?;
        let callback =
            callback.ok_or_else(|| AudioStreamError::invalid_param("callback", "null callback"))?;
        *self.shared.state_callback.write() = Some(callback);
        Ok(())
    }

    /// Receiver for stream events.
    pub fn subscribe_events(&self) -> Receiver<StreamEvent> {
        self.shared.events.subscribe()
    }

    /// Error counters, including events dropped on a full channel
    pub fn error_metrics(&self) -> ErrorMetrics {
        let mut metrics = self.shared.metrics.lock().clone();
        metrics.dropped_events = self.shared.events.dropped();
        metrics
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        if !self.shared.state().is_terminal() {
            if let Err(e) = self.release() {
                warn!(stream_id = self.shared.session_id, error = %e, "release on drop failed");
            }
        }
    }
}

/// Weak handle for exchanging buffers from inside data callbacks.
#[derive(Debug, Clone)]
pub struct BufferHandle {
    shared: Weak<StreamShared>,
}

impl BufferHandle {
    fn upgrade(&self) -> AudioStreamResult<Arc<StreamShared>> {
        self.shared
            .upgrade()
            .ok_or_else(|| AudioStreamError::operation_failed("stream dropped"))
    }

    /// See [`AudioStream::get_buffer_desc`]
    pub fn get_buffer_desc(&self) -> AudioStreamResult<BufferDesc> {
        self.upgrade()?.get_buffer_desc()
    }

    /// See [`AudioStream::enqueue`]
    pub fn enqueue(&self, desc: BufferDesc) -> AudioStreamResult<()> {
        self.upgrade()?.enqueue(desc)
    }

    /// See [`AudioStream::clear`]
    pub fn clear(&self) -> AudioStreamResult<()> {
        self.upgrade()?.clear()
    }

    /// See [`AudioStream::buf_queue_state`]
    pub fn buf_queue_state(&self) -> AudioStreamResult<BufQueueState> {
        self.upgrade()?.buf_queue_state()
    }
}
