//! I/O worker threads.
//!
//! One worker runs per started stream. The render worker is the only
//! consumer of the filled queue and the capture worker the only producer,
//! so the application side never contends with more than one thread.
//!
//! The worker exits when its stop token is set. [`IoWorker::stop`] sets the
//! token, wakes any queue wait and joins before returning.

use crate::buffer::{BufferQueue, Holder, Slot, Wait};
use crate::event::StreamEvent;
use crate::info::{Direction, StreamMode};
use crate::stream::StreamShared;
use crate::error::{AudioStreamError, AudioStreamResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Handle to a running I/O thread.
pub(crate) struct IoWorker {
    stop: Arc<AtomicBool>,
    queue: Arc<BufferQueue>,
    handle: Option<JoinHandle<()>>,
}

impl IoWorker {
    pub(crate) fn spawn(
        shared: Arc<StreamShared>,
        queue: Arc<BufferQueue>,
    ) -> AudioStreamResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let name = format!("{}-io-{}", shared.direction, shared.session_id);

        let handle = {
            let stop = Arc::clone(&stop);
            let queue = Arc::clone(&queue);
            thread::Builder::new()
                .name(name)
                .spawn(move || match shared.direction {
                    Direction::Render => render_loop(&shared, &queue, &stop),
                    Direction::Capture => capture_loop(&shared, &queue, &stop),
                })
                .map_err(|e| {
                    AudioStreamError::operation_failed(format!("failed to spawn I/O thread: {e}"))
                })?
        };

        Ok(Self {
            stop,
            queue,
            handle: Some(handle),
        })
    }

    /// Request cancellation and join.
    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.queue.notify();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("I/O worker panicked");
            }
        }
    }
}

impl Drop for IoWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render_loop(shared: &StreamShared, queue: &BufferQueue, stop: &AtomicBool) {
    let frame_size = shared.frame_size();
    let poll = shared.config.worker_poll_interval;
    let buffer_size = queue.pool().buffer_size();
    let mut starved = false;

    info!(stream_id = shared.session_id, "render worker started");

    while !stop.load(Ordering::Acquire) {
        if shared.mode() == StreamMode::Callback
            && queue.has_free()
            && !queue.has_client_checkout()
        {
            let callback = shared.write_callback.read().clone();
            if let Some(cb) = callback {
                cb.on_write_data(buffer_size);
            }
        }

        let Some(slot) = queue.pop_filled(Holder::Worker, Wait::Timeout(poll)) else {
            if !starved && queue.transferred_frames() > 0 && !stop.load(Ordering::Acquire) {
                starved = true;
                let position = queue.transferred_frames();
                shared.metrics.lock().underruns += 1;
                warn!(stream_id = shared.session_id, position, "render underrun");
                shared.events.emit(StreamEvent::Underrun { position });
            }
            continue;
        };
        starved = false;

        let delivered = match deliver(shared, &slot, stop) {
            Ok(n) => n,
            Err(err) => {
                release_slot(queue, slot);
                shared.fault(err);
                break;
            }
        };
        release_slot(queue, slot);

        let position = queue.advance_transferred((delivered / frame_size) as u64);
        let fired = shared.dispatcher.poll(position);
        shared.publish_positions(fired);
    }

    debug!(stream_id = shared.session_id, "render worker exiting");
}

/// Write one slot to the sink, retrying partial writes.
fn deliver(shared: &StreamShared, slot: &Slot, stop: &AtomicBool) -> AudioStreamResult<usize> {
    let data = slot.filled();
    let mut offset = 0;
    while offset < data.len() {
        let written = shared.transport.lock().write_frame(&data[offset..])?;
        if written == 0 {
            if stop.load(Ordering::Acquire) {
                debug!(
                    stream_id = shared.session_id,
                    dropped = data.len() - offset,
                    "sink stalled during stop"
                );
                break;
            }
            thread::sleep(shared.config.worker_poll_interval);
            continue;
        }
        offset += written;
    }
    Ok(offset)
}

fn release_slot(queue: &BufferQueue, slot: Slot) {
    if let Err(e) = queue.push_free(slot, Holder::Worker) {
        error!(error = %e, "worker returned a slot it did not hold");
    }
}

fn capture_loop(shared: &StreamShared, queue: &BufferQueue, stop: &AtomicBool) {
    let frame_size = shared.frame_size();
    let poll = shared.config.worker_poll_interval;

    info!(stream_id = shared.session_id, "capture worker started");

    while !stop.load(Ordering::Acquire) {
        let Some(mut slot) = take_capture_slot(shared, queue, poll) else {
            continue;
        };

        let read = shared.transport.lock().read_frame(&mut slot.data[..]);
        let n = match read {
            Ok(n) => n.min(slot.capacity()),
            Err(err) => {
                release_slot(queue, slot);
                shared.fault(err);
                break;
            }
        };
        if n == 0 {
            release_slot(queue, slot);
            thread::sleep(poll);
            continue;
        }
        slot.len = n;
        if let Err(e) = queue.push_filled(slot, Holder::Worker) {
            error!(error = %e, "worker returned a slot it did not hold");
        }

        let position = queue.advance_transferred((n / frame_size) as u64);
        let fired = shared.dispatcher.poll(position);
        shared.publish_positions(fired);

        if shared.mode() == StreamMode::Callback {
            let callback = shared.read_callback.read().clone();
            if let Some(cb) = callback {
                cb.on_read_data(n);
            }
        }
    }

    debug!(stream_id = shared.session_id, "capture worker exiting");
}

/// A free slot, or the oldest unread one when the application is behind.
fn take_capture_slot(
    shared: &StreamShared,
    queue: &BufferQueue,
    poll: std::time::Duration,
) -> Option<Slot> {
    if let Some(slot) = queue.pop_free(Holder::Worker, Wait::NonBlocking) {
        return Some(slot);
    }
    if let Some(mut slot) = queue.pop_filled(Holder::Worker, Wait::NonBlocking) {
        let dropped_bytes = slot.len;
        slot.len = 0;
        shared.metrics.lock().overruns += 1;
        warn!(stream_id = shared.session_id, dropped_bytes, "capture overrun");
        shared.events.emit(StreamEvent::Overrun { dropped_bytes });
        return Some(slot);
    }
    // Every slot is checked out by the application
    queue.pop_free(Holder::Worker, Wait::Timeout(poll))
}
