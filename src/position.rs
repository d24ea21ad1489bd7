//! Mark and period position notifications.

use crate::error::{AudioStreamError, AudioStreamResult};
use parking_lot::Mutex;
use std::sync::Arc;

/// One-shot notification when playback or capture reaches a frame.
pub trait PositionCallback: Send + Sync {
    /// Called once when the frame counter first reaches the mark.
    fn on_mark_reached(&self, frame: u64);
}

/// Repeating notification every N frames.
pub trait PeriodPositionCallback: Send + Sync {
    /// Called once for each crossed multiple of the period.
    fn on_period_reached(&self, frame: u64);
}

/// A notification that fired during [`PositionDispatcher::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionEvent {
    /// Mark reached at the given frame
    Mark(u64),
    /// Period boundary crossed at the given frame
    Period(u64),
}

struct MarkEntry {
    frame: u64,
    fired: bool,
    callback: Arc<dyn PositionCallback>,
}

struct PeriodEntry {
    period: u64,
    next: u64,
    callback: Arc<dyn PeriodPositionCallback>,
}

#[derive(Default)]
struct DispatcherInner {
    mark: Option<MarkEntry>,
    period: Option<PeriodEntry>,
}

/// Holds at most one mark and one period registration.
#[derive(Default)]
pub struct PositionDispatcher {
    inner: Mutex<DispatcherInner>,
}

impl std::fmt::Debug for PositionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PositionDispatcher")
            .field("mark", &inner.mark.as_ref().map(|m| (m.frame, m.fired)))
            .field("period", &inner.period.as_ref().map(|p| (p.period, p.next)))
            .finish()
    }
}

fn positive_frames(param: &'static str, frames: i64) -> AudioStreamResult<u64> {
    if frames <= 0 {
        return Err(AudioStreamError::invalid_param(
            param,
            format!("{frames} must be greater than zero"),
        ));
    }
    Ok(frames as u64)
}

impl PositionDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the mark callback, replacing any previous one.
    pub fn set_mark(
        &self,
        mark_frame: i64,
        callback: Option<Arc<dyn PositionCallback>>,
    ) -> AudioStreamResult<()> {
        let frame = positive_frames("mark_position", mark_frame)?;
        let callback = callback
            .ok_or_else(|| AudioStreamError::invalid_param("callback", "null callback"))?;
        self.inner.lock().mark = Some(MarkEntry {
            frame,
            fired: false,
            callback,
        });
        Ok(())
    }

    /// Remove the mark callback
    pub fn unset_mark(&self) {
        self.inner.lock().mark = None;
    }

    /// Register the period callback, counting periods from `position`.
    pub fn set_period(
        &self,
        period_frames: i64,
        callback: Option<Arc<dyn PeriodPositionCallback>>,
        position: u64,
    ) -> AudioStreamResult<()> {
        let period = positive_frames("frame_number", period_frames)?;
        let callback = callback
            .ok_or_else(|| AudioStreamError::invalid_param("callback", "null callback"))?;
        self.inner.lock().period = Some(PeriodEntry {
            period,
            next: position + period,
            callback,
        });
        Ok(())
    }

    /// Remove the period callback
    pub fn unset_period(&self) {
        self.inner.lock().period = None;
    }

    /// Restart period counting from frame zero.
    pub fn rebase(&self) {
        if let Some(entry) = self.inner.lock().period.as_mut() {
            entry.next = entry.period;
        }
    }

    /// Fire every notification due at `position`.
    ///
    /// Callbacks run after the dispatcher lock is released, mark first, then
    /// each crossed period boundary in ascending order.
    pub fn poll(&self, position: u64) -> Vec<PositionEvent> {
        let mut fired = Vec::new();
        let mut mark_cb = None;
        let mut period_cb = None;

        {
            let mut inner = self.inner.lock();
            if let Some(mark) = inner.mark.as_mut() {
                if !mark.fired && position >= mark.frame {
                    mark.fired = true;
                    fired.push(PositionEvent::Mark(mark.frame));
                    mark_cb = Some(Arc::clone(&mark.callback));
                }
            }
            if let Some(entry) = inner.period.as_mut() {
                while position >= entry.next {
                    fired.push(PositionEvent::Period(entry.next));
                    entry.next += entry.period;
                }
                if fired.iter().any(|e| matches!(e, PositionEvent::Period(_))) {
                    period_cb = Some(Arc::clone(&entry.callback));
                }
            }
        }

        for event in &fired {
            match *event {
                PositionEvent::Mark(frame) => {
                    if let Some(cb) = &mark_cb {
                        cb.on_mark_reached(frame);
                    }
                }
                PositionEvent::Period(frame) => {
                    if let Some(cb) = &period_cb {
                        cb.on_period_reached(frame);
                    }
                }
            }
        }
        fired
    }
}
