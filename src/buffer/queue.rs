//! Free/filled slot queues shared by the application and the I/O worker.
//!
//! Every slot lives in exactly one of four places: the free queue, the
//! filled queue, the application's hands (a [`BufferDesc`] or an in-progress
//! `write`), or the worker's hands. Waits block on a single condition
//! variable that is notified on every move and when the gate closes.

use super::desc::{BufQueueState, BufferDesc, Slot, SlotAccounting};
use super::pool::BufferPool;
use crate::error::{AudioStreamError, AudioStreamResult};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Which side of the queue holds a checked-out slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder {
    /// Application thread or data callback
    Client,
    /// I/O worker
    Worker,
}

/// How long a queue operation may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Return immediately
    NonBlocking,
    /// Block until the condition holds or the gate closes
    Blocking,
    /// Block at most once for the given duration
    Timeout(Duration),
}

#[derive(Debug)]
struct QueueInner {
    free: VecDeque<Slot>,
    filled: VecDeque<Slot>,
    client_held: Vec<usize>,
    worker_held: usize,
    total: usize,
    open: bool,
    /// Bytes of the front filled slot already returned by `read_into`.
    read_offset: usize,
}

impl QueueInner {
    fn accounting(&self) -> SlotAccounting {
        SlotAccounting {
            free: self.free.len(),
            filled: self.filled.len(),
            checked_out: self.client_held.len() + self.worker_held,
            total: self.total,
        }
    }

    fn check_out(&mut self, slot: &Slot, holder: Holder) {
        match holder {
            Holder::Client => self.client_held.push(slot.index),
            Holder::Worker => self.worker_held += 1,
        }
    }

    fn check_in(&mut self, index: usize, holder: Holder) -> bool {
        match holder {
            Holder::Client => match self.client_held.iter().position(|&i| i == index) {
                Some(pos) => {
                    self.client_held.swap_remove(pos);
                    true
                }
                None => false,
            },
            Holder::Worker => {
                if self.worker_held == 0 {
                    return false;
                }
                self.worker_held -= 1;
                true
            }
        }
    }

    fn is_drained(&self) -> bool {
        self.filled.is_empty() && self.worker_held == 0
    }
}

/// Queue pair over a [`BufferPool`].
#[derive(Debug)]
pub struct BufferQueue {
    inner: Mutex<QueueInner>,
    changed: Condvar,
    pool: Mutex<BufferPool>,
    /// Frames moved across the backend boundary.
    transferred_frames: AtomicU64,
    /// Frames handed in or taken out by the application.
    client_frames: AtomicU64,
}

impl BufferQueue {
    /// Allocate every slot of `pool` into the free queue. The gate starts closed.
    pub fn new(pool: BufferPool) -> Self {
        let free = pool.allocate();
        Self {
            inner: Mutex::new(QueueInner {
                total: free.len(),
                free,
                filled: VecDeque::new(),
                client_held: Vec::new(),
                worker_held: 0,
                open: false,
                read_offset: 0,
            }),
            changed: Condvar::new(),
            pool: Mutex::new(pool),
            transferred_frames: AtomicU64::new(0),
            client_frames: AtomicU64::new(0),
        }
    }

    /// Current pool layout
    pub fn pool(&self) -> BufferPool {
        *self.pool.lock()
    }

    /// Replace every slot with a freshly sized set.
    ///
    /// Fails while any slot is checked out.
    pub fn reallocate(&self, pool: BufferPool) -> AudioStreamResult<()> {
        let mut inner = self.inner.lock();
        if !inner.client_held.is_empty() || inner.worker_held > 0 {
            return Err(AudioStreamError::operation_failed(
                "cannot resize pool while buffers are checked out",
            ));
        }
        inner.free = pool.allocate();
        inner.filled.clear();
        inner.total = inner.free.len();
        inner.read_offset = 0;
        *self.pool.lock() = pool;
        drop(inner);
        self.changed.notify_all();
        Ok(())
    }

    /// Let blocking waits proceed.
    pub fn open(&self) {
        self.inner.lock().open = true;
    }

    /// Wake every blocked waiter and make new blocking waits fail fast.
    pub fn close(&self) {
        self.inner.lock().open = false;
        self.changed.notify_all();
    }

    /// Check if the gate is open
    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    /// Wake waiters without changing the gate.
    pub fn notify(&self) {
        self.changed.notify_all();
    }

    fn wait_until<F>(&self, inner: &mut MutexGuard<'_, QueueInner>, wait: Wait, ready: F) -> bool
    where
        F: Fn(&QueueInner) -> bool,
    {
        match wait {
            Wait::NonBlocking => ready(inner),
            Wait::Timeout(timeout) => {
                if !ready(inner) {
                    let deadline = Instant::now() + timeout;
                    let _ = self.changed.wait_until(inner, deadline);
                }
                ready(inner)
            }
            Wait::Blocking => {
                while !ready(inner) {
                    if !inner.open {
                        return false;
                    }
                    self.changed.wait(inner);
                }
                true
            }
        }
    }

    /// Take the oldest free slot.
    pub(crate) fn pop_free(&self, holder: Holder, wait: Wait) -> Option<Slot> {
        let mut inner = self.inner.lock();
        if !self.wait_until(&mut inner, wait, |q| !q.free.is_empty()) {
            return None;
        }
        let mut slot = inner.free.pop_front()?;
        slot.len = 0;
        inner.check_out(&slot, holder);
        Some(slot)
    }

    /// Take the oldest filled slot.
    pub(crate) fn pop_filled(&self, holder: Holder, wait: Wait) -> Option<Slot> {
        let mut inner = self.inner.lock();
        if !self.wait_until(&mut inner, wait, |q| !q.filled.is_empty()) {
            return None;
        }
        let slot = inner.filled.pop_front()?;
        inner.read_offset = 0;
        inner.check_out(&slot, holder);
        Some(slot)
    }

    /// Queue a checked-out slot as filled.
    pub(crate) fn push_filled(&self, slot: Slot, holder: Holder) -> AudioStreamResult<()> {
        self.check_in(slot, holder, true)
    }

    /// Return a checked-out slot to the free queue.
    pub(crate) fn push_free(&self, slot: Slot, holder: Holder) -> AudioStreamResult<()> {
        self.check_in(slot, holder, false)
    }

    fn check_in(&self, slot: Slot, holder: Holder, filled: bool) -> AudioStreamResult<()> {
        let mut inner = self.inner.lock();
        if !inner.check_in(slot.index, holder) {
            return Err(AudioStreamError::invalid_param(
                "desc",
                format!("slot {} is not checked out", slot.index),
            ));
        }
        if filled {
            inner.filled.push_back(slot);
        } else {
            inner.free.push_back(slot);
        }
        drop(inner);
        self.changed.notify_all();
        Ok(())
    }

    /// Hand a slot to the application as a descriptor.
    pub fn checkout(&self, from_filled: bool) -> Option<BufferDesc> {
        let slot = if from_filled {
            self.pop_filled(Holder::Client, Wait::NonBlocking)
        } else {
            self.pop_free(Holder::Client, Wait::NonBlocking)
        };
        slot.map(BufferDesc::from_slot)
    }

    /// Take back a descriptor, queueing it as filled or free.
    pub fn checkin(&self, desc: BufferDesc, to_filled: bool) -> AudioStreamResult<()> {
        let slot = desc
            .into_slot()
            .ok_or_else(|| AudioStreamError::invalid_param("desc", "null buffer"))?;
        if slot.len > slot.capacity() {
            return Err(AudioStreamError::invalid_param(
                "data_length",
                "exceeds slot capacity",
            ));
        }
        if to_filled && slot.len > 0 {
            self.push_filled(slot, Holder::Client)
        } else {
            self.push_free(slot, Holder::Client)
        }
    }

    /// Copy captured bytes into `out`, releasing slots as they empty.
    ///
    /// Blocking reads keep going until `out` is full or the gate closes.
    pub fn read_into(&self, out: &mut [u8], wait: Wait) -> usize {
        let mut copied = 0;
        let mut inner = self.inner.lock();
        while copied < out.len() {
            if !self.wait_until(&mut inner, wait, |q| !q.filled.is_empty()) {
                break;
            }
            let offset = inner.read_offset;
            let Some(front) = inner.filled.front() else {
                break;
            };
            let available = &front.filled()[offset..];
            let n = available.len().min(out.len() - copied);
            out[copied..copied + n].copy_from_slice(&available[..n]);
            copied += n;

            if offset + n >= front.len {
                if let Some(slot) = inner.filled.pop_front() {
                    inner.free.push_back(slot);
                }
                inner.read_offset = 0;
                self.changed.notify_all();
            } else {
                inner.read_offset = offset + n;
            }
        }
        copied
    }

    /// Block until nothing is queued or in flight on the worker side.
    ///
    /// Returns `false` if the gate closed first.
    pub fn wait_drained(&self) -> bool {
        let mut inner = self.inner.lock();
        while !inner.is_drained() {
            if !inner.open {
                return false;
            }
            self.changed.wait(&mut inner);
        }
        true
    }

    /// Return every filled slot to the free queue, returning how many moved.
    pub fn flush(&self) -> usize {
        let mut inner = self.inner.lock();
        let moved = inner.filled.len();
        while let Some(mut slot) = inner.filled.pop_front() {
            slot.len = 0;
            inner.free.push_back(slot);
        }
        inner.read_offset = 0;
        drop(inner);
        self.changed.notify_all();
        moved
    }

    /// Take back every slot checked out to the application, returning how
    /// many were reclaimed.
    ///
    /// Storage of a descriptor that was dropped instead of enqueued is gone
    /// with it, so reclaimed slots get fresh storage. A descriptor still
    /// alive after this is stale and `checkin` rejects it.
    pub fn reclaim_client(&self) -> usize {
        let capacity = self.pool.lock().buffer_size();
        let mut inner = self.inner.lock();
        let held = std::mem::take(&mut inner.client_held);
        for &index in &held {
            inner.free.push_back(Slot::new(index, capacity));
        }
        drop(inner);
        if !held.is_empty() {
            self.changed.notify_all();
        }
        held.len()
    }

    /// Where every slot currently is
    pub fn accounting(&self) -> SlotAccounting {
        self.inner.lock().accounting()
    }

    /// Total slots and filled count
    pub fn state(&self) -> BufQueueState {
        let inner = self.inner.lock();
        BufQueueState {
            num_buffers: inner.total,
            current_index: inner.filled.len(),
        }
    }

    /// Check if the application holds any descriptor
    pub fn has_client_checkout(&self) -> bool {
        !self.inner.lock().client_held.is_empty()
    }

    /// Check if a free slot is waiting
    pub fn has_free(&self) -> bool {
        !self.inner.lock().free.is_empty()
    }

    /// Bytes queued but not yet consumed
    pub fn queued_bytes(&self) -> usize {
        let inner = self.inner.lock();
        inner.filled.iter().map(|s| s.len).sum::<usize>() - inner.read_offset
    }

    /// Frames moved across the backend boundary
    pub fn transferred_frames(&self) -> u64 {
        self.transferred_frames.load(Ordering::Acquire)
    }

    /// Frames submitted or consumed by the application
    pub fn client_frames(&self) -> u64 {
        self.client_frames.load(Ordering::Acquire)
    }

    /// Advance the backend-side counter, returning the new total.
    pub fn advance_transferred(&self, frames: u64) -> u64 {
        self.transferred_frames.fetch_add(frames, Ordering::AcqRel) + frames
    }

    /// Advance the application-side counter, returning the new total.
    pub fn advance_client(&self, frames: u64) -> u64 {
        self.client_frames.fetch_add(frames, Ordering::AcqRel) + frames
    }

    /// Zero both frame counters.
    pub fn reset_counters(&self) {
        self.transferred_frames.store(0, Ordering::Release);
        self.client_frames.store(0, Ordering::Release);
    }
}
