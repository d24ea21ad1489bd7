//! Buffer pool and queue for stream data.
//!
//! A stream owns one [`BufferQueue`] built over a fixed [`BufferPool`]. The
//! application side fills (render) or drains (capture) slots, the I/O
//! worker does the opposite, and slots move between the two through the
//! free and filled queues.

mod desc;
mod pool;
mod queue;

pub use desc::{BufQueueState, BufferDesc, SlotAccounting};
pub use pool::BufferPool;
pub use queue::{BufferQueue, Holder, Wait};

pub(crate) use desc::Slot;

#[cfg(test)]
mod tests;
