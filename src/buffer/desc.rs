//! Checkout tokens for buffer slots.

use crate::error::{AudioStreamError, AudioStreamResult};

/// One pool slot: fixed-capacity storage plus the number of valid bytes.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) index: usize,
    pub(crate) data: Box<[u8]>,
    pub(crate) len: usize,
}

impl Slot {
    pub(crate) fn new(index: usize, capacity: usize) -> Self {
        Self {
            index,
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Copy as much of `src` as fits, returning the byte count taken.
    pub(crate) fn fill_from(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.capacity());
        self.data[..n].copy_from_slice(&src[..n]);
        self.len = n;
        n
    }

    pub(crate) fn filled(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

/// A buffer slot checked out to the application in callback mode.
///
/// The descriptor owns the slot until it is handed back through
/// `enqueue`, so exactly one party can touch the bytes at a time. A
/// default-constructed descriptor is the null descriptor and is rejected
/// by `enqueue`.
#[derive(Debug, Default)]
pub struct BufferDesc {
    slot: Option<Slot>,
}

impl BufferDesc {
    pub(crate) fn from_slot(slot: Slot) -> Self {
        Self { slot: Some(slot) }
    }

    pub(crate) fn into_slot(self) -> Option<Slot> {
        self.slot
    }

    /// Check if this is the null descriptor
    pub fn is_null(&self) -> bool {
        self.slot.is_none()
    }

    /// Pool index of the slot, if any
    pub fn slot_index(&self) -> Option<usize> {
        self.slot.as_ref().map(|s| s.index)
    }

    /// Full slot storage.
    pub fn buffer(&self) -> &[u8] {
        self.slot.as_ref().map_or(&[], |s| &s.data[..])
    }

    /// Full slot storage, writable. Empty for the null descriptor.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        match self.slot.as_mut() {
            Some(slot) => &mut slot.data[..],
            None => &mut [],
        }
    }

    /// Slot capacity in bytes
    pub fn buf_length(&self) -> usize {
        self.slot.as_ref().map_or(0, Slot::capacity)
    }

    /// Number of valid bytes
    pub fn data_length(&self) -> usize {
        self.slot.as_ref().map_or(0, |s| s.len)
    }

    /// Valid bytes only.
    pub fn data(&self) -> &[u8] {
        self.slot.as_ref().map_or(&[], Slot::filled)
    }

    /// Mark how many bytes of the slot hold audio.
    pub fn set_data_length(&mut self, len: usize) -> AudioStreamResult<()> {
        let slot = self
            .slot
            .as_mut()
            .ok_or_else(|| AudioStreamError::invalid_param("desc", "null descriptor"))?;
        if len > slot.capacity() {
            return Err(AudioStreamError::invalid_param(
                "data_length",
                format!("{len} exceeds capacity {}", slot.capacity()),
            ));
        }
        slot.len = len;
        Ok(())
    }

    /// Copy `src` into the slot and set the data length, returning bytes taken.
    pub fn fill(&mut self, src: &[u8]) -> usize {
        self.slot.as_mut().map_or(0, |s| s.fill_from(src))
    }
}

/// Snapshot returned by `get_buf_queue_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufQueueState {
    /// Pool size
    pub num_buffers: usize,
    /// Slots currently queued as filled
    pub current_index: usize,
}

/// Where every pool slot currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotAccounting {
    /// Slots in the free queue
    pub free: usize,
    /// Slots in the filled queue
    pub filled: usize,
    /// Slots held by the application or the worker
    pub checked_out: usize,
    /// Pool size
    pub total: usize,
}

impl SlotAccounting {
    /// Every slot is in exactly one place
    pub fn is_conserved(&self) -> bool {
        self.free + self.filled + self.checked_out == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_descriptor() {
        let mut desc = BufferDesc::default();
        assert!(desc.is_null());
        assert_eq!(desc.buf_length(), 0);
        assert!(desc.buffer_mut().is_empty());
        assert_eq!(desc.fill(&[1, 2, 3]), 0);
        assert!(desc.set_data_length(0).is_err());
    }

    #[test]
    fn test_fill_truncates_to_capacity() {
        let mut desc = BufferDesc::from_slot(Slot::new(1, 4));
        assert_eq!(desc.fill(&[9, 8, 7, 6, 5]), 4);
        assert_eq!(desc.data(), &[9, 8, 7, 6]);
        assert_eq!(desc.slot_index(), Some(1));

        assert!(desc.set_data_length(5).is_err());
        desc.set_data_length(2).unwrap();
        assert_eq!(desc.data(), &[9, 8]);
    }
}
