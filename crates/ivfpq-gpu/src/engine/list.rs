//! Storage of a single inverted list.

use crate::config::IdStorage;
use crate::device::AllocationHandle;

/// Id column of a list, shaped by the index's [`IdStorage`] mode.
#[derive(Debug)]
pub(crate) enum ListIds {
    /// `Int64` on device, or `Host` (kept host-side, same representation).
    Wide(Vec<i64>),
    /// `Int32` on device.
    Narrow(Vec<i32>),
    /// `ListOffset`: nothing stored, labels derive from position.
    Offsets,
}

impl ListIds {
    fn new(mode: IdStorage) -> Self {
        match mode {
            IdStorage::Int64 | IdStorage::Host => ListIds::Wide(Vec::new()),
            IdStorage::Int32 => ListIds::Narrow(Vec::new()),
            IdStorage::ListOffset => ListIds::Offsets,
        }
    }
}

/// Search label of an entry stored without user ids.
#[inline]
pub(crate) fn offset_label(list: usize, offset: usize) -> i64 {
    ((list as i64) << 32) | offset as i64
}

/// One inverted list: codes, ids, and the pool reservation backing them.
///
/// `capacity` is in entries; `storage` accounts for
/// `capacity * bytes_per_entry` bytes in the memory pool.
#[derive(Debug)]
pub(crate) struct InvertedList {
    codes: Vec<u8>,
    ids: ListIds,
    len: usize,
    capacity: usize,
    storage: Option<AllocationHandle>,
}

impl InvertedList {
    pub(crate) fn new(mode: IdStorage) -> Self {
        Self {
            codes: Vec::new(),
            ids: ListIds::new(mode),
            len: 0,
            capacity: 0,
            storage: None,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes reserved in the pool for this list.
    #[inline]
    pub(crate) fn reserved_bytes(&self) -> usize {
        self.storage.as_ref().map_or(0, AllocationHandle::size)
    }

    #[inline]
    pub(crate) fn codes(&self) -> &[u8] {
        &self.codes
    }

    /// Capacity after growth doubling, or `None` if `extra` entries fit.
    pub(crate) fn grown_capacity(&self, extra: usize) -> Option<usize> {
        let needed = self.len + extra;
        (needed > self.capacity).then(|| needed.max(self.capacity.saturating_mul(2)))
    }

    /// Swap in a new reservation of `capacity` entries. The previous
    /// reservation is released when its handle drops here.
    pub(crate) fn install(&mut self, capacity: usize, storage: Option<AllocationHandle>, code_size: usize) {
        debug_assert!(capacity >= self.len);
        self.capacity = capacity;
        self.storage = storage;
        self.codes.reserve_exact((capacity * code_size).saturating_sub(self.codes.len()));
    }

    /// Shrink capacity and the reservation to the current length, in place.
    /// Returns the bytes released.
    pub(crate) fn shrink_to_fit(&mut self, bytes_per_entry: usize) -> usize {
        let before = self.reserved_bytes();
        if self.len == 0 {
            self.storage = None;
        } else if let Some(handle) = self.storage.as_mut() {
            handle.shrink_to(self.len * bytes_per_entry);
        }
        self.capacity = self.len;
        self.shrink_buffers();
        before.saturating_sub(self.reserved_bytes())
    }

    /// Append one entry. The caller has already reserved capacity and
    /// range-checked `id` for the storage mode.
    pub(crate) fn push(&mut self, code: &[u8], id: i64) {
        debug_assert!(self.len < self.capacity);
        self.codes.extend_from_slice(code);
        match &mut self.ids {
            ListIds::Wide(ids) => ids.push(id),
            ListIds::Narrow(ids) => ids.push(id as i32),
            ListIds::Offsets => {}
        }
        self.len += 1;
    }

    /// Label reported by search for entry `offset`.
    #[inline]
    pub(crate) fn label(&self, list: usize, offset: usize) -> i64 {
        match &self.ids {
            ListIds::Wide(ids) => ids[offset],
            ListIds::Narrow(ids) => ids[offset] as i64,
            ListIds::Offsets => offset_label(list, offset),
        }
    }

    /// Owned copy of every entry's label.
    pub(crate) fn indices(&self, list: usize) -> Vec<i64> {
        match &self.ids {
            ListIds::Wide(ids) => ids.clone(),
            ListIds::Narrow(ids) => ids.iter().map(|&id| id as i64).collect(),
            ListIds::Offsets => (0..self.len).map(|o| offset_label(list, o)).collect(),
        }
    }

    fn shrink_buffers(&mut self) {
        self.codes.shrink_to_fit();
        match &mut self.ids {
            ListIds::Wide(ids) => ids.shrink_to_fit(),
            ListIds::Narrow(ids) => ids.shrink_to_fit(),
            ListIds::Offsets => {}
        }
    }

    /// Remove every entry and release the reservation.
    pub(crate) fn clear(&mut self) {
        self.codes = Vec::new();
        match &mut self.ids {
            ListIds::Wide(ids) => *ids = Vec::new(),
            ListIds::Narrow(ids) => *ids = Vec::new(),
            ListIds::Offsets => {}
        }
        self.len = 0;
        self.capacity = 0;
        self.storage = None;
    }
}
