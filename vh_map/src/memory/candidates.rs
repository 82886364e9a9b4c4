//! Dense per-frame list of candidate entries.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use vh_core::{pack_block_key, unpack_block_key, VACANT_KEY};

use crate::memory::directory::{HashEntry, FREE_ENTRY, NONE};

struct CandidateSlot {
    key: AtomicU64,
    ptr: AtomicU32,
    next: AtomicU32,
}

/// Output buffer of the candidate compactor.
///
/// Writers reserve a slot with one `fetch_add` on the counter and fill it.
/// Readers run after the writing pass has joined.
pub struct CandidateEntries {
    slots: Box<[CandidateSlot]>,
    counter: AtomicU32,
}

impl CandidateEntries {
    /// Create a buffer with room for `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity)
                .map(|_| CandidateSlot {
                    key: AtomicU64::new(VACANT_KEY),
                    ptr: AtomicU32::new(FREE_ENTRY),
                    next: AtomicU32::new(NONE),
                })
                .collect(),
            counter: AtomicU32::new(0),
        }
    }

    /// Maximum number of entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Append an entry. Returns false once the buffer is full.
    pub fn push(&self, entry: HashEntry) -> bool {
        let Ok(key) = pack_block_key(entry.pos) else {
            return false;
        };
        let i = self.counter.fetch_add(1, Ordering::Relaxed) as usize;
        let Some(slot) = self.slots.get(i) else {
            return false;
        };
        slot.key.store(key, Ordering::Relaxed);
        slot.ptr.store(entry.ptr, Ordering::Relaxed);
        slot.next.store(entry.next, Ordering::Relaxed);
        true
    }

    /// Number of entries written.
    #[inline]
    pub fn count(&self) -> usize {
        (self.counter.load(Ordering::Relaxed) as usize).min(self.slots.len())
    }

    /// Pushes rejected because the buffer was full.
    #[inline]
    pub fn dropped(&self) -> usize {
        (self.counter.load(Ordering::Relaxed) as usize).saturating_sub(self.slots.len())
    }

    /// True if no entry is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Forget all entries. Slot contents are overwritten by the next pass.
    #[inline]
    pub fn reset_count(&mut self) {
        *self.counter.get_mut() = 0;
    }

    /// Entry `i`, for `i < count()`.
    pub fn get(&self, i: usize) -> Option<HashEntry> {
        if i >= self.count() {
            return None;
        }
        let slot = &self.slots[i];
        Some(HashEntry {
            pos: unpack_block_key(slot.key.load(Ordering::Relaxed)),
            ptr: slot.ptr.load(Ordering::Relaxed),
            next: slot.next.load(Ordering::Relaxed),
        })
    }

    /// Iterate over the stored entries.
    pub fn iter(&self) -> impl Iterator<Item = HashEntry> + '_ {
        (0..self.count()).filter_map(move |i| self.get(i))
    }

    /// Copy the stored entries out.
    pub fn to_vec(&self) -> Vec<HashEntry> {
        self.iter().collect()
    }
}
