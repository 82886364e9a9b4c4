//! Lock-free bucketed hash directory from block coordinates to pool indices.
//!
//! Storage is one flat array: `bucket_count * bucket_size` primary slots,
//! followed by `overflow_capacity` shared overflow slots. A bucket's overflow
//! chain hangs off the `next` field of its last primary slot, and every chain
//! stays within one bucket.
//!
//! A slot's position is stored as a packed 63-bit key, so a single
//! compare-and-swap claims a slot for one specific coordinate. Within a
//! concurrent stage slots only move from vacant to occupied; deletion takes
//! `&mut self`.

use core::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use rayon::prelude::*;
use vh_core::{bucket_index, pack_block_key, unpack_block_key, BlockCoord, VACANT_KEY};

use crate::config::MapConfig;
use crate::error::{MapError, Result};
use crate::memory::candidates::CandidateEntries;
use crate::memory::free_list::IndexStack;

/// `ptr` of a vacant slot, or of a claimed slot not yet published.
pub const FREE_ENTRY: u32 = u32::MAX;

/// `next` of the last slot in a chain.
pub const NONE: u32 = u32::MAX;

/// Snapshot of an occupied directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashEntry {
    /// Block coordinate.
    pub pos: BlockCoord,
    /// Pool index of the block.
    pub ptr: u32,
    /// Next slot in the bucket's overflow chain, or [`NONE`].
    pub next: u32,
}

/// Result of a successful [`HashDirectory::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// This call created the entry.
    Inserted {
        /// Slot now holding the entry.
        slot: u32,
    },
    /// The coordinate already had an entry (possibly created by a racer in
    /// the same stage). The caller's `ptr` was not stored.
    Duplicate {
        /// Slot holding the existing entry.
        slot: u32,
    },
}

struct Slot {
    key: AtomicU64,
    ptr: AtomicU32,
    next: AtomicU32,
}

impl Slot {
    fn vacant() -> Self {
        Self {
            key: AtomicU64::new(VACANT_KEY),
            ptr: AtomicU32::new(FREE_ENTRY),
            next: AtomicU32::new(NONE),
        }
    }
}

/// Bucketed hash table with chained overflow.
pub struct HashDirectory {
    slots: Box<[Slot]>,
    flags: Box<[AtomicU8]>,
    bucket_count: usize,
    bucket_size: usize,
    /// Free overflow slots, relative to the start of the overflow region.
    overflow: IndexStack,
    /// Per bucket: overflow nodes popped but not yet linked or recycled.
    pending: Box<[AtomicU32]>,
}

impl HashDirectory {
    /// Create an empty directory sized by `config`.
    pub fn new(config: &MapConfig) -> Self {
        let total = config.entry_count();
        Self {
            slots: (0..total).map(|_| Slot::vacant()).collect(),
            flags: (0..total).map(|_| AtomicU8::new(0)).collect(),
            bucket_count: config.bucket_count,
            bucket_size: config.bucket_size,
            overflow: IndexStack::full(config.overflow_capacity),
            pending: (0..config.bucket_count).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Number of buckets.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Primary slots per bucket.
    #[inline]
    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    /// Total slots (primary and overflow).
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn primary_len(&self) -> usize {
        self.bucket_count * self.bucket_size
    }

    /// Free overflow slots.
    #[inline]
    pub fn overflow_available(&self) -> usize {
        self.overflow.available()
    }

    /// Bucket that `pos` hashes to.
    #[inline]
    pub fn bucket_of(&self, pos: BlockCoord) -> usize {
        bucket_index(pos, self.bucket_count)
    }

    /// Slot holding the chain head pointer of `bucket`.
    #[inline]
    fn chain_anchor(&self, bucket: usize) -> usize {
        bucket * self.bucket_size + self.bucket_size - 1
    }

    /// Slot whose key equals `key`, whether or not its ptr is published yet.
    fn find_key(&self, key: u64, bucket: usize) -> Option<usize> {
        let base = bucket * self.bucket_size;
        for i in base..base + self.bucket_size {
            if self.slots[i].key.load(Ordering::Acquire) == key {
                return Some(i);
            }
        }
        let mut cur = self.slots[self.chain_anchor(bucket)]
            .next
            .load(Ordering::Acquire);
        while cur != NONE {
            let slot = &self.slots[cur as usize];
            if slot.key.load(Ordering::Acquire) == key {
                return Some(cur as usize);
            }
            cur = slot.next.load(Ordering::Acquire);
        }
        None
    }

    /// Pool index stored for `pos`.
    ///
    /// Coordinates outside the packable range are never present.
    #[inline]
    pub fn lookup(&self, pos: BlockCoord) -> Option<u32> {
        let key = pack_block_key(pos).ok()?;
        let slot = self.find_key(key, self.bucket_of(pos))?;
        match self.slots[slot].ptr.load(Ordering::Acquire) {
            FREE_ENTRY => None,
            ptr => Some(ptr),
        }
    }

    /// Like [`lookup`](Self::lookup), but a slot claimed for `pos` and not
    /// yet published is waited on instead of reported absent.
    pub fn resolve(&self, pos: BlockCoord) -> Option<u32> {
        let key = pack_block_key(pos).ok()?;
        let slot = self.find_key(key, self.bucket_of(pos))?;
        Some(self.wait_published(slot as u32))
    }

    /// Insert `pos → ptr`, at most one entry per coordinate even under
    /// concurrent racers.
    ///
    /// A racer that finds the overflow region empty while another racer is
    /// still linking `pos` gets `Duplicate`, not an error.
    ///
    /// # Errors
    /// - `DirectoryFull` when the bucket and the overflow region are full
    /// - `CoordinateOutOfRange` when `pos` cannot be packed
    pub fn insert(&self, pos: BlockCoord, ptr: u32) -> Result<InsertOutcome> {
        debug_assert_ne!(ptr, FREE_ENTRY);
        let key = pack_block_key(pos)?;
        let bucket = self.bucket_of(pos);

        if let Some(slot) = self.find_key(key, bucket) {
            return Ok(InsertOutcome::Duplicate { slot: slot as u32 });
        }

        let base = bucket * self.bucket_size;
        for i in base..base + self.bucket_size {
            let slot = &self.slots[i];
            loop {
                let current = slot.key.load(Ordering::Acquire);
                if current == key {
                    return Ok(InsertOutcome::Duplicate { slot: i as u32 });
                }
                if current != VACANT_KEY {
                    break;
                }
                if slot
                    .key
                    .compare_exchange(VACANT_KEY, key, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    slot.ptr.store(ptr, Ordering::Release);
                    return Ok(InsertOutcome::Inserted { slot: i as u32 });
                }
                // Lost the CAS: look at the same slot again.
            }
        }

        self.insert_overflow(pos, key, bucket, ptr)
    }

    fn insert_overflow(
        &self,
        pos: BlockCoord,
        key: u64,
        bucket: usize,
        ptr: u32,
    ) -> Result<InsertOutcome> {
        let mut node: Option<usize> = None;
        let mut tail = self.chain_anchor(bucket);
        loop {
            let next = self.slots[tail].next.load(Ordering::Acquire);
            if next != NONE {
                if self.slots[next as usize].key.load(Ordering::Acquire) == key {
                    if let Some(n) = node {
                        self.recycle_node(n);
                        self.pending[bucket].fetch_sub(1, Ordering::Release);
                    }
                    return Ok(InsertOutcome::Duplicate { slot: next });
                }
                tail = next as usize;
                continue;
            }

            let n = match node {
                Some(n) => n,
                None => {
                    // Raised before the pop so a racer that finds the list
                    // empty knows a node may still be linked into this chain.
                    self.pending[bucket].fetch_add(1, Ordering::AcqRel);
                    let Some(rel) = self.overflow.pop() else {
                        self.pending[bucket].fetch_sub(1, Ordering::AcqRel);
                        return self.settle_full(pos, key, bucket);
                    };
                    let n = self.primary_len() + rel as usize;
                    let slot = &self.slots[n];
                    slot.key.store(key, Ordering::Relaxed);
                    slot.ptr.store(ptr, Ordering::Relaxed);
                    slot.next.store(NONE, Ordering::Relaxed);
                    node = Some(n);
                    n
                }
            };

            // The Release link publishes the node's key and ptr.
            if self.slots[tail]
                .next
                .compare_exchange(NONE, n as u32, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.pending[bucket].fetch_sub(1, Ordering::Release);
                return Ok(InsertOutcome::Inserted { slot: n as u32 });
            }
        }
    }

    /// The overflow region is empty. Wait for nodes other racers hold for
    /// this bucket to be linked, then report the coordinate as a duplicate if
    /// one of them carried it, else `DirectoryFull`.
    fn settle_full(&self, pos: BlockCoord, key: u64, bucket: usize) -> Result<InsertOutcome> {
        loop {
            let pending = self.pending[bucket].load(Ordering::Acquire);
            if let Some(slot) = self.find_key(key, bucket) {
                return Ok(InsertOutcome::Duplicate { slot: slot as u32 });
            }
            if pending == 0 {
                return Err(MapError::directory_full(pos));
            }
            core::hint::spin_loop();
        }
    }

    /// Return an unlinked overflow node to the free-list.
    fn recycle_node(&self, n: usize) {
        let slot = &self.slots[n];
        slot.key.store(VACANT_KEY, Ordering::Relaxed);
        slot.ptr.store(FREE_ENTRY, Ordering::Relaxed);
        slot.next.store(NONE, Ordering::Relaxed);
        self.overflow.push((n - self.primary_len()) as u32);
    }

    /// Spin until the slot's ptr is published, then return it.
    ///
    /// Used by the loser of an insertion race; the winner publishes a few
    /// instructions after its claim.
    pub fn wait_published(&self, slot: u32) -> u32 {
        let ptr = &self.slots[slot as usize].ptr;
        loop {
            match ptr.load(Ordering::Acquire) {
                FREE_ENTRY => core::hint::spin_loop(),
                p => return p,
            }
        }
    }

    /// Remove the entry for `pos` and return its pool index.
    ///
    /// # Errors
    /// `NotFound` if `pos` has no entry.
    pub fn delete(&mut self, pos: BlockCoord) -> Result<u32> {
        let key = pack_block_key(pos).map_err(|_| MapError::not_found(pos))?;
        let bucket = self.bucket_of(pos);
        let slot = self
            .find_key(key, bucket)
            .ok_or_else(|| MapError::not_found(pos))?;
        Ok(self.remove_slot(bucket, slot))
    }

    /// Unlink and reset one occupied slot of `bucket`.
    ///
    /// Only called with exclusive access to the bucket's chain (from
    /// [`delete`](Self::delete) or one sweep task per bucket).
    fn remove_slot(&self, bucket: usize, slot: usize) -> u32 {
        let s = &self.slots[slot];
        let ptr = s.ptr.swap(FREE_ENTRY, Ordering::Relaxed);
        s.key.store(VACANT_KEY, Ordering::Relaxed);

        if slot >= self.primary_len() {
            let mut prev = self.chain_anchor(bucket);
            let mut cur = self.slots[prev].next.load(Ordering::Relaxed);
            while cur != NONE && cur as usize != slot {
                prev = cur as usize;
                cur = self.slots[prev].next.load(Ordering::Relaxed);
            }
            debug_assert_eq!(cur as usize, slot, "overflow slot not on its bucket chain");
            if cur != NONE {
                let after = s.next.load(Ordering::Relaxed);
                self.slots[prev].next.store(after, Ordering::Relaxed);
            }
            s.next.store(NONE, Ordering::Relaxed);
            self.overflow.push((slot - self.primary_len()) as u32);
        }
        // A primary slot keeps `next`: the last one anchors the chain.
        ptr
    }

    /// Snapshot of slot `index` if it holds a published entry.
    #[inline]
    pub fn entry(&self, index: usize) -> Option<HashEntry> {
        let slot = self.slots.get(index)?;
        let key = slot.key.load(Ordering::Acquire);
        if key == VACANT_KEY {
            return None;
        }
        let ptr = slot.ptr.load(Ordering::Acquire);
        if ptr == FREE_ENTRY {
            return None;
        }
        Some(HashEntry {
            pos: unpack_block_key(key),
            ptr,
            next: slot.next.load(Ordering::Acquire),
        })
    }

    /// Iterate over all occupied entries in slot order.
    pub fn iter_occupied(&self) -> impl Iterator<Item = HashEntry> + '_ {
        (0..self.slots.len()).filter_map(move |i| self.entry(i))
    }

    /// Number of occupied entries (full scan).
    pub fn occupied_count(&self) -> usize {
        (0..self.slots.len())
            .into_par_iter()
            .filter(|&i| self.entry(i).is_some())
            .count()
    }

    /// Number of overflow nodes linked into `bucket`'s chain.
    pub fn chain_len(&self, bucket: usize) -> usize {
        let mut len = 0;
        let mut cur = self.slots[self.chain_anchor(bucket)]
            .next
            .load(Ordering::Acquire);
        while cur != NONE {
            len += 1;
            cur = self.slots[cur as usize].next.load(Ordering::Acquire);
        }
        len
    }

    /// Write every occupied entry satisfying `pred` into `out`, in parallel.
    ///
    /// Output order is unspecified. Returns the candidate count afterwards;
    /// `out` is appended to, not reset. Matches that do not fit in `out` are
    /// dropped, logged, and counted by [`CandidateEntries::dropped`].
    pub fn compact_into<F>(&self, pred: F, out: &CandidateEntries) -> usize
    where
        F: Fn(&HashEntry) -> bool + Sync,
    {
        let dropped = (0..self.slots.len())
            .into_par_iter()
            .filter_map(|i| self.entry(i))
            .filter(|entry| pred(entry) && !out.push(*entry))
            .count();
        if dropped > 0 {
            log::warn!(
                "candidate buffer of {} entries full: {} matches dropped",
                out.capacity(),
                dropped
            );
        }
        out.count()
    }

    /// Reset every flag, then flag each occupied entry for which `retain`
    /// returns false. Returns the number flagged.
    pub fn mark<F>(&self, retain: F) -> usize
    where
        F: Fn(&HashEntry) -> bool + Sync,
    {
        self.flags
            .par_iter()
            .for_each(|f| f.store(0, Ordering::Relaxed));
        (0..self.slots.len())
            .into_par_iter()
            .filter(|&i| match self.entry(i) {
                Some(entry) if !retain(&entry) => {
                    self.flags[i].store(1, Ordering::Relaxed);
                    true
                }
                _ => false,
            })
            .count()
    }

    /// True if slot `index` is flagged by the last [`mark`](Self::mark).
    #[inline]
    pub fn is_flagged(&self, index: usize) -> bool {
        self.flags
            .get(index)
            .map_or(false, |f| f.load(Ordering::Relaxed) != 0)
    }

    /// Delete every flagged entry, one parallel task per bucket. Returns the
    /// pool indices that were freed.
    pub fn sweep(&mut self) -> Vec<u32> {
        let this = &*self;
        (0..this.bucket_count)
            .into_par_iter()
            .flat_map_iter(|bucket| this.sweep_bucket(bucket))
            .collect()
    }

    fn sweep_bucket(&self, bucket: usize) -> Vec<u32> {
        let mut freed = Vec::new();
        let base = bucket * self.bucket_size;
        for i in base..base + self.bucket_size {
            if self.take_flag(i) {
                freed.push(self.remove_slot(bucket, i));
            }
        }
        let mut cur = self.slots[self.chain_anchor(bucket)]
            .next
            .load(Ordering::Relaxed);
        while cur != NONE {
            let i = cur as usize;
            cur = self.slots[i].next.load(Ordering::Relaxed);
            if self.take_flag(i) {
                freed.push(self.remove_slot(bucket, i));
            }
        }
        freed
    }

    #[inline]
    fn take_flag(&self, index: usize) -> bool {
        self.flags[index].swap(0, Ordering::Relaxed) != 0 && self.entry(index).is_some()
    }

    /// Make every slot vacant and refill the overflow free-list.
    pub fn reset(&mut self) {
        self.slots.par_iter_mut().for_each(|s| {
            *s.key.get_mut() = VACANT_KEY;
            *s.ptr.get_mut() = FREE_ENTRY;
            *s.next.get_mut() = NONE;
        });
        self.flags.par_iter_mut().for_each(|f| *f.get_mut() = 0);
        self.pending.iter_mut().for_each(|p| *p.get_mut() = 0);
        self.overflow.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Distinct coordinates that all land in bucket 0.
    fn colliding(dir: &HashDirectory, n: usize) -> Vec<BlockCoord> {
        (0..)
            .map(|i| BlockCoord::new(i, 0, 0))
            .filter(|&c| dir.bucket_of(c) == 0)
            .take(n)
            .collect()
    }

    fn small() -> HashDirectory {
        HashDirectory::new(&MapConfig::new(4, 2, 8, 16))
    }

    #[test]
    fn test_insert_and_lookup() {
        let dir = small();
        let pos = BlockCoord::new(1, -2, 3);
        assert_eq!(dir.lookup(pos), None);
        assert!(matches!(dir.insert(pos, 7), Ok(InsertOutcome::Inserted { .. })));
        assert_eq!(dir.lookup(pos), Some(7));
        assert_eq!(dir.occupied_count(), 1);
    }

    #[test]
    fn test_duplicate_keeps_first_ptr() {
        let dir = small();
        let pos = BlockCoord::new(4, 4, 4);
        let first = dir.insert(pos, 1).unwrap();
        let InsertOutcome::Inserted { slot } = first else {
            panic!("expected insert, got {first:?}");
        };
        assert_eq!(dir.insert(pos, 2), Ok(InsertOutcome::Duplicate { slot }));
        assert_eq!(dir.lookup(pos), Some(1));
        assert_eq!(dir.wait_published(slot), 1);
    }

    #[test]
    fn test_overflow_chain() {
        let dir = small();
        let coords = colliding(&dir, 5);
        for (i, &c) in coords.iter().enumerate() {
            dir.insert(c, i as u32).unwrap();
        }
        assert_eq!(dir.chain_len(0), 3);
        assert_eq!(dir.overflow_available(), 5);
        for (i, &c) in coords.iter().enumerate() {
            assert_eq!(dir.lookup(c), Some(i as u32));
        }
    }

    #[test]
    fn test_directory_full() {
        let dir = HashDirectory::new(&MapConfig::new(4, 2, 1, 16));
        let coords = colliding(&dir, 4);
        dir.insert(coords[0], 0).unwrap();
        dir.insert(coords[1], 1).unwrap();
        dir.insert(coords[2], 2).unwrap();
        let err = dir.insert(coords[3], 3).unwrap_err();
        assert!(matches!(err, MapError::DirectoryFull { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_delete_from_middle_of_chain() {
        let mut dir = small();
        let coords = colliding(&dir, 6);
        for (i, &c) in coords.iter().enumerate() {
            dir.insert(c, i as u32).unwrap();
        }

        assert_eq!(dir.delete(coords[3]), Ok(3));
        assert_eq!(dir.lookup(coords[3]), None);
        assert_eq!(dir.chain_len(0), 3);
        for &i in &[0usize, 1, 2, 4, 5] {
            assert_eq!(dir.lookup(coords[i]), Some(i as u32));
        }
        assert!(matches!(
            dir.delete(coords[3]),
            Err(MapError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_primary_keeps_chain() {
        let mut dir = small();
        let coords = colliding(&dir, 4);
        for (i, &c) in coords.iter().enumerate() {
            dir.insert(c, i as u32).unwrap();
        }
        // Slot 1 anchors the chain.
        assert_eq!(dir.delete(coords[1]), Ok(1));
        assert_eq!(dir.lookup(coords[2]), Some(2));
        assert_eq!(dir.lookup(coords[3]), Some(3));

        // Reinserting a chained coordinate is a duplicate, not a new entry.
        assert!(matches!(
            dir.insert(coords[3], 9),
            Ok(InsertOutcome::Duplicate { .. })
        ));
        // The hole is reused.
        let fresh = colliding(&dir, 5)[4];
        assert_eq!(dir.insert(fresh, 4), Ok(InsertOutcome::Inserted { slot: 1 }));
    }

    #[test]
    fn test_out_of_range_coordinate() {
        let dir = small();
        let far = BlockCoord::new(i32::MAX, 0, 0);
        assert_eq!(dir.lookup(far), None);
        assert!(matches!(
            dir.insert(far, 0),
            Err(MapError::CoordinateOutOfRange { .. })
        ));
    }

    #[test]
    fn test_mark_and_sweep() {
        let mut dir = small();
        for i in 0..10 {
            dir.insert(BlockCoord::new(i, 1, 2), i as u32).unwrap();
        }
        let flagged = dir.mark(|e| e.ptr % 2 == 0);
        assert_eq!(flagged, 5);

        let mut freed = dir.sweep();
        freed.sort_unstable();
        assert_eq!(freed, vec![1, 3, 5, 7, 9]);
        assert_eq!(dir.occupied_count(), 5);
        assert!(dir.iter_occupied().all(|e| e.ptr % 2 == 0));
        assert!(dir.sweep().is_empty());
    }

    #[test]
    fn test_compact_into_undersized_buffer() {
        let dir = small();
        for i in 0..6 {
            dir.insert(BlockCoord::new(i, 0, 1), i as u32).unwrap();
        }
        let out = CandidateEntries::new(4);
        assert_eq!(dir.compact_into(|_| true, &out), 4);
        assert_eq!(out.dropped(), 2);

        let roomy = CandidateEntries::new(dir.entry_count());
        assert_eq!(dir.compact_into(|_| true, &roomy), 6);
        assert_eq!(roomy.dropped(), 0);
    }

    #[test]
    fn test_reset() {
        let mut dir = small();
        let coords = colliding(&dir, 5);
        for (i, &c) in coords.iter().enumerate() {
            dir.insert(c, i as u32).unwrap();
        }
        dir.reset();
        assert_eq!(dir.occupied_count(), 0);
        assert_eq!(dir.overflow_available(), 8);
        assert_eq!(dir.chain_len(0), 0);
    }
}
