//! Batch block coordinate lookups.

use rayon::prelude::*;
use vh_core::BlockCoord;

use super::directory::{HashDirectory, FREE_ENTRY};

/// Result of a batch lookup.
#[derive(Debug, Clone)]
pub struct BatchLookupResult {
    /// Pool index for each input coordinate, [`FREE_ENTRY`] when absent.
    pub ptrs: Vec<u32>,
}

impl BatchLookupResult {
    /// Pool index for input `idx`, if found.
    #[inline]
    pub fn get(&self, idx: usize) -> Option<u32> {
        match self.ptrs.get(idx).copied() {
            None | Some(FREE_ENTRY) => None,
            Some(ptr) => Some(ptr),
        }
    }

    /// Number of coordinates that were found.
    pub fn found_count(&self) -> usize {
        self.ptrs.iter().filter(|&&p| p != FREE_ENTRY).count()
    }

    /// Total number of coordinates queried.
    #[inline]
    pub fn total(&self) -> usize {
        self.ptrs.len()
    }

    /// `(input position, pool index)` for every hit.
    pub fn hits(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.ptrs
            .iter()
            .enumerate()
            .filter(|(_, p)| **p != FREE_ENTRY)
            .map(|(i, &p)| (i, p))
    }
}

impl HashDirectory {
    /// Look up many coordinates at once, in parallel.
    ///
    /// Each result matches what [`lookup`](HashDirectory::lookup) returns
    /// for the same coordinate.
    pub fn lookup_batch(&self, coords: &[BlockCoord]) -> BatchLookupResult {
        BatchLookupResult {
            ptrs: coords
                .par_iter()
                .map(|&c| self.lookup(c).unwrap_or(FREE_ENTRY))
                .collect(),
        }
    }
}
