//! Map storage: hash directory, block pool and the per-frame candidate list.
//!
//! - `HashDirectory`: lock-free bucketed hash table, block coordinate → pool index
//! - `BlockPool`: fixed-capacity SoA arena of voxel blocks
//! - `CandidateEntries`: dense output of the candidate compactor
//! - `IndexStack`: lock-free free-list shared by the pool and the overflow region

pub mod batch_lookup;
pub mod block_pool;
pub mod candidates;
pub mod directory;
pub mod free_list;
pub mod voxel;

pub use batch_lookup::BatchLookupResult;
pub use block_pool::{BlockMut, BlockPool};
pub use candidates::CandidateEntries;
pub use directory::{HashDirectory, HashEntry, InsertOutcome, FREE_ENTRY, NONE};
pub use free_list::IndexStack;
pub use voxel::{MeshUnit, Voxel, NO_SLOT};
