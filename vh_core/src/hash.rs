//! Spatial hashing and directory key packing.
//!
//! Two independent mappings of a [`BlockCoord`]:
//! - [`bucket_index`]: the bucket a coordinate lives in (many-to-one).
//! - [`pack_block_key`]: an injective 63-bit key, so one 64-bit word can hold
//!   an entry's position and one compare-and-swap can claim a slot for it.

use crate::error::CoreError;
use crate::types::BlockCoord;

const P0: i32 = 73_856_093;
const P1: i32 = 19_349_669;
const P2: i32 = 83_492_791;

/// Bias that maps signed coordinates into 21 unsigned bits.
const KEY_OFFSET: i32 = 1 << 20;

/// Smallest packable coordinate component.
pub const MIN_BLOCK_COORD: i32 = -KEY_OFFSET;
/// Largest packable coordinate component.
pub const MAX_BLOCK_COORD: i32 = KEY_OFFSET - 1;

/// Key value reserved for vacant slots. Packed keys use 63 bits and never
/// reach it.
pub const VACANT_KEY: u64 = u64::MAX;

/// XOR-of-primes spatial hash over the three coordinates.
#[inline]
pub fn spatial_hash(coord: BlockCoord) -> i32 {
    coord.x.wrapping_mul(P0) ^ coord.y.wrapping_mul(P1) ^ coord.z.wrapping_mul(P2)
}

/// Bucket for `coord` in a table of `bucket_count` buckets.
///
/// Depends only on the coordinate, never on insertion history.
#[inline]
pub fn bucket_index(coord: BlockCoord, bucket_count: usize) -> usize {
    (spatial_hash(coord) as i64).rem_euclid(bucket_count as i64) as usize
}

/// Spread the low 21 bits of `x` with two zero bits between each.
#[inline]
pub fn spread_bits_3d(x: u32) -> u64 {
    let mut x = (x & 0x1F_FFFF) as u64;
    x = (x | (x << 32)) & 0x1F00000000FFFF;
    x = (x | (x << 16)) & 0x1F0000FF0000FF;
    x = (x | (x << 8)) & 0x100F00F00F00F00F;
    x = (x | (x << 4)) & 0x10C30C30C30C30C3;
    x = (x | (x << 2)) & 0x1249249249249249;
    x
}

/// Inverse of [`spread_bits_3d`].
#[inline]
pub fn compact_bits_3d(mut x: u64) -> u32 {
    x &= 0x1249249249249249;
    x = (x | (x >> 2)) & 0x10C30C30C30C30C3;
    x = (x | (x >> 4)) & 0x100F00F00F00F00F;
    x = (x | (x >> 8)) & 0x1F0000FF0000FF;
    x = (x | (x >> 16)) & 0x1F00000000FFFF;
    x = (x | (x >> 32)) & 0x1F_FFFF;
    x as u32
}

/// True if every component fits the packed key range.
#[inline]
pub fn is_packable(coord: BlockCoord) -> bool {
    let ok = |c: i32| (MIN_BLOCK_COORD..=MAX_BLOCK_COORD).contains(&c);
    ok(coord.x) && ok(coord.y) && ok(coord.z)
}

/// Pack a block coordinate into its Morton-interleaved directory key.
#[inline]
pub fn pack_block_key(coord: BlockCoord) -> Result<u64, CoreError> {
    if !is_packable(coord) {
        return Err(CoreError::CoordinateOutOfRange {
            x: coord.x,
            y: coord.y,
            z: coord.z,
        });
    }
    let x = (coord.x + KEY_OFFSET) as u32;
    let y = (coord.y + KEY_OFFSET) as u32;
    let z = (coord.z + KEY_OFFSET) as u32;
    Ok(spread_bits_3d(x) | (spread_bits_3d(y) << 1) | (spread_bits_3d(z) << 2))
}

/// Inverse of [`pack_block_key`]. Must not be called with [`VACANT_KEY`].
#[inline]
pub fn unpack_block_key(key: u64) -> BlockCoord {
    debug_assert_ne!(key, VACANT_KEY);
    BlockCoord::new(
        compact_bits_3d(key) as i32 - KEY_OFFSET,
        compact_bits_3d(key >> 1) as i32 - KEY_OFFSET,
        compact_bits_3d(key >> 2) as i32 - KEY_OFFSET,
    )
}
