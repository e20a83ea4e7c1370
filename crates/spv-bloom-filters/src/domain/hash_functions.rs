//! Hash functions for the BIP37 bloom filter
//!
//! Hash function `i` is MurmurHash3 (x86, 32-bit) seeded with
//! `i * 0xFBA4C795 + tweak`.

use std::io::Cursor;

/// Seed multiplier fixed by BIP37.
pub const SEED_MULTIPLIER: u32 = 0xFBA4_C795;

/// MurmurHash3 x86_32 of `element` with the given seed.
pub fn murmur_hash(element: &[u8], seed: u32) -> u32 {
    let mut cursor = Cursor::new(element);
    // Reading from an in-memory cursor cannot fail.
    murmur3::murmur3_32(&mut cursor, seed).unwrap_or(0)
}

/// Bit index selected by hash function `hash_num` in a filter of `bit_len` bits.
pub fn bit_index(element: &[u8], hash_num: u32, tweak: u32, bit_len: usize) -> usize {
    let seed = hash_num.wrapping_mul(SEED_MULTIPLIER).wrapping_add(tweak);
    (murmur_hash(element, seed) as usize) % bit_len
}

/// All `k` bit indexes for an element.
pub fn compute_hash_positions(element: &[u8], k: u32, bit_len: usize, tweak: u32) -> Vec<usize> {
    (0..k)
        .map(|i| bit_index(element, i, tweak, bit_len))
        .collect()
}
