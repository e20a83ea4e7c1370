//! BIP37 bloom filter parameter calculation
//!
//! Formulas:
//! - size (bytes) = min(-n*ln(p) / ln(2)^2, MAX_SIZE*8) / 8
//! - k = min(size*8 / n * ln(2), MAX_HASH_FUNCS)
//! - FPR = (1 - e^(-kn/m))^k

use std::f64::consts::LN_2;

/// Bloom filter parameters
#[derive(Clone, Debug, PartialEq)]
pub struct BloomFilterParams {
    /// Filter size in bytes
    pub size_bytes: usize,
    /// Number of hash functions
    pub hash_count: u32,
}

/// Parameters for `num_elements` at `target_fpr`, capped by the BIP37 limits.
///
/// Never returns a zero-sized filter or zero hash functions.
pub fn calculate_optimal_parameters(
    num_elements: usize,
    target_fpr: f64,
    max_size_bytes: usize,
    max_hash_funcs: u32,
) -> BloomFilterParams {
    let n = num_elements.max(1) as f64;
    let ln2_squared = LN_2 * LN_2;

    let ideal_bits = -n * target_fpr.ln() / ln2_squared;
    let bits = ideal_bits.min((max_size_bytes * 8) as f64);
    let size_bytes = ((bits as usize) / 8).max(1);

    let k = ((size_bytes * 8) as f64 / n * LN_2) as u32;
    let hash_count = k.clamp(1, max_hash_funcs);

    BloomFilterParams {
        size_bytes,
        hash_count,
    }
}

/// False positive rate of a filter with `m` bits and `k` hashes holding `n` elements.
pub fn calculate_fpr(m: usize, n: usize, k: u32) -> f64 {
    if m == 0 {
        return 1.0;
    }
    let exponent = -f64::from(k) * (n as f64) / (m as f64);
    (1.0 - exponent.exp()).powi(k as i32)
}
