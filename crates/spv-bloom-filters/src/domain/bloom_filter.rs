//! Core Bloom Filter implementation
//!
//! Wire-compatible with BIP37 `filterload`.
//!
//! INVARIANTS:
//! - No false negatives: if inserted, contains() MUST return true
//! - Size never exceeds MAX_BLOOM_FILTER_SIZE bytes, hash count never exceeds
//!   MAX_HASH_FUNCS

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use shared_types::{write_var_bytes, WireReader};

use super::hash_functions::compute_hash_positions;
use super::parameters::{calculate_fpr, calculate_optimal_parameters};
use crate::error::FilterError;

/// Maximum filter size in bytes (BIP37).
pub const MAX_BLOOM_FILTER_SIZE: usize = 36_000;

/// Maximum number of hash functions (BIP37).
pub const MAX_HASH_FUNCS: u32 = 50;

/// How the remote peer updates the filter when an output matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BloomUpdate {
    /// Never update.
    None = 0,
    /// Add the outpoint of every matched output.
    All = 1,
    /// Add outpoints only for pay-to-pubkey / multisig outputs.
    P2PubKeyOnly = 2,
}

impl BloomUpdate {
    fn from_byte(byte: u8) -> Result<Self, FilterError> {
        match byte {
            0 => Ok(Self::None),
            1 => Ok(Self::All),
            2 => Ok(Self::P2PubKeyOnly),
            other => Err(FilterError::Malformed(format!("unknown update flag {other}"))),
        }
    }
}

/// Bloom filter for probabilistic membership testing
///
/// False positives are possible, false negatives are not. The bit layout is
/// LSB-first within each byte, matching the bytes sent in `filterload`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BloomFilter {
    /// Bit array storing the filter state
    #[serde(with = "bitvec_serde")]
    bits: BitVec<u8, Lsb0>,
    /// Number of hash functions
    hash_funcs: u32,
    /// Per-filter seed offset
    tweak: u32,
    /// Remote update behaviour
    flags: BloomUpdate,
    /// Number of elements inserted locally
    inserted: usize,
}

/// Serde support for BitVec
mod bitvec_serde {
    use bitvec::prelude::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bits: &BitVec<u8, Lsb0>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bits.as_raw_slice().to_vec().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BitVec<u8, Lsb0>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        Ok(BitVec::<u8, Lsb0>::from_vec(bytes))
    }
}

impl BloomFilter {
    /// Create a filter sized for `elements` items at `fp_rate`.
    pub fn new(elements: usize, fp_rate: f64, tweak: u32, flags: BloomUpdate) -> Self {
        let params =
            calculate_optimal_parameters(elements, fp_rate, MAX_BLOOM_FILTER_SIZE, MAX_HASH_FUNCS);
        Self {
            bits: BitVec::<u8, Lsb0>::from_vec(vec![0u8; params.size_bytes]),
            hash_funcs: params.hash_count,
            tweak,
            flags,
            inserted: 0,
        }
    }

    /// Rebuild a filter from raw parts, enforcing the protocol limits.
    pub fn from_parts(
        data: Vec<u8>,
        hash_funcs: u32,
        tweak: u32,
        flags: BloomUpdate,
    ) -> Result<Self, FilterError> {
        if data.len() > MAX_BLOOM_FILTER_SIZE {
            return Err(FilterError::FilterTooLarge {
                size: data.len(),
                max: MAX_BLOOM_FILTER_SIZE,
            });
        }
        if hash_funcs > MAX_HASH_FUNCS {
            return Err(FilterError::TooManyHashFuncs {
                count: hash_funcs,
                max: MAX_HASH_FUNCS,
            });
        }
        if data.is_empty() || hash_funcs == 0 {
            return Err(FilterError::InvalidParameters(
                "filter needs at least one byte and one hash function".to_string(),
            ));
        }
        Ok(Self {
            bits: BitVec::<u8, Lsb0>::from_vec(data),
            hash_funcs,
            tweak,
            flags,
            inserted: 0,
        })
    }

    /// Insert an element into the filter
    ///
    /// After insertion, `contains(element)` is guaranteed to return true.
    pub fn insert(&mut self, element: &[u8]) {
        for pos in compute_hash_positions(element, self.hash_funcs, self.bits.len(), self.tweak) {
            self.bits.set(pos, true);
        }
        self.inserted += 1;
    }

    /// Test if an element might be in the filter
    pub fn contains(&self, element: &[u8]) -> bool {
        compute_hash_positions(element, self.hash_funcs, self.bits.len(), self.tweak)
            .into_iter()
            .all(|pos| self.bits[pos])
    }

    /// Expected false positive rate once `elements` items are inserted.
    pub fn false_positive_rate(&self, elements: usize) -> f64 {
        calculate_fpr(self.bits.len(), elements, self.hash_funcs)
    }

    /// Current false positive rate given the elements inserted so far.
    pub fn current_false_positive_rate(&self) -> f64 {
        self.false_positive_rate(self.inserted)
    }

    pub fn size_bytes(&self) -> usize {
        self.bits.as_raw_slice().len()
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_funcs
    }

    pub fn tweak(&self) -> u32 {
        self.tweak
    }

    pub fn flags(&self) -> BloomUpdate {
        self.flags
    }

    pub fn elements_inserted(&self) -> usize {
        self.inserted
    }

    /// Raw filter bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }

    /// Serialize as a `filterload` payload.
    pub fn to_filterload_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size_bytes() + 12);
        write_var_bytes(&mut out, self.as_bytes());
        out.extend_from_slice(&self.hash_funcs.to_le_bytes());
        out.extend_from_slice(&self.tweak.to_le_bytes());
        out.push(self.flags as u8);
        out
    }

    /// Parse a `filterload` payload.
    pub fn from_filterload_payload(payload: &[u8]) -> Result<Self, FilterError> {
        let mut reader = WireReader::new(payload);
        let malformed = |e: shared_types::DecodeError| FilterError::Malformed(e.to_string());
        let data = reader.read_var_bytes().map_err(malformed)?;
        let hash_funcs = reader.read_u32().map_err(malformed)?;
        let tweak = reader.read_u32().map_err(malformed)?;
        let flags = BloomUpdate::from_byte(reader.read_u8().map_err(malformed)?)?;
        reader.finish().map_err(malformed)?;
        Self::from_parts(data, hash_funcs, tweak, flags)
    }
}
