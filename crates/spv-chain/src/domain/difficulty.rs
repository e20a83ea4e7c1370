//! # Difficulty
//!
//! Compact target encoding, retargeting and proof-of-work checks.
//!
//! Targets are 256-bit unsigned integers. Header hashes compare against the
//! target as little-endian integers.

use primitive_types::{U256, U512};
use shared_types::{hash_to_hex, BlockHeader, Hash};

use super::errors::ConsensusError;

/// Maximum clock drift allowed for header timestamps (seconds).
pub const MAX_FUTURE_DRIFT_SECS: u64 = 2 * 60 * 60;

/// Decode compact `bits` into a target.
///
/// Returns `None` for negative or overflowing encodings.
pub fn decode_compact(bits: u32) -> Option<U256> {
    let size = bits >> 24;
    let word = bits & 0x007f_ffff;

    if word != 0 && bits & 0x0080_0000 != 0 {
        return None;
    }
    if word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32)) {
        return None;
    }

    let target = if size <= 3 {
        U256::from(word >> (8 * (3 - size)))
    } else {
        U256::from(word) << (8 * (size - 3) as usize)
    };
    Some(target)
}

/// Encode a target as compact bits.
pub fn encode_compact(target: U256) -> u32 {
    let mut size = (target.bits() + 7) / 8;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (target >> (8 * (size - 3))).low_u32()
    };
    // The sign bit must stay clear.
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | ((size as u32) << 24)
}

/// Mask keeping only the significant bytes representable by `bits`.
pub fn precision_mask(bits: u32) -> U256 {
    let size = (bits >> 24) as usize;
    if size <= 3 {
        U256::MAX
    } else {
        U256::from(0x00ff_ffffu32) << (8 * (size - 3))
    }
}

/// Retarget: `parent_target * timespan / target_timespan`, clamped.
///
/// `actual_timespan` is clamped to `[target_timespan / 4, target_timespan * 4]`
/// and the result never exceeds `max_target`.
pub fn next_target(
    parent_target: U256,
    actual_timespan: i64,
    target_timespan: u32,
    max_target: U256,
) -> U256 {
    let target_timespan = i64::from(target_timespan.max(1));
    let timespan = actual_timespan.clamp(target_timespan / 4, target_timespan * 4);

    let product: U512 = parent_target.full_mul(U256::from(timespan as u64));
    let quotient = product / U512::from(target_timespan as u64);
    match U256::try_from(quotient) {
        Ok(target) if target <= max_target => target,
        _ => max_target,
    }
}

/// Whether `computed` matches the target declared by `candidate_bits` at the
/// candidate's precision.
pub fn target_matches(computed: U256, candidate_bits: u32) -> bool {
    match decode_compact(candidate_bits) {
        Some(declared) => {
            let mask = precision_mask(candidate_bits);
            computed & mask == declared & mask
        }
        None => false,
    }
}

/// Header hash as a 256-bit integer.
pub fn hash_to_u256(hash: &Hash) -> U256 {
    U256::from_little_endian(hash)
}

/// Check the header's hash against its own target and its timestamp against
/// local time.
pub fn check_proof_of_work(
    header: &BlockHeader,
    max_target: U256,
    now: u64,
) -> Result<(), ConsensusError> {
    let bits = header.bits();
    let target = decode_compact(bits)
        .filter(|t| !t.is_zero() && *t <= max_target)
        .ok_or(ConsensusError::TargetOutOfRange { bits })?;

    let hash = header.hash();
    if hash_to_u256(&hash) > target {
        return Err(ConsensusError::InvalidProofOfWork {
            hash: hash_to_hex(&hash),
        });
    }

    if u64::from(header.timestamp()) > now + MAX_FUTURE_DRIFT_SECS {
        return Err(ConsensusError::TimestampTooFarInFuture {
            timestamp: header.timestamp(),
            now,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(bits: u32) -> U256 {
        decode_compact(bits).unwrap()
    }

    #[test]
    fn test_decode_genesis_bits() {
        assert_eq!(target(0x1d00ffff), U256::from(0xffffu64) << 208);
        assert_eq!(target(0x03123456), U256::from(0x123456u64));
        assert_eq!(target(0x02123456), U256::from(0x1234u64));
        assert_eq!(target(0x01003456), U256::zero());
    }

    #[test]
    fn test_decode_rejects_negative_and_overflow() {
        assert!(decode_compact(0x04923456).is_none());
        assert!(decode_compact(0xff123456).is_none());
        // Zero mantissa with the sign bit is just zero.
        assert_eq!(decode_compact(0x01800000), Some(U256::zero()));
    }

    #[test]
    fn test_encode_decode_compact_vectors() {
        for bits in [0x1d00ffffu32, 0x1b0404cb, 0x1c05a3f4, 0x207fffff, 0x05009234] {
            assert_eq!(encode_compact(target(bits)), bits, "bits {bits:#010x}");
        }
        assert_eq!(encode_compact(U256::from(0x80u64)), 0x02008000);
        assert_eq!(encode_compact(U256::zero()), 0);
    }

    #[test]
    fn test_retarget_reference_vectors() {
        let mainnet_max = target(0x1d00ffff);
        let cases = [
            // (interval start time, parent time, parent bits, expected bits)
            (1261130161i64, 1262152739i64, 0x1d00ffffu32, 0x1d00d86au32),
            (1231006505, 1233061996, 0x1d00ffff, 0x1d00ffff),
            (1279008237, 1279297671, 0x1c05a3f4, 0x1c0168fd),
            (1263163443, 1269211443, 0x1c387f6f, 0x1d00e1fd),
        ];
        for (start, end, parent_bits, expected) in cases {
            let computed = next_target(target(parent_bits), end - start, 1_209_600, mainnet_max);
            assert_eq!(encode_compact(computed), expected);
            assert!(target_matches(computed, expected));
        }
    }

    #[test]
    fn test_retarget_does_not_overflow_near_max() {
        let regtest_max = target(0x207fffff);
        let computed = next_target(regtest_max, 1_209_600 * 4, 1_209_600, regtest_max);
        assert_eq!(computed, regtest_max);
    }

    #[test]
    fn test_target_matches_ignores_precision_loss() {
        let computed = target(0x1d00d86a) + U256::from(12345u64);
        assert!(target_matches(computed, 0x1d00d86a));
        assert!(!target_matches(computed, 0x1d00d86b));
    }

    #[test]
    fn test_check_proof_of_work_genesis() {
        let genesis = crate::config::ChainParams::mainnet().genesis;
        let max = target(0x1d00ffff);
        assert!(check_proof_of_work(&genesis, max, 1_700_000_000).is_ok());

        let mut broken = genesis.clone();
        broken.set_nonce(0);
        assert!(matches!(
            check_proof_of_work(&broken, max, 1_700_000_000),
            Err(ConsensusError::InvalidProofOfWork { .. })
        ));
    }

    #[test]
    fn test_check_proof_of_work_rejects_easy_target() {
        let genesis = crate::config::ChainParams::regtest().genesis;
        let mainnet_max = target(0x1d00ffff);
        assert!(matches!(
            check_proof_of_work(&genesis, mainnet_max, 1_700_000_000),
            Err(ConsensusError::TargetOutOfRange { bits: 0x207fffff })
        ));
    }

    #[test]
    fn test_check_proof_of_work_future_timestamp() {
        let genesis = crate::config::ChainParams::mainnet().genesis;
        let max = target(0x1d00ffff);
        let now = u64::from(genesis.timestamp()) - MAX_FUTURE_DRIFT_SECS - 1;
        assert!(matches!(
            check_proof_of_work(&genesis, max, now),
            Err(ConsensusError::TimestampTooFarInFuture { .. })
        ));
    }
}
