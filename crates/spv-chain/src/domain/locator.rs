//! # Block Locator
//!
//! Heights sampled for `getblocks`/`getheaders`: the ten most recent blocks,
//! then exponentially sparser toward genesis.

/// Entries taken at step one before the step starts doubling.
pub const LINEAR_ENTRIES: usize = 10;

/// Main-chain heights to include for a tip at `tip_height`, newest first.
///
/// Height 0 is never included; callers append the genesis hash.
pub fn locator_heights(tip_height: i32) -> Vec<i32> {
    let mut heights = Vec::new();
    let mut step: i64 = 1;
    let mut height = i64::from(tip_height);
    while height > 0 {
        heights.push(height as i32);
        if heights.len() >= LINEAR_ENTRIES {
            step *= 2;
        }
        height -= step;
    }
    heights
}
