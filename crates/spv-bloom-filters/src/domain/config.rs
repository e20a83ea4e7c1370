//! Bloom filter configuration and validation
//!
//! # Example
//!
//! ```ignore
//! use spv_bloom_filters::BloomConfig;
//!
//! let config = BloomConfig::default().with_relax_window(1000);
//! config.validate()?;
//! let fp = config.fp_rate_for(local_height, peer_height);
//! ```

use crate::error::FilterError;
use serde::{Deserialize, Serialize};

/// False-positive schedule and rebuild policy for the wallet filter
///
/// While the wallet is far behind the download peer it asks for fewer false
/// positives (less bandwidth during catch-up) and relaxes linearly to the
/// default rate as the tip approaches the peer's height.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomConfig {
    /// False positive rate once caught up
    pub default_fp_rate: f64,
    /// False positive rate while far behind
    pub reduced_fp_rate: f64,
    /// Blocks behind the peer over which the rate is relaxed
    pub relax_window: u32,
    /// Filtered blocks processed before the filter is rebuilt
    pub rebuild_after_blocks: u32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            default_fp_rate: 0.0005,
            reduced_fp_rate: 0.00005,
            relax_window: 500,
            rebuild_after_blocks: 500,
        }
    }
}

impl BloomConfig {
    /// Small rebuild interval so tests exercise filter rotation.
    pub fn for_testing() -> Self {
        Self {
            relax_window: 10,
            rebuild_after_blocks: 5,
            ..Self::default()
        }
    }

    /// Builder-style method to set the relax window
    pub fn with_relax_window(mut self, blocks: u32) -> Self {
        self.relax_window = blocks;
        self
    }

    /// Builder-style method to set the rebuild interval
    pub fn with_rebuild_after(mut self, blocks: u32) -> Self {
        self.rebuild_after_blocks = blocks;
        self
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        for fpr in [self.default_fp_rate, self.reduced_fp_rate] {
            if !(fpr > 0.0 && fpr < 1.0) {
                return Err(FilterError::InvalidFPR { fpr });
            }
        }
        if self.reduced_fp_rate > self.default_fp_rate {
            return Err(FilterError::InvalidParameters(
                "reduced_fp_rate must not exceed default_fp_rate".to_string(),
            ));
        }
        if self.rebuild_after_blocks == 0 {
            return Err(FilterError::InvalidParameters(
                "rebuild_after_blocks cannot be 0".to_string(),
            ));
        }
        Ok(())
    }

    /// False positive rate for a wallet at `local_height` syncing from a peer
    /// at `peer_height`.
    pub fn fp_rate_for(&self, local_height: i32, peer_height: i32) -> f64 {
        let behind = i64::from(peer_height) - i64::from(local_height);
        let window = i64::from(self.relax_window);
        if behind <= 0 {
            return self.default_fp_rate;
        }
        if behind >= window {
            return self.reduced_fp_rate;
        }
        let span = self.default_fp_rate - self.reduced_fp_rate;
        self.default_fp_rate - span * (behind as f64) / (window as f64)
    }
}
