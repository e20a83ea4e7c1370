//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Chain**: `BlockHeader`, `Block`
//! - **Transactions**: `Transaction`, `TxIn`, `TxOut`, `OutPoint`

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

use crate::encoding::{write_var_bytes, write_var_int, Decodable, Encodable, WireReader};
use crate::errors::DecodeError;

// =============================================================================
// HASHING
// =============================================================================

/// A 32-byte double-SHA256 digest in internal (little-endian) byte order.
pub type Hash = [u8; 32];

/// The all-zero hash (null parent, "no stop hash").
pub const ZERO_HASH: Hash = [0u8; 32];

/// Height of a header that has not been connected to the chain yet.
pub const UNKNOWN_HEIGHT: i32 = -1;

/// Serialized size of a block header.
pub const HEADER_SIZE: usize = 80;

/// SHA256(SHA256(data)).
pub fn double_sha256(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// Hash the concatenation of two nodes (merkle tree interior node).
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left);
    buf[32..].copy_from_slice(right);
    double_sha256(&buf)
}

/// Display form of a hash: byte-reversed hex, as block explorers show it.
pub fn hash_to_hex(hash: &Hash) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

/// Parse the display form produced by [`hash_to_hex`].
pub fn hash_from_hex(s: &str) -> Result<Hash, DecodeError> {
    let bytes = hex::decode(s).map_err(|e| DecodeError::InvalidValue(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(DecodeError::InvalidValue(format!(
            "hash must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    hash.reverse();
    Ok(hash)
}

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// An 80-byte block header plus the chain bookkeeping attached to it.
///
/// The hash is derived from the consensus fields and cached on first use;
/// every setter of a consensus field drops the cache.
#[derive(Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    version: i32,
    prev_hash: Hash,
    merkle_root: Hash,
    timestamp: u32,
    bits: u32,
    nonce: u32,
    /// Height on the chain, [`UNKNOWN_HEIGHT`] until connected.
    pub height: i32,
    /// Whether this header is part of the best chain.
    pub is_main: bool,
    #[serde(skip)]
    hash_cache: OnceLock<Hash>,
}

impl BlockHeader {
    /// Create an unconnected header.
    pub fn new(
        version: i32,
        prev_hash: Hash,
        merkle_root: Hash,
        timestamp: u32,
        bits: u32,
        nonce: u32,
    ) -> Self {
        Self {
            version,
            prev_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
            height: UNKNOWN_HEIGHT,
            is_main: false,
            hash_cache: OnceLock::new(),
        }
    }

    /// Double-SHA256 of the 80-byte serialization.
    pub fn hash(&self) -> Hash {
        *self
            .hash_cache
            .get_or_init(|| double_sha256(&self.to_bytes()))
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn prev_hash(&self) -> Hash {
        self.prev_hash
    }

    pub fn merkle_root(&self) -> Hash {
        self.merkle_root
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn set_nonce(&mut self, nonce: u32) {
        self.nonce = nonce;
        self.hash_cache = OnceLock::new();
    }

    pub fn set_timestamp(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
        self.hash_cache = OnceLock::new();
    }

    pub fn set_bits(&mut self, bits: u32) {
        self.bits = bits;
        self.hash_cache = OnceLock::new();
    }

    /// Copy of this header with height/main-chain flags set.
    pub fn connected(mut self, height: i32, is_main: bool) -> Self {
        self.height = height;
        self.is_main = is_main;
        self
    }
}

impl PartialEq for BlockHeader {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash() && self.height == other.height && self.is_main == other.is_main
    }
}

impl Eq for BlockHeader {}

impl fmt::Debug for BlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockHeader")
            .field("hash", &hash_to_hex(&self.hash()))
            .field("prev", &hash_to_hex(&self.prev_hash))
            .field("height", &self.height)
            .field("bits", &format_args!("{:#010x}", self.bits))
            .field("timestamp", &self.timestamp)
            .field("is_main", &self.is_main)
            .finish()
    }
}

impl Encodable for BlockHeader {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.prev_hash);
        out.extend_from_slice(&self.merkle_root);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
    }
}

impl Decodable for BlockHeader {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self::new(
            reader.read_i32()?,
            reader.read_hash()?,
            reader.read_hash()?,
            reader.read_u32()?,
            reader.read_u32()?,
            reader.read_u32()?,
        ))
    }
}

/// A header together with the transaction hashes it was delivered with.
///
/// For filtered blocks these are the matched transactions; for header-only
/// sync the list is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub tx_hashes: Vec<Hash>,
}

impl Block {
    pub fn new(header: BlockHeader, tx_hashes: Vec<Hash>) -> Self {
        Self { header, tx_hashes }
    }

    /// A block known only by its header.
    pub fn header_only(header: BlockHeader) -> Self {
        Self {
            header,
            tx_hashes: Vec::new(),
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn height(&self) -> i32 {
        self.header.height
    }
}

// =============================================================================
// CLUSTER B: TRANSACTIONS
// =============================================================================

/// Reference to a previous transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl Encodable for OutPoint {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.txid);
        out.extend_from_slice(&self.vout.to_le_bytes());
    }
}

impl Decodable for OutPoint {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            txid: reader.read_hash()?,
            vout: reader.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// Upper bound on inputs/outputs accepted when decoding.
const MAX_TX_ITEMS: usize = 100_000;

/// A legacy-serialized transaction.
///
/// Script semantics are opaque here: the sync core only needs hashes,
/// spent outpoints and output scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// Double-SHA256 of the serialization (txid).
    pub fn hash(&self) -> Hash {
        double_sha256(&self.to_bytes())
    }

    /// Every input carries a signature script.
    pub fn is_signed(&self) -> bool {
        !self.inputs.is_empty() && self.inputs.iter().all(|input| !input.script_sig.is_empty())
    }

    /// Hashes of the transactions this one spends from.
    pub fn parent_hashes(&self) -> impl Iterator<Item = Hash> + '_ {
        self.inputs.iter().map(|input| input.previous_output.txid)
    }

    /// Outpoints spent by this transaction.
    pub fn spent_outpoints(&self) -> impl Iterator<Item = &OutPoint> + '_ {
        self.inputs.iter().map(|input| &input.previous_output)
    }
}

impl Encodable for Transaction {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        write_var_int(out, self.inputs.len() as u64);
        for input in &self.inputs {
            input.previous_output.encode(out);
            write_var_bytes(out, &input.script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_var_int(out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_var_bytes(out, &output.script_pubkey);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
    }
}

impl Decodable for Transaction {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        let version = reader.read_i32()?;

        let input_count = reader.read_count(MAX_TX_ITEMS)?;
        let mut inputs = Vec::with_capacity(input_count.min(1024));
        for _ in 0..input_count {
            inputs.push(TxIn {
                previous_output: OutPoint::decode(reader)?,
                script_sig: reader.read_var_bytes()?,
                sequence: reader.read_u32()?,
            });
        }

        let output_count = reader.read_count(MAX_TX_ITEMS)?;
        let mut outputs = Vec::with_capacity(output_count.min(1024));
        for _ in 0..output_count {
            outputs.push(TxOut {
                value: reader.read_u64()?,
                script_pubkey: reader.read_var_bytes()?,
            });
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time: reader.read_u32()?,
        })
    }
}
