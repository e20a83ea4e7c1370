//! A scripted remote node serving a mined regtest chain.

use std::collections::HashMap;
use std::net::SocketAddr;

use shared_types::{double_sha256, Block, BlockHeader, Hash, OutPoint, Transaction, TxIn, TxOut};
use spv_bloom_filters::{BloomFilter, WatchList, WatchedAddress};
use spv_chain::test_utils::child_block;
use spv_chain::{ChainParams, MerkleProof};
use spv_network::domain::{
    InvItem, InvType, LocatorRequest, MerkleBlockMessage, NetAddress, VersionMessage,
    MAX_BLOCKS_INV, MAX_HEADERS, NODE_NETWORK, PROTOCOL_VERSION,
};
use spv_network::Message;

/// Public key hash the test wallet watches.
pub const WALLET_PKH: [u8; 20] = [0x5a; 20];

const REMOTE_NONCE: u64 = 0x5eed_5eed;

pub fn wallet_watch_list() -> WatchList {
    WatchList {
        addresses: vec![WatchedAddress {
            public_key: vec![0x02; 33],
            public_key_hash: WALLET_PKH,
        }],
        unspent_outputs: Vec::new(),
    }
}

/// Signed P2PKH payment to the wallet spending an output nobody knows.
pub fn payment(salt: u8) -> Transaction {
    let mut script = vec![0x76, 0xa9, 0x14];
    script.extend_from_slice(&WALLET_PKH);
    script.extend_from_slice(&[0x88, 0xac]);
    Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: OutPoint::new([salt; 32], 0),
            script_sig: vec![0x47, salt],
            sequence: u32::MAX,
        }],
        outputs: vec![TxOut {
            value: 10_000 + u64::from(salt),
            script_pubkey: script,
        }],
        lock_time: 0,
    }
}

/// Heights of the blocks [`funded_remote`] pays the wallet in.
pub const PAYMENT_HEIGHTS: [i32; 2] = [4, 9];

/// Remote serving twelve blocks with a wallet payment at each of
/// [`PAYMENT_HEIGHTS`].
pub fn funded_remote(params: &ChainParams) -> RemotePeer {
    let mut remote = RemotePeer::new(params);
    for height in 1..=12 {
        if PAYMENT_HEIGHTS.contains(&height) {
            remote.mine(vec![payment(height as u8)]);
        } else {
            remote.mine(Vec::new());
        }
    }
    remote
}

/// Data pushes of a script, the elements a BIP37 filter is tested against.
fn script_pushes(script: &[u8]) -> Vec<&[u8]> {
    let mut pushes = Vec::new();
    let mut i = 0;
    while i < script.len() {
        let op = script[i] as usize;
        i += 1;
        if (1..=75).contains(&op) {
            let end = (i + op).min(script.len());
            pushes.push(&script[i..end]);
            i = end;
        }
    }
    pushes
}

/// Remote peer state. Answers every message synchronously.
#[derive(Clone)]
pub struct RemotePeer {
    genesis: BlockHeader,
    blocks: Vec<Block>,
    transactions: HashMap<Hash, Transaction>,
    filter: Option<BloomFilter>,
    corrupt_proofs: bool,
    received: Vec<Transaction>,
}

impl RemotePeer {
    pub fn new(params: &ChainParams) -> Self {
        Self {
            genesis: params.genesis.clone(),
            blocks: Vec::new(),
            transactions: HashMap::new(),
            filter: None,
            corrupt_proofs: false,
            received: Vec::new(),
        }
    }

    /// Serve merkle proofs that do not match their headers.
    pub fn with_corrupt_proofs(mut self) -> Self {
        self.corrupt_proofs = true;
        self
    }

    pub fn height(&self) -> i32 {
        self.blocks.len() as i32
    }

    pub fn tip(&self) -> &BlockHeader {
        self.blocks.last().map_or(&self.genesis, |b| &b.header)
    }

    /// Mine a block carrying a coinbase placeholder plus `txs`.
    pub fn mine(&mut self, txs: Vec<Transaction>) -> Block {
        let coinbase = double_sha256(&(self.blocks.len() as u64).to_le_bytes());
        let mut hashes = vec![coinbase];
        for tx in txs {
            hashes.push(tx.hash());
            self.transactions.insert(tx.hash(), tx);
        }
        let block = child_block(self.tip(), hashes);
        self.blocks.push(block.clone());
        block
    }

    pub fn mine_empty(&mut self, count: usize) {
        for _ in 0..count {
            self.mine(Vec::new());
        }
    }

    /// Put `tx` in the remote's mempool.
    pub fn learn(&mut self, tx: Transaction) {
        self.transactions.insert(tx.hash(), tx);
    }

    /// Transactions pushed to us with `tx`.
    pub fn received(&self) -> &[Transaction] {
        &self.received
    }

    pub fn filter(&self) -> Option<&BloomFilter> {
        self.filter.as_ref()
    }

    fn version(&self) -> VersionMessage {
        let address = SocketAddr::from(([127, 0, 0, 1], 18444));
        VersionMessage {
            version: PROTOCOL_VERSION,
            services: NODE_NETWORK,
            timestamp: 0,
            receiver: NetAddress::new(address, 0),
            sender: NetAddress::new(address, NODE_NETWORK),
            nonce: REMOTE_NONCE,
            user_agent: "/remote:0.1/".into(),
            start_height: self.height(),
            relay: true,
        }
    }

    fn matches(&self, tx: &Transaction) -> bool {
        let Some(filter) = &self.filter else {
            return false;
        };
        filter.contains(&tx.hash())
            || tx.outputs.iter().any(|output| {
                script_pushes(&output.script_pubkey)
                    .into_iter()
                    .any(|push| filter.contains(push))
            })
    }

    /// Blocks the requester already has, judged from its locator.
    fn known_prefix(&self, locator: &[Hash]) -> usize {
        let genesis = self.genesis.hash();
        locator
            .iter()
            .find_map(|hash| {
                if *hash == genesis {
                    return Some(0);
                }
                self.blocks.iter().position(|b| b.hash() == *hash).map(|i| i + 1)
            })
            .unwrap_or(0)
    }

    fn blocks_after(&self, request: &LocatorRequest, limit: usize) -> Vec<&Block> {
        let start = self.known_prefix(&request.locator);
        let mut out = Vec::new();
        for block in self.blocks.iter().skip(start).take(limit) {
            out.push(block);
            if block.hash() == request.stop {
                break;
            }
        }
        out
    }

    fn filtered_block(&self, block: &Block) -> Vec<Message> {
        let matched: Vec<bool> = block
            .tx_hashes
            .iter()
            .map(|h| self.transactions.get(h).is_some_and(|tx| self.matches(tx)))
            .collect();
        let proof = if self.corrupt_proofs {
            let bogus: Vec<Hash> = block.tx_hashes.iter().map(|_| [0xee; 32]).collect();
            MerkleProof::from_leaves(&bogus, &matched)
        } else {
            MerkleProof::from_leaves(&block.tx_hashes, &matched)
        };
        let mut replies = vec![Message::MerkleBlock(MerkleBlockMessage {
            header: block.header.clone(),
            proof,
        })];
        for (hash, matched) in block.tx_hashes.iter().zip(matched) {
            if matched {
                if let Some(tx) = self.transactions.get(hash) {
                    replies.push(Message::Tx(tx.clone()));
                }
            }
        }
        replies
    }

    /// Replies to one message from the local node.
    pub fn answer(&mut self, message: Message) -> Vec<Message> {
        match message {
            Message::Version(_) => vec![Message::Version(self.version()), Message::Verack],
            Message::Ping(Some(nonce)) => vec![Message::Pong(nonce)],
            Message::FilterLoad(filter) => {
                self.filter = Some(filter);
                Vec::new()
            }
            Message::GetHeaders(request) => {
                let headers = self
                    .blocks_after(&request, MAX_HEADERS)
                    .into_iter()
                    .map(|b| b.header.clone())
                    .collect();
                vec![Message::Headers(headers)]
            }
            Message::GetBlocks(request) => {
                let items: Vec<InvItem> = self
                    .blocks_after(&request, MAX_BLOCKS_INV)
                    .into_iter()
                    .map(|b| InvItem::block(b.hash()))
                    .collect();
                if items.is_empty() {
                    Vec::new()
                } else {
                    vec![Message::Inv(items)]
                }
            }
            Message::GetData(items) => {
                let mut replies = Vec::new();
                let mut missing = Vec::new();
                for item in items {
                    match item.kind {
                        InvType::FilteredBlock | InvType::Block => {
                            match self.blocks.iter().find(|b| b.hash() == item.hash) {
                                Some(block) => replies.extend(self.filtered_block(block)),
                                None => missing.push(item),
                            }
                        }
                        InvType::Tx => match self.transactions.get(&item.hash) {
                            Some(tx) => replies.push(Message::Tx(tx.clone())),
                            None => missing.push(item),
                        },
                        _ => missing.push(item),
                    }
                }
                if !missing.is_empty() {
                    replies.push(Message::NotFound(missing));
                }
                replies
            }
            Message::Inv(items) => {
                let wanted: Vec<InvItem> = items
                    .into_iter()
                    .filter(|item| {
                        item.kind == InvType::Tx && !self.transactions.contains_key(&item.hash)
                    })
                    .collect();
                if wanted.is_empty() {
                    Vec::new()
                } else {
                    vec![Message::GetData(wanted)]
                }
            }
            Message::Tx(tx) => {
                self.transactions.insert(tx.hash(), tx.clone());
                self.received.push(tx);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}
