//! # Wire Messages
//!
//! Payload encodings for the Bitcoin P2P messages an SPV client exchanges.
//! Framing (magic, command, length, checksum) lives in [`super::framing`].

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use shared_types::{
    write_var_bytes, write_var_int, BlockHeader, DecodeError, Decodable, Encodable, Hash,
    Transaction, WireReader,
};
use spv_bloom_filters::BloomFilter;
use spv_chain::MerkleProof;

/// Protocol version spoken by this client (BIP37 filtering).
pub const PROTOCOL_VERSION: i32 = 70001;

/// Service bit advertising full block relay.
pub const NODE_NETWORK: u64 = 1;

/// Inventory items accepted in one message.
pub const MAX_INV_ITEMS: usize = 50_000;

/// Headers in a full `headers` response.
pub const MAX_HEADERS: usize = 2000;

/// Block hashes in a full `getblocks` response inventory.
pub const MAX_BLOCKS_INV: usize = 500;

/// Locator hashes accepted in `getblocks`/`getheaders`.
pub const MAX_LOCATOR_HASHES: usize = 500;

/// Upper bound on list lengths while decoding, derived from the frame limit.
const MAX_WIRE_ITEMS: usize = super::framing::MAX_PAYLOAD_SIZE / 36;

/// Inventory object type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvType {
    Error,
    Tx,
    Block,
    FilteredBlock,
    Other(u32),
}

impl InvType {
    fn from_u32(value: u32) -> Self {
        match value {
            0 => InvType::Error,
            1 => InvType::Tx,
            2 => InvType::Block,
            3 => InvType::FilteredBlock,
            other => InvType::Other(other),
        }
    }

    fn as_u32(self) -> u32 {
        match self {
            InvType::Error => 0,
            InvType::Tx => 1,
            InvType::Block => 2,
            InvType::FilteredBlock => 3,
            InvType::Other(value) => value,
        }
    }
}

/// One inventory vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InvItem {
    pub kind: InvType,
    pub hash: Hash,
}

impl InvItem {
    pub fn tx(hash: Hash) -> Self {
        Self {
            kind: InvType::Tx,
            hash,
        }
    }

    pub fn block(hash: Hash) -> Self {
        Self {
            kind: InvType::Block,
            hash,
        }
    }

    pub fn filtered_block(hash: Hash) -> Self {
        Self {
            kind: InvType::FilteredBlock,
            hash,
        }
    }
}

impl Encodable for InvItem {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.kind.as_u32().to_le_bytes());
        out.extend_from_slice(&self.hash);
    }
}

impl Decodable for InvItem {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            kind: InvType::from_u32(reader.read_u32()?),
            hash: reader.read_hash()?,
        })
    }
}

/// Network address as carried in `version` (no timestamp).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetAddress {
    pub services: u64,
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetAddress {
    pub fn new(address: SocketAddr, services: u64) -> Self {
        let ip = match address.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
            IpAddr::V6(v6) => v6.octets(),
        };
        Self {
            services,
            ip,
            port: address.port(),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        let v6 = Ipv6Addr::from(self.ip);
        let ip = match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        };
        SocketAddr::new(ip, self.port)
    }
}

impl Encodable for NetAddress {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.services.to_le_bytes());
        out.extend_from_slice(&self.ip);
        out.extend_from_slice(&self.port.to_be_bytes());
    }
}

impl Decodable for NetAddress {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        let services = reader.read_u64()?;
        let mut ip = [0u8; 16];
        ip.copy_from_slice(reader.read_bytes(16)?);
        let port = reader.read_u16_be()?;
        Ok(Self { services, ip, port })
    }
}

/// `version` payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub receiver: NetAddress,
    pub sender: NetAddress,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    /// BIP37: whether the peer should relay transactions before a filter is set.
    pub relay: bool,
}

impl Encodable for VersionMessage {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.services.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        self.receiver.encode(out);
        self.sender.encode(out);
        out.extend_from_slice(&self.nonce.to_le_bytes());
        write_var_bytes(out, self.user_agent.as_bytes());
        out.extend_from_slice(&self.start_height.to_le_bytes());
        out.push(u8::from(self.relay));
    }
}

impl Decodable for VersionMessage {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        let version = reader.read_i32()?;
        let services = reader.read_u64()?;
        let timestamp = reader.read_i64()?;
        let receiver = NetAddress::decode(reader)?;
        let sender = NetAddress::decode(reader)?;
        let nonce = reader.read_u64()?;
        let user_agent = reader.read_var_str()?;
        let start_height = reader.read_i32()?;
        // The relay flag is optional on the wire and defaults to true.
        let relay = if reader.is_empty() {
            true
        } else {
            reader.read_u8()? != 0
        };
        Ok(Self {
            version,
            services,
            timestamp,
            receiver,
            sender,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }
}

/// `getheaders` / `getblocks` payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocatorRequest {
    pub version: u32,
    pub locator: Vec<Hash>,
    pub stop: Hash,
}

impl LocatorRequest {
    pub fn new(locator: Vec<Hash>, stop: Hash) -> Self {
        Self {
            version: PROTOCOL_VERSION as u32,
            locator,
            stop,
        }
    }
}

impl Encodable for LocatorRequest {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        write_var_int(out, self.locator.len() as u64);
        for hash in &self.locator {
            out.extend_from_slice(hash);
        }
        out.extend_from_slice(&self.stop);
    }
}

impl Decodable for LocatorRequest {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        let version = reader.read_u32()?;
        let count = reader.read_count(MAX_LOCATOR_HASHES)?;
        let mut locator = Vec::with_capacity(count);
        for _ in 0..count {
            locator.push(reader.read_hash()?);
        }
        let stop = reader.read_hash()?;
        Ok(Self {
            version,
            locator,
            stop,
        })
    }
}

/// `merkleblock` payload: a header plus its partial merkle tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleBlockMessage {
    pub header: BlockHeader,
    pub proof: MerkleProof,
}

/// `reject` payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectMessage {
    pub message: String,
    pub code: u8,
    pub reason: String,
    pub data: Option<Hash>,
}

/// `alert` payload: serialized alert plus its DER signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertMessage {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

/// A decoded P2P message.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    /// Nonce is absent for pre-BIP31 peers.
    Ping(Option<u64>),
    Pong(u64),
    Inv(Vec<InvItem>),
    GetData(Vec<InvItem>),
    NotFound(Vec<InvItem>),
    GetHeaders(LocatorRequest),
    Headers(Vec<BlockHeader>),
    GetBlocks(LocatorRequest),
    FilterLoad(BloomFilter),
    MerkleBlock(MerkleBlockMessage),
    Tx(Transaction),
    MemPool,
    Reject(RejectMessage),
    Alert(AlertMessage),
    Unknown { command: String, payload: Vec<u8> },
}

impl Message {
    /// Command string carried in the frame header.
    pub fn command(&self) -> &str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::NotFound(_) => "notfound",
            Message::GetHeaders(_) => "getheaders",
            Message::Headers(_) => "headers",
            Message::GetBlocks(_) => "getblocks",
            Message::FilterLoad(_) => "filterload",
            Message::MerkleBlock(_) => "merkleblock",
            Message::Tx(_) => "tx",
            Message::MemPool => "mempool",
            Message::Reject(_) => "reject",
            Message::Alert(_) => "alert",
            Message::Unknown { command, .. } => command,
        }
    }

    /// Serialize the payload (without framing).
    pub fn encode_payload(&self, out: &mut Vec<u8>) {
        match self {
            Message::Version(version) => version.encode(out),
            Message::Verack | Message::MemPool => {}
            Message::Ping(nonce) => {
                if let Some(nonce) = nonce {
                    out.extend_from_slice(&nonce.to_le_bytes());
                }
            }
            Message::Pong(nonce) => out.extend_from_slice(&nonce.to_le_bytes()),
            Message::Inv(items) | Message::GetData(items) | Message::NotFound(items) => {
                write_var_int(out, items.len() as u64);
                for item in items {
                    item.encode(out);
                }
            }
            Message::GetHeaders(request) | Message::GetBlocks(request) => request.encode(out),
            Message::Headers(headers) => {
                write_var_int(out, headers.len() as u64);
                for header in headers {
                    header.encode(out);
                    write_var_int(out, 0);
                }
            }
            Message::FilterLoad(filter) => out.extend_from_slice(&filter.to_filterload_payload()),
            Message::MerkleBlock(block) => {
                block.header.encode(out);
                block.proof.encode(out);
            }
            Message::Tx(tx) => tx.encode(out),
            Message::Reject(reject) => {
                write_var_bytes(out, reject.message.as_bytes());
                out.push(reject.code);
                write_var_bytes(out, reject.reason.as_bytes());
                if let Some(hash) = &reject.data {
                    out.extend_from_slice(hash);
                }
            }
            Message::Alert(alert) => {
                write_var_bytes(out, &alert.payload);
                write_var_bytes(out, &alert.signature);
            }
            Message::Unknown { payload, .. } => out.extend_from_slice(payload),
        }
    }

    /// Decode the payload of `command`. Unknown commands are kept verbatim.
    pub fn decode(command: &str, payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = match command {
            "version" => Message::Version(VersionMessage::decode(&mut reader)?),
            "verack" => Message::Verack,
            "ping" => {
                if reader.is_empty() {
                    Message::Ping(None)
                } else {
                    Message::Ping(Some(reader.read_u64()?))
                }
            }
            "pong" => Message::Pong(reader.read_u64()?),
            "inv" => Message::Inv(decode_inv(&mut reader)?),
            "getdata" => Message::GetData(decode_inv(&mut reader)?),
            "notfound" => Message::NotFound(decode_inv(&mut reader)?),
            "getheaders" => Message::GetHeaders(LocatorRequest::decode(&mut reader)?),
            "getblocks" => Message::GetBlocks(LocatorRequest::decode(&mut reader)?),
            "headers" => {
                let count = reader.read_count(MAX_HEADERS)?;
                let mut headers = Vec::with_capacity(count);
                for _ in 0..count {
                    headers.push(BlockHeader::decode(&mut reader)?);
                    // Transaction count, always zero in `headers`.
                    reader.read_var_int()?;
                }
                Message::Headers(headers)
            }
            "filterload" => {
                let filter = BloomFilter::from_filterload_payload(payload)
                    .map_err(|e| DecodeError::InvalidValue(e.to_string()))?;
                return Ok(Message::FilterLoad(filter));
            }
            "merkleblock" => Message::MerkleBlock(MerkleBlockMessage {
                header: BlockHeader::decode(&mut reader)?,
                proof: MerkleProof::decode(&mut reader)?,
            }),
            "tx" => Message::Tx(Transaction::decode(&mut reader)?),
            "mempool" => Message::MemPool,
            "reject" => {
                let message = reader.read_var_str()?;
                let code = reader.read_u8()?;
                let reason = reader.read_var_str()?;
                let data = if reader.remaining() >= 32 {
                    Some(reader.read_hash()?)
                } else {
                    None
                };
                Message::Reject(RejectMessage {
                    message,
                    code,
                    reason,
                    data,
                })
            }
            "alert" => Message::Alert(AlertMessage {
                payload: reader.read_var_bytes()?,
                signature: reader.read_var_bytes()?,
            }),
            other => {
                return Ok(Message::Unknown {
                    command: other.to_string(),
                    payload: payload.to_vec(),
                })
            }
        };
        reader.finish()?;
        Ok(message)
    }
}

fn decode_inv(reader: &mut WireReader<'_>) -> Result<Vec<InvItem>, DecodeError> {
    let count = reader.read_count(MAX_WIRE_ITEMS)?;
    let mut items = Vec::with_capacity(count.min(MAX_INV_ITEMS));
    for _ in 0..count {
        items.push(InvItem::decode(reader)?);
    }
    Ok(items)
}
