//! # Shared Types Crate
//!
//! Chain entities and wire primitives shared by every SPV subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: header and transaction encodings live here so
//!   the chain and the network layer hash exactly the same bytes.
//! - **Wire-first**: every entity that crosses a socket implements
//!   [`Encodable`]/[`Decodable`] over the Bitcoin little-endian encoding.

pub mod encoding;
pub mod entities;
pub mod errors;

pub use encoding::{write_var_bytes, write_var_int, Decodable, Encodable, WireReader};
pub use entities::*;
pub use errors::*;
