//! # Adapters
//!
//! Tokio implementations of the outbound connection and timer ports.

pub mod tcp;
pub mod watchdog;

pub use tcp::TcpConnector;
pub use watchdog::TokioWatchdog;
