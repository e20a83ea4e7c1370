//! Fixtures shared by the scenario tests.

pub mod loopback;
pub mod remote;

pub use loopback::{addr, Loopback};
pub use remote::{
    funded_remote, payment, wallet_watch_list, RemotePeer, PAYMENT_HEIGHTS, WALLET_PKH,
};
