//! # Filtered Sync Scenarios
//!
//! A fresh pool syncs a twelve block chain from three identical remotes:
//!
//! 1. **Filtered blocks**: every block arrives as a merkleblock and both
//!    wallet payments are recovered.
//! 2. **Headers-only prefix**: blocks older than the wallet are synced as
//!    bare headers, so only the later payment is seen.
//! 3. **Announcement after sync**: a newly mined block announced by inv
//!    extends the chain.

#[cfg(test)]
mod tests {
    use spv_chain::{ChainParams, ChainStateApi};
    use spv_network::domain::InvItem;
    use spv_network::{Message, PoolConfig, PoolNotification, HEADERS_ONLY_MARGIN_SECS};

    use crate::support::{addr, funded_remote, payment, Loopback};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn synced_network(config: PoolConfig) -> Loopback {
        let remote = funded_remote(&ChainParams::for_testing());
        let remotes = (1..=3).map(|i| (addr(i), remote.clone())).collect();
        let mut network = Loopback::new(config, remotes);
        network.start();
        network
    }

    // =============================================================================
    // SCENARIOS
    // =============================================================================

    #[test]
    fn test_sync_recovers_wallet_payments() {
        let mut network = synced_network(PoolConfig::for_testing());

        assert_eq!(network.pool.chain().height(), 12);
        assert_eq!(network.pool.connected_count(), 3);
        assert_eq!(network.wallet.transaction_count(), 2);

        let notifications = network.notifications().to_vec();
        assert!(notifications.contains(&PoolNotification::SyncStarted { from: 0, to: 12 }));
        assert!(notifications.contains(&PoolNotification::SyncCompleted { height: 12 }));
        assert!(!notifications
            .iter()
            .any(|n| matches!(n, PoolNotification::SyncFailed { .. })));
    }

    #[test]
    fn test_sync_skips_blocks_before_wallet_creation() {
        let genesis_time = u64::from(ChainParams::for_testing().genesis.timestamp());
        let config = PoolConfig {
            // Headers up to height 5 predate the wallet.
            wallet_creation_time: genesis_time + 6_000 + HEADERS_ONLY_MARGIN_SECS,
            ..PoolConfig::for_testing()
        };
        let mut network = synced_network(config);

        assert_eq!(network.pool.chain().height(), 12);
        // The payment at height 4 went by as a bare header.
        assert_eq!(network.wallet.transaction_count(), 1);
        assert!(network
            .notifications()
            .contains(&PoolNotification::SyncCompleted { height: 12 }));
    }

    #[test]
    fn test_announced_block_extends_chain() {
        let mut network = synced_network(PoolConfig::for_testing());
        let peer = network.peer(addr(1));
        let block = network.remote_mut(peer).mine(vec![payment(0x44)]);

        network.deliver(peer, Message::Inv(vec![InvItem::block(block.hash())]));

        assert_eq!(network.pool.chain().height(), 13);
        assert_eq!(network.pool.chain().tip().hash(), block.hash());
        assert_eq!(network.wallet.transaction_count(), 3);
        assert!(network.notifications().contains(&PoolNotification::ChainChanged {
            height: 13,
            hash: block.hash(),
        }));
    }
}
