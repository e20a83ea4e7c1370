//! # Misbehaving Peer Scenario
//!
//! The first remote serves merkle proofs that do not commit to their
//! headers. The pool must abandon its address, bring in a replacement and
//! finish the sync from the honest remotes.

#[cfg(test)]
mod tests {
    use spv_chain::{ChainParams, ChainStateApi};
    use spv_network::{PoolConfig, PoolNotification};

    use crate::support::{addr, funded_remote, Loopback};

    #[test]
    fn test_bad_proofs_abandon_download_peer() {
        let honest = funded_remote(&ChainParams::for_testing());
        let remotes = vec![
            (addr(1), honest.clone().with_corrupt_proofs()),
            (addr(2), honest.clone()),
            (addr(3), honest.clone()),
            (addr(4), honest),
        ];
        let mut network = Loopback::new(PoolConfig::for_testing(), remotes);
        network.start();

        let liar = network.peer(addr(1));
        assert!(network.pool.is_abandoned(&addr(1)));
        assert!(!network.is_live(liar));

        // The freed slot went to the spare address.
        let spare = network.peer(addr(4));
        assert!(network.is_live(spare));
        assert_eq!(network.pool.connected_count(), 3);

        assert_eq!(network.pool.chain().height(), 12);
        assert_eq!(network.wallet.transaction_count(), 2);
        assert_ne!(network.pool.download_peer(), Some(liar));

        let notifications = network.notifications().to_vec();
        assert!(notifications.contains(&PoolNotification::SyncCompleted { height: 12 }));
        assert!(!notifications
            .iter()
            .any(|n| matches!(n, PoolNotification::SyncFailed { .. })));
    }

    #[test]
    fn test_all_liars_fail_sync() {
        let liar = funded_remote(&ChainParams::for_testing()).with_corrupt_proofs();
        let remotes = (1..=6).map(|i| (addr(i), liar.clone())).collect();
        let mut network = Loopback::new(PoolConfig::for_testing(), remotes);
        network.start();

        assert_eq!(network.pool.chain().height(), 0);
        assert!(network
            .notifications()
            .iter()
            .any(|n| matches!(n, PoolNotification::SyncFailed { .. })));
    }
}
