//! # Publish Scenario
//!
//! A signed wallet transaction is announced to every connected peer but the
//! first. When that peer later relays it back, the wallet records one
//! independent sighting.

#[cfg(test)]
mod tests {
    use shared_types::Transaction;
    use spv_chain::ChainParams;
    use spv_network::domain::InvItem;
    use spv_network::{Message, PoolConfig, PoolNotification, PoolTask, PublishError};
    use tokio::sync::oneshot;

    use crate::support::{addr, funded_remote, payment, Loopback};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn synced_network() -> Loopback {
        let remote = funded_remote(&ChainParams::for_testing());
        let remotes = (1..=3).map(|i| (addr(i), remote.clone())).collect();
        let mut network = Loopback::new(PoolConfig::for_testing(), remotes);
        network.start();
        network
    }

    fn publish(network: &mut Loopback, tx: Transaction) -> Result<(), PublishError> {
        let (reply, mut response) = oneshot::channel();
        network.pool.apply(PoolTask::Publish { tx, reply });
        network.run();
        match response.try_recv() {
            Ok(result) => result,
            Err(e) => panic!("publish was not answered: {e}"),
        }
    }

    // =============================================================================
    // SCENARIOS
    // =============================================================================

    #[test]
    fn test_publish_reaches_all_but_first_peer() {
        let mut network = synced_network();
        let tx = payment(0x33);
        let hash = tx.hash();

        assert_eq!(publish(&mut network, tx.clone()), Ok(()));
        assert_eq!(network.wallet.published(), vec![hash]);

        let first = network.peer(addr(1));
        assert!(network.remote(first).received().is_empty());
        for i in 2..=3 {
            let peer = network.peer(addr(i));
            assert_eq!(network.remote(peer).received(), &[tx.clone()][..]);
        }

        // The skipped peer hears of it elsewhere and relays it back.
        network.remote_mut(first).learn(tx);
        network.deliver(first, Message::Inv(vec![InvItem::tx(hash)]));

        assert!(network
            .notifications()
            .contains(&PoolNotification::TxSeen { hash, peers: 1 }));
        assert_eq!(network.wallet.seen_count(&hash), 1);
    }

    #[test]
    fn test_unsigned_transaction_is_rejected() {
        let mut network = synced_network();
        let mut tx = payment(0x34);
        tx.inputs[0].script_sig.clear();

        assert_eq!(publish(&mut network, tx), Err(PublishError::Unsigned));
        assert!(network.wallet.published().is_empty());
        for i in 1..=3 {
            let peer = network.peer(addr(i));
            assert!(network.remote(peer).received().is_empty());
        }
    }
}
