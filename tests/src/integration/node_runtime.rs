//! # Node Runtime Scenarios
//!
//! The assembled node over real sockets: the TCP connector, the tokio
//! watchdog and the sequencer worker together.

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use spv_bloom_filters::WatchList;
    use spv_chain::ChainParams;
    use spv_network::{FrameCodec, PoolStatus, SpvConfig};
    use spv_node::NodeRuntime;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    use crate::support::{wallet_watch_list, RemotePeer};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// Serve `remote` to every inbound connection.
    async fn serve(remote: RemotePeer, params: ChainParams) -> (SocketAddr, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(answer_connection(stream, remote.clone(), params.magic));
            }
        });
        (address, task)
    }

    async fn answer_connection(mut stream: TcpStream, mut remote: RemotePeer, magic: u32) {
        let codec = FrameCodec::new(magic);
        let mut buffer = Vec::new();
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buffer.extend_from_slice(&chunk[..n]);
            while let Ok(Some(message)) = codec.decode(&mut buffer) {
                for reply in remote.answer(message) {
                    if stream.write_all(&codec.encode(&reply)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    async fn wait_for_height(node: &NodeRuntime, height: i32) -> PoolStatus {
        for _ in 0..200 {
            let status = node.pool().status().await.unwrap();
            if status.height >= height {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("node never reached height {height}");
    }

    // =============================================================================
    // SCENARIOS
    // =============================================================================

    #[tokio::test]
    async fn test_runtime_starts_without_peers() {
        let node = NodeRuntime::start(SpvConfig::for_testing(), WatchList::default())
            .await
            .unwrap();

        let status = node.log_status().await.unwrap();
        assert!(status.running);
        assert_eq!(status.height, 0);
        assert_eq!(status.connected_peers, 0);
        assert!(!status.synchronizing);

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_runtime_syncs_over_tcp() {
        let params = ChainParams::regtest();
        let mut remote = RemotePeer::new(&params);
        remote.mine_empty(10);
        let tip = remote.tip().hash();
        let (address, server) = serve(remote, params).await;

        let config = SpvConfig {
            seed_peers: vec![address],
            ..SpvConfig::for_testing()
        };
        let node = NodeRuntime::start(config, wallet_watch_list()).await.unwrap();

        let status = wait_for_height(&node, 10).await;
        assert_eq!(status.height, 10);
        assert_eq!(status.tip, tip);
        assert_eq!(status.connected_peers, 1);

        node.shutdown().await;
        server.abort();
    }
}
