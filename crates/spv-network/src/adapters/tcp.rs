//! TCP connector: one tokio task per peer owning the socket and its session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use spv_chain::{ChainParams, SystemTimeSource, TimeSource};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::domain::{DisconnectReason, FrameCodec, PeerEvent, PeerId, SessionCommand};
use crate::ports::{PeerConnector, PeerLink, WalletGateway};
use crate::service::{EventSink, PeerSession};

const READ_CHUNK: usize = 64 * 1024;

/// Opens real connections to the configured network.
pub struct TcpConnector {
    config: SessionConfig,
    params: ChainParams,
    wallet: Arc<dyn WalletGateway>,
    clock: Arc<dyn TimeSource>,
}

impl TcpConnector {
    pub fn new(config: SessionConfig, params: ChainParams, wallet: Arc<dyn WalletGateway>) -> Self {
        Self::with_clock(config, params, wallet, Arc::new(SystemTimeSource))
    }

    pub fn with_clock(
        config: SessionConfig,
        params: ChainParams,
        wallet: Arc<dyn WalletGateway>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            config,
            params,
            wallet,
            clock,
        }
    }
}

impl PeerConnector for TcpConnector {
    fn connect(
        &self,
        peer: PeerId,
        address: SocketAddr,
        local_height: i32,
        sink: EventSink,
    ) -> PeerLink {
        let (link, commands) = PeerLink::channel();
        let session = PeerSession::new(
            peer,
            address,
            self.config.clone(),
            self.params.clone(),
            self.wallet.clone(),
            self.clock.clone(),
        );
        let connection = Connection {
            session,
            codec: FrameCodec::new(self.params.magic),
            sink,
            connect_timeout: self.config.connect_timeout(),
            inactivity: self.config.inactivity_timeout(),
        };
        tokio::spawn(connection.run(local_height, commands));
        link
    }
}

struct Connection {
    session: PeerSession,
    codec: FrameCodec,
    sink: EventSink,
    connect_timeout: Duration,
    inactivity: Duration,
}

impl Connection {
    async fn run(
        mut self,
        local_height: i32,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    ) {
        let peer = self.session.id();
        let address = self.session.address();
        let stream = match timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(%peer, %address, error = %e, "Connect failed");
                self.report_connect_failure().await;
                return;
            }
            Err(_) => {
                debug!(%peer, %address, "Connect timed out");
                self.report_connect_failure().await;
                return;
            }
        };
        let (mut reader, mut writer) = stream.into_split();

        self.session.connect(local_height);
        let mut buffer = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut deadline = Instant::now() + self.inactivity;

        loop {
            if !self.flush(&mut writer).await {
                self.session.close(DisconnectReason::Normal);
                self.flush(&mut writer).await;
                break;
            }
            if self.session.is_closed() {
                break;
            }

            tokio::select! {
                read = reader.read(&mut chunk) => match read {
                    Ok(0) => self.session.close(DisconnectReason::Normal),
                    Ok(n) => {
                        deadline = Instant::now() + self.inactivity;
                        buffer.extend_from_slice(&chunk[..n]);
                        self.decode_frames(&mut buffer);
                    }
                    Err(e) => {
                        debug!(%peer, error = %e, "Socket read failed");
                        self.session.close(DisconnectReason::Normal);
                    }
                },
                command = commands.recv() => match command {
                    Some(command) => self.session.handle_command(command),
                    None => self.session.close(DisconnectReason::Normal),
                },
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(%peer, "Socket inactive");
                    self.session.close(DisconnectReason::Timeout);
                }
            }
        }

        let _ = writer.shutdown().await;
        debug!(%peer, %address, "Connection task finished");
    }

    async fn report_connect_failure(&self) {
        let _ = self
            .sink
            .peer_event(
                self.session.id(),
                PeerEvent::Disconnected(DisconnectReason::Timeout),
            )
            .await;
    }

    fn decode_frames(&mut self, buffer: &mut Vec<u8>) {
        loop {
            let result = self
                .codec
                .decode(buffer)
                .and_then(|message| match message {
                    Some(message) => self.session.handle_message(message).map(|()| true),
                    None => Ok(false),
                });
            match result {
                Ok(true) => continue,
                Ok(false) => return,
                Err(e) => {
                    warn!(peer = %self.session.id(), error = %e, "Protocol violation");
                    self.session.close(e.disconnect_reason());
                    return;
                }
            }
        }
    }

    /// Write queued messages and forward events. `false` once the socket or
    /// the pool is gone.
    async fn flush(&mut self, writer: &mut OwnedWriteHalf) -> bool {
        let output = self.session.drain();
        let mut alive = true;
        for message in &output.messages {
            if let Err(e) = writer.write_all(&self.codec.encode(message)).await {
                debug!(peer = %self.session.id(), error = %e, "Socket write failed");
                alive = false;
                break;
            }
        }
        for event in output.events {
            if !self.sink.peer_event(self.session.id(), event).await {
                alive = false;
            }
        }
        alive
    }
}
