pub mod errors;
pub mod events;
pub mod input;
pub mod matcher;
pub mod output;
pub mod tunnel;

pub use errors::TunnelError;
pub use events::{ForwardMessage, ForwardWatcher, OutputRef, TunnelMessage, TunnelWatcher};
pub use input::{ForwardInput, ForwardInputConfig, MatchHostConfig};
pub use output::{ForwardOutput, ForwardOutputConfig};
pub use tunnel::ForwardTunnel;

use crate::net::PipeStream;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

/// Accepts connections on the input and runs a tunnel mirroring each one to
/// every output. All lifecycle and I/O events go through a single observer.
pub struct Forwarder {
    input: ForwardInput,
    /// Output templates; each tunnel gets its own unconnected copies.
    outputs: Vec<ForwardOutput>,
    watcher: ForwardWatcher,
    connected_clients: Arc<RwLock<HashSet<SocketAddr>>>,
}

impl Forwarder {
    pub fn new(
        input: ForwardInput,
        outputs: Vec<ForwardOutput>,
        watcher: ForwardWatcher,
    ) -> Self {
        Self {
            input,
            outputs,
            watcher,
            connected_clients: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Peers with a live tunnel right now, for introspection.
    pub fn connected_clients(&self) -> Vec<SocketAddr> {
        self.connected_clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }

    /// Bind the input and accept until `cancel` fires. Bind failures are
    /// returned; accept failures are reported to the observer and the loop
    /// keeps going.
    pub async fn run(&self, cancel: CancellationToken) -> crate::Result<()> {
        let mut listener = self.input.listen().await?;
        tracing::info!("forwarder listening on {}", listener.local_addr()?);

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                accepted = listener.accept() => accepted,
            };
            let conn = match accepted {
                Ok(conn) => conn,
                Err(error) => {
                    (self.watcher)(ForwardMessage::AcceptError {
                        error: error.into(),
                    });
                    continue;
                }
            };
            let peer = conn.peer_addr();
            if !self.input.check_conn(peer) {
                // Dropping the stream closes it before any bytes flow; the
                // attempt is still reported.
                drop(conn);
                (self.watcher)(ForwardMessage::Accept {
                    peer,
                    blocked: true,
                });
                continue;
            }
            (self.watcher)(ForwardMessage::Accept {
                peer,
                blocked: false,
            });
            self.spawn_tunnel(conn, peer, cancel.child_token());
        }
    }

    fn spawn_tunnel(&self, conn: PipeStream, peer: SocketAddr, cancel: CancellationToken) {
        self.connected_clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(peer);

        let outputs: Vec<ForwardOutput> =
            self.outputs.iter().map(|o| o.clone_template()).collect();
        let watcher = Arc::clone(&self.watcher);
        let tunnel_watcher: TunnelWatcher = Arc::new(move |message| {
            watcher(ForwardMessage::Tunnel { peer, message });
        });
        let tunnel = ForwardTunnel::new(conn, outputs, tunnel_watcher, cancel);

        let connected_clients = Arc::clone(&self.connected_clients);
        tokio::spawn(async move {
            tracing::debug!("tunnel for {} started", peer);
            tunnel.run().await;
            tracing::debug!("tunnel for {} finished", peer);
            connected_clients
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&peer);
        });
    }
}
