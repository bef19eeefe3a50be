use crate::net::{ConnReader, ConnWriter, PipeListener, PipeStream};
use crate::protocol::NetProtocol;
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// UDP datagram buffer size, enough for a typical MTU plus headers.
const DATAGRAM_BUFFER_SIZE: usize = 2048;

/// Queued datagrams per peer before the overflow path kicks in.
const PEER_CHANNEL_SIZE: usize = 100;

/// How long an overflow datagram waits for a slow consumer before it is
/// dropped.
const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

type PeerMap = Arc<RwLock<HashMap<SocketAddr, mpsc::Sender<Vec<u8>>>>>;

/// Presents a single UDP socket as a listener of per-peer streams.
///
/// Each distinct remote address gets its own pseudo-connection backed by a
/// bounded inbound queue; at most one pseudo-connection exists per peer at a
/// time. Dropping a pseudo-connection unregisters the peer, and a later
/// datagram from the same peer starts a fresh one.
pub struct UdpStreamListener {
    socket: Arc<UdpSocket>,
    peers: PeerMap,
}

impl UdpStreamListener {
    pub async fn bind(protocol: NetProtocol, address: &str) -> io::Result<Self> {
        let addrs = super::resolve(protocol, address).await?;
        let socket = UdpSocket::bind(&addrs[..]).await?;
        tracing::debug!("udp listener bound on {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
            peers: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn sender_for(&self, peer: SocketAddr) -> Option<mpsc::Sender<Vec<u8>>> {
        self.peers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&peer)
            .cloned()
    }

    fn remove_peer(peers: &PeerMap, peer: SocketAddr) {
        peers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&peer);
    }
}

#[async_trait]
impl PipeListener for UdpStreamListener {
    /// Demultiplex datagrams until one arrives from an unknown peer, then
    /// return a pseudo-connection for it. A socket error ends the listener.
    async fn accept(&mut self) -> io::Result<PipeStream> {
        loop {
            let mut buf = vec![0u8; DATAGRAM_BUFFER_SIZE];
            let (n, peer) = self.socket.recv_from(&mut buf).await?;
            buf.truncate(n);

            let mut datagram = buf;
            if let Some(tx) = self.sender_for(peer) {
                match tx.try_send(datagram) {
                    Ok(()) => continue,
                    Err(TrySendError::Full(overflow)) => {
                        // Slow consumer: give it one second, then drop.
                        tokio::spawn(async move {
                            let _ = tokio::time::timeout(ENQUEUE_TIMEOUT, tx.send(overflow)).await;
                        });
                        continue;
                    }
                    Err(TrySendError::Closed(orphan)) => {
                        // The pseudo-connection went away between lookup and
                        // send; unregister it and start a fresh one below.
                        Self::remove_peer(&self.peers, peer);
                        datagram = orphan;
                    }
                }
            }

            let (tx, rx) = mpsc::channel(PEER_CHANNEL_SIZE);
            self.peers
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(peer, tx);

            let local = self.socket.local_addr()?;
            let reader = UdpPseudoReader {
                rx,
                pending: BytesMut::from(&datagram[..]),
                peers: Arc::clone(&self.peers),
                peer,
            };
            let writer = UdpPeerWriter {
                socket: Arc::clone(&self.socket),
                peer,
            };
            return Ok(PipeStream::new(
                Box::new(reader),
                Arc::new(writer),
                local,
                peer,
            ));
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

/// Read side of a pseudo-connection: drains the carried-over bytes of the
/// last datagram first, then waits on the inbound queue. A short caller
/// buffer leaves the remainder for the next read.
struct UdpPseudoReader {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: BytesMut,
    peers: PeerMap,
    peer: SocketAddr,
}

#[async_trait]
impl ConnReader for UdpPseudoReader {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv().await {
                Some(datagram) => self.pending.extend_from_slice(&datagram),
                // The listener is gone; nothing more will arrive.
                None => return Ok(0),
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

impl Drop for UdpPseudoReader {
    fn drop(&mut self) {
        // Unregister so a later datagram from this peer opens a new
        // pseudo-connection; this is also what bounds the demux map.
        UdpStreamListener::remove_peer(&self.peers, self.peer);
    }
}

/// Write side of a pseudo-connection: one datagram per write, through the
/// shared listening socket.
struct UdpPeerWriter {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

#[async_trait]
impl ConnWriter for UdpPeerWriter {
    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send_to(buf, self.peer).await
    }

    async fn shutdown(&self) {
        // The socket is shared with every other pseudo-connection.
    }
}

/// Dial a UDP destination by binding an ephemeral socket and connecting it.
pub(crate) async fn dial(protocol: NetProtocol, address: &str) -> io::Result<PipeStream> {
    let addrs = super::resolve(protocol, address).await?;
    let remote = addrs[0];
    let bind_addr = if remote.is_ipv4() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    } else {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(remote).await?;
    let socket = Arc::new(socket);
    let local = socket.local_addr()?;
    Ok(PipeStream::new(
        Box::new(UdpConnReader {
            socket: Arc::clone(&socket),
        }),
        Arc::new(UdpConnWriter { socket }),
        local,
        remote,
    ))
}

struct UdpConnReader {
    socket: Arc<UdpSocket>,
}

#[async_trait]
impl ConnReader for UdpConnReader {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf).await
    }
}

struct UdpConnWriter {
    socket: Arc<UdpSocket>,
}

#[async_trait]
impl ConnWriter for UdpConnWriter {
    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf).await
    }

    async fn shutdown(&self) {}
}
