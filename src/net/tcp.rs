use crate::net::{ConnReader, ConnWriter, PipeListener, PipeStream};
use crate::protocol::NetProtocol;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// Plain TCP listener yielding [`PipeStream`]s.
pub struct TcpPipeListener {
    listener: TcpListener,
}

impl TcpPipeListener {
    pub async fn bind(protocol: NetProtocol, address: &str) -> io::Result<Self> {
        let addrs = super::resolve(protocol, address).await?;
        let listener = TcpListener::bind(&addrs[..]).await?;
        Ok(Self { listener })
    }
}

#[async_trait]
impl PipeListener for TcpPipeListener {
    async fn accept(&mut self) -> io::Result<PipeStream> {
        let (socket, peer) = self.listener.accept().await?;
        let local = socket.local_addr()?;
        Ok(into_pipe(socket, local, peer))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// Dial a TCP destination, honoring the protocol's address family.
pub(crate) async fn dial(protocol: NetProtocol, address: &str) -> io::Result<PipeStream> {
    let addrs = super::resolve(protocol, address).await?;
    let socket = TcpStream::connect(&addrs[..]).await?;
    let local = socket.local_addr()?;
    let peer = socket.peer_addr()?;
    Ok(into_pipe(socket, local, peer))
}

fn into_pipe(socket: TcpStream, local: SocketAddr, peer: SocketAddr) -> PipeStream {
    let (read_half, write_half) = socket.into_split();
    PipeStream::new(
        Box::new(TcpReader { half: read_half }),
        Arc::new(TcpWriter {
            half: Mutex::new(write_half),
        }),
        local,
        peer,
    )
}

struct TcpReader {
    half: OwnedReadHalf,
}

#[async_trait]
impl ConnReader for TcpReader {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.half.read(buf).await
    }
}

/// The mutex serializes writers; a tunnel writes to the ingress from one
/// task per output.
struct TcpWriter {
    half: Mutex<OwnedWriteHalf>,
}

#[async_trait]
impl ConnWriter for TcpWriter {
    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut half = self.half.lock().await;
        half.write_all(buf).await?;
        half.flush().await?;
        Ok(buf.len())
    }

    async fn shutdown(&self) {
        let _ = self.half.lock().await.shutdown().await;
    }
}
