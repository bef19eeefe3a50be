pub mod tcp;
pub mod udp;

use crate::protocol::NetProtocol;
use async_trait::async_trait;
use std::io;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::lookup_host;

/// Read half of a forwarded byte stream.
///
/// There is exactly one reader per stream; `Ok(0)` means the peer closed its
/// write direction.
#[async_trait]
pub trait ConnReader: Send {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Write half of a forwarded byte stream.
///
/// Implementations must tolerate concurrent callers: a tunnel writes to its
/// ingress from one task per output.
#[async_trait]
pub trait ConnWriter: Send + Sync {
    async fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Best-effort shutdown of the write direction.
    async fn shutdown(&self);
}

/// A bidirectional stream as produced by a listener or dialer.
pub struct PipeStream {
    reader: Box<dyn ConnReader>,
    writer: Arc<dyn ConnWriter>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl PipeStream {
    pub fn new(
        reader: Box<dyn ConnReader>,
        writer: Arc<dyn ConnWriter>,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
    ) -> Self {
        Self {
            reader,
            writer,
            local_addr,
            peer_addr,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Split into the exclusive reader and the shareable writer.
    pub fn into_split(self) -> (Box<dyn ConnReader>, Arc<dyn ConnWriter>) {
        (self.reader, self.writer)
    }
}

/// Accepts inbound streams. For UDP the "streams" are pseudo-connections
/// synthesized per remote peer, see [`udp::UdpStreamListener`].
#[async_trait]
pub trait PipeListener: Send {
    async fn accept(&mut self) -> io::Result<PipeStream>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Opens outbound connections.
///
/// The default implementation dials through the OS network stack; callers
/// tunneling through SSH supply their own.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, protocol: NetProtocol, address: &str) -> io::Result<PipeStream>;
}

/// Binds listeners. Same injection seam as [`Dialer`], for the listening side.
#[async_trait]
pub trait ListenerFactory: Send + Sync {
    async fn listen(
        &self,
        protocol: NetProtocol,
        address: &str,
    ) -> io::Result<Box<dyn PipeListener>>;
}

/// OS-backed [`ListenerFactory`] and [`Dialer`].
pub struct NetFactory;

#[async_trait]
impl ListenerFactory for NetFactory {
    async fn listen(
        &self,
        protocol: NetProtocol,
        address: &str,
    ) -> io::Result<Box<dyn PipeListener>> {
        if protocol.is_udp() {
            Ok(Box::new(udp::UdpStreamListener::bind(protocol, address).await?))
        } else {
            Ok(Box::new(tcp::TcpPipeListener::bind(protocol, address).await?))
        }
    }
}

#[async_trait]
impl Dialer for NetFactory {
    async fn dial(&self, protocol: NetProtocol, address: &str) -> io::Result<PipeStream> {
        if protocol.is_udp() {
            udp::dial(protocol, address).await
        } else {
            tcp::dial(protocol, address).await
        }
    }
}

/// Resolve `address`, keeping only addresses in the protocol's family.
pub(crate) async fn resolve(
    protocol: NetProtocol,
    address: &str,
) -> io::Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = lookup_host(address).await?.collect();
    let addrs: Vec<SocketAddr> = match protocol {
        NetProtocol::Tcp4 | NetProtocol::Udp4 => {
            addrs.into_iter().filter(|a| a.is_ipv4()).collect()
        }
        NetProtocol::Tcp6 | NetProtocol::Udp6 => {
            addrs.into_iter().filter(|a| a.is_ipv6()).collect()
        }
        _ => addrs,
    };
    if addrs.is_empty() {
        return Err(io::Error::new(
            ErrorKind::AddrNotAvailable,
            format!("no {} address for {}", protocol, address),
        ));
    }
    Ok(addrs)
}

/// Build the bind address for a configured `host:port`, defaulting an empty
/// host to the wildcard address of the protocol's family.
pub fn listen_addr(protocol: NetProtocol, host: &str, port: u16) -> String {
    if host.is_empty() {
        return match protocol {
            NetProtocol::Tcp6 | NetProtocol::Udp6 => format!("[::]:{}", port),
            _ => format!("0.0.0.0:{}", port),
        };
    }
    join_host_port(host, port)
}

/// Join `host` and `port`, bracketing raw IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        return format!("[{}]:{}", host, port);
    }
    format!("{}:{}", host, port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_addr_wildcard() {
        assert_eq!(listen_addr(NetProtocol::Tcp, "", 9000), "0.0.0.0:9000");
        assert_eq!(listen_addr(NetProtocol::Udp4, "", 9000), "0.0.0.0:9000");
        assert_eq!(listen_addr(NetProtocol::Tcp6, "", 9000), "[::]:9000");
    }

    #[test]
    fn test_listen_addr_ipv6_literal() {
        assert_eq!(listen_addr(NetProtocol::Tcp, "::1", 80), "[::1]:80");
        assert_eq!(listen_addr(NetProtocol::Tcp, "[::1]", 80), "[::1]:80");
        assert_eq!(listen_addr(NetProtocol::Tcp, "127.0.0.1", 80), "127.0.0.1:80");
    }
}
