use crate::forwarder::errors::TunnelError;
use crate::forwarder::events::OutputRef;
use crate::net::{ConnReader, ConnWriter, Dialer, NetFactory};
use crate::protocol::NetProtocol;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Configuration of one egress destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardOutputConfig {
    /// Empty dials the loopback address.
    pub host: String,
    pub port: u16,
    pub protocol: NetProtocol,
    /// Bytes read back from this destination are mirrored to the ingress.
    pub readable: bool,
    /// Bytes from the ingress are mirrored to this destination.
    pub writable: bool,
}

impl ForwardOutputConfig {
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn dial_addr(&self) -> String {
        let host = if self.host.is_empty() {
            "127.0.0.1"
        } else {
            self.host.as_str()
        };
        crate::net::join_host_port(host, self.port)
    }
}

struct OutputConn {
    reader: Mutex<Box<dyn ConnReader>>,
    writer: Arc<dyn ConnWriter>,
    peer_addr: SocketAddr,
}

/// A single egress destination with a lazily dialed, cached connection.
///
/// The first read or write dials; concurrent first users share one dial
/// attempt through the cell. A failed dial is not cached, the next
/// operation dials again. Each tunnel works on its own copy (see
/// [`ForwardOutput::clone_template`]) so connections are never shared
/// across tunnels.
pub struct ForwardOutput {
    config: ForwardOutputConfig,
    dialer: Arc<dyn Dialer>,
    conn: OnceCell<OutputConn>,
}

impl ForwardOutput {
    /// A `dialer` of `None` dials through the OS network stack; callers
    /// tunneling this output through SSH pass their own. An output that is
    /// neither readable nor writable is rejected.
    pub fn new(
        config: ForwardOutputConfig,
        dialer: Option<Arc<dyn Dialer>>,
    ) -> crate::Result<Self> {
        if !config.readable && !config.writable {
            return Err(format!(
                "output {} is neither readable nor writable",
                config.target()
            )
            .into());
        }
        Ok(Self {
            config,
            dialer: dialer.unwrap_or_else(|| Arc::new(NetFactory)),
            conn: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &ForwardOutputConfig {
        &self.config
    }

    /// Fresh unconnected output sharing this one's config and dialer. The
    /// forwarder hands each tunnel its own copy so the dialed connection is
    /// cached per tunnel.
    pub fn clone_template(&self) -> Self {
        Self {
            config: self.config.clone(),
            dialer: Arc::clone(&self.dialer),
            conn: OnceCell::new(),
        }
    }

    /// Remote address of the live connection, if one was dialed.
    pub fn conn_addr(&self) -> Option<SocketAddr> {
        self.conn
            .get()
            .map(|c| c.peer_addr)
            .filter(|a| a.port() != 0)
    }

    pub(crate) fn output_ref(&self) -> OutputRef {
        OutputRef {
            config: self.config.clone(),
            addr: self.conn_addr(),
        }
    }

    async fn conn(&self) -> crate::Result<&OutputConn> {
        self.conn
            .get_or_try_init(|| async {
                let stream = self
                    .dialer
                    .dial(self.config.protocol, &self.config.dial_addr())
                    .await
                    .map_err(|e| TunnelError::Dial(e.into()))?;
                tracing::debug!("output {} connected to {}", self.config.target(), stream.peer_addr());
                let peer_addr = stream.peer_addr();
                let (reader, writer) = stream.into_split();
                Ok::<_, crate::Error>(OutputConn {
                    reader: Mutex::new(reader),
                    writer,
                    peer_addr,
                })
            })
            .await
    }

    /// Mirror `buf` to the destination. A non-writable output reports zero
    /// bytes without dialing.
    pub async fn write(&self, buf: &[u8]) -> crate::Result<usize> {
        if !self.config.writable {
            return Ok(0);
        }
        let conn = self.conn().await?;
        Ok(conn.writer.write(buf).await?)
    }

    /// Read from the destination, dialing on first use. Reads are not gated
    /// on `readable`; the tunnel drains non-readable outputs and discards.
    pub async fn read(&self, buf: &mut [u8]) -> crate::Result<usize> {
        let conn = self.conn().await?;
        let mut reader = conn.reader.lock().await;
        Ok(reader.read(buf).await?)
    }

    /// Shut down the connection if one was dialed.
    pub async fn close(&self) {
        if let Some(conn) = self.conn.get() {
            conn.writer.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(readable: bool, writable: bool) -> ForwardOutputConfig {
        ForwardOutputConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            protocol: NetProtocol::Tcp,
            readable,
            writable,
        }
    }

    #[test]
    fn test_silent_output_rejected() {
        assert!(ForwardOutput::new(config(false, false), None).is_err());
        assert!(ForwardOutput::new(config(true, false), None).is_ok());
        assert!(ForwardOutput::new(config(false, true), None).is_ok());
    }

    #[test]
    fn test_template_clone_is_unconnected() {
        let output = ForwardOutput::new(config(true, true), None).unwrap();
        let copy = output.clone_template();
        assert!(copy.conn_addr().is_none());
        assert_eq!(copy.config().target(), "127.0.0.1:1");
    }

    #[tokio::test]
    async fn test_non_writable_write_is_noop() {
        // Port 1 is not dialed at all: the write path short-circuits.
        let output = ForwardOutput::new(config(true, false), None).unwrap();
        let n = output.write(b"hello").await.unwrap();
        assert_eq!(n, 0);
        assert!(output.conn_addr().is_none());
    }

    #[test]
    fn test_dial_addr_defaults_to_loopback() {
        let mut cfg = config(true, true);
        cfg.host = String::new();
        assert_eq!(cfg.dial_addr(), "127.0.0.1:1");
    }
}
