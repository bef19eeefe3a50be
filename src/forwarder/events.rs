use crate::forwarder::output::ForwardOutputConfig;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;

/// Identifies the output a tunnel event refers to.
#[derive(Debug, Clone)]
pub struct OutputRef {
    pub config: ForwardOutputConfig,
    /// Remote address of the live connection, if one was dialed.
    pub addr: Option<SocketAddr>,
}

impl OutputRef {
    /// Live remote address when connected, configured target otherwise.
    pub fn address(&self) -> String {
        match self.addr {
            Some(addr) => addr.to_string(),
            None => self.config.target(),
        }
    }
}

/// Per-tunnel observer event.
///
/// Within one direction the order read-then-write is preserved; across
/// directions no order is guaranteed. `TunnelClosed` is always the final
/// event of a tunnel.
#[derive(Debug)]
pub enum TunnelMessage {
    InputRead { data: Bytes },
    InputReadError { error: crate::Error },
    WriteToInputOk { output: OutputRef, data: Bytes },
    WriteToInputError { output: OutputRef, error: crate::Error },
    OutputRead { output: OutputRef, data: Bytes },
    OutputReadError { output: OutputRef, error: crate::Error },
    WriteToOutputOk { output: OutputRef, data: Bytes },
    WriteToOutputError { output: OutputRef, error: crate::Error },
    TunnelClosed { closed_by_output: bool },
}

/// Top-level observer event.
#[derive(Debug)]
pub enum ForwardMessage {
    /// A connection reached the listener. Blocked connections were closed by
    /// access control before any bytes flowed.
    Accept { peer: SocketAddr, blocked: bool },
    AcceptError { error: crate::Error },
    Tunnel { peer: SocketAddr, message: TunnelMessage },
    Error { error: crate::Error },
}

/// Observer callback. Invoked from many tasks concurrently; implementations
/// must be thread-safe.
pub type ForwardWatcher = Arc<dyn Fn(ForwardMessage) + Send + Sync>;

/// Per-tunnel observer callback, same thread-safety contract as
/// [`ForwardWatcher`].
pub type TunnelWatcher = Arc<dyn Fn(TunnelMessage) + Send + Sync>;
