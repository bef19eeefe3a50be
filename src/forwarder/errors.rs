use std::fmt;
use std::fmt::Display;

/// Errors raised inside a tunnel and surfaced through observer events.
#[derive(Debug)]
pub enum TunnelError {
    /// An output accepted fewer bytes than the chunk carried.
    ShortWrite { want: usize, got: usize },
    /// Lazily dialing an output failed. The connection is not cached, the
    /// next operation on the output dials again.
    Dial(crate::Error),
}

impl std::error::Error for TunnelError {}

impl Display for TunnelError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TunnelError::ShortWrite { want, got } => {
                write!(fmt, "write not match, want {}, got {}", want, got)
            }
            TunnelError::Dial(e) => write!(fmt, "dial output error: {}", e),
        }
    }
}
