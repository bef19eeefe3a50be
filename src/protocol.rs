use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

/// Transport protocol of a listening or dialing endpoint.
///
/// The `*4`/`*6` variants pin the address family; the bare variants accept
/// whatever the resolver returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetProtocol {
    #[default]
    Tcp,
    Tcp4,
    Tcp6,
    Udp,
    Udp4,
    Udp6,
}

impl NetProtocol {
    pub fn is_udp(&self) -> bool {
        matches!(self, NetProtocol::Udp | NetProtocol::Udp4 | NetProtocol::Udp6)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetProtocol::Tcp => "tcp",
            NetProtocol::Tcp4 => "tcp4",
            NetProtocol::Tcp6 => "tcp6",
            NetProtocol::Udp => "udp",
            NetProtocol::Udp4 => "udp4",
            NetProtocol::Udp6 => "udp6",
        }
    }
}

impl Display for NetProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The protocol name was not one of tcp/tcp4/tcp6/udp/udp4/udp6.
#[derive(Debug)]
pub struct ParseProtocolError(String);

impl std::error::Error for ParseProtocolError {}

impl Display for ParseProtocolError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "invalid protocol: {}", self.0)
    }
}

impl FromStr for NetProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(NetProtocol::Tcp),
            "tcp4" => Ok(NetProtocol::Tcp4),
            "tcp6" => Ok(NetProtocol::Tcp6),
            "udp" => Ok(NetProtocol::Udp),
            "udp4" => Ok(NetProtocol::Udp4),
            "udp6" => Ok(NetProtocol::Udp6),
            other => Err(ParseProtocolError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("tcp".parse::<NetProtocol>().unwrap(), NetProtocol::Tcp);
        assert_eq!("TCP".parse::<NetProtocol>().unwrap(), NetProtocol::Tcp);
        assert_eq!("Udp6".parse::<NetProtocol>().unwrap(), NetProtocol::Udp6);
        assert_eq!("tcp4".parse::<NetProtocol>().unwrap(), NetProtocol::Tcp4);
    }

    #[test]
    fn test_parse_invalid() {
        assert!("quic".parse::<NetProtocol>().is_err());
        assert!("".parse::<NetProtocol>().is_err());
    }

    #[test]
    fn test_display_lowercase() {
        assert_eq!(NetProtocol::Tcp6.to_string(), "tcp6");
        assert_eq!(NetProtocol::Udp.to_string(), "udp");
    }

    #[test]
    fn test_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&NetProtocol::Udp4).unwrap(), "\"udp4\"");
        let p: NetProtocol = serde_json::from_str("\"tcp\"").unwrap();
        assert_eq!(p, NetProtocol::Tcp);
    }

    #[test]
    fn test_is_udp() {
        assert!(NetProtocol::Udp.is_udp());
        assert!(NetProtocol::Udp6.is_udp());
        assert!(!NetProtocol::Tcp4.is_udp());
    }
}
