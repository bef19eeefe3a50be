use crate::forwarder::matcher::match_address;
use crate::net::{self, ListenerFactory, NetFactory, PipeListener};
use crate::protocol::NetProtocol;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

/// One ingress access-control entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchHostConfig {
    /// `host[:port]` pattern, e.g. "192.0.2.1:25", "[2001:db8::1]:80",
    /// "192.0.2.*".
    pub pattern: String,
    /// Entry applies regardless of the input protocol.
    pub any_proto: bool,
    pub protocol: NetProtocol,
}

/// Configuration of the listening side of the pipe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardInputConfig {
    /// Empty means all interfaces.
    pub host: String,
    pub port: u16,
    pub protocol: NetProtocol,
    /// At most one of blacklist/whitelist may be non-empty.
    pub blacklist: Vec<MatchHostConfig>,
    pub whitelist: Vec<MatchHostConfig>,
}

/// The listening side of the pipe: binds the listener and applies the
/// blacklist/whitelist to accepted peers.
pub struct ForwardInput {
    config: ForwardInputConfig,
    factory: Arc<dyn ListenerFactory>,
}

impl ForwardInput {
    /// A `factory` of `None` listens through the OS network stack; callers
    /// tunneling the listener through SSH pass their own.
    pub fn new(
        config: ForwardInputConfig,
        factory: Option<Arc<dyn ListenerFactory>>,
    ) -> crate::Result<Self> {
        if !config.blacklist.is_empty() && !config.whitelist.is_empty() {
            return Err("blacklist and whitelist are mutually exclusive".into());
        }
        Ok(Self {
            config,
            factory: factory.unwrap_or_else(|| Arc::new(NetFactory)),
        })
    }

    pub fn config(&self) -> &ForwardInputConfig {
        &self.config
    }

    pub async fn listen(&self) -> io::Result<Box<dyn PipeListener>> {
        let addr = net::listen_addr(self.config.protocol, &self.config.host, self.config.port);
        self.factory.listen(self.config.protocol, &addr).await
    }

    /// Whether a connection from `peer` passes the configured access rules.
    ///
    /// A matching blacklist entry denies when it is `any_proto` or names the
    /// input's protocol; a whitelist admits only peers with such a match.
    pub fn check_conn(&self, peer: SocketAddr) -> bool {
        let address = peer.to_string();
        if !self.config.blacklist.is_empty() {
            for entry in &self.config.blacklist {
                if match_address(&entry.pattern, &address)
                    && (entry.any_proto || entry.protocol == self.config.protocol)
                {
                    return false;
                }
            }
            return true;
        }
        if !self.config.whitelist.is_empty() {
            for entry in &self.config.whitelist {
                if match_address(&entry.pattern, &address)
                    && (entry.any_proto || entry.protocol == self.config.protocol)
                {
                    return true;
                }
            }
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pattern: &str, any_proto: bool, protocol: NetProtocol) -> MatchHostConfig {
        MatchHostConfig {
            pattern: pattern.to_string(),
            any_proto,
            protocol,
        }
    }

    fn input(
        blacklist: Vec<MatchHostConfig>,
        whitelist: Vec<MatchHostConfig>,
    ) -> ForwardInput {
        ForwardInput::new(
            ForwardInputConfig {
                host: String::new(),
                port: 9000,
                protocol: NetProtocol::Tcp,
                blacklist,
                whitelist,
            },
            None,
        )
        .unwrap()
    }

    fn peer(addr: &str) -> SocketAddr {
        addr.parse().unwrap()
    }

    #[test]
    fn test_no_rules_allows() {
        assert!(input(vec![], vec![]).check_conn(peer("127.0.0.1:1234")));
    }

    #[test]
    fn test_blacklist_any_proto_denies() {
        let input = input(vec![entry("127.0.0.1:*", true, NetProtocol::Udp)], vec![]);
        assert!(!input.check_conn(peer("127.0.0.1:1234")));
        assert!(input.check_conn(peer("10.0.0.1:1234")));
    }

    #[test]
    fn test_blacklist_proto_bound() {
        // The entry names udp, the input is tcp: the match does not deny.
        let input = input(vec![entry("127.0.0.1:*", false, NetProtocol::Udp)], vec![]);
        assert!(input.check_conn(peer("127.0.0.1:1234")));

        let input = ForwardInput::new(
            ForwardInputConfig {
                protocol: NetProtocol::Tcp,
                blacklist: vec![entry("127.0.0.1:*", false, NetProtocol::Tcp)],
                ..Default::default()
            },
            None,
        )
        .unwrap();
        assert!(!input.check_conn(peer("127.0.0.1:1234")));
    }

    #[test]
    fn test_whitelist_admits_only_matches() {
        let input = input(vec![], vec![entry("192.168.1.*", true, NetProtocol::Tcp)]);
        assert!(input.check_conn(peer("192.168.1.7:50000")));
        assert!(!input.check_conn(peer("10.0.0.1:50000")));
    }

    #[test]
    fn test_whitelist_proto_mismatch_denies() {
        let input = input(vec![], vec![entry("*", false, NetProtocol::Udp)]);
        assert!(!input.check_conn(peer("192.168.1.7:50000")));
    }

    #[test]
    fn test_both_lists_rejected() {
        let result = ForwardInput::new(
            ForwardInputConfig {
                blacklist: vec![entry("*", true, NetProtocol::Tcp)],
                whitelist: vec![entry("*", true, NetProtocol::Tcp)],
                ..Default::default()
            },
            None,
        );
        assert!(result.is_err());
    }
}
