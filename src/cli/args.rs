use crate::forwarder::{ForwardInputConfig, ForwardOutputConfig, MatchHostConfig};
use crate::protocol::NetProtocol;
use anyhow::{Context, ensure};
use clap::Parser;

/// Mirror a local listening endpoint to one or more remote endpoints.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Listening endpoint: [host]:port[@proto]
    pub input: String,

    /// Comma-separated outputs: [host]:port[@proto][DIR] where DIR is '<'
    /// (read-only), '>' (write-only) or '=' (bidirectional, the default)
    pub outputs: String,

    /// Also print data events with payload previews
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit events as JSON lines instead of colored text
    #[arg(long)]
    pub json: bool,

    /// Deny peers matching PATTERN (host[:port][@proto]); repeatable
    #[arg(long = "block", value_name = "PATTERN", conflicts_with = "allow")]
    pub block: Vec<String>,

    /// Admit only peers matching PATTERN (host[:port][@proto]); repeatable
    #[arg(long = "allow", value_name = "PATTERN")]
    pub allow: Vec<String>,
}

/// A `host:port@proto` endpoint before input/output specialization.
#[derive(Debug, Clone, PartialEq)]
pub struct NetAddr {
    pub host: String,
    pub port: u16,
    pub protocol: NetProtocol,
    /// The endpoint used the `ssh:` form and must go through an injected
    /// SSH listener or dialer.
    pub via_ssh: bool,
}

#[derive(Debug)]
pub struct ParsedInput {
    pub config: ForwardInputConfig,
    pub via_ssh: bool,
}

#[derive(Debug)]
pub struct ParsedOutput {
    pub config: ForwardOutputConfig,
    pub via_ssh: bool,
}

pub fn parse_input(addr: &str) -> anyhow::Result<ParsedInput> {
    let addr = parse_net_addr(addr, true)?;
    Ok(ParsedInput {
        config: ForwardInputConfig {
            host: addr.host,
            port: addr.port,
            protocol: addr.protocol,
            blacklist: vec![],
            whitelist: vec![],
        },
        via_ssh: addr.via_ssh,
    })
}

pub fn parse_outputs(specs: &str) -> anyhow::Result<Vec<ParsedOutput>> {
    specs.trim().split(',').map(parse_output).collect()
}

pub fn parse_output(spec: &str) -> anyhow::Result<ParsedOutput> {
    let spec = spec.trim();
    let (rest, readable, writable) = if let Some(rest) = spec.strip_suffix('<') {
        (rest, true, false)
    } else if let Some(rest) = spec.strip_suffix('>') {
        (rest, false, true)
    } else if let Some(rest) = spec.strip_suffix('=') {
        (rest, true, true)
    } else {
        (spec, true, true)
    };
    let addr = parse_net_addr(rest, false)?;
    Ok(ParsedOutput {
        config: ForwardOutputConfig {
            host: addr.host,
            port: addr.port,
            protocol: addr.protocol,
            readable,
            writable,
        },
        via_ssh: addr.via_ssh,
    })
}

/// Parse one access-control entry of the form `PATTERN[@PROTO]`. A bare
/// pattern applies to any protocol.
pub fn parse_match_host(entry: &str) -> anyhow::Result<MatchHostConfig> {
    let entry = entry.trim();
    match entry.split_once('@') {
        None => Ok(MatchHostConfig {
            pattern: entry.to_string(),
            any_proto: true,
            protocol: NetProtocol::default(),
        }),
        Some((pattern, proto)) => Ok(MatchHostConfig {
            pattern: pattern.to_string(),
            any_proto: false,
            protocol: proto.parse()?,
        }),
    }
}

/// Parse `[host]:port[@proto]`, including the `ssh:port` and
/// `ssh:host:port` forms. An empty output host defaults to localhost; an
/// empty input host means all interfaces.
fn parse_net_addr(addr: &str, is_input: bool) -> anyhow::Result<NetAddr> {
    let addr = addr.trim();
    let mut parts = addr.split('@');
    let address = parts.next().unwrap_or_default();
    let protocol = match parts.next() {
        None => NetProtocol::Tcp,
        Some(p) => {
            ensure!(parts.next().is_none(), "invalid address format: {}", addr);
            p.parse::<NetProtocol>()?
        }
    };

    let mut via_ssh = false;
    let mut endpoint = address;
    if let Some(stripped) = endpoint.strip_prefix("ssh:") {
        via_ssh = true;
        endpoint = stripped;
    }

    let (mut host, port_str) = split_endpoint(endpoint);
    let port: u16 = port_str
        .parse()
        .with_context(|| format!("invalid port number: {}", port_str))?;
    if host.is_empty() && !is_input && !via_ssh {
        host = "localhost".to_string();
    }
    Ok(NetAddr {
        host,
        port,
        protocol,
        via_ssh,
    })
}

/// Split `[host]:port`, tolerating bracketed IPv6 literals and a bare port.
fn split_endpoint(s: &str) -> (String, &str) {
    if let Some(rest) = s.strip_prefix('[')
        && let Some((host, after)) = rest.split_once(']')
    {
        return (host.to_string(), after.strip_prefix(':').unwrap_or(""));
    }
    match s.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port),
        None => (String::new(), s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        let tests = [
            ("192.168.1.1:6789", "192.168.1.1", 6789, NetProtocol::Tcp, false),
            ("192.168.1.1:6789@tcp", "192.168.1.1", 6789, NetProtocol::Tcp, false),
            ("192.168.1.1:6789@udp", "192.168.1.1", 6789, NetProtocol::Udp, false),
            ("192.168.1.1:6789@tcp4", "192.168.1.1", 6789, NetProtocol::Tcp4, false),
            ("192.168.1.1:6789@TCP6", "192.168.1.1", 6789, NetProtocol::Tcp6, false),
            (":6789@udp", "", 6789, NetProtocol::Udp, false),
            ("ssh:6789", "", 6789, NetProtocol::Tcp, true),
            ("ssh:6789@tcp", "", 6789, NetProtocol::Tcp, true),
            ("ssh:127.0.0.1:6789", "127.0.0.1", 6789, NetProtocol::Tcp, true),
        ];
        for (spec, host, port, protocol, via_ssh) in tests {
            let parsed = parse_input(spec).unwrap();
            assert_eq!(parsed.config.host, host, "host of {}", spec);
            assert_eq!(parsed.config.port, port, "port of {}", spec);
            assert_eq!(parsed.config.protocol, protocol, "protocol of {}", spec);
            assert_eq!(parsed.via_ssh, via_ssh, "via_ssh of {}", spec);
        }
    }

    #[test]
    fn test_parse_input_invalid() {
        assert!(parse_input("192.168.1.1:6789@udp@1234").is_err());
        assert!(parse_input("192.168.1.1:6789@quic").is_err());
        assert!(parse_input("192.168.1.1:no-port").is_err());
        assert!(parse_input("192.168.1.1").is_err());
    }

    #[test]
    fn test_parse_output_directions() {
        let tests = [
            ("192.168.1.1:6789", true, true),
            ("192.168.1.1:6789@tcp=", true, true),
            // '<' captures: bytes flow only from the output to the client.
            ("192.168.1.1:6789@tcp<", true, false),
            // '>' tees: bytes flow only from the client to the output.
            ("192.168.1.1:6789@tcp>", false, true),
        ];
        for (spec, readable, writable) in tests {
            let parsed = parse_output(spec).unwrap();
            assert_eq!(parsed.config.readable, readable, "readable of {}", spec);
            assert_eq!(parsed.config.writable, writable, "writable of {}", spec);
        }
    }

    #[test]
    fn test_parse_output_hosts() {
        let parsed = parse_output(":7890").unwrap();
        assert_eq!(parsed.config.host, "localhost");

        let parsed = parse_output("ssh:7890@tcp").unwrap();
        assert_eq!(parsed.config.host, "");
        assert!(parsed.via_ssh);

        let parsed = parse_output("ssh:127.0.0.1:7890@tcp").unwrap();
        assert_eq!(parsed.config.host, "127.0.0.1");
        assert!(parsed.via_ssh);

        let parsed = parse_output("[::1]:7890@tcp6").unwrap();
        assert_eq!(parsed.config.host, "::1");
        assert_eq!(parsed.config.protocol, NetProtocol::Tcp6);
    }

    #[test]
    fn test_parse_output_invalid() {
        assert!(parse_output("192.168.1.1:6789@udp@1234").is_err());
        assert!(parse_output("192.168.1.1:6789@tcp=1234").is_err());
    }

    #[test]
    fn test_parse_outputs_list() {
        let outputs =
            parse_outputs("192.168.1.100:9090@tcp>, 192.168.1.101:9090@udp<,192.168.1.102:9989")
                .unwrap();
        assert_eq!(outputs.len(), 3);
        assert!(!outputs[0].config.readable);
        assert!(!outputs[1].config.writable);
        assert_eq!(outputs[1].config.protocol, NetProtocol::Udp);
        assert!(outputs[2].config.readable && outputs[2].config.writable);
    }

    #[test]
    fn test_parse_match_host() {
        let entry = parse_match_host("127.0.0.1:*").unwrap();
        assert_eq!(entry.pattern, "127.0.0.1:*");
        assert!(entry.any_proto);

        let entry = parse_match_host("192.168.1.*@udp").unwrap();
        assert_eq!(entry.pattern, "192.168.1.*");
        assert!(!entry.any_proto);
        assert_eq!(entry.protocol, NetProtocol::Udp);

        assert!(parse_match_host("10.0.0.1@quic").is_err());
    }
}
