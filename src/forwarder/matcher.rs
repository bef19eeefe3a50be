use regex::Regex;
use std::net::Ipv6Addr;

/// Match a peer `address` (the `host:port` form a socket address prints as)
/// against a `pattern` of the form `host[:port]`.
///
/// `*` alone matches any host. In IPv4 patterns `*` expands to `[0-9.]+`,
/// so a wildcard can span octets: `192.168.*` matches `192.168.1.1` as well
/// as `192.168.1`. IPv6 patterns are compared group by group, `*` matching
/// exactly one group. A pattern without a port matches any port; `*` in the
/// port position matches any digits. Malformed patterns match nothing.
pub fn match_address(pattern: &str, address: &str) -> bool {
    let (pattern_host, pattern_port) = split_host_port(pattern);
    let (address_host, address_port) = split_host_port(address);

    if !match_host(pattern_host, address_host) {
        return false;
    }

    let Some(pattern_port) = pattern_port else {
        return true;
    };
    match address_port {
        Some(port) => match_port(pattern_port, port),
        None => true,
    }
}

/// Split `host[:port]` on the final colon, stripping IPv6 brackets from the
/// host. More than one colon without brackets is a bare IPv6 literal with no
/// port.
fn split_host_port(s: &str) -> (&str, Option<&str>) {
    if let Some(rest) = s.strip_prefix('[') {
        if let Some((host, after)) = rest.split_once(']') {
            return (host, after.strip_prefix(':'));
        }
        return (rest, None);
    }
    if s.matches(':').count() > 1 {
        return (s, None);
    }
    match s.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (s, None),
    }
}

fn match_host(pattern: &str, host: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if pattern.contains('.') {
        return match_ipv4(pattern, host);
    }
    match_ipv6(pattern, host)
}

fn match_ipv4(pattern: &str, ip: &str) -> bool {
    let pattern = pattern.replace('.', "\\.").replace('*', "[0-9.]+");
    match Regex::new(&format!("^{}$", pattern)) {
        Ok(re) => re.is_match(ip),
        Err(_) => false,
    }
}

fn match_ipv6(pattern: &str, ip: &str) -> bool {
    let pattern = pattern.trim_matches(['[', ']']);
    let ip = ip.trim_matches(['[', ']']);

    // Both sides must be valid IPv6 before any group comparison; the
    // wildcard stands in for a zero group during validation.
    if pattern.replace('*', "0").parse::<Ipv6Addr>().is_err() {
        return false;
    }
    if ip.parse::<Ipv6Addr>().is_err() {
        return false;
    }

    let groups: Vec<&str> = ip.split(':').collect();
    for (i, part) in pattern.split(':').enumerate() {
        if part == "*" {
            continue;
        }
        match groups.get(i) {
            Some(group) if *group == part => {}
            _ => return false,
        }
    }
    true
}

fn match_port(pattern: &str, port: &str) -> bool {
    let pattern = pattern.replace('*', "[0-9]+");
    match Regex::new(&format!("^{}$", pattern)) {
        Ok(re) => re.is_match(port),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_ipv4() {
        let tests = [
            ("192.168.1.1", "192.168.1.1", true),
            ("192.168.1.*", "192.168.1.1", true),
            ("192.168.*", "192.168.1.1", true),
            ("192.168.*.1", "192.168.61.1", true),
            ("192.168.*.1", "192.168.61.2", false),
            ("192.168.*.*", "192.168.61.1", true),
            ("10.0.0.1", "10.0.0.2", false),
        ];
        for (pattern, ip, want) in tests {
            assert_eq!(match_ipv4(pattern, ip), want, "pattern {pattern} vs {ip}");
        }
    }

    #[test]
    fn test_match_address_wildcard_host() {
        assert!(match_address("*", "10.1.2.3:55555"));
        assert!(match_address("*", "[::1]:80"));
    }

    #[test]
    fn test_match_address_ports() {
        assert!(match_address("*:80", "192.168.1.1:80"));
        assert!(!match_address("*:80", "192.168.1.1:8080"));
        assert!(match_address("*:*", "192.168.1.1:8080"));
        assert!(match_address("192.0.2.1", "192.0.2.1:25"));
        assert!(match_address("192.0.2.1:25", "192.0.2.1:25"));
        assert!(!match_address("192.0.2.1:25", "192.0.2.1:26"));
    }

    #[test]
    fn test_match_address_ipv6() {
        assert!(match_address("[2001:db8::1]:80", "[2001:db8::1]:80"));
        assert!(!match_address("[2001:db8::1]:80", "[2001:db8::1]:81"));
        assert!(match_address("2001:db8::1", "[2001:db8::1]:4242"));
        assert!(match_address("2001:*:0:0:0:0:0:1", "[2001:db8:0:0:0:0:0:1]:80"));
        assert!(!match_address("2001:db8::2", "[2001:db8::1]:80"));
    }

    #[test]
    fn test_malformed_pattern_matches_nothing() {
        assert!(!match_address("not-an-ip(", "192.168.1.1:80"));
        assert!(!match_address("zzzz::gggg", "[::1]:80"));
    }
}
