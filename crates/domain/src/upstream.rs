use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

const DEFAULT_DNS_PORT: u16 = 53;
const DEFAULT_TLS_PORT: u16 = 853;

/// Represents an upstream server address that may or may not be resolved to an IP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpstreamAddr {
    Resolved(SocketAddr),
    Unresolved { hostname: Arc<str>, port: u16 },
}

impl UpstreamAddr {
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            UpstreamAddr::Resolved(addr) => Some(*addr),
            UpstreamAddr::Unresolved { .. } => None,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            UpstreamAddr::Resolved(addr) => addr.port(),
            UpstreamAddr::Unresolved { port, .. } => *port,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, UpstreamAddr::Unresolved { .. })
    }

    /// Returns (hostname, port) if this address is unresolved.
    pub fn unresolved_parts(&self) -> Option<(&str, u16)> {
        match self {
            UpstreamAddr::Unresolved { hostname, port } => Some((hostname, *port)),
            UpstreamAddr::Resolved(_) => None,
        }
    }
}

impl fmt::Display for UpstreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamAddr::Resolved(addr) => write!(f, "{}", addr),
            UpstreamAddr::Unresolved { hostname, port } => write!(f, "{}:{}", hostname, port),
        }
    }
}

/// Whether an upstream is spoken to in clear text (UDP/TCP) or over TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamScheme {
    Plain,
    Tls,
}

impl UpstreamScheme {
    pub fn default_port(&self) -> u16 {
        match self {
            UpstreamScheme::Plain => DEFAULT_DNS_PORT,
            UpstreamScheme::Tls => DEFAULT_TLS_PORT,
        }
    }
}

/// One configured upstream, as written in the `to` list of a forward rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamEndpoint {
    pub scheme: UpstreamScheme,
    pub addr: UpstreamAddr,
}

impl UpstreamEndpoint {
    pub fn is_tls(&self) -> bool {
        self.scheme == UpstreamScheme::Tls
    }

    /// Host name usable for TLS verification when the endpoint was written with one.
    pub fn hostname(&self) -> Option<&str> {
        self.addr.unresolved_parts().map(|(host, _)| host)
    }

    pub fn needs_resolution(&self) -> bool {
        self.addr.is_unresolved()
    }

    /// Copy of this endpoint pointing at a concrete address.
    pub fn with_resolved_addr(&self, resolved: SocketAddr) -> Self {
        Self {
            scheme: self.scheme,
            addr: UpstreamAddr::Resolved(resolved),
        }
    }
}

fn parse_host_port(s: &str) -> Option<(&str, Option<u16>)> {
    if let Some(rest) = s.strip_prefix('[') {
        let end = rest.find(']')?;
        let host = &rest[..end];
        let tail = &rest[end + 1..];
        if tail.is_empty() {
            return Some((host, None));
        }
        let port = tail.strip_prefix(':')?.parse::<u16>().ok()?;
        return Some((host, Some(port)));
    }
    match s.rsplit_once(':') {
        // a bare IPv6 literal has more than one colon and no brackets
        Some((host, _)) if host.contains(':') => Some((s, None)),
        Some((host, port_str)) => Some((host, Some(port_str.parse::<u16>().ok()?))),
        None => Some((s, None)),
    }
}

fn parse_upstream_addr(addr_str: &str, default_port: u16) -> Result<UpstreamAddr, String> {
    if let Ok(addr) = addr_str.parse::<SocketAddr>() {
        return Ok(UpstreamAddr::Resolved(addr));
    }
    let (host, port) =
        parse_host_port(addr_str).ok_or_else(|| format!("Invalid address '{}'", addr_str))?;
    if host.is_empty() {
        return Err(format!("Invalid address '{}': empty host", addr_str));
    }
    let port = port.unwrap_or(default_port);
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(UpstreamAddr::Resolved(SocketAddr::new(ip, port)));
    }
    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
    {
        return Err(format!("Invalid host name '{}'", host));
    }
    Ok(UpstreamAddr::Unresolved {
        hostname: host.trim_end_matches('.').into(),
        port,
    })
}

impl FromStr for UpstreamEndpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (scheme, rest) = if let Some(rest) = s.strip_prefix("tls://") {
            (UpstreamScheme::Tls, rest)
        } else if let Some(rest) = s
            .strip_prefix("dns://")
            .or_else(|| s.strip_prefix("udp://"))
            .or_else(|| s.strip_prefix("tcp://"))
        {
            (UpstreamScheme::Plain, rest)
        } else if s.contains("://") {
            return Err(format!(
                "Unsupported upstream '{}'. Expected: dns://HOST[:PORT], tls://HOST[:PORT] or HOST[:PORT]",
                s
            ));
        } else {
            (UpstreamScheme::Plain, s)
        };

        let addr = parse_upstream_addr(rest, scheme.default_port())?;
        Ok(UpstreamEndpoint { scheme, addr })
    }
}

impl fmt::Display for UpstreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            UpstreamScheme::Plain => write!(f, "dns://{}", self.addr),
            UpstreamScheme::Tls => write!(f, "tls://{}", self.addr),
        }
    }
}
