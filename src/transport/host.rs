//! Host and port canonicalization
//!
//! Hosts arrive as any of `hostname`, `hostname:port`, `ipv4`, `ipv4:port`,
//! `ipv6`, `[ipv6]` or `[ipv6]:port`. They are compared as `host:port` with the
//! scheme's default port filled in.

use crate::registry::Scheme;

/// Splits `host` into hostname and port, trying in order: bracketed IPv6 with
/// port, IPv6 without port, host with port, bare host.
///
/// An explicitly empty port (`host:`) is returned as `Some("")`.
pub fn split_host_port(host: &str) -> (&str, Option<&str>) {
    if let Some(rest) = host.strip_prefix('[') {
        if let Some((address, port)) = rest.split_once("]:") {
            return (address, Some(port));
        }
        if let Some(address) = rest.strip_suffix(']') {
            return (address, None);
        }
    }

    match host.matches(':').count() {
        0 => (host, None),
        1 => match host.split_once(':') {
            Some((hostname, port)) => (hostname, Some(port)),
            None => (host, None),
        },
        // Unbracketed IPv6 literals cannot carry a port
        _ => (host, None),
    }
}

/// Joins a hostname and port, bracketing IPv6 literals.
pub fn join_host_port(hostname: &str, port: &str) -> String {
    if hostname.contains(':') {
        format!("[{}]:{}", hostname, port)
    } else {
        format!("{}:{}", hostname, port)
    }
}

/// Canonical `host:port` form of `host` for a registry reached over `scheme`.
pub fn canonical_address(host: &str, scheme: Scheme) -> String {
    let default_port = scheme.default_port().to_string();
    let (hostname, port) = split_host_port(host);
    let port = match port {
        Some(port) if !port.is_empty() => port,
        _ => default_port.as_str(),
    };

    join_host_port(&hostname.to_ascii_lowercase(), port)
}

/// `host[:port]` of a URL as written, without filling in default ports.
pub fn url_host(url: &url::Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
