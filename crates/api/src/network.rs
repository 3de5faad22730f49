//! Local address discovery for advertised URLs

use crate::ServerConfig;
use axum::http::uri::Authority;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Used when no better host is known
pub const FALLBACK_HOST: &str = "192.168.1.100";

/// IPv4 address of the interface carrying the default route.
///
/// Connecting a UDP socket sends nothing; it only selects a source address.
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// Base URL clients should use to reach this server.
///
/// Prefers the request's Host header, then the configured advertise host,
/// then the detected local address.
pub fn base_url(host_header: Option<&str>, config: &ServerConfig) -> String {
    if let Some(authority) = host_header.and_then(|h| h.parse::<Authority>().ok()) {
        return match authority.port_u16() {
            Some(_) => format!("http://{}", authority),
            None => format!("http://{}:{}", authority.host(), config.port),
        };
    }

    let host = config
        .advertise_host
        .clone()
        .filter(|h| !h.is_empty())
        .or_else(|| local_ipv4().map(|ip| ip.to_string()))
        .unwrap_or_else(|| FALLBACK_HOST.to_string());
    format!("http://{}:{}", host, config.port)
}
