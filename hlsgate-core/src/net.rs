//! Host address helpers

use std::net::UdpSocket;

/// Best-effort detection of the address other hosts reach us on.
///
/// Connecting a UDP socket sends no packet; it only makes the kernel pick the
/// outbound interface for the default route. Falls back to `localhost`.
#[must_use]
pub fn detect_server_ip() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| s.connect("8.8.8.8:80").map(|()| s))
        .and_then(|s| s.local_addr())
        .map_or_else(
            |e| {
                tracing::warn!("Failed to detect server IP, using localhost: {}", e);
                "localhost".to_string()
            },
            |addr| addr.ip().to_string(),
        )
}

/// Configured address if present, otherwise the detected one.
#[must_use]
pub fn resolve_server_ip(configured: Option<&str>) -> String {
    match configured {
        Some(ip) if !ip.trim().is_empty() => ip.trim().to_string(),
        _ => detect_server_ip(),
    }
}
