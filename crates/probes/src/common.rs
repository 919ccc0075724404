//! Common types and utilities for network probes

use exposcan_core::{ScanFailure, Target};

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::trace;

/// Failure of a single probe step (one port, one handshake, one request).
///
/// These never leave a probe directly; the probe maps the ones that make
/// the whole category impossible onto a [`ScanFailure`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("Connection timeout")]
    Timeout,

    #[error("Connection refused")]
    ConnectionRefused,

    #[error("Host unreachable")]
    HostUnreachable,

    #[error("Network unreachable")]
    NetworkUnreachable,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Name resolution failed: {0}")]
    Resolution(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Native scanner error: {0}")]
    NativeTool(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl ProbeError {
    /// Classify an I/O error from a connect or read
    pub fn from_io(error: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match error.kind() {
            ErrorKind::ConnectionRefused => ProbeError::ConnectionRefused,
            ErrorKind::TimedOut => ProbeError::Timeout,
            ErrorKind::PermissionDenied => ProbeError::PermissionDenied,
            _ => match error.raw_os_error() {
                // EHOSTUNREACH / ENETUNREACH on Linux
                Some(113) => ProbeError::HostUnreachable,
                Some(101) => ProbeError::NetworkUnreachable,
                _ => ProbeError::Io(error.to_string()),
            },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout)
    }

    /// Map onto the probe failure vocabulary
    pub fn into_failure(self, operation: &str, timeout_secs: u64) -> ScanFailure {
        match self {
            ProbeError::Timeout => ScanFailure::timeout(operation, timeout_secs),
            ProbeError::PermissionDenied => ScanFailure::access_denied(operation),
            ProbeError::NativeTool(reason) => ScanFailure::not_possible(reason),
            other => ScanFailure::network(operation, other),
        }
    }
}

pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// Resolve the target once; domains go through the system resolver
pub async fn resolve_target(target: &Target, limit: Duration) -> ProbeResult<IpAddr> {
    if let Some(ip) = target.as_ip() {
        return Ok(ip);
    }

    let host = target.host();
    let lookup = timeout(limit, lookup_host((host.as_str(), 0)))
        .await
        .map_err(|_| ProbeError::Timeout)?
        .map_err(|e| ProbeError::Resolution(format!("{}: {}", host, e)))?;

    let mut addrs: Vec<SocketAddr> = lookup.collect();
    // Prefer IPv4, as most external surfaces are only exposed there
    addrs.sort_by_key(|a| !a.is_ipv4());
    addrs
        .first()
        .map(|a| a.ip())
        .ok_or_else(|| ProbeError::Resolution(format!("{}: no addresses", host)))
}

/// TCP connect bounded by a timeout
pub async fn tcp_connect(addr: SocketAddr, limit: Duration) -> ProbeResult<TcpStream> {
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => {
            trace!("TCP connect failed to {}: {}", addr, e);
            Err(ProbeError::from_io(&e))
        }
        Err(_) => {
            trace!("TCP connect timeout to {}", addr);
            Err(ProbeError::Timeout)
        }
    }
}

/// Utility functions for probes
pub mod utils {
    /// Maximum banner length kept on an open port record
    pub const MAX_BANNER_CHARS: usize = 200;

    /// Collapse whitespace runs and strip control characters, capped at
    /// [`MAX_BANNER_CHARS`] characters
    pub fn clean_banner(raw: &str) -> String {
        let printable: String = raw
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        printable
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(MAX_BANNER_CHARS)
            .collect()
    }

    /// Format a port list for command line tools, e.g. `22,80,443`
    pub fn port_list(ports: &[u16]) -> String {
        ports
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Sort and deduplicate, dropping port 0
    pub fn unique_ports(ports: &[u16]) -> Vec<u16> {
        let mut unique: Vec<u16> = ports.iter().copied().filter(|p| *p != 0).collect();
        unique.sort_unstable();
        unique.dedup();
        unique
    }
}
