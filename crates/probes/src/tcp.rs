//! TCP connect scanning with a bounded worker pool

use crate::common::{tcp_connect, utils, ProbeError};
use exposcan_core::{Config, MAX_WORKERS};

use futures::stream::{self, StreamExt};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// TCP connect scan configuration
#[derive(Debug, Clone)]
pub struct TcpScanOptions {
    /// Per-port connect timeout
    pub connect_timeout: Duration,
    /// Concurrent connection attempts, capped at [`MAX_WORKERS`]
    pub max_workers: usize,
}

impl Default for TcpScanOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            max_workers: MAX_WORKERS,
        }
    }
}

impl TcpScanOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect_timeout: config.timing.connect_timeout,
            max_workers: config.scan.effective_workers(),
        }
    }

    fn workers(&self) -> usize {
        self.max_workers.clamp(1, MAX_WORKERS)
    }
}

/// Outcome of probing one port
#[derive(Debug, Clone, PartialEq)]
pub struct PortProbe {
    pub port: u16,
    pub open: bool,
    pub connect_time: Option<Duration>,
    pub error: Option<ProbeError>,
}

/// Socket-level port scanner
#[derive(Debug, Clone, Default)]
pub struct TcpScanner {
    options: TcpScanOptions,
}

impl TcpScanner {
    pub fn new(options: TcpScanOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TcpScanOptions {
        &self.options
    }

    /// Probe a single port. Only a completed connect counts as open.
    pub async fn probe_port(&self, ip: IpAddr, port: u16) -> PortProbe {
        let addr = SocketAddr::new(ip, port);
        let started = Instant::now();

        match tcp_connect(addr, self.options.connect_timeout).await {
            Ok(stream) => {
                drop(stream);
                trace!(port, "Port open");
                PortProbe {
                    port,
                    open: true,
                    connect_time: Some(started.elapsed()),
                    error: None,
                }
            }
            Err(error) => {
                trace!(port, "Port closed: {}", error);
                PortProbe {
                    port,
                    open: false,
                    connect_time: None,
                    error: Some(error),
                }
            }
        }
    }

    /// Probe every port once, at most `max_workers` at a time
    pub async fn probe_ports(&self, ip: IpAddr, ports: &[u16]) -> Vec<PortProbe> {
        let ports = utils::unique_ports(ports);
        let workers = self.options.workers();
        debug!(target_ip = %ip, ports = ports.len(), workers, "TCP connect scan");

        stream::iter(ports)
            .map(|port| self.probe_port(ip, port))
            .buffer_unordered(workers)
            .collect()
            .await
    }

    /// Open ports in ascending order
    pub async fn scan_ports(&self, ip: IpAddr, ports: &[u16]) -> Vec<u16> {
        let mut open: Vec<u16> = self
            .probe_ports(ip, ports)
            .await
            .into_iter()
            .filter(|probe| probe.open)
            .map(|probe| probe.port)
            .collect();
        open.sort_unstable();
        open
    }
}
