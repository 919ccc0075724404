//! Banner grabbing for open TCP ports

use crate::common::{tcp_connect, utils, ProbeError, ProbeResult};
use exposcan_core::{Config, MAX_WORKERS};

use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace};

/// Bytes read from the service
pub const MAX_BANNER_BYTES: usize = 1024;

/// Ports that get an HTTP request instead of a bare newline
pub const HTTP_PROBE_PORTS: &[u16] = &[80, 8080];

const HTTP_PROBE: &[u8] = b"GET / HTTP/1.0\r\n\r\n";
const NEWLINE_PROBE: &[u8] = b"\r\n";

/// Banner grabbing options
#[derive(Debug, Clone)]
pub struct BannerOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_concurrent: usize,
}

impl Default for BannerOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(5),
            max_concurrent: MAX_WORKERS,
        }
    }
}

impl BannerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect_timeout: config.timing.connect_timeout,
            read_timeout: config.timing.banner_timeout,
            max_concurrent: config.scan.effective_workers(),
        }
    }
}

/// Probe payload sent before reading
pub fn probe_payload(port: u16) -> &'static [u8] {
    if HTTP_PROBE_PORTS.contains(&port) {
        HTTP_PROBE
    } else {
        NEWLINE_PROBE
    }
}

/// Banner grabber
#[derive(Debug, Clone, Default)]
pub struct BannerGrabber {
    options: BannerOptions,
}

impl BannerGrabber {
    pub fn new(options: BannerOptions) -> Self {
        Self { options }
    }

    /// Connect, send the port's probe and read one response
    pub async fn grab(&self, ip: IpAddr, port: u16) -> ProbeResult<String> {
        let addr = SocketAddr::new(ip, port);
        let mut stream = tcp_connect(addr, self.options.connect_timeout).await?;

        // Some services speak first and close on unexpected input; a
        // failed write still leaves their greeting readable.
        if let Err(e) = stream.write_all(probe_payload(port)).await {
            trace!(port, "Failed to send banner probe: {}", e);
        }

        let mut buffer = vec![0u8; MAX_BANNER_BYTES];
        let read = match timeout(self.options.read_timeout, stream.read(&mut buffer)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(ProbeError::from_io(&e)),
            Err(_) => return Err(ProbeError::Timeout),
        };

        let banner = utils::clean_banner(&String::from_utf8_lossy(&buffer[..read]));
        if banner.is_empty() {
            return Err(ProbeError::Io("No data received".to_string()));
        }
        trace!(port, "Grabbed banner: {}", banner);
        Ok(banner)
    }

    /// Grab banners from several ports concurrently; ports without a
    /// usable banner are left out
    pub async fn grab_banners(&self, ip: IpAddr, ports: &[u16]) -> BTreeMap<u16, String> {
        let workers = self.options.max_concurrent.clamp(1, MAX_WORKERS);
        let banners: BTreeMap<u16, String> = stream::iter(utils::unique_ports(ports))
            .map(|port| async move { (port, self.grab(ip, port).await) })
            .buffer_unordered(workers)
            .filter_map(|(port, result)| async move { result.ok().map(|banner| (port, banner)) })
            .collect()
            .await;

        debug!(requested = ports.len(), grabbed = banners.len(), "Banner grabbing finished");
        banners
    }
}
