//! Service discovery: which TCP services does the target expose
//!
//! Two strategies share one payload shape. When `nmap` is installed (and not
//! disabled by config) it performs the scan, including version detection in
//! full mode and OS detection afterwards. Otherwise a TCP connect scan runs
//! over a worker pool capped at [`MAX_WORKERS`](exposcan_core::MAX_WORKERS).

use crate::banner_grabbing::{BannerGrabber, BannerOptions};
use crate::common::resolve_target;
use crate::native::NativeScanner;
use crate::service_detection;
use crate::tcp::{TcpScanOptions, TcpScanner};

use exposcan_core::results::{ExposurePayload, OsFingerprint};
use exposcan_core::{
    Category, Config, OpenPort, Payload, Result, ScanBase, ScanFailure, ScanMethod, ScanMode, ScanOutcome, ScanTimer,
    Scanner, Target,
};

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

const OPERATION: &str = "port scanning";

pub struct ServiceDiscoveryProbe {
    base: ScanBase,
    native: NativeScanner,
}

impl ServiceDiscoveryProbe {
    /// Validates the target and checks for the native tool once
    pub fn new(target: &str, mode: ScanMode, config: Arc<Config>) -> Result<Self> {
        let native = NativeScanner::detect(config.scan.native_tool);
        Ok(Self {
            base: ScanBase::new(Category::InternetExposure, target, mode, config)?,
            native,
        })
    }

    pub fn from_target(target: Target, mode: ScanMode, config: Arc<Config>) -> Self {
        let native = NativeScanner::detect(config.scan.native_tool);
        Self {
            base: ScanBase::from_target(Category::InternetExposure, target, mode, config),
            native,
        }
    }

    /// Replace the native scanner, e.g. to force the socket path
    pub fn with_native(mut self, native: NativeScanner) -> Self {
        self.native = native;
        self
    }

    pub fn scan_method(&self) -> ScanMethod {
        if self.native.is_available() {
            ScanMethod::NativeTool
        } else {
            ScanMethod::SocketFallback
        }
    }

    async fn native_scan(&self, ports: &[u16]) -> std::result::Result<Vec<OpenPort>, ScanFailure> {
        let config = self.base.config();
        let found = self
            .native
            .scan_ports(self.base.target(), ports, self.base.quick_mode(), config.timing.probe_timeout)
            .await?;

        Ok(found
            .into_iter()
            .map(|p| {
                OpenPort::new(p.port, p.service, ScanMethod::NativeTool)
                    .with_product(p.product, p.version)
                    .with_extra_info(p.extra_info)
            })
            .collect())
    }

    async fn socket_scan(&self, ip: IpAddr, ports: &[u16]) -> Vec<OpenPort> {
        let scanner = TcpScanner::new(TcpScanOptions::from_config(self.base.config()));
        scanner
            .scan_ports(ip, ports)
            .await
            .into_iter()
            .map(|port| OpenPort::new(port, service_detection::service_name(port), ScanMethod::SocketFallback))
            .collect()
    }

    async fn attach_banners(&self, ip: IpAddr, open_ports: &mut [OpenPort]) {
        let grabber = BannerGrabber::new(BannerOptions::from_config(self.base.config()));
        let port_numbers: Vec<u16> = open_ports.iter().map(|p| p.port).collect();
        let mut banners = grabber.grab_banners(ip, &port_numbers).await;

        for open in open_ports.iter_mut() {
            let banner = match banners.remove(&open.port) {
                Some(banner) => banner,
                None => continue,
            };
            if open.product.is_none() {
                if let Some(hint) = service_detection::product_hint(&banner) {
                    open.product = Some(hint.product);
                    open.version = hint.version;
                }
            }
            open.banner = Some(banner);
        }
    }

    async fn fingerprint(&self, open_ports: &[OpenPort]) -> Option<OsFingerprint> {
        if open_ports.is_empty() || self.base.quick_mode() || !self.native.is_available() {
            return None;
        }
        self.native
            .detect_os(self.base.target(), self.base.config().timing.probe_timeout)
            .await
    }
}

#[async_trait]
impl Scanner for ServiceDiscoveryProbe {
    fn base(&self) -> &ScanBase {
        &self.base
    }

    async fn execute(&self, timer: &ScanTimer) -> ScanOutcome {
        let config = self.base.config();
        let ports = config.scan.ports_for_mode(self.base.mode());
        let method = self.scan_method();
        info!(ports = ports.len(), method = method.as_str(), "Scanning ports");

        let ip = resolve_target(self.base.target(), config.timing.connect_timeout)
            .await
            .map_err(|e| ScanFailure::network(OPERATION, e))?;

        let mut open_ports = match method {
            ScanMethod::NativeTool => self.native_scan(&ports).await?,
            ScanMethod::SocketFallback => self.socket_scan(ip, &ports).await,
        };
        debug!(open = open_ports.len(), "Port scan finished");

        if !self.base.quick_mode() && config.scan.banner_grabbing && !open_ports.is_empty() {
            self.attach_banners(ip, &mut open_ports).await;
        }

        let os_fingerprint = self.fingerprint(&open_ports).await;

        let payload = ExposurePayload {
            open_ports,
            os_fingerprint,
            total_ports_scanned: ports.len(),
            scan_method: method,
        };
        Ok(self.base.completed(timer, Payload::ServiceDiscovery(payload), Vec::new()))
    }
}
