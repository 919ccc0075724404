//! Native port scanner integration (nmap)
//!
//! The tool is located on `PATH` once, when the scanner is built. Output is
//! read from nmap's normal text format; only ports reported as `open` are
//! kept. Tool failures surface as [`ProbeError`]s and become the probe's
//! failure note through [`ProbeError::into_failure`].

use crate::common::{utils, ProbeError, ProbeResult};
use crate::os_fingerprinting;
use exposcan_core::results::OsFingerprint;
use exposcan_core::{NativeToolPolicy, ScanFailure, Target};

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub const NATIVE_TOOL: &str = "nmap";

/// Extra wall time granted on top of nmap's own host timeout
const PROCESS_GRACE: Duration = Duration::from_secs(10);

/// Port scan operation name used in failure notes
const PORT_SCAN_OPERATION: &str = "port scanning";

/// One open port as reported by the tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativePort {
    pub port: u16,
    pub service: String,
    pub product: Option<String>,
    pub version: Option<String>,
    pub extra_info: Option<String>,
}

/// Locate an executable on `PATH`
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Wrapper around the native scanner binary
#[derive(Debug, Clone)]
pub struct NativeScanner {
    binary: Option<PathBuf>,
}

impl NativeScanner {
    /// Resolve availability according to policy
    pub fn detect(policy: NativeToolPolicy) -> Self {
        let binary = match policy {
            NativeToolPolicy::Disabled => None,
            NativeToolPolicy::Auto => find_in_path(NATIVE_TOOL),
        };
        match &binary {
            Some(path) => debug!("Native scanner found at {}", path.display()),
            None => debug!("Native scanner unavailable, using socket fallback"),
        }
        Self { binary }
    }

    /// Use a specific binary
    pub fn with_binary<P: AsRef<Path>>(path: P) -> Self {
        Self {
            binary: Some(path.as_ref().to_path_buf()),
        }
    }

    pub fn unavailable() -> Self {
        Self { binary: None }
    }

    pub fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    /// Arguments for a port scan
    pub fn port_scan_args(target: &Target, ports: &[u16], quick: bool, host_timeout: Duration) -> Vec<String> {
        let mut args = vec![
            "-sS".to_string(),
            "-T4".to_string(),
            "--max-retries=1".to_string(),
            format!("--host-timeout={}s", host_timeout.as_secs().max(1)),
            "--max-rtt-timeout=2s".to_string(),
            "--initial-rtt-timeout=500ms".to_string(),
            "-p".to_string(),
            utils::port_list(ports),
        ];
        if !quick {
            args.push("-sV".to_string());
            args.push("--version-intensity=5".to_string());
        }
        args.push(target.host());
        args
    }

    /// Arguments for OS detection
    pub fn os_scan_args(target: &Target, host_timeout: Duration) -> Vec<String> {
        vec![
            "-O".to_string(),
            "--osscan-limit".to_string(),
            "--max-os-tries=1".to_string(),
            format!("--host-timeout={}s", host_timeout.as_secs().max(1)),
            target.host(),
        ]
    }

    /// Run a port scan. Timeouts map to the timeout failure, anything else
    /// the tool reports maps to "not possible".
    pub async fn scan_ports(
        &self,
        target: &Target,
        ports: &[u16],
        quick: bool,
        host_timeout: Duration,
    ) -> Result<Vec<NativePort>, ScanFailure> {
        let args = Self::port_scan_args(target, ports, quick, host_timeout);
        info!(target = %target, ports = ports.len(), quick, "Running native port scan");

        let open = self
            .run(&args, host_timeout)
            .await
            .and_then(|output| parse_port_lines(&output))
            .map_err(|e| match e {
                ProbeError::PermissionDenied => ScanFailure::access_denied(NATIVE_TOOL),
                other => other.into_failure(PORT_SCAN_OPERATION, host_timeout.as_secs()),
            })?;
        debug!(open = open.len(), "Native port scan parsed");
        Ok(open)
    }

    /// Best OS guess, `None` when the tool gives no usable answer
    pub async fn detect_os(&self, target: &Target, host_timeout: Duration) -> Option<OsFingerprint> {
        let args = Self::os_scan_args(target, host_timeout);
        match self.run(&args, host_timeout).await {
            Ok(output) => os_fingerprinting::parse_os_output(&output),
            Err(e) => {
                debug!("OS detection skipped: {}", e);
                None
            }
        }
    }

    async fn run(&self, args: &[String], host_timeout: Duration) -> ProbeResult<String> {
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| ProbeError::NativeTool(format!("{} not detected or available", NATIVE_TOOL)))?;

        let child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match timeout(host_timeout + PROCESS_GRACE, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Failed to execute {}: {}", NATIVE_TOOL, e);
                return Err(ProbeError::NativeTool(format!("{} could not be executed: {}", NATIVE_TOOL, e)));
            }
            Err(_) => return Err(ProbeError::Timeout),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(classify_tool_error(&stderr));
        }
        if stdout.contains("due to host timeout") {
            return Err(ProbeError::Timeout);
        }
        Ok(stdout)
    }
}

fn classify_tool_error(stderr: &str) -> ProbeError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("root privileges") || lowered.contains("operation not permitted") {
        return ProbeError::PermissionDenied;
    }
    let detail = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("unknown error");
    ProbeError::NativeTool(format!("{} failed: {}", NATIVE_TOOL, detail.trim()))
}

fn port_line_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\d+)/tcp\s+(\S+)\s+(\S+)(?:\s+(.+))?$").ok())
        .as_ref()
}

/// Parse open ports from nmap's normal output. Output without a scan
/// report or the closing `Nmap done` line is rejected.
pub fn parse_port_lines(output: &str) -> ProbeResult<Vec<NativePort>> {
    if !output.contains("Nmap scan report") && !output.contains("Nmap done") {
        return Err(ProbeError::Parse(format!("unrecognised {} output", NATIVE_TOOL)));
    }
    let pattern = port_line_pattern()
        .ok_or_else(|| ProbeError::Parse("port line pattern unavailable".to_string()))?;

    let mut ports: Vec<NativePort> = output
        .lines()
        .filter_map(|line| pattern.captures(line.trim()))
        .filter(|caps| &caps[2] == "open")
        .filter_map(|caps| {
            let port = caps[1].parse::<u16>().ok()?;
            let service = caps[3].trim_end_matches('?').to_string();
            let (product, version, extra_info) = caps
                .get(4)
                .map(|m| split_version_info(m.as_str()))
                .unwrap_or((None, None, None));
            Some(NativePort {
                port,
                service,
                product,
                version,
                extra_info,
            })
        })
        .collect();

    ports.sort_by_key(|p| p.port);
    ports.dedup_by_key(|p| p.port);
    Ok(ports)
}

/// Split a VERSION column into product, version and extra info. The
/// version is the first token starting with a digit.
fn split_version_info(info: &str) -> (Option<String>, Option<String>, Option<String>) {
    let tokens: Vec<&str> = info.split_whitespace().collect();
    let version_idx = tokens
        .iter()
        .position(|t| t.chars().next().map_or(false, |c| c.is_ascii_digit()));

    let non_empty = |parts: &[&str]| {
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    };

    match version_idx {
        Some(idx) => (
            non_empty(&tokens[..idx]),
            Some(tokens[idx].to_string()),
            non_empty(&tokens[idx + 1..]),
        ),
        None => (non_empty(&tokens), None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Starting Nmap 7.94 ( https://nmap.org ) at 2024-03-01 10:00 UTC
Nmap scan report for example.com (93.184.216.34)
Host is up (0.012s latency).
Not shown: 10 closed tcp ports (reset)
PORT     STATE    SERVICE  VERSION
22/tcp   open     ssh      OpenSSH 8.9p1 Ubuntu 3ubuntu0.6 (Ubuntu Linux; protocol 2.0)
25/tcp   filtered smtp
80/tcp   open     http     nginx 1.18.0 (Ubuntu)
443/tcp  open     https?
3306/tcp closed   mysql
Service detection performed.
";

    #[test]
    fn test_parse_open_ports_only() {
        let ports = parse_port_lines(SAMPLE).unwrap();
        let numbers: Vec<u16> = ports.iter().map(|p| p.port).collect();
        assert_eq!(numbers, vec![22, 80, 443]);

        assert_eq!(ports[0].service, "ssh");
        assert_eq!(ports[0].product.as_deref(), Some("OpenSSH"));
        assert_eq!(ports[0].version.as_deref(), Some("8.9p1"));
        assert_eq!(
            ports[0].extra_info.as_deref(),
            Some("Ubuntu 3ubuntu0.6 (Ubuntu Linux; protocol 2.0)")
        );

        assert_eq!(ports[2].service, "https");
        assert!(ports[2].product.is_none());
    }

    #[test]
    fn test_host_down_is_empty() {
        let output = "Note: Host seems down.\nNmap done: 1 IP address (0 hosts up) scanned in 3.05 seconds\n";
        assert!(parse_port_lines(output).unwrap().is_empty());
    }

    #[test]
    fn test_unrecognised_output_is_parse_error() {
        let err = parse_port_lines("Segmentation fault\n").unwrap_err();
        assert!(matches!(err, ProbeError::Parse(_)));
        assert_eq!(
            err.into_failure(PORT_SCAN_OPERATION, 30).note(),
            "Data not obtained; port scanning failed: Parse error: unrecognised nmap output"
        );
    }

    #[test]
    fn test_split_version_info() {
        assert_eq!(
            split_version_info("Apache httpd 2.4.41 ((Ubuntu))"),
            (
                Some("Apache httpd".to_string()),
                Some("2.4.41".to_string()),
                Some("((Ubuntu))".to_string())
            )
        );
        assert_eq!(
            split_version_info("Microsoft IIS httpd"),
            (Some("Microsoft IIS httpd".to_string()), None, None)
        );
    }

    #[test]
    fn test_port_scan_args() {
        let target: Target = "example.com".parse().unwrap();
        let quick = NativeScanner::port_scan_args(&target, &[22, 80], true, Duration::from_secs(30));
        assert_eq!(
            quick,
            vec![
                "-sS",
                "-T4",
                "--max-retries=1",
                "--host-timeout=30s",
                "--max-rtt-timeout=2s",
                "--initial-rtt-timeout=500ms",
                "-p",
                "22,80",
                "example.com"
            ]
        );

        let full = NativeScanner::port_scan_args(&target, &[22], false, Duration::from_secs(30));
        assert!(full.contains(&"-sV".to_string()));
        assert!(full.contains(&"--version-intensity=5".to_string()));
        assert_eq!(full.last().map(String::as_str), Some("example.com"));
    }

    #[test]
    fn test_tool_error_classification() {
        assert_eq!(
            classify_tool_error("You requested a scan type which requires root privileges.\nQUITTING!"),
            ProbeError::PermissionDenied
        );
        let failed = classify_tool_error("Failed to resolve \"nope\".");
        assert_eq!(failed, ProbeError::NativeTool("nmap failed: Failed to resolve \"nope\".".to_string()));
        assert_eq!(
            failed.into_failure(PORT_SCAN_OPERATION, 30).note(),
            "Scanning not possible; nmap failed: Failed to resolve \"nope\"."
        );
    }

    #[test]
    fn test_disabled_policy() {
        assert!(!NativeScanner::detect(NativeToolPolicy::Disabled).is_available());
        assert!(find_in_path("exposcan-no-such-tool").is_none());
    }

    #[tokio::test]
    async fn test_unavailable_scanner_is_not_possible() {
        let target: Target = "192.0.2.1".parse().unwrap();
        let failure = NativeScanner::unavailable()
            .scan_ports(&target, &[22], true, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(failure.note(), "Scanning not possible; nmap not detected or available");
    }
}
