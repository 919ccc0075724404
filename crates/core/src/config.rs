//! Configuration management for exposcan

use crate::error::{ConfigError, Error, Result};
use crate::types::ScanMode;
use crate::MAX_WORKERS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Main configuration structure for exposcan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scan configuration
    pub scan: ScanConfig,
    /// Timing configuration
    pub timing: TimingConfig,
    /// TLS probe configuration
    pub tls: TlsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Scan-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Default scan mode when the caller does not choose one
    pub mode: ScanMode,
    /// Ports used by quick mode and as the custom-mode fallback
    pub common_ports: Vec<u16>,
    /// Upper bound of the full-mode range (1..=limit)
    pub full_port_limit: u16,
    /// Ports used by custom mode
    pub custom_ports: Vec<u16>,
    /// Concurrent connection attempts for the socket path
    pub max_workers: usize,
    /// Whether the native port scanner may be used
    pub native_tool: NativeToolPolicy,
    /// Grab banners on open ports in non-quick scans
    pub banner_grabbing: bool,
}

/// Timeouts and job deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Per-port TCP connect timeout
    pub connect_timeout: Duration,
    /// Banner read timeout
    pub banner_timeout: Duration,
    /// Per-handshake TLS timeout
    pub handshake_timeout: Duration,
    /// HTTP request timeout
    pub http_timeout: Duration,
    /// Budget for a single native tool run
    pub probe_timeout: Duration,
    /// After this, remaining categories are skipped
    pub soft_deadline: Duration,
    /// After this, the job is aborted
    pub hard_deadline: Duration,
}

/// TLS probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Well-known TLS ports probed in full mode
    pub ports: Vec<u16>,
    /// Ports probed in quick mode
    pub quick_ports: Vec<u16>,
    /// Web-facing ports that trigger the HSTS check
    pub hsts_ports: Vec<u16>,
    /// Also test for SSLv3 acceptance
    pub probe_sslv3: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

/// Native tool selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeToolPolicy {
    /// Use the tool when it is installed
    Auto,
    /// Always use the socket fallback
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::Full,
            common_ports: vec![21, 22, 23, 25, 53, 80, 110, 143, 443, 993, 995, 3389, 8080, 8443],
            full_port_limit: 1000,
            custom_ports: Vec::new(),
            max_workers: MAX_WORKERS,
            native_tool: NativeToolPolicy::Auto,
            banner_grabbing: true,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            banner_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            http_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(30),
            soft_deadline: Duration::from_secs(540),
            hard_deadline: Duration::from_secs(600),
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ports: vec![443, 993, 995, 465, 587, 636, 989, 990],
            quick_ports: vec![443],
            hsts_ports: vec![443, 8443],
            probe_sslv3: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
        }
    }
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl ScanConfig {
    /// Port universe for a scan mode, ascending and free of duplicates
    pub fn ports_for_mode(&self, mode: ScanMode) -> Vec<u16> {
        let ports: BTreeSet<u16> = match mode {
            ScanMode::Quick => self.common_ports.iter().copied().collect(),
            ScanMode::Full => (1..=self.full_port_limit).collect(),
            ScanMode::Custom if !self.custom_ports.is_empty() => {
                self.custom_ports.iter().copied().collect()
            }
            ScanMode::Custom => self.common_ports.iter().copied().collect(),
        };
        ports.into_iter().filter(|p| *p != 0).collect()
    }

    /// Worker count clamped to the hard cap
    pub fn effective_workers(&self) -> usize {
        self.max_workers.clamp(1, MAX_WORKERS)
    }
}

impl TlsConfig {
    pub fn ports_for_mode(&self, mode: ScanMode) -> &[u16] {
        if mode.is_quick() {
            &self.quick_ports
        } else {
            &self.ports
        }
    }
}

impl Config {
    /// Defaults adjusted for a scan mode
    pub fn for_mode(mode: ScanMode) -> Self {
        let mut config = Config::default();
        config.scan.mode = mode;
        if mode.is_quick() {
            config.timing.connect_timeout = Duration::from_secs(2);
            config.timing.handshake_timeout = Duration::from_secs(3);
            config.timing.http_timeout = Duration::from_secs(10);
        }
        config
    }

    /// Load configuration from a JSON, YAML or TOML file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|_e| {
            Error::config(ConfigError::ConfigFileNotFound {
                path: path.as_ref().display().to_string(),
            })
        })?;

        let config: Config = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content).map_err(|e| {
                Error::config(ConfigError::InvalidFormat {
                    reason: e.to_string(),
                })
            })?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                Error::config(ConfigError::InvalidFormat {
                    reason: e.to_string(),
                })
            })?,
            Some("toml") => toml::from_str(&content).map_err(|e| {
                Error::config(ConfigError::InvalidFormat {
                    reason: e.to_string(),
                })
            })?,
            _ => {
                return Err(Error::config(ConfigError::InvalidFormat {
                    reason: "Unsupported configuration file format".to_string(),
                }))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Write configuration to a file, format chosen by extension
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(self).map_err(|e| {
                Error::config(ConfigError::InvalidFormat {
                    reason: e.to_string(),
                })
            })?,
            Some("toml") => toml::to_string_pretty(self).map_err(|e| {
                Error::config(ConfigError::InvalidFormat {
                    reason: e.to_string(),
                })
            })?,
            _ => {
                return Err(Error::config(ConfigError::InvalidFormat {
                    reason: "Unsupported configuration file format".to_string(),
                }))
            }
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("connect_timeout", self.timing.connect_timeout),
            ("banner_timeout", self.timing.banner_timeout),
            ("handshake_timeout", self.timing.handshake_timeout),
            ("http_timeout", self.timing.http_timeout),
            ("probe_timeout", self.timing.probe_timeout),
        ];
        for (field, value) in timeouts {
            if value.is_zero() {
                return Err(Error::config(ConfigError::InvalidTimeout {
                    field: field.to_string(),
                    value: value.as_millis() as u64,
                }));
            }
        }

        if self.timing.soft_deadline.is_zero() || self.timing.soft_deadline >= self.timing.hard_deadline {
            return Err(Error::config(ConfigError::InvalidDeadline {
                reason: format!(
                    "soft deadline ({}s) must be non-zero and below hard deadline ({}s)",
                    self.timing.soft_deadline.as_secs(),
                    self.timing.hard_deadline.as_secs()
                ),
            }));
        }

        if self.scan.max_workers == 0 || self.scan.max_workers > MAX_WORKERS {
            return Err(Error::config(ConfigError::InvalidWorkers {
                value: self.scan.max_workers,
            }));
        }

        if self.scan.full_port_limit == 0 || self.scan.full_port_limit > 1024 {
            return Err(Error::config(ConfigError::InvalidPorts {
                reason: format!("full_port_limit must be within 1..=1024, got {}", self.scan.full_port_limit),
            }));
        }

        let port_lists = [
            ("scan.common_ports", &self.scan.common_ports),
            ("scan.custom_ports", &self.scan.custom_ports),
            ("tls.ports", &self.tls.ports),
            ("tls.quick_ports", &self.tls.quick_ports),
            ("tls.hsts_ports", &self.tls.hsts_ports),
        ];
        for (name, ports) in port_lists {
            if ports.contains(&0) {
                return Err(Error::config(ConfigError::InvalidPorts {
                    reason: format!("{} contains port 0", name),
                }));
            }
        }
        if self.scan.common_ports.is_empty() {
            return Err(Error::config(ConfigError::InvalidPorts {
                reason: "scan.common_ports must not be empty".to_string(),
            }));
        }

        Ok(())
    }
}
