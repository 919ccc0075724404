//! Probe results and per-category payloads for exposcan

use crate::types::{Category, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One entry per scheduled category, in execution order
pub type CategoryMap = BTreeMap<Category, ProbeResult>;

/// Finding type identifiers shared between probes and the scoring engine
pub mod finding_types {
    pub const WEAK_TLS_VERSION: &str = "weak_tls_version";
    pub const CERTIFICATE_EXPIRY: &str = "certificate_expiry";
    pub const WEAK_KEY_SIZE: &str = "weak_key_size";
    pub const WEAK_CIPHER: &str = "weak_cipher";
    pub const MISSING_HSTS: &str = "missing_hsts";
}

/// Outcome of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Completed,
    Failed,
}

/// The universal output of every probe category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Category that produced this result
    pub category: Category,
    /// Completed or failed
    pub status: ProbeStatus,
    /// Elapsed wall time, human formatted
    pub duration: String,
    /// Elapsed wall time in seconds
    pub duration_secs: f64,
    /// Category-specific findings, present only when completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    /// Reason for failure, present only when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Discrete observations, in discovery order
    #[serde(default)]
    pub findings: Vec<Finding>,
}

impl ProbeResult {
    /// Completed result; payload is optional for categories with nothing to report
    pub fn completed(category: Category, elapsed: Duration, payload: Option<Payload>) -> Self {
        Self {
            category,
            status: ProbeStatus::Completed,
            duration: format_duration(elapsed),
            duration_secs: elapsed.as_secs_f64(),
            payload,
            note: None,
            findings: Vec::new(),
        }
    }

    /// Failed result carrying a human-readable note
    pub fn failed<S: Into<String>>(category: Category, elapsed: Duration, note: S) -> Self {
        Self {
            category,
            status: ProbeStatus::Failed,
            duration: format_duration(elapsed),
            duration_secs: elapsed.as_secs_f64(),
            payload: None,
            note: Some(note.into()),
            findings: Vec::new(),
        }
    }

    /// Attach findings (completed results only keep them)
    pub fn with_findings(mut self, findings: Vec<Finding>) -> Self {
        self.findings = findings;
        self
    }

    pub fn with_finding(mut self, finding: Finding) -> Self {
        self.findings.push(finding);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == ProbeStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == ProbeStatus::Failed
    }
}

/// Format an elapsed duration at seconds, minutes or hours granularity
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1} seconds", secs)
    } else if secs < 3600.0 {
        format!("{:.1} minutes", secs / 60.0)
    } else {
        format!("{:.1} hours", secs / 3600.0)
    }
}

/// A single security observation produced by a probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub finding_type: String,
    pub severity: Severity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl Finding {
    pub fn new<T: Into<String>, D: Into<String>>(finding_type: T, severity: Severity, description: D) -> Self {
        Self {
            finding_type: finding_type.into(),
            severity,
            description: description.into(),
            recommendation: None,
        }
    }

    pub fn with_recommendation<S: Into<String>>(mut self, recommendation: S) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }
}

/// Category-specific payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    ServiceDiscovery(ExposurePayload),
    Tls(TlsPayload),
    WebHeaders(WebPayload),
    EmailAuth(EmailPayload),
    Vulnerabilities(VulnerabilityPayload),
    Iam(IamPayload),
    BackupDr(BackupPayload),
    Monitoring(MonitoringPayload),
}

/// How the open ports were found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMethod {
    NativeTool,
    SocketFallback,
}

impl ScanMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMethod::NativeTool => "native_tool",
            ScanMethod::SocketFallback => "socket_fallback",
        }
    }
}

/// Service discovery payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposurePayload {
    pub open_ports: Vec<OpenPort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_fingerprint: Option<OsFingerprint>,
    pub total_ports_scanned: usize,
    pub scan_method: ScanMethod,
}

impl ExposurePayload {
    pub fn has_port(&self, port: u16) -> bool {
        self.open_ports.iter().any(|p| p.port == port)
    }
}

/// An open TCP port with best-effort service identification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPort {
    pub port: u16,
    pub protocol: String,
    pub service_name: String,
    pub state: String,
    pub method: ScanMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
}

impl OpenPort {
    /// Create an open TCP port record
    pub fn new<S: Into<String>>(port: u16, service_name: S, method: ScanMethod) -> Self {
        Self {
            port,
            protocol: "tcp".to_string(),
            service_name: service_name.into(),
            state: "open".to_string(),
            method,
            version: None,
            product: None,
            extra_info: None,
            banner: None,
        }
    }

    pub fn with_product(mut self, product: Option<String>, version: Option<String>) -> Self {
        self.product = product;
        self.version = version;
        self
    }

    pub fn with_extra_info(mut self, extra_info: Option<String>) -> Self {
        self.extra_info = extra_info;
        self
    }

    pub fn with_banner(mut self, banner: String) -> Self {
        self.banner = Some(banner);
        self
    }
}

/// Best operating system guess
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsFingerprint {
    pub name: String,
    pub accuracy: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

/// TLS/Certificate payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TlsPayload {
    /// TLS-capable ports that were analysed
    pub services: Vec<TlsService>,
    /// Accepted protocol versions, e.g. "TLSv1.2"
    pub tls_versions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateRecord>,
    pub certificate_chain: Vec<ChainLink>,
    pub cipher_suites: Vec<CipherSuite>,
    pub hsts_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hsts_max_age: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsService {
    pub port: u16,
    pub protocol: String,
}

/// Parsed leaf certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub subject: String,
    pub issuer: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// Negative once the certificate has expired
    pub days_until_expiry: i64,
    pub serial_number: String,
    pub key_size_bits: u32,
    pub signature_algorithm: String,
}

/// One certificate in the served chain, leaf first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub subject: String,
    pub issuer: String,
    pub valid_until: DateTime<Utc>,
}

/// Negotiated cipher for an established connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherSuite {
    pub name: String,
    pub version: String,
    pub bits: u16,
}

/// Web security header payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WebPayload {
    /// 0..=100
    pub security_score: u8,
    pub missing_headers: Vec<String>,
    pub present_headers: Vec<String>,
}

/// Email authentication payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmailPayload {
    pub spf_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spf_record: Option<String>,
    pub dkim_selectors_found: Vec<String>,
    pub dmarc_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dmarc_policy: Option<String>,
}

/// Known-CVE matching payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VulnerabilityPayload {
    pub vulnerabilities: Vec<CveRecord>,
}

impl VulnerabilityPayload {
    /// Count of vulnerabilities at the given severity
    pub fn count(&self, severity: Severity) -> usize {
        self.vulnerabilities
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveRecord {
    pub cve_id: String,
    pub severity: Severity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_service: Option<String>,
}

/// Exposed administrative surface payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IamPayload {
    pub admin_interfaces: Vec<AdminInterface>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminInterface {
    pub url: String,
    pub authentication_required: bool,
    pub mfa_detected: bool,
}

/// Exposed backup and configuration file payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackupPayload {
    pub exposed_backups: Vec<ExposedFile>,
    pub config_files: Vec<ExposedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedFile {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Monitoring / perimeter protection payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MonitoringPayload {
    pub waf_detected: bool,
    pub ddos_protection: bool,
    pub rate_limiting: bool,
    pub security_tools: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_granularity() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5 seconds");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5 minutes");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1.5 hours");
    }

    #[test]
    fn test_completed_and_failed_shapes() {
        let done = ProbeResult::completed(Category::TlsSecurity, Duration::from_secs(1), None);
        assert!(done.is_completed());
        assert!(done.note.is_none());

        let failed = ProbeResult::failed(
            Category::EmailSecurity,
            Duration::from_secs(2),
            "Scanning not possible; domain does not exist",
        );
        assert!(failed.is_failed());
        assert!(failed.payload.is_none());
        assert_eq!(failed.note.as_deref(), Some("Scanning not possible; domain does not exist"));
    }

    #[test]
    fn test_finding_serializes_type_field() {
        let finding = Finding::new(finding_types::MISSING_HSTS, Severity::Low, "HSTS header not configured")
            .with_recommendation("Enable HTTP Strict Transport Security");
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["type"], "missing_hsts");
        assert_eq!(json["severity"], "low");
        assert_eq!(json["recommendation"], "Enable HTTP Strict Transport Security");
    }

    #[test]
    fn test_payload_tagging() {
        let payload = Payload::ServiceDiscovery(ExposurePayload {
            open_ports: vec![OpenPort::new(22, "ssh", ScanMethod::SocketFallback)],
            os_fingerprint: None,
            total_ports_scanned: 14,
            scan_method: ScanMethod::SocketFallback,
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "service_discovery");
        assert_eq!(json["scan_method"], "socket_fallback");
        assert_eq!(json["open_ports"][0]["protocol"], "tcp");
        assert_eq!(json["open_ports"][0]["state"], "open");

        let back: Payload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_category_map_order() {
        let mut map = CategoryMap::new();
        map.insert(
            Category::LoggingMonitoring,
            ProbeResult::completed(Category::LoggingMonitoring, Duration::ZERO, None),
        );
        map.insert(
            Category::InternetExposure,
            ProbeResult::completed(Category::InternetExposure, Duration::ZERO, None),
        );
        let keys: Vec<_> = map.keys().copied().collect();
        assert_eq!(keys, vec![Category::InternetExposure, Category::LoggingMonitoring]);
    }
}
