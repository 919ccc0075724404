//! Core type definitions for exposcan

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// A validated scan target: an IP literal or a syntactically valid domain.
///
/// Parsing trims, lower-cases and strips a leading `http://` / `https://`
/// along with any path or port suffix before validating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Target {
    /// Single IP address
    Ip(IpAddr),
    /// Domain name
    Domain(String),
}

impl Target {
    /// Create a target from a single IP
    pub fn ip(addr: IpAddr) -> Self {
        Target::Ip(addr)
    }

    /// Host string suitable for connecting or building URLs
    pub fn host(&self) -> String {
        match self {
            Target::Ip(ip) => ip.to_string(),
            Target::Domain(domain) => domain.clone(),
        }
    }

    /// Host string for URLs (IPv6 literals are bracketed)
    pub fn url_host(&self) -> String {
        match self {
            Target::Ip(IpAddr::V6(ip)) => format!("[{}]", ip),
            other => other.host(),
        }
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, Target::Domain(_))
    }

    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            Target::Ip(ip) => Some(*ip),
            Target::Domain(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Ip(ip) => write!(f, "{}", ip),
            Target::Domain(domain) => write!(f, "{}", domain),
        }
    }
}

impl FromStr for Target {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_target(s);
        if normalized.is_empty() {
            return Err(crate::Error::invalid_target(s));
        }

        if let Ok(ip) = normalized.parse::<IpAddr>() {
            return Ok(Target::Ip(ip));
        }

        if is_valid_domain(&normalized) {
            return Ok(Target::Domain(normalized));
        }

        Err(crate::Error::invalid_target(s))
    }
}

/// Strip scheme, path and port from a raw target string
fn normalize_target(raw: &str) -> String {
    let mut target = raw.trim().to_lowercase();

    for scheme in ["http://", "https://"] {
        if let Some(rest) = target.strip_prefix(scheme) {
            target = rest.to_string();
            break;
        }
    }

    if let Some(idx) = target.find(&['/', '?', '#'][..]) {
        target.truncate(idx);
    }

    // Bracketed IPv6 with optional port
    if let Some(rest) = target.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return rest[..end].to_string();
        }
    }

    // host:port, but leave bare IPv6 literals alone
    if target.matches(':').count() == 1 {
        if let Some((host, _port)) = target.split_once(':') {
            target = host.to_string();
        }
    }

    target
}

fn is_valid_domain(domain: &str) -> bool {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    if !labels_ok {
        return false;
    }

    let tld = labels[labels.len() - 1];
    tld.starts_with("xn--") || (tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
}

/// Scan depth selected for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Common ports only, skip expensive sub-steps
    Quick,
    /// Full port range with service, banner, OS and cipher inspection
    #[default]
    Full,
    /// Caller-provided port list, otherwise behaves like full
    Custom,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Quick => "quick",
            ScanMode::Full => "full",
            ScanMode::Custom => "custom",
        }
    }

    pub fn is_quick(&self) -> bool {
        matches!(self, ScanMode::Quick)
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quick" => Ok(ScanMode::Quick),
            "full" => Ok(ScanMode::Full),
            "custom" => Ok(ScanMode::Custom),
            other => Err(crate::Error::internal(format!("unknown scan mode: {}", other))),
        }
    }
}

/// Probe categories in their fixed execution order.
///
/// Variant order is the scheduling order, so `Ord` and the `BTreeMap`
/// used for the category map both follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    InternetExposure,
    TlsSecurity,
    WebSecurity,
    EmailSecurity,
    Vulnerabilities,
    IamAssessment,
    BackupDr,
    LoggingMonitoring,
}

impl Category {
    /// Every category, in execution order
    pub const ALL: [Category; 8] = [
        Category::InternetExposure,
        Category::TlsSecurity,
        Category::WebSecurity,
        Category::EmailSecurity,
        Category::Vulnerabilities,
        Category::IamAssessment,
        Category::BackupDr,
        Category::LoggingMonitoring,
    ];

    /// Scoring weight; also the maximum deduction for the category
    pub fn weight(&self) -> u32 {
        match self {
            Category::InternetExposure => 20,
            Category::TlsSecurity => 15,
            Category::WebSecurity => 15,
            Category::EmailSecurity => 10,
            Category::Vulnerabilities => 25,
            Category::IamAssessment => 8,
            Category::BackupDr => 4,
            Category::LoggingMonitoring => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::InternetExposure => "internet_exposure",
            Category::TlsSecurity => "tls_security",
            Category::WebSecurity => "web_security",
            Category::EmailSecurity => "email_security",
            Category::Vulnerabilities => "vulnerabilities",
            Category::IamAssessment => "iam_assessment",
            Category::BackupDr => "backup_dr",
            Category::LoggingMonitoring => "logging_monitoring",
        }
    }

    /// Human-facing label
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::InternetExposure => "Service Discovery",
            Category::TlsSecurity => "TLS/Certificate",
            Category::WebSecurity => "Web Headers",
            Category::EmailSecurity => "Email Authentication",
            Category::Vulnerabilities => "Known Vulnerabilities",
            Category::IamAssessment => "IAM / Admin Surface",
            Category::BackupDr => "Backup / DR",
            Category::LoggingMonitoring => "Monitoring",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| crate::Error::internal(format!("unknown category: {}", s)))
    }
}

/// Finding / problem severity; declaration order is priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parsing() {
        let ip: Target = "192.168.1.1".parse().unwrap();
        assert_eq!(ip, Target::ip("192.168.1.1".parse().unwrap()));

        let v6: Target = "::1".parse().unwrap();
        assert!(matches!(v6, Target::Ip(IpAddr::V6(_))));

        let domain: Target = "Example.COM".parse().unwrap();
        assert_eq!(domain, Target::Domain("example.com".to_string()));
    }

    #[test]
    fn test_target_normalization() {
        let t: Target = "https://www.example.org/login?next=1".parse().unwrap();
        assert_eq!(t.host(), "www.example.org");

        let t: Target = "http://10.0.0.1:8080/".parse().unwrap();
        assert_eq!(t, Target::ip("10.0.0.1".parse().unwrap()));

        let t: Target = "https://[2001:db8::1]:443".parse().unwrap();
        assert_eq!(t.url_host(), "[2001:db8::1]");
    }

    #[test]
    fn test_invalid_targets() {
        for raw in ["", "   ", "localhost", "-bad.com", "exa mple.com", "example.c0m", "a..b.com"] {
            let parsed = raw.parse::<Target>();
            assert!(
                matches!(parsed, Err(crate::Error::InvalidTarget(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_category_weights_sum_to_100() {
        let total: u32 = Category::ALL.iter().map(|c| c.weight()).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_category_round_trip_names() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
        }
    }

    #[test]
    fn test_severity_ordering() {
        let mut severities = vec![Severity::Low, Severity::Critical, Severity::Medium, Severity::High];
        severities.sort();
        assert_eq!(severities, Severity::ALL.to_vec());
    }

    #[test]
    fn test_scan_mode() {
        assert_eq!("QUICK".parse::<ScanMode>().unwrap(), ScanMode::Quick);
        assert!(ScanMode::Quick.is_quick());
        assert!(!ScanMode::Custom.is_quick());
        assert_eq!(ScanMode::default(), ScanMode::Full);
        assert!("deep".parse::<ScanMode>().is_err());
    }
}
