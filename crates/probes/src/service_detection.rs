//! Service identification for open ports
//!
//! Names come from a static port table. Banners, when present, can add a
//! product and version for the two protocols that announce themselves in
//! a predictable format (SSH identification strings and HTTP `Server`
//! headers).

use regex::Regex;
use std::sync::OnceLock;

/// Well-known TCP services, sorted by port
const SERVICE_TABLE: &[(u16, &str)] = &[
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "dns"),
    (80, "http"),
    (110, "pop3"),
    (143, "imap"),
    (443, "https"),
    (465, "smtps"),
    (587, "submission"),
    (993, "imaps"),
    (995, "pop3s"),
    (1433, "mssql"),
    (3306, "mysql"),
    (3389, "rdp"),
    (5432, "postgresql"),
    (6379, "redis"),
    (8080, "http-proxy"),
    (8443, "https-alt"),
    (27017, "mongodb"),
];

pub const UNKNOWN_SERVICE: &str = "unknown";

/// Service name for a port, `"unknown"` when not in the table
pub fn service_name(port: u16) -> &'static str {
    SERVICE_TABLE
        .binary_search_by_key(&port, |(p, _)| *p)
        .map(|idx| SERVICE_TABLE[idx].1)
        .unwrap_or(UNKNOWN_SERVICE)
}

/// Product and version announced by a banner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductHint {
    pub product: String,
    pub version: Option<String>,
}

fn ssh_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"SSH-[\d.]+-([A-Za-z][A-Za-z0-9]*)[_-]([\w.]+)").ok())
        .as_ref()
}

fn http_server_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)Server:\s*([A-Za-z][\w.-]*)(?:/([\w.]+))?").ok())
        .as_ref()
}

/// Extract a product hint from a cleaned banner
pub fn product_hint(banner: &str) -> Option<ProductHint> {
    if let Some(caps) = ssh_pattern()?.captures(banner) {
        return Some(ProductHint {
            product: caps[1].to_string(),
            version: caps.get(2).map(|m| m.as_str().to_string()),
        });
    }

    if banner.starts_with("HTTP/") {
        if let Some(caps) = http_server_pattern()?.captures(banner) {
            return Some(ProductHint {
                product: caps[1].to_string(),
                version: caps.get(2).map(|m| m.as_str().to_string()),
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted() {
        let ports: Vec<u16> = SERVICE_TABLE.iter().map(|(p, _)| *p).collect();
        let mut sorted = ports.clone();
        sorted.sort_unstable();
        assert_eq!(ports, sorted);
    }

    #[test]
    fn test_service_lookup() {
        assert_eq!(service_name(22), "ssh");
        assert_eq!(service_name(8080), "http-proxy");
        assert_eq!(service_name(27017), "mongodb");
        assert_eq!(service_name(12345), "unknown");
    }

    #[test]
    fn test_ssh_product_hint() {
        let hint = product_hint("SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.6").unwrap();
        assert_eq!(hint.product, "OpenSSH");
        assert_eq!(hint.version.as_deref(), Some("8.9p1"));
    }

    #[test]
    fn test_http_product_hint() {
        let hint = product_hint("HTTP/1.0 200 OK Server: nginx/1.18.0 Content-Type: text/html").unwrap();
        assert_eq!(hint.product, "nginx");
        assert_eq!(hint.version.as_deref(), Some("1.18.0"));

        assert!(product_hint("220 mail.example.com ESMTP").is_none());
    }
}
