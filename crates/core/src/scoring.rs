//! Scoring engine: folds a category map into a single report
//!
//! The engine is a pure function of the [`CategoryMap`]. Point values are
//! fixed per category and finding kind; every category can lose at most
//! its own weight. Arithmetic is done in fixed point (half points per
//! category, hundredths for the running total) so the 20% failed-category
//! penalty is exact.

use crate::results::{
    finding_types, BackupPayload, CategoryMap, EmailPayload, ExposurePayload, Finding, IamPayload,
    MonitoringPayload, Payload, ProbeResult, TlsPayload, VulnerabilityPayload, WebPayload,
};
use crate::types::{Category, Severity};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Ports that are considered high risk when reachable from the internet
pub const HIGH_RISK_PORTS: &[u16] = &[21, 23, 135, 139, 445, 1433, 3389];

/// Plain-text web ports that should be paired with HTTPS
pub const PLAINTEXT_WEB_PORTS: &[u16] = &[80, 8080];

/// Protocol versions that count as outdated
pub const OUTDATED_TLS_VERSIONS: &[&str] = &["SSLv2", "SSLv3", "TLSv1.0", "TLSv1.1"];

/// Report-level view of a finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub category: Category,
    pub issue: String,
    pub severity: Severity,
    pub description: String,
    pub impact: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effort {
    Low,
    Medium,
    High,
}

/// Actionable remediation advice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub problem_id: String,
    pub recommendation: String,
    pub effort_estimate: Effort,
    pub steps: Vec<String>,
}

impl Recommendation {
    fn new(problem_id: &str, recommendation: &str, effort_estimate: Effort, steps: &[&str]) -> Self {
        Self {
            problem_id: problem_id.to_string(),
            recommendation: recommendation.to_string(),
            effort_estimate,
            steps: steps.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Summary counters derived from the category map and problem list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub categories_scanned: usize,
    pub categories_completed: usize,
    pub categories_failed: usize,
    pub total_issues_found: usize,
    pub critical_issues: usize,
    pub high_issues: usize,
    pub medium_issues: usize,
    pub low_issues: usize,
    /// Points retained per category (failed categories keep 80%)
    pub category_scores: BTreeMap<Category, f64>,
}

impl ScoreSummary {
    pub fn issues(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical_issues,
            Severity::High => self.high_issues,
            Severity::Medium => self.medium_issues,
            Severity::Low => self.low_issues,
        }
    }
}

/// Final report for one scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    /// 0..=100
    pub score: u8,
    pub problems: Vec<Problem>,
    pub recommendations: Vec<Recommendation>,
    pub summary: ScoreSummary,
}

/// Score, problems and recommendations for one completed category
#[derive(Debug, Clone)]
struct CategoryAssessment {
    score: u32,
    problems: Vec<Problem>,
    recommendations: Vec<Recommendation>,
}

/// Deduction accumulator for one category, in half points
struct Tally {
    category: Category,
    weight: u32,
    half_points: u32,
    problems: Vec<Problem>,
    recommendations: Vec<Recommendation>,
}

impl Tally {
    fn new(category: Category) -> Self {
        Self {
            category,
            weight: category.weight(),
            half_points: 0,
            problems: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    fn deduct_points(&mut self, points: u32) {
        self.half_points += points * 2;
    }

    fn problem(&mut self, severity: Severity, issue: String, description: String, impact: &str) {
        self.problems.push(Problem {
            category: self.category,
            issue,
            severity,
            description,
            impact: impact.to_string(),
        });
    }

    /// Generic handling shared by every category: each finding becomes a
    /// problem and deducts per the category's severity table.
    fn findings(&mut self, findings: &[Finding], skip_deduction: &[&str]) {
        let impact = default_impact(self.category);
        for finding in findings {
            self.problem(
                finding.severity,
                finding.finding_type.clone(),
                finding.description.clone(),
                impact,
            );
            if !skip_deduction.contains(&finding.finding_type.as_str()) {
                self.half_points += finding_half_points(self.category, finding.severity);
            }
            if let Some(text) = &finding.recommendation {
                self.recommendations.push(Recommendation {
                    problem_id: finding.finding_type.clone(),
                    recommendation: text.clone(),
                    effort_estimate: Effort::Low,
                    steps: Vec::new(),
                });
            }
        }
    }

    fn recommend(&mut self, recommendation: Recommendation) {
        self.recommendations.push(recommendation);
    }

    fn finish(self) -> CategoryAssessment {
        let deduction = self.half_points / 2;
        CategoryAssessment {
            score: self.weight.saturating_sub(deduction),
            problems: self.problems,
            recommendations: self.recommendations,
        }
    }
}

/// Per-severity finding deductions, in half points
fn finding_half_points(category: Category, severity: Severity) -> u32 {
    use Severity::*;
    match (category, severity) {
        (Category::TlsSecurity, Critical) => 10,
        (Category::TlsSecurity, High) => 6,
        (Category::TlsSecurity, Medium) => 2,
        (Category::EmailSecurity, High) => 4,
        (Category::EmailSecurity, Medium) => 2,
        (Category::Vulnerabilities, Critical) => 16,
        (Category::Vulnerabilities, High) => 8,
        (Category::Vulnerabilities, Medium) => 4,
        (Category::Vulnerabilities, Low) => 1,
        (Category::IamAssessment, Critical) => 8,
        (Category::IamAssessment, High) => 4,
        (Category::IamAssessment, Medium) => 2,
        (Category::BackupDr, Critical) => 4,
        (Category::BackupDr, High) => 2,
        _ => 0,
    }
}

fn default_impact(category: Category) -> &'static str {
    match category {
        Category::InternetExposure => "Increased external attack surface",
        Category::TlsSecurity => "Encryption weakness",
        Category::WebSecurity => "Web application security weakness",
        Category::EmailSecurity => "Email security weakness",
        Category::Vulnerabilities => "Potential for exploitation and system compromise",
        Category::IamAssessment => "Unauthorized access risk",
        Category::BackupDr => "Data protection weakness",
        Category::LoggingMonitoring => "Reduced detection capability",
    }
}

/// Stateless scoring engine
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Fold a category map into a report
    pub fn score(&self, results: &CategoryMap) -> ScoreReport {
        // Hundredths of a point
        let mut total: i64 = 100 * 100;
        let mut problems = Vec::new();
        let mut recommendations = Vec::new();
        let mut category_scores = BTreeMap::new();

        for (category, result) in results {
            let weight = category.weight();
            if result.is_completed() {
                let assessment = self.score_category(*category, result);
                let deduction = (weight - assessment.score.min(weight)).min(weight);
                total -= i64::from(deduction) * 100;
                category_scores.insert(*category, f64::from(assessment.score));
                problems.extend(assessment.problems);
                recommendations.extend(assessment.recommendations);
                debug!(category = %category, score = assessment.score, weight, "Category scored");
            } else {
                total -= i64::from(weight) * 20;
                category_scores.insert(*category, f64::from(weight * 8) / 10.0);
                debug!(category = %category, weight, "Category failed, applying fixed penalty");
            }
        }

        let score = (total.clamp(0, 100 * 100) / 100) as u8;
        let problems = prioritize_problems(problems);
        let recommendations = consolidate_recommendations(recommendations);
        let summary = summarize(results, &problems, category_scores);

        info!(
            score,
            issues = problems.len(),
            failed = summary.categories_failed,
            "Security score calculated"
        );

        ScoreReport {
            score,
            problems,
            recommendations,
            summary,
        }
    }

    fn score_category(&self, category: Category, result: &ProbeResult) -> CategoryAssessment {
        let mut tally = Tally::new(category);

        match (category, &result.payload) {
            (Category::InternetExposure, Some(Payload::ServiceDiscovery(p))) => score_exposure(&mut tally, p),
            (Category::TlsSecurity, Some(Payload::Tls(p))) => score_tls(&mut tally, p),
            (Category::WebSecurity, Some(Payload::WebHeaders(p))) => score_web(&mut tally, p),
            (Category::EmailSecurity, Some(Payload::EmailAuth(p))) => score_email(&mut tally, p),
            (Category::Vulnerabilities, Some(Payload::Vulnerabilities(p))) => score_vulnerabilities(&mut tally, p),
            (Category::IamAssessment, Some(Payload::Iam(p))) => score_iam(&mut tally, p),
            (Category::BackupDr, Some(Payload::BackupDr(p))) => score_backup(&mut tally, p),
            (Category::LoggingMonitoring, Some(Payload::Monitoring(p))) => score_monitoring(&mut tally, p),
            _ => {}
        }

        let skip: &[&str] = match category {
            Category::TlsSecurity => &[finding_types::WEAK_TLS_VERSION, finding_types::CERTIFICATE_EXPIRY],
            _ => &[],
        };
        tally.findings(&result.findings, skip);
        category_recommendation(&mut tally, result);

        tally.finish()
    }
}

fn score_exposure(tally: &mut Tally, payload: &ExposurePayload) {
    let https_open = payload.has_port(443);

    for open in &payload.open_ports {
        if HIGH_RISK_PORTS.contains(&open.port) {
            tally.problem(
                Severity::High,
                format!("High-risk port {} ({}) is open", open.port, open.service_name),
                format!("Port {} running {} is accessible from the internet", open.port, open.service_name),
                "Potential unauthorized access and exploitation",
            );
            tally.deduct_points(4);
        } else if PLAINTEXT_WEB_PORTS.contains(&open.port) && !https_open {
            tally.problem(
                Severity::Medium,
                format!("HTTP service on port {} without HTTPS", open.port),
                "Unencrypted web service detected".to_string(),
                "Data transmitted in plain text",
            );
            tally.deduct_points(2);
        }
    }

    if payload.has_port(21) || payload.has_port(23) {
        tally.recommend(Recommendation::new(
            "insecure_protocols",
            "Disable insecure protocols (FTP, Telnet) and use secure alternatives",
            Effort::Medium,
            &[
                "Identify services using insecure protocols",
                "Migrate to secure alternatives (SFTP, SSH)",
                "Update firewall rules to block insecure ports",
                "Verify secure configuration",
            ],
        ));
    }
}

fn score_tls(tally: &mut Tally, payload: &TlsPayload) {
    let outdated = payload
        .tls_versions
        .iter()
        .any(|v| OUTDATED_TLS_VERSIONS.contains(&v.as_str()));
    if outdated {
        tally.problem(
            Severity::High,
            "Outdated TLS versions supported".to_string(),
            "TLS 1.0/1.1 are deprecated and vulnerable".to_string(),
            "Potential for man-in-the-middle attacks",
        );
        tally.deduct_points(6);
    }

    if let Some(cert) = &payload.certificate {
        if cert.days_until_expiry < 0 {
            tally.problem(
                Severity::Critical,
                "SSL certificate expired".to_string(),
                "SSL certificate has expired".to_string(),
                "Service unavailable, security warnings",
            );
            tally.deduct_points(8);
        } else if cert.days_until_expiry < 30 {
            tally.problem(
                Severity::Medium,
                "SSL certificate expiring soon".to_string(),
                format!("Certificate expires in {} days", cert.days_until_expiry),
                "Potential service disruption",
            );
            tally.deduct_points(3);
        }
    }
}

fn score_web(tally: &mut Tally, payload: &WebPayload) {
    let percentage = u32::from(payload.security_score.min(100));
    let base = tally.weight * percentage / 100;
    tally.deduct_points(tally.weight - base);

    for header in &payload.missing_headers {
        if header == "HSTS" || header == "CSP" {
            tally.problem(
                Severity::Medium,
                format!("Missing {} header", header),
                format!("{} security header not implemented", header),
                "Reduced web application security",
            );
        }
    }
}

fn score_email(tally: &mut Tally, payload: &EmailPayload) {
    if !payload.spf_exists {
        tally.problem(
            Severity::Medium,
            "SPF record not configured".to_string(),
            "No SPF record found for domain".to_string(),
            "Email spoofing vulnerability",
        );
        tally.deduct_points(3);
    }
    if payload.dkim_selectors_found.is_empty() {
        tally.problem(
            Severity::Medium,
            "DKIM not configured".to_string(),
            "No DKIM selectors found".to_string(),
            "Email authenticity cannot be verified",
        );
        tally.deduct_points(3);
    }
    if !payload.dmarc_exists {
        tally.problem(
            Severity::Medium,
            "DMARC policy not configured".to_string(),
            "No DMARC record found".to_string(),
            "Email domain abuse vulnerability",
        );
        tally.deduct_points(4);
    }
}

fn score_vulnerabilities(tally: &mut Tally, payload: &VulnerabilityPayload) {
    for vuln in &payload.vulnerabilities {
        tally.problem(
            vuln.severity,
            format!("CVE {} detected", vuln.cve_id),
            vuln.description.clone(),
            "Potential for exploitation and system compromise",
        );
        tally.half_points += finding_half_points(Category::Vulnerabilities, vuln.severity);
    }
}

fn score_iam(tally: &mut Tally, payload: &IamPayload) {
    for interface in &payload.admin_interfaces {
        if !interface.authentication_required {
            tally.problem(
                Severity::Critical,
                "Exposed admin interface".to_string(),
                format!("Admin interface accessible without authentication: {}", interface.url),
                "Unauthorized administrative access",
            );
            tally.deduct_points(6);
        }
        if !interface.mfa_detected {
            tally.problem(
                Severity::Medium,
                "Missing multi-factor authentication".to_string(),
                "Admin interface lacks MFA protection".to_string(),
                "Increased risk of credential compromise",
            );
            tally.deduct_points(2);
        }
    }
}

fn score_backup(tally: &mut Tally, payload: &BackupPayload) {
    for backup in &payload.exposed_backups {
        tally.problem(
            Severity::Critical,
            "Exposed backup file".to_string(),
            format!("Backup file publicly accessible: {}", backup.url),
            "Data exposure and potential system compromise",
        );
        tally.deduct_points(2);
    }
    for config in &payload.config_files {
        tally.problem(
            Severity::Critical,
            "Exposed configuration file".to_string(),
            format!("Configuration file publicly accessible: {}", config.url),
            "Sensitive configuration data exposure",
        );
        tally.deduct_points(2);
    }
}

fn score_monitoring(tally: &mut Tally, payload: &MonitoringPayload) {
    let missing = [
        (
            payload.waf_detected,
            "No WAF detected",
            "Web Application Firewall not detected",
            "Reduced protection against web attacks",
        ),
        (
            payload.ddos_protection,
            "No DDoS protection detected",
            "DDoS protection mechanisms not detected",
            "Vulnerability to denial of service attacks",
        ),
        (
            payload.rate_limiting,
            "No rate limiting detected",
            "Rate limiting not implemented",
            "Vulnerability to abuse and DoS attacks",
        ),
    ];
    for (present, issue, description, impact) in missing {
        if !present {
            tally.problem(Severity::Low, issue.to_string(), description.to_string(), impact);
            tally.deduct_points(1);
        }
    }

    if payload.security_tools.is_empty() {
        tally.recommend(Recommendation::new(
            "security_monitoring",
            "Implement comprehensive security monitoring",
            Effort::High,
            &[
                "Deploy Web Application Firewall (WAF)",
                "Implement DDoS protection",
                "Configure rate limiting",
                "Set up security event monitoring and alerting",
            ],
        ));
    }
}

/// Category-wide recommendation once all problems are known
fn category_recommendation(tally: &mut Tally, result: &ProbeResult) {
    let has_problems = !tally.problems.is_empty();
    let recommendation = match tally.category {
        Category::TlsSecurity if has_problems => Recommendation::new(
            "tls_security_issues",
            "Update TLS configuration and certificates",
            Effort::Low,
            &[
                "Disable TLS 1.0 and 1.1",
                "Enable only TLS 1.2 and 1.3",
                "Renew SSL certificates before expiry",
                "Test configuration with SSL testing tools",
            ],
        ),
        Category::WebSecurity if has_problems || has_missing_headers(result) => Recommendation::new(
            "web_security_headers",
            "Implement comprehensive security headers",
            Effort::Low,
            &[
                "Configure Content Security Policy (CSP)",
                "Enable HSTS with appropriate max-age",
                "Set X-Frame-Options to DENY or SAMEORIGIN",
                "Add X-Content-Type-Options: nosniff",
            ],
        ),
        Category::EmailSecurity if has_problems => Recommendation::new(
            "email_authentication",
            "Implement comprehensive email authentication",
            Effort::Medium,
            &[
                "Configure SPF record with appropriate policy",
                "Set up DKIM signing for outbound emails",
                "Implement DMARC policy starting with p=none",
                "Monitor DMARC reports and gradually strengthen policy",
            ],
        ),
        Category::Vulnerabilities if has_serious_vulnerability(tally) => Recommendation::new(
            "critical_vulnerabilities",
            "Immediately patch critical and high severity vulnerabilities",
            Effort::High,
            &[
                "Prioritize critical vulnerabilities for immediate patching",
                "Test patches in staging environment",
                "Apply patches to production systems",
                "Verify vulnerability remediation with rescanning",
            ],
        ),
        Category::IamAssessment if has_problems => Recommendation::new(
            "iam_security",
            "Strengthen access controls and authentication",
            Effort::Medium,
            &[
                "Implement MFA for all admin interfaces",
                "Restrict admin access by IP whitelist",
                "Regular access reviews and cleanup",
                "Implement principle of least privilege",
            ],
        ),
        Category::BackupDr if has_problems => Recommendation::new(
            "backup_security",
            "Secure backup files and configuration",
            Effort::Low,
            &[
                "Remove backup files from public directories",
                "Implement proper backup storage security",
                "Use encrypted backup solutions",
                "Regular backup security audits",
            ],
        ),
        _ => return,
    };
    tally.recommend(recommendation);
}

fn has_missing_headers(result: &ProbeResult) -> bool {
    matches!(&result.payload, Some(Payload::WebHeaders(p)) if !p.missing_headers.is_empty())
}

fn has_serious_vulnerability(tally: &Tally) -> bool {
    tally
        .problems
        .iter()
        .any(|p| matches!(p.severity, Severity::Critical | Severity::High))
}

/// Sort by severity, then category name; stable for equal keys
pub fn prioritize_problems(mut problems: Vec<Problem>) -> Vec<Problem> {
    problems.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.category.as_str().cmp(b.category.as_str()))
    });
    problems
}

/// Drop recommendations whose text was already seen, keeping first-seen order
pub fn consolidate_recommendations(recommendations: Vec<Recommendation>) -> Vec<Recommendation> {
    let mut seen = HashSet::new();
    recommendations
        .into_iter()
        .filter(|r| seen.insert(r.recommendation.clone()))
        .collect()
}

fn summarize(
    results: &CategoryMap,
    problems: &[Problem],
    category_scores: BTreeMap<Category, f64>,
) -> ScoreSummary {
    let completed = results.values().filter(|r| r.is_completed()).count();
    let failed = results.values().filter(|r| r.is_failed()).count();
    let count = |severity: Severity| problems.iter().filter(|p| p.severity == severity).count();

    ScoreSummary {
        categories_scanned: results.len(),
        categories_completed: completed,
        categories_failed: failed,
        total_issues_found: problems.len(),
        critical_issues: count(Severity::Critical),
        high_issues: count(Severity::High),
        medium_issues: count(Severity::Medium),
        low_issues: count(Severity::Low),
        category_scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{CertificateRecord, CveRecord, OpenPort, ScanMethod};
    use chrono::Utc;
    use std::time::Duration;

    fn completed(category: Category, payload: Option<Payload>) -> ProbeResult {
        ProbeResult::completed(category, Duration::from_secs(1), payload)
    }

    fn all_completed() -> CategoryMap {
        Category::ALL
            .iter()
            .map(|c| (*c, completed(*c, None)))
            .collect()
    }

    fn assess(result: &ProbeResult) -> CategoryAssessment {
        ScoringEngine::new().score_category(result.category, result)
    }

    fn exposure(ports: &[(u16, &str)]) -> ProbeResult {
        completed(
            Category::InternetExposure,
            Some(Payload::ServiceDiscovery(ExposurePayload {
                open_ports: ports
                    .iter()
                    .map(|(p, s)| OpenPort::new(*p, *s, ScanMethod::SocketFallback))
                    .collect(),
                os_fingerprint: None,
                total_ports_scanned: 14,
                scan_method: ScanMethod::SocketFallback,
            })),
        )
    }

    fn certificate(days: i64) -> CertificateRecord {
        let now = Utc::now();
        CertificateRecord {
            subject: "CN=example.com".to_string(),
            issuer: "CN=Example CA".to_string(),
            valid_from: now,
            valid_until: now,
            days_until_expiry: days,
            serial_number: "1".to_string(),
            key_size_bits: 2048,
            signature_algorithm: "sha256WithRSAEncryption".to_string(),
        }
    }

    #[test]
    fn test_clean_scan_scores_100() {
        let report = ScoringEngine::new().score(&all_completed());
        assert_eq!(report.score, 100);
        assert!(report.problems.is_empty());
        assert!(report.recommendations.is_empty());
        assert_eq!(report.summary.categories_scanned, 8);
        assert_eq!(report.summary.categories_failed, 0);
    }

    #[test]
    fn test_http_without_https() {
        let assessment = assess(&exposure(&[(22, "ssh"), (80, "http")]));
        assert_eq!(assessment.score, 18);
        assert_eq!(assessment.problems.len(), 1);
        assert_eq!(assessment.problems[0].severity, Severity::Medium);
        assert_eq!(assessment.problems[0].issue, "HTTP service on port 80 without HTTPS");
    }

    #[test]
    fn test_http_with_https_is_clean() {
        let assessment = assess(&exposure(&[(80, "http"), (443, "https")]));
        assert_eq!(assessment.score, 20);
        assert!(assessment.problems.is_empty());
    }

    #[test]
    fn test_high_risk_ports_and_insecure_protocol_recommendation() {
        let assessment = assess(&exposure(&[(21, "ftp"), (23, "telnet"), (3389, "rdp")]));
        assert_eq!(assessment.score, 20 - 12);
        assert!(assessment.problems.iter().all(|p| p.severity == Severity::High));
        assert_eq!(assessment.recommendations[0].problem_id, "insecure_protocols");
    }

    #[test]
    fn test_exposure_deduction_clamped_to_weight() {
        let ports: Vec<(u16, &str)> = HIGH_RISK_PORTS.iter().map(|p| (*p, "svc")).collect();
        let assessment = assess(&exposure(&ports));
        assert_eq!(assessment.score, 0);
    }

    #[test]
    fn test_outdated_tls_versions() {
        let result = completed(
            Category::TlsSecurity,
            Some(Payload::Tls(TlsPayload {
                tls_versions: vec!["TLSv1.0".to_string(), "TLSv1.2".to_string()],
                ..Default::default()
            })),
        )
        .with_finding(Finding::new(
            finding_types::WEAK_TLS_VERSION,
            Severity::Medium,
            "TLSv1.0 is deprecated and vulnerable to attacks",
        ));

        let assessment = assess(&result);
        assert_eq!(assessment.score, 15 - 6);
        assert!(assessment
            .problems
            .iter()
            .any(|p| p.issue == "Outdated TLS versions supported" && p.severity == Severity::High));
        assert_eq!(assessment.recommendations[0].problem_id, "tls_security_issues");
    }

    #[test]
    fn test_certificate_expiry_points() {
        let expired = completed(
            Category::TlsSecurity,
            Some(Payload::Tls(TlsPayload {
                certificate: Some(certificate(-5)),
                ..Default::default()
            })),
        );
        let a = assess(&expired);
        assert_eq!(a.score, 15 - 8);
        assert_eq!(a.problems[0].severity, Severity::Critical);

        let expiring = completed(
            Category::TlsSecurity,
            Some(Payload::Tls(TlsPayload {
                certificate: Some(certificate(10)),
                ..Default::default()
            })),
        );
        let a = assess(&expiring);
        assert_eq!(a.score, 15 - 3);
        assert_eq!(a.problems[0].description, "Certificate expires in 10 days");
    }

    #[test]
    fn test_tls_other_findings_deduct() {
        let result = completed(Category::TlsSecurity, Some(Payload::Tls(TlsPayload::default())))
            .with_finding(Finding::new(finding_types::WEAK_CIPHER, Severity::Medium, "Weak cipher suite supported: RC4-MD5"))
            .with_finding(
                Finding::new(finding_types::MISSING_HSTS, Severity::Low, "HSTS header not configured")
                    .with_recommendation("Enable HTTP Strict Transport Security"),
            );
        let a = assess(&result);
        assert_eq!(a.score, 14);
        assert!(a
            .recommendations
            .iter()
            .any(|r| r.recommendation == "Enable HTTP Strict Transport Security"));
    }

    #[test]
    fn test_failed_category_penalty() {
        let mut map = all_completed();
        map.insert(
            Category::EmailSecurity,
            ProbeResult::failed(
                Category::EmailSecurity,
                Duration::from_secs(1),
                "Scanning not possible; domain does not exist",
            ),
        );
        let report = ScoringEngine::new().score(&map);
        assert_eq!(report.score, 98);
        assert_eq!(report.summary.categories_failed, 1);
        assert_eq!(report.summary.categories_completed, 7);
        assert_eq!(report.summary.category_scores[&Category::EmailSecurity], 8.0);
    }

    #[test]
    fn test_all_failed_is_exactly_80() {
        let map: CategoryMap = Category::ALL
            .iter()
            .map(|c| (*c, ProbeResult::failed(*c, Duration::ZERO, "x")))
            .collect();
        let report = ScoringEngine::new().score(&map);
        assert_eq!(report.score, 80);
    }

    #[test]
    fn test_vulnerability_half_points() {
        let vuln = |sev| CveRecord {
            cve_id: "CVE-2024-0001".to_string(),
            severity: sev,
            description: "test".to_string(),
            cvss_score: None,
            affected_service: None,
        };
        let result = completed(
            Category::Vulnerabilities,
            Some(Payload::Vulnerabilities(VulnerabilityPayload {
                vulnerabilities: vec![vuln(Severity::Low), vuln(Severity::Low), vuln(Severity::Low)],
            })),
        );
        // 1.5 points truncates to 1
        let a = assess(&result);
        assert_eq!(a.score, 24);
        assert!(a.recommendations.is_empty());
    }

    #[test]
    fn test_monitoring_missing_controls() {
        let result = completed(
            Category::LoggingMonitoring,
            Some(Payload::Monitoring(MonitoringPayload::default())),
        );
        let a = assess(&result);
        assert_eq!(a.score, 0);
        assert_eq!(a.problems.len(), 3);
        assert_eq!(a.recommendations[0].problem_id, "security_monitoring");
    }

    #[test]
    fn test_problem_ordering() {
        let mut map = all_completed();
        map.insert(Category::InternetExposure, exposure(&[(80, "http"), (23, "telnet")]));
        map.insert(
            Category::LoggingMonitoring,
            completed(Category::LoggingMonitoring, Some(Payload::Monitoring(MonitoringPayload::default()))),
        );
        map.insert(
            Category::BackupDr,
            completed(
                Category::BackupDr,
                Some(Payload::BackupDr(BackupPayload {
                    exposed_backups: vec![crate::results::ExposedFile {
                        url: "https://example.com/site.zip".to_string(),
                        size_bytes: None,
                    }],
                    config_files: vec![],
                })),
            ),
        );

        let report = ScoringEngine::new().score(&map);
        let keys: Vec<_> = report
            .problems
            .iter()
            .map(|p| (p.severity, p.category.as_str()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(report.problems[0].severity, Severity::Critical);
    }

    #[test]
    fn test_recommendations_deduplicated() {
        let recs = vec![
            Recommendation::new("a", "Same text", Effort::Low, &[]),
            Recommendation::new("b", "Other", Effort::Low, &[]),
            Recommendation::new("c", "Same text", Effort::High, &[]),
        ];
        let unique = consolidate_recommendations(recs);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].problem_id, "a");
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let mut map = all_completed();
        map.insert(Category::InternetExposure, exposure(&[(21, "ftp"), (8080, "http-proxy")]));
        let engine = ScoringEngine::new();
        let first = serde_json::to_string(&engine.score(&map)).unwrap();
        let second = serde_json::to_string(&engine.score(&map)).unwrap();
        assert_eq!(first, second);
    }
}
