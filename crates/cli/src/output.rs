//! Report rendering for the CLI

use anyhow::{Context, Result};
use colored::*;
use exposcan_core::results::{ExposurePayload, TlsPayload};
use exposcan_core::{Category, JobStatus, Payload, ProbeResult, ScanJob, ScoreReport, Severity};
use std::{fs::File, io::Write, path::PathBuf};
use tracing::info;

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable console output
    Human,
    /// JSON format
    Json,
}

/// Writes a finished job to stdout or a file
pub struct OutputWriter {
    format: OutputFormat,
    output_file: Option<PathBuf>,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            output_file: None,
        }
    }

    /// Set output file
    pub fn with_file<P: Into<PathBuf>>(mut self, file: P) -> Self {
        self.output_file = Some(file.into());
        self
    }

    pub fn render(&self, job: &ScanJob) -> Result<String> {
        match self.format {
            OutputFormat::Human => Ok(format_human(job)),
            OutputFormat::Json => {
                serde_json::to_string_pretty(job).context("Failed to serialize results to JSON")
            }
        }
    }

    pub fn write_job(&self, job: &ScanJob) -> Result<()> {
        let content = self.render(job)?;

        if let Some(file_path) = &self.output_file {
            let mut file = File::create(file_path)
                .with_context(|| format!("Failed to create output file: {:?}", file_path))?;
            file.write_all(content.as_bytes())
                .with_context(|| format!("Failed to write to output file: {:?}", file_path))?;
            info!("Results written to {:?}", file_path);
        } else {
            println!("{}", content);
        }

        Ok(())
    }
}

fn severity_label(severity: Severity) -> ColoredString {
    let label = format!("{:<8}", severity.as_str().to_uppercase());
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        _ => label.normal(),
    }
}

fn score_label(score: u8) -> ColoredString {
    let label = format!("{}/100", score);
    if score >= 80 {
        label.green().bold()
    } else if score >= 60 {
        label.yellow().bold()
    } else {
        label.red().bold()
    }
}

fn category_line(category: Category, result: Option<&ProbeResult>, report: &ScoreReport) -> String {
    let points = report.summary.category_scores.get(&category).copied().unwrap_or(0.0);
    let (status, detail) = match result {
        Some(r) if r.is_completed() => ("completed".green(), r.duration.clone()),
        Some(r) => ("failed".red(), r.note.clone().unwrap_or_default()),
        None => ("missing".red(), String::new()),
    };
    format!(
        "  {:<24} {:<10} {:>5.1}/{:<3} {}\n",
        category.display_name(),
        status,
        points,
        category.weight(),
        detail.dimmed()
    )
}

fn exposure_details(content: &mut String, payload: &ExposurePayload) {
    content.push_str(&format!(
        "\n{} {} open of {} scanned ({})\n",
        "Open ports:".bold(),
        payload.open_ports.len(),
        payload.total_ports_scanned,
        payload.scan_method.as_str()
    ));
    for port in &payload.open_ports {
        let product = [port.product.as_deref(), port.version.as_deref()]
            .iter()
            .flatten()
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        content.push_str(&format!(
            "  {:<10} {:<14} {}\n",
            format!("{}/{}", port.port, port.protocol),
            port.service_name,
            product
        ));
    }
    if let Some(os) = &payload.os_fingerprint {
        content.push_str(&format!("  {} {} ({}%)\n", "OS:".bold(), os.name.cyan(), os.accuracy));
    }
}

fn tls_details(content: &mut String, payload: &TlsPayload) {
    content.push_str(&format!("\n{} {}\n", "TLS versions:".bold(), payload.tls_versions.join(", ")));
    if let Some(cert) = &payload.certificate {
        content.push_str(&format!("  Subject:  {}\n", cert.subject));
        content.push_str(&format!("  Issuer:   {}\n", cert.issuer));
        content.push_str(&format!(
            "  Expires:  {} ({} days)\n",
            cert.valid_until.format("%Y-%m-%d"),
            cert.days_until_expiry
        ));
    }
    for cipher in &payload.cipher_suites {
        content.push_str(&format!("  Cipher:   {} ({}, {} bits)\n", cipher.name, cipher.version, cipher.bits));
    }
    content.push_str(&format!(
        "  HSTS:     {}\n",
        match (payload.hsts_enabled, payload.hsts_max_age) {
            (true, Some(age)) => format!("enabled (max-age={})", age),
            (true, None) => "enabled".to_string(),
            (false, _) => "not configured".to_string(),
        }
    ));
}

/// Format a job in human-readable form
pub fn format_human(job: &ScanJob) -> String {
    let mut content = String::new();

    content.push_str(&format!(
        "\n{} - {} ({} scan)\n",
        "exposcan report".bold().cyan(),
        job.target,
        job.mode
    ));
    content.push_str(&"=".repeat(60));
    content.push('\n');
    content.push_str(&format!("{} {}\n", "Job:".bold(), job.id));

    let status = match job.status {
        JobStatus::Completed => job.status.as_str().green(),
        JobStatus::Failed => job.status.as_str().red(),
        _ => job.status.as_str().normal(),
    };
    content.push_str(&format!("{} {}\n", "Status:".bold(), status));

    if let Some(note) = &job.note {
        content.push_str(&format!("{} {}\n", "Note:".bold(), note));
    }

    let report = match &job.report {
        Some(report) => report,
        None => return content,
    };

    content.push_str(&format!("\n{} {}\n", "Security score:".bold(), score_label(report.score)));

    content.push_str(&format!("\n{}\n", "Categories".bold()));
    for category in report.summary.category_scores.keys() {
        content.push_str(&category_line(*category, job.results.get(category), report));
    }

    for result in job.results.values() {
        match &result.payload {
            Some(Payload::ServiceDiscovery(payload)) => exposure_details(&mut content, payload),
            Some(Payload::Tls(payload)) => tls_details(&mut content, payload),
            _ => {}
        }
    }

    if !report.problems.is_empty() {
        content.push_str(&format!("\n{}\n", "Problems".bold()));
        for problem in &report.problems {
            content.push_str(&format!(
                "  {} {} - {}\n",
                severity_label(problem.severity),
                problem.issue,
                problem.description
            ));
        }
    }

    if !report.recommendations.is_empty() {
        content.push_str(&format!("\n{}\n", "Recommendations".bold()));
        for (idx, rec) in report.recommendations.iter().enumerate() {
            content.push_str(&format!(
                "  {}. {} (effort: {:?})\n",
                idx + 1,
                rec.recommendation,
                rec.effort_estimate
            ));
            for step in &rec.steps {
                content.push_str(&format!("     - {}\n", step));
            }
        }
    }

    let summary = &report.summary;
    content.push_str(&format!(
        "\n{} {} issues ({} critical, {} high, {} medium, {} low); {}/{} categories completed\n",
        "Summary:".bold(),
        summary.total_issues_found,
        summary.critical_issues,
        summary.high_issues,
        summary.medium_issues,
        summary.low_issues,
        summary.categories_completed,
        summary.categories_scanned
    ));

    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposcan_core::results::MonitoringPayload;
    use exposcan_core::{CategoryMap, ScoringEngine};
    use std::time::Duration;

    fn completed_job() -> ScanJob {
        let mut results = CategoryMap::new();
        for category in Category::ALL {
            let result = if category == Category::EmailSecurity {
                ProbeResult::failed(category, Duration::from_secs(1), "Data not obtained; DNS lookup failed: SERVFAIL")
            } else if category == Category::LoggingMonitoring {
                ProbeResult::completed(
                    category,
                    Duration::from_secs(1),
                    Some(Payload::Monitoring(MonitoringPayload::default())),
                )
            } else {
                ProbeResult::completed(category, Duration::from_secs(1), None)
            };
            results.insert(category, result);
        }
        let report = ScoringEngine::new().score(&results);

        let mut job = ScanJob::new("example.com", exposcan_core::ScanMode::Quick);
        job.start().unwrap();
        job.complete(results, report).unwrap();
        job
    }

    #[test]
    fn test_human_report() {
        colored::control::set_override(false);
        let job = completed_job();
        let score = job.report.as_ref().unwrap().score;
        let text = format_human(&job);

        assert!(text.contains("Status: COMPLETED"));
        assert!(text.contains(&format!("Security score: {}/100", score)));
        assert!(text.contains("Email Authentication"));
        assert!(text.contains("DNS lookup failed"));
        assert!(text.contains("categories completed"));
    }

    #[test]
    fn test_failed_job_has_no_score() {
        colored::control::set_override(false);
        let mut job = ScanJob::new("example.com", exposcan_core::ScanMode::Full);
        job.start().unwrap();
        job.fail("Scan timed out after 600 seconds").unwrap();

        let text = format_human(&job);
        assert!(text.contains("Status: FAILED"));
        assert!(text.contains("Note: Scan timed out after 600 seconds"));
        assert!(!text.contains("Security score"));
    }

    #[test]
    fn test_json_written_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let job = completed_job();

        OutputWriter::new(OutputFormat::Json)
            .with_file(&path)
            .write_job(&job)
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["status"], "COMPLETED");
        assert_eq!(value["target"], "example.com");
        assert!(value["report"]["score"].is_u64());
    }
}
