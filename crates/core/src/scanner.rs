//! Scanner contract shared by every probe category
//!
//! A probe implements [`Scanner::execute`] and gets the rest for free:
//! [`Scanner::scan`] starts the timer, runs the probe and folds any
//! [`ScanFailure`] into a failed [`ProbeResult`], so nothing escapes the
//! probe boundary as an error. A panic in the probe body is caught there
//! too.

use crate::config::Config;
use crate::error::{Result, ScanFailure};
use crate::results::{Finding, Payload, ProbeResult, ProbeStatus};
use crate::timing::ScanTimer;
use crate::types::{Category, ScanMode, Target};

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of a probe body before it is turned into a `ProbeResult`
pub type ScanOutcome = std::result::Result<ProbeResult, ScanFailure>;

/// Lifecycle state shared by every scanner implementation
#[derive(Debug, Clone)]
pub struct ScanBase {
    category: Category,
    target: Target,
    mode: ScanMode,
    config: Arc<Config>,
}

impl ScanBase {
    /// Validate the raw target and capture the scan parameters.
    ///
    /// This is the only place an error is raised for a probe.
    pub fn new(category: Category, target: &str, mode: ScanMode, config: Arc<Config>) -> Result<Self> {
        let target: Target = target.parse()?;
        Ok(Self::from_target(category, target, mode, config))
    }

    /// Build from an already validated target
    pub fn from_target(category: Category, target: Target, mode: ScanMode, config: Arc<Config>) -> Self {
        Self {
            category,
            target,
            mode,
            config,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// True when probes should shrink their work lists and skip expensive steps
    pub fn quick_mode(&self) -> bool {
        self.mode.is_quick()
    }

    /// Capture the start timestamp for a scan
    pub fn start_scan(&self) -> ScanTimer {
        info!(category = %self.category, target = %self.target, mode = %self.mode, "Starting probe");
        ScanTimer::start()
    }

    /// Assemble the standard result shape
    pub fn build_result(
        &self,
        timer: &ScanTimer,
        status: ProbeStatus,
        payload: Option<Payload>,
        note: Option<String>,
    ) -> ProbeResult {
        match status {
            ProbeStatus::Completed => ProbeResult::completed(self.category, timer.elapsed(), payload),
            ProbeStatus::Failed => ProbeResult::failed(
                self.category,
                timer.elapsed(),
                note.unwrap_or_else(|| format!("Data not obtained; {} failed", self.category)),
            ),
        }
    }

    /// Completed result with its findings
    pub fn completed(&self, timer: &ScanTimer, payload: Payload, findings: Vec<Finding>) -> ProbeResult {
        self.build_result(timer, ProbeStatus::Completed, Some(payload), None)
            .with_findings(findings)
    }

    /// Failed result for one of the standard failure shapes
    pub fn failure(&self, timer: &ScanTimer, failure: &ScanFailure) -> ProbeResult {
        self.build_result(timer, ProbeStatus::Failed, None, Some(failure.note()))
    }

    pub fn timeout_failure(&self, timer: &ScanTimer, operation: &str, timeout_secs: u64) -> ProbeResult {
        self.failure(timer, &ScanFailure::timeout(operation, timeout_secs))
    }

    pub fn network_failure(&self, timer: &ScanTimer, operation: &str, detail: &str) -> ProbeResult {
        self.failure(timer, &ScanFailure::network(operation, detail))
    }

    pub fn not_possible(&self, timer: &ScanTimer, reason: &str) -> ProbeResult {
        self.failure(timer, &ScanFailure::not_possible(reason))
    }
}

/// A probe category
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Shared lifecycle state
    fn base(&self) -> &ScanBase;

    /// Probe body; step failures should already be absorbed, only a total
    /// inability to probe comes back as `Err`
    async fn execute(&self, timer: &ScanTimer) -> ScanOutcome;

    fn category(&self) -> Category {
        self.base().category()
    }

    /// Run the probe. Never fails: every failure becomes a failed result.
    async fn scan(&self) -> ProbeResult {
        let base = self.base();
        let timer = base.start_scan();

        let result = match AssertUnwindSafe(self.execute(&timer)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(failure)) => {
                warn!(category = %base.category(), kind = failure.kind(), "Probe failed: {}", failure);
                base.failure(&timer, &failure)
            }
            Err(_) => {
                error!(category = %base.category(), "Probe panicked");
                base.failure(&timer, &ScanFailure::network(base.category().as_str(), "probe panicked"))
            }
        };

        debug!(
            category = %base.category(),
            status = ?result.status,
            findings = result.findings.len(),
            "Probe finished in {}",
            result.duration
        );
        result
    }
}

/// Builds a scanner for one category; registered with the orchestrator
pub trait ProbeFactory: Send + Sync {
    fn category(&self) -> Category;

    /// Construct a scanner; fails only for invalid targets
    fn build(&self, target: &Target, mode: ScanMode, config: Arc<Config>) -> Result<Box<dyn Scanner>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{MonitoringPayload, Payload};
    use crate::types::Severity;

    struct StaticScanner {
        base: ScanBase,
        outcome: fn(&ScanBase, &ScanTimer) -> ScanOutcome,
    }

    #[async_trait]
    impl Scanner for StaticScanner {
        fn base(&self) -> &ScanBase {
            &self.base
        }

        async fn execute(&self, timer: &ScanTimer) -> ScanOutcome {
            (self.outcome)(&self.base, timer)
        }
    }

    fn base() -> ScanBase {
        ScanBase::new(
            Category::LoggingMonitoring,
            "example.com",
            ScanMode::Quick,
            Arc::new(Config::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_construction_rejects_invalid_target() {
        let result = ScanBase::new(
            Category::TlsSecurity,
            "not a target",
            ScanMode::Full,
            Arc::new(Config::default()),
        );
        assert!(matches!(result, Err(crate::Error::InvalidTarget(_))));
    }

    #[test]
    fn test_quick_mode() {
        assert!(base().quick_mode());
    }

    #[tokio::test]
    async fn test_scan_returns_completed_result() {
        let scanner = StaticScanner {
            base: base(),
            outcome: |base, timer| {
                Ok(base.completed(
                    timer,
                    Payload::Monitoring(MonitoringPayload::default()),
                    vec![Finding::new("no_waf", Severity::Low, "No WAF detected")],
                ))
            },
        };

        let result = scanner.scan().await;
        assert!(result.is_completed());
        assert_eq!(result.category, Category::LoggingMonitoring);
        assert_eq!(result.findings.len(), 1);
        assert!(result.duration.ends_with("seconds"));
    }

    #[tokio::test]
    async fn test_scan_folds_failures_into_result() {
        let scanner = StaticScanner {
            base: base(),
            outcome: |_, _| Err(ScanFailure::timeout("monitoring checks", 30)),
        };

        let result = scanner.scan().await;
        assert!(result.is_failed());
        assert_eq!(
            result.note.as_deref(),
            Some("Data not obtained; monitoring checks timed out after 30 seconds")
        );
        assert!(result.payload.is_none());
    }

    #[tokio::test]
    async fn test_scan_catches_panics() {
        let scanner = StaticScanner {
            base: base(),
            outcome: |_, _| panic!("unexpected probe state"),
        };

        let result = scanner.scan().await;
        assert!(result.is_failed());
        assert_eq!(result.category, Category::LoggingMonitoring);
        assert_eq!(
            result.note.as_deref(),
            Some("Data not obtained; logging_monitoring failed: probe panicked")
        );
    }

    #[test]
    fn test_standard_failure_helpers() {
        let base = base();
        let timer = ScanTimer::start();

        let r = base.network_failure(&timer, "port scanning", "connection reset");
        assert_eq!(r.note.as_deref(), Some("Data not obtained; port scanning failed: connection reset"));

        let r = base.not_possible(&timer, "nmap access denied or blocked");
        assert_eq!(r.note.as_deref(), Some("Scanning not possible; nmap access denied or blocked"));

        let r = base.timeout_failure(&timer, "TLS/SSL analysis", 5);
        assert!(r.is_failed());
    }
}
