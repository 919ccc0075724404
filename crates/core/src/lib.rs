//! # exposcan core
//!
//! Scan model and execution engine for external security-posture scans.
//! Probes implement the [`Scanner`] contract, the [`Orchestrator`] runs
//! them against one target with per-category failure isolation, and the
//! [`ScoringEngine`] folds the resulting [`CategoryMap`] into a single
//! deterministic [`ScoreReport`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use exposcan_core::{Config, Orchestrator, ScanMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::new(Config::default());
//!     let scan = orchestrator
//!         .run_scan("example.com", ScanMode::Quick, &|event| {
//!             println!("{}/{} {}", event.completed, event.total, event.current_category);
//!         })
//!         .await?;
//!
//!     println!("Score: {}", scan.report.score);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod results;
pub mod scanner;
pub mod scoring;
pub mod timing;
pub mod types;

// Re-export main types
pub use config::{Config, LogFormat, LogLevel, NativeToolPolicy};
pub use error::{ConfigError, Error, JobError, Result, ScanFailure};
pub use job::{JobStatus, JobStore, ScanJob};
pub use orchestrator::{CompletedScan, Orchestrator, ProgressCallback, ProgressEvent};
pub use results::{
    finding_types, CategoryMap, Finding, OpenPort, Payload, ProbeResult, ProbeStatus, ScanMethod,
};
pub use scanner::{ProbeFactory, ScanBase, ScanOutcome, Scanner};
pub use scoring::{Problem, Recommendation, ScoreReport, ScoreSummary, ScoringEngine};
pub use timing::{Deadline, ScanTimer};
pub use types::{Category, ScanMode, Severity, Target};

/// Current version of the exposcan core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent string for HTTP requests
pub const USER_AGENT: &str = concat!("exposcan/", env!("CARGO_PKG_VERSION"));

/// Hard cap on concurrent connection attempts per probe
pub const MAX_WORKERS: usize = 50;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_user_agent() {
        assert!(USER_AGENT.starts_with("exposcan/"));
    }

    #[test]
    fn test_weights_sum_to_100() {
        let total: u32 = Category::ALL.iter().map(|c| c.weight()).sum();
        assert_eq!(total, 100);
    }
}
