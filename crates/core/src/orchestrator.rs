//! Scan orchestration
//!
//! The [`Orchestrator`] runs every scheduled category against one target,
//! one category at a time, and folds the results through the scoring
//! engine. Each category runs in its own task so that a panicking probe
//! becomes a failed result instead of taking the job down with it.
//!
//! Probes are supplied through [`ProbeFactory`] registrations; nothing is
//! looked up from process-wide state.

use crate::config::Config;
use crate::error::{Error, Result, ScanFailure};
use crate::job::{JobStore, ScanJob};
use crate::results::{CategoryMap, ProbeResult, ProbeStatus};
use crate::scanner::ProbeFactory;
use crate::scoring::{ScoreReport, ScoringEngine};
use crate::timing::{Deadline, ScanTimer};
use crate::types::{Category, ScanMode, Target};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Emitted once per category, after it finishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub current_category: Category,
    pub status: ProbeStatus,
}

impl ProgressEvent {
    /// Whole-number completion percentage
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed.min(self.total) * 100) / self.total) as u8
    }
}

/// Progress sink supplied by the caller; may borrow the caller's state
pub type ProgressCallback<'a> = dyn Fn(&ProgressEvent) + Send + Sync + 'a;

/// Note recorded on a job whose scan did not finish
fn failure_note(error: &Error) -> String {
    match error {
        Error::Timeout { timeout_ms } => format!("Scan timed out after {} seconds", timeout_ms / 1000),
        other => other.to_string(),
    }
}

/// Category map together with its score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedScan {
    pub target: Target,
    pub mode: ScanMode,
    pub results: CategoryMap,
    pub report: ScoreReport,
}

/// Aborts the spawned probe task if the orchestrator future is dropped
struct AbortOnDrop(JoinHandle<ProbeResult>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs probe categories and scores the outcome
pub struct Orchestrator {
    config: Arc<Config>,
    factories: BTreeMap<Category, Arc<dyn ProbeFactory>>,
    categories: Vec<Category>,
    engine: ScoringEngine,
}

impl Orchestrator {
    /// Orchestrator scheduling every category, with no probes registered yet
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            factories: BTreeMap::new(),
            categories: Category::ALL.to_vec(),
            engine: ScoringEngine::new(),
        }
    }

    /// Register a probe factory, replacing any earlier one for its category
    pub fn register(&mut self, factory: Arc<dyn ProbeFactory>) {
        let category = factory.category();
        if self.factories.insert(category, factory).is_some() {
            debug!(category = %category, "Replaced probe factory");
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn ProbeFactory>) -> Self {
        self.register(factory);
        self
    }

    /// Restrict the schedule; order is always the fixed category order
    pub fn with_categories(mut self, categories: &[Category]) -> Self {
        let mut scheduled: Vec<Category> = categories.to_vec();
        scheduled.sort();
        scheduled.dedup();
        self.categories = scheduled;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduled_categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn has_probe(&self, category: Category) -> bool {
        self.factories.contains_key(&category)
    }

    /// Validate the target, run every scheduled category under the job
    /// deadlines, and score the result.
    pub async fn run_scan(
        &self,
        target: &str,
        mode: ScanMode,
        on_progress: &ProgressCallback<'_>,
    ) -> Result<CompletedScan> {
        let target: Target = target.parse()?;
        let deadline = Deadline::new(self.config.timing.soft_deadline, self.config.timing.hard_deadline);

        info!(target = %target, mode = %mode, categories = self.categories.len(), "Starting scan");

        let results = match tokio::time::timeout(
            deadline.hard_remaining(),
            self.run_categories(&target, mode, &deadline, on_progress),
        )
        .await
        {
            Ok(results) => results,
            Err(_) => {
                let limit = deadline.hard_limit();
                error!(target = %target, "Scan exceeded hard deadline of {}s", limit.as_secs());
                return Err(Error::timeout(limit.as_millis() as u64));
            }
        };

        let report = self.engine.score(&results);
        info!(target = %target, score = report.score, "Scan finished");

        Ok(CompletedScan {
            target,
            mode,
            results,
            report,
        })
    }

    /// Drive a job through its lifecycle, keeping `job.progress` current
    pub async fn execute_job(&self, job: &mut ScanJob, on_progress: &ProgressCallback<'_>) -> Result<()> {
        job.start()?;
        info!(job_id = %job.id, target = %job.target, "Job running");

        let target = job.target.clone();
        let mode = job.mode;
        let tracked = Mutex::new(&mut *job);
        let outcome = self
            .run_scan(&target, mode, &|event: &ProgressEvent| {
                tracked
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .set_progress(event.completed, event.total);
                on_progress(event);
            })
            .await;
        let job = tracked.into_inner().unwrap_or_else(PoisonError::into_inner);

        match outcome {
            Ok(scan) => {
                job.complete(scan.results, scan.report)?;
                info!(job_id = %job.id, "Job completed");
            }
            Err(e) => {
                let note = failure_note(&e);
                warn!(job_id = %job.id, error = e.category(), "Job failed: {}", note);
                job.fail(note)?;
            }
        }
        Ok(())
    }

    /// Run a job held in `store`. Progress is written back to the stored
    /// record after every category, so readers of the store see it move.
    ///
    /// Fails only when the record cannot be located or updated.
    pub async fn run_job(&self, store: &JobStore, id: Uuid, on_progress: &ProgressCallback<'_>) -> Result<()> {
        let (target, mode) = store.update(id, |job| {
            job.start()?;
            Ok((job.target.clone(), job.mode))
        })?;
        info!(job_id = %id, target = %target, "Job running");

        let outcome = self
            .run_scan(&target, mode, &|event: &ProgressEvent| {
                let updated = store.update(id, |job| {
                    job.set_progress(event.completed, event.total);
                    Ok(())
                });
                if let Err(e) = updated {
                    warn!(job_id = %id, "Progress not recorded: {}", e);
                }
                on_progress(event);
            })
            .await;

        match outcome {
            Ok(scan) => {
                store.update(id, |job| job.complete(scan.results, scan.report))?;
                info!(job_id = %id, "Job completed");
            }
            Err(e) => {
                let note = failure_note(&e);
                warn!(job_id = %id, error = e.category(), "Job failed: {}", note);
                store.update(id, |job| job.fail(note))?;
            }
        }
        Ok(())
    }

    /// Run the schedule sequentially. Always returns one entry per
    /// scheduled category.
    pub async fn run_categories(
        &self,
        target: &Target,
        mode: ScanMode,
        deadline: &Deadline,
        on_progress: &ProgressCallback<'_>,
    ) -> CategoryMap {
        let total = self.categories.len();
        let mut results = CategoryMap::new();

        for (index, category) in self.categories.iter().copied().enumerate() {
            let result = if deadline.soft_expired() {
                let soft = deadline.soft_limit().as_secs();
                warn!(category = %category, "Soft deadline reached, skipping category");
                ProbeResult::failed(
                    category,
                    Duration::ZERO,
                    ScanFailure::timeout(category.as_str(), soft).note(),
                )
            } else {
                self.run_category(category, target, mode).await
            };

            let event = ProgressEvent {
                completed: index + 1,
                total,
                current_category: category,
                status: result.status,
            };
            results.insert(category, result);
            on_progress(&event);
        }

        results
    }

    /// Build and run one category, isolating every failure
    async fn run_category(&self, category: Category, target: &Target, mode: ScanMode) -> ProbeResult {
        let timer = ScanTimer::start();

        let factory = match self.factories.get(&category) {
            Some(factory) => factory,
            None => {
                debug!(category = %category, "No probe registered");
                return ProbeResult::failed(
                    category,
                    timer.elapsed(),
                    ScanFailure::not_possible(format!("{} probe not available", category)).note(),
                );
            }
        };

        let scanner = match factory.build(target, mode, Arc::clone(&self.config)) {
            Ok(scanner) => scanner,
            Err(e) => {
                warn!(category = %category, "Probe construction failed: {}", e);
                return ProbeResult::failed(category, timer.elapsed(), format!("Scanning not possible: {}", e));
            }
        };

        let mut task = AbortOnDrop(tokio::spawn(async move { scanner.scan().await }));
        match (&mut task.0).await {
            Ok(mut result) => {
                // A probe may not relabel itself
                result.category = category;
                result
            }
            Err(join_error) => {
                let detail = if join_error.is_panic() {
                    "probe panicked".to_string()
                } else {
                    join_error.to_string()
                };
                error!(category = %category, "Probe task aborted: {}", detail);
                ProbeResult::failed(
                    category,
                    timer.elapsed(),
                    ScanFailure::network(category.as_str(), detail).note(),
                )
            }
        }
    }
}
