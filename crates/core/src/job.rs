//! Scan job lifecycle
//!
//! A job moves `Queued -> Running -> Completed | Failed`. Completed and
//! failed are terminal; any other transition is rejected. [`JobStore`]
//! keeps job records where a submitter can poll them while they run.

use crate::error::{Error, Result};
use crate::results::CategoryMap;
use crate::scoring::ScoreReport;
use crate::types::ScanMode;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested scan of one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: Uuid,
    pub target: String,
    pub mode: ScanMode,
    pub status: JobStatus,
    /// 0..=100
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure reason for failed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "CategoryMap::is_empty")]
    pub results: CategoryMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ScoreReport>,
}

impl ScanJob {
    pub fn new<S: Into<String>>(target: S, mode: ScanMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.into(),
            mode,
            status: JobStatus::Queued,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            note: None,
            results: CategoryMap::new(),
            report: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::invalid_transition(self.status, next));
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn set_progress(&mut self, completed: usize, total: usize) {
        if total > 0 {
            self.progress = ((completed.min(total) * 100) / total) as u8;
        }
    }

    /// Store results and report, finishing the job
    pub fn complete(&mut self, results: CategoryMap, report: ScoreReport) -> Result<()> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100;
        self.results = results;
        self.report = Some(report);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail<S: Into<String>>(&mut self, note: S) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.note = Some(note.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// In-memory job records keyed by job id
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, ScanJob>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a job record and return its id
    pub fn submit(&self, job: ScanJob) -> Uuid {
        let id = job.id;
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, job);
        id
    }

    /// Snapshot of a job record
    pub fn get(&self, id: Uuid) -> Result<ScanJob> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::job_not_found(id))
    }

    /// Apply `update` to the stored record under the write lock
    pub fn update<F, T>(&self, id: Uuid, update: F) -> Result<T>
    where
        F: FnOnce(&mut ScanJob) -> Result<T>,
    {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get_mut(&id).ok_or_else(|| Error::job_not_found(id))?;
        update(job)
    }

    pub fn remove(&self, id: Uuid) -> Option<ScanJob> {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
