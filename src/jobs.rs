//! Background optimization jobs.
//!
//! A job moves `Idle → Running → {Complete, Failed, Cancelled}`. Each job has
//! a `watch` channel carrying its latest [`JobStatus`] and a
//! [`CancellationToken`] checked by the optimizer between proposals.
//!
//! At most one job may be active per `(event, target arrangement)`; a second
//! start for the same key fails with [`JobError::JobAlreadyRunning`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::arrangement::{Arrangement, ArrangementId, EventId};
use crate::optimizer::{Phase, Progress};

pub type JobId = Uuid;

/// Finished jobs kept for status/result queries before the oldest are pruned.
const MAX_FINISHED_JOBS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub event_id: EventId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<ArrangementId>,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    pub progress_percent: u8,
    pub message: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    #[error("an optimization is already running for this target (job {0})")]
    JobAlreadyRunning(JobId),
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {0} has not finished yet")]
    NotFinished(JobId),
    #[error("optimization failed: {0}")]
    Failed(String),
    #[error("job {0} was cancelled before producing a result")]
    Cancelled(JobId),
}

/// How a job ended.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Complete(Vec<Arrangement>),
    /// Cancelled; may still carry best-so-far arrangements
    Cancelled(Vec<Arrangement>),
    Failed(String),
}

type JobKey = (EventId, Option<ArrangementId>);

struct JobEntry {
    key: JobKey,
    status: Arc<watch::Sender<JobStatus>>,
    cancel: CancellationToken,
    result: Option<Vec<Arrangement>>,
}

/// Handle given to the worker running a job.
#[derive(Clone, Debug)]
pub struct JobContext {
    pub job_id: JobId,
    pub event_id: EventId,
    status: Arc<watch::Sender<JobStatus>>,
    cancel: CancellationToken,
}

impl JobContext {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Publish a progress tick. Safe to call from a blocking thread.
    pub fn report(&self, progress: &Progress) {
        self.status.send_modify(|s| {
            s.phase = Some(progress.phase);
            s.progress_percent = progress.percent;
            s.message = progress.message.clone();
        });
    }
}

#[derive(Default)]
pub struct JobManager {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
    active: RwLock<HashMap<JobKey, JobId>>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running job for `(event_id, target)`.
    pub async fn register(
        &self,
        event_id: EventId,
        target: Option<ArrangementId>,
    ) -> Result<JobContext, JobError> {
        let key = (event_id, target);
        let mut active = self.active.write().await;
        if let Some(existing) = active.get(&key) {
            return Err(JobError::JobAlreadyRunning(*existing));
        }

        let job_id = Uuid::new_v4();
        let (tx, _) = watch::channel(JobStatus {
            job_id,
            event_id,
            target,
            state: JobState::Running,
            phase: None,
            progress_percent: 0,
            message: "Queued".into(),
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        });
        let status = Arc::new(tx);
        let cancel = CancellationToken::new();

        let mut jobs = self.jobs.write().await;
        prune_finished(&mut jobs);
        jobs.insert(
            job_id,
            JobEntry {
                key,
                status: status.clone(),
                cancel: cancel.clone(),
                result: None,
            },
        );
        active.insert(key, job_id);
        info!(%job_id, %event_id, target = ?target, "Optimization job registered");

        Ok(JobContext {
            job_id,
            event_id,
            status,
            cancel,
        })
    }

    /// Record the outcome and release the `(event, target)` slot.
    pub async fn finish(&self, job_id: JobId, outcome: JobOutcome) {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(&job_id) else {
            return;
        };

        let (state, result, error, message) = match outcome {
            JobOutcome::Complete(arrangements) => {
                let message = format!("Produced {} arrangements", arrangements.len());
                (JobState::Complete, Some(arrangements), None, message)
            }
            JobOutcome::Cancelled(arrangements) if arrangements.is_empty() => (
                JobState::Cancelled,
                None,
                None,
                "Cancelled before any candidate was produced".to_string(),
            ),
            JobOutcome::Cancelled(arrangements) => {
                let message = format!("Cancelled; kept {} best-so-far arrangements", arrangements.len());
                (JobState::Cancelled, Some(arrangements), None, message)
            }
            JobOutcome::Failed(reason) => {
                (JobState::Failed, None, Some(reason.clone()), format!("Failed: {}", reason))
            }
        };

        entry.result = result;
        entry.status.send_modify(|s| {
            s.state = state;
            s.finished_at = Some(Utc::now());
            s.error = error;
            s.message = message;
            if state == JobState::Complete {
                s.progress_percent = 100;
            }
        });
        let key = entry.key;
        drop(jobs);

        let mut active = self.active.write().await;
        if active.get(&key) == Some(&job_id) {
            active.remove(&key);
        }
        debug!(%job_id, state = %state, "Optimization job finished");
    }

    pub async fn status(&self, job_id: JobId) -> Result<JobStatus, JobError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(&job_id).ok_or(JobError::NotFound(job_id))?;
        let status = entry.status.borrow().clone();
        Ok(status)
    }

    /// Live status updates for push transports.
    pub async fn subscribe(&self, job_id: JobId) -> Result<watch::Receiver<JobStatus>, JobError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(&job_id).ok_or(JobError::NotFound(job_id))?;
        Ok(entry.status.subscribe())
    }

    /// Arrangements produced by a finished job.
    ///
    /// A cancelled job that got at least one candidate returns it.
    pub async fn result(&self, job_id: JobId) -> Result<Vec<Arrangement>, JobError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(&job_id).ok_or(JobError::NotFound(job_id))?;
        let status = entry.status.borrow().clone();
        match (status.state, &entry.result) {
            (JobState::Idle | JobState::Running, _) => Err(JobError::NotFinished(job_id)),
            (JobState::Failed, _) => Err(JobError::Failed(status.error.unwrap_or_default())),
            (_, Some(arrangements)) => Ok(arrangements.clone()),
            (JobState::Cancelled, None) => Err(JobError::Cancelled(job_id)),
            (JobState::Complete, None) => Ok(Vec::new()),
        }
    }

    /// Request cooperative cancellation. Finished jobs are left unchanged.
    pub async fn cancel(&self, job_id: JobId) -> Result<JobStatus, JobError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(&job_id).ok_or(JobError::NotFound(job_id))?;
        let status = entry.status.borrow().clone();
        if !status.state.is_finished() {
            entry.cancel.cancel();
            entry.status.send_modify(|s| s.message = "Cancellation requested".into());
            info!(%job_id, "Optimization job cancellation requested");
        }
        let status = entry.status.borrow().clone();
        Ok(status)
    }

    /// Jobs of an event, newest first.
    pub async fn list(&self, event_id: EventId) -> Vec<JobStatus> {
        let jobs = self.jobs.read().await;
        let mut statuses: Vec<JobStatus> = jobs
            .values()
            .filter(|e| e.key.0 == event_id)
            .map(|e| e.status.borrow().clone())
            .collect();
        statuses.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        statuses
    }

    pub async fn active_job(&self, event_id: EventId, target: Option<ArrangementId>) -> Option<JobId> {
        self.active.read().await.get(&(event_id, target)).copied()
    }

    /// Cancel every running job of an event.
    pub async fn cancel_event(&self, event_id: EventId) {
        let jobs = self.jobs.read().await;
        for entry in jobs.values().filter(|e| e.key.0 == event_id) {
            entry.cancel.cancel();
        }
    }
}

fn prune_finished(jobs: &mut HashMap<JobId, JobEntry>) {
    let mut finished: Vec<(DateTime<Utc>, JobId)> = jobs
        .iter()
        .filter_map(|(id, e)| {
            let status = e.status.borrow();
            status
                .state
                .is_finished()
                .then(|| (status.finished_at.unwrap_or(status.started_at), *id))
        })
        .collect();
    if finished.len() < MAX_FINISHED_JOBS {
        return;
    }
    finished.sort();
    let excess = finished.len() + 1 - MAX_FINISHED_JOBS;
    for (_, id) in finished.into_iter().take(excess) {
        jobs.remove(&id);
    }
}
