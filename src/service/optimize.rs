//! Optimization jobs on top of the seating service.
//!
//! ```text
//! start_optimization ──► preflight ──► register ──► spawn_blocking(optimize)
//!                         (errors are       │              │ progress → watch + bus
//!                          returned, no     │              ▼
//!                          job is left)     └──── commit candidates as drafts ──► finish
//! ```
//!
//! The job searches a snapshot of the graph taken at start. Guests deleted
//! while it ran are dropped from its candidates before they are stored.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::{payload, EventState, OptimizeRequest, SeatingService, ServiceError, ServiceResult, Touched};
use crate::arrangement::{Arrangement, ArrangementId, ArrangementOrigin, EventId, StoreError};
use crate::events::{EntityType, EventEmitter, SeatingAction};
use crate::graph::GuestGraph;
use crate::jobs::{JobContext, JobError, JobId, JobOutcome, JobStatus};
use crate::optimizer::{self, OptimizationOutcome, OptimizerConfig, Progress};

impl SeatingService {
    /// Validate and start a background optimization for an event.
    ///
    /// Input errors (no guests, insufficient capacity, bad configuration) are
    /// returned here and no job is registered. A second start for the same
    /// `(event, target)` while one runs fails with `JobAlreadyRunning`.
    pub async fn start_optimization(
        self: &Arc<Self>,
        event_id: EventId,
        req: OptimizeRequest,
    ) -> ServiceResult<JobStatus> {
        let state = self.state(event_id).await?;
        let (graph, config) = {
            let guard = state.read().await;
            let target_tables = match req.target {
                Some(id) => Some(
                    guard
                        .arrangements
                        .get(id)
                        .ok_or(StoreError::NotFound(id))?
                        .tables
                        .clone(),
                ),
                None => None,
            };
            let config = req.resolve(
                &self.defaults,
                guard.arrangements.settings(),
                &guard.tables,
                target_tables.as_deref(),
            );
            (guard.graph.clone(), config)
        };

        optimizer::preflight(&graph, &config)?;
        let ctx = self.jobs.register(event_id, req.target).await?;
        let status = self.jobs.status(ctx.job_id).await?;
        info!(
            job_id = %ctx.job_id,
            %event_id,
            guests = graph.guest_count(),
            candidates = config.candidates,
            "Optimization started"
        );
        self.bus
            .emit_job(SeatingAction::Created, &ctx.job_id.to_string(), event_id, payload(&status));

        let service = Arc::clone(self);
        let target = req.target;
        tokio::spawn(async move {
            service.run_job(ctx, target, graph, config).await;
        });
        Ok(status)
    }

    async fn run_job(
        self: Arc<Self>,
        ctx: JobContext,
        target: Option<ArrangementId>,
        graph: GuestGraph,
        config: OptimizerConfig,
    ) {
        let job_id = ctx.job_id;
        let event_id = ctx.event_id;
        let worker = ctx.clone();
        let bus = Arc::clone(&self.bus);

        let handle = tokio::task::spawn_blocking(move || {
            let cancel = worker.cancel_token().clone();
            let job = job_id.to_string();
            let mut on_progress = |progress: Progress| {
                worker.report(&progress);
                bus.emit_job(SeatingAction::Progress, &job, event_id, payload(&progress));
            };
            optimizer::optimize(&graph, &config, &cancel, &mut on_progress)
        });

        let outcome = match handle.await {
            Ok(Ok(outcome)) => self.commit_outcome(job_id, event_id, outcome).await,
            Ok(Err(e)) => JobOutcome::Failed(e.to_string()),
            Err(e) => {
                error!(%job_id, error = %e, "Optimizer worker did not complete");
                JobOutcome::Failed(format!("optimizer worker failed: {}", e))
            }
        };

        let action = match &outcome {
            JobOutcome::Complete(_) => SeatingAction::Completed,
            JobOutcome::Cancelled(_) => SeatingAction::Cancelled,
            JobOutcome::Failed(_) => SeatingAction::Failed,
        };
        self.jobs.finish(job_id, outcome).await;
        if let Ok(status) = self.jobs.status(job_id).await {
            info!(%job_id, %event_id, target = ?target, state = %status.state, "Optimization finished");
            self.bus
                .emit_job(action, &job_id.to_string(), event_id, payload(&status));
        }
    }

    /// Store the candidates of a finished run as draft arrangements.
    async fn commit_outcome(
        &self,
        job_id: JobId,
        event_id: EventId,
        outcome: OptimizationOutcome,
    ) -> JobOutcome {
        let state = match self.state(event_id).await {
            Ok(state) => state,
            Err(_) => return JobOutcome::Failed("event was deleted during optimization".into()),
        };
        let mut guard = state.write().await;
        let short_id: String = job_id.to_string().chars().take(8).collect();
        let tables = outcome.tables;
        let candidates = outcome.candidates;

        let committed = self
            .commit(&state, &mut guard, |staged| {
                let EventState {
                    graph, arrangements, ..
                } = staged;
                let mut stored = Vec::with_capacity(candidates.len());
                for (k, candidate) in candidates.into_iter().enumerate() {
                    let mut assignment = candidate.assignment;
                    assignment.retain(|guest, _| graph.contains(*guest));

                    let mut arrangement = Arrangement::new(
                        event_id,
                        format!("Candidate {} ({})", k + 1, short_id),
                        tables.clone(),
                    )
                    .with_assignment(assignment);
                    arrangement.origin = ArrangementOrigin::Optimizer;

                    match arrangements.insert(arrangement, graph) {
                        Ok(inserted) => stored.push(inserted.clone()),
                        Err(e) => warn!(%job_id, candidate = k + 1, error = %e, "Discarding optimizer candidate"),
                    }
                }
                let touched = Touched::arrangements(stored.iter().map(|a| a.id));
                Ok((stored, touched))
            })
            .await;
        drop(guard);

        let stored = match committed {
            Ok(stored) => stored,
            Err(ServiceError::EventNotFound(_)) => {
                return JobOutcome::Failed("event was deleted during optimization".into())
            }
            Err(e) => return JobOutcome::Failed(format!("failed to persist candidates: {:#}", e)),
        };

        for arrangement in &stored {
            self.bus.emit_created(
                EntityType::Arrangement,
                &arrangement.id.to_string(),
                event_id,
                payload(arrangement),
            );
        }

        if outcome.cancelled {
            JobOutcome::Cancelled(stored)
        } else {
            JobOutcome::Complete(stored)
        }
    }

    // ========================================================================
    // Job control
    // ========================================================================

    pub async fn job_status(&self, job_id: JobId) -> ServiceResult<JobStatus> {
        Ok(self.jobs.status(job_id).await?)
    }

    /// Status of a job that must belong to `event_id`.
    pub async fn event_job_status(&self, event_id: EventId, job_id: JobId) -> ServiceResult<JobStatus> {
        let status = self.jobs.status(job_id).await?;
        if status.event_id != event_id {
            return Err(ServiceError::Job(JobError::NotFound(job_id)));
        }
        Ok(status)
    }

    pub async fn job_result(&self, job_id: JobId) -> ServiceResult<Vec<Arrangement>> {
        Ok(self.jobs.result(job_id).await?)
    }

    /// Request cooperative cancellation. The job still finishes with its
    /// best-so-far candidates.
    pub async fn cancel_job(&self, job_id: JobId) -> ServiceResult<JobStatus> {
        Ok(self.jobs.cancel(job_id).await?)
    }

    pub async fn list_jobs(&self, event_id: EventId) -> ServiceResult<Vec<JobStatus>> {
        self.state(event_id).await?;
        Ok(self.jobs.list(event_id).await)
    }

    pub async fn subscribe_job(&self, job_id: JobId) -> ServiceResult<watch::Receiver<JobStatus>> {
        Ok(self.jobs.subscribe(job_id).await?)
    }

    /// Wait until a job has finished and return its final status.
    pub async fn wait_for_job(&self, job_id: JobId) -> ServiceResult<JobStatus> {
        let mut rx = self.subscribe_job(job_id).await?;
        loop {
            let status = rx.borrow_and_update().clone();
            if status.state.is_finished() {
                return Ok(status);
            }
            if rx.changed().await.is_err() {
                return self.job_status(job_id).await;
            }
        }
    }
}
