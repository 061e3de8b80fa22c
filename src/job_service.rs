//! Submission, query, cancellation and deletion of jobs.

use crate::error::{JobError, JobResult};
use crate::execution::ExecutionRegistry;
use crate::job_store::JobStore;
use crate::jobs::{Job, JobFilter, JobStatus, NewJob};
use crate::sandbox::ScriptEngine;
use crate::server::metrics;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct JobService {
    store: Arc<dyn JobStore>,
    registry: Arc<ExecutionRegistry>,
    engine: Arc<dyn ScriptEngine>,
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<ExecutionRegistry>,
        engine: Arc<dyn ScriptEngine>,
    ) -> Self {
        Self {
            store,
            registry,
            engine,
        }
    }

    /// Validates the code and persists a NEW job. Nothing is stored when the
    /// code does not parse.
    pub fn submit(&self, submission: NewJob) -> JobResult<Job> {
        self.engine
            .validate(&submission.code)
            .map_err(JobError::InvalidCodeProvided)?;

        let job = self.store.save(&Job::new(submission))?;
        info!("Submitted job {} ({})", job.id, job.name);
        metrics::record_job_submitted();
        Ok(job)
    }

    /// Stored state of the job, with live output while it is executing.
    pub fn get(&self, id: Uuid) -> JobResult<Job> {
        let job = self
            .store
            .find_by_id(id)?
            .ok_or_else(|| JobError::JobNotFound(id.to_string()))?;
        Ok(self.with_live_output(job))
    }

    pub fn find_by_name(&self, name: &str) -> JobResult<Job> {
        let job = self
            .store
            .find_by_name(name)?
            .ok_or_else(|| JobError::JobNotFound(name.to_string()))?;
        Ok(self.with_live_output(job))
    }

    pub fn list(&self, filter: &JobFilter) -> JobResult<Vec<Job>> {
        let jobs = self.store.find_matching(filter)?;
        Ok(jobs
            .into_iter()
            .map(|job| self.with_live_output(job))
            .collect())
    }

    /// Asks a running job to stop. Returns `false` when it is not running.
    pub fn cancel(&self, id: Uuid) -> JobResult<bool> {
        if self.store.find_by_id(id)?.is_none() {
            return Err(JobError::JobNotFound(id.to_string()));
        }
        let cancelled = self.registry.cancel(id);
        if cancelled {
            info!("Cancellation requested for job {}", id);
        } else {
            debug!("Job {} is not executing, nothing to cancel", id);
        }
        Ok(cancelled)
    }

    /// Stops the job if it is running, then removes it.
    pub fn delete(&self, id: Uuid) -> JobResult<()> {
        if self.store.find_by_id(id)?.is_none() {
            return Err(JobError::JobNotFound(id.to_string()));
        }
        self.registry.cancel(id);
        self.store.delete_by_id(id)?;
        info!("Deleted job {}", id);
        Ok(())
    }

    /// Stops everything in flight and removes every job. Returns how many were removed.
    pub fn delete_all(&self) -> JobResult<usize> {
        self.registry.cancel_all();
        let deleted = self.store.delete_all()?;
        info!("Deleted all {} jobs", deleted);
        Ok(deleted)
    }

    /// Number of runs currently in flight.
    pub fn executing_count(&self) -> usize {
        self.registry.len()
    }

    /// Signals every run in flight to stop. Their workers record them as STOPPED.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.registry.cancel_all();
        if cancelled > 0 {
            info!("Requested {} running jobs to stop", cancelled);
        }
        cancelled
    }

    fn with_live_output(&self, mut job: Job) -> Job {
        if job.status == JobStatus::Executing {
            if let Some(output) = self.registry.current_output(job.id) {
                job.output = output;
            }
            if let Some(error) = self.registry.current_error(job.id) {
                job.error = error;
            }
        }
        job
    }
}
