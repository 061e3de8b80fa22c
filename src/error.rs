use crate::jobs::JobStatus;
use thiserror::Error;
use uuid::Uuid;

pub type JobResult<T> = std::result::Result<T, JobError>;

/// Errors surfaced by job submission, queries and lifecycle transitions.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid code provided: {0}")]
    InvalidCodeProvided(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error(
        "Could not perform action \"{action}\" on job {job_id}: current status is {current}, but required status is {required}"
    )]
    InvalidExecutionState {
        job_id: Uuid,
        action: &'static str,
        current: JobStatus,
        required: JobStatus,
    },

    #[error("Job {0} is already executing")]
    AlreadyExecuting(Uuid),

    #[error("Job store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl JobError {
    /// Short machine-readable name used in API error bodies and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::InvalidCodeProvided(_) => "invalid_code_provided",
            JobError::JobNotFound(_) => "job_not_found",
            JobError::InvalidExecutionState { .. } => "invalid_execution_state",
            JobError::AlreadyExecuting(_) => "already_executing",
            JobError::Store(_) => "store_failure",
        }
    }
}
