use crate::error::{JobError, JobResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    New,
    Scheduled,
    Executing,
    Completed,
    Errored,
    Stopped,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::New,
        JobStatus::Scheduled,
        JobStatus::Executing,
        JobStatus::Completed,
        JobStatus::Errored,
        JobStatus::Stopped,
    ];

    /// Statuses the dispatcher considers when looking for work.
    pub const DISPATCHABLE: [JobStatus; 3] =
        [JobStatus::New, JobStatus::Scheduled, JobStatus::Executing];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "NEW",
            JobStatus::Scheduled => "SCHEDULED",
            JobStatus::Executing => "EXECUTING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Errored => "ERRORED",
            JobStatus::Stopped => "STOPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Errored | JobStatus::Stopped
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a job submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub code: String,
    pub name: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// A schedulable unit of script code together with its execution record.
///
/// Status changes go through the transition methods below; each one checks
/// the current status and leaves the job untouched when the check fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub status: JobStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub output: String,
    pub error: String,
    pub created_date: DateTime<Utc>,
    pub begin_exec_date: Option<DateTime<Utc>>,
    pub end_exec_date: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a NEW job. A missing name is replaced by a freshly generated token.
    pub fn new(submission: NewJob) -> Self {
        let name = submission
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            id: Uuid::new_v4(),
            name,
            code: submission.code,
            status: JobStatus::New,
            scheduled_at: submission.scheduled_at,
            output: String::new(),
            error: String::new(),
            created_date: Utc::now(),
            begin_exec_date: None,
            end_exec_date: None,
        }
    }

    /// Whether the job may be started at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.map_or(true, |at| at <= now)
    }

    /// Wall-clock time spent executing, measured up to `now` while still running.
    pub fn execution_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        let begin = self.begin_exec_date?;
        Some(self.end_exec_date.unwrap_or(now) - begin)
    }

    /// NEW -> SCHEDULED
    pub fn schedule(&mut self) -> JobResult<()> {
        self.transition("schedule", JobStatus::New, JobStatus::Scheduled)
    }

    /// SCHEDULED -> EXECUTING, stamping the begin date.
    pub fn start(&mut self) -> JobResult<()> {
        self.transition("execute", JobStatus::Scheduled, JobStatus::Executing)?;
        self.begin_exec_date = Some(Utc::now());
        Ok(())
    }

    /// EXECUTING -> COMPLETED
    pub fn complete(&mut self, output: String, error: String) -> JobResult<()> {
        self.finish("complete", JobStatus::Completed, output, error)
    }

    /// EXECUTING -> ERRORED
    pub fn fail(&mut self, output: String, error: String) -> JobResult<()> {
        self.finish("fail", JobStatus::Errored, output, error)
    }

    /// EXECUTING -> STOPPED
    pub fn stop(&mut self, output: String, error: String) -> JobResult<()> {
        self.finish("stop", JobStatus::Stopped, output, error)
    }

    /// Puts a job left behind in SCHEDULED or EXECUTING back to NEW so it can
    /// be run again from scratch. Nothing else moves a status backwards.
    pub fn reset_for_recovery(&mut self) -> JobResult<()> {
        match self.status {
            JobStatus::Scheduled | JobStatus::Executing => {
                self.status = JobStatus::New;
                self.output.clear();
                self.error.clear();
                self.begin_exec_date = None;
                self.end_exec_date = None;
                Ok(())
            }
            current => Err(JobError::InvalidExecutionState {
                job_id: self.id,
                action: "recover",
                current,
                required: JobStatus::Executing,
            }),
        }
    }

    fn finish(
        &mut self,
        action: &'static str,
        target: JobStatus,
        output: String,
        error: String,
    ) -> JobResult<()> {
        self.transition(action, JobStatus::Executing, target)?;
        self.output = output;
        self.error = error;
        self.end_exec_date = Some(Utc::now());
        Ok(())
    }

    fn transition(
        &mut self,
        action: &'static str,
        required: JobStatus,
        target: JobStatus,
    ) -> JobResult<()> {
        if self.status != required {
            return Err(JobError::InvalidExecutionState {
                job_id: self.id,
                action,
                current: self.status,
                required,
            });
        }
        self.status = target;
        Ok(())
    }
}
