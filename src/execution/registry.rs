use crate::error::{JobError, JobResult};
use crate::sandbox::ScriptIo;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Live view of one in-flight run: its stop trigger and output streams.
#[derive(Debug, Clone, Default)]
pub struct ExecutionHandle {
    pub cancel: CancellationToken,
    pub io: ScriptIo,
}

/// Tracks every job currently handed to a worker.
///
/// Only the dispatcher registers and unregisters entries. Request handlers
/// read live output and trigger cancellation through it.
#[derive(Debug, Default)]
pub struct ExecutionRegistry {
    executions: Mutex<HashMap<Uuid, ExecutionHandle>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job_id: Uuid) -> JobResult<ExecutionHandle> {
        let mut executions = self.executions.lock().unwrap();
        if executions.contains_key(&job_id) {
            return Err(JobError::AlreadyExecuting(job_id));
        }
        let handle = ExecutionHandle::default();
        executions.insert(job_id, handle.clone());
        Ok(handle)
    }

    pub fn unregister(&self, job_id: Uuid) {
        if self.executions.lock().unwrap().remove(&job_id).is_none() {
            debug!("Job {} was not registered", job_id);
        }
    }

    pub fn contains(&self, job_id: Uuid) -> bool {
        self.executions.lock().unwrap().contains_key(&job_id)
    }

    pub fn len(&self) -> usize {
        self.executions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stdout produced so far, or `None` when the job is not in flight.
    pub fn current_output(&self, job_id: Uuid) -> Option<String> {
        let executions = self.executions.lock().unwrap();
        executions.get(&job_id).map(|h| h.io.stdout.snapshot())
    }

    /// Stderr produced so far, or `None` when the job is not in flight.
    pub fn current_error(&self, job_id: Uuid) -> Option<String> {
        let executions = self.executions.lock().unwrap();
        executions.get(&job_id).map(|h| h.io.stderr.snapshot())
    }

    /// Requests the run to stop. Returns `false` when the job is not in flight.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.executions.lock().unwrap().get(&job_id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Requests every in-flight run to stop and returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let executions = self.executions.lock().unwrap();
        for handle in executions.values() {
            handle.cancel.cancel();
        }
        executions.len()
    }
}
