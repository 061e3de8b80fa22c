use super::JobStore;
use crate::jobs::{by_creation, Job, JobFilter, JobStatus};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Process-local store, used when no database path is configured and in tests.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn save(&self, job: &Job) -> Result<Job> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(job.clone())
    }

    fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&job.id) {
            Some(stored) if stored.status == expected => {
                *stored = job.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Job>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .values()
            .filter(|job| job.name == name)
            .min_by(|a, b| by_creation(a, b))
            .cloned())
    }

    fn find_all_by_status_in(&self, statuses: &[JobStatus]) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().unwrap();
        let mut found: Vec<Job> = jobs
            .values()
            .filter(|job| statuses.contains(&job.status))
            .cloned()
            .collect();
        found.sort_by(by_creation);
        Ok(found)
    }

    fn find_matching(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(filter.apply(jobs.values().cloned()))
    }

    fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        Ok(self.jobs.lock().unwrap().remove(&id).is_some())
    }

    fn delete_all(&self) -> Result<usize> {
        let mut jobs = self.jobs.lock().unwrap();
        let count = jobs.len();
        jobs.clear();
        Ok(count)
    }
}
