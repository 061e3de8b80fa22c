//! Keyed storage for job records.

mod memory_store;
mod schema;
mod sqlite_store;

pub use memory_store::InMemoryJobStore;
pub use sqlite_store::SqliteJobStore;

use crate::jobs::{Job, JobFilter, JobStatus};
use anyhow::Result;
use uuid::Uuid;

/// Persistence contract for jobs.
///
/// Implementations serialize writes internally, so a single instance can be
/// shared between the dispatcher, its workers and the request handlers.
pub trait JobStore: Send + Sync {
    /// Inserts or replaces the job with the same id and returns what was stored.
    fn save(&self, job: &Job) -> Result<Job>;

    /// Replaces the stored job only if its persisted status is still `expected`.
    /// Returns `false` when the job is missing or its status moved on.
    fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool>;

    fn find_by_id(&self, id: Uuid) -> Result<Option<Job>>;

    /// Names are not unique; the oldest job carrying `name` is returned.
    fn find_by_name(&self, name: &str) -> Result<Option<Job>>;

    fn find_all_by_status_in(&self, statuses: &[JobStatus]) -> Result<Vec<Job>>;

    fn find_matching(&self, filter: &JobFilter) -> Result<Vec<Job>>;

    /// Returns whether a job was actually removed.
    fn delete_by_id(&self, id: Uuid) -> Result<bool>;

    /// Returns the number of removed jobs.
    fn delete_all(&self) -> Result<usize>;
}

/// Behaviour every [`JobStore`] must share, run against each implementation.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;
    use crate::jobs::NewJob;
    use chrono::Duration;

    pub fn job(name: &str) -> Job {
        Job::new(NewJob {
            code: "print('x')".to_string(),
            name: Some(name.to_string()),
            scheduled_at: None,
        })
    }

    pub fn save_is_an_upsert(store: &dyn JobStore) {
        let mut job = job("upsert");
        store.save(&job).unwrap();
        job.schedule().unwrap();
        store.save(&job).unwrap();

        let loaded = store.find_by_id(job.id).unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Scheduled);
        assert_eq!(store.find_matching(&JobFilter::default()).unwrap().len(), 1);
    }

    pub fn round_trips_every_field(store: &dyn JobStore) {
        let mut job = job("fields");
        job.scheduled_at = Some(job.created_date + Duration::seconds(5));
        job.schedule().unwrap();
        job.start().unwrap();
        job.fail("partial\n".to_string(), "ReferenceError: boom".to_string())
            .unwrap();
        store.save(&job).unwrap();

        let loaded = store.find_by_id(job.id).unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.name, "fields");
        assert_eq!(loaded.code, job.code);
        assert_eq!(loaded.status, JobStatus::Errored);
        assert_eq!(loaded.output, "partial\n");
        assert_eq!(loaded.error, "ReferenceError: boom");
        assert!(loaded.scheduled_at.is_some());
        assert!(loaded.begin_exec_date.is_some());
        assert!(loaded.end_exec_date.is_some());
    }

    pub fn save_if_status_is_compare_and_set(store: &dyn JobStore) {
        let mut job = job("cas");
        store.save(&job).unwrap();

        job.schedule().unwrap();
        assert!(store.save_if_status(&job, JobStatus::New).unwrap());
        // A second claimer still expecting NEW loses
        assert!(!store.save_if_status(&job, JobStatus::New).unwrap());
        assert_eq!(
            store.find_by_id(job.id).unwrap().unwrap().status,
            JobStatus::Scheduled
        );

        // Missing rows are never resurrected
        store.delete_by_id(job.id).unwrap();
        assert!(!store.save_if_status(&job, JobStatus::Scheduled).unwrap());
        assert!(store.find_by_id(job.id).unwrap().is_none());
    }

    pub fn finds_by_status_and_name(store: &dyn JobStore) {
        let mut first = job("shared");
        first.created_date -= Duration::seconds(10);
        let second = job("shared");
        let mut running = job("other");
        running.status = JobStatus::Executing;
        for job in [&first, &second, &running] {
            store.save(job).unwrap();
        }

        assert_eq!(store.find_by_name("shared").unwrap().unwrap().id, first.id);
        assert!(store.find_by_name("missing").unwrap().is_none());

        let dispatchable = store
            .find_all_by_status_in(&[JobStatus::New, JobStatus::Executing])
            .unwrap();
        assert_eq!(dispatchable.len(), 3);
        let executing = store
            .find_all_by_status_in(&[JobStatus::Executing])
            .unwrap();
        assert_eq!(executing.len(), 1);
        assert_eq!(executing[0].id, running.id);
        assert!(store.find_all_by_status_in(&[]).unwrap().is_empty());
    }

    pub fn find_matching_sorts_by_creation(store: &dyn JobStore) {
        let mut ids = Vec::new();
        for age in [30, 10, 20] {
            let mut job = job("sorted");
            job.created_date -= Duration::seconds(age);
            store.save(&job).unwrap();
            ids.push((age, job.id));
        }
        ids.sort();

        let newest_first = store
            .find_matching(&JobFilter {
                name: Some("sorted".to_string()),
                new_first: Some(true),
                ..Default::default()
            })
            .unwrap();
        let got: Vec<_> = newest_first.iter().map(|j| j.id).collect();
        let expected: Vec<_> = ids.iter().map(|(_, id)| *id).collect();
        assert_eq!(got, expected);

        let oldest_first = store
            .find_matching(&JobFilter {
                new_first: Some(false),
                ..Default::default()
            })
            .unwrap();
        let got: Vec<_> = oldest_first.iter().map(|j| j.id).collect();
        let expected: Vec<_> = ids.iter().rev().map(|(_, id)| *id).collect();
        assert_eq!(got, expected);

        let none = store
            .find_matching(&JobFilter::with_status(JobStatus::Stopped))
            .unwrap();
        assert!(none.is_empty());
    }

    pub fn deletes(store: &dyn JobStore) {
        let a = job("a");
        let b = job("b");
        store.save(&a).unwrap();
        store.save(&b).unwrap();

        assert!(store.delete_by_id(a.id).unwrap());
        assert!(!store.delete_by_id(a.id).unwrap());
        assert!(store.find_by_id(a.id).unwrap().is_none());

        assert_eq!(store.delete_all().unwrap(), 1);
        assert!(store.find_matching(&JobFilter::default()).unwrap().is_empty());
    }
}
