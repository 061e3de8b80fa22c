use super::{Job, JobStatus};
use serde::Deserialize;
use std::cmp::Ordering;

/// Criteria for listing jobs. Every field is optional; an empty filter
/// matches everything in unspecified order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub name: Option<String>,
    /// `true` sorts by creation date descending, `false` ascending.
    pub new_first: Option<bool>,
}

impl JobFilter {
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.status.map_or(true, |status| job.status == status)
            && self.name.as_deref().map_or(true, |name| job.name == name)
    }

    pub fn sort(&self, jobs: &mut [Job]) {
        if let Some(new_first) = self.new_first {
            jobs.sort_by(|a, b| {
                let ordering = a.created_date.cmp(&b.created_date);
                if new_first {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
    }

    /// Filters and sorts in memory.
    pub fn apply(&self, jobs: impl IntoIterator<Item = Job>) -> Vec<Job> {
        let mut selected: Vec<Job> = jobs.into_iter().filter(|job| self.matches(job)).collect();
        self.sort(&mut selected);
        selected
    }
}

/// Oldest first, the order used to pick a single job among same-named ones.
pub fn by_creation(a: &Job, b: &Job) -> Ordering {
    a.created_date
        .cmp(&b.created_date)
        .then_with(|| a.id.cmp(&b.id))
}
