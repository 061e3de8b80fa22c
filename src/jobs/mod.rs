//! Job entity, lifecycle transitions and listing filters.

mod filter;
mod model;

pub use filter::{by_creation, JobFilter};
pub use model::{Job, JobStatus, NewJob};
