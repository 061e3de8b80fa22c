//! Snippet Runner Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod error;
pub mod execution;
pub mod job_service;
pub mod job_store;
pub mod jobs;
pub mod sandbox;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use error::{JobError, JobResult};
pub use job_service::JobService;
pub use job_store::{InMemoryJobStore, JobStore, SqliteJobStore};
pub use server::{make_app, run_server, RequestsLoggingLevel};
