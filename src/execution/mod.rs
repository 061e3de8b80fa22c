//! Dispatching jobs to workers and tracking the runs in flight.

mod dispatcher;
mod registry;

pub use dispatcher::{Dispatcher, RecoveryPolicy};
pub use registry::{ExecutionHandle, ExecutionRegistry};
