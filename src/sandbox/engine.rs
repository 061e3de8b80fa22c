use super::interrupt::Interrupt;
use super::output::OutputBuffer;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single script run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    /// The script threw. Carries the exception description and stack.
    #[error("{0}")]
    Script(String),

    #[error("Script timed out. Maximum execution duration is {} seconds", .limit.as_secs())]
    Timeout { limit: Duration },

    #[error("Script execution was interrupted")]
    Interrupted,

    /// The interpreter could not be set up.
    #[error("Script engine failure: {0}")]
    Engine(String),
}

/// Where a script's `print`/`console` output goes.
#[derive(Debug, Clone, Default)]
pub struct ScriptIo {
    pub stdout: OutputBuffer,
    pub stderr: OutputBuffer,
}

/// An interpreter able to check and run script source.
///
/// `execute` runs synchronously on the calling thread and must poll
/// `interrupt` often enough for cancellation and timeouts to take effect.
pub trait ScriptEngine: Send + Sync {
    /// Parses `code` without running it. The error is a human readable diagnostic.
    fn validate(&self, code: &str) -> Result<(), String>;

    fn execute(
        &self,
        code: &str,
        io: &ScriptIo,
        interrupt: Arc<Interrupt>,
    ) -> Result<(), ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = ExecutionError::Timeout {
            limit: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "Script timed out. Maximum execution duration is 30 seconds"
        );
    }
}
