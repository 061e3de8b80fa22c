use super::engine::{ExecutionError, ScriptEngine, ScriptIo};
use super::interrupt::{Interrupt, InterruptReason};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Captured streams plus the classified result of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub output: String,
    pub error: String,
    pub result: Result<(), ExecutionError>,
}

/// Runs scripts under a wall-clock limit with cooperative cancellation.
pub struct SandboxRunner {
    engine: Arc<dyn ScriptEngine>,
    timeout: Duration,
}

impl SandboxRunner {
    pub fn new(engine: Arc<dyn ScriptEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    /// Blocks until the script finishes, throws, times out or is cancelled
    /// through `cancel`. Stream contents produced up to that point are kept.
    ///
    /// Whether the run was cancelled or timed out is taken from the interrupt
    /// state, never inferred from the engine's error text. Failures other than
    /// cancellation are appended to the stderr stream.
    pub fn run(&self, code: &str, io: &ScriptIo, cancel: CancellationToken) -> RunReport {
        let interrupt = Arc::new(Interrupt::new(cancel, self.timeout));
        let engine_result = self.engine.execute(code, io, Arc::clone(&interrupt));

        let result = match interrupt.reason() {
            Some(InterruptReason::Cancelled) => Err(ExecutionError::Interrupted),
            Some(InterruptReason::TimedOut) => Err(ExecutionError::Timeout {
                limit: interrupt.limit(),
            }),
            None => engine_result,
        };

        match &result {
            Ok(()) | Err(ExecutionError::Interrupted) => {}
            Err(err) => {
                debug!("Script run failed: {}", err);
                io.stderr.append_line(&err.to_string());
            }
        }

        RunReport {
            output: io.stdout.snapshot(),
            error: io.stderr.snapshot(),
            result,
        }
    }
}
