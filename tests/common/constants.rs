//! Shared constants for end-to-end tests

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for the server to answer on startup
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// How often to poll while waiting for the server
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// Per-request timeout of the test client
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Dispatcher tick in tests, far below the production default
pub const TEST_POLL_INTERVAL_MS: u64 = 50;

/// Maximum time to wait for a job to reach an expected status
pub const JOB_SETTLE_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// Scripts
// ============================================================================

pub const HELLO_SCRIPT: &str = "print('Hi')";

pub const REFERENCE_ERROR_SCRIPT: &str = "some_undefined_var.call()";

pub const INFINITE_LOOP_SCRIPT: &str = "while(true) {}";

pub const SYNTAX_ERROR_SCRIPT: &str = "some_var..call()";
