//! Isolated script execution: engines, output capture and run classification.

mod engine;
mod interrupt;
mod output;
mod quickjs;
mod runner;

pub use engine::{ExecutionError, ScriptEngine, ScriptIo};
pub use interrupt::{Interrupt, InterruptReason};
pub use output::OutputBuffer;
pub use quickjs::QuickJsEngine;
pub use runner::{RunReport, SandboxRunner};
