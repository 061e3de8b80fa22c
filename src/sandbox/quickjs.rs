use super::engine::{ExecutionError, ScriptEngine, ScriptIo};
use super::interrupt::Interrupt;
use super::output::OutputBuffer;
use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{qjs, CatchResultExt, CaughtError, Context, Ctx, Function, Object, Runtime, Value};
use std::ffi::{c_char, c_int, CStr, CString};
use std::sync::Arc;

/// File name reported in syntax error stack traces.
const SCRIPT_NAME: &[u8] = b"<snippet>\0";

/// JavaScript engine backed by QuickJS. Every run gets its own runtime, so
/// scripts share no state with each other or with the host.
#[derive(Debug, Clone, Default)]
pub struct QuickJsEngine {
    memory_limit: Option<usize>,
}

impl QuickJsEngine {
    pub fn new(memory_limit: Option<usize>) -> Self {
        Self { memory_limit }
    }

    fn new_runtime(&self) -> rquickjs::Result<Runtime> {
        let runtime = Runtime::new()?;
        if let Some(limit) = self.memory_limit {
            runtime.set_memory_limit(limit);
        }
        Ok(runtime)
    }
}

impl ScriptEngine for QuickJsEngine {
    fn validate(&self, code: &str) -> Result<(), String> {
        let source =
            CString::new(code).map_err(|_| "Code must not contain NUL characters".to_string())?;
        let runtime = self.new_runtime().map_err(|e| e.to_string())?;
        // Validation never evaluates anything; abort if it ever tries.
        runtime.set_interrupt_handler(Some(Box::new(|| true)));
        let context = Context::full(&runtime).map_err(|e| e.to_string())?;
        context.with(|ctx| compile_only(&ctx, &source))
    }

    fn execute(
        &self,
        code: &str,
        io: &ScriptIo,
        interrupt: Arc<Interrupt>,
    ) -> Result<(), ExecutionError> {
        let runtime = self.new_runtime().map_err(engine_error)?;
        runtime.set_interrupt_handler(Some(Box::new(move || interrupt.should_stop())));
        let context = Context::full(&runtime).map_err(engine_error)?;

        context.with(|ctx| {
            install_io(&ctx, io).map_err(engine_error)?;
            ctx.eval::<Value, _>(code)
                .catch(&ctx)
                .map(|_| ())
                .map_err(|caught| ExecutionError::Script(describe_caught(caught)))
        })
    }
}

/// Parses `source` as a global script and discards the resulting bytecode.
fn compile_only(ctx: &Ctx<'_>, source: &CStr) -> Result<(), String> {
    let raw = ctx.as_raw().as_ptr();
    let flags = (qjs::JS_EVAL_TYPE_GLOBAL | qjs::JS_EVAL_FLAG_COMPILE_ONLY) as c_int;

    // SAFETY: `raw` is the live context behind `ctx`, both strings are NUL
    // terminated and the returned value is freed exactly once.
    let failed = unsafe {
        let compiled = qjs::JS_Eval(
            raw,
            source.as_ptr(),
            source.to_bytes().len() as _,
            SCRIPT_NAME.as_ptr() as *const c_char,
            flags,
        );
        let failed = qjs::JS_IsException(compiled);
        qjs::JS_FreeValue(raw, compiled);
        failed
    };

    if failed {
        let caught = CaughtError::from_error(ctx, rquickjs::Error::Exception);
        Err(describe_caught(caught))
    } else {
        Ok(())
    }
}

fn engine_error(err: rquickjs::Error) -> ExecutionError {
    ExecutionError::Engine(err.to_string())
}

fn install_io(ctx: &Ctx<'_>, io: &ScriptIo) -> rquickjs::Result<()> {
    let globals = ctx.globals();
    globals.set("print", line_writer(ctx, io.stdout.clone())?)?;

    let console = Object::new(ctx.clone())?;
    for name in ["log", "info", "debug"] {
        console.set(name, line_writer(ctx, io.stdout.clone())?)?;
    }
    for name in ["error", "warn"] {
        console.set(name, line_writer(ctx, io.stderr.clone())?)?;
    }
    globals.set("console", console)?;
    Ok(())
}

/// A JS function printing its arguments, space separated, as one line.
fn line_writer<'js>(ctx: &Ctx<'js>, buffer: OutputBuffer) -> rquickjs::Result<Function<'js>> {
    Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
        let line = args
            .0
            .iter()
            .map(|arg| arg.0.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        buffer.append_line(&line);
    })
}

fn describe_caught(caught: CaughtError<'_>) -> String {
    match caught {
        CaughtError::Exception(exception) => {
            let name = exception
                .as_object()
                .get::<_, Option<String>>("name")
                .ok()
                .flatten()
                .unwrap_or_else(|| "Error".to_string());
            let mut text = match exception.message() {
                Some(message) if !message.is_empty() => format!("{}: {}", name, message),
                _ => name,
            };
            if let Some(stack) = exception.stack().filter(|s| !s.trim().is_empty()) {
                text.push_str("\nStack trace:\n");
                text.push_str(stack.trim_end());
            }
            text
        }
        CaughtError::Value(value) => {
            let thrown = value
                .get::<Coerced<String>>()
                .map(|c| c.0)
                .unwrap_or_else(|_| "non-printable value".to_string());
            format!("Uncaught {}", thrown)
        }
        CaughtError::Error(error) => error.to_string(),
    }
}
