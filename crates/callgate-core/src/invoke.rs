//! # Invocation Engine
//!
//! Calls registered functions in one of two execution contexts:
//!
//! - **direct**: synchronously on the caller's thread, with arguments
//!   marshalled from the entry's
//!   [`SignatureDescriptor`](crate::signature::SignatureDescriptor)
//! - **context-switched**: on a freshly spawned thread whose entry point is
//!   the function itself, with a single pointer-sized parameter and a bounded
//!   wait
//!
//! Arity and kind checks always run before any native code is reached. A
//! call that fails validation is never recorded in the operation log as an
//! invocation attempt; it is only traced.

use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::error::{CallgateError, CallgateResult};
use crate::oplog::{CallRecord, LogEntry, OperationLog, ThreadType};
use crate::platform::native::{self, NativeArg, NativeReturn};
use crate::registry::{FunctionRegistry, RegistryEntry};
use crate::types::{TypeToken, Value};

/// How a context-switched call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextCallOutcome
{
    /// The thread finished within the timeout
    ///
    /// `exit_code` is `None` when the thread ended without returning from the
    /// function (for example by exiting the thread itself).
    Completed
    {
        /// Value the function returned
        exit_code: Option<usize>,
        /// Time between spawning the thread and its completion
        elapsed: Duration,
    },
    /// The thread was still running when the wait gave up
    ///
    /// The thread is left running; nothing can reclaim it.
    TimedOut
    {
        /// How long the caller waited
        waited: Duration,
    },
    /// The OS refused to create the thread
    SpawnFailed(String),
}

impl ContextCallOutcome
{
    /// Whether the function ran to completion within the timeout
    #[must_use]
    pub fn is_success(&self) -> bool
    {
        matches!(self, ContextCallOutcome::Completed { .. })
    }

    /// Convert the outcome into a result for `function`.
    ///
    /// ## Errors
    ///
    /// - `CallTimeout`: the outcome is [`ContextCallOutcome::TimedOut`]
    /// - `ThreadCreationFailed`: the outcome is [`ContextCallOutcome::SpawnFailed`]
    pub fn into_result(self, function: &str) -> CallgateResult<Option<usize>>
    {
        match self {
            ContextCallOutcome::Completed { exit_code, .. } => Ok(exit_code),
            ContextCallOutcome::TimedOut { waited } => Err(CallgateError::CallTimeout {
                function: function.to_string(),
                timeout_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
            }),
            ContextCallOutcome::SpawnFailed(reason) => Err(CallgateError::ThreadCreationFailed(reason)),
        }
    }
}

/// Performs calls against a [`FunctionRegistry`] and records them.
///
/// ## Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use callgate_core::invoke::InvocationEngine;
/// use callgate_core::oplog::OperationLog;
/// use callgate_core::registry::FunctionRegistry;
/// use callgate_core::settings::DebugSettings;
/// use callgate_core::types::Value;
///
/// let log = Arc::new(OperationLog::new(DebugSettings::default()));
/// let engine = InvocationEngine::new(log, Duration::from_secs(5));
/// let mut registry = FunctionRegistry::new();
/// registry.register("Add", "0x00401000", "int(int, int)", "")?;
///
/// let mut args = [Value::Int(2), Value::Int(3)];
/// let sum = engine.call(&registry, "Add", &mut args)?;
/// # Ok::<(), callgate_core::error::CallgateError>(())
/// ```
#[derive(Debug, Clone)]
pub struct InvocationEngine
{
    log: Arc<OperationLog>,
    timeout: Duration,
}

impl InvocationEngine
{
    /// Create an engine that records into `log` and waits at most `timeout`
    /// for context-switched calls.
    #[must_use]
    pub fn new(log: Arc<OperationLog>, timeout: Duration) -> Self
    {
        Self { log, timeout }
    }

    /// Wait limit for context-switched calls
    #[must_use]
    pub fn timeout(&self) -> Duration
    {
        self.timeout
    }

    /// Change the wait limit for context-switched calls.
    pub fn set_timeout(&mut self, timeout: Duration)
    {
        self.timeout = timeout;
    }

    /// Call the registered function `name` on the current thread.
    ///
    /// Buffer arguments are passed by address. Whatever the callee writes into
    /// them is visible in `args` afterwards.
    ///
    /// A fault inside the callee is not caught and takes the process down.
    ///
    /// ## Errors
    ///
    /// - `NotFound`: `name` is not registered
    /// - `ArgumentTypeMismatch`: wrong argument count or an argument does not
    ///   fit its parameter type; nothing is called and nothing is logged
    /// - `UnsupportedSignature`: the signature exceeds what this target can
    ///   dispatch; logged as a failed call
    pub fn call(&self, registry: &FunctionRegistry, name: &str, args: &mut [Value]) -> CallgateResult<Value>
    {
        let entry = registry.resolve(name)?;
        validate_arguments(entry, args)?;

        let settings = self.log.settings();
        let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
        let native_args = marshal(entry, args)?;

        debug!(function = name, address = %entry.address, args = ?rendered, "Calling function");
        let started = Instant::now();
        // SAFETY: the registrant vouches that `entry.address` is a function of
        // this signature; arguments were validated against it above.
        let result = unsafe { native::invoke(entry.address, &entry.signature, &native_args) };
        let duration_ms = millis(started.elapsed());

        let mut summary = format!(
            "{name}({}) [{}] @ {}",
            if settings.log_parameters { rendered.join(", ") } else { "...".to_string() },
            ThreadType::Direct,
            entry.address
        );
        let mut record = CallRecord {
            function: name.to_string(),
            address: entry.address,
            arguments: settings.log_parameters.then_some(rendered),
            return_value: None,
            thread_type: ThreadType::Direct,
            error: None,
        };

        match result {
            Ok(raw) => {
                let value = capture(entry.signature.return_type(), raw);
                if settings.log_return_values {
                    summary.push_str(&format!(" -> {value}"));
                    record.return_value = Some(value.to_string());
                }
                self.log.record(LogEntry::call(summary, true, Some(duration_ms), record));
                Ok(value)
            }
            Err(err) => {
                warn!(function = name, error = %err, "Call was not dispatched");
                record.error = Some(err.to_string());
                self.log.record(LogEntry::call(summary, false, Some(duration_ms), record));
                Err(err)
            }
        }
    }

    /// Run the registered function `name` as the entry point of a new thread
    /// and wait for it up to the configured timeout.
    ///
    /// `arg` is the thread's single startup parameter and must be
    /// pointer-sized: a [`Value::Pointer`], a non-negative [`Value::Int`], or
    /// [`Value::Void`] for a null parameter. The function's declared
    /// parameters beyond the first are never passed.
    ///
    /// Every outcome, including timeouts and spawn failures, is logged exactly
    /// once. A timed-out thread keeps running.
    ///
    /// ## Errors
    ///
    /// - `NotFound`: `name` is not registered
    /// - `ArgumentTypeMismatch`: `arg` is not pointer-sized
    pub fn call_in_main_context(
        &self,
        registry: &FunctionRegistry,
        name: &str,
        arg: &Value,
    ) -> CallgateResult<ContextCallOutcome>
    {
        let entry = registry.resolve(name)?;
        let parameter = context_parameter(name, arg)?;
        if entry.signature.params().len() > 1 {
            warn!(
                function = name,
                declared = entry.signature.params().len(),
                "Context-switched calls pass a single parameter"
            );
        }

        let settings = self.log.settings();
        let rendered = arg.to_string();
        let mut summary = format!(
            "{name}({}) [{}] @ {}",
            if settings.log_parameters { rendered.as_str() } else { "..." },
            ThreadType::ContextSwitched,
            entry.address
        );

        let started = Instant::now();
        // SAFETY: as for direct calls, the registrant vouches for the address.
        let spawned = unsafe { native::spawn_routine(entry.address, parameter, format!("callgate-{name}")) };
        let outcome = match spawned {
            Err(err) => ContextCallOutcome::SpawnFailed(err.to_string()),
            Ok(receiver) => match receiver.recv_timeout(self.timeout) {
                Ok(exit_code) => ContextCallOutcome::Completed {
                    exit_code: Some(exit_code),
                    elapsed: started.elapsed(),
                },
                Err(RecvTimeoutError::Disconnected) => ContextCallOutcome::Completed {
                    exit_code: None,
                    elapsed: started.elapsed(),
                },
                Err(RecvTimeoutError::Timeout) => ContextCallOutcome::TimedOut { waited: self.timeout },
            },
        };

        let mut record = CallRecord {
            function: name.to_string(),
            address: entry.address,
            arguments: settings.log_parameters.then(|| vec![rendered]),
            return_value: None,
            thread_type: ThreadType::ContextSwitched,
            error: None,
        };

        let duration_ms = match &outcome {
            ContextCallOutcome::Completed { exit_code, elapsed } => {
                info!(function = name, ?exit_code, "Context-switched call completed");
                if let (true, Some(code)) = (settings.log_return_values, exit_code) {
                    summary.push_str(&format!(" -> {code}"));
                    record.return_value = Some(code.to_string());
                }
                Some(millis(*elapsed))
            }
            ContextCallOutcome::TimedOut { waited } => {
                let reason = format!("timed out after {} ms; thread left running", waited.as_millis());
                warn!(function = name, "Context-switched call {reason}");
                summary.push_str(&format!(": {reason}"));
                record.error = Some(reason);
                Some(millis(*waited))
            }
            ContextCallOutcome::SpawnFailed(err) => {
                let reason = format!("Failed to create thread: {err}");
                warn!(function = name, "{reason}");
                summary.push_str(&format!(": {reason}"));
                record.error = Some(reason);
                None
            }
        };

        self.log
            .record(LogEntry::call(summary, outcome.is_success(), duration_ms, record));
        Ok(outcome)
    }
}

fn validate_arguments(entry: &RegistryEntry, args: &[Value]) -> CallgateResult<()>
{
    let params = entry.signature.params();
    if args.len() != params.len() {
        debug!(function = %entry.name, expected = params.len(), got = args.len(), "Arity mismatch");
        return Err(CallgateError::mismatch(
            &entry.name,
            format!("expected {} argument(s), got {}", params.len(), args.len()),
        ));
    }
    for (index, (arg, param)) in args.iter().zip(params).enumerate() {
        arg.check_compatible(*param).map_err(|reason| {
            debug!(function = %entry.name, index, %reason, "Argument rejected");
            CallgateError::mismatch(&entry.name, format!("argument {}: {reason}", index + 1))
        })?;
    }
    Ok(())
}

/// Turn validated values into machine words.
///
/// Buffer arguments become the address of the buffer's storage. The returned
/// words are only valid while `args` is neither moved nor resized.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn marshal(entry: &RegistryEntry, args: &mut [Value]) -> CallgateResult<SmallVec<[NativeArg; 8]>>
{
    let mut words = SmallVec::new();
    for (index, (arg, param)) in args.iter_mut().zip(entry.signature.params()).enumerate() {
        let invalid = || CallgateError::mismatch(&entry.name, format!("argument {} cannot be passed as {param}", index + 1));
        let word = match (*param, arg) {
            (TypeToken::Int32 | TypeToken::UInt32, value) => {
                let v = value.as_i64().ok_or_else(invalid)?;
                // Negative int32 values keep their two's complement bits.
                NativeArg::Word(u64::from(v as u32))
            }
            (TypeToken::Float32, value) => NativeArg::Single(value.as_f64().ok_or_else(invalid)? as f32),
            (TypeToken::Float64, value) => NativeArg::Double(value.as_f64().ok_or_else(invalid)?),
            (TypeToken::Pointer, Value::Pointer(p)) => NativeArg::Word(*p as u64),
            (TypeToken::FixedBuffer(_), Value::Buffer(bytes)) => NativeArg::Word(bytes.as_mut_ptr() as usize as u64),
            _ => return Err(invalid()),
        };
        words.push(word);
    }
    Ok(words)
}

/// Interpret the raw return register per the declared return type.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn capture(return_type: TypeToken, raw: NativeReturn) -> Value
{
    match (return_type, raw) {
        (TypeToken::Int32, NativeReturn::Word(w)) => Value::Int(i64::from(w as u32 as i32)),
        (TypeToken::UInt32, NativeReturn::Word(w)) => Value::Int(i64::from(w as u32)),
        (TypeToken::Pointer, NativeReturn::Word(w)) => Value::Pointer(w as usize),
        (TypeToken::Float32, NativeReturn::Single(f)) => Value::Float(f64::from(f)),
        (TypeToken::Float64, NativeReturn::Double(f)) => Value::Float(f),
        _ => Value::Void,
    }
}

fn context_parameter(function: &str, arg: &Value) -> CallgateResult<usize>
{
    match *arg {
        Value::Pointer(p) => Ok(p),
        Value::Void => Ok(0),
        Value::Int(v) => usize::try_from(v).map_err(|_| {
            CallgateError::mismatch(function, format!("thread parameter must be a pointer-sized unsigned value, got {v}"))
        }),
        _ => Err(CallgateError::mismatch(
            function,
            format!("thread parameter must be pointer-sized, got a {} value", arg.kind()),
        )),
    }
}

fn millis(duration: Duration) -> f64
{
    duration.as_secs_f64() * 1000.0
}
