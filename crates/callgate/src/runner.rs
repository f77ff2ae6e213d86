//! # Script Runner
//!
//! Executes statement scripts against a [`Session`], printing results the way
//! an operator console would.
//!
//! Literals are coerced to the parameter types of the function being called:
//! integers become pointers where the signature asks for a pointer, and
//! strings become zero-padded byte buffers where it asks for a fixed buffer.
//! Everything else is passed as written and checked by the invocation engine.

use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;

use callgate_core::error::{CallgateError, CallgateResult};
use callgate_core::oplog::LogEntry;
use callgate_core::persistence::RegisterStatement;
use callgate_core::script::{self, Literal, Statement};
use callgate_core::settings::DebugConfigUpdate;
use callgate_core::types::{Address, AddressInput, TypeToken, Value};
use callgate_core::Session;
use callgate_utils::debug;

/// Number of log entries `showCalls()`/`showMemoryOps()` print by default
pub const DEFAULT_SHOW_COUNT: usize = 10;

/// Runs statements against a session and writes their output to `out`.
pub struct ScriptRunner<W: Write>
{
    session: Session,
    out: W,
}

impl<W: Write> ScriptRunner<W>
{
    /// Create a runner that prints to `out`.
    pub fn new(session: Session, out: W) -> Self
    {
        Self { session, out }
    }

    /// The session statements run against
    pub fn session(&self) -> &Session
    {
        &self.session
    }

    /// Consume the runner, returning the output sink.
    pub fn into_output(self) -> W
    {
        self.out
    }

    /// Run every statement in the file at `path`.
    ///
    /// ## Errors
    ///
    /// - `FileIo`: the file cannot be read
    /// - anything [`ScriptRunner::run_source`] returns
    pub fn run_file(&mut self, path: &Path) -> CallgateResult<usize>
    {
        let source = fs::read_to_string(path).map_err(|source| CallgateError::FileIo {
            path: path.to_path_buf(),
            source,
        })?;
        self.run_source(&source)
    }

    /// Run statements line by line, stopping at the first failure.
    /// Returns the number of statements executed.
    ///
    /// ## Errors
    ///
    /// The first parse or execution error.
    pub fn run_source(&mut self, source: &str) -> CallgateResult<usize>
    {
        let mut executed = 0;
        for (index, line) in source.lines().enumerate() {
            if let Some(statement) = script::parse_line(line, index + 1)? {
                self.execute(&statement)?;
                executed += 1;
            }
        }
        Ok(executed)
    }

    /// Read statements from `input` until end of input, reporting failures
    /// and carrying on. Returns the number of statements that failed.
    ///
    /// ## Errors
    ///
    /// Only I/O errors on `input` or the output sink.
    pub fn run_interactive<R: BufRead>(&mut self, input: R, prompt: bool) -> CallgateResult<usize>
    {
        let mut failures = 0;
        let mut lines = input.lines();
        let mut number = 0;
        loop {
            if prompt {
                write!(self.out, "callgate> ")?;
                self.out.flush()?;
            }
            let Some(line) = lines.next().transpose()? else {
                break;
            };
            number += 1;

            let result = script::parse_line(&line, number)
                .and_then(|statement| statement.map_or(Ok(()), |statement| self.execute(&statement)));
            if let Err(err) = result {
                failures += 1;
                writeln!(self.out, "Error: {err}")?;
            }
        }
        Ok(failures)
    }

    /// Execute one statement.
    ///
    /// ## Errors
    ///
    /// - `Script`: unknown statement or malformed arguments
    /// - any error the underlying session operation returns
    pub fn execute(&mut self, statement: &Statement) -> CallgateResult<()>
    {
        debug!(line = statement.line, name = %statement.name, "Executing statement");
        match statement.name.as_str() {
            "register" => self.register(statement),
            "call" => self.call(statement),
            "callInMainContext" => self.call_in_main_context(statement),
            "list" => {
                let listing = self.session.listing();
                write!(self.out, "{listing}")?;
                Ok(())
            }
            "readMem" => self.read_mem(statement),
            "writeMem" => self.write_mem(statement),
            "moduleBaseAddress" => {
                let name = statement.opt_str_arg(0)?.unwrap_or_default();
                match self.session.module_base_address(name) {
                    Ok(base) => writeln!(self.out, "{base}")?,
                    Err(CallgateError::ModuleNotFound(_)) => writeln!(self.out, "nil")?,
                    Err(other) => return Err(other),
                }
                Ok(())
            }
            "showCalls" => {
                let entries = self.session.show_calls(show_count(statement)?);
                self.print_entries("calls", &entries)
            }
            "showMemoryOps" => {
                let entries = self.session.show_memory_ops(show_count(statement)?);
                self.print_entries("memory operations", &entries)
            }
            "debugConfig" => self.debug_config(statement),
            "debugEnable" => {
                let enabled = match statement.args.first() {
                    Some(Literal::Bool(enabled)) => *enabled,
                    None => true,
                    Some(other) => {
                        return Err(statement.error(format!("debugEnable expects true or false, got {}", other.kind())))
                    }
                };
                let settings = self.session.debug_enable(enabled);
                writeln!(self.out, "Operation log {}", if settings.enabled { "enabled" } else { "disabled" })?;
                Ok(())
            }
            "clearLogs" => {
                self.session.clear_logs();
                writeln!(self.out, "Logs cleared")?;
                Ok(())
            }
            "save" => {
                let path = statement.opt_str_arg(0)?.map(Path::new);
                let count = self.session.save(path)?;
                writeln!(self.out, "Saved {count} function(s)")?;
                Ok(())
            }
            "load" => {
                let path = statement.opt_str_arg(0)?.map(Path::new);
                let count = self.session.load(path)?;
                writeln!(self.out, "Loaded {count} function(s)")?;
                Ok(())
            }
            other => Err(statement.error(format!("unknown statement '{other}'"))),
        }
    }

    fn register(&mut self, statement: &Statement) -> CallgateResult<()>
    {
        let args = RegisterStatement::from_statement(statement)?;
        let entry = self
            .session
            .register(args.name, args.address, args.signature, args.description)?;
        writeln!(self.out, "Registered {} @ {} : {}", entry.name, entry.address, entry.signature)?;
        Ok(())
    }

    fn call(&mut self, statement: &Statement) -> CallgateResult<()>
    {
        let name = statement.str_arg(0)?;
        let params = self.session.resolve(name)?.signature.params().to_vec();

        let mut args = statement.args[1..]
            .iter()
            .enumerate()
            .map(|(index, literal)| coerce(statement, literal, params.get(index).copied()))
            .collect::<CallgateResult<Vec<_>>>()?;

        let result = self.session.call(name, &mut args)?;
        writeln!(self.out, "{name} -> {result}")?;
        for (index, arg) in args.iter().enumerate() {
            if let Value::Buffer(bytes) = arg {
                writeln!(self.out, "  arg {}: {}", index + 1, hex(bytes))?;
            }
        }
        Ok(())
    }

    fn call_in_main_context(&mut self, statement: &Statement) -> CallgateResult<()>
    {
        let name = statement.str_arg(0)?;
        let arg = match statement.args.get(1) {
            None => Value::Void,
            Some(literal) => coerce(statement, literal, Some(TypeToken::Pointer))?,
        };
        let outcome = self.session.call_in_main_context(name, &arg)?;
        writeln!(self.out, "{}", outcome.is_success())?;
        Ok(())
    }

    fn read_mem(&mut self, statement: &Statement) -> CallgateResult<()>
    {
        let address = memory_address(statement, 0)?;
        let count = match statement.args.get(1) {
            Some(Literal::Int(count)) => usize::try_from(*count)
                .map_err(|_| statement.error(format!("readMem: invalid count {count}")))?,
            None | Some(Literal::Nil) => 1,
            Some(other) => return Err(statement.error(format!("readMem: count must be an integer, got {}", other.kind()))),
        };
        let token = match statement.opt_str_arg(2)? {
            Some(text) => text.parse::<TypeToken>()?,
            None => TypeToken::FixedBuffer(1),
        };

        let read = self.session.read_mem(address, count, token);
        match &read.data {
            Some(bytes) => {
                let values: Vec<String> = read.values().iter().map(ToString::to_string).collect();
                writeln!(self.out, "{} bytes: {}", read.bytes_read, hex(bytes))?;
                if !matches!(token, TypeToken::FixedBuffer(_)) {
                    writeln!(self.out, "{token}: [{}]", values.join(", "))?;
                }
            }
            None => writeln!(self.out, "nil, 0")?,
        }
        Ok(())
    }

    fn write_mem(&mut self, statement: &Statement) -> CallgateResult<()>
    {
        let address = memory_address(statement, 0)?;
        let data = match statement.args.get(1) {
            Some(Literal::Str(text)) => text.as_bytes().to_vec(),
            Some(Literal::Int(value)) => i64::try_from(*value)
                .map_err(|_| statement.error(format!("writeMem: {value} does not fit in 64 bits")))?
                .to_ne_bytes()
                .to_vec(),
            Some(Literal::Float(value)) => value.to_ne_bytes().to_vec(),
            Some(other) => {
                return Err(statement.error(format!("writeMem: data must be a string or number, got {}", other.kind())))
            }
            None => return Err(statement.error("writeMem: missing data")),
        };
        let size = match statement.args.get(2) {
            Some(Literal::Int(size)) => {
                usize::try_from(*size).map_err(|_| statement.error(format!("writeMem: invalid size {size}")))?
            }
            None | Some(Literal::Nil) => data.len(),
            Some(other) => return Err(statement.error(format!("writeMem: size must be an integer, got {}", other.kind()))),
        };

        let write = self.session.write_mem(address, &data, size);
        writeln!(self.out, "{}, {}", write.success, write.bytes_written)?;
        Ok(())
    }

    fn debug_config(&mut self, statement: &Statement) -> CallgateResult<()>
    {
        if statement.args.len() % 2 != 0 {
            return Err(statement.error("debugConfig expects name/value pairs"));
        }
        let mut update = DebugConfigUpdate::default();
        for pair in statement.args.chunks_exact(2) {
            let Literal::Str(key) = &pair[0] else {
                return Err(statement.error(format!("debugConfig: option name must be a string, got {}", pair[0].kind())));
            };
            let value = match &pair[1] {
                Literal::Bool(v) => v.to_string(),
                Literal::Int(v) => v.to_string(),
                Literal::Str(v) => v.clone(),
                other => return Err(statement.error(format!("debugConfig: unsupported value {other}"))),
            };
            update.set(key, &value).map_err(|message| statement.error(message))?;
        }

        let settings = self.session.debug_config(&update);
        writeln!(self.out, "{settings}")?;
        Ok(())
    }

    fn print_entries(&mut self, label: &str, entries: &[LogEntry]) -> CallgateResult<()>
    {
        if entries.is_empty() {
            writeln!(self.out, "No {label} recorded")?;
        }
        for entry in entries {
            writeln!(self.out, "{entry}")?;
        }
        Ok(())
    }
}

/// Turn a literal into a value for a parameter of type `param`.
fn coerce(statement: &Statement, literal: &Literal, param: Option<TypeToken>) -> CallgateResult<Value>
{
    let value = match (literal, param) {
        (Literal::Int(v), Some(TypeToken::Pointer)) => Value::Pointer(
            usize::try_from(*v).map_err(|_| statement.error(format!("{v} is not a valid pointer value")))?,
        ),
        (Literal::Int(v), _) => {
            Value::Int(i64::try_from(*v).map_err(|_| statement.error(format!("{v} does not fit in 64 bits")))?)
        }
        (Literal::Float(v), _) => Value::Float(*v),
        (Literal::Bool(v), _) => Value::Int(i64::from(*v)),
        (Literal::Nil, Some(TypeToken::Pointer)) => Value::Pointer(0),
        (Literal::Nil, _) => Value::Void,
        (Literal::Str(text), Some(TypeToken::FixedBuffer(size))) => {
            let mut bytes = text.as_bytes().to_vec();
            if bytes.len() < size {
                bytes.resize(size, 0);
            }
            Value::Buffer(bytes)
        }
        (Literal::Str(text), _) => Value::Buffer(text.as_bytes().to_vec()),
    };
    Ok(value)
}

/// Read the address argument of a memory statement.
///
/// Zero is accepted here so that the memory subsystem reports it like any
/// other bad address.
fn memory_address(statement: &Statement, index: usize) -> CallgateResult<Address>
{
    match statement.args.get(index) {
        Some(Literal::Int(v)) => usize::try_from(*v)
            .map(Address::new)
            .map_err(|_| statement.error(format!("{v} is not a valid address"))),
        Some(Literal::Str(text)) => AddressInput::Text(text.clone()).resolve(),
        Some(other) => Err(statement.error(format!("address must be a number or string, got {}", other.kind()))),
        None => Err(statement.error(format!("{}: missing address", statement.name))),
    }
}

fn show_count(statement: &Statement) -> CallgateResult<usize>
{
    match statement.args.first() {
        None | Some(Literal::Nil) => Ok(DEFAULT_SHOW_COUNT),
        Some(Literal::Int(k)) => usize::try_from(*k).map_err(|_| statement.error(format!("invalid count {k}"))),
        Some(other) => Err(statement.error(format!("count must be an integer, got {}", other.kind()))),
    }
}

fn hex(bytes: &[u8]) -> String
{
    bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ")
}
