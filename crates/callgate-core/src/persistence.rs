//! # Registry Persistence
//!
//! Saves the registry as a statement script and loads it back by executing
//! its `register` statements.
//!
//! ## File Layout
//!
//! ```text
//! -- callgate function registry
//! -- Generated: 2026-01-01T12:00:00+00:00
//! -- Functions: 2
//!
//! register("Add", 0x00401000, "int(int, int)", "adds two numbers")
//! register("GetGold", 0x00402000, "int __stdcall(void*)", "")
//!
//! -- End of registry
//! ```
//!
//! Entries are written sorted by name with canonical signature text, so the
//! same registry always produces the same statements. Loading merges into
//! the current registry: entries not in the file are kept, entries with the
//! same name are overwritten.
//!
//! A loaded file is trusted input. It cannot run arbitrary code, but every
//! address it registers becomes callable.

use std::fs;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};

use crate::error::{CallgateError, CallgateResult};
use crate::registry::FunctionRegistry;
use crate::script::{self, Literal, Statement};
use crate::types::AddressInput;

/// First line of every saved registry
pub const HEADER: &str = "-- callgate function registry";

/// Last line of every saved registry
pub const TRAILER: &str = "-- End of registry";

/// Render the registry in the saved file format.
#[must_use]
pub fn render(registry: &FunctionRegistry) -> String
{
    let entries = registry.list();
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    out.push_str(&format!(
        "-- Generated: {}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false)
    ));
    out.push_str(&format!("-- Functions: {}\n\n", entries.len()));

    for entry in &entries {
        out.push_str(&format!(
            "register({}, {}, {}, {})\n",
            script::quote(&entry.name),
            entry.address,
            script::quote(&entry.signature.to_string()),
            script::quote(&entry.description)
        ));
    }

    if !entries.is_empty() {
        out.push('\n');
    }
    out.push_str(TRAILER);
    out.push('\n');
    out
}

/// Write every registered function to `path`, creating missing parent
/// directories. Returns the number of functions saved.
///
/// ## Errors
///
/// - `FileIo`: the directory or file cannot be written
pub fn save(registry: &FunctionRegistry, path: &Path) -> CallgateResult<usize>
{
    let file_error = |source| CallgateError::FileIo {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(file_error)?;
    }
    fs::write(path, render(registry)).map_err(file_error)?;

    info!(path = %path.display(), count = registry.len(), "Saved function registry");
    Ok(registry.len())
}

/// Execute the `register` statements in `path` against `registry`.
/// Returns the number of functions registered.
///
/// Statements run in file order. If one fails, the ones before it stay
/// registered.
///
/// ## Errors
///
/// - `FileIo`: the file cannot be read
/// - `Script`: a line does not parse or is not a `register` statement
/// - any registration error (`InvalidName`, `InvalidAddress`,
///   `InvalidSignature`) raised by a statement
pub fn load(registry: &mut FunctionRegistry, path: &Path) -> CallgateResult<usize>
{
    let source = fs::read_to_string(path).map_err(|source| CallgateError::FileIo {
        path: path.to_path_buf(),
        source,
    })?;

    let count = load_str(registry, &source).inspect_err(|err| {
        warn!(path = %path.display(), error = %err, "Registry load stopped early");
    })?;
    info!(path = %path.display(), count, "Loaded function registry");
    Ok(count)
}

/// Execute the `register` statements in `source` against `registry`.
///
/// ## Errors
///
/// Same as [`load`], minus `FileIo`.
pub fn load_str(registry: &mut FunctionRegistry, source: &str) -> CallgateResult<usize>
{
    let mut count = 0;
    for (index, line) in source.lines().enumerate() {
        let Some(statement) = script::parse_line(line, index + 1)? else {
            continue;
        };
        if statement.name != "register" {
            return Err(statement.error(format!(
                "only register statements are allowed in a registry file, found '{}'",
                statement.name
            )));
        }
        execute_register(registry, &statement)?;
        count += 1;
    }
    Ok(count)
}

/// Arguments of a `register(name, address, signature[, description])` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterStatement<'a>
{
    /// Function name
    pub name: &'a str,
    /// Address as written: a number or hexadecimal text
    pub address: AddressInput,
    /// Signature text
    pub signature: &'a str,
    /// Description; empty when omitted or `nil`
    pub description: &'a str,
}

impl<'a> RegisterStatement<'a>
{
    /// Check the shape of a `register` statement's arguments.
    ///
    /// ## Errors
    ///
    /// - `Script`: wrong argument count or argument kinds
    pub fn from_statement(statement: &'a Statement) -> CallgateResult<Self>
    {
        if !(3..=4).contains(&statement.args.len()) {
            return Err(statement.error(format!(
                "register expects 3 or 4 arguments, got {}",
                statement.args.len()
            )));
        }

        let address = match &statement.args[1] {
            Literal::Int(value) => AddressInput::Numeric(*value),
            Literal::Str(text) => AddressInput::Text(text.clone()),
            other => {
                return Err(statement.error(format!(
                    "register: address must be a number or string, got {}",
                    other.kind()
                )));
            }
        };

        Ok(Self {
            name: statement.str_arg(0)?,
            address,
            signature: statement.str_arg(2)?,
            description: statement.opt_str_arg(3)?.unwrap_or_default(),
        })
    }
}

/// Run one `register` statement against `registry`.
///
/// ## Errors
///
/// - `Script`: wrong argument count or shapes
/// - any error from [`FunctionRegistry::register`]
pub fn execute_register(registry: &mut FunctionRegistry, statement: &Statement) -> CallgateResult<()>
{
    let args = RegisterStatement::from_statement(statement)?;
    registry.register(args.name, args.address, args.signature, args.description)?;
    debug!(line = statement.line, name = args.name, "Executed register statement");
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_render_layout()
    {
        let mut registry = FunctionRegistry::new();
        registry.register("Zeta", 0x2000u64, "void()", "").unwrap();
        registry.register("Alpha", 0x1000u64, "int __stdcall(int)", "say \"hi\"").unwrap();

        let text = render(&registry);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].starts_with("-- Generated: "));
        assert_eq!(lines[2], "-- Functions: 2");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], r#"register("Alpha", 0x00001000, "int __stdcall(int)", "say \"hi\"")"#);
        assert_eq!(lines[5], r#"register("Zeta", 0x00002000, "void()", "")"#);
        assert_eq!(lines[6], "");
        assert_eq!(lines[7], TRAILER);
    }

    #[test]
    fn test_only_register_is_allowed()
    {
        let mut registry = FunctionRegistry::new();
        let err = load_str(&mut registry, "register(\"a\", 0x10, \"int()\")\ncall(\"a\")\n").unwrap_err();
        assert!(matches!(err, CallgateError::Script { line: 2, .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_argument_shapes()
    {
        let mut registry = FunctionRegistry::new();
        assert!(load_str(&mut registry, "register(\"a\", 0x10)").is_err());
        assert!(load_str(&mut registry, "register(\"a\", true, \"int()\")").is_err());
        assert_eq!(load_str(&mut registry, "register(\"a\", \"0x10\", \"int()\", nil)").unwrap(), 1);
        assert_eq!(registry.resolve("a").unwrap().description, "");
    }
}
