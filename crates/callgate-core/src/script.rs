//! # Statement Scripts
//!
//! Reader for the line-oriented statement language shared by saved registry
//! files and command scripts:
//!
//! ```text
//! -- comment
//! register("GetGold", 0x00401000, "int(void)", "player gold")
//! call("Add", 2, -3);
//! debugConfig("logParameters", false)
//! ```
//!
//! One statement per line: a name followed by a parenthesised, comma-separated
//! list of literals. Literals are strings (double or single quoted, with
//! `\\`, `\"`, `\'`, `\n`, `\t`, `\r` and `\0` escapes), integers (decimal or
//! `0x` hexadecimal, optionally negative), floats, `true`, `false` and `nil`.
//! `--` starts a comment anywhere outside a string, and a trailing `;` is
//! allowed.
//!
//! This module only reads statements. What a statement does is up to whoever
//! executes it.

use std::fmt;

use crate::error::{CallgateError, CallgateResult};

/// A literal argument of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal
{
    /// String literal, escapes resolved
    Str(String),
    /// Integer literal; wide enough for any address
    Int(i128),
    /// Float literal
    Float(f64),
    /// `true` or `false`
    Bool(bool),
    /// `nil`
    Nil,
}

impl Literal
{
    /// Short name of the literal's kind, for error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str
    {
        match self {
            Literal::Str(_) => "string",
            Literal::Int(_) => "integer",
            Literal::Float(_) => "float",
            Literal::Bool(_) => "boolean",
            Literal::Nil => "nil",
        }
    }
}

impl fmt::Display for Literal
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Literal::Str(s) => f.write_str(&quote(s)),
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::Bool(v) => write!(f, "{v}"),
            Literal::Nil => f.write_str("nil"),
        }
    }
}

/// One parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement
{
    /// Statement name, e.g. `register`
    pub name: String,
    /// Arguments in order
    pub args: Vec<Literal>,
    /// 1-based source line
    pub line: usize,
}

impl Statement
{
    /// Build a [`CallgateError::Script`] pointing at this statement.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> CallgateError
    {
        CallgateError::Script {
            line: self.line,
            message: message.into(),
        }
    }

    /// The string argument at `index`.
    ///
    /// ## Errors
    ///
    /// - `Script`: missing, or not a string
    pub fn str_arg(&self, index: usize) -> CallgateResult<&str>
    {
        match self.args.get(index) {
            Some(Literal::Str(s)) => Ok(s),
            Some(other) => Err(self.error(format!(
                "{}: argument {} must be a string, got {}",
                self.name,
                index + 1,
                other.kind()
            ))),
            None => Err(self.error(format!("{}: missing argument {}", self.name, index + 1))),
        }
    }

    /// The string argument at `index`, or `None` if absent or `nil`.
    ///
    /// ## Errors
    ///
    /// - `Script`: present but not a string
    pub fn opt_str_arg(&self, index: usize) -> CallgateResult<Option<&str>>
    {
        match self.args.get(index) {
            None | Some(Literal::Nil) => Ok(None),
            Some(_) => self.str_arg(index).map(Some),
        }
    }
}

/// Parse a whole script. Blank and comment-only lines are skipped.
///
/// ## Errors
///
/// - `Script`: the first line that does not parse
pub fn parse_script(source: &str) -> CallgateResult<Vec<Statement>>
{
    let mut statements = Vec::new();
    for (index, line) in source.lines().enumerate() {
        if let Some(statement) = parse_line(line, index + 1)? {
            statements.push(statement);
        }
    }
    Ok(statements)
}

/// Parse a single line. Returns `None` for blank and comment-only lines.
///
/// ## Errors
///
/// - `Script`: the line is not a well-formed statement
pub fn parse_line(text: &str, line: usize) -> CallgateResult<Option<Statement>>
{
    let mut reader = LineReader::new(text, line);
    reader.skip_blank();
    if reader.at_end_or_comment() {
        return Ok(None);
    }

    let name = reader.identifier().ok_or_else(|| reader.error("expected a statement name"))?;
    reader.skip_blank();
    reader.expect('(')?;

    let mut args = Vec::new();
    reader.skip_blank();
    if !reader.eat(')') {
        loop {
            reader.skip_blank();
            args.push(reader.literal()?);
            reader.skip_blank();
            if reader.eat(',') {
                continue;
            }
            reader.expect(')')?;
            break;
        }
    }

    reader.skip_blank();
    reader.eat(';');
    reader.skip_blank();
    if !reader.at_end_or_comment() {
        return Err(reader.error("unexpected text after statement"));
    }

    Ok(Some(Statement { name, args, line }))
}

/// Render `text` as a double-quoted literal that [`parse_line`] reads back
/// unchanged.
#[must_use]
pub fn quote(text: &str) -> String
{
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

struct LineReader
{
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl LineReader
{
    fn new(text: &str, line: usize) -> Self
    {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line,
        }
    }

    fn error(&self, message: impl Into<String>) -> CallgateError
    {
        CallgateError::Script {
            line: self.line,
            message: format!("{} (column {})", message.into(), self.pos + 1),
        }
    }

    fn peek(&self) -> Option<char>
    {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char>
    {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_blank(&mut self)
    {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn at_end_or_comment(&self) -> bool
    {
        match self.peek() {
            None => true,
            Some('-') => self.peek_at(1) == Some('-'),
            Some(_) => false,
        }
    }

    fn eat(&mut self, expected: char) -> bool
    {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> CallgateResult<()>
    {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{expected}'")))
        }
    }

    fn identifier(&mut self) -> Option<String>
    {
        let start = self.pos;
        if !self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
            return None;
        }
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        Some(self.chars[start..self.pos].iter().collect())
    }

    fn literal(&mut self) -> CallgateResult<Literal>
    {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                self.string(quote).map(Literal::Str)
            }
            Some(c) if c == '-' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let word = self.identifier().unwrap_or_default();
                match word.as_str() {
                    "true" => Ok(Literal::Bool(true)),
                    "false" => Ok(Literal::Bool(false)),
                    "nil" => Ok(Literal::Nil),
                    _ => Err(self.error(format!("unknown value '{word}'"))),
                }
            }
            Some(c) => Err(self.error(format!("unexpected '{c}'"))),
            None => Err(self.error("unexpected end of line")),
        }
    }

    fn string(&mut self, quote: char) -> CallgateResult<String>
    {
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error("unterminated string"));
            };
            self.pos += 1;
            match c {
                c if c == quote => return Ok(out),
                '\\' => {
                    let escaped = self.peek().ok_or_else(|| self.error("unterminated string"))?;
                    self.pos += 1;
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        '\\' | '"' | '\'' => escaped,
                        other => return Err(self.error(format!("unknown escape '\\{other}'"))),
                    });
                }
                c => out.push(c),
            }
        }
    }

    fn number(&mut self) -> CallgateResult<Literal>
    {
        let start = self.pos;
        let negative = self.eat('-');

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos].iter().collect();
            let value = i128::from_str_radix(&digits, 16)
                .map_err(|_| self.error(format!("invalid hexadecimal literal '0x{digits}'")))?;
            return Ok(Literal::Int(if negative { -value } else { value }));
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {}
                '.' | 'e' | 'E' => is_float = true,
                '+' | '-' if matches!(self.chars.get(self.pos.wrapping_sub(1)), Some('e' | 'E')) => {}
                _ => break,
            }
            self.pos += 1;
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            text.parse::<f64>()
                .map(Literal::Float)
                .map_err(|_| self.error(format!("invalid number '{text}'")))
        } else {
            text.parse::<i128>()
                .map(Literal::Int)
                .map_err(|_| self.error(format!("invalid number '{text}'")))
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_register_statement()
    {
        let statement = parse_line(r#"register("GetGold", 0x00401000, "int(void)", "gold")"#, 3)
            .unwrap()
            .unwrap();
        assert_eq!(statement.name, "register");
        assert_eq!(statement.line, 3);
        assert_eq!(
            statement.args,
            vec![
                Literal::Str("GetGold".into()),
                Literal::Int(0x0040_1000),
                Literal::Str("int(void)".into()),
                Literal::Str("gold".into()),
            ]
        );
    }

    #[test]
    fn test_literal_kinds()
    {
        let statement = parse_line("f(-5, 2.5, 1e3, true, nil, 'x');  -- trailing", 1)
            .unwrap()
            .unwrap();
        assert_eq!(
            statement.args,
            vec![
                Literal::Int(-5),
                Literal::Float(2.5),
                Literal::Float(1000.0),
                Literal::Bool(true),
                Literal::Nil,
                Literal::Str("x".into()),
            ]
        );
    }

    #[test]
    fn test_blank_and_comment_lines()
    {
        assert!(parse_line("", 1).unwrap().is_none());
        assert!(parse_line("   -- register(\"x\")", 1).unwrap().is_none());
        assert!(parse_line("clearLogs()", 1).unwrap().unwrap().args.is_empty());
    }

    #[test]
    fn test_quote_reads_back()
    {
        let text = "say \"hi\"\\\n\tdone";
        let statement = parse_line(&format!("f({})", quote(text)), 1).unwrap().unwrap();
        assert_eq!(statement.args, vec![Literal::Str(text.to_string())]);
    }

    #[test]
    fn test_errors_carry_line()
    {
        let err = parse_script("list()\nregister(\"a\"\n").unwrap_err();
        assert!(matches!(err, CallgateError::Script { line: 2, .. }));

        assert!(parse_line("f(\"open", 1).is_err());
        assert!(parse_line("f(1) extra", 1).is_err());
        assert!(parse_line("f(maybe)", 1).is_err());
        assert!(parse_line("42()", 1).is_err());
    }
}
