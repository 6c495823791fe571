//! Line-oriented command tokenizer and dispatcher
//!
//! Bytes are collected until the terminator (`\n`). The first
//! space-separated token names the command; its handler pulls the remaining
//! tokens through [`Arguments`]. Only printable ASCII enters the line
//! buffer, and characters beyond its capacity are dropped.

use crate::error::CommandError;
use crate::spec;
use std::io::Read;
use tracing::{debug, trace};

/// Outcome of a handler
pub type CommandResult = std::result::Result<(), CommandError>;

/// A registered command handler
pub type Handler<C> = Box<dyn FnMut(&mut Arguments<'_>, &mut C) -> CommandResult>;

/// Handler for lines whose first token matches no command
pub type DefaultHandler<C> = Box<dyn FnMut(&str, &mut C)>;

/// Tokens following the command name on one line
#[derive(Debug, Clone)]
pub struct Arguments<'a> {
    rest: &'a str,
    delimiter: char,
}

impl<'a> Arguments<'a> {
    /// Tokenize `line` on `delimiter`, skipping empty tokens
    pub fn new(line: &'a str, delimiter: char) -> Self {
        Arguments {
            rest: line,
            delimiter,
        }
    }

    /// Next raw token
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&'a str> {
        let trimmed = self.rest.trim_start_matches(self.delimiter);
        if trimmed.is_empty() {
            self.rest = trimmed;
            return None;
        }
        let end = trimmed.find(self.delimiter).unwrap_or(trimmed.len());
        let (token, rest) = trimmed.split_at(end);
        self.rest = rest;
        Some(token)
    }

    /// Unconsumed text
    pub fn remaining(&self) -> &'a str {
        self.rest.trim_start_matches(self.delimiter)
    }

    /// Next token as a signed integer (decimal, `0x` hex or `0` octal)
    pub fn next_int(&mut self) -> Result<i32, CommandError> {
        let token = self.next().ok_or(CommandError::MissingArgument)?;
        parse_c_integer(token)
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| CommandError::invalid_number(token))
    }

    /// Next token as an unsigned 32-bit integer
    pub fn next_ulong(&mut self) -> Result<u32, CommandError> {
        let token = self.next().ok_or(CommandError::MissingArgument)?;
        parse_c_integer(token)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| CommandError::invalid_number(token))
    }

    /// Next token as a float
    pub fn next_float(&mut self) -> Result<f32, CommandError> {
        let token = self.next().ok_or(CommandError::MissingArgument)?;
        token
            .parse::<f32>()
            .map_err(|_| CommandError::invalid_number(token))
    }

    /// Next token as a flag: `ON` or `OFF`
    pub fn next_onoff(&mut self) -> Result<bool, CommandError> {
        match self.next() {
            Some("ON") => Ok(true),
            Some("OFF") => Ok(false),
            Some(token) => Err(CommandError::invalid_flag(token)),
            None => Err(CommandError::MissingArgument),
        }
    }
}

/// Parse an integer the way `strtol(s, _, 0)` does, requiring the whole token
fn parse_c_integer(token: &str) -> Option<i64> {
    let (negative, body) = match token.as_bytes().first() {
        Some(b'-') => (true, &token[1..]),
        Some(b'+') => (false, &token[1..]),
        _ => (false, token),
    };
    let (radix, digits) = if let Some(hex) = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
    {
        (16, hex)
    } else if body.len() > 1 && body.starts_with('0') {
        (8, &body[1..])
    } else {
        (10, body)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// What happened to one terminated line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The line held no tokens
    Empty,
    /// A registered command ran to completion
    Command(String),
    /// A registered command rejected its arguments
    Failed {
        /// Command name as typed
        command: String,
        /// Argument error
        error: CommandError,
    },
    /// No command matched; the default handler ran
    Default(String),
    /// No command matched and there is no default handler
    Unmatched(String),
}

/// Command dictionary plus line buffer
///
/// `C` is the context handed to every handler.
pub struct CommandFrontend<C> {
    commands: Vec<(String, Handler<C>)>,
    default_handler: Option<DefaultHandler<C>>,
    delimiter: char,
    terminator: u8,
    buffer: String,
}

impl<C> CommandFrontend<C> {
    /// Create an empty frontend: space delimiter, newline terminator
    pub fn new() -> Self {
        CommandFrontend {
            commands: Vec::new(),
            default_handler: None,
            delimiter: ' ',
            terminator: b'\n',
            buffer: String::with_capacity(spec::LINE_BUFFER_LENGTH),
        }
    }

    /// Register `handler` under `name`
    ///
    /// Names longer than [`spec::MAX_COMMAND_LENGTH`] are truncated.
    pub fn add_command<F>(&mut self, name: &str, handler: F)
    where
        F: FnMut(&mut Arguments<'_>, &mut C) -> CommandResult + 'static,
    {
        let name = truncate_name(name).to_string();
        debug!(command = %name, index = self.commands.len(), "adding command");
        self.commands.push((name, Box::new(handler)));
    }

    /// Handler for unknown commands, receiving the unmatched name
    pub fn set_default_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&str, &mut C) + 'static,
    {
        self.default_handler = Some(Box::new(handler));
    }

    /// Registered command names in registration order
    pub fn command_names(&self) -> Vec<&str> {
        self.commands.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Drop any partially received line
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Partially received line
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Process one input byte, dispatching when it ends a line
    pub fn feed_byte(&mut self, byte: u8, ctx: &mut C) -> Option<Dispatch> {
        if byte == self.terminator {
            let line = std::mem::take(&mut self.buffer);
            let outcome = self.dispatch(&line, ctx);
            self.buffer = line;
            self.buffer.clear();
            return Some(outcome);
        }
        if byte.is_ascii_graphic() || byte == b' ' {
            if self.buffer.len() < spec::LINE_BUFFER_LENGTH {
                self.buffer.push(byte as char);
            } else {
                trace!(byte, "line buffer full, dropping");
            }
        }
        None
    }

    /// Process a chunk of input, returning one outcome per completed line
    pub fn feed(&mut self, bytes: &[u8], ctx: &mut C) -> Vec<Dispatch> {
        bytes
            .iter()
            .filter_map(|&b| self.feed_byte(b, ctx))
            .collect()
    }

    /// Read everything `reader` has and process it
    pub fn read_from<R: Read>(
        &mut self,
        reader: &mut R,
        ctx: &mut C,
    ) -> std::io::Result<Vec<Dispatch>> {
        let mut chunk = [0u8; 64];
        let mut outcomes = Vec::new();
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => return Ok(outcomes),
                Ok(n) => outcomes.extend(self.feed(&chunk[..n], ctx)),
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return Ok(outcomes),
                Err(err) => return Err(err),
            }
        }
    }

    fn dispatch(&mut self, line: &str, ctx: &mut C) -> Dispatch {
        let mut args = Arguments::new(line, self.delimiter);
        let Some(command) = args.next() else {
            return Dispatch::Empty;
        };
        let key = truncate_name(command);

        if let Some((_, handler)) = self.commands.iter_mut().find(|(name, _)| name == key) {
            debug!(command, "matched command");
            return match handler(&mut args, ctx) {
                Ok(()) => Dispatch::Command(command.to_string()),
                Err(error) => {
                    debug!(command, %error, "command rejected arguments");
                    Dispatch::Failed {
                        command: command.to_string(),
                        error,
                    }
                }
            };
        }

        match self.default_handler.as_mut() {
            Some(handler) => {
                debug!(command, "no match, running default handler");
                handler(command, ctx);
                Dispatch::Default(command.to_string())
            }
            None => {
                debug!(command, "no match");
                Dispatch::Unmatched(command.to_string())
            }
        }
    }
}

impl<C> Default for CommandFrontend<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_name(name: &str) -> &str {
    match name.char_indices().nth(spec::MAX_COMMAND_LENGTH) {
        Some((end, _)) => &name[..end],
        None => name,
    }
}
