// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Interactive inspection of the configuration store.
//!
//! Running deskup without a command drops into a small prompt over the
//! configuration store. Values can be listed, resolved, or overridden before
//! anything gets installed.

use crate::{
    prompt::PromptError,
    store::{ConfigStore, SlotState, Value},
};

use inquire::InquireError;
use std::io::Write;
use tracing::error;

const HELP: &str = "\
commands:
  list               show every value, deferred ones included
  get <name>         resolve and show value <name>
  set <name> <value> override value <name>
  resolve            resolve every deferred value
  help               show this message
  quit, exit         leave";

/// One line of input to the inspection prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Get(String),
    Set(String, String),
    Resolve,
    Help,
    Quit,

    /// Empty line.
    Nothing,
}

impl Command {
    /// Parse one line of input.
    ///
    /// # Errors
    ///
    /// - Return usage message if line is not a known command.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match (verb, rest) {
            ("", _) => Ok(Self::Nothing),
            ("list", "") => Ok(Self::List),
            ("resolve", "") => Ok(Self::Resolve),
            ("help", "") => Ok(Self::Help),
            ("quit" | "exit", "") => Ok(Self::Quit),
            ("get", name) if !name.is_empty() && !name.contains(char::is_whitespace) => {
                Ok(Self::Get(name.into()))
            }
            ("set", rest) => match rest.split_once(char::is_whitespace) {
                Some((name, value)) => Ok(Self::Set(name.into(), value.trim().into())),
                None => Err("usage: set <name> <value>".into()),
            },
            ("get", _) => Err("usage: get <name>".into()),
            _ => Err(format!("unknown command {line:?}, try \"help\"")),
        }
    }
}

/// Interpret typed value, preferring integer, then boolean, then string.
pub fn parse_value(input: &str) -> Value {
    if let Ok(value) = input.parse::<i64>() {
        return Value::Int(value);
    }

    match input {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Str(input.into()),
    }
}

/// Run inspection prompt until the user quits or input ends.
///
/// Failures of single commands are reported and the prompt carries on.
///
/// # Errors
///
/// - Return [`InspectError::Io`] if output cannot be written.
/// - Return [`InspectError::Prompt`] if input fails for reasons other than
///   ending.
pub fn inspect(store: &mut ConfigStore, out: &mut impl Write) -> Result<()> {
    writeln!(out, "{HELP}")?;
    loop {
        let line = match store.prompter_mut().read_line("deskup>") {
            Ok(line) => line,
            Err(PromptError::Exhausted)
            | Err(PromptError::Inquire(
                InquireError::OperationCanceled | InquireError::OperationInterrupted,
            )) => return Ok(()),
            Err(error) => return Err(error.into()),
        };

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(usage) => {
                writeln!(out, "{usage}")?;
                continue;
            }
        };

        match command {
            Command::Nothing => {}
            Command::Quit => return Ok(()),
            Command::Help => writeln!(out, "{HELP}")?,
            Command::List => {
                for (name, state) in store.entries() {
                    match state {
                        SlotState::Resolved(value) => writeln!(out, "{name} = {value}")?,
                        SlotState::Deferred => writeln!(out, "{name} = <deferred>")?,
                    }
                }
            }
            Command::Get(name) => match store.get(&name) {
                Ok(value) => writeln!(out, "{name} = {value}")?,
                Err(failure) => error!("{failure}"),
            },
            Command::Set(name, value) => store.set(name, parse_value(&value)),
            Command::Resolve => {
                if let Err(failure) = store.resolve_all() {
                    error!("{failure}");
                }
            }
        }
    }
}

/// All possible error types for the inspection prompt.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    /// Output cannot be written.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Input cannot be read.
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Friendly result alias :3
pub type Result<T, E = InspectError> = std::result::Result<T, E>;
