// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deferred configuration store.
//!
//! Deskup gathers everything it needs to know from the user into one place
//! called the __configuration store__. The store maps unique slot names to
//! values. Some values are known up front, e.g., the number of threads the
//! machine has. Most values come from the user, e.g., git identity, GitHub
//! token, virtualenv name.
//!
//! # Deferred Slots
//!
//! Prompting the user in the middle of a long installation is disruptive, and
//! pointless if the installer that needs the answer turns out to be satisfied
//! already. Thus, prompts are registered as __deferred__ slots. A deferred slot
//! holds a computation that is run at most once, the first time the slot is
//! read through [`ConfigStore::get`]. Its result replaces the computation in
//! place, so every later read returns the memoized value.
//!
//! A deferred computation receives the store itself, so it may read other
//! slots, deferred ones included. Reading a slot from inside its own
//! resolution is a cycle, and fails with [`ConfigError::Cycle`] instead of
//! recursing forever.
//!
//! Batch runs can front-load every prompt with [`ConfigStore::resolve_all`]
//! before anything destructive happens.

use crate::{
    github::GitTag,
    prompt::{ask, Prompter, UserInput},
};

use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};
use tracing::{debug, instrument};

/// Resolved configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    Path(PathBuf),
    Tag(GitTag),
    List(Vec<Value>),

    /// Absent optional handle.
    Nothing,
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "integer",
            Self::Bool(_) => "boolean",
            Self::Path(_) => "path",
            Self::Tag(_) => "git tag",
            Self::List(_) => "list",
            Self::Nothing => "nothing",
        }
    }
}

impl Display for Value {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Str(value) => write!(fmt, "{value:?}"),
            Self::Int(value) => write!(fmt, "{value}"),
            Self::Bool(value) => write!(fmt, "{value}"),
            Self::Path(value) => write!(fmt, "{:?}", value.display()),
            Self::Tag(tag) => write!(fmt, "{} ({})", tag.name, tag.tarball_url),
            Self::List(values) => {
                fmt.write_str("[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        fmt.write_str(", ")?;
                    }
                    write!(fmt, "{value}")?;
                }
                fmt.write_str("]")
            }
            Self::Nothing => fmt.write_str("none"),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<PathBuf> for Value {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<GitTag> for Value {
    fn from(value: GitTag) -> Self {
        Self::Tag(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<Option<PathBuf>> for Value {
    fn from(value: Option<PathBuf>) -> Self {
        value.map_or(Self::Nothing, Self::Path)
    }
}

/// Deferred computation producing a slot's value.
pub type Deferred = Box<dyn FnMut(&mut ConfigStore) -> Result<Value>>;

enum Slot {
    Resolved(Value),
    Deferred(Deferred),
    Resolving,
}

/// Observable state of a slot for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    Resolved(Value),
    Deferred,
}

/// Store of named configuration values, some of them deferred.
pub struct ConfigStore {
    slots: HashMap<String, Slot>,
    order: Vec<String>,
    prompter: Box<dyn Prompter>,
}

impl ConfigStore {
    /// Construct new empty store that prompts through `prompter`.
    pub fn new(prompter: impl Prompter + 'static) -> Self {
        Self {
            slots: HashMap::new(),
            order: Vec::new(),
            prompter: Box::new(prompter),
        }
    }

    /// Store resolved value at slot `name`, replacing whatever was there.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.insert(name.into(), Slot::Resolved(value.into()));
    }

    /// Register user prompt to run on first read of slot `name`.
    pub fn register_deferred(&mut self, name: impl Into<String>, input: UserInput) {
        let mut input = input;
        self.register_with(name, move |store| ask(store.prompter_mut(), &mut input));
    }

    /// Register arbitrary computation to run on first read of slot `name`.
    pub fn register_with(
        &mut self,
        name: impl Into<String>,
        computation: impl FnMut(&mut ConfigStore) -> Result<Value> + 'static,
    ) {
        self.insert(name.into(), Slot::Deferred(Box::new(computation)));
    }

    /// Get value of slot `name`, resolving it first if deferred.
    ///
    /// The computation of a deferred slot runs at most once. Its result is
    /// memoized in place of the computation.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Missing`] if slot was never set or registered.
    /// - Return [`ConfigError::Cycle`] if slot is read during its own
    ///   resolution.
    /// - Return whatever error the deferred computation fails with. The slot
    ///   stays deferred in that case.
    #[instrument(skip(self), level = "debug")]
    pub fn get(&mut self, name: &str) -> Result<Value> {
        let slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| ConfigError::Missing(name.into()))?;

        let mut computation = match std::mem::replace(slot, Slot::Resolving) {
            Slot::Resolved(value) => {
                *slot = Slot::Resolved(value.clone());
                return Ok(value);
            }
            Slot::Resolving => return Err(ConfigError::Cycle(name.into())),
            Slot::Deferred(computation) => computation,
        };

        debug!("resolve deferred slot {name}");
        let result = computation(self);

        // INVARIANT: The slot is still marked resolving, because every nested
        // read of it failed with a cycle error instead of touching it.
        let slot = match result {
            Ok(ref value) => Slot::Resolved(value.clone()),
            Err(_) => Slot::Deferred(computation),
        };
        self.slots.insert(name.into(), slot);

        result
    }

    /// Force every deferred slot in registration order.
    ///
    /// # Errors
    ///
    /// - Return first error any deferred computation fails with.
    pub fn resolve_all(&mut self) -> Result<()> {
        for name in self.order.clone() {
            self.get(&name)?;
        }

        Ok(())
    }

    /// List state of every slot in registration order.
    pub fn entries(&self) -> Vec<(String, SlotState)> {
        self.order
            .iter()
            .filter_map(|name| {
                let state = match self.slots.get(name)? {
                    Slot::Resolved(value) => SlotState::Resolved(value.clone()),
                    Slot::Deferred(_) | Slot::Resolving => SlotState::Deferred,
                };
                Some((name.clone(), state))
            })
            .collect()
    }

    /// Prompter used by deferred prompts.
    pub fn prompter_mut(&mut self) -> &mut dyn Prompter {
        self.prompter.as_mut()
    }

    pub fn get_str(&mut self, name: &str) -> Result<String> {
        match self.get(name)? {
            Value::Str(value) => Ok(value),
            other => Err(wrong_type(name, "string", &other)),
        }
    }

    pub fn get_int(&mut self, name: &str) -> Result<i64> {
        match self.get(name)? {
            Value::Int(value) => Ok(value),
            other => Err(wrong_type(name, "integer", &other)),
        }
    }

    pub fn get_bool(&mut self, name: &str) -> Result<bool> {
        match self.get(name)? {
            Value::Bool(value) => Ok(value),
            other => Err(wrong_type(name, "boolean", &other)),
        }
    }

    pub fn get_tag(&mut self, name: &str) -> Result<GitTag> {
        match self.get(name)? {
            Value::Tag(tag) => Ok(tag),
            other => Err(wrong_type(name, "git tag", &other)),
        }
    }

    /// Get optional path, where [`Value::Nothing`] means absent.
    pub fn get_opt_path(&mut self, name: &str) -> Result<Option<PathBuf>> {
        match self.get(name)? {
            Value::Path(path) => Ok(Some(path)),
            Value::Nothing => Ok(None),
            other => Err(wrong_type(name, "path", &other)),
        }
    }

    fn insert(&mut self, name: String, slot: Slot) {
        if self.slots.insert(name.clone(), slot).is_none() {
            self.order.push(name);
        }
    }
}

fn wrong_type(name: &str, expected: &'static str, found: &Value) -> ConfigError {
    ConfigError::WrongType {
        name: name.into(),
        expected,
        found: found.kind(),
    }
}

/// All possible error types for configuration store interaction.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Slot was never set or registered.
    #[error("configuration value {0:?} does not exist")]
    Missing(String),

    /// Slot was read while it was being resolved.
    #[error("configuration value {0:?} depends on itself")]
    Cycle(String),

    /// Slot holds a different kind of value than asked for.
    #[error("configuration value {name:?} is a {found}, not a {expected}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// User input was rejected by a converter.
    #[error("{0}")]
    InvalidValue(String),

    /// Prompting the user failed.
    #[error(transparent)]
    Prompt(#[from] crate::prompt::PromptError),

    /// Computation of a deferred value failed for any other reason.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
