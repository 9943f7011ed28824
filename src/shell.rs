// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command execution.
//!
//! Every installer ends up shelling out to something: apt, snap, pip, pyenv,
//! gpg, wget, and so on. This module is the one place where processes are
//! spawned.
//!
//! # Environment Snapshot
//!
//! Installers like pyenv change the user's shell profile, and later
//! installers expect those changes to be visible, e.g., `pyenv` must be found
//! on `PATH` right after it was installed. Deskup never mutates its own
//! process environment for this. Instead, a [`Shell`] owns an
//! [`Environment`] snapshot that every spawned command runs with, and
//! [`Shell::reload_environment`] replaces that snapshot wholesale after
//! re-sourcing the profile. Until a reload happens, the snapshot is stale
//! with respect to profile changes.

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    ffi::{OsStr, OsString},
    io::{BufRead, BufReader, Read, Write},
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Output, Stdio},
    rc::Rc,
    time::Duration,
};
use tracing::{debug, info, instrument};

/// Marks where the environment dump starts in a profile reload.
const ENV_MARKER: &str = "__DESKUP_ENVIRONMENT__";

/// Full set of environment variables commands run with.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<OsString, OsString>,
}

impl Environment {
    /// Snapshot environment of current process.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars_os().collect(),
        }
    }

    /// Parse NUL-separated `KEY=VALUE` dump as printed by `env -0`.
    ///
    /// Anything before the reload marker is noise printed by the profile, and
    /// is skipped. Without a marker the entire dump is parsed. Entries without
    /// a `=`, or with an empty key, are skipped.
    pub fn parse_dump(dump: &[u8]) -> Self {
        let mut entries = dump.split(|byte| *byte == 0);
        let has_marker = dump
            .split(|byte| *byte == 0)
            .any(|entry| entry == ENV_MARKER.as_bytes());
        if has_marker {
            for entry in entries.by_ref() {
                if entry == ENV_MARKER.as_bytes() {
                    break;
                }
            }
        }

        let vars = entries
            .filter_map(|entry| {
                let split = entry.iter().position(|byte| *byte == b'=')?;
                let (key, value) = (&entry[..split], &entry[split + 1..]);
                if key.is_empty() {
                    return None;
                }

                Some((
                    OsStr::from_bytes(key).to_os_string(),
                    OsStr::from_bytes(value).to_os_string(),
                ))
            })
            .collect();

        Self { vars }
    }

    /// Get value of variable `key`.
    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.vars.get(key.as_ref()).map(OsString::as_os_str)
    }

    /// Set variable `key` to `value`.
    pub fn set(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Number of variables in snapshot.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = (&OsString, &OsString)> {
        self.vars.iter()
    }
}

/// Spawns commands with a shared environment snapshot.
///
/// Clones share the same snapshot, so a reload through one clone is seen by
/// all of them.
#[derive(Debug, Clone)]
pub struct Shell {
    env: Rc<RefCell<Environment>>,
}

impl Shell {
    /// Construct new shell running commands with `env`.
    pub fn new(env: Environment) -> Self {
        Self {
            env: Rc::new(RefCell::new(env)),
        }
    }

    /// Start building invocation of `program`.
    pub fn command(&self, program: impl Into<OsString>) -> Invocation<'_> {
        Invocation {
            shell: self,
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            stdin: None,
        }
    }

    /// Locate `name` on the `PATH` of the environment snapshot.
    pub fn which(&self, name: impl AsRef<OsStr>) -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        let env = self.env.borrow();
        which::which_in(name, env.get("PATH"), cwd).ok()
    }

    /// Get variable `key` from the environment snapshot.
    pub fn var(&self, key: impl AsRef<OsStr>) -> Option<OsString> {
        self.env.borrow().get(key).map(OsStr::to_os_string)
    }

    /// Re-source the user's zsh profile and replace the environment snapshot
    /// with what it produces.
    ///
    /// # Errors
    ///
    /// - Return [`ShellError`] if zsh cannot be run or fails.
    #[instrument(skip(self), level = "debug")]
    pub fn reload_environment(&self) -> Result<()> {
        let script = format!("printf '\\0{ENV_MARKER}\\0'; env -0");
        let output = self
            .command("zsh")
            .args(["-i", "-c", script.as_str()])
            .env("ZINIT_WAIT", "")
            .run_captured()?;

        let env = Environment::parse_dump(&output.stdout);
        debug!("reloaded {} environment variables", env.len());
        *self.env.borrow_mut() = env;

        Ok(())
    }
}

/// Builder for one external command.
#[derive(Debug)]
pub struct Invocation<'shell> {
    shell: &'shell Shell,
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
    stdin: Option<String>,
}

impl Invocation<'_> {
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run in directory `path` instead of the current one.
    pub fn current_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.cwd = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set variable on top of the environment snapshot for this command only.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Feed `input` to the command's standard input.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Run command, capturing its output.
    ///
    /// Returns stdout with trailing whitespace trimmed. Both stdout and stderr
    /// end up in the error when the command fails.
    ///
    /// # Errors
    ///
    /// - Return [`ShellError::Spawn`] if command cannot be started.
    /// - Return [`ShellError::Failed`] if command exits unsuccessfully.
    pub fn output(self) -> Result<String> {
        let output = self.run_captured()?;
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    /// Run command with the terminal attached, blocking until it exits.
    ///
    /// # Errors
    ///
    /// - Return [`ShellError::Spawn`] if command cannot be started.
    /// - Return [`ShellError::Failed`] if command exits unsuccessfully.
    #[instrument(skip(self), fields(command = %self), level = "debug")]
    pub fn interactive(self) -> Result<()> {
        let mut command = self.build();
        let mut child = self.spawn(&mut command)?;
        let status = child.wait().map_err(|source| self.spawn_error(source))?;
        self.check(status, String::new())
    }

    /// Run command, logging each line of its stdout as it arrives.
    ///
    /// A spinner shows the most recent line while the command runs.
    ///
    /// # Errors
    ///
    /// - Return [`ShellError::Spawn`] if command cannot be started.
    /// - Return [`ShellError::Failed`] if command exits unsuccessfully.
    #[instrument(skip(self), fields(command = %self), level = "debug")]
    pub fn stream(self) -> Result<()> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner:.green} {elapsed_precise} {msg}")?);
        bar.enable_steady_tick(Duration::from_millis(100));

        let mut command = self.build();
        command.stdout(Stdio::piped());
        let mut child = self.spawn(&mut command)?;

        let read = match child.stdout.take() {
            Some(stdout) => for_each_line(stdout, |line| {
                bar.suspend(|| info!("{line}"));
                bar.set_message(line);
            }),
            None => Ok(()),
        };

        // INVARIANT: Always reap the child and clear the spinner, even when
        // reading its output failed.
        let status = child.wait();
        bar.finish_and_clear();
        read.map_err(|source| self.spawn_error(source))?;
        let status = status.map_err(|source| self.spawn_error(source))?;
        self.check(status, String::new())
    }

    /// Check whether command runs and exits successfully.
    ///
    /// Failure to start the command counts as unsuccessful.
    pub fn succeeds(self) -> bool {
        self.run_captured().is_ok()
    }

    #[instrument(skip(self), fields(command = %self), level = "debug")]
    fn run_captured(self) -> Result<Output> {
        let mut command = self.build();
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        let child = self.spawn(&mut command)?;
        let output = child
            .wait_with_output()
            .map_err(|source| self.spawn_error(source))?;

        if !output.status.success() {
            let message = labeled_output(&output);
            self.check(output.status, message)?;
        }

        Ok(output)
    }

    fn build(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env_clear()
            .envs(self.shell.env.borrow().iter())
            .envs(self.env.iter().map(|(key, value)| (key, value)));
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        if self.stdin.is_some() {
            command.stdin(Stdio::piped());
        }

        command
    }

    fn spawn(&self, command: &mut Command) -> Result<Child> {
        debug!("run {self}");
        let mut child = command.spawn().map_err(|source| self.spawn_error(source))?;

        // INVARIANT: Close stdin after writing so the command sees end of input.
        if let (Some(input), Some(mut stdin)) = (&self.stdin, child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .map_err(|source| self.spawn_error(source))?;
        }

        Ok(child)
    }

    fn check(&self, status: ExitStatus, message: String) -> Result<()> {
        if status.success() {
            return Ok(());
        }

        Err(ShellError::Failed {
            command: self.to_string(),
            status,
            message,
        })
    }

    fn spawn_error(&self, source: std::io::Error) -> ShellError {
        ShellError::Spawn {
            source,
            command: self.to_string(),
        }
    }
}

impl std::fmt::Display for Invocation<'_> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.write_str(&self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(fmt, " {}", arg.to_string_lossy())?;
        }

        Ok(())
    }
}

/// Call `action` with each line of `reader`, line endings removed.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected.
fn for_each_line(reader: impl Read, mut action: impl FnMut(String)) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            return Ok(());
        }

        let line = String::from_utf8_lossy(&buffer);
        action(line.trim_end_matches(['\n', '\r']).to_string());
    }
}

fn labeled_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(output.stdout.as_slice());
    let stderr = String::from_utf8_lossy(output.stderr.as_slice());
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}

/// All possible error types for command execution.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// Command cannot be started, or its pipes fail.
    #[error("failed to run {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Command exits unsuccessfully.
    #[error("command {command:?} failed with {status}:\n{message}")]
    Failed {
        command: String,
        status: ExitStatus,
        message: String,
    },

    /// Style template cannot be set for progress spinner.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = ShellError> = std::result::Result<T, E>;
