// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Idempotent installer wrapper.
//!
//! Every installation step in deskup runs through an [`Installer`]. The
//! wrapper does not know how to install anything. It only adds three things
//! around the step's body:
//!
//! 1. __Idempotency__: a [`Precondition`] decides whether the step's goal
//!    already holds, e.g., the executable it provides is on `PATH`. If it
//!    does, the body is skipped entirely. Running the same installer twice is
//!    thus safe, and a no-op the second time.
//! 2. __Nested logging__: each step logs what it runs with, indented by how
//!    many installers are currently active. Installers call other installers,
//!    e.g., most steps install apt packages, so the log reads like a tree.
//! 3. __Failure context__: a failing body is logged with the step's name and
//!    arguments, then its error is handed back to the caller untouched.
//!
//! The wrapper never retries, sandboxes, or rolls back. Whatever the body did
//! before failing stays done.
//!
//! # Nesting Depth
//!
//! The current depth lives in the [`Context`] that is passed to every
//! installer. [`Context::enter`] increments it and hands out a guard that
//! decrements it again when dropped, so the depth is restored on every exit
//! path, including early returns, errors, and unwinding.

pub mod dotfiles;
pub mod packages;
pub mod plan;
pub mod steps;

use crate::{shell::Shell, store::Value};

use std::{
    cell::Cell,
    fmt::{Display, Formatter, Result as FmtResult},
};
use tracing::{error, info};

/// State shared by all installers of one run.
#[derive(Debug)]
pub struct Context {
    shell: Shell,
    depth: Cell<usize>,
}

impl Context {
    /// Construct new context at nesting depth zero.
    pub fn new(shell: Shell) -> Self {
        Self {
            shell,
            depth: Cell::new(0),
        }
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// Number of installers currently running.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Enter one level of nesting until the returned guard is dropped.
    pub fn enter(&self) -> DepthGuard<'_> {
        self.depth.set(self.depth.get() + 1);
        DepthGuard { depth: &self.depth }
    }

    /// Log `message` at info level, indented by current depth.
    pub fn log(&self, message: impl Display) {
        info!("{}{message}", indent(self.depth()));
    }

    /// Log `message` at error level, indented by current depth.
    pub fn log_error(&self, message: impl Display) {
        error!("{}{message}", indent(self.depth()));
    }
}

/// Restores nesting depth of a [`Context`] when dropped.
#[derive(Debug)]
pub struct DepthGuard<'ctx> {
    depth: &'ctx Cell<usize>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

fn indent(depth: usize) -> String {
    "   ".repeat(depth)
}

/// Parameter names of one installer call bound to their argument values.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Signature {
    arguments: Vec<(&'static str, Value)>,
}

impl Signature {
    /// Construct new signature without arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind parameter `name` to `value`.
    pub fn arg(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.arguments.push((name, value.into()));
        self
    }

    /// Get value bound to parameter `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.arguments
            .iter()
            .find(|(parameter, _)| *parameter == name)
            .map(|(_, value)| value)
    }
}

impl Display for Signature {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str("(")?;
        for (index, (name, value)) in self.arguments.iter().enumerate() {
            if index > 0 {
                fmt.write_str(", ")?;
            }
            write!(fmt, "{name}={value}")?;
        }
        fmt.write_str(")")
    }
}

/// Predicate over an installer call.
pub type Predicate = Box<dyn Fn(&Context, &Signature) -> bool>;

/// Check whether an installer's goal already holds.
pub enum Precondition {
    /// Executable is on the `PATH` of the context's shell.
    Executable(String),

    /// Command exits successfully. Failure to start counts as not satisfied.
    Probe { program: String, args: Vec<String> },

    /// Arbitrary check over the call.
    Predicate(Predicate),
}

impl Precondition {
    pub fn executable(name: impl Into<String>) -> Self {
        Self::Executable(name.into())
    }

    pub fn probe(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::Probe {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn predicate(check: impl Fn(&Context, &Signature) -> bool + 'static) -> Self {
        Self::Predicate(Box::new(check))
    }

    /// Evaluate precondition for call with `signature`.
    pub fn holds(&self, ctx: &Context, signature: &Signature) -> bool {
        match self {
            Self::Executable(name) => ctx.shell().which(name).is_some(),
            Self::Probe { program, args } => ctx
                .shell()
                .command(program)
                .args(args)
                .succeeds(),
            Self::Predicate(check) => check(ctx, signature),
        }
    }
}

impl std::fmt::Debug for Precondition {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Executable(name) => fmt.debug_tuple("Executable").field(name).finish(),
            Self::Probe { program, args } => fmt
                .debug_struct("Probe")
                .field("program", program)
                .field("args", args)
                .finish(),
            Self::Predicate(_) => fmt.write_str("Predicate(..)"),
        }
    }
}

/// What running an installer amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// Precondition held, body was skipped.
    AlreadySatisfied,

    /// Body ran to completion.
    Completed(T),
}

impl<T> Outcome<T> {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::AlreadySatisfied)
    }

    /// Value produced by the body, if it ran.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::AlreadySatisfied => None,
            Self::Completed(value) => Some(value),
        }
    }
}

/// Named installation action with optional precondition.
#[derive(Debug)]
pub struct Installer {
    name: String,
    precondition: Option<Precondition>,
}

impl Installer {
    /// Construct new installer that always runs its body.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            precondition: None,
        }
    }

    /// Skip body whenever `precondition` holds.
    pub fn skip_if(mut self, precondition: Precondition) -> Self {
        self.precondition = Some(precondition);
        self
    }

    /// Run `body` unless precondition holds.
    ///
    /// The body runs one nesting level deeper than the caller. Its error, if
    /// any, is logged and then returned as is.
    ///
    /// # Errors
    ///
    /// - Return whatever error `body` fails with.
    pub fn run<T, E, F>(&self, ctx: &Context, signature: &Signature, body: F) -> Result<Outcome<T>, E>
    where
        E: Display,
        F: FnOnce() -> Result<T, E>,
    {
        let name = &self.name;
        ctx.log(format!("running {name} with {signature}"));

        if let Some(precondition) = &self.precondition {
            if precondition.holds(ctx, signature) {
                ctx.log(format!("{name} is already installed!"));
                return Ok(Outcome::AlreadySatisfied);
            }
        }

        let value = {
            let _guard = ctx.enter();
            body().map_err(|error| {
                ctx.log_error(format!("execution of {name} with {signature} failed: {error}"));
                error
            })?
        };

        ctx.log(format!("finished running {name} with {signature}"));
        Ok(Outcome::Completed(value))
    }
}

/// All possible error types for installation steps.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// External command failed.
    #[error(transparent)]
    Shell(#[from] crate::shell::ShellError),

    /// GitHub lookup failed.
    #[error(transparent)]
    GitHub(#[from] crate::github::GitHubError),

    /// Configuration value cannot be resolved.
    #[error(transparent)]
    Config(#[from] crate::store::ConfigError),

    /// Directory cannot be determined or created.
    #[error(transparent)]
    Path(#[from] crate::path::PathError),

    /// Git configuration cannot be written.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// File system operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Glob pattern is invalid.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Globbed path cannot be read.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    /// Dotfiles directory cannot be walked.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// Command output is not the JSON expected.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Something an installer needs is not there.
    #[error("{0}")]
    Missing(String),
}

/// Friendly result alias :3
pub type Result<T, E = InstallError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::Environment;

    use pretty_assertions::assert_eq;
    use std::{
        io::Write,
        panic::AssertUnwindSafe,
        sync::{Arc, Mutex},
    };

    fn context() -> Context {
        Context::new(Shell::new(Environment::capture()))
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer poisoned").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Collect log lines emitted while `action` runs.
    fn capture_logs(action: impl FnOnce()) -> Vec<String> {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_target(false)
            .without_time()
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::with_default(subscriber, action);

        let bytes = captured.0.lock().expect("log buffer poisoned").clone();
        String::from_utf8_lossy(&bytes).lines().map(Into::into).collect()
    }

    #[test]
    fn satisfied_precondition_skips_body() {
        let ctx = context();
        let runs = Cell::new(0);
        let installer = Installer::new("install_x").skip_if(Precondition::predicate(|_, _| true));

        for _ in 0..2 {
            let outcome = installer.run(&ctx, &Signature::new(), || {
                runs.set(runs.get() + 1);
                Ok::<_, std::io::Error>(())
            });
            assert!(matches!(outcome, Ok(Outcome::AlreadySatisfied)));
        }

        assert_eq!(runs.get(), 0);
    }

    #[test]
    fn unsatisfied_precondition_runs_body_once_per_call() -> anyhow::Result<()> {
        let ctx = context();
        let runs = Cell::new(0);
        let installer = Installer::new("install_x").skip_if(Precondition::predicate(|_, _| false));

        for expect in 1..=3 {
            let outcome = installer.run(&ctx, &Signature::new(), || {
                runs.set(runs.get() + 1);
                Ok::<_, std::io::Error>(runs.get())
            })?;
            assert_eq!(outcome, Outcome::Completed(expect));
        }

        Ok(())
    }

    #[test]
    fn failure_propagates_unchanged() {
        let ctx = context();
        let installer = Installer::new("install_boom");

        let result = installer.run(&ctx, &Signature::new().arg("n", 1), || {
            Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
        });

        match result {
            Err(error) => {
                assert_eq!(error.kind(), std::io::ErrorKind::Other);
                assert_eq!(error.to_string(), "boom");
            }
            Ok(outcome) => panic!("expected failure, got {outcome:?}"),
        }
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn skipped_runs_are_logged_each_time() {
        let ctx = context();
        let installer = Installer::new("install_x").skip_if(Precondition::predicate(|_, _| true));

        let lines = capture_logs(|| {
            for _ in 0..2 {
                let _ = installer.run(&ctx, &Signature::new(), || Ok::<_, std::io::Error>(()));
            }
        });

        let skipped = lines
            .iter()
            .filter(|line| line.contains("INFO") && line.ends_with(" install_x is already installed!"))
            .count();
        assert_eq!(skipped, 2);
        assert!(!lines.iter().any(|line| line.contains("finished running install_x")));
    }

    #[test]
    fn failure_is_logged_one_level_deeper() {
        let ctx = context();
        let installer = Installer::new("install_boom");

        let lines = capture_logs(|| {
            let _ = installer.run(&ctx, &Signature::new().arg("n", 1_i64), || {
                Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
            });
        });

        let failed = lines
            .iter()
            .filter(|line| line.contains("ERROR"))
            .collect::<Vec<_>>();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].ends_with("    execution of install_boom with (n=1) failed: boom"));
        assert!(lines.iter().any(|line| line.ends_with(" running install_boom with (n=1)")));
        assert!(!lines.iter().any(|line| line.contains("finished running install_boom")));
    }

    #[test]
    fn nested_installers_increase_depth() -> anyhow::Result<()> {
        let ctx = context();
        let seen = Cell::new(Vec::new());
        let outer = Installer::new("outer");
        let inner = Installer::new("inner");

        outer.run(&ctx, &Signature::new(), || {
            let mut depths = vec![ctx.depth()];
            inner.run(&ctx, &Signature::new(), || {
                depths.push(ctx.depth());
                Ok::<_, std::io::Error>(())
            })?;
            depths.push(ctx.depth());
            seen.set(depths);
            Ok::<_, std::io::Error>(())
        })?;

        assert_eq!(seen.take(), vec![1, 2, 1]);
        assert_eq!(ctx.depth(), 0);

        Ok(())
    }

    #[test]
    fn depth_is_restored_after_panic() {
        let ctx = context();
        let installer = Installer::new("install_panic");

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = installer.run(&ctx, &Signature::new(), || -> Result<(), std::io::Error> {
                panic!("body panicked");
            });
        }));

        assert!(result.is_err());
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn predicate_sees_bound_arguments() -> anyhow::Result<()> {
        let ctx = context();
        let installer = Installer::new("install_venv").skip_if(Precondition::predicate(|_, signature| {
            signature.get("virtualenv_name") == Some(&Value::Str("sci".into()))
        }));

        let signature = Signature::new().arg("virtualenv_name", "sci");
        let outcome = installer.run(&ctx, &signature, || Ok::<_, std::io::Error>(()))?;
        assert!(outcome.is_satisfied());

        let signature = Signature::new().arg("virtualenv_name", "hep");
        let outcome = installer.run(&ctx, &signature, || Ok::<_, std::io::Error>(()))?;
        assert_eq!(outcome.completed(), Some(()));

        Ok(())
    }

    #[test]
    fn executable_and_probe_preconditions() {
        let ctx = context();
        let signature = Signature::new();

        assert!(Precondition::executable("sh").holds(&ctx, &signature));
        assert!(!Precondition::executable("deskup-no-such-program").holds(&ctx, &signature));
        assert!(Precondition::probe("sh", ["-c", "exit 0"]).holds(&ctx, &signature));
        assert!(!Precondition::probe("sh", ["-c", "exit 1"]).holds(&ctx, &signature));
    }

    #[test]
    fn signature_renders_bound_arguments() {
        let signature = Signature::new()
            .arg("packages", vec!["zsh", "tmux"])
            .arg("classic", false)
            .arg("threads", 8_i64);

        assert_eq!(
            signature.to_string(),
            r#"(packages=["zsh", "tmux"], classic=false, threads=8)"#
        );
        assert_eq!(Signature::new().to_string(), "()");
    }
}
