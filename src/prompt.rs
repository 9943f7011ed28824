// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Interactive user input.
//!
//! Everything deskup asks the user goes through the [`Prompter`] trait, so
//! that the deferred configuration store never has to care whether answers
//! come from a terminal or from a script.

use crate::store::{ConfigError, Value};

use inquire::{InquireError, Text};
use std::{
    fmt::Display,
    io::{BufRead, IsTerminal, Write},
};
use tracing::error;

/// Layer of indirection for reading user input.
pub trait Prompter {
    /// Show `prompt` and read one line of input.
    fn read_line(&mut self, prompt: &str) -> Result<String>;

    /// Show informational message to the user.
    fn show(&mut self, message: &str);
}

/// Prompter for interactive terminals through inquire.
///
/// Falls back to plain line reads when standard input is not a terminal, so
/// answers can be piped in.
#[derive(Debug, Default, Clone)]
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn read_line(&mut self, prompt: &str) -> Result<String> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            return LinePrompter::new(stdin.lock(), std::io::stdout()).read_line(prompt);
        }

        Ok(Text::new(prompt).prompt()?)
    }

    fn show(&mut self, message: &str) {
        println!("{message}");
    }
}

/// Prompter over plain line-oriented input and output.
#[derive(Debug)]
pub struct LinePrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn read_line(&mut self, prompt: &str) -> Result<String> {
        write!(self.output, "{prompt} ")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(PromptError::Exhausted);
        }

        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }

    fn show(&mut self, message: &str) {
        // INVARIANT: Messages are informational, losing one is harmless.
        let _ = writeln!(self.output, "{message}");
    }
}

/// Converts raw user input into a configuration value.
///
/// Reject input with [`ConfigError::InvalidValue`] to have the user asked
/// again. Any other error aborts the prompt.
pub type Converter = Box<dyn FnMut(String) -> Result<Value, ConfigError>>;

/// Description of a prompt for one configuration value.
pub struct UserInput {
    prompt: String,
    default: Option<String>,
    converter: Option<Converter>,
}

impl UserInput {
    /// Construct new prompt without default or converter.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            default: None,
            converter: None,
        }
    }

    /// Use `default` when the user enters nothing.
    pub fn with_default(mut self, default: impl Display) -> Self {
        self.default = Some(default.to_string());
        self
    }

    /// Validate and convert input through `converter`.
    pub fn with_converter(
        mut self,
        converter: impl FnMut(String) -> Result<Value, ConfigError> + 'static,
    ) -> Self {
        self.converter = Some(Box::new(converter));
        self
    }

    fn message(&self) -> String {
        match &self.default {
            Some(default) => format!("{} [{default}]:", self.prompt),
            None => format!("{}:", self.prompt),
        }
    }
}

/// Ask user for a value until valid input is given.
///
/// Empty input falls back to the default. Without a default, empty input is
/// reported and the user is asked again. The default goes through the
/// converter just like typed input does.
///
/// # Errors
///
/// - Return [`ConfigError::Prompt`] if input cannot be read.
/// - Return any converter error other than [`ConfigError::InvalidValue`].
pub fn ask(prompter: &mut dyn Prompter, input: &mut UserInput) -> Result<Value, ConfigError> {
    let message = input.message();
    loop {
        let mut value = prompter.read_line(&message)?;
        if value.is_empty() {
            match &input.default {
                Some(default) => value = default.clone(),
                None => {
                    error!("a value is required! Try again.");
                    continue;
                }
            }
        }

        let Some(converter) = input.converter.as_mut() else {
            return Ok(Value::Str(value));
        };

        match converter(value.clone()) {
            Err(ConfigError::InvalidValue(reason)) => {
                error!("invalid value {value:?}: {reason}! Try again.");
            }
            result => return result,
        }
    }
}

/// Outcome of [`choose`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// Index into the offered options.
    Option(usize),

    /// User wants something that was not offered.
    Other,
}

/// Let user pick one of `options` by number, or an extra "other" entry.
///
/// Keeps asking until a listed number is entered.
///
/// # Errors
///
/// - Return [`PromptError`] if input cannot be read.
pub fn choose(
    prompter: &mut dyn Prompter,
    title: &str,
    options: &[impl Display],
) -> Result<Choice> {
    prompter.show(title);
    loop {
        for (index, option) in options.iter().enumerate() {
            prompter.show(&format!("({index}) {option}"));
        }
        prompter.show(&format!("({}) other", options.len()));

        let Ok(selected) = prompter.read_line("Select an option:")?.trim().parse::<usize>() else {
            continue;
        };

        match selected {
            index if index < options.len() => return Ok(Choice::Option(index)),
            index if index == options.len() => return Ok(Choice::Other),
            _ => continue,
        }
    }
}

/// Parse input as integer.
pub fn to_int(input: String) -> Result<Value, ConfigError> {
    input
        .trim()
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|error| ConfigError::InvalidValue(error.to_string()))
}

/// Normalize input to trimmed lowercase string.
pub fn to_lowercase(input: String) -> Result<Value, ConfigError> {
    Ok(Value::Str(input.trim().to_lowercase()))
}

/// Interpret prompt-style yes/no answer.
///
/// Only "y", "yes", and "1" count as yes, ignoring case and surrounding
/// whitespace.
pub fn yes_no(input: String) -> Result<Value, ConfigError> {
    let answer = input.trim().to_lowercase();
    Ok(Value::Bool(matches!(answer.as_str(), "y" | "yes" | "1")))
}

/// Build converter accepting thread counts in `1..=max`.
pub fn thread_count(max: i64) -> impl FnMut(String) -> Result<Value, ConfigError> {
    move |input| {
        let threads = input
            .trim()
            .parse::<i64>()
            .map_err(|error| ConfigError::InvalidValue(error.to_string()))?;
        if !(1..=max).contains(&threads) {
            return Err(ConfigError::InvalidValue(format!(
                "invalid number of threads {threads}, expected 1 to {max}"
            )));
        }

        Ok(Value::Int(threads))
    }
}

/// All possible error types for prompting.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// Terminal prompt failed or was cancelled.
    #[error(transparent)]
    Inquire(#[from] InquireError),

    /// No more input to read.
    #[error("no more input to read")]
    Exhausted,

    /// Plain input or output failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = PromptError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Scripted {
        lines: VecDeque<String>,
        prompts: Vec<String>,
        shown: Vec<String>,
    }

    impl Scripted {
        fn new(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
            Self {
                lines: lines.into_iter().map(Into::into).collect(),
                ..Default::default()
            }
        }
    }

    impl Prompter for Scripted {
        fn read_line(&mut self, prompt: &str) -> Result<String> {
            self.prompts.push(prompt.into());
            self.lines.pop_front().ok_or(PromptError::Exhausted)
        }

        fn show(&mut self, message: &str) {
            self.shown.push(message.into());
        }
    }

    #[test]
    fn ask_shows_default_in_prompt() -> anyhow::Result<()> {
        let mut prompter = Scripted::new(["sci"]);
        let mut input = UserInput::new("Enter virtualenv name").with_default("base");

        assert_eq!(ask(&mut prompter, &mut input)?, Value::Str("sci".into()));
        assert_eq!(prompter.prompts, vec!["Enter virtualenv name [base]:"]);

        Ok(())
    }

    #[test]
    fn ask_requires_value_without_default() -> anyhow::Result<()> {
        let mut prompter = Scripted::new(["", "", "ghp_token"]);
        let mut input = UserInput::new("Enter GitHub personal token");

        assert_eq!(ask(&mut prompter, &mut input)?, Value::Str("ghp_token".into()));
        assert_eq!(prompter.prompts.len(), 3);

        Ok(())
    }

    #[test]
    fn ask_converts_default() -> anyhow::Result<()> {
        let mut prompter = Scripted::new([""]);
        let mut input = UserInput::new("Enter git key length")
            .with_default(4096)
            .with_converter(to_int);

        assert_eq!(ask(&mut prompter, &mut input)?, Value::Int(4096));

        Ok(())
    }

    #[test]
    fn ask_propagates_other_converter_errors() {
        let mut prompter = Scripted::new(["token", "unreachable"]);
        let mut input = UserInput::new("Enter token")
            .with_converter(|_| Err(ConfigError::Other(anyhow::anyhow!("network is down"))));

        let result = ask(&mut prompter, &mut input);
        assert!(matches!(result, Err(ConfigError::Other(_))));
        assert_eq!(prompter.lines.len(), 1);
    }

    #[test]
    fn ask_fails_when_input_runs_out() {
        let mut prompter = Scripted::new(["x"]);
        let mut input = UserInput::new("Enter number").with_converter(to_int);

        let result = ask(&mut prompter, &mut input);
        assert!(matches!(result, Err(ConfigError::Prompt(PromptError::Exhausted))));
    }

    #[test]
    fn line_prompter_reads_piped_answers() -> anyhow::Result<()> {
        let mut output = Vec::new();
        let mut prompter = LinePrompter::new(&b"\nsci\r\n"[..], &mut output);
        let mut threads = UserInput::new("Enter number of build threads")
            .with_default(8)
            .with_converter(to_int);
        let mut name = UserInput::new("Enter virtualenv name");

        assert_eq!(ask(&mut prompter, &mut threads)?, Value::Int(8));
        assert_eq!(ask(&mut prompter, &mut name)?, Value::Str("sci".into()));
        assert!(matches!(prompter.read_line("Enter more:"), Err(PromptError::Exhausted)));
        prompter.show("done");

        assert_eq!(
            String::from_utf8(output)?,
            "Enter number of build threads [8]: Enter virtualenv name: Enter more: done\n"
        );

        Ok(())
    }

    #[test_case("y", true; "short yes")]
    #[test_case(" YES ", true; "shouty yes")]
    #[test_case("1", true; "numeric yes")]
    #[test_case("n", false; "short no")]
    #[test_case("yep", false; "anything else")]
    #[test]
    fn yes_no_answers(input: &str, expect: bool) -> anyhow::Result<()> {
        assert_eq!(yes_no(input.into())?, Value::Bool(expect));
        Ok(())
    }

    #[test_case("1", Some(1); "lower bound")]
    #[test_case(" 8 ", Some(8); "upper bound")]
    #[test_case("0", None; "zero")]
    #[test_case("9", None; "too many")]
    #[test_case("eight", None; "not a number")]
    #[test]
    fn thread_count_bounds(input: &str, expect: Option<i64>) {
        let mut convert = thread_count(8);
        let result = convert(input.into());
        match expect {
            Some(threads) => assert_eq!(result.ok(), Some(Value::Int(threads))),
            None => assert!(matches!(result, Err(ConfigError::InvalidValue(_)))),
        }
    }

    #[test]
    fn lowercase_trims_input() -> anyhow::Result<()> {
        assert_eq!(
            to_lowercase("  Miniconda3-Latest ".into())?,
            Value::Str("miniconda3-latest".into())
        );
        Ok(())
    }

    #[test]
    fn choose_retries_until_listed_option() -> anyhow::Result<()> {
        let mut prompter = Scripted::new(["x", "7", "1"]);
        let result = choose(&mut prompter, "Select tag:", &["v6-30-00", "v6-28-00"])?;

        assert_eq!(result, Choice::Option(1));
        assert_eq!(
            prompter.shown[..4].to_vec(),
            vec!["Select tag:", "(0) v6-30-00", "(1) v6-28-00", "(2) other"]
        );

        Ok(())
    }

    #[test]
    fn choose_offers_other() -> anyhow::Result<()> {
        let mut prompter = Scripted::new(["2"]);
        let result = choose(&mut prompter, "Select tag:", &["a", "b"])?;
        assert_eq!(result, Choice::Other);
        Ok(())
    }
}
