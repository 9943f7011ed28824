// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Full installation plan.
//!
//! [`user_config`] fills a configuration store with everything the catalog
//! needs to know, almost all of it deferred. [`install_all`] then walks the
//! catalog in order, reading each value only when the step that needs it is
//! reached.

use crate::{
    config::Settings,
    github::{select_tag, GitHub, GitHubError},
    install::{
        packages::{apt_install, snap_install, SnapFlags},
        steps::{
            find_conda, install_alacritty, install_chrome, install_development_virtualenv,
            install_git_config, install_gnome_tweaks, install_gnupg, install_pandoc,
            install_pyenv, install_pyenv_sys_python, install_regolith, install_root_from_source,
            install_root_with_conda, install_singularity, install_tex, install_zsh,
            system_python_version,
        },
        Context, Result,
    },
    prompt::{thread_count, to_int, to_lowercase, yes_no, Prompter, UserInput},
    shell::Shell,
    store::{ConfigError, ConfigStore, Value},
};

use std::{fmt::Display, thread::available_parallelism};
use tracing::instrument;

/// Key length used when settings do not name one.
pub const DEFAULT_KEY_LENGTH: u32 = 4096;

/// Number of recent tags offered when selecting ROOT's tag.
const TAG_OPTIONS: usize = 5;

/// Values known without asking the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemFacts {
    pub max_threads: i64,
    pub python_version: String,
}

impl SystemFacts {
    /// Probe the running system.
    ///
    /// # Errors
    ///
    /// - Return [`crate::install::InstallError::Io`] if thread count is
    ///   unknown.
    /// - Return [`crate::install::InstallError::Shell`] if python3 cannot be
    ///   run.
    pub fn probe(shell: &Shell) -> Result<Self> {
        Ok(Self {
            max_threads: i64::try_from(available_parallelism()?.get()).unwrap_or(i64::MAX),
            python_version: system_python_version(shell)?,
        })
    }
}

/// Build configuration store for the installer catalog.
///
/// # Errors
///
/// - Return [`crate::install::InstallError`] if system facts cannot be
///   probed.
#[instrument(skip_all, level = "debug")]
pub fn user_config(
    settings: &Settings,
    shell: &Shell,
    prompter: impl Prompter + 'static,
) -> Result<ConfigStore> {
    let facts = SystemFacts::probe(shell)?;
    let mut store = ConfigStore::new(prompter);
    register_slots(&mut store, settings, shell, &facts);
    Ok(store)
}

fn user_input(prompt: &str, default: Option<impl Display>) -> UserInput {
    let input = UserInput::new(prompt);
    match default {
        Some(default) => input.with_default(default),
        None => input,
    }
}

/// Register every configuration slot the catalog reads.
pub fn register_slots(
    store: &mut ConfigStore,
    settings: &Settings,
    shell: &Shell,
    facts: &SystemFacts,
) {
    let max_threads = facts.max_threads;
    store.set("N_MAX_SYSTEM_THREADS", max_threads);
    store.register_deferred(
        "N_BUILD_THREADS",
        UserInput::new("Enter number of build threads")
            .with_default(max_threads)
            .with_converter(thread_count(max_threads)),
    );
    store.register_deferred(
        "DEVELOPMENT_VIRTUALENV_NAME",
        user_input("Enter virtualenv name", settings.python.virtualenv_name.as_deref()),
    );
    store.register_deferred(
        "DEVELOPMENT_PYTHON_VERSION",
        user_input("Enter Python version string", settings.python.version.as_deref())
            .with_converter(to_lowercase),
    );
    store.register_deferred(
        "GIT_USER_NAME",
        user_input("Enter git user-name", settings.git.user_name.as_deref()),
    );
    store.register_deferred(
        "GIT_EMAIL_ADDRESS",
        user_input("Enter git email-address", settings.git.email_address.as_deref()),
    );
    store.register_deferred(
        "GIT_KEY_LENGTH",
        UserInput::new("Enter git key length")
            .with_default(settings.git.key_length.unwrap_or(DEFAULT_KEY_LENGTH))
            .with_converter(to_int),
    );
    store.register_deferred(
        "GITHUB_TOKEN",
        UserInput::new("Enter GitHub personal token").with_converter(validate_token),
    );
    store.set(
        "SYSTEM_VENV_NAME",
        format!("{}-system", facts.python_version),
    );
    store.register_deferred(
        "ROOT_USE_CONDA",
        user_input("Use Conda package for ROOT?", settings.root.use_conda.as_deref())
            .with_converter(yes_no),
    );
    store.register_with("ROOT_GITHUB_TAG", |store| {
        let github = GitHub::new(store.get_str("GITHUB_TOKEN")?);
        select_tag(&github, store.prompter_mut(), "root-project", "root", TAG_OPTIONS)
            .map(Value::Tag)
            .map_err(github_to_config_error)
    });
    store.register_deferred(
        "SINGULARITY_VERSION",
        user_input("Enter singularity version", settings.singularity.version.as_deref()),
    );

    let shell = shell.clone();
    store.register_with("CONDA_CMD", move |store| {
        let virtualenv_name = store.get_str("DEVELOPMENT_VIRTUALENV_NAME")?;
        Ok(find_conda(&shell, Some(virtualenv_name.as_str())).into())
    });
}

/// Accept GitHub token only if GitHub does.
///
/// A rejected token or failing query asks the user again. Any other failure,
/// e.g., no network, is fatal.
fn validate_token(token: String) -> Result<Value, ConfigError> {
    let token = token.trim().to_string();
    match GitHub::new(token.as_str()).validate_token() {
        Ok(()) => Ok(Value::Str(token)),
        Err(error @ (GitHubError::InvalidToken | GitHubError::Query(_))) => {
            Err(ConfigError::InvalidValue(error.to_string()))
        }
        Err(error) => Err(github_to_config_error(error)),
    }
}

fn github_to_config_error(error: GitHubError) -> ConfigError {
    match error {
        GitHubError::Prompt(error) => ConfigError::Prompt(error),
        error => ConfigError::Other(error.into()),
    }
}

/// Run the whole installer catalog in order.
///
/// # Errors
///
/// - Return first error of any step, or of resolving its configuration.
pub fn install_all(store: &mut ConfigStore, ctx: &Context) -> Result<()> {
    apt_install(
        ctx,
        &[
            "cmake",
            "curl",
            "wget",
            "cmake-gui",
            "build-essential",
            "aria2",
            "openssh-server",
            "checkinstall",
            "htop",
            "lm-sensors",
            "flameshot",
            "libreadline-dev",
            "libffi-dev",
            "libsqlite3-dev",
            "xclip",
            "libbz2-dev",
        ],
    )?;
    install_git_config(
        ctx,
        &store.get_str("GIT_USER_NAME")?,
        &store.get_str("GIT_EMAIL_ADDRESS")?,
    )?;
    install_zsh(ctx)?;

    install_regolith(ctx)?;
    install_alacritty(ctx)?;

    install_chrome(ctx)?;
    apt_install(ctx, &["fd-find"])?;
    apt_install(ctx, &["tmux"])?;

    install_pyenv(ctx)?;
    install_pyenv_sys_python(ctx, &store.get_str("SYSTEM_VENV_NAME")?)?;
    install_development_virtualenv(
        ctx,
        &store.get_str("DEVELOPMENT_PYTHON_VERSION")?,
        &store.get_str("DEVELOPMENT_VIRTUALENV_NAME")?,
    )?;

    install_gnupg(
        ctx,
        &store.get_str("GIT_USER_NAME")?,
        &store.get_str("GIT_EMAIL_ADDRESS")?,
        store.get_int("GIT_KEY_LENGTH")?,
    )?;

    snap_install(ctx, "micro", SnapFlags::classic())?;
    snap_install(ctx, "thunderbird", SnapFlags::beta())?;
    snap_install(ctx, "spotify", SnapFlags::default())?;
    snap_install(ctx, "mathpix-snipping-tool", SnapFlags::default())?;
    snap_install(ctx, "atom", SnapFlags::classic())?;
    for package in ["polari", "vlc", "fzf", "direnv", "bat"] {
        apt_install(ctx, &[package])?;
    }
    snap_install(ctx, "gimp", SnapFlags::default())?;
    apt_install(ctx, &["ripgrep"])?;
    apt_install(ctx, &["icecc"])?;
    install_gnome_tweaks(ctx)?;

    install_singularity(ctx, &store.get_str("SINGULARITY_VERSION")?)?;

    for package in ["pycharm-professional", "clion", "webstorm"] {
        snap_install(ctx, package, SnapFlags::classic())?;
    }

    install_pandoc(ctx, &GitHub::new(store.get_str("GITHUB_TOKEN")?))?;

    // INVARIANT: Only ask about conda when conda actually exists.
    let conda = store.get_opt_path("CONDA_CMD")?;
    let use_conda = match conda {
        Some(_) => store.get_bool("ROOT_USE_CONDA")?,
        None => false,
    };
    match conda {
        Some(conda) if use_conda => {
            install_root_with_conda(ctx, &conda, &store.get_str("DEVELOPMENT_VIRTUALENV_NAME")?)?;
        }
        _ => {
            install_root_from_source(
                ctx,
                &store.get_str("DEVELOPMENT_VIRTUALENV_NAME")?,
                store.get_int("N_BUILD_THREADS")?,
                &store.get_tag("ROOT_GITHUB_TAG")?,
            )?;
        }
    }

    install_tex(ctx)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{GitSettings, PythonSettings},
        prompt::PromptError,
        shell::Environment,
        store::SlotState,
    };

    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    struct Scripted {
        lines: VecDeque<String>,
    }

    impl Scripted {
        fn new(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
            Self {
                lines: lines.into_iter().map(Into::into).collect(),
            }
        }
    }

    impl Prompter for Scripted {
        fn read_line(&mut self, _prompt: &str) -> Result<String, PromptError> {
            self.lines.pop_front().ok_or(PromptError::Exhausted)
        }

        fn show(&mut self, _message: &str) {}
    }

    fn facts() -> SystemFacts {
        SystemFacts {
            max_threads: 8,
            python_version: "3.8.10".into(),
        }
    }

    fn store_with(settings: &Settings, lines: &[&str]) -> ConfigStore {
        let mut store = ConfigStore::new(Scripted::new(lines.iter().copied()));
        let shell = Shell::new(Environment::capture());
        register_slots(&mut store, settings, &shell, &facts());
        store
    }

    #[test]
    fn only_system_facts_are_resolved_up_front() {
        let store = store_with(&Settings::default(), &[]);
        let resolved = store
            .entries()
            .into_iter()
            .filter_map(|(name, state)| match state {
                SlotState::Resolved(value) => Some((name, value)),
                SlotState::Deferred => None,
            })
            .collect::<Vec<_>>();

        assert_eq!(
            resolved,
            vec![
                ("N_MAX_SYSTEM_THREADS".into(), Value::Int(8)),
                ("SYSTEM_VENV_NAME".into(), Value::Str("3.8.10-system".into())),
            ]
        );
        assert_eq!(store.entries().len(), 13);
    }

    #[test]
    fn build_threads_default_to_max() -> anyhow::Result<()> {
        let mut store = store_with(&Settings::default(), &[""]);
        assert_eq!(store.get_int("N_BUILD_THREADS")?, 8);
        Ok(())
    }

    #[test]
    fn build_threads_reject_more_than_max() -> anyhow::Result<()> {
        let mut store = store_with(&Settings::default(), &["16", "0", "4"]);
        assert_eq!(store.get_int("N_BUILD_THREADS")?, 4);
        Ok(())
    }

    #[test]
    fn settings_supply_prompt_defaults() -> anyhow::Result<()> {
        let settings = Settings {
            git: GitSettings {
                user_name: Some("Jane Doe".into()),
                email_address: None,
                key_length: Some(2048),
            },
            python: PythonSettings {
                virtualenv_name: Some("hep".into()),
                version: Some("3.9.1".into()),
            },
            ..Default::default()
        };
        let mut store = store_with(&settings, &["", "", "", "jane@example.com", "", " Miniconda3-Latest ", "n"]);

        assert_eq!(store.get_str("GIT_USER_NAME")?, "Jane Doe");
        assert_eq!(store.get_int("GIT_KEY_LENGTH")?, 2048);
        assert_eq!(store.get_str("GIT_EMAIL_ADDRESS")?, "jane@example.com");
        assert_eq!(store.get_str("DEVELOPMENT_VIRTUALENV_NAME")?, "hep");
        assert_eq!(store.get_str("DEVELOPMENT_PYTHON_VERSION")?, "miniconda3-latest");
        assert!(!store.get_bool("ROOT_USE_CONDA")?);

        Ok(())
    }

    #[test]
    fn default_settings_use_builtin_defaults() -> anyhow::Result<()> {
        let mut store = store_with(&Settings::default(), &["", "", "", ""]);

        assert_eq!(store.get_str("DEVELOPMENT_VIRTUALENV_NAME")?, "sci");
        assert_eq!(store.get_str("SINGULARITY_VERSION")?, "3.7.3");
        assert!(store.get_bool("ROOT_USE_CONDA")?);
        assert_eq!(store.get_int("GIT_KEY_LENGTH")?, i64::from(DEFAULT_KEY_LENGTH));

        Ok(())
    }

    #[test]
    fn conda_lookup_resolves_virtualenv_first() -> anyhow::Result<()> {
        let mut store = ConfigStore::new(Scripted::new(["sci"]));
        let mut env = Environment::default();
        env.set("PATH", "/deskup/nowhere");
        register_slots(&mut store, &Settings::default(), &Shell::new(env), &facts());

        assert_eq!(store.get_opt_path("CONDA_CMD")?, None);
        assert_eq!(
            store.entries().into_iter().find(|(name, _)| name == "DEVELOPMENT_VIRTUALENV_NAME"),
            Some(("DEVELOPMENT_VIRTUALENV_NAME".into(), SlotState::Resolved(Value::Str("sci".into()))))
        );

        Ok(())
    }

    #[test]
    fn github_failures_keep_their_kind() {
        let result = github_to_config_error(GitHubError::Shape("no edges".into()));
        assert!(matches!(result, ConfigError::Other(_)));

        let result = github_to_config_error(GitHubError::Prompt(PromptError::Exhausted));
        assert!(matches!(result, ConfigError::Prompt(PromptError::Exhausted)));
    }
}
