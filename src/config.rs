// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Settings file layout.
//!
//! Specify the layout of the optional settings file that deskup reads at
//! startup. Each value in the settings file only supplies the _default_ of
//! an interactive prompt, so the file can be left out entirely, or filled in
//! piecemeal.
//!
//! # General Layout
//!
//! The settings file is split into small tables, one per concern: git
//! identity, Python environment, ROOT, singularity, and the dotfiles
//! directory. Every field in every table is optional.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Settings file layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Git identity used for commits and key generation.
    #[serde(default)]
    pub git: GitSettings,

    /// Python environment to develop in.
    #[serde(default)]
    pub python: PythonSettings,

    /// How to get a ROOT installation.
    #[serde(default)]
    pub root: RootSettings,

    /// Singularity release to build.
    #[serde(default)]
    pub singularity: SingularitySettings,

    /// Where the dotfiles to stow live.
    #[serde(default)]
    pub dotfiles: DotfilesSettings,
}

impl Settings {
    /// Load settings from file at `path`.
    ///
    /// A missing file is not an error, and simply yields default settings.
    ///
    /// # Errors
    ///
    /// - Return [`SettingsError::ReadSettings`] if file exists but cannot be
    ///   read.
    /// - Return [`SettingsError::Deserialize`] if file contents are invalid.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no settings file at {:?}, using defaults", path.display());
            return Ok(Self::default());
        }

        debug!("load settings from {:?}", path.display());
        read_to_string(path)
            .map_err(|source| SettingsError::ReadSettings {
                source,
                path: path.to_path_buf(),
            })?
            .parse()
    }
}

impl FromStr for Settings {
    type Err = SettingsError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data)?;

        // INVARIANT: Perform shell expansion on dotfiles path field.
        if let Some(path) = settings.dotfiles.path.take() {
            settings.dotfiles.path = Some(PathBuf::from(
                shellexpand::full(path.to_string_lossy().as_ref())?.into_owned(),
            ));
        }

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(SettingsError::Serialize)?
                .as_str(),
        )
    }
}

/// Git identity settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct GitSettings {
    /// Full name to commit with.
    pub user_name: Option<String>,

    /// Email address to commit with.
    pub email_address: Option<String>,

    /// Length of generated GPG key in bits.
    pub key_length: Option<u32>,
}

/// Python development environment settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PythonSettings {
    /// Name of the development virtualenv.
    pub virtualenv_name: Option<String>,

    /// Interpreter version string understood by pyenv.
    pub version: Option<String>,
}

impl Default for PythonSettings {
    fn default() -> Self {
        Self {
            virtualenv_name: Some("sci".into()),
            version: Some("miniconda3-latest".into()),
        }
    }
}

/// ROOT installation settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct RootSettings {
    /// Yes/no answer to whether conda should install ROOT.
    pub use_conda: Option<String>,
}

impl Default for RootSettings {
    fn default() -> Self {
        Self {
            use_conda: Some("y".into()),
        }
    }
}

/// Singularity build settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SingularitySettings {
    /// Release version to download and build.
    pub version: Option<String>,
}

impl Default for SingularitySettings {
    fn default() -> Self {
        Self {
            version: Some("3.7.3".into()),
        }
    }
}

/// Dotfiles directory settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct DotfilesSettings {
    /// Directory holding one stow package per top-level directory.
    pub path: Option<PathBuf>,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Settings file exists but cannot be read.
    #[error("failed to read settings file {:?}", path.display())]
    ReadSettings {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl From<SettingsError> for FmtError {
    fn from(_: SettingsError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
pub type Result<T, E = SettingsError> = std::result::Result<T, E>;
