// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevant path information for external files that need to be
//! interacted with, or managed in some way during provisioning.

use std::path::{Path, PathBuf};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if home directory path cannot be
///   determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(PathError::NoWayHome)
}

/// Determine default absolute path to the settings file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/deskup/settings.toml` as
/// the default. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if configuration directory cannot be
///   determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_settings_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("deskup").join("settings.toml"))
        .ok_or(PathError::NoWayHome)
}

/// Directory where libraries built from source are kept, `~/Libraries`.
pub fn libraries_dir() -> Result<PathBuf> {
    make_or_find(home_dir()?.join("Libraries"))
}

/// Directory where git clones are kept, `~/Git`.
pub fn git_dir() -> Result<PathBuf> {
    make_or_find(home_dir()?.join("Git"))
}

/// Create directory at `path` unless it already exists.
///
/// Missing parent directories are created as well.
///
/// # Errors
///
/// - Return [`PathError::MakeDir`] if directory cannot be created.
pub fn make_or_find(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if !path.exists() {
        mkdirp::mkdirp(path).map_err(|source| PathError::MakeDir {
            source,
            path: path.to_path_buf(),
        })?;
    }

    Ok(path.to_path_buf())
}

/// All possible error types for path resolution.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// No way to determine user's home directory.
    ///
    /// # See Also
    ///
    /// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
    #[error("cannot determine absolute path to user's home directory")]
    NoWayHome,

    /// Directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    MakeDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;
