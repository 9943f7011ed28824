// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Link dotfiles into place.
//!
//! The dotfiles directory holds one GNU stow package per top-level
//! directory. Hidden directories, e.g., `.git`, are never packages.

use crate::install::{Context, InstallError, Installer, Outcome, Result, Signature};

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// List stow packages of dotfiles directory `dir` sorted by name.
///
/// # Errors
///
/// - Return [`InstallError::Walk`] if `dir` cannot be read.
pub fn stow_packages(dir: impl AsRef<Path>) -> Result<Vec<String>> {
    let dir = dir.as_ref();
    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .hidden(true)
        .max_depth(Some(1))
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut packages = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.depth() == 0 || !entry.file_type().is_some_and(|kind| kind.is_dir()) {
            continue;
        }

        packages.push(entry.file_name().to_string_lossy().into_owned());
    }

    Ok(packages)
}

/// Stow every package of dotfiles directory `dir` without folding.
///
/// # Errors
///
/// - Return [`InstallError::Walk`] if `dir` cannot be read.
/// - Return [`InstallError::Shell`] if stow fails for any package.
pub fn stow_dotfiles(ctx: &Context, dir: impl AsRef<Path>) -> Result<Outcome<()>> {
    let dir = dir.as_ref();
    let signature = Signature::new().arg("dotfiles", dir.to_path_buf());
    Installer::new("stow_dotfiles").run(ctx, &signature, || -> Result<()> {
        for package in stow_packages(dir)? {
            ctx.log(format!("stow {package}"));
            ctx.shell()
                .command("stow")
                .args([package.as_str(), "--no-folding"])
                .current_dir(dir)
                .output()?;
        }
        Ok(())
    })
}

/// Path of the crontab inside dotfiles directory `dir`.
pub fn crontab_path(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join("crontab")
}

/// Replace the user's crontab with the one in dotfiles directory `dir`.
///
/// # Errors
///
/// - Return [`InstallError::Missing`] if `dir` has no crontab.
/// - Return [`InstallError::Shell`] if crontab rejects it.
pub fn install_crontab(ctx: &Context, dir: impl AsRef<Path>) -> Result<Outcome<()>> {
    let crontab = crontab_path(dir);
    let signature = Signature::new().arg("crontab", crontab.clone());
    Installer::new("install_crontab").run(ctx, &signature, || -> Result<()> {
        if !crontab.is_file() {
            return Err(InstallError::Missing(format!(
                "no crontab at {}",
                crontab.display()
            )));
        }

        ctx.shell().command("crontab").arg(crontab.as_os_str()).output()?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{Environment, Shell};

    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn packages_are_visible_top_level_dirs() -> anyhow::Result<()> {
        let dotfiles = std::env::current_dir()?.join("dotfiles");
        for dir in ["zsh/.config/zsh", "tmux", ".git/objects", "nvim", ".hidden"] {
            std::fs::create_dir_all(dotfiles.join(dir))?;
        }
        std::fs::write(dotfiles.join("crontab"), "* * * * * true\n")?;
        std::fs::write(dotfiles.join(".gitignore"), "tmux\n")?;

        assert_eq!(stow_packages(&dotfiles)?, vec!["nvim", "tmux", "zsh"]);

        Ok(())
    }

    #[sealed_test]
    fn missing_crontab_fails_without_running_anything() -> anyhow::Result<()> {
        let ctx = Context::new(Shell::new(Environment::capture()));
        let dir = std::env::current_dir()?;

        let result = install_crontab(&ctx, &dir);
        assert!(matches!(result, Err(InstallError::Missing(_))));
        assert_eq!(ctx.depth(), 0);

        Ok(())
    }
}
