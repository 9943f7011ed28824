// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package manager installers.
//!
//! None of these carry a precondition. The package managers themselves are
//! already idempotent about installed packages.

use crate::install::{Context, Installer, Result, Signature};

/// Install `packages` through apt.
///
/// # Errors
///
/// - Return [`crate::install::InstallError::Shell`] if apt fails.
pub fn apt_install(ctx: &Context, packages: &[&str]) -> Result<()> {
    let signature = Signature::new().arg("packages", packages.to_vec());
    Installer::new("apt_install").run(ctx, &signature, || -> Result<()> {
        ctx.shell()
            .command("sudo")
            .args(["apt", "install", "-y"])
            .args(packages)
            .stdin("\n")
            .stream()?;
        Ok(())
    })?;

    Ok(())
}

/// Extra channels and confinement options of a snap install.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SnapFlags {
    /// Install without strict confinement.
    pub classic: bool,

    pub beta: bool,
    pub edge: bool,
}

impl SnapFlags {
    pub fn classic() -> Self {
        Self {
            classic: true,
            ..Default::default()
        }
    }

    pub fn beta() -> Self {
        Self {
            beta: true,
            ..Default::default()
        }
    }

    fn args(&self) -> Vec<&'static str> {
        let mut args = Vec::new();
        if self.classic {
            args.push("--classic");
        }
        if self.beta {
            args.push("--beta");
        }
        if self.edge {
            args.push("--edge");
        }
        args
    }
}

/// Install `package` through snap.
///
/// # Errors
///
/// - Return [`crate::install::InstallError::Shell`] if snap fails.
pub fn snap_install(ctx: &Context, package: &str, flags: SnapFlags) -> Result<()> {
    let signature = Signature::new()
        .arg("package", package)
        .arg("classic", flags.classic)
        .arg("beta", flags.beta)
        .arg("edge", flags.edge);
    Installer::new("snap_install").run(ctx, &signature, || -> Result<()> {
        ctx.shell()
            .command("sudo")
            .args(["snap", "install", package])
            .args(flags.args())
            .stdin("\n")
            .stream()?;
        Ok(())
    })?;

    Ok(())
}

/// Install `packages` through pip of the system Python.
///
/// # Errors
///
/// - Return [`crate::install::InstallError::Shell`] if pip fails.
pub fn pip_install(ctx: &Context, packages: &[&str]) -> Result<()> {
    let signature = Signature::new().arg("packages", packages.to_vec());
    Installer::new("pip_install").run(ctx, &signature, || -> Result<()> {
        ctx.shell()
            .command("python3")
            .args(["-m", "pip", "install"])
            .args(packages)
            .stream()?;
        Ok(())
    })?;

    Ok(())
}

/// Register apt repository `repo`, e.g., a PPA.
///
/// # Errors
///
/// - Return [`crate::install::InstallError::Shell`] if the repository cannot
///   be added.
pub fn add_apt_repository(ctx: &Context, repo: &str) -> Result<()> {
    let signature = Signature::new().arg("repo", repo);
    Installer::new("add_apt_repository").run(ctx, &signature, || -> Result<()> {
        ctx.shell()
            .command("sudo")
            .args(["add-apt-repository", "-y", repo])
            .stream()?;
        Ok(())
    })?;

    Ok(())
}
