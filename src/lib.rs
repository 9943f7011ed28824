// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Provision a personal development workstation.
//!
//! Deskup installs packages, toolchains, and desktop tweaks, then links
//! dotfiles into the home directory with GNU stow. Two pieces carry the
//! weight:
//!
//! - The [configuration store](store::ConfigStore), which asks the user for
//!   values only when they are first needed.
//! - The [installer wrapper](install::Installer), which skips any step whose
//!   goal already holds, so deskup can be run again and again.

pub mod config;
pub mod github;
pub mod inspect;
pub mod install;
pub mod path;
pub mod prompt;
pub mod shell;
pub mod store;
