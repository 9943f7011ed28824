// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use deskup::{
    config::Settings,
    inspect::inspect,
    install::{
        dotfiles::{install_crontab, stow_dotfiles},
        plan::{install_all, user_config},
        Context,
    },
    path::default_settings_path,
    prompt::InquirePrompter,
    shell::{Environment, Shell},
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "deskup [options] [<command>]",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to settings file.
    #[arg(short, long, value_name = "path")]
    pub settings: Option<PathBuf>,

    /// Directory of dotfiles to stow.
    #[arg(short, long, value_name = "dir")]
    pub dotfiles: Option<PathBuf>,

    /// Inspect configuration interactively when no command is given.
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    fn run(self) -> Result<()> {
        let settings_path = match self.settings {
            Some(path) => path,
            None => default_settings_path()?,
        };
        let settings = Settings::load(settings_path)?;
        let dotfiles = match self.dotfiles.or_else(|| settings.dotfiles.path.clone()) {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        let ctx = Context::new(Shell::new(Environment::capture()));

        match self.command {
            Some(Command::Install(opts)) => run_install(&ctx, &settings, opts),
            Some(Command::Stow) => {
                stow_dotfiles(&ctx, dotfiles)?;
                Ok(())
            }
            Some(Command::Crontab) => {
                install_crontab(&ctx, dotfiles)?;
                Ok(())
            }
            None => run_inspect(&ctx, &settings),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run every installer.
    #[command(override_usage = "deskup install [options]")]
    Install(InstallOptions),

    /// Stow each top-level directory of the dotfiles directory.
    Stow,

    /// Install crontab of the dotfiles directory.
    Crontab,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InstallOptions {
    /// Ask for all configuration up front rather than during installation.
    #[arg(short, long)]
    pub batch: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_install(ctx: &Context, settings: &Settings, opts: InstallOptions) -> Result<()> {
    let mut store = user_config(settings, ctx.shell(), InquirePrompter)?;
    if opts.batch {
        store.resolve_all()?;
    }

    install_all(&mut store, ctx)?;

    Ok(())
}

fn run_inspect(ctx: &Context, settings: &Settings) -> Result<()> {
    let mut store = user_config(settings, ctx.shell(), InquirePrompter)?;
    inspect(&mut store, &mut std::io::stdout())?;

    Ok(())
}
