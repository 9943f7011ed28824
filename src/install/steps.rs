// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Catalog of installation steps.
//!
//! Each step wraps its body in an [`Installer`] whose precondition checks
//! for whatever the step provides, usually an executable. Steps receive
//! every configuration value they need as arguments, so a step never
//! triggers a prompt by itself.

use crate::{
    github::{GitHub, GitTag},
    install::{
        packages::{add_apt_repository, apt_install, pip_install},
        Context, InstallError, Installer, Outcome, Precondition, Result, Signature,
    },
    path::{git_dir, home_dir, libraries_dir, make_or_find},
    shell::Shell,
    store::Value,
};

use git2::Config;
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs::OpenOptions,
    path::{Path, PathBuf},
};
use tracing::instrument;

const CHROME_DEB: &str = "google-chrome-stable_current_amd64.deb";
const TEXLIVE_URL: &str = "mirror.ctan.org/systems/texlive/tlnet/install-tl-unx.tar.gz";
const PYENV_INSTALLER_URL: &str =
    "https://github.com/pyenv/pyenv-installer/raw/master/bin/pyenv-installer";
const ALACRITTY_TERMINFO_URL: &str =
    "https://raw.githubusercontent.com/alacritty/alacritty/master/extra/alacritty.info";

/// Install zsh and make it the login shell of the current user.
///
/// # Errors
///
/// - Return [`InstallError::Missing`] if `USER` is not set.
/// - Return [`InstallError::Shell`] if any command fails.
pub fn install_zsh(ctx: &Context) -> Result<Outcome<()>> {
    Installer::new("install_zsh")
        .skip_if(Precondition::executable("zsh"))
        .run(ctx, &Signature::new(), || -> Result<()> {
            apt_install(ctx, &["zsh"])?;

            let shell = ctx.shell();
            let zsh = shell
                .which("zsh")
                .ok_or_else(|| InstallError::Missing("zsh is not on PATH after install".into()))?;
            let user = shell
                .var("USER")
                .ok_or_else(|| InstallError::Missing("USER is not set".into()))?;
            shell
                .command("sudo")
                .arg("chsh")
                .arg("-s")
                .arg(zsh.as_os_str())
                .arg(user)
                .interactive()?;
            Ok(())
        })
}

/// Install Google Chrome from its upstream `.deb`.
pub fn install_chrome(ctx: &Context) -> Result<Outcome<()>> {
    Installer::new("install_chrome")
        .skip_if(Precondition::executable("google-chrome"))
        .run(ctx, &Signature::new(), || -> Result<()> {
            let tmp = std::env::temp_dir();
            let shell = ctx.shell();
            shell
                .command("wget")
                .arg(format!("https://dl.google.com/linux/direct/{CHROME_DEB}"))
                .current_dir(&tmp)
                .stream()?;
            shell
                .command("sudo")
                .args(["dpkg", "-i", CHROME_DEB])
                .current_dir(&tmp)
                .stream()?;
            Ok(())
        })
}

pub fn install_gnome_tweaks(ctx: &Context) -> Result<Outcome<()>> {
    Installer::new("install_gnome_tweaks")
        .skip_if(Precondition::executable("gnome-tweaks"))
        .run(ctx, &Signature::new(), || -> Result<()> {
            apt_install(ctx, &["gnome-tweak-tool"])
        })
}

/// Install the newest pandoc release `.deb` published on GitHub.
///
/// # Errors
///
/// - Return [`InstallError::GitHub`] if the release cannot be looked up.
/// - Return [`InstallError::Shell`] if download or install fails.
pub fn install_pandoc(ctx: &Context, github: &GitHub) -> Result<Outcome<()>> {
    Installer::new("install_pandoc")
        .skip_if(Precondition::executable("pandoc"))
        .run(ctx, &Signature::new(), || -> Result<()> {
            let asset = github.latest_release_asset("jgm", "pandoc", ".deb")?;
            ctx.log(format!(
                "found {}, downloading deb from {}",
                asset.release, asset.download_url
            ));

            let tmp = std::env::temp_dir();
            ctx.shell()
                .command("aria2c")
                .args([asset.download_url.as_str(), "-j", "10", "-x", "10"])
                .current_dir(&tmp)
                .stream()?;

            let deb = tmp.join(&asset.name).to_string_lossy().into_owned();
            apt_install(ctx, &[deb.as_str()])
        })
}

/// Install TeX Live through its network installer.
///
/// # Errors
///
/// - Return [`InstallError::Missing`] if the unpacked installer is not found.
/// - Return [`InstallError::Shell`] if any command fails.
pub fn install_tex(ctx: &Context) -> Result<Outcome<()>> {
    Installer::new("install_tex")
        .skip_if(Precondition::executable("latex"))
        .run(ctx, &Signature::new(), || -> Result<()> {
            let tmp = std::env::temp_dir();
            let shell = ctx.shell();
            shell.command("wget").arg(TEXLIVE_URL).current_dir(&tmp).stream()?;
            shell
                .command("tar")
                .args(["-xvf", "install-tl-unx.tar.gz"])
                .current_dir(&tmp)
                .stream()?;

            let directory = find_unpacked_dir(&tmp, "install-tl*")?;
            shell
                .command("sudo")
                .arg("--preserve-env=TEXLIVE_INSTALL_PREFIX,TEXLIVE_INSTALL_TEXDIR")
                .arg(directory.join("install-tl").as_os_str())
                .env("TEXLIVE_INSTALL_PREFIX", "/usr/local/texlive")
                .env("TEXLIVE_INSTALL_TEXDIR", "/usr/local/texlive/latest")
                .current_dir(&directory)
                .stdin("I\n")
                .stream()?;
            Ok(())
        })
}

fn find_unpacked_dir(parent: &Path, pattern: &str) -> Result<PathBuf> {
    let pattern = parent.join(pattern);
    for entry in glob::glob(&pattern.to_string_lossy())? {
        let entry = entry?;
        if entry.is_dir() {
            return Ok(entry);
        }
    }

    Err(InstallError::Missing(format!(
        "no directory matches {}",
        pattern.display()
    )))
}

/// Install pyenv, then reload the environment snapshot so pyenv is on
/// `PATH` for the steps after it.
///
/// The reload happens even when pyenv was already installed.
///
/// # Errors
///
/// - Return [`InstallError::Shell`] if install or reload fails.
pub fn install_pyenv(ctx: &Context) -> Result<Outcome<()>> {
    let outcome = Installer::new("install_pyenv")
        .skip_if(Precondition::executable("pyenv"))
        .run(ctx, &Signature::new(), || -> Result<()> {
            let shell = ctx.shell();
            let script = shell
                .command("wget")
                .args(["-O", "-", PYENV_INSTALLER_URL])
                .output()?;
            shell.command("bash").stdin(script).stream()?;
            Ok(())
        })?;

    ctx.shell().reload_environment()?;
    Ok(outcome)
}

/// Version of the system Python, e.g., "3.8.10".
///
/// # Errors
///
/// - Return [`InstallError::Shell`] if python3 cannot be run.
pub fn system_python_version(shell: &Shell) -> Result<String> {
    let version = shell
        .command("python3")
        .args(["-c", "import platform; print(platform.python_version())"])
        .output()?;
    Ok(version.trim().to_string())
}

fn signature_str<'sig>(signature: &'sig Signature, name: &str) -> Option<&'sig str> {
    match signature.get(name) {
        Some(Value::Str(value)) => Some(value.as_str()),
        _ => None,
    }
}

/// Register the system Python as pyenv version `system_venv_name`, and make
/// it the global default.
///
/// # Errors
///
/// - Return [`InstallError::Path`] if home directory is unknown.
/// - Return [`InstallError::Shell`] if any command fails.
pub fn install_pyenv_sys_python(ctx: &Context, system_venv_name: &str) -> Result<Outcome<()>> {
    let signature = Signature::new().arg("system_venv_name", system_venv_name);
    Installer::new("install_pyenv_sys_python")
        .skip_if(Precondition::predicate(|ctx, signature| {
            let Some(name) = signature_str(signature, "system_venv_name") else {
                return false;
            };
            ctx.shell()
                .command("pyenv")
                .arg("global")
                .output()
                .is_ok_and(|global| global.trim() == name)
        }))
        .run(ctx, &signature, || -> Result<()> {
            apt_install(ctx, &["python3-venv"])?;

            let shell = ctx.shell();
            let venv = home_dir()?.join(".pyenv").join("versions").join(system_venv_name);
            shell
                .command("python3")
                .args(["-m", "venv"])
                .arg(venv.as_os_str())
                .arg("--system-site-packages")
                .stream()?;

            shell.command("pyenv").args(["global", system_venv_name]).output()?;

            // INVARIANT: Shims for pip and python must exist before they are used.
            shell.command("pyenv").arg("rehash").output()?;

            shell
                .command("pip")
                .args(["install", "nbdime", "jupyter", "jupyterlab", "jupyter-console", "makey"])
                .env("PYENV_VERSION", system_venv_name)
                .stream()?;
            shell
                .command("nbdime")
                .args(["config-git", "--enable", "--global"])
                .env("PYENV_VERSION", system_venv_name)
                .output()?;
            Ok(())
        })
}

/// Locate conda usable from pyenv version `virtualenv_name`, if any.
///
/// Conda only counts as found if it actually runs in that version.
pub fn find_conda(shell: &Shell, virtualenv_name: Option<&str>) -> Option<PathBuf> {
    let conda = shell.which("conda")?;
    let mut probe = shell.command(conda.as_os_str()).arg("--version");
    if let Some(name) = virtualenv_name {
        probe = probe.env("PYENV_VERSION", name);
    }

    probe.succeeds().then_some(conda)
}

/// Check if `pyenv versions` output lists `name`.
fn lists_version(versions: &str, name: &str) -> bool {
    versions.lines().any(|line| line.contains(name))
}

/// Create pyenv virtualenv `virtualenv_name` on Python `python_version`
/// with a Jupyter based scientific stack.
///
/// An empty `python_version` means the system Python.
///
/// # Errors
///
/// - Return [`InstallError::Shell`] if any command fails.
pub fn install_development_virtualenv(
    ctx: &Context,
    python_version: &str,
    virtualenv_name: &str,
) -> Result<Outcome<()>> {
    let signature = Signature::new()
        .arg("python_version", python_version)
        .arg("virtualenv_name", virtualenv_name);
    Installer::new("install_development_virtualenv")
        .skip_if(Precondition::predicate(|ctx, signature| {
            let Some(name) = signature_str(signature, "virtualenv_name") else {
                return false;
            };
            ctx.shell()
                .command("pyenv")
                .arg("versions")
                .output()
                .is_ok_and(|versions| lists_version(&versions, name))
        }))
        .run(ctx, &signature, || -> Result<()> {
            apt_install(ctx, &["npm"])?;

            let shell = ctx.shell();
            let system_version = system_python_version(shell)?;
            let python_version = match python_version {
                "" => system_version.as_str(),
                version => version,
            };

            if python_version != system_version {
                ctx.log("installing Python version");
                shell
                    .command("pyenv")
                    .args(["install", python_version])
                    .env("PYTHON_CONFIGURE_OPTS", "--enable-shared")
                    .stream()?;
            }

            ctx.log("creating virtualenv");
            shell
                .command("pyenv")
                .args(["virtualenv", python_version, virtualenv_name])
                .stream()?;

            ctx.log("installing jupyter packages with pip");
            shell
                .command("pip")
                .args([
                    "install",
                    "jupyter",
                    "jupyterlab",
                    "matplotlib",
                    "ipympl",
                    "numpy-html",
                    "jupytex",
                    "numba",
                ])
                .env("PYENV_VERSION", virtualenv_name)
                .stream()?;

            match find_conda(shell, Some(virtualenv_name)) {
                Some(conda) => shell
                    .command(conda.as_os_str())
                    .args(["install", "scipy", "numpy"])
                    .env("PYENV_VERSION", virtualenv_name)
                    .interactive()?,
                None => shell
                    .command("pip")
                    .args(["install", "scipy", "numpy"])
                    .env("PYENV_VERSION", virtualenv_name)
                    .stream()?,
            }

            ctx.log("installing lab extensions");
            shell
                .command("jupyter")
                .args([
                    "labextension",
                    "install",
                    "@jupyter-widgets/jupyterlab-manager",
                    "jupyter-matplotlib",
                    "@agoose77/jupyterlab-markup",
                    "@jupyterlab/katex-extension",
                ])
                .env("PYENV_VERSION", virtualenv_name)
                .stream()?;
            Ok(())
        })
}

/// Open global git configuration file, creating it if missing.
fn global_git_config() -> Result<Config> {
    let path = home_dir()?.join(".gitconfig");
    OpenOptions::new().create(true).append(true).open(&path)?;
    Ok(Config::open(&path)?)
}

/// Set global git identity, enable git-lfs, and create `~/Git`.
///
/// # Errors
///
/// - Return [`InstallError::Git2`] if git configuration cannot be written.
/// - Return [`InstallError::Shell`] if git-lfs cannot be set up.
pub fn install_git_config(ctx: &Context, name: &str, email_address: &str) -> Result<Outcome<()>> {
    let signature = Signature::new()
        .arg("name", name)
        .arg("email_address", email_address);
    Installer::new("install_git_config").run(ctx, &signature, || -> Result<()> {
        let mut config = global_git_config()?;
        config.set_str("user.email", email_address)?;
        config.set_str("user.name", name)?;

        ctx.shell().command("git").args(["lfs", "install"]).output()?;
        git_dir()?;
        Ok(())
    })
}

/// Batch parameters for `gpg --gen-key`.
fn gpg_key_parameters(name: &str, email_address: &str, key_length: i64) -> String {
    format!(
        "Key-Type: RSA\nKey-Length: {key_length}\nName-Real: {name}\nName-Email: {email_address}\n%no-protection\n%commit\n"
    )
}

/// Find id of the newest secret key in `gpg --with-colons` listing.
fn signing_key_from_colons(listing: &str) -> Option<String> {
    listing
        .lines()
        .filter(|line| line.starts_with("sec:"))
        .filter_map(|line| line.split(':').nth(4))
        .filter(|key_id| !key_id.is_empty())
        .last()
        .map(Into::into)
}

/// Generate RSA key for `name <email_address>`, returning its armored public
/// key and key id.
#[instrument(skip(ctx, shell), level = "debug")]
fn create_gpg_key(
    ctx: &Context,
    shell: &Shell,
    name: &str,
    email_address: &str,
    key_length: i64,
) -> Result<(String, String)> {
    ctx.log("generating GPG key");
    shell
        .command("gpg")
        .args(["--batch", "--gen-key"])
        .stdin(gpg_key_parameters(name, email_address, key_length))
        .output()?;

    ctx.log("exporting GPG key");
    let listing = shell
        .command("gpg")
        .args(["--list-secret-keys", "--with-colons", email_address])
        .output()?;
    let signing_key = signing_key_from_colons(&listing)
        .ok_or_else(|| InstallError::Missing(format!("no GPG key for {email_address}")))?;
    let public_key = shell
        .command("gpg")
        .args(["--armor", "--export", signing_key.as_str()])
        .output()?;

    Ok((public_key, signing_key))
}

fn copy_to_clipboard(shell: &Shell, text: impl Into<String>) -> Result<()> {
    shell
        .command("xclip")
        .args(["-sel", "clip"])
        .stdin(text)
        .interactive()?;
    Ok(())
}

fn open_in_browser(shell: &Shell, urls: &[&str]) -> Result<()> {
    for url in urls {
        shell.command("google-chrome").arg(*url).interactive()?;
    }
    Ok(())
}

/// Create GPG signing key and SSH key, and open the pages to register them
/// with GitHub and GitLab. Each public key is put on the clipboard first.
///
/// # Errors
///
/// - Return [`InstallError::Shell`] if any command fails.
/// - Return [`InstallError::Git2`] if signing cannot be configured.
pub fn install_gnupg(
    ctx: &Context,
    name: &str,
    email_address: &str,
    key_length: i64,
) -> Result<Outcome<()>> {
    let signature = Signature::new()
        .arg("name", name)
        .arg("email_address", email_address)
        .arg("key_length", key_length);
    Installer::new("install_gnupg")
        .skip_if(Precondition::executable("gpg"))
        .run(ctx, &signature, || -> Result<()> {
            apt_install(ctx, &["gnupg"])?;

            let shell = ctx.shell();
            let (public_key, signing_key) =
                create_gpg_key(ctx, shell, name, email_address, key_length)?;
            copy_to_clipboard(shell, public_key)?;
            open_in_browser(
                shell,
                &["https://github.com/settings/gpg/new", "https://gitlab.com/profile/gpg_keys"],
            )?;

            let mut config = global_git_config()?;
            config.set_bool("commit.gpgsign", true)?;
            config.set_str("user.signingkey", &signing_key)?;

            let ssh_key = home_dir()?.join(".ssh").join("id_ed25519");
            shell
                .command("ssh-keygen")
                .args(["-t", "ed25519", "-C", email_address])
                .interactive()?;
            copy_to_clipboard(shell, std::fs::read_to_string(ssh_key.with_extension("pub"))?)?;
            open_in_browser(
                shell,
                &["https://github.com/settings/ssh/new", "https://gitlab.com/profile/keys"],
            )?;
            Ok(())
        })
}

/// Install locations and build variables of a Python interpreter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SysconfigData {
    pub paths: HashMap<String, String>,
    pub config_vars: HashMap<String, serde_json::Value>,
    pub executable: String,
}

impl SysconfigData {
    /// Query interpreter of pyenv version `virtualenv_name`.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::Shell`] if python cannot be run.
    /// - Return [`InstallError::Json`] if python prints something unexpected.
    pub fn query(shell: &Shell, virtualenv_name: &str) -> Result<Self> {
        let output = shell
            .command("python")
            .args([
                "-c",
                "import sysconfig, json, sys\n\
                 print(json.dumps({'paths': sysconfig.get_paths(),\n\
                 'config_vars': sysconfig.get_config_vars(),\n\
                 'executable': sys.executable}, default=str))",
            ])
            .env("PYENV_VERSION", virtualenv_name)
            .output()?;
        Ok(serde_json::from_str(&output)?)
    }

    fn config_var(&self, key: &str) -> Result<&str> {
        self.config_vars
            .get(key)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| InstallError::Missing(format!("python config variable {key} is not set")))
    }

    fn path(&self, key: &str) -> Result<&str> {
        self.paths
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| InstallError::Missing(format!("python path {key} is not set")))
    }

    /// CMake flags that point a ROOT build at this interpreter.
    pub fn cmake_flags(&self) -> Result<Vec<(&'static str, String)>> {
        let library = Path::new(self.config_var("LIBDIR")?).join(self.config_var("LDLIBRARY")?);
        Ok(vec![
            ("PYTHON_INCLUDE_DIR", self.path("include")?.to_string()),
            ("PYTHON_LIBRARY", library.to_string_lossy().into_owned()),
            ("PYTHON_EXECUTABLE", self.executable.clone()),
            ("python", "ON".into()),
            ("minuit2", "ON".into()),
        ])
    }
}

fn cmake_options(flags: &[(&str, String)]) -> Vec<String> {
    flags
        .iter()
        .map(|(flag, value)| format!("D{flag}={value}"))
        .collect()
}

/// Turn ROOT tag name like "v6-22-02" into version "6.22.02".
fn root_version(tag_name: &str) -> String {
    tag_name.replace('v', "").replace('-', ".")
}

/// Build ROOT at `tag` with makey, linked against pyenv version
/// `virtualenv_name`.
///
/// # Errors
///
/// - Return [`InstallError::Json`] or [`InstallError::Missing`] if the
///   virtualenv's Python cannot be described.
/// - Return [`InstallError::Shell`] if any command fails.
pub fn install_root_from_source(
    ctx: &Context,
    virtualenv_name: &str,
    n_threads: i64,
    tag: &GitTag,
) -> Result<Outcome<()>> {
    let signature = Signature::new()
        .arg("virtualenv_name", virtualenv_name)
        .arg("n_threads", n_threads)
        .arg("git_tag", tag.clone());
    Installer::new("install_root_from_source")
        .skip_if(Precondition::executable("root"))
        .run(ctx, &signature, || -> Result<()> {
            apt_install(
                ctx,
                &["libx11-dev", "libxpm-dev", "libxft-dev", "libxext-dev", "libpng-dev", "libjpeg-dev"],
            )?;

            let shell = ctx.shell();
            let sysconfig = SysconfigData::query(shell, virtualenv_name)?;
            let flags = sysconfig.cmake_flags()?;

            shell
                .command("makey")
                .arg(tag.tarball_url.as_str())
                .args(["-j".to_string(), n_threads.to_string()])
                .arg(format!("--version={}", root_version(&tag.name)))
                .args(["--verbose", "--copt"])
                .args(cmake_options(&flags))
                .current_dir(libraries_dir()?)
                .interactive()?;
            Ok(())
        })
}

/// Install ROOT from conda-forge with `conda`.
pub fn install_root_with_conda(ctx: &Context, conda: &Path, virtualenv_name: &str) -> Result<Outcome<()>> {
    let signature = Signature::new()
        .arg("conda", conda.to_path_buf())
        .arg("virtualenv_name", virtualenv_name);
    Installer::new("install_root_with_conda")
        .skip_if(Precondition::executable("root"))
        .run(ctx, &signature, || -> Result<()> {
            ctx.shell()
                .command(conda.as_os_str())
                .args(["install", "-c", "conda-forge", "root"])
                .env("PYENV_VERSION", virtualenv_name)
                .interactive()?;
            Ok(())
        })
}

/// Install the regolith desktop with its i3xrocks blocks.
///
/// # Errors
///
/// - Return [`InstallError::Shell`] if any command fails.
/// - Return [`InstallError::Io`] if blocks cannot be copied.
pub fn install_regolith(ctx: &Context) -> Result<Outcome<()>> {
    Installer::new("install_regolith")
        .skip_if(Precondition::executable("regolith-look"))
        .run(ctx, &Signature::new(), || -> Result<()> {
            add_apt_repository(ctx, "ppa:regolith-linux/release")?;
            apt_install(
                ctx,
                &[
                    "regolith-desktop",
                    "regolith-look-ayu-mirage",
                    "i3xrocks-battery",
                    "i3xrocks-cpu-usage",
                    "i3xrocks-media-player",
                    "i3xrocks-memory",
                    "i3xrocks-net-traffic",
                    "i3xrocks-temp",
                    "i3xrocks-time",
                    "i3xrocks-volume",
                    "i3xrocks-weather",
                    "i3xrocks-wifi",
                ],
            )?;
            pip_install(ctx, &["i3ipc"])?;

            // Theme is left to the dotfiles.
            let target = make_or_find(home_dir()?.join(".config/regolith/i3xrocks/conf.d"))?;
            for block in std::fs::read_dir("/etc/regolith/i3xrocks/conf.d")? {
                let block = block?.path();
                if let Some(name) = block.file_name() {
                    std::fs::copy(&block, target.join(name))?;
                }
            }
            Ok(())
        })
}

/// Install alacritty with its terminfo, and make it the default terminal.
pub fn install_alacritty(ctx: &Context) -> Result<Outcome<()>> {
    Installer::new("install_alacritty")
        .skip_if(Precondition::executable("alacritty"))
        .run(ctx, &Signature::new(), || -> Result<()> {
            add_apt_repository(ctx, "ppa:mmstick76/alacritty")?;
            apt_install(ctx, &["alacritty"])?;

            let tmp = std::env::temp_dir();
            let shell = ctx.shell();
            shell
                .command("wget")
                .arg(ALACRITTY_TERMINFO_URL)
                .current_dir(&tmp)
                .stream()?;
            shell
                .command("sudo")
                .args(["tic", "-xe", "alacritty,alacritty-direct", "alacritty.info"])
                .current_dir(&tmp)
                .output()?;

            let alacritty = shell.which("alacritty").ok_or_else(|| {
                InstallError::Missing("alacritty is not on PATH after install".into())
            })?;
            shell
                .command("sudo")
                .args(["update-alternatives", "--set", "x-terminal-emulator"])
                .arg(alacritty.as_os_str())
                .output()?;
            Ok(())
        })
}

/// Build and install singularity `version` from its release tarball.
pub fn install_singularity(ctx: &Context, version: &str) -> Result<Outcome<()>> {
    let signature = Signature::new().arg("singularity_version", version);
    Installer::new("install_singularity")
        .skip_if(Precondition::executable("singularity"))
        .run(ctx, &signature, || -> Result<()> {
            apt_install(ctx, &["golang-go"])?;
            apt_install(
                ctx,
                &[
                    "build-essential",
                    "libssl-dev",
                    "uuid-dev",
                    "libgpgme11-dev",
                    "squashfs-tools",
                    "libseccomp-dev",
                    "pkg-config",
                ],
            )?;

            let libraries = libraries_dir()?;
            let tarball = format!("singularity-{version}.tar.gz");
            let shell = ctx.shell();
            shell
                .command("wget")
                .arg(format!(
                    "https://github.com/sylabs/singularity/releases/download/v{version}/{tarball}"
                ))
                .current_dir(&libraries)
                .stream()?;
            shell
                .command("tar")
                .args(["-xzf", tarball.as_str()])
                .current_dir(&libraries)
                .output()?;

            let source = libraries.join("singularity");
            shell
                .command("./mconfig")
                .arg("--prefix=/opt/singularity")
                .current_dir(&source)
                .stream()?;
            shell
                .command("make")
                .args(["-C", "./builddir"])
                .current_dir(&source)
                .stream()?;
            shell
                .command("sudo")
                .args(["make", "-C", "./builddir", "install"])
                .current_dir(&source)
                .stream()?;
            Ok(())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[test_case("v6-22-02", "6.22.02"; "release tag")]
    #[test_case("v6-30-00-patches", "6.30.00.patches"; "patch branch tag")]
    #[test]
    fn root_version_from_tag(tag: &str, expect: &str) {
        assert_eq!(root_version(tag), expect);
    }

    #[test]
    fn signing_key_is_last_secret_key() {
        let listing = indoc! {"
            sec:u:4096:1:AAAA1111BBBB2222:1600000000:::u:::scESC:::+:::23::0:
            fpr:::::::::0123456789ABCDEF0123AAAA1111BBBB2222:
            uid:u::::1600000000::HASH::Jane Doe <jane@example.com>::::::::::0:
            ssb:u:4096:1:CCCC3333DDDD4444:1600000000::::::e:::+:::23:
            sec:u:4096:1:EEEE5555FFFF6666:1700000000:::u:::scESC:::+:::23::0:
        "};

        assert_eq!(signing_key_from_colons(listing), Some("EEEE5555FFFF6666".into()));
        assert_eq!(signing_key_from_colons("pub:u:4096:1:XXXX:"), None);
    }

    #[test]
    fn gpg_parameters_carry_identity() {
        let result = gpg_key_parameters("Jane Doe", "jane@example.com", 4096);
        let expect = indoc! {"
            Key-Type: RSA
            Key-Length: 4096
            Name-Real: Jane Doe
            Name-Email: jane@example.com
            %no-protection
            %commit
        "};
        assert_eq!(result, expect);
    }

    #[test]
    fn pyenv_versions_listing() {
        let versions = indoc! {"
              system
            * 3.8.10-system (set by /home/jane/.pyenv/version)
              miniconda3-latest
              miniconda3-latest/envs/sci
              sci
        "};

        assert!(lists_version(versions, "sci"));
        assert!(lists_version(versions, "3.8.10-system"));
        assert!(!lists_version(versions, "hep"));
    }

    #[test]
    fn sysconfig_to_cmake_options() -> anyhow::Result<()> {
        let data: SysconfigData = serde_json::from_str(indoc! {r#"
            {
                "paths": {"include": "/home/jane/.pyenv/versions/3.8.10/include/python3.8"},
                "config_vars": {
                    "LIBDIR": "/home/jane/.pyenv/versions/3.8.10/lib",
                    "LDLIBRARY": "libpython3.8.so",
                    "Py_ENABLE_SHARED": 1,
                    "ABIFLAGS": null
                },
                "executable": "/home/jane/.pyenv/versions/sci/bin/python"
            }
        "#})?;

        let result = cmake_options(&data.cmake_flags()?);
        let expect = vec![
            "DPYTHON_INCLUDE_DIR=/home/jane/.pyenv/versions/3.8.10/include/python3.8",
            "DPYTHON_LIBRARY=/home/jane/.pyenv/versions/3.8.10/lib/libpython3.8.so",
            "DPYTHON_EXECUTABLE=/home/jane/.pyenv/versions/sci/bin/python",
            "Dpython=ON",
            "Dminuit2=ON",
        ];
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn sysconfig_reports_missing_variables() -> anyhow::Result<()> {
        let data: SysconfigData = serde_json::from_str(
            r#"{"paths": {}, "config_vars": {"LIBDIR": "/usr/lib"}, "executable": "/usr/bin/python3"}"#,
        )?;

        let result = data.cmake_flags();
        assert!(matches!(result, Err(InstallError::Missing(message)) if message.contains("LDLIBRARY")));

        Ok(())
    }

    #[sealed_test]
    fn finds_unpacked_installer_dir() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        std::fs::write(cwd.join("install-tl-unx.tar.gz"), "")?;
        std::fs::create_dir(cwd.join("install-tl-20240312"))?;

        assert_eq!(
            find_unpacked_dir(&cwd, "install-tl*")?,
            cwd.join("install-tl-20240312")
        );
        assert!(matches!(
            find_unpacked_dir(&cwd, "texlive*"),
            Err(InstallError::Missing(_))
        ));

        Ok(())
    }
}
