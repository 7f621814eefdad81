//! Admission rules for submitted scripts and commands.
//!
//! Validation is a pure function of the request and the [`RunnerConfig`]; it
//! never starts a process. Accepted requests come back as an argument vector
//! that is executed directly, never through a shell.

use crate::config::RunnerConfig;
use crate::errors::Rejection;
use crate::events::Mode;
use crate::types::Args;
use nix::unistd::{access, AccessFlags};
use std::path::{Component, Path, PathBuf};
use std::{env, result};

pub type Result<T> = result::Result<T, Rejection>;

/// Validate a raw `mode` and `value` pair.
pub fn validate(mode: &str, value: &str, config: &RunnerConfig) -> Result<(Mode, Args)> {
    let mode: Mode = mode.parse()?;
    let args = match mode {
        Mode::Script => validate_script(value, config)?,
        Mode::Command => validate_command(value, config)?,
    };
    Ok((mode, args))
}

pub fn validate_script(value: &str, config: &RunnerConfig) -> Result<Args> {
    let path = resolve(Path::new(value));
    let root = resolve(&config.allowed_script_root);
    if !path.starts_with(&root) {
        return Err(Rejection::PathNotAllowed);
    }
    if !path.is_file() {
        return Err(Rejection::NotAFile);
    }
    if access(&path, AccessFlags::X_OK).is_err() {
        return Err(Rejection::NotExecutable);
    }
    Ok(vec![path.to_string_lossy().into_owned()])
}

pub fn validate_command(value: &str, config: &RunnerConfig) -> Result<Args> {
    let raw = value.trim();
    if raw.is_empty() {
        return Err(Rejection::EmptyCommand);
    }
    if !config.allow_arbitrary_command
        && !config
            .command_whitelist
            .iter()
            .any(|prefix| raw.starts_with(prefix.as_str()))
    {
        return Err(Rejection::CommandNotAllowed);
    }
    split_words(raw)
}

fn split_words(raw: &str) -> Result<Args> {
    match shlex::split(raw) {
        Some(words) if !words.is_empty() => Ok(words),
        Some(_) => Err(Rejection::MalformedCommand("no words to run".into())),
        None => Err(Rejection::MalformedCommand("unbalanced quoting".into())),
    }
}

/// Make `path` absolute and resolve symlinks where it exists. Paths that do
/// not exist are normalized lexically so `..` cannot climb out of the root.
fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    absolute
        .canonicalize()
        .unwrap_or_else(|_| normalize(&absolute))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
