//! Command line arguments in plugin configurations
//!
//! An argument is either a plain string or an object with exactly one of
//! `path` (resolved against the build file directory) or `pkgpath` (like
//! `path`, but a relative result always starts with `./`).

use crate::error::{Error, Result};
use crate::state::Environment;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    Plain(String),
    Path {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        pkgpath: Option<String>,
    },
}

impl Arg {
    pub fn resolve(&self, env: &Environment) -> Result<String> {
        match self {
            Arg::Plain(s) => Ok(s.clone()),
            Arg::Path {
                path: Some(_),
                pkgpath: Some(_),
            } => Err(Error::Config("either path or pkgpath must be set".to_string())),
            Arg::Path {
                path: None,
                pkgpath: None,
            } => Err(Error::Config("path or pkgpath must be set".to_string())),
            Arg::Path {
                path: Some(path), ..
            } => Ok(env.path(path).to_string_lossy().into_owned()),
            Arg::Path {
                pkgpath: Some(path),
                ..
            } => Ok(package_path(env.path(path)).to_string_lossy().into_owned()),
        }
    }
}

fn package_path(path: PathBuf) -> PathBuf {
    if path.is_absolute() || matches!(path.components().next(), Some(Component::CurDir)) {
        return path;
    }
    Path::new(".").join(path)
}

/// Decode a single argument
pub fn parse_arg(env: &Environment, value: &Value) -> Result<String> {
    let arg: Arg = serde_json::from_value(value.clone())
        .map_err(|_| Error::Config(format!("invalid argument {value}")))?;
    arg.resolve(env)
}

/// Decode a single argument or a list of arguments
pub fn parse_args(env: &Environment, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                parse_arg(env, item).map_err(|e| e.context(format!("argument {}", i + 1)))
            })
            .collect(),
        Value::String(_) | Value::Object(_) => Ok(vec![parse_arg(env, value)?]),
        _ => Err(Error::Config(
            "simple arg or list of args required".to_string(),
        )),
    }
}
