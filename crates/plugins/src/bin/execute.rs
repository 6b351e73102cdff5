//! pipewright-execute: run a command line as build step

use pipewright_core::error::{Error, Result};
use pipewright_core::ppi::{Handler, Invocation, Plugin, PluginKind, parse_args};
use serde::Deserialize;
use serde_json::Value;
use std::process::{Command, Stdio};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const CONFIG_HELP: &str = "\
- cmd (list of args) command and command arguments

An arg is a plain string or an object:
- path: <path> a path relative to the build file directory
- pkgpath: <path> like path, a relative result is prefixed with ./
";

#[derive(Debug, Default, Deserialize)]
struct Config {
    #[serde(default)]
    cmd: Value,
}

struct ExecuteHandler;

impl Handler for ExecuteHandler {
    type Config = Config;

    fn handle(&self, invocation: &mut Invocation<Config>) -> Result<()> {
        let args = match &invocation.config.cmd {
            Value::Null => Vec::new(),
            cmd => parse_args(&invocation.env, cmd)?,
        };
        let Some((program, rest)) = args.split_first() else {
            return Err(Error::Config("at least a command name is required".to_string()));
        };

        eprintln!("{}", args.join(" "));
        let mut command = Command::new(program);
        command
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::from(std::io::stderr()))
            .stderr(Stdio::inherit());
        if !invocation.env.directory.as_os_str().is_empty() {
            command.current_dir(&invocation.env.directory);
        }
        debug!("running {:?}", command);

        let status = command
            .status()
            .map_err(|e| Error::Plugin(format!("execution failed: {program}: {e}")))?;
        if !status.success() {
            return Err(Error::Plugin(format!("execution failed: {program}: {status}")));
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    Plugin::new("pipewright-execute", PluginKind::Generic, ExecuteHandler)
        .with_config_help(CONFIG_HELP)
        .run(&args, std::io::stdin().lock(), std::io::stdout().lock())?;
    Ok(())
}
