//! Wire contract between the engine and plugin executables
//!
//! A plugin is called as `plugin <env-json> <step-index> <config-json>`. It
//! reads the current [`PipelineState`] as JSON from stdin and, on exit code
//! 0, writes the complete new state to stdout. Stderr is free form progress
//! output and is passed through to the user.

use crate::cache::Plugin;
use crate::error::{Error, Result};
use crate::state::{Environment, PipelineState};
use serde_json::Value;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use tracing::debug;

/// Whether a step belongs to the build file or to one component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepScope {
    Global,
    /// Index of the component entry in the pipeline state
    Component(usize),
}

impl StepScope {
    /// The integer passed on the command line; `-1` marks a global step
    pub fn to_wire(self) -> i64 {
        match self {
            StepScope::Global => -1,
            StepScope::Component(index) => index as i64,
        }
    }

    pub fn from_wire(value: i64) -> Result<Self> {
        match value {
            -1 => Ok(StepScope::Global),
            n if n >= 0 => Ok(StepScope::Component(n as usize)),
            n => Err(Error::Decode(format!("invalid component index {n}"))),
        }
    }

    pub fn parse(arg: &str) -> Result<Self> {
        let value = arg
            .trim()
            .parse::<i64>()
            .map_err(|e| Error::Decode(format!("invalid component index {arg:?}: {e}")))?;
        Self::from_wire(value)
    }

    pub fn index(self) -> Option<usize> {
        match self {
            StepScope::Global => None,
            StepScope::Component(index) => Some(index),
        }
    }
}

impl fmt::Display for StepScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepScope::Global => write!(f, "global"),
            StepScope::Component(index) => write!(f, "component {index}"),
        }
    }
}

/// Run one plugin step and return the state it produced
pub fn invoke(
    plugin: &Plugin,
    env: &Environment,
    scope: StepScope,
    config: &Value,
    state: &PipelineState,
) -> Result<PipelineState> {
    let env_json = serde_json::to_string(env)?;
    let config_json = serde_json::to_string(config)?;
    let input = serde_json::to_vec(state)?;

    let failed = |message: String| Error::Subprocess {
        plugin: plugin.to_string(),
        message,
    };

    debug!(
        "executing {} {} {} {}",
        plugin.path.display(),
        env_json,
        scope.to_wire(),
        config_json
    );
    let mut child = Command::new(&plugin.path)
        .arg(&env_json)
        .arg(scope.to_wire().to_string())
        .arg(&config_json)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| failed(format!("cannot start {}: {e}", plugin.path.display())))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| failed("stdin not available".to_string()))?;
    let writer = std::thread::spawn(move || stdin.write_all(&input));

    let output = child
        .wait_with_output()
        .map_err(|e| failed(format!("cannot wait for plugin: {e}")))?;

    match writer.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {
            debug!("plugin {} did not read its input state", plugin);
        }
        Ok(Err(e)) => return Err(failed(format!("cannot pass state: {e}"))),
        Err(_) => return Err(failed("state writer panicked".to_string())),
    }

    if !output.status.success() {
        return Err(failed(output.status.to_string()));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| Error::Decode(format!("invalid state returned by plugin {plugin}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_wire_encoding() {
        assert_eq!(StepScope::Global.to_wire(), -1);
        assert_eq!(StepScope::Component(3).to_wire(), 3);
        assert_eq!(StepScope::parse("-1").unwrap(), StepScope::Global);
        assert_eq!(StepScope::parse("0").unwrap(), StepScope::Component(0));
        assert!(StepScope::parse("-2").is_err());
        assert!(StepScope::parse("one").is_err());
    }

    #[test]
    fn test_missing_executable_is_subprocess_error() {
        let plugin = Plugin {
            path: "/nonexistent/pipewright-plugin".into(),
            id: None,
        };
        let env = Environment::new("/tmp", "/tmp/gen");
        let err = invoke(
            &plugin,
            &env,
            StepScope::Global,
            &Value::Null,
            &PipelineState::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Subprocess { .. }));
    }
}
