//! Plugin side of the step protocol
//!
//! A build plugin implements [`Handler`] and hands its command line, stdin
//! and stdout to [`Plugin::run`]. Argument decoding, scope checks and state
//! transport are done here so plugins only deal with the state change.

pub mod args;

use crate::error::{Error, Result};
use crate::protocol::StepScope;
use crate::state::{ComponentSpec, Environment, PipelineState};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::io::{Read, Write};
use tracing::debug;

pub use args::{Arg, parse_arg, parse_args};

/// Which steps a plugin may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    ComponentOnly,
    GlobalOnly,
    Generic,
}

impl PluginKind {
    pub fn check(self, scope: StepScope) -> Result<()> {
        match (self, scope) {
            (PluginKind::ComponentOnly, StepScope::Global) => Err(Error::Plugin(
                "plugin can only be used for component builds".to_string(),
            )),
            (PluginKind::GlobalOnly, StepScope::Component(_)) => Err(Error::Plugin(
                "plugin can only be used for global builds".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::ComponentOnly => write!(f, "component builds only"),
            PluginKind::GlobalOnly => write!(f, "global builds only"),
            PluginKind::Generic => write!(f, "global and component builds"),
        }
    }
}

/// Everything a plugin gets for one step
#[derive(Debug, Clone)]
pub struct Invocation<C> {
    pub env: Environment,
    pub scope: StepScope,
    pub config: C,
    /// Incoming state; whatever it holds when the handler returns is the
    /// state of the next step
    pub state: PipelineState,
}

impl<C> Invocation<C> {
    /// The component entry this step builds, `None` for global steps
    pub fn component(&self) -> Option<&ComponentSpec> {
        self.scope.index().and_then(|i| self.state.components.get(i))
    }

    pub fn component_mut(&mut self) -> Option<&mut ComponentSpec> {
        self.scope.index().and_then(|i| self.state.components.get_mut(i))
    }
}

pub trait Handler {
    /// Step configuration; a `null` configuration yields the default
    type Config: DeserializeOwned + Default;

    fn handle(&self, invocation: &mut Invocation<Self::Config>) -> Result<()>;
}

/// Drives one plugin call
pub struct Plugin<H> {
    name: String,
    kind: PluginKind,
    config_help: String,
    handler: H,
}

impl<H: Handler> Plugin<H> {
    pub fn new(name: impl Into<String>, kind: PluginKind, handler: H) -> Self {
        Self {
            name: name.into(),
            kind,
            config_help: String::new(),
            handler,
        }
    }

    /// Describe the configuration in the `--help` output
    pub fn with_config_help(mut self, help: impl Into<String>) -> Self {
        self.config_help = help.into();
        self
    }

    pub fn usage(&self) -> String {
        let mut usage = format!(
            "Usage: {} <environment> <component index> <config>\n\n\
             Pipewright build plugin for {}.\n\n\
             The environment is a JSON object with the build file directory\n\
             (\"directory\") and the generation directory of the step (\"genDir\").\n\
             The component index addresses the component entry in the state,\n\
             -1 marks a global build step. The config is the JSON step\n\
             configuration from the build file.\n\n\
             The pipeline state is read from stdin and the new state is written\n\
             to stdout.\n",
            self.name, self.kind
        );
        if !self.config_help.is_empty() {
            usage.push_str("\nConfiguration:\n");
            usage.push_str(&self.config_help);
            if !self.config_help.ends_with('\n') {
                usage.push('\n');
            }
        }
        usage
    }

    /// Execute one step: `args` are the command line arguments without the
    /// program name
    pub fn run<R: Read, W: Write>(&self, args: &[String], mut input: R, mut output: W) -> Result<()> {
        if args.iter().any(|a| a == "--help" || a == "-h") {
            output.write_all(self.usage().as_bytes())?;
            return Ok(());
        }

        let [env, index, config] = args else {
            return Err(Error::Plugin(format!(
                "{}: expected 3 arguments <environment> <component index> <config>, got {}",
                self.name,
                args.len()
            )));
        };

        let env: Environment = serde_json::from_str(env)
            .map_err(|e| Error::Decode(format!("invalid environment: {e}")))?;
        let scope = StepScope::parse(index)?;
        self.kind.check(scope)?;
        let config = decode_config::<H::Config>(config)?;

        let mut data = Vec::new();
        input.read_to_end(&mut data)?;
        let state: PipelineState = serde_json::from_slice(&data)
            .map_err(|e| Error::Decode(format!("invalid pipeline state: {e}")))?;

        if let StepScope::Component(i) = scope {
            if i >= state.components.len() {
                return Err(Error::Plugin(format!(
                    "component index {} out of range, state has {} component(s)",
                    i,
                    state.components.len()
                )));
            }
        }

        debug!("{} running for {}", self.name, scope);
        let mut invocation = Invocation {
            env,
            scope,
            config,
            state,
        };
        self.handler.handle(&mut invocation)?;

        serde_json::to_writer(&mut output, &invocation.state)?;
        output.flush()?;
        Ok(())
    }
}

fn decode_config<C: DeserializeOwned + Default>(raw: &str) -> Result<C> {
    if raw.trim().is_empty() {
        return Ok(C::default());
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| Error::Decode(format!("invalid config: {e}")))?;
    if value.is_null() {
        return Ok(C::default());
    }
    serde_json::from_value(value).map_err(|e| Error::Decode(format!("invalid config: {e}")))
}
