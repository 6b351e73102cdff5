//! The parsed build description
//!
//! A build file lists global build steps and components, each with its own
//! ordered build steps. It is read once per run and never changed afterwards.

use crate::error::{Error, Result, ResultExt};
use crate::meta::{Label, Provider};
use crate::plugin::{PluginSpec, RawPluginSpec};
use crate::template::Templater;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildFile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    /// Default version for components without their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub builds: Vec<Build>,
    #[serde(default)]
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub builds: Vec<Build>,
}

/// One build step: a plugin and its opaque configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBuild")]
pub struct Build {
    #[serde(flatten)]
    pub plugin: PluginSpec,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct RawBuild {
    #[serde(flatten)]
    plugin: RawPluginSpec,
    #[serde(default)]
    config: Value,
}

impl TryFrom<RawBuild> for Build {
    type Error = Error;

    fn try_from(raw: RawBuild) -> Result<Self> {
        Ok(Build {
            plugin: PluginSpec::try_from(raw.plugin)?,
            config: raw.config,
        })
    }
}

impl Build {
    pub fn new(plugin: PluginSpec, config: Value) -> Self {
        Self { plugin, config }
    }
}

impl BuildFile {
    /// Decode a build file document (YAML or JSON)
    pub fn parse(data: &str) -> Result<Self> {
        serde_yaml::from_str(data).map_err(|e| Error::Decode(format!("cannot decode build file: {e}")))
    }

    /// Read, template and decode a build file
    pub fn load(path: &Path, templater: &dyn Templater) -> Result<Self> {
        debug!("loading build file {:?}", path);
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read build file {}", path.display()))?;
        let data = templater
            .process(&data)
            .with_context(|| format!("cannot template build file {}", path.display()))?;
        Self::parse(&data)
    }

    /// The default component version, if any
    pub fn default_version(&self) -> Option<&str> {
        self.version.as_deref().filter(|v| !v.is_empty())
    }
}

impl Component {
    /// Own version, falling back to the build file default
    pub fn effective_version<'a>(&'a self, default: Option<&'a str>) -> Option<&'a str> {
        self.version.as_deref().filter(|v| !v.is_empty()).or(default)
    }

    /// `name:version` key used in diagnostics
    pub fn key(&self, default: Option<&str>) -> String {
        match self.effective_version(default) {
            Some(version) => format!("{}:{}", self.name, version),
            None => self.name.clone(),
        }
    }

    /// Whether the component is selected by a list of `name` or
    /// `name:version` filters. An empty list selects everything.
    pub fn is_selected(&self, filters: &[String], default: Option<&str>) -> bool {
        if filters.is_empty() {
            return true;
        }
        filters.iter().any(|filter| match filter.split_once(':') {
            None => filter == &self.name,
            Some((name, version)) => {
                name == self.name && self.effective_version(default) == Some(version)
            }
        })
    }
}
