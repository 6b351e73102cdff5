//! Artifact descriptors assembled for each component during a build

use crate::meta::{Identity, Label, Provider};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Anything with an identity that can be merged into a list by identity
pub trait Element {
    fn identity(&self) -> Identity;
}

/// Elements that remember the file they were described in
pub trait Artifact: Element {
    fn set_source_file(&mut self, path: &str);
}

fn identity_of(name: &str, extra: &BTreeMap<String, String>) -> Identity {
    let mut identity = extra.clone();
    identity.insert("name".to_string(), name.to_string());
    identity
}

/// The component descriptor entry being built for one component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ArtifactSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<ArtifactSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceSpec>,
    /// Descriptor fields pipewright does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ComponentSpec {
    pub fn key(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }

    pub fn resource(&self, name: &str) -> Option<&ArtifactSpec> {
        self.resources.iter().find(|r| r.name == name)
    }
}

/// A resource or source of a component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSpec {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_identity: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Input, access and other artifact fields interpreted by plugins only
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ArtifactSpec {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_extra_identity(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_identity.insert(key.into(), value.into());
        self
    }
}

impl Element for ArtifactSpec {
    fn identity(&self) -> Identity {
        identity_of(&self.name, &self.extra_identity)
    }
}

impl Artifact for ArtifactSpec {
    fn set_source_file(&mut self, path: &str) {
        self.source_file = Some(path.to_string());
    }
}

/// A reference to another component version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSpec {
    pub name: String,
    #[serde(default)]
    pub component_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_identity: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Element for ReferenceSpec {
    fn identity(&self) -> Identity {
        identity_of(&self.name, &self.extra_identity)
    }
}
