//! Plugin specifications: how to obtain one plugin executable
//!
//! In a build file the origin of a plugin is given by a handful of inline
//! fields (`executable`, `pluginRef`, `repository`, `component`, `version`,
//! `resource`). Only a few combinations make sense; they are validated once
//! when the build file is decoded and represented by [`PluginSpec`].

pub mod hash_id;

use crate::error::{Error, Result};
use crate::repository::{RepositorySpec, parse_ref, parse_repo};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub use hash_id::HashId;

/// Where the repository of a repository-mode plugin comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryRef {
    /// Literal string form, parsed with the compact reference grammar
    Ref(String),
    /// `{"name": "<alias>"}`, looked up in the configured repositories
    Named(String),
    /// Typed repository configuration
    Config(RepositorySpec),
}

impl RepositoryRef {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(RepositoryRef::Ref(s)),
            Value::Object(map) if map.len() == 1 && map.contains_key("name") => match map.get("name") {
                Some(Value::String(name)) => Ok(RepositoryRef::Named(name.clone())),
                _ => Err(Error::Specification("repository name must be a string".to_string())),
            },
            Value::Object(map) => serde_json::from_value(Value::Object(map))
                .map(RepositoryRef::Config)
                .map_err(|e| Error::Specification(format!("invalid repository spec: {e}"))),
            other => Err(Error::Specification(format!(
                "repository must be a reference string or a config object, found {other}"
            ))),
        }
    }

}

impl Serialize for RepositoryRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            RepositoryRef::Ref(s) => serializer.serialize_str(s),
            RepositoryRef::Named(name) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("name", name)?;
                map.end()
            }
            RepositoryRef::Config(spec) => spec.serialize(serializer),
        }
    }
}

/// The validated origin of a plugin executable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawPluginSpec")]
pub enum PluginSpec {
    /// Local executable, relative paths are taken from the build file directory
    Executable { path: PathBuf },
    /// Compact reference naming repository, component and optionally version
    Reference {
        reference: String,
        resource: Option<String>,
    },
    /// Explicit repository plus component coordinates
    Repository {
        repository: RepositoryRef,
        component: Option<String>,
        version: Option<String>,
        resource: Option<String>,
    },
}

/// Repository origin before alias lookup and path resolution
#[derive(Debug, Clone, PartialEq, Eq)]
enum RepositorySource {
    Spec(RepositorySpec),
    Named(String),
}

/// Repository and partial identity a non-executable plugin is resolved from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginTarget {
    pub repository: RepositorySpec,
    pub id: HashId,
}

impl PluginSpec {
    pub fn executable(path: impl Into<PathBuf>) -> Self {
        PluginSpec::Executable { path: path.into() }
    }

    /// Repository and partial identity for reference and repository mode,
    /// `None` for a local executable.
    ///
    /// Relative directory repositories are resolved against `base`, aliases
    /// against `named`.
    pub fn target(
        &self,
        base: &Path,
        named: &BTreeMap<String, RepositorySpec>,
    ) -> Result<Option<PluginTarget>> {
        let Some((source, id)) = self.parts()? else {
            return Ok(None);
        };
        let repository = match source {
            RepositorySource::Spec(spec) => spec,
            RepositorySource::Named(name) => named.get(&name).cloned().ok_or_else(|| {
                Error::Specification(format!("unknown repository {name:?}"))
            })?,
        };
        Ok(Some(PluginTarget {
            repository: repository.resolved(base),
            id,
        }))
    }

    fn parts(&self) -> Result<Option<(RepositorySource, HashId)>> {
        match self {
            PluginSpec::Executable { .. } => Ok(None),
            PluginSpec::Reference {
                reference,
                resource,
            } => {
                let spec = parse_ref(reference)?;
                let component = spec.component.clone().ok_or_else(|| {
                    Error::Specification(format!("reference {reference:?} names no component"))
                })?;
                let repository = RepositorySpec::from_uniform(&spec.repository)?;
                Ok(Some((
                    RepositorySource::Spec(repository),
                    HashId::new(
                        component,
                        spec.version.unwrap_or_default(),
                        resource.clone().unwrap_or_default(),
                    ),
                )))
            }
            PluginSpec::Repository {
                repository,
                component,
                version,
                resource,
            } => {
                let mut id = HashId::new(
                    component.clone().unwrap_or_default(),
                    version.clone().unwrap_or_default(),
                    resource.clone().unwrap_or_default(),
                );
                let source = match repository {
                    RepositoryRef::Ref(s) if s.contains("//") => {
                        let spec = parse_ref(s)?;
                        if let Some(ref_component) = spec.component {
                            if component.is_some() {
                                return Err(Error::Specification(
                                    "component not required for given component reference in repository field"
                                        .to_string(),
                                ));
                            }
                            id.component = ref_component;
                            if let Some(ref_version) = spec.version {
                                if version.is_some() {
                                    return Err(Error::Specification(
                                        "version not required for given version reference in repository field"
                                            .to_string(),
                                    ));
                                }
                                id.version = ref_version;
                            }
                        }
                        RepositorySource::Spec(RepositorySpec::from_uniform(&spec.repository)?)
                    }
                    RepositoryRef::Ref(s) => {
                        RepositorySource::Spec(RepositorySpec::from_uniform(&parse_repo(s)?)?)
                    }
                    RepositoryRef::Named(name) => RepositorySource::Named(name.clone()),
                    RepositoryRef::Config(spec) => RepositorySource::Spec(spec.clone()),
                };
                if id.component.is_empty() {
                    return Err(Error::Specification(
                        "component required for repository based plugin".to_string(),
                    ));
                }
                Ok(Some((source, id)))
            }
        }
    }
}

impl fmt::Display for PluginSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginSpec::Executable { path } => write!(f, "{}", path.display()),
            PluginSpec::Reference {
                reference,
                resource,
            } => match resource {
                Some(resource) => write!(f, "{reference}[{resource}]"),
                None => write!(f, "{reference}"),
            },
            PluginSpec::Repository {
                repository,
                component,
                version,
                resource,
            } => {
                match repository {
                    RepositoryRef::Ref(s) => write!(f, "{s}")?,
                    RepositoryRef::Named(name) => write!(f, "@{name}")?,
                    RepositoryRef::Config(spec) => write!(f, "{spec}")?,
                }
                if let Some(component) = component {
                    write!(f, "//{component}")?;
                }
                if let Some(version) = version {
                    write!(f, ":{version}")?;
                }
                if let Some(resource) = resource {
                    write!(f, "[{resource}]")?;
                }
                Ok(())
            }
        }
    }
}

/// The inline plugin fields as they appear in a build file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPluginSpec {
    #[serde(default)]
    pub plugin_ref: Option<String>,
    #[serde(default)]
    pub repository: Option<Value>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub executable: Option<String>,
}

/// Borrowed inline fields written back for a validated spec
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineFields<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    plugin_ref: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repository: Option<&'a RepositoryRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    component: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    executable: Option<&'a Path>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

impl TryFrom<RawPluginSpec> for PluginSpec {
    type Error = Error;

    fn try_from(raw: RawPluginSpec) -> Result<Self> {
        let plugin_ref = non_empty(raw.plugin_ref);
        let component = non_empty(raw.component);
        let version = non_empty(raw.version);
        let resource = non_empty(raw.resource);
        let executable = non_empty(raw.executable);
        let repository = raw.repository.filter(|v| !v.is_null());

        if let Some(path) = executable {
            let conflicts = [
                ("reference", plugin_ref.is_some()),
                ("repository", repository.is_some()),
                ("component", component.is_some()),
                ("version", version.is_some()),
                ("resource", resource.is_some()),
            ];
            if let Some((field, _)) = conflicts.iter().find(|(_, set)| *set) {
                return Err(Error::Specification(format!(
                    "for an executable no {field} required"
                )));
            }
            return Ok(PluginSpec::Executable {
                path: PathBuf::from(path),
            });
        }

        let spec = match (plugin_ref, repository) {
            (None, None) => {
                return Err(Error::Specification(
                    "repository, reference or executable required".to_string(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(Error::Specification(
                    "either repository, reference or executable required".to_string(),
                ));
            }
            (Some(reference), None) => {
                if component.is_some() || version.is_some() {
                    return Err(Error::Specification(
                        "component or version not required for reference".to_string(),
                    ));
                }
                PluginSpec::Reference {
                    reference,
                    resource,
                }
            }
            (None, Some(value)) => PluginSpec::Repository {
                repository: RepositoryRef::from_value(value)?,
                component,
                version,
                resource,
            },
        };

        spec.parts()?;
        Ok(spec)
    }
}

impl Serialize for PluginSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let fields = match self {
            PluginSpec::Executable { path } => InlineFields {
                plugin_ref: None,
                repository: None,
                component: None,
                version: None,
                resource: None,
                executable: Some(path),
            },
            PluginSpec::Reference {
                reference,
                resource,
            } => InlineFields {
                plugin_ref: Some(reference),
                repository: None,
                component: None,
                version: None,
                resource: resource.as_deref(),
                executable: None,
            },
            PluginSpec::Repository {
                repository,
                component,
                version,
                resource,
            } => InlineFields {
                plugin_ref: None,
                repository: Some(repository),
                component: component.as_deref(),
                version: version.as_deref(),
                resource: resource.as_deref(),
                executable: None,
            },
        };
        fields.serialize(serializer)
    }
}
