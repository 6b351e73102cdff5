//! Access to component repositories hosting build plugins
//!
//! A repository stores component versions. Each component version lists
//! resources; build plugins are resources of type [`PLUGIN_RESOURCE_TYPE`]
//! whose extra identity names the operating system and architecture they
//! were built for.

pub mod directory;
pub mod reference;

use crate::error::{Error, Result};
use crate::utils::resolve_path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub use directory::DirectoryRepository;
pub use reference::{RefSpec, UniformRepositorySpec, parse_ref, parse_repo};

/// Resource type marking an executable build plugin
pub const PLUGIN_RESOURCE_TYPE: &str = "pipewright.dev/buildplugin";

/// Extra identity key for the target operating system
pub const OS_IDENTITY: &str = "os";

/// Extra identity key for the target CPU architecture
pub const ARCH_IDENTITY: &str = "architecture";

/// Typed repository configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RepositorySpec {
    #[serde(alias = "dir")]
    Directory { path: PathBuf },
}

impl RepositorySpec {
    /// Map the repository part of a parsed reference to a typed spec
    pub fn from_uniform(spec: &UniformRepositorySpec) -> Result<Self> {
        match spec.kind.as_deref() {
            None | Some("directory") | Some("dir") => Ok(RepositorySpec::Directory {
                path: PathBuf::from(&spec.location),
            }),
            Some(other) => Err(Error::Specification(format!(
                "unknown repository type {other:?} in {spec}"
            ))),
        }
    }

    /// Make relative locations absolute with respect to `base`
    pub fn resolved(&self, base: &Path) -> Self {
        match self {
            RepositorySpec::Directory { path } => RepositorySpec::Directory {
                path: resolve_path(base, path),
            },
        }
    }
}

impl fmt::Display for RepositorySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositorySpec::Directory { path } => write!(f, "directory::{}", path.display()),
        }
    }
}

/// Local access to a resource's content, relative to its component version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Access {
    pub local_path: String,
}

/// A resource as described by a component version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_identity: BTreeMap<String, String>,
    /// Hex SHA-256 of the resource content, if declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Access>,
}

impl ResourceDescriptor {
    pub fn is_plugin(&self) -> bool {
        self.kind == PLUGIN_RESOURCE_TYPE
    }
}

/// One version of a component with its resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentVersion {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
}

impl ComponentVersion {
    /// `name:version` key used in diagnostics
    pub fn key(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

/// Operating system and architecture a plugin binary must match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform of the running process, in the naming used by plugin
    /// resource identities
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            other => other,
        };
        Self::new(os, arch)
    }

    pub fn matches(&self, extra_identity: &BTreeMap<String, String>) -> bool {
        extra_identity.get(OS_IDENTITY).map(String::as_str) == Some(self.os.as_str())
            && extra_identity.get(ARCH_IDENTITY).map(String::as_str) == Some(self.arch.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// An opened component repository
pub trait Repository {
    /// All versions published for a component
    fn list_versions(&self, component: &str) -> Result<Vec<String>>;

    /// A concrete component version
    fn lookup(&self, component: &str, version: &str) -> Result<ComponentVersion>;

    /// The content of a resource of a component version
    fn fetch(&self, cv: &ComponentVersion, resource: &ResourceDescriptor) -> Result<Vec<u8>>;
}

/// Opens repositories from their specification.
///
/// Every call to [`RepositoryProvider::open`] is a round trip to the remote
/// side; the plugin cache avoids it whenever it can.
pub trait RepositoryProvider: Send + Sync {
    fn open(&self, spec: &RepositorySpec) -> Result<Box<dyn Repository>>;
}

/// Provider for the repository types bundled with pipewright
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRepositoryProvider;

impl RepositoryProvider for DefaultRepositoryProvider {
    fn open(&self, spec: &RepositorySpec) -> Result<Box<dyn Repository>> {
        match spec {
            RepositorySpec::Directory { path } => Ok(Box::new(DirectoryRepository::open(path)?)),
        }
    }
}
