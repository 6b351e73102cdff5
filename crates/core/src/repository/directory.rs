//! Repository stored as a plain directory tree
//!
//! Layout:
//!
//! ```text
//! <root>/<component>/<version>/component-descriptor.json
//! <root>/<component>/<version>/<access.localPath>
//! ```

use super::{ComponentVersion, Repository, ResourceDescriptor};
use crate::error::{Error, Result, ResultExt};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DESCRIPTOR_FILE: &str = "component-descriptor.json";

#[derive(Debug, Clone)]
pub struct DirectoryRepository {
    root: PathBuf,
}

impl DirectoryRepository {
    /// Open an existing repository directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Resolution(format!(
                "cannot get repository: {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// Create the repository directory if needed
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn component_dir(&self, component: &str) -> PathBuf {
        self.root.join(component)
    }

    fn version_dir(&self, component: &str, version: &str) -> PathBuf {
        self.component_dir(component).join(version)
    }

    /// Store a component version together with the blobs its resources
    /// reference by local path
    pub fn publish(&self, cv: &ComponentVersion, blobs: &[(&str, &[u8])]) -> Result<()> {
        let dir = self.version_dir(&cv.name, &cv.version);
        std::fs::create_dir_all(&dir)?;
        for (name, content) in blobs {
            std::fs::write(dir.join(name), content)?;
        }
        let data = serde_json::to_vec_pretty(cv)?;
        std::fs::write(dir.join(DESCRIPTOR_FILE), data)?;
        debug!("published {} in {}", cv.key(), self.root.display());
        Ok(())
    }
}

impl Repository for DirectoryRepository {
    fn list_versions(&self, component: &str) -> Result<Vec<String>> {
        let dir = self.component_dir(component);
        if !dir.is_dir() {
            return Err(Error::Resolution(format!(
                "component {component} not found in {}",
                self.root.display()
            )));
        }

        let mut versions = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.path().join(DESCRIPTOR_FILE).is_file() {
                versions.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(versions)
    }

    fn lookup(&self, component: &str, version: &str) -> Result<ComponentVersion> {
        let path = self.version_dir(component, version).join(DESCRIPTOR_FILE);
        if !path.is_file() {
            return Err(Error::Resolution(format!(
                "component version {component}:{version} not found in {}",
                self.root.display()
            )));
        }
        let data = std::fs::read(&path)?;
        let cv: ComponentVersion = serde_json::from_slice(&data)
            .map_err(|e| Error::Decode(format!("invalid component descriptor {}: {e}", path.display())))?;
        Ok(cv)
    }

    fn fetch(&self, cv: &ComponentVersion, resource: &ResourceDescriptor) -> Result<Vec<u8>> {
        let access = resource.access.as_ref().ok_or_else(|| {
            Error::Transport(format!(
                "resource {:?} of {} has no local access",
                resource.name,
                cv.key()
            ))
        })?;
        let path = self.version_dir(&cv.name, &cv.version).join(&access.local_path);
        std::fs::read(&path)
            .map_err(|e| Error::Transport(format!("cannot read {}: {e}", path.display())))
            .with_context(|| format!("cannot download resource {}", resource.name))
    }
}
