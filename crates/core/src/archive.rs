//! Output archive receiving the components assembled by a build

use crate::error::{Error, Result, ResultExt};
use crate::state::ComponentSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CONSTRUCTOR_FILE: &str = "component-constructor.json";

/// Receives the final component list of a build
pub trait ArchiveWriter {
    /// Fail before any step runs if the archive cannot be written later
    fn check(&self) -> Result<()>;

    /// Store the components; `origin` is the build file they came from
    fn write(&self, origin: &Path, components: &[ComponentSpec]) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ArchiveContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin: Option<PathBuf>,
    #[serde(default)]
    components: Vec<ComponentSpec>,
}

/// Archive kept as a directory with a component constructor document.
///
/// Writing into an existing archive replaces components with the same
/// `name:version` and keeps all others.
#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    path: PathBuf,
    create: bool,
    force: bool,
}

impl DirectoryArchive {
    pub fn new(path: impl Into<PathBuf>, create: bool, force: bool) -> Self {
        Self {
            path: path.into(),
            create,
            force,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn constructor_path(&self) -> PathBuf {
        self.path.join(CONSTRUCTOR_FILE)
    }

    fn load(&self) -> Result<ArchiveContent> {
        let path = self.constructor_path();
        if !path.exists() {
            return Ok(ArchiveContent::default());
        }
        let data = std::fs::read(&path)?;
        serde_json::from_slice(&data)
            .map_err(|e| Error::Archive(format!("invalid archive content {}: {e}", path.display())))
    }

    fn store(&self, origin: &Path, components: &[ComponentSpec]) -> Result<()> {
        let mut content = self.load()?;
        content.origin = Some(origin.to_path_buf());
        for component in components {
            match content
                .components
                .iter()
                .position(|c| c.key() == component.key())
            {
                Some(index) => content.components[index] = component.clone(),
                None => content.components.push(component.clone()),
            }
        }
        std::fs::write(self.constructor_path(), serde_json::to_vec_pretty(&content)?)?;
        Ok(())
    }
}

impl ArchiveWriter for DirectoryArchive {
    fn check(&self) -> Result<()> {
        if !self.path.exists() && !self.create && !self.force {
            return Err(Error::Archive(format!(
                "archive {} does not exist, use create mode",
                self.path.display()
            )));
        }
        if self.path.exists() && !self.path.is_dir() && !self.force {
            return Err(Error::Archive(format!(
                "archive {} is no directory",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn write(&self, origin: &Path, components: &[ComponentSpec]) -> Result<()> {
        let mut create = self.create;
        if self.path.exists() && self.force {
            debug!("removing old archive {}", self.path.display());
            let removed = if self.path.is_dir() {
                std::fs::remove_dir_all(&self.path)
            } else {
                std::fs::remove_file(&self.path)
            };
            removed.with_context(|| format!("cannot remove old {:?}", self.path))?;
            create = true;
        }
        self.check()?;

        let fresh = create && !self.path.exists();
        std::fs::create_dir_all(&self.path)?;

        match self.store(origin, components) {
            Ok(()) => {
                info!(
                    "stored {} component(s) in archive {}",
                    components.len(),
                    self.path.display()
                );
                Ok(())
            }
            Err(err) => {
                if fresh {
                    if let Err(e) = std::fs::remove_dir_all(&self.path) {
                        warn!("cannot remove archive {}: {}", self.path.display(), e);
                    }
                }
                Err(err.context(format!("cannot update archive {}", self.path.display())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn component(name: &str, version: &str) -> ComponentSpec {
        ComponentSpec {
            name: name.to_string(),
            version: version.to_string(),
            ..Default::default()
        }
    }

    fn stored(archive: &DirectoryArchive) -> Vec<String> {
        archive
            .load()
            .unwrap()
            .components
            .iter()
            .map(ComponentSpec::key)
            .collect()
    }

    #[test]
    fn test_missing_archive_requires_create() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("build.ctf");

        let archive = DirectoryArchive::new(&path, false, false);
        assert!(matches!(archive.check(), Err(Error::Archive(_))));

        let archive = DirectoryArchive::new(&path, true, false);
        archive.check()?;
        archive.write(Path::new("BuildFile.yaml"), &[component("a", "1.0.0")])?;
        assert!(path.join(CONSTRUCTOR_FILE).is_file());
        Ok(())
    }

    #[test]
    fn test_existing_archive_is_updated() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("build.ctf");
        let origin = Path::new("BuildFile.yaml");

        DirectoryArchive::new(&path, true, false)
            .write(origin, &[component("a", "1.0.0"), component("b", "1.0.0")])?;
        let archive = DirectoryArchive::new(&path, false, false);
        archive.write(origin, &[component("b", "1.0.0"), component("c", "1.0.0")])?;
        assert_eq!(stored(&archive), vec!["a:1.0.0", "b:1.0.0", "c:1.0.0"]);
        Ok(())
    }

    #[test]
    fn test_force_replaces_archive() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("build.ctf");
        let origin = Path::new("BuildFile.yaml");

        DirectoryArchive::new(&path, true, false).write(origin, &[component("a", "1.0.0")])?;
        let archive = DirectoryArchive::new(&path, false, true);
        archive.write(origin, &[component("b", "2.0.0")])?;
        assert_eq!(stored(&archive), vec!["b:2.0.0"]);
        Ok(())
    }

    #[test]
    fn test_failed_update_keeps_existing_archive() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("build.ctf");
        std::fs::create_dir_all(&path)?;
        std::fs::write(path.join(CONSTRUCTOR_FILE), "not json")?;

        let archive = DirectoryArchive::new(&path, true, false);
        assert!(archive.write(Path::new("b"), &[component("a", "1.0.0")]).is_err());
        assert!(path.exists());
        Ok(())
    }
}
