use super::ResolveSession;
use crate::error::{Error, Result, ResultExt};
use crate::plugin::{HashId, PluginSpec, PluginTarget};
use crate::repository::{
    ComponentVersion, DefaultRepositoryProvider, Platform, Repository, RepositoryProvider,
    RepositorySpec, ResourceDescriptor,
};
use crate::utils::{resolve_path, sha256_hex};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const INFO_EXTENSION: &str = "info";

/// A plugin executable ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    pub path: PathBuf,
    /// Resolved identity, `None` for local executables
    pub id: Option<HashId>,
}

impl fmt::Display for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{id}"),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

/// Persisted companion of a cached binary, stored as `<hash>.info`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Info {
    id: HashId,
    spec: PluginSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
}

/// A known binding of a plugin specification to a cached binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub id: HashId,
    pub spec: PluginSpec,
    pub path: PathBuf,
    pub digest: Option<String>,
}

pub struct PluginCache {
    dir: PathBuf,
    entries: Vec<CacheEntry>,
    provider: Box<dyn RepositoryProvider>,
    platform: Platform,
    repositories: BTreeMap<String, RepositorySpec>,
}

impl fmt::Debug for PluginCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCache")
            .field("dir", &self.dir)
            .field("entries", &self.entries.len())
            .field("platform", &self.platform)
            .finish()
    }
}

impl PluginCache {
    /// Open the cache in `dir` with the bundled repository types
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_provider(dir, Box::new(DefaultRepositoryProvider))
    }

    pub fn with_provider(
        dir: impl Into<PathBuf>,
        provider: Box<dyn RepositoryProvider>,
    ) -> Result<Self> {
        let mut cache = Self {
            dir: dir.into(),
            entries: Vec::new(),
            provider,
            platform: Platform::current(),
            repositories: BTreeMap::new(),
        };
        cache.load_from_disk()?;
        Ok(cache)
    }

    /// Select plugin resources for another platform than the running one
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Named repositories the `{"name": ..}` repository form refers to
    pub fn with_repositories(mut self, repositories: BTreeMap<String, RepositorySpec>) -> Self {
        self.repositories = repositories;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    fn load_from_disk(&mut self) -> Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some(INFO_EXTENSION) {
                continue;
            }

            let info = match std::fs::read(&path)
                .map_err(Error::from)
                .and_then(|data| serde_json::from_slice::<Info>(&data).map_err(Error::from))
            {
                Ok(info) => info,
                Err(e) => {
                    warn!("skipping unreadable plugin info {}: {}", path.display(), e);
                    continue;
                }
            };

            let binary = path.with_extension("");
            if !binary.is_file() {
                warn!("removing plugin info {} without binary", path.display());
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!("cannot remove {}: {}", path.display(), e);
                }
                continue;
            }

            debug!("found cached plugin {} ({})", info.id, binary.display());
            self.entries.push(CacheEntry {
                id: info.id,
                spec: info.spec,
                path: binary,
                digest: info.digest,
            });
        }
        Ok(())
    }

    fn lookup_spec(&self, spec: &PluginSpec) -> Option<&CacheEntry> {
        self.entries.iter().find(|e| &e.spec == spec)
    }

    fn forget(&mut self, spec: &PluginSpec) {
        self.entries.retain(|e| &e.spec != spec);
    }

    fn remember(&mut self, entry: CacheEntry) {
        self.forget(&entry.spec);
        self.entries.push(entry);
    }

    fn binary_path(&self, id: &HashId) -> Result<PathBuf> {
        Ok(self.dir.join(id.digest()?))
    }

    /// Resolve a plugin specification to a local executable.
    ///
    /// Relative executable paths and directory repositories are taken
    /// relative to `base_dir`.
    pub fn resolve(
        &mut self,
        session: &mut ResolveSession,
        spec: &PluginSpec,
        base_dir: &Path,
    ) -> Result<Plugin> {
        if let PluginSpec::Executable { path } = spec {
            return Ok(Plugin {
                path: resolve_path(base_dir, path),
                id: None,
            });
        }

        if session.is_discovered(spec) {
            if let Some(entry) = self.lookup_spec(spec) {
                debug!("using cached plugin {} for {}", entry.id, spec);
                return Ok(Plugin {
                    path: entry.path.clone(),
                    id: Some(entry.id.clone()),
                });
            }
        } else {
            self.forget(spec);
        }

        let plugin = self
            .resolve_remote(spec, base_dir)
            .with_context(|| format!("cannot resolve plugin {spec}"))?;
        session.discover(spec);
        Ok(plugin)
    }

    fn resolve_remote(&mut self, spec: &PluginSpec, base_dir: &Path) -> Result<Plugin> {
        let Some(PluginTarget { repository, id }) = spec.target(base_dir, &self.repositories)?
        else {
            return Err(Error::Specification(format!("{spec} is no repository plugin")));
        };

        if id.is_complete() {
            let path = self.binary_path(&id)?;
            if path.is_file() {
                debug!("found plugin {} in cache", id);
                self.remember(CacheEntry {
                    id: id.clone(),
                    spec: spec.clone(),
                    path: path.clone(),
                    digest: None,
                });
                return Ok(Plugin { path, id: Some(id) });
            }
        }

        let repo = self
            .provider
            .open(&repository)
            .with_context(|| format!("cannot open repository {repository}"))?;
        let cv = select_version(repo.as_ref(), &id)?;
        let resource = self.select_resource(&cv, &id)?;
        let resolved = HashId::new(&cv.name, &cv.version, &resource.name);
        info!("found plugin resource {} for {}", resolved, self.platform);

        let path = self.install(repo.as_ref(), &cv, resource, &resolved, spec)?;
        Ok(Plugin {
            path,
            id: Some(resolved),
        })
    }

    fn select_resource<'a>(
        &self,
        cv: &'a ComponentVersion,
        id: &HashId,
    ) -> Result<&'a ResourceDescriptor> {
        let mut wrong_type = None;
        let mut wrong_platform = None;

        for resource in &cv.resources {
            if !id.resource.is_empty() && resource.name != id.resource {
                continue;
            }
            if !resource.is_plugin() {
                if !id.resource.is_empty() {
                    wrong_type.get_or_insert(resource);
                }
                continue;
            }
            if !self.platform.matches(&resource.extra_identity) {
                wrong_platform.get_or_insert(resource);
                continue;
            }
            return Ok(resource);
        }

        let err = if let Some(resource) = wrong_platform {
            Error::PlatformNotFound {
                name: resource.name.clone(),
                os: self.platform.os.clone(),
                arch: self.platform.arch.clone(),
            }
        } else if let Some(resource) = wrong_type {
            Error::WrongResourceType {
                name: resource.name.clone(),
                kind: resource.kind.clone(),
            }
        } else if !id.resource.is_empty() {
            Error::ResourceNotFound(id.resource.clone())
        } else {
            Error::NoPluginResource
        };
        Err(err.context(format!("component version {}", cv.key())))
    }

    fn install(
        &mut self,
        repo: &dyn Repository,
        cv: &ComponentVersion,
        resource: &ResourceDescriptor,
        id: &HashId,
        spec: &PluginSpec,
    ) -> Result<PathBuf> {
        let path = self.binary_path(id)?;
        let info_path = path.with_extension(INFO_EXTENSION);

        if let Some(digest) = &resource.digest {
            if path.is_file() && read_info(&info_path).and_then(|i| i.digest).as_ref() == Some(digest) {
                debug!("cached plugin {} is up to date", id);
                self.remember(CacheEntry {
                    id: id.clone(),
                    spec: spec.clone(),
                    path: path.clone(),
                    digest: Some(digest.clone()),
                });
                return Ok(path);
            }
        }

        let content = repo.fetch(cv, resource)?;
        if let Some(digest) = &resource.digest {
            let actual = sha256_hex(&content);
            if !actual.eq_ignore_ascii_case(digest) {
                return Err(Error::Transport(format!(
                    "digest mismatch for resource {:?}: expected {}, got {}",
                    resource.name, digest, actual
                )));
            }
        }

        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("cannot create plugin directory {}", self.dir.display()))?;
        write_executable(&self.dir, &path, &content)
            .with_context(|| format!("cannot install plugin {id}"))?;

        match &resource.digest {
            Some(digest) => {
                let info = Info {
                    id: id.clone(),
                    spec: spec.clone(),
                    digest: Some(digest.clone()),
                };
                std::fs::write(&info_path, serde_json::to_vec_pretty(&info)?)?;
            }
            None => {
                if info_path.exists() {
                    std::fs::remove_file(&info_path)?;
                }
            }
        }

        info!("installed plugin {} at {}", id, path.display());
        self.remember(CacheEntry {
            id: id.clone(),
            spec: spec.clone(),
            path: path.clone(),
            digest: resource.digest.clone(),
        });
        Ok(path)
    }
}

fn read_info(path: &Path) -> Option<Info> {
    let data = std::fs::read(path).ok()?;
    serde_json::from_slice(&data).ok()
}

/// Write `content` to a temporary file next to `target`, make it executable
/// and rename it into place
fn write_executable(dir: &Path, target: &Path, content: &[u8]) -> Result<()> {
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(content)?;
    file.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o755))?;
    }

    file.persist(target)
        .map_err(|e| Error::Transport(format!("cannot move plugin into place: {}", e.error)))?;
    Ok(())
}

/// Pick the component version named by `id`: an exact version directly,
/// otherwise the highest version satisfying the constraint (any version if
/// none is given)
fn select_version(repo: &dyn Repository, id: &HashId) -> Result<ComponentVersion> {
    if Version::parse(&id.version).is_ok() {
        return repo.lookup(&id.component, &id.version);
    }

    let constraint = if id.version.is_empty() {
        VersionReq::STAR
    } else {
        VersionReq::parse(&id.version).map_err(|e| {
            Error::Resolution(format!("invalid version constraint {:?}: {e}", id.version))
        })?
    };

    let mut candidates: Vec<(Version, String)> = repo
        .list_versions(&id.component)?
        .into_iter()
        .filter_map(|raw| match Version::parse(&raw) {
            Ok(version) => Some((version, raw)),
            Err(_) => {
                debug!("ignoring non semver version {} of {}", raw, id.component);
                None
            }
        })
        .filter(|(version, _)| constraint.matches(version))
        .collect();
    candidates.sort();

    let Some((_, version)) = candidates.pop() else {
        return Err(Error::NoMatchingVersion {
            component: id.component.clone(),
            constraint: constraint.to_string(),
        });
    };
    debug!("selected version {} of {} for {}", version, id.component, constraint);
    repo.lookup(&id.component, &version)
}
