//! Integration tests for plugin resolution through the plugin cache

use pipewright_core::error::{Error, Result};
use pipewright_core::plugin::{PluginSpec, RepositoryRef};
use pipewright_core::repository::{
    ARCH_IDENTITY, Access, ComponentVersion, DefaultRepositoryProvider, DirectoryRepository,
    OS_IDENTITY, PLUGIN_RESOURCE_TYPE, Platform, Repository, RepositoryProvider, RepositorySpec,
    ResourceDescriptor,
};
use pipewright_core::utils::sha256_hex;
use pipewright_core::{PluginCache, ResolveSession};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const COMPONENT: &str = "acme.org/plugins";

/// Counts every repository contact
struct CountingProvider {
    opened: Arc<AtomicUsize>,
}

impl RepositoryProvider for CountingProvider {
    fn open(&self, spec: &RepositorySpec) -> Result<Box<dyn Repository>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        DefaultRepositoryProvider.open(spec)
    }
}

struct Fixture {
    temp: TempDir,
    repo: DirectoryRepository,
    opened: Arc<AtomicUsize>,
}

impl Fixture {
    fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let repo = DirectoryRepository::create(temp.path().join("repo"))?;
        Ok(Self {
            temp,
            repo,
            opened: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn plugin_dir(&self) -> PathBuf {
        self.temp.path().join("plugins")
    }

    fn cache(&self, platform: Platform) -> Result<PluginCache> {
        let provider = CountingProvider {
            opened: Arc::clone(&self.opened),
        };
        Ok(PluginCache::with_provider(self.plugin_dir(), Box::new(provider))?.with_platform(platform))
    }

    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn spec(&self, version: Option<&str>, resource: Option<&str>) -> PluginSpec {
        PluginSpec::Repository {
            repository: RepositoryRef::Config(RepositorySpec::Directory {
                path: self.repo.root().to_path_buf(),
            }),
            component: Some(COMPONENT.to_string()),
            version: version.map(str::to_string),
            resource: resource.map(str::to_string),
        }
    }

    /// Publish a plugin version with a linux/amd64 and a darwin/arm64 build
    /// of resource `demo` plus a plain text resource `docs`
    fn publish(&self, version: &str, linux: &[u8]) -> Result<()> {
        let darwin: &[u8] = b"darwin build";
        let cv = ComponentVersion {
            name: COMPONENT.to_string(),
            version: version.to_string(),
            resources: vec![
                plugin_resource("linux", "amd64", "demo-linux", linux),
                plugin_resource("darwin", "arm64", "demo-darwin", darwin),
                docs_resource(),
            ],
        };
        let docs: &[u8] = b"docs";
        self.repo.publish(
            &cv,
            &[("demo-linux", linux), ("demo-darwin", darwin), ("docs.txt", docs)],
        )
    }

    /// Publish a version with exactly the given resources
    fn publish_resources(
        &self,
        version: &str,
        resources: Vec<ResourceDescriptor>,
        blobs: &[(&str, &[u8])],
    ) -> Result<()> {
        let cv = ComponentVersion {
            name: COMPONENT.to_string(),
            version: version.to_string(),
            resources,
        };
        self.repo.publish(&cv, blobs)
    }
}

fn docs_resource() -> ResourceDescriptor {
    ResourceDescriptor {
        name: "docs".to_string(),
        kind: "plainText".to_string(),
        version: None,
        extra_identity: BTreeMap::new(),
        digest: None,
        access: Some(Access {
            local_path: "docs.txt".to_string(),
        }),
    }
}

fn plugin_resource(os: &str, arch: &str, blob: &str, content: &[u8]) -> ResourceDescriptor {
    ResourceDescriptor {
        name: "demo".to_string(),
        kind: PLUGIN_RESOURCE_TYPE.to_string(),
        version: None,
        extra_identity: BTreeMap::from([
            (OS_IDENTITY.to_string(), os.to_string()),
            (ARCH_IDENTITY.to_string(), arch.to_string()),
        ]),
        digest: Some(sha256_hex(content)),
        access: Some(Access {
            local_path: blob.to_string(),
        }),
    }
}

fn linux() -> Platform {
    Platform::new("linux", "amd64")
}

fn resolved_version(cache: &mut PluginCache, spec: &PluginSpec, base: &Path) -> Result<String> {
    let mut session = ResolveSession::new(false);
    let plugin = cache.resolve(&mut session, spec, base)?;
    Ok(plugin.id.map(|id| id.version).unwrap_or_default())
}

#[test]
fn test_version_selection() -> Result<()> {
    let fx = Fixture::new()?;
    for version in ["1.0.0", "1.2.0", "2.0.0"] {
        fx.publish(version, version.as_bytes())?;
    }
    let mut cache = fx.cache(linux())?;
    let base = fx.temp.path();

    assert_eq!(resolved_version(&mut cache, &fx.spec(Some("^1.0.0"), Some("demo")), base)?, "1.2.0");
    assert_eq!(resolved_version(&mut cache, &fx.spec(None, Some("demo")), base)?, "2.0.0");
    assert_eq!(resolved_version(&mut cache, &fx.spec(Some("1.0.0"), Some("demo")), base)?, "1.0.0");

    let err = resolved_version(&mut cache, &fx.spec(Some(">=3.0.0"), Some("demo")), base).unwrap_err();
    assert!(
        matches!(err.root(), Error::NoMatchingVersion { component, .. } if component == COMPONENT),
        "unexpected error: {err}"
    );
    Ok(())
}

#[test]
fn test_installed_binary_matches_resource() -> Result<()> {
    let fx = Fixture::new()?;
    fx.publish("1.0.0", b"#!/bin/sh\ncat\n")?;
    let mut cache = fx.cache(linux())?;

    let mut session = ResolveSession::new(false);
    let plugin = cache.resolve(&mut session, &fx.spec(Some("1.0.0"), None), fx.temp.path())?;
    assert_eq!(std::fs::read(&plugin.path)?, b"#!/bin/sh\ncat\n");
    assert_eq!(plugin.path.parent(), Some(fx.plugin_dir().as_path()));
    assert_eq!(plugin.to_string(), "acme.org/plugins:1.0.0[demo]");
    assert!(plugin.path.with_extension("info").is_file());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&plugin.path)?.permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
    Ok(())
}

#[test]
fn test_full_identity_is_resolved_once() -> Result<()> {
    let fx = Fixture::new()?;
    fx.publish("1.0.0", b"one")?;
    let spec = fx.spec(Some("1.0.0"), Some("demo"));

    let mut cache = fx.cache(linux())?;
    let mut session = ResolveSession::new(false);
    let first = cache.resolve(&mut session, &spec, fx.temp.path())?;
    let second = cache.resolve(&mut session, &spec, fx.temp.path())?;
    assert_eq!(first, second);
    assert_eq!(fx.opened(), 1);

    // a later run finds the binary without asking the repository
    let mut cache = fx.cache(linux())?;
    let mut session = ResolveSession::new(true);
    let third = cache.resolve(&mut session, &spec, fx.temp.path())?;
    assert_eq!(third.path, first.path);
    assert_eq!(fx.opened(), 1);
    Ok(())
}

#[test]
fn test_reresolve_forgets_cached_binding_once_per_run() -> Result<()> {
    let fx = Fixture::new()?;
    fx.publish("1.0.0", b"one")?;
    let spec = fx.spec(None, Some("demo"));
    let base = fx.temp.path();

    let mut cache = fx.cache(linux())?;
    assert_eq!(resolved_version(&mut cache, &spec, base)?, "1.0.0");
    assert_eq!(fx.opened(), 1);

    fx.publish("1.1.0", b"two")?;

    // cached mode keeps the binding of an earlier run
    let mut cache = fx.cache(linux())?;
    assert_eq!(resolved_version(&mut cache, &spec, base)?, "1.0.0");
    assert_eq!(fx.opened(), 1);

    // re-resolve mode contacts the repository for the first occurrence only
    let mut cache = fx.cache(linux())?;
    let mut session = ResolveSession::new(true);
    let first = cache.resolve(&mut session, &spec, base)?;
    assert_eq!(first.id.as_ref().map(|id| id.version.as_str()), Some("1.1.0"));
    assert_eq!(fx.opened(), 2);

    let second = cache.resolve(&mut session, &spec, base)?;
    assert_eq!(second, first);
    assert_eq!(fx.opened(), 2);
    Ok(())
}

#[test]
fn test_platform_selection() -> Result<()> {
    let fx = Fixture::new()?;
    fx.publish("1.0.0", b"linux build")?;
    let spec = fx.spec(Some("1.0.0"), Some("demo"));

    let mut cache = fx.cache(linux())?;
    let mut session = ResolveSession::new(false);
    let plugin = cache.resolve(&mut session, &spec, fx.temp.path())?;
    assert_eq!(std::fs::read(&plugin.path)?, b"linux build");

    std::fs::remove_dir_all(fx.plugin_dir())?;
    let mut cache = fx.cache(Platform::new("windows", "amd64"))?;
    let err = cache
        .resolve(&mut ResolveSession::new(false), &spec, fx.temp.path())
        .unwrap_err();
    match err.root() {
        Error::PlatformNotFound { name, os, arch } => {
            assert_eq!((name.as_str(), os.as_str(), arch.as_str()), ("demo", "windows", "amd64"));
        }
        other => panic!("expected platform diagnostic, got {other}"),
    }
    Ok(())
}

#[test]
fn test_resource_diagnostics() -> Result<()> {
    let fx = Fixture::new()?;
    fx.publish("1.0.0", b"one")?;
    let mut cache = fx.cache(linux())?;
    let mut session = ResolveSession::new(false);
    let base = fx.temp.path();

    let err = cache
        .resolve(&mut session, &fx.spec(Some("1.0.0"), Some("docs")), base)
        .unwrap_err();
    assert!(matches!(err.root(), Error::WrongResourceType { name, .. } if name == "docs"));

    let err = cache
        .resolve(&mut session, &fx.spec(Some("1.0.0"), Some("missing")), base)
        .unwrap_err();
    assert!(matches!(err.root(), Error::ResourceNotFound(name) if name == "missing"));
    insta::assert_snapshot!(
        err.root().to_string(),
        @r#"resource "missing" not found"#
    );
    Ok(())
}

#[test]
fn test_digest_mismatch_is_transport_error() -> Result<()> {
    let fx = Fixture::new()?;
    fx.publish("1.0.0", b"original")?;
    let blob = fx.repo.root().join(COMPONENT).join("1.0.0").join("demo-linux");
    std::fs::write(&blob, b"tampered")?;

    let mut cache = fx.cache(linux())?;
    let err = cache
        .resolve(&mut ResolveSession::new(false), &fx.spec(Some("1.0.0"), Some("demo")), fx.temp.path())
        .unwrap_err();
    assert!(matches!(err.root(), Error::Transport(_)), "unexpected error: {err}");
    assert!(cache.entries().is_empty());
    Ok(())
}

#[test]
fn test_reference_spec_relative_to_base_dir() -> Result<()> {
    let fx = Fixture::new()?;
    fx.publish("1.0.0", b"one")?;
    let spec = PluginSpec::Reference {
        reference: format!("./repo//{COMPONENT}:1.0.0"),
        resource: Some("demo".to_string()),
    };

    let mut cache = fx.cache(linux())?;
    assert_eq!(resolved_version(&mut cache, &spec, fx.temp.path())?, "1.0.0");
    assert_eq!(cache.entries().len(), 1);
    assert_eq!(cache.entries()[0].spec, spec);
    Ok(())
}

#[test]
fn test_no_plugin_resource_without_resource_name() -> Result<()> {
    let fx = Fixture::new()?;
    let docs: &[u8] = b"docs";
    fx.publish_resources("1.0.0", vec![docs_resource()], &[("docs.txt", docs)])?;

    let mut cache = fx.cache(linux())?;
    let err = cache
        .resolve(&mut ResolveSession::new(false), &fx.spec(Some("1.0.0"), None), fx.temp.path())
        .unwrap_err();
    assert!(matches!(err.root(), Error::NoPluginResource), "unexpected error: {err}");
    Ok(())
}

fn read_info_digest(plugin: &Path) -> Option<String> {
    let data = std::fs::read(plugin.with_extension("info")).ok()?;
    let info: serde_json::Value = serde_json::from_slice(&data).ok()?;
    info["digest"].as_str().map(str::to_string)
}

#[test]
fn test_resource_without_digest_keeps_no_info() -> Result<()> {
    let fx = Fixture::new()?;
    fx.publish("1.0.0", b"with digest")?;
    let spec = fx.spec(Some("^1.0.0"), Some("demo"));

    let mut cache = fx.cache(linux())?;
    let first = cache.resolve(&mut ResolveSession::new(false), &spec, fx.temp.path())?;
    assert_eq!(read_info_digest(&first.path), Some(sha256_hex(b"with digest")));

    let mut resource = plugin_resource("linux", "amd64", "demo-linux", b"without digest");
    resource.digest = None;
    let content: &[u8] = b"without digest";
    fx.publish_resources("1.0.0", vec![resource], &[("demo-linux", content)])?;

    let mut cache = fx.cache(linux())?;
    let second = cache.resolve(&mut ResolveSession::new(true), &spec, fx.temp.path())?;
    assert_eq!(second.path, first.path);
    assert_eq!(std::fs::read(&second.path)?, b"without digest");
    assert!(!second.path.with_extension("info").exists());
    assert_eq!(cache.entries()[0].digest, None);

    // a fresh cache knows nothing about the binary without info file
    assert!(fx.cache(linux())?.entries().is_empty());
    Ok(())
}

#[test]
fn test_changed_digest_reinstalls_binary() -> Result<()> {
    let fx = Fixture::new()?;
    fx.publish("1.0.0", b"first build")?;
    let spec = fx.spec(Some("^1.0.0"), Some("demo"));

    let mut cache = fx.cache(linux())?;
    let first = cache.resolve(&mut ResolveSession::new(false), &spec, fx.temp.path())?;
    assert_eq!(std::fs::read(&first.path)?, b"first build");

    fx.publish("1.0.0", b"rebuilt")?;
    let mut cache = fx.cache(linux())?;
    let second = cache.resolve(&mut ResolveSession::new(true), &spec, fx.temp.path())?;
    assert_eq!(second.path, first.path);
    assert_eq!(std::fs::read(&second.path)?, b"rebuilt");
    assert_eq!(read_info_digest(&second.path), Some(sha256_hex(b"rebuilt")));
    assert_eq!(fx.opened(), 2);
    Ok(())
}
