//! pipewright-cargobuild: build a cargo binary for a list of platforms and
//! add one executable resource per platform to the component

use pipewright_core::error::{Error, Result, ResultExt};
use pipewright_core::meta::Label;
use pipewright_core::ppi::{Handler, Invocation, Plugin, PluginKind};
use pipewright_core::repository::{ARCH_IDENTITY, OS_IDENTITY};
use pipewright_core::state::{ArtifactSpec, merge_artifacts};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const CONFIG_HELP: &str = "\
- path (string, required) package directory relative to the build file
- bin (string) binary target to build, defaults to the resource name
- options (list of strings) additional cargo build arguments
- platforms (list of strings) os/architecture pairs (e.g. linux/amd64),
  default is a build for the host
- cargo (string) cargo executable, default cargo
- resource (object) the resource to add:
  - name (string, required)
  - type (string) default executable
  - extraIdentity (map) additional identity attributes
  - labels (list of labels)
";

const DEFAULT_RESOURCE_TYPE: &str = "executable";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Config {
    #[serde(default)]
    path: String,
    #[serde(default)]
    bin: Option<String>,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    platforms: Vec<String>,
    #[serde(default)]
    cargo: Option<String>,
    #[serde(default)]
    resource: ResourceConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceConfig {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    extra_identity: BTreeMap<String, String>,
    #[serde(default)]
    labels: Vec<Label>,
}

/// A requested build platform
#[derive(Debug, Clone, PartialEq, Eq)]
struct TargetPlatform {
    os: String,
    arch: String,
    triple: &'static str,
}

impl TargetPlatform {
    fn parse(platform: &str) -> Result<Self> {
        let Some((os, arch)) = platform.split_once('/') else {
            return Err(Error::Config(format!("invalid platform {platform:?}")));
        };
        let triple = match (os, arch) {
            ("linux", "amd64") => "x86_64-unknown-linux-gnu",
            ("linux", "arm64") => "aarch64-unknown-linux-gnu",
            ("darwin", "amd64") => "x86_64-apple-darwin",
            ("darwin", "arm64") => "aarch64-apple-darwin",
            ("windows", "amd64") => "x86_64-pc-windows-msvc",
            ("windows", "arm64") => "aarch64-pc-windows-msvc",
            _ => return Err(Error::Config(format!("unsupported platform {platform:?}"))),
        };
        Ok(Self {
            os: os.to_string(),
            arch: arch.to_string(),
            triple,
        })
    }

    fn exe_suffix(&self) -> &'static str {
        if self.os == "windows" { ".exe" } else { "" }
    }
}

struct CargoBuild<'a> {
    cargo: &'a str,
    package: PathBuf,
    bin: &'a str,
    options: &'a [String],
    target_dir: PathBuf,
}

impl CargoBuild<'_> {
    /// Run cargo for one platform, `None` builds for the host. Returns the
    /// path of the built binary.
    fn run(&self, platform: Option<&TargetPlatform>) -> Result<PathBuf> {
        let mut args: Vec<String> = vec![
            "build".into(),
            "--release".into(),
            "--manifest-path".into(),
            self.package.join("Cargo.toml").to_string_lossy().into_owned(),
            "--target-dir".into(),
            self.target_dir.to_string_lossy().into_owned(),
            "--bin".into(),
            self.bin.to_string(),
        ];
        let mut output = self.target_dir.clone();
        let suffix = match platform {
            Some(platform) => {
                args.push("--target".into());
                args.push(platform.triple.to_string());
                output.push(platform.triple);
                platform.exe_suffix()
            }
            None => std::env::consts::EXE_SUFFIX,
        };
        args.extend(self.options.iter().cloned());
        output.push("release");
        output.push(format!("{}{}", self.bin, suffix));

        eprintln!("{} {}", self.cargo, args.join(" "));
        let status = Command::new(self.cargo)
            .args(&args)
            .current_dir(&self.package)
            .stdin(Stdio::null())
            .stdout(Stdio::from(std::io::stderr()))
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| Error::Plugin(format!("cannot run {}: {e}", self.cargo)))?;
        if !status.success() {
            return Err(Error::Plugin(format!("cargo build failed: {status}")));
        }
        if !output.is_file() {
            return Err(Error::Plugin(format!(
                "cargo build produced no binary at {}",
                output.display()
            )));
        }
        Ok(output)
    }
}

fn resource_for(config: &ResourceConfig, platform: Option<&TargetPlatform>, binary: &Path) -> ArtifactSpec {
    let kind = if config.kind.is_empty() {
        DEFAULT_RESOURCE_TYPE
    } else {
        &config.kind
    };
    let mut resource = ArtifactSpec::new(&config.name, kind);
    if let Some(platform) = platform {
        resource = resource
            .with_extra_identity(OS_IDENTITY, &platform.os)
            .with_extra_identity(ARCH_IDENTITY, &platform.arch);
    }
    resource.extra_identity.extend(config.extra_identity.clone());
    resource.labels = config.labels.clone();
    resource.extra.insert("relation".to_string(), json!("local"));
    resource.extra.insert(
        "input".to_string(),
        json!({
            "type": "file",
            "path": binary.to_string_lossy(),
            "mediaType": "application/octet-stream",
        }),
    );
    resource
}

struct CargoBuildHandler;

impl Handler for CargoBuildHandler {
    type Config = Config;

    fn handle(&self, invocation: &mut Invocation<Config>) -> Result<()> {
        let config = &invocation.config;
        if config.path.is_empty() {
            return Err(Error::Config("package path to build required".to_string()));
        }
        if config.resource.name.is_empty() {
            return Err(Error::Config("resource name required".to_string()));
        }
        let platforms = config
            .platforms
            .iter()
            .map(|p| TargetPlatform::parse(p))
            .collect::<Result<Vec<_>>>()?;

        let package = invocation.env.path(&config.path);
        if !package.is_dir() {
            return Err(Error::Config(format!("path {} not found", package.display())));
        }
        let build = CargoBuild {
            cargo: config.cargo.as_deref().unwrap_or("cargo"),
            bin: config.bin.as_deref().unwrap_or(&config.resource.name),
            options: &config.options,
            target_dir: invocation.env.gen_path("target"),
            package,
        };

        let mut resources = Vec::new();
        if platforms.is_empty() {
            let binary = build.run(None)?;
            resources.push(resource_for(&config.resource, None, &binary));
        }
        for platform in &platforms {
            let binary = build
                .run(Some(platform))
                .with_context(|| format!("platform {}/{}", platform.os, platform.arch))?;
            resources.push(resource_for(&config.resource, Some(platform), &binary));
        }
        let source_file = build.package.to_string_lossy().into_owned();
        for resource in &resources {
            info!("adding resource {} {:?}", resource.name, resource.extra_identity);
        }

        let component = invocation
            .component_mut()
            .ok_or_else(|| Error::Plugin("no component for this step".to_string()))?;
        component.resources = merge_artifacts(&component.resources, resources, &source_file);
        debug!("component {} has {} resource(s)", component.key(), component.resources.len());
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    Plugin::new("pipewright-cargobuild", PluginKind::ComponentOnly, CargoBuildHandler)
        .with_config_help(CONFIG_HELP)
        .run(&args, std::io::stdin().lock(), std::io::stdout().lock())?;
    Ok(())
}
