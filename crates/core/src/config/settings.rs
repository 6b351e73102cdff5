use crate::{
    error::{Error, Result},
    repository::RepositorySpec,
    utils::resolve_path,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SETTINGS_FILE: &str = ".pipewright.json";
pub const ALT_SETTINGS_FILE: &str = "pipewright.json";

/// Project wide defaults read from `.pipewright.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gen_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,

    /// Template variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,

    /// Repositories referenced by name from plugin specifications
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub repositories: BTreeMap<String, RepositorySpec>,
}

impl Settings {
    /// Load a settings file; relative paths in it are taken relative to the
    /// directory of the file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
            Error::Config(format!("failed to parse settings {}: {e}", path.display()))
        })?;
        debug!("loaded settings from {:?}", path);

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(settings.resolved(base))
    }

    /// Walk up from `start_path` to the first directory with a settings file
    pub fn find(start_path: &Path) -> Option<PathBuf> {
        let mut current = start_path;

        loop {
            for name in [SETTINGS_FILE, ALT_SETTINGS_FILE] {
                let path = current.join(name);
                if path.is_file() {
                    return Some(path);
                }
            }
            current = current.parent()?;
        }
    }

    /// Find and load the settings for `start_path`, if there are any
    pub fn discover(start_path: &Path) -> Result<Option<Self>> {
        Settings::find(start_path)
            .map(|path| Settings::load_from_file(&path))
            .transpose()
    }

    fn resolved(mut self, base: &Path) -> Self {
        for path in [
            &mut self.build_file,
            &mut self.gen_dir,
            &mut self.plugin_dir,
            &mut self.archive,
        ]
        .into_iter()
        .flatten()
        {
            *path = resolve_path(base, &*path);
        }
        for spec in self.repositories.values_mut() {
            *spec = spec.resolved(base);
        }
        self
    }
}
