//! Options of a build run

use crate::config::Settings;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_VERSION: &str = "0.1.0";
pub const DEFAULT_BUILD_FILE: &str = "BuildFile.yaml";
pub const DEFAULT_GEN_DIR: &str = "gen";

/// All options of a build, resolve or clean run.
///
/// Unset paths are filled by [`BuildOptions::complete`]; the build
/// directory, plugin directory and archive default to locations below the
/// generation directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildOptions {
    /// Create the archive if it does not exist
    pub create: bool,
    /// Replace an existing archive
    pub force: bool,
    /// Resolve repository plugins again instead of using cached bindings
    pub reresolve: bool,

    pub archive: Option<PathBuf>,
    pub build_file: Option<PathBuf>,
    /// Component version used when the build file declares none
    pub version: Option<String>,

    pub gen_dir: Option<PathBuf>,
    pub build_dir: Option<PathBuf>,
    pub plugin_dir: Option<PathBuf>,

    /// `name` or `name:version` filters selecting components
    pub components: Vec<String>,
    /// Values for `${name}` placeholders in the build file
    pub vars: BTreeMap<String, String>,
}

impl BuildOptions {
    /// Fill options the command line left unset from a settings file
    pub fn apply_settings(&mut self, settings: &Settings) {
        fn fill<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if target.is_none() {
                target.clone_from(value);
            }
        }

        fill(&mut self.version, &settings.version);
        fill(&mut self.build_file, &settings.build_file);
        fill(&mut self.gen_dir, &settings.gen_dir);
        fill(&mut self.plugin_dir, &settings.plugin_dir);
        fill(&mut self.archive, &settings.archive);
        for (name, value) in &settings.vars {
            self.vars.entry(name.clone()).or_insert_with(|| value.clone());
        }
    }

    /// Apply defaults to every unset option
    pub fn complete(mut self) -> Self {
        let gen_dir = self
            .gen_dir
            .get_or_insert_with(|| PathBuf::from(DEFAULT_GEN_DIR))
            .clone();
        let build_dir = self
            .build_dir
            .get_or_insert_with(|| gen_dir.join("pipewright"))
            .clone();
        self.plugin_dir
            .get_or_insert_with(|| build_dir.join("buildplugins"));
        self.archive.get_or_insert_with(|| build_dir.join("build.ctf"));
        self.build_file
            .get_or_insert_with(|| PathBuf::from(DEFAULT_BUILD_FILE));
        self.version
            .get_or_insert_with(|| DEFAULT_VERSION.to_string());
        self
    }

    pub fn build_file(&self) -> PathBuf {
        self.build_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_FILE))
    }

    pub fn build_dir(&self) -> PathBuf {
        self.build_dir.clone().unwrap_or_else(|| {
            self.gen_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_GEN_DIR))
                .join("pipewright")
        })
    }

    pub fn plugin_dir(&self) -> PathBuf {
        self.plugin_dir
            .clone()
            .unwrap_or_else(|| self.build_dir().join("buildplugins"))
    }

    pub fn archive(&self) -> PathBuf {
        self.archive
            .clone()
            .unwrap_or_else(|| self.build_dir().join("build.ctf"))
    }

    /// Directory holding the per step generation directories
    pub fn steps_dir(&self) -> PathBuf {
        self.build_dir().join("steps")
    }
}
