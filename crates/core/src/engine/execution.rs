use crate::archive::ArchiveWriter;
use crate::buildfile::{Build, BuildFile, Component};
use crate::cache::{Plugin, PluginCache, ResolveSession};
use crate::error::{Result, ResultExt};
use crate::options::BuildOptions;
use crate::protocol::{self, StepScope};
use crate::state::{Environment, PipelineState};
use crate::template::VarsTemplater;
use crate::utils::sha256_hex;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Generation directory of a step: stable for the same context, plugin
/// and position, distinct otherwise
pub fn step_gen_dir(steps_dir: &Path, context: &str, plugin: &Path, index: usize) -> PathBuf {
    let key = format!("{}::{}::{}", context, plugin.display(), index);
    steps_dir.join(sha256_hex(key))
}

/// A step whose plugin was resolved without running it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStep {
    /// `global` or the `name:version` of the component
    pub context: String,
    pub index: usize,
    pub plugin: Plugin,
}

impl fmt::Display for ResolvedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: step {}[{}]", self.context, self.index + 1, self.plugin)
    }
}

/// One run over a build file
#[derive(Debug)]
pub struct Execution {
    options: BuildOptions,
    cache: PluginCache,
    session: ResolveSession,
    origin: PathBuf,
    dir: PathBuf,
    steps_dir: PathBuf,
    build_file: BuildFile,
}

impl Execution {
    /// Load the build file named by the options, expanding `${var}`
    /// placeholders before decoding
    pub fn new(options: BuildOptions, cache: PluginCache) -> Result<Self> {
        let options = options.complete();
        let origin = std::path::absolute(options.build_file())?;
        let templater = VarsTemplater::new(options.vars.clone());
        let build_file = BuildFile::load(&origin, &templater)?;
        Self::with_build_file(options, cache, build_file, origin)
    }

    /// Run an already decoded build file; `origin` is the path it was read
    /// from and determines the base directory of relative paths
    pub fn with_build_file(
        options: BuildOptions,
        cache: PluginCache,
        mut build_file: BuildFile,
        origin: impl Into<PathBuf>,
    ) -> Result<Self> {
        let options = options.complete();
        if build_file.default_version().is_none() {
            build_file.version = options.version.clone();
        }

        let origin = std::path::absolute(origin.into())?;
        let dir = origin
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        let steps_dir = std::path::absolute(options.steps_dir())?;
        let session = ResolveSession::new(options.reresolve);

        Ok(Self {
            options,
            cache,
            session,
            origin,
            dir,
            steps_dir,
            build_file,
        })
    }

    fn selected_components(&self) -> Vec<Component> {
        let default_version = self.build_file.default_version();
        self.build_file
            .components
            .iter()
            .filter(|c| c.is_selected(&self.options.components, default_version))
            .cloned()
            .collect()
    }

    /// Execute all steps and return the final pipeline state
    pub fn run(&mut self) -> Result<PipelineState> {
        info!("executing build...");
        let mut state = PipelineState::new(self.build_file.clone());

        let global = self.build_file.builds.clone();
        if !global.is_empty() {
            info!("executing build steps...");
            state = self.execute_builds(state, &global, StepScope::Global, "global")?;
        }

        for component in self.selected_components() {
            let index = state.add_component(&component);
            let key = state.components[index].key();
            info!("building component {}...", key);
            state = self
                .execute_builds(state, &component.builds, StepScope::Component(index), &key)
                .with_context(|| format!("component {key}"))?;
        }
        Ok(state)
    }

    /// Run the build and hand the resulting components to the archive
    pub fn build(&mut self, archive: &dyn ArchiveWriter) -> Result<PipelineState> {
        archive.check()?;
        let state = self.run()?;
        if state.components.is_empty() {
            info!("no components described, skipping archive update");
            return Ok(state);
        }
        archive.write(&self.origin, &state.components)?;
        Ok(state)
    }

    /// Resolve the plugin of every selected step without running it
    pub fn resolve(&mut self) -> Result<Vec<ResolvedStep>> {
        let mut steps = Vec::new();
        let global = self.build_file.builds.clone();
        self.resolve_builds(&mut steps, &global, "global")?;

        let default_version = self.build_file.default_version().map(str::to_string);
        for component in self.selected_components() {
            let key = component.key(default_version.as_deref());
            self.resolve_builds(&mut steps, &component.builds, &key)
                .with_context(|| format!("component {key}"))?;
        }
        Ok(steps)
    }

    fn resolve_builds(
        &mut self,
        steps: &mut Vec<ResolvedStep>,
        builds: &[Build],
        context: &str,
    ) -> Result<()> {
        for (index, build) in builds.iter().enumerate() {
            let plugin = self
                .cache
                .resolve(&mut self.session, &build.plugin, &self.dir)
                .with_context(|| format!("step {}", index + 1))?;
            steps.push(ResolvedStep {
                context: context.to_string(),
                index,
                plugin,
            });
        }
        Ok(())
    }

    fn execute_builds(
        &mut self,
        mut state: PipelineState,
        builds: &[Build],
        scope: StepScope,
        context: &str,
    ) -> Result<PipelineState> {
        for (index, build) in builds.iter().enumerate() {
            state = self
                .execute_step(&state, build, scope, context, index)
                .with_context(|| format!("step {}", index + 1))?;
        }
        Ok(state)
    }

    fn execute_step(
        &mut self,
        state: &PipelineState,
        build: &Build,
        scope: StepScope,
        context: &str,
        index: usize,
    ) -> Result<PipelineState> {
        let plugin = self.cache.resolve(&mut self.session, &build.plugin, &self.dir)?;
        let gen_dir = step_gen_dir(&self.steps_dir, context, &plugin.path, index);
        std::fs::create_dir_all(&gen_dir)
            .with_context(|| format!("cannot create generation directory {}", gen_dir.display()))?;

        let env = Environment::new(&self.dir, gen_dir);
        info!("step {}[{}] in {}...", index + 1, plugin, env.gen_dir.display());
        let next = protocol::invoke(&plugin, &env, scope, &build.config, state)?;
        debug!(
            "step {} returned {} component(s)",
            index + 1,
            next.components.len()
        );
        Ok(next)
    }
}

fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Remove the plugin cache and, unless `cache_only` is set, the archive and
/// all step generation directories
pub fn clean(options: &BuildOptions, cache_only: bool) -> Result<()> {
    let plugin_dir = options.plugin_dir();
    info!("cleaning plugin cache {}...", plugin_dir.display());
    remove_path(&plugin_dir)
        .with_context(|| format!("cannot remove plugin cache {}", plugin_dir.display()))?;

    if !cache_only {
        let archive = options.archive();
        info!("cleaning archive {}...", archive.display());
        remove_path(&archive)
            .with_context(|| format!("cannot remove archive {}", archive.display()))?;

        let steps = options.steps_dir();
        info!("cleaning generation directories {}...", steps.display());
        remove_path(&steps)
            .with_context(|| format!("cannot remove {}", steps.display()))?;
    }
    Ok(())
}
