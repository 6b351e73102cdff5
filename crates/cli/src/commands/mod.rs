pub mod build;
pub mod clean;
pub mod resolve;

pub use build::build_command;
pub use clean::clean_command;
pub use resolve::resolve_command;

use anyhow::{Context, Result};
use pipewright_core::{BuildOptions, PluginCache, Settings};
use tracing::debug;

use crate::cli::CommonArgs;

/// Command line options completed with the settings file found from the
/// working directory
pub(crate) fn load_options(common: &CommonArgs) -> Result<(BuildOptions, Settings)> {
    let mut options = common.to_options()?;
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let settings = Settings::discover(&cwd)
        .context("cannot load settings")?
        .unwrap_or_default();
    options.apply_settings(&settings);
    let options = options.complete();
    debug!("build options: {:?}", options);
    Ok((options, settings))
}

pub(crate) fn open_cache(options: &BuildOptions, settings: &Settings) -> Result<PluginCache> {
    let dir = options.plugin_dir();
    let cache = PluginCache::new(&dir)
        .with_context(|| format!("cannot open plugin cache {}", dir.display()))?;
    Ok(cache.with_repositories(settings.repositories.clone()))
}
