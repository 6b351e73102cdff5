use anyhow::{Context, Result};
use pipewright_core::Execution;

use super::{load_options, open_cache};
use crate::cli::CommonArgs;

pub fn resolve_command(common: &CommonArgs) -> Result<()> {
    let (options, settings) = load_options(common)?;
    let cache = open_cache(&options, &settings)?;
    let build_file = options.build_file();

    let mut execution = Execution::new(options, cache)
        .with_context(|| format!("cannot load build file {}", build_file.display()))?;
    for step in execution.resolve()? {
        println!("{step} -> {}", step.plugin.path.display());
    }
    Ok(())
}
