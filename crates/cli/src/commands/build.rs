use anyhow::{Context, Result};
use pipewright_core::{DirectoryArchive, Execution};
use tracing::info;

use super::{load_options, open_cache};
use crate::cli::CommonArgs;

pub fn build_command(common: &CommonArgs, create: bool, force: bool) -> Result<()> {
    let (mut options, settings) = load_options(common)?;
    options.create = create;
    options.force = force;

    let cache = open_cache(&options, &settings)?;
    let archive = DirectoryArchive::new(options.archive(), options.create, options.force);
    let build_file = options.build_file();

    let mut execution = Execution::new(options, cache)
        .with_context(|| format!("cannot load build file {}", build_file.display()))?;
    let state = execution.build(&archive)?;

    info!("build finished");
    if state.components.is_empty() {
        println!("no components built");
    } else {
        for component in &state.components {
            println!("built {}", component.key());
        }
        println!("archive: {}", archive.path().display());
    }
    Ok(())
}
