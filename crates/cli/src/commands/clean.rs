use anyhow::Result;
use pipewright_core::engine;

use super::load_options;
use crate::cli::CommonArgs;

pub fn clean_command(common: &CommonArgs, cache_only: bool) -> Result<()> {
    let (options, _) = load_options(common)?;
    engine::clean(&options, cache_only)?;
    println!("cleaned {}", options.plugin_dir().display());
    if !cache_only {
        println!("cleaned {}", options.archive().display());
        println!("cleaned {}", options.steps_dir().display());
    }
    Ok(())
}
