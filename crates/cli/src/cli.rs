use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use pipewright_core::BuildOptions;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::commands::{build_command, clean_command, resolve_command};

/// Plugin driven build pipelines
#[derive(Parser, Debug)]
#[command(name = "pipewright")]
#[command(version, about, long_about = None)]
#[command(subcommand_required = true, arg_required_else_help = true)]
#[command(after_help = "ENVIRONMENT:\n    RUST_LOG=debug    Enable debug logging")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute the build steps and update the archive
    Build {
        #[command(flatten)]
        common: CommonArgs,

        /// Create the archive if it does not exist
        #[arg(short = 'c', long = "create")]
        create: bool,

        /// Replace an existing archive
        #[arg(short = 'f', long = "force")]
        force: bool,
    },
    /// Resolve the plugins of all build steps without running them
    Resolve {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Remove the plugin cache, the archive and generated step directories
    Clean {
        #[command(flatten)]
        common: CommonArgs,

        /// Only remove the plugin cache
        #[arg(long = "cache-only")]
        cache_only: bool,
    },
}

/// Options shared by all commands
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Build file to use (default BuildFile.yaml)
    #[arg(short = 'b', long = "buildfile")]
    pub build_file: Option<PathBuf>,

    /// Generation directory (default gen)
    #[arg(short = 'g', long = "gen")]
    pub gen_dir: Option<PathBuf>,

    /// Plugin cache directory (default <gen>/pipewright/buildplugins)
    #[arg(short = 'p', long = "plugins")]
    pub plugin_dir: Option<PathBuf>,

    /// Archive to write (default <gen>/pipewright/build.ctf)
    #[arg(short = 'o', long = "target")]
    pub archive: Option<PathBuf>,

    /// Component version used if the build file declares none
    #[arg(short = 'V', long = "component-version")]
    pub version: Option<String>,

    /// Resolve repository plugins again instead of using cached ones
    #[arg(short = 'r', long = "reresolve")]
    pub reresolve: bool,

    /// Template variable for the build file (NAME=VALUE)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// Build only these components (name or name:version)
    pub components: Vec<String>,
}

impl CommonArgs {
    pub fn to_options(&self) -> Result<BuildOptions> {
        Ok(BuildOptions {
            reresolve: self.reresolve,
            archive: self.archive.clone(),
            build_file: self.build_file.clone(),
            version: self.version.clone(),
            gen_dir: self.gen_dir.clone(),
            plugin_dir: self.plugin_dir.clone(),
            components: self.components.clone(),
            vars: parse_vars(&self.vars)?,
            ..Default::default()
        })
    }
}

fn parse_vars(vars: &[String]) -> Result<BTreeMap<String, String>> {
    let mut result = BTreeMap::new();
    for var in vars {
        let Some((name, value)) = var.split_once('=') else {
            bail!("invalid variable {var:?}, expected NAME=VALUE");
        };
        if name.is_empty() {
            bail!("empty variable name in {var:?}");
        }
        result.insert(name.to_string(), value.to_string());
    }
    Ok(result)
}

impl Commands {
    /// Execute the command
    pub fn execute(self) -> Result<()> {
        match self {
            Commands::Build {
                common,
                create,
                force,
            } => build_command(&common, create, force),
            Commands::Resolve { common } => resolve_command(&common),
            Commands::Clean { common, cache_only } => clean_command(&common, cache_only),
        }
    }
}
