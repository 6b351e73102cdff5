//! pipewright-core - plugin driven build pipelines
//!
//! This crate provides:
//! - The build file model and plugin specifications
//! - A content addressed plugin cache resolving plugins from repositories
//! - The execution engine threading a pipeline state through plugin steps
//! - The plugin side of the step protocol for writing build plugins
pub mod archive;
pub mod buildfile;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod meta;
pub mod options;
pub mod plugin;
pub mod ppi;
pub mod protocol;
pub mod repository;
pub mod state;
pub mod template;
pub mod utils;

// Re-export commonly used types
pub use archive::{ArchiveWriter, DirectoryArchive};
pub use buildfile::{Build, BuildFile, Component};
pub use cache::{PluginCache, ResolveSession};
pub use config::Settings;
pub use engine::Execution;
pub use error::{Error, Result, ResultExt};
pub use options::BuildOptions;
pub use plugin::{HashId, PluginSpec};
pub use protocol::StepScope;
pub use state::{Environment, PipelineState};
