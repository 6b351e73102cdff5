//! Content addressed store of resolved plugin executables

pub mod plugin_cache;
pub mod session;

pub use plugin_cache::{CacheEntry, Plugin, PluginCache};
pub use session::ResolveSession;
