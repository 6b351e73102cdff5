//! Settings file handling for pipewright

mod settings;

pub use settings::{ALT_SETTINGS_FILE, SETTINGS_FILE, Settings};
