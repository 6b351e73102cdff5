//! Sequential execution of build steps
//!
//! Global steps run first, then the steps of every selected component, all
//! against one pipeline state that each step replaces as a whole.

mod execution;

pub use execution::{Execution, ResolvedStep, clean, step_gen_dir};
