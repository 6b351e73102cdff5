use crate::plugin::PluginSpec;

/// Resolution bookkeeping for one build run.
///
/// Holds the specifications resolved so far, so that in re-resolve mode each
/// distinct specification contacts its repository at most once per run.
#[derive(Debug, Clone, Default)]
pub struct ResolveSession {
    reresolve: bool,
    discovered: Vec<PluginSpec>,
}

impl ResolveSession {
    pub fn new(reresolve: bool) -> Self {
        Self {
            reresolve,
            discovered: Vec::new(),
        }
    }

    /// Whether a cached binding for `spec` may be used without asking the
    /// repository again
    pub fn is_discovered(&self, spec: &PluginSpec) -> bool {
        !self.reresolve || self.discovered.contains(spec)
    }

    pub fn discover(&mut self, spec: &PluginSpec) {
        if !self.discovered.contains(spec) {
            self.discovered.push(spec.clone());
        }
    }
}
