use std::fmt::Display;
use std::io;

/// Errors that can occur while resolving plugins or executing a build
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid plugin specification: {0}")]
    Specification(String),

    #[error("resolution error: {0}")]
    Resolution(String),

    #[error("no versions for component {component} match the constraints {constraint}")]
    NoMatchingVersion {
        component: String,
        constraint: String,
    },

    #[error("resource {0:?} not found")]
    ResourceNotFound(String),

    #[error("no build plugin resource found")]
    NoPluginResource,

    #[error("resource {name:?} has wrong type: {kind}")]
    WrongResourceType { name: String, kind: String },

    #[error("os {os} architecture {arch} not found for resource {name:?}")]
    PlatformNotFound {
        name: String,
        os: String,
        arch: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("plugin {plugin} failed: {message}")]
    Subprocess { plugin: String, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("plugin error: {0}")]
    Plugin(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with an additional context identifier
    pub fn context(self, context: impl Display) -> Self {
        Error::Context {
            context: context.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error below all context wrappers
    pub fn root(&self) -> &Error {
        let mut current = self;
        while let Error::Context { source, .. } = current {
            current = source;
        }
        current
    }

    pub fn is_specification(&self) -> bool {
        matches!(self.root(), Error::Specification(_))
    }
}

/// Result type alias for pipewright operations
pub type Result<T> = std::result::Result<T, Error>;

/// Attach context to errors on their way out
pub trait ResultExt<T> {
    fn context(self, context: impl Display) -> Result<T>;

    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Display) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_chain_renders_outer_first() {
        let err = Error::Resolution("component acme.org/x not found".to_string())
            .context("step 2")
            .context("component app:1.0.0");

        insta::assert_snapshot!(
            err.to_string(),
            @"component app:1.0.0: step 2: resolution error: component acme.org/x not found"
        );
    }

    #[test]
    fn test_root_skips_wrappers() {
        let err: Result<()> = Err(Error::ResourceNotFound("demo".to_string()));
        let err = err.context("step 1").unwrap_err();

        assert!(matches!(err.root(), Error::ResourceNotFound(name) if name == "demo"));
        assert!(!err.is_specification());
    }
}
