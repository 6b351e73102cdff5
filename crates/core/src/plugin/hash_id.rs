use crate::error::Result;
use crate::utils::canonical_digest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical (component, version, resource) key of a plugin.
///
/// The digest of its canonical JSON form names the cached binary, so two
/// identities share a cache slot exactly when their fields are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashId {
    pub component: String,
    pub version: String,
    pub resource: String,
}

impl HashId {
    pub fn new(
        component: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// All three fields are known; such identities are immutable by convention
    pub fn is_complete(&self) -> bool {
        !self.component.is_empty() && !self.version.is_empty() && !self.resource.is_empty()
    }

    pub fn digest(&self) -> Result<String> {
        canonical_digest(self)
    }
}

impl fmt::Display for HashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.resource.is_empty() {
            write!(f, "{}:{}", self.component, self.version)
        } else {
            write!(f, "{}:{}[{}]", self.component, self.version, self.resource)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_identities_share_digest() {
        let a = HashId::new("acme.org/plugins", "1.0.0", "gobuild");
        let b = HashId::new(
            String::from("acme.org/plugins"),
            "1.0.0".to_string(),
            "gobuild",
        );
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_ne!(
            a.digest().unwrap(),
            HashId::new("acme.org/plugins", "1.0.1", "gobuild").digest().unwrap()
        );
        assert_eq!(a.digest().unwrap().len(), 64);
    }

    #[test]
    fn test_completeness_and_display() {
        let partial = HashId::new("acme.org/plugins", "", "");
        assert!(!partial.is_complete());
        assert_eq!(partial.to_string(), "acme.org/plugins:");

        let full = HashId::new("acme.org/plugins", "1.0.0", "gobuild");
        assert!(full.is_complete());
        assert_eq!(full.to_string(), "acme.org/plugins:1.0.0[gobuild]");
    }
}
