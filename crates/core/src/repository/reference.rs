//! Compact reference grammar: `[<type>::]<location>[//<component>[:<version>]]`

use crate::error::{Error, Result};
use std::fmt;

/// Repository part of a reference: an optional type and a location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformRepositorySpec {
    pub kind: Option<String>,
    pub location: String,
}

/// A parsed reference, optionally naming a component and version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSpec {
    pub repository: UniformRepositorySpec,
    pub component: Option<String>,
    pub version: Option<String>,
}

impl RefSpec {
    pub fn is_version(&self) -> bool {
        self.version.is_some()
    }
}

/// Parse a repository-only string
pub fn parse_repo(input: &str) -> Result<UniformRepositorySpec> {
    let input = input.trim();
    let (kind, location) = match input.split_once("::") {
        Some((kind, location)) => {
            if kind.is_empty() {
                return Err(Error::Specification(format!(
                    "empty repository type in {input:?}"
                )));
            }
            (Some(kind.to_string()), location)
        }
        None => (None, input),
    };
    if location.is_empty() {
        return Err(Error::Specification(format!(
            "repository location missing in {input:?}"
        )));
    }
    Ok(UniformRepositorySpec {
        kind,
        location: location.to_string(),
    })
}

/// Parse a full reference. The component part is optional.
pub fn parse_ref(input: &str) -> Result<RefSpec> {
    let input = input.trim();
    let Some(split) = component_separator(input) else {
        return Ok(RefSpec {
            repository: parse_repo(input)?,
            component: None,
            version: None,
        });
    };

    let repository = parse_repo(&input[..split])?;
    let rest = &input[split + 2..];
    if rest.is_empty() {
        return Err(Error::Specification(format!(
            "component missing after '//' in {input:?}"
        )));
    }

    let (component, version) = match rest.rsplit_once(':') {
        Some((component, version)) => {
            if component.is_empty() || version.is_empty() {
                return Err(Error::Specification(format!(
                    "invalid component version {rest:?} in {input:?}"
                )));
            }
            (component.to_string(), Some(version.to_string()))
        }
        None => (rest.to_string(), None),
    };

    Ok(RefSpec {
        repository,
        component: Some(component),
        version,
    })
}

/// Position of the `//` separating location and component, ignoring a URL
/// scheme separator such as `https://`.
fn component_separator(input: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(pos) = input[offset..].find("//") {
        let at = offset + pos;
        if at > 0 && input.as_bytes()[at - 1] == b':' {
            offset = at + 2;
            continue;
        }
        return Some(at);
    }
    None
}

impl fmt::Display for UniformRepositorySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Some(kind) => write!(f, "{kind}::{}", self.location),
            None => write!(f, "{}", self.location),
        }
    }
}

impl fmt::Display for RefSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(component) = &self.component {
            write!(f, "//{component}")?;
            if let Some(version) = &self.version {
                write!(f, ":{version}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_reference() {
        let spec = parse_ref("directory::./repo//acme.org/plugins/go:1.2.0").unwrap();
        assert_eq!(spec.repository.kind.as_deref(), Some("directory"));
        assert_eq!(spec.repository.location, "./repo");
        assert_eq!(spec.component.as_deref(), Some("acme.org/plugins/go"));
        assert_eq!(spec.version.as_deref(), Some("1.2.0"));
        assert_eq!(spec.to_string(), "directory::./repo//acme.org/plugins/go:1.2.0");
    }

    #[test]
    fn test_parse_reference_without_version() {
        let spec = parse_ref("/srv/repo//acme.org/plugins").unwrap();
        assert_eq!(spec.repository.kind, None);
        assert_eq!(spec.component.as_deref(), Some("acme.org/plugins"));
        assert!(!spec.is_version());
    }

    #[test]
    fn test_parse_reference_skips_url_scheme() {
        let spec = parse_ref("oci::https://ghcr.io/acme//acme.org/plugins:1.0.0").unwrap();
        assert_eq!(spec.repository.location, "https://ghcr.io/acme");
        assert_eq!(spec.component.as_deref(), Some("acme.org/plugins"));
    }

    #[test]
    fn test_parse_repo_only() {
        let spec = parse_ref("./repo").unwrap();
        assert_eq!(spec.repository.location, "./repo");
        assert_eq!(spec.component, None);
    }

    #[test]
    fn test_parse_invalid_references() {
        assert!(parse_ref("./repo//").is_err());
        assert!(parse_ref("./repo//comp:").is_err());
        assert!(parse_ref("::./repo").is_err());
        assert!(parse_repo("").is_err());
    }
}
