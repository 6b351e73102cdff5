//! Pipeline state threaded through all build steps
//!
//! The state is replaced as a whole after every step: a plugin receives the
//! current value on stdin and answers with the complete successor on stdout.

pub mod component;
pub mod merge;

use crate::buildfile::{BuildFile, Component};
use crate::utils::resolve_path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub use component::{Artifact, ArtifactSpec, ComponentSpec, Element, ReferenceSpec};
pub use merge::{merge_artifacts, merge_elements, merge_labels, merge_provider};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Free form scratch values shared between plugins
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub state: Map<String, Value>,
    #[serde(rename = "buildfile", default, skip_serializing_if = "Option::is_none")]
    pub build_file: Option<BuildFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentSpec>,
}

impl PipelineState {
    pub fn new(build_file: BuildFile) -> Self {
        Self {
            state: Map::new(),
            build_file: Some(build_file),
            components: Vec::new(),
        }
    }

    /// Append the descriptor entry for a component, inheriting default
    /// version, provider and labels from the build file. Returns its index.
    pub fn add_component(&mut self, component: &Component) -> usize {
        let defaults = self.build_file.as_ref();
        let default_version = defaults.and_then(BuildFile::default_version);
        let default_labels = defaults.map(|bf| bf.labels.as_slice()).unwrap_or_default();
        let default_provider = defaults.and_then(|bf| bf.provider.as_ref());

        let spec = ComponentSpec {
            name: component.name.clone(),
            version: component
                .effective_version(default_version)
                .unwrap_or_default()
                .to_string(),
            provider: merge_provider(default_provider, component.provider.as_ref()),
            labels: merge_labels(default_labels, &component.labels),
            ..Default::default()
        };
        self.components.push(spec);
        self.components.len() - 1
    }
}

/// Per step environment handed to a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    /// Base directory for relative paths in the plugin configuration
    pub directory: PathBuf,
    /// Generation directory owned by this step
    pub gen_dir: PathBuf,
}

impl Environment {
    pub fn new(directory: impl Into<PathBuf>, gen_dir: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            gen_dir: gen_dir.into(),
        }
    }

    /// Resolve a path relative to the build file directory
    pub fn path(&self, path: impl AsRef<Path>) -> PathBuf {
        resolve_path(&self.directory, path)
    }

    /// Resolve a path relative to the step's generation directory
    pub fn gen_path(&self, path: impl AsRef<Path>) -> PathBuf {
        resolve_path(&self.gen_dir, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{Label, Provider};
    use serde_json::json;

    fn build_file() -> BuildFile {
        BuildFile {
            version: Some("1.0.0".to_string()),
            provider: Some(Provider::new("acme.org")),
            labels: vec![Label::new("team", "build"), Label::new("tier", "gold")],
            ..Default::default()
        }
    }

    #[test]
    fn test_add_component_inherits_defaults() {
        let mut state = PipelineState::new(build_file());
        let index = state.add_component(&Component {
            name: "acme.org/app".to_string(),
            labels: vec![Label::new("tier", "silver")],
            ..Default::default()
        });

        assert_eq!(index, 0);
        let spec = &state.components[0];
        assert_eq!(spec.key(), "acme.org/app:1.0.0");
        assert_eq!(spec.provider.name, "acme.org");
        assert_eq!(spec.labels.len(), 2);
        assert_eq!(spec.labels[1].value, json!("silver"));
    }

    #[test]
    fn test_add_component_overrides() {
        let mut state = PipelineState::new(build_file());
        state.add_component(&Component {
            name: "first".to_string(),
            ..Default::default()
        });
        let index = state.add_component(&Component {
            name: "second".to_string(),
            version: Some("2.0.0".to_string()),
            provider: Some(Provider::new("other.org")),
            ..Default::default()
        });

        assert_eq!(index, 1);
        assert_eq!(state.components[1].key(), "second:2.0.0");
        assert_eq!(state.components[1].provider.name, "other.org");
    }

    #[test]
    fn test_wire_format() {
        let mut state = PipelineState::default();
        state.state.insert("counter".to_string(), json!(1));
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value, json!({"state": {"counter": 1}}));

        let env = Environment::new("/work", "/work/gen/steps/abc");
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"directory": "/work", "genDir": "/work/gen/steps/abc"})
        );
        assert_eq!(env.path("src"), PathBuf::from("/work/src"));
        assert_eq!(env.gen_path("out"), PathBuf::from("/work/gen/steps/abc/out"));
    }
}
