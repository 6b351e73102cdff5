//! pipewright-constructor: merge a component constructor file into the
//! component entry of the current step

use pipewright_core::error::{Error, Result, ResultExt};
use pipewright_core::meta::{Label, Provider};
use pipewright_core::ppi::{Handler, Invocation, Plugin, PluginKind};
use pipewright_core::state::{
    ArtifactSpec, ReferenceSpec, merge_artifacts, merge_elements, merge_labels, merge_provider,
};
use pipewright_core::template::{Templater, VarsTemplater};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const CONFIG_HELP: &str = "\
- constructor (string, required) path of the constructor file relative to
  the build file
- values (map) values for ${name} placeholders in the constructor file
- useEnv (bool) make environment variables available to the templating,
  values take precedence
- requires (list of strings) resources that earlier steps must have added
";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Config {
    #[serde(default)]
    constructor: String,
    #[serde(default)]
    values: BTreeMap<String, Value>,
    #[serde(default)]
    use_env: bool,
    #[serde(default)]
    requires: Vec<String>,
}

/// Content of a constructor file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Constructor {
    name: String,
    version: String,
    provider: Option<Provider>,
    labels: Vec<Label>,
    resources: Vec<ArtifactSpec>,
    sources: Vec<ArtifactSpec>,
    references: Vec<ReferenceSpec>,
}

/// Template variables: `env` entries overlaid by the configured values
fn template_vars(
    values: &BTreeMap<String, Value>,
    env: impl IntoIterator<Item = (String, String)>,
) -> BTreeMap<String, String> {
    let mut vars: BTreeMap<String, String> = env.into_iter().collect();
    for (name, value) in values {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        vars.insert(name.clone(), text);
    }
    vars
}

struct ConstructorHandler;

impl Handler for ConstructorHandler {
    type Config = Config;

    fn handle(&self, invocation: &mut Invocation<Config>) -> Result<()> {
        let config = &invocation.config;
        if config.constructor.is_empty() {
            return Err(Error::Config(
                "constructor required in plugin config".to_string(),
            ));
        }

        let path = invocation.env.path(&config.constructor);
        let data = std::fs::read_to_string(&path).with_context(|| {
            format!("cannot read constructor {:?}[{}]", config.constructor, path.display())
        })?;
        let env: Vec<(String, String)> = if config.use_env {
            std::env::vars().collect()
        } else {
            Vec::new()
        };
        let data = VarsTemplater::new(template_vars(&config.values, env))
            .process(&data)
            .context("templating failed")?;
        let constructor: Constructor = serde_yaml::from_str(&data).with_context(|| {
            format!("cannot decode constructor {:?}[{}]", config.constructor, path.display())
        })?;
        let source_file = path.to_string_lossy().into_owned();
        let requires = config.requires.clone();

        let component = invocation
            .component_mut()
            .ok_or_else(|| Error::Plugin("no component for this step".to_string()))?;
        for name in &requires {
            if component.resource(name).is_none() {
                return Err(Error::Plugin(format!(
                    "required resource {:?} not present in component {}",
                    name,
                    component.key()
                )));
            }
        }

        if !constructor.name.is_empty() {
            component.name = constructor.name;
        }
        if !constructor.version.is_empty() {
            component.version = constructor.version;
        }
        component.provider = merge_provider(Some(&component.provider), constructor.provider.as_ref());
        component.labels = merge_labels(&component.labels, &constructor.labels);
        component.resources = merge_artifacts(&component.resources, constructor.resources, &source_file);
        component.sources = merge_artifacts(&component.sources, constructor.sources, &source_file);
        component.references = merge_elements(&component.references, constructor.references, None);
        debug!(
            "merged {} into {}",
            source_file,
            component.key()
        );
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    Plugin::new("pipewright-constructor", PluginKind::ComponentOnly, ConstructorHandler)
        .with_config_help(CONFIG_HELP)
        .run(&args, std::io::stdin().lock(), std::io::stdout().lock())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::state::{ComponentSpec, Environment, PipelineState};
    use pipewright_core::StepScope;
    use serde_json::json;
    use tempfile::TempDir;

    fn invocation(dir: &TempDir, config: Value, component: ComponentSpec) -> Invocation<Config> {
        let mut state = PipelineState::default();
        state.components.push(component);
        Invocation {
            env: Environment::new(dir.path(), dir.path().join("gen")),
            scope: StepScope::Component(0),
            config: serde_json::from_value(config).unwrap(),
            state,
        }
    }

    fn component() -> ComponentSpec {
        ComponentSpec {
            name: "acme.org/app".to_string(),
            version: "1.0.0".to_string(),
            provider: Provider::new("acme.org"),
            ..Default::default()
        }
    }

    #[test]
    fn test_merges_constructor_into_component() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("component.yaml"),
            "version: ${tag}\nlabels:\n  - name: team\n    value: core\nresources:\n  - name: bin\n    type: executable\n    input: {path: out/bin}\nreferences:\n  - name: base\n    componentName: acme.org/base\n    version: 2.0.0\n",
        )
        .unwrap();

        let mut inv = invocation(
            &dir,
            json!({"constructor": "component.yaml", "values": {"tag": "1.1.0"}}),
            component(),
        );
        ConstructorHandler.handle(&mut inv).unwrap();

        let c = &inv.state.components[0];
        assert_eq!(c.name, "acme.org/app");
        assert_eq!(c.version, "1.1.0");
        assert_eq!(c.provider.name, "acme.org");
        assert_eq!(c.labels[0].name, "team");
        let bin = c.resource("bin").unwrap();
        assert_eq!(bin.kind, "executable");
        assert_eq!(bin.extra["input"], json!({"path": "out/bin"}));
        let expected = dir.path().join("component.yaml");
        assert_eq!(bin.source_file.as_deref(), Some(&*expected.to_string_lossy()));
        assert_eq!(c.references[0].component_name, "acme.org/base");
    }

    #[test]
    fn test_missing_required_resource() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("c.yaml"), "{}").unwrap();
        let mut inv = invocation(
            &dir,
            json!({"constructor": "c.yaml", "requires": ["bin"]}),
            component(),
        );
        let err = ConstructorHandler.handle(&mut inv).unwrap_err();
        assert_eq!(
            err.to_string(),
            "plugin error: required resource \"bin\" not present in component acme.org/app:1.0.0"
        );
    }

    #[test]
    fn test_values_override_environment() {
        let values = BTreeMap::from([
            ("tag".to_string(), json!("1.0.0")),
            ("count".to_string(), json!(3)),
        ]);
        let env = vec![
            ("tag".to_string(), "from-env".to_string()),
            ("HOST".to_string(), "builder".to_string()),
        ];
        let vars = template_vars(&values, env);
        assert_eq!(vars["tag"], "1.0.0");
        assert_eq!(vars["count"], "3");
        assert_eq!(vars["HOST"], "builder");
        assert_eq!(template_vars(&values, Vec::new()).len(), 2);
    }

    #[test]
    fn test_use_env_reaches_templating() {
        let Some((name, value)) = std::env::vars().find(|(k, v)| {
            !k.is_empty() && !v.is_empty() && k.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && v.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
        }) else {
            return;
        };
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("c.yaml"),
            format!("labels:\n  - name: from-env\n    value: \"${{{name}}}\"\n"),
        )
        .unwrap();

        let mut inv = invocation(&dir, json!({"constructor": "c.yaml", "useEnv": true}), component());
        ConstructorHandler.handle(&mut inv).unwrap();
        assert_eq!(inv.state.components[0].labels[0].value, json!(value));

        let mut inv = invocation(&dir, json!({"constructor": "c.yaml"}), component());
        ConstructorHandler.handle(&mut inv).unwrap();
        assert_eq!(inv.state.components[0].labels[0].value, json!(format!("${{{name}}}")));
    }

    #[test]
    fn test_constructor_required() {
        let dir = TempDir::new().unwrap();
        let mut inv = invocation(&dir, json!({}), component());
        assert!(matches!(
            ConstructorHandler.handle(&mut inv),
            Err(Error::Config(_))
        ));
    }
}
