//! Hierarchical component configuration.
//!
//! Every component directory may carry a `config/` directory with one file
//! per environment (`config/common.yaml`, `config/prod.yaml`, ...). A
//! [`ComponentConfig`] is the in-memory form of one such file: free-form
//! values under `config`, presentation controls (`namespace`,
//! `injectNamespace`, `disabled`), and a nested map of configs for
//! subcomponents.
//!
//! # Merge semantics
//!
//! [`ComponentConfig::merge`] is non-destructive with the receiver winning:
//! keys already present in the receiver are kept, missing keys are filled
//! from the source, nested mappings recurse, and sequences are replaced as a
//! unit (never unioned element-wise). The walker exploits this by merging
//! environment files in priority order — each earlier merge claims its keys
//! before later, lower-priority files are folded in.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use crate::core::{FabrikateError, Serialization};
use crate::utils::fs::ensure_dir;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Configuration for one component in one (merged) environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
    /// Directory containing this component's `config/` directory.
    #[serde(skip)]
    pub path: PathBuf,

    /// Format the config file was loaded in; writes preserve it.
    #[serde(skip)]
    pub serialization: Serialization,

    /// Kubernetes namespace to template charts with.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Whether to force `metadata.namespace` into generated manifests that
    /// lack one.
    #[serde(default, skip_serializing_if = "is_false")]
    pub inject_namespace: bool,

    /// Disabled components are skipped by the walker, along with their
    /// entire subtree.
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,

    /// Free-form values passed to the component's generator.
    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub config: Mapping,

    /// Configs for subcomponents, keyed by subcomponent name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subcomponents: BTreeMap<String, ComponentConfig>,
}

impl ComponentConfig {
    /// Creates an empty config rooted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    fn file_path(&self, environment: &str, serialization: Serialization) -> PathBuf {
        self.path
            .join("config")
            .join(format!("{environment}.{}", serialization.extension()))
    }

    /// Loads the config file for `environment` into `self`, replacing current
    /// contents. YAML is preferred, JSON is the fallback; an absent file
    /// leaves `self` empty and is not an error.
    pub fn load(&mut self, environment: &str) -> Result<()> {
        if let Some(loaded) = self.read_environment(environment)? {
            let path = std::mem::take(&mut self.path);
            *self = loaded;
            self.path = path;
        }
        Ok(())
    }

    /// Merges the config file for `environment` into `self`, with `self`
    /// winning on conflicts. An absent file is a no-op.
    pub fn merge_file(&mut self, environment: &str) -> Result<()> {
        if let Some(loaded) = self.read_environment(environment)? {
            self.merge(loaded);
        }
        Ok(())
    }

    fn read_environment(&self, environment: &str) -> Result<Option<ComponentConfig>> {
        let yaml_path = self.file_path(environment, Serialization::Yaml);
        let json_path = self.file_path(environment, Serialization::Json);

        let (config_path, serialization) = if yaml_path.exists() {
            (yaml_path, Serialization::Yaml)
        } else if json_path.exists() {
            (json_path, Serialization::Json)
        } else {
            return Ok(None);
        };

        debug!("loading config {}", config_path.display());
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read config {}", config_path.display()))?;

        let mut loaded: ComponentConfig = match serialization {
            Serialization::Yaml => serde_yaml::from_str(&contents).map_err(|err| {
                FabrikateError::Load {
                    path: config_path.clone(),
                    reason: err.to_string(),
                }
            })?,
            Serialization::Json => serde_json::from_str(&contents).map_err(|err| {
                FabrikateError::Load {
                    path: config_path.clone(),
                    reason: err.to_string(),
                }
            })?,
        };
        loaded.serialization = serialization;

        Ok(Some(loaded))
    }

    /// Deep-merges `other` into `self`; `self` wins on every conflict.
    ///
    /// Scalar conflicts keep the receiver's value, nested mappings recurse,
    /// and sequences are kept wholesale from the receiver. `namespace` fills
    /// from the source only when the receiver's is empty; the boolean flags
    /// fill only when the receiver's are unset.
    pub fn merge(&mut self, other: ComponentConfig) {
        if self.namespace.is_empty() {
            self.namespace = other.namespace;
        }
        if !self.inject_namespace {
            self.inject_namespace = other.inject_namespace;
        }
        if !self.disabled {
            self.disabled = other.disabled;
        }

        merge_mapping(&mut self.config, other.config);

        for (name, sub) in other.subcomponents {
            match self.subcomponents.entry(name) {
                std::collections::btree_map::Entry::Occupied(entry) => {
                    entry.into_mut().merge(sub);
                }
                std::collections::btree_map::Entry::Vacant(entry) => {
                    entry.insert(sub);
                }
            }
        }
    }

    /// Returns the config slot at `subcomponent_path` without creating
    /// missing slots.
    pub fn subcomponent_config(&self, subcomponent_path: &[String]) -> Option<&ComponentConfig> {
        let mut current = self;
        for name in subcomponent_path {
            current = current.subcomponents.get(name)?;
        }
        Some(current)
    }

    /// True when a config slot exists for every segment of
    /// `subcomponent_path`.
    pub fn has_subcomponent_config(&self, subcomponent_path: &[String]) -> bool {
        self.subcomponent_config(subcomponent_path).is_some()
    }

    /// Returns the config slot at `subcomponent_path`, creating empty slots
    /// along the way.
    pub fn get_subcomponent_config(&mut self, subcomponent_path: &[String]) -> &mut ComponentConfig {
        let mut current = self;
        for name in subcomponent_path {
            current = current.subcomponents.entry(name.clone()).or_default();
        }
        current
    }

    /// True when the dotted `config_path` resolves to an existing value in
    /// this config's `config` mapping.
    pub fn has_component_config(&self, config_path: &[String]) -> bool {
        let Some((first, rest)) = config_path.split_first() else {
            return true;
        };

        let mut current = match self.config.get(first.as_str()) {
            Some(value) => value,
            None => return false,
        };
        for key in rest {
            match current.as_mapping().and_then(|m| m.get(key.as_str())) {
                Some(value) => current = value,
                None => return false,
            }
        }
        true
    }

    /// Sets `value` at `config_path` in the config slot addressed by
    /// `subcomponent_path`, creating intermediate mappings as needed.
    ///
    /// Fails with [`FabrikateError::Merge`] when an intermediate segment
    /// already exists as a non-mapping value.
    pub fn set_config(
        &mut self,
        subcomponent_path: &[String],
        config_path: &[String],
        value: Value,
    ) -> Result<()> {
        let Some((leaf, parents)) = config_path.split_last() else {
            return Err(FabrikateError::Validation {
                reason: "config path must have at least one segment".to_string(),
            }
            .into());
        };

        let target = self.get_subcomponent_config(subcomponent_path);

        let mut current = &mut target.config;
        for (depth, key) in parents.iter().enumerate() {
            if current.get(key.as_str()).is_none() {
                current.insert(
                    Value::String(key.clone()),
                    Value::Mapping(Mapping::new()),
                );
            }
            current = match current.get_mut(key.as_str()).and_then(Value::as_mapping_mut) {
                Some(mapping) => mapping,
                None => {
                    return Err(FabrikateError::Merge {
                        key: config_path[..=depth].join("."),
                    }
                    .into())
                }
            };
        }

        current.insert(Value::String(leaf.clone()), value);
        Ok(())
    }

    /// Writes this config to `config/<environment>.<ext>` in the tracked
    /// serialization, creating `config/` as needed.
    pub fn write(&self, environment: &str) -> Result<()> {
        ensure_dir(&self.path.join("config"))?;

        let config_path = self.file_path(environment, self.serialization);
        let marshaled = match self.serialization {
            Serialization::Yaml => serde_yaml::to_string(self)
                .with_context(|| format!("failed to serialize config for {environment}"))?,
            Serialization::Json => {
                let mut json = serde_json::to_string_pretty(self)
                    .with_context(|| format!("failed to serialize config for {environment}"))?;
                json.push('\n');
                json
            }
        };

        debug!("writing config {}", config_path.display());
        std::fs::write(&config_path, marshaled)
            .with_context(|| format!("failed to write config {}", config_path.display()))
    }
}

/// Merges `src` into `dst`, receiver-wins, recursing through nested
/// mappings. Sequences are treated as opaque values: the receiver's stays.
fn merge_mapping(dst: &mut Mapping, src: Mapping) {
    for (key, value) in src {
        match dst.get_mut(&key) {
            Some(existing) => merge_value(existing, value),
            None => {
                dst.insert(key, value);
            }
        }
    }
}

fn merge_value(dst: &mut Value, src: Value) {
    if let (Value::Mapping(dst_map), Value::Mapping(src_map)) = (dst, src) {
        merge_mapping(dst_map, src_map);
    }
    // Anything else: the receiver wins, including sequence-vs-sequence.
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn yaml_config(source: &str) -> ComponentConfig {
        serde_yaml::from_str(source).unwrap()
    }

    #[test]
    fn merge_fills_missing_keys_and_keeps_existing() {
        let mut receiver = yaml_config("config:\n  replicas: 3\n  image: nginx\n");
        let source = yaml_config("config:\n  replicas: 1\n  port: 80\n");

        receiver.merge(source);

        assert_eq!(
            receiver.config.get("replicas"),
            Some(&Value::Number(3.into()))
        );
        assert_eq!(receiver.config.get("port"), Some(&Value::Number(80.into())));
        assert_eq!(
            receiver.config.get("image"),
            Some(&Value::String("nginx".to_string()))
        );
    }

    #[test]
    fn merge_recurses_through_nested_mappings() {
        let mut receiver = yaml_config("config:\n  server:\n    port: 8080\n");
        let source = yaml_config("config:\n  server:\n    port: 80\n    host: 0.0.0.0\n");

        receiver.merge(source);

        let server = receiver.config.get("server").unwrap().as_mapping().unwrap();
        assert_eq!(server.get("port"), Some(&Value::Number(8080.into())));
        assert_eq!(
            server.get("host"),
            Some(&Value::String("0.0.0.0".to_string()))
        );
    }

    #[test]
    fn merge_replaces_sequences_wholesale() {
        let mut receiver = yaml_config("config:\n  args: [a, b]\n");
        let source = yaml_config("config:\n  args: [c, d, e]\n");

        receiver.merge(source);

        let args = receiver.config.get("args").unwrap().as_sequence().unwrap();
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut once = yaml_config("config:\n  a: 1\nnamespace: obs\n");
        let source = yaml_config("config:\n  a: 2\n  b: 3\ninjectNamespace: true\n");

        once.merge(source.clone());
        let mut twice = once.clone();
        twice.merge(source);

        assert_eq!(once, twice);
    }

    #[test]
    fn namespace_fills_only_when_empty() {
        let mut receiver = yaml_config("namespace: keep\n");
        receiver.merge(yaml_config("namespace: other\ninjectNamespace: true\n"));
        assert_eq!(receiver.namespace, "keep");
        assert!(receiver.inject_namespace);

        let mut empty = ComponentConfig::default();
        empty.merge(yaml_config("namespace: fill\n"));
        assert_eq!(empty.namespace, "fill");
    }

    #[test]
    fn merge_descends_subcomponents() {
        let mut receiver = yaml_config("subcomponents:\n  web:\n    config:\n      replicas: 2\n");
        let source = yaml_config(
            "subcomponents:\n  web:\n    config:\n      replicas: 1\n      port: 80\n  db:\n    disabled: true\n",
        );

        receiver.merge(source);

        let web = receiver.subcomponents.get("web").unwrap();
        assert_eq!(web.config.get("replicas"), Some(&Value::Number(2.into())));
        assert_eq!(web.config.get("port"), Some(&Value::Number(80.into())));
        assert!(receiver.subcomponents.get("db").unwrap().disabled);
    }

    #[test]
    fn set_config_creates_intermediate_mappings() {
        let mut config = ComponentConfig::default();
        config
            .set_config(
                &["web".to_string()],
                &["data".to_string(), "replicas".to_string()],
                Value::String("4".to_string()),
            )
            .unwrap();

        let web = config.subcomponents.get("web").unwrap();
        let data = web.config.get("data").unwrap().as_mapping().unwrap();
        assert_eq!(data.get("replicas"), Some(&Value::String("4".to_string())));
    }

    #[test]
    fn set_config_rejects_descending_through_scalars() {
        let mut config = yaml_config("config:\n  replicas: 3\n");
        let err = config
            .set_config(
                &[],
                &["replicas".to_string(), "min".to_string()],
                Value::String("1".to_string()),
            )
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<FabrikateError>(),
            Some(FabrikateError::Merge { .. })
        ));
    }

    #[test]
    fn has_component_config_walks_nested_values() {
        let config = yaml_config("config:\n  data:\n    replicas: 3\n");
        assert!(config.has_component_config(&["data".to_string(), "replicas".to_string()]));
        assert!(!config.has_component_config(&["data".to_string(), "missing".to_string()]));
        assert!(!config.has_component_config(&["missing".to_string()]));
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut config = ComponentConfig::new(dir.path());
        config.namespace = "obs".to_string();
        config.inject_namespace = true;
        config
            .set_config(&[], &["replicas".to_string()], Value::Number(3.into()))
            .unwrap();
        config.write("prod").unwrap();

        let mut reloaded = ComponentConfig::new(dir.path());
        reloaded.load("prod").unwrap();

        assert_eq!(reloaded.namespace, "obs");
        assert!(reloaded.inject_namespace);
        assert_eq!(
            reloaded.config.get("replicas"),
            Some(&Value::Number(3.into()))
        );
        assert_eq!(reloaded.serialization, Serialization::Yaml);
    }

    #[test]
    fn load_prefers_yaml_and_falls_back_to_json() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(
            dir.path().join("config/prod.json"),
            r#"{"config": {"replicas": 7}}"#,
        )
        .unwrap();

        let mut config = ComponentConfig::new(dir.path());
        config.load("prod").unwrap();
        assert_eq!(
            config.config.get("replicas"),
            Some(&Value::Number(7.into()))
        );
        assert_eq!(config.serialization, Serialization::Json);
    }

    #[test]
    fn absent_environment_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let mut config = ComponentConfig::new(dir.path());
        config.merge_file("prod").unwrap();
        assert!(config.config.is_empty());
    }
}
