//! The component model.
//!
//! A component is one node in a deployment definition tree: a name, a way of
//! obtaining content (`method` + `source`), a generator selection (`type`),
//! lifecycle hooks, and an ordered list of subcomponents. Components are
//! declared in `component.yaml` (or `component.json`) files; the walker
//! creates short-lived [`Component`] values from disk and never writes them
//! back — only the CLI mutators (`add`, `remove`) persist components.
//!
//! Transient fields (`physical_path`, `logical_path`, `config`, `manifest`)
//! are filled in by the walker and generators and never serialized.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::ComponentConfig;
use crate::core::{FabrikateError, Serialization};
use crate::generators::Generator;
use crate::session::Session;
use crate::utils::fs::{ensure_dir, remove_dir_idempotent};

/// Hook executed before a component's install step.
pub const HOOK_BEFORE_INSTALL: &str = "before-install";
/// Hook executed after a component's install step.
pub const HOOK_AFTER_INSTALL: &str = "after-install";
/// Hook executed before a component's generate step.
pub const HOOK_BEFORE_GENERATE: &str = "before-generate";
/// Hook executed after a component's generate step.
pub const HOOK_AFTER_GENERATE: &str = "after-generate";

/// One node of a deployment definition tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Component {
    /// Component name; unique among its siblings.
    #[serde(default)]
    pub name: String,

    /// Generator selection: `component` (default), `helm`, or `static`.
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub component_type: String,

    /// Deprecated alias for `type`; migrated at load time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generator: String,

    /// Lifecycle hooks: hook name → ordered shell commands.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hooks: BTreeMap<String, Vec<String>>,

    /// Remote URL or local path the component's content comes from.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,

    /// How `source` is fetched: `git`, `helm`, `local`, or `http`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,

    /// Sub-path inside `source` to a chart or component root.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// Commit SHA, tag, or chart version to pin.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Git branch; only meaningful when `method` is `git`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,

    /// Deprecated; kept so old definitions still parse.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub repositories: BTreeMap<String, String>,

    /// Child components, kept sorted ascending by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subcomponents: Vec<Component>,

    /// Merged configuration for the active environments.
    #[serde(skip)]
    pub config: ComponentConfig,

    /// Format the component file was read in.
    #[serde(skip)]
    pub serialization: Serialization,

    /// On-disk directory of this component.
    #[serde(skip)]
    pub physical_path: PathBuf,

    /// `/`-rooted position of this component in the tree; mirrored into the
    /// generated output directory.
    #[serde(skip)]
    pub logical_path: String,

    /// Rendered manifest text, filled by the generate pass.
    #[serde(skip)]
    pub manifest: String,
}

impl Component {
    /// True when this component is fetched from elsewhere rather than
    /// declared inline: plain `component` type with a non-empty source.
    pub fn is_remote(&self) -> bool {
        (self.component_type.is_empty() || self.component_type == "component")
            && !self.source.is_empty()
    }

    /// Relative filesystem slot this component occupies under its parent:
    /// `components/<name>` for git, the source path for local components,
    /// the parent directory itself otherwise.
    pub fn relative_path_to(&self) -> String {
        if self.method == "git" {
            format!("components/{}", self.name)
        } else if !self.source.is_empty() {
            self.source.clone()
        } else {
            "./".to_string()
        }
    }

    /// Applies legacy-field migrations and defaults in place.
    ///
    /// The deprecated `generator` field moves to `component_type`, an empty
    /// type defaults to `component`, and a `branch` on a non-git method is
    /// dropped with a warning.
    pub fn apply_defaults(&mut self) {
        if !self.generator.is_empty() {
            warn!(
                "DEPRECATION: field 'generator' is deprecated; use 'type' in component '{}'",
                self.name
            );
            self.component_type = std::mem::take(&mut self.generator);
        }

        if !self.repositories.is_empty() {
            warn!(
                "DEPRECATION: field 'repositories' is deprecated and ignored in component '{}'",
                self.name
            );
        }

        if self.component_type.is_empty() {
            self.component_type = "component".to_string();
        }

        if !self.branch.is_empty() && self.method != "git" {
            warn!(
                "component '{}' specifies branch '{}' with method '{}'; branch only applies to git and will be ignored",
                self.name, self.branch, self.method
            );
            self.branch.clear();
        }
    }

    /// Loads the component definition at `self.physical_path`.
    ///
    /// YAML is preferred over JSON; finding both files is an error, as is
    /// finding neither. The caller-supplied paths and config carry over into
    /// the loaded value.
    pub fn load(&self) -> Result<Component> {
        let yaml_path = self.physical_path.join("component.yaml");
        let json_path = self.physical_path.join("component.json");

        let (component_path, serialization) = match (yaml_path.exists(), json_path.exists()) {
            (true, true) => {
                return Err(FabrikateError::Load {
                    path: self.physical_path.clone(),
                    reason: "only one of component.yaml or component.json may exist per component; found both".to_string(),
                }
                .into())
            }
            (true, false) => (yaml_path, Serialization::Yaml),
            (false, true) => (json_path, Serialization::Json),
            (false, false) => {
                return Err(FabrikateError::Load {
                    path: self.physical_path.clone(),
                    reason: "component.yaml or component.json not found".to_string(),
                }
                .into())
            }
        };

        info!("loading {}", component_path.display());
        let contents = std::fs::read_to_string(&component_path)
            .with_context(|| format!("failed to read {}", component_path.display()))?;

        let mut loaded: Component = match serialization {
            Serialization::Yaml => {
                serde_yaml::from_str(&contents).map_err(|err| FabrikateError::Load {
                    path: self.physical_path.clone(),
                    reason: err.to_string(),
                })?
            }
            Serialization::Json => {
                serde_json::from_str(&contents).map_err(|err| FabrikateError::Load {
                    path: self.physical_path.clone(),
                    reason: err.to_string(),
                })?
            }
        };

        loaded.serialization = serialization;
        loaded.apply_defaults();
        loaded.physical_path = self.physical_path.clone();
        loaded.logical_path = self.logical_path.clone();
        loaded.config = ComponentConfig::new(&self.physical_path);
        loaded.config.merge(self.config.clone());

        Ok(loaded)
    }

    /// Merges the config files for each environment (in priority order) and
    /// finally `common` into this component's config.
    pub fn load_config(&mut self, environments: &[String]) -> Result<()> {
        self.config.path = self.physical_path.clone();
        for environment in environments {
            self.config.merge_file(environment)?;
        }
        self.config.merge_file("common")
    }

    /// Runs the configured commands for `hook`, if any, via `sh -c` with the
    /// component directory as working directory.
    ///
    /// A non-zero exit fails with [`FabrikateError::Hook`] carrying the
    /// command and its combined output.
    pub async fn execute_hook(&self, hook: &str) -> Result<()> {
        let Some(commands) = self.hooks.get(hook) else {
            return Ok(());
        };

        info!("executing hooks for: {hook}");
        for command in commands {
            if command.is_empty() {
                continue;
            }

            info!("executing command: {command}");
            let output = Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&self.physical_path)
                .output()
                .await
                .with_context(|| format!("failed to execute hook command `{command}`"))?;

            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            if !output.stderr.is_empty() {
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
            }

            if !output.status.success() {
                return Err(FabrikateError::Hook {
                    command: command.clone(),
                    output: combined,
                }
                .into());
            }

            if !combined.trim().is_empty() {
                info!("{}", combined.trim());
            }
        }

        Ok(())
    }

    /// Clones this component into `<root>/components/<name>` when it is a
    /// remote git component; all other kinds are a no-op.
    pub async fn install_remote(&self, root: &Path, session: &Session) -> Result<()> {
        let is_component_type =
            self.component_type.is_empty() || self.component_type == "component";
        if !is_component_type || self.method != "git" {
            return Ok(());
        }

        ensure_dir(&root.join("components"))?;

        let slot = root.join(self.relative_path_to());
        remove_dir_idempotent(&slot)?;

        info!(
            "installing component '{}' with git from '{}'",
            self.name, self.source
        );
        session
            .git
            .clone_into(&self.source, &self.version, &self.branch, &slot, &session.tokens)
            .await
    }

    /// Install lifecycle: `before-install` hook, remote subcomponent
    /// installation, generator install, `after-install` hook.
    pub async fn install(
        &self,
        root: &Path,
        generator: Option<&dyn Generator>,
        session: &Session,
    ) -> Result<()> {
        self.execute_hook(HOOK_BEFORE_INSTALL).await?;

        for subcomponent in &self.subcomponents {
            subcomponent.install_remote(root, session).await?;
        }

        if let Some(generator) = generator {
            generator.install(self, session).await?;
        }

        self.execute_hook(HOOK_AFTER_INSTALL).await
    }

    /// Generate lifecycle: `before-generate` hook, manifest rendering,
    /// `after-generate` hook.
    pub async fn generate(
        &mut self,
        generator: Option<&dyn Generator>,
        session: &Session,
    ) -> Result<()> {
        self.execute_hook(HOOK_BEFORE_GENERATE).await?;

        let manifest = match generator {
            Some(generator) => generator.generate(self, session).await?,
            None => String::new(),
        };
        self.manifest = manifest;

        self.execute_hook(HOOK_AFTER_GENERATE).await
    }

    /// Upserts `subcomponent` by name and restores the ascending name order.
    pub fn add_subcomponent(&mut self, subcomponent: Component) {
        self.subcomponents.retain(|existing| existing.name != subcomponent.name);
        self.subcomponents.push(subcomponent);
        self.subcomponents.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Removes the subcomponent named `name`, if present.
    pub fn remove_subcomponent(&mut self, name: &str) {
        self.subcomponents.retain(|existing| existing.name != name);
    }

    /// Writes the component definition to `component.<ext>` at its physical
    /// path, in the serialization it was read in.
    pub fn write(&self) -> Result<()> {
        ensure_dir(&self.physical_path)?;

        let mut component = self.clone();
        component
            .subcomponents
            .sort_by(|a, b| a.name.cmp(&b.name));

        let marshaled = match self.serialization {
            Serialization::Yaml => serde_yaml::to_string(&component)
                .with_context(|| format!("failed to serialize component '{}'", self.name))?,
            Serialization::Json => {
                let mut json = serde_json::to_string_pretty(&component)
                    .with_context(|| format!("failed to serialize component '{}'", self.name))?;
                json.push('\n');
                json
            }
        };

        let component_path = self
            .physical_path
            .join(format!("component.{}", self.serialization.extension()));
        info!("writing {}", component_path.display());
        std::fs::write(&component_path, marshaled)
            .with_context(|| format!("failed to write {}", component_path.display()))
    }

    /// Reads the optional `access.yaml` sidecar (repository URL → environment
    /// variable name) and resolves each entry against the environment.
    ///
    /// Unset or empty variables are skipped with a warning; an absent file
    /// yields an empty map.
    pub fn access_tokens(&self) -> Result<BTreeMap<String, String>> {
        let access_path = self.physical_path.join("access.yaml");
        if !access_path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = std::fs::read_to_string(&access_path)
            .with_context(|| format!("failed to read {}", access_path.display()))?;
        let declared: BTreeMap<String, String> = serde_yaml::from_str(&contents)
            .map_err(|err| FabrikateError::Load {
                path: access_path.clone(),
                reason: err.to_string(),
            })?;

        let mut resolved = BTreeMap::new();
        for (repository, variable) in declared {
            match std::env::var(&variable) {
                Ok(token) if !token.is_empty() => {
                    resolved.insert(repository, token);
                }
                _ => warn!(
                    "access token environment variable '{variable}' for repository '{repository}' is unset or empty"
                ),
            }
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn named(name: &str) -> Component {
        Component {
            name: name.to_string(),
            ..Component::default()
        }
    }

    #[test]
    fn add_subcomponent_sorts_ascending() {
        let mut component = named("root");
        component.add_subcomponent(named("c"));
        component.add_subcomponent(named("a"));
        component.add_subcomponent(named("b"));

        let names: Vec<&str> = component.subcomponents.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn add_subcomponent_replaces_by_name() {
        let mut component = named("root");
        component.add_subcomponent(named("a"));
        component.add_subcomponent(named("b"));
        component.add_subcomponent(named("c"));

        let mut replacement = named("b");
        replacement.source = "https://example.com/new".to_string();
        component.add_subcomponent(replacement);

        assert_eq!(component.subcomponents.len(), 3);
        assert_eq!(component.subcomponents[1].source, "https://example.com/new");
    }

    #[test]
    fn remove_subcomponent_is_idempotent() {
        let mut component = named("root");
        component.add_subcomponent(named("a"));
        component.remove_subcomponent("a");
        component.remove_subcomponent("a");
        assert!(component.subcomponents.is_empty());
    }

    #[test]
    fn apply_defaults_migrates_generator_field() {
        let mut component = named("legacy");
        component.generator = "helm".to_string();
        component.apply_defaults();
        assert_eq!(component.component_type, "helm");
        assert!(component.generator.is_empty());
    }

    #[test]
    fn apply_defaults_clears_branch_on_non_git_methods() {
        let mut component = named("chart");
        component.method = "helm".to_string();
        component.branch = "main".to_string();
        component.apply_defaults();
        assert!(component.branch.is_empty());

        let mut git_component = named("repo");
        git_component.method = "git".to_string();
        git_component.branch = "main".to_string();
        git_component.apply_defaults();
        assert_eq!(git_component.branch, "main");
    }

    #[test]
    fn relative_path_depends_on_method() {
        let mut component = named("infra");
        component.method = "git".to_string();
        assert_eq!(component.relative_path_to(), "components/infra");

        component.method = "local".to_string();
        component.source = "./shared".to_string();
        assert_eq!(component.relative_path_to(), "./shared");

        component.source.clear();
        assert_eq!(component.relative_path_to(), "./");
    }

    #[test]
    fn remote_requires_plain_type_and_source() {
        let mut component = named("x");
        component.source = "https://example.com/repo".to_string();
        assert!(component.is_remote());

        component.component_type = "component".to_string();
        assert!(component.is_remote());

        component.component_type = "helm".to_string();
        assert!(!component.is_remote());

        component.component_type = "component".to_string();
        component.source.clear();
        assert!(!component.is_remote());
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut component = named("root");
        component.physical_path = dir.path().to_path_buf();
        component.method = "git".to_string();
        component.add_subcomponent({
            let mut sub = named("web");
            sub.component_type = "static".to_string();
            sub.path = "manifests".to_string();
            sub
        });
        component
            .hooks
            .insert(HOOK_BEFORE_INSTALL.to_string(), vec!["echo hi".to_string()]);
        component.write().unwrap();

        let loader = Component {
            physical_path: dir.path().to_path_buf(),
            ..Component::default()
        };
        let loaded = loader.load().unwrap();

        assert_eq!(loaded.name, "root");
        assert_eq!(loaded.method, "git");
        assert_eq!(loaded.subcomponents.len(), 1);
        assert_eq!(loaded.subcomponents[0].name, "web");
        assert_eq!(
            loaded.hooks.get(HOOK_BEFORE_INSTALL),
            Some(&vec!["echo hi".to_string()])
        );
        assert_eq!(loaded.serialization, Serialization::Yaml);
    }

    #[test]
    fn load_rejects_ambiguous_serialization() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("component.yaml"), "name: a\n").unwrap();
        std::fs::write(dir.path().join("component.json"), "{\"name\": \"a\"}\n").unwrap();

        let loader = Component {
            physical_path: dir.path().to_path_buf(),
            ..Component::default()
        };
        let err = loader.load().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FabrikateError>(),
            Some(FabrikateError::Load { .. })
        ));
    }

    #[test]
    fn load_falls_back_to_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("component.json"),
            "{\"name\": \"api\", \"type\": \"static\"}\n",
        )
        .unwrap();

        let loader = Component {
            physical_path: dir.path().to_path_buf(),
            ..Component::default()
        };
        let loaded = loader.load().unwrap();
        assert_eq!(loaded.name, "api");
        assert_eq!(loaded.component_type, "static");
        assert_eq!(loaded.serialization, Serialization::Json);
    }

    #[tokio::test]
    async fn hooks_run_in_component_directory() {
        let dir = TempDir::new().unwrap();
        let mut component = named("hooked");
        component.physical_path = dir.path().to_path_buf();
        component.hooks.insert(
            HOOK_BEFORE_GENERATE.to_string(),
            vec!["echo marker > hook-ran.txt".to_string()],
        );

        component.execute_hook(HOOK_BEFORE_GENERATE).await.unwrap();
        assert!(dir.path().join("hook-ran.txt").exists());

        // Unknown hook names are a no-op.
        component.execute_hook("no-such-hook").await.unwrap();
    }

    #[tokio::test]
    async fn failing_hook_reports_command_and_output() {
        let dir = TempDir::new().unwrap();
        let mut component = named("hooked");
        component.physical_path = dir.path().to_path_buf();
        component.hooks.insert(
            HOOK_AFTER_INSTALL.to_string(),
            vec!["echo broken && exit 3".to_string()],
        );

        let err = component.execute_hook(HOOK_AFTER_INSTALL).await.unwrap_err();
        match err.downcast_ref::<FabrikateError>() {
            Some(FabrikateError::Hook { command, output }) => {
                assert!(command.contains("exit 3"));
                assert!(output.contains("broken"));
            }
            other => panic!("expected hook error, got {other:?}"),
        }
    }

    #[test]
    fn access_tokens_resolve_environment_variables() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("access.yaml"),
            "https://internal.example/repo.git: FABRIKATE_TEST_TOKEN\nhttps://other.example/repo.git: FABRIKATE_TEST_UNSET\n",
        )
        .unwrap();
        std::env::set_var("FABRIKATE_TEST_TOKEN", "secret");
        std::env::remove_var("FABRIKATE_TEST_UNSET");

        let mut component = named("tokened");
        component.physical_path = dir.path().to_path_buf();

        let tokens = component.access_tokens().unwrap();
        assert_eq!(
            tokens.get("https://internal.example/repo.git").map(String::as_str),
            Some("secret")
        );
        assert!(!tokens.contains_key("https://other.example/repo.git"));
    }

    #[test]
    fn access_tokens_default_to_empty_without_sidecar() {
        let dir = TempDir::new().unwrap();
        let mut component = named("plain");
        component.physical_path = dir.path().to_path_buf();
        assert!(component.access_tokens().unwrap().is_empty());
    }
}
