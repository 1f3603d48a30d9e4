//! Helm subprocess wrapper.
//!
//! All chart operations shell out to the system `helm` binary. The host repo
//! registry (`helm repo add` / `remove`) is shared mutable state on disk and
//! is not safe to mutate concurrently — two simultaneous `repo add` calls
//! both read the registry file, modify it, and write it back, losing one of
//! the additions. [`HelmClient`] therefore serializes every registry
//! mutation through one write lock while `repo list` takes the read side.
//! Templating and pulling never touch the registry and take no lock.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::FabrikateError;

/// A single entry from `helm repo list --output json`.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoListEntry {
    pub name: String,
    pub url: String,
}

/// Options for a `helm template` invocation.
#[derive(Debug, Clone)]
pub struct TemplateOptions {
    /// Release name passed as the first positional argument.
    pub release: String,
    /// Absolute path to the directory containing `Chart.yaml`.
    pub chart_path: PathBuf,
    /// Values files applied in order.
    pub values: Vec<PathBuf>,
    /// Namespace to template with.
    pub namespace: String,
}

/// A dependency entry from `requirements.yaml` or `Chart.yaml`.
#[derive(Debug, Deserialize)]
struct ChartDependency {
    #[serde(default)]
    name: String,
    #[serde(default)]
    repository: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChartRequirements {
    #[serde(default)]
    dependencies: Vec<ChartDependency>,
}

async fn run_helm(args: &[String]) -> Result<std::process::Output> {
    let display = format!("helm {}", args.join(" "));
    let output = Command::new("helm")
        .args(args)
        .output()
        .await
        .with_context(|| format!("failed to execute `{display}`"))?;

    if !output.status.success() {
        return Err(FabrikateError::from_output(display, &output).into());
    }
    Ok(output)
}

/// Client for the host helm installation, serializing registry mutations.
#[derive(Clone, Default)]
pub struct HelmClient {
    registry_lock: Arc<RwLock<()>>,
}

impl HelmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists all repositories currently registered with the host helm
    /// client.
    pub async fn repo_list(&self) -> Result<Vec<RepoListEntry>> {
        let _guard = self.registry_lock.read().await;

        let args = vec![
            "repo".to_string(),
            "list".to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        let output = run_helm(&args).await?;
        serde_json::from_slice(&output.stdout).context("failed to parse `helm repo list` output")
    }

    /// Registers a repository with the host helm client.
    pub async fn repo_add(&self, name: &str, url: &str) -> Result<()> {
        let _guard = self.registry_lock.write().await;
        run_helm(&[
            "repo".to_string(),
            "add".to_string(),
            name.to_string(),
            url.to_string(),
        ])
        .await?;
        Ok(())
    }

    /// Removes a repository from the host helm client.
    pub async fn repo_remove(&self, name: &str) -> Result<()> {
        let _guard = self.registry_lock.write().await;
        run_helm(&["repo".to_string(), "remove".to_string(), name.to_string()]).await?;
        Ok(())
    }

    /// Looks for an existing host repository matching `url`.
    ///
    /// An unreadable registry (for example a fresh helm install with no
    /// repositories) is treated as "not found".
    pub async fn find_repo_name_by_url(&self, url: &str) -> Option<String> {
        let repositories = match self.repo_list().await {
            Ok(list) => list,
            Err(err) => {
                debug!("no usable helm repo registry ({err:#}); pulling directly");
                return None;
            }
        };

        repositories
            .into_iter()
            .find(|entry| entry.url.eq_ignore_ascii_case(url))
            .map(|entry| entry.name)
    }

    /// Pulls `chart` at `version` from `repo_url` and extracts it into
    /// `into`, so the chart lands at `<into>/<chart>/Chart.yaml`.
    ///
    /// When the host already has a repository for `repo_url` the chart is
    /// referenced as `<name>/<chart>`; otherwise `--repo` is passed so helm
    /// fetches directly without mutating the registry.
    pub async fn pull(&self, repo_url: &str, chart: &str, version: &str, into: &Path) -> Result<()> {
        let existing = self.find_repo_name_by_url(repo_url).await;
        let chart_ref = match &existing {
            Some(name) => format!("{name}/{chart}"),
            None => chart.to_string(),
        };

        let mut args = vec![
            "pull".to_string(),
            chart_ref,
            "--untar".to_string(),
            "--untardir".to_string(),
            into.to_string_lossy().into_owned(),
        ];
        if !version.is_empty() {
            args.push("--version".to_string());
            args.push(version.to_string());
        }
        if existing.is_none() {
            args.push("--repo".to_string());
            args.push(repo_url.to_string());
        }

        info!("fetching helm chart '{chart}' version '{}' into '{}'",
            if version.is_empty() { "latest" } else { version },
            into.display()
        );
        run_helm(&args).await?;
        Ok(())
    }

    /// Runs `helm template` and returns the rendered manifests.
    pub async fn template(&self, options: &TemplateOptions) -> Result<String> {
        let mut args = vec![
            "template".to_string(),
            options.release.clone(),
            options.chart_path.to_string_lossy().into_owned(),
        ];
        for values in &options.values {
            args.push("--values".to_string());
            args.push(values.to_string_lossy().into_owned());
        }
        args.push("--namespace".to_string());
        args.push(options.namespace.clone());

        info!("running `helm template` on chart '{}'", options.chart_path.display());
        let output = run_helm(&args).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Updates chart dependencies for the chart at `chart_dir`.
    ///
    /// Dependency repositories not yet known to the host client are added
    /// under temporary UUID names for the duration of the update and removed
    /// afterwards. Non-http repositories (e.g. `file://` or OCI references)
    /// are skipped.
    pub async fn dependency_update(&self, chart_dir: &Path) -> Result<()> {
        let chart_dir = std::path::absolute(chart_dir)
            .with_context(|| format!("failed to resolve chart path {}", chart_dir.display()))?;

        let requirements = self.read_dependencies(&chart_dir)?;

        let mut temporary_repos = Vec::new();
        for dependency in &requirements.dependencies {
            if self
                .find_repo_name_by_url(&dependency.repository)
                .await
                .is_some()
            {
                debug!("helm dependency repo already present: {}", dependency.repository);
                continue;
            }
            if !dependency.repository.starts_with("http") {
                info!(
                    "skipping non-http helm dependency repo '{}' for dependency '{}'",
                    dependency.repository, dependency.name
                );
                continue;
            }

            let temp_name = Uuid::new_v4().to_string();
            info!("adding helm dependency repository '{}'", dependency.repository);
            self.repo_add(&temp_name, &dependency.repository).await?;
            temporary_repos.push(temp_name);
        }

        info!("updating chart dependencies in '{}'", chart_dir.display());
        let update = run_helm(&[
            "dependency".to_string(),
            "update".to_string(),
            chart_dir.to_string_lossy().into_owned(),
        ])
        .await;

        for name in temporary_repos {
            debug!("removing temporary helm repo '{name}'");
            self.repo_remove(&name).await?;
        }

        update.map(|_| ())
    }

    fn read_dependencies(&self, chart_dir: &Path) -> Result<ChartRequirements> {
        let requirements_path = chart_dir.join("requirements.yaml");
        let chart_path = chart_dir.join("Chart.yaml");

        let source = if requirements_path.exists() {
            requirements_path
        } else if chart_path.exists() {
            chart_path
        } else {
            return Ok(ChartRequirements::default());
        };

        let contents = std::fs::read_to_string(&source)
            .with_context(|| format!("failed to read {}", source.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse dependencies in {}", source.display()))
    }
}
