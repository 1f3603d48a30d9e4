//! Helm chart generator.
//!
//! Install stages the chart under `<component>/helm_repos/<name>` — the
//! whole repository for `method: git`, just the target chart for
//! `method: helm` — and resolves chart dependencies. Generate marshals the
//! component's merged config into a temporary values file, runs
//! `helm template`, and post-processes the output (§ manifest module).

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use crate::component::Component;
use crate::helm::TemplateOptions;
use crate::manifest;
use crate::session::Session;
use crate::utils::fs::{copy_dir, ensure_dir, remove_dir_idempotent};

use super::Generator;

/// Generates manifests by templating a helm chart.
#[derive(Debug, Default)]
pub struct HelmGenerator;

/// Directory the component's chart content is staged in: the entire repo for
/// `method: git`, just the chart for `method: helm`.
fn helm_repo_path(component: &Component) -> PathBuf {
    component
        .physical_path
        .join("helm_repos")
        .join(&component.name)
}

/// Absolute path to the directory containing `Chart.yaml`.
fn chart_path(component: &Component) -> Result<PathBuf> {
    let path = match component.method.as_str() {
        // The whole repo was cloned; `path` points at the chart inside it.
        "git" => helm_repo_path(component).join(&component.path),
        // Only the target chart was pulled.
        "helm" => helm_repo_path(component),
        // Local chart relative to the component.
        _ => component.physical_path.join(&component.path),
    };

    std::path::absolute(&path)
        .with_context(|| format!("failed to resolve chart path {}", path.display()))
}

#[async_trait]
impl Generator for HelmGenerator {
    async fn install(&self, component: &Component, session: &Session) -> Result<()> {
        let fetched = matches!(component.method.as_str(), "helm" | "git");
        if !fetched || component.source.is_empty() || component.path.is_empty() {
            return Ok(());
        }

        let repo_path = helm_repo_path(component);
        match component.method.as_str() {
            "helm" => {
                info!(
                    "component '{}' requesting helm chart '{}' from helm repository '{}'",
                    component.name, component.path, component.source
                );
                let staging = tempfile::Builder::new()
                    .prefix("fabrikate-chart-")
                    .tempdir()
                    .context("failed to create chart staging directory")?;
                session
                    .helm
                    .pull(&component.source, &component.path, &component.version, staging.path())
                    .await?;

                remove_dir_idempotent(&repo_path)?;
                if let Some(parent) = repo_path.parent() {
                    ensure_dir(parent)?;
                }
                copy_dir(&staging.path().join(&component.path), &repo_path)?;

                session.helm.dependency_update(&repo_path).await
            }
            "git" => {
                info!(
                    "component '{}' requesting helm chart in path '{}' from git repository '{}'",
                    component.name, component.path, component.source
                );
                session
                    .git
                    .clone_into(
                        &component.source,
                        &component.version,
                        &component.branch,
                        &repo_path,
                        &session.tokens,
                    )
                    .await?;

                session.helm.dependency_update(&chart_path(component)?).await
            }
            _ => Ok(()),
        }
    }

    async fn generate(&self, component: &Component, session: &Session) -> Result<String> {
        info!(
            "generating component '{}' with helm with repo {}",
            component.name, component.source
        );

        let values_yaml = serde_yaml::to_string(&component.config.config)
            .with_context(|| format!("failed to marshal config values for '{}'", component.name))?;

        // Removed on every exit path when the handle drops.
        let values_file = tempfile::Builder::new()
            .prefix("fabrikate-values-")
            .suffix(".yaml")
            .tempfile()
            .context("failed to create temporary values file")?;
        std::fs::write(values_file.path(), &values_yaml).with_context(|| {
            format!("failed to write values file {}", values_file.path().display())
        })?;

        let namespace = if component.config.namespace.is_empty() {
            "default".to_string()
        } else {
            component.config.namespace.clone()
        };

        let options = TemplateOptions {
            release: component.name.clone(),
            chart_path: chart_path(component)?,
            values: vec![values_file.path().to_path_buf()],
            namespace,
        };
        let rendered = session.helm.template(&options).await?;

        post_process(component, &rendered)
    }
}

/// Cleans templated output and, when the component opts in, injects its
/// namespace into the surviving documents.
fn post_process(component: &Component, rendered: &str) -> Result<String> {
    let cleaned = manifest::clean(rendered);

    if component.config.inject_namespace && !component.config.namespace.is_empty() {
        info!(
            "injecting namespace '{}' into manifests for component '{}'",
            component.config.namespace, component.name
        );
        manifest::inject_namespace(&cleaned, &component.config.namespace)
    } else {
        Ok(cleaned)
    }
}
