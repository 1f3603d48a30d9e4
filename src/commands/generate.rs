//! The generate flow: render every component and mirror the results into
//! `generated/<environments>/`.
//!
//! The output directory is rebuilt from scratch on every run so it never
//! mixes two builds; components are written at their logical path, one
//! `<name>.yaml` per component that produced a manifest.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::info;

use crate::component::Component;
use crate::core::FabrikateError;
use crate::generators::generator_for;
use crate::session::Session;
use crate::walker::{self, ComponentVisitor};
use crate::utils::fs::{ensure_dir, remove_dir_idempotent};

struct GenerateVisitor {
    session: Session,
}

#[async_trait]
impl ComponentVisitor for GenerateVisitor {
    async fn visit(&self, _physical_path: &Path, component: &mut Component) -> Result<()> {
        let generator = generator_for(&component.component_type)?;
        component.generate(generator, &self.session).await
    }
}

/// Name of the generation directory for an environment list: the
/// `-`-joined environments, or `common` when none are given.
fn environment_name(environments: &[String]) -> String {
    if environments.is_empty() {
        "common".to_string()
    } else {
        environments.join("-")
    }
}

/// Writes each generated manifest at
/// `<generation_path>/<logical-path>/<name>.yaml`, recreating the directory
/// from scratch.
fn write_generated_manifests(generation_path: &Path, components: &[Component]) -> Result<()> {
    // Delete the previous build so we never mix two generations.
    remove_dir_idempotent(generation_path)?;

    for component in components.iter().filter(|c| !c.manifest.is_empty()) {
        let component_dir = generation_path.join(component.logical_path.trim_start_matches('/'));
        ensure_dir(&component_dir)?;

        let manifest_path = component_dir.join(format!("{}.yaml", component.name));
        info!("writing {}", manifest_path.display());
        std::fs::write(&manifest_path, &component.manifest)
            .with_context(|| format!("failed to write {}", manifest_path.display()))?;
    }

    Ok(())
}

#[derive(Serialize)]
struct Kustomization {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    resources: Vec<String>,
}

/// Emits a `kustomization.yaml` at the generation root referencing every
/// generated manifest, in traversal completion order.
fn write_kustomization_file(generation_path: &Path, components: &[Component]) -> Result<()> {
    let resources = components
        .iter()
        .filter(|c| !c.manifest.is_empty())
        .map(|component| {
            let logical = component.logical_path.trim_start_matches('/');
            if logical.is_empty() {
                format!("{}.yaml", component.name)
            } else {
                format!("{logical}/{}.yaml", component.name)
            }
        })
        .collect();

    let kustomization = Kustomization {
        api_version: "kustomize.config.k8s.io/v1beta1",
        kind: "Kustomization",
        resources,
    };

    let kustomization_path = generation_path.join("kustomization.yaml");
    info!("writing {}", kustomization_path.display());
    let marshaled =
        serde_yaml::to_string(&kustomization).context("failed to serialize kustomization")?;
    std::fs::write(&kustomization_path, marshaled)
        .with_context(|| format!("failed to write {}", kustomization_path.display()))
}

/// Runs a `kubectl apply --dry-run` validation pass over the generated
/// output.
async fn validate_generated_manifests(generation_path: &Path) -> Result<()> {
    info!(
        "validating generated manifests in {}",
        generation_path.display()
    );

    let output = Command::new("kubectl")
        .args(["apply", "--validate=true", "--dry-run=client", "--recursive", "-f"])
        .arg(generation_path)
        .output()
        .await
        .context("failed to execute kubectl")?;

    if !output.status.success() {
        return Err(FabrikateError::from_output(
            format!(
                "kubectl apply --validate=true --dry-run=client --recursive -f {}",
                generation_path.display()
            ),
            &output,
        )
        .into());
    }
    Ok(())
}

/// Generates manifests for the tree rooted at `start_path` with the given
/// environments (in priority order) and writes them under
/// `generated/<environments>/`.
///
/// Returns the components that produced a manifest, in traversal completion
/// order.
pub async fn generate(
    start_path: impl Into<PathBuf>,
    environments: Vec<String>,
    validate: bool,
    emit_kustomization: bool,
) -> Result<Vec<Component>> {
    let start_path = start_path.into();

    let session = Session::new();
    let visitor: Arc<dyn ComponentVisitor> = Arc::new(GenerateVisitor { session });

    let results = walker::walk(start_path.clone(), environments.clone(), visitor, None).await;
    let (components, failure) = walker::synchronize(results).await;
    if let Some(err) = failure {
        return Err(err);
    }

    let generation_path = start_path
        .join("generated")
        .join(environment_name(&environments));

    write_generated_manifests(&generation_path, &components)?;

    if emit_kustomization {
        write_kustomization_file(&generation_path, &components)?;
    }

    if validate {
        validate_generated_manifests(&generation_path).await?;
    }

    info!("finished generate");
    Ok(components
        .into_iter()
        .filter(|component| !component.manifest.is_empty())
        .collect())
}
