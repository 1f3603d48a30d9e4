//! Static manifest generator.
//!
//! Rolls a directory of resource manifests into one multi-document YAML
//! text. `method: http` additionally supports pointing `source` at a single
//! remote manifest, which install stages under
//! `<component>/components/<name>/<name>.yaml`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use crate::component::Component;
use crate::core::FabrikateError;
use crate::session::Session;
use crate::utils::fs::ensure_dir;

use super::Generator;

/// Generates manifests by concatenating static files.
#[derive(Debug, Default)]
pub struct StaticGenerator;

/// Directory holding the component's manifest files.
fn manifests_path(component: &Component) -> PathBuf {
    if component.method.eq_ignore_ascii_case("http") {
        component
            .physical_path
            .join("components")
            .join(&component.name)
    } else {
        component.physical_path.join(&component.path)
    }
}

#[async_trait]
impl Generator for StaticGenerator {
    async fn install(&self, component: &Component, _session: &Session) -> Result<()> {
        if !component.method.eq_ignore_ascii_case("http") {
            return Ok(());
        }

        let extension = std::path::Path::new(&component.source)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        if !matches!(extension.as_deref(), Some("yaml") | Some("yml")) {
            return Err(FabrikateError::Validation {
                reason: format!(
                    "source for static component '{}' must end in .yaml or .yml; given '{}'",
                    component.name, component.source
                ),
            }
            .into());
        }

        info!(
            "downloading static manifest for component '{}' from '{}'",
            component.name, component.source
        );
        let response = reqwest::get(&component.source)
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("failed to fetch '{}'", component.source))?;
        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of '{}'", component.source))?;

        let staged_dir = manifests_path(component);
        ensure_dir(&staged_dir)?;
        let staged_file = staged_dir.join(format!("{}.yaml", component.name));
        std::fs::write(&staged_file, &body)
            .with_context(|| format!("failed to write {}", staged_file.display()))
    }

    async fn generate(&self, component: &Component, _session: &Session) -> Result<String> {
        info!(
            "generating component '{}' statically from path {}",
            component.name, component.path
        );

        let static_path = manifests_path(component);
        let mut files: Vec<PathBuf> = std::fs::read_dir(&static_path)
            .with_context(|| format!("failed to read directory {}", static_path.display()))?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        files.sort();

        let mut manifests = String::new();
        for file in files {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read manifest {}", file.display()))?;
            manifests.push_str("---\n");
            manifests.push_str(&contents);
            manifests.push('\n');
        }

        Ok(manifests)
    }
}
