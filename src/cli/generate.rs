//! `fabrikate generate` — render Kubernetes manifests for a set of
//! environments.

use anyhow::Result;
use clap::Args;

use crate::commands;

/// Generates Kubernetes resource definitions from the deployment tree.
///
/// Environments apply in left-to-right priority order; the output lands in
/// `generated/<env1>-<env2>-...` (or `generated/common` when none are
/// given).
#[derive(Args)]
pub struct GenerateCommand {
    /// Environments to generate with, in priority order.
    environments: Vec<String>,

    /// Validate the generated manifests with `kubectl apply --dry-run`.
    #[arg(long)]
    validate: bool,

    /// Emit a kustomization.yaml referencing the generated manifests.
    #[arg(long)]
    kustomize: bool,
}

impl GenerateCommand {
    pub async fn execute(self) -> Result<()> {
        commands::generate("./", self.environments, self.validate, self.kustomize)
            .await
            .map(|_| ())
    }
}
