//! `fabrikate install` — fetch all remote components in a deployment tree.

use anyhow::Result;
use clap::Args;

use crate::commands;

/// Installs all remote components specified in the deployment tree.
#[derive(Args)]
pub struct InstallCommand {
    /// Path to the root of the definition tree.
    #[arg(default_value = "./")]
    path: String,
}

impl InstallCommand {
    pub async fn execute(self) -> Result<()> {
        commands::install(self.path, Vec::new()).await.map(|_| ())
    }
}
