//! Command-line interface.
//!
//! Thin clap wrappers over the library entry points; all real logic lives in
//! [`crate::commands`] and the domain modules so it stays testable without a
//! terminal.

pub mod add;
pub mod generate;
pub mod install;
pub mod remove;
pub mod set;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Composes Kubernetes deployment manifests from a tree of reusable
/// components.
#[derive(Parser)]
#[command(name = "fabrikate", version, about)]
pub struct Cli {
    /// Emit debug-level logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a subcomponent to the current component.
    Add(add::AddCommand),
    /// Remove a subcomponent from the current component.
    Remove(remove::RemoveCommand),
    /// Set config values for an environment.
    Set(set::SetCommand),
    /// Fetch all remote components in the current deployment tree.
    Install(install::InstallCommand),
    /// Generate Kubernetes manifests from the current deployment tree.
    Generate(generate::GenerateCommand),
}

impl Cli {
    /// Dispatches to the selected subcommand.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Add(command) => command.execute(),
            Commands::Remove(command) => command.execute(),
            Commands::Set(command) => command.execute(),
            Commands::Install(command) => command.execute().await,
            Commands::Generate(command) => command.execute().await,
        }
    }
}
