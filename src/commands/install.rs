//! The install flow: fetch every remote component in the tree.
//!
//! Install walks the tree and, per node, discovers access tokens, clones
//! `method: git` subcomponents into `components/`, and runs the node's
//! generator install step (helm chart staging, http manifest download).
//! A `method: git` root is bootstrapped first: the repository is cloned and
//! the walk continues from the clone.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::info;

use crate::component::Component;
use crate::config::ComponentConfig;
use crate::core::FabrikateError;
use crate::generators::generator_for;
use crate::session::Session;
use crate::walker::{self, ComponentVisitor, RootInit};

/// Binaries the subprocess contract requires on PATH, with a cheap probe
/// invocation for each.
const REQUIRED_BINARIES: &[(&str, &[&str])] = &[
    ("git", &["--version"]),
    ("helm", &["version", "--short"]),
    ("sh", &["-c", "exit 0"]),
    ("curl", &["--version"]),
];

/// Verifies the external binaries install depends on are present on PATH.
async fn verify_required_binaries() -> Result<()> {
    for (binary, args) in REQUIRED_BINARIES {
        let probe = Command::new(binary)
            .args(*args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if probe.is_err() {
            return Err(FabrikateError::Validation {
                reason: format!("required binary '{binary}' was not found on PATH"),
            }
            .into());
        }
    }
    Ok(())
}

struct InstallVisitor {
    session: Session,
}

#[async_trait]
impl ComponentVisitor for InstallVisitor {
    async fn visit(&self, physical_path: &Path, component: &mut Component) -> Result<()> {
        info!("--> starting install for component: {}", component.name);

        for (repository, token) in component.access_tokens()? {
            self.session.tokens.set(repository, token).await;
        }

        let generator = generator_for(&component.component_type)?;
        component
            .install(physical_path, generator, &self.session)
            .await?;

        info!("<-- finished install for component: {}", component.name);
        Ok(())
    }
}

/// Clones a remote git root before the walk proceeds, then reloads the
/// component from the clone so children resolve against it.
struct InstallRootInit {
    start_path: PathBuf,
    environments: Vec<String>,
    session: Session,
}

#[async_trait]
impl RootInit for InstallRootInit {
    async fn prepare_root(&self, root: &mut Component) -> Result<()> {
        if !(root.is_remote() && root.method == "git") {
            return Ok(());
        }

        info!(
            "root component '{}' is remote; installing it before walking",
            root.name
        );
        root.install_remote(&self.start_path, &self.session).await?;

        let mut slot = self.start_path.join(root.relative_path_to());
        if !root.path.is_empty() {
            slot = slot.join(&root.path);
        }

        let relocated = Component {
            physical_path: slot.clone(),
            logical_path: root.logical_path.clone(),
            config: ComponentConfig::new(&slot),
            ..Component::default()
        };
        let mut reloaded = relocated.load()?;
        reloaded.load_config(&self.environments)?;
        *root = reloaded;

        Ok(())
    }
}

/// Installs every component of the tree rooted at `start_path`.
///
/// Returns the visited components in traversal completion order; stops at
/// the first surfaced error. The git clone cache is cleaned on success;
/// after a failure the cached clones are left behind for inspection and
/// swept by the next successful run.
pub async fn install(
    start_path: impl Into<PathBuf>,
    environments: Vec<String>,
) -> Result<Vec<Component>> {
    let start_path = start_path.into();
    verify_required_binaries().await?;

    let session = Session::new();
    let visitor: Arc<dyn ComponentVisitor> = Arc::new(InstallVisitor {
        session: session.clone(),
    });
    let root_init: Arc<dyn RootInit> = Arc::new(InstallRootInit {
        start_path: start_path.clone(),
        environments: environments.clone(),
        session: session.clone(),
    });

    let results = walker::walk(start_path, environments, visitor, Some(root_init)).await;
    let (components, failure) = walker::synchronize(results).await;

    match failure {
        Some(err) => Err(err),
        None => {
            session.git.clean_cache()?;
            info!("finished install");
            Ok(components)
        }
    }
}
