//! Breadth-first asynchronous traversal of a component tree.
//!
//! [`walk`] streams every component under a starting directory to the caller
//! while a visitor runs on each node. The traversal is cooperative: a
//! dispatcher loop pulls from an internal queue and spawns one task per
//! dequeued component; each task runs the full per-node sequence (visit,
//! then resolve + enqueue children) before finishing.
//!
//! # Ordering and termination
//!
//! A parent is always visited before its children are enqueued, so it
//! appears in the result stream before any descendant. Siblings carry no
//! ordering guarantee. Outstanding-work accounting uses queue-sender
//! strands: every enqueued node carries its own clone of the queue sender,
//! created *before* the node is handed to the queue. The queue therefore
//! closes exactly when the last in-flight node finishes, which in turn
//! closes the result stream — there is no window where an empty queue with
//! work still in flight could end the walk early.
//!
//! # Failure semantics
//!
//! Load and config errors prevent a node's children from being enqueued;
//! visitor errors do not. Either way the error is streamed as
//! [`WalkResult::Failed`] and sibling work continues — deciding when to stop
//! is the consumer's job ([`synchronize`] stops at the first failure). A
//! consumer that stops reading does not cancel anything: workers simply
//! discard results they can no longer deliver and run to completion.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::component::Component;
use crate::config::ComponentConfig;

/// Visitor invoked on every component in the tree.
#[async_trait]
pub trait ComponentVisitor: Send + Sync {
    /// Called once per node, after the component and its config are loaded.
    async fn visit(&self, physical_path: &Path, component: &mut Component) -> Result<()>;
}

/// One-time hook on the prepared root component, before it is visited.
///
/// Install uses this to clone a `method: git` root and re-resolve its
/// physical path before the walk proceeds.
#[async_trait]
pub trait RootInit: Send + Sync {
    async fn prepare_root(&self, root: &mut Component) -> Result<()>;
}

/// One element of the walk's result stream.
pub enum WalkResult {
    /// A component that was visited, with its merged config and (after
    /// generate) its manifest.
    Visited(Component),
    /// A load, config, or visitor failure.
    Failed(anyhow::Error),
}

/// A queued component together with its strand of the queue sender.
struct WorkItem {
    component: Component,
    queue: mpsc::UnboundedSender<WorkItem>,
}

/// Loads a component and merges its environment configs.
fn prepare(seed: &Component, environments: &[String]) -> Result<Component> {
    let mut component = seed.load()?;
    component.load_config(environments)?;
    Ok(component)
}

/// Joins a child name onto a `/`-rooted logical path.
fn join_logical(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Walks the component tree rooted at `starting_path` breadth-first,
/// invoking `visitor` on every node and streaming each visited component
/// (or failure) to the returned receiver.
pub async fn walk(
    starting_path: impl Into<PathBuf>,
    environments: Vec<String>,
    visitor: Arc<dyn ComponentVisitor>,
    root_init: Option<Arc<dyn RootInit>>,
) -> mpsc::Receiver<WalkResult> {
    let starting_path = starting_path.into();
    let (results_tx, results_rx) = mpsc::channel(32);
    let environments: Arc<[String]> = environments.into();

    tokio::spawn(async move {
        let seed = Component {
            physical_path: starting_path.clone(),
            logical_path: "/".to_string(),
            config: ComponentConfig::new(&starting_path),
            ..Component::default()
        };

        let mut root = match prepare(&seed, &environments) {
            Ok(component) => component,
            Err(err) => {
                let _ = results_tx.send(WalkResult::Failed(err)).await;
                return;
            }
        };

        if let Some(init) = root_init {
            if let Err(err) = init.prepare_root(&mut root).await {
                let _ = results_tx.send(WalkResult::Failed(err)).await;
                return;
            }
        }

        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<WorkItem>();
        let _ = queue_tx.send(WorkItem {
            component: root,
            queue: queue_tx.clone(),
        });
        drop(queue_tx);

        while let Some(item) = queue_rx.recv().await {
            tokio::spawn(visit_node(
                item,
                Arc::clone(&visitor),
                Arc::clone(&environments),
                results_tx.clone(),
            ));
        }
    });

    results_rx
}

/// Runs the full per-node sequence: visit, publish, resolve and enqueue
/// children.
async fn visit_node(
    item: WorkItem,
    visitor: Arc<dyn ComponentVisitor>,
    environments: Arc<[String]>,
    results: mpsc::Sender<WalkResult>,
) {
    let WorkItem { mut component, queue } = item;
    debug!(
        "visiting component '{}' at '{}'",
        component.name,
        component.physical_path.display()
    );

    let physical_path = component.physical_path.clone();
    if let Err(err) = visitor.visit(&physical_path, &mut component).await {
        let _ = results.send(WalkResult::Failed(err)).await;
    }

    // Publish the parent before any child is enqueued so ancestors always
    // precede descendants in the stream.
    let _ = results.send(WalkResult::Visited(component.clone())).await;

    for mut subcomponent in std::mem::take(&mut component.subcomponents) {
        subcomponent.config = component
            .config
            .subcomponents
            .get(&subcomponent.name)
            .cloned()
            .unwrap_or_default();
        subcomponent.apply_defaults();

        if subcomponent.config.disabled {
            info!("component '{}' is disabled; skipping", subcomponent.name);
            continue;
        }

        if subcomponent.is_remote() {
            if subcomponent.path.is_empty() {
                subcomponent.physical_path =
                    component.physical_path.join(subcomponent.relative_path_to());
            } else {
                // Source points at a component library; `path` selects the
                // target component inside it.
                let relative = PathBuf::from(subcomponent.relative_path_to());
                let chained = relative.join(&subcomponent.path);
                subcomponent.physical_path = if relative.is_absolute() {
                    chained
                } else {
                    component.physical_path.join(chained)
                };
            }
            subcomponent.logical_path = join_logical(&component.logical_path, &subcomponent.name);

            subcomponent = match prepare(&subcomponent, &environments) {
                Ok(prepared) => prepared,
                Err(err) => {
                    let _ = results.send(WalkResult::Failed(err)).await;
                    continue;
                }
            };
        } else {
            subcomponent.physical_path = component.physical_path.clone();
            subcomponent.logical_path = component.logical_path.clone();
        }

        debug!(
            "adding subcomponent '{}' to queue with physical path '{}' and logical path '{}'",
            subcomponent.name,
            subcomponent.physical_path.display(),
            subcomponent.logical_path
        );
        let _ = queue.send(WorkItem {
            component: subcomponent,
            queue: queue.clone(),
        });
    }
}

/// Drains a walk's result stream into a component list, stopping at the
/// first failure and returning the partial list alongside it.
pub async fn synchronize(
    mut results: mpsc::Receiver<WalkResult>,
) -> (Vec<Component>, Option<anyhow::Error>) {
    let mut components = Vec::new();
    while let Some(result) = results.recv().await {
        match result {
            WalkResult::Visited(component) => components.push(component),
            WalkResult::Failed(err) => return (components, Some(err)),
        }
    }
    (components, None)
}
