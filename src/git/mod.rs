//! Git fetching with a single-flight clone cache.
//!
//! Fabrikate shells out to the system `git` binary (the same approach Cargo
//! takes with `git-fetch-with-cli`) so SSH agents, credential helpers, and
//! proxy configuration keep working. `GIT_TERMINAL_PROMPT=0` is always set so
//! a missing credential fails fast instead of hanging the walker on an
//! interactive prompt.
//!
//! # Caching
//!
//! Many components in a tree frequently point at the same repository. The
//! [`GitCache`] maps `(url, branch, sha)` to a clone slot under the system
//! temp directory and single-flights concurrent requests: the first caller
//! for a key performs the clone while later callers park on a [`Notify`] and
//! reuse the published path. Failed clones vacate the entry so a later
//! request may retry.
//!
//! # Access tokens
//!
//! [`AccessTokens`] is a shared map from repository URL to personal access
//! token, filled during install from `access.yaml` sidecar files. On a hit
//! the clone URL is rewritten to `<scheme>://<token>@<rest>` — but only when
//! the URL carries no userinfo already. Tokens never appear in logs or error
//! output; commands are reported with the original URL.

use anyhow::{Context, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info};

use crate::core::FabrikateError;
use crate::utils::fs::{copy_dir, ensure_dir, remove_dir_idempotent};
use crate::utils::urls::to_path;

/// Shared map of repository URL → personal access token.
#[derive(Clone, Default)]
pub struct AccessTokens {
    tokens: Arc<RwLock<HashMap<String, String>>>,
}

impl AccessTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the token registered for `repo`, if any.
    pub async fn get(&self, repo: &str) -> Option<String> {
        self.tokens.read().await.get(repo).cloned()
    }

    /// Registers `token` for `repo`, replacing any previous value.
    pub async fn set(&self, repo: impl Into<String>, token: impl Into<String>) {
        self.tokens.write().await.insert(repo.into(), token.into());
    }
}

/// State of one cache slot: either a clone in flight or a published path.
enum CloneState {
    Pending(Arc<Notify>),
    Ready(PathBuf),
}

/// Single-flight cache of git clones keyed by `(url, branch, sha)`.
#[derive(Clone, Default)]
pub struct GitCache {
    clones: Arc<DashMap<String, CloneState>>,
}

/// Builds the cache key for a clone coordinate. An empty branch defaults to
/// `master` and an empty sha to `head` so equivalent requests share a slot.
fn cache_key(url: &str, branch: &str, sha: &str) -> String {
    let branch = if branch.is_empty() { "master" } else { branch };
    let sha = if sha.is_empty() { "head" } else { sha };
    format!("{url}@{branch}:{sha}")
}

/// Deterministic on-disk slot for a clone coordinate, rooted in the system
/// temp directory.
///
/// Only plain path segments of the coordinate are used, so absolute or
/// `..`-carrying local sources can never place the slot outside the cache
/// root.
fn clone_slot(url: &str, branch: &str, sha: &str) -> PathBuf {
    let branch = if branch.is_empty() { "master" } else { branch };
    let sha = if sha.is_empty() { "head" } else { sha };

    let mut slot = std::env::temp_dir().join("fabrikate").join("_components");
    for component in to_path(url).components() {
        if let std::path::Component::Normal(segment) = component {
            slot.push(segment);
        }
    }
    slot.join(branch).join(sha)
}

/// Rewrites `url` to carry `token` as userinfo, unless userinfo is already
/// present.
fn inject_token(url: &str, token: &str) -> Result<String> {
    let pattern =
        Regex::new(r"^(https?)://([^@]+@)?(.+)$").context("failed to compile token URL pattern")?;
    let Some(captures) = pattern.captures(url) else {
        return Ok(url.to_string());
    };
    if captures.get(2).is_some() {
        return Ok(url.to_string());
    }
    Ok(format!("{}://{}@{}", &captures[1], token, &captures[3]))
}

/// Runs `git` with `args`, reporting failures with `display` as the command
/// text (so rewritten URLs with embedded tokens never surface).
async fn run_git(args: &[String], display: &str, cwd: Option<&Path>) -> Result<()> {
    let mut command = Command::new("git");
    command.args(args).env("GIT_TERMINAL_PROMPT", "0");
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = command
        .output()
        .await
        .with_context(|| format!("failed to execute `{display}`"))?;

    if !output.status.success() {
        return Err(FabrikateError::from_output(display.to_string(), &output).into());
    }
    Ok(())
}

impl GitCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones `url` at `sha`/`branch` into the shared cache and returns the
    /// cached working tree, single-flighting concurrent callers.
    pub async fn clone_repo(
        &self,
        url: &str,
        sha: &str,
        branch: &str,
        tokens: &AccessTokens,
    ) -> Result<PathBuf> {
        let key = cache_key(url, branch, sha);

        loop {
            enum Claim {
                Ready(PathBuf),
                Wait(Arc<Notify>),
                Owner(Arc<Notify>),
            }

            let claim = match self.clones.entry(key.clone()) {
                Entry::Occupied(entry) => match entry.get() {
                    CloneState::Ready(path) => Claim::Ready(path.clone()),
                    CloneState::Pending(notify) => Claim::Wait(notify.clone()),
                },
                Entry::Vacant(entry) => {
                    let notify = Arc::new(Notify::new());
                    entry.insert(CloneState::Pending(notify.clone()));
                    Claim::Owner(notify)
                }
            };

            match claim {
                Claim::Ready(path) => {
                    info!("previously cloned '{key}' this run; reusing cached result");
                    return Ok(path);
                }
                Claim::Wait(notify) => {
                    // Register interest before re-checking so a publish
                    // between the map read and the await is not missed.
                    let mut notified = std::pin::pin!(notify.notified());
                    notified.as_mut().enable();
                    let published = self.clones.get(&key).map(|state| match state.value() {
                        CloneState::Ready(path) => Some(path.clone()),
                        CloneState::Pending(_) => None,
                    });
                    match published {
                        Some(Some(path)) => return Ok(path),
                        Some(None) => notified.await,
                        // Owner failed and vacated the entry; try to claim.
                        None => {}
                    }
                }
                Claim::Owner(notify) => {
                    let result = self.perform_clone(url, sha, branch, tokens).await;
                    match result {
                        Ok(path) => {
                            self.clones.insert(key, CloneState::Ready(path.clone()));
                            notify.notify_waiters();
                            return Ok(path);
                        }
                        Err(err) => {
                            self.clones.remove(&key);
                            notify.notify_waiters();
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    async fn perform_clone(
        &self,
        url: &str,
        sha: &str,
        branch: &str,
        tokens: &AccessTokens,
    ) -> Result<PathBuf> {
        let slot = clone_slot(url, branch, sha);
        remove_dir_idempotent(&slot)?;
        if let Some(parent) = slot.parent() {
            ensure_dir(parent)?;
        }

        let remote = match tokens.get(url).await {
            Some(token) => inject_token(url, &token)?,
            None => url.to_string(),
        };

        let mut args = vec!["clone".to_string(), remote];
        if sha.is_empty() {
            debug!("component requested latest commit; fast cloning at --depth 1");
            args.push("--depth".to_string());
            args.push("1".to_string());
        } else {
            debug!("component requested commit '{sha}'; full clone needed");
        }
        if !branch.is_empty() {
            args.push("--branch".to_string());
            args.push(branch.to_string());
        }
        args.push(slot.to_string_lossy().into_owned());

        info!("cloning {url} into {}", slot.display());
        run_git(&args, &format!("git clone {url}"), None).await?;

        if !sha.is_empty() {
            info!("checking out commit '{sha}' for repo '{url}'");
            let checkout = vec!["checkout".to_string(), sha.to_string()];
            run_git(&checkout, &format!("git checkout {sha}"), Some(&slot)).await?;
        }

        Ok(slot)
    }

    /// Clones `url` at `sha`/`branch` and copies the working tree into
    /// `into`, replacing any previous content there.
    pub async fn clone_into(
        &self,
        url: &str,
        sha: &str,
        branch: &str,
        into: &Path,
        tokens: &AccessTokens,
    ) -> Result<()> {
        let cached = self.clone_repo(url, sha, branch, tokens).await?;
        remove_dir_idempotent(into)?;
        info!("copying {} into {}", cached.display(), into.display());
        copy_dir(&cached, into)
    }

    /// Removes every cached clone directory and clears the cache.
    ///
    /// Fails with [`FabrikateError::Cache`] if any clone is still in flight.
    pub fn clean_cache(&self) -> Result<()> {
        let mut paths = Vec::new();
        for entry in self.clones.iter() {
            match entry.value() {
                CloneState::Ready(path) => paths.push(path.clone()),
                CloneState::Pending(_) => {
                    return Err(FabrikateError::Cache {
                        reason: format!("clone '{}' still in flight during cache clean", entry.key()),
                    }
                    .into());
                }
            }
        }

        for path in paths {
            info!("removing git cache directory '{}'", path.display());
            remove_dir_idempotent(&path)?;
        }
        self.clones.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_defaults_branch_and_sha() {
        assert_eq!(
            cache_key("https://example.com/repo", "", ""),
            "https://example.com/repo@master:head"
        );
        assert_eq!(
            cache_key("https://example.com/repo", "dev", "abc123"),
            "https://example.com/repo@dev:abc123"
        );
    }

    #[test]
    fn clone_slot_is_deterministic_per_coordinate() {
        let a = clone_slot("https://example.com/org/repo", "dev", "");
        let b = clone_slot("https://example.com/org/repo", "dev", "");
        let c = clone_slot("https://example.com/org/repo", "main", "");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with("example.com/org/repo/dev/head"));
    }

    #[test]
    fn inject_token_rewrites_bare_https_urls() {
        let rewritten = inject_token("https://internal.example/repo.git", "secret").unwrap();
        assert_eq!(rewritten, "https://secret@internal.example/repo.git");
    }

    #[test]
    fn inject_token_preserves_existing_userinfo() {
        let url = "https://user@internal.example/repo.git";
        assert_eq!(inject_token(url, "secret").unwrap(), url);
    }

    #[test]
    fn inject_token_ignores_non_http_urls() {
        let url = "git@github.com:org/repo.git";
        assert_eq!(inject_token(url, "secret").unwrap(), url);
    }

    #[tokio::test]
    async fn access_tokens_are_shared_between_clones() {
        let tokens = AccessTokens::new();
        let view = tokens.clone();
        tokens.set("https://example.com/repo", "tok").await;
        assert_eq!(
            view.get("https://example.com/repo").await.as_deref(),
            Some("tok")
        );
        assert!(view.get("https://example.com/other").await.is_none());
    }
}
