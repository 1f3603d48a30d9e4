//! Shared per-run state.
//!
//! A [`Session`] owns the mutable caches that install and generate share
//! across walker tasks: the git clone cache, the discovered access tokens,
//! and the helm registry lock. Top-level commands create one session and
//! thread clones of it (all fields are `Arc`-backed, so clones are cheap
//! handles onto the same state) through visitors and generators. Tests
//! create their own sessions, keeping them hermetic.

use crate::git::{AccessTokens, GitCache};
use crate::helm::HelmClient;

/// Handle to the caches shared by one install or generate run.
#[derive(Clone, Default)]
pub struct Session {
    /// Single-flight git clone cache.
    pub git: GitCache,
    /// Repository URL → personal access token, discovered during install.
    pub tokens: AccessTokens,
    /// Host helm client with serialized registry mutations.
    pub helm: HelmClient,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }
}
