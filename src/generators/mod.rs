//! Manifest generators.
//!
//! A generator turns an installed component into Kubernetes YAML text. The
//! strategy is selected by the component's `type`: `helm` templates a chart,
//! `static` concatenates a directory of manifests, and plain `component`
//! nodes generate nothing (they exist to structure the tree).

pub mod helm;
pub mod static_files;

pub use helm::HelmGenerator;
pub use static_files::StaticGenerator;

use anyhow::Result;
use async_trait::async_trait;

use crate::component::Component;
use crate::core::FabrikateError;
use crate::session::Session;

/// The per-component install + generate contract.
#[async_trait]
pub trait Generator: Send + Sync + std::fmt::Debug {
    /// Fetches or prepares the component's content on disk.
    async fn install(&self, component: &Component, session: &Session) -> Result<()>;

    /// Produces the component's manifest text.
    async fn generate(&self, component: &Component, session: &Session) -> Result<String>;
}

static HELM_GENERATOR: HelmGenerator = HelmGenerator;
static STATIC_GENERATOR: StaticGenerator = StaticGenerator;

/// Resolves the generator for a component type.
///
/// Plain `component` nodes (and the empty default) have no generator;
/// unknown types are a fatal validation error.
pub fn generator_for(component_type: &str) -> Result<Option<&'static dyn Generator>> {
    match component_type {
        "" | "component" => Ok(None),
        "helm" => Ok(Some(&HELM_GENERATOR)),
        "static" => Ok(Some(&STATIC_GENERATOR)),
        other => Err(FabrikateError::Validation {
            reason: format!("unknown component type '{other}'"),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_components_have_no_generator() {
        assert!(generator_for("").unwrap().is_none());
        assert!(generator_for("component").unwrap().is_none());
    }

    #[test]
    fn helm_and_static_resolve() {
        assert!(generator_for("helm").unwrap().is_some());
        assert!(generator_for("static").unwrap().is_some());
    }

    #[test]
    fn unknown_types_are_fatal() {
        let err = generator_for("kustomize").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FabrikateError>(),
            Some(FabrikateError::Validation { .. })
        ));
    }
}
