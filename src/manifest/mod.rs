//! Post-processing of rendered manifests.
//!
//! `helm template` output is a multi-document YAML stream that frequently
//! contains noise: warning text printed by the chart, empty documents,
//! comment-only sections. [`clean`] drops everything that does not decode to
//! a non-empty mapping. [`inject_namespace`] sets `metadata.namespace` on
//! documents that lack one, for charts that expect the server side to fill
//! the namespace in (helm only injects it when the chart supports it
//! directly, see helm#3553).
//!
//! Both passes preserve the input document order, so generated output is
//! stable across runs.

use anyhow::{Context, Result};
use serde_yaml::Value;
use tracing::warn;

/// Strips the document marker and surrounding blank lines from a raw
/// segment produced by splitting on `\n---`.
fn normalize_segment(segment: &str) -> &str {
    let segment = segment.strip_prefix("---").unwrap_or(segment);
    segment.trim_matches('\n')
}

/// Removes stray entries from a multi-document manifest stream.
///
/// Each document is kept only when it decodes to a non-empty YAML mapping;
/// anything else (helm warnings, empty documents, scalar noise) is dropped
/// with a warning. Kept documents are re-emitted as `---\n<doc>\n`, so the
/// operation is idempotent.
pub fn clean(manifests: &str) -> String {
    let mut cleaned = String::new();

    for raw in manifests.split("\n---") {
        let segment = normalize_segment(raw);
        if segment.trim().is_empty() {
            continue;
        }

        match serde_yaml::from_str::<Value>(segment) {
            Ok(Value::Mapping(mapping)) if !mapping.is_empty() => {
                cleaned.push_str("---\n");
                cleaned.push_str(segment);
                cleaned.push('\n');
            }
            Ok(_) => {
                warn!("removing manifest entry that is not a non-empty mapping: '{segment}'");
            }
            Err(err) => {
                warn!(
                    "unable to parse manifest entry, most likely stray `helm template` output; \
                     removing entry '{segment}': {err}"
                );
            }
        }
    }

    cleaned
}

/// Sets `metadata.namespace: <namespace>` on every document that has a
/// `metadata` mapping without a namespace, preserving document order.
///
/// Documents that fail to decode or are not mappings are skipped with a
/// warning; a re-serialization failure aborts the whole pass.
pub fn inject_namespace(manifests: &str, namespace: &str) -> Result<String> {
    let mut namespaced = String::new();

    for raw in manifests.split("\n---") {
        let segment = normalize_segment(raw);
        if segment.trim().is_empty() {
            continue;
        }

        let mut document: Value = match serde_yaml::from_str(segment) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    "unable to parse manifest entry; skipping namespace injection of \
                     '{namespace}' into '{segment}': {err}"
                );
                continue;
            }
        };

        let Some(mapping) = document.as_mapping_mut() else {
            warn!("manifest entry is not a mapping; skipping namespace injection: '{segment}'");
            continue;
        };
        if mapping.is_empty() {
            continue;
        }

        if let Some(metadata) = mapping.get_mut("metadata").and_then(Value::as_mapping_mut) {
            if metadata.get("namespace").is_none() {
                metadata.insert(
                    Value::String("namespace".to_string()),
                    Value::String(namespace.to_string()),
                );
            }
        }

        let serialized = serde_yaml::to_string(&document)
            .context("failed to re-serialize manifest during namespace injection")?;
        namespaced.push_str("---\n");
        namespaced.push_str(serialized.trim_matches('\n'));
        namespaced.push('\n');
    }

    Ok(namespaced)
}
