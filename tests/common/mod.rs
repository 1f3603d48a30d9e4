//! Helpers for building component trees on disk in integration tests.

use std::path::Path;

/// Writes `component.yaml` at `dir`, creating the directory as needed.
pub fn write_component(dir: &Path, yaml: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("component.yaml"), yaml).unwrap();
}

/// Writes `config/<environment>.yaml` at `dir`.
pub fn write_config(dir: &Path, environment: &str, yaml: &str) {
    let config_dir = dir.join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join(format!("{environment}.yaml")), yaml).unwrap();
}

/// Writes a manifest file under `dir` (typically `manifests/<name>`).
pub fn write_manifest(dir: &Path, name: &str, contents: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), contents).unwrap();
}
