//! End-to-end generate scenarios over static component trees.

mod common;

use tempfile::TempDir;

use common::{write_component, write_config, write_manifest};
use fabrikate::commands::generate;

const DEPLOYMENT: &str = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: nginx";

/// A root component with one inline static subcomponent.
fn build_static_tree(root: &std::path::Path) {
    write_component(
        root,
        r"name: root
type: component
subcomponents:
  - name: nginx
    type: static
    path: manifests
",
    );
    write_manifest(&root.join("manifests"), "deploy.yaml", DEPLOYMENT);
}

#[tokio::test]
async fn single_local_static_component_generates_one_file() {
    let dir = TempDir::new().unwrap();
    build_static_tree(dir.path());

    let components = generate(dir.path(), Vec::new(), false, false).await.unwrap();

    assert_eq!(components.len(), 1);
    assert_eq!(components[0].name, "nginx");

    let generated = dir.path().join("generated/common/nginx.yaml");
    let contents = std::fs::read_to_string(&generated).unwrap();
    assert_eq!(contents, format!("---\n{DEPLOYMENT}\n"));
}

#[tokio::test]
async fn environment_list_names_the_output_directory() {
    let dir = TempDir::new().unwrap();
    build_static_tree(dir.path());

    generate(
        dir.path(),
        vec!["prod".to_string(), "east".to_string()],
        false,
        false,
    )
    .await
    .unwrap();

    assert!(dir.path().join("generated/prod-east/nginx.yaml").exists());
}

#[tokio::test]
async fn regeneration_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    build_static_tree(dir.path());

    generate(dir.path(), Vec::new(), false, false).await.unwrap();
    let first = std::fs::read(dir.path().join("generated/common/nginx.yaml")).unwrap();

    generate(dir.path(), Vec::new(), false, false).await.unwrap();
    let second = std::fs::read(dir.path().join("generated/common/nginx.yaml")).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn nested_remote_components_mirror_logical_paths() {
    let dir = TempDir::new().unwrap();
    write_component(
        dir.path(),
        r"name: root
type: component
subcomponents:
  - name: infra
    type: component
    source: infra
",
    );
    let infra = dir.path().join("infra");
    write_component(
        &infra,
        r"name: infra
type: component
subcomponents:
  - name: db
    type: static
    path: manifests
",
    );
    write_manifest(&infra.join("manifests"), "sts.yaml", "kind: StatefulSet");

    generate(dir.path(), Vec::new(), false, false).await.unwrap();

    let generated = dir.path().join("generated/common/infra/db.yaml");
    assert_eq!(
        std::fs::read_to_string(generated).unwrap(),
        "---\nkind: StatefulSet\n"
    );
}

#[tokio::test]
async fn disabled_subcomponents_produce_no_output() {
    let dir = TempDir::new().unwrap();
    build_static_tree(dir.path());
    write_config(
        dir.path(),
        "common",
        "subcomponents:\n  nginx:\n    disabled: true\n",
    );

    let components = generate(dir.path(), Vec::new(), false, false).await.unwrap();

    assert!(components.is_empty());
    assert!(!dir.path().join("generated/common/nginx.yaml").exists());
}

#[tokio::test]
async fn generate_hooks_run_around_generation() {
    let dir = TempDir::new().unwrap();
    write_component(
        dir.path(),
        r"name: root
type: static
path: manifests
hooks:
  before-generate:
    - echo before > before.txt
  after-generate:
    - echo after > after.txt
",
    );
    write_manifest(&dir.path().join("manifests"), "cm.yaml", "kind: ConfigMap");

    generate(dir.path(), Vec::new(), false, false).await.unwrap();

    assert!(dir.path().join("before.txt").exists());
    assert!(dir.path().join("after.txt").exists());
}

#[tokio::test]
async fn failing_hook_aborts_generate() {
    let dir = TempDir::new().unwrap();
    write_component(
        dir.path(),
        r"name: root
type: static
path: manifests
hooks:
  before-generate:
    - exit 7
",
    );
    write_manifest(&dir.path().join("manifests"), "cm.yaml", "kind: ConfigMap");

    let err = generate(dir.path(), Vec::new(), false, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("hook"));
    assert!(!dir.path().join("generated").exists());
}

#[tokio::test]
async fn kustomization_references_generated_manifests() {
    let dir = TempDir::new().unwrap();
    build_static_tree(dir.path());

    generate(dir.path(), Vec::new(), false, true).await.unwrap();

    let kustomization =
        std::fs::read_to_string(dir.path().join("generated/common/kustomization.yaml")).unwrap();
    assert!(kustomization.contains("kind: Kustomization"));
    assert!(kustomization.contains("- nginx.yaml"));
}

#[tokio::test]
async fn legacy_generator_field_still_selects_the_generator() {
    let dir = TempDir::new().unwrap();
    write_component(
        dir.path(),
        r"name: root
type: component
subcomponents:
  - name: nginx
    generator: static
    path: manifests
",
    );
    write_manifest(&dir.path().join("manifests"), "deploy.yaml", DEPLOYMENT);

    let components = generate(dir.path(), Vec::new(), false, false).await.unwrap();
    assert_eq!(components.len(), 1);
    assert!(dir.path().join("generated/common/nginx.yaml").exists());
}

#[tokio::test]
async fn unknown_component_type_is_fatal() {
    let dir = TempDir::new().unwrap();
    write_component(
        dir.path(),
        r"name: root
type: kustomize
",
    );

    let err = generate(dir.path(), Vec::new(), false, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown component type"));
}
