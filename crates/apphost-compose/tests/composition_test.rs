//! Integration tests for the declaration pipeline.
//!
//! Covers the path from declarations to a validated graph:
//! 1. Registry declarations and handle misuse
//! 2. Start ordering over generated graphs (proptest)
//! 3. Cycle rejection
//! 4. Composition files

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashMap;

use apphost_common::error::{AppHostError, GraphViolation};
use apphost_compose::file::{CompositionFile, load_registry};
use apphost_compose::graph::CompositionGraph;
use apphost_compose::registry::Registry;
use apphost_compose::resolver::resolve_environment;
use apphost_compose::resource::{
    ContainerImageOptions, ProcessConfig, ProjectConfig, PublishStrategy, ResourceKind,
};
use proptest::prelude::*;

// ── Registry ─────────────────────────────────────────────────────────

#[test]
fn playground_declaration_finalizes() {
    let mut registry = Registry::new();
    let api = registry
        .add_project("api", ProjectConfig::new("../Playground.Api"))
        .expect("api");
    let frontend = registry
        .add_npm_app("frontend", "../Playground.Frontend", "start")
        .expect("frontend");
    registry
        .annotate_publish(
            frontend.name(),
            PublishStrategy::ContainerImage(ContainerImageOptions::default()),
        )
        .expect("annotate");

    let graph = registry.finalize().expect("valid graph");
    assert_eq!(graph.len(), 2);
    assert!(graph.get(api.name()).expect("api").publish.is_none());
    assert!(graph.get("frontend").expect("frontend").publish.is_some());
    assert_eq!(graph.start_levels().len(), 1);
}

#[test]
fn duplicate_names_are_rejected_at_declaration() {
    let mut registry = Registry::new();
    let _ = registry
        .add_process("api", ProcessConfig::new("server", "."))
        .expect("first");
    let err = registry
        .add_npm_app("api", "web", "start")
        .expect_err("duplicate");
    assert!(matches!(err, AppHostError::DuplicateName { ref name } if name == "api"));
}

#[test]
fn handles_from_another_registry_are_unknown() {
    let mut first = Registry::new();
    let handle = first
        .add_process("api", ProcessConfig::new("server", "."))
        .expect("api");
    let mut second = Registry::new();
    let _ = second
        .add_process("db", ProcessConfig::new("postgres", "."))
        .expect("db");

    let err = second.with_port(&handle, 80).expect_err("foreign handle");
    assert!(matches!(err, AppHostError::UnknownResource { .. }));
}

#[test]
fn annotating_an_unknown_resource_fails() {
    let mut registry = Registry::new();
    let err = registry
        .annotate_publish(
            "ghost",
            PublishStrategy::ContainerImage(ContainerImageOptions::default()),
        )
        .expect_err("unknown");
    assert!(matches!(err, AppHostError::UnknownResource { ref name } if name == "ghost"));
}

// ── Ordering ─────────────────────────────────────────────────────────

/// An acyclic dependency shape: `edges[i]` holds the indices `i` depends on,
/// all lower than `i`, and `declaration` is the order resources are added in.
#[derive(Debug, Clone)]
struct Shape {
    edges: Vec<Vec<usize>>,
    declaration: Vec<usize>,
}

fn arb_shape(max: usize) -> impl Strategy<Value = Shape> {
    (1..=max).prop_flat_map(|size| {
        let edges = (0..size)
            .map(|i| proptest::collection::vec(proptest::bool::weighted(0.3), i))
            .collect::<Vec<_>>()
            .prop_map(|rows| {
                rows.into_iter()
                    .map(|row| {
                        row.into_iter()
                            .enumerate()
                            .filter_map(|(j, on)| on.then_some(j))
                            .collect()
                    })
                    .collect::<Vec<Vec<usize>>>()
            });
        let declaration = Just((0..size).collect::<Vec<usize>>()).prop_shuffle();
        (edges, declaration).prop_map(|(edges, declaration)| Shape { edges, declaration })
    })
}

fn build_graph(shape: &Shape) -> CompositionGraph {
    let mut registry = Registry::new();
    let mut handles = HashMap::new();
    for &i in &shape.declaration {
        let handle = registry
            .add_process(format!("svc-{i}"), ProcessConfig::new("server", "."))
            .expect("declare");
        let _ = handles.insert(i, handle);
    }
    for (i, deps) in shape.edges.iter().enumerate() {
        for &j in deps {
            registry
                .depends_on(&handles[&i], &format!("svc-{j}"))
                .expect("depends");
        }
    }
    registry.finalize().expect("acyclic graph")
}

fn start_names(graph: &CompositionGraph) -> Vec<String> {
    graph
        .topological_start_order()
        .iter()
        .map(|r| r.name.clone())
        .collect()
}

proptest! {
    #[test]
    fn every_dependency_starts_before_its_dependents(shape in arb_shape(12)) {
        let graph = build_graph(&shape);
        let order = start_names(&graph);
        prop_assert_eq!(order.len(), graph.len());

        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        for resource in graph.resources() {
            for dependency in &resource.depends_on {
                prop_assert!(
                    position[dependency.as_str()] < position[resource.name.as_str()],
                    "{} must start before {}",
                    dependency,
                    resource.name
                );
            }
        }
    }

    #[test]
    fn levels_only_depend_on_earlier_levels(shape in arb_shape(10)) {
        let graph = build_graph(&shape);
        let mut level_of = HashMap::new();
        for (depth, level) in graph.start_levels().iter().enumerate() {
            for resource in level {
                let _ = level_of.insert(resource.name.clone(), depth);
            }
        }
        prop_assert_eq!(level_of.len(), graph.len());
        for resource in graph.resources() {
            for dependency in &resource.depends_on {
                prop_assert!(level_of[dependency] < level_of[&resource.name]);
            }
        }
    }

    #[test]
    fn stop_order_reverses_start_order(shape in arb_shape(10)) {
        let start = start_names(&build_graph(&shape));
        let mut stop = CompositionGraph::stop_order(&start);
        stop.reverse();
        prop_assert_eq!(stop, start);
    }

    #[test]
    fn ordering_is_deterministic(shape in arb_shape(15)) {
        prop_assert_eq!(start_names(&build_graph(&shape)), start_names(&build_graph(&shape)));
    }
}

// ── Cycles ───────────────────────────────────────────────────────────

#[test]
fn two_resource_cycle_is_rejected_with_its_path() {
    let mut registry = Registry::new();
    let a = registry
        .add_process("a", ProcessConfig::new("server", "."))
        .expect("a");
    let b = registry
        .add_process("b", ProcessConfig::new("server", "."))
        .expect("b");
    registry.depends_on(&a, "b").expect("a -> b");
    registry.depends_on(&b, "a").expect("b -> a");

    let err = registry.finalize().expect_err("cycle");
    assert!(matches!(
        err,
        AppHostError::InvalidGraph {
            violation: GraphViolation::Cycle(ref path)
        } if path == &["a", "b"]
    ));
    assert!(err.to_string().contains("a -> b -> a"), "got: {err}");
}

#[test]
fn cycle_behind_an_acyclic_prefix_is_rejected() {
    let mut registry = Registry::new();
    let root = registry
        .add_process("root", ProcessConfig::new("server", "."))
        .expect("root");
    let x = registry
        .add_process("x", ProcessConfig::new("server", "."))
        .expect("x");
    let y = registry
        .add_process("y", ProcessConfig::new("server", "."))
        .expect("y");
    registry.depends_on(&root, "x").expect("root -> x");
    registry.depends_on(&x, "y").expect("x -> y");
    registry.depends_on(&y, "x").expect("y -> x");

    let err = registry.finalize().expect_err("cycle");
    let AppHostError::InvalidGraph {
        violation: GraphViolation::Cycle(path),
    } = err
    else {
        panic!("expected a cycle violation");
    };
    assert_eq!(path, ["x", "y"]);
}

// ── Composition files ────────────────────────────────────────────────

const PLAYGROUND: &str = r"
settings:
  repository: samplerepo.io
  image_tag: '1'
resources:
  - name: db
    process:
      command: postgres
      args: ['-p', '5432']
    port: 5432
  - name: api
    project:
      path: api
    depends_on: [db]
    env:
      RUST_LOG: debug
    port: 8080
  - name: frontend
    npm:
      dir: frontend
      script: start
    depends_on: [api]
    port: 3000
    publish:
      container_image:
        dockerfile: Dockerfile
    limits:
      cpu: '0.5'
      memory: 1Gi
";

#[test]
fn composition_file_declares_through_the_registry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("apphost.yaml");
    std::fs::write(&path, PLAYGROUND).expect("write");

    let (config, registry) = load_registry(&path).expect("load");
    assert_eq!(config.repository.as_deref(), Some("samplerepo.io"));
    assert_eq!(config.image_reference("frontend"), "samplerepo.io/frontend:1");

    let graph = registry.finalize().expect("graph");
    let order: Vec<&str> = graph
        .topological_start_order()
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(order, ["db", "api", "frontend"]);

    let api = graph.get("api").expect("api");
    let ResourceKind::Project(project) = &api.kind else {
        panic!("api should be a project");
    };
    assert_eq!(project.path, dir.path().join("api"));

    let env = resolve_environment(&graph, api);
    assert!(env.contains(&("DB_HOST".into(), "localhost".into())));
    assert!(env.contains(&("DB_PORT".into(), "5432".into())));
    assert!(env.contains(&("RUST_LOG".into(), "debug".into())));

    let frontend = graph.get("frontend").expect("frontend");
    assert_eq!(frontend.limits.memory.as_deref(), Some("1Gi"));
    assert!(frontend.publish.is_some());
}

#[test]
fn shipped_playground_file_loads() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos/playground/apphost.yaml");
    let (config, registry) = load_registry(&path).expect("load playground");
    assert_eq!(config.image_reference("frontend"), "samplerepo.io/frontend:latest");

    let graph = registry.finalize().expect("graph");
    assert_eq!(start_names(&graph), ["api", "frontend"]);
    assert!(graph.get("api").expect("api").publish.is_none());
    let frontend = graph.get("frontend").expect("frontend");
    assert!(matches!(
        frontend.publish,
        Some(PublishStrategy::ContainerImage(_))
    ));
    assert_eq!(frontend.limits.cpu.as_deref(), Some("0.5"));
}

#[test]
fn composition_file_rejects_misspelled_resource_keys() {
    let yaml = r"
resources:
  - name: db
    process: { command: postgres }
  - name: api
    npm: { dir: api, script: start }
    depend_on: [db]
";
    let err = CompositionFile::parse(yaml).expect_err("typo must not be ignored");
    assert!(matches!(err, AppHostError::Yaml { .. }));
}

#[test]
fn composition_file_cycles_are_rejected() {
    let yaml = r"
resources:
  - name: a
    npm: { dir: a, script: start }
    depends_on: [b]
  - name: b
    npm: { dir: b, script: start }
    depends_on: [a]
";
    let (_, registry) = CompositionFile::parse(yaml)
        .expect("parse")
        .into_registry(std::path::Path::new("."))
        .expect("declare");
    let err = registry.finalize().expect_err("cycle");
    assert!(matches!(err, AppHostError::InvalidGraph { .. }));
}

#[test]
fn composition_file_rejects_unknown_top_level_keys() {
    let err = CompositionFile::parse("services: []\n").expect_err("unknown key");
    assert!(matches!(err, AppHostError::Yaml { .. }));
}
