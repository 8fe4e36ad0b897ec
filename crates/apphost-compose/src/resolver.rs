//! Environment wiring between dependent resources.
//!
//! A resource that depends on another receives connection variables for it,
//! the same way a linked component learns where its peer listens.

use apphost_common::constants::LOCAL_HOST;

use crate::graph::CompositionGraph;
use crate::resource::Resource;

/// A resource with its fully resolved environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    /// Resource name.
    pub name: String,
    /// Environment variables including injected connection vars.
    pub env: Vec<(String, String)>,
}

/// Returns the variable prefix for a resource name: upper-cased, `-` → `_`.
#[must_use]
pub fn env_prefix(name: &str) -> String {
    name.to_ascii_uppercase().replace('-', "_")
}

/// Resolves the environment for one resource.
///
/// The resource receives `PORT` when it declares one. For each dependency
/// `D` it receives `D_HOST`, and when `D` declares a port, `D_PORT` and
/// `D_URL`. Explicitly declared variables override injected ones.
#[must_use]
pub fn resolve_environment(graph: &CompositionGraph, resource: &Resource) -> Vec<(String, String)> {
    let mut injected: Vec<(String, String)> = Vec::new();
    if let Some(port) = resource.port {
        injected.push(("PORT".into(), port.to_string()));
    }

    for dependency in &resource.depends_on {
        let prefix = env_prefix(dependency);
        injected.push((format!("{prefix}_HOST"), LOCAL_HOST.into()));
        if let Some(port) = graph.get(dependency).and_then(|d| d.port) {
            injected.push((format!("{prefix}_PORT"), port.to_string()));
            injected.push((format!("{prefix}_URL"), format!("http://{LOCAL_HOST}:{port}")));
        }
    }

    injected.retain(|(key, _)| !resource.env.iter().any(|(k, _)| k == key));
    injected.extend(resource.env.iter().cloned());
    injected
}

/// Resolves the environment of every resource, in declaration order.
#[must_use]
pub fn resolve_all(graph: &CompositionGraph) -> Vec<ResolvedResource> {
    graph
        .resources()
        .iter()
        .map(|resource| ResolvedResource {
            name: resource.name.clone(),
            env: resolve_environment(graph, resource),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::resource::ProjectConfig;

    fn lookup<'a>(env: &'a [(String, String)], key: &str) -> Option<&'a str> {
        env.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn resolve_empty_graph() {
        let graph = Registry::new().finalize().expect("valid");
        assert!(resolve_all(&graph).is_empty());
    }

    #[test]
    fn resolve_preserves_existing_env() {
        let mut registry = Registry::new();
        let svc = registry
            .add_project("svc", ProjectConfig::new("."))
            .expect("svc");
        registry.with_env(&svc, "KEY", "value").expect("env");
        let graph = registry.finalize().expect("valid");

        let resolved = resolve_all(&graph);
        assert_eq!(resolved.len(), 1);
        assert_eq!(lookup(&resolved[0].env, "KEY"), Some("value"));
    }

    #[test]
    fn resolve_injects_host_port_and_url() {
        let mut registry = Registry::new();
        let api = registry
            .add_project("api", ProjectConfig::new("api"))
            .expect("api");
        let db = registry.add_npm_app("user-db", "db", "start").expect("db");
        registry.with_port(&db, 5432).expect("port");
        registry.depends_on(&api, "user-db").expect("dep");
        let graph = registry.finalize().expect("valid");

        let env = resolve_environment(&graph, graph.get("api").expect("api"));
        assert_eq!(lookup(&env, "USER_DB_HOST"), Some("localhost"));
        assert_eq!(lookup(&env, "USER_DB_PORT"), Some("5432"));
        assert_eq!(lookup(&env, "USER_DB_URL"), Some("http://localhost:5432"));

        let db_env = resolve_environment(&graph, graph.get("user-db").expect("db"));
        assert_eq!(lookup(&db_env, "PORT"), Some("5432"));
    }

    #[test]
    fn resolve_no_port_injects_only_host() {
        let mut registry = Registry::new();
        let worker = registry.add_npm_app("worker", "w", "start").expect("w");
        let _queue = registry.add_npm_app("queue", "q", "start").expect("q");
        registry.depends_on(&worker, "queue").expect("dep");
        let graph = registry.finalize().expect("valid");

        let env = resolve_environment(&graph, graph.get("worker").expect("worker"));
        assert_eq!(lookup(&env, "QUEUE_HOST"), Some("localhost"));
        assert!(lookup(&env, "QUEUE_PORT").is_none());
    }

    #[test]
    fn explicit_env_overrides_injected() {
        let mut registry = Registry::new();
        let web = registry.add_npm_app("web", "web", "start").expect("web");
        let api = registry
            .add_project("api", ProjectConfig::new("api"))
            .expect("api");
        registry.with_port(&api, 8080).expect("port");
        registry.depends_on(&web, "api").expect("dep");
        registry
            .with_env(&web, "API_HOST", "api.internal")
            .expect("env");
        let graph = registry.finalize().expect("valid");

        let env = resolve_environment(&graph, graph.get("web").expect("web"));
        assert_eq!(lookup(&env, "API_HOST"), Some("api.internal"));
        assert_eq!(env.iter().filter(|(k, _)| k == "API_HOST").count(), 1);
        assert_eq!(lookup(&env, "API_PORT"), Some("8080"));
    }
}
