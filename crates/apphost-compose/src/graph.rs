//! The validated composition graph, built on `petgraph`.
//!
//! Node `i` of the internal graph is resource `i` of the arena. Edges point
//! from a dependency to its dependent, so walking outgoing edges visits the
//! resources that must start later.

use std::collections::{BTreeSet, HashMap, HashSet};

use apphost_common::error::{AppHostError, GraphViolation, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;

use crate::resource::Resource;

/// Immutable, validated set of resources and their dependencies.
#[derive(Debug, Clone)]
pub struct CompositionGraph {
    resources: Vec<Resource>,
    by_name: HashMap<String, usize>,
    graph: DiGraph<usize, ()>,
    start_order: Vec<usize>,
    levels: Vec<Vec<usize>>,
}

impl CompositionGraph {
    /// Validates resources and computes their start order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGraph` on a duplicate name, an undeclared dependency,
    /// or a dependency cycle.
    pub fn from_resources(resources: Vec<Resource>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(resources.len());
        for (index, resource) in resources.iter().enumerate() {
            if by_name.insert(resource.name.clone(), index).is_some() {
                return Err(invalid(GraphViolation::DuplicateName(resource.name.clone())));
            }
        }

        let mut graph = DiGraph::with_capacity(resources.len(), 0);
        for index in 0..resources.len() {
            let _ = graph.add_node(index);
        }
        for (index, resource) in resources.iter().enumerate() {
            for dependency in &resource.depends_on {
                let Some(&dep_index) = by_name.get(dependency) else {
                    return Err(invalid(GraphViolation::MissingDependency {
                        resource: resource.name.clone(),
                        dependency: dependency.clone(),
                    }));
                };
                let _ = graph.update_edge(NodeIndex::new(dep_index), NodeIndex::new(index), ());
            }
        }

        let mut this = Self {
            resources,
            by_name,
            graph,
            start_order: Vec::new(),
            levels: Vec::new(),
        };
        if let Some(cycle) = this.find_cycle() {
            return Err(invalid(GraphViolation::Cycle(cycle)));
        }
        this.start_order = this.stable_topological_order();
        this.levels = this.group_into_levels();

        tracing::info!(
            resources = this.resources.len(),
            order = ?this.names(&this.start_order),
            "composition graph finalized"
        );
        Ok(this)
    }

    /// Returns all resources in declaration order.
    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Returns a resource by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.by_name.get(name).map(|&i| &self.resources[i])
    }

    /// Returns the number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns whether the graph has no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Returns resources with every dependency before its dependents.
    ///
    /// Ties between independent resources are broken by declaration order.
    #[must_use]
    pub fn topological_start_order(&self) -> Vec<&Resource> {
        self.start_order.iter().map(|&i| &self.resources[i]).collect()
    }

    /// Returns the start order grouped into levels.
    ///
    /// Every dependency of a resource lies in an earlier level, so members of
    /// one level may be started concurrently. Within a level, resources keep
    /// their relative start order.
    #[must_use]
    pub fn start_levels(&self) -> Vec<Vec<&Resource>> {
        self.levels
            .iter()
            .map(|level| level.iter().map(|&i| &self.resources[i]).collect())
            .collect()
    }

    /// Returns the stop order for an achieved start order: its exact reverse.
    #[must_use]
    pub fn stop_order<S: AsRef<str>>(achieved_start: &[S]) -> Vec<String> {
        achieved_start
            .iter()
            .rev()
            .map(|s| s.as_ref().to_string())
            .collect()
    }

    /// Returns the names a resource depends on directly.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.get(name).map_or(&[], |r| r.depends_on.as_slice())
    }

    /// Returns every resource that depends on `name`, directly or
    /// transitively, in start order.
    #[must_use]
    pub fn transitive_dependents(&self, name: &str) -> Vec<&str> {
        let Some(&start) = self.by_name.get(name) else {
            return Vec::new();
        };
        let mut reached = HashSet::new();
        let mut bfs = Bfs::new(&self.graph, NodeIndex::new(start));
        while let Some(node) = bfs.next(&self.graph) {
            if node.index() != start {
                let _ = reached.insert(node.index());
            }
        }
        self.start_order
            .iter()
            .filter(|i| reached.contains(i))
            .map(|&i| self.resources[i].name.as_str())
            .collect()
    }

    fn names(&self, indices: &[usize]) -> Vec<&str> {
        indices
            .iter()
            .map(|&i| self.resources[i].name.as_str())
            .collect()
    }

    /// Kahn's algorithm, always taking the lowest declaration index that is ready.
    fn stable_topological_order(&self) -> Vec<usize> {
        let mut in_degree: Vec<usize> = (0..self.resources.len())
            .map(|i| {
                self.graph
                    .neighbors_directed(NodeIndex::new(i), Direction::Incoming)
                    .count()
            })
            .collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.resources.len());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for dependent in self
                .graph
                .neighbors_directed(NodeIndex::new(next), Direction::Outgoing)
            {
                let degree = &mut in_degree[dependent.index()];
                *degree -= 1;
                if *degree == 0 {
                    let _ = ready.insert(dependent.index());
                }
            }
        }
        order
    }

    fn group_into_levels(&self) -> Vec<Vec<usize>> {
        let mut depth = vec![0_usize; self.resources.len()];
        for &index in &self.start_order {
            let level = self
                .graph
                .neighbors_directed(NodeIndex::new(index), Direction::Incoming)
                .map(|dep| depth[dep.index()] + 1)
                .max()
                .unwrap_or(0);
            depth[index] = level;
        }

        let mut levels: Vec<Vec<usize>> = Vec::new();
        for &index in &self.start_order {
            let level = depth[index];
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(index);
        }
        levels
    }

    /// Returns the members of one dependency cycle, following `depends_on`
    /// from the earliest-declared member.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let component = petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.first().is_some_and(|&n| self.graph.contains_edge(n, n))
            })
            .min_by_key(|scc| scc.iter().map(|n| n.index()).min())?;

        let members: HashSet<usize> = component.iter().map(|n| n.index()).collect();
        let start = *members.iter().min()?;
        let mut path = vec![start];
        let mut visited = HashSet::from([start]);
        if self.walk_cycle(start, start, &members, &mut visited, &mut path) {
            Some(self.names(&path).into_iter().map(String::from).collect())
        } else {
            Some(self.names(&[start]).into_iter().map(String::from).collect())
        }
    }

    fn walk_cycle(
        &self,
        node: usize,
        start: usize,
        members: &HashSet<usize>,
        visited: &mut HashSet<usize>,
        path: &mut Vec<usize>,
    ) -> bool {
        for dependency in &self.resources[node].depends_on {
            let Some(&next) = self.by_name.get(dependency) else {
                continue;
            };
            if !members.contains(&next) {
                continue;
            }
            if next == start {
                return true;
            }
            if visited.insert(next) {
                path.push(next);
                if self.walk_cycle(next, start, members, visited, path) {
                    return true;
                }
                let _ = path.pop();
            }
        }
        false
    }
}

const fn invalid(violation: GraphViolation) -> AppHostError {
    AppHostError::InvalidGraph { violation }
}
