//! Dependency graph of the pipeline documents of a build.
//!
//! Vertices are keyed by stage name and carry a `skip` flag marking
//! documents that did not match the triggering event. The same vertex set
//! answers three different questions:
//!
//! - [`DependencyGraph::dependencies`]: the effective predecessors of a stage
//!   once skipped documents are elided, used to rewrite `depends_on`.
//! - [`DependencyGraph::ancestors`]: every active stage upstream of a stage.
//! - [`DependencyGraph::descendants`]: every stage downstream of a stage,
//!   regardless of skip, used to cascade restarts.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DagError {
    #[error("Dependency cycle detected in Pipeline")]
    CycleDetected,
}

/// A stage in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vertex {
    pub name: String,
    /// Skipped vertices are traversed through but never reported as
    /// effective dependencies or ancestors.
    pub skip: bool,
    depends_on: Vec<String>,
}

impl Vertex {
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }
}

/// Directed graph of stage names and their `depends_on` edges.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    vertices: Vec<Vertex>,
    index: HashMap<String, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a vertex, replacing any existing vertex with the same name.
    /// The vertex starts active; callers may flip `skip` on the returned
    /// reference.
    pub fn add<I, S>(&mut self, name: impl Into<String>, depends_on: I) -> &mut Vertex
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let vertex = Vertex {
            name: name.into(),
            skip: false,
            depends_on: depends_on.into_iter().map(Into::into).collect(),
        };
        let idx = match self.index.get(&vertex.name) {
            Some(&idx) => {
                self.vertices[idx] = vertex;
                idx
            }
            None => {
                let idx = self.vertices.len();
                self.index.insert(vertex.name.clone(), idx);
                self.vertices.push(vertex);
                idx
            }
        };
        &mut self.vertices[idx]
    }

    pub fn get(&self, name: &str) -> Option<&Vertex> {
        self.index.get(name).map(|&idx| &self.vertices[idx])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Vertex> {
        self.index.get(name).map(|&idx| &mut self.vertices[idx])
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Whether the raw `depends_on` edges contain a cycle. Skip flags are
    /// ignored and self-dependencies count as cycles. Edges to unknown
    /// vertices are not part of the graph.
    pub fn detect_cycles(&self) -> bool {
        let mut graph = DiGraph::<&str, ()>::with_capacity(self.vertices.len(), 0);
        for vertex in &self.vertices {
            graph.add_node(vertex.name.as_str());
        }
        for (idx, vertex) in self.vertices.iter().enumerate() {
            for dep in &vertex.depends_on {
                if let Some(&dep_idx) = self.index.get(dep) {
                    graph.add_edge(NodeIndex::new(dep_idx), NodeIndex::new(idx), ());
                }
            }
        }
        toposort(&graph, None).is_err()
    }

    /// [`detect_cycles`](Self::detect_cycles) as a `Result`.
    pub fn verify(&self) -> Result<(), DagError> {
        if self.detect_cycles() {
            return Err(DagError::CycleDetected);
        }
        Ok(())
    }

    /// Every active vertex upstream of `name`. Skipped vertices are walked
    /// through but left out of the result.
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        if let Some(vertex) = self.get(name) {
            visited.insert(vertex.name.as_str());
            self.collect_ancestors(vertex, &mut visited, &mut result);
        }
        result
    }

    fn collect_ancestors<'a>(
        &'a self,
        vertex: &'a Vertex,
        visited: &mut HashSet<&'a str>,
        result: &mut Vec<String>,
    ) {
        for dep in &vertex.depends_on {
            if !visited.insert(dep.as_str()) {
                continue;
            }
            let Some(parent) = self.get(dep) else {
                continue;
            };
            if !parent.skip {
                result.push(parent.name.clone());
            }
            self.collect_ancestors(parent, visited, result);
        }
    }

    /// Effective immediate predecessors of `name`: each active direct
    /// dependency, with skipped dependencies replaced by their own effective
    /// dependencies. A skipped vertex has none.
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        let mut result = Vec::new();
        let Some(vertex) = self.get(name) else {
            return result;
        };
        if vertex.skip {
            return result;
        }
        let mut visited = HashSet::new();
        visited.insert(vertex.name.as_str());
        self.collect_dependencies(vertex, &mut visited, &mut result);
        result
    }

    fn collect_dependencies<'a>(
        &'a self,
        vertex: &'a Vertex,
        visited: &mut HashSet<&'a str>,
        result: &mut Vec<String>,
    ) {
        for dep in &vertex.depends_on {
            let Some(parent) = self.get(dep) else {
                continue;
            };
            if !parent.skip {
                if !result.contains(&parent.name) {
                    result.push(parent.name.clone());
                }
            } else if visited.insert(parent.name.as_str()) {
                self.collect_dependencies(parent, visited, result);
            }
        }
    }

    /// Every vertex that directly or transitively depends on `name`, in
    /// breadth-first order. Skip flags are ignored and `name` need not be a
    /// vertex itself.
    pub fn descendants(&self, name: &str) -> Vec<String> {
        let reverse = self.reverse_index();
        let mut result = Vec::new();
        let mut visited = HashSet::from([name]);
        let mut queue = VecDeque::from([name]);

        while let Some(current) = queue.pop_front() {
            let Some(children) = reverse.get(current) else {
                continue;
            };
            for &child in children {
                if visited.insert(child) {
                    result.push(child.to_string());
                    queue.push_back(child);
                }
            }
        }
        result
    }

    /// Map from a dependency name to the vertices that list it, in vertex
    /// insertion order.
    fn reverse_index(&self) -> HashMap<&str, Vec<&str>> {
        let mut index: HashMap<&str, Vec<&str>> = HashMap::new();
        for vertex in &self.vertices {
            for dep in &vertex.depends_on {
                let children = index.entry(dep.as_str()).or_default();
                if !children.contains(&vertex.name.as_str()) {
                    children.push(vertex.name.as_str());
                }
            }
        }
        index
    }
}
