//! # Directed Acyclic Graphs and Edge Constraints
//!
//! The network structure is stored as one parent set per node. Parent sets are
//! ordered (`BTreeSet`) so that every traversal, edge listing and regression
//! design is deterministic for a given variable order.
//!
//! Edge constraints come in two flavours: mandatory edges, which seed the
//! search and may never be removed or reversed, and forbidden edges, which may
//! never be introduced. A pair present in both sets is rejected up front.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use thiserror::Error;

/// A directed edge `(from, to)` between two node indices.
pub type Edge = (usize, usize);

/// Errors raised by structural operations and constraint validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("The edge {from} -> {to} is both mandatory and forbidden.")]
    ConflictingConstraint { from: String, to: String },

    #[error("The mandatory edges contain a cycle through {from} -> {to}.")]
    CyclicMandatory { from: String, to: String },

    #[error("Constraint refers to unknown variable '{0}'.")]
    UnknownVariable(String),

    #[error("Self loops are not allowed (variable '{0}').")]
    SelfLoop(String),

    #[error("Adding the edge {from} -> {to} would create a cycle.")]
    WouldCreateCycle { from: usize, to: usize },

    #[error("Node index {index} is out of range for a graph with {n_nodes} nodes.")]
    NodeOutOfRange { index: usize, n_nodes: usize },

    #[error("The edge {from} -> {to} is not present in the graph.")]
    MissingEdge { from: usize, to: usize },

    #[error("The graph contains a cycle; no topological order exists.")]
    NotAcyclic,
}

/// A directed acyclic graph over `n` nodes, stored as parent sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dag {
    parents: Vec<BTreeSet<usize>>,
}

impl Dag {
    /// The graph with `n_nodes` nodes and no edges.
    pub fn empty(n_nodes: usize) -> Self {
        Self {
            parents: vec![BTreeSet::new(); n_nodes],
        }
    }

    /// Builds a graph from a list of edges, rejecting self loops and cycles.
    pub fn from_edges(n_nodes: usize, edges: &[Edge]) -> Result<Self, GraphError> {
        let mut dag = Self::empty(n_nodes);
        for &(from, to) in edges {
            dag.add_edge(from, to)?;
        }
        Ok(dag)
    }

    pub fn n_nodes(&self) -> usize {
        self.parents.len()
    }

    pub fn parents(&self, node: usize) -> &BTreeSet<usize> {
        &self.parents[node]
    }

    pub fn children(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.parents
            .iter()
            .enumerate()
            .filter(move |(_, ps)| ps.contains(&node))
            .map(|(child, _)| child)
    }

    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.parents
            .get(to)
            .is_some_and(|ps| ps.contains(&from))
    }

    pub fn n_edges(&self) -> usize {
        self.parents.iter().map(BTreeSet::len).sum()
    }

    /// All edges, sorted by `(from, to)`.
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self
            .parents
            .iter()
            .enumerate()
            .flat_map(|(to, ps)| ps.iter().map(move |&from| (from, to)))
            .collect();
        edges.sort_unstable();
        edges
    }

    fn check_node(&self, index: usize) -> Result<(), GraphError> {
        if index >= self.n_nodes() {
            return Err(GraphError::NodeOutOfRange {
                index,
                n_nodes: self.n_nodes(),
            });
        }
        Ok(())
    }

    /// Returns true if `target` can be reached from `start` along directed
    /// edges, optionally ignoring one edge.
    fn reaches(&self, start: usize, target: usize, skip: Option<Edge>) -> bool {
        let mut visited = vec![false; self.n_nodes()];
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if visited[node] {
                continue;
            }
            visited[node] = true;
            for child in self.children(node) {
                if skip == Some((node, child)) {
                    continue;
                }
                if !visited[child] {
                    stack.push(child);
                }
            }
        }
        false
    }

    /// Whether adding `from -> to` would close a directed cycle.
    pub fn addition_creates_cycle(&self, from: usize, to: usize) -> bool {
        from == to || self.reaches(to, from, None)
    }

    /// Whether turning the existing edge `from -> to` into `to -> from` would
    /// close a directed cycle. This happens exactly when `to` is reachable from
    /// `from` through some other path.
    pub fn reversal_creates_cycle(&self, from: usize, to: usize) -> bool {
        self.reaches(from, to, Some((from, to)))
    }

    pub fn add_edge(&mut self, from: usize, to: usize) -> Result<(), GraphError> {
        self.check_node(from)?;
        self.check_node(to)?;
        if self.addition_creates_cycle(from, to) {
            return Err(GraphError::WouldCreateCycle { from, to });
        }
        self.parents[to].insert(from);
        Ok(())
    }

    pub fn remove_edge(&mut self, from: usize, to: usize) -> Result<(), GraphError> {
        self.check_node(from)?;
        self.check_node(to)?;
        if !self.parents[to].remove(&from) {
            return Err(GraphError::MissingEdge { from, to });
        }
        Ok(())
    }

    pub fn reverse_edge(&mut self, from: usize, to: usize) -> Result<(), GraphError> {
        if !self.has_edge(from, to) {
            return Err(GraphError::MissingEdge { from, to });
        }
        if self.reversal_creates_cycle(from, to) {
            return Err(GraphError::WouldCreateCycle { from: to, to: from });
        }
        self.parents[to].remove(&from);
        self.parents[from].insert(to);
        Ok(())
    }

    /// Kahn's algorithm. Among the nodes that are ready at any point, the one
    /// with the smallest index is emitted first, so the order is unique.
    pub fn topological_order(&self) -> Result<Vec<usize>, GraphError> {
        let n = self.n_nodes();
        let mut in_degree: Vec<usize> = self.parents.iter().map(BTreeSet::len).collect();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (child, ps) in self.parents.iter().enumerate() {
            for &parent in ps {
                children[parent].push(child);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &child in &children[node] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    ready.push(Reverse(child));
                }
            }
        }

        if order.len() != n {
            return Err(GraphError::NotAcyclic);
        }
        Ok(order)
    }

    /// One `from -> to` line per edge, using variable names.
    pub fn format_edges(&self, names: &[String]) -> String {
        self.edges()
            .into_iter()
            .map(|(from, to)| format!("{} -> {}", names[from], names[to]))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Validated mandatory and forbidden edge sets over a fixed variable list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeConstraints {
    mandatory: BTreeSet<Edge>,
    forbidden: BTreeSet<Edge>,
}

impl EdgeConstraints {
    /// Resolves named edge pairs against `variables`. Unknown names, self
    /// loops, and pairs that are both mandatory and forbidden are errors.
    pub fn from_names(
        variables: &[String],
        mandatory: &[(String, String)],
        forbidden: &[(String, String)],
    ) -> Result<Self, GraphError> {
        let resolve = |pairs: &[(String, String)]| -> Result<BTreeSet<Edge>, GraphError> {
            pairs
                .iter()
                .map(|(from, to)| {
                    let f = index_of(variables, from)?;
                    let t = index_of(variables, to)?;
                    if f == t {
                        return Err(GraphError::SelfLoop(from.clone()));
                    }
                    Ok((f, t))
                })
                .collect()
        };

        let constraints = Self {
            mandatory: resolve(mandatory)?,
            forbidden: resolve(forbidden)?,
        };

        if let Some(&(f, t)) = constraints.mandatory.intersection(&constraints.forbidden).next() {
            return Err(GraphError::ConflictingConstraint {
                from: variables[f].clone(),
                to: variables[t].clone(),
            });
        }
        Ok(constraints)
    }

    pub fn is_mandatory(&self, from: usize, to: usize) -> bool {
        self.mandatory.contains(&(from, to))
    }

    pub fn is_forbidden(&self, from: usize, to: usize) -> bool {
        self.forbidden.contains(&(from, to))
    }

    pub fn mandatory(&self) -> impl Iterator<Item = Edge> + '_ {
        self.mandatory.iter().copied()
    }

    pub fn forbidden(&self) -> impl Iterator<Item = Edge> + '_ {
        self.forbidden.iter().copied()
    }

    /// The empty graph plus every mandatory edge.
    pub fn initial_dag(&self, n_nodes: usize, variables: &[String]) -> Result<Dag, GraphError> {
        let mut dag = Dag::empty(n_nodes);
        for (from, to) in self.mandatory() {
            match dag.add_edge(from, to) {
                Ok(()) => {}
                Err(GraphError::WouldCreateCycle { .. }) => {
                    return Err(GraphError::CyclicMandatory {
                        from: variables[from].clone(),
                        to: variables[to].clone(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(dag)
    }

    /// True if `dag` contains every mandatory edge and no forbidden edge.
    pub fn is_satisfied_by(&self, dag: &Dag) -> bool {
        self.mandatory().all(|(f, t)| dag.has_edge(f, t))
            && self.forbidden().all(|(f, t)| !dag.has_edge(f, t))
    }
}

fn index_of(variables: &[String], name: &str) -> Result<usize, GraphError> {
    variables
        .iter()
        .position(|v| v == name)
        .ok_or_else(|| GraphError::UnknownVariable(name.to_string()))
}
