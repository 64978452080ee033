// network/search.rs

//! # Constrained Hill-Climbing Structure Search
//!
//! Starting from the empty graph plus all mandatory edges, each step scans
//! every legal single-edge move (add, remove, reverse), evaluates its change
//! in BIC cost using only the local terms of the affected nodes, and applies
//! the move with the largest cost decrease. The search stops at a local
//! optimum or after an optional iteration cap.
//!
//! Candidates are visited in a fixed order: pairs `(from, to)` in row-major
//! node order, and within a pair add, then remove, then reverse. A candidate
//! replaces the incumbent only if its delta is strictly smaller, so ties go to
//! the earliest candidate and repeated runs produce the same graph.

use crate::graph::{Dag, EdgeConstraints, GraphError};
use crate::regression::FitError;
use crate::score::BicScore;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// A move must lower the cost by more than this to be applied.
const IMPROVEMENT_TOLERANCE: f64 = 1e-10;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Structural conflict: {0}")]
    Graph(#[from] GraphError),
    #[error("Local regression failed during scoring: {0}")]
    Fit(#[from] FitError),
    #[error("The training table has {found} columns but {expected} variables were named.")]
    VariableCountMismatch { expected: usize, found: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Remove,
    Reverse,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::Add => "add",
            Operation::Remove => "remove",
            Operation::Reverse => "reverse",
        };
        f.write_str(label)
    }
}

/// One evaluated single-edge move. `from -> to` is the edge as it exists
/// before the move (for `Add`, the edge to be inserted).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Move {
    pub operation: Operation,
    pub from: usize,
    pub to: usize,
    /// Change in total cost; negative is an improvement.
    pub delta: f64,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub dag: Dag,
    pub cost: f64,
    pub initial_cost: f64,
    pub moves: Vec<Move>,
    pub candidates_evaluated: usize,
    /// False only when the iteration cap stopped the search early.
    pub converged: bool,
}

/// Hill climbing over DAGs under edge constraints.
pub struct HillClimber<'s, 'd> {
    score: &'s BicScore<'d>,
    constraints: &'s EdgeConstraints,
    variables: &'s [String],
    max_iterations: Option<usize>,
}

impl<'s, 'd> HillClimber<'s, 'd> {
    pub fn new(
        score: &'s BicScore<'d>,
        constraints: &'s EdgeConstraints,
        variables: &'s [String],
    ) -> Self {
        Self {
            score,
            constraints,
            variables,
            max_iterations: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: Option<usize>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn run(&self) -> Result<SearchOutcome, SearchError> {
        let n = self.variables.len();
        if self.score.n_variables() != n {
            return Err(SearchError::VariableCountMismatch {
                expected: n,
                found: self.score.n_variables(),
            });
        }

        let mut dag = self.constraints.initial_dag(n, self.variables)?;
        let mut local = self.score.local_costs(&dag)?;
        let initial_cost: f64 = local.iter().sum();
        let mut cost = initial_cost;
        let mut moves = Vec::new();
        let mut candidates_evaluated = 0;
        let mut converged = true;

        log::info!(
            "Starting hill climbing over {} variables from {} mandatory edges (cost {:.4}).",
            n,
            dag.n_edges(),
            initial_cost
        );

        loop {
            if self.max_iterations.is_some_and(|max| moves.len() >= max) {
                log::warn!(
                    "Hill climbing stopped after the iteration cap of {} moves.",
                    moves.len()
                );
                converged = false;
                break;
            }

            let (best, evaluated) = self.best_move(&dag, &local)?;
            candidates_evaluated += evaluated;

            if evaluated == 0 && moves.is_empty() {
                log::warn!("No legal single-edge moves exist from the constrained initial graph.");
            }

            let Some(best) = best.filter(|m| m.delta < -IMPROVEMENT_TOLERANCE) else {
                break;
            };

            self.apply(&mut dag, &mut local, &best)?;
            cost += best.delta;
            log::debug!(
                "Step {}: {} {} -> {} (delta {:.6}, cost {:.6})",
                moves.len() + 1,
                best.operation,
                self.variables[best.from],
                self.variables[best.to],
                best.delta,
                cost
            );
            moves.push(best);
        }

        log::info!(
            "Hill climbing finished after {} moves with {} edges (cost {:.4}, {} local fits).",
            moves.len(),
            dag.n_edges(),
            cost,
            self.score.fits_performed()
        );

        Ok(SearchOutcome {
            dag,
            cost,
            initial_cost,
            moves,
            candidates_evaluated,
            converged,
        })
    }

    /// Scans every legal move and returns the one with the smallest delta,
    /// together with the number of legal candidates evaluated.
    fn best_move(&self, dag: &Dag, local: &[f64]) -> Result<(Option<Move>, usize), SearchError> {
        let n = dag.n_nodes();
        let mut best: Option<Move> = None;
        let mut evaluated = 0;

        let mut consider = |candidate: Move| {
            evaluated += 1;
            if best.is_none_or(|b| candidate.delta < b.delta) {
                best = Some(candidate);
            }
        };

        for from in 0..n {
            for to in 0..n {
                if from == to {
                    continue;
                }
                if dag.has_edge(from, to) {
                    if self.constraints.is_mandatory(from, to) {
                        continue;
                    }
                    let without = with_parent_removed(dag.parents(to), from);
                    let removal = self.score.local_cost(to, &without)? - local[to];
                    consider(Move {
                        operation: Operation::Remove,
                        from,
                        to,
                        delta: removal,
                    });

                    if !self.constraints.is_forbidden(to, from) && !dag.reversal_creates_cycle(from, to)
                    {
                        let with = with_parent_added(dag.parents(from), to);
                        let gain = self.score.local_cost(from, &with)? - local[from];
                        consider(Move {
                            operation: Operation::Reverse,
                            from,
                            to,
                            delta: removal + gain,
                        });
                    }
                } else if !self.constraints.is_forbidden(from, to)
                    && !dag.addition_creates_cycle(from, to)
                {
                    let with = with_parent_added(dag.parents(to), from);
                    let delta = self.score.local_cost(to, &with)? - local[to];
                    consider(Move {
                        operation: Operation::Add,
                        from,
                        to,
                        delta,
                    });
                }
            }
        }

        Ok((best, evaluated))
    }

    fn apply(&self, dag: &mut Dag, local: &mut [f64], m: &Move) -> Result<(), SearchError> {
        match m.operation {
            Operation::Add => dag.add_edge(m.from, m.to)?,
            Operation::Remove => dag.remove_edge(m.from, m.to)?,
            Operation::Reverse => dag.reverse_edge(m.from, m.to)?,
        }
        local[m.to] = self.score.local_cost(m.to, dag.parents(m.to))?;
        if m.operation == Operation::Reverse {
            local[m.from] = self.score.local_cost(m.from, dag.parents(m.from))?;
        }
        Ok(())
    }
}

fn with_parent_added(parents: &BTreeSet<usize>, parent: usize) -> BTreeSet<usize> {
    let mut next = parents.clone();
    next.insert(parent);
    next
}

fn with_parent_removed(parents: &BTreeSet<usize>, parent: usize) -> BTreeSet<usize> {
    let mut next = parents.clone();
    next.remove(&parent);
    next
}
