//! # Decomposable BIC Score
//!
//! The score of a graph is a sum of node-local terms, each depending only on
//! the node and its parent set. The search therefore only rescores the nodes
//! whose parents change, and the same `(node, parents)` pair is never fitted
//! twice: local costs are memoised.
//!
//! Sign convention: this module returns a *cost* (penalised negative
//! log-likelihood) and the search minimises it.
//!
//! ```text
//! cost(node | parents) = -loglik_ML(node | parents) + penalty * (|parents| + 2)
//! ```
//!
//! The `+ 2` counts the intercept and the residual variance.

use crate::config::BicPenalty;
use crate::graph::Dag;
use crate::regression::{FitError, fit_ols};
use ahash::AHashMap;
use ndarray::ArrayView2;
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

/// BIC cost over a fixed training table.
pub struct BicScore<'a> {
    data: ArrayView2<'a, f64>,
    penalty_per_parameter: f64,
    cache: RefCell<AHashMap<(usize, Vec<usize>), f64>>,
    fits: Cell<usize>,
}

impl<'a> BicScore<'a> {
    pub fn new(data: ArrayView2<'a, f64>, penalty: &BicPenalty) -> Self {
        Self {
            penalty_per_parameter: penalty.per_parameter(data.nrows()),
            data,
            cache: RefCell::new(AHashMap::new()),
            fits: Cell::new(0),
        }
    }

    pub fn n_variables(&self) -> usize {
        self.data.ncols()
    }

    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn penalty_per_parameter(&self) -> f64 {
        self.penalty_per_parameter
    }

    /// Number of regressions actually run, i.e. cache misses.
    pub fn fits_performed(&self) -> usize {
        self.fits.get()
    }

    /// Free parameters of one node: intercept, coefficients, variance.
    pub fn node_parameters(n_parents: usize) -> usize {
        n_parents + 2
    }

    /// Free parameters of a whole graph.
    pub fn graph_parameters(dag: &Dag) -> usize {
        (0..dag.n_nodes())
            .map(|node| Self::node_parameters(dag.parents(node).len()))
            .sum()
    }

    /// Penalised negative log-likelihood of `node` given `parents`.
    pub fn local_cost(&self, node: usize, parents: &BTreeSet<usize>) -> Result<f64, FitError> {
        let key: Vec<usize> = parents.iter().copied().collect();
        if let Some(&cost) = self.cache.borrow().get(&(node, key.clone())) {
            return Ok(cost);
        }

        let fit = fit_ols(self.data, node, &key)?;
        self.fits.set(self.fits.get() + 1);
        let cost = -fit.log_likelihood()
            + self.penalty_per_parameter * Self::node_parameters(key.len()) as f64;

        self.cache.borrow_mut().insert((node, key), cost);
        Ok(cost)
    }

    /// Local cost of every node of `dag`, indexed by node.
    pub fn local_costs(&self, dag: &Dag) -> Result<Vec<f64>, FitError> {
        (0..dag.n_nodes())
            .map(|node| self.local_cost(node, dag.parents(node)))
            .collect()
    }

    /// Full cost of `dag`, computed as the sum of its local costs.
    pub fn total_cost(&self, dag: &Dag) -> Result<f64, FitError> {
        Ok(self.local_costs(dag)?.iter().sum())
    }
}
