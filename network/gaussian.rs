// network/gaussian.rs

//! # Gaussian Network Parameterization
//!
//! Each node carries a linear-Gaussian local model
//!
//! ```text
//! X_i = a_i + sum_j b_ij X_j + sigma_i * E_i,   E_i ~ N(0, 1) independent
//! ```
//!
//! Visiting nodes in topological order, every variable is rewritten as
//! `mu_i + L_i . E`, where `L_i` is a row of loadings on the independent noise
//! terms. Once all rows are resolved the joint law is `N(mu, L L^T)`.

use crate::graph::Dag;
use crate::regression::{FitError, fit_ols};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Local linear-Gaussian model of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalModel {
    /// Parent node indices, ascending.
    pub parents: Vec<usize>,
    pub intercept: f64,
    /// One coefficient per entry of `parents`.
    pub coefficients: Vec<f64>,
    pub residual_variance: f64,
}

/// A DAG with one fitted local model per node.
#[derive(Debug, Clone)]
pub struct GaussianNetwork {
    dag: Dag,
    locals: Vec<LocalModel>,
}

impl GaussianNetwork {
    /// Fits every node's local regression on its parents. Residual variances
    /// use the unbiased `RSS / (n - p - 1)` estimator.
    pub fn fit(dag: &Dag, data: ArrayView2<f64>) -> Result<Self, FitError> {
        if data.ncols() != dag.n_nodes() {
            return Err(FitError::ShapeMismatch {
                expected: dag.n_nodes(),
                rows: data.nrows(),
                cols: data.ncols(),
            });
        }
        let mut locals = Vec::with_capacity(dag.n_nodes());
        for node in 0..dag.n_nodes() {
            let parents: Vec<usize> = dag.parents(node).iter().copied().collect();
            let fit = fit_ols(data, node, &parents)?;
            locals.push(LocalModel {
                parents,
                intercept: fit.intercept,
                coefficients: fit.coefficients.to_vec(),
                residual_variance: fit.unbiased_variance(),
            });
        }
        log::info!(
            "Fitted {} local regressions over {} rows.",
            locals.len(),
            data.nrows()
        );
        Ok(Self {
            dag: dag.clone(),
            locals,
        })
    }

    /// Assembles a network from already-estimated local models. Parent lists
    /// must match the graph.
    pub fn from_parts(dag: Dag, locals: Vec<LocalModel>) -> Result<Self, FitError> {
        if locals.len() != dag.n_nodes() {
            return Err(FitError::ShapeMismatch {
                expected: dag.n_nodes(),
                rows: locals.len(),
                cols: dag.n_nodes(),
            });
        }
        for (node, local) in locals.iter().enumerate() {
            let expected: Vec<usize> = dag.parents(node).iter().copied().collect();
            if local.parents != expected || local.coefficients.len() != expected.len() {
                return Err(FitError::ShapeMismatch {
                    expected: expected.len(),
                    rows: local.parents.len(),
                    cols: local.coefficients.len(),
                });
            }
        }
        Ok(Self { dag, locals })
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    pub fn locals(&self) -> &[LocalModel] {
        &self.locals
    }

    /// The mean vector and noise loading matrix `L`, so that the variables
    /// equal `mu + L E` for independent standard normal `E`.
    pub fn loading_form(&self) -> Result<(Array1<f64>, Array2<f64>), FitError> {
        let n = self.dag.n_nodes();
        let order = self.dag.topological_order()?;
        let mut mean = Array1::<f64>::zeros(n);
        let mut loadings = Array2::<f64>::zeros((n, n));

        for node in order {
            let local = &self.locals[node];
            let mut row = Array1::<f64>::zeros(n);
            let mut mu = local.intercept;
            for (&parent, &b) in local.parents.iter().zip(&local.coefficients) {
                mu += b * mean[parent];
                row.scaled_add(b, &loadings.row(parent));
            }
            row[node] += local.residual_variance.max(0.0).sqrt();
            mean[node] = mu;
            loadings.row_mut(node).assign(&row);
        }
        Ok((mean, loadings))
    }

    /// The joint distribution `N(mu, L L^T)`.
    pub fn joint(&self) -> Result<MultivariateNormal, FitError> {
        let (mean, loadings) = self.loading_form()?;
        let covariance = loadings.dot(&loadings.t());
        MultivariateNormal::new(mean, covariance)
    }
}

/// A multivariate normal distribution in moment form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultivariateNormal {
    pub mean: Array1<f64>,
    pub covariance: Array2<f64>,
}

impl MultivariateNormal {
    /// Validates shapes and forces exact symmetry of the covariance.
    pub fn new(mean: Array1<f64>, mut covariance: Array2<f64>) -> Result<Self, FitError> {
        let n = mean.len();
        if covariance.dim() != (n, n) {
            return Err(FitError::ShapeMismatch {
                expected: n,
                rows: covariance.nrows(),
                cols: covariance.ncols(),
            });
        }
        symmetrize(&mut covariance);
        Ok(Self { mean, covariance })
    }

    /// The saturated model: sample mean and unbiased sample covariance.
    pub fn from_sample(data: ArrayView2<f64>) -> Result<Self, FitError> {
        let (n, p) = data.dim();
        if n < 2 {
            return Err(FitError::Underdetermined {
                target: 0,
                n_parents: p.saturating_sub(1),
                required: 1,
                found: n,
            });
        }
        let mean = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(p));
        let centered = &data - &mean.view().insert_axis(Axis(0));
        let covariance = centered.t().dot(&centered) / (n as f64 - 1.0);
        Self::new(mean, covariance)
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn variance(&self, i: usize) -> f64 {
        self.covariance[[i, i]]
    }

    pub fn std_dev(&self, i: usize) -> f64 {
        self.variance(i).max(0.0).sqrt()
    }
}

/// Replaces `m` with `(m + m^T) / 2`.
pub fn symmetrize(m: &mut Array2<f64>) {
    let n = m.nrows().min(m.ncols());
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (m[[i, j]] + m[[j, i]]);
            m[[i, j]] = avg;
            m[[j, i]] = avg;
        }
    }
}
