//! Ordinary least squares for one node on its parents.
//!
//! Columns are centred before solving the normal equations so the intercept
//! drops out of the linear system; it is recovered afterwards from the means.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use ndarray_linalg::Solve;
use std::f64::consts::PI;
use thiserror::Error;

/// The smallest residual variance fed into a log-likelihood.
const VARIANCE_FLOOR: f64 = 1e-300;

#[derive(Error, Debug)]
pub enum FitError {
    #[error(
        "Regression for column {target} with {n_parents} parents needs more than {required} rows, found {found}."
    )]
    Underdetermined {
        target: usize,
        n_parents: usize,
        required: usize,
        found: usize,
    },

    #[error("Column index {index} is out of range for a table with {n_columns} columns.")]
    ColumnOutOfRange { index: usize, n_columns: usize },

    #[error("The normal equations for column {target} could not be solved: {source}")]
    Singular {
        target: usize,
        #[source]
        source: ndarray_linalg::error::LinalgError,
    },

    #[error("Eigendecomposition failed: {0}")]
    Eigendecomposition(ndarray_linalg::error::LinalgError),

    #[error("Matrix inversion failed: {0}")]
    Inversion(ndarray_linalg::error::LinalgError),

    #[error("Structural error while fitting: {0}")]
    Graph(#[from] crate::graph::GraphError),

    #[error("Expected a {expected}x{expected} matrix, found {rows}x{cols}.")]
    ShapeMismatch {
        expected: usize,
        rows: usize,
        cols: usize,
    },
}

/// Least-squares fit of one column on a set of other columns.
#[derive(Debug, Clone)]
pub struct LinearFit {
    pub intercept: f64,
    pub coefficients: Array1<f64>,
    /// Residual sum of squares.
    pub rss: f64,
    pub n_samples: usize,
}

impl LinearFit {
    pub fn n_parents(&self) -> usize {
        self.coefficients.len()
    }

    /// Maximum-likelihood residual variance, `RSS / n`.
    pub fn ml_variance(&self) -> f64 {
        self.rss / self.n_samples as f64
    }

    /// Unbiased residual variance, `RSS / (n - p - 1)`.
    pub fn unbiased_variance(&self) -> f64 {
        let dof = self.n_samples - self.n_parents() - 1;
        self.rss / dof as f64
    }

    /// Gaussian log-likelihood at the ML estimates:
    /// `-n/2 * (ln(2 pi sigma^2) + 1)`.
    pub fn log_likelihood(&self) -> f64 {
        let n = self.n_samples as f64;
        let variance = self.ml_variance().max(VARIANCE_FLOOR);
        -0.5 * n * ((2.0 * PI * variance).ln() + 1.0)
    }
}

/// Regresses column `target` of `data` on the columns in `parents` with an
/// intercept. Requires strictly more rows than estimated mean parameters so
/// that the unbiased variance is defined.
pub fn fit_ols(
    data: ArrayView2<f64>,
    target: usize,
    parents: &[usize],
) -> Result<LinearFit, FitError> {
    let (n, n_columns) = data.dim();
    for &index in parents.iter().chain(std::iter::once(&target)) {
        if index >= n_columns {
            return Err(FitError::ColumnOutOfRange { index, n_columns });
        }
    }
    let required = parents.len() + 1;
    if n <= required {
        return Err(FitError::Underdetermined {
            target,
            n_parents: parents.len(),
            required,
            found: n,
        });
    }

    let y = data.column(target);
    let y_mean = y.mean().unwrap_or(0.0);
    let y_centered = y.mapv(|v| v - y_mean);

    if parents.is_empty() {
        let rss = y_centered.dot(&y_centered);
        return Ok(LinearFit {
            intercept: y_mean,
            coefficients: Array1::zeros(0),
            rss,
            n_samples: n,
        });
    }

    let x: Array2<f64> = data.select(Axis(1), parents);
    let x_means = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(parents.len()));
    let x_centered = &x - &x_means.view().insert_axis(Axis(0));

    let xtx = x_centered.t().dot(&x_centered);
    let xty = x_centered.t().dot(&y_centered);
    let beta = xtx
        .solve_into(xty)
        .map_err(|source| FitError::Singular { target, source })?;

    let residuals = &y_centered - &x_centered.dot(&beta);
    let rss = residuals.dot(&residuals);
    let intercept = y_mean - x_means.dot(&beta);

    Ok(LinearFit {
        intercept,
        coefficients: beta,
        rss,
        n_samples: n,
    })
}
