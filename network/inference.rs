// network/inference.rs

//! # Conditional Inference
//!
//! For a joint `N(mu, Sigma)` split into targets `t` and evidence `e`:
//!
//! ```text
//! mean_t|e = mu_t + Sigma_te Sigma_ee^-1 (x_e - mu_e)
//! cov_t|e  = Sigma_tt - Sigma_te Sigma_ee^-1 Sigma_et
//! ```
//!
//! Neither the gain `Sigma_te Sigma_ee^-1` nor the conditional covariance
//! depends on the observed values, so a [`Conditioner`] computes them once for
//! a fixed evidence set and then conditions any number of rows.

use crate::gaussian::{MultivariateNormal, symmetrize};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_linalg::{Eigh, UPLO};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error(
        "The evidence covariance block is singular or ill-conditioned (condition number {condition_number:.3e}, limit {limit:.3e})."
    )]
    SingularEvidence { condition_number: f64, limit: f64 },

    #[error("Evidence index {index} is out of range for a {dim}-dimensional distribution.")]
    IndexOutOfRange { index: usize, dim: usize },

    #[error("Evidence variable {0} is listed more than once.")]
    DuplicateEvidence(usize),

    #[error("Expected {expected} evidence values, found {found}.")]
    EvidenceLengthMismatch { expected: usize, found: usize },

    #[error("Evidence values must be finite (position {0}).")]
    NonFiniteEvidence(usize),

    #[error("Eigendecomposition of the evidence block failed: {0}")]
    Eigendecomposition(#[from] ndarray_linalg::error::LinalgError),
}

/// Distribution of the target variables given one evidence assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    /// Indices (into the joint) of the target variables, ascending.
    pub targets: Vec<usize>,
    pub mean: Array1<f64>,
    pub covariance: Array2<f64>,
}

impl Conditional {
    pub fn std_dev(&self, k: usize) -> f64 {
        self.covariance[[k, k]].max(0.0).sqrt()
    }
}

/// Precomputed conditioning of a joint normal on a fixed evidence set.
#[derive(Debug, Clone)]
pub struct Conditioner {
    evidence: Vec<usize>,
    targets: Vec<usize>,
    mean_t: Array1<f64>,
    mean_e: Array1<f64>,
    gain: Array2<f64>,
    covariance: Array2<f64>,
}

impl Conditioner {
    /// Prepares conditioning on the variables in `evidence`. Fails if the
    /// evidence block's condition number exceeds `condition_limit` or it has a
    /// non-positive eigenvalue.
    pub fn new(
        joint: &MultivariateNormal,
        evidence: &[usize],
        condition_limit: f64,
    ) -> Result<Self, InferenceError> {
        let dim = joint.dim();
        let mut is_evidence = vec![false; dim];
        for &index in evidence {
            if index >= dim {
                return Err(InferenceError::IndexOutOfRange { index, dim });
            }
            if is_evidence[index] {
                return Err(InferenceError::DuplicateEvidence(index));
            }
            is_evidence[index] = true;
        }
        let targets: Vec<usize> = (0..dim).filter(|&i| !is_evidence[i]).collect();

        let mean_t = joint.mean.select(Axis(0), &targets);
        let mean_e = joint.mean.select(Axis(0), evidence);
        let sigma_tt = joint
            .covariance
            .select(Axis(0), &targets)
            .select(Axis(1), &targets);

        if evidence.is_empty() {
            return Ok(Self {
                evidence: Vec::new(),
                gain: Array2::zeros((targets.len(), 0)),
                targets,
                mean_t,
                mean_e,
                covariance: sigma_tt,
            });
        }

        let sigma_te = joint
            .covariance
            .select(Axis(0), &targets)
            .select(Axis(1), evidence);
        let sigma_ee = joint
            .covariance
            .select(Axis(0), evidence)
            .select(Axis(1), evidence);

        let sigma_ee_inv = checked_inverse(&sigma_ee, condition_limit)?;
        let gain = sigma_te.dot(&sigma_ee_inv);
        let mut covariance = &sigma_tt - &gain.dot(&sigma_te.t());
        symmetrize(&mut covariance);

        Ok(Self {
            evidence: evidence.to_vec(),
            targets,
            mean_t,
            mean_e,
            gain,
            covariance,
        })
    }

    pub fn evidence(&self) -> &[usize] {
        &self.evidence
    }

    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    /// Conditions on one row of evidence values, ordered like `evidence`.
    pub fn apply(&self, values: ArrayView1<f64>) -> Result<Conditional, InferenceError> {
        if values.len() != self.evidence.len() {
            return Err(InferenceError::EvidenceLengthMismatch {
                expected: self.evidence.len(),
                found: values.len(),
            });
        }
        if let Some(position) = values.iter().position(|v| !v.is_finite()) {
            return Err(InferenceError::NonFiniteEvidence(position));
        }
        let deviation = &values - &self.mean_e;
        let mean = &self.mean_t + &self.gain.dot(&deviation);
        Ok(Conditional {
            targets: self.targets.clone(),
            mean,
            covariance: self.covariance.clone(),
        })
    }
}

/// Conditions `joint` on `evidence = values` in one call.
pub fn condition(
    joint: &MultivariateNormal,
    evidence: &[usize],
    values: ArrayView1<f64>,
    condition_limit: f64,
) -> Result<Conditional, InferenceError> {
    Conditioner::new(joint, evidence, condition_limit)?.apply(values)
}

/// Inverts a symmetric positive-definite matrix through its eigendecomposition,
/// refusing matrices whose condition number exceeds `limit`.
fn checked_inverse(m: &Array2<f64>, limit: f64) -> Result<Array2<f64>, InferenceError> {
    let (eigenvalues, eigenvectors) = m.eigh(UPLO::Lower)?;
    let max = eigenvalues.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = eigenvalues.iter().copied().fold(f64::INFINITY, f64::min);
    let condition_number = if min > 0.0 { max / min } else { f64::INFINITY };
    if !(condition_number <= limit) {
        return Err(InferenceError::SingularEvidence {
            condition_number,
            limit,
        });
    }
    log::debug!(
        "Evidence block of size {} has condition number {:.3e}.",
        m.nrows(),
        condition_number
    );
    let scaled = &eigenvectors * &eigenvalues.mapv(|ev| 1.0 / ev).insert_axis(Axis(0));
    let mut inverse = scaled.dot(&eigenvectors.t());
    symmetrize(&mut inverse);
    Ok(inverse)
}
