//! Prediction accuracy of a joint normal on held-out rows.
//!
//! Every test row is conditioned on its evidence columns; for each target
//! variable the row contributes
//!
//! ```text
//! bias = |observed - conditional mean|
//! sd   = sqrt(conditional variance)
//! SEP  = sqrt(bias^2 + sd^2)
//! ```
//!
//! and the summary is the column-wise mean over rows.

use crate::gaussian::MultivariateNormal;
use crate::inference::{Conditioner, InferenceError};
use itertools::Itertools;
use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write predictions: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error while writing predictions: {0}")]
    Io(#[from] std::io::Error),
}

/// One target variable's prediction for one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPrediction {
    pub observed: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl PointPrediction {
    pub fn bias(&self) -> f64 {
        (self.observed - self.mean).abs()
    }

    pub fn sep(&self) -> f64 {
        self.bias().hypot(self.std_dev)
    }
}

/// Averaged error measures for one target variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorSummary {
    pub variable: String,
    pub bias: f64,
    pub std_dev: f64,
    pub sep: f64,
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub label: String,
    pub targets: Vec<String>,
    /// `rows[r][k]` is the prediction of target `k` on test row `r`.
    pub rows: Vec<Vec<PointPrediction>>,
    pub summaries: Vec<ErrorSummary>,
}

/// Conditions every row of `test` on the `evidence` columns and summarises
/// the errors on the remaining columns. `test` columns follow the joint's
/// variable order.
pub fn evaluate(
    label: &str,
    joint: &MultivariateNormal,
    variables: &[String],
    test: ArrayView2<f64>,
    evidence: &[usize],
    condition_limit: f64,
) -> Result<Evaluation, InferenceError> {
    let conditioner = Conditioner::new(joint, evidence, condition_limit)?;
    let targets = conditioner.targets().to_vec();

    // Rows are independent; collect preserves row order.
    let rows = test
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|row| -> Result<Vec<PointPrediction>, InferenceError> {
            let values = row.select(Axis(0), evidence);
            let conditional = conditioner.apply(values.view())?;
            Ok(targets
                .iter()
                .enumerate()
                .map(|(k, &t)| PointPrediction {
                    observed: row[t],
                    mean: conditional.mean[k],
                    std_dev: conditional.std_dev(k),
                })
                .collect::<Vec<_>>())
        })
        .collect::<Result<Vec<_>, InferenceError>>()?;

    let n_rows = rows.len().max(1) as f64;
    let summaries = targets
        .iter()
        .enumerate()
        .map(|(k, &t)| {
            let (bias, sd, sep) = rows.iter().fold((0.0, 0.0, 0.0), |acc, row| {
                let p = row[k];
                (acc.0 + p.bias(), acc.1 + p.std_dev, acc.2 + p.sep())
            });
            ErrorSummary {
                variable: variables[t].clone(),
                bias: bias / n_rows,
                std_dev: sd / n_rows,
                sep: sep / n_rows,
            }
        })
        .collect();

    log::info!(
        "Evaluated '{}' on {} test rows with {} evidence variables.",
        label,
        rows.len(),
        evidence.len()
    );

    Ok(Evaluation {
        label: label.to_string(),
        targets: targets.iter().map(|&t| variables[t].clone()).collect(),
        rows,
        summaries,
    })
}

impl Evaluation {
    pub fn summary(&self, variable: &str) -> Option<&ErrorSummary> {
        self.summaries.iter().find(|s| s.variable == variable)
    }

    /// Writes one tab-separated line per test row with observed value,
    /// conditional mean and standard deviation for each target.
    pub fn write_predictions(&self, path: &Path) -> Result<(), ExportError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;

        let header = self
            .targets
            .iter()
            .flat_map(|t| [format!("{t}_observed"), format!("{t}_mean"), format!("{t}_sd")]);
        writer.write_record(std::iter::once("row".to_string()).chain(header))?;

        for (r, row) in self.rows.iter().enumerate() {
            let fields = row
                .iter()
                .flat_map(|p| [p.observed, p.mean, p.std_dev])
                .map(|v| format!("{v:.6}"));
            writer.write_record(std::iter::once((r + 1).to_string()).chain(fields))?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} test rows)", self.label, self.rows.len())?;
        writeln!(f, "{:<12} {:>10} {:>10} {:>10}", "variable", "bias", "stdev", "SEP")?;
        let lines = self
            .summaries
            .iter()
            .map(|s| {
                format!(
                    "{:<12} {:>10.4} {:>10.4} {:>10.4}",
                    s.variable, s.bias, s.std_dev, s.sep
                )
            })
            .join("\n");
        write!(f, "{lines}")
    }
}
