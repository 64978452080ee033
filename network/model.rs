use crate::gaussian::{GaussianNetwork, LocalModel, MultivariateNormal};
use crate::graph::{Dag, GraphError};
use crate::inference::{Conditional, InferenceError, condition};
use crate::regression::FitError;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

// --- Public Data Structures ---
// These structs define the public, human-readable format of a fitted network
// when serialized to a TOML file.

/// Local model of one node, keyed by variable names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeModel {
    pub name: String,
    pub parents: Vec<String>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub residual_variance: f64,
}

/// The self-contained fitted network: structure, local models and the joint
/// normal they compose into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedNetwork {
    pub variables: Vec<String>,
    pub edges: Vec<(String, String)>,
    pub nodes: Vec<NodeModel>,
    pub mean: Array1<f64>,
    pub covariance: Array2<f64>,
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Unknown variable '{0}'. The model was fitted on different columns.")]
    UnknownVariable(String),
    #[error("The stored model is inconsistent: {0}")]
    Inconsistent(String),
    #[error("Stored structure is invalid: {0}")]
    Graph(#[from] GraphError),
    #[error("Stored distribution is invalid: {0}")]
    Fit(#[from] FitError),
    #[error("Conditioning failed: {0}")]
    Inference(#[from] InferenceError),
}

/// Conditional prediction of the unobserved variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub targets: Vec<String>,
    pub mean: Array1<f64>,
    pub covariance: Array2<f64>,
}

impl Prediction {
    fn from_conditional(conditional: Conditional, variables: &[String]) -> Self {
        Self {
            targets: conditional
                .targets
                .iter()
                .map(|&t| variables[t].clone())
                .collect(),
            mean: conditional.mean,
            covariance: conditional.covariance,
        }
    }

    pub fn std_dev(&self, k: usize) -> f64 {
        self.covariance[[k, k]].max(0.0).sqrt()
    }

    /// Mean and standard deviation of one target, by name.
    pub fn get(&self, name: &str) -> Option<(f64, f64)> {
        let k = self.targets.iter().position(|t| t == name)?;
        Some((self.mean[k], self.std_dev(k)))
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<12} {:>12} {:>12}", "variable", "mean", "stdev")?;
        for (k, name) in self.targets.iter().enumerate() {
            writeln!(f, "{:<12} {:>12.4} {:>12.4}", name, self.mean[k], self.std_dev(k))?;
        }
        Ok(())
    }
}

impl FittedNetwork {
    pub fn new(
        variables: &[String],
        network: &GaussianNetwork,
        joint: &MultivariateNormal,
    ) -> Self {
        let name = |i: usize| variables[i].clone();
        let edges = network
            .dag()
            .edges()
            .into_iter()
            .map(|(f, t)| (name(f), name(t)))
            .collect();
        let nodes = network
            .locals()
            .iter()
            .enumerate()
            .map(|(i, local)| NodeModel {
                name: name(i),
                parents: local.parents.iter().map(|&p| name(p)).collect(),
                intercept: local.intercept,
                coefficients: local.coefficients.clone(),
                residual_variance: local.residual_variance,
            })
            .collect();
        Self {
            variables: variables.to_vec(),
            edges,
            nodes,
            mean: joint.mean.clone(),
            covariance: joint.covariance.clone(),
        }
    }

    pub fn index_of(&self, name: &str) -> Result<usize, ModelError> {
        self.variables
            .iter()
            .position(|v| v == name)
            .ok_or_else(|| ModelError::UnknownVariable(name.to_string()))
    }

    pub fn joint(&self) -> Result<MultivariateNormal, ModelError> {
        Ok(MultivariateNormal::new(
            self.mean.clone(),
            self.covariance.clone(),
        )?)
    }

    /// Rebuilds the graph and local models from their named form.
    pub fn network(&self) -> Result<GaussianNetwork, ModelError> {
        let edges = self
            .edges
            .iter()
            .map(|(f, t)| Ok((self.index_of(f)?, self.index_of(t)?)))
            .collect::<Result<Vec<_>, ModelError>>()?;
        let dag = Dag::from_edges(self.variables.len(), &edges)?;

        if self.nodes.len() != self.variables.len() {
            return Err(ModelError::Inconsistent(format!(
                "{} node models for {} variables",
                self.nodes.len(),
                self.variables.len()
            )));
        }
        let mut locals = Vec::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            if node.name != self.variables[i] {
                return Err(ModelError::Inconsistent(format!(
                    "node {} is named '{}' but variable {} is '{}'",
                    i, node.name, i, self.variables[i]
                )));
            }
            if node.parents.len() != node.coefficients.len() {
                return Err(ModelError::Inconsistent(format!(
                    "node '{}' has {} parents but {} coefficients",
                    node.name,
                    node.parents.len(),
                    node.coefficients.len()
                )));
            }
            // Hand-edited files may list parents in any order; keep
            // coefficients aligned while sorting by node index.
            let mut paired = node
                .parents
                .iter()
                .zip(&node.coefficients)
                .map(|(p, &b)| Ok((self.index_of(p)?, b)))
                .collect::<Result<Vec<(usize, f64)>, ModelError>>()?;
            paired.sort_by_key(|&(p, _)| p);
            locals.push(LocalModel {
                parents: paired.iter().map(|&(p, _)| p).collect(),
                intercept: node.intercept,
                coefficients: paired.iter().map(|&(_, b)| b).collect(),
                residual_variance: node.residual_variance,
            });
        }
        Ok(GaussianNetwork::from_parts(dag, locals)?)
    }

    /// Conditions the stored joint on named evidence values.
    pub fn predict(
        &self,
        evidence: &BTreeMap<String, f64>,
        condition_limit: f64,
    ) -> Result<Prediction, ModelError> {
        let mut indices = Vec::with_capacity(evidence.len());
        let mut values = Vec::with_capacity(evidence.len());
        for (name, &value) in evidence {
            indices.push(self.index_of(name)?);
            values.push(value);
        }
        let conditional = condition(
            &self.joint()?,
            &indices,
            Array1::from_vec(values).view(),
            condition_limit,
        )?;
        Ok(Prediction::from_conditional(conditional, &self.variables))
    }

    /// Saves the fitted network to a file in a human-readable TOML format.
    pub fn save(&self, path: &str) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Loads a fitted network from a TOML file.
    pub fn load(path: &str) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let model: Self = toml::from_str(&toml_string)?;
        if model.mean.len() != model.variables.len() {
            return Err(ModelError::Inconsistent(format!(
                "mean has {} entries for {} variables",
                model.mean.len(),
                model.variables.len()
            )));
        }
        Ok(model)
    }
}
