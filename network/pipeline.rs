// network/pipeline.rs

//! # Analysis Pipeline
//!
//! Runs the five stages strictly in sequence, each a function from explicit
//! inputs to an immutable output:
//!
//! 1. prepare: drop outliers, derive columns, split rows;
//! 2. learn structure: constrained hill climbing on the training rows;
//! 3. parameterize: local regressions composed into one joint normal;
//! 4. infer: condition responses on covariates for every test row;
//! 5. evaluate: bias, stdev and SEP for the GBN and the saturated baseline.
//!
//! Any failure halts the run; there is no partial report.

use crate::config::{AnalysisConfig, ConfigError};
use crate::data::{self, DataError, Table, TrainTestSplit};
use crate::evaluate::{Evaluation, ExportError, evaluate};
use crate::gaussian::{GaussianNetwork, MultivariateNormal};
use crate::graph::{Dag, EdgeConstraints, GraphError};
use crate::inference::InferenceError;
use crate::model::{FittedNetwork, ModelError, Prediction};
use crate::precision::{precision_matrix, threshold_adjacency, undirected_edges};
use crate::regression::FitError;
use crate::score::BicScore;
use crate::search::{HillClimber, SearchError, SearchOutcome};
use ndarray::{Array2, Axis};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Training and test matrices over the analysis variables.
#[derive(Debug, Clone)]
pub struct PreparedData {
    /// Column order of `train` and `test`: covariates, then responses.
    pub variables: Vec<String>,
    pub n_covariates: usize,
    pub split: TrainTestSplit,
    pub train: Array2<f64>,
    pub test: Array2<f64>,
}

impl PreparedData {
    /// Column indices of the covariates, which serve as evidence.
    pub fn covariate_indices(&self) -> Vec<usize> {
        (0..self.n_covariates).collect()
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub variables: Vec<String>,
    pub search: SearchOutcome,
    pub empty_graph_cost: f64,
    pub penalty_per_parameter: f64,
    pub fitted: FittedNetwork,
    pub baseline: Evaluation,
    pub gbn: Evaluation,
    pub precision_threshold: f64,
    pub precision_edges: Vec<(String, String)>,
    pub example_evidence: BTreeMap<String, f64>,
    pub example: Prediction,
    pub n_train: usize,
    pub n_test: usize,
}

/// Raw-table columns the analysis reads: every variable that is not derived,
/// plus the source of every derived column.
pub fn required_columns(config: &AnalysisConfig) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    let derived_names: Vec<&String> = config.derived.iter().map(|d| &d.name).collect();
    let wanted = config
        .variables()
        .into_iter()
        .filter(|v| !derived_names.contains(&v))
        .chain(config.derived.iter().map(|d| d.source.clone()));
    for name in wanted {
        if !columns.contains(&name) {
            columns.push(name);
        }
    }
    columns
}

pub fn load_raw(path: &str, config: &AnalysisConfig) -> Result<Table, PipelineError> {
    config.validate()?;
    Ok(data::load_table(
        path,
        config.separator as u8,
        &required_columns(config),
    )?)
}

/// Stage 1. Cleans the raw table and splits it into training and test rows.
pub fn prepare_data(raw: &Table, config: &AnalysisConfig) -> Result<PreparedData, PipelineError> {
    config.validate()?;
    let prepared = data::prepare(raw, &config.outlier_rows, &config.derived)?;
    let variables = config.variables();
    let table = prepared.select_columns(&variables)?;

    let split = data::split_indices(table.nrows(), config.split_proportion, config.seed)?;
    // A node with every other variable as parent needs more rows than variables.
    let required = variables.len() + 1;
    if split.train.len() < required {
        return Err(DataError::InsufficientRows {
            found: split.train.len(),
            required,
        }
        .into());
    }

    let values = table.values();
    let train = values.select(Axis(0), &split.train);
    let test = values.select(Axis(0), &split.test);
    log::info!(
        "Split {} rows into {} training and {} test rows (seed {}).",
        table.nrows(),
        train.nrows(),
        test.nrows(),
        config.seed
    );

    Ok(PreparedData {
        variables,
        n_covariates: config.covariates.len(),
        split,
        train,
        test,
    })
}

/// Stage 2. Constrained hill climbing on the training rows.
pub fn learn_structure(
    prepared: &PreparedData,
    config: &AnalysisConfig,
) -> Result<(SearchOutcome, f64, f64), PipelineError> {
    let constraints = EdgeConstraints::from_names(
        &prepared.variables,
        &config.mandatory_edges,
        &config.effective_forbidden_edges(),
    )?;
    let score = BicScore::new(prepared.train.view(), &config.penalty);
    let outcome = HillClimber::new(&score, &constraints, &prepared.variables)
        .with_max_iterations(config.max_search_iterations)
        .run()?;
    let empty_cost = score.total_cost(&Dag::empty(prepared.variables.len()))?;
    Ok((outcome, empty_cost, score.penalty_per_parameter()))
}

/// Stage 3. Local regressions on the learned graph, composed into a joint.
pub fn parameterize(
    prepared: &PreparedData,
    dag: &Dag,
) -> Result<(GaussianNetwork, MultivariateNormal), PipelineError> {
    let network = GaussianNetwork::fit(dag, prepared.train.view())?;
    let joint = network.joint()?;
    Ok((network, joint))
}

/// Stages 2 to 5 on an already loaded raw table.
pub fn run_analysis(raw: &Table, config: &AnalysisConfig) -> Result<AnalysisReport, PipelineError> {
    let prepared = prepare_data(raw, config)?;
    let (search, empty_graph_cost, penalty_per_parameter) = learn_structure(&prepared, config)?;
    let (network, joint) = parameterize(&prepared, &search.dag)?;
    let fitted = FittedNetwork::new(&prepared.variables, &network, &joint);

    let evidence = prepared.covariate_indices();
    let saturated = MultivariateNormal::from_sample(prepared.train.view())?;
    let baseline = evaluate(
        "Saturated baseline",
        &saturated,
        &prepared.variables,
        prepared.test.view(),
        &evidence,
        config.condition_limit,
    )?;
    let gbn = evaluate(
        "Gaussian Bayesian network",
        &joint,
        &prepared.variables,
        prepared.test.view(),
        &evidence,
        config.condition_limit,
    )?;

    let precision = precision_matrix(&saturated.covariance)?;
    let adjacency = threshold_adjacency(&precision, config.precision_threshold);
    let precision_edges = undirected_edges(&adjacency)
        .into_iter()
        .map(|(i, j)| (prepared.variables[i].clone(), prepared.variables[j].clone()))
        .collect();

    let example_evidence = match &config.example_evidence {
        Some(given) => given.clone(),
        None => evidence
            .iter()
            .map(|&i| (prepared.variables[i].clone(), prepared.test[[0, i]]))
            .collect(),
    };
    let example = fitted.predict(&example_evidence, config.condition_limit)?;

    Ok(AnalysisReport {
        variables: prepared.variables.clone(),
        search,
        empty_graph_cost,
        penalty_per_parameter,
        fitted,
        baseline,
        gbn,
        precision_threshold: config.precision_threshold,
        precision_edges,
        example_evidence,
        example,
        n_train: prepared.train.nrows(),
        n_test: prepared.test.nrows(),
    })
}

/// Loads `path` and runs the full analysis.
pub fn run(path: &str, config: &AnalysisConfig) -> Result<AnalysisReport, PipelineError> {
    let raw = load_raw(path, config)?;
    run_analysis(&raw, config)
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Training rows: {}, test rows: {}",
            self.n_train, self.n_test
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "Learned structure ({} edges, {} moves):",
            self.search.dag.n_edges(),
            self.search.moves.len()
        )?;
        writeln!(f, "{}", self.search.dag.format_edges(&self.variables))?;
        writeln!(
            f,
            "BIC cost: learned {:.4}, empty graph {:.4} (penalty per parameter {:.4})",
            self.search.cost, self.empty_graph_cost, self.penalty_per_parameter
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "Precision-matrix edges (|entry| > {}): {}",
            self.precision_threshold,
            self.precision_edges.len()
        )?;
        for (a, b) in &self.precision_edges {
            writeln!(f, "{a} -- {b}")?;
        }
        writeln!(f)?;
        writeln!(f, "{}", self.baseline)?;
        writeln!(f)?;
        writeln!(f, "{}", self.gbn)?;
        writeln!(f)?;
        let evidence = self
            .example_evidence
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "Example prediction given {evidence}:")?;
        write!(f, "{}", self.example)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DerivedColumn;

    #[test]
    fn test_required_columns_replace_derived_with_sources() {
        let config = AnalysisConfig::default();
        let columns = required_columns(&config);
        assert!(columns.contains(&"Weight".to_string()));
        assert!(columns.contains(&"Height".to_string()));
        assert!(!columns.contains(&"Wkg".to_string()));
        assert!(!columns.contains(&"Hcm".to_string()));
        assert!(columns.contains(&"BodyFat".to_string()));
        assert_eq!(columns.len(), 14);
    }

    #[test]
    fn test_too_few_training_rows_is_rejected() {
        let config = AnalysisConfig {
            covariates: vec!["x1".to_string(), "x2".to_string()],
            responses: vec!["y".to_string()],
            derived: vec![DerivedColumn::affine("x2", "raw", 2.0)],
            outlier_rows: vec![],
            ..AnalysisConfig::default()
        };
        let values = Array2::from_shape_fn((6, 3), |(i, j)| (i * 3 + j) as f64);
        let raw = Table::new(
            vec!["x1".to_string(), "raw".to_string(), "y".to_string()],
            values,
        )
        .unwrap();
        match prepare_data(&raw, &config) {
            Err(PipelineError::Data(DataError::InsufficientRows { found, .. })) => {
                assert_eq!(found, 3)
            }
            other => panic!("Expected InsufficientRows, got {:?}", other.map(|p| p.variables)),
        }
    }
}
