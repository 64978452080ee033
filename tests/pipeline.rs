mod common;

use gbnet::config::AnalysisConfig;
use gbnet::data::DataError;
use gbnet::model::FittedNetwork;
use gbnet::pipeline::{self, PipelineError};
use tempfile::tempdir;

fn analysis_on_synthetic_data(config: &AnalysisConfig) -> pipeline::AnalysisReport {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("bodyfat.csv");
    common::write_body_csv(&path, 7);
    pipeline::run(path.to_str().expect("path str"), config).expect("analysis succeeds")
}

#[test]
fn default_analysis_splits_and_respects_constraints() {
    let config = AnalysisConfig::default();
    let report = analysis_on_synthetic_data(&config);

    // 252 rows minus two outliers, 60% for training.
    assert_eq!(report.n_train, 150);
    assert_eq!(report.n_test, 100);
    assert_eq!(report.variables.len(), 14);

    for (from, to) in &report.fitted.edges {
        let from_response = config.responses.contains(from);
        let to_covariate = config.covariates.contains(to);
        assert!(
            !(from_response && to_covariate),
            "response {from} must not be a parent of covariate {to}"
        );
    }
    assert!(report.search.cost <= report.empty_graph_cost);
    assert!(report.search.converged);

    for evaluation in [&report.gbn, &report.baseline] {
        assert_eq!(
            evaluation.targets,
            vec!["BodyFat".to_string(), "Density".to_string()]
        );
        assert_eq!(evaluation.rows.len(), 100);
        for summary in &evaluation.summaries {
            assert!(summary.bias.is_finite() && summary.bias >= 0.0);
            assert!(summary.std_dev.is_finite() && summary.std_dev > 0.0);
            assert!(summary.sep >= summary.bias && summary.sep >= summary.std_dev);
        }
    }

    // Covariates explain most of the body fat variation.
    let body_fat: Vec<f64> = report
        .gbn
        .rows
        .iter()
        .map(|row| row[0].observed)
        .collect();
    let mean = body_fat.iter().sum::<f64>() / body_fat.len() as f64;
    let marginal_sd = (body_fat.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        / (body_fat.len() - 1) as f64)
        .sqrt();
    let sep = report.gbn.summary("BodyFat").expect("BodyFat summary").sep;
    assert!(sep < marginal_sd, "SEP {sep} vs marginal sd {marginal_sd}");

    let text = report.to_string();
    assert!(text.contains("Learned structure"));
    assert!(text.contains("Saturated baseline"));
    assert!(text.contains("Example prediction"));
}

#[test]
fn analysis_is_reproducible_for_a_fixed_seed() {
    let config = AnalysisConfig::default();
    let first = analysis_on_synthetic_data(&config);
    let second = analysis_on_synthetic_data(&config);
    assert_eq!(first.fitted.edges, second.fitted.edges);
    assert_eq!(first.gbn.summaries, second.gbn.summaries);
    assert_eq!(first.precision_edges, second.precision_edges);
}

#[test]
fn mandatory_and_forbidden_edges_are_honoured() {
    let config = AnalysisConfig {
        mandatory_edges: vec![("Ankle".to_string(), "BodyFat".to_string())],
        forbidden_edges: vec![("Abdomen".to_string(), "BodyFat".to_string())],
        ..AnalysisConfig::default()
    };
    let report = analysis_on_synthetic_data(&config);
    let edges = &report.fitted.edges;
    assert!(edges.contains(&("Ankle".to_string(), "BodyFat".to_string())));
    assert!(!edges.contains(&("Abdomen".to_string(), "BodyFat".to_string())));
}

#[test]
fn saved_model_reproduces_the_example_prediction() {
    let report = analysis_on_synthetic_data(&AnalysisConfig::default());
    let dir = tempdir().expect("temporary directory");
    let model_path = dir.path().join("model.toml");
    let model_path = model_path.to_str().expect("path str");
    report.fitted.save(model_path).expect("save model");

    let loaded = FittedNetwork::load(model_path).expect("load model");
    assert_eq!(loaded.edges, report.fitted.edges);
    let prediction = loaded
        .predict(&report.example_evidence, 1e12)
        .expect("prediction");
    assert_eq!(prediction.targets, report.example.targets);
    for k in 0..prediction.targets.len() {
        let scale = report.example.mean[k].abs().max(1.0);
        assert!((prediction.mean[k] - report.example.mean[k]).abs() < 1e-9 * scale);
    }

    // The stored local models compose into the stored joint.
    let rebuilt = loaded.network().expect("rebuild").joint().expect("joint");
    for (a, b) in rebuilt.covariance.iter().zip(loaded.covariance.iter()) {
        assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0));
    }
}

#[test]
fn predictions_file_has_one_line_per_test_row() {
    let report = analysis_on_synthetic_data(&AnalysisConfig::default());
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("predictions.tsv");
    report.gbn.write_predictions(&path).expect("write predictions");
    let text = std::fs::read_to_string(&path).expect("read predictions");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 101);
    assert!(lines[0].starts_with("row\tBodyFat_observed\tBodyFat_mean\tBodyFat_sd"));
}

#[test]
fn missing_column_is_reported() {
    let config = AnalysisConfig {
        covariates: vec!["Abdomen".to_string(), "Waist".to_string()],
        derived: vec![],
        ..AnalysisConfig::default()
    };
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("bodyfat.csv");
    common::write_body_csv(&path, 7);
    match pipeline::run(path.to_str().expect("path str"), &config) {
        Err(PipelineError::Data(DataError::ColumnNotFound(name))) => assert_eq!(name, "Waist"),
        other => panic!("expected ColumnNotFound, got {:?}", other.map(|r| r.variables)),
    }
}

#[test]
fn shipped_config_matches_the_defaults() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/bodyfat.toml");
    let config = AnalysisConfig::load(path).expect("shipped config loads");
    let evidence = config.example_evidence.clone().expect("example evidence");
    assert_eq!(evidence.len(), config.covariates.len());
    assert_eq!(
        AnalysisConfig {
            example_evidence: None,
            ..config
        },
        AnalysisConfig::default()
    );

    let report = analysis_on_synthetic_data(&AnalysisConfig {
        example_evidence: Some(evidence.clone()),
        ..AnalysisConfig::default()
    });
    assert_eq!(report.example_evidence, evidence);
    assert_eq!(
        report.example.targets,
        vec!["BodyFat".to_string(), "Density".to_string()]
    );
}
