#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;

use gbnet::config::AnalysisConfig;
use gbnet::model::FittedNetwork;
use gbnet::pipeline;

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Path to the delimited data file with a header row
    #[arg(value_name = "DATA")]
    pub data: String,

    /// TOML file overriding the default analysis configuration
    #[arg(long, value_name = "FILE")]
    pub config: Option<String>,

    /// Proportion of rows used for training (0 < P < 1)
    #[arg(long, value_name = "P")]
    pub split: Option<f64>,

    /// Seed of the train/test shuffle
    #[arg(long, value_name = "S")]
    pub seed: Option<u64>,

    /// Constant added to the BIC penalty of every free parameter
    #[arg(long, value_name = "K")]
    pub penalty_offset: Option<f64>,

    /// Magnitude above which a precision-matrix entry counts as an edge
    #[arg(long, value_name = "T")]
    pub threshold: Option<f64>,

    /// Where to save the fitted network
    #[arg(long, value_name = "FILE")]
    pub model_out: Option<String>,

    /// Where to write per-row test predictions of the network
    #[arg(long, value_name = "FILE")]
    pub predictions_out: Option<PathBuf>,
}

#[derive(Args)]
pub struct PredictArgs {
    /// Fitted network written by `analyze --model-out`
    #[arg(long, value_name = "FILE")]
    pub model: String,

    /// Observed value of one variable; repeat for more evidence
    #[arg(long, value_name = "NAME=VALUE", value_parser = parse_evidence)]
    pub evidence: Vec<(String, f64)>,

    /// Largest acceptable condition number of the evidence covariance block
    #[arg(long, value_name = "LIMIT", default_value_t = 1e12)]
    pub condition_limit: f64,
}

#[derive(Parser)]
#[command(
    name = "gbnet",
    about = "Gaussian Bayesian network learning and conditional prediction",
    long_about = "Learns a Gaussian Bayesian network from tabular data by constrained BIC \
                 hill climbing, then predicts response variables from covariates and \
                 compares the network against the saturated multivariate normal."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Learn, fit and evaluate a network on a data file
    #[command(about = "Run the full analysis (optionally outputs: model.toml, predictions.tsv)")]
    Analyze(AnalyzeArgs),

    /// Condition a saved network on observed values
    #[command(about = "Predict unobserved variables from a saved network")]
    Predict(PredictArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Analyze(args)) => analyze(args),
        Some(Commands::Predict(args)) => predict(args),
        None => Cli::command()
            .print_help()
            .map(|_| println!())
            .map_err(|e| e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn parse_evidence(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{raw}'"));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value in '{raw}': {e}"))?;
    if !value.is_finite() {
        return Err(format!("value in '{raw}' is not finite"));
    }
    Ok((name.to_string(), value))
}

fn analyze(args: AnalyzeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(split) = args.split {
        config.split_proportion = split;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(offset) = args.penalty_offset {
        config.penalty.offset = offset;
    }
    if let Some(threshold) = args.threshold {
        config.precision_threshold = threshold;
    }
    config.validate()?;

    let report = pipeline::run(&args.data, &config)?;
    println!("{report}");

    if let Some(path) = &args.model_out {
        report.fitted.save(path)?;
        log::info!("Fitted network saved to '{path}'.");
    }
    if let Some(path) = &args.predictions_out {
        report.gbn.write_predictions(path)?;
        log::info!("Test-set predictions written to '{}'.", path.display());
    }
    Ok(())
}

fn predict(args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let model = FittedNetwork::load(&args.model)?;
    let mut evidence = BTreeMap::new();
    for (name, value) in args.evidence {
        if evidence.insert(name.clone(), value).is_some() {
            return Err(format!("evidence for '{name}' is given more than once").into());
        }
    }
    let prediction = model.predict(&evidence, args.condition_limit)?;
    print!("{prediction}");
    Ok(())
}
