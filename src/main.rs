use anyhow::Result;
use clap::{Parser, ValueEnum};
use fuzzy_join::loader::{load_dataset, write_csv};
use fuzzy_join::{FuzzyJoin, JoinMode, JoinSpec, StringScorer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Fuzzy,
    Exact,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScorerArg {
    WeightedRatio,
    JaroWinkler,
}

#[derive(Parser)]
#[command(name = "fuzzy-join")]
#[command(about = "Join two datasets on approximately matching columns")]
struct Args {
    /// Directory of the left dataset (contains datasetDoc.json)
    #[arg(long)]
    left: PathBuf,

    /// Directory of the right dataset (contains datasetDoc.json)
    #[arg(long)]
    right: PathBuf,

    /// JSON join spec; flags below override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Join column of the left table
    #[arg(long)]
    left_col: Option<String>,

    /// Join column of the right table
    #[arg(long)]
    right_col: Option<String>,

    /// Match strictness in (0, 1]
    #[arg(short, long)]
    accuracy: Option<f64>,

    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    #[arg(long, value_enum)]
    scorer: Option<ScorerArg>,

    /// Write the joined resource here as CSV instead of printing it
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn build_spec(args: &Args) -> Result<JoinSpec> {
    let mut spec = match &args.config {
        Some(path) => JoinSpec::from_json_file(path)?,
        None => JoinSpec::new(
            args.left_col.as_deref().unwrap_or_default(),
            args.right_col.as_deref().unwrap_or_default(),
            0.9,
        ),
    };
    if let Some(left_col) = &args.left_col {
        spec.left_col = left_col.clone();
    }
    if let Some(right_col) = &args.right_col {
        spec.right_col = right_col.clone();
    }
    if let Some(accuracy) = args.accuracy {
        spec.accuracy = accuracy;
    }
    if let Some(mode) = args.mode {
        spec.mode = match mode {
            ModeArg::Fuzzy => JoinMode::Fuzzy,
            ModeArg::Exact => JoinMode::Exact,
        };
    }
    if let Some(scorer) = args.scorer {
        spec.string_scorer = match scorer {
            ScorerArg::WeightedRatio => StringScorer::WeightedRatio,
            ScorerArg::JaroWinkler => StringScorer::JaroWinkler,
        };
    }
    Ok(spec)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let joiner = FuzzyJoin::new(build_spec(&args)?)?;

    info!("Loading datasets...");
    let left = load_dataset(&args.left)?;
    let right = load_dataset(&args.right)?;

    let result = joiner.produce(&left, &right)?;
    let (id, table) = result.tabular_resource(joiner.spec().left_resource.as_deref())?;

    match &args.output {
        Some(path) => {
            write_csv(table, path)?;
            info!("Wrote resource '{}' ({} rows) to {}", id, table.height(), path.display());
        }
        None => println!("{}", table.frame()),
    }

    Ok(())
}
