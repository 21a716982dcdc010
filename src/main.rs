use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use newsprep::{
    analysis::LabelDistribution,
    config::RunConfig,
    experiment::{run_experiment, MajorityBaseline, TracingTracker},
    export::{read_parquet, write_parquet},
    fetch,
    history::History,
    pipeline,
    preprocess::Preprocessor,
};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "newsprep",
    version,
    about = "Download, subsample and normalize the AG News dataset for text classification."
)]
struct Cli {
    /// YAML run configuration; defaults are used when omitted
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Directory for the event history
    #[arg(long, global = true, default_value = "history")]
    history_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download and unpack the dataset archive if needed
    Fetch,
    /// Fetch, subsample, preprocess and export every configured split
    Prepare,
    /// Preprocess one headerless CSV file
    Preprocess {
        input: PathBuf,
        /// Write the result as Parquet
        #[arg(long)]
        out: Option<PathBuf>,
        /// Reject labels >= N after shifting
        #[arg(long)]
        num_classes: Option<usize>,
    },
    /// Print the label distribution of a raw CSV or prepared Parquet split
    Stats { input: PathBuf },
    /// Prepare the splits and run the majority-class baseline experiment
    Baseline,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,newsprep=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();
    let start = Instant::now();

    match cli.command {
        Command::Fetch => {
            let cfg = RunConfig::load_or_default(cli.config.as_deref())?;
            let history = History::new(&cli.history_dir)?;
            fetch::ensure_dataset(&Client::new(), &cfg, &history).await?;
        }
        Command::Prepare => {
            let cfg = RunConfig::load_or_default(cli.config.as_deref())?;
            prepare_splits(&cfg, &cli.history_dir).await?;
        }
        Command::Preprocess {
            input,
            out,
            num_classes,
        } => {
            let mut preprocessor = Preprocessor::new();
            if let Some(n) = num_classes {
                preprocessor = preprocessor.with_num_classes(n);
            }
            let dataset = preprocessor.preprocess(&input)?;
            match out {
                Some(path) => write_parquet(&dataset, &path)?,
                None => {
                    for ex in dataset.iter().take(5) {
                        println!("{}\t{}", ex.label, ex.text);
                    }
                }
            }
            println!("{} rows", dataset.len());
        }
        Command::Stats { input } => {
            let dataset = load_any(&input)?;
            println!("{}", LabelDistribution::from_dataset(&dataset));
        }
        Command::Baseline => {
            let cfg = RunConfig::load_or_default(cli.config.as_deref())?;
            let splits = prepare_splits(&cfg, &cli.history_dir).await?;

            let mut model = MajorityBaseline::new();
            let mut tracker = TracingTracker::new();
            let evaluation = run_experiment(&mut model, &mut tracker, &splits, &cfg)?;
            for (name, value) in &evaluation.metrics {
                println!("{: <10} {:.4}", name, value);
            }
            println!(
                "misclassified {} of {}",
                evaluation.misclassified.len(),
                evaluation.predictions.len()
            );
        }
    }

    info!(elapsed = ?start.elapsed(), "all done");
    Ok(())
}

async fn prepare_splits(cfg: &RunConfig, history_dir: &Path) -> Result<pipeline::PreparedSplits> {
    let history = History::new(history_dir)?;
    fetch::ensure_dataset(&Client::new(), cfg, &history).await?;

    tokio::task::spawn_blocking({
        let cfg = cfg.clone();
        move || pipeline::prepare(&cfg, &history)
    })
    .await
    .context("prepare task panicked")?
}

fn load_any(path: &Path) -> Result<newsprep::Dataset> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("parquet") => read_parquet(path),
        Some("csv") => Ok(newsprep::preprocess(path)?),
        _ => bail!("expected a .csv or .parquet file, got {}", path.display()),
    }
}
