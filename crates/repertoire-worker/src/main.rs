//! Repertoire analysis worker
//!
//! Reads a JSON array of game rows, runs one analysis pass and writes the
//! snapshot as JSON (stdout unless `--output` is given).

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use chess_core::RawGameRow;
use repertoire_worker::{AnalysisConfig, AnalysisPass};
use tracing::info;

const USAGE: &str = "usage: repertoire-worker <records.json> [--output path] [--k N] [--seed N]";

#[derive(Debug, Default)]
struct CliArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    k: Option<usize>,
    seed: Option<u64>,
}

fn parse_args(args: &[String]) -> anyhow::Result<CliArgs> {
    let mut input = None;
    let mut cli = CliArgs::default();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--output" | "-o" => {
                let value = iter.next().context("--output needs a path")?;
                cli.output = Some(PathBuf::from(value));
            }
            "--k" => {
                let value = iter.next().context("--k needs a number")?;
                cli.k = Some(value.parse().with_context(|| format!("invalid --k '{value}'"))?);
            }
            "--seed" => {
                let value = iter.next().context("--seed needs a number")?;
                cli.seed = Some(value.parse().with_context(|| format!("invalid --seed '{value}'"))?);
            }
            flag if flag.starts_with('-') => bail!("unknown flag '{flag}'\n{USAGE}"),
            path => {
                if input.replace(PathBuf::from(path)).is_some() {
                    bail!("more than one input file\n{USAGE}");
                }
            }
        }
    }

    cli.input = input.context(USAGE)?;
    Ok(cli)
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;

    let mut config = AnalysisConfig::from_env()?;
    if let Some(k) = cli.k {
        config.kmeans.k = k;
    }
    if let Some(seed) = cli.seed {
        config.kmeans.seed = seed;
    }
    info!(
        max_plies = config.max_plies,
        max_depth = config.max_depth,
        k = config.kmeans.k,
        seed = config.kmeans.seed,
        "Analysis config loaded"
    );

    let raw = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let rows: Vec<RawGameRow> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", cli.input.display()))?;

    let pass = AnalysisPass::new(config)?;
    let snapshot = pass.run_rows(&rows)?;
    let json = serde_json::to_string_pretty(&snapshot)?;

    match &cli.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "Snapshot written");
        }
        None => println!("{json}"),
    }

    Ok(())
}
