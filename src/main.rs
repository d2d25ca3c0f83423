use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use cohort_explorer::config::{self, ExplorerConfig};
use cohort_explorer::data::synthetic;
use cohort_explorer::report;
use cohort_explorer::CohortList;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "cohort-explorer")]
#[command(about = "Build cohorts over a synthetic census dataset and compare their stats")]
#[command(version)]
struct Args {
    /// Cohort config (JSON); written with sample cohorts if missing
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the dataset seed from the config
    #[arg(short, long)]
    seed: Option<u64>,

    /// Override the dataset row count from the config
    #[arg(short, long)]
    rows: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => config::load_or_init(path, ExplorerConfig::sample)?,
        None => ExplorerConfig::sample()?,
    };
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    if let Some(rows) = args.rows {
        cfg.rows = rows;
    }

    let dataset = synthetic::generate(cfg.rows, cfg.seed).context("generating dataset")?;
    log::info!("Generated {} rows with seed {}", dataset.len(), cfg.seed);

    let mut cohorts = CohortList::with_all_data(Arc::new(dataset));
    for def in cfg.cohorts {
        let name = def.name.clone();
        cohorts
            .add_definition(def)
            .with_context(|| format!("building cohort '{name}'"))?;
    }

    let summaries = report::summarize(&cohorts);
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
        OutputFormat::Text => {
            for summary in &summaries {
                println!("{summary}\n");
            }
        }
    }
    Ok(())
}
