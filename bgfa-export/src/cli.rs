//! Définition et implémentation des commandes CLI
//!
//! - `run`: analyse complète avec export CSV par tuile
//! - `stats`: statistiques annuelles seules

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bgfa::Metric;
use bgfa_export::{
    load_dataset, run, Config, LocalCsvSink, RunOptions, RunReport, RunStatus, ServiceConfig,
};
use clap::Subcommand;
use tracing::info;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full analysis and export one CSV per tile
    Run {
        /// Config preset name (pune/pune-heights) or path to a JSON config
        #[arg(short, long, default_value = "pune")]
        config: String,

        /// Directory holding buildings.geojson and heights.json (défaut : env BGFA_DATASET_DIR)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Output directory for exports (défaut : env BGFA_OUTPUT_DIR / output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum number of tiles processed concurrently
        #[arg(long, default_value_t = 4)]
        jobs: usize,

        /// Write histogram descriptions to <output>/charts.json
        #[arg(long)]
        charts: bool,

        /// Save the run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Compute yearly statistics without exporting
    Stats {
        /// Config preset name (pune/pune-heights) or path to a JSON config
        #[arg(short, long, default_value = "pune")]
        config: String,

        /// Directory holding buildings.geojson and heights.json (défaut : env BGFA_DATASET_DIR)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Maximum number of tiles processed concurrently
        #[arg(long, default_value_t = 4)]
        jobs: usize,
    },
}

fn dataset_dir(cli: Option<PathBuf>, env: &ServiceConfig) -> Result<PathBuf> {
    match cli.or_else(|| env.dataset_dir.clone()) {
        Some(dir) => Ok(dir),
        None => bail!("No dataset directory: use --dataset or set BGFA_DATASET_DIR"),
    }
}

fn options(config_spec: &str, jobs: usize, env: &ServiceConfig) -> RunOptions {
    RunOptions {
        label: config_spec.to_string(),
        jobs,
        concurrency: env.concurrency,
        poll_interval: env.poll_interval,
        charts_dir: None,
    }
}

/// Exécute la commande run
pub async fn cmd_run(
    config_spec: &str,
    dataset: Option<PathBuf>,
    output: Option<PathBuf>,
    jobs: usize,
    charts: bool,
    report_path: Option<&Path>,
) -> Result<()> {
    let env = ServiceConfig::from_env();
    let config = Config::resolve(config_spec)?;
    let dataset = dataset_dir(dataset, &env)?;
    let output = output.unwrap_or_else(|| env.output_dir.clone());

    let service = load_dataset(&dataset, &config.dataset.buildings, &config.dataset.heights)
        .with_context(|| format!("Failed to load dataset {}", dataset.display()))?;
    let sink = LocalCsvSink::new(&output);

    let mut options = options(config_spec, jobs, &env);
    if charts {
        options.charts_dir = Some(output.clone());
    }

    info!(
        dataset = %dataset.display(),
        output = %output.display(),
        jobs,
        "Running analysis"
    );

    let result = run(&config, &service, Some(&sink), &options).await?;
    result.report.display();

    if let Some(path) = report_path {
        result.report.save_to_file(path)?;
        info!(path = %path.display(), "Report saved");
    }

    check_status(&result.report)
}

/// Exécute la commande stats
pub async fn cmd_stats(config_spec: &str, dataset: Option<PathBuf>, jobs: usize) -> Result<()> {
    let env = ServiceConfig::from_env();
    let config = Config::resolve(config_spec)?;
    let dataset = dataset_dir(dataset, &env)?;

    let service = load_dataset(&dataset, &config.dataset.buildings, &config.dataset.heights)
        .with_context(|| format!("Failed to load dataset {}", dataset.display()))?;

    let options = options(config_spec, jobs, &env);
    let result = run::<_, LocalCsvSink>(&config, &service, None, &options).await?;

    println!(
        "{:<8} {:<8} {:>10} {:>12} {:>12} {:>12}",
        "metric", "year", "count", "mean", "min", "max"
    );
    for metric in [Metric::Height, Metric::Bgfa] {
        for stat in result.report.statistics_for(metric) {
            println!(
                "{:<8} {:<8} {:>10} {:>12} {:>12} {:>12}",
                stat.metric,
                stat.year,
                stat.count,
                format_value(stat.mean),
                format_value(stat.min),
                format_value(stat.max),
            );
        }
    }

    check_status(&result.report)
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".into())
}

fn check_status(report: &RunReport) -> Result<()> {
    if report.status == RunStatus::Failed {
        bail!("Analysis failed: {}", report.summary());
    }
    Ok(())
}
