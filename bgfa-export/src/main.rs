//! Point d'entrée CLI pour bgfa-export

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::Commands;

/// Analyser l'évolution des hauteurs et surfaces de plancher par bâtiment
#[derive(Parser)]
#[command(name = "bgfa-export")]
#[command(author, version)]
#[command(about = "Per-building temporal height and BGFA analysis with per-tile CSV export")]
#[command(long_about = "Associe à chaque bâtiment une hauteur par année, en déduit le nombre d'étages et la surface de plancher (BGFA), puis exporte un CSV par tuile.")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();

    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Run {
            config,
            dataset,
            output,
            jobs,
            charts,
            report,
        } => {
            info!(config = %config, "Analysis with export");
            cli::cmd_run(&config, dataset, output, jobs, charts, report.as_deref()).await?;
        }
        Commands::Stats {
            config,
            dataset,
            jobs,
        } => {
            info!(config = %config, "Statistics only");
            cli::cmd_stats(&config, dataset, jobs).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
