//! Khet Sahayak CLI - main entry point
//!
//! Ask questions online or offline, build the local index and inspect history.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use khet_sahayak::commands::{self, AskArgs, HistoryArgs, Mode};
use khet_sahayak::{metrics, Config};
use tracing::warn;

#[derive(Parser)]
#[command(name = "khet_sahayak")]
#[command(about = "Connectivity-aware farming knowledge assistant", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config.yml (default: ./config.yml, then ../config.yml)
    #[arg(long, env = "KHET_CONFIG")]
    config: Option<PathBuf>,

    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question
    Ask {
        /// Question text
        text: String,

        /// Retrieval mode: auto | online | offline
        #[arg(short, long, default_value = "auto")]
        mode: String,

        /// Number of local passages to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Photo to attach (jpg, png, webp)
        #[arg(long)]
        image: Option<PathBuf>,

        /// Do not store the exchange in chat history
        #[arg(long, default_value_t = false)]
        no_history: bool,
    },

    /// Check network and API reachability
    Probe,

    /// Build the local index from the knowledge-base directory
    BuildIndex {
        /// Knowledge-base directory (defaults to config)
        #[arg(long)]
        kb_dir: Option<PathBuf>,

        /// Output index path (defaults to config)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show local index statistics
    Stats,

    /// Show, search, export or clear chat history
    History {
        /// Maximum entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Only entries whose question contains this text
        #[arg(short, long)]
        search: Option<String>,

        /// Export all entries to a CSV file
        #[arg(long)]
        export_csv: Option<PathBuf>,

        /// Delete all entries
        #[arg(long, default_value_t = false)]
        clear: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ask { .. } => "ask",
            Commands::Probe => "probe",
            Commands::BuildIndex { .. } => "build_index",
            Commands::Stats => "stats",
            Commands::History { .. } => "history",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("khet_sahayak=info".parse()?))
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let config = Config::load(cli.config.as_deref())?;

    let command_name = cli.command.name();
    metrics::record_command_start(command_name);
    let start = Instant::now();

    let result = execute_command(&config, cli.command).await;

    metrics::record_command_result(command_name, start.elapsed(), result.is_ok());
    result
}

async fn execute_command(config: &Config, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Ask {
            text,
            mode,
            top_k,
            image,
            no_history,
        } => {
            let answer = commands::ask_run(
                config,
                AskArgs {
                    text,
                    mode: Mode::parse(&mode)?,
                    top_k,
                    image,
                    save_history: !no_history,
                },
            )
            .await?;
            println!("{}", answer);
        }
        Commands::Probe => {
            let report = commands::probe_run(config).await?;
            println!("{}", report.render());
        }
        Commands::BuildIndex { kb_dir, out } => {
            let stats = commands::build_index_run(config, kb_dir, out).await?;
            println!("{}", commands::build_index::format_stats(&stats));
        }
        Commands::Stats => {
            println!("{}", commands::show_stats(config)?);
        }
        Commands::History {
            limit,
            search,
            export_csv,
            clear,
        } => {
            let out = commands::history_run(
                config,
                HistoryArgs {
                    limit,
                    search,
                    export_csv,
                    clear,
                },
            )?;
            println!("{}", out);
        }
    }

    Ok(())
}
