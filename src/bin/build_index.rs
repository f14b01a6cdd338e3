//! Build the local knowledge index from a directory of text files.
//!
//! Same as `khet_sahayak build-index`, packaged for deployment scripts that
//! refresh the index before devices go offline.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use khet_sahayak::commands::build_index::{format_stats, run};
use khet_sahayak::Config;

#[derive(Parser)]
#[command(name = "build_index")]
#[command(about = "Chunk, embed and persist the knowledge base as a local index")]
struct Cli {
    /// Path to config.yml
    #[arg(long, env = "KHET_CONFIG")]
    config: Option<PathBuf>,

    /// Knowledge-base directory (defaults to config)
    #[arg(long)]
    kb_dir: Option<PathBuf>,

    /// Output index path (defaults to config)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("khet_sahayak=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let stats = run(&config, cli.kb_dir, cli.out).await?;
    info!(chunks = stats.chunks, "done");
    println!("{}", format_stats(&stats));

    Ok(())
}
