use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facematch::config::{self, Config};
use facematch::server::{self, routes::ExtractResponse, AppState};
use facematch::{Extraction, Extractor, Pipeline};
use log::info;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "facematch")]
#[command(version, about = "Face embedding extraction and comparison service")]
struct Cli {
    /// Config file (defaults to the compiled-in path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the match threshold
    #[arg(short, long, global = true)]
    threshold: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Listen address, e.g. 127.0.0.1:5001
        #[arg(short, long)]
        bind: Option<String>,
        /// Number of extraction workers
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Print the embedding of the primary face in an image
    Extract {
        image: PathBuf,
    },
    /// Compare two embeddings stored as JSON
    Compare {
        first: PathBuf,
        second: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

/// A bare array, or the output of `extract`.
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingFile {
    Bare(Vec<f64>),
    Wrapped { embedding: Vec<f64> },
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref())?;
    if let Some(t) = cli.threshold {
        cfg.match_threshold = t;
    }

    match cli.command {
        Commands::Serve { bind, workers } => {
            if let Some(bind) = bind {
                cfg.bind = bind;
            }
            if let Some(workers) = workers {
                cfg.workers = workers;
            }
            serve(cfg)
        }
        Commands::Extract { image } => extract(cfg, &image),
        Commands::Compare { first, second } => compare(cfg, &first, &second),
        Commands::Config => print_config(&cfg, cli.config.as_deref()),
    }
}

fn serve(cfg: Config) -> Result<()> {
    let state = AppState::from_config(cfg).context("Failed to initialize service")?;
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?
        .block_on(server::serve(state))
}

fn extract(cfg: Config, image: &Path) -> Result<()> {
    cfg.validate()?;
    let bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;

    let pipeline =
        Pipeline::new(&cfg.vision).context("Failed to initialize face recognition pipeline")?;
    let mut extractor =
        Extractor::new(Box::new(pipeline)).with_selector(cfg.face_selection.selector());

    match extractor.extract(&bytes)? {
        Extraction::Face(embedding) => {
            info!("Extracted {}-d embedding", embedding.len());
            println!(
                "{}",
                serde_json::to_string(&ExtractResponse::found(embedding))?
            );
            Ok(())
        }
        Extraction::NoFace => anyhow::bail!("No face found in {}", image.display()),
    }
}

fn read_embedding(path: &Path) -> Result<Vec<f64>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let parsed: EmbeddingFile = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not an embedding", path.display()))?;
    Ok(match parsed {
        EmbeddingFile::Bare(v) => v,
        EmbeddingFile::Wrapped { embedding } => embedding,
    })
}

fn compare(cfg: Config, first: &Path, second: &Path) -> Result<()> {
    let comparator = cfg.comparator()?;
    let a = read_embedding(first)?;
    let b = read_embedding(second)?;

    let result = comparator.compare(&a, &b)?;
    info!(
        "distance {:.6} (threshold {}): {}",
        result.distance,
        comparator.threshold(),
        if result.is_match { "match" } else { "no match" }
    );
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn print_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    cfg.validate()?;
    let path = path.unwrap_or(&config::CONFIG_PATH);
    info!("Config file: {}", path.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
