use anyhow::{Context, Result};
use clap::Parser;
use datastream::stream::{no_progress, progress_bar};
use datastream::{DataStream, DataStreamConfig, FileReceiver};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Copy a file through a data stream into a file receiver.
#[derive(Parser, Debug)]
#[command(name = "datastream", version, about)]
struct Cli {
    /// File to stream
    source: PathBuf,

    /// Where the receiver writes the bytes
    dest: PathBuf,

    /// TOML configuration file
    #[arg(short, long, env = "DATASTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Print the stream envelope as JSON before copying
    #[arg(long)]
    envelope: bool,

    /// No progress bar
    #[arg(short, long)]
    quiet: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => DataStreamConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DataStreamConfig::default(),
    };

    let file = File::open(&cli.source)
        .with_context(|| format!("Failed to open {}", cli.source.display()))?;

    let on_progress = if cli.quiet {
        no_progress()
    } else {
        let bar = ProgressBar::new(100);
        bar.set_style(ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}%",
        )?);
        progress_bar(bar)
    };

    let mut stream = DataStream::from_file_with_config(file, on_progress, &config.copy)
        .context("Failed to create data stream")?;

    if cli.envelope {
        println!("{}", serde_json::to_string(&stream.envelope())?);
    }

    stream.attach_receiver(Arc::new(FileReceiver::new(&cli.dest)));

    let start = Instant::now();
    stream
        .deliver_async()
        .await
        .with_context(|| format!("Failed to write {}", cli.dest.display()))?;

    tracing::info!(
        id = %stream.id(),
        bytes = stream.length(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Copied {} -> {}",
        cli.source.display(),
        cli.dest.display()
    );

    Ok(())
}
