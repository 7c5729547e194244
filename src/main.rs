use clap::Parser;
use regwatch::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Watch a registry key and log every change until Ctrl-C.
#[derive(Debug, Parser)]
#[command(name = "regwatch", version, about)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "REGWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Key to watch, e.g. HKLM\SOFTWARE\Example
    #[arg(short, long)]
    key: Option<String>,

    /// Longest wait before re-checking for Ctrl-C, in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,
}

impl Cli {
    fn loader(&self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();
        if let Some(path) = &self.config {
            loader = loader.with_file(path);
        }
        loader = loader.with_env_overrides("REGWATCH", "__");
        if let Some(key) = &self.key {
            loader = loader.with_override("target", key.as_str());
        }
        if let Some(poll_ms) = self.poll_ms {
            loader = loader.with_override("poll_interval_ms", poll_ms as i64);
        }
        loader
    }
}

fn init_logging() {
    // Warnings and errors go to stderr, everything else to stdout
    let writer = std::io::stderr
        .with_max_level(tracing::Level::WARN)
        .or_else(std::io::stdout);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match watch(&cli).await {
        Ok(report) if report.is_clean() => {
            info!("exiting");
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "regwatch failed");
            ExitCode::FAILURE
        }
    }
}

async fn watch(cli: &Cli) -> Result<RunReport> {
    let config = cli.loader().load()?;
    let source = platform_source(&config)?;

    let shutdown = Shutdown::new();
    let _signal = shutdown.install_interrupt_handler()?;
    info!(source = %source.name(), "press Ctrl-C to stop");

    run(&config, source, LogSink, shutdown).await
}
