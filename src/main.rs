//! sheet-drain: converts spreadsheets dropped into a directory into per-sheet delimited files.
//!
//! Runs until SIGINT/SIGTERM, then stops accepting events and lets in-flight conversions finish.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sheet_drain::config::{PipelineConfig, RetryPolicy};
use sheet_drain::execution::Pipeline;
use sheet_drain::ingestion::{CompositeObserver, FileObserver, PipelineObserver, TracingObserver};
use sheet_drain::{PipelineError, PipelineResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sheet-drain", version, about)]
struct Args {
    /// JSON configuration file; command line flags override its values.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Directory to watch for incoming files.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Directory receiving the per-sheet artifacts.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory receiving files that need manual review.
    #[arg(long)]
    quarantine: Option<PathBuf>,

    /// Append human-readable decision lines to this file.
    #[arg(long, conflicts_with = "no_log_file")]
    log_file: Option<PathBuf>,

    /// Do not write the decision log file.
    #[arg(long)]
    no_log_file: bool,

    /// Attempts to open a new file before giving up on it.
    #[arg(long)]
    retry_attempts: Option<u32>,

    /// Delay between open attempts, in milliseconds.
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Worker threads (defaults to available parallelism).
    #[arg(long)]
    workers: Option<usize>,

    /// Window for merging duplicate filesystem notifications, in milliseconds.
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Ignore files already present in the input directory at startup.
    #[arg(long)]
    no_scan_existing: bool,
}

impl Args {
    fn into_config(self) -> PipelineResult<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_path(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(dir) = self.input {
            config.input_dir = dir;
        }
        if let Some(dir) = self.output {
            config.output_dir = dir;
        }
        if let Some(dir) = self.quarantine {
            config.quarantine_dir = dir;
        }
        if self.no_log_file {
            config.log_file = None;
        } else if let Some(path) = self.log_file {
            config.log_file = Some(path);
        }
        if self.retry_attempts.is_some() || self.retry_delay_ms.is_some() {
            config.retry = RetryPolicy::new(
                self.retry_attempts.unwrap_or(config.retry.max_attempts),
                self.retry_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| config.retry.delay()),
            );
        }
        if let Some(n) = self.workers {
            config.workers = Some(n);
        }
        if let Some(ms) = self.debounce_ms {
            config.debounce_ms = ms;
        }
        if self.no_scan_existing {
            config.scan_existing = false;
        }
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("sheet-drain failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> PipelineResult<()> {
    let config = args.into_config()?;
    tracing::info!(
        input = %config.input_dir.display(),
        output = %config.output_dir.display(),
        quarantine = %config.quarantine_dir.display(),
        "starting"
    );

    let observer = build_observer(&config);
    let pipeline = Arc::new(Pipeline::new(config, observer)?);
    let shutdown = pipeline.shutdown_signal();

    let mut runner = {
        let pipeline = Arc::clone(&pipeline);
        tokio::task::spawn_blocking(move || pipeline.run())
    };

    tokio::select! {
        joined = &mut runner => {
            return joined.map_err(join_error)?.map(|_| ());
        }
        _ = shutdown_requested() => {
            tracing::info!("shutdown requested, waiting for in-flight files");
            shutdown.request();
        }
    }

    let summary = runner.await.map_err(join_error)??;
    tracing::info!(%summary, "stopped");
    Ok(())
}

fn build_observer(config: &PipelineConfig) -> Arc<dyn PipelineObserver> {
    let mut observers: Vec<Arc<dyn PipelineObserver>> = vec![Arc::new(TracingObserver)];
    if let Some(path) = &config.log_file {
        observers.push(Arc::new(FileObserver::new(path)));
    }
    Arc::new(CompositeObserver::new(observers))
}

fn join_error(e: tokio::task::JoinError) -> PipelineError {
    PipelineError::Io(std::io::Error::other(format!("pipeline thread failed: {e}")))
}

async fn shutdown_requested() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
                }
            }
            Err(e) => {
                tracing::warn!("cannot listen for SIGTERM ({e}); only Ctrl+C will stop the drain");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received Ctrl+C");
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use clap::Parser;

    use super::Args;

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "sheet-drain",
            "--input",
            "/srv/drop",
            "--retry-delay-ms",
            "250",
            "--no-log-file",
            "--no-scan-existing",
        ]);
        let config = args.into_config().unwrap();

        assert_eq!(config.input_dir, PathBuf::from("/srv/drop"));
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.retry.max_attempts, 10);
        assert_eq!(config.retry.delay(), Duration::from_millis(250));
        assert_eq!(config.log_file, None);
        assert!(!config.scan_existing);
    }

    #[test]
    fn log_file_flags_conflict() {
        assert!(Args::try_parse_from(["sheet-drain", "--log-file", "x.log", "--no-log-file"]).is_err());
    }
}
