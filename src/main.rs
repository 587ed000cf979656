use anyhow::Context;
use byra::config::Config;
use byra::ingest;
use byra::Watcher;
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Command-line arguments for the beer weight watcher
#[derive(Parser)]
#[command(
    name = "byra",
    about = "Beer weight watcher - raises an alarm when the keg runs low",
    long_about = "Ingests weight samples from a scale, publishes them as metrics, \
                  evaluates them against a windowed threshold alarm and sends a \
                  notification whenever the alarm changes state."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Validate the configuration and exit
    #[arg(long, help = "Load and validate the configuration, then exit")]
    check: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if !self.config.exists() {
            return Err(format!(
                "Configuration file not found: {}",
                self.config.display()
            ));
        }

        if !self.config.is_file() {
            return Err(format!(
                "Configuration path is not a file: {}",
                self.config.display()
            ));
        }

        if self.config.extension().map_or(true, |ext| ext != "toml") {
            warn!(
                "Configuration file does not have .toml extension: {}",
                self.config.display()
            );
        }

        Ok(())
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let watcher = Watcher::from_config(&config).context("Failed to initialize watcher")?;

    let listener = TcpListener::bind(config.ingest.listen.as_str())
        .await
        .with_context(|| format!("Failed to bind sample listener on {}", config.ingest.listen))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        if let Err(e) = shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("Error setting SIGINT handler for graceful shutdown")?;

    let listener_task = tokio::spawn(ingest::serve(
        listener,
        watcher.ingest_handle(),
        config.ingest.max_line_bytes,
        shutdown_rx.clone(),
    ));

    info!(
        "Watching {}/{} for alarm '{}' ({}). Press Ctrl+C to stop.",
        config.metric.namespace, config.metric.name, config.alarm.name, config.alarm.description
    );

    watcher.run(shutdown_rx).await;

    if let Err(e) = listener_task.await {
        warn!("Sample listener ended abnormally: {}", e);
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if cli.check {
        info!("Configuration {} is valid", cli.config.display());
        return;
    }

    info!("Starting beer weight watcher");

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("Watcher shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli(config: PathBuf) -> Cli {
        Cli {
            config,
            verbose: false,
            check: false,
        }
    }

    #[test]
    fn test_cli_validation_with_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("byra.toml");
        std::fs::write(&path, "[alarm]\n").unwrap();

        assert!(cli(path).validate().is_ok());
    }

    #[test]
    fn test_cli_validation_with_missing_file() {
        // A missing configuration is fatal
        assert!(cli(PathBuf::from("/nonexistent/byra.toml")).validate().is_err());
    }

    #[test]
    fn test_cli_validation_with_directory() {
        let dir = TempDir::new().unwrap();
        assert!(cli(dir.path().to_path_buf()).validate().is_err());
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from(["byra", "--config", "byra.toml", "--verbose", "--check"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("byra.toml"));
        assert!(cli.verbose);
        assert!(cli.check);
    }

    #[test]
    fn test_cli_requires_config() {
        assert!(Cli::try_parse_from(["byra"]).is_err());
    }
}
