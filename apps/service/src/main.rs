use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use vigil_service::{Config, Orchestrator};

/// Vigil - headless service health monitor
#[derive(Parser, Debug)]
#[command(name = "vigil-service")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    CHECK_INTERVAL_MS      Check interval in milliseconds
    DATA_RETENTION_DAYS    Days of records to keep
    VIGIL_DATABASE_PATH    Record log location
    RUST_LOG               Log filter (default: info)
    RUST_LOG_FORMAT        Set to "json" for JSON logs
"#)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/vigil/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let mut config = Config::from_config(path)?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        logger::init_with_level(logger::LevelFilter::DEBUG);
    } else {
        logger::init_tracing();
    }

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    if cli.print_config {
        println!("{config}");
        return;
    }

    if let Err(e) = run(config).await {
        error!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let orchestrator = Orchestrator::new(config).await?;
    orchestrator.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutting down gracefully...");
    orchestrator.shutdown(orchestrator.shutdown_grace()).await;

    Ok(())
}
