#![warn(clippy::all, clippy::pedantic)]

use std::net::SocketAddr;
use std::path::PathBuf;

use actix_web::{App, HttpServer, web};
use clap::Parser;
use tracing::info;

mod error;
mod routes;

use error::AppError;
use logger::init_tracing;
use vigil_service::{Config, Orchestrator};

/// Vigil status server - JSON API over the health monitor
#[derive(Parser, Debug)]
#[command(name = "vigil-server")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES (also read from .env):
    PORT                   Listen port (default: 3000)
    CHECK_INTERVAL_MS      Check interval in milliseconds
    DATA_RETENTION_DAYS    Days of records to keep
    VIGIL_DATABASE_PATH    Record log location
"#)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/vigil/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::from_config(cli.config.as_ref())?;
    config.apply_env_overrides();
    config.validate()?;

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let orchestrator = web::Data::new(Orchestrator::new(config).await?);
    orchestrator.start();

    let result = run_server(addr, orchestrator.clone()).await;
    orchestrator.shutdown(orchestrator.shutdown_grace()).await;
    result
}

async fn run_server(addr: SocketAddr, orchestrator: web::Data<Orchestrator>) -> Result<(), AppError> {
    info!("Status server listening on http://{addr}");

    HttpServer::new(move || App::new().app_data(orchestrator.clone()).configure(routes::routes))
        .bind(addr)?
        .run()
        .await?;

    Ok(())
}
