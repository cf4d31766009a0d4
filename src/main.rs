use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use house_price_api::config::LogConfig;
use house_price_api::{handlers, Adapter, AppConfig};

/// Serve house price predictions over HTTP
#[derive(Debug, Parser)]
#[command(name = "house-price-api", version)]
struct Cli {
    /// Configuration file (defaults to config/default.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model artifact to try before the conventional locations
    #[arg(short, long)]
    model: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config.log)?;
    if let Some(model) = cli.model {
        config.model.path = Some(model);
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let adapter = Adapter::initialize(&config.model.loader_options())
        .context("Could not load the house price model")?;
    let adapter = web::Data::new(adapter);
    let api = web::Data::new(config.api.clone());

    let addr = config.server.addr();
    info!("Server running at http://{}", addr);

    let mut server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(adapter.clone())
            .app_data(api.clone())
            .configure(handlers::configure)
    });
    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    server.bind(&addr)?.run().await?;
    Ok(())
}

/// Logs to stdout, and to the configured file without colours.
fn init_logging(log: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "house_price_api=info,actix_web=info".into());

    let file_layer = match log.file() {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}
