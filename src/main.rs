use chrono::Utc;
use clap::Parser;
#[cfg(feature = "browser")]
use offer_watch::fetch::BrowserSource;
use offer_watch::config::{self, Args, Command, MonitorConfig, StorageKind};
use offer_watch::fetch::{Fetcher, HttpSource};
use offer_watch::notify::TelegramNotifier;
use offer_watch::runner;
use offer_watch::storage::{JsonStorage, SqliteStorage, Storage};
use offer_watch::{MonitorError, SiteTarget};
use std::path::Path;
use tracing::{info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

async fn open_storage(
    args: &Args,
    import_json: Option<&Path>,
) -> Result<Box<dyn Storage>, MonitorError> {
    match args.storage {
        StorageKind::Json => {
            if import_json.is_some() {
                warn!("--import-json only applies to the SQLite backend, ignoring");
            }
            Ok(Box::new(JsonStorage::new(&args.seen_file, &args.results_file)))
        }
        StorageKind::Sqlite => {
            let storage = SqliteStorage::new(&args.db_name).await?;
            if let Some(path) = import_json {
                let imported = storage.import_json(path).await?;
                info!("Imported {} licenses from {}", imported, path.display());
            }
            Ok(Box::new(storage))
        }
    }
}

async fn sites(args: &Args, builtin: fn() -> Vec<SiteTarget>) -> Result<Vec<SiteTarget>, MonitorError> {
    match args.sites.as_deref() {
        Some(path) => config::load_sites(path).await,
        None => Ok(builtin()),
    }
}

#[cfg(feature = "browser")]
async fn promo_fetcher(args: &Args, config: MonitorConfig) -> Result<Fetcher, MonitorError> {
    if args.browser {
        let source = BrowserSource::launch(&config).await?;
        return Ok(Fetcher::new(source, config));
    }
    Ok(Fetcher::new(HttpSource::new(&config)?, config))
}

#[cfg(not(feature = "browser"))]
async fn promo_fetcher(_args: &Args, config: MonitorConfig) -> Result<Fetcher, MonitorError> {
    Ok(Fetcher::new(HttpSource::new(&config)?, config))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
                "info,html5ever=error,selectors=error,hyper=warn,reqwest=info,sqlx=warn".into()
            }),
        )
        .with(ErrorLayer::default())
        .init();

    let args = Args::parse();
    let config = MonitorConfig::from(&args);
    let notifier = TelegramNotifier::new(
        args.telegram_bot_token.clone(),
        args.telegram_chat_id.clone(),
    )?;

    info!("Starting scrape at {}", Utc::now().to_rfc3339());

    match &args.command {
        Command::Promos => {
            let targets = sites(&args, config::promo_sites).await?;
            let storage = open_storage(&args, None).await?;
            let fetcher = promo_fetcher(&args, config).await?;

            runner::run_promos(&fetcher, storage.as_ref(), &notifier, &targets).await?;
        }
        Command::Licenses { import_json } => {
            let registers = sites(&args, config::register_sites).await?;
            let storage = open_storage(&args, import_json.as_deref()).await?;
            let source = HttpSource::new(&config)?.require_success();
            let fetcher = Fetcher::new(source, config.for_register());

            runner::run_licenses(&fetcher, storage.as_ref(), &notifier, &registers).await?;
        }
    }

    info!("Done!");
    Ok(())
}
