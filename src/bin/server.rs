use clap::Parser;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use timelock_backend::db::services::{
    NotificationConfigService, NotificationLogService, SeaOrmContractMirror, TransactionStore,
};
use timelock_backend::lifecycle::{EventPublisher, SweepService, TimelockService};
use timelock_backend::notifications::encryption::EncryptionService;
use timelock_backend::notifications::senders::default_senders;
use timelock_backend::notifications::service::NotificationService;
use timelock_backend::server::config::ServerConfig;
use timelock_backend::services::clock::{Clock, SystemClock};
use timelock_backend::services::contract_mirror::{ContractMirror, MirrorRecipientResolver};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info,sea_orm=warn` level if RUST_LOG is not set.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let server_config = ServerConfig::load(args.config.as_deref())?;
    init_logging(&server_config.log_dir);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting timelock server.");

    // --- Database Setup ---
    let mut opt = ConnectOptions::new(server_config.database_url.clone());
    opt.max_connections(10);
    let db: DatabaseConnection = match Database::connect(opt).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "Failed to create database connection.");
            return Err(e.into());
        }
    };
    let db = Arc::new(db);

    // --- Core Services ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mirror: Arc<dyn ContractMirror> = Arc::new(SeaOrmContractMirror::new(db.clone()));
    let store = TransactionStore::new(db.clone());
    let (events, event_rx) = EventPublisher::new();

    // Handed to the API layer and the chain listener when they are mounted.
    let _timelock_service = Arc::new(TimelockService::new(
        store.clone(),
        mirror.clone(),
        events.clone(),
        clock.clone(),
    ));

    // --- Notification Dispatcher ---
    let encryption_service = Arc::new(EncryptionService::from_hex_key(
        &server_config.notification_encryption_key,
    )?);
    let senders = default_senders(Duration::from_secs(
        server_config.notification_timeout_seconds,
    ))?;
    let notification_service = Arc::new(NotificationService::new(
        Arc::new(MirrorRecipientResolver::new(mirror.clone())),
        NotificationConfigService::new(db.clone(), encryption_service),
        NotificationLogService::new(db.clone()),
        senders,
        server_config.chains.clone(),
    ));
    let dispatcher_handle = tokio::spawn(notification_service.run(event_rx));

    // --- Sweeps ---
    let sweep_service = Arc::new(SweepService::new(store, events, clock));
    let ready_handle = tokio::spawn(
        sweep_service
            .clone()
            .start_ready_sweeps(server_config.ready_sweep_interval_seconds),
    );
    let expiry_handle = tokio::spawn(
        sweep_service.start_expiry_sweeps(server_config.expiry_sweep_interval_seconds),
    );

    info!("Timelock server running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    ready_handle.abort();
    expiry_handle.abort();
    dispatcher_handle.abort();
    Ok(())
}
