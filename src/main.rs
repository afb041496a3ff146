/// Contest Auth - authentication service binary
///
/// Loads configuration from the environment, migrates the database, starts
/// the cleanup jobs and serves the HTTP API.
use anyhow::Context;
use contest_auth::{config::ServerConfig, jobs, server, AppContext};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("Failed to load configuration")?;

    init_tracing(config.logging.json);

    info_banner(&config);

    let ctx = AppContext::new(config)
        .await
        .context("Failed to initialize application context")?;
    let ctx = Arc::new(ctx);

    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "contest_auth=debug,tower_http=debug".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn info_banner(config: &ServerConfig) {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.storage.database_path.display(),
        google = config.google.is_some(),
        email = config.email.is_some(),
        "Starting contest auth service"
    );
}
