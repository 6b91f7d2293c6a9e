mod config;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use archivist_db::Database;
use archivist_engine::{EngineConfig, Pipeline};
use archivist_gateway::{GatewaySession, RestClient};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let dotenv = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "archivist=debug,archivist_engine=debug,archivist_db=info,archivist_gateway=info".into()
            }),
        )
        .init();

    if dotenv.is_err() {
        warn!("No .env file found, using process environment");
    }

    // Config
    let config = Config::from_env()?;

    // Init database. Nothing can be archived without it.
    info!("Initializing database");
    let db = Arc::new(
        Database::open(&config.db_path)
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );

    let rest = Arc::new(RestClient::new(&config.api_url, &config.token)?);

    let mut session = GatewaySession::connect(&config.gateway_url, &config.token)
        .await
        .context("failed to open gateway session")?;

    let mut engine_config = EngineConfig::new(config.control_channel, session.user_id);
    engine_config.command_prefix = config.command_prefix.clone();
    let pipeline = Pipeline::new(db, rest, engine_config);

    info!(control_channel = config.control_channel, "Archivist is now running. Press CTRL-C to exit.");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = session.events.recv() => {
                let Some(event) = event else {
                    break;
                };
                // Handlers run concurrently so a backfill never stalls live events
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    pipeline.handle(event).await;
                });
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                session.task.abort();
                return Ok(());
            }
        }
    }

    match session.task.await {
        Ok(Ok(())) => info!("Gateway session closed"),
        Ok(Err(e)) => error!(error = %e, "Gateway session ended"),
        Err(e) => warn!(error = %e, "Gateway task did not finish cleanly"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
