// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `colloquy serve`: wire store, provider, service and gateway, then run
//! until a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use colloquy_config::ColloquyConfig;
use colloquy_core::{ColloquyError, ProviderAdapter, StorageAdapter};
use colloquy_gateway::GatewayState;
use colloquy_openai::OpenAiProvider;
use colloquy_session::ConversationService;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::shutdown;

pub async fn run_serve(config: ColloquyConfig) -> Result<(), ColloquyError> {
    init_tracing(&config.server.log_level);

    info!("starting colloquy serve");

    let provider: Arc<dyn ProviderAdapter> = Arc::new(OpenAiProvider::new(&config.openai)?);
    let (state, store) = build_state(&config, provider).await?;

    let cancel = shutdown::install_signal_handler();
    let sweeper = spawn_sweeper(store.clone(), config.storage.sweep_interval(), cancel.clone());
    let served = colloquy_gateway::serve(&config.server, state, cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "expiry sweeper ended abnormally");
    }
    if let Err(e) = store.close().await {
        warn!(error = %e, "store close failed");
    }
    served?;

    info!("colloquy serve shutdown complete");
    Ok(())
}

/// Connect the configured backend and build the gateway state around it.
async fn build_state(
    config: &ColloquyConfig,
    provider: Arc<dyn ProviderAdapter>,
) -> Result<(GatewayState, Arc<dyn StorageAdapter>), ColloquyError> {
    let store = colloquy_storage::connect(&config.storage).await?;
    let service = ConversationService::from_config(store.clone(), provider, config);
    Ok((GatewayState::new(service), store))
}

/// Periodically remove expired transcripts and leases until `cancel` fires.
fn spawn_sweeper(
    store: Arc<dyn StorageAdapter>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // Skip the first immediate tick.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match store.purge_expired().await {
                        Ok(0) => {}
                        Ok(removed) => debug!(removed, "expired keys purged"),
                        Err(e) => warn!(error = %e, "expiry sweep failed (non-fatal)"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("expiry sweeper shutting down");
                    break;
                }
            }
        }
    })
}

/// Initializes the tracing subscriber with the given log level.
///
/// `RUST_LOG` takes precedence when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("colloquy={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
