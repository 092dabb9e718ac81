use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use progilift_sync::{
    AppState,
    config::{Config, StoreBackend},
    jobs::{fast_path::FastPathOptions, fast_path_job::start_fast_path_job},
    router,
    services::{
        memory_store::MemoryStore, postgrest::RestRecordStore, progilift::ProgiliftClient,
        record_store::RecordStore,
    },
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,progilift_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    let store: Arc<dyn RecordStore> = match config.store_backend {
        StoreBackend::Rest => {
            tracing::info!("Using record store at {}", config.supabase_url);
            Arc::new(RestRecordStore::new(&config.supabase_url, config.supabase_key.clone()))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory record store; nothing will be persisted");
            Arc::new(MemoryStore::new())
        }
    };

    let upstream = Arc::new(ProgiliftClient::new(config.ws_url.clone(), config.site_code.clone()));

    let state = AppState {
        upstream,
        store,
        fast_path: FastPathOptions {
            lookback_days: config.fast_path_lookback_days,
        },
    };

    if let Some(every) = config.cron_interval {
        start_fast_path_job(state.clone(), every).await;
    }

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
