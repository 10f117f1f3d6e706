//! HTTP server for sommd

use crate::catalog::{EmptyCatalog, SqliteCatalog, WineCatalog};
use crate::config::SommConfig;
use crate::orchestrator::{EngineConfig, IdentifyEngine};
use crate::provider::OllamaClient;
use crate::routes;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub engine: Arc<IdentifyEngine>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(engine: Arc<IdentifyEngine>) -> Self {
        Self {
            engine,
            start_time: Instant::now(),
        }
    }
}

/// Wire the engine from config: provider, catalog, thresholds.
pub fn build_engine(config: &SommConfig) -> Result<Arc<IdentifyEngine>> {
    let model = Arc::new(OllamaClient::new(config.models.base_url.clone()));

    let catalog: Arc<dyn WineCatalog> = match &config.catalog.path {
        Some(path) => {
            info!("Using wine catalog at {}", path.display());
            let catalog = SqliteCatalog::open(path)?;
            catalog.init_schema()?;
            Arc::new(catalog)
        }
        None => {
            info!("No catalog configured; disambiguation disabled");
            Arc::new(EmptyCatalog)
        }
    };

    Ok(Arc::new(IdentifyEngine::new(
        model,
        catalog,
        EngineConfig {
            models: config.models.clone(),
            escalation: config.escalation.clone(),
            policy: config.confidence,
            debug_events: false,
        },
    )))
}

/// Run the HTTP server
pub async fn run(config: SommConfig) -> Result<()> {
    let engine = build_engine(&config)?;
    let state = Arc::new(AppState::new(engine));

    let app = Router::new()
        .merge(routes::identify_routes())
        .merge(routes::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("  Listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}
