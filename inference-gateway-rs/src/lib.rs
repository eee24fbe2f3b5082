//! Inference gateway: answers prompts with a local completion plus web sources.
//!
//! Routes:
//! - `GET /` static page
//! - `POST /generate` `{"prompt": ...}` → answer and up to three sources
//! - `GET /health` recovery state

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use config_rs::InferenceConfig;
use resilience::{HealthReporter, RecoveryConfig, RecoveryCoordinator, TuningState};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod error;
pub mod generation;
pub mod orchestrator;
pub mod search;

use error::GatewayError;
use generation::LlamaCliGenerator;
use orchestrator::InferenceOrchestrator;
use search::SearxSearch;

/// Maximum accepted request body (1 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Shared application state
pub struct AppState {
    pub orchestrator: InferenceOrchestrator,
    pub health: HealthReporter,
}

impl AppState {
    pub fn new(orchestrator: InferenceOrchestrator) -> Self {
        let health = HealthReporter::new(orchestrator.coordinator().clone());
        Self { orchestrator, health }
    }

    /// Wires the local generator, the search client and the recovery layer
    pub fn from_config(config: &InferenceConfig) -> resilience::Result<Self> {
        let tuning = Arc::new(TuningState::new(config.search_timeout_secs, config.threads));
        let coordinator = Arc::new(RecoveryCoordinator::new(recovery_config(config), tuning)?);

        let generator = LlamaCliGenerator::new(&config.llama_cli_bin, &config.model_path, config.context_size);
        let search = SearxSearch::new(&config.search_api)?;

        let orchestrator =
            InferenceOrchestrator::new(coordinator, Arc::new(generator), Arc::new(search), config.max_tokens);

        Ok(Self::new(orchestrator))
    }
}

/// Recovery settings derived from the runtime configuration; the model is the
/// resource fetched on `resource_missing`
pub fn recovery_config(config: &InferenceConfig) -> RecoveryConfig {
    RecoveryConfig {
        resource_url: config.model_url.clone(),
        resource_path: config.model_path.clone(),
        download_timeout: Duration::from_secs(config.download_timeout_secs),
        probe_url: config.probe_url.clone(),
        backoff_unit: Duration::from_millis(config.backoff_unit_ms),
        history_capacity: config.history_capacity,
        ..Default::default()
    }
}

/// `POST /generate` body; a missing prompt is treated as empty
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/generate", post(generate_handler))
        .route("/health", get(health_handler))
        .fallback(not_found_handler)
        .layer(RequestBodyLimitLayer::new(MAX_PAYLOAD_SIZE))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - Static page
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// POST /generate - Answer a prompt
async fn generate_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(request) = payload?;
    let request_id = Uuid::new_v4();
    let span = info_span!("generate", %request_id, prompt_len = request.prompt.len());

    let response = async {
        match state.orchestrator.handle_prompt(&request.prompt).await {
            Ok(combined) => {
                info!(sources = combined.sources.len(), "Prompt answered");
                (StatusCode::OK, Json(combined)).into_response()
            }
            Err(failsafe) => {
                warn!(kind = %failsafe.kind, attempts = failsafe.attempts, "Returning failsafe response");
                (StatusCode::SERVICE_UNAVAILABLE, Json(failsafe)).into_response()
            }
        }
    }
    .instrument(span)
    .await;

    Ok(response)
}

/// GET /health - Recovery state snapshot
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health.snapshot())
}

async fn not_found_handler(uri: Uri) -> GatewayError {
    GatewayError::NotFound(uri.path().to_string())
}
