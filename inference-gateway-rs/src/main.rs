// inference-gateway-rs/src/main.rs
// Inference Gateway - local generation plus web search behind one HTTP endpoint
// Port 8080 by default (INFERENCE_SERVICE_PORT / INFERENCE_SERVICE_ADDR)
//
// `--test` runs a one-shot generation with a small context and exits 0 on
// success, 1 on failure, without starting the server.

use std::sync::Arc;

use anyhow::Context;
use config_rs::{get_bind_address, load_dotenv, InferenceConfig, LogSettings, DEFAULT_SERVICE_PORT};
use inference_gateway::generation::{GenerationRequest, LlamaCliGenerator, TextGenerator};
use inference_gateway::{build_router, recovery_config, AppState};
use resilience::{init_logging, LoggingConfig, RecoveryCoordinator, RecoveryResult, TuningState};
use tracing::{error, info};

const SELF_TEST_CONTEXT_SIZE: u32 = 128;
const SELF_TEST_THREADS: usize = 2;
const SELF_TEST_MAX_TOKENS: u32 = 16;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let log = LogSettings::from_env();
    let _log_guard = init_logging(LoggingConfig {
        level: log.level,
        service_name: "inference-gateway".to_string(),
        json_format: log.json,
        log_dir: log.dir,
    })
    .context("failed to initialize logging")?;

    let config = InferenceConfig::from_env();

    if std::env::args().skip(1).any(|arg| arg == "--test") {
        let passed = self_test(&config).await;
        std::process::exit(if passed { 0 } else { 1 });
    }

    let state = Arc::new(AppState::from_config(&config).context("failed to build application state")?);
    let app = build_router(state);

    let addr = get_bind_address("INFERENCE", DEFAULT_SERVICE_PORT);
    info!(%addr, model = %config.model_path.display(), search_api = %config.search_api, "Inference gateway starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Inference gateway stopped");
    Ok(())
}

/// Loads the model (fetching it when missing) and generates a short reply
async fn self_test(config: &InferenceConfig) -> bool {
    let tuning = Arc::new(TuningState::new(config.search_timeout_secs, SELF_TEST_THREADS));
    let coordinator = match RecoveryCoordinator::new(recovery_config(config), tuning) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!(error = %e, "Self-test setup failed");
            return false;
        }
    };

    let generator = Arc::new(LlamaCliGenerator::new(
        &config.llama_cli_bin,
        &config.model_path,
        SELF_TEST_CONTEXT_SIZE,
    ));

    let outcome = coordinator
        .protect("self_test", || {
            let generator = generator.clone();
            let request = GenerationRequest {
                prompt: "Hello".to_string(),
                max_tokens: SELF_TEST_MAX_TOKENS,
                threads: coordinator.tuning().worker_threads(),
            };
            async move {
                tokio::task::spawn_blocking(move || generator.generate(&request))
                    .await
                    .unwrap_or_else(|e| Err(e.into()))
            }
        })
        .await;

    match outcome {
        RecoveryResult::Success(reply) => {
            info!(reply_len = reply.len(), "Self-test passed");
            true
        }
        RecoveryResult::Failsafe(failsafe) => {
            error!(error = %failsafe.error, kind = %failsafe.kind, "Self-test failed");
            false
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
