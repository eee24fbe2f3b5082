// inference-gateway-rs/src/orchestrator.rs
//
// Fans each prompt out to generation and search concurrently, each wrapped by
// the recovery coordinator, and merges both results.

use std::sync::Arc;

use resilience::{FailsafeResponse, RecoveryCoordinator, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::generation::{GenerationRequest, TextGenerator};
use crate::search::{SearchProvider, SearchResult};

/// Maximum number of sources returned with an answer
pub const MAX_SOURCES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedResponse {
    pub answer: String,
    pub sources: Vec<SearchResult>,
}

pub struct InferenceOrchestrator {
    coordinator: Arc<RecoveryCoordinator>,
    generator: Arc<dyn TextGenerator>,
    search: Arc<dyn SearchProvider>,
    max_tokens: u32,
}

impl InferenceOrchestrator {
    pub fn new(
        coordinator: Arc<RecoveryCoordinator>,
        generator: Arc<dyn TextGenerator>,
        search: Arc<dyn SearchProvider>,
        max_tokens: u32,
    ) -> Self {
        Self {
            coordinator,
            generator,
            search,
            max_tokens,
        }
    }

    pub fn coordinator(&self) -> &Arc<RecoveryCoordinator> {
        &self.coordinator
    }

    /// Answers `prompt`. Any sub-operation ending in a failsafe fails the whole
    /// request; partial answers are never returned. An empty prompt is passed
    /// through as is.
    pub async fn handle_prompt(&self, prompt: &str) -> std::result::Result<CombinedResponse, FailsafeResponse> {
        let generation = self.coordinator.protect("generate", || self.generate(prompt));
        let search = self.coordinator.protect("search", || self.search(prompt));

        let (generation, search) = tokio::join!(generation, search);

        let answer = generation.into_result()?;
        let mut sources = search.into_result()?;
        sources.truncate(MAX_SOURCES);

        debug!(answer_len = answer.len(), sources = sources.len(), "Built combined response");
        Ok(CombinedResponse { answer, sources })
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerationRequest {
            prompt: prompt.to_string(),
            max_tokens: self.max_tokens,
            threads: self.coordinator.tuning().worker_threads(),
        };
        let generator = self.generator.clone();

        tokio::task::spawn_blocking(move || generator.generate(&request)).await?
    }

    async fn search(&self, prompt: &str) -> Result<Vec<SearchResult>> {
        let timeout = self.coordinator.tuning().search_timeout();
        self.search.search(prompt, timeout).await
    }
}
