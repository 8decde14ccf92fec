//! Subcommand implementations.

pub mod chat;
pub mod serve;

use nebula_config::AppConfig;
use nebula_core::event::EventBus;
use nebula_core::{Provider, Retriever};
use nebula_engine::TurnEngine;
use nebula_providers::GeminiProvider;
use nebula_retrieval::DocumentIndex;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(p) => AppConfig::load_from(p),
        None => AppConfig::load(),
    }
    .map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(config)
}

/// Wire provider, retrieval index, and tools into a turn engine.
///
/// A failed index build degrades to an empty index so the service still
/// answers, just without document context.
pub(crate) async fn build_engine(config: &AppConfig) -> (TurnEngine, Arc<EventBus>) {
    let provider: Arc<dyn Provider> = Arc::new(GeminiProvider::from_config(config));

    let retriever: Arc<dyn Retriever> =
        match DocumentIndex::from_config(provider.clone(), config).await {
            Ok(index) => {
                info!(chunks = index.len(), "Document index ready");
                Arc::new(index)
            }
            Err(e) => {
                warn!(error = %e, "Could not build the document index, continuing without context");
                Arc::new(DocumentIndex::empty(
                    provider.clone(),
                    &config.embedding_model,
                ))
            }
        };

    let tools = Arc::new(nebula_tools::default_registry(config));
    let event_bus = Arc::new(EventBus::default());
    let engine = TurnEngine::from_config(provider, retriever, tools, event_bus.clone(), config);
    (engine, event_bus)
}
