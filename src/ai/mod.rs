//! AI service integration — embedding generation and semantic role search.
//!
//! Embeddings go through rig-core (OpenAI embedding models), bridged to our
//! `EmbeddingClient` trait by `RigEmbedder`. Semantic search talks to a
//! hosted vector index over its JSON REST surface.

pub mod embedding;
pub mod search;

pub use embedding::{EmbeddingClient, RigEmbedder};
pub use search::{HttpSearchClient, RoleMatch, SemanticSearchClient};

use std::sync::Arc;

use rig::client::EmbeddingsClient;
use secrecy::ExposeSecret;

use crate::error::EmbeddingError;

/// Configuration for the embedding client.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Configuration for the semantic search client.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: secrecy::SecretString,
}

/// Create an embedding client from configuration.
pub fn create_embedding_client(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            EmbeddingError::RequestFailed {
                reason: format!("Failed to create OpenAI client: {e}"),
            }
        })?;

    let model = client.embedding_model(&config.model);
    tracing::info!("Using OpenAI embeddings (model: {})", config.model);
    Ok(Arc::new(RigEmbedder::new(model, &config.model)))
}
