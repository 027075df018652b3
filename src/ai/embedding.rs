//! Embedding client — turns free text into fixed-length vectors.

use async_trait::async_trait;

use crate::error::EmbeddingError;

/// Generates embedding vectors for free text.
///
/// There is no local fallback: if the service is unreachable, the caller
/// surfaces the error (fatal on the search path, retried on the indexing
/// path).
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// The underlying model name, for logging.
    fn model_name(&self) -> &str;
}

/// Bridges rig's `EmbeddingModel` trait to our `EmbeddingClient` trait.
pub struct RigEmbedder<M> {
    model: M,
    model_name: String,
}

impl<M> RigEmbedder<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> EmbeddingClient for RigEmbedder<M>
where
    M: rig::embeddings::EmbeddingModel + Send + Sync,
{
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embedding =
            self.model
                .embed_text(text)
                .await
                .map_err(|e| EmbeddingError::RequestFailed {
                    reason: format!("{}: {e}", self.model_name),
                })?;

        if embedding.vec.is_empty() {
            return Err(EmbeddingError::InvalidResponse {
                reason: format!("{} returned an empty vector", self.model_name),
            });
        }

        Ok(embedding.vec.into_iter().map(|v| v as f32).collect())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
