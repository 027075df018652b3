//! Best-effort role indexing — a bounded work queue decoupled from the
//! request/response cycle.
//!
//! A freshly created custom role must be selectable immediately; making it
//! searchable happens here, with its own retry policy. Jobs keep running
//! after the request that enqueued them has returned or been cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::ai::{EmbeddingClient, SemanticSearchClient};
use crate::error::Error;
use crate::store::RoleStore;

/// Retry policy for the index worker.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Queue capacity; jobs beyond this are dropped with a warning.
    pub queue_capacity: usize,
    /// Attempts per job before giving up.
    pub max_attempts: u32,
    /// Base backoff, doubled after each failed attempt.
    pub base_backoff: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
        }
    }
}

/// A pending indexing job for one role.
#[derive(Debug, Clone)]
pub struct IndexJob {
    pub role_id: Uuid,
    pub industry_id: Uuid,
    /// Text blob to embed (title + description).
    pub text: String,
}

/// Handle for enqueueing index jobs.
#[derive(Clone)]
pub struct RoleIndexer {
    tx: mpsc::Sender<IndexJob>,
}

impl RoleIndexer {
    /// Spawn the index worker and return its handle.
    ///
    /// The worker drains jobs until every `RoleIndexer` clone is dropped.
    pub fn spawn(
        config: IndexerConfig,
        embedder: Arc<dyn EmbeddingClient>,
        search: Arc<dyn SemanticSearchClient>,
        roles: Arc<dyn RoleStore>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<IndexJob>(config.queue_capacity);

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                index_role(&config, embedder.as_ref(), search.as_ref(), roles.as_ref(), job)
                    .await;
            }
        });

        (Self { tx }, handle)
    }

    /// Enqueue a job. Never blocks; a full or closed queue drops the job
    /// with a warning (the role stays selectable, just not searchable).
    pub fn enqueue(&self, job: IndexJob) {
        if let Err(e) = self.tx.try_send(job) {
            tracing::warn!("Dropping role index job: {e}");
        }
    }
}

/// Run one job to completion or exhaustion.
async fn index_role(
    config: &IndexerConfig,
    embedder: &dyn EmbeddingClient,
    search: &dyn SemanticSearchClient,
    roles: &dyn RoleStore,
    job: IndexJob,
) {
    for attempt in 1..=config.max_attempts {
        match try_index(embedder, search, roles, &job).await {
            Ok(()) => {
                tracing::debug!(role_id = %job.role_id, attempt, "Role indexed");
                return;
            }
            Err(e) => {
                tracing::warn!(
                    role_id = %job.role_id,
                    attempt,
                    "Role indexing attempt failed: {e}"
                );
                if attempt < config.max_attempts {
                    tokio::time::sleep(config.base_backoff * 2u32.pow(attempt - 1)).await;
                }
            }
        }
    }
    tracing::warn!(
        role_id = %job.role_id,
        "Giving up on role indexing; role remains selectable but not searchable"
    );
}

async fn try_index(
    embedder: &dyn EmbeddingClient,
    search: &dyn SemanticSearchClient,
    roles: &dyn RoleStore,
    job: &IndexJob,
) -> Result<(), Error> {
    let vector = embedder.embed(&job.text).await?;

    // Caching the vector on the role row is itself best-effort.
    if let Err(e) = roles.set_role_embedding(job.role_id, &vector).await {
        tracing::warn!(role_id = %job.role_id, "Failed to cache role embedding: {e}");
    }

    search.upsert(job.role_id, job.industry_id, &vector).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::ai::RoleMatch;
    use crate::error::{EmbeddingError, IndexError, SearchError, StorageError};
    use crate::onboarding::model::Role;

    struct StaticEmbedder;

    #[async_trait]
    impl EmbeddingClient for StaticEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.5, 0.5])
        }

        fn model_name(&self) -> &str {
            "static"
        }
    }

    /// Fails the first `fail_count` upserts, then succeeds.
    struct FlakySearch {
        attempts: AtomicU32,
        fail_count: u32,
    }

    #[async_trait]
    impl SemanticSearchClient for FlakySearch {
        async fn search(
            &self,
            _vector: &[f32],
            _industry_id: Option<Uuid>,
            _limit: usize,
        ) -> Result<Vec<RoleMatch>, SearchError> {
            Ok(Vec::new())
        }

        async fn upsert(
            &self,
            role_id: Uuid,
            _industry_id: Uuid,
            _vector: &[f32],
        ) -> Result<(), IndexError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_count {
                Err(IndexError::UpsertFailed {
                    role_id,
                    reason: "index unavailable".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct MemoryRoleStore {
        embeddings: Mutex<HashMap<Uuid, Vec<f32>>>,
    }

    #[async_trait]
    impl RoleStore for MemoryRoleStore {
        async fn insert_role(&self, _role: &Role) -> Result<(), StorageError> {
            Ok(())
        }

        async fn get_role(&self, _id: Uuid) -> Result<Option<Role>, StorageError> {
            Ok(None)
        }

        async fn set_role_embedding(&self, id: Uuid, vector: &[f32]) -> Result<(), StorageError> {
            self.embeddings.lock().unwrap().insert(id, vector.to_vec());
            Ok(())
        }
    }

    fn fast_config() -> IndexerConfig {
        IndexerConfig {
            queue_capacity: 8,
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_until_upsert_succeeds() {
        let search = Arc::new(FlakySearch {
            attempts: AtomicU32::new(0),
            fail_count: 2,
        });
        let roles = Arc::new(MemoryRoleStore::default());
        let (indexer, handle) = RoleIndexer::spawn(
            fast_config(),
            Arc::new(StaticEmbedder),
            search.clone(),
            roles.clone(),
        );

        let role_id = Uuid::new_v4();
        indexer.enqueue(IndexJob {
            role_id,
            industry_id: Uuid::new_v4(),
            text: "Nurse\nCares for patients".to_string(),
        });

        drop(indexer);
        handle.await.unwrap();

        assert_eq!(search.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(
            roles.embeddings.lock().unwrap().get(&role_id),
            Some(&vec![0.5, 0.5])
        );
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let search = Arc::new(FlakySearch {
            attempts: AtomicU32::new(0),
            fail_count: u32::MAX,
        });
        let (indexer, handle) = RoleIndexer::spawn(
            fast_config(),
            Arc::new(StaticEmbedder),
            search.clone(),
            Arc::new(MemoryRoleStore::default()),
        );

        indexer.enqueue(IndexJob {
            role_id: Uuid::new_v4(),
            industry_id: Uuid::new_v4(),
            text: "Chef\nCooks".to_string(),
        });

        drop(indexer);
        handle.await.unwrap();

        assert_eq!(search.attempts.load(Ordering::SeqCst), 3);
    }
}
