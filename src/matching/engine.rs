//! Role matching engine — embed, search, filter, rank.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::ai::{EmbeddingClient, RoleMatch, SemanticSearchClient};
use crate::error::{Result, ValidationError};
use crate::onboarding::model::Role;
use crate::store::RoleStore;

use super::indexer::{IndexJob, RoleIndexer};

/// Matches below this relevance score are noise, not genuine candidates.
pub const MIN_RELEVANCE: f32 = 0.70;

/// Attempts for the embedding call before its failure is surfaced.
const EMBED_ATTEMPTS: u32 = 3;

/// Base backoff between embedding attempts, doubled each time.
const EMBED_BACKOFF: Duration = Duration::from_millis(200);

/// A role matching query.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub job_title: String,
    pub job_description: String,
    pub industry_id: Option<Uuid>,
    pub limit: usize,
}

/// Converts a free-text job description into ranked candidate roles, or
/// registers a brand-new role when nothing fits.
pub struct RoleMatchingEngine {
    embedder: Arc<dyn EmbeddingClient>,
    search: Arc<dyn SemanticSearchClient>,
    roles: Arc<dyn RoleStore>,
    indexer: RoleIndexer,
}

impl RoleMatchingEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        search: Arc<dyn SemanticSearchClient>,
        roles: Arc<dyn RoleStore>,
        indexer: RoleIndexer,
    ) -> Self {
        Self {
            embedder,
            search,
            roles,
            indexer,
        }
    }

    /// Rank candidate roles for a job description.
    ///
    /// Over-fetches `limit * 2` raw neighbors so the score filter still
    /// leaves enough candidates, drops everything under `MIN_RELEVANCE`,
    /// sorts descending, and truncates. An empty result is a valid outcome
    /// meaning "create a custom role".
    pub async fn match_roles(&self, request: &MatchRequest) -> Result<Vec<RoleMatch>> {
        if request.limit == 0 {
            return Ok(Vec::new());
        }

        let text = format!("{}\n{}", request.job_title, request.job_description);
        let vector = self.embed_with_retry(&text).await?;

        let raw = self
            .search
            .search(&vector, request.industry_id, request.limit * 2)
            .await?;

        let mut matches: Vec<RoleMatch> = raw
            .into_iter()
            .filter(|m| m.score >= MIN_RELEVANCE)
            .collect();
        // Stable sort, so equal scores keep the search service's return order.
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(request.limit);

        tracing::debug!(
            candidates = matches.len(),
            limit = request.limit,
            "Role matching complete"
        );
        Ok(matches)
    }

    /// Persist a user-created role and schedule it for indexing.
    ///
    /// The role is selectable as soon as this returns; indexing runs in the
    /// background with its own retries and never fails this call.
    pub async fn create_custom_role(
        &self,
        created_by: &str,
        title: &str,
        description: &str,
        industry_id: Uuid,
    ) -> Result<Role> {
        if title.trim().is_empty() {
            return Err(ValidationError::EmptyRoleTitle.into());
        }

        let role = Role::new_custom(created_by, title.trim(), description.trim(), industry_id);
        self.roles.insert_role(&role).await?;

        self.indexer.enqueue(IndexJob {
            role_id: role.id,
            industry_id,
            text: role.embedding_text(),
        });

        tracing::info!(role_id = %role.id, created_by, "Custom role created");
        Ok(role)
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>> {
        let mut last_err = None;
        for attempt in 1..=EMBED_ATTEMPTS {
            match self.embedder.embed(text).await {
                Ok(vector) => return Ok(vector),
                Err(e) => {
                    tracing::warn!(attempt, "Embedding attempt failed: {e}");
                    last_err = Some(e);
                    if attempt < EMBED_ATTEMPTS {
                        tokio::time::sleep(EMBED_BACKOFF * 2u32.pow(attempt - 1)).await;
                    }
                }
            }
        }
        // Loop ran at least once, so an error is present.
        Err(last_err
            .unwrap_or(crate::error::EmbeddingError::RequestFailed {
                reason: "no attempts made".to_string(),
            })
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::result::Result;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::{EmbeddingError, Error, IndexError, SearchError, StorageError};
    use crate::matching::indexer::IndexerConfig;

    struct StaticEmbedder;

    #[async_trait]
    impl EmbeddingClient for StaticEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, 0.0])
        }

        fn model_name(&self) -> &str {
            "static"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingClient for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::RequestFailed {
                reason: "service down".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    /// Returns canned matches; records the limit each query asked for.
    struct CannedSearch {
        matches: Vec<RoleMatch>,
        requested_limits: Mutex<Vec<usize>>,
        fail_upserts: bool,
        upsert_count: AtomicUsize,
    }

    impl CannedSearch {
        fn new(matches: Vec<RoleMatch>) -> Self {
            Self {
                matches,
                requested_limits: Mutex::new(Vec::new()),
                fail_upserts: false,
                upsert_count: AtomicUsize::new(0),
            }
        }

        fn failing_upserts() -> Self {
            Self {
                fail_upserts: true,
                ..Self::new(Vec::new())
            }
        }
    }

    #[async_trait]
    impl SemanticSearchClient for CannedSearch {
        async fn search(
            &self,
            _vector: &[f32],
            _industry_id: Option<Uuid>,
            limit: usize,
        ) -> Result<Vec<RoleMatch>, SearchError> {
            self.requested_limits.lock().unwrap().push(limit);
            Ok(self.matches.iter().take(limit).cloned().collect())
        }

        async fn upsert(
            &self,
            role_id: Uuid,
            _industry_id: Uuid,
            _vector: &[f32],
        ) -> Result<(), IndexError> {
            self.upsert_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_upserts {
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
        roles: Mutex<HashMap<Uuid, Role>>,
    }

    #[async_trait]
    impl RoleStore for MemoryRoleStore {
        async fn insert_role(&self, role: &Role) -> Result<(), StorageError> {
            self.roles.lock().unwrap().insert(role.id, role.clone());
            Ok(())
        }

        async fn get_role(&self, id: Uuid) -> Result<Option<Role>, StorageError> {
            Ok(self.roles.lock().unwrap().get(&id).cloned())
        }

        async fn set_role_embedding(&self, id: Uuid, vector: &[f32]) -> Result<(), StorageError> {
            if let Some(role) = self.roles.lock().unwrap().get_mut(&id) {
                role.embedding = Some(vector.to_vec());
            }
            Ok(())
        }
    }

    fn matched(score: f32) -> RoleMatch {
        RoleMatch {
            role_id: Uuid::new_v4(),
            score,
        }
    }

    fn engine_with(
        embedder: Arc<dyn EmbeddingClient>,
        search: Arc<CannedSearch>,
        roles: Arc<MemoryRoleStore>,
    ) -> (RoleMatchingEngine, tokio::task::JoinHandle<()>) {
        let config = IndexerConfig {
            queue_capacity: 8,
            max_attempts: 2,
            base_backoff: Duration::from_millis(1),
        };
        let (indexer, handle) =
            RoleIndexer::spawn(config, embedder.clone(), search.clone(), roles.clone());
        (
            RoleMatchingEngine::new(embedder, search, roles, indexer),
            handle,
        )
    }

    #[tokio::test]
    async fn filters_matches_below_threshold() {
        let search = Arc::new(CannedSearch::new(vec![matched(0.92), matched(0.5)]));
        let (engine, _handle) = engine_with(
            Arc::new(StaticEmbedder),
            search,
            Arc::new(MemoryRoleStore::default()),
        );

        let results = engine
            .match_roles(&MatchRequest {
                job_title: "Software Engineer".to_string(),
                job_description: "builds web apps".to_string(),
                industry_id: Some(Uuid::new_v4()),
                limit: 5,
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!((results[0].score - 0.92).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let search = Arc::new(CannedSearch::new(vec![matched(0.70), matched(0.69)]));
        let (engine, _handle) = engine_with(
            Arc::new(StaticEmbedder),
            search,
            Arc::new(MemoryRoleStore::default()),
        );

        let results = engine
            .match_roles(&MatchRequest {
                job_title: "Accountant".to_string(),
                job_description: String::new(),
                industry_id: None,
                limit: 5,
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!((results[0].score - MIN_RELEVANCE).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn sorts_descending_and_truncates_to_limit() {
        let search = Arc::new(CannedSearch::new(vec![
            matched(0.75),
            matched(0.95),
            matched(0.85),
            matched(0.80),
        ]));
        let (engine, _handle) = engine_with(
            Arc::new(StaticEmbedder),
            search,
            Arc::new(MemoryRoleStore::default()),
        );

        let results = engine
            .match_roles(&MatchRequest {
                job_title: "Manager".to_string(),
                job_description: "manages".to_string(),
                industry_id: None,
                limit: 2,
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!((results[0].score - 0.95).abs() < f32::EPSILON);
        assert!((results[1].score - 0.85).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn equal_scores_keep_service_order() {
        let first = matched(0.9);
        let second = matched(0.9);
        let search = Arc::new(CannedSearch::new(vec![first.clone(), second.clone()]));
        let (engine, _handle) = engine_with(
            Arc::new(StaticEmbedder),
            search,
            Arc::new(MemoryRoleStore::default()),
        );

        let results = engine
            .match_roles(&MatchRequest {
                job_title: "Designer".to_string(),
                job_description: String::new(),
                industry_id: None,
                limit: 5,
            })
            .await
            .unwrap();

        assert_eq!(results[0].role_id, first.role_id);
        assert_eq!(results[1].role_id, second.role_id);
    }

    #[tokio::test]
    async fn overfetches_double_the_limit() {
        let search = Arc::new(CannedSearch::new(Vec::new()));
        let (engine, _handle) = engine_with(
            Arc::new(StaticEmbedder),
            search.clone(),
            Arc::new(MemoryRoleStore::default()),
        );

        engine
            .match_roles(&MatchRequest {
                job_title: "Analyst".to_string(),
                job_description: String::new(),
                industry_id: None,
                limit: 5,
            })
            .await
            .unwrap();

        assert_eq!(*search.requested_limits.lock().unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn empty_result_is_not_an_error() {
        let search = Arc::new(CannedSearch::new(vec![matched(0.2)]));
        let (engine, _handle) = engine_with(
            Arc::new(StaticEmbedder),
            search,
            Arc::new(MemoryRoleStore::default()),
        );

        let results = engine
            .match_roles(&MatchRequest {
                job_title: "Astronaut".to_string(),
                job_description: String::new(),
                industry_id: None,
                limit: 5,
            })
            .await
            .unwrap();

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_is_fatal_for_matching() {
        let search = Arc::new(CannedSearch::new(vec![matched(0.9)]));
        let (engine, _handle) = engine_with(
            Arc::new(FailingEmbedder),
            search.clone(),
            Arc::new(MemoryRoleStore::default()),
        );

        let result = engine
            .match_roles(&MatchRequest {
                job_title: "Pilot".to_string(),
                job_description: String::new(),
                industry_id: None,
                limit: 5,
            })
            .await;

        assert!(matches!(result, Err(Error::Embedding(_))));
        // Search must never run without a query vector.
        assert!(search.requested_limits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn custom_role_survives_indexing_failure() {
        let search = Arc::new(CannedSearch::failing_upserts());
        let roles = Arc::new(MemoryRoleStore::default());
        let config = IndexerConfig {
            queue_capacity: 8,
            max_attempts: 2,
            base_backoff: Duration::from_millis(1),
        };
        let embedder: Arc<dyn EmbeddingClient> = Arc::new(StaticEmbedder);
        let (indexer, handle) =
            RoleIndexer::spawn(config, embedder.clone(), search.clone(), roles.clone());
        let engine = RoleMatchingEngine::new(embedder, search.clone(), roles.clone(), indexer);

        let role = engine
            .create_custom_role("user-7", "Sommelier", "Pairs wine", Uuid::new_v4())
            .await
            .unwrap();

        // Role is selectable immediately, before any indexing outcome.
        assert!(roles.get_role(role.id).await.unwrap().is_some());

        drop(engine);
        handle.await.unwrap();

        // Indexing was attempted and failed — the role must still exist.
        assert_eq!(search.upsert_count.load(Ordering::SeqCst), 2);
        assert!(roles.get_role(role.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn custom_role_rejects_empty_title() {
        let search = Arc::new(CannedSearch::new(Vec::new()));
        let (engine, _handle) = engine_with(
            Arc::new(StaticEmbedder),
            search,
            Arc::new(MemoryRoleStore::default()),
        );

        let result = engine
            .create_custom_role("user-7", "   ", "description", Uuid::new_v4())
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
