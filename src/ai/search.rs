//! Semantic search client — nearest-neighbor role lookup over a hosted
//! vector index.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IndexError, SearchError};

use super::SearchConfig;

/// A candidate role with its relevance score in [0, 1].
///
/// Ephemeral — never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleMatch {
    pub role_id: Uuid,
    pub score: f32,
}

/// Nearest-neighbor search over role embeddings, plus index writes.
///
/// The index is eventually consistent with the role catalog: a role can
/// exist before it is searchable.
#[async_trait]
pub trait SemanticSearchClient: Send + Sync {
    /// Query up to `limit` nearest neighbors, optionally constrained to one
    /// industry. Results come back in the service's own score order.
    async fn search(
        &self,
        vector: &[f32],
        industry_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<RoleMatch>, SearchError>;

    /// Insert or replace a role's vector in the index.
    async fn upsert(
        &self,
        role_id: Uuid,
        industry_id: Uuid,
        vector: &[f32],
    ) -> Result<(), IndexError>;
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    industry_id: Option<Uuid>,
}

#[derive(Deserialize)]
struct QueryResponse {
    results: Vec<RoleMatch>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    role_id: Uuid,
    industry_id: Uuid,
    vector: &'a [f32],
}

/// JSON REST client for the hosted search service.
pub struct HttpSearchClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
}

impl HttpSearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| SearchError::QueryFailed {
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl SemanticSearchClient for HttpSearchClient {
    async fn search(
        &self,
        vector: &[f32],
        industry_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<RoleMatch>, SearchError> {
        let url = format!("{}/indexes/roles/query", self.endpoint);
        let request = QueryRequest {
            vector,
            top: limit,
            industry_id,
        };

        let response = self
            .http
            .post(&url)
            .header("api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::QueryFailed {
                reason: format!("POST {url}: {e}"),
            })?
            .error_for_status()
            .map_err(|e| SearchError::QueryFailed {
                reason: format!("POST {url}: {e}"),
            })?;

        let body: QueryResponse =
            response
                .json()
                .await
                .map_err(|e| SearchError::InvalidResponse {
                    reason: format!("POST {url}: {e}"),
                })?;

        Ok(body.results)
    }

    async fn upsert(
        &self,
        role_id: Uuid,
        industry_id: Uuid,
        vector: &[f32],
    ) -> Result<(), IndexError> {
        let url = format!("{}/indexes/roles/docs", self.endpoint);
        let request = UpsertRequest {
            role_id,
            industry_id,
            vector,
        };

        self.http
            .put(&url)
            .header("api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| IndexError::UpsertFailed {
                role_id,
                reason: format!("PUT {url}: {e}"),
            })?
            .error_for_status()
            .map_err(|e| IndexError::UpsertFailed {
                role_id,
                reason: format!("PUT {url}: {e}"),
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_response_parses_service_payload() {
        let payload = r#"{
            "results": [
                {"role_id": "8c5a1f0e-2d5b-4a2a-9f6a-1c2d3e4f5a6b", "score": 0.92},
                {"role_id": "00000000-0000-0000-0000-000000000001", "score": 0.5}
            ]
        }"#;
        let parsed: QueryResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert!((parsed.results[0].score - 0.92).abs() < f32::EPSILON);
    }

    #[test]
    fn query_request_omits_absent_filter() {
        let request = QueryRequest {
            vector: &[0.1, 0.2],
            top: 10,
            industry_id: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("industry_id"));
    }
}
