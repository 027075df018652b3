//! Configuration types — assembled from environment variables.

use std::path::PathBuf;

use crate::ai::{EmbeddingConfig, SearchConfig};
use crate::error::ConfigError;
use crate::matching::IndexerConfig;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the local database file.
    pub db_path: PathBuf,
    /// Port for the REST API.
    pub port: u16,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub indexer: IndexerConfig,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Required: `OPENAI_API_KEY`, `FLUENTPRO_SEARCH_ENDPOINT`,
    /// `FLUENTPRO_SEARCH_API_KEY`. Everything else has defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = std::env::var("FLUENTPRO_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/fluentpro.db"));

        let port = match std::env::var("FLUENTPRO_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "FLUENTPRO_PORT".to_string(),
                message: format!("not a valid port: {raw}"),
            })?,
            Err(_) => 8080,
        };

        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;
        let model = std::env::var("FLUENTPRO_EMBED_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());

        let search_endpoint = std::env::var("FLUENTPRO_SEARCH_ENDPOINT")
            .map_err(|_| ConfigError::MissingEnvVar("FLUENTPRO_SEARCH_ENDPOINT".to_string()))?;
        let search_api_key = std::env::var("FLUENTPRO_SEARCH_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("FLUENTPRO_SEARCH_API_KEY".to_string()))?;

        let mut indexer = IndexerConfig::default();
        if let Ok(raw) = std::env::var("FLUENTPRO_INDEX_MAX_ATTEMPTS") {
            indexer.max_attempts = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "FLUENTPRO_INDEX_MAX_ATTEMPTS".to_string(),
                message: format!("not a valid attempt count: {raw}"),
            })?;
        }

        Ok(Self {
            db_path,
            port,
            embedding: EmbeddingConfig {
                api_key: secrecy::SecretString::from(api_key),
                model,
            },
            search: SearchConfig {
                endpoint: search_endpoint,
                api_key: secrecy::SecretString::from(search_api_key),
            },
            indexer,
        })
    }
}
