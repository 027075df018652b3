//! Error types for the FluentPro onboarding core.

use uuid::Uuid;

/// Top-level error type for the onboarding service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Business rule violation: {0}")]
    BusinessRule(#[from] BusinessRuleError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Embedding service error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Search service error: {0}")]
    Search(#[from] SearchError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Bad input from the caller. Non-retryable — the caller must supply
/// corrected input.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Unsupported native language: {code}")]
    UnsupportedLanguage { code: String },

    #[error("Unknown industry: {reference}")]
    UnknownIndustry { reference: String },

    #[error("Unknown role: {id}")]
    UnknownRole { id: Uuid },

    #[error("Communication partner selection must not be empty")]
    EmptyPartnerSelection,

    #[error("Unknown or inactive communication partner: {id}")]
    UnknownPartner { id: Uuid },

    #[error("Duplicate communication partner: {id}")]
    DuplicatePartner { id: Uuid },

    #[error("Role title must not be empty")]
    EmptyRoleTitle,
}

/// A referenced entity is absent.
#[derive(Debug, thiserror::Error)]
pub enum NotFoundError {
    #[error("Profile for user {user_id}")]
    Profile { user_id: String },

    #[error("Role {id}")]
    Role { id: Uuid },

    #[error("Industry {id}")]
    Industry { id: Uuid },
}

/// Valid input that violates a cross-field invariant.
#[derive(Debug, thiserror::Error)]
pub enum BusinessRuleError {
    #[error("Incomplete prerequisites: missing {missing}")]
    IncompletePrerequisites { missing: String },

    #[error("Cannot {operation} in phase {current}; requires at least {requires}")]
    StepNotReady {
        operation: String,
        current: String,
        requires: String,
    },
}

/// Profile store failures. Safe to retry — every phase write is idempotent.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Concurrent update conflict for user {user_id}")]
    Conflict { user_id: String },
}

impl StorageError {
    /// Whether a bounded retry at the call site is worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Query(_) | Self::Conflict { .. }
        )
    }
}

/// Embedding service failures. Fatal on the embed-then-search path —
/// no candidates can be produced without a query vector.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Invalid embedding response: {reason}")]
    InvalidResponse { reason: String },
}

/// Semantic search query failures.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Invalid search response: {reason}")]
    InvalidResponse { reason: String },
}

/// Search index write failures. Indexing is best-effort — a role exists and
/// is selectable before it is searchable.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Index upsert failed for role {role_id}: {reason}")]
    UpsertFailed { role_id: Uuid, reason: String },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for the onboarding core.
pub type Result<T> = std::result::Result<T, Error>;
