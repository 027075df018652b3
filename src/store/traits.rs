//! Async storage traits — the seams between the onboarding core and its
//! external collaborators.
//!
//! The profile store carries the per-user serialization contract: every write
//! is an optimistic compare-and-set against the profile version.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StorageError;
use crate::onboarding::model::{
    Industry, NativeLanguage, Partner, PartnerSelection, Role, UserOnboardingProfile,
};

/// A sparse profile write. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub native_language: Option<NativeLanguage>,
    pub industry_id: Option<Uuid>,
    pub selected_role_id: Option<Uuid>,
    /// Full replacement of the partner selection, never a merge.
    pub partners: Option<Vec<PartnerSelection>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Outcome of a compare-and-set profile write.
#[derive(Debug)]
pub enum CasOutcome {
    /// The write landed; the updated profile is returned.
    Applied(UserOnboardingProfile),
    /// Another writer got there first — re-read and retry.
    Conflict,
}

/// Persistence for user onboarding profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch a profile, or `None` if the user is unknown.
    async fn get_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<UserOnboardingProfile>, StorageError>;

    /// Create an empty profile for a newly registered user. Idempotent — an
    /// existing profile is returned unchanged.
    async fn create_profile(&self, user_id: &str) -> Result<UserOnboardingProfile, StorageError>;

    /// Apply `changes` if and only if the stored version still equals
    /// `expected_version`. The version increments on success.
    async fn update_profile(
        &self,
        user_id: &str,
        expected_version: i64,
        changes: &ProfileChanges,
    ) -> Result<CasOutcome, StorageError>;
}

/// Persistence for the role catalog.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn insert_role(&self, role: &Role) -> Result<(), StorageError>;

    async fn get_role(&self, id: Uuid) -> Result<Option<Role>, StorageError>;

    /// Cache a generated embedding on the role row.
    async fn set_role_embedding(&self, id: Uuid, vector: &[f32]) -> Result<(), StorageError>;
}

/// Read access to the industry catalog.
#[async_trait]
pub trait IndustryCatalog: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Industry>, StorageError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Industry>, StorageError>;
}

/// Read access to the communication partner catalog.
#[async_trait]
pub trait PartnerCatalog: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Partner>, StorageError>;

    async fn exists_and_active(&self, id: Uuid) -> Result<bool, StorageError>;
}
