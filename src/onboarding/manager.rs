//! OnboardingManager — drives users through the onboarding phases and
//! persists each transition durably before the next one is attempted.
//!
//! Per-user serialization uses optimistic versioning: every mutation is a
//! compare-and-set against the profile version, re-read and retried on
//! conflict. Cross-user operations need no coordination.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{
    BusinessRuleError, NotFoundError, Result, StorageError, ValidationError,
};
use crate::matching::RoleMatchingEngine;
use crate::store::{
    CasOutcome, IndustryCatalog, PartnerCatalog, ProfileChanges, ProfileStore, RoleStore,
};

use super::model::{
    NativeLanguage, OnboardingSummary, PartnerSelection, Role, SessionSnapshot, SummaryPartner,
    UserOnboardingProfile,
};
use super::state::OnboardingPhase;

/// CAS retries before a conflict is surfaced to the caller.
const MAX_CAS_ATTEMPTS: u32 = 4;

/// Bounded retries for transient storage failures on reads.
const STORAGE_ATTEMPTS: u32 = 3;
const STORAGE_BACKOFF: Duration = Duration::from_millis(100);

/// Coordinates the onboarding flow: phase gating, validation, and durable
/// profile writes.
pub struct OnboardingManager {
    profiles: Arc<dyn ProfileStore>,
    industries: Arc<dyn IndustryCatalog>,
    partners: Arc<dyn PartnerCatalog>,
    roles: Arc<dyn RoleStore>,
    engine: Arc<RoleMatchingEngine>,
}

impl OnboardingManager {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        industries: Arc<dyn IndustryCatalog>,
        partners: Arc<dyn PartnerCatalog>,
        roles: Arc<dyn RoleStore>,
        engine: Arc<RoleMatchingEngine>,
    ) -> Self {
        Self {
            profiles,
            industries,
            partners,
            roles,
            engine,
        }
    }

    /// Create an empty profile for a newly registered user. Idempotent.
    ///
    /// Registration itself lives outside this core; this is the hook it
    /// calls once a user identity exists.
    pub async fn register_profile(&self, user_id: &str) -> Result<UserOnboardingProfile> {
        let profile = self.profiles.create_profile(user_id).await?;
        tracing::info!(user_id, "Profile registered");
        Ok(profile)
    }

    /// Read the profile and report where the user is in the flow.
    ///
    /// The phase is recomputed from populated fields on every read, so a
    /// crash between partial writes cannot surface an inconsistent phase.
    pub async fn start_or_resume(&self, user_id: &str) -> Result<SessionSnapshot> {
        let profile = self.load_profile(user_id).await?;
        let phase = profile.phase();
        Ok(SessionSnapshot {
            current_phase: phase,
            next_required_step: phase.next_step(),
            resume_token: format!("{}.{}", profile.user_id, profile.version),
        })
    }

    /// Set the user's native language. Calling again with another valid code
    /// overwrites; the phase never regresses.
    pub async fn select_native_language(
        &self,
        user_id: &str,
        code: &str,
    ) -> Result<UserOnboardingProfile> {
        let language: NativeLanguage = code.parse()?;

        let profile = self
            .apply_with_cas(user_id, |_profile| {
                Ok(Some(ProfileChanges {
                    native_language: Some(language),
                    ..Default::default()
                }))
            })
            .await?;

        tracing::info!(user_id, language = %language, "Native language selected");
        Ok(profile)
    }

    /// Set the user's industry, resolving the reference by id first, then by
    /// name.
    pub async fn select_industry(
        &self,
        user_id: &str,
        reference: &str,
    ) -> Result<UserOnboardingProfile> {
        let by_id = match Uuid::parse_str(reference) {
            Ok(id) => self.industries.find_by_id(id).await?,
            Err(_) => None,
        };
        let industry = match by_id {
            Some(industry) => industry,
            None => self
                .industries
                .find_by_name(reference)
                .await?
                .ok_or_else(|| ValidationError::UnknownIndustry {
                    reference: reference.to_string(),
                })?,
        };

        let profile = self
            .apply_with_cas(user_id, |profile| {
                ensure_phase(profile, OnboardingPhase::LanguageSelected, "select industry")?;
                Ok(Some(ProfileChanges {
                    industry_id: Some(industry.id),
                    ..Default::default()
                }))
            })
            .await?;

        tracing::info!(user_id, industry = %industry.name, "Industry selected");
        Ok(profile)
    }

    /// Select an existing role from the catalog.
    pub async fn select_role(
        &self,
        user_id: &str,
        role_id: Uuid,
    ) -> Result<UserOnboardingProfile> {
        let role = self
            .roles
            .get_role(role_id)
            .await?
            .ok_or(ValidationError::UnknownRole { id: role_id })?;

        let profile = self
            .apply_with_cas(user_id, |profile| {
                ensure_phase(profile, OnboardingPhase::IndustrySelected, "select role")?;
                Ok(Some(ProfileChanges {
                    selected_role_id: Some(role.id),
                    ..Default::default()
                }))
            })
            .await?;

        tracing::info!(user_id, role = %role.title, "Role selected");
        Ok(profile)
    }

    /// Create a custom role for the user and select it.
    ///
    /// The role row is durable before this returns; embedding and indexing
    /// happen asynchronously and never block or fail the call.
    pub async fn create_custom_role(
        &self,
        user_id: &str,
        title: &str,
        description: &str,
        industry_id: Uuid,
    ) -> Result<(UserOnboardingProfile, Role)> {
        self.industries
            .find_by_id(industry_id)
            .await?
            .ok_or_else(|| ValidationError::UnknownIndustry {
                reference: industry_id.to_string(),
            })?;

        // Gate on phase before creating the row, so an out-of-order call
        // cannot leave an orphan role behind. Phases never regress, so the
        // check stays valid through the write below.
        let current = self.load_profile(user_id).await?;
        ensure_phase(&current, OnboardingPhase::IndustrySelected, "create custom role")?;

        let role = self
            .engine
            .create_custom_role(user_id, title, description, industry_id)
            .await?;

        let profile = self
            .apply_with_cas(user_id, |profile| {
                ensure_phase(profile, OnboardingPhase::IndustrySelected, "create custom role")?;
                Ok(Some(ProfileChanges {
                    selected_role_id: Some(role.id),
                    ..Default::default()
                }))
            })
            .await?;

        Ok((profile, role))
    }

    /// Replace the user's communication partner selection with `ordered_ids`,
    /// assigning priorities from list position (1-indexed). Never a merge.
    pub async fn select_communication_partners(
        &self,
        user_id: &str,
        ordered_ids: &[Uuid],
    ) -> Result<UserOnboardingProfile> {
        if ordered_ids.is_empty() {
            return Err(ValidationError::EmptyPartnerSelection.into());
        }

        let mut seen = HashSet::new();
        for &id in ordered_ids {
            if !seen.insert(id) {
                return Err(ValidationError::DuplicatePartner { id }.into());
            }
            if !self.partners.exists_and_active(id).await? {
                return Err(ValidationError::UnknownPartner { id }.into());
            }
        }

        let selections: Vec<PartnerSelection> = ordered_ids
            .iter()
            .enumerate()
            .map(|(i, &partner_id)| PartnerSelection {
                partner_id,
                priority: (i + 1) as u32,
            })
            .collect();

        let profile = self
            .apply_with_cas(user_id, |profile| {
                ensure_phase(profile, OnboardingPhase::RoleSelected, "select partners")?;
                Ok(Some(ProfileChanges {
                    partners: Some(selections.clone()),
                    ..Default::default()
                }))
            })
            .await?;

        tracing::info!(user_id, count = ordered_ids.len(), "Communication partners selected");
        Ok(profile)
    }

    /// Finish onboarding.
    ///
    /// The prerequisite check and the completion write are one CAS unit, so
    /// no concurrent writer can slip between them. Completing an
    /// already-completed profile returns the existing summary without
    /// touching `completed_at`.
    pub async fn complete_onboarding(&self, user_id: &str) -> Result<OnboardingSummary> {
        let current = self.load_profile(user_id).await?;
        if current.completed_at.is_some() {
            return self.build_summary(&current).await;
        }

        let completed_at = chrono::Utc::now();
        let updated = self
            .apply_with_cas(user_id, |profile| {
                if profile.completed_at.is_some() {
                    // A concurrent caller completed first; keep their timestamp.
                    return Ok(None);
                }
                let missing = profile.missing_prerequisites();
                if !missing.is_empty() {
                    return Err(BusinessRuleError::IncompletePrerequisites {
                        missing: missing.join(", "),
                    }
                    .into());
                }
                Ok(Some(ProfileChanges {
                    completed_at: Some(completed_at),
                    ..Default::default()
                }))
            })
            .await?;

        tracing::info!(user_id, "Onboarding completed");
        self.build_summary(&updated).await
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Read the profile, retrying transient storage failures.
    async fn load_profile(&self, user_id: &str) -> Result<UserOnboardingProfile> {
        let mut last_err = None;
        for attempt in 1..=STORAGE_ATTEMPTS {
            match self.profiles.get_profile(user_id).await {
                Ok(Some(profile)) => return Ok(profile),
                Ok(None) => {
                    return Err(NotFoundError::Profile {
                        user_id: user_id.to_string(),
                    }
                    .into());
                }
                Err(e) if e.is_retryable() && attempt < STORAGE_ATTEMPTS => {
                    tracing::warn!(user_id, attempt, "Profile read failed, retrying: {e}");
                    last_err = Some(e);
                    tokio::time::sleep(STORAGE_BACKOFF * 2u32.pow(attempt - 1)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or_else(|| StorageError::Query("profile read failed".to_string()))
            .into())
    }

    /// Read-validate-write loop with optimistic versioning.
    ///
    /// `build` sees the freshest profile on each attempt and returns the
    /// changes to apply, or `None` for "nothing to do". A version conflict
    /// re-reads and re-validates; after `MAX_CAS_ATTEMPTS` the conflict is
    /// surfaced as a retryable `StorageError`.
    async fn apply_with_cas<F>(&self, user_id: &str, build: F) -> Result<UserOnboardingProfile>
    where
        F: Fn(&UserOnboardingProfile) -> Result<Option<ProfileChanges>>,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let profile = self.load_profile(user_id).await?;
            let changes = match build(&profile)? {
                Some(changes) => changes,
                None => return Ok(profile),
            };

            match self
                .profiles
                .update_profile(user_id, profile.version, &changes)
                .await?
            {
                CasOutcome::Applied(updated) => return Ok(updated),
                CasOutcome::Conflict => {
                    tracing::debug!(user_id, attempt, "Profile write conflict, retrying");
                }
            }
        }

        Err(StorageError::Conflict {
            user_id: user_id.to_string(),
        }
        .into())
    }

    /// Aggregate the four selections plus the completion timestamp.
    async fn build_summary(&self, profile: &UserOnboardingProfile) -> Result<OnboardingSummary> {
        let native_language = profile
            .native_language
            .ok_or_else(|| missing_prerequisite("native_language"))?;
        let industry_id = profile
            .industry_id
            .ok_or_else(|| missing_prerequisite("industry"))?;
        let role_id = profile
            .selected_role_id
            .ok_or_else(|| missing_prerequisite("role"))?;
        let completed_at = profile
            .completed_at
            .ok_or_else(|| missing_prerequisite("completion timestamp"))?;

        let industry = self
            .industries
            .find_by_id(industry_id)
            .await?
            .ok_or(NotFoundError::Industry { id: industry_id })?;
        let role = self
            .roles
            .get_role(role_id)
            .await?
            .ok_or(NotFoundError::Role { id: role_id })?;

        let active = self.partners.list_active().await?;
        let partners = profile
            .partners
            .iter()
            .map(|sel| {
                let name = active
                    .iter()
                    .find(|p| p.id == sel.partner_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| sel.partner_id.to_string());
                SummaryPartner {
                    id: sel.partner_id,
                    name,
                    priority: sel.priority,
                }
            })
            .collect();

        Ok(OnboardingSummary {
            user_id: profile.user_id.clone(),
            native_language,
            industry,
            role,
            partners,
            completed_at,
        })
    }
}

/// Phase-entry precondition: the profile must have reached at least
/// `requires`.
fn ensure_phase(
    profile: &UserOnboardingProfile,
    requires: OnboardingPhase,
    operation: &str,
) -> Result<()> {
    let current = profile.phase();
    if current < requires {
        return Err(BusinessRuleError::StepNotReady {
            operation: operation.to_string(),
            current: current.to_string(),
            requires: requires.to_string(),
        }
        .into());
    }
    Ok(())
}

fn missing_prerequisite(name: &str) -> crate::error::Error {
    BusinessRuleError::IncompletePrerequisites {
        missing: name.to_string(),
    }
    .into()
}

// Note: OnboardingManager is exercised end-to-end in tests/onboarding_flow.rs
// against the in-memory libSQL backend with mock AI clients. The pure pieces
// (phase derivation, validation) are tested in the model and state modules.
