//! Onboarding data models — profile, catalog entities, and summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

use super::state::{OnboardingPhase, OnboardingStep};

/// Supported native languages. A closed enum — anything else is rejected at
/// the boundary with a `ValidationError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeLanguage {
    English,
    Cantonese,
    Mandarin,
    Spanish,
    French,
    German,
    Japanese,
    Korean,
}

impl std::str::FromStr for NativeLanguage {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "english" => Ok(Self::English),
            "cantonese" => Ok(Self::Cantonese),
            "mandarin" => Ok(Self::Mandarin),
            "spanish" => Ok(Self::Spanish),
            "french" => Ok(Self::French),
            "german" => Ok(Self::German),
            "japanese" => Ok(Self::Japanese),
            "korean" => Ok(Self::Korean),
            _ => Err(ValidationError::UnsupportedLanguage {
                code: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for NativeLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::English => "english",
            Self::Cantonese => "cantonese",
            Self::Mandarin => "mandarin",
            Self::Spanish => "spanish",
            Self::French => "french",
            Self::German => "german",
            Self::Japanese => "japanese",
            Self::Korean => "korean",
        };
        write!(f, "{s}")
    }
}

/// An industry from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Industry {
    pub id: Uuid,
    pub name: String,
}

/// A job role. System-seeded roles have `created_by = None`; user-created
/// custom roles carry the creating user's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub industry_id: Uuid,
    /// Nullable until generated by the async indexer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// Build a new user-created custom role. The embedding stays empty until
    /// the indexer fills it in.
    pub fn new_custom(
        created_by: &str,
        title: &str,
        description: &str,
        industry_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: description.to_string(),
            industry_id,
            embedding: None,
            created_by: Some(created_by.to_string()),
            created_at: Utc::now(),
        }
    }

    /// The text blob submitted to the embedding model for this role.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.title, self.description)
    }
}

/// A communication-context entity the user can select (e.g. "Clients").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
}

/// A selected partner with its 1-indexed priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerSelection {
    pub partner_id: Uuid,
    pub priority: u32,
}

/// A user's onboarding profile.
///
/// `version` increments on every write and backs the optimistic
/// compare-and-set that serializes concurrent per-user mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOnboardingProfile {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_language: Option<NativeLanguage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_role_id: Option<Uuid>,
    #[serde(default)]
    pub partners: Vec<PartnerSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserOnboardingProfile {
    /// A fresh profile for a newly registered user.
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            native_language: None,
            industry_id: None,
            selected_role_id: None,
            partners: Vec::new(),
            completed_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derive the current phase from populated fields.
    ///
    /// The stored phase column is never trusted on read; recomputing from the
    /// data itself keeps a crash between partial writes from reporting a
    /// phase the profile has not actually reached.
    pub fn phase(&self) -> OnboardingPhase {
        if self.completed_at.is_some() {
            OnboardingPhase::Completed
        } else if !self.partners.is_empty() {
            OnboardingPhase::PartnersSelected
        } else if self.selected_role_id.is_some() {
            OnboardingPhase::RoleSelected
        } else if self.industry_id.is_some() {
            OnboardingPhase::IndustrySelected
        } else if self.native_language.is_some() {
            OnboardingPhase::LanguageSelected
        } else {
            OnboardingPhase::NotStarted
        }
    }

    /// Names of the prerequisites still missing for completion.
    pub fn missing_prerequisites(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.native_language.is_none() {
            missing.push("native_language");
        }
        if self.industry_id.is_none() {
            missing.push("industry");
        }
        if self.selected_role_id.is_none() {
            missing.push("role");
        }
        if self.partners.is_empty() {
            missing.push("communication_partners");
        }
        missing
    }
}

/// Snapshot returned by `start_or_resume`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub current_phase: OnboardingPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_required_step: Option<OnboardingStep>,
    pub resume_token: String,
}

/// A selected partner resolved against the catalog, for the summary.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryPartner {
    pub id: Uuid,
    pub name: String,
    pub priority: u32,
}

/// Aggregate of all four selections plus the completion timestamp, returned
/// by `complete_onboarding`.
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingSummary {
    pub user_id: String,
    pub native_language: NativeLanguage,
    pub industry: Industry,
    pub role: Role,
    pub partners: Vec<SummaryPartner>,
    pub completed_at: DateTime<Utc>,
}
