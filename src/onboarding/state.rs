//! Onboarding phase machinery — which step a user is on and what comes next.

use serde::{Deserialize, Serialize};

/// The phases of the onboarding flow.
///
/// Progresses linearly: NotStarted → LanguageSelected → IndustrySelected →
/// RoleSelected → PartnersSelected → Completed. The phase is never stored as
/// the source of truth — it is derived from which profile fields are
/// populated, so a partially-written profile still reports a consistent
/// phase after a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingPhase {
    NotStarted,
    LanguageSelected,
    IndustrySelected,
    RoleSelected,
    PartnersSelected,
    Completed,
}

impl OnboardingPhase {
    /// Whether this phase is terminal (onboarding is done).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// The step the user must take next, if any.
    pub fn next_step(&self) -> Option<OnboardingStep> {
        use OnboardingPhase::*;
        match self {
            NotStarted => Some(OnboardingStep::SelectLanguage),
            LanguageSelected => Some(OnboardingStep::SelectIndustry),
            IndustrySelected => Some(OnboardingStep::SelectRole),
            RoleSelected => Some(OnboardingStep::SelectPartners),
            PartnersSelected => Some(OnboardingStep::CompleteOnboarding),
            Completed => None,
        }
    }
}

impl Default for OnboardingPhase {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl std::fmt::Display for OnboardingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::LanguageSelected => "language_selected",
            Self::IndustrySelected => "industry_selected",
            Self::RoleSelected => "role_selected",
            Self::PartnersSelected => "partners_selected",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// A concrete action required to advance the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    SelectLanguage,
    SelectIndustry,
    SelectRole,
    SelectPartners,
    CompleteOnboarding,
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SelectLanguage => "select_language",
            Self::SelectIndustry => "select_industry",
            Self::SelectRole => "select_role",
            Self::SelectPartners => "select_partners",
            Self::CompleteOnboarding => "complete_onboarding",
        };
        write!(f, "{s}")
    }
}
