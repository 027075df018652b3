//! Onboarding system — the phase-gated flow that collects a user's
//! language, industry, role, and communication partners.
//!
//! The flow is a linear state machine. Each phase's data is validated and
//! persisted durably before the next phase is attempted, and the current
//! phase is always derived from which fields are populated rather than
//! trusted from storage.

pub mod manager;
pub mod model;
pub mod routes;
pub mod state;

pub use manager::OnboardingManager;
pub use model::{
    Industry, NativeLanguage, OnboardingSummary, Partner, PartnerSelection, Role,
    SessionSnapshot, UserOnboardingProfile,
};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use state::{OnboardingPhase, OnboardingStep};
