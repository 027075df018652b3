//! REST endpoints for the onboarding flow and role matching.
//!
//! Thin boundary only: handlers deserialize input, call the manager or
//! engine, and translate the error taxonomy to status codes.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::Error;
use crate::matching::{MatchRequest, RoleMatchingEngine};

use super::manager::OnboardingManager;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub manager: Arc<OnboardingManager>,
    pub engine: Arc<RoleMatchingEngine>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::BusinessRule(_) => (StatusCode::CONFLICT, "business_rule"),
            Error::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage"),
            Error::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding"),
            Error::Search(_) => (StatusCode::BAD_GATEWAY, "search"),
            Error::Index(_) => (StatusCode::BAD_GATEWAY, "index"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
        };
        let body = serde_json::json!({
            "error": kind,
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct SelectLanguageRequest {
    language: String,
}

#[derive(Deserialize)]
struct SelectIndustryRequest {
    /// Industry id or name; resolved by id first.
    industry: String,
}

#[derive(Deserialize)]
struct SelectRoleRequest {
    role_id: Uuid,
}

#[derive(Deserialize)]
struct CreateCustomRoleRequest {
    title: String,
    #[serde(default)]
    description: String,
    industry_id: Uuid,
}

#[derive(Deserialize)]
struct SelectPartnersRequest {
    partner_ids: Vec<Uuid>,
}

fn default_limit() -> usize {
    5
}

#[derive(Deserialize)]
struct MatchRolesRequest {
    job_title: String,
    #[serde(default)]
    job_description: String,
    #[serde(default)]
    industry_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    limit: usize,
}

/// POST /api/onboarding/{user_id}/register
async fn register(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let profile = state.manager.register_profile(&user_id).await?;
    Ok(Json(profile))
}

/// GET /api/onboarding/{user_id}/session
async fn get_session(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let snapshot = state.manager.start_or_resume(&user_id).await?;
    Ok(Json(snapshot))
}

/// POST /api/onboarding/{user_id}/language
async fn select_language(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
    Json(request): Json<SelectLanguageRequest>,
) -> Result<impl IntoResponse, Error> {
    let profile = state
        .manager
        .select_native_language(&user_id, &request.language)
        .await?;
    Ok(Json(profile))
}

/// POST /api/onboarding/{user_id}/industry
async fn select_industry(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
    Json(request): Json<SelectIndustryRequest>,
) -> Result<impl IntoResponse, Error> {
    let profile = state
        .manager
        .select_industry(&user_id, &request.industry)
        .await?;
    Ok(Json(profile))
}

/// POST /api/onboarding/{user_id}/role
async fn select_role(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
    Json(request): Json<SelectRoleRequest>,
) -> Result<impl IntoResponse, Error> {
    let profile = state.manager.select_role(&user_id, request.role_id).await?;
    Ok(Json(profile))
}

/// POST /api/onboarding/{user_id}/custom-role
async fn create_custom_role(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
    Json(request): Json<CreateCustomRoleRequest>,
) -> Result<impl IntoResponse, Error> {
    let (profile, role) = state
        .manager
        .create_custom_role(
            &user_id,
            &request.title,
            &request.description,
            request.industry_id,
        )
        .await?;
    Ok(Json(serde_json::json!({
        "profile": profile,
        "role": role,
    })))
}

/// POST /api/onboarding/{user_id}/partners
async fn select_partners(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
    Json(request): Json<SelectPartnersRequest>,
) -> Result<impl IntoResponse, Error> {
    let profile = state
        .manager
        .select_communication_partners(&user_id, &request.partner_ids)
        .await?;
    Ok(Json(profile))
}

/// POST /api/onboarding/{user_id}/complete
async fn complete_onboarding(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let summary = state.manager.complete_onboarding(&user_id).await?;
    Ok(Json(summary))
}

/// POST /api/roles/match
///
/// An empty match list is a valid result — the response says so explicitly
/// instead of surfacing an opaque failure.
async fn match_roles(
    State(state): State<OnboardingRouteState>,
    Json(request): Json<MatchRolesRequest>,
) -> Result<impl IntoResponse, Error> {
    let matches = state
        .engine
        .match_roles(&MatchRequest {
            job_title: request.job_title,
            job_description: request.job_description,
            industry_id: request.industry_id,
            limit: request.limit,
        })
        .await?;
    Ok(Json(serde_json::json!({
        "custom_role_suggested": matches.is_empty(),
        "matches": matches,
    })))
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding/{user_id}/register", post(register))
        .route("/api/onboarding/{user_id}/session", get(get_session))
        .route("/api/onboarding/{user_id}/language", post(select_language))
        .route("/api/onboarding/{user_id}/industry", post(select_industry))
        .route("/api/onboarding/{user_id}/role", post(select_role))
        .route(
            "/api/onboarding/{user_id}/custom-role",
            post(create_custom_role),
        )
        .route("/api/onboarding/{user_id}/partners", post(select_partners))
        .route(
            "/api/onboarding/{user_id}/complete",
            post(complete_onboarding),
        )
        .route("/api/roles/match", post(match_roles))
        .with_state(state)
}
