//! HTTP handlers for the reorder recommendation ledger

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::{KitRecommendation, RecommendationEvent, RecommendationStatus, RecomputeSummary};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::handlers::forecast::HorizonQuery;
use crate::middleware::CurrentUser;
use crate::services::recommendation::{next_order_deadline, ActInput, DismissInput};
use crate::services::{RecommendationService, StudyService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListRecommendationsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationListResponse {
    pub study_id: Uuid,
    pub open: usize,
    /// Earliest order-by date among open recommendations
    pub next_order_deadline: Option<NaiveDate>,
    pub recommendations: Vec<KitRecommendation>,
}

/// Act bodies are optional; an empty body acts on the recommended quantity
fn parse_act_input(body: &[u8]) -> AppResult<ActInput> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ActInput::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::Validation {
        field: "body".to_string(),
        message: format!("Invalid request body: {}", e),
    })
}

fn service(state: &AppState) -> RecommendationService {
    RecommendationService::new(state.db.clone(), state.config.forecast.risk)
}

/// Reconcile the study's open recommendations against a fresh forecast
pub async fn recompute_recommendations(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(study_id): Path<Uuid>,
    Query(query): Query<HorizonQuery>,
) -> AppResult<Json<RecomputeSummary>> {
    current_user.0.require("inventory", "write")?;
    StudyService::new(state.db.clone())
        .ensure_access(current_user.0.organization_id, study_id)
        .await?;

    let horizon_days = state.config.forecast.horizon(query.requested());
    let summary = service(&state)
        .recompute(
            &state.recompute_locks,
            study_id,
            horizon_days,
            Some(current_user.0.user_id),
        )
        .await?;
    Ok(Json(summary))
}

/// List recommendations, optionally filtered by status
pub async fn list_recommendations(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(study_id): Path<Uuid>,
    Query(query): Query<ListRecommendationsQuery>,
) -> AppResult<Json<RecommendationListResponse>> {
    current_user.0.require("inventory", "read")?;
    StudyService::new(state.db.clone())
        .ensure_access(current_user.0.organization_id, study_id)
        .await?;

    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<RecommendationStatus>)
        .transpose()?;

    let recommendations = service(&state).list(study_id, status).await?;
    Ok(Json(RecommendationListResponse {
        study_id,
        open: recommendations.iter().filter(|r| r.status.is_open()).count(),
        next_order_deadline: next_order_deadline(&recommendations),
        recommendations,
    }))
}

/// Mark a recommendation as ordered
pub async fn act_on_recommendation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((study_id, recommendation_id)): Path<(Uuid, Uuid)>,
    body: Bytes,
) -> AppResult<Json<KitRecommendation>> {
    current_user.0.require("inventory", "write")?;
    let input = parse_act_input(&body)?;
    StudyService::new(state.db.clone())
        .ensure_access(current_user.0.organization_id, study_id)
        .await?;

    let recommendation = service(&state)
        .act(study_id, recommendation_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(recommendation))
}

/// Dismiss a recommendation with a reason
pub async fn dismiss_recommendation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((study_id, recommendation_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<DismissInput>,
) -> AppResult<Json<KitRecommendation>> {
    current_user.0.require("inventory", "write")?;
    StudyService::new(state.db.clone())
        .ensure_access(current_user.0.organization_id, study_id)
        .await?;

    let recommendation = service(&state)
        .dismiss(study_id, recommendation_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(recommendation))
}

/// History of one recommendation
pub async fn get_recommendation_history(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((study_id, recommendation_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Vec<RecommendationEvent>>> {
    current_user.0.require("inventory", "read")?;
    StudyService::new(state.db.clone())
        .ensure_access(current_user.0.organization_id, study_id)
        .await?;

    let events = service(&state)
        .history(study_id, recommendation_id)
        .await?;
    Ok(Json(events))
}
