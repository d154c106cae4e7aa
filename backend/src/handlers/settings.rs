//! HTTP handlers for inventory policy settings

use axum::{
    extract::{Path, State},
    Json,
};
use shared::{InventorySettings, SettingsHistoryEntry, SettingsPatch};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::settings::{KitTypeSettingsView, StudySettingsView};
use crate::services::{SettingsService, StudyService};
use crate::AppState;

/// Study-wide defaults
pub async fn get_study_settings(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(study_id): Path<Uuid>,
) -> AppResult<Json<StudySettingsView>> {
    current_user.0.require("inventory", "read")?;
    StudyService::new(state.db.clone())
        .ensure_access(current_user.0.organization_id, study_id)
        .await?;

    let settings = SettingsService::new(state.db).get_study_settings(study_id).await?;
    Ok(Json(settings))
}

/// Patch the study-wide defaults; out-of-range values are clamped
pub async fn update_study_settings(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(study_id): Path<Uuid>,
    Json(patch): Json<SettingsPatch>,
) -> AppResult<Json<StudySettingsView>> {
    current_user.0.require("inventory", "write")?;
    StudyService::new(state.db.clone())
        .ensure_access(current_user.0.organization_id, study_id)
        .await?;

    let settings = SettingsService::new(state.db)
        .update_study_settings(study_id, current_user.0.user_id, patch)
        .await?;
    Ok(Json(settings))
}

/// Effective settings of every kit type
pub async fn list_kit_type_settings(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(study_id): Path<Uuid>,
) -> AppResult<Json<Vec<KitTypeSettingsView>>> {
    current_user.0.require("inventory", "read")?;
    StudyService::new(state.db.clone())
        .ensure_access(current_user.0.organization_id, study_id)
        .await?;

    let settings = SettingsService::new(state.db)
        .list_kit_type_settings(study_id)
        .await?;
    Ok(Json(settings))
}

/// Patch a kit type's override, creating it on first save
pub async fn update_kit_type_settings(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((study_id, kit_type_id)): Path<(Uuid, Uuid)>,
    Json(patch): Json<SettingsPatch>,
) -> AppResult<Json<InventorySettings>> {
    current_user.0.require("inventory", "write")?;
    let studies = StudyService::new(state.db.clone());
    studies
        .ensure_access(current_user.0.organization_id, study_id)
        .await?;
    studies.ensure_kit_type(study_id, kit_type_id).await?;

    let settings = SettingsService::new(state.db)
        .update_kit_type_settings(study_id, kit_type_id, current_user.0.user_id, patch)
        .await?;
    Ok(Json(settings))
}

/// Settings change log
pub async fn get_settings_history(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(study_id): Path<Uuid>,
) -> AppResult<Json<Vec<SettingsHistoryEntry>>> {
    current_user.0.require("inventory", "read")?;
    StudyService::new(state.db.clone())
        .ensure_access(current_user.0.organization_id, study_id)
        .await?;

    let history = SettingsService::new(state.db).history(study_id).await?;
    Ok(Json(history))
}
