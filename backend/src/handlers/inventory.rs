//! HTTP handlers for lab kit supply endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use shared::PendingOrderView;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::inventory::SweepResult;
use crate::services::{InventoryService, StudyService};
use crate::AppState;

/// Pending purchase orders with overdue flags
pub async fn list_pending_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(study_id): Path<Uuid>,
) -> AppResult<Json<Vec<PendingOrderView>>> {
    current_user.0.require("inventory", "read")?;
    StudyService::new(state.db.clone())
        .ensure_access(current_user.0.organization_id, study_id)
        .await?;

    let orders = InventoryService::new(state.db)
        .pending_order_views(study_id, Utc::now().date_naive())
        .await?;
    Ok(Json(orders))
}

/// Expire available kits past their expiration date
pub async fn sweep_expired_kits(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(study_id): Path<Uuid>,
) -> AppResult<Json<SweepResult>> {
    current_user.0.require("inventory", "write")?;
    StudyService::new(state.db.clone())
        .ensure_access(current_user.0.organization_id, study_id)
        .await?;

    let result = InventoryService::new(state.db)
        .sweep_expired_kits(study_id)
        .await?;
    Ok(Json(result))
}
