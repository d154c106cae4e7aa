//! Forecast handlers

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use shared::ExportFormat;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::{ForecastService, StudyService};
use crate::AppState;

/// `?days=` horizon; unparsable values fall back to the configured default
#[derive(Debug, Default, Deserialize)]
pub struct HorizonQuery {
    pub days: Option<String>,
}

impl HorizonQuery {
    pub fn requested(&self) -> Option<i64> {
        self.days.as_deref().and_then(|d| d.trim().parse().ok())
    }
}

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    #[serde(flatten)]
    pub horizon: HorizonQuery,
    #[serde(default)]
    pub format: ExportFormat,
}

/// Forecast every kit type of a study
pub async fn get_forecast(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(study_id): Path<Uuid>,
    Query(query): Query<ForecastQuery>,
) -> AppResult<Response> {
    current_user.0.require("inventory", "read")?;
    let study = StudyService::new(state.db.clone())
        .ensure_access(current_user.0.organization_id, study_id)
        .await?;

    let horizon_days = state.config.forecast.horizon(query.horizon.requested());
    let service = ForecastService::new(state.db.clone(), state.config.forecast.risk);
    let forecast = service.forecast(study.id, horizon_days).await?;

    match query.format {
        ExportFormat::Csv => {
            let csv = ForecastService::export_to_csv(&forecast.records)?;
            let protocol: String = study
                .protocol_number
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                .collect();
            let disposition = format!(
                "attachment; filename=\"forecast_{}_{}.csv\"",
                protocol, forecast.generated_on
            );
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                csv,
            )
                .into_response())
        }
        ExportFormat::Json => Ok(Json(forecast).into_response()),
    }
}
