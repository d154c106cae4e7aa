//! Forecast orchestration and export

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    build_forecast, ForecastInput, ForecastRecord, ForecastSummary, RiskPolicy, StudyForecast,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::{DemandService, InventoryService, SettingsService};

#[derive(Clone)]
pub struct ForecastService {
    db: PgPool,
    risk_policy: RiskPolicy,
}

/// Flat forecast line for CSV export
#[derive(Debug, Serialize)]
pub struct ForecastCsvRow {
    pub kit_type_id: Uuid,
    pub kit_type_name: String,
    pub status: &'static str,
    pub risk_level: &'static str,
    pub risk_score: Decimal,
    pub visits_scheduled: i32,
    pub kits_required: i32,
    pub optional_kits_required: i32,
    pub buffer_target: i32,
    pub required_with_buffer: i32,
    pub kits_available: i32,
    pub kits_expiring_soon: i32,
    pub pending_order_quantity: i32,
    pub original_deficit: i32,
    pub deficit: i32,
    pub recommended_order_qty: i32,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub risk_factors: String,
}

impl From<&ForecastRecord> for ForecastCsvRow {
    fn from(record: &ForecastRecord) -> Self {
        let risk_factors = record
            .risk_factors
            .iter()
            .map(|f| f.detail.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        Self {
            kit_type_id: record.kit_type_id,
            kit_type_name: record.kit_type_name.clone(),
            status: record.status.as_str(),
            risk_level: record.risk_level.as_str(),
            risk_score: record.risk_score,
            visits_scheduled: record.visits_scheduled,
            kits_required: record.kits_required,
            optional_kits_required: record.optional_kits_required,
            buffer_target: record.buffer_target,
            required_with_buffer: record.required_with_buffer,
            kits_available: record.kits_available,
            kits_expiring_soon: record.kits_expiring_soon,
            pending_order_quantity: record.pending_order_quantity,
            original_deficit: record.original_deficit,
            deficit: record.deficit,
            recommended_order_qty: record.recommended_order_qty,
            window_start: record.window_start,
            window_end: record.window_end,
            risk_factors,
        }
    }
}

impl ForecastService {
    pub fn new(db: PgPool, risk_policy: RiskPolicy) -> Self {
        Self { db, risk_policy }
    }

    /// Forecast a study as of the current UTC date
    pub async fn forecast(&self, study_id: Uuid, horizon_days: i32) -> AppResult<StudyForecast> {
        self.forecast_on(study_id, horizon_days, Utc::now().date_naive())
            .await
    }

    /// Forecast a study as of `today`.
    ///
    /// Settings, demand, stock and kit types are read concurrently; any read
    /// failure fails the whole forecast.
    pub async fn forecast_on(
        &self,
        study_id: Uuid,
        horizon_days: i32,
        today: NaiveDate,
    ) -> AppResult<StudyForecast> {
        let settings = SettingsService::new(self.db.clone());
        let demand = DemandService::new(self.db.clone());
        let inventory = InventoryService::new(self.db.clone());

        let (book, demand, stock, kit_types) = tokio::try_join!(
            settings.load_book(study_id),
            demand.project(study_id, today, horizon_days),
            inventory.state(study_id, today, horizon_days),
            inventory.kit_types(study_id),
        )?;

        let records = build_forecast(&ForecastInput {
            horizon_days,
            kit_types: &kit_types,
            demand: &demand,
            inventory: &stock,
            settings: &book,
            risk_policy: &self.risk_policy,
        });
        let summary = ForecastSummary::from_records(&records);

        tracing::debug!(
            %study_id,
            horizon_days,
            kit_types = summary.kit_types,
            critical = summary.critical,
            warning = summary.warning,
            "Forecast computed"
        );

        Ok(StudyForecast {
            study_id,
            horizon_days,
            generated_on: today,
            records,
            summary,
        })
    }

    /// Render forecast records as CSV
    pub fn export_to_csv(records: &[ForecastRecord]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in records {
            wtr.serialize(ForecastCsvRow::from(record))
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{
        forecast_kit_type, resolve_settings, InventorySettings, InventoryState, KitDemand,
        KitTypeInfo,
    };

    fn record() -> ForecastRecord {
        let kit_type = KitTypeInfo {
            id: Uuid::new_v4(),
            name: "Serum, tube".to_string(),
        };
        let demand = KitDemand {
            kit_type_id: kit_type.id,
            kits_required: 10,
            visits_scheduled: 10,
            ..Default::default()
        };
        let stock = InventoryState {
            kit_type_id: kit_type.id,
            kits_available: 4,
            ..Default::default()
        };
        let defaults = InventorySettings {
            min_on_hand: 2,
            ..Default::default()
        };
        forecast_kit_type(
            &kit_type,
            Some(&demand),
            Some(&stock),
            resolve_settings(Some(&defaults), None),
            30,
            &RiskPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn csv_has_header_and_one_line_per_record() {
        let csv = ForecastService::export_to_csv(&[record()]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("kit_type_id,kit_type_name,status,risk_level,risk_score"));
        assert!(lines[1].contains("\"Serum, tube\""));
        assert!(lines[1].contains(",critical,"));
    }

    #[test]
    fn empty_forecast_exports_empty_document() {
        let csv = ForecastService::export_to_csv(&[]).unwrap();
        assert!(csv.is_empty());
    }
}
