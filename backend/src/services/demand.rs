//! Visit demand loading

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use shared::{project_demand, KitDemand, VisitKitUse};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;

#[derive(Clone)]
pub struct DemandService {
    db: PgPool,
}

impl DemandService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Scheduled and completed visits around `today` joined with their kit requirements.
    ///
    /// The lookback of one horizon length feeds the recent pace used for surge
    /// detection.
    pub async fn visit_kit_uses(
        &self,
        study_id: Uuid,
        today: NaiveDate,
        horizon_days: i32,
    ) -> AppResult<Vec<VisitKitUse>> {
        let span = Duration::days(i64::from(horizon_days));

        let rows = sqlx::query_as::<_, VisitKitUse>(
            r#"
            SELECT sv.id AS visit_id, sv.subject_id, vs.visit_name, sv.visit_date, sv.status,
                   vkr.kit_type_id, vkr.quantity, vkr.is_optional
            FROM subject_visits sv
            JOIN visit_schedules vs ON vs.id = sv.visit_schedule_id
            JOIN visit_kit_requirements vkr ON vkr.visit_schedule_id = vs.id
            WHERE sv.study_id = $1
              AND sv.status IN ('scheduled', 'completed')
              AND sv.visit_date BETWEEN $2 AND $3
            ORDER BY sv.visit_date, sv.id
            "#,
        )
        .bind(study_id)
        .bind(today - span)
        .bind(today + span)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Per-kit-type demand over `[today, today + horizon]`
    pub async fn project(
        &self,
        study_id: Uuid,
        today: NaiveDate,
        horizon_days: i32,
    ) -> AppResult<BTreeMap<Uuid, KitDemand>> {
        let rows = self.visit_kit_uses(study_id, today, horizon_days).await?;
        tracing::debug!(%study_id, rows = rows.len(), "Loaded visit kit requirements");
        Ok(project_demand(&rows, today, horizon_days))
    }
}
