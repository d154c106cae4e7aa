//! Reorder recommendation ledger
//!
//! Recompute reconciles the open ledger against a fresh forecast; coordinators
//! then act on or dismiss what remains open. Every row change is written in the
//! same transaction as its history entry.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{
    draft_recommendations, plan_reconciliation, KitRecommendation, RecommendationAction,
    RecommendationDraft, RecommendationEvent, RecommendationStatus, RecomputeSummary,
    ReconcileAction, RiskPolicy,
};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::locks::StudyLocks;
use crate::services::{snapshot, ForecastService};

const RECOMMENDATION_COLUMNS: &str = r#"
    id, study_id, kit_type_id, reason_type, status, recommended_quantity, reason,
    window_start, window_end, latest_order_date, confidence, metadata, dismissed_reason,
    acted_at, dismissed_at, created_at, updated_at
"#;

#[derive(Clone)]
pub struct RecommendationService {
    db: PgPool,
    risk_policy: RiskPolicy,
}

/// Input for marking a recommendation as ordered
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ActInput {
    /// Quantity actually ordered when it differs from the recommendation
    #[validate(range(min = 1, max = 100000))]
    pub ordered_quantity: Option<i32>,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}

/// Input for dismissing a recommendation
#[derive(Debug, Deserialize, Validate)]
pub struct DismissInput {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

/// Outcome of applying a plan; rows claimed by a concurrent action are skipped
#[derive(Debug, Default, Clone, Copy, Serialize)]
struct AppliedCounts {
    created: usize,
    updated: usize,
    expired: usize,
    skipped: usize,
}

impl RecommendationService {
    pub fn new(db: PgPool, risk_policy: RiskPolicy) -> Self {
        Self { db, risk_policy }
    }

    /// Recompute the open recommendations of a study.
    ///
    /// All reads finish before the first write. A failed write stops the run;
    /// rows written before it stay committed and re-running converges.
    #[tracing::instrument(skip(self, locks))]
    pub async fn recompute(
        &self,
        locks: &StudyLocks,
        study_id: Uuid,
        horizon_days: i32,
        actor_id: Option<Uuid>,
    ) -> AppResult<RecomputeSummary> {
        let _guard = locks.acquire(study_id).await;
        let today = Utc::now().date_naive();

        let forecast = ForecastService::new(self.db.clone(), self.risk_policy);
        let (study_forecast, existing) = tokio::try_join!(
            forecast.forecast_on(study_id, horizon_days, today),
            self.open_recommendations(study_id),
        )?;

        let drafts = draft_recommendations(&study_forecast.records, today);
        let plan = plan_reconciliation(drafts, &existing);
        tracing::debug!(
            create = plan.created(),
            update = plan.updated(),
            expire = plan.expired(),
            unchanged = plan.unchanged,
            "Reconciliation planned"
        );

        let counts = self.apply_plan(study_id, plan.actions, actor_id).await?;
        let recommendations = self.list(study_id, None).await?;

        tracing::info!(
            %study_id,
            horizon_days,
            created = counts.created,
            updated = counts.updated,
            expired = counts.expired,
            skipped = counts.skipped,
            "Recommendations recomputed"
        );

        Ok(RecomputeSummary {
            study_id,
            horizon_days,
            created: counts.created,
            updated: counts.updated,
            expired: counts.expired,
            recommendations,
        })
    }

    async fn apply_plan(
        &self,
        study_id: Uuid,
        actions: Vec<ReconcileAction>,
        actor_id: Option<Uuid>,
    ) -> AppResult<AppliedCounts> {
        let mut counts = AppliedCounts::default();

        for action in actions {
            match action {
                ReconcileAction::Create(draft) => {
                    self.create(study_id, &draft, actor_id).await?;
                    counts.created += 1;
                }
                ReconcileAction::Update { existing, draft } => {
                    if self.update(&existing, &draft, actor_id).await? {
                        counts.updated += 1;
                    } else {
                        counts.skipped += 1;
                    }
                }
                ReconcileAction::Expire { existing, reason } => {
                    if self.expire(&existing, &reason, actor_id).await? {
                        counts.expired += 1;
                    } else {
                        counts.skipped += 1;
                    }
                }
            }
        }

        Ok(counts)
    }

    async fn create(
        &self,
        study_id: Uuid,
        draft: &RecommendationDraft,
        actor_id: Option<Uuid>,
    ) -> AppResult<KitRecommendation> {
        let mut tx = self.db.begin().await?;

        let created = sqlx::query_as::<_, KitRecommendation>(&format!(
            r#"
            INSERT INTO lab_kit_recommendations (
                study_id, kit_type_id, reason_type, status, recommended_quantity, reason,
                window_start, window_end, latest_order_date, confidence, metadata
            )
            VALUES ($1, $2, $3, 'new', $4, $5, $6, $7, $8, $9, $10)
            RETURNING {RECOMMENDATION_COLUMNS}
            "#
        ))
        .bind(study_id)
        .bind(draft.kit_type_id)
        .bind(draft.reason_type)
        .bind(draft.recommended_quantity)
        .bind(&draft.reason)
        .bind(draft.window_start)
        .bind(draft.window_end)
        .bind(draft.latest_order_date)
        .bind(draft.confidence)
        .bind(&draft.metadata)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::from_write(e, "Recommendation"))?;

        record_event(&mut tx, &created, RecommendationAction::Create, None, None, actor_id).await?;
        tx.commit().await?;

        Ok(created)
    }

    /// Returns false when the row left `new` since it was read
    async fn update(
        &self,
        existing: &KitRecommendation,
        draft: &RecommendationDraft,
        actor_id: Option<Uuid>,
    ) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query_as::<_, KitRecommendation>(&format!(
            r#"
            UPDATE lab_kit_recommendations
            SET recommended_quantity = $2, reason = $3, window_start = $4, window_end = $5,
                latest_order_date = $6, confidence = $7, metadata = $8, updated_at = NOW()
            WHERE id = $1 AND status = 'new'
            RETURNING {RECOMMENDATION_COLUMNS}
            "#
        ))
        .bind(existing.id)
        .bind(draft.recommended_quantity)
        .bind(&draft.reason)
        .bind(draft.window_start)
        .bind(draft.window_end)
        .bind(draft.latest_order_date)
        .bind(draft.confidence)
        .bind(&draft.metadata)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(updated) = updated else {
            tracing::warn!(
                recommendation_id = %existing.id,
                "Recommendation closed during recompute, update skipped"
            );
            return Ok(false);
        };

        record_event(
            &mut tx,
            &updated,
            RecommendationAction::Update,
            Some(existing),
            None,
            actor_id,
        )
        .await?;
        tx.commit().await?;

        Ok(true)
    }

    /// Returns false when the row left `new` since it was read
    async fn expire(
        &self,
        existing: &KitRecommendation,
        reason: &str,
        actor_id: Option<Uuid>,
    ) -> AppResult<bool> {
        existing.status.ensure_transition(RecommendationStatus::Expired)?;

        let mut tx = self.db.begin().await?;

        let expired = sqlx::query_as::<_, KitRecommendation>(&format!(
            r#"
            UPDATE lab_kit_recommendations
            SET status = 'expired', dismissed_reason = $2, dismissed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'new'
            RETURNING {RECOMMENDATION_COLUMNS}
            "#
        ))
        .bind(existing.id)
        .bind(reason)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(expired) = expired else {
            tracing::warn!(
                recommendation_id = %existing.id,
                "Recommendation closed during recompute, expiry skipped"
            );
            return Ok(false);
        };

        record_event(
            &mut tx,
            &expired,
            RecommendationAction::Expire,
            Some(existing),
            None,
            actor_id,
        )
        .await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn open_recommendations(&self, study_id: Uuid) -> AppResult<Vec<KitRecommendation>> {
        let rows = sqlx::query_as::<_, KitRecommendation>(&format!(
            r#"
            SELECT {RECOMMENDATION_COLUMNS}
            FROM lab_kit_recommendations
            WHERE study_id = $1 AND status = 'new'
            ORDER BY created_at, id
            "#
        ))
        .bind(study_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Recommendations of a study, optionally filtered by status, newest first
    pub async fn list(
        &self,
        study_id: Uuid,
        status: Option<RecommendationStatus>,
    ) -> AppResult<Vec<KitRecommendation>> {
        let rows = sqlx::query_as::<_, KitRecommendation>(&format!(
            r#"
            SELECT {RECOMMENDATION_COLUMNS}
            FROM lab_kit_recommendations
            WHERE study_id = $1 AND ($2::recommendation_status IS NULL OR status = $2)
            ORDER BY created_at DESC, id
            "#
        ))
        .bind(study_id)
        .bind(status)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    pub async fn get(
        &self,
        study_id: Uuid,
        recommendation_id: Uuid,
    ) -> AppResult<KitRecommendation> {
        sqlx::query_as::<_, KitRecommendation>(&format!(
            r#"
            SELECT {RECOMMENDATION_COLUMNS}
            FROM lab_kit_recommendations
            WHERE id = $1 AND study_id = $2
            "#
        ))
        .bind(recommendation_id)
        .bind(study_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Recommendation".to_string()))
    }

    async fn lock_for_transition(
        tx: &mut Transaction<'_, Postgres>,
        study_id: Uuid,
        recommendation_id: Uuid,
    ) -> AppResult<KitRecommendation> {
        sqlx::query_as::<_, KitRecommendation>(&format!(
            r#"
            SELECT {RECOMMENDATION_COLUMNS}
            FROM lab_kit_recommendations
            WHERE id = $1 AND study_id = $2
            FOR UPDATE
            "#
        ))
        .bind(recommendation_id)
        .bind(study_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Recommendation".to_string()))
    }

    /// Mark an open recommendation as ordered
    pub async fn act(
        &self,
        study_id: Uuid,
        recommendation_id: Uuid,
        actor_id: Uuid,
        input: ActInput,
    ) -> AppResult<KitRecommendation> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let existing = Self::lock_for_transition(&mut tx, study_id, recommendation_id).await?;
        existing.status.ensure_transition(RecommendationStatus::Acted)?;

        let acted = sqlx::query_as::<_, KitRecommendation>(&format!(
            r#"
            UPDATE lab_kit_recommendations
            SET status = 'acted', acted_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {RECOMMENDATION_COLUMNS}
            "#
        ))
        .bind(recommendation_id)
        .fetch_one(&mut *tx)
        .await?;

        let annotation = serde_json::json!({
            "ordered_quantity": input.ordered_quantity.unwrap_or(acted.recommended_quantity),
            "note": input.note,
        });
        record_event(
            &mut tx,
            &acted,
            RecommendationAction::Act,
            Some(&existing),
            Some(annotation),
            Some(actor_id),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(%study_id, %recommendation_id, %actor_id, "Recommendation acted on");
        Ok(acted)
    }

    /// Dismiss an open recommendation with a reason
    pub async fn dismiss(
        &self,
        study_id: Uuid,
        recommendation_id: Uuid,
        actor_id: Uuid,
        input: DismissInput,
    ) -> AppResult<KitRecommendation> {
        input.validate()?;
        let reason = input.reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation {
                field: "reason".to_string(),
                message: "A dismissal reason is required".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;
        let existing = Self::lock_for_transition(&mut tx, study_id, recommendation_id).await?;
        existing.status.ensure_transition(RecommendationStatus::Dismissed)?;

        let dismissed = sqlx::query_as::<_, KitRecommendation>(&format!(
            r#"
            UPDATE lab_kit_recommendations
            SET status = 'dismissed', dismissed_reason = $2,
                dismissed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {RECOMMENDATION_COLUMNS}
            "#
        ))
        .bind(recommendation_id)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        record_event(
            &mut tx,
            &dismissed,
            RecommendationAction::Dismiss,
            Some(&existing),
            None,
            Some(actor_id),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(%study_id, %recommendation_id, %actor_id, "Recommendation dismissed");
        Ok(dismissed)
    }

    /// History of one recommendation, oldest first
    pub async fn history(
        &self,
        study_id: Uuid,
        recommendation_id: Uuid,
    ) -> AppResult<Vec<RecommendationEvent>> {
        self.get(study_id, recommendation_id).await?;

        let events = sqlx::query_as::<_, RecommendationEvent>(
            r#"
            SELECT id, recommendation_id, study_id, action, previous, current, actor_id, created_at
            FROM lab_kit_recommendation_events
            WHERE recommendation_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(recommendation_id)
        .fetch_all(&self.db)
        .await?;

        Ok(events)
    }
}

/// Snapshot of a row for the history, with an optional annotation merged in
fn event_snapshot(rec: &KitRecommendation, annotation: Option<Value>) -> AppResult<Value> {
    let mut value = snapshot(rec)?;
    if let (Some(Value::Object(extra)), Value::Object(map)) = (annotation, &mut value) {
        map.insert("annotation".to_string(), Value::Object(extra));
    }
    Ok(value)
}

async fn record_event(
    tx: &mut Transaction<'_, Postgres>,
    current: &KitRecommendation,
    action: RecommendationAction,
    previous: Option<&KitRecommendation>,
    annotation: Option<Value>,
    actor_id: Option<Uuid>,
) -> AppResult<()> {
    let previous = previous.map(snapshot).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO lab_kit_recommendation_events (
            recommendation_id, study_id, action, previous, current, actor_id
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(current.id)
    .bind(current.study_id)
    .bind(action)
    .bind(previous)
    .bind(event_snapshot(current, annotation)?)
    .bind(actor_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Earliest latest-order date among open recommendations, for dashboards
pub fn next_order_deadline(recommendations: &[KitRecommendation]) -> Option<NaiveDate> {
    recommendations
        .iter()
        .filter(|r| r.status.is_open())
        .map(|r| r.latest_order_date)
        .min()
}
