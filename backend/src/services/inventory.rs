//! Lab kit stock, purchase orders and the expiry sweep

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use shared::{
    aggregate_inventory, InventoryState, KitOrder, KitTypeInfo, LabKitRecord, PendingOrderView,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;

/// Inventory service for kit stock and supply in flight
#[derive(Clone)]
pub struct InventoryService {
    db: PgPool,
}

/// Outcome of an expiry sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub study_id: Uuid,
    pub swept_on: NaiveDate,
    pub expired_kits: u64,
}

impl InventoryService {
    /// Create a new InventoryService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Active kit types of a study, by name
    pub async fn kit_types(&self, study_id: Uuid) -> AppResult<Vec<KitTypeInfo>> {
        let kit_types = sqlx::query_as::<_, KitTypeInfo>(
            r#"
            SELECT id, name
            FROM kit_types
            WHERE study_id = $1 AND is_active = TRUE
            ORDER BY name, id
            "#,
        )
        .bind(study_id)
        .fetch_all(&self.db)
        .await?;

        Ok(kit_types)
    }

    /// Kits in `available` status, expired or not; the aggregator drops the expired ones
    pub async fn available_kits(&self, study_id: Uuid) -> AppResult<Vec<LabKitRecord>> {
        let kits = sqlx::query_as::<_, LabKitRecord>(
            r#"
            SELECT id, kit_type_id, status, expiration_date
            FROM lab_kits
            WHERE study_id = $1 AND status = 'available'
            "#,
        )
        .bind(study_id)
        .fetch_all(&self.db)
        .await?;

        Ok(kits)
    }

    /// Orders still in flight
    pub async fn pending_orders(&self, study_id: Uuid) -> AppResult<Vec<KitOrder>> {
        let orders = sqlx::query_as::<_, KitOrder>(
            r#"
            SELECT id, kit_type_id, quantity, vendor, expected_arrival, status, created_at
            FROM lab_kit_orders
            WHERE study_id = $1 AND status = 'pending'
            ORDER BY expected_arrival NULLS LAST, created_at, id
            "#,
        )
        .bind(study_id)
        .fetch_all(&self.db)
        .await?;

        Ok(orders)
    }

    /// Per-kit-type supply as of `today`
    pub async fn state(
        &self,
        study_id: Uuid,
        today: NaiveDate,
        horizon_days: i32,
    ) -> AppResult<BTreeMap<Uuid, InventoryState>> {
        let (kits, orders) =
            tokio::try_join!(self.available_kits(study_id), self.pending_orders(study_id))?;
        Ok(aggregate_inventory(&kits, &orders, today, horizon_days))
    }

    /// Pending orders with overdue flags for the order tracking view
    pub async fn pending_order_views(
        &self,
        study_id: Uuid,
        today: NaiveDate,
    ) -> AppResult<Vec<PendingOrderView>> {
        let orders = self.pending_orders(study_id).await?;
        Ok(orders
            .iter()
            .map(|order| PendingOrderView::from_order(order, today))
            .collect())
    }

    /// Move available kits whose expiration date has passed to `expired`
    pub async fn sweep_expired_kits(&self, study_id: Uuid) -> AppResult<SweepResult> {
        let today = Utc::now().date_naive();

        let result = sqlx::query(
            r#"
            UPDATE lab_kits
            SET status = 'expired', updated_at = NOW()
            WHERE study_id = $1
              AND status = 'available'
              AND expiration_date IS NOT NULL
              AND expiration_date < $2
            "#,
        )
        .bind(study_id)
        .bind(today)
        .execute(&self.db)
        .await?;

        let expired_kits = result.rows_affected();
        if expired_kits > 0 {
            tracing::info!(%study_id, expired_kits, "Expired lab kits swept");
        }

        Ok(SweepResult {
            study_id,
            swept_on: today,
            expired_kits,
        })
    }
}
