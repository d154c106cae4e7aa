//! Inventory policy settings: study defaults, kit-type overrides and their history

use serde::Serialize;
use shared::{
    EffectiveSettings, InventorySettings, SettingsBook, SettingsHistoryEntry, SettingsPatch,
    SettingsScope,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::{snapshot, InventoryService};

#[derive(Clone)]
pub struct SettingsService {
    db: PgPool,
}

/// Study-wide defaults as returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct StudySettingsView {
    pub study_id: Uuid,
    /// False when the study has never saved defaults and zeros apply
    pub configured: bool,
    pub settings: InventorySettings,
}

/// Stored and effective policy of one kit type
#[derive(Debug, Clone, Serialize)]
pub struct KitTypeSettingsView {
    pub kit_type_id: Uuid,
    pub kit_type_name: String,
    pub has_override: bool,
    pub stored: Option<InventorySettings>,
    pub effective: EffectiveSettings,
}

#[derive(Debug, FromRow)]
struct OverrideRow {
    kit_type_id: Uuid,
    #[sqlx(flatten)]
    settings: InventorySettings,
}

impl SettingsService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// All policy rows of a study for one forecast run
    pub async fn load_book(&self, study_id: Uuid) -> AppResult<SettingsBook> {
        let defaults = self.study_defaults(study_id).await?;

        let overrides = sqlx::query_as::<_, OverrideRow>(
            r#"
            SELECT kit_type_id, min_on_hand, buffer_days, lead_time_days,
                   auto_order_enabled, buffer_kits
            FROM kit_type_settings
            WHERE study_id = $1
            "#,
        )
        .bind(study_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|row| (row.kit_type_id, row.settings))
        .collect();

        Ok(SettingsBook {
            defaults,
            overrides,
        })
    }

    async fn study_defaults(&self, study_id: Uuid) -> AppResult<Option<InventorySettings>> {
        let row = sqlx::query_as::<_, InventorySettings>(
            r#"
            SELECT min_on_hand, buffer_days, lead_time_days, auto_order_enabled, buffer_kits
            FROM inventory_forecast_settings
            WHERE study_id = $1
            "#,
        )
        .bind(study_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    pub async fn get_study_settings(&self, study_id: Uuid) -> AppResult<StudySettingsView> {
        let row = self.study_defaults(study_id).await?;
        Ok(StudySettingsView {
            study_id,
            configured: row.is_some(),
            settings: row.unwrap_or_default(),
        })
    }

    /// Apply a patch to the study defaults, creating the row on first save
    pub async fn update_study_settings(
        &self,
        study_id: Uuid,
        user_id: Uuid,
        patch: SettingsPatch,
    ) -> AppResult<StudySettingsView> {
        let mut tx = self.db.begin().await?;

        let previous = sqlx::query_as::<_, InventorySettings>(
            r#"
            SELECT min_on_hand, buffer_days, lead_time_days, auto_order_enabled, buffer_kits
            FROM inventory_forecast_settings
            WHERE study_id = $1
            FOR UPDATE
            "#,
        )
        .bind(study_id)
        .fetch_optional(&mut *tx)
        .await?;

        let next = patch.apply(&previous.unwrap_or_default());

        let saved = sqlx::query_as::<_, InventorySettings>(
            r#"
            INSERT INTO inventory_forecast_settings (
                study_id, min_on_hand, buffer_days, lead_time_days,
                auto_order_enabled, buffer_kits, updated_by, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (study_id) DO UPDATE SET
                min_on_hand = EXCLUDED.min_on_hand,
                buffer_days = EXCLUDED.buffer_days,
                lead_time_days = EXCLUDED.lead_time_days,
                auto_order_enabled = EXCLUDED.auto_order_enabled,
                buffer_kits = EXCLUDED.buffer_kits,
                updated_by = EXCLUDED.updated_by,
                updated_at = NOW()
            RETURNING min_on_hand, buffer_days, lead_time_days, auto_order_enabled, buffer_kits
            "#,
        )
        .bind(study_id)
        .bind(next.min_on_hand)
        .bind(next.buffer_days)
        .bind(next.lead_time_days)
        .bind(next.auto_order_enabled)
        .bind(next.buffer_kits)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        record_history(
            &mut tx,
            study_id,
            None,
            SettingsScope::Study,
            previous.as_ref(),
            &saved,
            user_id,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(%study_id, %user_id, "Study inventory settings updated");

        Ok(StudySettingsView {
            study_id,
            configured: true,
            settings: saved,
        })
    }

    /// Effective settings for every kit type of the study
    pub async fn list_kit_type_settings(
        &self,
        study_id: Uuid,
    ) -> AppResult<Vec<KitTypeSettingsView>> {
        let inventory = InventoryService::new(self.db.clone());
        let (book, kit_types) =
            tokio::try_join!(self.load_book(study_id), inventory.kit_types(study_id))?;

        Ok(kit_types
            .into_iter()
            .map(|kit_type| KitTypeSettingsView {
                has_override: book.has_override(kit_type.id),
                stored: book.overrides.get(&kit_type.id).copied(),
                effective: book.effective(kit_type.id),
                kit_type_id: kit_type.id,
                kit_type_name: kit_type.name,
            })
            .collect())
    }

    /// Apply a patch to a kit type's override.
    ///
    /// A kit type without an override starts from the study defaults, so
    /// omitted fields inherit what the kit type effectively used before.
    pub async fn update_kit_type_settings(
        &self,
        study_id: Uuid,
        kit_type_id: Uuid,
        user_id: Uuid,
        patch: SettingsPatch,
    ) -> AppResult<InventorySettings> {
        let defaults = self.study_defaults(study_id).await?;

        let mut tx = self.db.begin().await?;

        let previous = sqlx::query_as::<_, InventorySettings>(
            r#"
            SELECT min_on_hand, buffer_days, lead_time_days, auto_order_enabled, buffer_kits
            FROM kit_type_settings
            WHERE study_id = $1 AND kit_type_id = $2
            FOR UPDATE
            "#,
        )
        .bind(study_id)
        .bind(kit_type_id)
        .fetch_optional(&mut *tx)
        .await?;

        let base = previous.or(defaults).unwrap_or_default();
        let next = patch.apply(&base);

        let saved = sqlx::query_as::<_, InventorySettings>(
            r#"
            INSERT INTO kit_type_settings (
                study_id, kit_type_id, min_on_hand, buffer_days, lead_time_days,
                auto_order_enabled, buffer_kits, updated_by, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (study_id, kit_type_id) DO UPDATE SET
                min_on_hand = EXCLUDED.min_on_hand,
                buffer_days = EXCLUDED.buffer_days,
                lead_time_days = EXCLUDED.lead_time_days,
                auto_order_enabled = EXCLUDED.auto_order_enabled,
                buffer_kits = EXCLUDED.buffer_kits,
                updated_by = EXCLUDED.updated_by,
                updated_at = NOW()
            RETURNING min_on_hand, buffer_days, lead_time_days, auto_order_enabled, buffer_kits
            "#,
        )
        .bind(study_id)
        .bind(kit_type_id)
        .bind(next.min_on_hand)
        .bind(next.buffer_days)
        .bind(next.lead_time_days)
        .bind(next.auto_order_enabled)
        .bind(next.buffer_kits)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        record_history(
            &mut tx,
            study_id,
            Some(kit_type_id),
            SettingsScope::KitType,
            previous.as_ref(),
            &saved,
            user_id,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(%study_id, %kit_type_id, %user_id, "Kit type inventory settings updated");

        Ok(saved)
    }

    /// Settings changes of a study, newest first
    pub async fn history(&self, study_id: Uuid) -> AppResult<Vec<SettingsHistoryEntry>> {
        let entries = sqlx::query_as::<_, SettingsHistoryEntry>(
            r#"
            SELECT id, study_id, kit_type_id, scope, previous, current, changed_by, changed_at
            FROM inventory_settings_history
            WHERE study_id = $1
            ORDER BY changed_at DESC, id
            "#,
        )
        .bind(study_id)
        .fetch_all(&self.db)
        .await?;

        Ok(entries)
    }
}

async fn record_history(
    tx: &mut Transaction<'_, Postgres>,
    study_id: Uuid,
    kit_type_id: Option<Uuid>,
    scope: SettingsScope,
    previous: Option<&InventorySettings>,
    current: &InventorySettings,
    user_id: Uuid,
) -> AppResult<()> {
    let previous = previous.map(snapshot).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO inventory_settings_history (
            study_id, kit_type_id, scope, previous, current, changed_by
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(study_id)
    .bind(kit_type_id)
    .bind(scope)
    .bind(previous)
    .bind(snapshot(current)?)
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
