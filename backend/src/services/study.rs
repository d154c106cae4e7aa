//! Study lookup and organization scoping

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct StudyService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Study {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub protocol_number: String,
    pub name: String,
}

impl StudyService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Load a study the caller's organization owns.
    ///
    /// Studies of other organizations are reported as missing.
    pub async fn ensure_access(&self, organization_id: Uuid, study_id: Uuid) -> AppResult<Study> {
        sqlx::query_as::<_, Study>(
            r#"
            SELECT id, organization_id, protocol_number, name
            FROM studies
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(study_id)
        .bind(organization_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Study".to_string()))
    }

    /// Check a kit type is defined by the study
    pub async fn ensure_kit_type(&self, study_id: Uuid, kit_type_id: Uuid) -> AppResult<()> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM kit_types WHERE id = $1 AND study_id = $2)",
        )
        .bind(kit_type_id)
        .bind(study_id)
        .fetch_one(&self.db)
        .await?;

        if !exists {
            return Err(AppError::NotFound("Kit type".to_string()));
        }
        Ok(())
    }
}
