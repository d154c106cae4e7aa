//! Reorder recommendation ledger models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::DomainError;

/// Recommendation lifecycle: `new` is the only open state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "recommendation_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    New,
    Acted,
    Dismissed,
    Expired,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::New => "new",
            RecommendationStatus::Acted => "acted",
            RecommendationStatus::Dismissed => "dismissed",
            RecommendationStatus::Expired => "expired",
        }
    }

    pub fn is_open(&self) -> bool {
        *self == RecommendationStatus::New
    }

    /// Only `new` may move, and only to a terminal state
    pub fn can_transition_to(&self, next: RecommendationStatus) -> bool {
        self.is_open() && !next.is_open()
    }

    pub fn ensure_transition(&self, next: RecommendationStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

impl std::str::FromStr for RecommendationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(RecommendationStatus::New),
            "acted" => Ok(RecommendationStatus::Acted),
            "dismissed" => Ok(RecommendationStatus::Dismissed),
            "expired" => Ok(RecommendationStatus::Expired),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Why a recommendation exists; at most one open recommendation per kit type and reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "recommendation_reason", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationReason {
    /// Demand plus buffer is not covered by stock and pending orders
    Deficit,
    /// Expiring stock erodes the buffer even though demand is covered
    Buffer,
}

impl RecommendationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationReason::Deficit => "deficit",
            RecommendationReason::Buffer => "buffer",
        }
    }
}

/// Persisted recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct KitRecommendation {
    pub id: Uuid,
    pub study_id: Uuid,
    pub kit_type_id: Uuid,
    pub reason_type: RecommendationReason,
    pub status: RecommendationStatus,
    pub recommended_quantity: i32,
    pub reason: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub latest_order_date: NaiveDate,
    pub confidence: Decimal,
    pub metadata: Value,
    pub dismissed_reason: Option<String>,
    pub acted_at: Option<DateTime<Utc>>,
    pub dismissed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KitRecommendation {
    pub fn key(&self) -> (Uuid, RecommendationReason) {
        (self.kit_type_id, self.reason_type)
    }
}

/// Recommendation computed from a forecast, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationDraft {
    pub kit_type_id: Uuid,
    pub reason_type: RecommendationReason,
    pub recommended_quantity: i32,
    pub reason: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub latest_order_date: NaiveDate,
    pub confidence: Decimal,
    pub metadata: Value,
}

impl RecommendationDraft {
    pub fn key(&self) -> (Uuid, RecommendationReason) {
        (self.kit_type_id, self.reason_type)
    }

    /// Whether persisting this draft over `existing` would change anything
    pub fn differs_from(&self, existing: &KitRecommendation) -> bool {
        self.recommended_quantity != existing.recommended_quantity
            || self.reason != existing.reason
            || self.window_start != existing.window_start
            || self.window_end != existing.window_end
            || self.latest_order_date != existing.latest_order_date
            || self.confidence != existing.confidence
            || self.metadata != existing.metadata
    }
}

/// Kind of entry in the recommendation history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "recommendation_event_action", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationAction {
    Create,
    Update,
    Expire,
    Act,
    Dismiss,
}

/// Append-only history entry with before/after snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RecommendationEvent {
    pub id: Uuid,
    pub recommendation_id: Uuid,
    pub study_id: Uuid,
    pub action: RecommendationAction,
    pub previous: Option<Value>,
    pub current: Value,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a recompute run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecomputeSummary {
    pub study_id: Uuid,
    pub horizon_days: i32,
    pub created: usize,
    pub updated: usize,
    pub expired: usize,
    pub recommendations: Vec<KitRecommendation>,
}
