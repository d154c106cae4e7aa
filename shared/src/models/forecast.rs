//! Forecast records and risk policy

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DemandVisit, EffectiveSettings, PendingOrderView};

/// Supply status of a kit type over the horizon
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastStatus {
    Ok,
    Warning,
    Critical,
}

impl ForecastStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastStatus::Ok => "ok",
            ForecastStatus::Warning => "warning",
            ForecastStatus::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ForecastStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucketed risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactorType {
    Deficit,
    DemandSurge,
    ExpiringStock,
    OverdueOrders,
}

/// One contribution to a kit type's risk score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    #[serde(rename = "type")]
    pub factor_type: RiskFactorType,
    pub score: Decimal,
    pub detail: String,
}

/// Weights and thresholds of the risk score.
///
/// Scores are on a 0-100 scale; each weight is the most its factor can add.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    pub deficit: Decimal,
    pub demand_surge: Decimal,
    pub expiring_stock: Decimal,
    pub overdue_orders: Decimal,
    /// Scheduled visits above `recent pace × surge_ratio` count as a surge
    pub surge_ratio: Decimal,
    pub high_threshold: Decimal,
    pub medium_threshold: Decimal,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            deficit: Decimal::from(60),
            demand_surge: Decimal::from(15),
            expiring_stock: Decimal::from(15),
            overdue_orders: Decimal::from(10),
            surge_ratio: Decimal::new(15, 1),
            high_threshold: Decimal::from(50),
            medium_threshold: Decimal::from(20),
        }
    }
}

impl RiskPolicy {
    pub fn level_for(&self, score: Decimal) -> RiskLevel {
        if score >= self.high_threshold {
            RiskLevel::High
        } else if score >= self.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Forecast of one kit type for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub kit_type_id: Uuid,
    pub kit_type_name: String,
    pub horizon_days: i32,
    pub visits_scheduled: i32,
    pub kits_required: i32,
    pub optional_kits_required: i32,
    pub buffer_target: i32,
    pub required_with_buffer: i32,
    pub kits_available: i32,
    pub kits_expiring_soon: i32,
    pub pending_order_quantity: i32,
    pub overdue_order_quantity: i32,
    /// Shortfall ignoring orders already placed
    pub original_deficit: i32,
    /// Shortfall net of pending orders
    pub deficit: i32,
    pub status: ForecastStatus,
    pub risk_score: Decimal,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<RiskFactor>,
    pub recommended_order_qty: i32,
    pub recent_visits: i32,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub upcoming_visits: Vec<DemandVisit>,
    pub pending_orders: Vec<PendingOrderView>,
    pub settings: EffectiveSettings,
}

impl ForecastRecord {
    pub fn has_factor(&self, factor_type: RiskFactorType) -> bool {
        self.risk_factors.iter().any(|f| f.factor_type == factor_type)
    }
}

/// Forecast of every tracked kit type in a study
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyForecast {
    pub study_id: Uuid,
    pub horizon_days: i32,
    pub generated_on: NaiveDate,
    pub records: Vec<ForecastRecord>,
    pub summary: ForecastSummary,
}

/// Counts by status for dashboard headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub kit_types: usize,
    pub critical: usize,
    pub warning: usize,
    pub ok: usize,
    pub total_deficit: i32,
    pub total_recommended: i32,
}

impl ForecastSummary {
    pub fn from_records(records: &[ForecastRecord]) -> Self {
        records.iter().fold(
            Self {
                kit_types: records.len(),
                ..Default::default()
            },
            |mut acc, r| {
                match r.status {
                    ForecastStatus::Critical => acc.critical += 1,
                    ForecastStatus::Warning => acc.warning += 1,
                    ForecastStatus::Ok => acc.ok += 1,
                }
                acc.total_deficit += r.deficit;
                acc.total_recommended += r.recommended_order_qty;
                acc
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_levels_follow_thresholds() {
        let policy = RiskPolicy::default();
        assert_eq!(policy.level_for(Decimal::ZERO), RiskLevel::Low);
        assert_eq!(policy.level_for(Decimal::new(1999, 2)), RiskLevel::Low);
        assert_eq!(policy.level_for(Decimal::from(20)), RiskLevel::Medium);
        assert_eq!(policy.level_for(Decimal::from(50)), RiskLevel::High);
        assert_eq!(policy.level_for(Decimal::from(100)), RiskLevel::High);
    }

    #[test]
    fn status_ordering_ranks_critical_highest() {
        assert!(ForecastStatus::Critical > ForecastStatus::Warning);
        assert!(ForecastStatus::Warning > ForecastStatus::Ok);
        assert_eq!(ForecastStatus::Critical.to_string(), "critical");
    }
}
