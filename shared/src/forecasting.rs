//! Lab kit forecast engine
//!
//! Merges projected demand, current supply and buffer policy into one
//! [`ForecastRecord`] per kit type. Everything here is pure; callers gather the
//! inputs from storage.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    EffectiveSettings, ForecastRecord, ForecastStatus, InventoryState, KitDemand, KitTypeInfo,
    RiskFactor, RiskFactorType, RiskPolicy, SettingsBook,
};

/// Slack at or below this many kits is a warning, unless the buffer itself is smaller
pub const LOW_BUFFER_SLACK: i32 = 2;

/// Everything a forecast run needs, already loaded
#[derive(Debug, Clone)]
pub struct ForecastInput<'a> {
    pub horizon_days: i32,
    pub kit_types: &'a [KitTypeInfo],
    pub demand: &'a BTreeMap<Uuid, KitDemand>,
    pub inventory: &'a BTreeMap<Uuid, InventoryState>,
    pub settings: &'a SettingsBook,
    pub risk_policy: &'a RiskPolicy,
}

/// Time-based cushion blended with the configured floors
pub fn buffer_target(kits_required: i32, horizon_days: i32, settings: &EffectiveSettings) -> i32 {
    // ceil(kits_required / horizon * buffer_days) in integer arithmetic
    let numerator = i64::from(kits_required.max(0)) * i64::from(settings.buffer_days.max(0));
    let denominator = i64::from(horizon_days.max(1));
    let time_based =
        i32::try_from((numerator + denominator - 1) / denominator).unwrap_or(i32::MAX);

    time_based
        .max(settings.min_on_hand)
        .max(settings.study_buffer_kits)
        .max(settings.kit_type_buffer_kits)
        .max(0)
}

/// Classify supply for a kit type
pub fn classify_status(
    deficit: i32,
    kits_available: i32,
    required_with_buffer: i32,
    buffer_target: i32,
    kits_expiring_soon: i32,
) -> ForecastStatus {
    if deficit > 0 {
        return ForecastStatus::Critical;
    }
    let slack = kits_available.saturating_sub(required_with_buffer);
    if slack <= LOW_BUFFER_SLACK.min(buffer_target) || kits_expiring_soon > 0 {
        ForecastStatus::Warning
    } else {
        ForecastStatus::Ok
    }
}

/// Facts the risk factors are evaluated against
#[derive(Debug, Clone, Copy)]
pub struct RiskInputs {
    pub deficit: i32,
    pub required_with_buffer: i32,
    pub visits_scheduled: i32,
    pub recent_visits: i32,
    pub kits_available: i32,
    pub kits_expiring_soon: i32,
    pub pending_order_quantity: i32,
    pub overdue_order_quantity: i32,
}

/// Evaluate each risk factor independently and sum them into a capped score
pub fn assess_risk(inputs: &RiskInputs, policy: &RiskPolicy) -> (Decimal, Vec<RiskFactor>) {
    let one = Decimal::ONE;
    let half = Decimal::new(5, 1);
    let mut factors = Vec::new();

    if inputs.deficit > 0 {
        let ratio = ratio(inputs.deficit, inputs.required_with_buffer.max(1)).min(one);
        factors.push(RiskFactor {
            factor_type: RiskFactorType::Deficit,
            score: (policy.deficit * (half + half * ratio)).round_dp(2),
            detail: format!(
                "{} of {} kits needed are not covered by stock or pending orders",
                inputs.deficit, inputs.required_with_buffer
            ),
        });
    }

    if inputs.recent_visits > 0 {
        let pace = Decimal::from(inputs.recent_visits);
        let scheduled = Decimal::from(inputs.visits_scheduled);
        if scheduled > pace * policy.surge_ratio {
            let growth = (scheduled / pace - one).min(one);
            factors.push(RiskFactor {
                factor_type: RiskFactorType::DemandSurge,
                score: (policy.demand_surge * growth).round_dp(2),
                detail: format!(
                    "{} visits scheduled against {} completed in the previous window",
                    inputs.visits_scheduled, inputs.recent_visits
                ),
            });
        }
    }

    if inputs.kits_expiring_soon > 0 {
        let share = ratio(inputs.kits_expiring_soon, inputs.kits_available.max(1)).min(one);
        factors.push(RiskFactor {
            factor_type: RiskFactorType::ExpiringStock,
            score: (policy.expiring_stock * share).round_dp(2),
            detail: format!(
                "{} of {} available kits expire within the horizon",
                inputs.kits_expiring_soon, inputs.kits_available
            ),
        });
    }

    if inputs.overdue_order_quantity > 0 && inputs.pending_order_quantity > 0 {
        let share = ratio(inputs.overdue_order_quantity, inputs.pending_order_quantity).min(one);
        factors.push(RiskFactor {
            factor_type: RiskFactorType::OverdueOrders,
            score: (policy.overdue_orders * share).round_dp(2),
            detail: format!(
                "{} of {} kits on order are past their expected arrival",
                inputs.overdue_order_quantity, inputs.pending_order_quantity
            ),
        });
    }

    let total: Decimal = factors.iter().map(|f| f.score).sum();
    (total.min(Decimal::ONE_HUNDRED).round_dp(2), factors)
}

fn ratio(numerator: i32, denominator: i32) -> Decimal {
    Decimal::from(numerator) / Decimal::from(denominator)
}

/// Order size suggested for a kit type, zero when nothing needs ordering
pub fn recommended_order_quantity(
    status: ForecastStatus,
    deficit: i32,
    required_with_buffer: i32,
    kits_available: i32,
    kits_expiring_soon: i32,
    pending_order_quantity: i32,
) -> i32 {
    match status {
        ForecastStatus::Critical => deficit,
        ForecastStatus::Warning => {
            let eroded_supply = kits_available
                .saturating_sub(kits_expiring_soon)
                .saturating_add(pending_order_quantity);
            required_with_buffer.saturating_sub(eroded_supply).max(0)
        }
        ForecastStatus::Ok => 0,
    }
}

/// Forecast one kit type; `None` when there is nothing to track
pub fn forecast_kit_type(
    kit_type: &KitTypeInfo,
    demand: Option<&KitDemand>,
    inventory: Option<&InventoryState>,
    settings: EffectiveSettings,
    horizon_days: i32,
    risk_policy: &RiskPolicy,
) -> Option<ForecastRecord> {
    let horizon_days = horizon_days.max(1);
    let kits_required = demand.map_or(0, |d| d.kits_required);
    let target = buffer_target(kits_required, horizon_days, &settings);

    if kits_required == 0 && target == 0 {
        return None;
    }

    let kits_available = inventory.map_or(0, |i| i.kits_available);
    let kits_expiring_soon = inventory.map_or(0, |i| i.kits_expiring_soon);
    let pending_order_quantity = inventory.map_or(0, |i| i.pending_order_quantity);
    let overdue_order_quantity = inventory.map_or(0, |i| i.overdue_order_quantity);
    let visits_scheduled = demand.map_or(0, |d| d.visits_scheduled);
    let recent_visits = demand.map_or(0, |d| d.recent_visits);

    let required_with_buffer = kits_required.saturating_add(target);
    let original_deficit = required_with_buffer.saturating_sub(kits_available).max(0);
    let deficit = original_deficit.saturating_sub(pending_order_quantity).max(0);

    let status = classify_status(
        deficit,
        kits_available,
        required_with_buffer,
        target,
        kits_expiring_soon,
    );

    let (risk_score, risk_factors) = assess_risk(
        &RiskInputs {
            deficit,
            required_with_buffer,
            visits_scheduled,
            recent_visits,
            kits_available,
            kits_expiring_soon,
            pending_order_quantity,
            overdue_order_quantity,
        },
        risk_policy,
    );

    let recommended_order_qty = recommended_order_quantity(
        status,
        deficit,
        required_with_buffer,
        kits_available,
        kits_expiring_soon,
        pending_order_quantity,
    );

    Some(ForecastRecord {
        kit_type_id: kit_type.id,
        kit_type_name: kit_type.name.clone(),
        horizon_days,
        visits_scheduled,
        kits_required,
        optional_kits_required: demand.map_or(0, |d| d.optional_kits_required),
        buffer_target: target,
        required_with_buffer,
        kits_available,
        kits_expiring_soon,
        pending_order_quantity,
        overdue_order_quantity,
        original_deficit,
        deficit,
        status,
        risk_score,
        risk_level: risk_policy.level_for(risk_score),
        risk_factors,
        recommended_order_qty,
        recent_visits,
        window_start: demand.and_then(|d| d.earliest_visit),
        window_end: demand.and_then(|d| d.latest_visit),
        upcoming_visits: demand.map(|d| d.visits.clone()).unwrap_or_default(),
        pending_orders: inventory.map(|i| i.pending_orders.clone()).unwrap_or_default(),
        settings,
    })
}

/// Forecast every kit type known to the study, its demand or its inventory.
///
/// Records are ordered most urgent first: status, then risk score, then name.
pub fn build_forecast(input: &ForecastInput<'_>) -> Vec<ForecastRecord> {
    let mut names: BTreeMap<Uuid, &str> = input
        .kit_types
        .iter()
        .map(|k| (k.id, k.name.as_str()))
        .collect();

    let ids: BTreeSet<Uuid> = names
        .keys()
        .chain(input.demand.keys())
        .chain(input.inventory.keys())
        .chain(input.settings.overrides.keys())
        .copied()
        .collect();

    let mut records: Vec<ForecastRecord> = ids
        .into_iter()
        .filter_map(|id| {
            let name = names.remove(&id).map(str::to_string).unwrap_or_else(|| id.to_string());
            forecast_kit_type(
                &KitTypeInfo { id, name },
                input.demand.get(&id),
                input.inventory.get(&id),
                input.settings.effective(id),
                input.horizon_days,
                input.risk_policy,
            )
        })
        .collect();

    records.sort_by(|a, b| {
        b.status
            .cmp(&a.status)
            .then(b.risk_score.cmp(&a.risk_score))
            .then(a.kit_type_name.cmp(&b.kit_type_name))
    });
    records
}

/// Latest date an order can be placed and still arrive before the first visit
pub fn latest_order_date(
    earliest_demand: Option<NaiveDate>,
    lead_time_days: i32,
    today: NaiveDate,
) -> NaiveDate {
    let first_need = earliest_demand.unwrap_or(today);
    let by_lead_time = first_need - chrono::Duration::days(i64::from(lead_time_days.max(0)));
    by_lead_time.max(today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SettingsSource;

    fn settings(min_on_hand: i32, buffer_days: i32) -> EffectiveSettings {
        EffectiveSettings {
            min_on_hand,
            buffer_days,
            lead_time_days: 0,
            auto_order_enabled: false,
            study_buffer_kits: 0,
            kit_type_buffer_kits: 0,
            source: SettingsSource::StudyDefault,
        }
    }

    #[test]
    fn buffer_target_rounds_up() {
        // 10 kits over 30 days with a 7 day cushion: 2.33 -> 3
        assert_eq!(buffer_target(10, 30, &settings(0, 7)), 3);
        assert_eq!(buffer_target(30, 30, &settings(0, 7)), 7);
        assert_eq!(buffer_target(0, 30, &settings(0, 7)), 0);
    }

    #[test]
    fn buffer_target_respects_floors() {
        let mut s = settings(5, 7);
        assert_eq!(buffer_target(10, 30, &s), 5);
        s.study_buffer_kits = 6;
        assert_eq!(buffer_target(10, 30, &s), 6);
        s.kit_type_buffer_kits = 8;
        assert_eq!(buffer_target(10, 30, &s), 8);
    }

    #[test]
    fn buffer_target_saturates() {
        assert_eq!(buffer_target(20_000_000, 1, &settings(0, 180)), i32::MAX);
        assert_eq!(buffer_target(i32::MAX, 30, &settings(0, 180)), i32::MAX);
    }

    #[test]
    fn zero_horizon_is_guarded() {
        assert_eq!(buffer_target(10, 0, &settings(0, 1)), 10);
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(1, 0, 5, 3, 0), ForecastStatus::Critical);
        // slack 2 with buffer 3 -> warning
        assert_eq!(classify_status(0, 15, 13, 3, 0), ForecastStatus::Warning);
        // slack 3 -> ok
        assert_eq!(classify_status(0, 16, 13, 3, 0), ForecastStatus::Ok);
        // slack 1 with buffer 1 -> warning
        assert_eq!(classify_status(0, 12, 11, 1, 0), ForecastStatus::Warning);
        // expiring stock alone -> warning
        assert_eq!(classify_status(0, 40, 13, 3, 1), ForecastStatus::Warning);
    }

    #[test]
    fn risk_without_problems_is_zero() {
        let (score, factors) = assess_risk(
            &RiskInputs {
                deficit: 0,
                required_with_buffer: 10,
                visits_scheduled: 5,
                recent_visits: 5,
                kits_available: 20,
                kits_expiring_soon: 0,
                pending_order_quantity: 0,
                overdue_order_quantity: 0,
            },
            &RiskPolicy::default(),
        );
        assert_eq!(score, Decimal::ZERO);
        assert!(factors.is_empty());
    }

    #[test]
    fn full_deficit_scores_full_weight() {
        let (score, factors) = assess_risk(
            &RiskInputs {
                deficit: 13,
                required_with_buffer: 13,
                visits_scheduled: 10,
                recent_visits: 0,
                kits_available: 0,
                kits_expiring_soon: 0,
                pending_order_quantity: 0,
                overdue_order_quantity: 0,
            },
            &RiskPolicy::default(),
        );
        assert_eq!(score, Decimal::from(60));
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].factor_type, RiskFactorType::Deficit);
    }

    #[test]
    fn all_factors_cap_at_one_hundred() {
        let policy = RiskPolicy {
            deficit: Decimal::from(80),
            ..RiskPolicy::default()
        };
        let (score, factors) = assess_risk(
            &RiskInputs {
                deficit: 50,
                required_with_buffer: 50,
                visits_scheduled: 40,
                recent_visits: 10,
                kits_available: 2,
                kits_expiring_soon: 2,
                pending_order_quantity: 5,
                overdue_order_quantity: 5,
            },
            &policy,
        );
        assert_eq!(factors.len(), 4);
        assert_eq!(score, Decimal::ONE_HUNDRED);
    }

    #[test]
    fn surge_needs_history() {
        let inputs = RiskInputs {
            deficit: 0,
            required_with_buffer: 10,
            visits_scheduled: 30,
            recent_visits: 0,
            kits_available: 50,
            kits_expiring_soon: 0,
            pending_order_quantity: 0,
            overdue_order_quantity: 0,
        };
        let (_, factors) = assess_risk(&inputs, &RiskPolicy::default());
        assert!(factors.is_empty());

        let (score, factors) = assess_risk(
            &RiskInputs {
                recent_visits: 10,
                ..inputs
            },
            &RiskPolicy::default(),
        );
        assert_eq!(factors[0].factor_type, RiskFactorType::DemandSurge);
        assert_eq!(score, Decimal::from(15));
    }

    #[test]
    fn latest_order_date_never_in_the_past() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let visit = NaiveDate::from_ymd_opt(2025, 1, 20).unwrap();
        assert_eq!(
            latest_order_date(Some(visit), 5, today),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
        );
        assert_eq!(latest_order_date(Some(visit), 30, today), today);
        assert_eq!(latest_order_date(None, 3, today), today);
    }
}
