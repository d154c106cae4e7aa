//! Inventory settings tests
//!
//! Covers what the settings endpoints persist and what the forecast applies:
//! - Lenient coercion of submitted values into their bounds
//! - Kit-type overrides layered over the study defaults
//! - Horizon clamping for forecast and recompute requests

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::{json, Value};
use shared::{
    buffer_target, clamp_horizon, resolve_settings, InventorySettings, SettingsBook,
    SettingsPatch, SettingsSource, BUFFER_DAYS_BOUNDS, BUFFER_KITS_BOUNDS,
    DEFAULT_HORIZON_DAYS, LEAD_TIME_DAYS_BOUNDS, MAX_HORIZON_DAYS, MIN_ON_HAND_BOUNDS,
};
use uuid::Uuid;

fn patch(body: Value) -> SettingsPatch {
    serde_json::from_value(body).expect("patch bodies always deserialize")
}

fn study_defaults() -> InventorySettings {
    InventorySettings {
        min_on_hand: 2,
        buffer_days: 7,
        lead_time_days: 5,
        auto_order_enabled: false,
        buffer_kits: 0,
    }
}

fn within_bounds(s: &InventorySettings) -> bool {
    (MIN_ON_HAND_BOUNDS.min..=MIN_ON_HAND_BOUNDS.max).contains(&s.min_on_hand)
        && (BUFFER_DAYS_BOUNDS.min..=BUFFER_DAYS_BOUNDS.max).contains(&s.buffer_days)
        && (LEAD_TIME_DAYS_BOUNDS.min..=LEAD_TIME_DAYS_BOUNDS.max).contains(&s.lead_time_days)
        && (BUFFER_KITS_BOUNDS.min..=BUFFER_KITS_BOUNDS.max).contains(&s.buffer_kits)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_out_of_range_values_clamp() {
        let stored = patch(json!({ "buffer_days": 500, "lead_time_days": -3 }))
            .apply(&study_defaults());

        assert_eq!(stored.buffer_days, 180);
        assert_eq!(stored.lead_time_days, 0);
        assert_eq!(stored.min_on_hand, 2);
    }

    #[test]
    fn test_strings_and_fractions_coerce() {
        let stored = patch(json!({
            "min_on_hand": "12",
            "buffer_days": 9.8,
            "auto_order_enabled": "true",
        }))
        .apply(&study_defaults());

        assert_eq!(stored.min_on_hand, 12);
        assert_eq!(stored.buffer_days, 9);
        assert!(stored.auto_order_enabled);
    }

    #[test]
    fn test_garbage_keeps_previous_values() {
        let stored = patch(json!({
            "min_on_hand": "lots",
            "buffer_days": null,
            "lead_time_days": [1, 2],
            "auto_order_enabled": "maybe",
        }))
        .apply(&study_defaults());

        assert_eq!(stored, study_defaults());
    }

    #[test]
    fn test_empty_patch_is_a_no_op() {
        assert_eq!(patch(json!({})).apply(&study_defaults()), study_defaults());
    }

    #[test]
    fn test_override_wins_over_defaults() {
        let kit_type_id = Uuid::new_v4();
        let override_row = InventorySettings {
            min_on_hand: 10,
            buffer_days: 14,
            lead_time_days: 21,
            auto_order_enabled: true,
            buffer_kits: 3,
        };
        let mut defaults = study_defaults();
        defaults.buffer_kits = 6;

        let book = SettingsBook {
            defaults: Some(defaults),
            overrides: BTreeMap::from([(kit_type_id, override_row)]),
        };

        let effective = book.effective(kit_type_id);
        assert_eq!(effective.source, SettingsSource::KitType);
        assert_eq!(effective.lead_time_days, 21);
        assert_eq!(effective.kit_type_buffer_kits, 3);
        assert_eq!(effective.study_buffer_kits, 6);
        // The study floor still holds under an override
        assert_eq!(buffer_target(0, 30, &effective), 10);

        let other = book.effective(Uuid::new_v4());
        assert_eq!(other.source, SettingsSource::StudyDefault);
        assert_eq!(other.lead_time_days, 5);
        assert!(!book.has_override(Uuid::new_v4()));
    }

    #[test]
    fn test_unconfigured_study_falls_back_to_zero() {
        let effective = resolve_settings(None, None);
        assert_eq!(effective.source, SettingsSource::Fallback);
        assert_eq!(effective.min_on_hand, 0);
        assert_eq!(effective.buffer_days, 0);
        assert!(!effective.auto_order_enabled);
    }

    #[test]
    fn test_horizon_clamping() {
        assert_eq!(clamp_horizon(None, DEFAULT_HORIZON_DAYS, MAX_HORIZON_DAYS), 30);
        assert_eq!(clamp_horizon(Some(0), DEFAULT_HORIZON_DAYS, MAX_HORIZON_DAYS), 1);
        assert_eq!(clamp_horizon(Some(-20), DEFAULT_HORIZON_DAYS, MAX_HORIZON_DAYS), 1);
        assert_eq!(clamp_horizon(Some(365), DEFAULT_HORIZON_DAYS, MAX_HORIZON_DAYS), 180);
        assert_eq!(clamp_horizon(Some(90), DEFAULT_HORIZON_DAYS, 60), 60);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn any_json() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            (-1.0e9f64..1.0e9).prop_map(|n| json!(n)),
            "[a-z0-9 .-]{0,8}".prop_map(Value::String),
            any::<i32>().prop_map(|n| Value::String(n.to_string())),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        /// Whatever is submitted, stored settings stay within their bounds
        #[test]
        fn prop_applied_settings_within_bounds(
            min_on_hand in any_json(),
            buffer_days in any_json(),
            lead_time_days in any_json(),
            auto_order_enabled in any_json(),
            buffer_kits in any_json(),
        ) {
            let stored = SettingsPatch {
                min_on_hand: Some(min_on_hand),
                buffer_days: Some(buffer_days),
                lead_time_days: Some(lead_time_days),
                auto_order_enabled: Some(auto_order_enabled),
                buffer_kits: Some(buffer_kits),
            }
            .apply(&study_defaults());

            prop_assert!(within_bounds(&stored));
        }

        /// Requested horizons always land in `[1, 180]`
        #[test]
        fn prop_horizon_in_range(requested in proptest::option::of(any::<i64>())) {
            let days = clamp_horizon(requested, DEFAULT_HORIZON_DAYS, MAX_HORIZON_DAYS);
            prop_assert!((1..=MAX_HORIZON_DAYS).contains(&days));
        }
    }
}
