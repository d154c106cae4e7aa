//! Inventory policy settings and their default/override layering

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::validation::{
    coerce_bool, coerce_int, BUFFER_DAYS_BOUNDS, BUFFER_KITS_BOUNDS, LEAD_TIME_DAYS_BOUNDS,
    MIN_ON_HAND_BOUNDS,
};

/// Stored policy values, either a study-wide defaults row or a kit-type override row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventorySettings {
    pub min_on_hand: i32,
    pub buffer_days: i32,
    pub lead_time_days: i32,
    pub auto_order_enabled: bool,
    /// Hard floor on the buffer target, in kits
    pub buffer_kits: i32,
}

/// Where the effective values of a kit type came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsSource {
    KitType,
    StudyDefault,
    Fallback,
}

/// Policy actually applied to one kit type during a forecast run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveSettings {
    pub min_on_hand: i32,
    pub buffer_days: i32,
    pub lead_time_days: i32,
    pub auto_order_enabled: bool,
    pub study_buffer_kits: i32,
    pub kit_type_buffer_kits: i32,
    pub source: SettingsSource,
}

/// Layer a kit-type override over the study defaults.
///
/// The override row wins as a whole; the study's buffer floor always applies
/// alongside the kit type's own.
pub fn resolve_settings(
    defaults: Option<&InventorySettings>,
    override_row: Option<&InventorySettings>,
) -> EffectiveSettings {
    let study_buffer_kits = defaults.map(|d| d.buffer_kits).unwrap_or(0);

    match (override_row, defaults) {
        (Some(row), _) => EffectiveSettings {
            min_on_hand: row.min_on_hand,
            buffer_days: row.buffer_days,
            lead_time_days: row.lead_time_days,
            auto_order_enabled: row.auto_order_enabled,
            study_buffer_kits,
            kit_type_buffer_kits: row.buffer_kits,
            source: SettingsSource::KitType,
        },
        (None, Some(row)) => EffectiveSettings {
            min_on_hand: row.min_on_hand,
            buffer_days: row.buffer_days,
            lead_time_days: row.lead_time_days,
            auto_order_enabled: row.auto_order_enabled,
            study_buffer_kits,
            kit_type_buffer_kits: 0,
            source: SettingsSource::StudyDefault,
        },
        (None, None) => EffectiveSettings {
            min_on_hand: 0,
            buffer_days: 0,
            lead_time_days: 0,
            auto_order_enabled: false,
            study_buffer_kits: 0,
            kit_type_buffer_kits: 0,
            source: SettingsSource::Fallback,
        },
    }
}

/// All policy rows of one study, loaded once per forecast run
#[derive(Debug, Clone, Default)]
pub struct SettingsBook {
    pub defaults: Option<InventorySettings>,
    pub overrides: BTreeMap<Uuid, InventorySettings>,
}

impl SettingsBook {
    pub fn effective(&self, kit_type_id: Uuid) -> EffectiveSettings {
        resolve_settings(self.defaults.as_ref(), self.overrides.get(&kit_type_id))
    }

    pub fn has_override(&self, kit_type_id: Uuid) -> bool {
        self.overrides.contains_key(&kit_type_id)
    }
}

/// Partial settings update as submitted by a client.
///
/// Fields are raw JSON so that strings, floats and garbage can all be coerced
/// instead of failing deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub min_on_hand: Option<Value>,
    pub buffer_days: Option<Value>,
    pub lead_time_days: Option<Value>,
    pub auto_order_enabled: Option<Value>,
    pub buffer_kits: Option<Value>,
}

impl SettingsPatch {
    /// Apply the patch on top of the previously stored values
    pub fn apply(&self, previous: &InventorySettings) -> InventorySettings {
        InventorySettings {
            min_on_hand: coerce_int(
                self.min_on_hand.as_ref(),
                previous.min_on_hand,
                MIN_ON_HAND_BOUNDS,
            ),
            buffer_days: coerce_int(
                self.buffer_days.as_ref(),
                previous.buffer_days,
                BUFFER_DAYS_BOUNDS,
            ),
            lead_time_days: coerce_int(
                self.lead_time_days.as_ref(),
                previous.lead_time_days,
                LEAD_TIME_DAYS_BOUNDS,
            ),
            auto_order_enabled: coerce_bool(
                self.auto_order_enabled.as_ref(),
                previous.auto_order_enabled,
            ),
            buffer_kits: coerce_int(
                self.buffer_kits.as_ref(),
                previous.buffer_kits,
                BUFFER_KITS_BOUNDS,
            ),
        }
    }
}

/// Scope of a settings history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "inventory_settings_scope", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SettingsScope {
    Study,
    KitType,
}

/// Append-only record of a settings change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SettingsHistoryEntry {
    pub id: Uuid,
    pub study_id: Uuid,
    pub kit_type_id: Option<Uuid>,
    pub scope: SettingsScope,
    pub previous: Option<Value>,
    pub current: Value,
    pub changed_by: Option<Uuid>,
    pub changed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(min: i32, days: i32, lead: i32, auto: bool, kits: i32) -> InventorySettings {
        InventorySettings {
            min_on_hand: min,
            buffer_days: days,
            lead_time_days: lead,
            auto_order_enabled: auto,
            buffer_kits: kits,
        }
    }

    #[test]
    fn falls_back_to_zero_without_rows() {
        let effective = resolve_settings(None, None);
        assert_eq!(effective.min_on_hand, 0);
        assert_eq!(effective.buffer_days, 0);
        assert!(!effective.auto_order_enabled);
        assert_eq!(effective.source, SettingsSource::Fallback);
    }

    #[test]
    fn study_defaults_apply_without_override() {
        let defaults = row(4, 14, 7, true, 2);
        let effective = resolve_settings(Some(&defaults), None);
        assert_eq!(effective.min_on_hand, 4);
        assert_eq!(effective.buffer_days, 14);
        assert_eq!(effective.lead_time_days, 7);
        assert_eq!(effective.study_buffer_kits, 2);
        assert_eq!(effective.kit_type_buffer_kits, 0);
        assert_eq!(effective.source, SettingsSource::StudyDefault);
    }

    #[test]
    fn override_wins_but_keeps_study_buffer_floor() {
        let defaults = row(4, 14, 7, true, 2);
        let kit = row(1, 3, 10, false, 5);
        let effective = resolve_settings(Some(&defaults), Some(&kit));
        assert_eq!(effective.min_on_hand, 1);
        assert_eq!(effective.buffer_days, 3);
        assert_eq!(effective.lead_time_days, 10);
        assert!(!effective.auto_order_enabled);
        assert_eq!(effective.study_buffer_kits, 2);
        assert_eq!(effective.kit_type_buffer_kits, 5);
        assert_eq!(effective.source, SettingsSource::KitType);
    }

    #[test]
    fn patch_keeps_omitted_fields() {
        let previous = row(4, 14, 7, true, 2);
        let patch = SettingsPatch {
            buffer_days: Some(json!(21)),
            ..Default::default()
        };
        assert_eq!(patch.apply(&previous), row(4, 21, 7, true, 2));
    }

    #[test]
    fn patch_clamps_buffer_days() {
        let patch = SettingsPatch {
            buffer_days: Some(json!(500)),
            ..Default::default()
        };
        assert_eq!(patch.apply(&InventorySettings::default()).buffer_days, 180);
    }

    #[test]
    fn patch_with_garbage_keeps_previous() {
        let previous = row(4, 14, 7, true, 2);
        let patch = SettingsPatch {
            min_on_hand: Some(json!("lots")),
            lead_time_days: Some(json!({ "days": 3 })),
            auto_order_enabled: Some(json!("maybe")),
            ..Default::default()
        };
        assert_eq!(patch.apply(&previous), previous);
    }
}
