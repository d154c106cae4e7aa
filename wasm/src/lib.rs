//! WebAssembly module for the Kitcast lab kit platform
//!
//! Provides client-side computation for:
//! - Buffer targets and status previews while editing settings
//! - Full forecast previews from rows the page already holds
//! - Settings coercion identical to what the server stores

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use uuid::Uuid;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

use shared::{
    aggregate_inventory, build_forecast, buffer_target, classify_status, latest_order_date,
    project_demand, ForecastInput,
};

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    // Set up panic hook for better error messages in browser console
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    web_sys::console::debug_1(&JsValue::from_str("kitcast wasm module loaded"));
}

/// Rows a forecast preview is computed from
#[derive(Debug, Deserialize)]
struct PreviewRequest {
    today: NaiveDate,
    #[serde(default)]
    horizon_days: Option<i64>,
    #[serde(default)]
    kit_types: Vec<KitTypeInfo>,
    #[serde(default)]
    visits: Vec<VisitKitUse>,
    #[serde(default)]
    kits: Vec<LabKitRecord>,
    #[serde(default)]
    orders: Vec<KitOrder>,
    #[serde(default)]
    defaults: Option<InventorySettings>,
    #[serde(default)]
    overrides: BTreeMap<Uuid, InventorySettings>,
    #[serde(default)]
    risk_policy: RiskPolicy,
}

fn preview(request_json: &str) -> Result<String, String> {
    let request: PreviewRequest = serde_json::from_str(request_json)
        .map_err(|e| format!("Invalid preview JSON: {}", e))?;

    let horizon_days = clamp_horizon(request.horizon_days, DEFAULT_HORIZON_DAYS, MAX_HORIZON_DAYS);
    let demand = project_demand(&request.visits, request.today, horizon_days);
    let inventory =
        aggregate_inventory(&request.kits, &request.orders, request.today, horizon_days);
    let settings = SettingsBook {
        defaults: request.defaults,
        overrides: request.overrides,
    };

    let records = build_forecast(&ForecastInput {
        horizon_days,
        kit_types: &request.kit_types,
        demand: &demand,
        inventory: &inventory,
        settings: &settings,
        risk_policy: &request.risk_policy,
    });

    let response = serde_json::json!({
        "horizon_days": horizon_days,
        "summary": ForecastSummary::from_records(&records),
        "records": records,
    });
    serde_json::to_string(&response).map_err(|e| format!("Serialization failed: {}", e))
}

/// Forecast preview from visit, kit and order rows
#[wasm_bindgen]
pub fn forecast_preview(request_json: &str) -> Result<String, JsValue> {
    preview(request_json).map_err(|e| JsValue::from_str(&e))
}

fn apply_patch(previous_json: &str, patch_json: &str) -> Result<String, String> {
    let previous: InventorySettings = if previous_json.trim().is_empty() {
        InventorySettings::default()
    } else {
        serde_json::from_str(previous_json)
            .map_err(|e| format!("Invalid settings JSON: {}", e))?
    };
    let patch: SettingsPatch =
        serde_json::from_str(patch_json).map_err(|e| format!("Invalid patch JSON: {}", e))?;

    serde_json::to_string(&patch.apply(&previous))
        .map_err(|e| format!("Serialization failed: {}", e))
}

/// Settings as the server would store them after this patch
#[wasm_bindgen]
pub fn preview_settings_patch(previous_json: &str, patch_json: &str) -> Result<String, JsValue> {
    apply_patch(previous_json, patch_json).map_err(|e| JsValue::from_str(&e))
}

/// Buffer target for a kit type under study-default settings
#[wasm_bindgen]
pub fn calculate_buffer_target(
    kits_required: i32,
    horizon_days: i32,
    buffer_days: i32,
    min_on_hand: i32,
    buffer_kits: i32,
) -> i32 {
    let settings = resolve_settings(
        Some(&InventorySettings {
            min_on_hand,
            buffer_days,
            buffer_kits,
            ..Default::default()
        }),
        None,
    );
    buffer_target(kits_required, horizon_days, &settings)
}

/// Forecast status for the given supply figures
#[wasm_bindgen]
pub fn classify_supply_status(
    kits_required: i32,
    buffer_target: i32,
    kits_available: i32,
    pending_order_quantity: i32,
    kits_expiring_soon: i32,
) -> String {
    let required_with_buffer = kits_required.saturating_add(buffer_target);
    let deficit = required_with_buffer
        .saturating_sub(kits_available)
        .saturating_sub(pending_order_quantity)
        .max(0);
    classify_status(
        deficit,
        kits_available,
        required_with_buffer,
        buffer_target,
        kits_expiring_soon,
    )
    .as_str()
    .to_string()
}

/// Latest order date as `YYYY-MM-DD`, or an empty string for unparseable dates
#[wasm_bindgen]
pub fn calculate_latest_order_date(
    first_visit: &str,
    lead_time_days: i32,
    today: &str,
) -> String {
    let Ok(today) = today.parse::<NaiveDate>() else {
        return String::new();
    };
    let first_visit = first_visit.parse::<NaiveDate>().ok();
    latest_order_date(first_visit, lead_time_days, today).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_buffer_target() {
        assert_eq!(calculate_buffer_target(10, 30, 7, 0, 0), 3);
        assert_eq!(calculate_buffer_target(10, 30, 7, 5, 0), 5);
        assert_eq!(calculate_buffer_target(0, 30, 7, 0, 4), 4);
    }

    #[test]
    fn test_classify_supply_status() {
        assert_eq!(classify_supply_status(10, 3, 8, 0, 0), "critical");
        assert_eq!(classify_supply_status(10, 3, 8, 5, 0), "warning");
        assert_eq!(classify_supply_status(10, 3, 30, 0, 0), "ok");
        assert_eq!(classify_supply_status(10, 3, 30, 0, 2), "warning");
    }

    #[test]
    fn test_large_counts_do_not_overflow() {
        assert_eq!(classify_supply_status(i32::MAX, 500, 0, 0, 0), "critical");
        assert_eq!(classify_supply_status(10, 3, i32::MAX, i32::MAX, 0), "ok");
        assert_eq!(calculate_buffer_target(20_000_000, 1, 180, 0, 0), i32::MAX);
    }

    #[test]
    fn test_latest_order_date() {
        assert_eq!(
            calculate_latest_order_date("2025-04-20", 7, "2025-04-01"),
            "2025-04-13"
        );
        assert_eq!(
            calculate_latest_order_date("2025-04-03", 7, "2025-04-01"),
            "2025-04-01"
        );
        assert_eq!(calculate_latest_order_date("", 7, "not a date"), "");
    }

    #[test]
    fn test_settings_patch_preview() {
        let stored = apply_patch("", r#"{"buffer_days": 500, "min_on_hand": "4"}"#).unwrap();
        let stored: Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(stored["buffer_days"], 180);
        assert_eq!(stored["min_on_hand"], 4);
        assert!(apply_patch("", "not json").is_err());
    }

    #[test]
    fn test_forecast_preview() {
        let kit_type_id = Uuid::new_v4();
        let visits: Vec<Value> = (0..10)
            .map(|i| {
                json!({
                    "visit_id": Uuid::new_v4(),
                    "subject_id": Uuid::new_v4(),
                    "visit_name": "Week 4",
                    "visit_date": format!("2025-04-{:02}", 10 + i),
                    "status": "scheduled",
                    "kit_type_id": kit_type_id,
                    "quantity": 1,
                    "is_optional": false,
                })
            })
            .collect();
        let kits: Vec<Value> = (0..8)
            .map(|_| {
                json!({
                    "id": Uuid::new_v4(),
                    "kit_type_id": kit_type_id,
                    "status": "available",
                    "expiration_date": null,
                })
            })
            .collect();
        let request = json!({
            "today": "2025-04-01",
            "horizon_days": 30,
            "kit_types": [{ "id": kit_type_id, "name": "Blood Draw Kit" }],
            "visits": visits,
            "kits": kits,
            "defaults": {
                "min_on_hand": 0,
                "buffer_days": 7,
                "lead_time_days": 5,
                "auto_order_enabled": false,
                "buffer_kits": 0,
            },
        });

        let response = preview(&request.to_string()).unwrap();
        let response: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(response["summary"]["critical"], 1);
        assert_eq!(response["records"][0]["deficit"], 5);
        assert_eq!(response["records"][0]["required_with_buffer"], 13);
    }

    #[test]
    fn test_forecast_preview_rejects_bad_json() {
        assert!(preview("{").is_err());
    }
}
