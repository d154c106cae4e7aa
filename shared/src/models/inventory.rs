//! Lab kit inventory and purchase order models

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::DateRange;

/// Kit type tracked by a study
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct KitTypeInfo {
    pub id: Uuid,
    pub name: String,
}

/// Lab kit lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "lab_kit_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum LabKitStatus {
    Available,
    Assigned,
    PendingShipment,
    Shipped,
    Delivered,
    Used,
    Expired,
    Destroyed,
    Archived,
}

/// Minimal view of a lab kit needed for supply counts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LabKitRecord {
    pub id: Uuid,
    pub kit_type_id: Uuid,
    pub status: LabKitStatus,
    pub expiration_date: Option<NaiveDate>,
}

impl LabKitRecord {
    /// Ready to use on `today`
    pub fn is_available_on(&self, today: NaiveDate) -> bool {
        self.status == LabKitStatus::Available
            && self.expiration_date.map_or(true, |exp| exp >= today)
    }
}

/// Purchase order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "lab_kit_order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Received,
    Cancelled,
}

/// Kit purchase order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct KitOrder {
    pub id: Uuid,
    pub kit_type_id: Uuid,
    pub quantity: i32,
    pub vendor: Option<String>,
    pub expected_arrival: Option<NaiveDate>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl KitOrder {
    pub fn is_overdue_on(&self, today: NaiveDate) -> bool {
        self.expected_arrival.map_or(false, |eta| eta < today)
    }
}

/// Pending order as reported in a forecast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrderView {
    pub order_id: Uuid,
    pub kit_type_id: Uuid,
    pub quantity: i32,
    pub vendor: Option<String>,
    pub expected_arrival: Option<NaiveDate>,
    pub is_overdue: bool,
}

impl PendingOrderView {
    pub fn from_order(order: &KitOrder, today: NaiveDate) -> Self {
        Self {
            order_id: order.id,
            kit_type_id: order.kit_type_id,
            quantity: order.quantity.max(0),
            vendor: order.vendor.clone(),
            expected_arrival: order.expected_arrival,
            is_overdue: order.is_overdue_on(today),
        }
    }
}

/// Supply picture of one kit type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryState {
    pub kit_type_id: Uuid,
    pub kits_available: i32,
    pub kits_expiring_soon: i32,
    pub pending_order_quantity: i32,
    pub overdue_order_quantity: i32,
    pub pending_orders: Vec<PendingOrderView>,
}

impl InventoryState {
    fn new(kit_type_id: Uuid) -> Self {
        Self {
            kit_type_id,
            ..Default::default()
        }
    }
}

/// Aggregate kits and orders into per-kit-type supply as of `today`.
///
/// Kits past their expiration date are skipped even when the expiry sweep has
/// not marked them yet.
pub fn aggregate_inventory(
    kits: &[LabKitRecord],
    orders: &[KitOrder],
    today: NaiveDate,
    horizon_days: i32,
) -> BTreeMap<Uuid, InventoryState> {
    let window = DateRange::horizon(today, horizon_days.max(1));
    let mut state: BTreeMap<Uuid, InventoryState> = BTreeMap::new();

    for kit in kits.iter().filter(|k| k.is_available_on(today)) {
        let entry = state
            .entry(kit.kit_type_id)
            .or_insert_with(|| InventoryState::new(kit.kit_type_id));
        entry.kits_available = entry.kits_available.saturating_add(1);
        if kit.expiration_date.is_some_and(|exp| window.contains(exp)) {
            entry.kits_expiring_soon = entry.kits_expiring_soon.saturating_add(1);
        }
    }

    for order in orders.iter().filter(|o| o.status == OrderStatus::Pending) {
        let view = PendingOrderView::from_order(order, today);
        let entry = state
            .entry(order.kit_type_id)
            .or_insert_with(|| InventoryState::new(order.kit_type_id));
        entry.pending_order_quantity =
            entry.pending_order_quantity.saturating_add(view.quantity);
        if view.is_overdue {
            entry.overdue_order_quantity =
                entry.overdue_order_quantity.saturating_add(view.quantity);
        }
        entry.pending_orders.push(view);
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn kit(kit_type_id: Uuid, status: LabKitStatus, exp: Option<NaiveDate>) -> LabKitRecord {
        LabKitRecord {
            id: Uuid::new_v4(),
            kit_type_id,
            status,
            expiration_date: exp,
        }
    }

    fn order(kit_type_id: Uuid, qty: i32, eta: Option<NaiveDate>, status: OrderStatus) -> KitOrder {
        KitOrder {
            id: Uuid::new_v4(),
            kit_type_id,
            quantity: qty,
            vendor: None,
            expected_arrival: eta,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn counts_only_available_unexpired_kits() {
        let kt = Uuid::new_v4();
        let today = date(2025, 6, 1);
        let kits = vec![
            kit(kt, LabKitStatus::Available, None),
            kit(kt, LabKitStatus::Available, Some(date(2025, 12, 1))),
            kit(kt, LabKitStatus::Available, Some(date(2025, 5, 31))),
            kit(kt, LabKitStatus::Assigned, None),
            kit(kt, LabKitStatus::Destroyed, None),
        ];

        let state = &aggregate_inventory(&kits, &[], today, 30)[&kt];
        assert_eq!(state.kits_available, 2);
        assert_eq!(state.kits_expiring_soon, 0);
    }

    #[test]
    fn expiring_soon_includes_today_and_window_end() {
        let kt = Uuid::new_v4();
        let today = date(2025, 6, 1);
        let kits = vec![
            kit(kt, LabKitStatus::Available, Some(today)),
            kit(kt, LabKitStatus::Available, Some(date(2025, 7, 1))),
            kit(kt, LabKitStatus::Available, Some(date(2025, 7, 2))),
        ];

        let state = &aggregate_inventory(&kits, &[], today, 30)[&kt];
        assert_eq!(state.kits_available, 3);
        assert_eq!(state.kits_expiring_soon, 2);
    }

    #[test]
    fn pending_orders_sum_and_flag_overdue() {
        let kt = Uuid::new_v4();
        let today = date(2025, 6, 1);
        let orders = vec![
            order(kt, 10, Some(date(2025, 5, 28)), OrderStatus::Pending),
            order(kt, 5, Some(date(2025, 6, 10)), OrderStatus::Pending),
            order(kt, 50, Some(date(2025, 5, 1)), OrderStatus::Received),
            order(kt, 7, None, OrderStatus::Cancelled),
        ];

        let state = &aggregate_inventory(&[], &orders, today, 30)[&kt];
        assert_eq!(state.pending_order_quantity, 15);
        assert_eq!(state.overdue_order_quantity, 10);
        assert_eq!(state.pending_orders.len(), 2);
        assert!(state.pending_orders.iter().any(|o| o.is_overdue));
    }
}
