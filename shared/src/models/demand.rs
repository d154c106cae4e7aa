//! Visit-driven kit demand projection

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::DateRange;

/// Subject visit lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "subject_visit_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Scheduled,
    Completed,
    Cancelled,
    Missed,
}

/// One scheduled visit joined with one of its template's kit requirements
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct VisitKitUse {
    pub visit_id: Uuid,
    pub subject_id: Uuid,
    pub visit_name: String,
    pub visit_date: NaiveDate,
    pub status: VisitStatus,
    pub kit_type_id: Uuid,
    pub quantity: i32,
    pub is_optional: bool,
}

/// A visit inside the horizon that consumes kits of one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandVisit {
    pub visit_id: Uuid,
    pub subject_id: Uuid,
    pub visit_name: String,
    pub visit_date: NaiveDate,
    pub quantity: i32,
    pub is_optional: bool,
}

/// Projected consumption of one kit type over the horizon
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitDemand {
    pub kit_type_id: Uuid,
    pub visits: Vec<DemandVisit>,
    pub kits_required: i32,
    pub optional_kits_required: i32,
    pub visits_scheduled: i32,
    pub earliest_visit: Option<NaiveDate>,
    pub latest_visit: Option<NaiveDate>,
    /// Completed visit rows over the same-length window before today
    pub recent_visits: i32,
}

impl KitDemand {
    fn new(kit_type_id: Uuid) -> Self {
        Self {
            kit_type_id,
            ..Default::default()
        }
    }

    fn push_scheduled(&mut self, row: &VisitKitUse) {
        let quantity = row.quantity.max(0);
        self.kits_required = self.kits_required.saturating_add(quantity);
        if row.is_optional {
            self.optional_kits_required = self.optional_kits_required.saturating_add(quantity);
        }
        self.visits_scheduled = self.visits_scheduled.saturating_add(1);
        self.earliest_visit = Some(match self.earliest_visit {
            Some(d) => d.min(row.visit_date),
            None => row.visit_date,
        });
        self.latest_visit = Some(match self.latest_visit {
            Some(d) => d.max(row.visit_date),
            None => row.visit_date,
        });
        self.visits.push(DemandVisit {
            visit_id: row.visit_id,
            subject_id: row.subject_id,
            visit_name: row.visit_name.clone(),
            visit_date: row.visit_date,
            quantity,
            is_optional: row.is_optional,
        });
    }
}

/// Aggregate visit/requirement rows into per-kit-type demand.
///
/// Scheduled visits in `[today, today + horizon]` make up demand; completed
/// visits in `[today - horizon, today)` make up the recent pace. Everything
/// else is ignored.
pub fn project_demand(
    rows: &[VisitKitUse],
    today: NaiveDate,
    horizon_days: i32,
) -> BTreeMap<Uuid, KitDemand> {
    let horizon_days = horizon_days.max(1);
    let window = DateRange::horizon(today, horizon_days);
    let history = DateRange::new(
        today - Duration::days(i64::from(horizon_days)),
        today - Duration::days(1),
    );

    let mut demand: BTreeMap<Uuid, KitDemand> = BTreeMap::new();

    for row in rows {
        match row.status {
            VisitStatus::Scheduled if window.contains(row.visit_date) => {
                demand
                    .entry(row.kit_type_id)
                    .or_insert_with(|| KitDemand::new(row.kit_type_id))
                    .push_scheduled(row);
            }
            VisitStatus::Completed if history.contains(row.visit_date) => {
                let entry = demand
                    .entry(row.kit_type_id)
                    .or_insert_with(|| KitDemand::new(row.kit_type_id));
                entry.recent_visits = entry.recent_visits.saturating_add(1);
            }
            _ => {}
        }
    }

    for entry in demand.values_mut() {
        entry
            .visits
            .sort_by(|a, b| a.visit_date.cmp(&b.visit_date).then(a.visit_id.cmp(&b.visit_id)));
    }

    demand
}
