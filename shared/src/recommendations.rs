//! Reorder recommendation synthesis and ledger reconciliation
//!
//! A recompute turns forecast records into drafts, then plans how the open
//! ledger has to change: create unmatched drafts, update drifted ones, expire
//! recommendations whose condition has cleared.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::forecasting::latest_order_date;
use crate::models::{
    ForecastRecord, ForecastStatus, KitRecommendation, RecommendationDraft, RecommendationReason,
    RiskFactorType,
};

/// Deficits backed by at least this many visits get the higher confidence
pub const WELL_SUPPORTED_VISITS: i32 = 5;

pub const EXPIRED_RESOLVED_REASON: &str =
    "Condition resolved: projected supply now covers demand and buffer";
pub const EXPIRED_DUPLICATE_REASON: &str =
    "Superseded by another open recommendation for the same kit type and reason";

/// Reason type a forecast record calls for, if any
pub fn reason_for(record: &ForecastRecord) -> Option<RecommendationReason> {
    if record.recommended_order_qty <= 0 {
        return None;
    }
    match record.status {
        ForecastStatus::Critical if record.deficit > 0 => Some(RecommendationReason::Deficit),
        ForecastStatus::Warning => Some(RecommendationReason::Buffer),
        _ => None,
    }
}

/// Confidence in a recommendation, two decimals in `[0.10, 0.90]`
pub fn confidence_for(record: &ForecastRecord, reason: RecommendationReason) -> Decimal {
    let base = match reason {
        RecommendationReason::Deficit if record.visits_scheduled >= WELL_SUPPORTED_VISITS => {
            Decimal::new(90, 2)
        }
        RecommendationReason::Deficit => Decimal::new(75, 2),
        RecommendationReason::Buffer => Decimal::new(60, 2),
    };
    let surge_penalty = if record.has_factor(RiskFactorType::DemandSurge) {
        Decimal::new(10, 2)
    } else {
        Decimal::ZERO
    };
    (base - surge_penalty).max(Decimal::new(10, 2)).round_dp(2)
}

fn reason_text(record: &ForecastRecord, reason: RecommendationReason) -> String {
    match reason {
        RecommendationReason::Deficit => format!(
            "Projected shortfall of {} {} kits for {} scheduled visits in the next {} days",
            record.deficit, record.kit_type_name, record.visits_scheduled, record.horizon_days
        ),
        RecommendationReason::Buffer => format!(
            "{} {} kits expire within {} days; order {} to keep a buffer of {}",
            record.kits_expiring_soon,
            record.kit_type_name,
            record.horizon_days,
            record.recommended_order_qty,
            record.buffer_target
        ),
    }
}

/// Forecast inputs that produced a recommendation, kept for audit
pub fn metadata_snapshot(record: &ForecastRecord) -> serde_json::Value {
    json!({
        "kit_type_name": record.kit_type_name,
        "horizon_days": record.horizon_days,
        "visits_scheduled": record.visits_scheduled,
        "kits_required": record.kits_required,
        "buffer_target": record.buffer_target,
        "required_with_buffer": record.required_with_buffer,
        "kits_available": record.kits_available,
        "kits_expiring_soon": record.kits_expiring_soon,
        "pending_order_quantity": record.pending_order_quantity,
        "original_deficit": record.original_deficit,
        "deficit": record.deficit,
        "status": record.status,
        "risk_score": record.risk_score,
        "risk_level": record.risk_level,
        "lead_time_days": record.settings.lead_time_days,
        "auto_order_enabled": record.settings.auto_order_enabled,
    })
}

/// Turn one forecast record into a draft, if it needs ordering
pub fn draft_for(record: &ForecastRecord, today: NaiveDate) -> Option<RecommendationDraft> {
    let reason_type = reason_for(record)?;
    let window_start = record.window_start.unwrap_or(today);
    let window_end = record
        .window_end
        .unwrap_or_else(|| today + Duration::days(i64::from(record.horizon_days)));

    Some(RecommendationDraft {
        kit_type_id: record.kit_type_id,
        reason_type,
        recommended_quantity: record.recommended_order_qty,
        reason: reason_text(record, reason_type),
        window_start,
        window_end,
        latest_order_date: latest_order_date(
            record.window_start,
            record.settings.lead_time_days,
            today,
        ),
        confidence: confidence_for(record, reason_type),
        metadata: metadata_snapshot(record),
    })
}

/// Drafts for every record that needs ordering
pub fn draft_recommendations(
    records: &[ForecastRecord],
    today: NaiveDate,
) -> Vec<RecommendationDraft> {
    records.iter().filter_map(|r| draft_for(r, today)).collect()
}

/// A single ledger change
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileAction {
    Create(RecommendationDraft),
    Update {
        existing: KitRecommendation,
        draft: RecommendationDraft,
    },
    Expire {
        existing: KitRecommendation,
        reason: String,
    },
}

/// Ledger changes for one recompute
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub actions: Vec<ReconcileAction>,
    pub unchanged: usize,
}

impl ReconcilePlan {
    pub fn created(&self) -> usize {
        self.count(|a| matches!(a, ReconcileAction::Create(_)))
    }

    pub fn updated(&self) -> usize {
        self.count(|a| matches!(a, ReconcileAction::Update { .. }))
    }

    pub fn expired(&self) -> usize {
        self.count(|a| matches!(a, ReconcileAction::Expire { .. }))
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn count(&self, pred: impl Fn(&ReconcileAction) -> bool) -> usize {
        self.actions.iter().filter(|a| pred(a)).count()
    }
}

/// Match drafts against the open ledger by (kit type, reason).
///
/// Non-open recommendations are ignored. When several open rows share a key,
/// the oldest is matched and the rest are expired as duplicates.
pub fn plan_reconciliation(
    drafts: Vec<RecommendationDraft>,
    existing: &[KitRecommendation],
) -> ReconcilePlan {
    let mut open: Vec<&KitRecommendation> =
        existing.iter().filter(|r| r.status.is_open()).collect();
    open.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut by_key: HashMap<(Uuid, RecommendationReason), &KitRecommendation> = HashMap::new();
    let mut plan = ReconcilePlan::default();

    for rec in &open {
        if by_key.contains_key(&rec.key()) {
            plan.actions.push(ReconcileAction::Expire {
                existing: (*rec).clone(),
                reason: EXPIRED_DUPLICATE_REASON.to_string(),
            });
        } else {
            by_key.insert(rec.key(), *rec);
        }
    }

    let mut matched: HashSet<Uuid> = HashSet::new();
    for draft in drafts {
        match by_key.get(&draft.key()) {
            Some(rec) => {
                matched.insert(rec.id);
                if draft.differs_from(rec) {
                    plan.actions.push(ReconcileAction::Update {
                        existing: (*rec).clone(),
                        draft,
                    });
                } else {
                    plan.unchanged += 1;
                }
            }
            None => plan.actions.push(ReconcileAction::Create(draft)),
        }
    }

    for rec in open {
        let kept = by_key.get(&rec.key()).is_some_and(|kept| kept.id == rec.id);
        if kept && !matched.contains(&rec.id) {
            plan.actions.push(ReconcileAction::Expire {
                existing: rec.clone(),
                reason: EXPIRED_RESOLVED_REASON.to_string(),
            });
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EffectiveSettings, RecommendationStatus, RiskLevel, SettingsSource};
    use chrono::Utc;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
    }

    fn record(status: ForecastStatus, deficit: i32, qty: i32) -> ForecastRecord {
        ForecastRecord {
            kit_type_id: Uuid::new_v4(),
            kit_type_name: "Blood Draw Kit".to_string(),
            horizon_days: 30,
            visits_scheduled: 10,
            kits_required: 10,
            optional_kits_required: 0,
            buffer_target: 3,
            required_with_buffer: 13,
            kits_available: 8,
            kits_expiring_soon: 0,
            pending_order_quantity: 0,
            overdue_order_quantity: 0,
            original_deficit: deficit,
            deficit,
            status,
            risk_score: Decimal::from(40),
            risk_level: RiskLevel::Medium,
            risk_factors: vec![],
            recommended_order_qty: qty,
            recent_visits: 0,
            window_start: Some(NaiveDate::from_ymd_opt(2025, 4, 10).unwrap()),
            window_end: Some(NaiveDate::from_ymd_opt(2025, 4, 28).unwrap()),
            upcoming_visits: vec![],
            pending_orders: vec![],
            settings: EffectiveSettings {
                min_on_hand: 0,
                buffer_days: 7,
                lead_time_days: 5,
                auto_order_enabled: false,
                study_buffer_kits: 0,
                kit_type_buffer_kits: 0,
                source: SettingsSource::StudyDefault,
            },
        }
    }

    fn persisted(draft: &RecommendationDraft) -> KitRecommendation {
        KitRecommendation {
            id: Uuid::new_v4(),
            study_id: Uuid::nil(),
            kit_type_id: draft.kit_type_id,
            reason_type: draft.reason_type,
            status: RecommendationStatus::New,
            recommended_quantity: draft.recommended_quantity,
            reason: draft.reason.clone(),
            window_start: draft.window_start,
            window_end: draft.window_end,
            latest_order_date: draft.latest_order_date,
            confidence: draft.confidence,
            metadata: draft.metadata.clone(),
            dismissed_reason: None,
            acted_at: None,
            dismissed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn deficit_draft_walks_lead_time_back() {
        let draft = draft_for(&record(ForecastStatus::Critical, 5, 5), today()).unwrap();
        assert_eq!(draft.reason_type, RecommendationReason::Deficit);
        assert_eq!(draft.recommended_quantity, 5);
        assert_eq!(
            draft.latest_order_date,
            NaiveDate::from_ymd_opt(2025, 4, 5).unwrap()
        );
        assert_eq!(draft.confidence, Decimal::new(90, 2));
    }

    #[test]
    fn ok_records_produce_no_draft() {
        assert!(draft_for(&record(ForecastStatus::Ok, 0, 0), today()).is_none());
        assert!(draft_for(&record(ForecastStatus::Warning, 0, 0), today()).is_none());
    }

    #[test]
    fn buffer_draft_has_lower_confidence() {
        let mut r = record(ForecastStatus::Warning, 0, 4);
        r.kits_expiring_soon = 4;
        let draft = draft_for(&r, today()).unwrap();
        assert_eq!(draft.reason_type, RecommendationReason::Buffer);
        assert_eq!(draft.confidence, Decimal::new(60, 2));
        assert!(draft.reason.contains("expire"));
    }

    #[test]
    fn creates_then_leaves_unchanged() {
        let drafts = draft_recommendations(&[record(ForecastStatus::Critical, 5, 5)], today());
        let plan = plan_reconciliation(drafts.clone(), &[]);
        assert_eq!(plan.created(), 1);

        let ledger: Vec<_> = drafts.iter().map(persisted).collect();
        let second = plan_reconciliation(drafts, &ledger);
        assert!(second.is_empty());
        assert_eq!(second.unchanged, 1);
    }

    #[test]
    fn updates_when_quantity_drifts() {
        let r = record(ForecastStatus::Critical, 5, 5);
        let ledger = vec![persisted(&draft_for(&r, today()).unwrap())];

        let mut worse = r.clone();
        worse.deficit = 8;
        worse.recommended_order_qty = 8;
        let plan = plan_reconciliation(draft_recommendations(&[worse], today()), &ledger);
        assert_eq!(plan.updated(), 1);
        assert_eq!(plan.created(), 0);
    }

    #[test]
    fn expires_resolved_and_ignores_closed() {
        let r = record(ForecastStatus::Critical, 5, 5);
        let open = persisted(&draft_for(&r, today()).unwrap());
        let mut dismissed = open.clone();
        dismissed.id = Uuid::new_v4();
        dismissed.status = RecommendationStatus::Dismissed;

        let plan = plan_reconciliation(vec![], &[open.clone(), dismissed]);
        assert_eq!(plan.expired(), 1);
        match &plan.actions[0] {
            ReconcileAction::Expire { existing, reason } => {
                assert_eq!(existing.id, open.id);
                assert_eq!(reason, EXPIRED_RESOLVED_REASON);
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn duplicate_open_rows_collapse_to_oldest() {
        let r = record(ForecastStatus::Critical, 5, 5);
        let draft = draft_for(&r, today()).unwrap();
        let older = persisted(&draft);
        let mut newer = persisted(&draft);
        newer.created_at = older.created_at + chrono::Duration::seconds(1);

        let plan = plan_reconciliation(vec![draft], &[newer.clone(), older]);
        assert_eq!(plan.expired(), 1);
        assert_eq!(plan.unchanged, 1);
        match &plan.actions[0] {
            ReconcileAction::Expire { existing, reason } => {
                assert_eq!(existing.id, newer.id);
                assert_eq!(reason, EXPIRED_DUPLICATE_REASON);
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn reason_switch_expires_old_and_creates_new() {
        let r = record(ForecastStatus::Critical, 5, 5);
        let ledger = vec![persisted(&draft_for(&r, today()).unwrap())];

        let mut buffer = r.clone();
        buffer.status = ForecastStatus::Warning;
        buffer.deficit = 0;
        buffer.kits_expiring_soon = 3;
        buffer.recommended_order_qty = 3;

        let plan = plan_reconciliation(draft_recommendations(&[buffer], today()), &ledger);
        assert_eq!(plan.created(), 1);
        assert_eq!(plan.expired(), 1);
    }
}
