//! Business logic services for the Kitcast server

pub mod demand;
pub mod forecast;
pub mod inventory;
pub mod recommendation;
pub mod settings;
pub mod study;

pub use demand::DemandService;
pub use forecast::ForecastService;
pub use inventory::InventoryService;
pub use recommendation::RecommendationService;
pub use settings::SettingsService;
pub use study::StudyService;

use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// JSON snapshot of a row for the append-only history tables
pub(crate) fn snapshot<T: Serialize + ?Sized>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(format!("Snapshot serialization error: {}", e)))
}
