//! HTTP request handlers

pub mod forecast;
pub mod health;
pub mod inventory;
pub mod recommendation;
pub mod settings;

pub use forecast::get_forecast;
pub use health::health_check;
pub use inventory::{list_pending_orders, sweep_expired_kits};
pub use recommendation::{
    act_on_recommendation, dismiss_recommendation, get_recommendation_history,
    list_recommendations, recompute_recommendations,
};
pub use settings::{
    get_settings_history, get_study_settings, list_kit_type_settings, update_kit_type_settings,
    update_study_settings,
};
