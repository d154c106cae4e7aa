//! Route definitions for the Kitcast server

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - per-study inventory forecasting
        .nest("/studies/:study_id", study_routes(state))
}

/// Study-scoped routes (protected)
fn study_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/forecast", get(handlers::get_forecast))
        .route("/recommendations", get(handlers::list_recommendations))
        .route("/recommendations/recompute", post(handlers::recompute_recommendations))
        .route("/recommendations/:recommendation_id/act", post(handlers::act_on_recommendation))
        .route(
            "/recommendations/:recommendation_id/dismiss",
            post(handlers::dismiss_recommendation),
        )
        .route(
            "/recommendations/:recommendation_id/history",
            get(handlers::get_recommendation_history),
        )
        .route(
            "/inventory-settings",
            get(handlers::get_study_settings).put(handlers::update_study_settings),
        )
        .route("/inventory-settings/kit-types", get(handlers::list_kit_type_settings))
        .route(
            "/inventory-settings/kit-types/:kit_type_id",
            put(handlers::update_kit_type_settings),
        )
        .route("/inventory-settings/history", get(handlers::get_settings_history))
        .route("/pending-orders", get(handlers::list_pending_orders))
        .route("/lab-kits/sweep-expired", post(handlers::sweep_expired_kits))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
