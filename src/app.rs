use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{api, ingress, state::AppState};

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/health", get(api::health))
        // Tracking
        .route("/track/{affiliate_id}", get(ingress::track_hit))
        // API routes
        .route("/api/visitors", get(api::list_visitors))
        .route("/api/affiliates/{id}/visitors", get(api::affiliate_visitors))
        .route("/api/affiliates/{id}/kpis", get(api::affiliate_kpis))
        .route("/api/referrals", post(api::create_referral))
        .route("/api/referrals/{id}", get(api::get_referral))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
