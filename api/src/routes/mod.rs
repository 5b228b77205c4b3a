pub mod analysis;
pub mod anomalies;
pub mod attendance;
pub mod health;

use axum::Router;
use axum::middleware::from_fn;
use axum::routing::{get, post, put};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::request_id;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/check-in", post(attendance::check_in))
        .route("/attendance/confirm", post(attendance::confirm))
        .route("/attendance/cancel-provisional", post(attendance::cancel_provisional))
        .route("/attendance/today/{student_id}", get(attendance::today))
        .route("/attendance/rssi-stream", post(attendance::append_rssi_stream))
        .route("/analyze-correlations", post(analysis::analyze_correlations))
        .route("/anomalies", get(anomalies::list_anomalies))
        .route("/anomalies/{id}/review", put(anomalies::review_anomaly))
        .route_layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
