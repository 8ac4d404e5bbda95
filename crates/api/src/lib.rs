pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;

use axum::{Router, routing::get};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/meetings", get(routes::meeting::list))
        .route(
            "/transcripts/{platform}/{external_meeting_id}",
            get(routes::transcript::get),
        );

    Router::new()
        .nest("/api", api)
        .route("/health", get(routes::health::check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
