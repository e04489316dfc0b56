pub mod health;
pub mod stripe_webhook;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use crate::AppState;

/// Every route the server exposes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(stripe_webhook::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
