// Router construction
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    add_demo_widget, apply_layout, create_widget, delete_widget, discover_fields, health_check,
    list_widgets, refresh_widget, set_api_key, stream_dashboard, update_widget, widget_data,
};
use axum::{
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

// Compression is applied per response by the handlers, so no CompressionLayer here.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/widgets", get(list_widgets).post(create_widget))
        .route("/widgets/:id", patch(update_widget).delete(delete_widget))
        .route("/widgets/:id/data", get(widget_data))
        .route("/widgets/:id/refresh", post(refresh_widget))
        .route("/layout", put(apply_layout))
        .route("/discover", post(discover_fields))
        .route("/api-keys/:provider", put(set_api_key))
        .route("/demo/:kind", post(add_demo_widget))
        .route("/dashboard/stream", get(stream_dashboard))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
