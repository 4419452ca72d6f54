// HTTP request handlers
use crate::application::errors::WidgetDataError;
use crate::application::widget_data_service::DiscoveryRequest;
use crate::domain::dashboard::DemoKind;
use crate::domain::provider::ApiProvider;
use crate::domain::widget::{WidgetConfig, WidgetLayout, WidgetPatch};
use crate::infrastructure::chunked_json::stream_from_receiver;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("widget not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Data(#[from] WidgetDataError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) | ApiError::Data(WidgetDataError::UnknownWidget(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::BadRequest(_) | ApiError::Data(WidgetDataError::UnconfiguredEndpoint) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Data(WidgetDataError::Fetch(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Data(WidgetDataError::Normalize(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

async fn respond<T: Serialize>(status: StatusCode, data: &T, headers: &HeaderMap) -> Response {
    match json_response(status, data, accepts_brotli(headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyRequest {
    pub key: String,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_widgets(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let widgets = state.dashboard_service.list().await;
    respond(StatusCode::OK, &widgets, &headers).await
}

pub async fn create_widget(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(config): Json<WidgetConfig>,
) -> ApiResult {
    let widget = state.dashboard_service.create(config).await?;
    Ok(respond(StatusCode::CREATED, &widget, &headers).await)
}

pub async fn update_widget(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(patch): Json<WidgetPatch>,
) -> ApiResult {
    match state.dashboard_service.update(&id, patch).await? {
        Some(widget) => Ok(respond(StatusCode::OK, &widget, &headers).await),
        None => Err(ApiError::NotFound(id)),
    }
}

pub async fn delete_widget(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    match state.dashboard_service.remove(&id).await? {
        Some(_) => Ok(StatusCode::NO_CONTENT.into_response()),
        None => Err(ApiError::NotFound(id)),
    }
}

pub async fn apply_layout(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(layouts): Json<Vec<WidgetLayout>>,
) -> ApiResult {
    let applied = state.dashboard_service.apply_layout(&layouts).await?;
    Ok(respond(StatusCode::OK, &json!({ "applied": applied }), &headers).await)
}

pub async fn widget_data(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    let snapshot = state.dashboard_service.widget_data(&id).await?;
    Ok(respond(StatusCode::OK, &snapshot, &headers).await)
}

pub async fn refresh_widget(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    let snapshot = state.dashboard_service.refresh_widget(&id).await?;
    Ok(respond(StatusCode::OK, &snapshot, &headers).await)
}

/// Test an endpoint before saving a widget
pub async fn discover_fields(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(request): Json<DiscoveryRequest>,
) -> ApiResult {
    let discovery = state.dashboard_service.discover(request).await?;
    Ok(respond(StatusCode::OK, &discovery, &headers).await)
}

pub async fn set_api_key(
    Path(provider): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<ApiKeyRequest>,
) -> ApiResult {
    let Some(parsed) = ApiProvider::parse(&provider) else {
        return Err(ApiError::BadRequest(format!("unknown provider: {provider}")));
    };
    state.dashboard_service.set_api_key(parsed, request.key).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn add_demo_widget(
    Path(kind): Path<DemoKind>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    let widget = state.dashboard_service.add_demo_widget(kind).await?;
    Ok(respond(StatusCode::CREATED, &widget, &headers).await)
}

/// Stream the dashboard (progressive loading)
pub async fn stream_dashboard(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rx = state.streaming_service.stream_dashboard().await;
    stream_from_receiver(rx, accepts_brotli(&headers))
}
