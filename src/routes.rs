use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;

use crate::{
    cache::{CacheSnapshot, ForecastCache},
    forecast::{FetchError, ForecastSource},
    refresh::refresh_once,
    render::{render_page, PageSettings},
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ForecastCache>,
    pub source: Arc<dyn ForecastSource>,
    pub page: Arc<PageSettings>,
}

fn plain_text(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

fn upstream_error(error: &FetchError) -> Response {
    plain_text(StatusCode::BAD_GATEWAY, format!("Upstream error: {}", error))
}

/// Serves the cached forecast. An empty cache is filled inline before
/// rendering; if that fails the client gets a 502.
pub async fn forecast_page(State(state): State<AppState>) -> Response {
    let mut snapshot = state.cache.snapshot().await;

    if snapshot.entry.is_none() {
        match refresh_once(state.source.as_ref(), &state.cache).await {
            Ok(entry) => {
                snapshot = CacheSnapshot {
                    last_attempt: Some(entry.fetched_at),
                    entry: Some(entry),
                    last_error: None,
                };
            }
            Err(e) => {
                tracing::error!("Inline forecast fetch failed: {}", e);
                return upstream_error(&e);
            }
        }
    }

    match render_page(&snapshot, &state.page) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Rendering forecast page failed: {}", e);
            plain_text(StatusCode::INTERNAL_SERVER_ERROR, "Rendering failed".to_string())
        }
    }
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(forecast_page))
        .with_state(state)
}
