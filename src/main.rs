mod cache;
mod ebay;
mod heuristic;
mod http;
mod llm;
mod metrics;
mod models;
mod pipeline;
mod ratelimit;
mod stats;
mod supabase;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, MarketSummary, PriceEstimateParams, PriceItemRequest};
use pipeline::{Pipeline, PipelineError, PipelineErrorKind};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "bluberry.api", "server crashed: {err}");
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let pipeline = Pipeline::from_env();
    let openapi_raw = include_str!("../docs/openapi.yaml");
    let openapi: serde_json::Value =
        serde_yaml::from_str(openapi_raw).unwrap_or(serde_json::json!({"openapi":"3.0.3"}));
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prom recorder");
    let state = AppState {
        pipeline,
        openapi: Arc::new(openapi),
        prometheus_handle,
    };

    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .route("/price-item", post(price_item))
        .route("/price-estimate", get(price_estimate))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "bluberry.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: PrometheusHandle,
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
///
/// Returns a small JSON payload with `status` and `service`.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "bluberry-api-rs",
    }))
}

/// Resolve a price for a submitted item.
///
/// - Method: `POST`
/// - Path: `/price-item`
/// - Body: `PriceItemRequest`
///
/// Always answers 200 with some price unless the description is missing;
/// internal failures degrade through the fallback chain, and anything truly
/// unexpected yields the fixed default figure rather than a 5xx.
async fn price_item(
    State(state): State<AppState>,
    Json(payload): Json<PriceItemRequest>,
) -> Response {
    crate::metrics::inc_requests("/price-item");
    match state.pipeline.price(&payload).await {
        Ok(estimate) => {
            if let Some(item_id) = payload.item_id.as_deref() {
                state.pipeline.persist_price(item_id, &estimate).await;
            }
            (StatusCode::OK, Json(estimate)).into_response()
        }
        Err(err) if err.kind() == PipelineErrorKind::InvalidInput => {
            (StatusCode::BAD_REQUEST, Json(ApiError::new(err.detail()))).into_response()
        }
        Err(err) => {
            error!(
                target = "bluberry.api",
                stage = err.stage(),
                error = %err,
                "pricing_catch_all"
            );
            (StatusCode::OK, Json(Pipeline::default_estimate())).into_response()
        }
    }
}

/// Live marketplace comparison for one item title.
///
/// - Method: `GET`
/// - Path: `/price-estimate?title=...&includeShipping=false`
///
/// 400 without a title, 429 when the outbound limiter refuses, otherwise the
/// full comparable summary (possibly explicitly empty).
async fn price_estimate(
    State(state): State<AppState>,
    Query(params): Query<PriceEstimateParams>,
) -> Result<Json<MarketSummary>, AppError> {
    crate::metrics::inc_requests("/price-estimate");
    let title = params.title.unwrap_or_default();
    let summary = state
        .pipeline
        .market_summary(&title, params.include_shipping)
        .await?;
    Ok(Json(summary))
}

async fn openapi_json(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json((*state.openapi).clone())
}

async fn swagger_ui() -> axum::http::Response<String> {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>BluBerry Pricing API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    axum::http::Response::builder()
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html.to_string())
        .unwrap_or_default()
}

async fn metrics_endpoint(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> axum::http::Response<String> {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return axum::http::Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .body("unauthorized".into())
                .unwrap_or_default();
        }
    }
    let body = state.prometheus_handle.render();
    axum::http::Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .unwrap_or_default()
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                };
                (status, Json(ApiError::new(err.detail()))).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
