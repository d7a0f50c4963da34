use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use disaster_zips::query::{self, DeclarationSummary, RecordFilter};
use disaster_zips::{
    ClientConfig, DisasterClient, NormalizedRecord, Pipeline, PipelineOutcome, PipelineStatus,
    export,
};

/// Server configuration
struct ServerConfig {
    port: u16,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
        }
    }
}

/// Application state shared across all requests
#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    metrics: Arc<Metrics>,
}

/// Server metrics
struct Metrics {
    total_requests: AtomicU64,
    pipeline_runs: AtomicU64,
    source_failures: AtomicU64,
    start_time: Instant,
}

impl AppState {
    /// Run the pipeline and record the outcome in metrics.
    async fn run(&self) -> PipelineOutcome {
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);
        self.metrics.pipeline_runs.fetch_add(1, Ordering::Relaxed);
        let outcome = self.pipeline.run().await;
        if matches!(outcome.status, PipelineStatus::SourceUnavailable(_)) {
            self.metrics.source_failures.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server=info,disaster_zips=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    let client_config = ClientConfig::from_env();
    tracing::info!(
        declarations = %client_config.declarations_url,
        gazetteer = %client_config.gazetteer_url,
        window_days = client_config.window_days,
        "configuring pipeline"
    );

    let client =
        DisasterClient::with_config(client_config).context("Failed to build HTTP client")?;
    let app = build_app(Pipeline::new(client));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Build the Axum application with routes and middleware
fn build_app(pipeline: Pipeline) -> Router {
    let metrics = Arc::new(Metrics {
        total_requests: AtomicU64::new(0),
        pipeline_runs: AtomicU64::new(0),
        source_failures: AtomicU64::new(0),
        start_time: Instant::now(),
    });

    let state = AppState { pipeline, metrics };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/regions", get(list_regions))
        .route("/api/regions/:state/declarations", get(list_declarations))
        .route("/api/records", post(query_records))
        .route("/api/export", post(export_records))
        .route("/api/debug/raw", get(raw_declarations))
        .route("/api/cache/invalidate", post(invalidate_cache))
        .route("/api/metrics", get(get_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// States with declarations in the window
async fn list_regions(State(state): State<AppState>) -> Json<RegionsResponse> {
    let outcome = state.run().await;
    Json(RegionsResponse {
        regions: query::regions(&outcome.records),
        total_declarations: outcome.records.len(),
        status: outcome.status,
    })
}

#[derive(Serialize)]
struct RegionsResponse {
    status: PipelineStatus,
    total_declarations: usize,
    regions: Vec<String>,
}

/// Declaration names for one state
async fn list_declarations(
    State(state): State<AppState>,
    Path(region): Path<String>,
) -> Json<DeclarationsResponse> {
    let outcome = state.run().await;
    let region = region.to_uppercase();
    Json(DeclarationsResponse {
        declarations: query::declarations_in(&outcome.records, &region),
        region,
        status: outcome.status,
    })
}

#[derive(Serialize)]
struct DeclarationsResponse {
    status: PipelineStatus,
    region: String,
    declarations: Vec<String>,
}

/// Selection made in the presentation layer
#[derive(Deserialize)]
struct RecordsRequest {
    state: String,
    disaster_name: String,
    #[serde(flatten)]
    filter: RecordFilter,
}

#[derive(Serialize)]
struct RecordsResponse {
    status: PipelineStatus,
    summary: Option<DeclarationSummary>,
    counties: Vec<String>,
    eligibilities: Vec<String>,
    records: Vec<NormalizedRecord>,
    file_name: String,
}

/// Rows for a declaration, with sub-filters applied
async fn query_records(
    State(state): State<AppState>,
    Json(request): Json<RecordsRequest>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let outcome = state.run().await;
    let selected = query::select(&outcome.records, &request.state, &request.disaster_name);

    let summary = query::summarize(&selected);
    if summary.is_none() && outcome.status == PipelineStatus::Ready {
        return Err(ApiError::NotFound(format!(
            "No data found for {} in {}",
            request.disaster_name, request.state
        )));
    }

    Ok(Json(RecordsResponse {
        status: outcome.status,
        summary,
        counties: query::counties(&selected),
        eligibilities: query::eligibilities(&selected),
        records: query::filter(&selected, &request.filter),
        file_name: export::export_file_name(&request.disaster_name),
    }))
}

/// Filtered rows as a CSV download
async fn export_records(
    State(state): State<AppState>,
    Json(request): Json<RecordsRequest>,
) -> Result<Response, ApiError> {
    let outcome = state.run().await;
    let selected = query::select(&outcome.records, &request.state, &request.disaster_name);
    let filtered = query::filter(&selected, &request.filter);

    let csv = export::to_csv(&filtered).map_err(|e| {
        tracing::error!("CSV export error: {}", e);
        ApiError::InternalError(e.to_string())
    })?;
    let file_name = export::export_file_name(&request.disaster_name);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name.replace('"', "")),
            ),
        ],
        csv,
    )
        .into_response())
}

/// Raw upstream declarations, for debugging
async fn raw_declarations(State(state): State<AppState>) -> Result<Response, ApiError> {
    state.metrics.total_requests.fetch_add(1, Ordering::Relaxed);
    let raw = state.pipeline.declarations().await.map_err(|e| {
        tracing::error!("Declarations fetch error: {}", e);
        ApiError::Unavailable(e.to_string())
    })?;
    Ok(Json(raw.as_ref().clone()).into_response())
}

async fn invalidate_cache(State(state): State<AppState>) -> StatusCode {
    state.metrics.total_requests.fetch_add(1, Ordering::Relaxed);
    state.pipeline.invalidate().await;
    StatusCode::NO_CONTENT
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        total_requests: state.metrics.total_requests.load(Ordering::Relaxed),
        pipeline_runs: state.metrics.pipeline_runs.load(Ordering::Relaxed),
        source_failures: state.metrics.source_failures.load(Ordering::Relaxed),
        uptime_seconds: state.metrics.start_time.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct MetricsResponse {
    total_requests: u64,
    pipeline_runs: u64,
    source_failures: u64,
    uptime_seconds: u64,
}

/// API error types
enum ApiError {
    NotFound(String),
    Unavailable(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}
