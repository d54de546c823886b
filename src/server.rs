use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::command::CommandRunner;
use crate::error::WifiError;
use crate::manager::{
    ApplyResponse, DesiredState, EnabledResponse, NeedsChangeResponse, WifiManager, WifiSettings,
};
use crate::scan::Cell;

pub struct ServerConfig {
    pub port: u16,
    pub interface: String,
}

pub struct AppState<R> {
    pub manager: WifiManager<R>,
    pub default_interface: String,
}

#[derive(Debug, Deserialize)]
struct InterfaceQuery {
    interface: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnabledRequest {
    enabled: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError(String);

impl From<WifiError> for ApiError {
    fn from(err: WifiError) -> Self {
        ApiError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError(format!("Worker task failed: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: self.0 })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router<R: CommandRunner + 'static>(state: Arc<AppState<R>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/wifi", get(settings_handler::<R>).post(apply_handler::<R>))
        .route("/api/wifi/scan", get(scan_handler::<R>))
        .route("/api/wifi/needs-change", post(needs_change_handler::<R>))
        .route("/api/wifi/enabled", post(enabled_handler::<R>))
        .layer(cors)
        .with_state(state)
}

pub async fn run_server<R: CommandRunner + 'static>(config: ServerConfig, manager: WifiManager<R>) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        manager,
        default_interface: config.interface.clone(),
    });
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, interface = %config.interface, "starting wifi API server");
    println!("Starting server at http://localhost:{}", config.port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Runs a blocking manager call on the blocking pool.
async fn blocking<R, T, F>(state: Arc<AppState<R>>, query: InterfaceQuery, call: F) -> Result<T, ApiError>
where
    R: CommandRunner + 'static,
    T: Send + 'static,
    F: FnOnce(&WifiManager<R>, &str) -> Result<T, WifiError> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        let interface = query.interface.unwrap_or_else(|| state.default_interface.clone());
        call(&state.manager, &interface)
    })
    .await??;
    Ok(result)
}

async fn settings_handler<R: CommandRunner + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<InterfaceQuery>,
) -> ApiResult<WifiSettings> {
    let settings = blocking(state, query, |manager, interface| manager.current_settings(interface)).await?;
    Ok(Json(settings))
}

async fn scan_handler<R: CommandRunner + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<InterfaceQuery>,
) -> ApiResult<Vec<Cell>> {
    let cells = blocking(state, query, |manager, interface| manager.scan(interface)).await?;
    Ok(Json(cells))
}

async fn needs_change_handler<R: CommandRunner + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<InterfaceQuery>,
    Json(desired): Json<DesiredState>,
) -> ApiResult<NeedsChangeResponse> {
    let response = blocking(state, query, move |manager, interface| {
        manager.needs_change(interface, &desired)
    })
    .await?;
    Ok(Json(response))
}

async fn apply_handler<R: CommandRunner + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<InterfaceQuery>,
    Json(desired): Json<DesiredState>,
) -> ApiResult<ApplyResponse> {
    let response = blocking(state, query, move |manager, interface| {
        Ok(manager.apply(interface, &desired))
    })
    .await?;
    Ok(Json(response))
}

async fn enabled_handler<R: CommandRunner + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<InterfaceQuery>,
    Json(request): Json<EnabledRequest>,
) -> ApiResult<EnabledResponse> {
    let response = blocking(state, query, move |manager, interface| {
        manager.set_enabled(interface, request.enabled)
    })
    .await?;
    Ok(Json(response))
}
