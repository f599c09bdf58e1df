//! Stateless HTTP job runner.
//!
//! Three routes under a configurable prefix:
//!
//! - `GET  {prefix}plugin-bundle-info`: the bundle manifest, verbatim JSON
//! - `POST {prefix}init-plugin-params`: MessagePack `{providerId, pluginId, song}`
//! - `POST {prefix}jobs`: MessagePack `{providerId, pluginId, song, params}`
//!
//! Plugin faults are reported as `ERROR` with HTTP 200; the fault itself
//! stays in the log.

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::{CorsConfig, DevkitConfig};
use crate::dispatch::{DispatchOutcome, ExecutionResult, FaultReporting, JobDispatcher};
use crate::error::{DevkitError, Result};
use crate::protocol::{self, InitPluginRequest, RunPluginRequest, Status, CONTENT_TYPE};

/// MessagePack media types accepted on request bodies, besides
/// `application/octet-stream`.
const MSGPACK_TYPES: &[&str] = &[
    "application/msgpack",
    "application/x-msgpack",
    "application/vnd.msgpack",
];

#[derive(Clone)]
struct RunnerState {
    dispatcher: JobDispatcher,
    bundle_info: Arc<serde_json::Value>,
}

/// Build the runner's router.
pub fn router(dispatcher: JobDispatcher, config: &DevkitConfig) -> Router {
    let prefix = config.normalized_prefix();
    let state = RunnerState {
        bundle_info: Arc::new(dispatcher.registry().manifest().raw().clone()),
        dispatcher,
    };

    info!("Serving bundle info at: {}plugin-bundle-info", prefix);

    Router::new()
        .route(
            &format!("{}plugin-bundle-info", prefix),
            get(handle_bundle_info),
        )
        .route(
            &format!("{}init-plugin-params", prefix),
            post(handle_init_plugin),
        )
        .route(&format!("{}jobs", prefix), post(handle_run_plugin))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors_layer(&config.cors))
        .layer(middleware::from_fn(add_vary_origin))
        .with_state(state)
}

/// Bind `config.bind_addr()` and serve until `shutdown` resolves.
pub async fn serve<F>(dispatcher: JobDispatcher, config: &DevkitConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(config.bind_addr()).await?;
    let addr = listener.local_addr()?;
    let mode = if dispatcher.is_async() { "async" } else { "sync" };
    info!(mode, "Runner listening on http://{}", addr);

    axum::serve(listener, router(dispatcher, config))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    if cors.allows_any() {
        info!("Using cors allowed origins: *");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    info!("Using cors allowed origins: {:?}", cors.allowed_origins);

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn add_vary_origin(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::VARY, HeaderValue::from_static("Origin"));
    response
}

async fn handle_bundle_info(State(state): State<RunnerState>) -> Json<serde_json::Value> {
    Json(state.bundle_info.as_ref().clone())
}

async fn handle_init_plugin(
    State(state): State<RunnerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(rejection) = check_content_type(&headers) {
        return rejection;
    }
    let request: InitPluginRequest = match protocol::decode_request(&body) {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };

    let result = state.dispatcher.init_plugin(request, headers).await;
    result_response(result)
}

async fn handle_run_plugin(
    State(state): State<RunnerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(rejection) = check_content_type(&headers) {
        return rejection;
    }
    let request: RunPluginRequest = match protocol::decode_request(&body) {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };

    match state.dispatcher.run_job(request, headers).await {
        DispatchOutcome::Done(result) => result_response(result),
        DispatchOutcome::Accepted(job) => msgpack(
            StatusCode::ACCEPTED,
            protocol::Response::accepted(&job.id, job.result_url),
        ),
    }
}

fn check_content_type(headers: &HeaderMap) -> std::result::Result<(), Response> {
    let Some(value) = headers.get(header::CONTENT_TYPE) else {
        return Ok(());
    };
    let mime = value
        .to_str()
        .unwrap_or_default()
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if mime == CONTENT_TYPE || MSGPACK_TYPES.contains(&mime.as_str()) {
        Ok(())
    } else {
        Err(bad_request(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("Unsupported content type '{}'", mime),
        ))
    }
}

fn result_response(result: ExecutionResult) -> Response {
    let code = match &result {
        ExecutionResult::Initialized(_)
        | ExecutionResult::Completed(_)
        | ExecutionResult::InitError
        | ExecutionResult::RunError => StatusCode::OK,
        ExecutionResult::NotFound { .. } => StatusCode::NOT_FOUND,
        ExecutionResult::Unauthorized(rejection) => rejection.status,
        ExecutionResult::BadRequest(_) => StatusCode::BAD_REQUEST,
    };
    msgpack(code, result.into_response(FaultReporting::Collapsed))
}

fn bad_request(code: StatusCode, message: String) -> Response {
    msgpack(
        code,
        protocol::Response::failure(Status::BadRequest, message),
    )
}

fn error_response(code: StatusCode, err: &DevkitError) -> Response {
    msgpack(code, protocol::Response::from_error(err))
}

fn msgpack(code: StatusCode, body: protocol::Response) -> Response {
    match body.encode() {
        Ok(bytes) => (code, [(header::CONTENT_TYPE, CONTENT_TYPE)], bytes).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
