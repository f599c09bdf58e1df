//! Host-supplied extension points.
//!
//! The devkit ships permissive defaults: no authorizer means every request
//! is allowed, no result store means sync mode, no exception hook means
//! faults are only logged.

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};

use crate::engine::PluginFault;
use crate::error::Result;

/// Which plugin phase a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    InitPlugin,
    RunPlugin,
}

/// What an [`Authorizer`] gets to look at.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub kind: RequestKind,
    pub provider_id: String,
    pub plugin_id: String,
    /// Request headers (for the debugger, those of the WebSocket upgrade).
    pub headers: HeaderMap,
}

/// Why an [`Authorizer`] refused a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRejection {
    /// HTTP status the runner answers with.
    pub status: StatusCode,
    pub message: String,
}

impl AuthRejection {
    /// A `401 Unauthorized` rejection.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Gate run and init requests before any plugin code runs.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, request: &AuthRequest) -> std::result::Result<(), AuthRejection>;
}

/// Destination of async job results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store the encoded result of job `job_id`.
    async fn upload(&self, job_id: &str, payload: Vec<u8>) -> Result<()>;

    /// URL the caller can fetch the result of `job_id` from.
    fn result_url(&self, job_id: &str) -> String;
}

/// Receives plugin run faults after they have been logged.
#[cfg_attr(test, mockall::automock)]
pub trait ExceptionHook: Send + Sync {
    fn on_fault(&self, fault: &PluginFault);
}

/// Authorizer requiring a fixed bearer token in the `Authorization` header.
#[derive(Debug, Clone)]
pub struct BearerTokenAuthorizer {
    token: String,
}

impl BearerTokenAuthorizer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl Authorizer for BearerTokenAuthorizer {
    async fn authorize(&self, request: &AuthRequest) -> std::result::Result<(), AuthRejection> {
        let presented = request
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match presented {
            Some(token) if token == self.token => Ok(()),
            Some(_) => Err(AuthRejection::with_status(
                StatusCode::FORBIDDEN,
                "Invalid token",
            )),
            None => Err(AuthRejection::unauthorized("Missing bearer token")),
        }
    }
}
