//! The HTTP error boundary.
//!
//! Every handler returns [`ApiError`] on failure; this is the one place error
//! kinds become status codes. Internal failures (and panics, via
//! [`panic_response`]) answer with a generic message. Their detail rides along
//! as an [`InternalDetail`] response extension and is only written into the
//! body by [`reveal_internal_detail`] for requests carrying the configured
//! debug secret.

use std::any::Any;

use axum::Json;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::consts::DEBUG_SECRET_HEADER;
use crate::etag::{CodecError, format_etag};
use crate::state::StoreError;

use super::AppContext;
use super::conditional::Served;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("precondition required: send If-Match with the resource's ETag, or If-None-Match: *")]
  PreconditionRequired,

  /// Carries the current representation, when there is one, so the caller can retry.
  #[error("precondition failed: the resource changed since it was read")]
  PreconditionFailed(Option<Served>),

  #[error("{0}")]
  BadRequest(String),

  /// Lost a race with another writer; the whole read-merge-write may be retried.
  #[error("{0}")]
  Conflict(String),

  #[error("{0}")]
  NotFound(String),

  #[error("internal server error")]
  Internal(String),
}

/// Diagnostic text of a 500 response, held back from the body by default.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::PreconditionRequired => StatusCode::PRECONDITION_REQUIRED,
      ApiError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    match self {
      ApiError::PreconditionFailed(Some(current)) => {
        debug!("precondition failed, returning current representation");
        current.into_response_with(status)
      }
      ApiError::Internal(detail) => {
        error!(detail = %detail, "internal error");
        let mut response = (status, Json(json!({ "error": "internal server error" }))).into_response();
        response.extensions_mut().insert(InternalDetail(detail));
        response
      }
      other => {
        debug!(status = %status, error = %other, "request rejected");
        (status, Json(json!({ "error": other.to_string() }))).into_response()
      }
    }
  }
}

impl From<StoreError> for ApiError {
  fn from(e: StoreError) -> Self {
    if e.is_retryable() {
      ApiError::Conflict(e.to_string())
    } else {
      ApiError::Internal(e.to_string())
    }
  }
}

impl From<CodecError> for ApiError {
  fn from(e: CodecError) -> Self {
    match e {
      CodecError::Serialize(_) => ApiError::Internal(e.to_string()),
      CodecError::Parse(_) | CodecError::NotAnObject => ApiError::BadRequest(e.to_string()),
    }
  }
}

/// Handler for `CatchPanicLayer`: a panic becomes an ordinary internal error.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
  let message = if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else {
    "unknown panic".to_string()
  };
  ApiError::Internal(format!("handler panicked: {message}")).into_response()
}

/// Middleware that swaps a 500's generic body for its [`InternalDetail`] when
/// the request presented the configured debug secret.
pub async fn reveal_internal_detail(State(ctx): State<AppContext>, request: Request, next: Next) -> Response {
  let authorized = match (&ctx.config.debug_secret, request.headers().get(DEBUG_SECRET_HEADER)) {
    (Some(secret), Some(presented)) => !secret.is_empty() && presented.as_bytes() == secret.as_bytes(),
    _ => false,
  };

  let mut response = next.run(request).await;
  if authorized && let Some(InternalDetail(detail)) = response.extensions_mut().remove::<InternalDetail>() {
    let body = json!({ "error": "internal server error", "detail": detail }).to_string();
    response
      .headers_mut()
      .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response.headers_mut().remove(header::CONTENT_LENGTH);
    *response.body_mut() = Body::from(body);
  }
  response
}

impl Served {
  /// The representation as a response: ETag header plus canary-carrying body.
  pub fn into_response_with(self, status: StatusCode) -> Response {
    let etag = format_etag(&self.fingerprint);
    (
      status,
      [
        (header::ETAG, etag),
        (header::CONTENT_TYPE, "application/json".to_string()),
      ],
      self.body,
    )
      .into_response()
  }
}
