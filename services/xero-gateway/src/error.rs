//! Request-boundary errors and the JSON response envelope
//!
//! Every `/xero` route answers with `{status, message, timestamp, data}`.
//! Failures carry `data: null`; the HTTP status follows the failure kind so
//! callers can tell "go through consent again" (401) from "Xero is having a
//! bad day" (502).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] xero_session::Error),

    #[error(transparent)]
    Xero(#[from] xero_auth::Error),

    /// No contact, invoice or payment matched the lookup.
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Session(err) if err.requires_consent() => StatusCode::UNAUTHORIZED,
            ApiError::Session(xero_session::Error::Provider(err)) => provider_status(err),
            ApiError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Xero(err) => provider_status(err),
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

fn provider_status(err: &xero_auth::Error) -> StatusCode {
    match err {
        xero_auth::Error::StateMismatch | xero_auth::Error::Callback(_) => StatusCode::BAD_REQUEST,
        xero_auth::Error::InvalidCredentials(_) | xero_auth::Error::MissingTokenSet => {
            StatusCode::UNAUTHORIZED
        }
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        envelope(status, &self.to_string(), Value::Null)
    }
}

/// `{status, message, timestamp, data}` with `status` mirrored in the body.
pub fn envelope(status: StatusCode, message: &str, data: Value) -> Response {
    (status, Json(envelope_body(status, message, data))).into_response()
}

/// Envelope body for handlers that add their own keys next to the standard ones.
pub fn envelope_body(status: StatusCode, message: &str, data: Value) -> Value {
    json!({
        "status": status.as_u16(),
        "message": message,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "data": data,
    })
}

pub fn success(data: Value) -> Response {
    envelope(StatusCode::OK, "Success", data)
}
