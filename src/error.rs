//! Error taxonomy shared by the upgrade handler, the hub, and subscriber
//! sessions. Auth/access/not-found errors reject the websocket upgrade at
//! the HTTP layer (via [`IntoResponse`]); everything else is reported as an
//! `error` wire frame or a transport close, since by that point there is no
//! HTTP response left to send.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("invalid or expired credential")]
    AuthFailure,

    #[error("principal lacks access to document")]
    AccessDenied,

    #[error("document not found")]
    DocumentNotFound,

    #[error("unparseable or schema-violating frame: {0}")]
    InvalidFrame(String),

    #[error("operation failed validation after transform")]
    InvalidOperation,

    #[error("base_version is older than the retained window")]
    ResyncRequired,

    #[error("outbound queue overflowed")]
    SlowConsumer,

    #[error("internal fault: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The `code` field sent in an `error` wire frame, per the wire protocol
    /// table. `None` for errors that never reach the frame layer (they
    /// terminate the upgrade instead).
    pub fn wire_code(&self) -> Option<&'static str> {
        match self {
            Error::AuthFailure | Error::AccessDenied | Error::DocumentNotFound => None,
            Error::InvalidFrame(_) => None, // logged and dropped, no frame sent
            Error::InvalidOperation => Some("invalid_operation"),
            Error::ResyncRequired => Some("resync_required"),
            Error::SlowConsumer => None, // transport is closed, not framed
            Error::Internal(_) => Some("internal"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let code = self.wire_code();
        let status = match self {
            Error::AuthFailure => StatusCode::UNAUTHORIZED,
            Error::AccessDenied => StatusCode::FORBIDDEN,
            Error::DocumentNotFound => StatusCode::NOT_FOUND,
            Error::InvalidFrame(_) | Error::InvalidOperation => StatusCode::BAD_REQUEST,
            Error::ResyncRequired => StatusCode::CONFLICT,
            Error::SlowConsumer => StatusCode::REQUEST_TIMEOUT,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": {
                "message": message,
                "code": code,
            }
        }));
        (status, body).into_response()
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidFrame(err.to_string())
    }
}
