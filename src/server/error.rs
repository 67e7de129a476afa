use crate::arkiv::LedgerError;
use crate::explorer::{CursorError, HistoryError, IndexError};
use crate::metrics::SnapshotError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Seconds a client should wait after a ledger write conflict.
const CONFLICT_RETRY_SECS: u64 = 5;

/// Errors surfaced at the HTTP edge.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    TooManyRequests {
        message: String,
        reason: &'static str,
        retry_after_secs: u64,
    },
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, reason, retry) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None, None),
            ApiError::TooManyRequests {
                message,
                reason,
                retry_after_secs,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                message,
                Some(reason),
                Some(retry_after_secs),
            ),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None, None)
            }
        };

        let body = Json(ErrorBody {
            ok: false,
            error: message,
            reason,
            retry_after_seconds: retry,
        });
        let mut response = (status, body).into_response();
        if let Some(secs) = retry {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Pending => ApiError::TooManyRequests {
                message: e.to_string(),
                reason: "transaction_pending",
                retry_after_secs: CONFLICT_RETRY_SECS,
            },
            LedgerError::Conflict(_) => ApiError::TooManyRequests {
                message: e.to_string(),
                reason: "conflict",
                retry_after_secs: CONFLICT_RETRY_SECS,
            },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<SnapshotError> for ApiError {
    fn from(e: SnapshotError) -> Self {
        match e {
            SnapshotError::TooSoon {
                retry_after_secs, ..
            } => ApiError::TooManyRequests {
                message: e.to_string(),
                reason: "snapshot_too_recent",
                retry_after_secs,
            },
            SnapshotError::Conflict(_) => ApiError::TooManyRequests {
                message: e.to_string(),
                reason: "conflict",
                retry_after_secs: CONFLICT_RETRY_SECS,
            },
            SnapshotError::UnknownOperation(_) => ApiError::BadRequest(e.to_string()),
            SnapshotError::Ledger(inner) => inner.into(),
        }
    }
}

impl From<CursorError> for ApiError {
    fn from(e: CursorError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<HistoryError> for ApiError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::Unsupported(_) => ApiError::BadRequest(e.to_string()),
            HistoryError::Ledger(inner) => inner.into(),
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(e: IndexError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}
