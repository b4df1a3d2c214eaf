//! API error handling
//!
//! Maps engine and store errors onto HTTP statuses with a JSON error body.
//! Invariant violations surface as 409s so clients can tell "you can't do
//! that right now" apart from "that doesn't exist".

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ops_billing::BillingError;
use ops_db::StoreError;
use ops_notifications::SinkError;
use ops_payroll::PayrollError;
use ops_timer::TimerError;
use serde::Serialize;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Validation(String),
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::Validation(_) => "validation_failed",
            ApiError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(message) = &self {
            tracing::error!(%message, "internal error surfaced to client");
        }
        let status = self.status_code();
        let code = self.code();
        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Validation(msg)
            | ApiError::Internal(msg) => msg,
        };
        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::Conflict(what) => ApiError::Conflict(what),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<TimerError> for ApiError {
    fn from(error: TimerError) -> Self {
        match error {
            TimerError::NotFound(_) | TimerError::ProjectNotFound(_) => {
                ApiError::NotFound(error.to_string())
            }
            TimerError::OpenTimerExists { .. }
            | TimerError::PausedTimerExists { .. }
            | TimerError::NoActiveTimer(_)
            | TimerError::NotRunning(_)
            | TimerError::NotPaused(_)
            | TimerError::EntryOpen(_) => ApiError::Conflict(error.to_string()),
            TimerError::Store(store) => store.into(),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(error: BillingError) -> Self {
        match error {
            BillingError::InvoiceNotFound(_)
            | BillingError::ProjectNotFound(_)
            | BillingError::ClientNotFound(_) => ApiError::NotFound(error.to_string()),
            BillingError::UnknownStatus(_) => ApiError::BadRequest(error.to_string()),
            BillingError::NotEditable { .. }
            | BillingError::ItemsFrozen(_)
            | BillingError::InvalidTransition { .. } => ApiError::Conflict(error.to_string()),
            BillingError::Validation(errors) => ApiError::Validation(errors.to_string()),
            BillingError::Store(store) => store.into(),
        }
    }
}

impl From<PayrollError> for ApiError {
    fn from(error: PayrollError) -> Self {
        match error {
            PayrollError::RunNotFound(_) => ApiError::NotFound(error.to_string()),
            PayrollError::NotLockable { .. } | PayrollError::NotPayable { .. } => {
                ApiError::Conflict(error.to_string())
            }
            PayrollError::Store(store) => store.into(),
        }
    }
}

impl From<SinkError> for ApiError {
    fn from(error: SinkError) -> Self {
        ApiError::Internal(error.to_string())
    }
}
