use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::usecases::{
    jobs::JobStatusError, payment_webhook::ReconcileError, proposals::ProposalError,
};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn rejected(status: StatusCode, message: String) -> Self {
        AppError::Rejected { status, message }
    }
}

impl From<ProposalError> for AppError {
    fn from(err: ProposalError) -> Self {
        AppError::rejected(err.status_code(), err.to_string())
    }
}

impl From<JobStatusError> for AppError {
    fn from(err: JobStatusError) -> Self {
        AppError::rejected(err.status_code(), err.to_string())
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        AppError::rejected(err.status_code(), err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Rejected { status, message } if !status.is_server_error() => (status, message),
            // Server-side detail stays in the logs.
            AppError::Rejected { status, .. } => (status, "Internal server error".to_string()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            message,
        });

        (status, body).into_response()
    }
}
