use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::qr::QrError;
use crate::service::{InvalidateError, IssueError};
use crate::store::StoreError;

/// HTTP-facing error. Component errors are converted here and nowhere else.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("token is required")]
    TokenRequired,

    #[error("token not found")]
    TokenNotFound,

    #[error("token already used")]
    TokenAlreadyUsed,

    #[error("issuance exhausted after {attempts} attempts")]
    IssuanceExhausted { attempts: u32 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("qr error: {0}")]
    Qr(#[from] QrError),
}

impl From<InvalidateError> for AppError {
    fn from(e: InvalidateError) -> Self {
        match e {
            InvalidateError::InvalidInput => AppError::TokenRequired,
            InvalidateError::NotFound => AppError::TokenNotFound,
            InvalidateError::AlreadyUsed => AppError::TokenAlreadyUsed,
            InvalidateError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<IssueError> for AppError {
    fn from(e: IssueError) -> Self {
        match e {
            IssueError::Exhausted { attempts } => AppError::IssuanceExhausted { attempts },
            IssueError::Store(e) => AppError::Store(e),
            IssueError::Encode(e) => AppError::Qr(e),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::TokenRequired | AppError::TokenAlreadyUsed => StatusCode::BAD_REQUEST,
            AppError::TokenNotFound => StatusCode::NOT_FOUND,
            AppError::IssuanceExhausted { .. } | AppError::Store(_) | AppError::Qr(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::TokenRequired => "token_required",
            AppError::TokenNotFound => "token_not_found",
            AppError::TokenAlreadyUsed => "token_already_used",
            AppError::IssuanceExhausted { .. } => "issuance_exhausted",
            AppError::Store(_) => "store_unavailable",
            AppError::Qr(_) => "qr_encoding_failed",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let msg = match &self {
            AppError::TokenRequired => "Token is required".to_string(),
            AppError::TokenNotFound => "Token not found".to_string(),
            AppError::TokenAlreadyUsed => "Token has already been used".to_string(),
            AppError::IssuanceExhausted { attempts } => {
                tracing::error!(attempts, "token issuance exhausted its retry budget");
                "could not issue a token".to_string()
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {}", e);
                "token store unavailable".to_string()
            }
            AppError::Qr(e) => {
                tracing::error!("QR encoding error: {}", e);
                "could not render QR code".to_string()
            }
        };

        let body = Json(json!({
            "error": msg,
            "code": self.code(),
        }));

        (self.status(), body).into_response()
    }
}
