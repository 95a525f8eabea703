use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;
use crate::metrics::InvalidationOutcome;
use crate::service::{InvalidateError, IssueError};
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct InvalidateRequest {
    /// Kept loose: any falsy JSON value counts as missing, any other
    /// non-string value simply names no token.
    pub token: Option<Value>,
}

enum TokenField {
    Missing,
    Text(String),
    NotText,
}

impl TokenField {
    fn from_json(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) | Some(Value::Bool(false)) => TokenField::Missing,
            Some(Value::String(s)) => TokenField::Text(s),
            Some(Value::Number(n)) if n.as_f64() == Some(0.0) => TokenField::Missing,
            Some(Value::Array(a)) if a.is_empty() => TokenField::Missing,
            Some(Value::Object(o)) if o.is_empty() => TokenField::Missing,
            Some(_) => TokenField::NotText,
        }
    }
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /generate_qr: issue a token and download it as `{token}.png`
pub async fn generate_qr(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let token = match state.issuer.issue_value().await {
        Ok(token) => token,
        Err(IssueError::Exhausted { attempts }) => {
            state.metrics.record_exhausted(attempts);
            return Err(AppError::IssuanceExhausted { attempts });
        }
        Err(e) => return Err(e.into()),
    };
    // The row is pending from here on, whether or not rendering succeeds.
    state.metrics.record_issued(token.attempts);

    let image = state.issuer.render(&token)?;

    let disposition = format!("attachment; filename=\"{}.png\"", token.value);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        image,
    ))
}

/// GET /api/tokens: values of all pending tokens
pub async fn list_tokens(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, AppError> {
    let tokens = state.query.pending_tokens().await?;
    Ok(Json(tokens))
}

/// POST /api/tokens/invalidate: redeem a token exactly once
pub async fn invalidate_token(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InvalidateRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    // Unparseable or missing bodies are treated the same as a missing token.
    let field = match payload {
        Ok(Json(req)) => TokenField::from_json(req.token),
        Err(rejection) => {
            tracing::debug!("invalidate: rejected body: {}", rejection);
            TokenField::Missing
        }
    };
    let token = match field {
        TokenField::Missing => String::new(),
        TokenField::Text(s) => s,
        TokenField::NotText => {
            tracing::debug!("invalidate: non-string token field");
            state.metrics.record_invalidation(InvalidationOutcome::NotFound);
            return Err(AppError::TokenNotFound);
        }
    };

    match state.invalidator.invalidate(&token).await {
        Ok(()) => {
            state.metrics.record_invalidation(InvalidationOutcome::Ok);
            Ok(Json(MessageResponse {
                message: "Token invalidated successfully".to_string(),
            }))
        }
        Err(e) => {
            let outcome = match &e {
                InvalidateError::InvalidInput => InvalidationOutcome::InvalidInput,
                InvalidateError::NotFound => InvalidationOutcome::NotFound,
                InvalidateError::AlreadyUsed => InvalidationOutcome::AlreadyUsed,
                InvalidateError::Store(_) => InvalidationOutcome::Error,
            };
            state.metrics.record_invalidation(outcome);
            Err(e.into())
        }
    }
}

/// GET /readyz: 200 once the store answers
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.store.health_check().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!("readiness check failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET /metrics: Prometheus text exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
}
