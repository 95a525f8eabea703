use std::sync::Arc;

use thiserror::Error;

use crate::models::token::log_prefix;
use crate::store::{MarkUsed, StoreError, TokenStore};

/// Why a redemption did not go through. Everything except `Store` is an
/// expected client outcome.
#[derive(Debug, Error)]
pub enum InvalidateError {
    #[error("token is required")]
    InvalidInput,

    #[error("token not found")]
    NotFound,

    #[error("token has already been used")]
    AlreadyUsed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct TokenInvalidator {
    store: Arc<dyn TokenStore>,
}

impl TokenInvalidator {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Redeem `value`. Among concurrent callers for the same pending value
    /// exactly one gets `Ok(())`, the rest get `AlreadyUsed`.
    pub async fn invalidate(&self, value: &str) -> Result<(), InvalidateError> {
        if value.is_empty() {
            return Err(InvalidateError::InvalidInput);
        }

        match self.store.mark_used(value).await? {
            MarkUsed::Marked => {
                tracing::info!(token = log_prefix(value), "token invalidated");
                Ok(())
            }
            MarkUsed::NotFound => {
                tracing::debug!(token = log_prefix(value), "invalidate: unknown token");
                Err(InvalidateError::NotFound)
            }
            MarkUsed::AlreadyUsed => {
                tracing::debug!(token = log_prefix(value), "invalidate: token already used");
                Err(InvalidateError::AlreadyUsed)
            }
        }
    }
}
