use std::sync::Arc;

use thiserror::Error;

use crate::models::token::log_prefix;
use crate::qr::{QrEncoder, QrError};
use crate::store::{StoreError, TokenStore};

/// Total insert attempts before issuance gives up.
pub const MAX_ISSUE_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("could not allocate a unique token value after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Encode(#[from] QrError),
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub id: i64,
    pub value: String,
    /// Number of inserts it took, 1 unless a generated value collided.
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct IssuedQr {
    pub token: IssuedToken,
    pub image: Vec<u8>,
}

type ValueGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Random UUIDv4 text: 122 bits from the OS CSPRNG.
pub fn generate_value() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Clone)]
pub struct TokenIssuer {
    store: Arc<dyn TokenStore>,
    encoder: Arc<dyn QrEncoder>,
    generate: ValueGenerator,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn TokenStore>, encoder: Arc<dyn QrEncoder>) -> Self {
        Self {
            store,
            encoder,
            generate: Arc::new(generate_value),
        }
    }

    /// Replace the value source. Tests use this to force collisions.
    pub fn with_generator<F>(mut self, generate: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.generate = Arc::new(generate);
        self
    }

    /// Record a new pending token and render it as a QR PNG.
    ///
    /// If rendering fails the row stays pending; tokens are never deleted.
    pub async fn issue(&self) -> Result<IssuedQr, IssueError> {
        let token = self.issue_value().await?;
        let image = self.render(&token)?;
        Ok(IssuedQr { token, image })
    }

    /// Render an already-recorded token as a QR PNG.
    pub fn render(&self, token: &IssuedToken) -> Result<Vec<u8>, QrError> {
        self.encoder.encode(&token.value)
    }

    /// Record a new pending token without rendering it.
    pub async fn issue_value(&self) -> Result<IssuedToken, IssueError> {
        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let value = (self.generate)();
            match self.store.create(&value).await {
                Ok(id) => {
                    tracing::info!(id, token = log_prefix(&value), attempt, "token issued");
                    return Ok(IssuedToken {
                        id,
                        value,
                        attempts: attempt,
                    });
                }
                Err(StoreError::DuplicateValue) => {
                    tracing::warn!(attempt, "generated token value collided, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(IssueError::Exhausted {
            attempts: MAX_ISSUE_ATTEMPTS,
        })
    }
}
