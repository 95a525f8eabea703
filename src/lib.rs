//! qrpass: single-use access tokens delivered as QR codes.
//!
//! Library crate shared by the `qrpass` binary and the integration tests in `tests/`.

use std::sync::Arc;

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod qr;
pub mod service;
pub mod store;

use qr::{PngQrEncoder, QrEncoder};
use service::{TokenInvalidator, TokenIssuer, TokenQuery};
use store::TokenStore;

/// Shared application state passed to handlers.
pub struct AppState {
    pub store: Arc<dyn TokenStore>,
    pub issuer: TokenIssuer,
    pub query: TokenQuery,
    pub invalidator: TokenInvalidator,
    pub metrics: metrics::Metrics,
    pub config: config::Config,
}

impl AppState {
    /// Wire the services around an already-opened store.
    pub fn new(store: Arc<dyn TokenStore>, config: config::Config) -> anyhow::Result<Self> {
        let encoder: Arc<dyn QrEncoder> = Arc::new(PngQrEncoder::new(config.qr()));
        Self::with_encoder(store, encoder, config)
    }

    pub fn with_encoder(
        store: Arc<dyn TokenStore>,
        encoder: Arc<dyn QrEncoder>,
        config: config::Config,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            issuer: TokenIssuer::new(store.clone(), encoder),
            query: TokenQuery::new(store.clone()),
            invalidator: TokenInvalidator::new(store.clone()),
            metrics: metrics::Metrics::new()?,
            store,
            config,
        })
    }
}
