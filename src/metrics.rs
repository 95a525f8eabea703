//! Prometheus counters for the token lifecycle, served on `/metrics`.
//!
//! Each [`Metrics`] owns its registry so several app instances (tests,
//! embedded use) never collide on registration.

use prometheus::{opts, Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    tokens_issued_total: IntCounter,
    issue_collisions_total: IntCounter,
    invalidations_total: IntCounterVec,
}

/// Label values for `qrpass_invalidations_total{outcome}`.
#[derive(Debug, Clone, Copy)]
pub enum InvalidationOutcome {
    Ok,
    InvalidInput,
    NotFound,
    AlreadyUsed,
    Error,
}

impl InvalidationOutcome {
    fn as_label(self) -> &'static str {
        match self {
            InvalidationOutcome::Ok => "ok",
            InvalidationOutcome::InvalidInput => "invalid_input",
            InvalidationOutcome::NotFound => "not_found",
            InvalidationOutcome::AlreadyUsed => "already_used",
            InvalidationOutcome::Error => "error",
        }
    }
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let tokens_issued_total = IntCounter::with_opts(opts!(
            "qrpass_tokens_issued_total",
            "Tokens recorded as pending"
        ))?;
        let issue_collisions_total = IntCounter::with_opts(opts!(
            "qrpass_issue_collisions_total",
            "Generated token values rejected as duplicates"
        ))?;
        let invalidations_total = IntCounterVec::new(
            opts!("qrpass_invalidations_total", "Invalidation attempts by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(tokens_issued_total.clone()))?;
        registry.register(Box::new(issue_collisions_total.clone()))?;
        registry.register(Box::new(invalidations_total.clone()))?;

        Ok(Self {
            registry,
            tokens_issued_total,
            issue_collisions_total,
            invalidations_total,
        })
    }

    /// `attempts` is the number of inserts the issuance took.
    pub fn record_issued(&self, attempts: u32) {
        self.tokens_issued_total.inc();
        if attempts > 1 {
            self.issue_collisions_total.inc_by(u64::from(attempts - 1));
        }
    }

    pub fn record_exhausted(&self, attempts: u32) {
        self.issue_collisions_total.inc_by(u64::from(attempts));
    }

    pub fn record_invalidation(&self, outcome: InvalidationOutcome) {
        self.invalidations_total
            .with_label_values(&[outcome.as_label()])
            .inc();
    }

    /// Prometheus text exposition of this registry.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("metrics encoding failed: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
