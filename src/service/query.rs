use std::sync::Arc;

use crate::store::{StoreResult, TokenStore};

/// Read-only view over pending tokens.
#[derive(Clone)]
pub struct TokenQuery {
    store: Arc<dyn TokenStore>,
}

impl TokenQuery {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    pub async fn pending_tokens(&self) -> StoreResult<Vec<String>> {
        self.store.list_pending().await
    }
}
