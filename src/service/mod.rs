//! Token lifecycle operations layered over [`crate::store::TokenStore`].

pub mod invalidator;
pub mod issuer;
pub mod query;

pub use invalidator::{InvalidateError, TokenInvalidator};
pub use issuer::{IssueError, IssuedQr, IssuedToken, TokenIssuer, MAX_ISSUE_ATTEMPTS};
pub use query::TokenQuery;
