use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a single-use token.
/// `Pending → Used` is the only transition; `Used` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Pending,
    Used,
}

impl TokenState {
    /// The persisted form is the boolean `used` column.
    pub fn from_used(used: bool) -> Self {
        if used {
            TokenState::Used
        } else {
            TokenState::Pending
        }
    }

    pub fn is_used(self) -> bool {
        matches!(self, TokenState::Used)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenState::Pending => "pending",
            TokenState::Used => "used",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Token {
    pub id: i64,
    pub value: String,
    pub state: TokenState,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

/// Row shape shared by the SQLite and Postgres backends.
#[derive(Debug, sqlx::FromRow)]
pub struct TokenRow {
    pub id: i64,
    pub token: String,
    pub used: bool,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl From<TokenRow> for Token {
    fn from(row: TokenRow) -> Self {
        Token {
            id: row.id,
            value: row.token,
            state: TokenState::from_used(row.used),
            created_at: row.created_at,
            used_at: row.used_at,
        }
    }
}

/// Shortened form of a token value for log lines. Full values are never logged.
pub fn log_prefix(value: &str) -> &str {
    let end = value
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(value.len());
    &value[..end]
}
