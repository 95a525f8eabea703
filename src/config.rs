use crate::qr::QrConfig;
use crate::store::StoreConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Pool size. Unset means the backend default (1 for SQLite files, 5 for Postgres).
    pub db_max_connections: Option<u32>,
    /// Single allowed CORS origin. Any origin is allowed when unset.
    pub cors_origin: Option<String>,
    pub qr_module_size: u32,
    pub qr_quiet_zone: bool,
    pub log_format: LogFormat,
}

impl Config {
    pub fn store(&self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url.clone(),
            max_connections: self.db_max_connections,
        }
    }

    pub fn qr(&self) -> QrConfig {
        QrConfig {
            module_size: self.qr_module_size,
            quiet_zone: self.qr_quiet_zone,
        }
    }

    /// Build from an arbitrary variable source. Malformed values fall back to defaults.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Config {
            port: get("PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
            database_url: get("DATABASE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "sqlite://database.db".into()),
            db_max_connections: get("QRPASS_DB_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .filter(|n: &u32| *n > 0),
            cors_origin: get("QRPASS_CORS_ORIGIN")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            qr_module_size: get("QRPASS_QR_MODULE_SIZE")
                .and_then(|v| v.parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(10),
            qr_quiet_zone: get("QRPASS_QR_QUIET_ZONE")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(true),
            log_format: match get("QRPASS_LOG_FORMAT").as_deref().map(str::trim) {
                Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    Ok(Config::from_lookup(|key| std::env::var(key).ok()))
}
