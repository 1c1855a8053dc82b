//! Configuration module for the notes service.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    /// Release metadata endpoint; update checks are disabled when unset
    pub releases_url: Option<String>,
    /// Timeout for the release metadata request
    pub update_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("NOTES_API_PSK").ok().filter(|k| !k.is_empty());

        let db_path = env::var("NOTES_DB_PATH")
            .unwrap_or_else(|_| "./data/notes.sqlite".to_string())
            .into();

        let bind_addr = env::var("NOTES_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| AppError::Validation(format!("Invalid NOTES_BIND_ADDR: {}", e)))?;

        let log_level = env::var("NOTES_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_json = match env::var("NOTES_LOG_JSON") {
            Ok(v) => parse_flag(&v)
                .ok_or_else(|| AppError::Validation(format!("Invalid NOTES_LOG_JSON: {}", v)))?,
            Err(_) => false,
        };

        let releases_url = env::var("NOTES_RELEASES_URL")
            .ok()
            .filter(|u| !u.is_empty());

        let update_timeout = match env::var("NOTES_UPDATE_TIMEOUT_SECS") {
            Ok(v) => v.parse::<u64>().map(Duration::from_secs).map_err(|e| {
                AppError::Validation(format!("Invalid NOTES_UPDATE_TIMEOUT_SECS: {}", e))
            })?,
            Err(_) => Duration::from_secs(10),
        };

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            log_json,
            releases_url,
            update_timeout,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 7] = [
        "NOTES_API_PSK",
        "NOTES_DB_PATH",
        "NOTES_BIND_ADDR",
        "NOTES_LOG_LEVEL",
        "NOTES_LOG_JSON",
        "NOTES_RELEASES_URL",
        "NOTES_UPDATE_TIMEOUT_SECS",
    ];

    // Both cases share process env, so they run in one test.
    #[test]
    fn test_config_from_env() {
        for var in VARS {
            env::remove_var(var);
        }

        let config = Config::from_env().unwrap();

        assert!(config.api_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/notes.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
        assert!(config.releases_url.is_none());
        assert_eq!(config.update_timeout, Duration::from_secs(10));

        env::set_var("NOTES_BIND_ADDR", "not-an-address");
        assert!(matches!(Config::from_env(), Err(AppError::Validation(_))));

        env::set_var("NOTES_BIND_ADDR", "0.0.0.0:9000");
        env::set_var("NOTES_LOG_JSON", "yes");
        env::set_var("NOTES_UPDATE_TIMEOUT_SECS", "3");
        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert!(config.log_json);
        assert_eq!(config.update_timeout, Duration::from_secs(3));

        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
