//! Configuration module for the wiki backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Externally reachable base URL, used for links in notifications
    pub public_url: String,
    /// Password for the seeded `admin` account; no seeding when unset
    pub admin_password: Option<String>,
    /// Reject saves whose base revision is no longer current
    pub strict_save: bool,
    /// Minimum accepted password length
    pub min_password_len: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let db_path = env::var("WIKIDOCS_DB_PATH")
            .unwrap_or_else(|_| "./data/wiki.sqlite".to_string())
            .into();

        let bind_addr = env::var("WIKIDOCS_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid WIKIDOCS_BIND_ADDR format");

        let log_level = env::var("WIKIDOCS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let public_url = env::var("WIKIDOCS_PUBLIC_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        let admin_password = env::var("WIKIDOCS_ADMIN_PASSWORD")
            .ok()
            .filter(|p| !p.is_empty());

        let strict_save = env::var("WIKIDOCS_STRICT_SAVE")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        let min_password_len = env::var("WIKIDOCS_MIN_PASSWORD_LEN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8);

        Self {
            db_path,
            bind_addr,
            log_level,
            public_url,
            admin_password,
            strict_save,
            min_password_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests in this module mutate process-wide environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 7] = [
        "WIKIDOCS_DB_PATH",
        "WIKIDOCS_BIND_ADDR",
        "WIKIDOCS_LOG_LEVEL",
        "WIKIDOCS_PUBLIC_URL",
        "WIKIDOCS_ADMIN_PASSWORD",
        "WIKIDOCS_STRICT_SAVE",
        "WIKIDOCS_MIN_PASSWORD_LEN",
    ];

    #[test]
    fn test_default_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        for var in VARS {
            env::remove_var(var);
        }

        let config = Config::from_env();

        assert_eq!(config.db_path, PathBuf::from("./data/wiki.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.public_url, "http://localhost:8080");
        assert!(config.admin_password.is_none());
        assert!(!config.strict_save);
        assert_eq!(config.min_password_len, 8);
    }

    #[test]
    fn test_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        for var in VARS {
            env::remove_var(var);
        }
        env::set_var("WIKIDOCS_PUBLIC_URL", "https://wiki.example.com/");
        env::set_var("WIKIDOCS_STRICT_SAVE", "TRUE");
        env::set_var("WIKIDOCS_MIN_PASSWORD_LEN", "12");
        env::set_var("WIKIDOCS_ADMIN_PASSWORD", "");

        let config = Config::from_env();

        assert_eq!(config.public_url, "https://wiki.example.com");
        assert!(config.strict_save);
        assert_eq!(config.min_password_len, 12);
        assert!(config.admin_password.is_none());

        for var in VARS {
            env::remove_var(var);
        }
    }
}
