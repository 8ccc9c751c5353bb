//! Configuration file parser for `feedfilter.toml`.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as a warning since they are usually typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::proxy::FetchOptions;
use crate::util::UrlPolicy;

/// Overrides `admin_token` from the file.
pub const ADMIN_TOKEN_ENV: &str = "FEEDFILTER_ADMIN_TOKEN";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Server configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
///
/// SEC-015: Custom Debug impl masks `admin_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub listen_addr: String,

    /// SQLite database file holding feed definitions.
    pub database_path: String,

    /// Timeout for each upstream request attempt, in seconds.
    pub upstream_timeout_secs: u64,

    /// Redirect hops followed before giving up.
    pub max_redirects: usize,

    /// Upstream bodies larger than this are refused.
    pub max_feed_size_bytes: usize,

    /// Allow feed URLs that point at localhost or private networks.
    pub allow_private_upstreams: bool,

    /// The `/api` routes answer 403 unless this is set.
    pub admin_api_enabled: bool,

    /// Bearer token for the admin API. `FEEDFILTER_ADMIN_TOKEN` takes precedence.
    #[serde(deserialize_with = "deserialize_secret")]
    pub admin_token: Option<SecretString>,
}

impl Default for Config {
    fn default() -> Self {
        let fetch = FetchOptions::default();
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            database_path: "feedfilter.db".to_string(),
            upstream_timeout_secs: fetch.timeout.as_secs(),
            max_redirects: fetch.max_redirects,
            max_feed_size_bytes: fetch.max_body_bytes,
            allow_private_upstreams: false,
            admin_api_enabled: false,
            admin_token: None,
        }
    }
}

/// SEC-015: Mask admin_token in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("database_path", &self.database_path)
            .field("upstream_timeout_secs", &self.upstream_timeout_secs)
            .field("max_redirects", &self.max_redirects)
            .field("max_feed_size_bytes", &self.max_feed_size_bytes)
            .field("allow_private_upstreams", &self.allow_private_upstreams)
            .field("admin_api_enabled", &self.admin_api_enabled)
            .field(
                "admin_token",
                &self.admin_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "listen_addr",
        "database_path",
        "upstream_timeout_secs",
        "max_redirects",
        "max_feed_size_bytes",
        "allow_private_upstreams",
        "admin_api_enabled",
        "admin_token",
    ];

    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// - Missing file → defaults
    /// - Empty file → defaults
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(path)?;
        config.apply_env(std::env::var(ADMIN_TOKEN_ENV).ok());
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            listen_addr = %config.listen_addr,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// An empty environment value does not clear a token set in the file.
    fn apply_env(&mut self, admin_token: Option<String>) {
        if let Some(token) = admin_token.filter(|t| !t.is_empty()) {
            tracing::debug!("Using admin token from {}", ADMIN_TOKEN_ENV);
            self.admin_token = Some(SecretString::from(token));
        }
    }

    pub fn url_policy(&self) -> UrlPolicy {
        UrlPolicy::new(self.allow_private_upstreams)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(self.upstream_timeout_secs),
            max_redirects: self.max_redirects,
            max_body_bytes: self.max_feed_size_bytes,
            url_policy: self.url_policy(),
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(SecretString::from))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn write_config(name: &str, content: &str) -> (std::path::PathBuf, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "feedfilter_config_test_{}_{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feedfilter.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.database_path, "feedfilter.db");
        assert_eq!(config.upstream_timeout_secs, 10);
        assert_eq!(config.max_redirects, 3);
        assert_eq!(config.max_feed_size_bytes, 10 * 1024 * 1024);
        assert!(!config.allow_private_upstreams);
        assert!(!config.admin_api_enabled);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedfilter_test_nonexistent_config.toml");
        let config = Config::load_file(path).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (dir, path) = write_config("whitespace", "   \n  \n  ");
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.max_redirects, 3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "max_redirects = 5\n");
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.upstream_timeout_secs, 10);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let content = r#"
listen_addr = "0.0.0.0:9000"
database_path = "/var/lib/feedfilter/feeds.db"
upstream_timeout_secs = 30
max_redirects = 1
max_feed_size_bytes = 2048
allow_private_upstreams = true
admin_api_enabled = true
admin_token = "file-token"
"#;
        let (dir, path) = write_config("full", content);
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.database_path, "/var/lib/feedfilter/feeds.db");
        assert!(config.allow_private_upstreams);
        assert!(config.admin_api_enabled);
        assert_eq!(
            config.admin_token.as_ref().map(|t| t.expose_secret()),
            Some("file-token")
        );

        let fetch = config.fetch_options();
        assert_eq!(fetch.timeout, Duration::from_secs(30));
        assert_eq!(fetch.max_redirects, 1);
        assert_eq!(fetch.max_body_bytes, 2048);
        assert!(fetch.url_policy.allow_private);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");
        let err = Config::load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (dir, path) = write_config("unknown", "max_redirects = 2\ntheme = \"dark\"\n");
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.max_redirects, 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (dir, path) = write_config("wrongtype", "max_redirects = \"three\"\n");
        assert!(Config::load_file(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_env_token_overrides_file() {
        let mut config = Config {
            admin_token: Some(SecretString::from("file-token".to_string())),
            ..Config::default()
        };
        config.apply_env(Some("env-token".to_string()));
        assert_eq!(
            config.admin_token.as_ref().map(|t| t.expose_secret()),
            Some("env-token")
        );

        config.apply_env(Some(String::new()));
        assert_eq!(
            config.admin_token.as_ref().map(|t| t.expose_secret()),
            Some("env-token")
        );
    }

    // SEC-015: Debug output masks admin token
    #[test]
    fn test_debug_masks_admin_token() {
        let config = Config {
            admin_token: Some(SecretString::from("super-secret-token-12345".to_string())),
            ..Config::default()
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-token-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
