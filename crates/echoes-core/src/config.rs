//! ============================================================================
//! Configuration - backend endpoint resolution
//! ============================================================================
//! The client consumes exactly one piece of external configuration: the
//! backend base URL, taken from ECHOES_BACKEND_URL (a .env file is honored)
//! and resolved once at process start.
//! ============================================================================

use once_cell::sync::Lazy;

/// Fallback when no environment override is present.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
}

impl BackendConfig {
    /// Build a config from an explicit base URL, normalizing trailing
    /// slashes so endpoint paths can be appended directly.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Read configuration from the environment.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("ECHOES_BACKEND_URL")
            .unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());
        Self::new(base_url)
    }
}

static CONFIG: Lazy<BackendConfig> = Lazy::new(BackendConfig::from_env);

/// Process-wide backend configuration, resolved on first access.
pub fn backend_config() -> &'static BackendConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_normalized() {
        let config = BackendConfig::new("http://10.0.0.5:5000/");
        assert_eq!(config.base_url, "http://10.0.0.5:5000");
    }

    #[test]
    fn test_plain_url_unchanged() {
        let config = BackendConfig::new(DEFAULT_BACKEND_URL);
        assert_eq!(config.base_url, "http://localhost:5000");
    }
}
