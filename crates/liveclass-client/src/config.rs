//! Client configuration.
//!
//! Configuration is loaded from environment variables. The bearer token is
//! redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default backend base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;

/// Upper bound for the request timeout. Archive calls block until the
/// backend has copied every recording, so the bound is generous.
pub const MAX_HTTP_TIMEOUT_SECONDS: u64 = 600;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 5;

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Backend base URL without a trailing slash.
    pub api_url: String,

    /// Optional bearer token forwarded on every request.
    pub api_token: Option<SecretString>,

    /// Whole-request timeout.
    pub http_timeout: Duration,

    /// TCP connect timeout.
    pub connect_timeout: Duration,

    /// Emit JSON-formatted logs from the binary.
    pub json_logs: bool,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("http_timeout", &self.http_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("json_logs", &self.json_logs)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid API URL: {0}")]
    InvalidApiUrl(String),

    #[error("Invalid timeout configuration: {0}")]
    InvalidTimeout(String),

    #[error("Invalid boolean for {name}: {value}")]
    InvalidBool { name: String, value: String },
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS),
            json_logs: false,
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at `api_url` with default timeouts.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.api_token = Some(token);
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_url = vars
            .get("LIVECLASS_API_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidApiUrl(format!(
                "LIVECLASS_API_URL must start with http:// or https://, got '{}'",
                api_url
            )));
        }

        let api_token = vars
            .get("LIVECLASS_API_TOKEN")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        let http_timeout_secs = parse_seconds(
            vars,
            "LIVECLASS_HTTP_TIMEOUT_SECONDS",
            DEFAULT_HTTP_TIMEOUT_SECONDS,
        )?;
        if http_timeout_secs > MAX_HTTP_TIMEOUT_SECONDS {
            return Err(ConfigError::InvalidTimeout(format!(
                "LIVECLASS_HTTP_TIMEOUT_SECONDS must not exceed {} seconds, got {}",
                MAX_HTTP_TIMEOUT_SECONDS, http_timeout_secs
            )));
        }

        let connect_timeout_secs = parse_seconds(
            vars,
            "LIVECLASS_CONNECT_TIMEOUT_SECONDS",
            DEFAULT_CONNECT_TIMEOUT_SECONDS,
        )?;

        let json_logs = match vars.get("LIVECLASS_LOG_JSON").map(|s| s.trim()) {
            None | Some("") => false,
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => true,
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => false,
            Some(v) => {
                return Err(ConfigError::InvalidBool {
                    name: "LIVECLASS_LOG_JSON".to_string(),
                    value: v.to_string(),
                })
            }
        };

        Ok(Self {
            api_url,
            api_token,
            http_timeout: Duration::from_secs(http_timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            json_logs,
        })
    }
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.trim().parse().map_err(|e| {
        ConfigError::InvalidTimeout(format!(
            "{} must be a valid positive integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidTimeout(format!(
            "{} must be greater than 0",
            name
        )));
    }

    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = ClientConfig::from_vars(&HashMap::new()).unwrap();

        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.api_token.is_none());
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(!config.json_logs);
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let config =
            ClientConfig::from_vars(&vars(&[("LIVECLASS_API_URL", "https://api.example.com/")]))
                .unwrap();
        assert_eq!(config.api_url, "https://api.example.com");

        assert_eq!(
            ClientConfig::new("http://localhost:9000//").api_url,
            "http://localhost:9000"
        );
    }

    #[test]
    fn test_rejects_non_http_url() {
        let result = ClientConfig::from_vars(&vars(&[("LIVECLASS_API_URL", "ftp://host")]));
        assert!(matches!(result, Err(ConfigError::InvalidApiUrl(_))));
    }

    #[test]
    fn test_token_is_read_and_redacted() {
        let config =
            ClientConfig::from_vars(&vars(&[("LIVECLASS_API_TOKEN", "secret-token-123")]))
                .unwrap();

        assert_eq!(
            config.api_token.as_ref().unwrap().expose_secret(),
            "secret-token-123"
        );
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret-token-123"));
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let config = ClientConfig::from_vars(&vars(&[("LIVECLASS_API_TOKEN", "  ")])).unwrap();
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_timeout_validation() {
        let zero = ClientConfig::from_vars(&vars(&[("LIVECLASS_HTTP_TIMEOUT_SECONDS", "0")]));
        assert!(matches!(zero, Err(ConfigError::InvalidTimeout(_))));

        let junk = ClientConfig::from_vars(&vars(&[("LIVECLASS_HTTP_TIMEOUT_SECONDS", "abc")]));
        assert!(matches!(junk, Err(ConfigError::InvalidTimeout(_))));

        let too_big =
            ClientConfig::from_vars(&vars(&[("LIVECLASS_HTTP_TIMEOUT_SECONDS", "601")]));
        assert!(matches!(too_big, Err(ConfigError::InvalidTimeout(_))));

        let ok = ClientConfig::from_vars(&vars(&[
            ("LIVECLASS_HTTP_TIMEOUT_SECONDS", "120"),
            ("LIVECLASS_CONNECT_TIMEOUT_SECONDS", "2"),
        ]))
        .unwrap();
        assert_eq!(ok.http_timeout, Duration::from_secs(120));
        assert_eq!(ok.connect_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_json_logs_flag() {
        let on = ClientConfig::from_vars(&vars(&[("LIVECLASS_LOG_JSON", "TRUE")])).unwrap();
        assert!(on.json_logs);

        let off = ClientConfig::from_vars(&vars(&[("LIVECLASS_LOG_JSON", "0")])).unwrap();
        assert!(!off.json_logs);

        let bad = ClientConfig::from_vars(&vars(&[("LIVECLASS_LOG_JSON", "yes please")]));
        assert!(matches!(bad, Err(ConfigError::InvalidBool { .. })));
    }
}
