//! TOML configuration for Relay.
//!
//! ```toml
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 1000
//! max_delay_ms = 5000
//! backoff_factor = 2.0
//! retryable_errors = ["timeout", "network error", { pattern = "^HTTP 5\\d\\d" }]
//!
//! [connectors.shop]
//! base_url = "https://shop.example.com"
//! supported_actions = ["search_products"]
//! auth = { type = "basic", credentials = { username = "bot", password = "${SHOP_PASSWORD}" } }
//! rate_limit = { requests_per_minute = 30, concurrent = 2 }
//! ```
//!
//! The table name under `[connectors]` becomes the connector name.
//! `${VAR}` in credentials expands from the environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use relay_types::{
    AdmissionConfig, AuthConfig, ConnectorConfig, Credentials, ErrorMatcher, RetryPolicy,
    ValidationError,
};
use serde::Deserialize;
use thiserror::Error;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "RELAY_CONFIG";

#[derive(Debug, Default, Deserialize)]
pub struct RelayConfig {
    pub retry: Option<RetrySection>,
    #[serde(default)]
    pub connectors: BTreeMap<String, ConnectorSection>,
}

/// `[retry]`. Omitted fields fall back to [`RetryPolicy::default`].
#[derive(Debug, Default, Deserialize)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub retryable_errors: Option<Vec<ErrorMatcher>>,
}

/// `[connectors.<name>]`.
#[derive(Debug, Deserialize)]
pub struct ConnectorSection {
    pub base_url: String,
    pub auth: Option<AuthConfig>,
    pub rate_limit: AdmissionConfig,
    #[serde(default)]
    pub supported_actions: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("[{section}] {source}")]
    Invalid {
        section: String,
        source: ValidationError,
    },
}

impl ConfigError {
    /// The file involved, when the failure happened at the IO or parse stage.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Invalid { .. } => None,
        }
    }
}

impl RelayConfig {
    /// Load from [`config_path`]. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Option<Self>, ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file");
            return Ok(None);
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read { path, source: err });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse { path, source: err })
            }
        }
    }

    /// Validated connector configs, in name order.
    ///
    /// Stops at the first invalid section.
    pub fn connector_configs(&self) -> Result<Vec<ConnectorConfig>, ConfigError> {
        self.connectors
            .iter()
            .map(|(name, section)| {
                let config = section.to_connector_config(name);
                config.validate().map_err(|source| ConfigError::Invalid {
                    section: format!("connectors.{name}"),
                    source,
                })?;
                Ok(config)
            })
            .collect()
    }

    /// The validated retry policy; defaults when `[retry]` is absent.
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        let policy = self
            .retry
            .as_ref()
            .map_or_else(RetryPolicy::default, RetrySection::to_policy);
        policy.validate().map_err(|source| ConfigError::Invalid {
            section: "retry".to_string(),
            source,
        })?;
        Ok(policy)
    }
}

impl RetrySection {
    #[must_use]
    pub fn to_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            initial_delay: self
                .initial_delay_ms
                .map_or(defaults.initial_delay, Duration::from_millis),
            max_delay: self
                .max_delay_ms
                .map_or(defaults.max_delay, Duration::from_millis),
            backoff_factor: self.backoff_factor.unwrap_or(defaults.backoff_factor),
            retryable_errors: self.retryable_errors.clone(),
        }
    }
}

impl ConnectorSection {
    /// Build the named config. Action types are lower-cased to match
    /// standardized requests.
    #[must_use]
    pub fn to_connector_config(&self, name: &str) -> ConnectorConfig {
        let auth = self.auth.as_ref().map(|auth| AuthConfig {
            kind: auth.kind,
            credentials: auth.credentials.as_ref().map(|c| Credentials {
                username: expand_env_vars(&c.username),
                password: expand_env_vars(&c.password),
            }),
        });
        ConnectorConfig {
            name: name.to_string(),
            base_url: self.base_url.trim().to_string(),
            auth,
            rate_limit: self.rate_limit,
            supported_actions: self
                .supported_actions
                .iter()
                .map(|action| action.trim().to_lowercase())
                .collect(),
        }
    }
}

/// Replace each `${VAR}` with its environment value (empty when unset).
///
/// An unclosed `${` is kept as-is; `${}` is dropped.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let var = &after[..close];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

/// `$RELAY_CONFIG` if set and non-empty, else `~/.relay/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".relay").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::AuthKind;

    const SAMPLE: &str = r#"
[retry]
max_attempts = 4
initial_delay_ms = 250
retryable_errors = ["timeout", { pattern = "^HTTP 5\\d\\d" }]

[connectors.shop]
base_url = " https://shop.example.com "
supported_actions = ["Search_Products", "get_product_details"]
auth = { type = "basic", credentials = { username = "bot", password = "hunter2" } }
rate_limit = { requests_per_minute = 30, concurrent = 2 }

[connectors.news]
base_url = "https://news.example.com"
auth = { type = "oauth", credentials = { username = "id", password = "secret" } }
rate_limit = { requests_per_minute = 120, concurrent = 4 }
"#;

    // expand_env_vars tests

    #[test]
    fn expand_env_vars_no_vars() {
        assert_eq!(expand_env_vars("hello world"), "hello world");
    }

    #[test]
    fn expand_env_vars_single_var() {
        unsafe {
            env::set_var("RELAY_TEST_SINGLE_VAR", "replaced");
        }
        let result = expand_env_vars("prefix ${RELAY_TEST_SINGLE_VAR} suffix");
        assert_eq!(result, "prefix replaced suffix");
        unsafe {
            env::remove_var("RELAY_TEST_SINGLE_VAR");
        }
    }

    #[test]
    fn expand_env_vars_missing_var_becomes_empty() {
        unsafe {
            env::remove_var("RELAY_TEST_MISSING_VAR");
        }
        assert_eq!(
            expand_env_vars("before ${RELAY_TEST_MISSING_VAR} after"),
            "before  after"
        );
    }

    #[test]
    fn expand_env_vars_unclosed_brace_preserved() {
        assert_eq!(expand_env_vars("test ${UNCLOSED"), "test ${UNCLOSED");
    }

    #[test]
    fn expand_env_vars_empty_var_name_dropped() {
        assert_eq!(expand_env_vars("test ${} more"), "test  more");
    }

    #[test]
    fn expand_env_vars_unicode_content() {
        assert_eq!(expand_env_vars("héllo ${} wörld"), "héllo  wörld");
    }

    // RelayConfig tests

    #[test]
    fn parse_empty_config() {
        let config: RelayConfig = toml::from_str("").unwrap();
        assert!(config.retry.is_none());
        assert!(config.connectors.is_empty());
        assert_eq!(config.retry_policy().unwrap(), RetryPolicy::default());
        assert!(config.connector_configs().unwrap().is_empty());
    }

    #[test]
    fn parse_sample_config() {
        let config: RelayConfig = toml::from_str(SAMPLE).unwrap();

        let connectors = config.connector_configs().unwrap();
        let names: Vec<&str> = connectors.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["news", "shop"]);

        let shop = &connectors[1];
        assert_eq!(shop.base_url, "https://shop.example.com");
        assert_eq!(shop.supported_actions, ["search_products", "get_product_details"]);
        assert_eq!(shop.rate_limit, AdmissionConfig::new(30, 2));
        assert_eq!(shop.auth.as_ref().map(|a| a.kind), Some(AuthKind::Basic));
        assert_eq!(connectors[0].auth.as_ref().map(|a| a.kind), Some(AuthKind::OAuth));
    }

    #[test]
    fn retry_section_overrides_defaults() {
        let config: RelayConfig = toml::from_str(SAMPLE).unwrap();
        let policy = config.retry_policy().unwrap();

        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
        assert!((policy.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert!(policy.is_retryable("gateway timeout"));
        assert!(policy.is_retryable("HTTP 502 Bad Gateway"));
        assert!(!policy.is_retryable("HTTP 404 Not Found"));
    }

    #[test]
    fn invalid_retry_section_is_rejected() {
        let config: RelayConfig = toml::from_str(
            "[retry]\nmax_attempts = 0\ninitial_delay_ms = 900\nmax_delay_ms = 100\n",
        )
        .unwrap();

        let err = config.retry_policy().unwrap_err();
        let ConfigError::Invalid { section, source } = &err else {
            panic!("expected Invalid, got {err:?}");
        };
        assert_eq!(section, "retry");
        assert!(source.fields().contains_key("max_attempts"));
        assert!(source.fields().contains_key("max_delay"));
        assert!(err.path().is_none());
    }

    #[test]
    fn invalid_connector_section_names_the_section() {
        let config: RelayConfig = toml::from_str(
            r#"
[connectors.broken]
base_url = "not a url"
rate_limit = { requests_per_minute = 0, concurrent = 1 }
"#,
        )
        .unwrap();

        let err = config.connector_configs().unwrap_err();
        assert!(
            err.to_string()
                .starts_with("[connectors.broken] Invalid connector configuration: ")
        );
        let ConfigError::Invalid { source, .. } = err else {
            panic!("expected Invalid");
        };
        assert_eq!(
            source.fields().keys().collect::<Vec<_>>(),
            ["auth", "base_url", "requests_per_minute"]
        );
    }

    #[test]
    fn unknown_auth_type_fails_to_parse() {
        let result: Result<RelayConfig, _> = toml::from_str(
            r#"
[connectors.shop]
base_url = "https://shop.example.com"
auth = { type = "kerberos" }
rate_limit = { requests_per_minute = 1, concurrent = 1 }
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn credentials_expand_from_environment() {
        unsafe {
            env::set_var("RELAY_TEST_SHOP_PASSWORD", "s3cret");
        }
        let section: ConnectorSection = toml::from_str(
            r#"
base_url = "https://shop.example.com"
auth = { type = "custom", credentials = { username = "bot", password = "${RELAY_TEST_SHOP_PASSWORD}" } }
rate_limit = { requests_per_minute = 1, concurrent = 1 }
"#,
        )
        .unwrap();
        let config = section.to_connector_config("shop");
        unsafe {
            env::remove_var("RELAY_TEST_SHOP_PASSWORD");
        }

        let credentials = config.auth.unwrap().credentials.unwrap();
        assert_eq!(credentials.password, "s3cret");
        assert!(!format!("{credentials:?}").contains("s3cret"));
    }

    #[test]
    fn config_error_path_accessor() {
        let path = PathBuf::from("/test/path");
        let err = ConfigError::Read {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(err.path(), Some(path.as_path()));

        let parse_err = ConfigError::Parse {
            path: path.clone(),
            source: toml::from_str::<RelayConfig>("invalid toml [").unwrap_err(),
        };
        assert_eq!(parse_err.path(), Some(path.as_path()));
    }
}
