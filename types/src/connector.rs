//! Connector configuration and its validator.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::AdmissionConfig;

/// Authentication scheme used by a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    Basic,
    OAuth,
    Custom,
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

// Manual Debug impl to prevent leaking passwords in logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub kind: AuthKind,
    pub credentials: Option<Credentials>,
}

/// Static description of one connector instance.
///
/// ```toml
/// [connectors.shop]
/// base_url = "https://shop.example.com"
/// supported_actions = ["search_products", "get_product_details"]
///
/// [connectors.shop.auth]
/// type = "basic"
/// credentials = { username = "bot", password = "hunter2" }
///
/// [connectors.shop.rate_limit]
/// requests_per_minute = 30
/// concurrent = 2
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectorConfig {
    pub name: String,
    pub base_url: String,
    pub auth: Option<AuthConfig>,
    pub rate_limit: AdmissionConfig,
    /// Lower-cased action types this connector accepts. Empty accepts all.
    #[serde(default)]
    pub supported_actions: Vec<String>,
}

impl ConnectorConfig {
    /// Check the config before a connector is built from it.
    ///
    /// Every violation is collected; nothing short-circuits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new("Invalid connector configuration");

        if self.name.trim().is_empty() {
            errors.push("name", "Connector name is required");
        }

        if self.base_url.trim().is_empty() {
            errors.push("base_url", "Base URL is required");
        } else if Url::parse(&self.base_url).is_err() {
            errors.push("base_url", "Invalid base URL format");
        }

        match &self.auth {
            None => errors.push("auth", "Authentication configuration is required"),
            Some(auth) if auth.credentials.is_none() => {
                errors.push("credentials", "Authentication credentials are required");
            }
            Some(_) => {}
        }

        self.rate_limit.collect_violations(&mut errors);
        errors.into_result()
    }
}

/// A configuration was rejected before reaching the dispatch core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}: {}", describe_fields(.fields))]
pub struct ValidationError {
    message: String,
    fields: BTreeMap<String, String>,
}

impl ValidationError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.fields.insert(field.into(), reason.into());
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Field name to reason.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// `Ok(())` when no violation was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.fields.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn describe_fields(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(field, reason)| format!("{field}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}
