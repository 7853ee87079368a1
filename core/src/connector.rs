//! Connector capability and the admission-guarded connector.
//!
//! The dispatcher only ever sees [`Connector`]. Target-specific work lives
//! behind [`ActionHandler`]; [`GuardedConnector`] wraps a handler with the
//! connector-internal concerns: supported-action filtering, one-time
//! authentication, optional retry, and admission control around each attempt.

use std::future::Future;
use std::pin::Pin;

use relay_types::{ActionRequest, ActionResponse, ConnectorConfig, ValidationError};
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::admission::AdmissionController;
use crate::retry::RetryExecutor;

/// Error code for a handler failure reported as a soft [`ActionResponse`].
pub const ACTION_FAILED: &str = "ACTION_FAILED";

/// Connector future type alias.
pub type ActionFut<'a> =
    Pin<Box<dyn Future<Output = Result<ActionResponse, ConnectorError>> + Send + 'a>>;

/// Handler future type alias.
pub type HandlerFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, ConnectorError>> + Send + 'a>>;

/// Hard connector failures. Soft failures are `ActionResponse::Failure` values.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Unsupported action type: {action_type}")]
    UnsupportedAction { action_type: String },
    #[error("Authentication failed: {message}")]
    Authentication { message: String },
    #[error("{message}")]
    Execution { message: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConnectorError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }
}

/// A pluggable action executor, registered by name.
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;
    fn execute_action<'a>(&'a self, request: ActionRequest) -> ActionFut<'a>;
}

/// Target-specific half of a [`GuardedConnector`].
pub trait ActionHandler: Send + Sync {
    /// Runs once, before the first action. Failure is a hard error.
    fn authenticate<'a>(&'a self, _config: &'a ConnectorConfig) -> HandlerFut<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    /// Carry out one attempt of `request`. Called while holding an admission permit.
    fn perform<'a>(
        &'a self,
        config: &'a ConnectorConfig,
        request: &'a ActionRequest,
    ) -> HandlerFut<'a, ActionResponse>;
}

/// Connector that gates its handler behind its own admission controller.
pub struct GuardedConnector<H> {
    config: ConnectorConfig,
    handler: H,
    admission: AdmissionController,
    retry: Option<RetryExecutor>,
    authenticated: OnceCell<()>,
}

impl<H: ActionHandler> GuardedConnector<H> {
    /// Validate `config` and build the connector with a default admission controller.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: ConnectorConfig, handler: H) -> Result<Self, ValidationError> {
        config.validate()?;
        let admission = AdmissionController::new(config.rate_limit);
        Ok(Self::from_parts(config, handler, admission))
    }

    /// Build from an already-validated config and a caller-supplied controller.
    #[must_use]
    pub fn from_parts(config: ConnectorConfig, handler: H, admission: AdmissionController) -> Self {
        Self {
            config,
            handler,
            admission,
            retry: None,
            authenticated: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = Some(retry);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    #[must_use]
    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    #[must_use]
    pub fn supports(&self, action_type: &str) -> bool {
        self.config.supported_actions.is_empty()
            || self
                .config
                .supported_actions
                .iter()
                .any(|supported| supported == action_type)
    }

    async fn attempt(&self, request: &ActionRequest) -> Result<ActionResponse, ConnectorError> {
        let _permit = self.admission.acquire().await;
        self.handler.perform(&self.config, request).await
    }

    async fn run(&self, request: ActionRequest) -> Result<ActionResponse, ConnectorError> {
        if !self.supports(&request.action_type) {
            return Err(ConnectorError::UnsupportedAction {
                action_type: request.action_type,
            });
        }

        self.authenticated
            .get_or_try_init(|| self.handler.authenticate(&self.config))
            .await?;

        let outcome = match &self.retry {
            Some(retry) => {
                let label = format!("{}:{}", self.config.name, request.action_type);
                retry
                    .execute(|| self.attempt(&request), &label)
                    .await
                    .map_err(|e| e.to_string())
            }
            None => self.attempt(&request).await.map_err(|e| e.to_string()),
        };

        Ok(outcome.unwrap_or_else(|message| {
            tracing::warn!(
                connector = %self.config.name,
                action = %request.action_type,
                error = %message,
                "Action failed"
            );
            ActionResponse::failure(ACTION_FAILED, message)
        }))
    }
}

impl<H: ActionHandler> Connector for GuardedConnector<H> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn execute_action<'a>(&'a self, request: ActionRequest) -> ActionFut<'a> {
        Box::pin(self.run(request))
    }
}
