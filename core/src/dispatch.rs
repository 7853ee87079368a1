//! The dispatch entry point.
//!
//! ```text
//! execute_action(name, request)
//!   -> registry lookup          (miss: record_error, Err(ConnectorNotFound))
//!   -> standardize_request
//!   -> connector.execute_action (Err: record_error, Err(Connector(..)))
//!   -> record_action(duration, success)
//!   -> standardize_response
//! ```
//!
//! Monitoring hears about every call exactly once. Telemetry is tagged with
//! the caller's action type as given, before normalization. The dispatcher
//! never retries; that belongs to the connector or the caller.

use std::sync::Arc;

use relay_types::{ActionRequest, ActionResponse};
use thiserror::Error;
use tokio::time::Instant;

use crate::connector::{Connector, ConnectorError};
use crate::monitor::Monitor;
use crate::normalize::{standardize_request, standardize_response};
use crate::registry::ConnectorRegistry;

/// Hard dispatch failures. A connector's soft failure is an `Ok` response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Connector {name} not found")]
    ConnectorNotFound { name: String },
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

pub struct Dispatcher {
    registry: Arc<ConnectorRegistry>,
    monitor: Arc<dyn Monitor>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(monitor: Arc<dyn Monitor>) -> Self {
        Self::with_registry(Arc::new(ConnectorRegistry::new()), monitor)
    }

    #[must_use]
    pub fn with_registry(registry: Arc<ConnectorRegistry>, monitor: Arc<dyn Monitor>) -> Self {
        Self { registry, monitor }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectorRegistry> {
        &self.registry
    }

    pub fn register(&self, connector: Arc<dyn Connector>) -> Option<Arc<dyn Connector>> {
        self.registry.register(connector)
    }

    pub async fn execute_action(
        &self,
        connector_name: &str,
        request: &ActionRequest,
    ) -> Result<ActionResponse, DispatchError> {
        let Some(connector) = self.registry.get(connector_name) else {
            return Err(self.fail(
                connector_name,
                request,
                DispatchError::ConnectorNotFound {
                    name: connector_name.to_string(),
                },
            ));
        };

        let standardized = standardize_request(request);
        tracing::debug!(
            connector = connector_name,
            action = %standardized.action_type,
            "Dispatching action"
        );

        let started = Instant::now();
        let response = match connector.execute_action(standardized).await {
            Ok(response) => response,
            Err(source) => return Err(self.fail(connector_name, request, source.into())),
        };
        let duration = started.elapsed();

        self.monitor.record_action(
            connector_name,
            &request.action_type,
            duration,
            response.is_success(),
        );
        tracing::debug!(
            connector = connector_name,
            duration_ms = duration.as_millis() as u64,
            success = response.is_success(),
            "Action dispatched"
        );

        Ok(standardize_response(response))
    }

    fn fail(&self, connector: &str, request: &ActionRequest, error: DispatchError) -> DispatchError {
        tracing::warn!(connector, action = %request.action_type, error = %error, "Dispatch failed");
        self.monitor.record_error(connector, &request.action_type, &error);
        error
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::ActionFut;
    use crate::monitor::MetricsMonitor;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records what it was asked to do and replies with a canned result.
    struct Recording {
        seen: Mutex<Vec<ActionRequest>>,
        reply: Reply,
    }

    impl Connector for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn execute_action<'a>(&'a self, request: ActionRequest) -> ActionFut<'a> {
            self.seen.lock().unwrap().push(request);
            let reply = self.reply;
            Box::pin(async move { reply() })
        }
    }

    type Reply = fn() -> Result<ActionResponse, ConnectorError>;

    fn setup(reply: Reply) -> (Dispatcher, Arc<Recording>, Arc<MetricsMonitor>) {
        let monitor = Arc::new(MetricsMonitor::new());
        let dispatcher = Dispatcher::new(monitor.clone());
        let connector = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            reply,
        });
        dispatcher.register(connector.clone());
        (dispatcher, connector, monitor)
    }

    #[tokio::test]
    async fn connector_sees_standardized_request() {
        let (dispatcher, connector, _) = setup(|| Ok(ActionResponse::empty()));
        let request = ActionRequest::new("SEARCH_PRODUCTS").with_parameter("Query", " laptop ");

        dispatcher.execute_action("recording", &request).await.unwrap();

        let seen = connector.seen.lock().unwrap();
        assert_eq!(seen[0].action_type, "search_products");
        assert_eq!(seen[0].parameters["query"], json!("laptop"));
    }

    #[tokio::test]
    async fn soft_failure_is_returned_and_recorded_as_unsuccessful() {
        let (dispatcher, _, monitor) =
            setup(|| Ok(ActionResponse::failure("UNSUPPORTED_ACTION", "nope")));

        let response = dispatcher
            .execute_action("recording", &ActionRequest::new("x"))
            .await
            .unwrap();

        assert_eq!(response, ActionResponse::failure("UNSUPPORTED_ACTION", "nope"));
        let stats = monitor.stats("recording").unwrap();
        assert_eq!((stats.actions, stats.failures, stats.errors), (1, 1, 0));
    }

    #[tokio::test]
    async fn hard_failure_propagates_unchanged() {
        let (dispatcher, _, monitor) = setup(|| Err(ConnectorError::execution("browser crashed")));

        let err = dispatcher
            .execute_action("recording", &ActionRequest::new("Search"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Connector(ConnectorError::Execution { ref message })
                if message == "browser crashed"
        ));
        assert_eq!(err.to_string(), "browser crashed");

        let stats = monitor.stats("recording").unwrap();
        assert_eq!((stats.actions, stats.errors), (0, 1));
        let recent = monitor.recent_errors(1);
        assert_eq!(recent[0].action_type, "Search");
    }
}
