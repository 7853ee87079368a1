//! Admission-controlled, retryable dispatch of actions to pluggable connectors.
//!
//! # Pipeline
//!
//! A call to [`Dispatcher::execute_action`] moves through these stages:
//!
//! 1. **Lookup** - resolve the connector by name in the [`ConnectorRegistry`]
//! 2. **Normalize request** - lower-case type and keys, trim string parameters
//! 3. **Execute** - the connector runs the action; a [`GuardedConnector`] gates
//!    each attempt through its own [`AdmissionController`] and optional
//!    [`RetryExecutor`]
//! 4. **Record** - timing or error goes to the injected [`Monitor`]
//! 5. **Normalize response** - lower-case keys throughout `data`
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`admission`] | Token bucket plus concurrency gate with FIFO waiters |
//! | [`retry`] | Exponential backoff with retryable-error classification |
//! | [`normalize`] | Request/response canonical forms |
//! | [`registry`] | Name-keyed connector store |
//! | [`connector`] | Connector capability, handler trait, guarded connector |
//! | [`monitor`] | Telemetry sinks |
//! | [`dispatch`] | The orchestrating entry point |
//!
//! # Error Handling
//!
//! Hard failures are [`DispatchError`]s: a missing connector or a connector
//! that returned [`ConnectorError`]. A connector reporting an unsuccessful
//! action returns `Ok(ActionResponse::Failure { .. })`; that is data, not an
//! error.

pub mod admission;
pub mod connector;
pub mod dispatch;
pub mod monitor;
pub mod normalize;
pub mod registry;
pub mod retry;

pub use admission::{AdmissionController, AdmissionError, AdmissionPermit, AdmissionSnapshot};
pub use connector::{
    ACTION_FAILED, ActionFut, ActionHandler, Connector, ConnectorError, GuardedConnector,
    HandlerFut,
};
pub use dispatch::{DispatchError, Dispatcher};
pub use monitor::{
    ConnectorStats, ErrorRecord, FanoutMonitor, MetricsMonitor, Monitor, TracingMonitor,
};
pub use normalize::{standardize_request, standardize_response};
pub use registry::ConnectorRegistry;
pub use retry::{RetryError, RetryExecutor};

pub use relay_types::{
    ActionError, ActionRequest, ActionResponse, AdmissionConfig, ConnectorConfig, ErrorMatcher,
    RetryPolicy,
};
