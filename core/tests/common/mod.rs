//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::error::Error;
use std::sync::{Mutex, Once};
use std::time::Duration;

use relay_core::Monitor;
use relay_types::{AdmissionConfig, AuthConfig, AuthKind, ConnectorConfig, Credentials};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install a test-writer subscriber once per binary. Honours `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer())
            .with(EnvFilter::from_default_env())
            .try_init();
    });
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Action {
        connector: String,
        action_type: String,
        duration: Duration,
        success: bool,
    },
    Error {
        connector: String,
        action_type: String,
        message: String,
    },
}

/// Monitor that keeps every call verbatim.
#[derive(Debug, Default)]
pub struct RecordingMonitor {
    events: Mutex<Vec<Event>>,
}

impl RecordingMonitor {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn action_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Action { .. }))
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Error { .. }))
            .count()
    }
}

impl Monitor for RecordingMonitor {
    fn record_action(&self, connector: &str, action_type: &str, duration: Duration, success: bool) {
        self.events.lock().unwrap().push(Event::Action {
            connector: connector.to_string(),
            action_type: action_type.to_string(),
            duration,
            success,
        });
    }

    fn record_error(&self, connector: &str, action_type: &str, error: &dyn Error) {
        self.events.lock().unwrap().push(Event::Error {
            connector: connector.to_string(),
            action_type: action_type.to_string(),
            message: error.to_string(),
        });
    }
}

pub fn connector_config(
    name: &str,
    rate_limit: AdmissionConfig,
    supported: &[&str],
) -> ConnectorConfig {
    ConnectorConfig {
        name: name.to_string(),
        base_url: format!("https://{name}.example.com"),
        auth: Some(AuthConfig {
            kind: AuthKind::Basic,
            credentials: Some(Credentials {
                username: "bot".to_string(),
                password: "hunter2".to_string(),
            }),
        }),
        rate_limit,
        supported_actions: supported.iter().map(ToString::to_string).collect(),
    }
}
