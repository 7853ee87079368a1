//! Monitoring sinks for dispatch telemetry.
//!
//! Sinks are fire-and-forget: the dispatcher never inspects a result and
//! methods cannot fail.

use std::collections::{BTreeMap, VecDeque};
use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

/// Default number of errors retained by [`MetricsMonitor`].
pub const DEFAULT_ERROR_CAPACITY: usize = 100;

/// Default number of distinct connector names [`MetricsMonitor`] aggregates.
pub const DEFAULT_CONNECTOR_CAPACITY: usize = 256;

pub trait Monitor: Send + Sync {
    fn record_action(&self, connector: &str, action_type: &str, duration: Duration, success: bool);
    fn record_error(&self, connector: &str, action_type: &str, error: &dyn Error);
}

/// Emits every record as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl Monitor for TracingMonitor {
    fn record_action(&self, connector: &str, action_type: &str, duration: Duration, success: bool) {
        tracing::info!(
            connector,
            action = action_type,
            duration_ms = duration.as_millis() as u64,
            success,
            "Action completed"
        );
    }

    fn record_error(&self, connector: &str, action_type: &str, error: &dyn Error) {
        tracing::error!(connector, action = action_type, error = %error, "Action error");
    }
}

/// Aggregates for one connector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectorStats {
    pub actions: u64,
    pub successes: u64,
    pub failures: u64,
    pub errors: u64,
    pub total_duration: Duration,
}

impl ConnectorStats {
    #[must_use]
    pub fn average_duration(&self) -> Option<Duration> {
        let actions = u32::try_from(self.actions).ok().filter(|&n| n > 0)?;
        Some(self.total_duration / actions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub connector: String,
    pub action_type: String,
    pub message: String,
    pub at: SystemTime,
}

#[derive(Debug)]
struct MetricsState {
    stats: BTreeMap<String, ConnectorStats>,
    errors: VecDeque<ErrorRecord>,
}

impl MetricsState {
    /// Stats slot for `connector`; `None` once `capacity` names are tracked.
    fn stats_mut(&mut self, connector: &str, capacity: usize) -> Option<&mut ConnectorStats> {
        if !self.stats.contains_key(connector) && self.stats.len() >= capacity {
            return None;
        }
        Some(self.stats.entry(connector.to_string()).or_default())
    }
}

/// In-memory per-connector counters plus a bounded error log.
///
/// Connector names come from callers and may not be registered, so the
/// number of aggregated names is capped; records for names past the cap
/// only reach the error log.
#[derive(Debug)]
pub struct MetricsMonitor {
    state: Mutex<MetricsState>,
    error_capacity: usize,
    connector_capacity: usize,
}

impl Default for MetricsMonitor {
    fn default() -> Self {
        Self::with_error_capacity(DEFAULT_ERROR_CAPACITY)
    }
}

impl MetricsMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_error_capacity(error_capacity: usize) -> Self {
        Self {
            state: Mutex::new(MetricsState {
                stats: BTreeMap::new(),
                errors: VecDeque::new(),
            }),
            error_capacity,
            connector_capacity: DEFAULT_CONNECTOR_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_connector_capacity(mut self, connector_capacity: usize) -> Self {
        self.connector_capacity = connector_capacity;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn stats(&self, connector: &str) -> Option<ConnectorStats> {
        self.lock().stats.get(connector).copied()
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, ConnectorStats> {
        self.lock().stats.clone()
    }

    /// Most recent errors, oldest first.
    #[must_use]
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        let state = self.lock();
        let skip = state.errors.len().saturating_sub(limit);
        state.errors.iter().skip(skip).cloned().collect()
    }
}

impl Monitor for MetricsMonitor {
    fn record_action(&self, connector: &str, _action_type: &str, duration: Duration, success: bool) {
        let mut state = self.lock();
        let Some(stats) = state.stats_mut(connector, self.connector_capacity) else {
            return;
        };
        stats.actions += 1;
        if success {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
        stats.total_duration = stats.total_duration.saturating_add(duration);
    }

    fn record_error(&self, connector: &str, action_type: &str, error: &dyn Error) {
        let mut state = self.lock();
        if let Some(stats) = state.stats_mut(connector, self.connector_capacity) {
            stats.errors += 1;
        }
        if self.error_capacity == 0 {
            return;
        }
        if state.errors.len() == self.error_capacity {
            state.errors.pop_front();
        }
        state.errors.push_back(ErrorRecord {
            connector: connector.to_string(),
            action_type: action_type.to_string(),
            message: error.to_string(),
            at: SystemTime::now(),
        });
    }
}

/// Forwards every record to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutMonitor {
    sinks: Vec<Arc<dyn Monitor>>,
}

impl FanoutMonitor {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn Monitor>>) -> Self {
        Self { sinks }
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn Monitor>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl Monitor for FanoutMonitor {
    fn record_action(&self, connector: &str, action_type: &str, duration: Duration, success: bool) {
        for sink in &self.sinks {
            sink.record_action(connector, action_type, duration, success);
        }
    }

    fn record_error(&self, connector: &str, action_type: &str, error: &dyn Error) {
        for sink in &self.sinks {
            sink.record_error(connector, action_type, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Boom(&'static str);

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl Error for Boom {}

    #[test]
    fn metrics_aggregate_per_connector() {
        let monitor = MetricsMonitor::new();
        monitor.record_action("shop", "search", Duration::from_millis(10), true);
        monitor.record_action("shop", "search", Duration::from_millis(30), false);
        monitor.record_error("shop", "search", &Boom("down"));
        monitor.record_action("news", "fetch", Duration::from_millis(5), true);

        let shop = monitor.stats("shop").unwrap();
        assert_eq!(shop.actions, 2);
        assert_eq!(shop.successes, 1);
        assert_eq!(shop.failures, 1);
        assert_eq!(shop.errors, 1);
        assert_eq!(shop.average_duration(), Some(Duration::from_millis(20)));

        assert_eq!(monitor.snapshot().len(), 2);
        assert!(monitor.stats("missing").is_none());
    }

    #[test]
    fn average_is_none_without_actions() {
        assert_eq!(ConnectorStats::default().average_duration(), None);
    }

    #[test]
    fn error_log_is_bounded() {
        let monitor = MetricsMonitor::with_error_capacity(2);
        monitor.record_error("shop", "a", &Boom("one"));
        monitor.record_error("shop", "b", &Boom("two"));
        monitor.record_error("shop", "c", &Boom("three"));

        let messages: Vec<String> = monitor
            .recent_errors(10)
            .into_iter()
            .map(|record| record.message)
            .collect();
        assert_eq!(messages, vec!["two", "three"]);
        assert_eq!(monitor.recent_errors(1)[0].action_type, "c");
        assert_eq!(monitor.stats("shop").unwrap().errors, 3);
    }

    #[test]
    fn unknown_connector_names_do_not_grow_stats_past_capacity() {
        let monitor = MetricsMonitor::new().with_connector_capacity(2);
        monitor.record_action("shop", "search", Duration::from_millis(10), true);
        for name in ["ghost-1", "ghost-2", "ghost-3", "ghost-4"] {
            monitor.record_error(name, "search", &Boom("Connector not found"));
        }
        monitor.record_error("shop", "search", &Boom("down"));

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), ["ghost-1", "shop"]);
        assert_eq!(monitor.stats("shop").unwrap().errors, 1);
        assert!(monitor.stats("ghost-4").is_none());
        assert_eq!(monitor.recent_errors(10).len(), 5);
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let first = Arc::new(MetricsMonitor::new());
        let second = Arc::new(MetricsMonitor::new());
        let fanout = FanoutMonitor::default()
            .with(first.clone())
            .with(second.clone())
            .with(Arc::new(TracingMonitor));

        fanout.record_action("shop", "search", Duration::ZERO, true);
        fanout.record_error("shop", "search", &Boom("x"));

        for sink in [&first, &second] {
            let stats = sink.stats("shop").unwrap();
            assert_eq!(stats.actions, 1);
            assert_eq!(stats.errors, 1);
        }
    }
}
