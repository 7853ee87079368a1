//! Name-keyed store of connectors.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::connector::Connector;

/// Connector registry shared between the dispatcher and whoever configures it.
///
/// Registration is last-write-wins on the connector's declared name.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: RwLock<HashMap<String, Arc<dyn Connector>>>,
}

impl ConnectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `connector`, returning the one it replaced, if any.
    pub fn register(&self, connector: Arc<dyn Connector>) -> Option<Arc<dyn Connector>> {
        let name = connector.name().to_string();
        let previous = self
            .connectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), connector);
        if previous.is_some() {
            tracing::debug!(connector = %name, "Replaced registered connector");
        }
        previous
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .connectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// True iff an entry existed and was removed.
    pub fn remove(&self, name: &str) -> bool {
        self.connectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("connectors", &self.list())
            .finish()
    }
}
