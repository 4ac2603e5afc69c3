//! Named resource registry.

use sb_traits::{Cache, ResourceProvider, Sink};
use std::collections::HashMap;
use std::sync::Arc;

/// Holds caches and sinks by resource name.
#[derive(Default, Clone)]
pub struct Resources {
    caches: HashMap<String, Arc<dyn Cache>>,
    sinks: HashMap<String, Arc<dyn Sink>>,
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut caches: Vec<_> = self.caches.keys().collect();
        let mut sinks: Vec<_> = self.sinks.keys().collect();
        caches.sort();
        sinks.sort();
        f.debug_struct("Resources")
            .field("caches", &caches)
            .field("sinks", &sinks)
            .finish()
    }
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cache under `name`, replacing any previous one.
    pub fn with_cache(mut self, name: impl Into<String>, cache: impl Cache + 'static) -> Self {
        self.caches.insert(name.into(), Arc::new(cache));
        self
    }

    /// Registers a sink under `name`, replacing any previous one.
    pub fn with_sink(mut self, name: impl Into<String>, sink: impl Sink + 'static) -> Self {
        self.sinks.insert(name.into(), Arc::new(sink));
        self
    }

    /// Registers an already shared cache.
    pub fn insert_cache(&mut self, name: impl Into<String>, cache: Arc<dyn Cache>) {
        self.caches.insert(name.into(), cache);
    }

    /// Registers an already shared sink.
    pub fn insert_sink(&mut self, name: impl Into<String>, sink: Arc<dyn Sink>) {
        self.sinks.insert(name.into(), sink);
    }
}

impl ResourceProvider for Resources {
    fn cache(&self, name: &str) -> Option<Arc<dyn Cache>> {
        self.caches.get(name).cloned()
    }

    fn sink(&self, name: &str) -> Option<Arc<dyn Sink>> {
        self.sinks.get(name).cloned()
    }
}
