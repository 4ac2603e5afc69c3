//! Resource lookup by name.

use crate::{Cache, Sink};
use std::sync::Arc;

/// Resolves named cache and sink resources owned by the host pipeline.
///
/// A stage only ever asks for names it was configured with; an unknown
/// name yields `None`.
pub trait ResourceProvider: Send + Sync {
    /// Looks up a cache resource.
    fn cache(&self, name: &str) -> Option<Arc<dyn Cache>>;

    /// Looks up a sink resource.
    fn sink(&self, name: &str) -> Option<Arc<dyn Sink>>;
}
