//! Cache resource trait.

use async_trait::async_trait;
use sb_error::CacheError;
use std::time::Duration;

/// Trait for key-value cache resources.
///
/// Implementations must be safe to call from several stages at once.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Reads a key.
    ///
    /// Returns [`CacheError::NotFound`] if the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError>;

    /// Writes a key, optionally expiring it after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>)
        -> Result<(), CacheError>;
}
