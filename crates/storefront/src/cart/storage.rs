//! Cart snapshot storage with ordered fallback.
//!
//! A cart is persisted as one serialized snapshot per cart key. Backends are
//! tried in order on every write (database, then session, then process
//! memory); the first backend that accepts the payload wins. Reads return the
//! first backend holding a value.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use thiserror::Error;
use tower_sessions::Session;
use tracing::{debug, warn};

use crate::models::session::keys;

/// Largest snapshot accepted by the session backend.
pub const SESSION_QUOTA_BYTES: usize = 32 * 1024;

/// Largest snapshot accepted by the in-memory backend.
pub const MEMORY_QUOTA_BYTES: usize = 1024 * 1024;

/// Errors from cart storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The payload does not fit the backend's quota.
    #[error("{backend}: payload of {size} bytes exceeds quota of {quota} bytes")]
    QuotaExceeded {
        backend: &'static str,
        size: usize,
        quota: usize,
    },

    /// The backend could not be reached or refused the operation.
    #[error("{backend} unavailable: {message}")]
    Unavailable {
        backend: &'static str,
        message: String,
    },

    /// Every backend rejected the write.
    #[error("no cart storage backend accepted the write")]
    Exhausted {
        /// `true` when every rejection was a quota rejection.
        quota_only: bool,
    },
}

impl StorageError {
    /// Shorthand for [`StorageError::Unavailable`].
    pub fn unavailable(backend: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            backend,
            message: err.to_string(),
        }
    }
}

/// A single place a cart snapshot can live.
#[async_trait]
pub trait CartStorage: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Largest payload in bytes this backend accepts.
    fn quota(&self) -> usize;

    async fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn save(&self, key: &str, payload: &str) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Ordered composition of [`CartStorage`] backends.
#[derive(Clone)]
pub struct FallbackStorage {
    backends: Vec<Arc<dyn CartStorage>>,
}

impl FallbackStorage {
    /// Compose backends, highest priority first.
    #[must_use]
    pub fn new(backends: Vec<Arc<dyn CartStorage>>) -> Self {
        Self { backends }
    }

    /// Return the snapshot from the first backend holding one.
    ///
    /// Backend errors are logged and skipped.
    pub async fn load(&self, key: &str) -> Option<String> {
        for backend in &self.backends {
            match backend.load(key).await {
                Ok(Some(payload)) => {
                    debug!(backend = backend.name(), "Cart loaded");
                    return Some(payload);
                }
                Ok(None) => {}
                Err(e) => warn!(backend = backend.name(), error = %e, "Cart read failed"),
            }
        }
        None
    }

    /// Write the snapshot to the first backend that accepts it.
    ///
    /// On success, copies in the other backends are removed so a later read
    /// cannot return a stale snapshot. Returns the name of the backend that
    /// holds the cart.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Exhausted` if every backend rejects the write.
    pub async fn save(&self, key: &str, payload: &str) -> Result<&'static str, StorageError> {
        let mut quota_only = true;

        for (index, backend) in self.backends.iter().enumerate() {
            let result = if payload.len() > backend.quota() {
                Err(StorageError::QuotaExceeded {
                    backend: backend.name(),
                    size: payload.len(),
                    quota: backend.quota(),
                })
            } else {
                backend.save(key, payload).await
            };

            match result {
                Ok(()) => {
                    self.remove_except(key, index).await;
                    return Ok(backend.name());
                }
                Err(e) => {
                    quota_only &= matches!(e, StorageError::QuotaExceeded { .. });
                    warn!(backend = backend.name(), error = %e, "Cart write failed, falling back");
                }
            }
        }

        Err(StorageError::Exhausted { quota_only })
    }

    /// Remove the snapshot from every backend. Errors are logged.
    pub async fn remove(&self, key: &str) {
        for backend in &self.backends {
            if let Err(e) = backend.remove(key).await {
                warn!(backend = backend.name(), error = %e, "Cart removal failed");
            }
        }
    }

    async fn remove_except(&self, key: &str, keep: usize) {
        for (index, backend) in self.backends.iter().enumerate() {
            if index == keep {
                continue;
            }
            if let Err(e) = backend.remove(key).await {
                debug!(backend = backend.name(), error = %e, "Stale cart cleanup failed");
            }
        }
    }
}

// =============================================================================
// Session backend
// =============================================================================

/// Stores the snapshot inside the visitor's session record.
#[derive(Clone)]
pub struct SessionCartStorage {
    session: Session,
}

impl SessionCartStorage {
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }

    fn session_key(key: &str) -> String {
        format!("{}{key}", keys::CART_SNAPSHOT_PREFIX)
    }
}

#[async_trait]
impl CartStorage for SessionCartStorage {
    fn name(&self) -> &'static str {
        "session"
    }

    fn quota(&self) -> usize {
        SESSION_QUOTA_BYTES
    }

    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.session
            .get::<String>(&Self::session_key(key))
            .await
            .map_err(|e| StorageError::unavailable(self.name(), e))
    }

    async fn save(&self, key: &str, payload: &str) -> Result<(), StorageError> {
        self.session
            .insert(&Self::session_key(key), payload)
            .await
            .map_err(|e| StorageError::unavailable(self.name(), e))
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.session
            .remove::<String>(&Self::session_key(key))
            .await
            .map(|_| ())
            .map_err(|e| StorageError::unavailable(self.name(), e))
    }
}

// =============================================================================
// In-memory backend
// =============================================================================

/// Process-local last resort. Carts here do not survive a restart.
#[derive(Clone)]
pub struct MemoryCartStorage {
    cache: Cache<String, String>,
    quota: usize,
}

impl MemoryCartStorage {
    /// Create a memory backend with the default quota.
    #[must_use]
    pub fn new() -> Self {
        Self::with_quota(MEMORY_QUOTA_BYTES)
    }

    /// Create a memory backend with a custom per-cart quota.
    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        let cache = Cache::builder()
            .weigher(|key: &String, value: &String| {
                u32::try_from(key.len() + value.len()).unwrap_or(u32::MAX)
            })
            .max_capacity(64 * 1024 * 1024) // 64 MiB of snapshots
            .time_to_idle(Duration::from_secs(24 * 60 * 60))
            .build();

        Self { cache, quota }
    }
}

impl Default for MemoryCartStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CartStorage for MemoryCartStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn quota(&self) -> usize {
        self.quota
    }

    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.cache.get(key).await)
    }

    async fn save(&self, key: &str, payload: &str) -> Result<(), StorageError> {
        self.cache.insert(key.to_string(), payload.to_string()).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Backend that always fails, to exercise the fallback path.
    struct BrokenStorage;

    #[async_trait]
    impl CartStorage for BrokenStorage {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn quota(&self) -> usize {
            usize::MAX
        }

        async fn load(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::unavailable("broken", "offline"))
        }

        async fn save(&self, _key: &str, _payload: &str) -> Result<(), StorageError> {
            Err(StorageError::unavailable("broken", "offline"))
        }

        async fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::unavailable("broken", "offline"))
        }
    }

    #[tokio::test]
    async fn test_save_uses_first_backend_that_accepts() {
        let primary = Arc::new(MemoryCartStorage::with_quota(1024));
        let secondary = Arc::new(MemoryCartStorage::new());
        let storage = FallbackStorage::new(vec![primary.clone(), secondary.clone()]);

        let backend = storage.save("cart-1", "{}").await.unwrap();
        assert_eq!(backend, "memory");
        assert_eq!(primary.load("cart-1").await.unwrap().as_deref(), Some("{}"));
        assert!(secondary.load("cart-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_falls_through_broken_backend() {
        let memory = Arc::new(MemoryCartStorage::new());
        let storage = FallbackStorage::new(vec![Arc::new(BrokenStorage), memory.clone()]);

        assert_eq!(storage.save("cart-1", "{}").await.unwrap(), "memory");
        assert_eq!(storage.load("cart-1").await.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_oversize_payload_falls_through_and_clears_stale_copy() {
        let small = Arc::new(MemoryCartStorage::with_quota(4));
        let large = Arc::new(MemoryCartStorage::new());
        let storage = FallbackStorage::new(vec![small.clone(), large.clone()]);

        storage.save("cart-1", "{}").await.unwrap();
        assert!(small.load("cart-1").await.unwrap().is_some());

        storage.save("cart-1", "{\"items\":[]}").await.unwrap();
        assert!(small.load("cart-1").await.unwrap().is_none());
        assert_eq!(
            storage.load("cart-1").await.as_deref(),
            Some("{\"items\":[]}")
        );
    }

    #[tokio::test]
    async fn test_exhausted_reports_quota_only() {
        let storage = FallbackStorage::new(vec![
            Arc::new(MemoryCartStorage::with_quota(2)),
            Arc::new(MemoryCartStorage::with_quota(3)),
        ]);

        let err = storage.save("cart-1", "toolarge").await.unwrap_err();
        assert!(matches!(err, StorageError::Exhausted { quota_only: true }));

        let storage = FallbackStorage::new(vec![
            Arc::new(BrokenStorage),
            Arc::new(MemoryCartStorage::with_quota(3)),
        ]);
        let err = storage.save("cart-1", "toolarge").await.unwrap_err();
        assert!(matches!(err, StorageError::Exhausted { quota_only: false }));
    }

    #[tokio::test]
    async fn test_remove_clears_every_backend() {
        let first = Arc::new(MemoryCartStorage::new());
        let second = Arc::new(MemoryCartStorage::new());
        first.save("cart-1", "a").await.unwrap();
        second.save("cart-1", "b").await.unwrap();

        let storage = FallbackStorage::new(vec![first, second, Arc::new(BrokenStorage)]);
        storage.remove("cart-1").await;
        assert!(storage.load("cart-1").await.is_none());
    }
}
