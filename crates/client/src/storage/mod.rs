//! Durable key/value storage for client-resident state.
//!
//! Three records survive a restart: the cart (JSON) and the access and
//! refresh tokens (plain strings). Storage is not a trust boundary; values
//! are written unencrypted.
//!
//! # Backends
//!
//! - [`FileStorage`] - one file per key inside a state directory
//! - [`MemoryStorage`] - process-local map, used by tests and ephemeral runs

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::warn;

/// Key holding the serialized cart.
pub const CART_KEY: &str = "cart";
/// Key holding the access token.
pub const ACCESS_TOKEN_KEY: &str = "token";
/// Key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failed.
    #[error("storage I/O error for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// A value could not be serialized for writing.
    #[error("failed to serialize value for key '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Keys are restricted to `[A-Za-z0-9_-]`.
    #[error("invalid storage key: '{0}'")]
    InvalidKey(String),
}

/// Synchronous string storage keyed by stable names.
///
/// Writes complete before the call returns, so callers observe their own
/// writes in order.
pub trait Storage: Send + Sync {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be modified.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// A typed JSON record stored under one key.
pub struct PersistentStore<T> {
    storage: Arc<dyn Storage>,
    key: &'static str,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for PersistentStore<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            key: self.key,
            _record: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> PersistentStore<T> {
    /// Bind a record type to `key` on `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, key: &'static str) -> Self {
        Self {
            storage,
            key,
            _record: PhantomData,
        }
    }

    /// The key this record lives under.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.key
    }

    /// Load the record.
    ///
    /// Never fails: a missing record, an unreadable backend, or malformed
    /// JSON all yield `None` so the caller can fall back to its initial state.
    #[must_use]
    pub fn load(&self) -> Option<T> {
        let raw = match self.storage.get(self.key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = self.key, error = %e, "Failed to read persisted record");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = self.key, error = %e, "Discarding malformed persisted record");
                None
            }
        }
    }

    /// Serialize and write the record.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value).map_err(|source| StorageError::Serialize {
            key: self.key.to_string(),
            source,
        })?;
        self.storage.set(self.key, &raw)
    }

    /// Delete the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be modified.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(self.key)
    }
}

/// Check that a key is safe to use as a file name on every backend.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
