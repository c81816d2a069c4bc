//! Instance cache - one live implementation per (interface, library, config)
//!
//! The get-or-create sequence runs under a single lock, so concurrent
//! requests for one key see exactly one construction (and one library
//! open). Entries are never evicted; a disposed entry is replaced the next
//! time its key is requested.

use crate::config::BindingConfig;
use crate::error::BindingError;
use crate::runtime::BoundLibrary;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Identity of a cached implementation instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    interface: String,
    path: PathBuf,
    config: BindingConfig,
}

impl CacheKey {
    /// Build a key from the instance identity triple.
    pub fn new(interface: &str, path: &Path, config: BindingConfig) -> Self {
        Self {
            interface: interface.to_string(),
            path: path.to_path_buf(),
            config,
        }
    }
}

/// Deduplicates implementation instances by identity.
#[derive(Default)]
pub struct InstanceCache {
    entries: Mutex<HashMap<CacheKey, Arc<BoundLibrary>>>,
}

impl InstanceCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the canonical instance for `key`, constructing it with
    /// `build` if absent (or present but disposed).
    ///
    /// The lock is held across construction: no two pipeline runs for one
    /// key can race, and callers of other keys simply wait.
    pub fn resolve_with(
        &self,
        key: CacheKey,
        build: impl FnOnce() -> Result<Arc<BoundLibrary>, BindingError>,
    ) -> Result<Arc<BoundLibrary>, BindingError> {
        let mut entries = self.entries.lock().expect("instance cache mutex poisoned");

        if let Some(existing) = entries.get(&key) {
            if !existing.is_disposed() {
                return Ok(existing.clone());
            }
        }

        let instance = build()?;
        entries.insert(key, instance.clone());
        Ok(instance)
    }

    /// Number of cached entries (disposed entries included until replaced).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("instance cache mutex poisoned").len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
