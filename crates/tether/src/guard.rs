//! Disposal guard - library handle lifetime and liveness
//!
//! One guard owns one opened library handle. `dispose` closes the handle
//! exactly once and flips the liveness flag that disposal-checked adapters
//! read before every call. The guard is also the symbol-resolution path for
//! binding slots, so resolution after disposal fails through the loader's
//! stale-handle reporting rather than touching freed state.

use crate::error::{LoadError, SymbolBindingError};
use crate::loader::{LibraryHandle, LibraryLoader, SymbolAddress};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Owns the opened library handle and gates all calls on liveness.
pub struct DisposalGuard {
    loader: Arc<dyn LibraryLoader>,
    handle: LibraryHandle,
    /// Display name of the library, used in errors
    library: String,
    disposed: AtomicBool,
}

impl DisposalGuard {
    /// Take ownership of an opened handle.
    pub fn new(loader: Arc<dyn LibraryLoader>, handle: LibraryHandle, library: String) -> Self {
        Self {
            loader,
            handle,
            library,
            disposed: AtomicBool::new(false),
        }
    }

    /// Whether the handle has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// The library's display name.
    pub fn library(&self) -> &str {
        &self.library
    }

    /// Close the handle. Idempotent: the underlying close runs at most once.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.loader.close(self.handle);
        }
    }

    /// Resolve a member's native symbol through the owned handle.
    pub(crate) fn resolve_symbol(
        &self,
        member: &str,
        symbol: &str,
    ) -> Result<SymbolAddress, SymbolBindingError> {
        self.loader
            .resolve(self.handle, symbol)
            .map_err(|e: LoadError| SymbolBindingError {
                member: member.to_string(),
                symbol: symbol.to_string(),
                library: self.library.clone(),
                reason: e.to_string(),
            })
    }
}

impl Drop for DisposalGuard {
    fn drop(&mut self) {
        self.dispose();
    }
}
