//! Tether runtime - the public build entry point and bound implementations
//!
//! [`Tether`] owns the loader collaborator and the instance cache.
//! [`Tether::bind`] runs the full construction pipeline for a capability
//! interface against a shared library and returns the canonical instance
//! for the (interface, library, configuration) triple.

use crate::binder::{SlotState, SymbolBinder};
use crate::builder::{build_adapters, MemberAdapter};
use crate::cache::{CacheKey, InstanceCache};
use crate::config::BindingConfig;
use crate::error::{BindingError, CallError};
use crate::guard::DisposalGuard;
use crate::interface::InterfaceDescriptor;
use crate::loader::{LibraryLoader, NativeLoader};
use crate::marshal::PinLedger;
use crate::types::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The binding runtime: builds and caches bound implementations.
pub struct Tether {
    loader: Arc<dyn LibraryLoader>,
    cache: InstanceCache,
}

impl Tether {
    /// Create a runtime over the production library loader.
    pub fn new() -> Self {
        Self::with_loader(Arc::new(NativeLoader::new()))
    }

    /// Create a runtime over a custom loader collaborator.
    pub fn with_loader(loader: Arc<dyn LibraryLoader>) -> Self {
        Self {
            loader,
            cache: InstanceCache::new(),
        }
    }

    /// Bind a capability interface to the library at `path`.
    ///
    /// Returns the canonical instance for the (interface identity, library
    /// path, configuration) triple: repeated calls with identical arguments
    /// yield the same `Arc`. Construction happens at most once per key,
    /// even under concurrent callers.
    pub fn bind(
        &self,
        interface: &InterfaceDescriptor,
        path: impl AsRef<Path>,
        config: BindingConfig,
    ) -> Result<Arc<BoundLibrary>, BindingError> {
        let path = path.as_ref();
        let key = CacheKey::new(interface.name(), path, config);
        self.cache
            .resolve_with(key, || BoundLibrary::build(self.loader.clone(), interface, path, config))
    }

    /// Number of live cache entries.
    pub fn cached_instances(&self) -> usize {
        self.cache.len()
    }
}

impl Default for Tether {
    fn default() -> Self {
        Self::new()
    }
}

/// A concrete implementation of a capability interface, backed by an opened
/// shared library.
pub struct BoundLibrary {
    interface: InterfaceDescriptor,
    path: PathBuf,
    config: BindingConfig,
    adapters: HashMap<String, MemberAdapter>,
    guard: Arc<DisposalGuard>,
    pins: Arc<PinLedger>,
}

// The instance owns raw native handles and adapters carrying raw pointers,
// which suppress the auto `Send`/`Sync`. The concurrency model (spec §5)
// requires a bound instance to be shared and called across threads, so the
// markers are asserted explicitly; the underlying state is either immutable
// after construction or synchronised (atomics / once-cell slots).
unsafe impl Send for BoundLibrary {}
unsafe impl Sync for BoundLibrary {}

impl std::fmt::Debug for BoundLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundLibrary")
            .field("interface", &self.interface.name())
            .field("path", &self.path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BoundLibrary {
    /// Run the full construction pipeline: open the library, build every
    /// member's adapter, then apply the binding strategy.
    ///
    /// On any failure the opened handle is released (through the guard's
    /// drop) and no instance escapes.
    pub(crate) fn build(
        loader: Arc<dyn LibraryLoader>,
        interface: &InterfaceDescriptor,
        path: &Path,
        config: BindingConfig,
    ) -> Result<Arc<Self>, BindingError> {
        let handle = loader.open(path)?;
        let guard = Arc::new(DisposalGuard::new(
            loader,
            handle,
            path.display().to_string(),
        ));
        let pins = Arc::new(PinLedger::new());

        let adapters = build_adapters(interface, &config, &guard, &pins)?;
        SymbolBinder::new(config.mode)
            .bind_at_construction(adapters.iter().map(|a| a.slot()), &guard)?;

        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.member().name.clone(), adapter))
            .collect();

        Ok(Arc::new(Self {
            interface: interface.clone(),
            path: path.to_path_buf(),
            config,
            adapters,
            guard,
            pins,
        }))
    }

    /// Invoke a method or property accessor by declared member name.
    ///
    /// # Safety
    ///
    /// The declared signature must match the actual native entry point; see
    /// [`MemberAdapter::invoke`].
    pub unsafe fn invoke(&self, member: &str, args: &[Value]) -> Result<Value, CallError> {
        self.adapter(member)?.invoke(args)
    }

    /// Read a global-variable member.
    ///
    /// # Safety
    ///
    /// The declared scalar type must match the native variable.
    pub unsafe fn read_var(&self, member: &str) -> Result<Value, CallError> {
        self.adapter(member)?.read()
    }

    /// Write a global-variable member.
    ///
    /// # Safety
    ///
    /// The declared scalar type must match the native variable.
    pub unsafe fn write_var(&self, member: &str, value: &Value) -> Result<(), CallError> {
        self.adapter(member)?.write(value)
    }

    /// Close the underlying library. Idempotent; disposal-checked members
    /// fail with a use-after-dispose error from here on.
    pub fn dispose(&self) {
        self.guard.dispose();
    }

    /// Whether the underlying library has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.guard.is_disposed()
    }

    /// The interface this instance implements.
    pub fn interface(&self) -> &InterfaceDescriptor {
        &self.interface
    }

    /// The library path this instance was built against.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configuration this instance was built with.
    pub fn config(&self) -> BindingConfig {
        self.config
    }

    /// Binding state of a member's slot, without triggering resolution.
    pub fn member_state(&self, member: &str) -> Option<SlotState> {
        self.adapters.get(member).map(|a| a.slot().state())
    }

    /// Number of buffer pins currently held by in-flight calls.
    pub fn active_pins(&self) -> usize {
        self.pins.active()
    }

    fn adapter(&self, member: &str) -> Result<&MemberAdapter, CallError> {
        self.adapters
            .get(member)
            .ok_or_else(|| CallError::UnknownMember {
                member: member.to_string(),
            })
    }
}
