//! Dynamic library loading for the binding runtime
//!
//! The [`LibraryLoader`] trait is the collaborator boundary: `open`,
//! `resolve`, `close`. The production implementation, [`NativeLoader`],
//! wraps `libloading` and handles platform-specific library naming
//! conventions and search paths. Tests substitute an in-memory loader.
//!
//! # Safety
//!
//! Loading a dynamic library executes its initialization code and makes its
//! symbols available. The caller must ensure the library is trusted.

use crate::error::LoadError;
use libloading::Library;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Opaque token for an opened library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryHandle(u64);

impl LibraryHandle {
    /// Create a handle from a raw id. Intended for loader implementations.
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// The raw id of this handle.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Resolved address of a native entry point or variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddress(usize);

impl SymbolAddress {
    /// Create an address from a raw pointer value.
    pub fn from_raw(addr: usize) -> Self {
        Self(addr)
    }

    /// The address as a raw usize.
    pub fn raw(&self) -> usize {
        self.0
    }

    /// The address as a mutable pointer.
    pub fn as_mut_ptr(&self) -> *mut std::ffi::c_void {
        self.0 as *mut std::ffi::c_void
    }
}

/// Collaborator boundary for platform library loading and symbol lookup.
pub trait LibraryLoader: Send + Sync {
    /// Open the library at `path`.
    fn open(&self, path: &Path) -> Result<LibraryHandle, LoadError>;

    /// Resolve a symbol's address within an opened library.
    fn resolve(&self, handle: LibraryHandle, symbol: &str) -> Result<SymbolAddress, LoadError>;

    /// Close an opened library. Resolving or calling through addresses
    /// obtained from the handle afterwards is the caller's responsibility
    /// to prevent.
    fn close(&self, handle: LibraryHandle);
}

/// Production library loader over `libloading`, with platform-specific
/// path resolution.
pub struct NativeLoader {
    /// Opened libraries by handle id
    libraries: Mutex<HashMap<u64, Library>>,
    /// Handle id source
    next_id: AtomicU64,
    /// Platform-specific library search paths
    search_paths: Vec<PathBuf>,
}

impl NativeLoader {
    /// Create a loader with default search paths.
    pub fn new() -> Self {
        Self {
            libraries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            search_paths: Self::default_search_paths(),
        }
    }

    /// Add a custom search path (prepended to the search list).
    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.insert(0, path);
    }

    /// Get platform-specific default library search paths
    ///
    /// Returns standard system library paths for the current platform:
    /// - Linux: /usr/lib, /usr/local/lib, /lib
    /// - macOS: /usr/lib, /usr/local/lib, /opt/homebrew/lib
    /// - Windows: C:\Windows\System32
    /// - All platforms: current working directory
    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(target_os = "linux")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/lib"));

            // Also try lib64 on 64-bit systems
            if cfg!(target_pointer_width = "64") {
                paths.push(PathBuf::from("/usr/lib64"));
                paths.push(PathBuf::from("/lib64"));
            }
        }

        #[cfg(target_os = "macos")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/opt/homebrew/lib"));
        }

        #[cfg(target_os = "windows")]
        {
            paths.push(PathBuf::from("C:\\Windows\\System32"));
            if let Ok(system_root) = std::env::var("SystemRoot") {
                paths.push(PathBuf::from(format!("{}\\System32", system_root)));
            }
        }

        // Current working directory (highest priority)
        if let Ok(cwd) = std::env::current_dir() {
            paths.insert(0, cwd);
        }

        paths
    }

    /// Resolve library name to full path with platform-specific naming
    ///
    /// Handles platform-specific library naming conventions:
    /// - Linux: lib{name}.so
    /// - macOS: lib{name}.dylib or lib{name}.so
    /// - Windows: {name}.dll
    ///
    /// Searches in all configured search paths.
    fn resolve_library_path(&self, name: &Path) -> Option<PathBuf> {
        // If name is already a path, use it directly
        if name.is_absolute() && name.exists() {
            return Some(name.to_path_buf());
        }

        let name = name.to_string_lossy();

        // Platform-specific extensions (in priority order)
        let extensions = if cfg!(target_os = "windows") {
            vec!["dll"]
        } else if cfg!(target_os = "macos") {
            vec!["dylib", "so"]
        } else {
            vec!["so"]
        };

        // Platform-specific prefixes (try both with and without "lib" prefix)
        let prefixes = if cfg!(target_os = "windows") {
            vec!["", "lib"]
        } else {
            vec!["lib", ""]
        };

        // Try each combination in search paths
        for search_path in &self.search_paths {
            // The name may already carry its prefix and extension.
            let exact = search_path.join(name.as_ref());
            if exact.exists() {
                return Some(exact);
            }

            for prefix in &prefixes {
                for ext in &extensions {
                    let filename = if prefix.is_empty() {
                        format!("{}.{}", name, ext)
                    } else {
                        format!("{}{}.{}", prefix, name, ext)
                    };

                    let full_path = search_path.join(&filename);
                    if full_path.exists() {
                        return Some(full_path);
                    }
                }
            }
        }

        None
    }
}

impl Default for NativeLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryLoader for NativeLoader {
    fn open(&self, path: &Path) -> Result<LibraryHandle, LoadError> {
        let resolved = self
            .resolve_library_path(path)
            .ok_or_else(|| LoadError::NotFound(path.display().to_string()))?;

        // Safety: loading a shared library runs arbitrary initialization
        // code; the caller vouches for the library.
        let library = unsafe {
            Library::new(&resolved).map_err(|e| LoadError::OpenFailed {
                path: resolved.display().to_string(),
                reason: e.to_string(),
            })?
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.libraries
            .lock()
            .expect("loader mutex poisoned")
            .insert(id, library);
        Ok(LibraryHandle(id))
    }

    fn resolve(&self, handle: LibraryHandle, symbol: &str) -> Result<SymbolAddress, LoadError> {
        if symbol.as_bytes().contains(&0) {
            return Err(LoadError::InvalidSymbolName(symbol.to_string()));
        }

        let libraries = self.libraries.lock().expect("loader mutex poisoned");
        let library = libraries.get(&handle.raw()).ok_or(LoadError::StaleHandle)?;

        // Safety: we only take the symbol's address; the type ascription is
        // applied at the call site, where the declared signature governs.
        let address = unsafe {
            let symbol_ptr: libloading::Symbol<'_, *const ()> = library
                .get(symbol.as_bytes())
                .map_err(|e| LoadError::SymbolNotFound {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                })?;
            *symbol_ptr as usize
        };

        Ok(SymbolAddress(address))
    }

    fn close(&self, handle: LibraryHandle) {
        // Dropping the Library closes it.
        self.libraries
            .lock()
            .expect("loader mutex poisoned")
            .remove(&handle.raw());
    }
}
