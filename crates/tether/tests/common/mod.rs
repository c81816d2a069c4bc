//! Shared test fixtures: an in-memory library loader and native functions
//! with C ABI, so the full binding pipeline can be exercised without a
//! fixture shared library on disk.

// Each integration binary uses its own subset of these fixtures.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tether::{LibraryHandle, LibraryLoader, LoadError, SymbolAddress};

/// In-memory loader resolving symbols from a registered table, counting
/// every collaborator call.
#[derive(Default)]
pub struct FakeLoader {
    symbols: HashMap<String, usize>,
    fail_open: bool,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    resolves: Mutex<HashMap<String, usize>>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader whose `open` always fails.
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn with_symbol(mut self, name: &str, addr: usize) -> Self {
        self.symbols.insert(name.to_string(), addr);
        self
    }

    /// How many times `resolve` was attempted for one symbol.
    pub fn resolve_count(&self, symbol: &str) -> usize {
        self.resolves
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or(0)
    }
}

impl LibraryLoader for FakeLoader {
    fn open(&self, path: &Path) -> Result<LibraryHandle, LoadError> {
        if self.fail_open {
            return Err(LoadError::NotFound(path.display().to_string()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(LibraryHandle::from_raw(1))
    }

    fn resolve(&self, _handle: LibraryHandle, symbol: &str) -> Result<SymbolAddress, LoadError> {
        *self
            .resolves
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_insert(0) += 1;

        self.symbols
            .get(symbol)
            .map(|addr| SymbolAddress::from_raw(*addr))
            .ok_or_else(|| LoadError::SymbolNotFound {
                symbol: symbol.to_string(),
                reason: "symbol not registered".to_string(),
            })
    }

    fn close(&self, _handle: LibraryHandle) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ===== Native fixtures (C ABI) =====

pub extern "C" fn multiply(a: i32, b: i32) -> i32 {
    a.wrapping_mul(b)
}

pub extern "C" fn subtract(a: i32, b: i32) -> i32 {
    a.wrapping_sub(b)
}

pub extern "C" fn half(x: f64) -> f64 {
    x / 2.0
}

/// Sums `len` elements starting at `ptr`: the (pointer, length-after) shape.
pub extern "C" fn sum_i32(ptr: *const i32, len: i32) -> i32 {
    let slice = unsafe { std::slice::from_raw_parts(ptr, len as usize) };
    slice.iter().copied().fold(0i32, i32::wrapping_add)
}

/// Same sum with the length placed before the pointer.
pub extern "C" fn sum_i32_len_first(len: i32, ptr: *const i32) -> i32 {
    sum_i32(ptr, len)
}

/// Dot product over two independently marshalled buffers.
pub extern "C" fn dot_i32(a: *const i32, a_len: i32, b: *const i32, b_len: i32) -> i32 {
    let a = unsafe { std::slice::from_raw_parts(a, a_len as usize) };
    let b = unsafe { std::slice::from_raw_parts(b, b_len as usize) };
    a.iter()
        .zip(b.iter())
        .fold(0i32, |acc, (x, y)| acc.wrapping_add(x.wrapping_mul(*y)))
}

/// Scales a mutable buffer in place.
pub extern "C" fn scale_f32(ptr: *mut f32, len: i32, factor: f32) -> i32 {
    let slice = unsafe { std::slice::from_raw_parts_mut(ptr, len as usize) };
    for value in slice.iter_mut() {
        *value *= factor;
    }
    len
}

static ZERO_TO_NINE: [i32; 10] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];

/// Returns a pointer to a static ten-element array.
pub extern "C" fn zero_to_nine() -> *const i32 {
    ZERO_TO_NINE.as_ptr()
}

/// Address of the static array, for asserting reconstructed views.
pub fn zero_to_nine_addr() -> usize {
    ZERO_TO_NINE.as_ptr() as usize
}

#[repr(C)]
pub struct Pair {
    pub a: i32,
    pub b: i32,
}

/// Reads a struct through a pointer, the by-reference struct shape.
pub extern "C" fn pair_sum(pair: *const Pair, multiplier: i32) -> i32 {
    let pair = unsafe { &*pair };
    pair.a.wrapping_add(pair.b).wrapping_mul(multiplier)
}

use std::sync::atomic::AtomicI32;

/// Backing cell for the property accessor fixtures.
pub static MAGIC: AtomicI32 = AtomicI32::new(42);

pub extern "C" fn get_magic() -> i32 {
    MAGIC.load(Ordering::SeqCst)
}

pub extern "C" fn set_magic(value: i32) {
    MAGIC.store(value, Ordering::SeqCst);
}
