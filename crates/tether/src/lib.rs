//! Tether - native capability binding runtime
//!
//! Tether turns an abstract capability interface - a declared set of
//! methods, property accessors, and global variables - into a concrete,
//! callable implementation that forwards each member to an entry point
//! inside a dynamically loaded shared library:
//! - Per-member signature transforms (buffer/span marshalling with
//!   synthesized length parameters, disposal gating)
//! - Eager or lazy symbol binding through monotonic binding slots
//! - One canonical instance per (interface, library, configuration) triple
//!
//! # Example
//!
//! ```no_run
//! use tether::{
//!     BindingConfig, InterfaceDescriptor, MemberDescriptor, NativeType, Param, ScalarType,
//!     Tether, Value,
//! };
//!
//! let interface = InterfaceDescriptor::new(
//!     "IMath",
//!     vec![MemberDescriptor::method(
//!         "Multiply",
//!         vec![
//!             Param::new("a", NativeType::Scalar(ScalarType::I32)),
//!             Param::new("b", NativeType::Scalar(ScalarType::I32)),
//!         ],
//!         NativeType::Scalar(ScalarType::I32),
//!     )],
//! )?;
//!
//! let runtime = Tether::new();
//! let library = runtime.bind(&interface, "math", BindingConfig::eager())?;
//! let product = unsafe { library.invoke("Multiply", &[Value::I32(6), Value::I32(7)])? };
//! assert_eq!(product, Value::I32(42));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Safety
//!
//! Invoking native code with a declared signature is inherently unsafe: the
//! declaration is trusted to match the library. All unsafe surface is
//! concentrated in the invocation entry points and documented there.

/// Tether runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod binder;
pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod interface;
pub mod loader;
pub mod marshal;
pub mod pipeline;
pub mod runtime;
pub mod types;

// Re-export commonly used types
pub use binder::{BindingSlot, SlotState, SymbolBinder};
pub use builder::MemberAdapter;
pub use cache::{CacheKey, InstanceCache};
pub use config::{BindingConfig, BindingMode};
pub use error::{
    BindingError, CallError, ConfigurationError, LoadError, PinningError, SymbolBindingError,
};
pub use guard::DisposalGuard;
pub use interface::{
    CallingConvention, InterfaceDescriptor, LengthDirection, LengthWidth, MemberDescriptor,
    MemberKind, Param, SpanMarshalSpec,
};
pub use loader::{LibraryHandle, LibraryLoader, NativeLoader, SymbolAddress};
pub use marshal::PinLedger;
pub use pipeline::{ArgOp, CallPlan, CallWrapper, GeneratorPipeline, RetOp, Signature, WorkUnit};
pub use runtime::{BoundLibrary, Tether};
pub use types::{BufferView, NativeType, ScalarType, StructLayout, Value};
