//! Error taxonomy for binding construction and invocation
//!
//! Construction-time failures (`ConfigurationError`, eager
//! `SymbolBindingError`, `LoadError`) surface through [`BindingError`] and
//! leave no usable instance. Call-time failures surface through
//! [`CallError`] and are fatal only to the call that raised them.

use crate::interface::CallingConvention;
use thiserror::Error;

/// Invalid member or marshalling configuration, detected at pipeline-build
/// time. Fatal to construction; no partial adapters are installed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("duplicate member identifier `{member}` in interface `{interface}`")]
    DuplicateMember { interface: String, member: String },

    #[error(
        "length parameter for buffer `{param}` of `{member}` resolves to position {position}, \
         outside [0, {count}]"
    )]
    LengthPositionOutOfRange {
        member: String,
        param: String,
        position: isize,
        count: usize,
    },

    #[error(
        "buffer element of `{param}` in `{member}` is `{element}`, which holds object references \
         and cannot cross the native boundary"
    )]
    ReferenceElement {
        member: String,
        param: String,
        element: String,
    },

    #[error("buffer element of `{param}` in `{member}` is itself a buffer; nested views cannot be marshalled")]
    NestedBuffer { member: String, param: String },

    #[error("`{member}` passes `{param}` ({shape}) by value; structures cross the boundary by pointer only")]
    ByValueStruct {
        member: String,
        param: String,
        shape: String,
    },

    #[error("buffer-shaped return of `{member}` has no declared fixed length")]
    MissingReturnLength { member: String },

    #[error("calling convention {convention:?} cannot be honored on this target for `{member}`")]
    UnsupportedConvention {
        member: String,
        convention: CallingConvention,
    },

    #[error("`{member}`: unsupported shape: {detail}")]
    UnsupportedShape { member: String, detail: String },
}

/// A native entry point could not be associated with a declared member.
///
/// Under eager binding this aborts construction; under lazy binding it
/// surfaces on the first invocation of the affected member only.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("no entry point `{symbol}` for member `{member}` in `{library}`: {reason}")]
pub struct SymbolBindingError {
    /// Declared member name
    pub member: String,
    /// Native symbol that failed to resolve
    pub symbol: String,
    /// Library the symbol was looked up in
    pub library: String,
    /// Loader-reported reason
    pub reason: String,
}

/// Library loader collaborator failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("library not found: {0}")]
    NotFound(String),

    #[error("failed to load library `{path}`: {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("symbol `{symbol}` not found: {reason}")]
    SymbolNotFound { symbol: String, reason: String },

    #[error("invalid symbol name `{0}`")]
    InvalidSymbolName(String),

    #[error("stale library handle (library already closed)")]
    StaleHandle,
}

/// A buffer could not be pinned for the duration of a call, or its length
/// could not be represented. Fatal to the single call, not to the instance.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PinningError {
    #[error("buffer for `{param}` has a null base pointer with nonzero length {len}")]
    NullBuffer { param: String, len: usize },

    #[error("buffer for `{param}` is misaligned: address {addr:#x} requires alignment {align}")]
    Misaligned {
        param: String,
        addr: usize,
        align: usize,
    },

    #[error(
        "buffer element for `{param}` is {got} bytes; the declared element occupies {expected}"
    )]
    ElementMismatch {
        param: String,
        expected: usize,
        got: usize,
    },

    #[error("buffer length {len} for `{param}` overflows the synthesized {bits}-bit length field")]
    LengthOverflow { param: String, len: usize, bits: u8 },
}

/// Per-invocation failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error(transparent)]
    Symbol(#[from] SymbolBindingError),

    #[error("`{member}` was called after its library was disposed")]
    UseAfterDispose { member: String },

    #[error(transparent)]
    Pinning(#[from] PinningError),

    #[error("`{member}` expects {expected} arguments, got {got}")]
    ArityMismatch {
        member: String,
        expected: usize,
        got: usize,
    },

    #[error("argument `{param}` of `{member}`: expected {expected}, got {got}")]
    ArgumentMismatch {
        member: String,
        param: String,
        expected: String,
        got: String,
    },

    #[error("`{member}` is a {kind}, not a callable member")]
    NotInvocable { member: String, kind: String },

    #[error("`{member}` is a {kind}, not a global variable")]
    NotAVariable { member: String, kind: String },

    #[error("interface has no member named `{member}`")]
    UnknownMember { member: String },
}

/// Construction-time umbrella returned by the build entry point.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Symbol(#[from] SymbolBindingError),

    #[error(transparent)]
    Load(#[from] LoadError),
}
