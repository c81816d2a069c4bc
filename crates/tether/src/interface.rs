//! Capability interface descriptors
//!
//! A capability interface declares the members a native library is expected
//! to provide: methods, property accessors, and global variables. Descriptors
//! are plain data, immutable once constructed, and serializable so interface
//! definitions can live in data files.

use crate::error::ConfigurationError;
use crate::types::{NativeType, ScalarType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Kind of a declared interface member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberKind {
    /// A callable function
    Method,
    /// A property read accessor (zero parameters, non-void return)
    PropertyGetter,
    /// A property write accessor (one parameter, void return)
    PropertySetter,
    /// A global variable, accessed by dereferencing its resolved address
    GlobalVariable,
}

impl MemberKind {
    /// Get a display name for this member kind
    pub fn display_name(&self) -> &'static str {
        match self {
            MemberKind::Method => "method",
            MemberKind::PropertyGetter => "property getter",
            MemberKind::PropertySetter => "property setter",
            MemberKind::GlobalVariable => "global variable",
        }
    }
}

/// Unmanaged calling convention of a member's entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CallingConvention {
    /// The platform's default C convention
    #[default]
    C,
    /// The platform's "system" convention (stdcall on 32-bit Windows,
    /// identical to `C` everywhere else)
    System,
}

/// Relative direction of a synthesized length parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LengthDirection {
    /// Length parameter is placed before the marshalled buffer parameter
    Before,
    /// Length parameter is placed after the marshalled buffer parameter
    After,
}

/// Numeric width of a synthesized length parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LengthWidth {
    /// Signed 8-bit length field
    I8,
    /// Unsigned 8-bit length field
    U8,
    /// Signed 16-bit length field
    I16,
    /// Unsigned 16-bit length field
    U16,
    /// Signed 32-bit length field
    I32,
    /// Unsigned 32-bit length field
    U32,
    /// Signed 64-bit length field
    I64,
    /// Unsigned 64-bit length field
    U64,
}

impl LengthWidth {
    /// The scalar type the length field occupies in the passthrough signature.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            LengthWidth::I8 => ScalarType::I8,
            LengthWidth::U8 => ScalarType::U8,
            LengthWidth::I16 => ScalarType::I16,
            LengthWidth::U16 => ScalarType::U16,
            LengthWidth::I32 => ScalarType::I32,
            LengthWidth::U32 => ScalarType::U32,
            LengthWidth::I64 => ScalarType::I64,
            LengthWidth::U64 => ScalarType::U64,
        }
    }

    /// Width of the field in bits.
    pub fn bits(&self) -> u8 {
        (self.scalar_type().size() * 8) as u8
    }

    /// Largest buffer length representable in this width.
    pub fn max_len(&self) -> u128 {
        match self {
            LengthWidth::I8 => i8::MAX as u128,
            LengthWidth::U8 => u8::MAX as u128,
            LengthWidth::I16 => i16::MAX as u128,
            LengthWidth::U16 => u16::MAX as u128,
            LengthWidth::I32 => i32::MAX as u128,
            LengthWidth::U32 => u32::MAX as u128,
            LengthWidth::I64 => i64::MAX as u128,
            LengthWidth::U64 => u64::MAX as u128,
        }
    }
}

/// How a buffer parameter communicates its length to the native side.
///
/// The synthesized length parameter is inserted into the passthrough
/// signature at `current_index + 1 + offset` for [`LengthDirection::After`]
/// or `current_index - offset` for [`LengthDirection::Before`], where
/// `current_index` is the buffer parameter's position after all earlier
/// insertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanMarshalSpec {
    /// Placement direction relative to the buffer parameter
    pub direction: LengthDirection,
    /// Signed placement offset in the chosen direction
    pub offset: i32,
    /// Numeric width of the length field
    pub width: LengthWidth,
}

impl Default for SpanMarshalSpec {
    fn default() -> Self {
        Self {
            direction: LengthDirection::After,
            offset: 0,
            width: LengthWidth::I32,
        }
    }
}

impl SpanMarshalSpec {
    /// Spec placing an `i32` length immediately after the buffer parameter.
    pub fn after() -> Self {
        Self::default()
    }

    /// Spec placing an `i32` length immediately before the buffer parameter.
    pub fn before() -> Self {
        Self {
            direction: LengthDirection::Before,
            offset: 0,
            width: LengthWidth::I32,
        }
    }

    /// Override the placement offset.
    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    /// Override the length field width.
    pub fn with_width(mut self, width: LengthWidth) -> Self {
        self.width = width;
        self
    }
}

/// A declared parameter of an interface member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    /// Declared parameter name
    pub name: String,
    /// Declared shape
    pub ty: NativeType,
    /// Buffer-length marshalling, for buffer-shaped parameters whose length
    /// must cross the boundary as a synthesized parameter
    pub span: Option<SpanMarshalSpec>,
}

impl Param {
    /// Create a plain parameter
    pub fn new(name: impl Into<String>, ty: NativeType) -> Self {
        Self {
            name: name.into(),
            ty,
            span: None,
        }
    }

    /// Attach a span marshal spec to this parameter.
    pub fn with_span(mut self, spec: SpanMarshalSpec) -> Self {
        self.span = Some(spec);
        self
    }
}

/// Normalized metadata for one interface member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDescriptor {
    /// Member kind
    pub kind: MemberKind,
    /// Declared name; unique within the interface
    pub name: String,
    /// Native symbol override; the declared name is used when absent
    pub symbol: Option<String>,
    /// Calling convention of the entry point
    pub convention: CallingConvention,
    /// Ordered parameter shapes
    pub params: Vec<Param>,
    /// Return shape
    pub ret: NativeType,
    /// Author-declared element count for a buffer-shaped return; required
    /// when `ret` is a buffer
    pub ret_fixed_len: Option<usize>,
    /// Whether this member participates in disposal checking when the
    /// configuration enables it
    pub disposal_check: bool,
}

impl MemberDescriptor {
    /// Create a method member with the declared signature.
    pub fn method(name: impl Into<String>, params: Vec<Param>, ret: NativeType) -> Self {
        Self {
            kind: MemberKind::Method,
            name: name.into(),
            symbol: None,
            convention: CallingConvention::C,
            params,
            ret,
            ret_fixed_len: None,
            disposal_check: true,
        }
    }

    /// Create a property getter member.
    pub fn property_getter(name: impl Into<String>, ret: NativeType) -> Self {
        Self {
            kind: MemberKind::PropertyGetter,
            ..Self::method(name, Vec::new(), ret)
        }
    }

    /// Create a property setter member.
    pub fn property_setter(name: impl Into<String>, param: Param) -> Self {
        Self {
            kind: MemberKind::PropertySetter,
            ..Self::method(name, vec![param], NativeType::Void)
        }
    }

    /// Create a global-variable member of the given scalar shape.
    pub fn global_variable(name: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            kind: MemberKind::GlobalVariable,
            ..Self::method(name, Vec::new(), NativeType::Scalar(ty))
        }
    }

    /// Override the native symbol this member binds to.
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Override the calling convention.
    pub fn with_convention(mut self, convention: CallingConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Declare the fixed element count of a buffer-shaped return.
    pub fn with_return_length(mut self, len: usize) -> Self {
        self.ret_fixed_len = Some(len);
        self
    }

    /// Opt this member out of disposal checking.
    pub fn without_disposal_check(mut self) -> Self {
        self.disposal_check = false;
        self
    }

    /// The native symbol this member binds to.
    pub fn effective_symbol(&self) -> &str {
        self.symbol.as_deref().unwrap_or(&self.name)
    }
}

/// An ordered set of member descriptors with a declared identity.
///
/// Identity is the declared interface name; two descriptors with the same
/// name are the same interface for caching purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    name: String,
    members: Vec<MemberDescriptor>,
}

impl InterfaceDescriptor {
    /// Create an interface descriptor, validating member identifier
    /// uniqueness.
    pub fn new(
        name: impl Into<String>,
        members: Vec<MemberDescriptor>,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let mut seen = HashSet::new();
        for member in &members {
            if !seen.insert(member.name.as_str()) {
                return Err(ConfigurationError::DuplicateMember {
                    interface: name.clone(),
                    member: member.name.clone(),
                });
            }
        }
        Ok(Self { name, members })
    }

    /// Declared interface identity.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared members, in declaration order.
    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    /// Look up a member by declared name.
    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.members.iter().find(|m| m.name == name)
    }
}
