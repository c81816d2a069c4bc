//! Generator pipeline - per-member signature transforms and call plans
//!
//! Each member descriptor is threaded through an ordered set of call
//! wrappers. A wrapper may rewrite the member's effective (passthrough)
//! signature and record prologue/epilogue instructions for the eventual
//! native call. The pipeline's output is a [`CallPlan`]: the passthrough
//! signature plus the ordered instruction sequence the adapter executes.
//!
//! Wrapper order is fixed at registration (buffer marshalling before the
//! disposal check), and every wrapper is a pure function of the descriptor,
//! so re-running the pipeline on an identical descriptor yields a
//! structurally identical plan. The instance cache relies on this.

pub mod disposal;
pub mod span_marshal;

use crate::config::BindingConfig;
use crate::error::ConfigurationError;
use crate::interface::{CallingConvention, LengthWidth, MemberDescriptor};
use crate::types::{NativeType, ScalarType};

pub use disposal::DisposalCheckWrapper;
pub use span_marshal::SpanMarshallingWrapper;

/// One parameter of a passthrough signature.
#[derive(Debug, Clone, PartialEq)]
pub struct PassthroughParam {
    /// Parameter name (synthesized parameters derive theirs from the source
    /// buffer parameter)
    pub name: String,
    /// Shape as seen by the native call
    pub ty: NativeType,
}

/// The transformed signature used for the actual native call.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    /// Ordered passthrough parameters
    pub params: Vec<PassthroughParam>,
    /// Passthrough return shape
    pub ret: NativeType,
}

impl Signature {
    /// The declared signature of a member, before any transform.
    fn declared(member: &MemberDescriptor) -> Self {
        Self {
            params: member
                .params
                .iter()
                .map(|p| PassthroughParam {
                    name: p.name.clone(),
                    ty: p.ty.clone(),
                })
                .collect(),
            ret: member.ret.clone(),
        }
    }
}

/// Prologue instruction: how one passthrough argument is produced from the
/// caller's original arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgOp {
    /// Copy the original argument at `source` through unchanged
    Forward { source: usize },
    /// Pin the buffer argument at `source` against the recorded element
    /// layout and pass its base address
    BufferPtr {
        source: usize,
        elem_size: usize,
        elem_align: usize,
    },
    /// Pass the length of the buffer argument at `source`, converted to the
    /// synthesized width
    BufferLen { source: usize, width: LengthWidth },
}

/// Epilogue instruction: how the native return value becomes the caller's
/// return value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetOp {
    /// Return the native value unchanged
    Forward,
    /// Reconstruct a buffer view from the returned pointer and the declared
    /// fixed element count
    BufferFromPtr {
        len: usize,
        elem_size: usize,
        elem_align: usize,
    },
}

/// A member descriptor paired with its current effective signature,
/// threaded through successive wrapper stages. Owned by one pipeline run.
#[derive(Debug)]
pub struct WorkUnit<'a> {
    /// The member under transformation
    pub member: &'a MemberDescriptor,
    /// Current effective signature
    pub signature: Signature,
    /// Recorded prologue instructions, one per passthrough parameter
    pub arg_ops: Vec<ArgOp>,
    /// Recorded epilogue instruction
    pub ret_op: RetOp,
    /// Whether the adapter must gate the call on instance liveness
    pub disposal_check: bool,
}

impl<'a> WorkUnit<'a> {
    fn new(member: &'a MemberDescriptor) -> Self {
        Self {
            member,
            signature: Signature::declared(member),
            arg_ops: (0..member.params.len())
                .map(|source| ArgOp::Forward { source })
                .collect(),
            ret_op: RetOp::Forward,
            disposal_check: false,
        }
    }
}

/// Finished output of a pipeline run for one member.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPlan {
    /// Passthrough signature for the native call
    pub signature: Signature,
    /// Ordered prologue instructions
    pub arg_ops: Vec<ArgOp>,
    /// Epilogue instruction
    pub ret_op: RetOp,
    /// Liveness gate flag
    pub disposal_check: bool,
}

/// A pipeline stage that may rewrite a member's effective signature and
/// record call-site instructions.
pub trait CallWrapper {
    /// Whether this wrapper applies to the member.
    fn is_applicable(&self, member: &MemberDescriptor) -> bool;

    /// Transform the work unit. A failure fails the whole member pipeline;
    /// no partial plan is produced.
    fn transform(&self, unit: &mut WorkUnit<'_>) -> Result<(), ConfigurationError>;
}

/// Orders applicable wrappers and produces call plans.
pub struct GeneratorPipeline {
    wrappers: Vec<Box<dyn CallWrapper>>,
}

impl GeneratorPipeline {
    /// Build the pipeline for a configuration. Registration order is fixed:
    /// buffer marshalling first, then the disposal check when enabled.
    pub fn new(config: &BindingConfig) -> Self {
        let mut wrappers: Vec<Box<dyn CallWrapper>> = vec![Box::new(SpanMarshallingWrapper)];
        if config.disposal_checks {
            wrappers.push(Box::new(DisposalCheckWrapper));
        }
        Self { wrappers }
    }

    /// Run every applicable wrapper over the member, in registration order.
    pub fn run(&self, member: &MemberDescriptor) -> Result<CallPlan, ConfigurationError> {
        validate_shapes(member)?;
        validate_convention(member)?;

        let mut unit = WorkUnit::new(member);
        for wrapper in &self.wrappers {
            if wrapper.is_applicable(member) {
                wrapper.transform(&mut unit)?;
            }
        }

        Ok(CallPlan {
            signature: unit.signature,
            arg_ops: unit.arg_ops,
            ret_op: unit.ret_op,
            disposal_check: unit.disposal_check,
        })
    }
}

/// Reject shapes the call backend cannot express before any wrapper runs.
fn validate_shapes(member: &MemberDescriptor) -> Result<(), ConfigurationError> {
    for param in &member.params {
        match &param.ty {
            NativeType::Void => {
                return Err(ConfigurationError::UnsupportedShape {
                    member: member.name.clone(),
                    detail: format!("parameter `{}` is void", param.name),
                });
            }
            NativeType::Struct(layout) => {
                return Err(ConfigurationError::ByValueStruct {
                    member: member.name.clone(),
                    param: param.name.clone(),
                    shape: format!("struct {}", layout.name),
                });
            }
            _ => {}
        }
    }

    if let NativeType::Struct(layout) = &member.ret {
        return Err(ConfigurationError::ByValueStruct {
            member: member.name.clone(),
            param: "return".to_string(),
            shape: format!("struct {}", layout.name),
        });
    }

    Ok(())
}

/// A convention the backend cannot honor is a configuration error, never
/// undefined behavior.
fn validate_convention(member: &MemberDescriptor) -> Result<(), ConfigurationError> {
    match member.convention {
        CallingConvention::C => Ok(()),
        CallingConvention::System => {
            // The system convention diverges from C only on 32-bit Windows
            // (stdcall); the call backend drives the platform default ABI.
            if cfg!(all(windows, target_arch = "x86")) {
                Err(ConfigurationError::UnsupportedConvention {
                    member: member.name.clone(),
                    convention: member.convention,
                })
            } else {
                Ok(())
            }
        }
    }
}

/// Scalar kind of a passthrough return shape, used by the call dispatcher.
pub fn return_scalar(signature: &Signature) -> Option<ScalarType> {
    match &signature.ret {
        NativeType::Void => None,
        NativeType::Scalar(s) => Some(*s),
        NativeType::Handle => Some(ScalarType::Pointer),
        // Buffers are rewritten to pointers before this is consulted;
        // structs are rejected up front.
        _ => None,
    }
}
