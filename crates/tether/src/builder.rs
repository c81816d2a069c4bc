//! Implementation builder - per-member callable adapters
//!
//! Assembles one [`MemberAdapter`] per member descriptor. An adapter runs
//! the wrapper-composed prologue, invokes the native entry point through its
//! binding slot, and runs the epilogue. Global-variable members get
//! read/write accessors that dereference the resolved address directly
//! instead of invoking a function pointer.
//!
//! The native invocation goes through `libffi`: the passthrough signature is
//! dynamically shaped (the span transform synthesizes parameters), so a
//! call interface is built per call from the materialized argument list.
//! Shapes or conventions the backend cannot express are rejected when the
//! plan is built, never at the call site.

use crate::binder::BindingSlot;
use crate::config::BindingConfig;
use crate::error::{CallError, ConfigurationError};
use crate::guard::DisposalGuard;
use crate::interface::{InterfaceDescriptor, MemberDescriptor, MemberKind};
use crate::loader::SymbolAddress;
use crate::marshal::{self, CallFrame, NativeArg, PinLedger};
use crate::pipeline::{return_scalar, CallPlan, GeneratorPipeline, RetOp};
use crate::types::{BufferView, NativeType, ScalarType, Value};
use libffi::middle::{Arg, Cif, CodePtr, Type};
use std::ffi::c_void;
use std::sync::Arc;

/// What an adapter does when exercised.
#[derive(Debug)]
enum AdapterBody {
    /// Execute a wrapper-composed native call
    Function(CallPlan),
    /// Dereference the resolved address as a scalar of this type
    Variable {
        ty: ScalarType,
        disposal_check: bool,
    },
}

/// The callable adapter for one interface member.
pub struct MemberAdapter {
    member: MemberDescriptor,
    body: AdapterBody,
    slot: BindingSlot,
    guard: Arc<DisposalGuard>,
    pins: Arc<PinLedger>,
}

impl MemberAdapter {
    /// The member this adapter implements.
    pub fn member(&self) -> &MemberDescriptor {
        &self.member
    }

    /// The adapter's binding slot.
    pub fn slot(&self) -> &BindingSlot {
        &self.slot
    }

    /// Invoke a function-like member (method or property accessor).
    ///
    /// # Safety
    ///
    /// The declared signature must match the actual native entry point, and
    /// every pointer or buffer argument must satisfy the native side's
    /// expectations for the duration of the call.
    pub unsafe fn invoke(&self, args: &[Value]) -> Result<Value, CallError> {
        let plan = match &self.body {
            AdapterBody::Function(plan) => plan,
            AdapterBody::Variable { .. } => {
                return Err(CallError::NotInvocable {
                    member: self.member.name.clone(),
                    kind: self.member.kind.display_name().to_string(),
                });
            }
        };

        if plan.disposal_check && self.guard.is_disposed() {
            return Err(CallError::UseAfterDispose {
                member: self.member.name.clone(),
            });
        }

        let address = self.slot.resolve(&self.guard)?;
        let frame = marshal::materialize(&self.member, plan, args, &self.pins)?;
        let raw = call_native(address, &frame, return_scalar(&plan.signature));
        // Pins are released as soon as the native call has returned.
        drop(frame);

        match plan.ret_op {
            RetOp::Forward => Ok(raw),
            RetOp::BufferFromPtr {
                len,
                elem_size,
                elem_align,
            } => match raw {
                Value::Ptr(ptr) => Ok(Value::Buffer(BufferView::from_raw_parts(
                    ptr, len, elem_size, elem_align,
                ))),
                _ => unreachable!("buffer-returning plan produced a non-pointer value"),
            },
        }
    }

    /// Read a global-variable member through its resolved address.
    ///
    /// # Safety
    ///
    /// The declared scalar type must match the native variable's actual
    /// type and the library must still be loaded.
    pub unsafe fn read(&self) -> Result<Value, CallError> {
        let (ty, disposal_check) = self.variable_body()?;
        if disposal_check && self.guard.is_disposed() {
            return Err(CallError::UseAfterDispose {
                member: self.member.name.clone(),
            });
        }

        let address = self.slot.resolve(&self.guard)?;
        Ok(read_scalar(address, ty))
    }

    /// Write a global-variable member through its resolved address.
    ///
    /// # Safety
    ///
    /// Same contract as [`MemberAdapter::read`].
    pub unsafe fn write(&self, value: &Value) -> Result<(), CallError> {
        let (ty, disposal_check) = self.variable_body()?;
        if disposal_check && self.guard.is_disposed() {
            return Err(CallError::UseAfterDispose {
                member: self.member.name.clone(),
            });
        }
        if value.scalar_type() != Some(ty) {
            return Err(CallError::ArgumentMismatch {
                member: self.member.name.clone(),
                param: "value".to_string(),
                expected: ty.display_name().to_string(),
                got: value.type_name().to_string(),
            });
        }

        let address = self.slot.resolve(&self.guard)?;
        write_scalar(address, value);
        Ok(())
    }

    fn variable_body(&self) -> Result<(ScalarType, bool), CallError> {
        match &self.body {
            AdapterBody::Variable { ty, disposal_check } => Ok((*ty, *disposal_check)),
            AdapterBody::Function(_) => Err(CallError::NotAVariable {
                member: self.member.name.clone(),
                kind: self.member.kind.display_name().to_string(),
            }),
        }
    }
}

/// Build one adapter per interface member.
///
/// Any member whose plan cannot be built fails the whole construction; no
/// partial adapter set is returned.
pub fn build_adapters(
    interface: &InterfaceDescriptor,
    config: &BindingConfig,
    guard: &Arc<DisposalGuard>,
    pins: &Arc<PinLedger>,
) -> Result<Vec<MemberAdapter>, ConfigurationError> {
    let pipeline = GeneratorPipeline::new(config);

    interface
        .members()
        .iter()
        .map(|member| {
            validate_member_shape(member)?;
            let body = match member.kind {
                MemberKind::GlobalVariable => {
                    let ty = variable_scalar(member)?;
                    AdapterBody::Variable {
                        ty,
                        disposal_check: config.disposal_checks && member.disposal_check,
                    }
                }
                _ => AdapterBody::Function(pipeline.run(member)?),
            };

            Ok(MemberAdapter {
                member: member.clone(),
                body,
                slot: BindingSlot::new(member.name.as_str(), member.effective_symbol()),
                guard: guard.clone(),
                pins: pins.clone(),
            })
        })
        .collect()
}

/// Property accessors and variables have fixed arities; reject descriptors
/// that cannot possibly match them.
fn validate_member_shape(member: &MemberDescriptor) -> Result<(), ConfigurationError> {
    let fail = |detail: &str| {
        Err(ConfigurationError::UnsupportedShape {
            member: member.name.clone(),
            detail: detail.to_string(),
        })
    };

    match member.kind {
        MemberKind::Method => Ok(()),
        MemberKind::PropertyGetter => {
            if !member.params.is_empty() {
                return fail("property getter takes no parameters");
            }
            if member.ret == NativeType::Void {
                return fail("property getter must return a value");
            }
            Ok(())
        }
        MemberKind::PropertySetter => {
            if member.params.len() != 1 {
                return fail("property setter takes exactly one parameter");
            }
            if member.ret != NativeType::Void {
                return fail("property setter returns nothing");
            }
            Ok(())
        }
        MemberKind::GlobalVariable => Ok(()),
    }
}

fn variable_scalar(member: &MemberDescriptor) -> Result<ScalarType, ConfigurationError> {
    if !member.params.is_empty() {
        return Err(ConfigurationError::UnsupportedShape {
            member: member.name.clone(),
            detail: "global variable members take no parameters".to_string(),
        });
    }
    match &member.ret {
        NativeType::Scalar(s) => Ok(*s),
        other => Err(ConfigurationError::UnsupportedShape {
            member: member.name.clone(),
            detail: format!(
                "global variable members must be scalar-shaped, not {}",
                other.display_name()
            ),
        }),
    }
}

/// Drive the native call through libffi, dispatching on the passthrough
/// return scalar.
unsafe fn call_native(
    address: SymbolAddress,
    frame: &CallFrame,
    ret: Option<ScalarType>,
) -> Value {
    let arg_types: Vec<Type> = frame.args.iter().map(ffi_type_of).collect();
    let cif = Cif::new(arg_types, ffi_return_type(ret));
    let args: Vec<Arg> = frame.args.iter().map(ffi_arg_of).collect();
    let code = CodePtr(address.as_mut_ptr());

    match ret {
        None => {
            cif.call::<()>(code, &args);
            Value::Unit
        }
        Some(ScalarType::I8) => Value::I8(cif.call::<i8>(code, &args)),
        Some(ScalarType::U8) => Value::U8(cif.call::<u8>(code, &args)),
        Some(ScalarType::I16) => Value::I16(cif.call::<i16>(code, &args)),
        Some(ScalarType::U16) => Value::U16(cif.call::<u16>(code, &args)),
        Some(ScalarType::I32) => Value::I32(cif.call::<i32>(code, &args)),
        Some(ScalarType::U32) => Value::U32(cif.call::<u32>(code, &args)),
        Some(ScalarType::I64) => Value::I64(cif.call::<i64>(code, &args)),
        Some(ScalarType::U64) => Value::U64(cif.call::<u64>(code, &args)),
        Some(ScalarType::F32) => Value::F32(cif.call::<f32>(code, &args)),
        Some(ScalarType::F64) => Value::F64(cif.call::<f64>(code, &args)),
        Some(ScalarType::Pointer) => Value::Ptr(cif.call::<*mut c_void>(code, &args)),
    }
}

fn ffi_type_of(arg: &NativeArg) -> Type {
    match arg {
        NativeArg::I8(_) => Type::i8(),
        NativeArg::U8(_) => Type::u8(),
        NativeArg::I16(_) => Type::i16(),
        NativeArg::U16(_) => Type::u16(),
        NativeArg::I32(_) => Type::i32(),
        NativeArg::U32(_) => Type::u32(),
        NativeArg::I64(_) => Type::i64(),
        NativeArg::U64(_) => Type::u64(),
        NativeArg::F32(_) => Type::f32(),
        NativeArg::F64(_) => Type::f64(),
        NativeArg::Ptr(_) => Type::pointer(),
    }
}

fn ffi_return_type(ret: Option<ScalarType>) -> Type {
    match ret {
        None => Type::void(),
        Some(ScalarType::I8) => Type::i8(),
        Some(ScalarType::U8) => Type::u8(),
        Some(ScalarType::I16) => Type::i16(),
        Some(ScalarType::U16) => Type::u16(),
        Some(ScalarType::I32) => Type::i32(),
        Some(ScalarType::U32) => Type::u32(),
        Some(ScalarType::I64) => Type::i64(),
        Some(ScalarType::U64) => Type::u64(),
        Some(ScalarType::F32) => Type::f32(),
        Some(ScalarType::F64) => Type::f64(),
        Some(ScalarType::Pointer) => Type::pointer(),
    }
}

fn ffi_arg_of(arg: &NativeArg) -> Arg {
    match arg {
        NativeArg::I8(v) => Arg::new(v),
        NativeArg::U8(v) => Arg::new(v),
        NativeArg::I16(v) => Arg::new(v),
        NativeArg::U16(v) => Arg::new(v),
        NativeArg::I32(v) => Arg::new(v),
        NativeArg::U32(v) => Arg::new(v),
        NativeArg::I64(v) => Arg::new(v),
        NativeArg::U64(v) => Arg::new(v),
        NativeArg::F32(v) => Arg::new(v),
        NativeArg::F64(v) => Arg::new(v),
        NativeArg::Ptr(v) => Arg::new(v),
    }
}

unsafe fn read_scalar(address: SymbolAddress, ty: ScalarType) -> Value {
    let ptr = address.as_mut_ptr();
    match ty {
        ScalarType::I8 => Value::I8(std::ptr::read(ptr as *const i8)),
        ScalarType::U8 => Value::U8(std::ptr::read(ptr as *const u8)),
        ScalarType::I16 => Value::I16(std::ptr::read(ptr as *const i16)),
        ScalarType::U16 => Value::U16(std::ptr::read(ptr as *const u16)),
        ScalarType::I32 => Value::I32(std::ptr::read(ptr as *const i32)),
        ScalarType::U32 => Value::U32(std::ptr::read(ptr as *const u32)),
        ScalarType::I64 => Value::I64(std::ptr::read(ptr as *const i64)),
        ScalarType::U64 => Value::U64(std::ptr::read(ptr as *const u64)),
        ScalarType::F32 => Value::F32(std::ptr::read(ptr as *const f32)),
        ScalarType::F64 => Value::F64(std::ptr::read(ptr as *const f64)),
        ScalarType::Pointer => Value::Ptr(std::ptr::read(ptr as *const *mut c_void)),
    }
}

unsafe fn write_scalar(address: SymbolAddress, value: &Value) {
    let ptr = address.as_mut_ptr();
    match *value {
        Value::I8(v) => std::ptr::write(ptr as *mut i8, v),
        Value::U8(v) => std::ptr::write(ptr as *mut u8, v),
        Value::I16(v) => std::ptr::write(ptr as *mut i16, v),
        Value::U16(v) => std::ptr::write(ptr as *mut u16, v),
        Value::I32(v) => std::ptr::write(ptr as *mut i32, v),
        Value::U32(v) => std::ptr::write(ptr as *mut u32, v),
        Value::I64(v) => std::ptr::write(ptr as *mut i64, v),
        Value::U64(v) => std::ptr::write(ptr as *mut u64, v),
        Value::F32(v) => std::ptr::write(ptr as *mut f32, v),
        Value::F64(v) => std::ptr::write(ptr as *mut f64, v),
        Value::Ptr(v) => std::ptr::write(ptr as *mut *mut c_void, v),
        // The shape check in `write` rules these out.
        Value::Unit | Value::Buffer(_) => unreachable!("non-scalar value in variable write"),
    }
}
