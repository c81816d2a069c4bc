//! Call-time marshalling - argument materialization and buffer pinning
//!
//! Executes a call plan's prologue against the caller's arguments, producing
//! a [`CallFrame`]: the flat list of native argument words plus the pins
//! that keep every buffer's backing memory fixed for the duration of the
//! call. Pins are released when the frame drops, so every exit path -
//! including an error between prologue and call - releases them.

use crate::error::{CallError, PinningError};
use crate::interface::{LengthWidth, MemberDescriptor};
use crate::pipeline::{ArgOp, CallPlan};
use crate::types::{BufferView, NativeType, Value};
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts live buffer pins for one implementation instance.
///
/// Purely observational: the count lets callers (and tests) verify that
/// every pin taken for a call was released when the call returned.
#[derive(Debug, Default)]
pub struct PinLedger {
    active: AtomicUsize,
}

impl PinLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently live pins.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Keeps a buffer's backing memory address fixed for the lifetime of the
/// pin. Dropping the pin releases it.
#[derive(Debug)]
pub struct PinnedBuffer {
    ptr: *mut c_void,
    ledger: Arc<PinLedger>,
}

impl PinnedBuffer {
    /// Validate and pin a buffer view against its declared element layout.
    pub fn pin(
        param: &str,
        view: &BufferView,
        elem_size: usize,
        elem_align: usize,
        ledger: Arc<PinLedger>,
    ) -> Result<Self, PinningError> {
        let ptr = view.as_ptr();

        if ptr.is_null() && view.len() > 0 {
            return Err(PinningError::NullBuffer {
                param: param.to_string(),
                len: view.len(),
            });
        }
        if view.elem_size() != elem_size {
            return Err(PinningError::ElementMismatch {
                param: param.to_string(),
                expected: elem_size,
                got: view.elem_size(),
            });
        }
        if !ptr.is_null() && (ptr as usize) % elem_align != 0 {
            return Err(PinningError::Misaligned {
                param: param.to_string(),
                addr: ptr as usize,
                align: elem_align,
            });
        }

        ledger.active.fetch_add(1, Ordering::SeqCst);
        Ok(Self { ptr, ledger })
    }

    /// The pinned base address.
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr
    }
}

impl Drop for PinnedBuffer {
    fn drop(&mut self) {
        self.ledger.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One materialized native argument word.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeArg {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Ptr(*mut c_void),
}

/// The materialized arguments of one native call, plus the pins that must
/// outlive it.
#[derive(Debug)]
pub struct CallFrame {
    /// Arguments in passthrough order
    pub args: Vec<NativeArg>,
    /// Pins held for the duration of the call
    pins: Vec<PinnedBuffer>,
}

impl CallFrame {
    /// Number of pins this frame holds.
    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }
}

/// Execute the plan's prologue: validate the caller's arguments against the
/// declared signature and materialize the passthrough argument list.
pub fn materialize(
    member: &MemberDescriptor,
    plan: &CallPlan,
    values: &[Value],
    ledger: &Arc<PinLedger>,
) -> Result<CallFrame, CallError> {
    if values.len() != member.params.len() {
        return Err(CallError::ArityMismatch {
            member: member.name.clone(),
            expected: member.params.len(),
            got: values.len(),
        });
    }

    let mut args = Vec::with_capacity(plan.arg_ops.len());
    let mut pins = Vec::new();

    for op in &plan.arg_ops {
        match *op {
            ArgOp::Forward { source } => {
                let param = &member.params[source];
                args.push(scalar_arg(member, &param.name, &param.ty, &values[source])?);
            }
            ArgOp::BufferPtr {
                source,
                elem_size,
                elem_align,
            } => {
                let param = &member.params[source];
                let view = buffer_arg(member, &param.name, &values[source])?;
                let pin = PinnedBuffer::pin(&param.name, view, elem_size, elem_align, ledger.clone())?;
                args.push(NativeArg::Ptr(pin.as_ptr()));
                pins.push(pin);
            }
            ArgOp::BufferLen { source, width } => {
                let param = &member.params[source];
                let view = buffer_arg(member, &param.name, &values[source])?;
                args.push(length_arg(&param.name, view.len(), width)?);
            }
        }
    }

    Ok(CallFrame { args, pins })
}

/// Convert a scalar-shaped argument, requiring an exact shape match.
fn scalar_arg(
    member: &MemberDescriptor,
    param: &str,
    expected: &NativeType,
    value: &Value,
) -> Result<NativeArg, CallError> {
    let mismatch = || CallError::ArgumentMismatch {
        member: member.name.clone(),
        param: param.to_string(),
        expected: expected.display_name(),
        got: value.type_name().to_string(),
    };

    match (expected, value) {
        (NativeType::Scalar(s), v) if v.scalar_type() == Some(*s) => {
            native_arg_of(v).ok_or_else(mismatch)
        }
        (NativeType::Handle, Value::Ptr(p)) => Ok(NativeArg::Ptr(*p)),
        _ => Err(mismatch()),
    }
}

fn native_arg_of(value: &Value) -> Option<NativeArg> {
    match *value {
        Value::I8(v) => Some(NativeArg::I8(v)),
        Value::U8(v) => Some(NativeArg::U8(v)),
        Value::I16(v) => Some(NativeArg::I16(v)),
        Value::U16(v) => Some(NativeArg::U16(v)),
        Value::I32(v) => Some(NativeArg::I32(v)),
        Value::U32(v) => Some(NativeArg::U32(v)),
        Value::I64(v) => Some(NativeArg::I64(v)),
        Value::U64(v) => Some(NativeArg::U64(v)),
        Value::F32(v) => Some(NativeArg::F32(v)),
        Value::F64(v) => Some(NativeArg::F64(v)),
        Value::Ptr(v) => Some(NativeArg::Ptr(v)),
        Value::Unit | Value::Buffer(_) => None,
    }
}

fn buffer_arg<'v>(
    member: &MemberDescriptor,
    param: &str,
    value: &'v Value,
) -> Result<&'v BufferView, CallError> {
    match value {
        Value::Buffer(view) => Ok(view),
        other => Err(CallError::ArgumentMismatch {
            member: member.name.clone(),
            param: param.to_string(),
            expected: "buffer".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

/// Convert a buffer length into the synthesized width, rejecting overflow.
fn length_arg(param: &str, len: usize, width: LengthWidth) -> Result<NativeArg, CallError> {
    if len as u128 > width.max_len() {
        return Err(PinningError::LengthOverflow {
            param: param.to_string(),
            len,
            bits: width.bits(),
        }
        .into());
    }

    Ok(match width {
        LengthWidth::I8 => NativeArg::I8(len as i8),
        LengthWidth::U8 => NativeArg::U8(len as u8),
        LengthWidth::I16 => NativeArg::I16(len as i16),
        LengthWidth::U16 => NativeArg::U16(len as u16),
        LengthWidth::I32 => NativeArg::I32(len as i32),
        LengthWidth::U32 => NativeArg::U32(len as u32),
        LengthWidth::I64 => NativeArg::I64(len as i64),
        LengthWidth::U64 => NativeArg::U64(len as u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindingConfig;
    use crate::interface::{Param, SpanMarshalSpec};
    use crate::pipeline::GeneratorPipeline;
    use crate::types::ScalarType;

    fn plan_for(member: &MemberDescriptor) -> CallPlan {
        GeneratorPipeline::new(&BindingConfig::eager())
            .run(member)
            .unwrap()
    }

    fn span_member() -> MemberDescriptor {
        MemberDescriptor::method(
            "Sum",
            vec![Param::new(
                "data",
                NativeType::buffer(NativeType::Scalar(ScalarType::I32), false),
            )
            .with_span(SpanMarshalSpec::after())],
            NativeType::Scalar(ScalarType::I32),
        )
    }

    #[test]
    fn test_materialize_scalars() {
        let member = MemberDescriptor::method(
            "Multiply",
            vec![
                Param::new("a", NativeType::Scalar(ScalarType::I32)),
                Param::new("b", NativeType::Scalar(ScalarType::I32)),
            ],
            NativeType::Scalar(ScalarType::I32),
        );
        let plan = plan_for(&member);
        let ledger = Arc::new(PinLedger::new());

        let frame = materialize(
            &member,
            &plan,
            &[Value::I32(6), Value::I32(7)],
            &ledger,
        )
        .unwrap();
        assert_eq!(frame.args, vec![NativeArg::I32(6), NativeArg::I32(7)]);
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_materialize_buffer_pins_and_synthesizes_length() {
        let member = span_member();
        let plan = plan_for(&member);
        let ledger = Arc::new(PinLedger::new());

        let data = [1i32, 2, 3, 4];
        let view = BufferView::from_slice(&data);
        let frame = materialize(&member, &plan, &[Value::Buffer(view)], &ledger).unwrap();

        assert_eq!(frame.args.len(), 2);
        assert_eq!(frame.args[0], NativeArg::Ptr(data.as_ptr() as *mut c_void));
        assert_eq!(frame.args[1], NativeArg::I32(4));
        assert_eq!(frame.pin_count(), 1);
        assert_eq!(ledger.active(), 1);

        drop(frame);
        assert_eq!(ledger.active(), 0);
    }

    #[test]
    fn test_arity_mismatch() {
        let member = span_member();
        let plan = plan_for(&member);
        let ledger = Arc::new(PinLedger::new());

        let result = materialize(&member, &plan, &[], &ledger);
        assert!(matches!(result, Err(CallError::ArityMismatch { .. })));
    }

    #[test]
    fn test_scalar_shape_mismatch() {
        let member = MemberDescriptor::method(
            "Multiply",
            vec![Param::new("a", NativeType::Scalar(ScalarType::I32))],
            NativeType::Scalar(ScalarType::I32),
        );
        let plan = plan_for(&member);
        let ledger = Arc::new(PinLedger::new());

        let result = materialize(&member, &plan, &[Value::F64(1.0)], &ledger);
        assert!(matches!(result, Err(CallError::ArgumentMismatch { .. })));
    }

    #[test]
    fn test_length_overflow_fails_the_call() {
        let member = MemberDescriptor::method(
            "Tiny",
            vec![Param::new(
                "data",
                NativeType::buffer(NativeType::Scalar(ScalarType::U8), false),
            )
            .with_span(SpanMarshalSpec::after().with_width(LengthWidth::I8))],
            NativeType::Void,
        );
        let plan = plan_for(&member);
        let ledger = Arc::new(PinLedger::new());

        let data = vec![0u8; 200];
        let view = BufferView::from_slice(&data);
        let result = materialize(&member, &plan, &[Value::Buffer(view)], &ledger);
        assert!(matches!(
            result,
            Err(CallError::Pinning(PinningError::LengthOverflow { .. }))
        ));
        // Pins taken before the failure were released.
        assert_eq!(ledger.active(), 0);
    }

    #[test]
    fn test_null_buffer_with_len_rejected() {
        let member = span_member();
        let plan = plan_for(&member);
        let ledger = Arc::new(PinLedger::new());

        let view =
            unsafe { BufferView::from_raw_parts(std::ptr::null_mut(), 3, 4, 4) };
        let result = materialize(&member, &plan, &[Value::Buffer(view)], &ledger);
        assert!(matches!(
            result,
            Err(CallError::Pinning(PinningError::NullBuffer { .. }))
        ));
    }

    #[test]
    fn test_empty_null_buffer_allowed() {
        let member = span_member();
        let plan = plan_for(&member);
        let ledger = Arc::new(PinLedger::new());

        let view =
            unsafe { BufferView::from_raw_parts(std::ptr::null_mut(), 0, 4, 4) };
        let frame = materialize(&member, &plan, &[Value::Buffer(view)], &ledger).unwrap();
        assert_eq!(frame.args[1], NativeArg::I32(0));
    }

    #[test]
    fn test_element_size_mismatch_rejected() {
        let member = span_member();
        let plan = plan_for(&member);
        let ledger = Arc::new(PinLedger::new());

        let data = [1u16, 2, 3];
        let view = BufferView::from_slice(&data);
        let result = materialize(&member, &plan, &[Value::Buffer(view)], &ledger);
        assert!(matches!(
            result,
            Err(CallError::Pinning(PinningError::ElementMismatch { .. }))
        ));
    }

    #[test]
    fn test_misaligned_buffer_rejected() {
        let ledger = Arc::new(PinLedger::new());
        let backing = [0u64; 4];
        // One past an 8-aligned base is odd, so never 4-aligned.
        let misaligned = (backing.as_ptr() as usize + 1) as *mut c_void;
        let view = unsafe { BufferView::from_raw_parts(misaligned, 2, 4, 4) };

        let result = PinnedBuffer::pin("data", &view, 4, 4, ledger.clone());
        assert!(matches!(result, Err(PinningError::Misaligned { .. })));
        assert_eq!(ledger.active(), 0);
    }
}
