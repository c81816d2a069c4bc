//! End-to-end buffer/span marshalling: buffers cross the boundary as
//! pinned pointers with synthesized length parameters, and buffer-shaped
//! returns are reconstructed from the native pointer plus a declared
//! fixed length.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tether::{
    BindingConfig, BufferView, CallError, InterfaceDescriptor, LengthWidth, MemberDescriptor,
    NativeType, Param, PinningError, ScalarType, SpanMarshalSpec, Tether, Value,
};

fn i32_ty() -> NativeType {
    NativeType::Scalar(ScalarType::I32)
}

fn i32_buffer() -> NativeType {
    NativeType::buffer(i32_ty(), false)
}

fn bind_one(member: MemberDescriptor, symbol: &str, addr: usize) -> Arc<tether::BoundLibrary> {
    let runtime = Tether::with_loader(Arc::new(FakeLoader::new().with_symbol(symbol, addr)));
    let interface = InterfaceDescriptor::new("ISpans", vec![member]).unwrap();
    runtime
        .bind(&interface, "libspans.so", BindingConfig::eager())
        .unwrap()
}

#[test]
fn buffer_with_trailing_length_sums_correctly() {
    let member = MemberDescriptor::method(
        "Sum",
        vec![Param::new("data", i32_buffer()).with_span(SpanMarshalSpec::after())],
        i32_ty(),
    );
    let library = bind_one(member, "Sum", sum_i32 as usize);

    let data = [1i32, 2, 3, 4, 5];
    let total = unsafe {
        library
            .invoke("Sum", &[Value::Buffer(BufferView::from_slice(&data))])
            .unwrap()
    };
    assert_eq!(total, Value::I32(15));

    // Every pin taken for the call was released when it returned.
    assert_eq!(library.active_pins(), 0);
}

#[test]
fn buffer_with_leading_length_sums_correctly() {
    let member = MemberDescriptor::method(
        "Sum",
        vec![Param::new("data", i32_buffer()).with_span(SpanMarshalSpec::before())],
        i32_ty(),
    );
    let library = bind_one(member, "Sum", sum_i32_len_first as usize);

    let data = [10i32, 20, 30];
    let total = unsafe {
        library
            .invoke("Sum", &[Value::Buffer(BufferView::from_slice(&data))])
            .unwrap()
    };
    assert_eq!(total, Value::I32(60));
}

#[test]
fn two_buffers_marshal_independently() {
    let member = MemberDescriptor::method(
        "Dot",
        vec![
            Param::new("a", i32_buffer()).with_span(SpanMarshalSpec::after()),
            Param::new("b", i32_buffer()).with_span(SpanMarshalSpec::after()),
        ],
        i32_ty(),
    );
    let library = bind_one(member, "Dot", dot_i32 as usize);

    let a = [1i32, 2, 3];
    let b = [4i32, 5, 6];
    let dot = unsafe {
        library
            .invoke(
                "Dot",
                &[
                    Value::Buffer(BufferView::from_slice(&a)),
                    Value::Buffer(BufferView::from_slice(&b)),
                ],
            )
            .unwrap()
    };
    assert_eq!(dot, Value::I32(32));
    assert_eq!(library.active_pins(), 0);
}

#[test]
fn mutable_buffer_is_written_in_place() {
    let member = MemberDescriptor::method(
        "Scale",
        vec![
            Param::new(
                "values",
                NativeType::buffer(NativeType::Scalar(ScalarType::F32), true),
            )
            .with_span(SpanMarshalSpec::after()),
            Param::new("factor", NativeType::Scalar(ScalarType::F32)),
        ],
        i32_ty(),
    );
    let library = bind_one(member, "Scale", scale_f32 as usize);

    let mut values = [1.0f32, 2.0, 3.0];
    let written = unsafe {
        library
            .invoke(
                "Scale",
                &[
                    Value::Buffer(BufferView::from_mut_slice(&mut values)),
                    Value::F32(2.0),
                ],
            )
            .unwrap()
    };
    assert_eq!(written, Value::I32(3));
    assert_eq!(values, [2.0, 4.0, 6.0]);
}

#[test]
fn empty_buffer_crosses_as_zero_length() {
    let member = MemberDescriptor::method(
        "Sum",
        vec![Param::new("data", i32_buffer()).with_span(SpanMarshalSpec::after())],
        i32_ty(),
    );
    let library = bind_one(member, "Sum", sum_i32 as usize);

    let data: [i32; 0] = [];
    let total = unsafe {
        library
            .invoke("Sum", &[Value::Buffer(BufferView::from_slice(&data))])
            .unwrap()
    };
    assert_eq!(total, Value::I32(0));
}

#[test]
fn returned_buffer_reconstructs_with_declared_fixed_length() {
    let member = MemberDescriptor::method("GetSequence", vec![], i32_buffer())
        .with_return_length(5)
        .with_symbol("ZeroToNine");
    let library = bind_one(member, "ZeroToNine", zero_to_nine as usize);

    let result = unsafe { library.invoke("GetSequence", &[]).unwrap() };
    let view = match result {
        Value::Buffer(view) => view,
        other => panic!("expected a buffer, got {other:?}"),
    };

    // Exactly the declared element count, at the native-returned address.
    assert_eq!(view.len(), 5);
    assert_eq!(view.as_ptr() as usize, zero_to_nine_addr());
    unsafe {
        assert_eq!(view.as_slice::<i32>(), &[0, 1, 2, 3, 4]);
    }
}

#[test]
fn oversized_buffer_fails_the_call_without_poisoning_the_instance() {
    let member = MemberDescriptor::method(
        "Sum",
        vec![Param::new("data", i32_buffer())
            .with_span(SpanMarshalSpec::after().with_width(LengthWidth::I8))],
        i32_ty(),
    );
    let library = bind_one(member, "Sum", sum_i32 as usize);

    let big = vec![1i32; 200];
    let err = unsafe {
        library
            .invoke("Sum", &[Value::Buffer(BufferView::from_slice(&big))])
            .unwrap_err()
    };
    assert!(matches!(
        err,
        CallError::Pinning(PinningError::LengthOverflow { len: 200, bits: 8, .. })
    ));
    assert_eq!(library.active_pins(), 0);

    // The failure was call-local; a well-sized call still works.
    let small = [1i32, 2, 3];
    let total = unsafe {
        library
            .invoke("Sum", &[Value::Buffer(BufferView::from_slice(&small))])
            .unwrap()
    };
    assert_eq!(total, Value::I32(6));
}
