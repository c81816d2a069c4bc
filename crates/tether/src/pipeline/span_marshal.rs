//! Buffer/span marshalling transform
//!
//! Lets a typed contiguous-buffer view cross the native boundary as a raw
//! pointer, with its length communicated through a synthesized integer
//! parameter (for arguments) or a declared fixed count (for returns).
//!
//! The transform scans parameters left to right. Each buffer parameter is
//! replaced by a pointer in the passthrough signature; if it declares a
//! [`SpanMarshalSpec`], a length parameter of the declared width is inserted
//! at the resolved position. Insertions shift every later position, so the
//! transform keeps an index table mapping declared parameter positions to
//! their current passthrough positions and updates it after every insertion.
//! Positions declared relative to a buffer (`Before`/`After` plus offset)
//! are resolved against that table, never against the declared signature.

use crate::error::ConfigurationError;
use crate::interface::{LengthDirection, MemberDescriptor, SpanMarshalSpec};
use crate::pipeline::{ArgOp, CallWrapper, PassthroughParam, RetOp, WorkUnit};
use crate::types::{NativeType, ScalarType};

/// Where a passthrough slot came from; used to rebuild the prologue
/// instruction list after all insertions settle.
#[derive(Debug, Clone, Copy)]
enum SlotOrigin {
    /// Slot carries the declared parameter at this original index
    Declared(usize),
    /// Slot carries a synthesized length for the buffer at `source`
    Length { source: usize, spec: SpanMarshalSpec },
}

/// The buffer/span marshalling wrapper.
pub struct SpanMarshallingWrapper;

impl CallWrapper for SpanMarshallingWrapper {
    fn is_applicable(&self, member: &MemberDescriptor) -> bool {
        member.ret.is_buffer() || member.params.iter().any(|p| p.ty.is_buffer())
    }

    fn transform(&self, unit: &mut WorkUnit<'_>) -> Result<(), ConfigurationError> {
        let member = unit.member;

        if let NativeType::Buffer { elem, .. } = &member.ret {
            let (elem_size, elem_align) = validate_element(member, "return", elem)?;
            let len = member
                .ret_fixed_len
                .ok_or_else(|| ConfigurationError::MissingReturnLength {
                    member: member.name.clone(),
                })?;
            unit.signature.ret = NativeType::Scalar(ScalarType::Pointer);
            unit.ret_op = RetOp::BufferFromPtr {
                len,
                elem_size,
                elem_align,
            };
        }

        // indices[i] is the current passthrough position of declared
        // parameter i; every insertion below shifts the tail of this table.
        let mut indices: Vec<usize> = (0..member.params.len()).collect();
        let mut origins: Vec<SlotOrigin> = (0..member.params.len()).map(SlotOrigin::Declared).collect();
        let mut layouts: Vec<Option<(usize, usize)>> = vec![None; member.params.len()];

        for (i, param) in member.params.iter().enumerate() {
            let elem = match &param.ty {
                NativeType::Buffer { elem, .. } => elem,
                _ => continue,
            };
            layouts[i] = Some(validate_element(member, &param.name, elem)?);

            let current = indices[i];
            unit.signature.params[current].ty = NativeType::Scalar(ScalarType::Pointer);

            let spec = match param.span {
                Some(spec) => spec,
                None => continue,
            };

            let position: isize = match spec.direction {
                LengthDirection::After => current as isize + 1 + spec.offset as isize,
                LengthDirection::Before => current as isize - spec.offset as isize,
            };

            let count = unit.signature.params.len();
            if position < 0 || position as usize > count {
                return Err(ConfigurationError::LengthPositionOutOfRange {
                    member: member.name.clone(),
                    param: param.name.clone(),
                    position,
                    count,
                });
            }
            let position = position as usize;

            for index in indices.iter_mut() {
                if *index >= position {
                    *index += 1;
                }
            }

            unit.signature.params.insert(
                position,
                PassthroughParam {
                    name: format!("{}Length", param.name),
                    ty: NativeType::Scalar(spec.width.scalar_type()),
                },
            );
            origins.insert(position, SlotOrigin::Length { source: i, spec });
        }

        unit.arg_ops = origins
            .iter()
            .map(|origin| match *origin {
                SlotOrigin::Declared(source) => match layouts[source] {
                    Some((elem_size, elem_align)) => ArgOp::BufferPtr {
                        source,
                        elem_size,
                        elem_align,
                    },
                    None => ArgOp::Forward { source },
                },
                SlotOrigin::Length { source, spec } => ArgOp::BufferLen {
                    source,
                    width: spec.width,
                },
            })
            .collect();

        Ok(())
    }
}

/// Check that a buffer element can cross the boundary, and yield its layout.
///
/// Elements must be value-shaped with no object references anywhere in them,
/// and a view cannot nest inside another view.
fn validate_element(
    member: &MemberDescriptor,
    param: &str,
    elem: &NativeType,
) -> Result<(usize, usize), ConfigurationError> {
    if elem.is_buffer() {
        return Err(ConfigurationError::NestedBuffer {
            member: member.name.clone(),
            param: param.to_string(),
        });
    }
    if elem.contains_references() {
        return Err(ConfigurationError::ReferenceElement {
            member: member.name.clone(),
            param: param.to_string(),
            element: elem.display_name(),
        });
    }
    elem.layout()
        .ok_or_else(|| ConfigurationError::UnsupportedShape {
            member: member.name.clone(),
            detail: format!("buffer element of `{}` has no fixed layout", param),
        })
}
