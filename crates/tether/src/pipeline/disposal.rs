//! Disposal-check transform
//!
//! Records that an adapter must verify instance liveness before invoking
//! its entry point. The signature is untouched; only the call plan's gate
//! flag changes. Members may opt out individually even when the
//! configuration enables checking.

use crate::error::ConfigurationError;
use crate::interface::MemberDescriptor;
use crate::pipeline::{CallWrapper, WorkUnit};

/// The disposal-check wrapper. Registered only when the binding
/// configuration enables disposal checks.
pub struct DisposalCheckWrapper;

impl CallWrapper for DisposalCheckWrapper {
    fn is_applicable(&self, member: &MemberDescriptor) -> bool {
        member.disposal_check
    }

    fn transform(&self, unit: &mut WorkUnit<'_>) -> Result<(), ConfigurationError> {
        unit.disposal_check = true;
        Ok(())
    }
}
