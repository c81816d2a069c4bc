//! Symbol binding - slots and the eager/lazy binder
//!
//! Every member owns a [`BindingSlot`]: a once-initialized cell holding the
//! outcome of resolving that member's native entry point. Transitions are
//! monotonic - a slot moves from unbound to bound or failed exactly once and
//! never reverts - so concurrent first calls agree on a single outcome and
//! later reads need no synchronization.
//!
//! The [`SymbolBinder`] applies the construction-time strategy: eager
//! binding resolves every slot up front and fails construction on the first
//! missing entry point; lazy binding leaves slots untouched until their
//! member's first invocation.

use crate::config::BindingMode;
use crate::error::SymbolBindingError;
use crate::guard::DisposalGuard;
use crate::loader::SymbolAddress;
use std::sync::OnceLock;

/// Observable state of a binding slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    /// No resolution has been attempted
    Unbound,
    /// The entry point resolved to this address
    Bound(SymbolAddress),
    /// Resolution failed; the failure is sticky
    Failed(SymbolBindingError),
}

/// Per-member cell holding the member's resolved entry point.
#[derive(Debug)]
pub struct BindingSlot {
    member: String,
    symbol: String,
    cell: OnceLock<Result<SymbolAddress, SymbolBindingError>>,
}

impl BindingSlot {
    /// Create an unbound slot for a member and its native symbol.
    pub fn new(member: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            symbol: symbol.into(),
            cell: OnceLock::new(),
        }
    }

    /// Declared member this slot belongs to.
    pub fn member(&self) -> &str {
        &self.member
    }

    /// Native symbol this slot binds.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Current state, without triggering resolution.
    pub fn state(&self) -> SlotState {
        match self.cell.get() {
            None => SlotState::Unbound,
            Some(Ok(addr)) => SlotState::Bound(*addr),
            Some(Err(e)) => SlotState::Failed(e.clone()),
        }
    }

    /// Resolve the slot through the guard, at most once.
    ///
    /// Concurrent callers race to a single resolution attempt; all of them
    /// observe its outcome.
    pub fn resolve(&self, guard: &DisposalGuard) -> Result<SymbolAddress, SymbolBindingError> {
        self.cell
            .get_or_init(|| guard.resolve_symbol(&self.member, &self.symbol))
            .clone()
    }
}

/// Applies the configured binding strategy over a set of slots.
pub struct SymbolBinder {
    mode: BindingMode,
}

impl SymbolBinder {
    /// Create a binder for the configured mode.
    pub fn new(mode: BindingMode) -> Self {
        Self { mode }
    }

    /// Bind at construction time.
    ///
    /// Eager mode resolves every slot in declaration order and returns the
    /// first failure, leaving construction unusable. Lazy mode does nothing;
    /// slots resolve on first invocation.
    pub fn bind_at_construction<'a>(
        &self,
        slots: impl IntoIterator<Item = &'a BindingSlot>,
        guard: &DisposalGuard,
    ) -> Result<(), SymbolBindingError> {
        match self.mode {
            BindingMode::Lazy => Ok(()),
            BindingMode::Eager => {
                for slot in slots {
                    slot.resolve(guard)?;
                }
                Ok(())
            }
        }
    }
}
