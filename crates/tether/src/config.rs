//! Binding configuration
//!
//! Selected once at construction time and part of the instance-cache key:
//! the same interface and library bound under different configurations are
//! distinct instances.

use serde::{Deserialize, Serialize};

/// When native entry points are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BindingMode {
    /// Resolve every member at construction time; any missing entry point
    /// fails construction entirely
    #[default]
    Eager,
    /// Resolve each member on its first invocation; a missing entry point
    /// fails only that member
    Lazy,
}

/// Construction-time configuration for a bound implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct BindingConfig {
    /// Symbol resolution strategy
    pub mode: BindingMode,
    /// Whether adapters verify instance liveness before every call
    pub disposal_checks: bool,
}

impl BindingConfig {
    /// Eager binding without disposal checks.
    pub fn eager() -> Self {
        Self::default()
    }

    /// Lazy binding without disposal checks.
    pub fn lazy() -> Self {
        Self {
            mode: BindingMode::Lazy,
            disposal_checks: false,
        }
    }

    /// Enable disposal checking.
    pub fn with_disposal_checks(mut self) -> Self {
        self.disposal_checks = true;
        self
    }
}
