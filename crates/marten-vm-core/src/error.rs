//! VM error types
//!
//! Property operations signal policy failures (non-extensible object,
//! non-writable property, already-defined constant) through their `bool`
//! results, not through errors. The error envelope exists for the one
//! condition the caller cannot express as policy: the allocation budget
//! is exhausted.

use thiserror::Error;

/// Errors surfaced by the object core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VmError {
    /// The heap's allocation budget is exhausted.
    #[error("OutOfMemory")]
    OutOfMemory,
}

/// Result type for VM operations.
pub type VmResult<T> = std::result::Result<T, VmError>;
