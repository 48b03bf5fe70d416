//! # Marten VM Core
//!
//! The object model at the heart of the Marten VM: hidden-class shape
//! trees, per-instance slot stores with extension tables, the property
//! access protocol, and the value-type lattice the compiler specializes
//! against.
//!
//! ## Design Principles
//!
//! - **Shapes over dictionaries**: an object's layout is an index into a
//!   shared, append-only tree; property access is a cache probe plus a
//!   slot load.
//! - **Forks preserve slots**: redefining a property's type or
//!   attributes builds a sibling branch with identical slot assignments,
//!   so live objects change shape without moving a stored word.
//! - **Explicit context**: registries, configuration, and statistics are
//!   threaded through a [`VmContext`]; no ambient globals.
//! - **Handles, not pointers**: values reference instances through dense
//!   registry handles, so allocator safepoints never invalidate a value.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod object;
pub mod shape;
pub mod string;
pub mod types;
pub mod value;

pub use context::{Function, VmConfig, VmContext, VmStats};
pub use error::{VmError, VmResult};
pub use object::{
    ARRLEN_SLOT_IDX, ARRTBL_SLOT_IDX, FPTR_SLOT_IDX, Instance, LayoutKind, OBJ_MIN_CAP,
    PROTO_SLOT_IDX, PROTO_PROP_NAME,
};
pub use shape::{EnumEntry, EnumTable, PropAttrs, Shape, ShapeId};
pub use string::{NameTable, PropName};
pub use types::{TypePayload, ValueType};
pub use value::{FunId, HandleId, Tag, Value, Word};
