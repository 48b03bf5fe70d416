//! GC object headers
//!
//! Every heap instance carries a `GcHeader`: a mark byte for tri-color
//! marking, the layout kind tag, and a logical mark version. Resetting
//! marks between cycles is O(1): the collector bumps the global version
//! instead of touching every header.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

/// Global mark version counter. An object is "white" (unmarked) when its
/// header's `mark_version` does not match this value.
static MARK_VERSION: AtomicU32 = AtomicU32::new(0);

/// Get the current global mark version.
#[inline]
pub fn current_mark_version() -> u32 {
    MARK_VERSION.load(Ordering::Acquire)
}

/// Bump the global mark version, resetting all marks to white in O(1).
#[inline]
pub fn bump_mark_version() -> u32 {
    MARK_VERSION.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
}

/// Layout kind tags stored in object headers.
pub mod kinds {
    /// Plain object instance
    pub const OBJECT: u8 = 1;
    /// Array instance (element table + length in reserved slots)
    pub const ARRAY: u8 = 2;
    /// Closure instance (function pointer in a reserved slot, plus cells)
    pub const CLOSURE: u8 = 3;
    /// String payload
    pub const STRING: u8 = 4;
}

/// Mark color for tri-color marking.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkColor {
    /// Not yet visited
    White = 0,
    /// In the worklist
    Gray = 1,
    /// Fully scanned
    Black = 2,
}

/// GC object header: mark state plus the layout kind tag.
#[repr(C)]
pub struct GcHeader {
    mark: AtomicU8,
    kind: u8,
    _pad: [u8; 2],
    mark_version: AtomicU32,
}

impl GcHeader {
    /// Create a fresh (white) header for the given layout kind.
    pub const fn new(kind: u8) -> Self {
        Self {
            mark: AtomicU8::new(MarkColor::White as u8),
            kind,
            _pad: [0; 2],
            mark_version: AtomicU32::new(0),
        }
    }

    /// Current mark color, honoring the logical version: a stale version
    /// reads as white regardless of the mark byte.
    #[inline]
    pub fn mark(&self) -> MarkColor {
        if self.mark_version.load(Ordering::Acquire) != current_mark_version() {
            return MarkColor::White;
        }
        match self.mark.load(Ordering::Acquire) {
            1 => MarkColor::Gray,
            2 => MarkColor::Black,
            _ => MarkColor::White,
        }
    }

    /// Set the mark color, stamping the current global version.
    #[inline]
    pub fn set_mark(&self, color: MarkColor) {
        self.mark.store(color as u8, Ordering::Release);
        self.mark_version
            .store(current_mark_version(), Ordering::Release);
    }

    /// The layout kind tag this header was created with.
    #[inline]
    pub fn kind(&self) -> u8 {
        self.kind
    }
}

/// Trait for GC-managed heap instances.
pub trait GcObject {
    /// The instance's header.
    fn header(&self) -> &GcHeader;

    /// Report every outgoing header reference to the collector.
    fn trace(&self, mark: &mut dyn FnMut(*const GcHeader));
}
