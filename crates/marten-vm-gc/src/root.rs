//! GC root handles
//!
//! A `GcRoot` pins a heap value for as long as the handle lives. The
//! registry model used by the core stores every first-class instance
//! behind one of these, so raw interior pointers never escape across a
//! safepoint.

use std::sync::Arc;

/// A GC root: keeps the held value alive.
pub struct GcRoot<T> {
    value: Arc<T>,
}

impl<T> GcRoot<T> {
    /// Root a freshly created value.
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(value),
        }
    }

    /// Borrow the rooted value.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Identity comparison: do two roots pin the same value?
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.value, &b.value)
    }
}

impl<T> Clone for GcRoot<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
        }
    }
}

impl<T> std::ops::Deref for GcRoot<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for GcRoot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("GcRoot").field(&self.value).finish()
    }
}
