//! Interned property names
//!
//! Property names reach the shape tree as borrowed slices, and the
//! caller's backing buffer may be transient, a slice into relocatable
//! heap memory in the full VM. Nothing keyed on a name (transition maps,
//! lookup caches, shape nodes) may hold such a slice, so every name is
//! copied into stable owned storage exactly once and shared from there.
//! Interning also makes repeated lookups of the same name cheap: one
//! hash probe, then `Arc` clones.

use crate::context::VmContext;
use marten_vm_gc::Heap;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// An interned property name. Equality and hashing are by content.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropName(Arc<str>);

impl PropName {
    /// The name's characters.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for PropName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Debug for PropName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl std::fmt::Display for PropName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The per-context name interning table.
pub struct NameTable {
    names: RwLock<FxHashSet<Arc<str>>>,
    heap: Arc<Heap>,
}

impl NameTable {
    /// Create an empty table booking its copies against `heap`.
    pub fn new(heap: Arc<Heap>) -> Self {
        Self {
            names: RwLock::new(FxHashSet::default()),
            heap,
        }
    }

    /// Intern `name`, copying it into stable storage on first sight.
    ///
    /// The copy is an allocator call and therefore a safepoint. Name
    /// copies are small and never fail the surrounding operation: a
    /// rejected booking means the budget is already exhausted and a
    /// collection is due, which `Heap::should_collect` reports.
    pub fn intern(&self, name: &str) -> PropName {
        if let Some(existing) = self.names.read().get(name) {
            return PropName(existing.clone());
        }
        let _ = self.heap.book(name.len());
        let copy: Arc<str> = Arc::from(name);
        let mut names = self.names.write();
        // Raced interning of the same name keeps the first copy.
        if let Some(existing) = names.get(name) {
            return PropName(existing.clone());
        }
        names.insert(copy.clone());
        PropName(copy)
    }

    /// Number of distinct names interned.
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Is the table empty?
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

impl VmContext {
    /// Intern a property name in this context's table.
    #[inline]
    pub fn intern(&self, name: &str) -> PropName {
        self.names().intern(name)
    }
}
