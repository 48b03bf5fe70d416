//! Hidden classes (shapes)
//!
//! A shape is one edge in a process-wide tree: the definition of a
//! single property (name, slot index, recorded type, attributes) on top
//! of a parent shape. The path from the root to a node spells out the
//! full layout of every object currently carrying that node's index, so
//! a property read is a cache probe plus a slot load, and the recorded
//! type is the compiler's feedback for specialization.
//!
//! Shapes are append-only. Adding a property transitions to a child
//! (interned per `(name, type, attrs)`), and changing an existing
//! property's type or attributes forks a sibling branch that replays the
//! tail, preserving every slot index, so live objects switch shapes
//! without moving a single stored word. Nothing is ever mutated in
//! place except the per-shape caches, which only ever gain entries.

use crate::context::VmContext;
use crate::string::PropName;
use crate::types::ValueType;
use marten_vm_gc::GcRoot;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::{Arc, OnceLock};

bitflags::bitflags! {
    /// Property attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropAttrs: u8 {
        /// Attributes may be changed and the property deleted.
        const CONFIGURABLE = 1 << 0;
        /// The value may be overwritten.
        const WRITABLE = 1 << 1;
        /// The property shows up in enumeration.
        const ENUMERABLE = 1 << 2;
        /// New properties may be added after this one.
        const EXTENSIBLE = 1 << 3;
        /// Tombstone: the definition is dead but keeps its place in the
        /// chain.
        const DELETED = 1 << 4;
        /// The slot holds a getter/setter pair; dispatch belongs to the
        /// interpreter.
        const ACCESSOR = 1 << 5;
    }
}

impl PropAttrs {
    /// Attributes of an ordinary user-defined property.
    pub const DEFAULT: Self = Self::CONFIGURABLE
        .union(Self::WRITABLE)
        .union(Self::ENUMERABLE)
        .union(Self::EXTENSIBLE);

    /// Attributes of an enumerable constant.
    pub const CONST_ENUM: Self = Self::ENUMERABLE.union(Self::EXTENSIBLE);

    /// Attributes of a hidden constant.
    pub const CONST_NOT_ENUM: Self = Self::EXTENSIBLE;
}

/// Dense index of a shape in the context's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(pub(crate) u32);

impl ShapeId {
    /// The raw index.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Slot index the root shape reports; children of the root get slot 0.
pub(crate) const ROOT_SLOT_IDX: u32 = u32::MAX;

/// One entry of an enumeration table.
#[derive(Debug, Clone)]
pub struct EnumEntry {
    /// The property's name.
    pub name: PropName,
    /// The property's attributes.
    pub attrs: PropAttrs,
}

/// Flat enumeration table: one position per slot index, populated only
/// for enumerable live properties.
pub type EnumTable = Box<[Option<EnumEntry>]>;

/// A node in the shape tree.
pub struct Shape {
    idx: ShapeId,
    parent: Option<ShapeId>,
    /// The defined property's name; `None` only on the root.
    name: Option<PropName>,
    slot_idx: u32,
    ty: ValueType,
    attrs: PropAttrs,
    /// Cached outgoing edges, interned per `(name, type, attrs)`.
    transitions: RwLock<FxHashMap<PropName, FxHashMap<ValueType, Vec<ShapeId>>>>,
    /// Memoized name → defining-shape results, including "absent".
    lookup_cache: RwLock<FxHashMap<PropName, Option<ShapeId>>>,
    /// Lazily built enumeration table. Never invalidated: any property
    /// change forks a new shape with its own table.
    enum_table: OnceLock<GcRoot<EnumTable>>,
}

impl Shape {
    pub(crate) fn new_root(idx: ShapeId) -> Self {
        Self {
            idx,
            parent: None,
            name: None,
            slot_idx: ROOT_SLOT_IDX,
            ty: ValueType::any(),
            attrs: PropAttrs::EXTENSIBLE,
            transitions: RwLock::new(FxHashMap::default()),
            lookup_cache: RwLock::new(FxHashMap::default()),
            enum_table: OnceLock::new(),
        }
    }

    pub(crate) fn new_child(
        idx: ShapeId,
        parent: &Shape,
        name: PropName,
        ty: ValueType,
        attrs: PropAttrs,
    ) -> Self {
        Self {
            idx,
            parent: Some(parent.idx),
            name: Some(name),
            slot_idx: parent.slot_idx.wrapping_add(1),
            ty,
            attrs,
            transitions: RwLock::new(FxHashMap::default()),
            lookup_cache: RwLock::new(FxHashMap::default()),
            enum_table: OnceLock::new(),
        }
    }

    /// This shape's registry index.
    #[inline]
    pub fn idx(&self) -> ShapeId {
        self.idx
    }

    /// The parent shape's index; `None` on the root.
    #[inline]
    pub fn parent(&self) -> Option<ShapeId> {
        self.parent
    }

    /// The defined property's name; `None` on the root.
    #[inline]
    pub fn name(&self) -> Option<&PropName> {
        self.name.as_ref()
    }

    /// The slot this property occupies.
    #[inline]
    pub fn slot_idx(&self) -> u32 {
        self.slot_idx
    }

    /// The number of slots an object of this shape uses.
    #[inline]
    pub fn num_slots(&self) -> u32 {
        self.slot_idx.wrapping_add(1)
    }

    /// The recorded (projected) type of the property's values.
    #[inline]
    pub fn ty(&self) -> ValueType {
        self.ty
    }

    /// The property's attributes.
    #[inline]
    pub fn attrs(&self) -> PropAttrs {
        self.attrs
    }

    /// Is this the empty root shape?
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// May the value be overwritten?
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.attrs.contains(PropAttrs::WRITABLE)
    }

    /// May objects of this shape gain new properties?
    #[inline]
    pub fn is_extensible(&self) -> bool {
        self.attrs.contains(PropAttrs::EXTENSIBLE)
    }

    /// Is this definition a tombstone?
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.attrs.contains(PropAttrs::DELETED)
    }

    /// Define a property on top of this shape, or redefine one that
    /// already exists up the chain.
    ///
    /// With `def_shape = None` this returns the interned child shape
    /// defining `(name, ty, attrs)` at the next slot. With `def_shape =
    /// Some(orig)` it forks: a sibling of `orig` redefines the property
    /// at `orig`'s slot, the properties added since `orig` are replayed
    /// on top, and the resulting shape is cached on `self` so equivalent
    /// redefinitions hit the transition map.
    pub fn def_prop(
        &self,
        ctx: &VmContext,
        name: PropName,
        ty: ValueType,
        attrs: PropAttrs,
        def_shape: Option<&Arc<Shape>>,
    ) -> Arc<Shape> {
        // Interned transitions: an equivalent definition was made before.
        // A plain definition's candidate is the defining shape itself; a
        // redefinition's candidate is the tip of the replayed tail, so
        // the attribute check goes through its defining entry for the
        // name.
        {
            let transitions = self.transitions.read();
            if let Some(by_ty) = transitions.get(&name) {
                if let Some(candidates) = by_ty.get(&ty) {
                    for &cand in candidates {
                        let shape = ctx.shape_at(cand);
                        let matches = match def_shape {
                            None => shape.attrs == attrs,
                            Some(_) => shape
                                .get_def_shape(ctx, name.as_str())
                                .is_some_and(|d| d.attrs == attrs),
                        };
                        if matches {
                            return shape;
                        }
                    }
                }
            }
        }

        let new_shape = match def_shape {
            None => ctx.alloc_shape(self, name.clone(), ty, attrs),
            Some(orig) => {
                debug_assert!(!orig.is_root(), "the root shape defines no property");

                // Properties added after the original definition, newest
                // first.
                let mut tail: Vec<Arc<Shape>> = Vec::new();
                let mut cur = self.idx;
                while cur != orig.idx {
                    let s = ctx.shape_at(cur);
                    cur = s
                        .parent
                        .expect("redefined property not on this shape's ancestry");
                    tail.push(s);
                }

                // Sibling of the original under its parent: same slot,
                // new type and attributes.
                let orig_parent =
                    ctx.shape_at(orig.parent.expect("redefinition of the root shape"));
                let mut fork = orig_parent.def_prop(ctx, name.clone(), ty, attrs, None);
                debug_assert_eq!(fork.slot_idx, orig.slot_idx);

                // Replay the tail, oldest first, rebuilding every later
                // property at its original slot.
                for s in tail.iter().rev() {
                    let n = s.name.clone().expect("non-root shape without a name");
                    fork = fork.def_prop(ctx, n, s.ty, s.attrs, None);
                }
                fork
            }
        };

        let mut transitions = self.transitions.write();
        let bucket = transitions.entry(name).or_default().entry(ty).or_default();
        if !bucket.contains(&new_shape.idx) {
            bucket.push(new_shape.idx);
        }
        new_shape
    }

    /// Find the shape defining `name` for objects of this shape, walking
    /// from here to the root. Results are memoized per shape, "absent"
    /// included.
    ///
    /// `name` may alias transient memory; it is copied into the
    /// context's name table before any map is keyed with it.
    pub fn get_def_shape(&self, ctx: &VmContext, name: &str) -> Option<Arc<Shape>> {
        let name = ctx.intern(name);

        if let Some(&hit) = self.lookup_cache.read().get(&name) {
            return hit.map(|id| ctx.shape_at(id));
        }

        let mut found = None;
        let mut cur = Some(self.idx);
        while let Some(id) = cur {
            let s = ctx.shape_at(id);
            if s.name.as_ref() == Some(&name) && !s.is_deleted() {
                found = Some(id);
                break;
            }
            cur = s.parent;
        }

        self.lookup_cache.write().insert(name, found);
        found.map(|id| ctx.shape_at(id))
    }

    /// The enumeration table for objects of this shape: one position per
    /// slot, filled for enumerable live properties, `None` elsewhere.
    /// Built lazily, memoized for the shape's lifetime.
    pub fn gen_enum_tbl(&self, ctx: &VmContext) -> GcRoot<EnumTable> {
        self.enum_table
            .get_or_init(|| {
                let num_slots = if self.is_root() {
                    0
                } else {
                    self.slot_idx as usize + 1
                };

                // Table creation is an allocator call: safepoint.
                let _ = ctx
                    .heap()
                    .book(num_slots * std::mem::size_of::<Option<EnumEntry>>());

                let mut table: Vec<Option<EnumEntry>> = (0..num_slots).map(|_| None).collect();
                let mut decided = vec![false; num_slots];

                // Nearest definition wins each slot; shadowed ancestors
                // must not resurrect an entry.
                let mut cur = Some(self.idx);
                while let Some(id) = cur {
                    let s = ctx.shape_at(id);
                    if let Some(name) = &s.name {
                        let i = s.slot_idx as usize;
                        if i < num_slots && !decided[i] {
                            decided[i] = true;
                            if s.attrs.contains(PropAttrs::ENUMERABLE) && !s.is_deleted() {
                                table[i] = Some(EnumEntry {
                                    name: name.clone(),
                                    attrs: s.attrs,
                                });
                            }
                        }
                    }
                    cur = s.parent;
                }

                GcRoot::new(table.into_boxed_slice())
            })
            .clone()
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shape")
            .field("idx", &self.idx.0)
            .field("name", &self.name)
            .field("slot_idx", &self.slot_idx)
            .field("ty", &self.ty)
            .field("attrs", &self.attrs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::VmContext;
    use crate::value::Tag;
    use crate::types::TypePayload;

    fn int_ty() -> ValueType {
        ValueType::with(Some(Tag::Int32), TypePayload::None, false)
    }

    fn str_ty() -> ValueType {
        ValueType::with(Some(Tag::String), TypePayload::None, false)
    }

    #[test]
    fn test_root_shape() {
        let ctx = VmContext::new();
        let root = ctx.root_shape();
        assert!(root.is_root());
        assert_eq!(root.slot_idx(), ROOT_SLOT_IDX);
        assert_eq!(root.num_slots(), 0);
        assert!(root.is_extensible());
    }

    #[test]
    fn test_transition_interning() {
        let ctx = VmContext::new();
        let root = ctx.root_shape();
        let name = ctx.intern("x");

        let a = root.def_prop(&ctx, name.clone(), int_ty(), PropAttrs::DEFAULT, None);
        let b = root.def_prop(&ctx, name.clone(), int_ty(), PropAttrs::DEFAULT, None);
        assert_eq!(a.idx(), b.idx());

        // Same name and type, different attributes: a distinct shape.
        let c = root.def_prop(&ctx, name, int_ty(), PropAttrs::CONST_ENUM, None);
        assert_ne!(a.idx(), c.idx());
        assert_eq!(a.slot_idx(), c.slot_idx());
    }

    #[test]
    fn test_slot_indices_are_monotonic() {
        let ctx = VmContext::new();
        let root = ctx.root_shape();
        let a = root.def_prop(&ctx, ctx.intern("a"), int_ty(), PropAttrs::DEFAULT, None);
        let b = a.def_prop(&ctx, ctx.intern("b"), int_ty(), PropAttrs::DEFAULT, None);
        let c = b.def_prop(&ctx, ctx.intern("c"), int_ty(), PropAttrs::DEFAULT, None);
        assert_eq!(a.slot_idx(), 0);
        assert_eq!(b.slot_idx(), 1);
        assert_eq!(c.slot_idx(), 2);
        assert_eq!(c.num_slots(), 3);
    }

    #[test]
    fn test_redefinition_preserves_slots() {
        let ctx = VmContext::new();
        let root = ctx.root_shape();
        let a = root.def_prop(&ctx, ctx.intern("a"), int_ty(), PropAttrs::DEFAULT, None);
        let b = a.def_prop(&ctx, ctx.intern("b"), int_ty(), PropAttrs::DEFAULT, None);
        let c = b.def_prop(&ctx, ctx.intern("c"), int_ty(), PropAttrs::DEFAULT, None);

        // Retype "a" as seen from the tip.
        let orig = c.get_def_shape(&ctx, "a").unwrap();
        let fork = c.def_prop(&ctx, ctx.intern("a"), str_ty(), PropAttrs::DEFAULT, Some(&orig));

        let a2 = fork.get_def_shape(&ctx, "a").unwrap();
        let b2 = fork.get_def_shape(&ctx, "b").unwrap();
        let c2 = fork.get_def_shape(&ctx, "c").unwrap();
        assert_eq!(a2.slot_idx(), 0);
        assert_eq!(b2.slot_idx(), 1);
        assert_eq!(c2.slot_idx(), 2);
        assert_eq!(a2.ty(), str_ty());
        assert_ne!(fork.idx(), c.idx());

        // The fork is cached: an equivalent redefinition is a hit.
        let again = c.def_prop(&ctx, ctx.intern("a"), str_ty(), PropAttrs::DEFAULT, Some(&orig));
        assert_eq!(again.idx(), fork.idx());
    }

    #[test]
    fn test_lookup_cache_absent_sentinel() {
        let ctx = VmContext::new();
        let root = ctx.root_shape();
        let a = root.def_prop(&ctx, ctx.intern("a"), int_ty(), PropAttrs::DEFAULT, None);

        assert!(a.get_def_shape(&ctx, "missing").is_none());
        // Second miss is served from the cache.
        assert!(a.get_def_shape(&ctx, "missing").is_none());
        assert_eq!(a.get_def_shape(&ctx, "a").unwrap().idx(), a.idx());
    }

    #[test]
    fn test_deleted_definitions_are_skipped() {
        let ctx = VmContext::new();
        let root = ctx.root_shape();
        let a = root.def_prop(&ctx, ctx.intern("a"), int_ty(), PropAttrs::DEFAULT, None);
        let orig = a.get_def_shape(&ctx, "a").unwrap();
        let tomb = a.def_prop(
            &ctx,
            ctx.intern("a"),
            int_ty(),
            PropAttrs::DEFAULT | PropAttrs::DELETED,
            Some(&orig),
        );
        assert!(tomb.get_def_shape(&ctx, "a").is_none());
    }

    #[test]
    fn test_enum_table() {
        let ctx = VmContext::new();
        let root = ctx.root_shape();
        let a = root.def_prop(&ctx, ctx.intern("a"), int_ty(), PropAttrs::DEFAULT, None);
        let b = a.def_prop(&ctx, ctx.intern("b"), int_ty(), PropAttrs::CONST_NOT_ENUM, None);
        let c = b.def_prop(&ctx, ctx.intern("c"), int_ty(), PropAttrs::DEFAULT, None);

        let table = c.gen_enum_tbl(&ctx);
        assert_eq!(table.len(), 3);
        assert_eq!(table[0].as_ref().unwrap().name.as_str(), "a");
        assert!(table[1].is_none());
        assert_eq!(table[2].as_ref().unwrap().name.as_str(), "c");

        // Memoized: same table object on the next call.
        let again = c.gen_enum_tbl(&ctx);
        assert!(GcRoot::ptr_eq(&table, &again));
    }

    #[test]
    fn test_root_enum_table_is_empty() {
        let ctx = VmContext::new();
        assert_eq!(ctx.root_shape().gen_enum_tbl(&ctx).len(), 0);
    }
}
