//! Object instances and the property protocol
//!
//! An instance is a header plus a fixed-capacity inline vector of
//! `(word, tag)` slots. The shape tree assigns each property a slot
//! index; indices below the inline capacity live in the object itself
//! and everything above lives in the extension table: another instance
//! of the same layout kind used purely as extra slots, addressed by the
//! *same* global indices. Growth never moves an inline slot.
//!
//! Closures and arrays reuse this store with reserved leading slots:
//! slot 0 is `__proto__` everywhere, closures keep their function
//! reference in slot 1, arrays their element table in slot 1 and length
//! in slot 2.

use crate::context::{Function, VmContext};
use crate::error::{VmError, VmResult};
use crate::shape::{PropAttrs, Shape, ShapeId};
use crate::types::ValueType;
use crate::value::{FunId, Tag, Value, Word};
use marten_vm_gc::{GcHeader, GcObject, GcRoot, kinds};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Minimum inline slot capacity of any instance.
pub const OBJ_MIN_CAP: u32 = 8;

/// Slot of the prototype link, on every layout kind.
pub const PROTO_SLOT_IDX: u32 = 0;

/// Slot of a closure's function reference.
pub const FPTR_SLOT_IDX: u32 = 1;

/// Slot of an array's element table.
pub const ARRTBL_SLOT_IDX: u32 = 1;

/// Slot of an array's length.
pub const ARRLEN_SLOT_IDX: u32 = 2;

/// Name of the prototype property.
pub const PROTO_PROP_NAME: &str = "__proto__";

/// Name of the closure function-reference property.
pub const FPTR_PROP_NAME: &str = "__fptr__";

/// Name of the array element-table property.
pub const ARRTBL_PROP_NAME: &str = "__tbl__";

/// Name of the array length property.
pub const ARRLEN_PROP_NAME: &str = "__len__";

/// Instance layout kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    /// Plain object.
    Object,
    /// Array: element table and length in reserved slots.
    Array,
    /// Closure: function reference in a reserved slot, plus captured
    /// cells.
    Closure,
}

impl LayoutKind {
    /// The value tag of instances of this kind.
    #[inline]
    pub const fn tag(self) -> Tag {
        match self {
            LayoutKind::Object => Tag::Object,
            LayoutKind::Array => Tag::Array,
            LayoutKind::Closure => Tag::Closure,
        }
    }

    const fn header_kind(self) -> u8 {
        match self {
            LayoutKind::Object => kinds::OBJECT,
            LayoutKind::Array => kinds::ARRAY,
            LayoutKind::Closure => kinds::CLOSURE,
        }
    }

    fn from_header_kind(kind: u8) -> Self {
        match kind {
            kinds::OBJECT => LayoutKind::Object,
            kinds::ARRAY => LayoutKind::Array,
            kinds::CLOSURE => LayoutKind::Closure,
            other => unreachable!("instance header with non-layout kind {other}"),
        }
    }
}

/// A heap instance: header, shape index, inline slots, optional
/// extension table, and (for closures) captured cells.
pub struct Instance {
    header: GcHeader,
    shape: AtomicU32,
    /// Fixed capacity; never resized in place.
    slots: RwLock<Box<[Value]>>,
    /// Extension table holding slots `[cap, ..)`, lazily allocated.
    next: RwLock<Option<GcRoot<Instance>>>,
    /// Captured cells; empty except for closures.
    cells: RwLock<Box<[Value]>>,
}

impl Instance {
    pub(crate) fn new(kind: LayoutKind, cap: u32, num_cells: u32) -> Self {
        Self {
            header: GcHeader::new(kind.header_kind()),
            shape: AtomicU32::new(0),
            slots: RwLock::new(vec![Value::undef(); cap as usize].into_boxed_slice()),
            next: RwLock::new(None),
            cells: RwLock::new(vec![Value::undef(); num_cells as usize].into_boxed_slice()),
        }
    }

    /// This instance's layout kind.
    #[inline]
    pub fn kind(&self) -> LayoutKind {
        LayoutKind::from_header_kind(self.header.kind())
    }

    /// Inline slot capacity.
    #[inline]
    pub fn cap(&self) -> u32 {
        self.slots.read().len() as u32
    }

    /// Current shape index.
    #[inline]
    pub fn shape_idx(&self) -> ShapeId {
        ShapeId(self.shape.load(Ordering::Relaxed))
    }

    /// Install a new shape index.
    #[inline]
    pub fn set_shape_idx(&self, id: ShapeId) {
        self.shape.store(id.0, Ordering::Relaxed);
    }

    /// Read an inline slot.
    #[inline]
    pub fn slot(&self, idx: u32) -> Value {
        self.slots.read()[idx as usize]
    }

    /// Write an inline slot.
    #[inline]
    pub fn set_slot(&self, idx: u32, v: Value) {
        self.slots.write()[idx as usize] = v;
    }

    /// Read an inline slot's word.
    #[inline]
    pub fn word(&self, idx: u32) -> Word {
        self.slot(idx).word()
    }

    /// Read an inline slot's tag.
    #[inline]
    pub fn tag(&self, idx: u32) -> Tag {
        self.slot(idx).tag()
    }

    /// Write an inline slot's word, preserving its tag.
    #[inline]
    pub fn set_word(&self, idx: u32, w: Word) {
        let tag = self.tag(idx);
        self.set_slot(idx, Value::new(w, tag));
    }

    /// Write an inline slot's tag, preserving its word.
    #[inline]
    pub fn set_tag(&self, idx: u32, t: Tag) {
        let word = self.word(idx);
        self.set_slot(idx, Value::new(word, t));
    }

    /// The extension table, when present.
    #[inline]
    pub fn next(&self) -> Option<GcRoot<Instance>> {
        self.next.read().clone()
    }

    /// Install or replace the extension table.
    #[inline]
    pub fn set_next(&self, ext: Option<GcRoot<Instance>>) {
        *self.next.write() = ext;
    }

    /// Number of captured cells (closures).
    #[inline]
    pub fn num_cells(&self) -> u32 {
        self.cells.read().len() as u32
    }

    /// Read a captured cell.
    #[inline]
    pub fn cell(&self, idx: u32) -> Value {
        self.cells.read()[idx as usize]
    }

    /// Write a captured cell.
    #[inline]
    pub fn set_cell(&self, idx: u32, v: Value) {
        self.cells.write()[idx as usize] = v;
    }

    /// Read slot `idx` in the global index space: inline below `cap`,
    /// extension table above.
    pub fn slot_pair(&self, idx: u32) -> Value {
        if idx < self.cap() {
            self.slot(idx)
        } else {
            let ext = self
                .next()
                .expect("slot index beyond capacity with no extension table");
            debug_assert!(idx < ext.cap(), "extension table smaller than slot index");
            ext.slot(idx)
        }
    }

    /// Write slot `idx` in the global index space. The extension table
    /// must already be large enough; `set_prop` maintains that.
    pub fn set_slot_pair(&self, idx: u32, v: Value) {
        if idx < self.cap() {
            self.set_slot(idx, v);
        } else {
            let ext = self
                .next()
                .expect("slot index beyond capacity with no extension table");
            debug_assert!(idx < ext.cap(), "extension table smaller than slot index");
            ext.set_slot(idx, v);
        }
    }
}

impl GcObject for Instance {
    fn header(&self) -> &GcHeader {
        &self.header
    }

    fn trace(&self, mark: &mut dyn FnMut(*const GcHeader)) {
        // Slot values are registry handles, kept alive by the registry
        // itself; the extension table is this instance's only direct
        // heap edge.
        if let Some(ext) = self.next() {
            mark(ext.header() as *const GcHeader);
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("kind", &self.kind())
            .field("shape", &self.shape_idx().index())
            .field("cap", &self.cap())
            .field("ext", &self.next.read().is_some())
            .finish()
    }
}

impl VmContext {
    /// Allocate a fresh instance of the given kind with `cap` inline
    /// slots (and `num_cells` captured cells for closures), register it,
    /// and return the tagged value. The shape starts at the empty root.
    pub fn alloc(&self, kind: LayoutKind, cap: u32, num_cells: u32) -> VmResult<Value> {
        let inst = self.alloc_instance(kind, cap, num_cells)?;
        let handle = self.register_instance(inst);
        Ok(Value::instance_ref(handle, kind.tag()))
    }

    /// Allocate an unregistered instance (extension tables).
    fn alloc_instance(
        &self,
        kind: LayoutKind,
        cap: u32,
        num_cells: u32,
    ) -> VmResult<GcRoot<Instance>> {
        let bytes = std::mem::size_of::<Instance>()
            + (cap as usize + num_cells as usize) * std::mem::size_of::<Value>();
        self.heap().book(bytes).ok_or(VmError::OutOfMemory)?;
        Ok(GcRoot::new(Instance::new(kind, cap, num_cells)))
    }

    /// The current shape of an object-kind value.
    pub fn get_shape(&self, obj: Value) -> Arc<Shape> {
        debug_assert!(obj.tag().is_object_kind());
        self.shape_at(self.instance(obj).shape_idx())
    }

    /// Read slot `idx` of `obj` in the global index space.
    pub fn get_slot_pair(&self, obj: Value, idx: u32) -> Value {
        self.instance(obj).slot_pair(idx)
    }

    /// Write slot `idx` of `obj` in the global index space.
    pub fn set_slot_pair(&self, obj: Value, idx: u32, v: Value) {
        self.instance(obj).set_slot_pair(idx, v);
    }

    /// Read property `name` of `obj`, walking the prototype chain.
    /// Returns `undefined` when the property is nowhere defined.
    pub fn get_prop(&self, obj: Value, name: &str) -> Value {
        debug_assert!(obj.tag().is_object_kind());
        let mut cur = obj;
        loop {
            let inst = self.instance(cur);
            let shape = self.shape_at(inst.shape_idx());
            if let Some(def) = shape.get_def_shape(self, name) {
                return inst.slot_pair(def.slot_idx());
            }

            // Not an own property: follow the prototype link, itself an
            // ordinary slot reached by the same lookup.
            let proto = match shape.get_def_shape(self, PROTO_PROP_NAME) {
                Some(def) => inst.slot_pair(def.slot_idx()),
                None => return Value::undef(),
            };
            if proto.is_null() || proto.is_undef() {
                return Value::undef();
            }
            debug_assert!(proto.tag().is_object_kind());
            cur = proto;
        }
    }

    /// Write property `name` of `obj` with default attributes.
    ///
    /// Returns `Ok(false)`, with no state mutated, when the object is
    /// not extensible (new property) or the property is not writable.
    pub fn set_prop(&self, obj: Value, name: &str, val: Value) -> VmResult<bool> {
        self.set_prop_with_attrs(obj, name, val, PropAttrs::DEFAULT)
    }

    /// Write property `name` of `obj`, using `def_attrs` if the write
    /// defines or redefines the property's shape entry.
    pub fn set_prop_with_attrs(
        &self,
        obj: Value,
        name: &str,
        val: Value,
        def_attrs: PropAttrs,
    ) -> VmResult<bool> {
        debug_assert!(obj.tag().is_object_kind());
        let name = self.intern(name);
        // The type recorded in the shape: the projection of the value's
        // exact type.
        let vt = ValueType::of(self, val).prop_type(self);

        let inst = self.instance(obj);
        let shape = self.shape_at(inst.shape_idx());

        let def = match shape.get_def_shape(self, name.as_str()) {
            None => {
                if !shape.is_extensible() {
                    return Ok(false);
                }
                let def = shape.def_prop(self, name, vt, def_attrs, None);
                inst.set_shape_idx(def.idx());
                def
            }
            Some(def) => {
                if !def.is_writable() {
                    return Ok(false);
                }
                if !vt.is_subtype(def.ty()) {
                    // Shape flip: the recorded type no longer covers the
                    // written value, fork the tree.
                    self.stats().record_shape_flip(self.is_global(obj));
                    let fork = shape.def_prop(self, name.clone(), vt, def_attrs, Some(&def));
                    inst.set_shape_idx(fork.idx());
                    fork.get_def_shape(self, name.as_str())
                        .expect("redefined property missing from its fork")
                } else {
                    def
                }
            }
        };

        let idx = def.slot_idx();
        if idx >= inst.cap() {
            self.ensure_slot_cap(&inst, idx)?;
        }
        inst.set_slot_pair(idx, val);
        Ok(true)
    }

    /// Grow `inst`'s extension table until slot `idx` is addressable.
    ///
    /// The first extension gets twice the inline capacity; each further
    /// growth doubles. Only the populated global indices
    /// `[inst.cap, old.cap)` move; inline slots live in the object
    /// itself and are never copied.
    fn ensure_slot_cap(&self, inst: &Instance, idx: u32) -> VmResult<()> {
        debug_assert!(idx >= inst.cap());

        let mut ext = match inst.next() {
            Some(ext) => ext,
            None => {
                let ext = self.alloc_instance(inst.kind(), inst.cap() * 2, 0)?;
                inst.set_next(Some(ext.clone()));
                ext
            }
        };

        while idx >= ext.cap() {
            let bigger = self.alloc_instance(inst.kind(), ext.cap() * 2, 0)?;
            for i in inst.cap()..ext.cap() {
                bigger.set_slot(i, ext.slot(i));
            }
            inst.set_next(Some(bigger.clone()));
            ext = bigger;
        }
        Ok(())
    }

    /// Define a constant: non-writable, non-configurable, optionally
    /// enumerable. Returns `Ok(false)` if `name` is already defined on
    /// `obj`, or if the object is not extensible.
    pub fn def_const(
        &self,
        obj: Value,
        name: &str,
        val: Value,
        enumerable: bool,
    ) -> VmResult<bool> {
        let shape = self.get_shape(obj);
        if shape.get_def_shape(self, name).is_some() {
            return Ok(false);
        }
        let attrs = if enumerable {
            PropAttrs::CONST_ENUM
        } else {
            PropAttrs::CONST_NOT_ENUM
        };
        self.set_prop_with_attrs(obj, name, val, attrs)
    }

    /// Change the attributes of an existing property (type and name
    /// unchanged), forking the shape tree and moving `obj` to the fork.
    pub fn set_prop_attrs(&self, obj: Value, def_shape: &Arc<Shape>, attrs: PropAttrs) {
        debug_assert!(obj.tag().is_object_kind());
        let inst = self.instance(obj);
        let shape = self.shape_at(inst.shape_idx());
        let name = def_shape
            .name()
            .cloned()
            .expect("attribute change on the root shape");
        let fork = shape.def_prop(self, name, def_shape.ty(), attrs, Some(def_shape));
        inst.set_shape_idx(fork.idx());
    }

    /// Allocate a plain object with the given prototype.
    pub fn new_obj(&self, proto: Value, cap: u32) -> VmResult<Value> {
        let obj = self.alloc(LayoutKind::Object, cap.max(OBJ_MIN_CAP), 0)?;
        let ok = self.def_const(obj, PROTO_PROP_NAME, proto, false)?;
        debug_assert!(ok);
        debug_assert_eq!(
            self.get_shape(obj)
                .get_def_shape(self, PROTO_PROP_NAME)
                .map(|d| d.slot_idx()),
            Some(PROTO_SLOT_IDX)
        );
        Ok(obj)
    }

    /// Allocate a closure with `num_cells` captured cells, registering
    /// `fun` in the function reference set and installing it as
    /// `__fptr__`.
    pub fn new_clos(&self, proto: Value, num_cells: u32, fun: Function) -> VmResult<Value> {
        let clos = self.alloc(LayoutKind::Closure, OBJ_MIN_CAP, num_cells)?;
        let fid = self.register_fun(fun);
        self.def_const(clos, PROTO_PROP_NAME, proto, false)?;
        self.def_const(clos, FPTR_PROP_NAME, Value::fun(fid), false)?;
        debug_assert_eq!(self.get_fun_ptr(clos), fid);
        Ok(clos)
    }

    /// Allocate an array of length `len`, with its element table in the
    /// reserved slot.
    pub fn new_arr(&self, proto: Value, len: u32) -> VmResult<Value> {
        let arr = self.alloc(LayoutKind::Array, OBJ_MIN_CAP, 0)?;
        self.def_const(arr, PROTO_PROP_NAME, proto, false)?;

        let tbl = self.alloc(LayoutKind::Object, len.max(OBJ_MIN_CAP), 0)?;
        let tbl_ref = Value::refptr(tbl.as_handle().expect("fresh instance without a handle"));
        self.def_const(arr, ARRTBL_PROP_NAME, tbl_ref, false)?;
        self.def_const(arr, ARRLEN_PROP_NAME, Value::int32(len as i32), false)?;
        debug_assert_eq!(
            self.get_shape(arr)
                .get_def_shape(self, ARRLEN_PROP_NAME)
                .map(|d| d.slot_idx()),
            Some(ARRLEN_SLOT_IDX)
        );
        Ok(arr)
    }

    /// The function reference stored in a closure's reserved slot.
    pub fn get_fun_ptr(&self, clos: Value) -> FunId {
        debug_assert_eq!(clos.tag(), Tag::Closure);
        self.get_slot_pair(clos, FPTR_SLOT_IDX)
            .as_fun()
            .expect("closure function slot holds a non-function")
    }

    /// An array's element table reference.
    pub fn get_arr_tbl(&self, arr: Value) -> Value {
        debug_assert_eq!(arr.tag(), Tag::Array);
        self.get_slot_pair(arr, ARRTBL_SLOT_IDX)
    }

    /// Replace an array's element table reference (raw slot write; used
    /// when the table is grown or relocated).
    pub fn set_arr_tbl(&self, arr: Value, tbl: Value) {
        debug_assert_eq!(arr.tag(), Tag::Array);
        debug_assert_eq!(tbl.tag(), Tag::RefPtr);
        self.set_slot_pair(arr, ARRTBL_SLOT_IDX, tbl);
    }

    /// An array's length.
    pub fn get_arr_len(&self, arr: Value) -> i32 {
        debug_assert_eq!(arr.tag(), Tag::Array);
        self.get_slot_pair(arr, ARRLEN_SLOT_IDX)
            .as_int32()
            .expect("array length slot holds a non-int32")
    }

    /// Set an array's length (raw slot write).
    pub fn set_arr_len(&self, arr: Value, len: i32) {
        debug_assert_eq!(arr.tag(), Tag::Array);
        self.set_slot_pair(arr, ARRLEN_SLOT_IDX, Value::int32(len));
    }
}
