//! VM context
//!
//! The context owns every piece of process-wide state the object model
//! touches: the shape registry, the instance registry, the function
//! reference set, the name table, the heap, runtime configuration, and
//! statistics. All of it is threaded explicitly (no module-level
//! globals), and the registries are strictly append-only: entries are
//! added at the next index and never removed, reindexed, or mutated
//! structurally, which is the whole safety story in the single-threaded
//! cooperative model.

use crate::object::Instance;
use crate::shape::{PropAttrs, Shape, ShapeId};
use crate::string::{NameTable, PropName};
use crate::types::ValueType;
use crate::value::{FunId, HandleId, Value};
use marten_vm_gc::{GcRoot, Heap};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Runtime configuration read by the object core.
#[derive(Debug, Clone, Copy, Default)]
pub struct VmConfig {
    /// Do not record value tags in shapes (disables tag specialization).
    pub shape_notagspec: bool,
    /// Do not record function identities in shapes (disables callsite
    /// specialization through properties).
    pub shape_nofptrspec: bool,
}

/// Statistics counters the core maintains.
#[derive(Debug, Default)]
pub struct VmStats {
    num_shapes: AtomicU64,
    num_shape_flips: AtomicU64,
    num_shape_flips_global: AtomicU64,
}

impl VmStats {
    /// Shapes allocated so far (the root included).
    pub fn num_shapes(&self) -> u64 {
        self.num_shapes.load(Ordering::Relaxed)
    }

    /// Redefinitions forced by a type mismatch on write.
    pub fn num_shape_flips(&self) -> u64 {
        self.num_shape_flips.load(Ordering::Relaxed)
    }

    /// The subset of flips that happened on the global object.
    pub fn num_shape_flips_global(&self) -> u64 {
        self.num_shape_flips_global.load(Ordering::Relaxed)
    }

    pub(crate) fn record_shape(&self) {
        self.num_shapes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_shape_flip(&self, on_global: bool) {
        self.num_shape_flips.fetch_add(1, Ordering::Relaxed);
        if on_global {
            self.num_shape_flips_global.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A function known to the VM. The object core only needs a stable
/// identity to record in `__fptr__` slots and shape types; the body
/// belongs to the interpreter and compiler.
#[derive(Debug)]
pub struct Function {
    /// Diagnostic name.
    pub name: Box<str>,
    /// Declared parameter count.
    pub num_params: u32,
}

impl Function {
    /// Describe a function.
    pub fn new(name: &str, num_params: u32) -> Self {
        Self {
            name: name.into(),
            num_params,
        }
    }
}

/// The VM context.
pub struct VmContext {
    heap: Arc<Heap>,
    names: NameTable,
    /// Append-only shape registry; index 0 is the empty root shape.
    shapes: RwLock<Vec<Arc<Shape>>>,
    /// Append-only instance registry; words of object-kind values index
    /// into it. Doubles as the root set keeping instances alive.
    instances: RwLock<Vec<GcRoot<Instance>>>,
    /// Append-only function reference set.
    funs: RwLock<Vec<GcRoot<Function>>>,
    global: RwLock<Option<Value>>,
    config: VmConfig,
    stats: VmStats,
}

impl VmContext {
    /// Create a context with default configuration and heap.
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// Create a context with the given configuration.
    pub fn with_config(config: VmConfig) -> Self {
        Self::with_heap(config, Heap::new())
    }

    /// Create a context on an existing heap.
    pub fn with_heap(config: VmConfig, heap: Arc<Heap>) -> Self {
        let ctx = Self {
            names: NameTable::new(heap.clone()),
            heap,
            shapes: RwLock::new(Vec::new()),
            instances: RwLock::new(Vec::new()),
            funs: RwLock::new(Vec::new()),
            global: RwLock::new(None),
            config,
            stats: VmStats::default(),
        };
        ctx.shapes
            .write()
            .push(Arc::new(Shape::new_root(ShapeId(0))));
        ctx.stats.record_shape();
        ctx
    }

    /// The context's heap.
    #[inline]
    pub fn heap(&self) -> &Arc<Heap> {
        &self.heap
    }

    /// The context's name table.
    #[inline]
    pub fn names(&self) -> &NameTable {
        &self.names
    }

    /// The runtime configuration.
    #[inline]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Statistics counters.
    #[inline]
    pub fn stats(&self) -> &VmStats {
        &self.stats
    }

    /// The empty root shape every fresh object starts with.
    pub fn root_shape(&self) -> Arc<Shape> {
        self.shape_at(ShapeId(0))
    }

    /// Resolve a shape index.
    pub fn shape_at(&self, id: ShapeId) -> Arc<Shape> {
        self.shapes.read()[id.0 as usize].clone()
    }

    /// Allocate and register a shape defining `(name, ty, attrs)` under
    /// `parent`.
    pub(crate) fn alloc_shape(
        &self,
        parent: &Shape,
        name: PropName,
        ty: ValueType,
        attrs: PropAttrs,
    ) -> Arc<Shape> {
        let mut shapes = self.shapes.write();
        let id = ShapeId(shapes.len() as u32);
        let shape = Arc::new(Shape::new_child(id, parent, name, ty, attrs));
        shapes.push(shape.clone());
        drop(shapes);
        self.stats.record_shape();
        shape
    }

    /// Register a function in the reference set, pinning it for the GC.
    pub fn register_fun(&self, fun: Function) -> FunId {
        let mut funs = self.funs.write();
        let id = FunId(funs.len() as u32);
        funs.push(GcRoot::new(fun));
        id
    }

    /// Resolve a function reference.
    pub fn fun_at(&self, id: FunId) -> GcRoot<Function> {
        self.funs.read()[id.0 as usize].clone()
    }

    pub(crate) fn register_instance(&self, inst: GcRoot<Instance>) -> HandleId {
        let mut instances = self.instances.write();
        let id = HandleId(instances.len() as u32);
        instances.push(inst);
        id
    }

    /// Resolve an object-kind (or heap-reference) value to its instance.
    pub fn instance(&self, v: Value) -> GcRoot<Instance> {
        let handle = v
            .as_handle()
            .expect("value does not reference an instance");
        self.instances.read()[handle.0 as usize].clone()
    }

    /// Install the global object (used to attribute flip statistics).
    pub fn set_global(&self, v: Value) {
        debug_assert!(v.tag().is_object_kind());
        *self.global.write() = Some(v);
    }

    /// The global object, when installed.
    pub fn global(&self) -> Option<Value> {
        *self.global.read()
    }

    pub(crate) fn is_global(&self, v: Value) -> bool {
        match *self.global.read() {
            Some(g) => g == v,
            None => false,
        }
    }
}

impl Default for VmContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VmContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmContext")
            .field("shapes", &self.shapes.read().len())
            .field("instances", &self.instances.read().len())
            .field("funs", &self.funs.read().len())
            .field("names", &self.names.len())
            .finish()
    }
}
