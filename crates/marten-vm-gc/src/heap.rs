//! Heap regions and allocation accounting
//!
//! The heap has two jobs. It books every allocation the VM makes:
//! bytes, allocation count, and the safepoint count the cooperative
//! scheduling model is built on (every allocator call is a safepoint;
//! raw pointers into managed memory must be re-fetched from a root
//! afterwards). And it owns the two semispace regions a copying
//! collector evacuates between, exposing the from-/to-space membership
//! predicates the core uses for sanity checks on transient buffers.

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default size of each semispace region (16MB).
const DEFAULT_SPACE_SIZE: usize = 16 * 1024 * 1024;

/// Heap configuration.
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Size in bytes of each semispace region.
    pub space_size: usize,
    /// Total byte budget for booked allocations.
    pub limit: usize,
    /// Fraction of the space that may fill before a collection is due.
    pub gc_trigger_ratio: f64,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            space_size: DEFAULT_SPACE_SIZE,
            limit: usize::MAX / 2,
            gc_trigger_ratio: 0.75,
        }
    }
}

/// One bump-allocated semispace region.
struct Region {
    memory: Vec<u8>,
    free: usize,
}

impl Region {
    fn new(size: usize) -> Self {
        Self {
            memory: vec![0u8; size],
            free: 0,
        }
    }

    fn allocate(&mut self, size: usize) -> Option<*mut u8> {
        // 8-byte alignment for word-sized slot payloads
        let aligned = (size + 7) & !7;
        if self.free + aligned > self.memory.len() {
            return None;
        }
        let ptr = self.memory.as_mut_ptr().wrapping_add(self.free);
        self.free += aligned;
        Some(ptr)
    }

    fn contains(&self, ptr: *const u8) -> bool {
        let base = self.memory.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= base && addr < base + self.memory.len()
    }

    fn reset(&mut self) {
        self.free = 0;
    }
}

/// The VM heap: accounting plus semispace regions.
pub struct Heap {
    config: HeapConfig,
    /// The two regions; `from_idx` selects the active (from) space.
    spaces: RwLock<[Region; 2]>,
    from_idx: AtomicUsize,
    /// Total bytes booked and still live.
    allocated: AtomicUsize,
    /// Allocations since creation.
    allocations: AtomicUsize,
    /// Safepoints crossed, one per allocator call.
    safepoints: AtomicUsize,
}

impl Heap {
    /// Create a heap with the default configuration.
    pub fn new() -> Arc<Self> {
        Self::with_config(HeapConfig::default())
    }

    /// Create a heap with the given configuration.
    pub fn with_config(config: HeapConfig) -> Arc<Self> {
        let size = config.space_size;
        Arc::new(Self {
            config,
            spaces: RwLock::new([Region::new(size), Region::new(size)]),
            from_idx: AtomicUsize::new(0),
            allocated: AtomicUsize::new(0),
            allocations: AtomicUsize::new(0),
            safepoints: AtomicUsize::new(0),
        })
    }

    /// Create a heap with an effectively unlimited budget (for tests).
    pub fn test() -> Arc<Self> {
        Self::new()
    }

    /// Book `size` bytes against the heap budget.
    ///
    /// This is the accounting entry point for allocations whose payload
    /// lives behind a [`crate::GcRoot`] rather than inside the semispace
    /// regions. Counts a safepoint. Returns `None` when the budget is
    /// exhausted.
    #[inline]
    pub fn book(&self, size: usize) -> Option<()> {
        self.safepoints.fetch_add(1, Ordering::Relaxed);
        let current = self.allocated.load(Ordering::Relaxed);
        if current + size > self.config.limit {
            tracing::warn!(requested = size, allocated = current, "heap budget exhausted");
            return None;
        }
        self.allocated.fetch_add(size, Ordering::Relaxed);
        self.allocations.fetch_add(1, Ordering::Relaxed);
        Some(())
    }

    /// Release `size` previously booked bytes.
    #[inline]
    pub fn release(&self, size: usize) {
        self.allocated.fetch_sub(size, Ordering::Relaxed);
    }

    /// Bump-allocate a raw block in the from-space.
    ///
    /// Counts a safepoint and books the bytes. Returns `None` when the
    /// region or the budget is exhausted.
    pub fn alloc_raw(&self, size: usize) -> Option<*mut u8> {
        self.book(size)?;
        let from = self.from_idx.load(Ordering::Relaxed);
        let ptr = self.spaces.write()[from].allocate(size)?;
        debug_assert!(self.in_from_space(ptr));
        Some(ptr)
    }

    /// Is `ptr` inside the active (from) space?
    pub fn in_from_space(&self, ptr: *const u8) -> bool {
        let from = self.from_idx.load(Ordering::Relaxed);
        self.spaces.read()[from].contains(ptr)
    }

    /// Is `ptr` inside the inactive (to) space?
    pub fn in_to_space(&self, ptr: *const u8) -> bool {
        let from = self.from_idx.load(Ordering::Relaxed);
        self.spaces.read()[1 - from].contains(ptr)
    }

    /// Swap the semispaces after an evacuation. The old from-space
    /// becomes the next cycle's to-space and is cleared for reuse.
    pub fn flip(&self) {
        let from = self.from_idx.load(Ordering::Relaxed);
        let to = 1 - from;
        self.spaces.write()[from].reset();
        self.from_idx.store(to, Ordering::Relaxed);
        tracing::debug!(
            allocated = self.allocated(),
            safepoints = self.safepoints(),
            "semispace flip"
        );
    }

    /// Total bytes booked and still live.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Number of allocations made so far.
    #[inline]
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Number of safepoints crossed so far.
    #[inline]
    pub fn safepoints(&self) -> usize {
        self.safepoints.load(Ordering::Relaxed)
    }

    /// Should a collection be scheduled at the next safepoint?
    pub fn should_collect(&self) -> bool {
        let allocated = self.allocated() as f64;
        allocated > self.config.space_size as f64 * self.config.gc_trigger_ratio
    }

    /// The configuration this heap was created with.
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }
}
