//! Frame-scoped vertex and index memory.
//!
//! Geometry is written into transient buffers that are handed out by bump
//! allocation and recycled every frame. The mesh builder only depends on the
//! [`TransientAllocator`] trait; [`TransientBuffers`] is the CPU-side
//! implementation that [`GpuTransientBuffers`](crate::GpuTransientBuffers)
//! mirrors to the GPU.
//!
//! # Concurrency
//!
//! Reservation goes through an atomic cursor per buffer, so several builders
//! can allocate from one shared instance. Each reservation is a disjoint
//! byte range and is mapped as its own `&mut [u8]`: writing one block never
//! waits on a mapping of another. Overlapping mappings are refused with
//! [`AllocError::AlreadyMapped`]. Reading a whole buffer back takes
//! `&mut self`, which rules out live mappings.

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut, Range};
use std::slice;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::AllocError;

/// Every reservation starts on a multiple of this many bytes.
const MIN_ALIGNMENT: usize = 4;

/// Which transient buffer an allocation lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferKind {
    /// Vertex buffer.
    #[default]
    Vertex,
    /// Index buffer.
    Index,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKind::Vertex => write!(f, "vertex"),
            BufferKind::Index => write!(f, "index"),
        }
    }
}

/// Handle to a reserved byte range of a transient buffer.
///
/// Valid only for the frame it was allocated in. A zero-length handle
/// (the default) means "nothing cached".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferCache {
    /// Buffer the range lives in.
    pub kind: BufferKind,
    /// Frame the range was reserved in.
    pub frame: u64,
    /// Byte offset from the start of the buffer.
    pub offset: usize,
    /// Length in bytes.
    pub bytes: usize,
}

impl BufferCache {
    /// Whether this handle refers to any memory.
    pub fn is_cached(&self) -> bool {
        self.bytes > 0
    }

    /// One past the last byte of the range.
    pub fn end(&self) -> usize {
        self.offset + self.bytes
    }
}

/// Source of per-frame vertex and index memory.
///
/// Implementations hand out monotonically increasing, non-overlapping
/// ranges. A mapping gives write access to one range and is released
/// ("unmapped") when dropped.
pub trait TransientAllocator {
    /// Writable view of a reserved range.
    type Mapping<'a>: DerefMut<Target = [u8]>
    where
        Self: 'a;

    /// Reserve `count` elements of `stride` bytes in the `kind` buffer.
    fn alloc(
        &self,
        kind: BufferKind,
        count: usize,
        stride: usize,
    ) -> Result<BufferCache, AllocError>;

    /// Map a range reserved in the current frame.
    fn map(&self, cache: &BufferCache) -> Result<Self::Mapping<'_>, AllocError>;

    /// Reserve `count` vertices of `stride` bytes.
    fn alloc_vertex(&self, count: usize, stride: usize) -> Result<BufferCache, AllocError> {
        self.alloc(BufferKind::Vertex, count, stride)
    }

    /// Reserve `count` indices of `stride` bytes.
    fn alloc_index(&self, count: usize, stride: usize) -> Result<BufferCache, AllocError> {
        self.alloc(BufferKind::Index, count, stride)
    }

    /// Reserve a vertex range and fill it with `data`.
    fn alloc_vertex_with(&self, data: &[u8], stride: usize) -> Result<BufferCache, AllocError> {
        if stride == 0 {
            return Err(AllocError::ZeroStride);
        }
        let cache = self.alloc_vertex(data.len() / stride, stride)?;
        if cache.is_cached() {
            let mut mapping = self.map(&cache)?;
            mapping.copy_from_slice(&data[..cache.bytes]);
        }
        Ok(cache)
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

/// One bump-allocated byte arena.
struct Arena {
    kind: BufferKind,
    cursor: AtomicUsize,
    capacity: usize,
    // Stored as words so byte views start 4-byte aligned.
    storage: Box<[UnsafeCell<u32>]>,
    // Byte ranges with a live mapping.
    mapped: Mutex<Vec<Range<usize>>>,
}

// SAFETY: `storage` is only written through `TransientMapping`s, and
// `map_range` never hands out two live mappings sharing a byte. Whole-arena
// reads go through `&mut Arena`.
unsafe impl Sync for Arena {}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("kind", &self.kind)
            .field("used", &self.used())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Arena {
    fn new(kind: BufferKind, capacity: usize) -> Self {
        let capacity = align_up(capacity, MIN_ALIGNMENT);
        Self {
            kind,
            cursor: AtomicUsize::new(0),
            capacity,
            storage: (0..capacity / MIN_ALIGNMENT)
                .map(|_| UnsafeCell::new(0))
                .collect(),
            mapped: Mutex::new(Vec::new()),
        }
    }

    fn reserve(&self, frame: u64, count: usize, stride: usize) -> Result<BufferCache, AllocError> {
        if stride == 0 {
            return Err(AllocError::ZeroStride);
        }
        let bytes = count.checked_mul(stride).ok_or(AllocError::OutOfMemory {
            kind: self.kind,
            requested: usize::MAX,
            available: self.capacity.saturating_sub(self.used()),
        })?;
        // Offsets land on a multiple of the stride so they convert to element indices.
        let alignment = stride / gcd(stride, MIN_ALIGNMENT) * MIN_ALIGNMENT;
        let capacity = self.capacity;

        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                let end = align_up(cursor, alignment).checked_add(bytes)?;
                (end <= capacity).then_some(end)
            })
            .map_err(|cursor| AllocError::OutOfMemory {
                kind: self.kind,
                requested: bytes,
                available: capacity.saturating_sub(cursor),
            })?;

        Ok(BufferCache {
            kind: self.kind,
            frame,
            offset: align_up(previous, alignment),
            bytes,
        })
    }

    fn used(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    fn reset(&mut self) {
        *self.cursor.get_mut() = 0;
        self.mapped.get_mut().clear();
    }

    fn base_ptr(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.storage.as_ptr()).cast::<u8>()
    }

    /// Map `range`, which must lie within the reserved bytes.
    fn map_range(&self, range: Range<usize>) -> Result<TransientMapping<'_>, AllocError> {
        debug_assert!(range.end <= self.capacity);
        if !range.is_empty() {
            let mut mapped = self.mapped.lock();
            if mapped
                .iter()
                .any(|live| live.start < range.end && range.start < live.end)
            {
                return Err(AllocError::AlreadyMapped {
                    kind: self.kind,
                    start: range.start,
                    end: range.end,
                });
            }
            mapped.push(range.clone());
        }

        // SAFETY: the range is inside `storage` and no other live mapping
        // overlaps it; it stays registered until the mapping drops.
        let bytes = unsafe {
            slice::from_raw_parts_mut(self.base_ptr().add(range.start), range.len())
        };
        Ok(TransientMapping {
            arena: self,
            range,
            bytes,
        })
    }

    fn bytes(&mut self, len: usize) -> &[u8] {
        debug_assert!(len <= self.capacity);
        // SAFETY: `&mut self` rules out live mappings and `len` is within `storage`.
        unsafe { slice::from_raw_parts(self.base_ptr(), len) }
    }
}

/// Write access to one reserved range of [`TransientBuffers`].
///
/// Other ranges can be mapped and written while this one is live.
#[derive(Debug)]
pub struct TransientMapping<'a> {
    arena: &'a Arena,
    range: Range<usize>,
    bytes: &'a mut [u8],
}

impl Deref for TransientMapping<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl DerefMut for TransientMapping<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.bytes
    }
}

impl Drop for TransientMapping<'_> {
    fn drop(&mut self) {
        if self.range.is_empty() {
            return;
        }
        let mut mapped = self.arena.mapped.lock();
        if let Some(index) = mapped.iter().position(|live| *live == self.range) {
            mapped.swap_remove(index);
        }
    }
}

/// CPU-side transient vertex and index buffers.
///
/// # Example
///
/// ```ignore
/// let mut buffers = TransientBuffers::new(1 << 20, 1 << 18);
/// loop {
///     buffers.begin_frame();
///     mesh.build_frame(&ctx, &buffers, &stages, &particles)?;
///     gpu.upload(&device, &queue, &mut buffers);
/// }
/// ```
#[derive(Debug)]
pub struct TransientBuffers {
    vertex: Arena,
    index: Arena,
    frame: AtomicU64,
}

impl TransientBuffers {
    /// Create buffers holding up to `vertex_bytes` and `index_bytes` per frame.
    pub fn new(vertex_bytes: usize, index_bytes: usize) -> Self {
        Self {
            vertex: Arena::new(BufferKind::Vertex, vertex_bytes),
            index: Arena::new(BufferKind::Index, index_bytes),
            frame: AtomicU64::new(0),
        }
    }

    /// Start a new frame: every handle from earlier frames becomes invalid.
    pub fn begin_frame(&mut self) {
        let frame = self.frame.get_mut();
        *frame += 1;
        self.vertex.reset();
        self.index.reset();
        log::debug!("transient buffers reset for frame {}", *frame);
    }

    /// Frame currently being served.
    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    /// Bytes reserved so far this frame.
    pub fn used(&self, kind: BufferKind) -> usize {
        self.arena(kind).used()
    }

    /// Total bytes available per frame.
    pub fn capacity(&self, kind: BufferKind) -> usize {
        self.arena(kind).capacity
    }

    /// The bytes reserved so far this frame.
    pub fn contents(&mut self, kind: BufferKind) -> &[u8] {
        let arena = self.arena_mut(kind);
        let used = *arena.cursor.get_mut();
        arena.bytes(used)
    }

    /// Like [`TransientBuffers::contents`], padded to a 4-byte multiple for
    /// GPU copies.
    pub(crate) fn padded_contents(&mut self, kind: BufferKind) -> &[u8] {
        let arena = self.arena_mut(kind);
        let used = align_up(*arena.cursor.get_mut(), MIN_ALIGNMENT);
        arena.bytes(used)
    }

    fn arena(&self, kind: BufferKind) -> &Arena {
        match kind {
            BufferKind::Vertex => &self.vertex,
            BufferKind::Index => &self.index,
        }
    }

    fn arena_mut(&mut self, kind: BufferKind) -> &mut Arena {
        match kind {
            BufferKind::Vertex => &mut self.vertex,
            BufferKind::Index => &mut self.index,
        }
    }
}

impl TransientAllocator for TransientBuffers {
    type Mapping<'a>
        = TransientMapping<'a>
    where
        Self: 'a;

    fn alloc(
        &self,
        kind: BufferKind,
        count: usize,
        stride: usize,
    ) -> Result<BufferCache, AllocError> {
        self.arena(kind).reserve(self.frame(), count, stride)
    }

    fn map(&self, cache: &BufferCache) -> Result<Self::Mapping<'_>, AllocError> {
        let current = self.frame();
        if cache.frame != current {
            return Err(AllocError::StaleAllocation {
                allocated: cache.frame,
                current,
            });
        }
        let arena = self.arena(cache.kind);
        let used = arena.used();
        if cache.end() > used {
            return Err(AllocError::OutOfBounds {
                kind: cache.kind,
                end: cache.end(),
                used,
            });
        }
        arena.map_range(cache.offset..cache.end())
    }
}
