//! Material batching.
//!
//! Quads are grouped into [`Surface`]s: maximal runs of same-material
//! geometry, each issued as a single draw. Batching is greedy and preserves
//! emission order, which matters for blended particles.

use crate::transient::BufferCache;

/// Opaque material identifier supplied by the material system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MaterialHandle(u32);

impl MaterialHandle {
    /// Wrap a raw material id.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw material id.
    pub const fn id(&self) -> u32 {
        self.0
    }
}

/// One draw batch sharing a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Surface {
    /// Material all of the surface's quads use.
    pub material: MaterialHandle,
    /// Vertices in the surface.
    pub vertex_count: usize,
    /// Indices in the surface (always `vertex_count * 3 / 2`).
    pub index_count: usize,
    /// Vertex range in the transient vertex buffer.
    pub vertex_cache: BufferCache,
    /// Index range in the transient index buffer, set by the index pass.
    pub index_cache: BufferCache,
}

impl Surface {
    fn empty(material: MaterialHandle) -> Self {
        Self {
            material,
            vertex_count: 0,
            index_count: 0,
            vertex_cache: BufferCache::default(),
            index_cache: BufferCache::default(),
        }
    }

    /// Whether nothing has been added to this surface.
    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0
    }

    /// Quads in the surface.
    pub fn quad_count(&self) -> usize {
        self.vertex_count / 4
    }

    /// Whether `cache` starts exactly where this surface's vertex range ends.
    pub(crate) fn continues_with(&self, cache: &BufferCache) -> bool {
        self.vertex_cache.is_cached()
            && self.vertex_cache.frame == cache.frame
            && self.vertex_cache.end() == cache.offset
    }

    /// Attach a freshly written vertex block to this surface.
    ///
    /// The first block becomes the surface's range; later blocks must follow
    /// it directly and extend it.
    pub(crate) fn append_vertex_cache(&mut self, cache: BufferCache) {
        if self.vertex_cache.is_cached() {
            self.vertex_cache.bytes += cache.bytes;
        } else {
            self.vertex_cache = cache;
        }
    }
}

/// Accumulates geometry into an ordered list of surfaces.
///
/// There is always exactly one open surface, the last one. Earlier surfaces
/// are frozen.
#[derive(Debug, Clone)]
pub struct SurfaceBatcher {
    surfaces: Vec<Surface>,
    total_vertices: usize,
    total_indices: usize,
}

impl SurfaceBatcher {
    /// Create a batcher holding one empty surface seeded with `default_material`.
    pub fn new(default_material: MaterialHandle) -> Self {
        Self::with_capacity(default_material, 1)
    }

    /// Like [`SurfaceBatcher::new`] with room for `capacity` surfaces.
    pub fn with_capacity(default_material: MaterialHandle, capacity: usize) -> Self {
        let mut batcher = Self {
            surfaces: Vec::with_capacity(capacity.max(1)),
            total_vertices: 0,
            total_indices: 0,
        };
        batcher.clear(default_material);
        batcher
    }

    /// Drop every surface and counter, then open one empty surface.
    pub fn clear(&mut self, default_material: MaterialHandle) {
        self.surfaces.clear();
        self.total_vertices = 0;
        self.total_indices = 0;
        self.surfaces.push(Surface::empty(default_material));
    }

    /// Freeze the open surface and open a new one with the same material.
    pub fn prepare_next_surface(&mut self) {
        let material = self.current().material;
        self.surfaces.push(Surface::empty(material));
    }

    /// The open surface.
    pub fn current(&self) -> &Surface {
        // `clear` always leaves one surface behind, so the list is never empty.
        &self.surfaces[self.surfaces.len() - 1]
    }

    pub(crate) fn current_mut(&mut self) -> &mut Surface {
        let last = self.surfaces.len() - 1;
        &mut self.surfaces[last]
    }

    /// Make `material` current, opening a new surface if the open one already
    /// holds geometry with another material.
    pub fn set_material(&mut self, material: MaterialHandle) {
        if self.current().material != material {
            if !self.current().is_empty() {
                self.prepare_next_surface();
            }
            self.current_mut().material = material;
        }
    }

    /// Add geometry drawn with `material` to the batch.
    pub fn submit(&mut self, material: MaterialHandle, vertex_delta: usize, index_delta: usize) {
        self.set_material(material);
        self.add_counts(vertex_delta, index_delta);
    }

    /// Add a written block of `vertex_count` vertices drawn with `material`.
    ///
    /// Stays on the open surface when the material matches and the block
    /// directly follows the surface's vertex range; otherwise a new surface
    /// is opened. The new surface is seeded with the previous material and
    /// then assigned `material`.
    pub fn submit_vertices(
        &mut self,
        material: MaterialHandle,
        cache: BufferCache,
        vertex_count: usize,
    ) {
        let current = self.current();
        let breaks_batch = current.material != material || !current.continues_with(&cache);
        if !current.is_empty() && breaks_batch {
            self.prepare_next_surface();
        }
        self.current_mut().material = material;
        self.add_counts(vertex_count, vertex_count * 3 / 2);
        self.current_mut().append_vertex_cache(cache);
    }

    pub(crate) fn add_counts(&mut self, vertex_delta: usize, index_delta: usize) {
        self.total_vertices += vertex_delta;
        self.total_indices += index_delta;
        let surface = self.current_mut();
        surface.vertex_count += vertex_delta;
        surface.index_count += index_delta;
    }

    /// All surfaces in emission order, including the open one.
    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub(crate) fn surfaces_mut(&mut self) -> &mut [Surface] {
        &mut self.surfaces
    }

    /// Vertices across all surfaces.
    pub fn total_vertex_count(&self) -> usize {
        self.total_vertices
    }

    /// Indices across all surfaces.
    pub fn total_index_count(&self) -> usize {
        self.total_indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: MaterialHandle = MaterialHandle::new(0);
    const FIRE: MaterialHandle = MaterialHandle::new(1);
    const SMOKE: MaterialHandle = MaterialHandle::new(2);

    #[test]
    fn test_starts_with_one_default_surface() {
        let batcher = SurfaceBatcher::new(DEFAULT);
        assert_eq!(batcher.surfaces().len(), 1);
        assert_eq!(batcher.current().material, DEFAULT);
        assert!(batcher.current().is_empty());
    }

    #[test]
    fn test_same_material_never_splits() {
        let mut batcher = SurfaceBatcher::new(DEFAULT);
        for _ in 0..5 {
            batcher.submit(FIRE, 4, 6);
        }
        assert_eq!(batcher.surfaces().len(), 1);
        assert_eq!(batcher.current().vertex_count, 20);
        assert_eq!(batcher.current().index_count, 30);
        assert_eq!(batcher.current().quad_count(), 5);
    }

    #[test]
    fn test_material_change_opens_exactly_one_surface() {
        let mut batcher = SurfaceBatcher::new(DEFAULT);
        batcher.submit(FIRE, 4, 6);
        batcher.submit(SMOKE, 4, 6);
        batcher.submit(SMOKE, 4, 6);
        batcher.submit(FIRE, 4, 6);

        let materials: Vec<_> = batcher.surfaces().iter().map(|s| s.material).collect();
        assert_eq!(materials, vec![FIRE, SMOKE, FIRE]);
        assert_eq!(batcher.total_vertex_count(), 16);
        assert_eq!(batcher.total_index_count(), 24);
    }

    #[test]
    fn test_empty_surface_takes_new_material_in_place() {
        let mut batcher = SurfaceBatcher::new(DEFAULT);
        batcher.set_material(FIRE);
        batcher.set_material(SMOKE);
        assert_eq!(batcher.surfaces().len(), 1);
        assert_eq!(batcher.current().material, SMOKE);
    }

    #[test]
    fn test_next_surface_inherits_material() {
        let mut batcher = SurfaceBatcher::new(DEFAULT);
        batcher.submit(FIRE, 4, 6);
        batcher.prepare_next_surface();
        assert_eq!(batcher.surfaces().len(), 2);
        assert_eq!(batcher.current().material, FIRE);
        assert!(batcher.current().is_empty());
    }

    fn block(offset: usize, vertices: usize) -> BufferCache {
        BufferCache {
            offset,
            bytes: vertices * 20,
            ..Default::default()
        }
    }

    #[test]
    fn test_contiguous_blocks_merge() {
        let mut batcher = SurfaceBatcher::new(DEFAULT);
        batcher.submit_vertices(FIRE, block(0, 8), 8);
        batcher.submit_vertices(FIRE, block(160, 4), 4);
        assert_eq!(batcher.surfaces().len(), 1);
        let surface = batcher.current();
        assert_eq!(surface.vertex_count, 12);
        assert_eq!(surface.index_count, 18);
        assert_eq!(surface.vertex_cache.offset, 0);
        assert_eq!(surface.vertex_cache.bytes, 240);
    }

    #[test]
    fn test_gap_between_blocks_splits() {
        let mut batcher = SurfaceBatcher::new(DEFAULT);
        batcher.submit_vertices(FIRE, block(0, 4), 4);
        batcher.submit_vertices(FIRE, block(400, 4), 4);
        assert_eq!(batcher.surfaces().len(), 2);
        assert_eq!(batcher.surfaces()[1].vertex_cache.offset, 400);
        assert_eq!(batcher.total_vertex_count(), 8);
    }

    #[test]
    fn test_block_with_new_material_splits() {
        let mut batcher = SurfaceBatcher::new(DEFAULT);
        batcher.submit_vertices(FIRE, block(0, 4), 4);
        batcher.submit_vertices(SMOKE, block(80, 4), 4);
        let materials: Vec<_> = batcher.surfaces().iter().map(|s| s.material).collect();
        assert_eq!(materials, vec![FIRE, SMOKE]);
        assert_eq!(batcher.surfaces()[1].vertex_cache.offset, 80);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut batcher = SurfaceBatcher::new(DEFAULT);
        batcher.submit(FIRE, 4, 6);
        batcher.submit(SMOKE, 8, 12);
        batcher.clear(SMOKE);
        assert_eq!(batcher.surfaces().len(), 1);
        assert_eq!(batcher.total_vertex_count(), 0);
        assert_eq!(batcher.total_index_count(), 0);
        assert_eq!(batcher.current().material, SMOKE);
    }
}
