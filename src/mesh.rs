//! Frame mesh building.
//!
//! [`ParticleMesh`] turns the simulation's stages into batched geometry in
//! two passes:
//!
//! 1. [`ParticleMesh::build`] walks the stages in order. Each stage with live
//!    particles gets one vertex block, sized exactly, that its quads are
//!    written into directly. The block is then attached to a surface.
//! 2. [`ParticleMesh::cache_indexes`] runs once all vertex blocks exist. It
//!    reserves a single index block and triangulates every surface against
//!    its final vertex placement.
//!
//! Indices can only be written after every surface's vertex block is known,
//! which is why the index pass is deferred.
//!
//! ```ignore
//! buffers.begin_frame();
//! mesh.build_frame(&ctx, &buffers, &stages, &particles)?;
//! for call in mesh.draw_calls() {
//!     bind_material(call.material);
//!     pass.draw_indexed(call.index_range(), 0, 0..1);
//! }
//! ```

use std::fmt;
use std::ops::Range;

use bytemuck::Pod;

use crate::config::{IndexFormat, MeshConfig};
use crate::context::FrameContext;
use crate::error::MeshError;
use crate::orientation::resolve_local_axes;
use crate::particle::{Orientation, ParticleBuffer, Stage};
use crate::quad::{QuadEmitter, QuadShape};
use crate::surface::{MaterialHandle, Surface, SurfaceBatcher};
use crate::transient::{BufferCache, BufferKind, TransientAllocator};
use crate::vertex::{ParticleVertex, SliceWriter, VertexWriter};

/// Triangle list for one quad, relative to its first vertex.
pub const QUAD_TRIANGLE_INDICES: [u32; 6] = [0, 2, 1, 1, 2, 3];

/// Indices of the quad whose first vertex is `base`.
pub fn quad_indices(base: u32) -> [u32; 6] {
    QUAD_TRIANGLE_INDICES.map(|i| base + i)
}

/// Summary of a built mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshStats {
    /// Surfaces holding geometry.
    pub surfaces: usize,
    /// Total vertices.
    pub vertices: usize,
    /// Total indices.
    pub indices: usize,
    /// Total quads.
    pub quads: usize,
}

impl fmt::Display for MeshStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} surfaces, {} quads ({} vertices, {} indices)",
            self.surfaces, self.quads, self.vertices, self.indices
        )
    }
}

/// One indexed draw for a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    /// Material to bind.
    pub material: MaterialHandle,
    /// First index, counted in elements from the start of the index buffer.
    pub first_index: u32,
    /// Number of indices.
    pub index_count: u32,
}

impl DrawCall {
    /// Index range for `draw_indexed`.
    pub fn index_range(&self) -> Range<u32> {
        self.first_index..self.first_index + self.index_count
    }
}

/// Batched particle geometry for one frame.
#[derive(Debug, Clone)]
pub struct ParticleMesh {
    config: MeshConfig,
    batcher: SurfaceBatcher,
    emitter: QuadEmitter,
}

impl ParticleMesh {
    /// Create an empty mesh.
    ///
    /// The first surface takes its material from the context of the first
    /// [`ParticleMesh::build`], or from [`ParticleMesh::clear`].
    pub fn new(config: MeshConfig) -> Self {
        let default_material = MaterialHandle::default();
        Self {
            batcher: SurfaceBatcher::with_capacity(default_material, config.surface_capacity),
            emitter: QuadEmitter::new(config.max_pivots()),
            config,
        }
    }

    /// The mesh's configuration.
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Discard all surfaces and counters and open one empty surface.
    ///
    /// Call once per frame before building.
    pub fn clear(&mut self, default_material: MaterialHandle) {
        self.batcher.clear(default_material);
    }

    /// Surfaces in draw order.
    pub fn surfaces(&self) -> &[Surface] {
        self.batcher.surfaces()
    }

    /// Total vertices across all surfaces.
    pub fn total_vertex_count(&self) -> usize {
        self.batcher.total_vertex_count()
    }

    /// Total indices across all surfaces.
    pub fn total_index_count(&self) -> usize {
        self.batcher.total_index_count()
    }

    /// Counts for logging and diagnostics.
    pub fn stats(&self) -> MeshStats {
        MeshStats {
            surfaces: self.surfaces().iter().filter(|s| !s.is_empty()).count(),
            vertices: self.total_vertex_count(),
            indices: self.total_index_count(),
            quads: self.total_vertex_count() / 4,
        }
    }

    /// Add one pre-built quad drawn with `material`.
    ///
    /// The quad gets its own 4-vertex block. It joins the open surface when
    /// the material matches and the block follows the surface's vertices.
    pub fn draw_quad<A: TransientAllocator>(
        &mut self,
        allocator: &A,
        vertices: &[ParticleVertex; 4],
        material: MaterialHandle,
    ) -> Result<(), MeshError> {
        let bytes = bytemuck::cast_slice(vertices);
        let cache = allocator.alloc_vertex_with(bytes, ParticleVertex::SIZE)?;
        self.batcher.submit_vertices(material, cache, vertices.len());
        log::trace!(
            "quad with material {} at vertex byte {}",
            material.id(),
            cache.offset
        );
        Ok(())
    }

    /// Emit the geometry of every stage.
    ///
    /// `particles[i]` holds the records of `stages[i]`. Stages flagged
    /// `skip_render` or without live particles contribute nothing. Can be
    /// called several times per frame to add more particle systems; a mesh
    /// without geometry yet is seeded with `ctx.default_material`.
    pub fn build<A: TransientAllocator>(
        &mut self,
        ctx: &FrameContext,
        allocator: &A,
        stages: &[Stage],
        particles: &[ParticleBuffer],
    ) -> Result<(), MeshError> {
        if stages.len() != particles.len() {
            return Err(MeshError::StageCountMismatch {
                stages: stages.len(),
                buffers: particles.len(),
            });
        }

        if self.batcher.surfaces().len() == 1 && self.batcher.current().is_empty() {
            self.batcher.current_mut().material = ctx.default_material;
        }

        for (index, (stage, buffer)) in stages.iter().zip(particles).enumerate() {
            if stage.skip_render {
                continue;
            }
            self.validate_stage(index, stage, buffer)?;

            let vertex_count = stage.count_vertices(buffer);
            if vertex_count == 0 {
                if stage.orientation.is_aimed() && stage.effective_trail_count() == 0 {
                    log::debug!("stage {index}: aimed orientation without trails never draws");
                }
                continue;
            }

            let shape = match stage.orientation {
                Orientation::Aimed => QuadShape::Ribbon { axis_z: false },
                Orientation::AimedAxisZ => QuadShape::Ribbon { axis_z: true },
                mode => QuadShape::Billboard {
                    local_axis: resolve_local_axes(mode, &ctx.entity.axis, &ctx.view.axis)?,
                },
            };

            let cache = allocator.alloc_vertex(vertex_count, ParticleVertex::SIZE)?;
            self.write_stage(ctx, allocator, &cache, stage, buffer, &shape)?;
            self.batcher.submit_vertices(stage.material, cache, vertex_count);

            log::trace!(
                "stage {index}: {vertex_count} vertices into surface {}",
                self.batcher.surfaces().len() - 1
            );
        }

        Ok(())
    }

    fn validate_stage(
        &self,
        index: usize,
        stage: &Stage,
        buffer: &ParticleBuffer,
    ) -> Result<(), MeshError> {
        let trail_count = stage.effective_trail_count();
        if trail_count > self.config.max_trails {
            return Err(MeshError::TooManyTrails {
                stage: index,
                trail_count,
                max: self.config.max_trails,
            });
        }
        if stage.particle_count > buffer.len() {
            return Err(MeshError::ParticleCountMismatch {
                stage: index,
                declared: stage.particle_count,
                available: buffer.len(),
            });
        }
        if stage.particle_count > 0 && buffer.stride() != trail_count + 1 {
            return Err(MeshError::StrideMismatch {
                stage: index,
                expected: trail_count + 1,
                actual: buffer.stride(),
            });
        }
        Ok(())
    }

    fn write_stage<A: TransientAllocator>(
        &mut self,
        ctx: &FrameContext,
        allocator: &A,
        cache: &BufferCache,
        stage: &Stage,
        buffer: &ParticleBuffer,
        shape: &QuadShape,
    ) -> Result<(), MeshError> {
        let trail_count = stage.effective_trail_count();
        let mut mapping = allocator.map(cache)?;
        let slots = bytemuck::try_cast_slice_mut::<u8, ParticleVertex>(&mut mapping)?;
        let mut writer = VertexWriter::new(BufferKind::Vertex, slots);

        for particle in buffer.iter(stage.particle_count).filter(|p| p.alive) {
            self.emitter
                .emit(&mut writer, particle, trail_count, shape, ctx)?;
        }
        debug_assert_eq!(writer.remaining(), 0);
        Ok(())
    }

    /// Write the index buffer for every surface.
    ///
    /// Reserves one index block covering the whole mesh, triangulates each
    /// surface against its own vertex block and hands each surface its
    /// sub-range of the block, in surface order. Does nothing for an empty
    /// mesh.
    pub fn cache_indexes<A: TransientAllocator>(&mut self, allocator: &A) -> Result<(), MeshError> {
        let total = self.batcher.total_index_count();
        if total == 0 {
            return Ok(());
        }
        debug_assert_eq!(total % 6, 0);

        let format = self.config.index_format;
        let cache = allocator.alloc_index(total, format.size())?;
        {
            let mut mapping = allocator.map(&cache)?;
            let surfaces = self.batcher.surfaces();
            match format {
                IndexFormat::Uint16 => {
                    let slots = bytemuck::try_cast_slice_mut::<u8, u16>(&mut mapping)?;
                    write_quad_indices(slots, surfaces, format)?;
                }
                IndexFormat::Uint32 => {
                    let slots = bytemuck::try_cast_slice_mut::<u8, u32>(&mut mapping)?;
                    write_quad_indices(slots, surfaces, format)?;
                }
            }
        }

        let mut offset = cache.offset;
        for surface in self.batcher.surfaces_mut() {
            let bytes = surface.index_count * format.size();
            surface.index_cache = BufferCache {
                kind: BufferKind::Index,
                frame: cache.frame,
                offset,
                bytes,
            };
            offset += bytes;
        }

        Ok(())
    }

    /// Clear, build and index in one go.
    ///
    /// Fatal errors are logged before being returned; the frame's mesh is
    /// unusable in that case.
    pub fn build_frame<A: TransientAllocator>(
        &mut self,
        ctx: &FrameContext,
        allocator: &A,
        stages: &[Stage],
        particles: &[ParticleBuffer],
    ) -> Result<(), MeshError> {
        self.clear(ctx.default_material);
        let result = self
            .build(ctx, allocator, stages, particles)
            .and_then(|()| self.cache_indexes(allocator));

        match &result {
            Ok(()) => log::debug!("particle mesh built: {}", self.stats()),
            Err(e) => log::error!("particle mesh build aborted: {e}"),
        }
        result
    }

    /// Draw calls for every non-empty surface, in draw order.
    ///
    /// Only meaningful after [`ParticleMesh::cache_indexes`].
    pub fn draw_calls(&self) -> impl Iterator<Item = DrawCall> + '_ {
        let index_size = self.config.index_format.size();
        self.surfaces()
            .iter()
            .filter(|s| !s.is_empty())
            .map(move |s| DrawCall {
                material: s.material,
                first_index: (s.index_cache.offset / index_size) as u32,
                index_count: s.index_count as u32,
            })
    }
}

fn write_quad_indices<I>(
    slots: &mut [I],
    surfaces: &[Surface],
    format: IndexFormat,
) -> Result<(), MeshError>
where
    I: Pod + TryFrom<u32>,
{
    let mut writer = SliceWriter::new(BufferKind::Index, slots);
    let max_index = format.max_index();

    for surface in surfaces.iter().filter(|s| s.index_count > 0) {
        let offset = surface.vertex_cache.offset;
        if offset % ParticleVertex::SIZE != 0 {
            return Err(MeshError::MisalignedVertexCache {
                offset,
                stride: ParticleVertex::SIZE,
            });
        }

        let mut base = (offset / ParticleVertex::SIZE) as u64;
        for _ in 0..surface.index_count / 6 {
            let last = base + 3;
            if last > max_index {
                return Err(MeshError::IndexOutOfRange { index: last, format });
            }
            for index in quad_indices(base as u32) {
                let index = I::try_from(index).map_err(|_| MeshError::IndexOutOfRange {
                    index: u64::from(index),
                    format,
                })?;
                writer.push(index)?;
            }
            base += 4;
        }
    }

    Ok(())
}
