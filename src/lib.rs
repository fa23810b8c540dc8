//! # particle-mesh - per-frame particle geometry
//!
//! Turns simulated particles into camera-facing quads and batches them into
//! as few draws as possible.
//!
//! Each frame, every particle stage becomes a block of quads written straight
//! into transient vertex memory. Consecutive quads with the same material are
//! merged into one [`Surface`], and a final pass writes the index buffer for
//! all surfaces at once.
//!
//! ## Quick Start
//!
//! ```ignore
//! use particle_mesh::prelude::*;
//!
//! let mut buffers = TransientBuffers::new(1 << 20, 1 << 18);
//! let mut mesh = ParticleMesh::new(MeshConfig::new());
//!
//! let stages = [Stage::new(1024, Orientation::View, MaterialHandle::new(1))];
//! let mut particles = vec![ParticleBuffer::new(1024, 0)];
//! particles[0].spawn(0, &[Trail::new(Vec3::ZERO, 0.25)]);
//!
//! loop {
//!     buffers.begin_frame();
//!     let ctx = FrameContext::new(entity, view, MaterialHandle::default());
//!     mesh.build_frame(&ctx, &buffers, &stages, &particles)?;
//!     gpu_buffers.upload(&device, &queue, &mut buffers);
//!     gpu_buffers.record(&mut pass, &mesh, |pass, material| bind(pass, material));
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Orientations
//!
//! A stage's [`Orientation`] decides how its quads are spanned:
//!
//! | Mode | Shape | Faces |
//! |------|-------|-------|
//! | [`Orientation::View`] | billboard per pivot | the camera |
//! | [`Orientation::ViewAxisZ`] | billboard per pivot | the camera, kept upright |
//! | `AxisX`, `AxisY`, `AxisZ` | billboard per pivot | a fixed world axis |
//! | [`Orientation::Aimed`] | ribbon per trail segment | the camera, around its travel |
//! | [`Orientation::AimedAxisZ`] | ribbon per trail segment | the camera, turning only around Z |
//!
//! ### Transient memory
//!
//! Geometry goes through a [`TransientAllocator`]. [`TransientBuffers`] is a
//! thread-safe CPU implementation; [`GpuTransientBuffers`] copies its
//! contents into wgpu buffers once per frame.
//!
//! ### Errors
//!
//! Malformed input and exhausted buffers abort the build with a
//! [`MeshError`]. Empty stages and dead particles are simply skipped.

pub mod config;
pub mod context;
pub mod error;
mod gpu;
pub mod mesh;
pub mod orientation;
pub mod particle;
pub mod quad;
pub mod surface;
pub mod transient;
pub mod vertex;

pub use bytemuck;
pub use config::{IndexFormat, MeshConfig, DEFAULT_MAX_TRAILS};
pub use context::{EntityTransform, FrameContext, ViewTransform};
pub use error::{AllocError, MeshError};
pub use glam::{Mat3, Vec3, Vec4};
pub use gpu::GpuTransientBuffers;
pub use mesh::{quad_indices, DrawCall, MeshStats, ParticleMesh, QUAD_TRIANGLE_INDICES};
pub use orientation::resolve_local_axes;
pub use particle::{pack_rgba, Orientation, ParticleBuffer, ParticleMut, ParticleRef, Stage, Trail};
pub use quad::{QuadEmitter, QuadShape};
pub use surface::{MaterialHandle, Surface, SurfaceBatcher};
pub use transient::{BufferCache, BufferKind, TransientAllocator, TransientBuffers};
pub use vertex::{ParticleVertex, SliceWriter, VertexWriter};

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use particle_mesh::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{IndexFormat, MeshConfig};
    pub use crate::context::{EntityTransform, FrameContext, ViewTransform};
    pub use crate::error::MeshError;
    pub use crate::gpu::GpuTransientBuffers;
    pub use crate::mesh::ParticleMesh;
    pub use crate::particle::{pack_rgba, Orientation, ParticleBuffer, Stage, Trail};
    pub use crate::surface::MaterialHandle;
    pub use crate::transient::{TransientAllocator, TransientBuffers};
    pub use crate::vertex::ParticleVertex;
    pub use crate::{Mat3, Vec3, Vec4};
}
