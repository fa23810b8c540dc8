//! Error types for particle mesh building.
//!
//! Two layers can fail: the transient allocator that hands out per-frame
//! buffer ranges ([`AllocError`]) and the mesh builder itself ([`MeshError`]).
//! Every variant here is fatal for the frame being built. Degenerate input
//! such as a stage without live particles is not an error and never shows up
//! here.

use thiserror::Error;

use crate::config::IndexFormat;
use crate::particle::Orientation;
use crate::transient::BufferKind;

/// Errors raised by a [`TransientAllocator`](crate::TransientAllocator).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// The frame's buffer is exhausted.
    #[error("{kind} buffer exhausted: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Which buffer ran out.
        kind: BufferKind,
        /// Size of the rejected request in bytes.
        requested: usize,
        /// Bytes left before the request.
        available: usize,
    },
    /// The handle was allocated in an earlier frame.
    #[error("allocation from frame {allocated} used in frame {current}")]
    StaleAllocation {
        /// Frame the handle was created in.
        allocated: u64,
        /// Frame the allocator is currently serving.
        current: u64,
    },
    /// The handle points past the region reserved so far.
    #[error("{kind} range ends at byte {end} but only {used} bytes are reserved")]
    OutOfBounds {
        /// Buffer being mapped.
        kind: BufferKind,
        /// End of the requested range in bytes.
        end: usize,
        /// Bytes reserved in the current frame.
        used: usize,
    },
    /// The range overlaps a mapping that is still live.
    #[error("{kind} range {start}..{end} overlaps a live mapping")]
    AlreadyMapped {
        /// Buffer being mapped.
        kind: BufferKind,
        /// First byte of the requested range.
        start: usize,
        /// One past the last byte of the requested range.
        end: usize,
    },
    /// An element stride of zero was requested.
    #[error("element stride must be non-zero")]
    ZeroStride,
}

/// Errors raised while building a [`ParticleMesh`](crate::ParticleMesh).
#[derive(Debug, Error)]
pub enum MeshError {
    /// An aimed orientation was handed to the billboard axis resolver.
    #[error("orientation {0:?} has no billboard axis frame")]
    UnsupportedOrientation(Orientation),
    /// A raw orientation value that maps to no known mode.
    #[error("unknown orientation mode {0}")]
    InvalidOrientation(u32),
    /// A bounded writer ran past the end of its mapped block.
    #[error("{kind} write overflow: block holds {capacity} elements")]
    BufferOverflow {
        /// Buffer being written.
        kind: BufferKind,
        /// Capacity of the block in elements.
        capacity: usize,
    },
    /// Stage descriptors and particle buffers are not paired one-to-one.
    #[error("{stages} stages but {buffers} particle buffers")]
    StageCountMismatch {
        /// Number of stage descriptors.
        stages: usize,
        /// Number of particle buffers.
        buffers: usize,
    },
    /// A stage declares more particles than its buffer holds.
    #[error("stage {stage} declares {declared} particles but its buffer holds {available}")]
    ParticleCountMismatch {
        /// Stage index.
        stage: usize,
        /// Particle count the stage declares.
        declared: usize,
        /// Records present in the buffer.
        available: usize,
    },
    /// A stage uses more trail segments than the builder is configured for.
    #[error("stage {stage} uses {trail_count} trails, limit is {max}")]
    TooManyTrails {
        /// Stage index.
        stage: usize,
        /// Trail count the stage declares.
        trail_count: usize,
        /// Configured maximum.
        max: usize,
    },
    /// The particle buffer's record stride does not match the stage's trail count.
    #[error("stage {stage} expects {expected} pivots per particle, buffer stores {actual}")]
    StrideMismatch {
        /// Stage index.
        stage: usize,
        /// Stride derived from the stage.
        expected: usize,
        /// Stride of the supplied buffer.
        actual: usize,
    },
    /// A particle record holds fewer pivots than its stage emits.
    #[error("particle record holds {available} pivots, {needed} needed")]
    TruncatedParticle {
        /// Pivots the stage reads per particle.
        needed: usize,
        /// Pivots in the record.
        available: usize,
    },
    /// A vertex index does not fit the configured index format.
    #[error("vertex index {index} does not fit {format:?} indices")]
    IndexOutOfRange {
        /// Offending vertex index.
        index: u64,
        /// Configured index format.
        format: IndexFormat,
    },
    /// A surface's vertex block does not start on a vertex boundary.
    #[error("vertex cache offset {offset} is not a multiple of the {stride}-byte vertex size")]
    MisalignedVertexCache {
        /// Byte offset of the block.
        offset: usize,
        /// Vertex size in bytes.
        stride: usize,
    },
    /// A mapped byte range could not be viewed as typed elements.
    #[error("mapped range cannot be viewed as typed elements: {0:?}")]
    Cast(bytemuck::PodCastError),
    /// The transient allocator failed.
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

impl From<bytemuck::PodCastError> for MeshError {
    fn from(e: bytemuck::PodCastError) -> Self {
        MeshError::Cast(e)
    }
}
