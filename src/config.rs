//! Builder configuration.
//!
//! ```ignore
//! let config = MeshConfig::new()
//!     .with_max_trails(16)
//!     .with_index_format(IndexFormat::Uint16);
//! let mut mesh = ParticleMesh::new(config);
//! ```

/// Default upper bound on trail segments per particle.
pub const DEFAULT_MAX_TRAILS: usize = 32;

/// Element type of the index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexFormat {
    /// 16-bit indices. Vertex indices above `u16::MAX` are rejected.
    Uint16,
    /// 32-bit indices.
    #[default]
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn size(&self) -> usize {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }

    /// Largest vertex index representable in this format.
    pub fn max_index(&self) -> u64 {
        match self {
            IndexFormat::Uint16 => u64::from(u16::MAX),
            IndexFormat::Uint32 => u64::from(u32::MAX),
        }
    }
}

impl From<IndexFormat> for wgpu::IndexFormat {
    fn from(format: IndexFormat) -> Self {
        match format {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }
}

/// Configuration for a [`ParticleMesh`](crate::ParticleMesh).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshConfig {
    /// Maximum trail segments a stage may use.
    pub max_trails: usize,
    /// Index element type written by the index pass.
    pub index_format: IndexFormat,
    /// Surfaces reserved up front each frame.
    pub surface_capacity: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            max_trails: DEFAULT_MAX_TRAILS,
            index_format: IndexFormat::default(),
            surface_capacity: 8,
        }
    }
}

impl MeshConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of trail segments per particle.
    pub fn with_max_trails(mut self, max_trails: usize) -> Self {
        self.max_trails = max_trails;
        self
    }

    /// Set the index element type.
    pub fn with_index_format(mut self, format: IndexFormat) -> Self {
        self.index_format = format;
        self
    }

    /// Set how many surfaces are reserved up front.
    pub fn with_surface_capacity(mut self, capacity: usize) -> Self {
        self.surface_capacity = capacity;
        self
    }

    /// Pivot slots needed for one particle's trail chain.
    pub(crate) fn max_pivots(&self) -> usize {
        self.max_trails + 1
    }
}
