//! Particle vertex format and bounded element writers.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use half::f16;

use crate::error::MeshError;
use crate::transient::BufferKind;

/// One particle quad corner as laid out in the vertex buffer.
///
/// 20 bytes: position (`f32x3`), texture coordinate (`f16x2`), color (`unorm8x4`).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ParticleVertex {
    /// Position in the emitting entity's local space.
    pub position: [f32; 3],
    /// Texture coordinate in half precision.
    pub st: [f16; 2],
    /// RGBA color, red first.
    pub color: [u8; 4],
}

impl ParticleVertex {
    /// Size of one vertex in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float16x2, 2 => Unorm8x4];

    /// Build a vertex from a position, texture coordinate and packed color.
    pub fn new(position: Vec3, s: f32, t: f32, color: u32) -> Self {
        Self {
            position: position.to_array(),
            st: [f16::from_f32(s), f16::from_f32(t)],
            color: color.to_le_bytes(),
        }
    }

    /// Position as a vector.
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    /// Texture coordinate as full-precision floats.
    pub fn st(&self) -> [f32; 2] {
        [self.st[0].to_f32(), self.st[1].to_f32()]
    }

    /// Vertex buffer layout matching this struct.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::SIZE as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Write-then-advance cursor over a fixed block of elements.
///
/// Running past the end of the block is reported as
/// [`MeshError::BufferOverflow`] instead of touching foreign memory.
#[derive(Debug)]
pub struct SliceWriter<'a, T> {
    kind: BufferKind,
    slots: &'a mut [T],
    cursor: usize,
}

impl<'a, T: Copy> SliceWriter<'a, T> {
    /// Wrap `slots`, which belong to a block of the `kind` buffer.
    pub fn new(kind: BufferKind, slots: &'a mut [T]) -> Self {
        Self {
            kind,
            slots,
            cursor: 0,
        }
    }

    /// Write one element.
    pub fn push(&mut self, value: T) -> Result<(), MeshError> {
        let capacity = self.slots.len();
        let slot = self
            .slots
            .get_mut(self.cursor)
            .ok_or(MeshError::BufferOverflow {
                kind: self.kind,
                capacity,
            })?;
        *slot = value;
        self.cursor += 1;
        Ok(())
    }

    /// Write several elements; nothing is written if they don't all fit.
    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<(), MeshError> {
        let end = self.cursor + values.len();
        let capacity = self.slots.len();
        let dst = self
            .slots
            .get_mut(self.cursor..end)
            .ok_or(MeshError::BufferOverflow {
                kind: self.kind,
                capacity,
            })?;
        dst.copy_from_slice(values);
        self.cursor = end;
        Ok(())
    }

    /// Elements written so far.
    pub fn written(&self) -> usize {
        self.cursor
    }

    /// Elements that still fit.
    pub fn remaining(&self) -> usize {
        self.slots.len() - self.cursor
    }
}

/// Writer over a mapped vertex block.
pub type VertexWriter<'a> = SliceWriter<'a, ParticleVertex>;
