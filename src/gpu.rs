//! GPU mirror of the transient buffers.
//!
//! [`GpuTransientBuffers`] owns one wgpu vertex buffer and one wgpu index
//! buffer. Each frame the bytes written into [`TransientBuffers`] are
//! uploaded in one `write_buffer` per buffer, and the mesh's draw calls are
//! recorded against them. Buffers grow to the next power of two when a frame
//! outgrows them and never shrink.

use crate::mesh::ParticleMesh;
use crate::surface::MaterialHandle;
use crate::transient::{BufferKind, TransientBuffers};

/// Smallest GPU buffer ever created, in bytes.
const MIN_BUFFER_SIZE: u64 = 4096;

/// GPU-side vertex and index buffers for particle meshes.
pub struct GpuTransientBuffers {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    vertex_len: u64,
    index_len: u64,
}

impl GpuTransientBuffers {
    /// Create buffers large enough for `transient`'s full capacity.
    pub fn new(device: &wgpu::Device, transient: &TransientBuffers) -> Self {
        let vertex_size = buffer_size(transient.capacity(BufferKind::Vertex));
        let index_size = buffer_size(transient.capacity(BufferKind::Index));
        Self {
            vertex_buffer: create_buffer(device, BufferKind::Vertex, vertex_size),
            index_buffer: create_buffer(device, BufferKind::Index, index_size),
            vertex_len: 0,
            index_len: 0,
        }
    }

    /// Copy this frame's vertices and indices to the GPU.
    ///
    /// Takes `transient` mutably so no mapping can be live during the copy.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        transient: &mut TransientBuffers,
    ) {
        let vertex = transient.padded_contents(BufferKind::Vertex);
        self.vertex_len =
            upload_kind(device, queue, &mut self.vertex_buffer, vertex, BufferKind::Vertex);
        let index = transient.padded_contents(BufferKind::Index);
        self.index_len =
            upload_kind(device, queue, &mut self.index_buffer, index, BufferKind::Index);
    }

    /// The vertex buffer.
    pub fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vertex_buffer
    }

    /// The index buffer.
    pub fn index_buffer(&self) -> &wgpu::Buffer {
        &self.index_buffer
    }

    /// Record one indexed draw per non-empty surface of `mesh`.
    ///
    /// `bind_material` is called before each draw so the caller can set the
    /// pipeline and bind groups for the surface's material.
    pub fn record<F>(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        mesh: &ParticleMesh,
        mut bind_material: F,
    ) where
        F: FnMut(&mut wgpu::RenderPass<'_>, MaterialHandle),
    {
        if self.vertex_len == 0 || self.index_len == 0 {
            return;
        }

        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..self.vertex_len));
        pass.set_index_buffer(
            self.index_buffer.slice(..self.index_len),
            mesh.config().index_format.into(),
        );

        for call in mesh.draw_calls() {
            bind_material(pass, call.material);
            pass.draw_indexed(call.index_range(), 0, 0..1);
        }
    }
}

fn buffer_size(bytes: usize) -> u64 {
    (bytes as u64).next_power_of_two().max(MIN_BUFFER_SIZE)
}

fn create_buffer(device: &wgpu::Device, kind: BufferKind, size: u64) -> wgpu::Buffer {
    let (label, usage) = match kind {
        BufferKind::Vertex => ("Particle Vertex Buffer", wgpu::BufferUsages::VERTEX),
        BufferKind::Index => ("Particle Index Buffer", wgpu::BufferUsages::INDEX),
    };
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: usage | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn upload_kind(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &mut wgpu::Buffer,
    contents: &[u8],
    kind: BufferKind,
) -> u64 {
    let len = contents.len() as u64;
    if len == 0 {
        return 0;
    }

    if len > buffer.size() {
        let size = buffer_size(contents.len());
        log::debug!("growing particle {kind} buffer to {size} bytes");
        *buffer = create_buffer(device, kind, size);
    }
    queue.write_buffer(buffer, 0, contents);
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_rounds_up() {
        assert_eq!(buffer_size(0), MIN_BUFFER_SIZE);
        assert_eq!(buffer_size(5000), 8192);
        assert_eq!(buffer_size(1 << 20), 1 << 20);
    }
}
