//! Quad construction for single particles.
//!
//! Two shapes are supported:
//!
//! - **Billboards**: one quad per pivot, spanned by the stage's axis frame
//!   (see [`resolve_local_axes`](crate::orientation::resolve_local_axes)) and
//!   optionally rotated about its forward axis.
//! - **Ribbons**: one quad per trail segment, joined pivot to pivot and
//!   turned toward the camera around the direction of travel.
//!
//! Corners are always written in the order top-left, top-right,
//! bottom-left, bottom-right, which the index pass relies on.

use glam::{Mat3, Quat, Vec3};

use crate::context::FrameContext;
use crate::error::MeshError;
use crate::particle::{ParticleRef, Trail};
use crate::vertex::{ParticleVertex, VertexWriter};

/// Per-stage quad shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuadShape {
    /// Billboards spanned by a local (forward, left, up) frame.
    Billboard {
        /// Frame from [`resolve_local_axes`](crate::orientation::resolve_local_axes).
        local_axis: Mat3,
    },
    /// Camera-facing trail ribbons.
    Ribbon {
        /// Only turn around world Z.
        axis_z: bool,
    },
}

/// Emits the quads of one particle at a time.
///
/// Holds scratch space for ribbon pivots so building a frame does not
/// allocate per particle.
#[derive(Debug, Clone, Default)]
pub struct QuadEmitter {
    world: Vec<Vec3>,
    camera: Vec<Vec3>,
    tangent: Vec<Vec3>,
    right: Vec<Vec3>,
}

impl QuadEmitter {
    /// Create an emitter with scratch room for `max_pivots` pivots per particle.
    pub fn new(max_pivots: usize) -> Self {
        Self {
            world: Vec::with_capacity(max_pivots),
            camera: Vec::with_capacity(max_pivots),
            tangent: Vec::with_capacity(max_pivots),
            right: Vec::with_capacity(max_pivots),
        }
    }

    /// Emit every quad of `particle` for a stage with `trail_count` trails.
    pub fn emit(
        &mut self,
        writer: &mut VertexWriter<'_>,
        particle: ParticleRef<'_>,
        trail_count: usize,
        shape: &QuadShape,
        ctx: &FrameContext,
    ) -> Result<(), MeshError> {
        match shape {
            QuadShape::Billboard { local_axis } => {
                emit_billboards(writer, particle, trail_count + 1, local_axis)
            }
            QuadShape::Ribbon { axis_z } => {
                self.emit_ribbon(writer, particle, trail_count, *axis_z, ctx)
            }
        }
    }

    /// Emit `trail_count` ribbon quads joining the particle's pivots.
    ///
    /// Each pivot gets a camera direction and a tangent: end pivots use the
    /// midpoint and delta of their one segment, inner pivots the pivot itself
    /// and the delta between their neighbours. Coincident pivots collapse
    /// the affected corners onto the pivot.
    pub fn emit_ribbon(
        &mut self,
        writer: &mut VertexWriter<'_>,
        particle: ParticleRef<'_>,
        trail_count: usize,
        axis_z: bool,
        ctx: &FrameContext,
    ) -> Result<(), MeshError> {
        if trail_count == 0 {
            return Ok(());
        }
        let trails = pivots(&particle, trail_count + 1)?;
        let color = particle.color();
        let eye = ctx.view.origin;

        self.world.clear();
        self.world
            .extend(trails.iter().map(|t| ctx.entity.to_world(t.position)));

        self.camera.clear();
        self.tangent.clear();
        let world = &self.world;
        for i in 0..=trail_count {
            let (mut camera, tangent) = if i == 0 {
                (eye - (world[1] + world[0]) * 0.5, world[1] - world[0])
            } else if i == trail_count {
                (eye - (world[i] + world[i - 1]) * 0.5, world[i] - world[i - 1])
            } else {
                (eye - world[i], world[i + 1] - world[i - 1])
            };
            if axis_z {
                camera.x = 0.0;
                camera.y = 0.0;
            }
            self.camera.push(camera.normalize_or_zero());
            self.tangent.push(tangent.normalize_or_zero());
        }

        self.right.clear();
        for ((camera, tangent), trail) in self.camera.iter().zip(&self.tangent).zip(trails) {
            let right = camera.cross(*tangent).normalize_or_zero();
            self.right
                .push(ctx.entity.direction_to_local(right) * (trail.size * 0.5));
        }

        let segments = trail_count as f32;
        for i in 0..trail_count {
            let t1 = i as f32 / segments;
            let t2 = (i + 1) as f32 / segments;
            let (head, tail) = (trails[i].position, trails[i + 1].position);
            let (head_right, tail_right) = (self.right[i], self.right[i + 1]);

            writer.extend_from_slice(&[
                ParticleVertex::new(head - head_right, 0.0, t1, color),
                ParticleVertex::new(head + head_right, 1.0, t1, color),
                ParticleVertex::new(tail - tail_right, 0.0, t2, color),
                ParticleVertex::new(tail + tail_right, 1.0, t2, color),
            ])?;
        }

        Ok(())
    }
}

fn pivots<'a>(particle: &ParticleRef<'a>, count: usize) -> Result<&'a [Trail], MeshError> {
    particle.trails.get(..count).ok_or(MeshError::TruncatedParticle {
        needed: count,
        available: particle.trails.len(),
    })
}

/// Emit one billboard per pivot for the first `pivot_count` pivots.
///
/// Pivots are `size * aspect_ratio` wide and `size` tall, rotated by their
/// `angle` (degrees) about the frame's forward axis.
pub fn emit_billboards(
    writer: &mut VertexWriter<'_>,
    particle: ParticleRef<'_>,
    pivot_count: usize,
    local_axis: &Mat3,
) -> Result<(), MeshError> {
    let color = particle.color();
    let forward = local_axis.x_axis;

    for trail in pivots(&particle, pivot_count)? {
        let mut right = local_axis.y_axis;
        let mut up = local_axis.z_axis;

        if trail.angle != 0.0 {
            let rotation = Quat::from_axis_angle(forward, trail.angle.to_radians());
            right = rotation * right;
            up = rotation * up;
        }

        let half_size = trail.size * 0.5;
        let right = right * half_size * trail.aspect_ratio;
        let up = up * half_size;
        let center = trail.position;

        writer.extend_from_slice(&[
            ParticleVertex::new(center + up - right, 0.0, 0.0, color),
            ParticleVertex::new(center + up + right, 1.0, 0.0, color),
            ParticleVertex::new(center - up - right, 0.0, 1.0, color),
            ParticleVertex::new(center - up + right, 1.0, 1.0, color),
        ])?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EntityTransform, ViewTransform};
    use crate::orientation::resolve_local_axes;
    use crate::particle::{Orientation, ParticleBuffer};
    use crate::transient::BufferKind;

    fn zeroed(count: usize) -> Vec<ParticleVertex> {
        vec![bytemuck::Zeroable::zeroed(); count]
    }

    fn context(eye: Vec3) -> FrameContext {
        FrameContext {
            view: ViewTransform::looking_at(eye, Vec3::ZERO).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_billboard_corners_axis_x() {
        let mut buffer = ParticleBuffer::new(1, 0);
        let center = Vec3::new(1.0, 2.0, 3.0);
        buffer.spawn(0, &[Trail::new(center, 2.0).with_aspect_ratio(1.5).with_color(0x11223344)]);

        let axis =
            resolve_local_axes(Orientation::AxisX, &Mat3::IDENTITY, &Mat3::IDENTITY).unwrap();
        let mut slots = zeroed(4);
        let mut writer = VertexWriter::new(BufferKind::Vertex, &mut slots);
        emit_billboards(&mut writer, buffer.particle(0).unwrap(), 1, &axis).unwrap();
        assert_eq!(writer.written(), 4);

        // right = Y * 1.5, up = Z * 1.0
        let expected = [
            center + Vec3::new(0.0, -1.5, 1.0),
            center + Vec3::new(0.0, 1.5, 1.0),
            center + Vec3::new(0.0, -1.5, -1.0),
            center + Vec3::new(0.0, 1.5, -1.0),
        ];
        for (v, e) in slots.iter().zip(expected) {
            assert!(v.position().abs_diff_eq(e, 1e-6));
            assert_eq!(v.color, 0x11223344u32.to_le_bytes());
        }
        let st: Vec<_> = slots.iter().map(|v| v.st()).collect();
        assert_eq!(st, vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
    }

    #[test]
    fn test_billboard_rotation_about_forward() {
        let mut buffer = ParticleBuffer::new(1, 0);
        buffer.spawn(0, &[Trail::new(Vec3::ZERO, 2.0).with_angle(90.0)]);
        let axis = Mat3::IDENTITY;

        let mut slots = zeroed(4);
        let mut writer = VertexWriter::new(BufferKind::Vertex, &mut slots);
        emit_billboards(&mut writer, buffer.particle(0).unwrap(), 1, &axis).unwrap();

        // Rotating (right = Y, up = Z) by 90 degrees about X gives right = Z, up = -Y.
        assert!(slots[0].position().abs_diff_eq(Vec3::new(0.0, -1.0, -1.0), 1e-5));
        assert!(slots[3].position().abs_diff_eq(Vec3::new(0.0, 1.0, 1.0), 1e-5));
    }

    #[test]
    fn test_billboard_one_quad_per_pivot() {
        let mut buffer = ParticleBuffer::new(1, 2);
        buffer.spawn(0, &[Trail::default(); 3]);
        let mut slots = zeroed(12);
        let mut writer = VertexWriter::new(BufferKind::Vertex, &mut slots);
        emit_billboards(&mut writer, buffer.particle(0).unwrap(), 3, &Mat3::IDENTITY).unwrap();
        assert_eq!(writer.remaining(), 0);
    }

    #[test]
    fn test_billboard_overflow_is_reported() {
        let mut buffer = ParticleBuffer::new(1, 1);
        buffer.spawn(0, &[Trail::default(); 2]);
        let mut slots = zeroed(6);
        let mut writer = VertexWriter::new(BufferKind::Vertex, &mut slots);
        let particle = buffer.particle(0).unwrap();
        let err = emit_billboards(&mut writer, particle, 2, &Mat3::IDENTITY).unwrap_err();
        assert!(matches!(err, MeshError::BufferOverflow { capacity: 6, .. }));
        assert_eq!(writer.written(), 4);
    }

    #[test]
    fn test_ribbon_texture_coordinates() {
        let mut buffer = ParticleBuffer::new(1, 2);
        buffer.spawn(
            0,
            &[
                Trail::new(Vec3::new(0.0, 0.0, 0.0), 1.0),
                Trail::new(Vec3::new(1.0, 0.0, 0.0), 1.0),
                Trail::new(Vec3::new(2.0, 0.0, 0.0), 1.0),
            ],
        );
        let ctx = context(Vec3::new(1.0, 0.0, 10.0));
        let mut emitter = QuadEmitter::new(3);
        let mut slots = zeroed(8);
        let mut writer = VertexWriter::new(BufferKind::Vertex, &mut slots);
        emitter
            .emit_ribbon(&mut writer, buffer.particle(0).unwrap(), 2, false, &ctx)
            .unwrap();
        assert_eq!(writer.written(), 8);

        let t: Vec<f32> = slots.iter().map(|v| v.st()[1]).collect();
        assert_eq!(t, vec![0.0, 0.0, 0.5, 0.5, 0.5, 0.5, 1.0, 1.0]);
        let s: Vec<f32> = slots.iter().map(|v| v.st()[0]).collect();
        assert_eq!(s, vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_ribbon_faces_camera() {
        // Trail along X, camera straight above: the ribbon spreads along Y.
        let mut buffer = ParticleBuffer::new(1, 1);
        buffer.spawn(
            0,
            &[Trail::new(Vec3::ZERO, 2.0), Trail::new(Vec3::new(4.0, 0.0, 0.0), 2.0)],
        );
        let ctx = FrameContext {
            view: ViewTransform::new(Vec3::new(2.0, 0.0, 10.0), Mat3::IDENTITY),
            ..Default::default()
        };
        let mut emitter = QuadEmitter::new(2);
        let mut slots = zeroed(4);
        let mut writer = VertexWriter::new(BufferKind::Vertex, &mut slots);
        emitter
            .emit(
                &mut writer,
                buffer.particle(0).unwrap(),
                1,
                &QuadShape::Ribbon { axis_z: false },
                &ctx,
            )
            .unwrap();

        // camera = +Z, tangent = +X, right = Z x X = +Y; half width 1.
        assert!(slots[0].position().abs_diff_eq(Vec3::new(0.0, -1.0, 0.0), 1e-5));
        assert!(slots[1].position().abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
        assert!(slots[2].position().abs_diff_eq(Vec3::new(4.0, -1.0, 0.0), 1e-5));
        assert!(slots[3].position().abs_diff_eq(Vec3::new(4.0, 1.0, 0.0), 1e-5));
    }

    #[test]
    fn test_ribbon_bend_uses_neighbour_tangent() {
        // Trail turns 90 degrees at (1, 0, 0); camera straight above the bend.
        let mut buffer = ParticleBuffer::new(1, 2);
        let bend = Vec3::new(1.0, 0.0, 0.0);
        buffer.spawn(
            0,
            &[
                Trail::new(Vec3::ZERO, 1.0),
                Trail::new(bend, 1.0),
                Trail::new(Vec3::new(1.0, 1.0, 0.0), 1.0),
            ],
        );
        let ctx = FrameContext {
            view: ViewTransform::new(Vec3::new(1.0, 0.0, 10.0), Mat3::IDENTITY),
            ..Default::default()
        };
        let mut emitter = QuadEmitter::new(3);
        let mut slots = zeroed(8);
        let mut writer = VertexWriter::new(BufferKind::Vertex, &mut slots);
        emitter
            .emit_ribbon(&mut writer, buffer.particle(0).unwrap(), 2, false, &ctx)
            .unwrap();

        // Inner tangent is next - previous = (1, 1, 0), so right = Z x (1, 1, 0).
        let camera = (ctx.view.origin - bend).normalize();
        let right = camera.cross(Vec3::new(1.0, 1.0, 0.0)).normalize() * 0.5;
        assert!(right.abs_diff_eq(Vec3::new(-0.5, 0.5, 0.0).normalize() * 0.5, 1e-6));

        // The bend closes the first quad and opens the second.
        assert!(slots[2].position().abs_diff_eq(bend - right, 1e-5));
        assert!(slots[3].position().abs_diff_eq(bend + right, 1e-5));
        assert!(slots[4].position().abs_diff_eq(bend - right, 1e-5));
        assert!(slots[5].position().abs_diff_eq(bend + right, 1e-5));
    }

    #[test]
    fn test_ribbon_axis_z_ignores_horizontal_offset() {
        let mut buffer = ParticleBuffer::new(1, 1);
        buffer.spawn(
            0,
            &[Trail::new(Vec3::ZERO, 2.0), Trail::new(Vec3::new(4.0, 0.0, 0.0), 2.0)],
        );
        let particle = buffer.particle(0).unwrap();
        let mut emitter = QuadEmitter::new(2);

        let mut near = zeroed(4);
        let ctx = FrameContext {
            view: ViewTransform::new(Vec3::new(2.0, 0.0, 10.0), Mat3::IDENTITY),
            ..Default::default()
        };
        let mut writer = VertexWriter::new(BufferKind::Vertex, &mut near);
        emitter
            .emit_ribbon(&mut writer, particle, 1, true, &ctx)
            .unwrap();

        let mut far = zeroed(4);
        let ctx = FrameContext {
            view: ViewTransform::new(Vec3::new(2.0, -30.0, 10.0), Mat3::IDENTITY),
            ..Default::default()
        };
        let mut writer = VertexWriter::new(BufferKind::Vertex, &mut far);
        emitter
            .emit_ribbon(&mut writer, particle, 1, true, &ctx)
            .unwrap();

        assert_eq!(near, far);
    }

    #[test]
    fn test_ribbon_right_vector_in_entity_space() {
        let mut buffer = ParticleBuffer::new(1, 1);
        buffer.spawn(
            0,
            &[Trail::new(Vec3::ZERO, 2.0), Trail::new(Vec3::new(4.0, 0.0, 0.0), 2.0)],
        );
        let ctx = FrameContext {
            entity: EntityTransform::new(
                Vec3::ZERO,
                Mat3::from_rotation_z(std::f32::consts::FRAC_PI_2),
            ),
            view: ViewTransform::new(Vec3::new(0.0, 2.0, 10.0), Mat3::IDENTITY),
            ..Default::default()
        };
        let mut emitter = QuadEmitter::new(2);
        let mut slots = zeroed(4);
        let mut writer = VertexWriter::new(BufferKind::Vertex, &mut slots);
        emitter
            .emit_ribbon(&mut writer, buffer.particle(0).unwrap(), 1, false, &ctx)
            .unwrap();

        // World trail runs along +Y, world right is Z x Y = -X, which is local +Y.
        assert!(slots[1].position().abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
    }

    #[test]
    fn test_truncated_particle_rejected() {
        let mut buffer = ParticleBuffer::new(1, 0);
        buffer.spawn(0, &[Trail::default()]);
        let mut emitter = QuadEmitter::new(3);
        let mut slots = zeroed(8);
        let mut writer = VertexWriter::new(BufferKind::Vertex, &mut slots);
        let err = emitter
            .emit_ribbon(&mut writer, buffer.particle(0).unwrap(), 2, false, &context(Vec3::X))
            .unwrap_err();
        assert!(matches!(err, MeshError::TruncatedParticle { needed: 3, available: 1 }));
    }

    #[test]
    fn test_ribbon_without_trails_emits_nothing() {
        let mut buffer = ParticleBuffer::new(1, 0);
        buffer.spawn(0, &[Trail::default()]);
        let mut emitter = QuadEmitter::new(1);
        let mut slots = zeroed(0);
        let mut writer = VertexWriter::new(BufferKind::Vertex, &mut slots);
        emitter
            .emit_ribbon(&mut writer, buffer.particle(0).unwrap(), 0, false, &context(Vec3::X))
            .unwrap();
        assert_eq!(writer.written(), 0);
    }
}
