//! Simulation output consumed by the mesh builder.
//!
//! The simulation owns particle lifetimes and trail history; this module only
//! describes the records it hands over each frame:
//!
//! - [`Trail`] - one pivot of a particle's history (`trails[0]` is the live particle)
//! - [`ParticleBuffer`] - a stage's particle records with a stride of `trail_count + 1` pivots
//! - [`Stage`] - per-emitter render settings (orientation, trails, material)

use glam::{Vec3, Vec4};

use crate::error::MeshError;
use crate::surface::MaterialHandle;

/// How a stage's quads are oriented.
///
/// Billboard modes build every quad from a fixed axis frame; aimed modes
/// build ribbons that follow the trail and turn toward the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Orientation {
    /// Face the camera.
    #[default]
    View,
    /// Face the camera while staying upright around world Z.
    ViewAxisZ,
    /// Fixed plane facing world X.
    AxisX,
    /// Fixed plane facing world Y.
    AxisY,
    /// Fixed plane facing world Z.
    AxisZ,
    /// Ribbon along the trail, turned toward the camera.
    Aimed,
    /// Ribbon along the trail, turned toward the camera around world Z only.
    AimedAxisZ,
}

impl Orientation {
    /// Whether this mode builds trail ribbons instead of billboards.
    pub fn is_aimed(&self) -> bool {
        matches!(self, Orientation::Aimed | Orientation::AimedAxisZ)
    }
}

impl TryFrom<u32> for Orientation {
    type Error = MeshError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Orientation::View),
            1 => Ok(Orientation::ViewAxisZ),
            2 => Ok(Orientation::AxisX),
            3 => Ok(Orientation::AxisY),
            4 => Ok(Orientation::AxisZ),
            5 => Ok(Orientation::Aimed),
            6 => Ok(Orientation::AimedAxisZ),
            other => Err(MeshError::InvalidOrientation(other)),
        }
    }
}

/// Pack a linear RGBA color (components 0.0-1.0) into a `u32` with red in the low byte.
pub fn pack_rgba(color: Vec4) -> u32 {
    let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    (c.x as u32) | ((c.y as u32) << 8) | ((c.z as u32) << 16) | ((c.w as u32) << 24)
}

/// One pivot of a particle's history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trail {
    /// Position in the emitting entity's local space.
    pub position: Vec3,
    /// Quad height (billboards) or ribbon width (aimed).
    pub size: f32,
    /// Rotation about the quad's forward axis, in degrees.
    pub angle: f32,
    /// Width over height for billboards.
    pub aspect_ratio: f32,
    /// Packed RGBA, see [`pack_rgba`].
    pub color: u32,
}

impl Default for Trail {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            size: 1.0,
            angle: 0.0,
            aspect_ratio: 1.0,
            color: u32::MAX,
        }
    }
}

impl Trail {
    /// Create a pivot at `position` with the given size and default rotation/aspect.
    pub fn new(position: Vec3, size: f32) -> Self {
        Self {
            position,
            size,
            ..Default::default()
        }
    }

    /// Set the packed color.
    pub fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    /// Set the rotation about the forward axis, in degrees.
    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    /// Set the width-over-height ratio.
    pub fn with_aspect_ratio(mut self, aspect_ratio: f32) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }
}

/// Read-only view of one particle record.
#[derive(Debug, Clone, Copy)]
pub struct ParticleRef<'a> {
    /// Whether the particle is rendered this frame.
    pub alive: bool,
    /// Pivot chain; `trails[0]` is the live particle.
    pub trails: &'a [Trail],
}

impl ParticleRef<'_> {
    /// Packed color of the live particle, used for every quad it emits.
    pub fn color(&self) -> u32 {
        self.trails.first().map_or(u32::MAX, |t| t.color)
    }
}

/// Mutable view of one particle record.
#[derive(Debug)]
pub struct ParticleMut<'a> {
    /// Whether the particle is rendered this frame.
    pub alive: &'a mut bool,
    /// Pivot chain; `trails[0]` is the live particle.
    pub trails: &'a mut [Trail],
}

/// A stage's particle records.
///
/// Records are stored flat with a stride of `trail_count + 1` pivots, so
/// particle `i` owns `trails[i * stride..(i + 1) * stride]`.
#[derive(Debug, Clone, Default)]
pub struct ParticleBuffer {
    trail_count: usize,
    alive: Vec<bool>,
    trails: Vec<Trail>,
}

impl ParticleBuffer {
    /// Create `particle_count` dead particles with `trail_count` trail pivots each.
    pub fn new(particle_count: usize, trail_count: usize) -> Self {
        Self {
            trail_count,
            alive: vec![false; particle_count],
            trails: vec![Trail::default(); particle_count * (trail_count + 1)],
        }
    }

    /// Pivots stored per particle.
    pub fn stride(&self) -> usize {
        self.trail_count + 1
    }

    /// Trail pivots stored per particle, not counting the live one.
    pub fn trail_count(&self) -> usize {
        self.trail_count
    }

    /// Number of particle records.
    pub fn len(&self) -> usize {
        self.alive.len()
    }

    /// Whether the buffer holds no records.
    pub fn is_empty(&self) -> bool {
        self.alive.is_empty()
    }

    /// Number of records flagged alive.
    pub fn live_count(&self) -> usize {
        self.alive.iter().filter(|&&a| a).count()
    }

    /// Read particle `index`, or `None` if out of range.
    pub fn particle(&self, index: usize) -> Option<ParticleRef<'_>> {
        let alive = *self.alive.get(index)?;
        let stride = self.stride();
        let trails = self.trails.get(index * stride..(index + 1) * stride)?;
        Some(ParticleRef { alive, trails })
    }

    /// Mutably access particle `index`, or `None` if out of range.
    pub fn particle_mut(&mut self, index: usize) -> Option<ParticleMut<'_>> {
        let stride = self.stride();
        let alive = self.alive.get_mut(index)?;
        let trails = self.trails.get_mut(index * stride..(index + 1) * stride)?;
        Some(ParticleMut { alive, trails })
    }

    /// Replace particle `index` with the given pivots and mark it alive.
    ///
    /// Extra pivots are ignored; missing ones keep their previous values.
    /// Returns `false` if `index` is out of range.
    pub fn spawn(&mut self, index: usize, pivots: &[Trail]) -> bool {
        match self.particle_mut(index) {
            Some(p) => {
                *p.alive = true;
                for (slot, pivot) in p.trails.iter_mut().zip(pivots) {
                    *slot = *pivot;
                }
                true
            }
            None => false,
        }
    }

    /// Mark particle `index` dead. Returns `false` if out of range.
    pub fn kill(&mut self, index: usize) -> bool {
        match self.alive.get_mut(index) {
            Some(alive) => {
                *alive = false;
                true
            }
            None => false,
        }
    }

    /// Iterate the first `count` records (clamped to the buffer length).
    pub fn iter(&self, count: usize) -> impl Iterator<Item = ParticleRef<'_>> {
        let stride = self.stride();
        self.alive
            .iter()
            .zip(self.trails.chunks_exact(stride))
            .take(count)
            .map(|(&alive, trails)| ParticleRef { alive, trails })
    }
}

/// Render settings of one emitter pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    /// Particle records the stage owns in its buffer.
    pub particle_count: usize,
    /// Quad orientation mode.
    pub orientation: Orientation,
    /// Whether the trail module is active.
    pub trails_enabled: bool,
    /// Trail segments when the trail module is active.
    pub trail_count: usize,
    /// Material every quad of the stage is drawn with.
    pub material: MaterialHandle,
    /// Skip the stage entirely.
    pub skip_render: bool,
}

impl Stage {
    /// Create a stage with no trails.
    pub fn new(particle_count: usize, orientation: Orientation, material: MaterialHandle) -> Self {
        Self {
            particle_count,
            orientation,
            trails_enabled: false,
            trail_count: 0,
            material,
            skip_render: false,
        }
    }

    /// Enable the trail module with `count` segments.
    pub fn with_trails(mut self, count: usize) -> Self {
        self.trails_enabled = true;
        self.trail_count = count;
        self
    }

    /// Set whether the stage is skipped.
    pub fn with_skip_render(mut self, skip: bool) -> Self {
        self.skip_render = skip;
        self
    }

    /// Trail segments in effect: `trail_count` if trails are enabled, else 0.
    pub fn effective_trail_count(&self) -> usize {
        if self.trails_enabled {
            self.trail_count
        } else {
            0
        }
    }

    /// Quads one live particle contributes.
    ///
    /// Ribbons have one quad per segment, billboards one per pivot.
    pub fn quads_per_particle(&self) -> usize {
        let trails = self.effective_trail_count();
        if self.orientation.is_aimed() {
            trails
        } else {
            1 + trails
        }
    }

    /// Vertices the stage emits for the given records.
    pub fn count_vertices(&self, particles: &ParticleBuffer) -> usize {
        let live = particles
            .iter(self.particle_count)
            .filter(|p| p.alive)
            .count();
        live * 4 * self.quads_per_particle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_from_raw() {
        assert_eq!(Orientation::try_from(0).unwrap(), Orientation::View);
        assert_eq!(Orientation::try_from(6).unwrap(), Orientation::AimedAxisZ);
        assert!(matches!(
            Orientation::try_from(7),
            Err(MeshError::InvalidOrientation(7))
        ));
    }

    #[test]
    fn test_pack_rgba() {
        assert_eq!(pack_rgba(Vec4::new(1.0, 0.0, 0.0, 1.0)), 0xFF00_00FF);
        assert_eq!(pack_rgba(Vec4::ONE), u32::MAX);
        assert_eq!(pack_rgba(Vec4::new(2.0, -1.0, 0.0, 0.0)), 0x0000_00FF);
    }

    #[test]
    fn test_buffer_stride_and_access() {
        let mut buffer = ParticleBuffer::new(3, 2);
        assert_eq!(buffer.stride(), 3);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.live_count(), 0);

        let pivots = [
            Trail::new(Vec3::X, 1.0),
            Trail::new(Vec3::Y, 2.0),
            Trail::new(Vec3::Z, 3.0),
        ];
        assert!(buffer.spawn(1, &pivots));
        assert!(!buffer.spawn(3, &pivots));

        let p = buffer.particle(1).unwrap();
        assert!(p.alive);
        assert_eq!(p.trails.len(), 3);
        assert_eq!(p.trails[2].position, Vec3::Z);
        assert!(buffer.particle(3).is_none());
        assert_eq!(buffer.live_count(), 1);

        assert!(buffer.kill(1));
        assert_eq!(buffer.live_count(), 0);
    }

    #[test]
    fn test_iter_clamps_to_declared_count() {
        let mut buffer = ParticleBuffer::new(4, 0);
        for i in 0..4 {
            buffer.spawn(i, &[Trail::default()]);
        }
        assert_eq!(buffer.iter(2).count(), 2);
        assert_eq!(buffer.iter(10).count(), 4);
    }

    #[test]
    fn test_quads_per_particle() {
        let material = MaterialHandle::new(1);
        let billboard = Stage::new(1, Orientation::View, material).with_trails(3);
        assert_eq!(billboard.quads_per_particle(), 4);

        let ribbon = Stage::new(1, Orientation::Aimed, material).with_trails(3);
        assert_eq!(ribbon.quads_per_particle(), 3);

        let mut disabled = ribbon;
        disabled.trails_enabled = false;
        assert_eq!(disabled.effective_trail_count(), 0);
        assert_eq!(disabled.quads_per_particle(), 0);
    }

    #[test]
    fn test_count_vertices_only_live() {
        let material = MaterialHandle::new(1);
        let stage = Stage::new(3, Orientation::AxisX, material).with_trails(1);
        let mut buffer = ParticleBuffer::new(3, 1);
        buffer.spawn(0, &[Trail::default(); 2]);
        buffer.spawn(2, &[Trail::default(); 2]);
        assert_eq!(stage.count_vertices(&buffer), 2 * 4 * 2);
    }
}
