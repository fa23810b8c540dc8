//! Per-call scene context for a mesh build.
//!
//! The builder holds no global state: the emitting entity's transform, the
//! viewer and the default material all arrive through [`FrameContext`].

use glam::{Mat3, Vec3};

use crate::surface::MaterialHandle;

/// Placement of the entity that owns the particle system.
///
/// `axis` columns are the entity's forward, left and up vectors in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityTransform {
    /// World-space origin.
    pub origin: Vec3,
    /// Rotation from local to world space.
    pub axis: Mat3,
    /// Non-uniform scale applied before `axis`.
    pub scale: Vec3,
}

impl Default for EntityTransform {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            axis: Mat3::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl EntityTransform {
    /// Entity at `origin` with the given rotation and unit scale.
    pub fn new(origin: Vec3, axis: Mat3) -> Self {
        Self {
            origin,
            axis,
            scale: Vec3::ONE,
        }
    }

    /// Map a local-space point to world space.
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.origin + self.axis * (local * self.scale)
    }

    /// Rotate a world-space direction into local space.
    pub fn direction_to_local(&self, world: Vec3) -> Vec3 {
        self.axis.transpose() * world
    }
}

/// The camera the mesh is built for.
///
/// `axis` columns are the view's forward, left and up vectors in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    /// World-space eye position.
    pub origin: Vec3,
    /// View orientation.
    pub axis: Mat3,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            axis: Mat3::IDENTITY,
        }
    }
}

impl ViewTransform {
    /// Camera at `origin` with the given orientation.
    pub fn new(origin: Vec3, axis: Mat3) -> Self {
        Self { origin, axis }
    }

    /// Camera at `eye` looking at `target` with world Z up.
    ///
    /// Returns `None` if `eye == target` or the view direction is vertical.
    pub fn looking_at(eye: Vec3, target: Vec3) -> Option<Self> {
        let forward = (target - eye).try_normalize()?;
        let left = Vec3::Z.cross(forward).try_normalize()?;
        let up = forward.cross(left);
        Some(Self::new(eye, Mat3::from_cols(forward, left, up)))
    }

    /// Forward vector.
    pub fn forward(&self) -> Vec3 {
        self.axis.x_axis
    }

    /// Left vector.
    pub fn left(&self) -> Vec3 {
        self.axis.y_axis
    }

    /// Up vector.
    pub fn up(&self) -> Vec3 {
        self.axis.z_axis
    }
}

/// Everything a build needs besides the simulation output.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameContext {
    /// Entity owning the particle system.
    pub entity: EntityTransform,
    /// Camera being rendered.
    pub view: ViewTransform,
    /// Material of the first surface before any stage assigns one.
    pub default_material: MaterialHandle,
}

impl FrameContext {
    /// Context for `entity` seen from `view`.
    pub fn new(
        entity: EntityTransform,
        view: ViewTransform,
        default_material: MaterialHandle,
    ) -> Self {
        Self {
            entity,
            view,
            default_material,
        }
    }
}
