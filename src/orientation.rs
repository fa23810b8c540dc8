//! Billboard axis frames.
//!
//! Billboard orientations use one axis frame per stage. The frame is chosen
//! in world space (forward, left, up) and then rotated into the entity's
//! local space, where trail positions live.
//!
//! | Mode | forward | left | up |
//! |------|---------|------|----|
//! | `View` | -view forward | -view left | view up |
//! | `ViewAxisZ` | cross(-view left, Z) | -view left | Z |
//! | `AxisX` | X | Y | Z |
//! | `AxisY` | Y | -X | Z |
//! | `AxisZ` | Z | Y | -X |

use glam::{Mat3, Vec3};

use crate::error::MeshError;
use crate::particle::Orientation;

/// Compute the local-space (forward, left, up) frame for a billboard mode.
///
/// `model_axis` and `view_axis` hold forward, left and up as columns.
/// Aimed modes build their frames per pivot and are rejected here.
pub fn resolve_local_axes(
    orientation: Orientation,
    model_axis: &Mat3,
    view_axis: &Mat3,
) -> Result<Mat3, MeshError> {
    let world_axis = match orientation {
        Orientation::View => {
            Mat3::from_cols(-view_axis.x_axis, -view_axis.y_axis, view_axis.z_axis)
        }
        Orientation::ViewAxisZ => {
            let left = -view_axis.y_axis;
            Mat3::from_cols(left.cross(Vec3::Z), left, Vec3::Z)
        }
        Orientation::AxisX => Mat3::from_cols(Vec3::X, Vec3::Y, Vec3::Z),
        Orientation::AxisY => Mat3::from_cols(Vec3::Y, -Vec3::X, Vec3::Z),
        Orientation::AxisZ => Mat3::from_cols(Vec3::Z, Vec3::Y, -Vec3::X),
        Orientation::Aimed | Orientation::AimedAxisZ => {
            return Err(MeshError::UnsupportedOrientation(orientation))
        }
    };

    Ok(model_axis.transpose() * world_axis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: &Mat3, b: &Mat3) -> bool {
        a.abs_diff_eq(*b, 1e-6)
    }

    #[test]
    fn test_fixed_axes_ignore_view() {
        let view_a = Mat3::IDENTITY;
        let view_b = Mat3::from_rotation_z(1.2) * Mat3::from_rotation_y(0.4);
        for mode in [Orientation::AxisX, Orientation::AxisY, Orientation::AxisZ] {
            let a = resolve_local_axes(mode, &Mat3::IDENTITY, &view_a).unwrap();
            let b = resolve_local_axes(mode, &Mat3::IDENTITY, &view_b).unwrap();
            assert!(approx(&a, &b), "{mode:?} should not depend on the view");
        }
    }

    #[test]
    fn test_axis_table() {
        let identity = Mat3::IDENTITY;
        let y = resolve_local_axes(Orientation::AxisY, &identity, &identity).unwrap();
        assert_eq!(y, Mat3::from_cols(Vec3::Y, -Vec3::X, Vec3::Z));
        let z = resolve_local_axes(Orientation::AxisZ, &identity, &identity).unwrap();
        assert_eq!(z, Mat3::from_cols(Vec3::Z, Vec3::Y, -Vec3::X));
    }

    #[test]
    fn test_view_faces_camera() {
        let view = Mat3::from_rotation_z(0.5);
        let axes = resolve_local_axes(Orientation::View, &Mat3::IDENTITY, &view).unwrap();
        assert!(axes.x_axis.abs_diff_eq(-view.x_axis, 1e-6));
        assert!(axes.y_axis.abs_diff_eq(-view.y_axis, 1e-6));
        assert!(axes.z_axis.abs_diff_eq(view.z_axis, 1e-6));
    }

    #[test]
    fn test_view_axis_z_stays_upright() {
        // Camera pitched down: up must still be world Z.
        let view = Mat3::from_rotation_z(0.3) * Mat3::from_rotation_y(0.8);
        let axes = resolve_local_axes(Orientation::ViewAxisZ, &Mat3::IDENTITY, &view).unwrap();
        assert_eq!(axes.z_axis, Vec3::Z);
        assert!(axes.y_axis.abs_diff_eq(-view.y_axis, 1e-6));
        let left = -view.y_axis;
        assert!(axes.x_axis.abs_diff_eq(Vec3::new(left.y, -left.x, 0.0), 1e-6));
    }

    #[test]
    fn test_result_is_in_entity_space() {
        let model = Mat3::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let axes = resolve_local_axes(Orientation::AxisX, &model, &Mat3::IDENTITY).unwrap();
        // World X seen from an entity rotated +90 degrees about Z is local -Y.
        assert!(axes.x_axis.abs_diff_eq(-Vec3::Y, 1e-6));
        assert!(approx(&(model * axes), &Mat3::IDENTITY));
    }

    #[test]
    fn test_aimed_modes_rejected() {
        for mode in [Orientation::Aimed, Orientation::AimedAxisZ] {
            let err = resolve_local_axes(mode, &Mat3::IDENTITY, &Mat3::IDENTITY).unwrap_err();
            assert!(matches!(err, MeshError::UnsupportedOrientation(m) if m == mode));
        }
    }
}
