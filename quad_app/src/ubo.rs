//! Uniform data for the quad shaders

use std::f32::consts::FRAC_PI_2;

use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Point3, Rotation3, Vector3};

const FOV_Y: f32 = std::f32::consts::FRAC_PI_4;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 10.0;

/// Model, view and projection matrices, column-major (binding 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Transform {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl Transform {
    /// Quad spun about +Z by 90 degrees per second, seen from (2, 2, 2)
    pub fn at_time(seconds: f32, aspect: f32) -> Self {
        let model = Rotation3::from_axis_angle(&Vector3::z_axis(), seconds * FRAC_PI_2).to_homogeneous();
        let view = Matrix4::look_at_rh(&Point3::new(2.0, 2.0, 2.0), &Point3::origin(), &Vector3::z());

        let mut proj = Matrix4::new_perspective(aspect, FOV_Y, Z_NEAR, Z_FAR);
        // Vulkan clip space has Y pointing down
        proj[(1, 1)] *= -1.0;

        Self {
            model: model.into(),
            view: view.into(),
            proj: proj.into(),
        }
    }
}

/// Color multiplied into the fragment output (binding 2)
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Tint {
    pub color: [f32; 4],
}

impl Default for Tint {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    #[test]
    fn test_layout_matches_std140() {
        assert_eq!(std::mem::size_of::<Transform>(), 192);
        assert_eq!(std::mem::size_of::<Tint>(), 16);
    }

    #[test]
    fn test_model_identity_at_start() {
        let transform = Transform::at_time(0.0, 1.0);
        assert_relative_eq!(Matrix4::from(transform.model), Matrix4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn test_model_quarter_turn_after_one_second() {
        let model = Matrix4::from(Transform::at_time(1.0, 1.0).model);
        let rotated = model * Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(rotated, Vector4::new(0.0, 1.0, 0.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_view_moves_eye_to_origin() {
        let view = Matrix4::from(Transform::at_time(0.0, 1.0).view);
        let eye = view * Vector4::new(2.0, 2.0, 2.0, 1.0);
        assert_relative_eq!(eye, Vector4::new(0.0, 0.0, 0.0, 1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_projection_flips_y() {
        let proj = Matrix4::from(Transform::at_time(0.0, 4.0 / 3.0).proj);
        assert!(proj[(1, 1)] < 0.0);
        assert_relative_eq!(proj[(0, 0)] * 4.0 / 3.0, -proj[(1, 1)], epsilon = 1e-5);
    }
}
