//! Geometry and camera of the demo scene.

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Rotation speed of the model around Z.
pub const DEGREES_PER_SECOND: f32 = 90.0;

/// Camera position.
pub const EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);

/// Vertical field of view.
pub const FOV_Y_DEGREES: f32 = 45.0;

pub const NEAR: f32 = 0.1;
pub const FAR: f32 = 10.0;

/// A vertex with position and color.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
}

impl Vertex {
    const fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self {
            position: Vec3::from_array(position),
            color: Vec3::from_array(color),
        }
    }

    /// The single interleaved vertex buffer binding.
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)]
    }

    /// Position at location 0, color at location 1.
    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Self, position) as u32),
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Self, color) as u32),
        ]
    }
}

/// Two stacked quads, the lower one half a unit below the other.
pub const VERTICES: [Vertex; 8] = [
    Vertex::new([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0]),
    Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0]),
    Vertex::new([0.5, 0.5, 0.0], [0.0, 0.0, 1.0]),
    Vertex::new([-0.5, 0.5, 0.0], [1.0, 1.0, 1.0]),
    Vertex::new([-0.5, -0.5, -0.5], [1.0, 0.0, 0.0]),
    Vertex::new([0.5, -0.5, -0.5], [0.0, 1.0, 0.0]),
    Vertex::new([0.5, 0.5, -0.5], [0.0, 0.0, 1.0]),
    Vertex::new([-0.5, 0.5, -0.5], [1.0, 1.0, 1.0]),
];

pub const INDICES: [u16; 12] = [0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4];

/// Per-image uniform data read by the vertex shader at binding 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Transforms {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl Transforms {
    /// Transforms `elapsed` seconds after start for a target of `extent`.
    pub fn at(elapsed: f32, extent: vk::Extent2D) -> Self {
        let model = Mat4::from_rotation_z((elapsed * DEGREES_PER_SECOND).to_radians());
        let view = Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Z);

        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let mut projection =
            Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, NEAR, FAR);
        // Clip space Y points down
        projection.y_axis.y *= -1.0;

        Self {
            model,
            view,
            projection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn vertex_layout_matches_attributes() {
        assert_eq!(size_of::<Vertex>(), 24);

        let bindings = Vertex::binding_descriptions();
        assert_eq!(bindings[0].stride, 24);

        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[1].location, 1);
    }

    #[test]
    fn indices_reference_existing_vertices() {
        assert!(INDICES.iter().all(|&i| (i as usize) < VERTICES.len()));
        assert_eq!(INDICES.len() % 3, 0);
    }

    #[test]
    fn transforms_are_std140_sized() {
        assert_eq!(size_of::<Transforms>(), 3 * 64);
    }

    #[test]
    fn model_rotates_a_quarter_turn_per_second() {
        let transforms = Transforms::at(1.0, extent(800, 600));
        let rotated = transforms.model.transform_point3(Vec3::X);
        assert_relative_eq!(rotated.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(rotated.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(rotated.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn model_is_identity_at_start() {
        let transforms = Transforms::at(0.0, extent(800, 600));
        assert_eq!(transforms.model, Mat4::IDENTITY);
    }

    #[test]
    fn view_puts_origin_in_front_of_camera() {
        let transforms = Transforms::at(0.0, extent(800, 600));
        let origin = transforms.view.transform_point3(Vec3::ZERO);
        assert_relative_eq!(origin.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(origin.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(origin.z, -EYE.length(), epsilon = 1e-5);
    }

    #[test]
    fn projection_flips_y_and_uses_aspect() {
        let transforms = Transforms::at(0.0, extent(800, 400));
        let projection = transforms.projection;
        assert!(projection.y_axis.y < 0.0);
        assert_relative_eq!(
            projection.x_axis.x * 2.0,
            -projection.y_axis.y,
            epsilon = 1e-5
        );
    }

    #[test]
    fn upward_point_lands_in_upper_half_of_framebuffer() {
        // Vulkan framebuffer Y grows downward, so "up" must map to negative Y.
        let transforms = Transforms::at(0.0, extent(800, 600));
        let clip = transforms.projection * Vec4::new(0.0, 1.0, -5.0, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn zero_height_does_not_divide_by_zero() {
        let transforms = Transforms::at(0.0, extent(800, 0));
        assert!(transforms.projection.x_axis.x.is_finite());
    }
}
