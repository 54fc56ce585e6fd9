//! Quad geometry and the shader parameters that bind it

use ash::vk;
use bytemuck::{Pod, Zeroable};
use vulkan_rhi::vulkan::vertex_layout::attribute;
use vulkan_rhi::vulkan::{
    BindingTable, BoundResource, BoundTexture, PerImage, ShaderParameters, UniformBuffer, VertexInput, VulkanResult,
};

use crate::ubo::{Tint, Transform};

/// Position, vertex color and texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl VertexInput for Vertex {
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            attribute(0, vk::Format::R32G32_SFLOAT, 0),
            attribute(1, vk::Format::R32G32B32_SFLOAT, 8),
            attribute(2, vk::Format::R32G32_SFLOAT, 20),
        ]
    }
}

/// Unit quad in the XY plane, one colored corner each
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex {
        position: [-0.5, -0.5],
        color: [1.0, 0.0, 0.0],
        tex_coord: [1.0, 0.0],
    },
    Vertex {
        position: [0.5, -0.5],
        color: [0.0, 1.0, 0.0],
        tex_coord: [0.0, 0.0],
    },
    Vertex {
        position: [0.5, 0.5],
        color: [0.0, 0.0, 1.0],
        tex_coord: [0.0, 1.0],
    },
    Vertex {
        position: [-0.5, 0.5],
        color: [1.0, 1.0, 1.0],
        tex_coord: [1.0, 1.0],
    },
];

/// Two counter-clockwise triangles
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Everything the quad shaders read, per swapchain image
pub struct QuadParameters<'a> {
    pub transforms: &'a PerImage<UniformBuffer<Transform>>,
    pub texture: &'a BoundTexture,
    pub tints: &'a PerImage<UniformBuffer<Tint>>,
}

impl ShaderParameters for QuadParameters<'_> {
    fn bindings() -> BindingTable {
        BindingTable::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
            .uniform_buffer(2, vk::ShaderStageFlags::FRAGMENT)
    }

    fn resources_for_image(&self, image_index: u32) -> VulkanResult<Vec<BoundResource>> {
        Ok(vec![
            BoundResource::Buffer(self.transforms.get(image_index)?.descriptor_info()),
            BoundResource::Image(self.texture.image_info()?),
            BoundResource::Buffer(self.tints.get(image_index)?.descriptor_info()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_stride_and_offsets() {
        assert_eq!(Vertex::binding_description().stride, 28);

        let attributes = Vertex::attribute_descriptions();
        let vertex = QUAD_VERTICES[0];
        let base = &vertex as *const Vertex as usize;
        assert_eq!(attributes[0].offset as usize, &vertex.position as *const _ as usize - base);
        assert_eq!(attributes[1].offset as usize, &vertex.color as *const _ as usize - base);
        assert_eq!(attributes[2].offset as usize, &vertex.tex_coord as *const _ as usize - base);
    }

    #[test]
    fn test_indices_reference_quad_vertices() {
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
    }

    #[test]
    fn test_triangles_wind_counter_clockwise() {
        for triangle in QUAD_INDICES.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|k| QUAD_VERTICES[triangle[k] as usize].position);
            let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
            assert!(cross > 0.0);
        }
    }

    #[test]
    fn test_binding_table_slots() {
        let table = QuadParameters::bindings();
        let slots: Vec<u32> = table.bindings().iter().map(|b| b.slot).collect();
        assert_eq!(slots, vec![0, 1, 2]);

        let sizes = table.pool_sizes(3);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 6);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 3);
    }
}
