//! Vertex input descriptions for pipeline creation

use ash::vk;

/// A vertex type that can feed a graphics pipeline from binding 0
pub trait VertexInput: Sized {
    /// Per-vertex binding 0 with this type's stride
    fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute locations, formats and offsets within the vertex
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription>;
}

/// Attribute at `location` of binding 0
pub fn attribute(location: u32, format: vk::Format, offset: u32) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        binding: 0,
        location,
        format,
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct PositionColor {
        position: [f32; 3],
        color: [f32; 4],
    }

    impl VertexInput for PositionColor {
        fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
            vec![
                attribute(0, vk::Format::R32G32B32_SFLOAT, 0),
                attribute(1, vk::Format::R32G32B32A32_SFLOAT, 12),
            ]
        }
    }

    #[test]
    fn test_binding_stride_matches_type() {
        let binding = PositionColor::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 28);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_attributes_use_binding_zero() {
        let attributes = PositionColor::attribute_descriptions();
        assert!(attributes.iter().all(|a| a.binding == 0));
        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].offset, 12);
    }
}
