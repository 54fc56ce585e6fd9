//! Textures, samplers and image layout transitions
//!
//! A [`Texture`] tracks its current layout. Only two transitions are
//! legal, both part of the upload path:
//!
//! ```text
//! UNDEFINED -> TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL
//! ```
//!
//! Anything else is rejected before a barrier is recorded.

use std::path::Path;

use ash::{vk, Device};

use crate::assets::ImageData;
use crate::vulkan::buffer::{find_memory_type, StagingBuffer};
use crate::vulkan::commands::ExecuteDirectly;
use crate::vulkan::context::VulkanContext;
use crate::vulkan::{VulkanError, VulkanResult};

/// Format used for decoded color textures
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Access and stage masks for one layout transition barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier masks for `old -> new`, or `UnsupportedTransition`
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<LayoutTransition> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(LayoutTransition {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok(LayoutTransition {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        }),
        _ => Err(VulkanError::UnsupportedTransition { old, new }),
    }
}

/// Bytes per texel for the 8-bit four-channel formats
pub fn bytes_per_texel(format: vk::Format) -> Option<u64> {
    match format {
        vk::Format::R8G8B8A8_SRGB
        | vk::Format::R8G8B8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM => Some(4),
        _ => None,
    }
}

/// Sampled 2D image with its memory and view
pub struct Texture {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    width: u32,
    height: u32,
    format: vk::Format,
    layout: vk::ImageLayout,
}

impl Texture {
    /// Device-local, optimally tiled image usable as transfer destination
    /// and sampled source. Starts in `UNDEFINED` layout.
    pub fn new(context: &VulkanContext, width: u32, height: u32, format: vk::Format) -> VulkanResult<Self> {
        if width == 0 || height == 0 {
            return Err(VulkanError::invalid(format!("texture size {}x{} is empty", width, height)));
        }

        let device = context.raw_device();
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D { width, height, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe { device.create_image(&image_info, None) }.map_err(VulkanError::Api)?;

        let memory = match Self::allocate_and_bind(&device, context.memory_properties(), image) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = match create_image_view(&device, image, format) {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                return Err(e);
            }
        };

        log::debug!("Created texture {}x{} ({:?})", width, height, format);

        Ok(Self {
            device,
            image,
            memory,
            view,
            width,
            height,
            format,
            layout: vk::ImageLayout::UNDEFINED,
        })
    }

    fn allocate_and_bind(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        image: vk::Image,
    ) -> VulkanResult<vk::DeviceMemory> {
        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type = find_memory_type(
            memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = unsafe { device.allocate_memory(&alloc_info, None) }.map_err(VulkanError::Api)?;

        if let Err(e) = unsafe { device.bind_image_memory(image, memory, 0) } {
            unsafe { device.free_memory(memory, None) };
            return Err(VulkanError::Api(e));
        }

        log::debug!("Allocated {} bytes of image memory, type {}", requirements.size, memory_type);
        Ok(memory)
    }

    /// Move the image to `new_layout` with a one-shot barrier
    pub fn transition_layout(&mut self, executor: &impl ExecuteDirectly, new_layout: vk::ImageLayout) -> VulkanResult<()> {
        let transition = transition_masks(self.layout, new_layout)?;
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(self.layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(color_subresource_range())
            .src_access_mask(transition.src_access)
            .dst_access_mask(transition.dst_access)
            .build();

        executor.execute_directly(|recorder| {
            recorder.cmd_image_barrier(transition.src_stage, transition.dst_stage, &[barrier])
        })?;

        log::debug!("Texture layout {:?} -> {:?}", self.layout, new_layout);
        self.layout = new_layout;
        Ok(())
    }

    /// Copy staged texels into the whole image. Requires `TRANSFER_DST_OPTIMAL`.
    pub fn copy_from_staging(&self, executor: &impl ExecuteDirectly, staging: &StagingBuffer) -> VulkanResult<()> {
        if self.layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
            return Err(VulkanError::invalid(format!(
                "texture must be in TRANSFER_DST_OPTIMAL to receive a copy, not {:?}",
                self.layout
            )));
        }
        if let Some(texel_size) = bytes_per_texel(self.format) {
            let needed = self.width as u64 * self.height as u64 * texel_size;
            if staging.size() < needed {
                return Err(VulkanError::invalid(format!(
                    "staging buffer holds {} bytes, texture needs {}",
                    staging.size(),
                    needed
                )));
            }
        }

        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: self.width,
                height: self.height,
                depth: 1,
            })
            .build();

        executor.execute_directly(|recorder| {
            recorder.cmd_copy_buffer_to_image(staging.handle(), self.image, self.layout, &[region])
        })
    }

    /// Image handle
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Image view handle
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Current layout
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// Texel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Width and height in texels
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn create_image_view(device: &Device, image: vk::Image, format: vk::Format) -> VulkanResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(color_subresource_range());

    unsafe { device.create_image_view(&view_info, None) }.map_err(VulkanError::Api)
}

/// Filtering and addressing of a sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct SamplerDesc {
    pub min_filter: vk::Filter,
    pub mag_filter: vk::Filter,
    pub address_u: vk::SamplerAddressMode,
    pub address_v: vk::SamplerAddressMode,
    pub address_w: vk::SamplerAddressMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: vk::Filter::LINEAR,
            mag_filter: vk::Filter::LINEAR,
            address_u: vk::SamplerAddressMode::REPEAT,
            address_v: vk::SamplerAddressMode::REPEAT,
            address_w: vk::SamplerAddressMode::REPEAT,
        }
    }
}

impl SamplerDesc {
    /// Same address mode on all three axes
    pub fn with_address_mode(mut self, mode: vk::SamplerAddressMode) -> Self {
        self.address_u = mode;
        self.address_v = mode;
        self.address_w = mode;
        self
    }

    /// Create info with anisotropy at `max_anisotropy`, a single LOD and an
    /// opaque black border
    pub fn create_info(&self, max_anisotropy: f32) -> vk::SamplerCreateInfo {
        vk::SamplerCreateInfo::builder()
            .mag_filter(self.mag_filter)
            .min_filter(self.min_filter)
            .address_mode_u(self.address_u)
            .address_mode_v(self.address_v)
            .address_mode_w(self.address_w)
            .anisotropy_enable(true)
            .max_anisotropy(max_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0)
            .build()
    }
}

/// Sampler wrapper with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Create a sampler using the device's maximum anisotropy
    pub fn new(context: &VulkanContext, desc: &SamplerDesc) -> VulkanResult<Self> {
        let device = context.raw_device();
        let create_info = desc.create_info(context.max_sampler_anisotropy());
        let sampler = unsafe { device.create_sampler(&create_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { device, sampler })
    }

    /// Sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// A texture paired with the sampler that reads it
pub struct BoundTexture {
    sampler: Sampler,
    texture: Texture,
}

impl BoundTexture {
    /// Pair `texture` with `sampler`
    pub fn new(texture: Texture, sampler: Sampler) -> Self {
        Self { sampler, texture }
    }

    /// Combined image sampler info; the texture must be shader-readable
    pub fn image_info(&self) -> VulkanResult<vk::DescriptorImageInfo> {
        if self.texture.layout() != vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL {
            return Err(VulkanError::invalid(format!(
                "texture bound for sampling while in {:?}",
                self.texture.layout()
            )));
        }
        Ok(vk::DescriptorImageInfo {
            sampler: self.sampler.handle(),
            image_view: self.texture.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        })
    }

    /// The texture
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// The sampler
    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }
}

/// Uploads decoded images into shader-readable textures
pub struct TextureLoader<'a, E: ExecuteDirectly> {
    context: &'a VulkanContext,
    executor: &'a E,
}

impl<'a, E: ExecuteDirectly> TextureLoader<'a, E> {
    /// Loader submitting its transfers through `executor`
    pub fn new(context: &'a VulkanContext, executor: &'a E) -> Self {
        Self { context, executor }
    }

    /// Stage `image`, copy it into a new texture and leave that texture in
    /// `SHADER_READ_ONLY_OPTIMAL`
    pub fn from_image_data(&self, image: &ImageData) -> VulkanResult<Texture> {
        let staging = StagingBuffer::new(self.context, &image.data)?;
        let mut texture = Texture::new(self.context, image.width, image.height, TEXTURE_FORMAT)?;

        texture.transition_layout(self.executor, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
        texture.copy_from_staging(self.executor, &staging)?;
        texture.transition_layout(self.executor, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;

        log::info!("Uploaded texture {}x{} ({} bytes)", image.width, image.height, image.size_bytes());
        Ok(texture)
    }

    /// Decode an image file and upload it
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> VulkanResult<Texture> {
        let image = ImageData::from_file(path.as_ref())?;
        self.from_image_data(&image)
    }

    /// Upload `image` and pair it with a sampler built from `desc`
    pub fn bound_from_image_data(&self, image: &ImageData, desc: &SamplerDesc) -> VulkanResult<BoundTexture> {
        let texture = self.from_image_data(image)?;
        let sampler = Sampler::new(self.context, desc)?;
        Ok(BoundTexture::new(texture, sampler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_transitions_supported() {
        let to_transfer = transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(to_transfer.src_access, vk::AccessFlags::empty());
        assert_eq!(to_transfer.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_transfer.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(to_transfer.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let to_shader = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_shader.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_shader.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(to_shader.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(to_shader.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_other_transitions_rejected() {
        let layouts = [
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        ];
        let supported = [
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        ];

        for &old in &layouts {
            for &new in &layouts {
                if supported.contains(&(old, new)) {
                    continue;
                }
                match transition_masks(old, new) {
                    Err(VulkanError::UnsupportedTransition { old: o, new: n }) => {
                        assert_eq!((o, n), (old, new));
                    }
                    other => panic!("{:?} -> {:?} should be rejected, got {:?}", old, new, other.is_ok()),
                }
            }
        }
    }

    #[test]
    fn test_shader_read_back_to_transfer_rejected() {
        assert!(transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        )
        .is_err());
    }

    #[test]
    fn test_texel_sizes() {
        assert_eq!(bytes_per_texel(TEXTURE_FORMAT), Some(4));
        assert_eq!(bytes_per_texel(vk::Format::B8G8R8A8_UNORM), Some(4));
        assert_eq!(bytes_per_texel(vk::Format::R32G32B32A32_SFLOAT), None);
    }

    #[test]
    fn test_sampler_defaults() {
        let desc = SamplerDesc::default();
        assert_eq!(desc.min_filter, vk::Filter::LINEAR);
        assert_eq!(desc.mag_filter, vk::Filter::LINEAR);
        assert_eq!(desc.address_u, vk::SamplerAddressMode::REPEAT);

        let info = desc.create_info(16.0);
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.max_anisotropy, 16.0);
        assert_eq!(info.border_color, vk::BorderColor::INT_OPAQUE_BLACK);
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
        assert_eq!(info.max_lod, 0.0);
        assert_eq!(info.unnormalized_coordinates, vk::FALSE);
    }

    #[test]
    fn test_sampler_address_mode_override() {
        let desc = SamplerDesc::default().with_address_mode(vk::SamplerAddressMode::CLAMP_TO_EDGE);
        let info = desc.create_info(1.0);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.address_mode_v, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.address_mode_w, vk::SamplerAddressMode::CLAMP_TO_EDGE);
    }
}
