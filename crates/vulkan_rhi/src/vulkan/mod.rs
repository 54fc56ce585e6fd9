//! Vulkan backend
//!
//! RAII wrappers over the Vulkan objects needed to put frames on screen.
//! Every constructor takes the [`VulkanContext`] (or a device cloned from
//! it) explicitly, and every wrapper must be dropped before the context.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor_set;
mod error;
pub mod frame_queue;
pub mod framebuffer;
pub mod per_image;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex_layout;
pub mod window;

pub use buffer::{Buffer, IndexBuffer, IndexElement, StagingBuffer, UniformBuffer, VertexBuffer};
pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder, ExecuteDirectly};
pub use context::{PhysicalDeviceInfo, QueueFamilyIndices, VulkanContext};
pub use descriptor_set::{
    BindingDecl, BindingTable, BoundResource, DescriptorPool, DescriptorSetLayout, DescriptorSetWriter, ResourceKind,
    ShaderParameters, ShaderResources,
};
pub use error::{VulkanError, VulkanResult};
pub use frame_queue::{FrameCycle, FrameQueue, ScopedFrame};
pub use framebuffer::Framebuffer;
pub use per_image::PerImage;
pub use render_pass::RenderPass;
pub use shader::{GraphicsPipeline, ShaderModule};
pub use swapchain::Swapchain;
pub use sync::{Fence, FrameSlots, FrameSync, Semaphore};
pub use texture::{BoundTexture, Sampler, SamplerDesc, Texture, TextureLoader};
pub use vertex_layout::VertexInput;
pub use window::{Window, WindowError};
