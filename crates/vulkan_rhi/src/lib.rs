//! # Vulkan RHI
//!
//! A small Vulkan rendering core: device bring-up, swapchain, GPU buffers
//! and textures, descriptor sets generated from declared shader bindings,
//! and a frame queue that paces the CPU against the GPU.
//!
//! ## Frame lifecycle
//!
//! ```rust,no_run
//! use vulkan_rhi::prelude::*;
//!
//! fn run(window: &mut Window, config: &RendererConfig) -> VulkanResult<()> {
//!     let context = VulkanContext::new(window, config)?;
//!     let mut swapchain = Swapchain::new(&context, window.framebuffer_extent())?;
//!     let mut queue = FrameQueue::new(&context, swapchain.image_count(), config.max_frames_in_flight)?;
//!
//!     queue.prepare_frame_commands(|_image_index, _recorder| Ok(()))?;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         let frame = ScopedFrame::begin(&mut queue, &mut swapchain)?;
//!         // update resources selected by frame.image_index()
//!         frame.finish()?;
//!     }
//!     queue.wait_idle()
//! }
//! ```

#![warn(missing_docs)]

pub mod assets;
pub mod config;
pub mod foundation;
pub mod vulkan;

/// Commonly used types
pub mod prelude {
    pub use crate::assets::{AssetError, ImageData};
    pub use crate::config::{Config, ConfigError, RendererConfig, ShaderConfig, WindowConfig};
    pub use crate::foundation::logging;
    pub use crate::vulkan::{
        BindingTable, BoundResource, BoundTexture, ExecuteDirectly, FrameQueue, GraphicsPipeline, IndexBuffer,
        PerImage, RenderPass, Sampler, SamplerDesc, ScopedFrame, ShaderModule, ShaderParameters, ShaderResources,
        Swapchain, TextureLoader, UniformBuffer, VertexBuffer, VertexInput, VulkanContext, VulkanError, VulkanResult,
        Window,
    };
}
