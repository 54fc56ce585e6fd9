//! Framebuffer management

use ash::{vk, Device};

use crate::vulkan::per_image::PerImage;
use crate::vulkan::render_pass::RenderPass;
use crate::vulkan::swapchain::Swapchain;
use crate::vulkan::{VulkanError, VulkanResult};

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Create a new framebuffer
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer =
            unsafe { device.create_framebuffer(&framebuffer_create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self {
            device,
            framebuffer,
            extent,
        })
    }

    /// One framebuffer per swapchain image view, in image order
    pub fn for_swapchain(device: &Device, render_pass: &RenderPass, swapchain: &Swapchain) -> VulkanResult<PerImage<Self>> {
        let views = swapchain.image_views();
        let framebuffers = PerImage::try_from_fn(views.len(), |i| {
            Self::new(device.clone(), render_pass.handle(), &views[i..=i], swapchain.extent())
        })?;

        log::debug!(
            "Created {} framebuffers ({}x{})",
            framebuffers.len(),
            swapchain.extent().width,
            swapchain.extent().height
        );
        Ok(framebuffers)
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}
