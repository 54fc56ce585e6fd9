//! Vulkan swapchain management
//!
//! Creation, acquire/present and recreation. Format, present mode, extent
//! and image count are chosen by free functions over the queried surface
//! support, so the choices are testable without a surface.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device};

use crate::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Surface capabilities, formats and present modes for one physical device
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Image count/extent limits and current transform
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported (format, color space) pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Query the surface for `physical_device`
    pub fn query(surface_loader: &Surface, physical_device: vk::PhysicalDevice, surface: vk::SurfaceKHR) -> VulkanResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .map_err(VulkanError::Api)?,
            })
        }
    }
}

/// BGRA8 sRGB with the sRGB non-linear color space, else the first format
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
        .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no formats".to_string()))
}

/// MAILBOX when offered, otherwise FIFO which is always available
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, or the framebuffer size clamped into the
/// surface bounds when the surface leaves it to the swapchain
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: framebuffer
            .width
            .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: framebuffer
            .height
            .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}

/// One more than the minimum, clamped to the maximum (0 means unbounded)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Tracks the image handed out by the last successful acquire
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AcquireTracker {
    acquired: Option<u32>,
}

impl AcquireTracker {
    /// Record a successful acquire
    pub fn acquired(&mut self, image_index: u32) {
        self.acquired = Some(image_index);
    }

    /// Image currently held, if any
    pub fn current(&self) -> Option<u32> {
        self.acquired
    }

    /// Hand the acquired image over to present; fails when nothing is held
    pub fn take_for_present(&mut self) -> VulkanResult<u32> {
        self.acquired
            .take()
            .ok_or_else(|| VulkanError::invalid("present called before a successful acquire"))
    }

    /// Forget any held image
    pub fn reset(&mut self) {
        self.acquired = None;
    }
}

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    tracker: AcquireTracker,
}

impl Swapchain {
    /// Create a swapchain sized to `window_extent` when the surface allows
    pub fn new(context: &VulkanContext, window_extent: vk::Extent2D) -> VulkanResult<Self> {
        Self::create(context, window_extent, vk::SwapchainKHR::null())
    }

    /// Replace this swapchain with one matching the current surface.
    /// Waits for the device to go idle; the old images are retired by the driver.
    pub fn recreate(&mut self, context: &VulkanContext, window_extent: vk::Extent2D) -> VulkanResult<()> {
        context.wait_idle()?;
        let replacement = Self::create(context, window_extent, self.swapchain)?;
        log::info!(
            "Recreated swapchain: {}x{} -> {}x{}",
            self.extent.width,
            self.extent.height,
            replacement.extent.width,
            replacement.extent.height
        );
        *self = replacement;
        Ok(())
    }

    fn create(context: &VulkanContext, window_extent: vk::Extent2D, old_swapchain: vk::SwapchainKHR) -> VulkanResult<Self> {
        let device = context.raw_device();
        let swapchain_loader = SwapchainLoader::new(context.instance(), &device);

        let support = SurfaceSupport::query(context.surface_loader(), context.physical_device().device, context.surface())?;
        let format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, window_extent);
        let image_count = choose_image_count(&support.capabilities);

        let families = context.queue_families().unique();
        let (sharing_mode, family_indices) = if families.len() > 1 {
            (vk::SharingMode::CONCURRENT, families.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }.map_err(VulkanError::Api)?;

        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            match create_image_view(&device, image, format.format) {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    unsafe {
                        for view in image_views {
                            device.destroy_image_view(view, None);
                        }
                        swapchain_loader.destroy_swapchain(swapchain, None);
                    }
                    return Err(e);
                }
            }
        }

        log::info!(
            "Created swapchain: {:?}/{:?}, {:?}, {}x{}, {} images ({:?} sharing)",
            format.format,
            format.color_space,
            present_mode,
            extent.width,
            extent.height,
            images.len(),
            sharing_mode
        );

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format,
            present_mode,
            extent,
            tracker: AcquireTracker::default(),
        })
    }

    /// Acquire the next presentable image, signalling `signal` when the
    /// presentation engine releases it. Blocks on the GPU side only.
    pub fn acquire_next_image(&mut self, signal: vk::Semaphore) -> VulkanResult<u32> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, signal, vk::Fence::null())
        };

        match result {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    log::debug!("Acquired image {} from a suboptimal swapchain", image_index);
                }
                self.tracker.acquired(image_index);
                Ok(image_index)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::info!("Swapchain out of date on acquire");
                Err(VulkanError::PresentationStale)
            }
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Present the acquired image once `wait` is signalled.
    /// Fails with `InvalidOperation` when no image has been acquired.
    pub fn present(&mut self, queue: vk::Queue, wait: vk::Semaphore) -> VulkanResult<()> {
        let image_index = self.tracker.take_for_present()?;

        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(()),
            Ok(true) => {
                log::info!("Swapchain suboptimal on present");
                Err(VulkanError::PresentationStale)
            }
            Err(e) => Err(VulkanError::from_presentation(e)),
        }
    }

    /// Image index held between acquire and present
    pub fn acquired_image(&self) -> Option<u32> {
        self.tracker.current()
    }

    /// Stop tracking an image that will not be presented. The driver still
    /// counts it as acquired until the swapchain is recreated.
    pub fn release_acquired(&mut self) {
        if let Some(image_index) = self.tracker.current() {
            log::warn!("Releasing image {} without presenting it", image_index);
        }
        self.tracker.reset();
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Chosen present mode
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Swapchain images
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of images, the length of every per-image array
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

fn create_image_view(device: &Device, image: vk::Image, format: vk::Format) -> VulkanResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }.map_err(VulkanError::Api)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 64, height: 64 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn test_preferred_format_is_picked() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap(), formats[1]);
    }

    #[test]
    fn test_format_falls_back_to_first() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap(), formats[0]);
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn test_present_mode_choice() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_fixed_extent_is_used_verbatim() {
        let caps = capabilities((1280, 720), 2, 3);
        let extent = choose_extent(&caps, vk::Extent2D { width: 10, height: 10 });
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn test_adaptive_extent_is_clamped() {
        let caps = capabilities((u32::MAX, u32::MAX), 2, 3);
        let extent = choose_extent(&caps, vk::Extent2D { width: 8000, height: 10 });
        assert_eq!((extent.width, extent.height), (4096, 64));

        let extent = choose_extent(&caps, vk::Extent2D { width: 800, height: 600 });
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_image_count() {
        assert_eq!(choose_image_count(&capabilities((1, 1), 2, 0)), 3);
        assert_eq!(choose_image_count(&capabilities((1, 1), 2, 8)), 3);
        assert_eq!(choose_image_count(&capabilities((1, 1), 3, 3)), 3);
    }

    #[test]
    fn test_present_before_acquire_fails() {
        let mut tracker = AcquireTracker::default();
        assert!(matches!(
            tracker.take_for_present(),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_acquired_image_is_presented_once() {
        let mut tracker = AcquireTracker::default();
        tracker.acquired(2);
        assert_eq!(tracker.current(), Some(2));
        assert_eq!(tracker.take_for_present().unwrap(), 2);
        assert!(tracker.take_for_present().is_err());

        tracker.acquired(0);
        tracker.reset();
        assert_eq!(tracker.current(), None);
    }
}
