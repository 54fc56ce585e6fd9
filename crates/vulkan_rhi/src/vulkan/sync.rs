//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! RAII wrappers for semaphores and fences, the per-slot [`FrameSync`]
//! bundle, and [`FrameSlots`], the bookkeeping that decides which fences
//! must be waited on before a frame slot or a swapchain image is reused.
//!
//! ## Frames in flight
//!
//! ```text
//! slot 0: wait fence -> acquire -> submit (signals fence) -> present
//! slot 1:              wait fence -> acquire -> submit -> present
//! slot 0:                           wait fence ...
//! ```
//!
//! Each slot owns an image-available semaphore, a render-finished semaphore
//! and an in-flight fence created signaled, so the first wait on every slot
//! returns immediately. A slot is only reused after its fence is observed
//! signaled. Because the acquired image index is independent of the slot, a
//! second fence may guard the image: the one from whichever slot last
//! rendered to it.

use ash::{vk, Device};

use crate::vulkan::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence, optionally already signaled
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self { device, fence })
    }

    /// Block until signaled or `timeout` nanoseconds pass
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, timeout) }.map_err(VulkanError::Api)
    }

    /// Return to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]) }.map_err(VulkanError::Api)
    }

    /// Non-blocking status query
    pub fn is_signaled(&self) -> VulkanResult<bool> {
        unsafe { self.device.get_fence_status(self.fence) }.map_err(VulkanError::Api)
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects of one frame-in-flight slot
pub struct FrameSync {
    /// Signaled by acquire, waited by the frame's submit
    pub image_available: Semaphore,
    /// Signaled by the frame's submit, waited by present
    pub render_finished: Semaphore,
    /// Signaled when the frame's submit completes
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects; the fence starts signaled
    pub fn new(device: Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }
}

/// Round-robin slot cursor plus the images-in-flight table
#[derive(Debug, Clone)]
pub struct FrameSlots {
    slot_count: usize,
    current: usize,
    images_in_flight: Vec<Option<usize>>,
}

impl FrameSlots {
    /// `slot_count` frames in flight over `image_count` swapchain images
    pub fn new(slot_count: usize, image_count: usize) -> VulkanResult<Self> {
        if slot_count == 0 {
            return Err(VulkanError::invalid("at least one frame in flight is required"));
        }
        Ok(Self {
            slot_count,
            current: 0,
            images_in_flight: vec![None; image_count],
        })
    }

    /// Slot the next frame will use
    pub fn current(&self) -> usize {
        self.current
    }

    /// Number of slots
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Mark `image_index` as used by the current slot. Returns the other slot
    /// whose fence must be waited on first, if that slot last rendered to it.
    pub fn claim_image(&mut self, image_index: u32) -> VulkanResult<Option<usize>> {
        let image_count = self.images_in_flight.len();
        let entry = self
            .images_in_flight
            .get_mut(image_index as usize)
            .ok_or_else(|| VulkanError::invalid(format!("image index {} out of range for {} images", image_index, image_count)))?;

        let previous = entry.replace(self.current);
        Ok(previous.filter(|&slot| slot != self.current))
    }

    /// Forget that the current slot rendered `image_index`, after its
    /// submission never reached the queue
    pub fn release_image(&mut self, image_index: u32) {
        if let Some(entry) = self.images_in_flight.get_mut(image_index as usize) {
            if *entry == Some(self.current) {
                *entry = None;
            }
        }
    }

    /// Move to the next slot, wrapping at the slot count
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.slot_count;
        self.current
    }

    /// Swapchain was rebuilt: forget image ownership, resize the table
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight = vec![None; image_count];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_cycle_round_robin() {
        let mut slots = FrameSlots::new(2, 3).unwrap();
        let visited: Vec<usize> = (0..5)
            .map(|_| {
                let slot = slots.current();
                slots.advance();
                slot
            })
            .collect();
        assert_eq!(visited, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_zero_slots_rejected() {
        assert!(FrameSlots::new(0, 3).is_err());
    }

    #[test]
    fn test_image_reused_by_other_slot_requires_its_fence() {
        let mut slots = FrameSlots::new(2, 3).unwrap();

        // slot 0 renders image 2
        assert_eq!(slots.claim_image(2).unwrap(), None);
        slots.advance();

        // slot 1 gets image 2 back while slot 0 may still be rendering it
        assert_eq!(slots.claim_image(2).unwrap(), Some(0));
        slots.advance();

        // slot 0 again on image 2: its own fence was already waited
        assert_eq!(slots.claim_image(2).unwrap(), Some(1));
        slots.advance();
        assert_eq!(slots.claim_image(0).unwrap(), None);
    }

    #[test]
    fn test_same_slot_same_image_needs_no_extra_wait() {
        let mut slots = FrameSlots::new(1, 2).unwrap();
        assert_eq!(slots.claim_image(1).unwrap(), None);
        slots.advance();
        assert_eq!(slots.current(), 0);
        assert_eq!(slots.claim_image(1).unwrap(), None);
    }

    #[test]
    fn test_released_image_has_no_owner() {
        let mut slots = FrameSlots::new(2, 3).unwrap();
        slots.claim_image(1).unwrap();
        slots.release_image(1);
        slots.advance();
        assert_eq!(slots.claim_image(1).unwrap(), None);
    }

    #[test]
    fn test_release_keeps_other_slots_claim() {
        let mut slots = FrameSlots::new(2, 3).unwrap();
        slots.claim_image(1).unwrap();
        slots.advance();
        slots.release_image(1);
        assert_eq!(slots.claim_image(1).unwrap(), Some(0));
        slots.release_image(7);
    }

    #[test]
    fn test_reset_images_forgets_owners() {
        let mut slots = FrameSlots::new(2, 2).unwrap();
        slots.claim_image(0).unwrap();
        slots.advance();
        slots.reset_images(4);
        assert_eq!(slots.claim_image(0).unwrap(), None);
        assert_eq!(slots.claim_image(3).unwrap(), None);
        assert!(slots.claim_image(4).is_err());
    }
}
