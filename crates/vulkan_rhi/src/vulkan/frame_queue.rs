//! Frame queue: per-image command buffers driven through the
//! begin-frame / end-frame protocol
//!
//! ```text
//! begin_frame: wait slot fence -> acquire image -> wait fence of the slot
//!              that last used the image (if any)
//! end_frame:   reset slot fence -> submit cb[image] -> present -> next slot
//! ```
//!
//! Command buffers are recorded once per swapchain image by
//! [`FrameQueue::prepare_frame_commands`] and resubmitted every frame.
//! The host-side bookkeeping lives in [`FrameCycle`]. If an acquired image
//! never reaches the queue, its slot gets fresh sync objects so no later
//! wait blocks on a fence that will not be signaled.

use ash::{vk, Device};

use crate::vulkan::commands::{CommandPool, CommandRecorder, ExecuteDirectly};
use crate::vulkan::context::VulkanContext;
use crate::vulkan::per_image::PerImage;
use crate::vulkan::swapchain::Swapchain;
use crate::vulkan::sync::{FrameSlots, FrameSync};
use crate::vulkan::{VulkanError, VulkanResult};

/// Host-side state of the frame protocol: which slot is next, which image
/// the open frame holds, and who last rendered each image
#[derive(Debug, Clone)]
pub struct FrameCycle {
    slots: FrameSlots,
    open: Option<u32>,
}

impl FrameCycle {
    /// `slot_count` frames in flight over `image_count` images
    pub fn new(slot_count: usize, image_count: usize) -> VulkanResult<Self> {
        Ok(Self {
            slots: FrameSlots::new(slot_count, image_count)?,
            open: None,
        })
    }

    /// Fails while a frame is open
    pub fn ensure_closed(&self) -> VulkanResult<()> {
        match self.open {
            Some(image_index) => Err(VulkanError::invalid(format!(
                "begin_frame called while image {} is still open",
                image_index
            ))),
            None => Ok(()),
        }
    }

    /// Open a frame on `image_index` for the current slot. Returns the other
    /// slot whose fence guards the image, if any.
    pub fn open(&mut self, image_index: u32) -> VulkanResult<Option<usize>> {
        self.ensure_closed()?;
        let previous_slot = self.slots.claim_image(image_index)?;
        self.open = Some(image_index);
        Ok(previous_slot)
    }

    /// Close the open frame, returning its image and slot
    pub fn close(&mut self) -> VulkanResult<(u32, usize)> {
        let image_index = self
            .open
            .take()
            .ok_or_else(|| VulkanError::invalid("end_frame called without a successful begin_frame"))?;
        Ok((image_index, self.slots.current()))
    }

    /// Drop a frame whose work never reached the queue: the image is closed
    /// and no longer guarded by the current slot's fence
    pub fn abandon(&mut self, image_index: u32) {
        if self.open == Some(image_index) {
            self.open = None;
        }
        self.slots.release_image(image_index);
    }

    /// Move to the next slot
    pub fn advance(&mut self) -> usize {
        self.slots.advance()
    }

    /// Swapchain was rebuilt with `image_count` images
    pub fn reset_images(&mut self, image_count: usize) {
        self.slots.reset_images(image_count);
    }

    /// Slot the next frame will use
    pub fn current_slot(&self) -> usize {
        self.slots.current()
    }

    /// Number of slots
    pub fn slot_count(&self) -> usize {
        self.slots.slot_count()
    }

    /// Image held by the open frame
    pub fn current_image(&self) -> Option<u32> {
        self.open
    }
}

/// Owns the command pool, the per-image command buffers and the
/// frames-in-flight synchronization state
pub struct FrameQueue {
    // Dropped first: the pool waits for the device before anything below goes away
    command_pool: CommandPool,
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    frame_commands: PerImage<vk::CommandBuffer>,
    frame_sync: Vec<FrameSync>,
    cycle: FrameCycle,
}

impl FrameQueue {
    /// One command buffer per swapchain image, `frames_in_flight` sync slots
    pub fn new(context: &VulkanContext, image_count: usize, frames_in_flight: usize) -> VulkanResult<Self> {
        let device = context.raw_device();
        let cycle = FrameCycle::new(frames_in_flight, image_count)?;
        let command_pool = CommandPool::new(device.clone(), context.physical_device().graphics_family)?;
        let frame_commands = PerImage::new(command_pool.allocate_command_buffers(image_count as u32)?);

        let frame_sync = (0..frames_in_flight)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::info!(
            "Created frame queue: {} command buffers, {} frames in flight",
            image_count,
            frames_in_flight
        );

        Ok(Self {
            command_pool,
            device,
            graphics_queue: context.graphics_queue(),
            present_queue: context.present_queue(),
            frame_commands,
            frame_sync,
            cycle,
        })
    }

    /// Record the fixed command buffer of every swapchain image.
    /// `record` receives the image index and a recorder that is already begun.
    pub fn prepare_frame_commands<F>(&mut self, mut record: F) -> VulkanResult<()>
    where
        F: FnMut(u32, &mut CommandRecorder) -> VulkanResult<()>,
    {
        for (image_index, &command_buffer) in self.frame_commands.enumerate() {
            let mut recorder = CommandRecorder::new(command_buffer, self.device.clone());
            recorder.begin_with(vk::CommandBufferUsageFlags::empty())?;
            record(image_index, &mut recorder)?;
            recorder.end()?;
        }

        log::debug!("Recorded {} frame command buffers", self.frame_commands.len());
        Ok(())
    }

    /// Wait for the current slot, then acquire the next image.
    ///
    /// Returns the image index every per-image resource of this frame must
    /// be selected with. `PresentationStale` leaves the queue ready for
    /// another attempt after recreation. A failure after the acquire rebuilds
    /// the slot's sync objects; the swapchain must then be recreated to get
    /// the unpresented image back.
    pub fn begin_frame(&mut self, swapchain: &mut Swapchain) -> VulkanResult<u32> {
        self.cycle.ensure_closed()?;

        let slot = self.cycle.current_slot();
        let sync = &self.frame_sync[slot];
        sync.in_flight.wait(u64::MAX)?;

        let image_index = swapchain.acquire_next_image(sync.image_available.handle())?;

        if let Err(e) = self.open_acquired(image_index) {
            log::error!("Failed to open frame on image {}: {}", image_index, e);
            self.discard_slot(slot, image_index, swapchain);
            return Err(e);
        }

        log::trace!("Frame slot {} acquired image {}", slot, image_index);
        Ok(image_index)
    }

    fn open_acquired(&mut self, image_index: u32) -> VulkanResult<()> {
        self.frame_commands.get(image_index)?;
        if let Some(previous_slot) = self.cycle.open(image_index)? {
            self.frame_sync[previous_slot].in_flight.wait(u64::MAX)?;
        }
        Ok(())
    }

    /// Submit the acquired image's commands and present it.
    ///
    /// The slot advances even when presentation reports `PresentationStale`,
    /// because the submission has already been made.
    pub fn end_frame(&mut self, swapchain: &mut Swapchain) -> VulkanResult<()> {
        let (image_index, slot) = self.cycle.close()?;

        let result = match self.submit(image_index, slot) {
            Ok(()) => swapchain.present(self.present_queue, self.frame_sync[slot].render_finished.handle()),
            Err(e) => {
                log::error!("Frame submission for image {} failed: {}", image_index, e);
                self.discard_slot(slot, image_index, swapchain);
                Err(e)
            }
        };

        self.cycle.advance();
        result
    }

    fn submit(&self, image_index: u32, slot: usize) -> VulkanResult<()> {
        let sync = &self.frame_sync[slot];
        let command_buffers = [*self.frame_commands.get(image_index)?];
        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        sync.in_flight.reset()?;
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], sync.in_flight.handle())
                .map_err(VulkanError::Api)
        }
    }

    /// Put `slot` back into its initial state after an acquired image could
    /// not be submitted: a signaled fence nobody will wait on forever, and an
    /// image-available semaphore with no pending signal.
    fn discard_slot(&mut self, slot: usize, image_index: u32, swapchain: &mut Swapchain) {
        self.cycle.abandon(image_index);
        swapchain.release_acquired();

        if let Err(e) = self.wait_idle() {
            log::error!("Device wait failed while discarding frame slot {}: {}", slot, e);
        }
        match FrameSync::new(self.device.clone()) {
            Ok(sync) => self.frame_sync[slot] = sync,
            Err(e) => log::error!("Failed to rebuild sync objects of frame slot {}: {}", slot, e),
        }
    }

    /// Reallocate per-image command buffers after the swapchain was rebuilt
    /// with `image_count` images. Commands must be prepared again.
    pub fn reset_frame_commands(&mut self, image_count: usize) -> VulkanResult<()> {
        if self.cycle.current_image().is_some() {
            return Err(VulkanError::invalid("cannot reset frame commands while a frame is open"));
        }

        self.wait_idle()?;
        let old: Vec<vk::CommandBuffer> = self.frame_commands.iter().copied().collect();
        self.command_pool.free_command_buffers(&old);

        self.frame_commands = PerImage::new(self.command_pool.allocate_command_buffers(image_count as u32)?);
        self.cycle.reset_images(image_count);

        log::info!("Reallocated {} frame command buffers", image_count);
        Ok(())
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(VulkanError::Api)
    }

    /// Prepared command buffer for `image_index`
    pub fn frame_command_buffer(&self, image_index: u32) -> VulkanResult<vk::CommandBuffer> {
        self.frame_commands.get(image_index).copied()
    }

    /// Image acquired by the open frame, if any
    pub fn current_image(&self) -> Option<u32> {
        self.cycle.current_image()
    }

    /// Slot the next frame will use
    pub fn current_slot(&self) -> usize {
        self.cycle.current_slot()
    }

    /// Number of frames in flight
    pub fn frames_in_flight(&self) -> usize {
        self.cycle.slot_count()
    }

    /// Number of per-image command buffers
    pub fn image_count(&self) -> usize {
        self.frame_commands.len()
    }
}

impl ExecuteDirectly for FrameQueue {
    fn execute_directly<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandRecorder) -> VulkanResult<()>,
    {
        self.command_pool.submit_one_shot(self.graphics_queue, record)
    }
}

/// A frame opened on construction and closed on drop.
///
/// Prefer [`ScopedFrame::finish`], which reports the end-frame result;
/// dropping the scope still ends the frame and only logs failures.
pub struct ScopedFrame<'a> {
    queue: &'a mut FrameQueue,
    swapchain: &'a mut Swapchain,
    image_index: u32,
    ended: bool,
}

impl<'a> ScopedFrame<'a> {
    /// Begin a frame on `queue`
    pub fn begin(queue: &'a mut FrameQueue, swapchain: &'a mut Swapchain) -> VulkanResult<Self> {
        let image_index = queue.begin_frame(swapchain)?;
        Ok(Self {
            queue,
            swapchain,
            image_index,
            ended: false,
        })
    }

    /// Image index acquired for this frame
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// End the frame and return the submit/present result
    pub fn finish(mut self) -> VulkanResult<()> {
        self.ended = true;
        self.queue.end_frame(&mut *self.swapchain)
    }
}

impl<'a> Drop for ScopedFrame<'a> {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        match self.queue.end_frame(&mut *self.swapchain) {
            Ok(()) => {}
            Err(VulkanError::PresentationStale) => {
                log::info!("Frame for image {} presented to a stale swapchain", self.image_index);
            }
            Err(e) => log::error!("Failed to end frame for image {}: {}", self.image_index, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_without_begin_fails() {
        let mut cycle = FrameCycle::new(2, 3).unwrap();
        assert!(matches!(cycle.close(), Err(VulkanError::InvalidOperation { .. })));
        assert_eq!(cycle.current_slot(), 0);
    }

    #[test]
    fn test_second_begin_while_open_fails() {
        let mut cycle = FrameCycle::new(2, 3).unwrap();
        assert_eq!(cycle.open(1).unwrap(), None);
        assert!(cycle.ensure_closed().is_err());
        assert!(cycle.open(2).is_err());
        assert_eq!(cycle.current_image(), Some(1));
    }

    #[test]
    fn test_closed_frame_returns_image_and_slot() {
        let mut cycle = FrameCycle::new(2, 3).unwrap();
        cycle.open(2).unwrap();
        assert_eq!(cycle.close().unwrap(), (2, 0));
        assert_eq!(cycle.current_image(), None);
        assert!(cycle.close().is_err());
    }

    #[test]
    fn test_slot_advances_after_every_closed_frame() {
        // end_frame advances whatever present returns, stale included
        let mut cycle = FrameCycle::new(2, 3).unwrap();
        let mut slots = Vec::new();
        for image_index in [0, 1, 2, 0] {
            cycle.open(image_index).unwrap();
            let (_, slot) = cycle.close().unwrap();
            slots.push(slot);
            cycle.advance();
        }
        assert_eq!(slots, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_image_reuse_across_slots_reports_guarding_slot() {
        let mut cycle = FrameCycle::new(2, 2).unwrap();
        cycle.open(0).unwrap();
        cycle.close().unwrap();
        cycle.advance();

        assert_eq!(cycle.open(0).unwrap(), Some(0));
    }

    #[test]
    fn test_failed_submit_does_not_guard_image() {
        let mut cycle = FrameCycle::new(2, 2).unwrap();
        cycle.open(1).unwrap();
        let (image_index, _) = cycle.close().unwrap();
        cycle.abandon(image_index);
        cycle.advance();

        // slot 0's fence was never submitted, so slot 1 must not wait on it
        assert_eq!(cycle.open(1).unwrap(), None);
    }

    #[test]
    fn test_abandoned_open_frame_can_begin_again() {
        let mut cycle = FrameCycle::new(1, 2).unwrap();
        cycle.open(0).unwrap();
        cycle.abandon(0);
        assert_eq!(cycle.current_image(), None);
        assert!(cycle.open(1).is_ok());
    }

    #[test]
    fn test_out_of_range_image_leaves_frame_closed() {
        let mut cycle = FrameCycle::new(2, 2).unwrap();
        assert!(cycle.open(5).is_err());
        assert_eq!(cycle.current_image(), None);
        assert!(cycle.ensure_closed().is_ok());
    }

    #[test]
    fn test_reset_images_resizes_table() {
        let mut cycle = FrameCycle::new(2, 2).unwrap();
        assert!(cycle.open(3).is_err());
        cycle.reset_images(4);
        assert!(cycle.open(3).is_ok());
    }

    #[test]
    #[ignore = "requires a Vulkan device and a display"]
    fn test_scoped_frame_closes_on_finish_and_drop() {
        use crate::config::{RendererConfig, WindowConfig};
        use crate::vulkan::window::Window;

        let window = Window::new(&WindowConfig::default()).unwrap();
        let context = VulkanContext::new(&window, &RendererConfig::default()).unwrap();
        let mut swapchain = Swapchain::new(&context, window.framebuffer_extent()).unwrap();
        let mut queue = FrameQueue::new(&context, swapchain.image_count(), 2).unwrap();
        queue.prepare_frame_commands(|_, _| Ok(())).unwrap();

        let frame = ScopedFrame::begin(&mut queue, &mut swapchain).unwrap();
        let _ = frame.finish();
        assert_eq!(queue.current_image(), None);
        assert_eq!(queue.current_slot(), 1);

        {
            let _frame = ScopedFrame::begin(&mut queue, &mut swapchain).unwrap();
        }
        assert_eq!(queue.current_image(), None);
        assert_eq!(queue.current_slot(), 0);

        queue.wait_idle().unwrap();
    }
}
