// Frame synchronization
//
// Two frame slots, each with its own semaphore pair and fence. The fence is
// the only thing the CPU can block on; waiting on it before reuse bounds the
// CPU to MAX_FRAMES_IN_FLIGHT frames ahead of the GPU.
//
// The command buffer submitted is picked by the acquired image index, the
// sync objects by the slot. The two are independent.

use super::device::VulkanDevice;
use super::error::{RendererResult, VkResultExt};
use super::release::ReleaseStack;
use super::swapchain::Swapchain;
use ash::prelude::VkResult;
use ash::vk;

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Frame synchronization - one per frame in flight
#[derive(Clone, Copy, Debug)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &ash::Device, resources: &mut ReleaseStack) -> RendererResult<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder()
            .flags(vk::FenceCreateFlags::SIGNALED); // Start signaled

        let image_available = unsafe { device.create_semaphore(&semaphore_info, None) }
            .creating("image-available semaphore")?;
        let doomed = device.clone();
        resources.push("image-available semaphore", move || unsafe {
            doomed.destroy_semaphore(image_available, None);
        });

        let render_finished = unsafe { device.create_semaphore(&semaphore_info, None) }
            .creating("render-finished semaphore")?;
        let doomed = device.clone();
        resources.push("render-finished semaphore", move || unsafe {
            doomed.destroy_semaphore(render_finished, None);
        });

        let in_flight_fence = unsafe { device.create_fence(&fence_info, None) }
            .creating("in-flight fence")?;
        let doomed = device.clone();
        resources.push("in-flight fence", move || unsafe {
            doomed.destroy_fence(in_flight_fence, None);
        });

        Ok(Self {
            image_available,
            render_finished,
            in_flight_fence,
        })
    }
}

/// The GPU-facing half of one frame iteration.
pub trait FrameQueue {
    /// Block until `fence` is signaled.
    fn wait_for_fence(&mut self, fence: vk::Fence) -> RendererResult<()>;

    fn reset_fence(&mut self, fence: vk::Fence) -> RendererResult<()>;

    /// Index of the next presentable image; `image_available` is signaled
    /// once it can be rendered to.
    fn acquire_next_image(&mut self, image_available: vk::Semaphore) -> RendererResult<u32>;

    /// Submit `command_buffer` to the graphics queue, waiting on `wait` at
    /// color-attachment output, then signal `signal` and `fence`.
    fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> RendererResult<()>;

    /// Present `image_index` on the present queue once `wait` is signaled.
    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> RendererResult<()>;
}

/// [`FrameQueue`] over the real device, queues and swapchain.
pub struct VulkanFrameQueue<'a> {
    device: &'a VulkanDevice,
    swapchain: &'a Swapchain,
    wait_stages: [vk::PipelineStageFlags; 1],
}

impl<'a> VulkanFrameQueue<'a> {
    pub fn new(device: &'a VulkanDevice, swapchain: &'a Swapchain) -> Self {
        Self {
            device,
            swapchain,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
        }
    }
}

impl FrameQueue for VulkanFrameQueue<'_> {
    fn wait_for_fence(&mut self, fence: vk::Fence) -> RendererResult<()> {
        unsafe { self.device.device.wait_for_fences(&[fence], true, u64::MAX) }
            .submitting("wait for in-flight fence")
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> RendererResult<()> {
        unsafe { self.device.device.reset_fences(&[fence]) }.submitting("reset in-flight fence")
    }

    fn acquire_next_image(&mut self, image_available: vk::Semaphore) -> RendererResult<u32> {
        // Suboptimal is not acted on; there is no recreation path.
        let (index, _suboptimal) = unsafe {
            self.swapchain.swapchain_loader.acquire_next_image(
                self.swapchain.swapchain,
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        }
        .submitting("acquire swapchain image")?;
        Ok(index)
    }

    fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> RendererResult<()> {
        let wait_semaphores = [wait];
        let signal_semaphores = [signal];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info.build()],
                fence,
            )
        }
        .submitting("submit draw command buffer")
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> RendererResult<()> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain
                .swapchain_loader
                .queue_present(self.device.present_queue, &present_info)
        };
        presented(result)
    }
}

/// An out-of-date swapchain only drops this frame; the next present tries
/// again with the same swapchain. Anything else is fatal.
fn presented(result: VkResult<bool>) -> RendererResult<()> {
    match result {
        Ok(_suboptimal) => Ok(()),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
            log::debug!("Swapchain out of date at present, frame dropped");
            Ok(())
        }
        Err(e) => Err::<(), _>(e).submitting("present swapchain image"),
    }
}

/// Owns the frame slots and the slot cursor.
#[derive(Debug)]
pub struct FrameSynchronizer {
    slots: Vec<FrameSync>,
    current_frame: usize,
}

impl FrameSynchronizer {
    pub fn new(device: &ash::Device, resources: &mut ReleaseStack) -> RendererResult<Self> {
        let slots = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(device, resources))
            .collect::<RendererResult<Vec<_>>>()?;

        log::info!("Created sync objects for {} frames in flight", slots.len());

        Ok(Self::from_slots(slots))
    }

    fn from_slots(slots: Vec<FrameSync>) -> Self {
        Self {
            slots,
            current_frame: 0,
        }
    }

    #[cfg(test)]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Run one acquire -> submit -> present iteration on the current slot.
    ///
    /// Returns the image index that was drawn.
    pub fn draw_frame(
        &mut self,
        queue: &mut impl FrameQueue,
        command_buffers: &[vk::CommandBuffer],
    ) -> RendererResult<u32> {
        let sync = self.slots[self.current_frame];

        // Wait before reset: the fence may still guard work from the last
        // time this slot was used.
        queue.wait_for_fence(sync.in_flight_fence)?;
        queue.reset_fence(sync.in_flight_fence)?;

        let image_index = queue.acquire_next_image(sync.image_available)?;

        queue.submit(
            command_buffers[image_index as usize],
            sync.image_available,
            sync.render_finished,
            sync.in_flight_fence,
        )?;

        queue.present(image_index, sync.render_finished)?;

        self.current_frame = (self.current_frame + 1) % self.slots.len();
        Ok(image_index)
    }
}
