// Command recording
//
// One primary command buffer per framebuffer, recorded once at startup and
// resubmitted every frame. The scene never changes, so nothing is re-recorded.

use super::error::{RendererError, RendererResult, VkResultExt};
use super::release::ReleaseStack;
use ash::vk;

/// Opaque black.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Everything one command buffer records.
#[derive(Clone, Copy, Debug)]
pub struct DrawRecording {
    pub framebuffer: vk::Framebuffer,
    pub render_area: vk::Rect2D,
    pub clear_color: [f32; 4],
    pub vertex_count: u32,
    pub instance_count: u32,
}

impl DrawRecording {
    /// The fixed triangle draw into `framebuffer`.
    pub fn triangle(framebuffer: vk::Framebuffer, extent: vk::Extent2D) -> Self {
        Self {
            framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            clear_color: CLEAR_COLOR,
            vertex_count: 3,
            instance_count: 1,
        }
    }
}

/// One recording per framebuffer, same order.
pub fn plan_recordings(framebuffers: &[vk::Framebuffer], extent: vk::Extent2D) -> Vec<DrawRecording> {
    framebuffers
        .iter()
        .map(|&framebuffer| DrawRecording::triangle(framebuffer, extent))
        .collect()
}

/// Pre-recorded command buffers. Their pool lives on the release stack.
#[derive(Clone, Debug)]
pub struct CommandRecorder {
    pub command_buffers: Vec<vk::CommandBuffer>,
}

impl CommandRecorder {
    /// Allocate and record `command_buffers[i]` from `recordings[i]`.
    pub fn new(
        device: &ash::Device,
        graphics_queue_family: u32,
        render_pass: vk::RenderPass,
        pipeline: vk::Pipeline,
        recordings: &[DrawRecording],
        resources: &mut ReleaseStack,
    ) -> RendererResult<Self> {
        let pool_info =
            vk::CommandPoolCreateInfo::builder().queue_family_index(graphics_queue_family);

        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .creating("command pool")?;
        // Destroying the pool also frees its command buffers.
        let doomed = device.clone();
        resources.push("command pool", move || unsafe {
            doomed.destroy_command_pool(command_pool, None);
        });

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(recordings.len() as u32);

        let command_buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
            .creating("command buffers")?;

        if command_buffers.len() != recordings.len() {
            return Err(RendererError::InitializationFailure {
                object: "command buffers",
                result: vk::Result::ERROR_INITIALIZATION_FAILED,
            });
        }

        for (&cmd, recording) in command_buffers.iter().zip(recordings) {
            record_draw(device, cmd, render_pass, pipeline, recording)?;
        }

        log::info!("Recorded {} command buffers", command_buffers.len());

        Ok(Self { command_buffers })
    }
}

fn record_draw(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,
    recording: &DrawRecording,
) -> RendererResult<()> {
    let begin_info = vk::CommandBufferBeginInfo::builder();

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: recording.clear_color,
        },
    }];

    let render_pass_info = vk::RenderPassBeginInfo::builder()
        .render_pass(render_pass)
        .framebuffer(recording.framebuffer)
        .render_area(recording.render_area)
        .clear_values(&clear_values);

    unsafe {
        device
            .begin_command_buffer(cmd, &begin_info)
            .submitting("begin recording command buffer")?;

        device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
        device.cmd_draw(cmd, recording.vertex_count, recording.instance_count, 0, 0);
        device.cmd_end_render_pass(cmd);

        device
            .end_command_buffer(cmd)
            .submitting("record command buffer")
    }
}
