// Renderer - bootstrap in dependency order, then draw frames
//
// instance -> surface -> device -> swapchain -> pipeline -> commands -> sync
//
// Each stage only sees the outputs of the stages before it. Every GPU object
// is registered on one ReleaseStack, so teardown is the exact reverse of
// creation, and a failed bootstrap releases only what it managed to create.

use crate::backend::commands::{self, CommandRecorder};
use crate::backend::pipeline::{PipelineArtifacts, ShaderPaths};
use crate::backend::sync::{FrameSynchronizer, VulkanFrameQueue};
use crate::backend::{ReleaseStack, RendererResult, Swapchain, VulkanDevice, VulkanInstance};
use crate::config::Config;
use crate::window;
use std::sync::Arc;
use winit::window::Window;

pub struct Renderer {
    device: VulkanDevice,
    swapchain: Swapchain,
    commands: CommandRecorder,
    frames: FrameSynchronizer,
    resources: ReleaseStack,
}

impl Renderer {
    pub fn new(window: Arc<Window>, config: &Config) -> RendererResult<Self> {
        log::info!("Initializing Vulkan...");

        let mut resources = ReleaseStack::new();

        let extensions = window::required_extensions(&window)?;
        let instance = VulkanInstance::new(&config.window.title, extensions, &mut resources)?;

        let surface_handle = window::create_surface(&instance, &window)?;
        // The window must outlive the surface created from it.
        let surface = instance.adopt_surface(surface_handle, window, &mut resources);

        let device = VulkanDevice::new(&instance, &surface, &mut resources)?;

        let swapchain = Swapchain::new(&device, &instance.instance, &surface, &mut resources)?;

        let shaders = ShaderPaths {
            vertex: &config.shaders.vertex,
            fragment: &config.shaders.fragment,
        };
        let pipeline = PipelineArtifacts::new(&device.device, &swapchain, shaders, &mut resources)?;

        let recordings = commands::plan_recordings(&pipeline.framebuffers, swapchain.extent);
        let commands = CommandRecorder::new(
            &device.device,
            device.queue_families.graphics,
            pipeline.render_pass,
            pipeline.pipeline,
            &recordings,
            &mut resources,
        )?;

        let frames = FrameSynchronizer::new(&device.device, &mut resources)?;

        log::info!(
            "Vulkan initialized: {} swapchain images, {} GPU objects registered for teardown",
            swapchain.image_count(),
            resources.len()
        );

        Ok(Self {
            device,
            swapchain,
            commands,
            frames,
            resources,
        })
    }

    /// Acquire, submit and present one frame.
    pub fn draw_frame(&mut self) -> RendererResult<()> {
        let mut queue = VulkanFrameQueue::new(&self.device, &self.swapchain);
        let image_index = self
            .frames
            .draw_frame(&mut queue, &self.commands.command_buffers)?;
        log::trace!("Presented image {}", image_index);
        Ok(())
    }

    /// Block until the GPU has drained all submitted work.
    pub fn wait_idle(&self) -> RendererResult<()> {
        self.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // In-flight work may still reference what is about to be destroyed.
        if let Err(e) = self.wait_idle() {
            log::error!("Device did not go idle before teardown: {}", e);
        }

        self.resources.release_all();

        log::info!("Cleanup complete");
    }
}
