// =============================================================================
// TRIANGLE RENDERER - one hard-coded triangle on raw Vulkan
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (window, close requests)                      │
// │    └── Renderer                                                 │
// │          ├── Device bootstrap (GPU, queue families, queues)     │
// │          ├── Swapchain + image views                            │
// │          ├── Render pass, pipeline, framebuffers                │
// │          ├── Pre-recorded command buffers (one per image)       │
// │          └── Frame slots (fences, semaphores)                   │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Wait for the current slot's fence, reset it
// 2. Acquire swapchain image
// 3. Submit that image's pre-recorded commands
// 4. Present
// 5. Advance to the next slot
//
// Any failure is fatal: the loop exits, resources are released in reverse
// creation order, and main returns the error.
// =============================================================================

mod backend;
mod config;
mod renderer;
mod window;

use anyhow::{Context, Result};
use config::Config;
use log::LevelFilter;
use renderer::Renderer;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, config_error) = Config::load();

    init_logging(&config);
    if let Some(e) = config_error {
        log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
    }
    log::info!("Starting triangle renderer");
    log::info!(
        "Window: {}x{} \"{}\"",
        config.window.width,
        config.window.height,
        config.window.title
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop failed")?;

    match app.fatal.take() {
        Some(e) => {
            log::error!("Fatal error: {:#}", e);
            Err(e)
        }
        None => Ok(()),
    }
}

fn init_logging(config: &Config) {
    let level = config.log_level();

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level.as_ref().copied().unwrap_or(LevelFilter::Info));
    // RUST_LOG still wins when set.
    builder.parse_default_env();
    builder.init();

    if let Err(e) = level {
        log::warn!("{:#}, defaulting to info", e);
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Owns the window and the renderer for the lifetime of the event loop.
struct App {
    config: Config,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    /// First fatal error; ends the event loop.
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
        // No further frames: a slot fence may be left reset with nothing to signal it.
        self.shutdown();
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        // Renderer first: it waits for the GPU and destroys the surface
        // before the last window reference goes away.
        self.renderer = None;
        self.window = None;
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = window::window_attributes(&self.config.window);
        let window = match event_loop.create_window(attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::anyhow!("Failed to create window: {}", e));
                return;
            }
        };

        match Renderer::new(window.clone(), &self.config) {
            Ok(renderer) => {
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to initialize Vulkan"));
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(renderer) = &self.renderer {
                    if let Err(e) = renderer.wait_idle() {
                        log::error!("Failed to wait for device idle: {}", e);
                    }
                }
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => {
                let result = match self.renderer.as_mut() {
                    Some(renderer) => renderer.draw_frame(),
                    None => Ok(()),
                };
                if let Err(e) = result {
                    self.fail(event_loop, anyhow::Error::new(e).context("Frame failed"));
                }
            }

            _ => {}
        }
    }

    /// Keep drawing: one frame per loop iteration.
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if event_loop.exiting() {
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}
