// Windowing collaborator
//
// winit owns the window and the event loop. This module is the only place
// that touches raw window handles: it reports the instance extensions the
// platform needs and binds a Vulkan surface to a window.

use crate::backend::error::{RendererResult, VkResultExt};
use crate::backend::VulkanInstance;
use crate::config::WindowConfig;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::c_char;
use winit::window::{Window, WindowAttributes};

/// Fixed-size, non-resizable window attributes.
pub fn window_attributes(config: &WindowConfig) -> WindowAttributes {
    WindowAttributes::default()
        .with_title(&config.title)
        .with_inner_size(winit::dpi::PhysicalSize::new(config.width, config.height))
        .with_resizable(false)
}

/// Instance extensions required to present to `window` on this platform.
pub fn required_extensions(window: &Window) -> RendererResult<&'static [*const c_char]> {
    ash_window::enumerate_required_extensions(window.raw_display_handle())
        .creating("platform extension list")
}

/// Create a presentation surface for `window` on `instance`.
pub fn create_surface(instance: &VulkanInstance, window: &Window) -> RendererResult<vk::SurfaceKHR> {
    unsafe {
        ash_window::create_surface(
            &instance.entry,
            &instance.instance,
            window.raw_display_handle(),
            window.raw_window_handle(),
            None,
        )
    }
    .creating("window surface")
}
