// Vulkan instance and presentation surface
//
// The instance only enables what the windowing collaborator says the
// platform needs to present. No layers, no debug messenger.

use super::error::{RendererError, RendererResult, VkResultExt};
use super::release::ReleaseStack;
use ash::extensions::khr;
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};

/// Loader, instance and the surface-extension loader that goes with it.
#[derive(Clone)]
pub struct VulkanInstance {
    pub entry: Entry,
    pub instance: ash::Instance,
    pub surface_loader: khr::Surface,
}

/// A presentation surface bound to the instance.
#[derive(Clone)]
pub struct Surface {
    pub loader: khr::Surface,
    pub handle: vk::SurfaceKHR,
}

impl VulkanInstance {
    /// Load the Vulkan library and create an instance.
    ///
    /// `extensions` comes from the windowing collaborator.
    pub fn new(
        app_name: &str,
        extensions: &[*const c_char],
        resources: &mut ReleaseStack,
    ) -> RendererResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            RendererError::ResourceUnavailable(format!(
                "failed to load Vulkan library ({e}). Is Vulkan installed?"
            ))
        })?;

        log::info!("Required instance extensions: {}", extensions.len());
        for &name in extensions {
            log::info!("  {}", unsafe { CStr::from_ptr(name) }.to_string_lossy());
        }

        let app_name_cstr = CString::new(app_name).unwrap_or_default();
        let engine_name = c"triangle-renderer";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(extensions);

        let instance =
            unsafe { entry.create_instance(&create_info, None) }.creating("Vulkan instance")?;

        // The loader library must stay mapped until the instance is gone.
        let kept_entry = entry.clone();
        let doomed = instance.clone();
        resources.push("instance", move || unsafe {
            doomed.destroy_instance(None);
            drop(kept_entry);
        });

        log::info!("Created Vulkan instance");

        let surface_loader = khr::Surface::new(&entry, &instance);
        Ok(Self {
            entry,
            instance,
            surface_loader,
        })
    }

    /// Take ownership of a surface created by the windowing collaborator.
    ///
    /// `keep_alive` is dropped only after the surface is destroyed; pass the
    /// window the surface was created from.
    pub fn adopt_surface<W: 'static>(
        &self,
        handle: vk::SurfaceKHR,
        keep_alive: W,
        resources: &mut ReleaseStack,
    ) -> Surface {
        let loader = self.surface_loader.clone();
        resources.push("surface", move || unsafe {
            loader.destroy_surface(handle, None);
            drop(keep_alive);
        });

        Surface {
            loader: self.surface_loader.clone(),
            handle,
        }
    }
}
