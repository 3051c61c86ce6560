// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (first enumerated, no scoring)
// - Graphics / present queue family resolution for the bound surface
// - Logical device + queue creation

use super::error::{RendererError, RendererResult, VkResultExt};
use super::instance::{Surface, VulkanInstance};
use super::release::ReleaseStack;
use ash::extensions::khr;
use ash::vk;
use std::ffi::CStr;

/// Queue family indices for the bound surface.
///
/// Both must be set before a device can be created. They may be equal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

/// Queue families that passed resolution; both indices are known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Walk the families in order, taking the first graphics-capable one and
    /// the first one that can present, and stop once both are known.
    ///
    /// Families with no queues are never selected.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> RendererResult<bool>,
    ) -> RendererResult<Self> {
        let mut indices = Self::default();

        for (index, family) in (0u32..).zip(families) {
            if family.queue_count == 0 {
                continue;
            }
            if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }
            if indices.present.is_none() && supports_present(index)? {
                indices.present = Some(index);
            }
            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    pub fn resolve(self) -> RendererResult<QueueFamilies> {
        let graphics = self.graphics.ok_or_else(|| {
            RendererError::ResourceUnavailable("no graphics-capable queue family".into())
        })?;
        let present = self.present.ok_or_else(|| {
            RendererError::ResourceUnavailable(
                "no queue family can present to the surface".into(),
            )
        })?;
        Ok(QueueFamilies { graphics, present })
    }
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, one queue each.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Logical device, its queues and the physical device it came from.
#[derive(Clone)]
pub struct VulkanDevice {
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue_families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

impl VulkanDevice {
    /// Pick a GPU, resolve its queue families and create the logical device.
    pub fn new(
        instance: &VulkanInstance,
        surface: &Surface,
        resources: &mut ReleaseStack,
    ) -> RendererResult<Self> {
        let physical_device = Self::pick_physical_device(&instance.instance)?;

        let properties = unsafe {
            instance.instance.get_physical_device_properties(physical_device)
        };
        log::info!("Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
                .to_string_lossy());
        log::info!("API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version));

        let families = unsafe {
            instance.instance.get_physical_device_queue_family_properties(physical_device)
        };
        let queue_families = QueueFamilyIndices::find(&families, |index| unsafe {
            surface
                .loader
                .get_physical_device_surface_support(physical_device, index, surface.handle)
                .submitting("query surface support")
        })?
        .resolve()?;

        log::info!(
            "Queue families: graphics={}, present={}",
            queue_families.graphics,
            queue_families.present
        );

        let device = Self::create_logical_device(
            &instance.instance,
            physical_device,
            &queue_families,
        )?;

        let doomed = device.clone();
        resources.push("logical device", move || unsafe {
            doomed.destroy_device(None);
        });

        // Same queue object when both indices coincide.
        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        Ok(Self {
            physical_device,
            device,
            queue_families,
            graphics_queue,
            present_queue,
        })
    }

    /// Take the first enumerated device. There is deliberately no scoring.
    fn pick_physical_device(instance: &ash::Instance) -> RendererResult<vk::PhysicalDevice> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .creating("physical device list")?;

        first_device(&devices)
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilies,
    ) -> RendererResult<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions = [khr::Swapchain::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .creating("logical device")
    }

    /// Block until the GPU has finished all submitted work.
    pub fn wait_idle(&self) -> RendererResult<()> {
        unsafe { self.device.device_wait_idle() }.submitting("wait for device idle")
    }
}

fn first_device<T: Copy>(devices: &[T]) -> RendererResult<T> {
    devices.first().copied().ok_or_else(|| {
        RendererError::ResourceUnavailable("failed to find GPUs with Vulkan support".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, queue_count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count,
            ..Default::default()
        }
    }

    #[test]
    fn shared_family_is_found_once() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
            family(vk::QueueFlags::TRANSFER, 1),
        ];

        let mut queried = Vec::new();
        let indices = QueueFamilyIndices::find(&families, |i| {
            queried.push(i);
            Ok(true)
        })
        .unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        // Scanning stops as soon as both are known.
        assert_eq!(queried, vec![0]);

        let resolved = indices.resolve().unwrap();
        assert!(resolved.is_shared());
        assert_eq!(resolved.unique(), vec![0]);
    }

    #[test]
    fn distinct_families_are_both_kept() {
        let families = [
            family(vk::QueueFlags::COMPUTE, 2),
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::TRANSFER, 1),
        ];

        let indices = QueueFamilyIndices::find(&families, |i| Ok(i == 2)).unwrap();
        let resolved = indices.resolve().unwrap();

        assert_eq!(resolved, QueueFamilies { graphics: 1, present: 2 });
        assert!(!resolved.is_shared());
        assert_eq!(resolved.unique(), vec![1, 2]);
    }

    #[test]
    fn empty_families_are_skipped() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::GRAPHICS, 4),
        ];

        let indices = QueueFamilyIndices::find(&families, |_| Ok(true)).unwrap();

        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
    }

    #[test]
    fn selected_families_satisfy_their_capability() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::COMPUTE, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        let presentable = |i: u32| i == 1 || i == 3;

        let resolved = QueueFamilyIndices::find(&families, |i| Ok(presentable(i)))
            .unwrap()
            .resolve()
            .unwrap();

        let graphics = &families[resolved.graphics as usize];
        assert!(graphics.queue_count > 0);
        assert!(graphics.queue_flags.contains(vk::QueueFlags::GRAPHICS));
        assert!(presentable(resolved.present));
        assert_eq!(resolved, QueueFamilies { graphics: 2, present: 1 });
    }

    #[test]
    fn missing_present_support_is_fatal() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];

        let indices = QueueFamilyIndices::find(&families, |_| Ok(false)).unwrap();

        assert!(!indices.is_complete());
        assert!(matches!(
            indices.resolve(),
            Err(RendererError::ResourceUnavailable(_))
        ));
    }

    #[test]
    fn missing_graphics_support_is_fatal() {
        let families = [family(vk::QueueFlags::COMPUTE, 1)];

        let indices = QueueFamilyIndices::find(&families, |_| Ok(true)).unwrap();

        assert_eq!(indices.present, Some(0));
        assert!(indices.resolve().is_err());
    }

    #[test]
    fn surface_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];

        let result = QueueFamilyIndices::find(&families, |_| {
            Err(RendererError::SubmissionFailure {
                operation: "query surface support",
                result: vk::Result::ERROR_SURFACE_LOST_KHR,
            })
        });

        assert!(result.is_err());
    }

    #[test]
    fn first_enumerated_device_wins() {
        assert_eq!(first_device(&[7u64, 3, 9]).unwrap(), 7);
        assert!(matches!(
            first_device::<u64>(&[]),
            Err(RendererError::ResourceUnavailable(_))
        ));
    }
}
