// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Built once; there is no recreation path.

use super::device::{QueueFamilies, VulkanDevice};
use super::error::{RendererError, RendererResult, VkResultExt};
use super::instance::Surface;
use super::release::ReleaseStack;
use ash::extensions::khr;
use ash::vk;

/// Surface properties queried fresh for every swapchain build.
#[derive(Clone, Debug, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(device: &VulkanDevice, surface: &Surface) -> RendererResult<Self> {
        let pdev = device.physical_device;
        unsafe {
            Ok(Self {
                capabilities: surface
                    .loader
                    .get_physical_device_surface_capabilities(pdev, surface.handle)
                    .creating("surface capabilities")?,
                formats: surface
                    .loader
                    .get_physical_device_surface_formats(pdev, surface.handle)
                    .creating("surface format list")?,
                present_modes: surface
                    .loader
                    .get_physical_device_surface_present_modes(pdev, surface.handle)
                    .creating("present mode list")?,
            })
        }
    }
}

/// Swapchain plus one view per image.
///
/// `images[i]` and `image_views[i]` always describe the same image; every
/// later per-image object uses the same index.
#[derive(Clone)]
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    pub fn new(
        device: &VulkanDevice,
        instance: &ash::Instance,
        surface: &Surface,
        resources: &mut ReleaseStack,
    ) -> RendererResult<Self> {
        let support = SwapchainSupport::query(device, surface)?;

        let surface_format = choose_surface_format(&support.formats).ok_or_else(|| {
            RendererError::ResourceUnavailable("surface reports no formats".into())
        })?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities)?;
        let image_count = choose_image_count(&support.capabilities);

        log::info!(
            "Swapchain: {:?} / {:?}, {:?}, {}x{}, {} images requested",
            surface_format.format,
            surface_format.color_space,
            present_mode,
            extent.width,
            extent.height,
            image_count
        );

        let (sharing_mode, family_indices) = sharing_mode(&device.queue_families);

        let swapchain_loader = khr::Swapchain::new(instance, &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .creating("swapchain")?;

        let loader = swapchain_loader.clone();
        resources.push("swapchain", move || unsafe {
            loader.destroy_swapchain(swapchain, None);
        });

        // Order is defined by the swapchain and must be kept.
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }
            .creating("swapchain image list")?;

        log::info!("Created swapchain with {} images", images.len());

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view = create_image_view(&device.device, image, surface_format.format)?;
            let doomed = device.device.clone();
            resources.push("image view", move || unsafe {
                doomed.destroy_image_view(view, None);
            });
            image_views.push(view);
        }

        Ok(Self {
            swapchain,
            swapchain_loader,
            images,
            image_views,
            format: surface_format.format,
            extent,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> RendererResult<vk::ImageView> {
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

    unsafe { device.create_image_view(&create_info, None) }.creating("image view")
}

/// First BGRA8 unorm / sRGB-nonlinear pair, else the first pair offered.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX when offered, otherwise FIFO (always supported).
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's fixed current extent.
///
/// Surfaces that leave the size to the application (current extent width of
/// `u32::MAX`) are not supported.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR) -> RendererResult<vk::Extent2D> {
    if capabilities.current_extent.width != u32::MAX {
        Ok(capabilities.current_extent)
    } else {
        Err(RendererError::UnsupportedSurface(
            "surface extent follows the window size",
        ))
    }
}

/// One more than the minimum, clamped to the maximum when there is one.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        image_count = capabilities.max_image_count;
    }
    image_count
}

/// Concurrent across both families when they differ, exclusive otherwise.
pub fn sharing_mode(families: &QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![families.graphics, families.present],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D { width: 800, height: 600 },
            ..Default::default()
        }
    }

    #[test]
    fn preferred_format_is_picked_wherever_it_sits() {
        let formats = [
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let chosen = choose_surface_format(&formats).unwrap();

        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn falls_back_to_the_first_format() {
        let first = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let second = [
            format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::HDR10_ST2084_EXT),
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        for formats in [&first[..], &second[..]] {
            // Same answer every time, and always the head of the list.
            for _ in 0..3 {
                let chosen = choose_surface_format(formats).unwrap();
                assert_eq!(chosen.format, formats[0].format);
                assert_eq!(chosen.color_space, formats[0].color_space);
            }
        }
    }

    #[test]
    fn no_formats_means_no_choice() {
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn mailbox_is_preferred() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn fifo_is_the_fallback() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn image_count_respects_bounds() {
        for (min, max) in [(1, 0), (2, 0), (2, 3), (2, 8), (3, 3), (1, 1)] {
            let c = choose_image_count(&caps(min, max));
            assert!(min <= c, "min {min} max {max} gave {c}");
            assert!(max == 0 || c <= max, "min {min} max {max} gave {c}");
        }
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
        assert_eq!(choose_image_count(&caps(3, 3)), 3);
    }

    #[test]
    fn fixed_extent_is_used_as_is() {
        let extent = choose_extent(&caps(2, 0)).unwrap();
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn window_sized_extent_is_unsupported() {
        let mut capabilities = caps(2, 0);
        capabilities.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };

        assert!(matches!(
            choose_extent(&capabilities),
            Err(RendererError::UnsupportedSurface(_))
        ));
    }

    #[test]
    fn sharing_follows_family_split() {
        let shared = QueueFamilies { graphics: 0, present: 0 };
        let (mode, indices) = sharing_mode(&shared);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(indices.is_empty());

        let split = QueueFamilies { graphics: 0, present: 2 };
        let (mode, indices) = sharing_mode(&split);
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(indices, vec![0, 2]);
    }
}
