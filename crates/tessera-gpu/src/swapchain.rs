//! Swapchain management.
//!
//! Parameter selection is kept in pure functions over the surface query
//! results so it can be exercised without a device. Acquisition and
//! presentation report staleness through [`Acquired`] and [`Presented`]
//! rather than as errors.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::image::create_image_view;
use crate::surface::SurfaceSupport;
use ash::prelude::VkResult;
use ash::vk;
use tessera_core::constants::FRAMES_IN_FLIGHT;

/// The surface format used whenever the surface allows it.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Outcome of acquiring a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// An image was acquired (possibly suboptimal).
    Image(u32),
    /// The swapchain no longer matches the surface; nothing was acquired.
    Stale,
    /// Any other failure.
    Fatal(vk::Result),
}

/// Outcome of presenting a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presented {
    /// Presented to an up-to-date swapchain.
    Done,
    /// Presented (or dropped) on a suboptimal or out-of-date swapchain.
    Stale,
    /// Any other failure.
    Fatal(vk::Result),
}

/// Classify the result of `vkAcquireNextImageKHR`.
pub fn classify_acquire(result: VkResult<(u32, bool)>) -> Acquired {
    match result {
        Ok((index, suboptimal)) => {
            if suboptimal {
                tracing::debug!(index, "Acquired image from suboptimal swapchain");
            }
            Acquired::Image(index)
        }
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Acquired::Stale,
        Err(e) => Acquired::Fatal(e),
    }
}

/// Classify the result of `vkQueuePresentKHR`.
pub fn classify_present(result: VkResult<bool>) -> Presented {
    match result {
        Ok(false) => Presented::Done,
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Presented::Stale,
        Err(e) => Presented::Fatal(e),
    }
}

/// Select the surface format.
///
/// A single `UNDEFINED` entry means the surface has no preference.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    match formats {
        [] => Err(GpuError::SwapchainCreation(
            "Surface reports no formats".to_string(),
        )),
        [only] if only.format == vk::Format::UNDEFINED => Ok(PREFERRED_SURFACE_FORMAT),
        _ => Ok(formats
            .iter()
            .copied()
            .find(|format| {
                format.format == PREFERRED_SURFACE_FORMAT.format
                    && format.color_space == PREFERRED_SURFACE_FORMAT.color_space
            })
            .unwrap_or(formats[0])),
    }
}

/// Select the present mode: MAILBOX when offered, FIFO otherwise.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        // FIFO is always supported
        vk::PresentModeKHR::FIFO
    }
}

/// Calculate the swapchain extent.
///
/// A current extent other than the `u32::MAX` sentinel is authoritative and
/// returned as is. Otherwise the framebuffer size is clamped into the
/// surface's supported range.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        let (width, height) = framebuffer_size;
        vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Number of images to request: `desired`, raised to the surface minimum and
/// lowered to its maximum (0 means unbounded).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, desired: u32) -> u32 {
    let count = desired.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Image sharing mode and the queue families that share the images.
pub fn choose_sharing(graphics_family: u32, present_family: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family == present_family {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![graphics_family, present_family],
        )
    }
}

/// Parameters a swapchain is built with.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainSettings {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainSettings {
    /// Choose every parameter from a fresh surface query.
    pub fn choose(support: &SurfaceSupport, framebuffer_size: (u32, u32)) -> Result<Self> {
        let capabilities = &support.capabilities;
        Ok(Self {
            surface_format: choose_surface_format(&support.formats)?,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(capabilities, framebuffer_size),
            image_count: choose_image_count(capabilities, FRAMES_IN_FLIGHT as u32),
            pre_transform: capabilities.current_transform,
        })
    }
}

/// A swapchain image and its color view.
#[derive(Debug, Clone, Copy)]
pub struct PresentableImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
}

/// Swapchain wrapper.
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<PresentableImage>,
    pub settings: SwapchainSettings,
}

impl Swapchain {
    /// Create a new swapchain and one color view per returned image.
    pub fn new(ctx: &GpuContext, settings: SwapchainSettings) -> Result<Self> {
        let (sharing_mode, queue_families) =
            choose_sharing(ctx.graphics_queue_family(), ctx.present_queue_family());

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(ctx.surface().surface)
            .min_image_count(settings.image_count)
            .image_format(settings.surface_format.format)
            .image_color_space(settings.surface_format.color_space)
            .image_extent(settings.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&queue_families)
            .pre_transform(settings.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(settings.present_mode)
            .clipped(true);

        let loader = ctx.swapchain_loader();
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let mut this = Self {
            swapchain,
            images: Vec::new(),
            settings,
        };

        // On failure, destroy whatever was created so far
        if let Err(e) = this.create_views(ctx) {
            unsafe { this.destroy(ctx.device(), loader) };
            return Err(e);
        }

        tracing::debug!(
            requested = settings.image_count,
            actual = this.images.len(),
            width = settings.extent.width,
            height = settings.extent.height,
            format = ?settings.surface_format.format,
            present_mode = ?settings.present_mode,
            "Created swapchain"
        );

        Ok(this)
    }

    fn create_views(&mut self, ctx: &GpuContext) -> Result<()> {
        let images = unsafe { ctx.swapchain_loader().get_swapchain_images(self.swapchain)? };
        self.images.reserve(images.len());
        for image in images {
            let view = unsafe {
                create_image_view(
                    ctx.device(),
                    image,
                    self.settings.surface_format.format,
                    vk::ImageAspectFlags::COLOR,
                )?
            };
            self.images.push(PresentableImage { image, view });
        }
        Ok(())
    }

    /// Number of images the driver created.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Image extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.settings.extent
    }

    /// Color format of the images.
    pub fn format(&self) -> vk::Format {
        self.settings.surface_format.format
    }

    /// Color views in image order.
    pub fn views(&self) -> Vec<vk::ImageView> {
        self.images.iter().map(|image| image.view).collect()
    }

    /// Acquire the next image, signaling `semaphore` when it is ready.
    ///
    /// # Safety
    /// All handles must be valid.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn acquire_next_image(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        semaphore: vk::Semaphore,
    ) -> Acquired {
        classify_acquire(unsafe {
            swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        })
    }

    /// Present an image once `wait_semaphores` are signaled.
    ///
    /// # Safety
    /// All handles must be valid.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Presented {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        classify_present(unsafe { swapchain_loader.queue_present(queue, &present_info) })
    }

    /// Destroy the image views and the swapchain.
    ///
    /// # Safety
    /// All handles must be valid and swapchain must not be in use.
    pub unsafe fn destroy(
        &self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
    ) {
        unsafe {
            for image in &self.images {
                device.destroy_image_view(image.view, None);
            }
            swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn capabilities(
        current: (u32, u32),
        min: (u32, u32),
        max: (u32, u32),
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        }
    }

    fn is_preferred(format: vk::SurfaceFormatKHR) -> bool {
        format.format == PREFERRED_SURFACE_FORMAT.format
            && format.color_space == PREFERRED_SURFACE_FORMAT.color_space
    }

    #[test]
    fn undefined_format_substitutes_preferred() {
        let formats = [surface_format(
            vk::Format::UNDEFINED,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        assert!(is_preferred(choose_surface_format(&formats).unwrap()));
    }

    #[test]
    fn exact_format_match_preferred() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert!(is_preferred(choose_surface_format(&formats).unwrap()));
    }

    #[test]
    fn format_falls_back_to_first() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(
                vk::Format::B8G8R8A8_UNORM,
                vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            ),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn empty_format_list_is_an_error() {
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn mailbox_preferred() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn fifo_fallback() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn current_extent_is_authoritative() {
        // Deliberately outside the min/max range: must not be clamped
        let caps = capabilities((4000, 10), (100, 100), (2000, 2000));
        let extent = choose_extent(&caps, (800, 600));
        assert_eq!((extent.width, extent.height), (4000, 10));
    }

    #[test]
    fn extent_clamped_into_range() {
        let caps = capabilities((u32::MAX, u32::MAX), (100, 100), (2000, 2000));

        let extent = choose_extent(&caps, (50, 5000));
        assert_eq!((extent.width, extent.height), (100, 2000));

        let extent = choose_extent(&caps, (800, 600));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn image_count_respects_surface_limits() {
        let mut caps = capabilities((800, 600), (1, 1), (4096, 4096));
        caps.min_image_count = 3;
        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps, 2), 3);

        caps.min_image_count = 1;
        caps.max_image_count = 1;
        assert_eq!(choose_image_count(&caps, 2), 1);

        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps, 2), 2);
    }

    #[test]
    fn sharing_mode_follows_family_split() {
        assert_eq!(choose_sharing(0, 0), (vk::SharingMode::EXCLUSIVE, vec![]));
        assert_eq!(
            choose_sharing(0, 2),
            (vk::SharingMode::CONCURRENT, vec![0, 2])
        );
    }

    #[test]
    fn settings_from_support() {
        let support = SurfaceSupport {
            capabilities: capabilities((1280, 720), (1, 1), (4096, 4096)),
            formats: vec![surface_format(
                vk::Format::UNDEFINED,
                vk::ColorSpaceKHR::SRGB_NONLINEAR,
            )],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let settings = SwapchainSettings::choose(&support, (640, 480)).unwrap();
        assert!(is_preferred(settings.surface_format));
        assert_eq!(settings.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(
            (settings.extent.width, settings.extent.height),
            (1280, 720)
        );
        assert_eq!(settings.image_count, 2);
    }

    #[test]
    fn rebuild_with_unchanged_surface_chooses_the_same_settings() {
        let support = SurfaceSupport {
            capabilities: capabilities((u32::MAX, u32::MAX), (64, 64), (2048, 2048)),
            formats: vec![
                surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                surface_format(
                    vk::Format::B8G8R8A8_UNORM,
                    vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
                ),
            ],
            present_modes: vec![
                vk::PresentModeKHR::FIFO,
                vk::PresentModeKHR::IMMEDIATE,
                vk::PresentModeKHR::MAILBOX,
            ],
        };

        let first = SwapchainSettings::choose(&support, (1024, 768)).unwrap();
        let second = SwapchainSettings::choose(&support, (1024, 768)).unwrap();

        assert_eq!(first.surface_format.format, second.surface_format.format);
        assert_eq!(
            first.surface_format.color_space,
            second.surface_format.color_space
        );
        assert_eq!(first.present_mode, second.present_mode);
        assert_eq!(first.extent, second.extent);
        assert_eq!(first.image_count, second.image_count);
        assert_eq!(first.pre_transform, second.pre_transform);

        assert_eq!(first.surface_format.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(first.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!((first.extent.width, first.extent.height), (1024, 768));
    }

    #[test]
    fn acquire_classification() {
        assert_eq!(classify_acquire(Ok((1, false))), Acquired::Image(1));
        assert_eq!(classify_acquire(Ok((0, true))), Acquired::Image(0));
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Acquired::Stale
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Acquired::Fatal(vk::Result::ERROR_DEVICE_LOST)
        );
    }

    #[test]
    fn present_classification() {
        assert_eq!(classify_present(Ok(false)), Presented::Done);
        assert_eq!(classify_present(Ok(true)), Presented::Stale);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Presented::Stale
        );
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Presented::Fatal(vk::Result::ERROR_SURFACE_LOST_KHR)
        );
    }
}
