//! Image views and the depth attachment.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::GpuImage;
use ash::vk;
use gpu_allocator::MemoryLocation;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 2] =
    [vk::Format::D32_SFLOAT_S8_UINT, vk::Format::D24_UNORM_S8_UINT];

/// Create a 2D view covering the first mip level and layer of an image.
///
/// # Safety
/// The device and image must be valid.
pub unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let view = unsafe { device.create_image_view(&view_info, None)? };
    Ok(view)
}

/// Pick the first candidate usable as an optimal-tiling depth/stencil attachment.
///
/// `optimal_tiling_features` answers the format-properties query for one format.
pub fn choose_depth_format(
    candidates: &[vk::Format],
    optimal_tiling_features: impl Fn(vk::Format) -> vk::FormatFeatureFlags,
) -> Result<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            optimal_tiling_features(format)
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| GpuError::NoDepthFormat(candidates.to_vec()))
}

/// Whether a depth format carries a stencil component.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Depth image shared by every framebuffer of a swapchain generation.
pub struct DepthTarget {
    pub image: GpuImage,
    pub view: vk::ImageView,
    pub format: vk::Format,
}

impl DepthTarget {
    /// Allocate a device-local depth image of the given extent and its view.
    pub fn new(ctx: &GpuContext, extent: vk::Extent2D) -> Result<Self> {
        let format = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            ctx.optimal_tiling_features(format)
        })?;

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut image = ctx
            .allocator()
            .lock()
            .create_image(&create_info, MemoryLocation::GpuOnly, "depth")?;

        let aspect = if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        };

        // SAFETY: the image was just created on this device
        let view = match unsafe { create_image_view(ctx.device(), image.image, format, aspect) } {
            Ok(view) => view,
            Err(e) => {
                ctx.allocator().lock().free_image(&mut image)?;
                return Err(e);
            }
        };

        tracing::debug!(
            ?format,
            width = extent.width,
            height = extent.height,
            "Created depth target"
        );

        Ok(Self {
            image,
            view,
            format,
        })
    }

    /// Destroy the view and free the image.
    ///
    /// # Safety
    /// The depth target must not be in use by the GPU.
    pub unsafe fn destroy(&mut self, ctx: &GpuContext) -> Result<()> {
        unsafe { ctx.device().destroy_image_view(self.view, None) };
        self.view = vk::ImageView::null();
        ctx.allocator().lock().free_image(&mut self.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_supported_candidate_wins() {
        let format = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| {
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        })
        .unwrap();
        assert_eq!(format, vk::Format::D32_SFLOAT_S8_UINT);
    }

    #[test]
    fn falls_back_to_second_candidate() {
        let format = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            if format == vk::Format::D24_UNORM_S8_UINT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::FormatFeatureFlags::SAMPLED_IMAGE
            } else {
                vk::FormatFeatureFlags::SAMPLED_IMAGE
            }
        })
        .unwrap();
        assert_eq!(format, vk::Format::D24_UNORM_S8_UINT);
    }

    #[test]
    fn repeated_selection_is_stable() {
        let features = |format: vk::Format| {
            if format == vk::Format::D32_SFLOAT_S8_UINT {
                vk::FormatFeatureFlags::empty()
            } else {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            }
        };
        let first = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, features).unwrap();
        let second = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, features).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vk::Format::D24_UNORM_S8_UINT);
    }

    #[test]
    fn no_supported_candidate_is_an_error() {
        let result = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| {
            vk::FormatFeatureFlags::empty()
        });
        assert!(matches!(result, Err(GpuError::NoDepthFormat(ref formats)) if formats.len() == 2));
    }

    #[test]
    fn stencil_components() {
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
    }
}
