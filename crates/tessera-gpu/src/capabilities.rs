//! Physical device probing and rating.

use crate::error::{GpuError, Result};
use crate::surface::{SurfaceContext, SurfaceSupport};
use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Queue family indices for the two roles the renderer needs.
///
/// `None` means no family with that role exists. The two indices may coincide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Find the first graphics-capable and the first present-capable family.
    ///
    /// `present_support[i]` is the surface support answer for family `i`.
    /// Families with no queues are skipped for both roles.
    pub fn find(families: &[vk::QueueFamilyProperties], present_support: &[bool]) -> Self {
        let usable = |i: usize| families[i].queue_count > 0;

        let graphics = (0..families.len())
            .find(|&i| usable(i) && families[i].queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32);

        let present = (0..families.len())
            .find(|&i| usable(i) && present_support.get(i).copied().unwrap_or(false))
            .map(|i| i as u32);

        Self { graphics, present }
    }

    /// Both indices, if both roles were found.
    pub fn complete(&self) -> Option<(u32, u32)> {
        Some((self.graphics?, self.present?))
    }

    /// Deduplicated family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        let mut families: Vec<u32> = self.graphics.into_iter().chain(self.present).collect();
        families.dedup();
        families
    }
}

/// Rate a device: 1 if usable, 0 if not.
///
/// A device is usable when it has both queue roles and exposes every required
/// extension under its exact name. The value only ranks candidates.
pub fn rate(
    indices: &QueueFamilyIndices,
    available_extensions: &HashSet<String>,
    required_extensions: &[&CStr],
) -> u32 {
    if indices.complete().is_none() {
        return 0;
    }

    let all_present = required_extensions.iter().all(|required| {
        required
            .to_str()
            .is_ok_and(|name| available_extensions.contains(name))
    });

    u32::from(all_present)
}

/// A probed physical device.
#[derive(Clone)]
pub struct DeviceCandidate {
    pub physical_device: vk::PhysicalDevice,
    pub device_name: String,
    pub vendor: GpuVendor,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub queue_family_indices: QueueFamilyIndices,
    pub available_extensions: HashSet<String>,
    pub surface_support: SurfaceSupport,
    rating: u32,
}

impl DeviceCandidate {
    /// Probe a physical device against a surface.
    ///
    /// A device with no queue families, no extensions, no surface formats or no
    /// present modes is a broken environment and fails the probe outright.
    ///
    /// # Safety
    /// The instance, surface and physical device must be valid.
    pub unsafe fn probe(
        instance: &ash::Instance,
        surface: &SurfaceContext,
        physical_device: vk::PhysicalDevice,
        required_extensions: &[&CStr],
    ) -> Result<Self> {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        // SAFETY: device_name is a NUL-terminated fixed-size array
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        if queue_families.is_empty() {
            return Err(GpuError::NoQueueFamilies(device_name));
        }

        let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }?;
        if extensions.is_empty() {
            return Err(GpuError::NoDeviceExtensions(device_name));
        }
        let available_extensions: HashSet<String> = extensions
            .iter()
            .filter_map(|ext| {
                // SAFETY: extension_name is a NUL-terminated fixed-size array
                unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
                    .to_str()
                    .ok()
                    .map(String::from)
            })
            .collect();

        let surface_support = surface.support(physical_device)?;
        if surface_support.formats.is_empty() {
            return Err(GpuError::NoSurfaceFormats(device_name));
        }
        if surface_support.present_modes.is_empty() {
            return Err(GpuError::NoPresentModes(device_name));
        }

        let present_support = (0..queue_families.len() as u32)
            .map(|family| surface.present_support(physical_device, family))
            .collect::<Result<Vec<_>>>()?;

        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let queue_family_indices = QueueFamilyIndices::find(&queue_families, &present_support);
        let rating = rate(&queue_family_indices, &available_extensions, required_extensions);

        tracing::debug!(
            device = %device_name,
            graphics = ?queue_family_indices.graphics,
            present = ?queue_family_indices.present,
            rating,
            "Probed physical device"
        );

        Ok(Self {
            physical_device,
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            properties,
            memory_properties,
            queue_families,
            queue_family_indices,
            available_extensions,
            surface_support,
            rating,
        })
    }

    /// Usability rating (0 = unusable).
    pub fn rating(&self) -> u32 {
        self.rating
    }

    /// Whether this candidate can drive the renderer.
    pub fn is_usable(&self) -> bool {
        self.rating > 0
    }

    /// Device-local memory in MB.
    pub fn device_local_memory_mb(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum()
    }

    /// Get a human-readable summary of the device.
    pub fn summary(&self) -> String {
        let api_version = self.properties.api_version;
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            vk::api_version_patch(api_version),
            self.device_local_memory_mb(),
        )
    }
}

/// Index of the highest rating, keeping the first on ties.
///
/// Returns `None` when the list is empty or the best rating is 0.
pub fn best_rated_index(ratings: impl IntoIterator<Item = u32>) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, rating) in ratings.into_iter().enumerate() {
        if best.map_or(true, |(_, best_rating)| rating > best_rating) {
            best = Some((index, rating));
        }
    }
    best.filter(|&(_, rating)| rating > 0).map(|(index, _)| index)
}

/// Pick the best usable candidate.
pub fn select_candidate(mut candidates: Vec<DeviceCandidate>) -> Result<DeviceCandidate> {
    let best = best_rated_index(candidates.iter().map(DeviceCandidate::rating))
        .ok_or(GpuError::NoSuitableDevice)?;
    Ok(candidates.swap_remove(best))
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

    fn extensions(names: &[&str]) -> HashSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn candidate(name: &str, indices: QueueFamilyIndices, exts: &[&str]) -> DeviceCandidate {
        let available_extensions = extensions(exts);
        let rating = rate(&indices, &available_extensions, &[ash::khr::swapchain::NAME]);
        DeviceCandidate {
            physical_device: vk::PhysicalDevice::null(),
            device_name: name.to_string(),
            vendor: GpuVendor::Other(0),
            properties: vk::PhysicalDeviceProperties::default(),
            memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
            queue_families: Vec::new(),
            queue_family_indices: indices,
            available_extensions,
            surface_support: SurfaceSupport::default(),
            rating,
        }
    }

    const BOTH: QueueFamilyIndices = QueueFamilyIndices {
        graphics: Some(0),
        present: Some(0),
    };

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
    }

    #[test]
    fn find_skips_empty_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 4),
        ];
        let indices = QueueFamilyIndices::find(&families, &[true, true, false]);
        assert_eq!(indices.graphics, Some(2));
        assert_eq!(indices.present, Some(1));
        assert_eq!(indices.unique(), vec![2, 1]);
    }

    #[test]
    fn shared_family_is_deduplicated() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];
        let indices = QueueFamilyIndices::find(&families, &[true]);
        assert_eq!(indices.complete(), Some((0, 0)));
        assert_eq!(indices.unique(), vec![0]);
    }

    #[test]
    fn missing_queue_role_rates_zero() {
        let exts = extensions(&["VK_KHR_swapchain"]);
        let no_present = QueueFamilyIndices {
            graphics: Some(0),
            present: None,
        };
        let no_graphics = QueueFamilyIndices {
            graphics: None,
            present: Some(0),
        };
        assert_eq!(rate(&no_present, &exts, &[ash::khr::swapchain::NAME]), 0);
        assert_eq!(rate(&no_graphics, &exts, &[ash::khr::swapchain::NAME]), 0);
        assert_eq!(rate(&BOTH, &exts, &[ash::khr::swapchain::NAME]), 1);
    }

    #[test]
    fn extension_match_is_exact() {
        let required = [ash::khr::swapchain::NAME];
        assert_eq!(rate(&BOTH, &extensions(&["vk_khr_swapchain"]), &required), 0);
        assert_eq!(rate(&BOTH, &extensions(&["VK_KHR_swapchain_x"]), &required), 0);
        assert_eq!(rate(&BOTH, &extensions(&["VK_KHR_surface"]), &required), 0);
        assert_eq!(rate(&BOTH, &extensions(&[]), &[]), 1);
    }

    #[test]
    fn best_rated_keeps_first_on_ties() {
        assert_eq!(best_rated_index([0, 1, 1]), Some(1));
        assert_eq!(best_rated_index([1, 0, 1]), Some(0));
        assert_eq!(best_rated_index([0, 0]), None);
        assert_eq!(best_rated_index(Vec::new()), None);
    }

    #[test]
    fn selects_usable_candidate() {
        let candidates = vec![
            candidate(
                "no-present",
                QueueFamilyIndices {
                    graphics: Some(0),
                    present: None,
                },
                &["VK_KHR_swapchain"],
            ),
            candidate("no-swapchain", BOTH, &["VK_KHR_surface"]),
            candidate("usable", BOTH, &["VK_KHR_swapchain"]),
            candidate("also-usable", BOTH, &["VK_KHR_swapchain"]),
        ];
        let selected = select_candidate(candidates).unwrap();
        assert_eq!(selected.device_name, "usable");
        assert_eq!(selected.rating(), 1);
    }

    #[test]
    fn lone_unusable_candidate_is_rejected() {
        let candidates = vec![candidate(
            "graphics-only",
            QueueFamilyIndices {
                graphics: Some(0),
                present: None,
            },
            &["VK_KHR_swapchain"],
        )];
        assert!(matches!(
            select_candidate(candidates),
            Err(GpuError::NoSuitableDevice)
        ));
        assert!(matches!(
            select_candidate(Vec::new()),
            Err(GpuError::NoSuitableDevice)
        ));
    }
}
