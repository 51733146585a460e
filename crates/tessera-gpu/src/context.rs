//! GPU context management.

use crate::capabilities::{select_candidate, DeviceCandidate};
use crate::debug::DebugMessenger;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, probe_physical_devices, DeviceConfig};
use crate::memory::GpuAllocator;
use crate::surface::{SurfaceContext, SurfaceSupport};
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::c_char;
use std::sync::Arc;
use tessera_core::AppIdentity;

/// Main GPU context holding Vulkan resources.
///
/// Owns everything that lives for the whole run: instance, surface, logical
/// device, queues and allocator. Swapchain-dependent objects are owned by the
/// renderer and rebuilt on their own.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) debug_messenger: Option<DebugMessenger>,
    pub(crate) surface: SurfaceContext,
    pub(crate) candidate: DeviceCandidate,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) swapchain_loader: ash::khr::swapchain::Device,
    pub(crate) allocator: Mutex<GpuAllocator>,
    pub(crate) config: DeviceConfig,

    pub(crate) graphics_queue_family: u32,
    pub(crate) present_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.candidate.physical_device
    }

    /// The selected device and everything probed about it.
    pub fn candidate(&self) -> &DeviceCandidate {
        &self.candidate
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// The configuration the instance and device were created with.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// The window surface.
    pub fn surface(&self) -> &SurfaceContext {
        &self.surface
    }

    /// Swapchain extension loader.
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the present queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get the present queue family index.
    pub fn present_queue_family(&self) -> u32 {
        self.present_queue_family
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Re-query surface support for the selected device.
    ///
    /// Capabilities change with the window, so swapchain rebuilds must not
    /// reuse the values probed at startup.
    pub fn surface_support(&self) -> Result<SurfaceSupport> {
        self.surface.support(self.candidate.physical_device)
    }

    /// Optimal-tiling feature flags of a format on the selected device.
    pub fn optimal_tiling_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.candidate.physical_device, format)
                .optimal_tiling_features
        }
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Shutdown allocator BEFORE destroying device
            // This frees all VkDeviceMemory allocations
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            self.surface.destroy();
            if let Some(messenger) = &self.debug_messenger {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    identity: AppIdentity,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            identity: AppIdentity::default(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application identity reported to the driver.
    pub fn identity(mut self, identity: AppIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context for a window.
    ///
    /// The window must outlive the returned context.
    pub fn build<W>(self, window: &W) -> Result<GpuContext>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("No display handle: {e}")))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("No window handle: {e}")))?
            .as_raw();

        // Load Vulkan entry point
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let config = DeviceConfig::new(&entry, self.identity, display, self.enable_validation)?;

        let instance = unsafe { create_instance(&entry, &config) }?;

        let debug_messenger = if config.validation_enabled() {
            tracing::info!("Validation layers enabled");
            Some(unsafe { DebugMessenger::new(&entry, &instance) }?)
        } else {
            None
        };

        let surface =
            unsafe { SurfaceContext::from_raw_handles(&entry, &instance, display, window_handle) }?;

        let candidates =
            unsafe { probe_physical_devices(&instance, &surface, &config.device_extensions) }?;
        for candidate in &candidates {
            tracing::info!(
                rating = candidate.rating(),
                "Found GPU: {}",
                candidate.summary()
            );
        }

        let candidate = select_candidate(candidates)?;
        tracing::info!("Selected GPU: {}", candidate.summary());

        let (graphics_queue_family, present_queue_family) = candidate
            .queue_family_indices
            .complete()
            .ok_or(GpuError::NoSuitableDevice)?;

        let device = unsafe { create_device(&instance, &candidate, &config) }?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_queue_family, 0) };

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

        let device = Arc::new(device);

        let allocator =
            unsafe { GpuAllocator::new(&instance, device.clone(), candidate.physical_device) }?;

        Ok(GpuContext {
            entry,
            instance,
            debug_messenger,
            surface,
            candidate,
            device,
            swapchain_loader,
            allocator: Mutex::new(allocator),
            config,
            graphics_queue_family,
            present_queue_family,
            graphics_queue,
            present_queue,
        })
    }
}

/// Create the logical device with one queue per unique family.
///
/// # Safety
/// The instance and candidate device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    candidate: &DeviceCandidate,
    config: &DeviceConfig,
) -> Result<ash::Device> {
    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = candidate
        .queue_family_indices
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extension_names: Vec<*const c_char> = config
        .device_extensions
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    // Device layers are deprecated but still honored by older loaders
    let layer_names: Vec<*const c_char> = config
        .validation_layers
        .iter()
        .map(|layer| layer.as_ptr())
        .collect();

    let features = vk::PhysicalDeviceFeatures::default();

    #[allow(deprecated)]
    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .enabled_features(&features);

    let device = unsafe {
        instance
            .create_device(candidate.physical_device, &device_create_info, None)
            .map_err(GpuError::from)?
    };

    Ok(device)
}
