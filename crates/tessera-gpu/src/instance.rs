//! Vulkan instance creation and physical device enumeration.

use crate::capabilities::DeviceCandidate;
use crate::error::{GpuError, Result};
use crate::surface::SurfaceContext;
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};
use tessera_core::{constants, AppIdentity, Version};

/// Device extensions every candidate must expose.
pub fn required_device_extensions() -> Vec<&'static CStr> {
    vec![ash::khr::swapchain::NAME]
}

/// Validation layers to enable when validation is requested.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![
        // Standard validation layer
        c"VK_LAYER_KHRONOS_validation",
    ]
}

/// Instance and device configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Application reported to the driver.
    pub identity: AppIdentity,
    /// Instance extensions (surface extensions for the display, debug utils).
    pub instance_extensions: Vec<&'static CStr>,
    /// Validation layers that are both requested and installed.
    pub validation_layers: Vec<&'static CStr>,
    /// Device extensions a candidate must support.
    pub device_extensions: Vec<&'static CStr>,
}

impl DeviceConfig {
    /// Build the configuration for a display.
    ///
    /// Requested validation layers that are not installed are dropped with a
    /// warning; the debug-utils extension is only requested when at least one
    /// layer remains.
    pub fn new(
        entry: &ash::Entry,
        identity: AppIdentity,
        display: RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<Self> {
        let surface_extensions = ash_window::enumerate_required_extensions(display)
            .map_err(|e| GpuError::SurfaceCreation(format!("Unsupported display: {e}")))?;

        let mut instance_extensions: Vec<&'static CStr> = surface_extensions
            .iter()
            // SAFETY: ash-window returns pointers to static NUL-terminated names
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect();

        #[cfg(target_os = "macos")]
        instance_extensions.push(ash::khr::portability_enumeration::NAME);

        let validation_layers = if enable_validation {
            available_validation_layers(entry)?
        } else {
            Vec::new()
        };

        if !validation_layers.is_empty() {
            instance_extensions.push(ash::ext::debug_utils::NAME);
        }

        Ok(Self {
            identity,
            instance_extensions,
            validation_layers,
            device_extensions: required_device_extensions(),
        })
    }

    /// Whether validation layers are active.
    pub fn validation_enabled(&self) -> bool {
        !self.validation_layers.is_empty()
    }
}

/// Requested validation layers the loader actually provides.
fn available_validation_layers(entry: &ash::Entry) -> Result<Vec<&'static CStr>> {
    let available = unsafe { entry.enumerate_instance_layer_properties()? };

    let layers = validation_layers()
        .into_iter()
        .filter(|layer| {
            let found = has_layer(&available, layer);
            if !found {
                tracing::warn!("Validation layer {} not available", layer.to_string_lossy());
            }
            found
        })
        .collect();

    Ok(layers)
}

fn has_layer(available: &[vk::LayerProperties], name: &CStr) -> bool {
    available.iter().any(|props| {
        // SAFETY: layer_name is a NUL-terminated fixed-size array
        let layer_name = unsafe { CStr::from_ptr(props.layer_name.as_ptr()) };
        layer_name == name
    })
}

fn vk_version(version: Version) -> u32 {
    vk::make_api_version(0, version.major, version.minor, version.patch)
}

/// Create a Vulkan instance.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(entry: &ash::Entry, config: &DeviceConfig) -> Result<ash::Instance> {
    let app_name = CString::new(config.identity.name.as_str())
        .map_err(|e| GpuError::InvalidState(format!("Application name contains NUL: {e}")))?;
    let engine_name = CString::new(constants::ENGINE_NAME)
        .map_err(|e| GpuError::InvalidState(format!("Engine name contains NUL: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk_version(config.identity.version))
        .engine_name(&engine_name)
        .engine_version(vk_version(constants::ENGINE_VERSION))
        .api_version(vk::API_VERSION_1_0);

    let extension_names: Vec<*const c_char> = config
        .instance_extensions
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();
    let layer_names: Vec<*const c_char> = config
        .validation_layers
        .iter()
        .map(|layer| layer.as_ptr())
        .collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = unsafe { entry.create_instance(&create_info, None)? };

    Ok(instance)
}

/// Enumerate and probe every physical device against the surface.
///
/// # Safety
/// The instance and surface must be valid.
pub unsafe fn probe_physical_devices(
    instance: &ash::Instance,
    surface: &SurfaceContext,
    required_extensions: &[&CStr],
) -> Result<Vec<DeviceCandidate>> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        return Err(GpuError::NoPhysicalDevices);
    }

    devices
        .into_iter()
        // SAFETY: handles come straight from enumeration on a valid instance
        .map(|device| unsafe {
            DeviceCandidate::probe(instance, surface, device, required_extensions)
        })
        .collect()
}
