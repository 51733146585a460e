//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
///
/// Every variant is fatal to the caller. Swapchain staleness is not an error;
/// it is reported through [`crate::swapchain::Acquired`] and
/// [`crate::swapchain::Presented`].
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be found or initialized.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// The instance exposes no physical devices at all.
    #[error("No physical devices found")]
    NoPhysicalDevices,

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// A device reports an empty queue family table.
    #[error("Device {0} supports no queue families")]
    NoQueueFamilies(String),

    /// A device reports no extensions.
    #[error("Device {0} supports no extensions")]
    NoDeviceExtensions(String),

    /// The surface reports no formats for a device.
    #[error("Device {0} supports no surface formats")]
    NoSurfaceFormats(String),

    /// The surface reports no present modes for a device.
    #[error("Device {0} supports no present modes")]
    NoPresentModes(String),

    /// None of the depth format candidates can be used as an attachment.
    #[error("No supported depth format among {0:?}")]
    NoDepthFormat(Vec<vk::Format>),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader bytecode could not be read.
    #[error("Failed to load shader {path}: {source}")]
    ShaderLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// A frame operation returned a result outside success/suboptimal/out-of-date.
    #[error("Frame {stage} failed: {result}")]
    Frame {
        stage: FrameStage,
        result: vk::Result,
    },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Frame operation that produced a [`GpuError::Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Acquire,
    Submit,
    Present,
}

impl std::fmt::Display for FrameStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Acquire => "image acquisition",
            Self::Submit => "submission",
            Self::Present => "presentation",
        };
        f.write_str(name)
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
