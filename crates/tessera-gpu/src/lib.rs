//! Vulkan layer for the Tessera engine.
//!
//! This crate provides:
//! - Instance creation and physical device probing/selection
//! - Logical device and queue ownership
//! - Swapchain parameter selection and presentation
//! - Frame slot synchronization primitives
//! - Creation helpers for images, render passes, pipelines and descriptors
//! - Memory allocation via gpu-allocator

pub mod capabilities;
pub mod command;
pub mod context;
pub mod debug;
pub mod descriptors;
pub mod error;
pub mod image;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod render_pass;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use capabilities::{DeviceCandidate, GpuVendor, QueueFamilyIndices};
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{write_uniform_buffer, DescriptorPool, DescriptorSetLayoutBuilder};
pub use error::{FrameStage, GpuError, Result};
pub use image::{choose_depth_format, has_stencil_component, DepthTarget, DEPTH_FORMAT_CANDIDATES};
pub use instance::DeviceConfig;
pub use memory::{upload_buffer, GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig, ShaderModule};
pub use surface::{SurfaceContext, SurfaceSupport};
pub use swapchain::{Acquired, PresentableImage, Presented, Swapchain, SwapchainSettings};
pub use sync::{create_fence, create_semaphore, FrameSlot, FrameSlots};

// Memory locations accepted by `GpuAllocator::create_buffer`
pub use gpu_allocator::MemoryLocation;
