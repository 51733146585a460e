//! Frame scheduling for the Tessera engine.
//!
//! This crate provides:
//! - The frame scheduler state machine and its backend/window seams
//! - Swapchain generations: everything rebuilt when the surface changes
//! - The Vulkan renderer driving a [`FrameContent`] implementation

pub mod content;
pub mod generation;
pub mod renderer;
pub mod scheduler;
pub mod shader;

pub use content::FrameContent;
pub use generation::SwapchainGeneration;
pub use renderer::Renderer;
pub use scheduler::{FrameBackend, FrameScheduler, FrameState, FrameStats, SurfaceWindow};
pub use shader::{load_shader, shader_path, SHADER_DIR};
